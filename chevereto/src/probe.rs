//! Checks that a Chevereto instance is reachable without uploading anything.
//!
//! The probe sends a GET to the upload endpoint. Chevereto only accepts POST
//! there, so a healthy instance rejects the request, and any definite HTTP
//! answer proves the host and its API exist. Only a transport failure or a
//! 404 means the domain is wrong.
use crate::client::{API_KEY_HEADER, describe_transport_error, upload_url};
use crate::metrics_defs::PROBE_RESULT;
use reqwest::StatusCode;
use shared::counter;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeResult {
    Reachable,
    EndpointNotFound,
    AuthenticationRejected,
    /// The request never got an HTTP answer.
    ConnectionFailed(String),
    /// No request could be built from the given domain.
    Unrecognized(String),
}

impl ProbeResult {
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::NOT_FOUND => ProbeResult::EndpointNotFound,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProbeResult::AuthenticationRejected,
            // 405 is the expected answer, but 200, 400, redirects and even
            // server errors all come from a live instance.
            _ => ProbeResult::Reachable,
        }
    }

    pub fn is_reachable(&self) -> bool {
        matches!(self, ProbeResult::Reachable)
    }

    pub fn message(&self) -> String {
        match self {
            ProbeResult::Reachable => "Connection successful".to_string(),
            ProbeResult::EndpointNotFound => {
                "Chevereto API endpoint not found. Please check the domain.".to_string()
            }
            ProbeResult::AuthenticationRejected => {
                "Authentication failed. Please check your API key.".to_string()
            }
            ProbeResult::ConnectionFailed(detail) => format!("Connection failed: {detail}"),
            ProbeResult::Unrecognized(detail) => format!("Invalid domain URL: {detail}"),
        }
    }

    fn metric_tag(&self) -> &'static str {
        match self {
            ProbeResult::Reachable => "reachable",
            ProbeResult::EndpointNotFound => "endpoint_not_found",
            ProbeResult::AuthenticationRejected => "authentication_rejected",
            ProbeResult::ConnectionFailed(_) => "connection_failed",
            ProbeResult::Unrecognized(_) => "unrecognized",
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ProbeError {
    #[error("Domain and API Key are required")]
    MissingCredentials,
}

#[derive(Clone)]
pub struct Prober {
    client: reqwest::Client,
    timeout: Duration,
}

impl Prober {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Prober { client, timeout }
    }

    /// Classifies the reachability of the instance at `domain`. Network
    /// failures are part of the result; only missing input is an error.
    pub async fn probe(&self, domain: &str, api_key: &str) -> Result<ProbeResult, ProbeError> {
        if domain.trim().is_empty() || api_key.trim().is_empty() {
            return Err(ProbeError::MissingCredentials);
        }

        let result = self.send_probe(domain, api_key.trim()).await;
        counter!(PROBE_RESULT, "result" => result.metric_tag()).increment(1);

        Ok(result)
    }

    async fn send_probe(&self, domain: &str, api_key: &str) -> ProbeResult {
        let url = match upload_url(domain) {
            Ok(url) => url,
            Err(e) => return ProbeResult::Unrecognized(e.to_string()),
        };

        let mut response = match self
            .client
            .get(url)
            .header(API_KEY_HEADER, api_key)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = ?e, "Chevereto probe got no response");
                return ProbeResult::ConnectionFailed(describe_transport_error(&e).to_string());
            }
        };

        let status = response.status();
        // Drain the body so the connection can go back to the pool. Its
        // content is irrelevant, so nothing is kept.
        while let Ok(Some(_)) = response.chunk().await {}

        tracing::debug!(status = status.as_u16(), "Chevereto probe answered");
        ProbeResult::from_status(status)
    }
}
