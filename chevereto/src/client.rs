//! Outbound HTTP plumbing shared by the prober and the upload relay.
use crate::config::UpstreamConfig;
use crate::settings::normalize_domain;
use url::Url;

/// Chevereto v1 upload endpoint, relative to the instance domain.
pub const UPLOAD_PATH: &str = "/api/1/upload";

pub const API_KEY_HEADER: &str = "X-API-Key";

/// Builds the client used for every call to a Chevereto instance. Redirects
/// are not followed, so callers always see the status the instance answered with.
pub fn build_client(config: &UpstreamConfig) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(config.connect_timeout())
        .redirect(reqwest::redirect::Policy::none())
        .user_agent(concat!("diarum/", env!("CARGO_PKG_VERSION")))
        .build()
}

pub fn upload_url(domain: &str) -> Result<Url, url::ParseError> {
    Url::parse(&format!("{}{UPLOAD_PATH}", normalize_domain(domain)))
}

/// Short description of a failed outbound request that is safe to show to
/// end users. The full error is only logged.
pub fn describe_transport_error(error: &reqwest::Error) -> &'static str {
    if error.is_timeout() {
        "request timed out"
    } else if error.is_connect() {
        "could not connect to server"
    } else if error.is_builder() {
        "invalid request"
    } else if error.is_body() {
        "failed to send request body"
    } else {
        "request failed"
    }
}
