//! Forwards a user's upload to their Chevereto instance.
//!
//! The inbound file is re-packaged into a new multipart request carrying the
//! user's API key, and Chevereto's answer is reduced to either the image URL
//! or a single user-facing message.
use crate::client::{API_KEY_HEADER, describe_transport_error, upload_url};
use crate::metrics_defs::{UPLOAD_DURATION, UPLOAD_RESULT};
use crate::settings::{ConnectionSettings, SettingsError};
use config_store::ConfigStore;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde_json::Value;
use shared::{counter, histogram};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Multipart field carrying the file, inbound and outbound.
pub const SOURCE_FIELD: &str = "source";
const ALBUM_ID_FIELD: &str = "album_id";
const TITLE_FIELD: &str = "title";

#[derive(thiserror::Error, Debug)]
pub enum RelayError {
    #[error("Chevereto is not enabled")]
    NotEnabled,

    #[error("Chevereto domain and API key are not configured")]
    NotConfigured,

    #[error("No file provided")]
    NoFile,

    #[error("Invalid Chevereto domain URL")]
    InvalidDomain(#[source] url::ParseError),

    #[error("Upload to Chevereto failed: {}", describe_transport_error(.0))]
    Transport(#[source] reqwest::Error),

    #[error("Failed to read Chevereto response")]
    ResponseRead(#[source] reqwest::Error),

    /// Chevereto rejected the upload and said why.
    #[error("Chevereto error: {0}")]
    Remote(String),

    #[error("Chevereto returned status {0}")]
    RemoteStatus(u16),

    #[error("Failed to parse Chevereto response")]
    MalformedResponse(#[source] serde_json::Error),

    #[error("No image data in Chevereto response")]
    MissingImage,

    #[error("No image URL in Chevereto response")]
    MissingImageUrl,

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

impl RelayError {
    fn metric_tag(&self) -> &'static str {
        match self {
            RelayError::NotEnabled => "not_enabled",
            RelayError::NotConfigured => "not_configured",
            RelayError::NoFile => "no_file",
            RelayError::InvalidDomain(_) => "invalid_domain",
            RelayError::Transport(_) | RelayError::ResponseRead(_) => "transport",
            RelayError::Remote(_) | RelayError::RemoteStatus(_) => "remote_rejected",
            RelayError::MalformedResponse(_)
            | RelayError::MissingImage
            | RelayError::MissingImageUrl => "malformed_response",
            RelayError::Settings(_) => "settings_unavailable",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UploadedImage {
    pub url: String,
}

/// A file received from the client, forwarded as-is.
pub struct InboundFile {
    filename: String,
    body: reqwest::Body,
}

impl InboundFile {
    pub fn new(filename: impl Into<String>, body: impl Into<reqwest::Body>) -> Self {
        InboundFile {
            filename: filename.into(),
            body: body.into(),
        }
    }
}

#[derive(Clone)]
pub struct Relay {
    client: reqwest::Client,
    store: Arc<dyn ConfigStore>,
    timeout: Duration,
}

impl Relay {
    pub fn new(client: reqwest::Client, store: Arc<dyn ConfigStore>, timeout: Duration) -> Self {
        Relay {
            client,
            store,
            timeout,
        }
    }

    /// Uploads `file` to the Chevereto instance configured for `user_id`.
    ///
    /// Settings are re-read on every call and checked before the file is
    /// looked at, so a disabled or incomplete configuration never causes an
    /// outbound request.
    pub async fn relay_upload(
        &self,
        user_id: &str,
        file: Option<InboundFile>,
    ) -> Result<UploadedImage, RelayError> {
        let result = self.try_relay(user_id, file).await;

        match &result {
            Ok(image) => {
                counter!(UPLOAD_RESULT, "outcome" => "success").increment(1);
                tracing::info!(user_id, url = %image.url, "Relayed upload to Chevereto");
            }
            Err(e) => {
                counter!(UPLOAD_RESULT, "outcome" => e.metric_tag()).increment(1);
                tracing::warn!(user_id, error = ?e, "Chevereto upload failed");
            }
        }

        result
    }

    async fn try_relay(
        &self,
        user_id: &str,
        file: Option<InboundFile>,
    ) -> Result<UploadedImage, RelayError> {
        let settings = ConnectionSettings::load(self.store.as_ref(), user_id).await?;
        if !settings.enabled {
            return Err(RelayError::NotEnabled);
        }
        if !settings.has_credentials() {
            return Err(RelayError::NotConfigured);
        }
        let file = file.ok_or(RelayError::NoFile)?;

        let url = upload_url(&settings.domain).map_err(RelayError::InvalidDomain)?;
        let form = upload_form(file, &settings.album_id);

        let started = Instant::now();
        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, settings.api_key.trim())
            .multipart(form)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(RelayError::Transport)?;

        let status = response.status();
        let body = response.bytes().await.map_err(RelayError::ResponseRead)?;
        histogram!(UPLOAD_DURATION).record(started.elapsed().as_secs_f64());

        interpret_response(status, &body)
    }
}

fn upload_form(file: InboundFile, album_id: &str) -> Form {
    let InboundFile { filename, body } = file;

    let mut form = Form::new().part(
        SOURCE_FIELD,
        Part::stream(body).file_name(filename.clone()),
    );
    if !album_id.is_empty() {
        form = form.text(ALBUM_ID_FIELD, album_id.to_string());
    }
    form.text(TITLE_FIELD, filename)
}

/// Maps Chevereto's answer onto the relay contract. Every field is checked
/// before it is trusted.
pub fn interpret_response(status: StatusCode, body: &[u8]) -> Result<UploadedImage, RelayError> {
    if !status.is_success() {
        // A readable error message is preferred, but any body is acceptable.
        let message = serde_json::from_slice::<Value>(body).ok().and_then(|parsed| {
            parsed
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(String::from)
        });

        return Err(match message {
            Some(message) => RelayError::Remote(message),
            None => RelayError::RemoteStatus(status.as_u16()),
        });
    }

    let parsed: Value = serde_json::from_slice(body).map_err(RelayError::MalformedResponse)?;

    let image = parsed
        .get("image")
        .and_then(Value::as_object)
        .ok_or(RelayError::MissingImage)?;

    let url = image
        .get("url")
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
        .ok_or(RelayError::MissingImageUrl)?;

    Ok(UploadedImage {
        url: url.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{StubChevereto, refused_url};
    use config_store::MemoryConfigStore;
    use reqwest::Method;

    const IMAGE_RESPONSE: &str = r#"{"status_code":200,"image":{"name":"x","url":"https://img.example.com/x.png","url_viewer":"https://img.example.com/image/x"}}"#;

    async fn relay_for(settings: ConnectionSettings) -> Relay {
        relay_with_timeout(settings, Duration::from_secs(10)).await
    }

    async fn relay_with_timeout(settings: ConnectionSettings, timeout: Duration) -> Relay {
        let store: Arc<dyn ConfigStore> = Arc::new(MemoryConfigStore::new());
        settings.save(store.as_ref(), "user1").await.unwrap();
        Relay::new(reqwest::Client::new(), store, timeout)
    }

    fn enabled(domain: &str, album_id: &str) -> ConnectionSettings {
        ConnectionSettings {
            enabled: true,
            domain: domain.into(),
            api_key: "K".into(),
            album_id: album_id.into(),
        }
    }

    fn png() -> InboundFile {
        InboundFile::new("photo.png", b"\x89PNG\r\n\x1a\n01".to_vec())
    }

    #[tokio::test]
    async fn test_disabled_integration_makes_no_request() {
        let stub = StubChevereto::spawn(StatusCode::OK, IMAGE_RESPONSE).await;
        let relay = relay_for(ConnectionSettings {
            enabled: false,
            ..enabled(&stub.url, "")
        })
        .await;

        let err = relay.relay_upload("user1", Some(png())).await.unwrap_err();
        assert!(matches!(err, RelayError::NotEnabled));
        assert!(err.to_string().contains("not enabled"));
        assert!(stub.requests().is_empty());

        // Unknown users have nothing enabled either
        let err = relay.relay_upload("user2", Some(png())).await.unwrap_err();
        assert!(matches!(err, RelayError::NotEnabled));
    }

    #[tokio::test]
    async fn test_incomplete_settings_are_refused() {
        let stub = StubChevereto::spawn(StatusCode::OK, IMAGE_RESPONSE).await;
        // Saved without going through validation
        let relay = relay_for(ConnectionSettings {
            api_key: " ".into(),
            ..enabled(&stub.url, "")
        })
        .await;

        let err = relay.relay_upload("user1", Some(png())).await.unwrap_err();
        assert!(matches!(err, RelayError::NotConfigured));
        assert!(stub.requests().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let stub = StubChevereto::spawn(StatusCode::OK, IMAGE_RESPONSE).await;
        let relay = relay_for(enabled(&stub.url, "")).await;

        let err = relay.relay_upload("user1", None).await.unwrap_err();
        assert!(matches!(err, RelayError::NoFile));
        assert_eq!(err.to_string(), "No file provided");
        assert!(stub.requests().is_empty());
    }

    #[tokio::test]
    async fn test_successful_upload() {
        let stub = StubChevereto::spawn(StatusCode::OK, IMAGE_RESPONSE).await;
        let relay = relay_for(enabled(&stub.url, "album42")).await;

        let image = relay.relay_upload("user1", Some(png())).await.unwrap();
        assert_eq!(image.url, "https://img.example.com/x.png");

        let requests = stub.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.api_key.as_deref(), Some("K"));
        assert_eq!(request.field_names(), vec!["source", "album_id", "title"]);

        let source = request.field("source").unwrap();
        assert_eq!(source.file_name.as_deref(), Some("photo.png"));
        assert_eq!(source.data, b"\x89PNG\r\n\x1a\n01");
        assert_eq!(request.field("album_id").unwrap().data, b"album42");
        assert_eq!(request.field("title").unwrap().data, b"photo.png");
    }

    #[tokio::test]
    async fn test_album_is_omitted_when_empty() {
        let stub = StubChevereto::spawn(StatusCode::OK, IMAGE_RESPONSE).await;
        let relay = relay_for(enabled(&stub.url, "")).await;

        relay.relay_upload("user1", Some(png())).await.unwrap();
        assert_eq!(stub.requests()[0].field_names(), vec!["source", "title"]);
    }

    #[tokio::test]
    async fn test_remote_error_message_is_passed_through() {
        let stub = StubChevereto::spawn(
            StatusCode::BAD_REQUEST,
            r#"{"status_code":400,"error":{"message":"invalid file","code":310}}"#,
        )
        .await;
        let relay = relay_for(enabled(&stub.url, "")).await;

        let err = relay.relay_upload("user1", Some(png())).await.unwrap_err();
        assert_eq!(err.to_string(), "Chevereto error: invalid file");
    }

    #[tokio::test]
    async fn test_missing_url_in_response() {
        let stub = StubChevereto::spawn(StatusCode::OK, r#"{"image":{}}"#).await;
        let relay = relay_for(enabled(&stub.url, "")).await;

        let err = relay.relay_upload("user1", Some(png())).await.unwrap_err();
        assert!(matches!(err, RelayError::MissingImageUrl));
        assert_eq!(err.to_string(), "No image URL in Chevereto response");
    }

    #[tokio::test]
    async fn test_upload_is_bounded_by_timeout() {
        let stub = StubChevereto::spawn_with_delay(
            StatusCode::OK,
            IMAGE_RESPONSE,
            Duration::from_secs(5),
        )
        .await;
        let relay = relay_with_timeout(enabled(&stub.url, ""), Duration::from_millis(300)).await;

        let err = relay.relay_upload("user1", Some(png())).await.unwrap_err();
        assert!(matches!(err, RelayError::Transport(_)));
        assert_eq!(
            err.to_string(),
            "Upload to Chevereto failed: request timed out"
        );
    }

    #[tokio::test]
    async fn test_unreachable_instance() {
        let relay = relay_for(enabled(&refused_url().await, "")).await;

        let err = relay.relay_upload("user1", Some(png())).await.unwrap_err();
        assert!(matches!(err, RelayError::Transport(_)));
        assert_eq!(
            err.to_string(),
            "Upload to Chevereto failed: could not connect to server"
        );
    }

    #[test]
    fn test_error_responses() {
        let err = interpret_response(StatusCode::INTERNAL_SERVER_ERROR, b"<html>oops</html>")
            .unwrap_err();
        assert!(matches!(err, RelayError::RemoteStatus(500)));
        assert_eq!(err.to_string(), "Chevereto returned status 500");

        // error.message must be a string inside an object
        for body in [
            r#"{"error":"bad"}"#,
            r#"{"error":{"message":7}}"#,
            r#"{"error":{}}"#,
            r#"[]"#,
        ] {
            assert!(matches!(
                interpret_response(StatusCode::BAD_REQUEST, body.as_bytes()),
                Err(RelayError::RemoteStatus(400))
            ));
        }

        // An error status wins even when the body looks like a success
        assert!(matches!(
            interpret_response(StatusCode::FORBIDDEN, IMAGE_RESPONSE.as_bytes()),
            Err(RelayError::RemoteStatus(403))
        ));
    }

    #[test]
    fn test_success_responses() {
        assert_eq!(
            interpret_response(StatusCode::OK, IMAGE_RESPONSE.as_bytes()).unwrap(),
            UploadedImage {
                url: "https://img.example.com/x.png".to_string()
            }
        );
        // Any 2xx is a success
        assert!(interpret_response(StatusCode::CREATED, IMAGE_RESPONSE.as_bytes()).is_ok());

        assert!(matches!(
            interpret_response(StatusCode::OK, b"not json"),
            Err(RelayError::MalformedResponse(_))
        ));
        for body in [r#"{"status_code":200}"#, r#"{"image":"x.png"}"#, r#"{"image":null}"#] {
            assert!(matches!(
                interpret_response(StatusCode::OK, body.as_bytes()),
                Err(RelayError::MissingImage)
            ));
        }
        for body in [r#"{"image":{}}"#, r#"{"image":{"url":""}}"#, r#"{"image":{"url":1}}"#] {
            assert!(matches!(
                interpret_response(StatusCode::OK, body.as_bytes()),
                Err(RelayError::MissingImageUrl)
            ));
        }
    }
}
