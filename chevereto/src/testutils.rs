//! In-process stand-in for a Chevereto instance.
use crate::client::{API_KEY_HEADER, UPLOAD_PATH};
use axum::Router;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::routing::any;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedField {
    pub name: String,
    pub file_name: Option<String>,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: Method,
    pub api_key: Option<String>,
    pub fields: Vec<RecordedField>,
}

impl RecordedRequest {
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn field(&self, name: &str) -> Option<&RecordedField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

struct StubState {
    status: StatusCode,
    body: String,
    delay: Duration,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Answers every request on the upload endpoint with a fixed status and body
/// and records what it received. Other paths answer 404.
pub struct StubChevereto {
    pub url: String,
    state: Arc<StubState>,
    handle: JoinHandle<()>,
}

impl StubChevereto {
    pub async fn spawn(status: StatusCode, body: &str) -> Self {
        Self::spawn_with_delay(status, body, Duration::ZERO).await
    }

    pub async fn spawn_with_delay(status: StatusCode, body: &str, delay: Duration) -> Self {
        let state = Arc::new(StubState {
            status,
            body: body.to_string(),
            delay,
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route(
                UPLOAD_PATH,
                any(handle_upload).layer(DefaultBodyLimit::disable()),
            )
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        StubChevereto {
            url: format!("http://127.0.0.1:{port}"),
            state,
            handle,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }
}

impl Drop for StubChevereto {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Returns a local URL nothing is listening on.
pub async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}

async fn handle_upload(
    State(state): State<Arc<StubState>>,
    method: Method,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> (StatusCode, String) {
    let mut fields = Vec::new();
    if let Ok(mut multipart) = multipart {
        while let Ok(Some(field)) = multipart.next_field().await {
            let name = field.name().unwrap_or_default().to_string();
            let file_name = field.file_name().map(String::from);
            let data = field.bytes().await.unwrap().to_vec();
            fields.push(RecordedField {
                name,
                file_name,
                data,
            });
        }
    }

    let api_key = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    state.requests.lock().unwrap().push(RecordedRequest {
        method,
        api_key,
        fields,
    });

    tokio::time::sleep(state.delay).await;
    (state.status, state.body.clone())
}
