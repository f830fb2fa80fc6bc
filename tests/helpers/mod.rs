//! Shared fixtures for integration tests: a local OverDrive-like HTTP
//! server and descriptor builders.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path as UrlPath, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use tokio::net::TcpListener;

pub const MEDIA_ID: &str = "6D2A3F00-1111-2222-3333-444455556666";

pub const LICENSE_BODY: &str = "<License>\n<SignedInfo><ClientID>11111111-2222-3333-4444-555555555555</ClientID><ContentID>6D2A</ContentID></SignedInfo>\n<Signature>c2lnbmF0dXJl</Signature>\n</License>\n";

pub const LICENSE_CLIENT_ID: &str = "11111111-2222-3333-4444-555555555555";

/// One request seen by the server
#[derive(Debug, Clone)]
pub struct Recorded {
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
}

#[derive(Default)]
pub struct ServerState {
    pub requests: Mutex<Vec<Recorded>>,
    pub license_body: Mutex<String>,
    pub license_status: Mutex<u16>,
    pub files: Mutex<HashMap<String, Vec<u8>>>,
    pub failing: Mutex<HashSet<String>>,
}

impl ServerState {
    fn record(&self, path: String, query: HashMap<String, String>, headers: &HeaderMap) {
        let headers = headers
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect();
        self.requests.lock().unwrap().push(Recorded { path, query, headers });
    }
}

pub struct TestServer {
    pub base_url: String,
    pub state: Arc<ServerState>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        let state = Arc::new(ServerState::default());
        *state.license_body.lock().unwrap() = LICENSE_BODY.to_string();
        *state.license_status.lock().unwrap() = 200;

        let router = Router::new()
            .route("/license", get(license_endpoint))
            .route("/dl/*file", get(file_endpoint))
            .route("/return", get(return_endpoint))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let server = axum::serve(listener, router).with_graceful_shutdown(async {
            shutdown_rx.await.ok();
        });
        tokio::spawn(async move {
            server.await.unwrap();
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        Self {
            base_url: format!("http://{}", addr),
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn serve_file(&self, name: &str, content: &[u8]) {
        self.state
            .files
            .lock()
            .unwrap()
            .insert(name.to_string(), content.to_vec());
    }

    pub fn fail_file(&self, name: &str) {
        self.state.failing.lock().unwrap().insert(name.to_string());
    }

    pub fn set_license(&self, status: u16, body: &str) {
        *self.state.license_status.lock().unwrap() = status;
        *self.state.license_body.lock().unwrap() = body.to_string();
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, prefix: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.path.starts_with(prefix))
            .collect()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }
}

async fn license_endpoint(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    state.record("/license".to_string(), query, &headers);
    let status = *state.license_status.lock().unwrap();
    let body = state.license_body.lock().unwrap().clone();
    (StatusCode::from_u16(status).unwrap(), body)
}

async fn file_endpoint(
    State(state): State<Arc<ServerState>>,
    UrlPath(file): UrlPath<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    state.record(format!("/dl/{}", file), HashMap::new(), &headers);

    if state.failing.lock().unwrap().contains(&file) {
        return (StatusCode::INTERNAL_SERVER_ERROR, Vec::new());
    }
    match state.files.lock().unwrap().get(&file) {
        Some(content) => (StatusCode::OK, content.clone()),
        None => (StatusCode::NOT_FOUND, Vec::new()),
    }
}

async fn return_endpoint(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> impl IntoResponse {
    state.record("/return".to_string(), HashMap::new(), &headers);
    StatusCode::OK
}

/// Build a descriptor document
///
/// `parts` holds `(vendor filename, declared size)` pairs.
pub fn odm_document(base_url: &str, parts: &[(&str, u64)], cover_url: Option<&str>) -> String {
    let part_elements: String = parts
        .iter()
        .enumerate()
        .map(|(i, (name, size))| {
            format!(
                r#"<Part number="{n}" filesize="{size}" name="Part {n}" filename="{name}"/>"#,
                n = i + 1,
                size = size,
                name = name
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="utf-8" ?>
<OverDriveMedia id="{id}" ODMVersion="1.2">
<License><AcquisitionUrl>{base}/license</AcquisitionUrl></License>
<![CDATA[<Metadata><ContentType>Audiobook</ContentType><Title>The Long Way</Title><CoverUrl>{cover}</CoverUrl><Creators><Creator role="Narrator">Sam Reader</Creator><Creator role="Author">Ada Writer</Creator></Creators></Metadata>]]>
<Formats>
<Format name="MP3 Audiobook">
<Quality level="High"/>
<Protocols><Protocol method="download" baseurl="{base}/dl"/></Protocols>
<Parts count="{count}">{parts}</Parts>
</Format>
</Formats>
<EarlyReturnURL>{base}/return</EarlyReturnURL>
</OverDriveMedia>"#,
        id = MEDIA_ID,
        base = base_url,
        cover = cover_url.unwrap_or_default(),
        count = parts.len(),
        parts = part_elements
    )
}

/// Write a descriptor into `dir` and return its path
pub fn write_odm(dir: &Path, document: &str) -> PathBuf {
    let path = dir.join("book.odm");
    std::fs::write(&path, document).unwrap();
    path
}
