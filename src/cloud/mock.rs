//! In-memory transport for unit tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::client::{ClientOptions, CloudClient};
use super::error::Result;
use super::transport::{ApiRequest, ApiResponse, Authenticator, Transport};

type Handler = Box<dyn Fn(&ApiRequest) -> ApiResponse + Send + Sync>;

/// Answers every request through a handler and records what was sent
pub(crate) struct MockTransport {
    handler: Handler,
    requests: Mutex<Vec<ApiRequest>>,
    download_body: Vec<u8>,
}

impl MockTransport {
    pub(crate) fn new(handler: impl Fn(&ApiRequest) -> ApiResponse + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
            download_body: b"downloaded content".to_vec(),
        }
    }

    pub(crate) fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Recorded requests whose URL contains `fragment`
    pub(crate) fn requests_to(&self, fragment: &str) -> Vec<ApiRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url.contains(fragment))
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let response = (self.handler)(&request);
        self.requests.lock().unwrap().push(request);
        Ok(response)
    }

    async fn download(&self, url: &str, sink: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<u64> {
        self.requests.lock().unwrap().push(ApiRequest::get(url));
        sink.write_all(&self.download_body).await?;
        sink.flush().await?;
        Ok(self.download_body.len() as u64)
    }
}

#[derive(Default)]
pub(crate) struct CountingAuth {
    refreshes: AtomicUsize,
}

impl CountingAuth {
    pub(crate) fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authenticator for CountingAuth {
    async fn refresh_session(&self) -> Result<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) fn test_options() -> ClientOptions {
    ClientOptions {
        web_url: "https://web.test".to_string(),
        upload_url: "https://upload.test".to_string(),
        mobile_url: "https://m.test".to_string(),
        lenient_listing: true,
        max_pages: 50,
        max_session_retries: 1,
        task_poll_interval: Duration::ZERO,
        max_task_polls: 5,
    }
}

pub(crate) fn mock_client(
    handler: impl Fn(&ApiRequest) -> ApiResponse + Send + Sync + 'static,
) -> (CloudClient, Arc<MockTransport>, Arc<CountingAuth>) {
    mock_client_with(test_options(), handler)
}

pub(crate) fn mock_client_with(
    options: ClientOptions,
    handler: impl Fn(&ApiRequest) -> ApiResponse + Send + Sync + 'static,
) -> (CloudClient, Arc<MockTransport>, Arc<CountingAuth>) {
    let transport = Arc::new(MockTransport::new(handler));
    let auth = Arc::new(CountingAuth::default());
    let client = CloudClient::new(transport.clone(), auth.clone(), options);
    (client, transport, auth)
}

/// JSON body for one listing page
pub(crate) fn list_body(count: usize, folders: &[(&str, &str)], files: &[(&str, &str)]) -> String {
    let entries = |items: &[(&str, &str)]| {
        items
            .iter()
            .map(|(id, name)| serde_json::json!({ "id": id, "name": name }))
            .collect::<Vec<_>>()
    };
    serde_json::json!({
        "res_code": 0,
        "res_message": "成功",
        "fileListAo": {
            "count": count,
            "folderList": entries(folders),
            "fileList": entries(files),
        }
    })
    .to_string()
}
