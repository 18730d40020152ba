//! HTTP transport seam.
//!
//! Every call the client makes goes through [`Transport`], and session
//! re-establishment goes through [`Authenticator`]. [`HttpTransport`] is the
//! reqwest-backed implementation of both.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, COOKIE};
use serde::Deserialize;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::error::{CloudError, Result};
use crate::config::Config;

pub use reqwest::Method;

const JSON_ACCEPT: &str = "application/json;charset=UTF-8";

/// A single HTTP exchange, described independently of the HTTP stack
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    /// Query parameters for GET, form fields otherwise
    pub params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    /// Attach session credentials (false for pre-signed URLs)
    pub authenticated: bool,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url, true)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url, true)
    }

    /// Raw PUT to a pre-signed URL; carries no session credentials
    pub fn put(url: impl Into<String>, body: Vec<u8>) -> Self {
        let mut request = Self::new(Method::PUT, url, false);
        request.body = Some(body);
        request
    }

    fn new(method: Method, url: impl Into<String>, authenticated: bool) -> Self {
        Self {
            method,
            url: url.into(),
            params: Vec::new(),
            headers: Vec::new(),
            body: None,
            authenticated,
        }
    }

    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.params.push((key.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, key: &str, value: impl ToString) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    pub fn param_value(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, body)
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse>;

    /// Stream the body at `url` into `sink`, returning the number of bytes written
    async fn download(&self, url: &str, sink: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<u64>;
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Re-run the session handshake after the service reported an invalid session
    async fn refresh_session(&self) -> Result<()>;
}

#[derive(Deserialize)]
struct UserBrief {
    #[serde(rename = "sessionKey")]
    session_key: Option<String>,
}

pub struct HttpTransport {
    client: reqwest::Client,
    web_url: String,
    cookie: Option<String>,
    session_key: RwLock<Option<String>>,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            web_url: config.web_url.clone(),
            cookie: config.cookie.clone(),
            session_key: RwLock::new(config.session_key.clone()),
        })
    }

    fn login_cookie(&self) -> Option<String> {
        self.cookie
            .as_ref()
            .map(|cookie| format!("COOKIE_LOGIN_USER={}", cookie))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let ApiRequest {
            method,
            url,
            params,
            headers,
            body,
            authenticated,
        } = request;

        debug!("{} {}", method, url);

        let mut builder = self.client.request(method.clone(), &url);
        if method == Method::GET {
            builder = builder.query(&params);
        } else if !params.is_empty() {
            builder = builder.form(&params);
        }

        for (key, value) in &headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        if authenticated {
            builder = builder.header(ACCEPT, JSON_ACCEPT);
            if let Some(cookie) = self.login_cookie() {
                builder = builder.header(COOKIE, cookie);
            }
            if let Some(key) = self.session_key.read().await.as_deref() {
                builder = builder.header("SessionKey", key);
            }
        }

        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();

        Ok(ApiResponse { status, body })
    }

    async fn download(&self, url: &str, sink: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<u64> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await?;
            return Err(CloudError::protocol(
                format!("download failed with status {}", status),
                text,
            ));
        }

        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            sink.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        sink.flush().await?;

        Ok(written)
    }
}

#[async_trait]
impl Authenticator for HttpTransport {
    async fn refresh_session(&self) -> Result<()> {
        let cookie = self.login_cookie().ok_or_else(|| {
            CloudError::Auth("session expired and no CLOUD189_COOKIE is configured".to_string())
        })?;

        let url = format!("{}/v2/getUserBriefInfo.action", self.web_url);
        let response = self
            .client
            .get(&url)
            .query(&[("noCache", rand::random::<f64>().to_string())])
            .header(ACCEPT, JSON_ACCEPT)
            .header(COOKIE, cookie)
            .send()
            .await?;

        let text = response.text().await?;
        let brief: UserBrief = serde_json::from_str(&text)
            .map_err(|_| CloudError::Auth(format!("unexpected session response: {}", text)))?;

        let key = brief
            .session_key
            .filter(|key| !key.is_empty())
            .ok_or_else(|| CloudError::Auth("login cookie was rejected".to_string()))?;

        *self.session_key.write().await = Some(key);
        info!("Session re-established");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builders() {
        let request = ApiRequest::get("https://web.test/list")
            .param("folderId", "-11")
            .param("pageNum", 2);

        assert_eq!(request.method, Method::GET);
        assert!(request.authenticated);
        assert_eq!(request.param_value("folderId"), Some("-11"));
        assert_eq!(request.param_value("pageNum"), Some("2"));
        assert_eq!(request.param_value("missing"), None);

        let put = ApiRequest::put("https://signed.test/1", b"abc".to_vec()).header("x-amz", "1");
        assert_eq!(put.method, Method::PUT);
        assert!(!put.authenticated);
        assert_eq!(put.body.as_deref(), Some(&b"abc"[..]));
        assert_eq!(put.headers, vec![("x-amz".to_string(), "1".to_string())]);
    }

    #[test]
    fn test_response_helpers() {
        let response = ApiResponse::new(403, "denied");
        assert!(!response.is_ok());
        assert_eq!(response.text(), "denied");
        assert!(ApiResponse::ok("{}").is_ok());
    }

    #[test]
    fn test_login_cookie_format() {
        let config = Config {
            cookie: Some("abc".to_string()),
            ..Config::default()
        };
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(
            transport.login_cookie().as_deref(),
            Some("COOKIE_LOGIN_USER=abc")
        );
    }
}
