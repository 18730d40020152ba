use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use super::error::{CloudError, Result};
use super::transport::{ApiRequest, Authenticator, HttpTransport, Transport};
use crate::config::Config;

/// Code the upload API reports on success
const SUCCESS_CODE: &str = "SUCCESS";

const TASK_POLL_INTERVAL: Duration = Duration::from_secs(1);
const MAX_TASK_POLLS: usize = 120;

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub web_url: String,
    pub upload_url: String,
    pub mobile_url: String,
    pub lenient_listing: bool,
    pub max_pages: usize,
    pub max_session_retries: usize,
    /// Delay between status checks of a server-side batch task
    pub task_poll_interval: Duration,
    pub max_task_polls: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ClientOptions {
    fn from(config: &Config) -> Self {
        Self {
            web_url: config.web_url.clone(),
            upload_url: config.upload_url.clone(),
            mobile_url: config.mobile_url.clone(),
            lenient_listing: config.lenient_listing,
            max_pages: config.max_pages,
            max_session_retries: config.max_session_retries,
            task_poll_interval: TASK_POLL_INTERVAL,
            max_task_polls: MAX_TASK_POLLS,
        }
    }
}

/// Client for the Cloud189 web and upload APIs
///
/// Cloning is cheap; clones share the same transport.
#[derive(Clone)]
pub struct CloudClient {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) auth: Arc<dyn Authenticator>,
    pub(crate) options: ClientOptions,
}

impl CloudClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        auth: Arc<dyn Authenticator>,
        options: ClientOptions,
    ) -> Self {
        Self {
            transport,
            auth,
            options,
        }
    }

    /// Build a client backed by reqwest from loaded configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = Arc::new(HttpTransport::new(config)?);
        Ok(Self::new(http.clone(), http, ClientOptions::from(config)))
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub(crate) fn web_api(&self, path: &str) -> String {
        format!("{}{}", self.options.web_url, path)
    }

    pub(crate) fn upload_api(&self, path: &str) -> String {
        format!("{}{}", self.options.upload_url, path)
    }

    /// Send a request whose JSON body must parse as `T` and carry a success code
    pub(crate) async fn call<T>(&self, request: ApiRequest) -> Result<T>
    where
        T: DeserializeOwned + ApiCode,
    {
        let url = request.url.clone();
        let response = self.transport.send(request).await?;
        let body = response.text();

        if !response.is_ok() {
            return Err(CloudError::protocol(
                format!("{} returned status {}", url, response.status),
                body,
            ));
        }

        let parsed: T = serde_json::from_str(&body).map_err(|e| {
            CloudError::protocol(format!("unexpected response from {}: {}", url, e), body.clone())
        })?;

        if !parsed.is_success() {
            return Err(CloudError::protocol(format!("{} rejected the request", url), body));
        }

        Ok(parsed)
    }
}

/// Response bodies that carry a status code field
pub(crate) trait ApiCode {
    fn is_success(&self) -> bool;
}

/// Upload API bodies report `code: "SUCCESS"`; a missing code is accepted
pub(crate) fn upload_code_ok(code: Option<&str>) -> bool {
    code.is_none_or(|c| c == SUCCESS_CODE)
}

/// Web API bodies report `res_code: 0` as a number or string
pub(crate) fn res_code_ok(code: Option<&serde_json::Value>) -> bool {
    match code {
        None => true,
        Some(serde_json::Value::Number(n)) => n.as_i64() == Some(0),
        Some(serde_json::Value::String(s)) => s == "0" || s == SUCCESS_CODE,
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_code_checks() {
        assert!(upload_code_ok(None));
        assert!(upload_code_ok(Some("SUCCESS")));
        assert!(!upload_code_ok(Some("InvalidSignature")));

        assert!(res_code_ok(None));
        assert!(res_code_ok(Some(&json!(0))));
        assert!(res_code_ok(Some(&json!("0"))));
        assert!(!res_code_ok(Some(&json!(1))));
        assert!(!res_code_ok(Some(&json!("FileAlreadyExists"))));
    }

    #[test]
    fn test_options_from_config() {
        let config = Config {
            web_url: "http://web.local".to_string(),
            lenient_listing: false,
            max_pages: 7,
            ..Config::default()
        };
        let options = ClientOptions::from(&config);
        assert_eq!(options.web_url, "http://web.local");
        assert_eq!(options.upload_url, "https://upload.cloud.189.cn");
        assert!(!options.lenient_listing);
        assert_eq!(options.max_pages, 7);
        assert_eq!(options.max_session_retries, 1);
    }
}
