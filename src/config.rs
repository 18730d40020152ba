use anyhow::{Context, Result};
use std::env;

const DEFAULT_WEB_URL: &str = "https://cloud.189.cn";
const DEFAULT_UPLOAD_URL: &str = "https://upload.cloud.189.cn";
const DEFAULT_MOBILE_URL: &str = "https://m.cloud.189.cn";
const DEFAULT_TIMEOUT_SECS: u64 = 300;
const DEFAULT_MAX_PAGES: usize = 1000;
const DEFAULT_MAX_SESSION_RETRIES: usize = 1;

/// Configuration for the Cloud189 client
#[derive(Debug, Clone)]
pub struct Config {
    /// Value of the `COOKIE_LOGIN_USER` cookie, used to re-establish sessions
    pub cookie: Option<String>,
    pub session_key: Option<String>,
    pub web_url: String,
    pub upload_url: String,
    pub mobile_url: String,
    pub timeout_secs: u64,
    /// Treat malformed listing bodies as empty pages instead of errors
    pub lenient_listing: bool,
    pub max_pages: usize,
    pub max_session_retries: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cookie: None,
            session_key: None,
            web_url: DEFAULT_WEB_URL.to_string(),
            upload_url: DEFAULT_UPLOAD_URL.to_string(),
            mobile_url: DEFAULT_MOBILE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            lenient_listing: true,
            max_pages: DEFAULT_MAX_PAGES,
            max_session_retries: DEFAULT_MAX_SESSION_RETRIES,
        }
    }
}

impl Config {
    /// Load configuration from environment variables and .env file
    ///
    /// # Errors
    ///
    /// Returns an error if no credential is configured or a value is invalid
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok(); // Load .env file if it exists

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let cookie = non_empty("CLOUD189_COOKIE");
        let session_key = non_empty("CLOUD189_SESSION_KEY");
        if cookie.is_none() && session_key.is_none() {
            anyhow::bail!(
                "Neither CLOUD189_COOKIE nor CLOUD189_SESSION_KEY found in environment. Please set one in .env file"
            );
        }

        let web_url = Self::validate_url(
            "CLOUD189_WEB_URL",
            non_empty("CLOUD189_WEB_URL").unwrap_or_else(|| DEFAULT_WEB_URL.to_string()),
        )?;
        let upload_url = Self::validate_url(
            "CLOUD189_UPLOAD_URL",
            non_empty("CLOUD189_UPLOAD_URL").unwrap_or_else(|| DEFAULT_UPLOAD_URL.to_string()),
        )?;
        let mobile_url = Self::validate_url(
            "CLOUD189_MOBILE_URL",
            non_empty("CLOUD189_MOBILE_URL").unwrap_or_else(|| DEFAULT_MOBILE_URL.to_string()),
        )?;

        let timeout_secs = match non_empty("CLOUD189_TIMEOUT_SECS") {
            Some(v) => v
                .trim()
                .parse::<u64>()
                .with_context(|| format!("CLOUD189_TIMEOUT_SECS '{}' is not a number", v))?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let lenient_listing = match non_empty("CLOUD189_LENIENT_LISTING") {
            Some(v) => Self::parse_bool("CLOUD189_LENIENT_LISTING", &v)?,
            None => true,
        };

        let max_pages = match non_empty("CLOUD189_MAX_PAGES") {
            Some(v) => Self::parse_cap("CLOUD189_MAX_PAGES", &v)?,
            None => DEFAULT_MAX_PAGES,
        };

        let max_session_retries = match non_empty("CLOUD189_MAX_SESSION_RETRIES") {
            Some(v) => Self::parse_cap("CLOUD189_MAX_SESSION_RETRIES", &v)?,
            None => DEFAULT_MAX_SESSION_RETRIES,
        };

        Ok(Self {
            cookie,
            session_key,
            web_url,
            upload_url,
            mobile_url,
            timeout_secs,
            lenient_listing,
            max_pages,
            max_session_retries,
        })
    }

    /// Validate a base URL and strip its trailing slash
    ///
    /// A bare scheme such as `https://` loses its slashes here and is rejected below.
    fn validate_url(name: &str, url: String) -> Result<String> {
        let url = url.trim().trim_end_matches('/').to_string();

        if !url.starts_with("https://") && !url.starts_with("http://") {
            anyhow::bail!("{} '{}' must start with http:// or https://", name, url);
        }

        if url.contains(char::is_whitespace) {
            anyhow::bail!("{} '{}' contains whitespace", name, url);
        }

        Ok(url)
    }

    fn parse_bool(name: &str, value: &str) -> Result<bool> {
        match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => anyhow::bail!("{} '{}' is not a boolean (use true/false)", name, other),
        }
    }

    /// Parse a positive iteration ceiling
    fn parse_cap(name: &str, value: &str) -> Result<usize> {
        let cap = value
            .trim()
            .parse::<usize>()
            .with_context(|| format!("{} '{}' is not a number", name, value))?;
        if cap == 0 {
            anyhow::bail!("{} must be at least 1", name);
        }
        Ok(cap)
    }
}
