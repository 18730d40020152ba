use thiserror::Error;

/// Errors that can occur while talking to the Cloud189 service
#[derive(Error, Debug)]
pub enum CloudError {
    /// Upload session could not be opened (no upload id issued)
    #[error("Upload session not opened: {message}")]
    Session { message: String },

    /// Network or HTTP-level failure
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Unexpected status or unparseable response body
    #[error("Protocol error: {message}: {body}")]
    Protocol { message: String, body: String },

    /// Remote path did not resolve
    #[error("Not found: {path}")]
    NotFound { path: String },

    /// Remote path is not absolute or contains empty segments
    #[error("Invalid remote path: {path}")]
    InvalidPath { path: String },

    /// Session could not be re-established
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Session still invalid after the allowed number of re-authentications
    #[error("Session still invalid after {attempts} re-authentication attempt(s)")]
    SessionExpired { attempts: usize },

    /// Paginated listing did not terminate within the page ceiling
    #[error("Listing of folder {folder_id} exceeded {max_pages} pages")]
    PageLimit { folder_id: String, max_pages: usize },

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CloudError {
    pub fn protocol(message: impl Into<String>, body: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            body: body.into(),
        }
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound { path } => {
                format!(
                    "Not found: {}\n\nPossible solutions:\n  \
                     1. Check the spelling of every path segment (names are case sensitive)\n  \
                     2. List the parent folder: cloud189 ls <parent>",
                    path
                )
            }
            Self::InvalidPath { path } => {
                format!(
                    "Invalid remote path: {}\n\nRemote paths must be absolute, e.g. /MyFiles/report.pdf",
                    path
                )
            }
            Self::Auth(message) | Self::Session { message } => {
                format!(
                    "{}\n\nPossible solutions:\n  \
                     1. Refresh CLOUD189_COOKIE in .env from a logged-in browser session\n  \
                     2. Remove a stale CLOUD189_SESSION_KEY so a new one is requested",
                    message
                )
            }
            Self::SessionExpired { attempts } => {
                format!(
                    "Session still invalid after {} re-authentication attempt(s)\n\nPossible solutions:\n  \
                     1. Log in again and update CLOUD189_COOKIE\n  \
                     2. Raise CLOUD189_MAX_SESSION_RETRIES if the service is flaky",
                    attempts
                )
            }
            Self::Transport(e) => {
                format!(
                    "Network error: {}\n\nPossible solutions:\n  \
                     1. Check your internet connection\n  \
                     2. Raise CLOUD189_TIMEOUT_SECS for slow links\n  \
                     3. Try again with --max-concurrent 1",
                    e
                )
            }
            _ => self.to_string(),
        }
    }
}

/// Result type for Cloud189 operations
pub type Result<T> = std::result::Result<T, CloudError>;
