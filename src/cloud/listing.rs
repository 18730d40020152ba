//! Paginated folder listing and search, guarded against session expiry.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::client::{CloudClient, res_code_ok};
use super::error::{CloudError, Result};
use super::node::{FileHandle, RawEntry};
use super::transport::ApiRequest;

/// Entries requested per page
pub const PAGE_SIZE: usize = 100;

const MEDIA_TYPE_ALL: u8 = 0;
const INVALID_SESSION: &str = "InvalidSessionKey";

/// One page of a listing
#[derive(Debug, Default)]
pub struct Page {
    /// Total entry count the service reports for the whole folder
    pub count: usize,
    pub entries: Vec<FileHandle>,
    /// Raw folder and file records on this page, including ones dropped
    /// for lacking an id or name
    pub received: usize,
}

impl Page {
    fn from_raw(count: usize, folders: Vec<RawEntry>, files: Vec<RawEntry>) -> Self {
        let received = folders.len() + files.len();
        let entries = folders
            .into_iter()
            .filter_map(|f| f.into_handle(true))
            .chain(files.into_iter().filter_map(|f| f.into_handle(false)))
            .collect();
        Self {
            count,
            entries,
            received,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileListAo {
    #[serde(default)]
    count: usize,
    #[serde(default, rename = "fileList")]
    files: Vec<RawEntry>,
    #[serde(default, rename = "folderList")]
    folders: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
struct ListResp {
    #[serde(default, rename = "res_code")]
    code: Option<serde_json::Value>,
    #[serde(default, rename = "fileListAo")]
    data: FileListAo,
}

#[derive(Debug, Deserialize)]
struct SearchResp {
    #[serde(default, rename = "res_code")]
    code: Option<serde_json::Value>,
    #[serde(default)]
    count: usize,
    #[serde(default, rename = "fileList")]
    files: Vec<RawEntry>,
    #[serde(default, rename = "folderList")]
    folders: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
struct ErrorResp {
    #[serde(default, rename = "errorCode")]
    error_code: Option<String>,
}

impl ErrorResp {
    fn is_invalid_session(&self) -> bool {
        self.error_code.as_deref() == Some(INVALID_SESSION)
    }
}

/// A listing body; a missing code field means the body is an error object
trait ListingBody: DeserializeOwned {
    fn code(&self) -> Option<&serde_json::Value>;
    fn into_page(self) -> Page;
}

impl ListingBody for ListResp {
    fn code(&self) -> Option<&serde_json::Value> {
        self.code.as_ref()
    }

    fn into_page(self) -> Page {
        Page::from_raw(self.data.count, self.data.folders, self.data.files)
    }
}

impl ListingBody for SearchResp {
    fn code(&self) -> Option<&serde_json::Value> {
        self.code.as_ref()
    }

    fn into_page(self) -> Page {
        Page::from_raw(self.count, self.folders, self.files)
    }
}

impl CloudClient {
    /// List every entry of a folder, starting at `start_page` (1-based)
    pub async fn list(&self, folder_id: &str, start_page: usize) -> Result<Vec<FileHandle>> {
        self.collect_pages::<ListResp, _>(folder_id, start_page, |page| {
            self.list_request(folder_id, page)
        })
        .await
    }

    /// Fetch a single listing page
    pub async fn list_page(&self, folder_id: &str, page: usize) -> Result<Page> {
        self.fetch_page::<ListResp>(self.list_request(folder_id, page))
            .await
    }

    /// Search a folder for entries whose name matches `name`
    pub async fn search(
        &self,
        folder_id: &str,
        name: &str,
        recursive: bool,
    ) -> Result<Vec<FileHandle>> {
        let build = |page: usize| {
            ApiRequest::get(self.web_api("/api/open/file/searchFiles.action"))
                .param("noCache", rand::random::<f64>())
                .param("folderId", folder_id)
                .param("pageNum", page)
                .param("pageSize", PAGE_SIZE)
                .param("filename", name)
                .param("recursive", if recursive { "1" } else { "0" })
                .param("iconOption", 5)
                .param("descending", true)
                .param("orderBy", "lastOpTime")
        };

        self.collect_pages::<SearchResp, _>(folder_id, 1, build)
            .await
    }

    fn list_request(&self, folder_id: &str, page: usize) -> ApiRequest {
        ApiRequest::get(self.web_api("/api/open/file/listFiles.action"))
            .param("folderId", folder_id)
            .param("pageNum", page)
            .param("pageSize", PAGE_SIZE)
            .param("iconOption", 5)
            .param("descending", true)
            .param("orderBy", "lastOpTime")
            .param("mediaType", MEDIA_TYPE_ALL)
    }

    async fn collect_pages<B, F>(
        &self,
        folder_id: &str,
        start_page: usize,
        build: F,
    ) -> Result<Vec<FileHandle>>
    where
        B: ListingBody,
        F: Fn(usize) -> ApiRequest,
    {
        let start_page = start_page.max(1);
        let skipped = (start_page - 1) * PAGE_SIZE;

        let mut result = Vec::new();
        let mut page = start_page;
        for _ in 0..self.options.max_pages {
            let Page {
                count,
                entries,
                received,
            } = self.fetch_page::<B>(build(page)).await?;
            result.extend(entries);

            if received == 0 || skipped + result.len() >= count {
                debug!(
                    "Listed folder {}: {} entries over {} page(s)",
                    folder_id,
                    result.len(),
                    page - start_page + 1
                );
                return Ok(result);
            }
            page += 1;
        }

        Err(CloudError::PageLimit {
            folder_id: folder_id.to_string(),
            max_pages: self.options.max_pages,
        })
    }

    /// Send a listing request, re-authenticating and replaying it when the
    /// service reports an invalid session
    async fn fetch_page<B: ListingBody>(&self, request: ApiRequest) -> Result<Page> {
        let mut attempts = 0;
        loop {
            let response = self.transport.send(request.clone()).await?;
            let body = response.text();

            let parsed = match serde_json::from_str::<B>(&body).ok() {
                Some(parsed) if parsed.code().is_some() => {
                    if res_code_ok(parsed.code()) {
                        return Ok(parsed.into_page());
                    }
                    if self.options.lenient_listing {
                        debug!("Rejected listing treated as empty: {}", body);
                        return Ok(Page::default());
                    }
                    return Err(CloudError::protocol("listing rejected", body));
                }
                other => other,
            };

            let expired = serde_json::from_str::<ErrorResp>(&body)
                .map(|e| e.is_invalid_session())
                .unwrap_or(false);
            if expired {
                if attempts >= self.options.max_session_retries {
                    return Err(CloudError::SessionExpired { attempts });
                }
                attempts += 1;
                warn!(
                    "Session expired, re-authenticating ({}/{})",
                    attempts, self.options.max_session_retries
                );
                self.auth.refresh_session().await?;
                continue;
            }

            if self.options.lenient_listing {
                debug!("Unrecognized listing body treated as empty: {}", body);
                return Ok(parsed.map(ListingBody::into_page).unwrap_or_default());
            }

            return Err(CloudError::protocol("unexpected listing response", body));
        }
    }
}
