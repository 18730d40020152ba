use indicatif::ProgressBar;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

use super::client::{ApiCode, CloudClient, res_code_ok};
use super::error::{CloudError, Result};
use super::node::FileHandle;
use super::transport::ApiRequest;

#[derive(Debug, Deserialize)]
struct DownloadUrlResp {
    #[serde(default, rename = "res_code")]
    code: Option<serde_json::Value>,
    #[serde(default, rename = "fileDownloadUrl")]
    file_download_url: Option<String>,
}

impl ApiCode for DownloadUrlResp {
    fn is_success(&self) -> bool {
        res_code_ok(self.code.as_ref())
    }
}

/// The service hands out protocol-relative URLs
fn normalize_url(url: &str) -> String {
    match url.strip_prefix("//") {
        Some(rest) => format!("https://{}", rest),
        None => url.to_string(),
    }
}

impl CloudClient {
    /// Get a short-lived direct download URL for a file
    pub async fn download_url(&self, file_id: &str) -> Result<String> {
        let request = ApiRequest::get(self.web_api("/api/open/file/getFileDownloadUrl.action"))
            .param("noCache", rand::random::<f64>())
            .param("fileId", file_id);

        let resp: DownloadUrlResp = self.call(request).await?;
        resp.file_download_url
            .filter(|url| !url.is_empty())
            .map(|url| normalize_url(&url))
            .ok_or_else(|| {
                CloudError::protocol(format!("no download URL for file {}", file_id), "")
            })
    }

    /// Download a remote file to `dest` with progress bar, returning the
    /// number of bytes written
    pub async fn download(
        &self,
        file: &FileHandle,
        dest: &Path,
        pb: Option<&ProgressBar>,
    ) -> Result<u64> {
        if file.is_folder {
            return Err(CloudError::protocol(
                format!("{} is a folder and cannot be downloaded", file.name),
                "",
            ));
        }

        let url = self.download_url(&file.id).await?;
        let out = tokio::fs::File::create(dest).await?;
        let written = match pb {
            Some(pb) => {
                pb.set_length(file.size.unwrap_or_default());
                pb.set_message(format!("Downloading {}", file.name));
                let mut sink = pb.wrap_async_write(out);
                let written = self.transport.download(&url, &mut sink).await?;
                pb.finish_with_message(format!("Downloaded {}", file.name));
                written
            }
            None => {
                let mut sink = out;
                self.transport.download(&url, &mut sink).await?
            }
        };

        info!("Downloaded {} to {} ({} bytes)", file.name, dest.display(), written);
        Ok(written)
    }
}
