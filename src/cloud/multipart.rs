//! Uploading individual parts through signed URLs.

use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, info};

use super::client::{ApiCode, CloudClient, upload_code_ok};
use super::error::{CloudError, Result};
use super::helpers::{parse_request_header, part_info, part_key};
use super::slicer::UploadablePart;
use super::transport::ApiRequest;

/// Single-use URL and headers authorizing the transfer of one part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUploadTarget {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, Deserialize)]
struct UploadUrl {
    #[serde(rename = "requestURL")]
    request_url: String,
    #[serde(default, rename = "requestHeader")]
    request_header: String,
}

#[derive(Debug, Deserialize)]
struct UrlResp {
    #[serde(default)]
    code: Option<String>,
    #[serde(default, rename = "uploadUrls")]
    upload_urls: HashMap<String, UploadUrl>,
}

impl ApiCode for UrlResp {
    fn is_success(&self) -> bool {
        upload_code_ok(self.code.as_deref())
    }
}

impl CloudClient {
    /// Request the signed target for one part
    ///
    /// Targets are part-specific and single-use, so one is fetched right
    /// before each transfer.
    pub async fn signed_target(
        &self,
        part: &dyn UploadablePart,
        upload_id: &str,
    ) -> Result<SignedUploadTarget> {
        let number = part.index() + 1;
        let request = ApiRequest::post(self.upload_api("/person/getMultiUploadUrls"))
            .param("partInfo", part_info(number, part.name()))
            .param("uploadFileId", upload_id);

        let mut resp: UrlResp = self.call(request).await?;
        let key = part_key(number);
        let upload = resp.upload_urls.remove(&key).ok_or_else(|| {
            let mut returned: Vec<_> = resp.upload_urls.keys().cloned().collect();
            returned.sort();
            CloudError::protocol(
                format!("no signed URL under {}", key),
                format!("returned keys: [{}]", returned.join(", ")),
            )
        })?;

        Ok(SignedUploadTarget {
            url: upload.request_url,
            headers: parse_request_header(&upload.request_header)?,
        })
    }

    /// Transfer one part of an open upload session
    ///
    /// No retry happens here; a failed transfer is returned to the caller.
    pub async fn upload_part(&self, part: &dyn UploadablePart, upload_id: &str) -> Result<()> {
        if upload_id.is_empty() {
            return Err(CloudError::Session {
                message: "part upload attempted without an upload identifier".to_string(),
            });
        }

        let number = part.index() + 1;
        let target = self.signed_target(part, upload_id).await?;

        debug!("Uploading part {} ({} bytes)", number, part.len());

        let mut request = ApiRequest::put(target.url, part.bytes().await?);
        for (key, value) in &target.headers {
            request = request.header(key, value);
        }

        let response = self.transport.send(request).await?;
        if response.status != 200 {
            return Err(CloudError::protocol(
                format!("upload of part {} failed with status {}", number, response.status),
                response.text(),
            ));
        }

        info!("Part {} upload completed", number);
        Ok(())
    }
}
