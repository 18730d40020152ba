//! Upload session negotiation.

use serde::Deserialize;
use tracing::{debug, info};

use super::client::{ApiCode, CloudClient, upload_code_ok};
use super::error::{CloudError, Result};
use super::slicer::UploadableFile;
use super::transport::ApiRequest;

/// Server-side handle grouping the parts of one file upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub upload_id: String,
    /// The service already holds identical content
    pub exists: bool,
    pub host: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UploadInfo {
    #[serde(default, rename = "uploadHost")]
    upload_host: Option<String>,
    #[serde(default, rename = "uploadFileId")]
    upload_file_id: Option<String>,
    #[serde(default, rename = "fileDataExists")]
    file_data_exists: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct InitResp {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    data: UploadInfo,
}

impl ApiCode for InitResp {
    fn is_success(&self) -> bool {
        upload_code_ok(self.code.as_deref())
    }
}

impl CloudClient {
    /// Open an upload session for `file` under its parent folder
    ///
    /// Single-slice files send their fingerprints up front so the service can
    /// detect existing content; larger files defer checking to commit.
    pub async fn open_session(&self, file: &mut dyn UploadableFile) -> Result<UploadSession> {
        let mut request = ApiRequest::post(self.upload_api("/person/initMultiUpload"))
            .param("parentFolderId", file.parent_id())
            .param("fileName", file.name())
            .param("fileSize", file.size())
            .param("sliceSize", file.slice_size());

        request = if file.slice_count() > 1 {
            request.param("lazyCheck", 1)
        } else {
            request
                .param("fileMd5", file.file_md5())
                .param("sliceMd5", file.slice_md5())
        };

        let resp: InitResp = self.call(request).await?;
        let upload_id = resp
            .data
            .upload_file_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| CloudError::Session {
                message: format!("no upload identifier issued for {}", file.name()),
            })?;
        let exists = resp.data.file_data_exists == Some(1);

        file.set_upload_id(upload_id.clone());
        file.set_exists(exists);

        info!(
            "Opened upload session {} for {} ({} bytes, {} part(s))",
            upload_id,
            file.name(),
            file.size(),
            file.slice_count()
        );

        Ok(UploadSession {
            upload_id,
            exists,
            host: resp.data.upload_host,
        })
    }

    /// Re-check whether the service already holds the content of a session
    /// opened earlier
    pub async fn check_session(&self, file: &mut dyn UploadableFile, upload_id: &str) -> Result<bool> {
        if upload_id.is_empty() {
            return Err(CloudError::Session {
                message: format!("empty upload identifier for {}", file.name()),
            });
        }

        let request = ApiRequest::post(self.upload_api("/person/checkTransSecond"))
            .param("fileMd5", file.file_md5())
            .param("sliceMd5", file.slice_md5())
            .param("uploadFileId", upload_id);

        let resp: InitResp = self.call(request).await?;
        let exists = resp.data.file_data_exists == Some(1);
        file.set_exists(exists);

        debug!("Checked upload session {}: exists={}", upload_id, exists);
        Ok(exists)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cloud::mock::mock_client;
    use crate::cloud::transport::ApiResponse;

    /// In-memory file with fixed fingerprints; five bytes per slice
    pub(crate) struct FakeFile {
        pub size: u64,
        pub slices: usize,
        pub upload_id: Option<String>,
        pub exists: bool,
    }

    impl FakeFile {
        pub(crate) fn new(slices: usize) -> Self {
            Self {
                size: slices as u64 * 5,
                slices,
                upload_id: None,
                exists: false,
            }
        }
    }

    impl UploadableFile for FakeFile {
        fn name(&self) -> &str {
            "report.pdf"
        }
        fn size(&self) -> u64 {
            self.size
        }
        fn parent_id(&self) -> &str {
            "-11"
        }
        fn file_md5(&self) -> &str {
            "file-md5"
        }
        fn slice_md5(&self) -> &str {
            "slice-md5"
        }
        fn slice_count(&self) -> usize {
            self.slices
        }
        fn upload_id(&self) -> Option<&str> {
            self.upload_id.as_deref()
        }
        fn set_upload_id(&mut self, upload_id: String) {
            self.upload_id = Some(upload_id);
        }
        fn exists(&self) -> bool {
            self.exists
        }
        fn set_exists(&mut self, exists: bool) {
            self.exists = exists;
        }
    }

    pub(crate) fn init_body(upload_id: &str, exists: bool) -> String {
        serde_json::json!({
            "code": "SUCCESS",
            "data": {
                "uploadType": 1,
                "uploadHost": "https://upload.test",
                "uploadFileId": upload_id,
                "fileDataExists": if exists { 1 } else { 0 },
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_single_slice_sends_fingerprints() {
        let (client, transport, _) = mock_client(|_| ApiResponse::ok(init_body("U1", true)));
        let mut file = FakeFile::new(1);

        let session = client.open_session(&mut file).await.unwrap();
        assert_eq!(session.upload_id, "U1");
        assert!(session.exists);
        assert_eq!(session.host.as_deref(), Some("https://upload.test"));
        assert_eq!(file.upload_id.as_deref(), Some("U1"));
        assert!(file.exists);

        let request = &transport.requests()[0];
        assert!(request.url.ends_with("/person/initMultiUpload"));
        assert_eq!(request.param_value("parentFolderId"), Some("-11"));
        assert_eq!(request.param_value("fileName"), Some("report.pdf"));
        assert_eq!(request.param_value("fileSize"), Some("5"));
        assert_eq!(request.param_value("sliceSize"), Some("10485760"));
        assert_eq!(request.param_value("fileMd5"), Some("file-md5"));
        assert_eq!(request.param_value("sliceMd5"), Some("slice-md5"));
        assert_eq!(request.param_value("lazyCheck"), None);
    }

    #[tokio::test]
    async fn test_multi_slice_defers_check() {
        let (client, transport, _) = mock_client(|_| ApiResponse::ok(init_body("U2", false)));
        let mut file = FakeFile::new(4);

        let session = client.open_session(&mut file).await.unwrap();
        assert!(!session.exists);

        let request = &transport.requests()[0];
        assert_eq!(request.param_value("lazyCheck"), Some("1"));
        assert_eq!(request.param_value("fileMd5"), None);
        assert_eq!(request.param_value("sliceMd5"), None);
    }

    #[tokio::test]
    async fn test_missing_upload_id_is_fatal() {
        let (client, _, _) = mock_client(|_| {
            ApiResponse::ok(r#"{"code":"SUCCESS","data":{"fileDataExists":0}}"#)
        });
        let mut file = FakeFile::new(1);

        let err = client.open_session(&mut file).await.unwrap_err();
        assert!(matches!(err, CloudError::Session { .. }));
        assert_eq!(file.upload_id, None);
    }

    #[tokio::test]
    async fn test_rejected_code_is_protocol_error() {
        let (client, _, _) = mock_client(|_| {
            ApiResponse::ok(r#"{"code":"InvalidSignature","msg":"bad signature"}"#)
        });
        let mut file = FakeFile::new(1);

        let err = client.open_session(&mut file).await.unwrap_err();
        match err {
            CloudError::Protocol { body, .. } => assert!(body.contains("bad signature")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_check_session_targets_existing_id() {
        let (client, transport, _) = mock_client(|_| ApiResponse::ok(init_body("U3", true)));
        let mut file = FakeFile::new(2);

        assert!(client.check_session(&mut file, "U3").await.unwrap());
        assert!(file.exists);

        let request = &transport.requests()[0];
        assert!(request.url.ends_with("/person/checkTransSecond"));
        assert_eq!(request.param_value("uploadFileId"), Some("U3"));
        assert_eq!(request.param_value("fileMd5"), Some("file-md5"));
        assert_eq!(request.param_value("sliceMd5"), Some("slice-md5"));
    }
}
