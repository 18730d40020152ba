use indicatif::ProgressBar;
use serde::Deserialize;
use tracing::info;

use super::client::{ApiCode, CloudClient, upload_code_ok};
use super::error::{CloudError, Result};
use super::node::string_or_number;
use super::slicer::{UploadableFile, UploadablePart};
use super::transport::ApiRequest;

/// Canonical remote record returned by a commit
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FileRecord {
    #[serde(default, rename = "userFileId", deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(default, rename = "file_size")]
    pub size: u64,
    #[serde(default, rename = "file_name")]
    pub name: String,
    #[serde(default, rename = "file_md_5")]
    pub md5: String,
    #[serde(default, rename = "create_date")]
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
struct CommitResp {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    file: FileRecord,
}

impl ApiCode for CommitResp {
    fn is_success(&self) -> bool {
        upload_code_ok(self.code.as_deref())
    }
}

/// How an upload session is completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitMode {
    /// Every part was transferred
    Transferred,
    /// The service already held the content; nothing was transferred
    FastUpload,
}

impl CommitMode {
    /// Value of the `lazyCheck` commit parameter
    pub fn lazy_check(self) -> &'static str {
        match self {
            Self::Transferred => "0",
            Self::FastUpload => "1",
        }
    }
}

#[derive(Debug)]
pub enum UploadResult {
    Uploaded(FileRecord),
    FastUploaded(FileRecord),
}

impl UploadResult {
    pub fn record(&self) -> &FileRecord {
        match self {
            Self::Uploaded(record) | Self::FastUploaded(record) => record,
        }
    }
}

/// A commit without a file id did not produce a usable remote file
fn ensure_file_id(file: &dyn UploadableFile, record: &FileRecord) -> Result<()> {
    if record.id.is_none() {
        return Err(CloudError::protocol(
            format!("commit of {} returned no file id", file.name()),
            format!("{:?}", record),
        ));
    }
    Ok(())
}

impl CloudClient {
    /// Declare an upload session complete
    pub async fn commit(
        &self,
        file: &dyn UploadableFile,
        upload_id: &str,
        mode: CommitMode,
    ) -> Result<FileRecord> {
        let request = ApiRequest::post(self.upload_api("/person/commitMultiUploadFile"))
            .param("fileMd5", file.file_md5())
            .param("sliceMd5", file.slice_md5())
            .param("lazyCheck", mode.lazy_check())
            .param("uploadFileId", upload_id);

        let resp: CommitResp = self.call(request).await?;
        Ok(resp.file)
    }

    /// Upload a file through a session with progress bar
    ///
    /// Opens a session (or re-checks the one `file` already carries), commits
    /// directly when the service holds the content, and otherwise transfers
    /// `parts` in order before committing. The first failing part aborts the
    /// upload. Callers resuming an upload pass only the parts still missing.
    pub async fn upload<P: UploadablePart>(
        &self,
        file: &mut dyn UploadableFile,
        parts: &[P],
        pb: Option<&ProgressBar>,
    ) -> Result<UploadResult> {
        let upload_id = match file.upload_id().map(str::to_owned) {
            Some(upload_id) => {
                self.check_session(file, &upload_id).await?;
                upload_id
            }
            None => self.open_session(file).await?.upload_id,
        };

        if file.exists() {
            info!("{} exists on the server, fast upload", file.name());
            let record = self.commit(file, &upload_id, CommitMode::FastUpload).await?;
            ensure_file_id(file, &record)?;
            if let Some(pb) = pb {
                pb.set_length(file.size());
                pb.set_position(file.size());
                pb.finish_with_message(format!("Fast uploaded {}", file.name()));
            }
            return Ok(UploadResult::FastUploaded(record));
        }

        if let Some(pb) = pb {
            pb.set_length(file.size());
            pb.set_message(format!("Uploading {}", file.name()));
        }

        for part in parts {
            self.upload_part(part, &upload_id).await.map_err(|e| {
                if let Some(pb) = pb {
                    pb.abandon_with_message(format!("Failed {}", file.name()));
                }
                e
            })?;

            if let Some(pb) = pb {
                pb.inc(part.len());
            }
        }

        let record = self.commit(file, &upload_id, CommitMode::Transferred).await?;
        ensure_file_id(file, &record)?;

        if let Some(pb) = pb {
            pb.finish_with_message(format!("Uploaded {}", file.name()));
        }

        info!(
            "Successfully uploaded {} ({} bytes) as {}",
            file.name(),
            file.size(),
            record.id.as_deref().unwrap_or_default()
        );

        Ok(UploadResult::Uploaded(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::mock::mock_client;
    use crate::cloud::multipart::tests::{FakePart, urls_body};
    use crate::cloud::session::tests::{FakeFile, init_body};
    use crate::cloud::transport::{ApiResponse, Method};

    fn commit_body() -> String {
        serde_json::json!({
            "code": "SUCCESS",
            "file": {
                "userFileId": 71234,
                "file_size": 9,
                "file_name": "report.pdf",
                "file_md_5": "file-md5",
                "create_date": "2024-05-01 10:00:00",
            }
        })
        .to_string()
    }

    /// Routes upload API calls; `exists` controls init, `fail_part` a 500 on that PUT
    fn upload_service(
        exists: bool,
        fail_part: Option<usize>,
    ) -> impl Fn(&ApiRequest) -> ApiResponse + Send + Sync + 'static {
        upload_service_with(exists, fail_part, commit_body())
    }

    fn upload_service_with(
        exists: bool,
        fail_part: Option<usize>,
        commit: String,
    ) -> impl Fn(&ApiRequest) -> ApiResponse + Send + Sync + 'static {
        move |req| {
            if req.method == Method::PUT {
                let number: usize = req.url.rsplit('/').next().unwrap().parse().unwrap();
                return if Some(number) == fail_part {
                    ApiResponse::new(500, "part storage unavailable")
                } else {
                    ApiResponse::ok("")
                };
            }
            if req.url.ends_with("/person/initMultiUpload")
                || req.url.ends_with("/person/checkTransSecond")
            {
                ApiResponse::ok(init_body("U1", exists))
            } else if req.url.ends_with("/person/getMultiUploadUrls") {
                ApiResponse::ok(urls_body(req))
            } else if req.url.ends_with("/person/commitMultiUploadFile") {
                ApiResponse::ok(commit.clone())
            } else {
                panic!("unexpected request to {}", req.url)
            }
        }
    }

    #[tokio::test]
    async fn test_multi_part_upload_sequence() {
        let (client, transport, _) = mock_client(upload_service(false, None));
        let mut file = FakeFile::new(3);
        let parts: Vec<FakePart> = (0..3).map(FakePart::new).collect();

        let result = client.upload(&mut file, &parts, None).await.unwrap();
        assert!(matches!(result, UploadResult::Uploaded(_)));
        assert_eq!(result.record().id.as_deref(), Some("71234"));
        assert_eq!(result.record().name, "report.pdf");

        let requests = transport.requests();
        assert!(requests[0].url.ends_with("/person/initMultiUpload"));
        assert_eq!(requests[0].param_value("lazyCheck"), Some("1"));

        // URL fetch and PUT alternate, part numbers 1..=3
        for n in 1..=3 {
            let fetch = &requests[2 * n - 1];
            let put = &requests[2 * n];
            assert!(fetch.url.ends_with("/person/getMultiUploadUrls"));
            assert!(fetch.param_value("partInfo").unwrap().starts_with(&format!("{}-", n)));
            assert_eq!(put.method, Method::PUT);
            assert_eq!(put.url, format!("https://signed.test/part/{}", n));
        }

        let commit = &requests[7];
        assert!(commit.url.ends_with("/person/commitMultiUploadFile"));
        assert_eq!(commit.param_value("lazyCheck"), Some("0"));
        assert_eq!(commit.param_value("uploadFileId"), Some("U1"));
        assert_eq!(requests.len(), 8);
    }

    #[tokio::test]
    async fn test_fast_upload_skips_parts() {
        let (client, transport, _) = mock_client(upload_service(true, None));
        let mut file = FakeFile::new(1);
        let parts = vec![FakePart::new(0)];

        let result = client.upload(&mut file, &parts, None).await.unwrap();
        assert!(matches!(result, UploadResult::FastUploaded(_)));

        let init = &transport.requests_to("initMultiUpload")[0];
        assert_eq!(init.param_value("fileMd5"), Some("file-md5"));
        assert_eq!(init.param_value("sliceMd5"), Some("slice-md5"));
        assert!(transport.requests_to("getMultiUploadUrls").is_empty());

        let commits = transport.requests_to("commitMultiUploadFile");
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].param_value("lazyCheck"), Some("1"));
    }

    #[tokio::test]
    async fn test_single_part_without_existing_content() {
        let (client, transport, _) = mock_client(upload_service(false, None));
        let mut file = FakeFile::new(1);
        let parts = vec![FakePart::new(0)];

        client.upload(&mut file, &parts, None).await.unwrap();

        assert_eq!(transport.requests_to("getMultiUploadUrls").len(), 1);
        let commits = transport.requests_to("commitMultiUploadFile");
        assert_eq!(commits[0].param_value("lazyCheck"), Some("0"));
    }

    #[tokio::test]
    async fn test_failed_part_aborts_upload() {
        let (client, transport, _) = mock_client(upload_service(false, Some(2)));
        let mut file = FakeFile::new(3);
        let parts: Vec<FakePart> = (0..3).map(FakePart::new).collect();

        let err = client.upload(&mut file, &parts, None).await.unwrap_err();
        match err {
            CloudError::Protocol { body, .. } => assert!(body.contains("part storage unavailable")),
            other => panic!("unexpected error: {other:?}"),
        }

        assert_eq!(transport.requests_to("getMultiUploadUrls").len(), 2);
        assert!(transport.requests_to("signed.test/part/3").is_empty());
        assert!(transport.requests_to("commitMultiUploadFile").is_empty());
    }

    #[tokio::test]
    async fn test_resumed_upload_checks_existing_session() {
        let (client, transport, _) = mock_client(upload_service(false, None));
        let mut file = FakeFile::new(3);
        file.upload_id = Some("U1".to_string());

        // Part 1 went up in an earlier run
        let parts: Vec<FakePart> = (1..3).map(FakePart::new).collect();
        client.upload(&mut file, &parts, None).await.unwrap();

        assert!(transport.requests_to("initMultiUpload").is_empty());
        let checks = transport.requests_to("checkTransSecond");
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].param_value("uploadFileId"), Some("U1"));

        let infos: Vec<String> = transport
            .requests_to("getMultiUploadUrls")
            .iter()
            .map(|r| r.param_value("partInfo").unwrap().to_string())
            .collect();
        assert_eq!(infos, vec!["2-md5-1", "3-md5-2"]);
    }

    #[tokio::test]
    async fn test_resumed_upload_with_existing_content_commits_fast() {
        let (client, transport, _) = mock_client(upload_service(true, None));
        let mut file = FakeFile::new(3);
        file.upload_id = Some("U1".to_string());
        let parts: Vec<FakePart> = (1..3).map(FakePart::new).collect();

        let result = client.upload(&mut file, &parts, None).await.unwrap();
        assert!(matches!(result, UploadResult::FastUploaded(_)));

        assert!(transport.requests_to("initMultiUpload").is_empty());
        assert_eq!(transport.requests_to("checkTransSecond").len(), 1);
        assert!(transport.requests_to("getMultiUploadUrls").is_empty());
        assert!(transport.requests().iter().all(|r| r.method != Method::PUT));

        let commits = transport.requests_to("commitMultiUploadFile");
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].param_value("lazyCheck"), Some("1"));
        assert_eq!(commits[0].param_value("uploadFileId"), Some("U1"));
    }

    #[tokio::test]
    async fn test_fast_upload_without_file_id_fails() {
        let commit = r#"{"code":"SUCCESS","file":{"file_name":"report.pdf"}}"#.to_string();
        let (client, _, _) = mock_client(upload_service_with(true, None, commit));
        let mut file = FakeFile::new(1);
        let parts = vec![FakePart::new(0)];

        let err = client.upload(&mut file, &parts, None).await.unwrap_err();
        match err {
            CloudError::Protocol { message, .. } => assert!(message.contains("no file id")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fast_upload_finishes_progress() {
        let (client, _, _) = mock_client(upload_service(true, None));
        let mut file = FakeFile::new(1);
        let pb = ProgressBar::hidden();

        client.upload(&mut file, &[FakePart::new(0)], Some(&pb)).await.unwrap();
        assert!(pb.is_finished());
        assert_eq!(pb.position(), 5);
    }

    #[tokio::test]
    async fn test_progress_tracks_parts() {
        let (client, _, _) = mock_client(upload_service(false, None));
        let mut file = FakeFile::new(2);
        let parts: Vec<FakePart> = (0..2).map(FakePart::new).collect();
        let pb = ProgressBar::hidden();

        client.upload(&mut file, &parts, Some(&pb)).await.unwrap();
        assert_eq!(pb.length(), Some(10));
        assert_eq!(pb.position(), 10);
    }

    #[test]
    fn test_commit_mode_lazy_check() {
        assert_eq!(CommitMode::Transferred.lazy_check(), "0");
        assert_eq!(CommitMode::FastUpload.lazy_check(), "1");
    }
}
