//! Server-side copy, move and delete tasks.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::client::{ApiCode, CloudClient, res_code_ok};
use super::error::{CloudError, Result};
use super::node::{FileHandle, string_or_number};
use super::transport::ApiRequest;

const TASK_CONFLICT: i64 = 2;
const TASK_DONE: i64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Copy,
    Move,
    Delete,
}

impl TaskKind {
    /// Value of the `type` task parameter
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Copy => "COPY",
            Self::Move => "MOVE",
            Self::Delete => "DELETE",
        }
    }
}

/// Per-path result of a batch operation
pub type BatchOutcome<'a> = Vec<(&'a str, Result<FileHandle>)>;

#[derive(Debug, Serialize)]
struct TaskInfo<'a> {
    #[serde(rename = "fileId")]
    file_id: &'a str,
    #[serde(rename = "fileName")]
    file_name: &'a str,
    #[serde(rename = "isFolder")]
    is_folder: u8,
}

#[derive(Debug, Deserialize)]
struct CreateTaskResp {
    #[serde(default, rename = "res_code")]
    code: Option<serde_json::Value>,
    #[serde(default, rename = "taskId", deserialize_with = "string_or_number")]
    task_id: Option<String>,
}

impl ApiCode for CreateTaskResp {
    fn is_success(&self) -> bool {
        res_code_ok(self.code.as_ref())
    }
}

#[derive(Debug, Deserialize)]
struct CheckTaskResp {
    #[serde(default, rename = "res_code")]
    code: Option<serde_json::Value>,
    #[serde(default, rename = "taskStatus")]
    task_status: Option<i64>,
}

impl ApiCode for CheckTaskResp {
    fn is_success(&self) -> bool {
        res_code_ok(self.code.as_ref())
    }
}

impl CloudClient {
    /// Copy `sources` into the folder at `target`
    pub async fn copy<'a>(&self, sources: &'a [String], target: &str) -> Result<BatchOutcome<'a>> {
        let folder = self.target_folder(target).await?;
        self.run_batch(TaskKind::Copy, sources, Some(&folder.id))
            .await
    }

    /// Move `sources` into the folder at `target`
    pub async fn move_to<'a>(
        &self,
        sources: &'a [String],
        target: &str,
    ) -> Result<BatchOutcome<'a>> {
        let folder = self.target_folder(target).await?;
        self.run_batch(TaskKind::Move, sources, Some(&folder.id))
            .await
    }

    /// Delete `paths`
    pub async fn remove<'a>(&self, paths: &'a [String]) -> Result<BatchOutcome<'a>> {
        self.run_batch(TaskKind::Delete, paths, None).await
    }

    /// Submit a batch task and return its id
    pub async fn create_batch_task(
        &self,
        kind: TaskKind,
        files: &[FileHandle],
        target_id: Option<&str>,
    ) -> Result<String> {
        let infos: Vec<TaskInfo> = files
            .iter()
            .map(|file| TaskInfo {
                file_id: &file.id,
                file_name: &file.name,
                is_folder: u8::from(file.is_folder),
            })
            .collect();
        let task_infos = serde_json::to_string(&infos)
            .map_err(|e| CloudError::protocol(format!("cannot encode task: {}", e), ""))?;

        let mut request = ApiRequest::post(self.web_api("/api/open/batch/createBatchTask.action"))
            .param("type", kind.as_str())
            .param("taskInfos", task_infos);
        if let Some(target_id) = target_id {
            request = request.param("targetFolderId", target_id);
        }

        let resp: CreateTaskResp = self.call(request).await?;
        resp.task_id.filter(|id| !id.is_empty()).ok_or_else(|| {
            CloudError::protocol(format!("no task id returned for {}", kind.as_str()), "")
        })
    }

    /// Poll a batch task until the service reports it finished
    pub async fn wait_batch_task(&self, kind: TaskKind, task_id: &str) -> Result<()> {
        for poll in 0..self.options.max_task_polls {
            if poll > 0 {
                tokio::time::sleep(self.options.task_poll_interval).await;
            }

            let request = ApiRequest::post(self.web_api("/api/open/batch/checkBatchTask.action"))
                .param("type", kind.as_str())
                .param("taskId", task_id);
            let resp: CheckTaskResp = self.call(request).await?;

            match resp.task_status {
                Some(TASK_DONE) => return Ok(()),
                Some(TASK_CONFLICT) => {
                    return Err(CloudError::protocol(
                        format!("{} task {} hit a name conflict", kind.as_str(), task_id),
                        "",
                    ));
                }
                status => debug!("Task {} status {:?}", task_id, status),
            }
        }

        Err(CloudError::protocol(
            format!(
                "{} task {} unfinished after {} checks",
                kind.as_str(),
                task_id,
                self.options.max_task_polls
            ),
            "",
        ))
    }

    async fn target_folder(&self, target: &str) -> Result<FileHandle> {
        let folder = self.stat(target).await?;
        if !folder.is_folder {
            return Err(CloudError::InvalidPath {
                path: target.to_string(),
            });
        }
        Ok(folder)
    }

    /// Resolve every path, then run one task over those that resolved
    async fn run_batch<'a>(
        &self,
        kind: TaskKind,
        paths: &'a [String],
        target_id: Option<&str>,
    ) -> Result<BatchOutcome<'a>> {
        let mut outcome = self.stat_many(paths).await;

        // Root and well-known folders have negative ids and cannot be touched
        for (path, result) in outcome.iter_mut() {
            if matches!(result, Ok(handle) if handle.id.starts_with('-')) {
                warn!("{} is a system folder, skipped", path);
                *result = Err(CloudError::InvalidPath {
                    path: (*path).to_string(),
                });
            }
        }

        let files: Vec<FileHandle> = outcome
            .iter()
            .filter_map(|(_, result)| result.as_ref().ok().cloned())
            .collect();
        if files.is_empty() {
            warn!("Nothing to {}", kind.as_str());
            return Ok(outcome);
        }

        let task_id = self.create_batch_task(kind, &files, target_id).await?;
        self.wait_batch_task(kind, &task_id).await?;

        info!(
            "{} task {} finished for {} item(s)",
            kind.as_str(),
            task_id,
            files.len()
        );
        Ok(outcome)
    }
}
