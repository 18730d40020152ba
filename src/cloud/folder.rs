use serde::Deserialize;
use tracing::info;

use super::client::{ApiCode, CloudClient, res_code_ok};
use super::error::{CloudError, Result};
use super::node::{FileHandle, string_or_number};
use super::resolve::{join_path, split_path};
use super::transport::ApiRequest;

#[derive(Debug, Deserialize)]
struct CreateFolderResp {
    #[serde(default, rename = "res_code")]
    code: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "string_or_number")]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl ApiCode for CreateFolderResp {
    fn is_success(&self) -> bool {
        res_code_ok(self.code.as_ref())
    }
}

impl CloudClient {
    /// Create a folder named `name` directly under `parent_id`
    pub async fn create_folder(&self, parent_id: &str, name: &str) -> Result<FileHandle> {
        let request = ApiRequest::post(self.web_api("/api/open/file/createFolder.action"))
            .param("parentFolderId", parent_id)
            .param("folderName", name);

        let resp: CreateFolderResp = self.call(request).await?;
        let id = resp.id.ok_or_else(|| {
            CloudError::protocol(format!("no id returned for new folder {}", name), "")
        })?;

        info!("Created folder {} ({}) under {}", name, id, parent_id);
        Ok(FileHandle::folder(id, resp.name.unwrap_or_else(|| name.to_string())))
    }

    /// Make sure a folder exists at `path`, creating its last segment if needed
    ///
    /// The parent must already exist. An existing folder of the same name is
    /// returned as-is; an existing file of that name is an error.
    pub async fn mkdir(&self, path: &str) -> Result<FileHandle> {
        let segments = split_path(path)?;
        let Some((name, parents)) = segments.split_last() else {
            return Ok(FileHandle::root());
        };
        if parents.is_empty() {
            if let Some(known) = FileHandle::known_folder(name) {
                return Ok(known);
            }
        }

        let parent = self.stat(&join_path(parents)).await?;
        if !parent.is_folder {
            return Err(CloudError::InvalidPath {
                path: path.to_string(),
            });
        }

        let existing = self
            .list(&parent.id, 1)
            .await?
            .into_iter()
            .find(|child| child.name == *name);
        match existing {
            Some(folder) if folder.is_folder => Ok(folder),
            Some(_) => Err(CloudError::protocol(
                format!("{} exists and is a file", path),
                "",
            )),
            None => self.create_folder(&parent.id, name).await,
        }
    }
}
