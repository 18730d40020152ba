//! Remote file and folder handles.

use serde::{Deserialize, Deserializer, Serialize};

/// Id of the account root folder
pub const ROOT_ID: &str = "-11";
pub const ROOT_NAME: &str = "/";

/// Well-known folders reachable directly under the root without a listing
pub const KNOWN_FOLDERS: &[(&str, &str)] = &[
    ("MyFiles", "-11"),
    ("我的图片", "-12"),
    ("我的视频", "-13"),
    ("我的音乐", "-14"),
    ("我的文档", "-15"),
    ("我的应用", "-16"),
];

/// A remote file or folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileHandle {
    pub id: String,
    pub name: String,
    pub is_folder: bool,
    pub size: Option<u64>,
    pub md5: Option<String>,
    pub created_at: Option<String>,
    pub modified_at: Option<String>,
}

impl FileHandle {
    pub fn root() -> Self {
        Self::folder(ROOT_ID, ROOT_NAME)
    }

    pub fn folder(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_folder: true,
            size: None,
            md5: None,
            created_at: None,
            modified_at: None,
        }
    }

    /// Look up a well-known folder alias
    pub fn known_folder(name: &str) -> Option<Self> {
        KNOWN_FOLDERS
            .iter()
            .find(|(alias, _)| *alias == name)
            .map(|(alias, id)| Self::folder(*id, *alias))
    }
}

/// Listing entry as the service emits it
#[derive(Debug, Deserialize)]
pub(crate) struct RawEntry {
    #[serde(default, deserialize_with = "string_or_number")]
    id: Option<String>,
    name: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    md5: Option<String>,
    #[serde(default, rename = "createDate")]
    create_date: Option<String>,
    #[serde(default, rename = "lastOpTime")]
    last_op_time: Option<String>,
}

impl RawEntry {
    /// Convert to a handle; entries without an id or name are dropped
    pub(crate) fn into_handle(self, is_folder: bool) -> Option<FileHandle> {
        Some(FileHandle {
            id: self.id?,
            name: self.name?,
            is_folder,
            size: if is_folder { None } else { self.size },
            md5: self.md5.filter(|m| !m.is_empty()),
            created_at: self.create_date,
            modified_at: self.last_op_time,
        })
    }
}

/// Ids arrive as numbers from some endpoints and strings from others
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_and_known_folders() {
        let root = FileHandle::root();
        assert_eq!(root.id, ROOT_ID);
        assert_eq!(root.name, "/");
        assert!(root.is_folder);

        let docs = FileHandle::known_folder("我的文档").unwrap();
        assert_eq!(docs.id, "-15");
        assert_eq!(docs.name, "我的文档");
        assert!(FileHandle::known_folder("Documents").is_none());
    }

    #[test]
    fn test_raw_entry_ids() {
        let numeric: RawEntry =
            serde_json::from_str(r#"{"id": 41234, "name": "a.txt", "size": 12, "md5": "ABC"}"#)
                .unwrap();
        let handle = numeric.into_handle(false).unwrap();
        assert_eq!(handle.id, "41234");
        assert_eq!(handle.size, Some(12));
        assert_eq!(handle.md5.as_deref(), Some("ABC"));

        let string: RawEntry =
            serde_json::from_str(r#"{"id": "-12", "name": "pics", "size": 99}"#).unwrap();
        let handle = string.into_handle(true).unwrap();
        assert_eq!(handle.id, "-12");
        assert!(handle.is_folder);
        assert_eq!(handle.size, None);

        let nameless: RawEntry = serde_json::from_str(r#"{"id": 1}"#).unwrap();
        assert!(nameless.into_handle(false).is_none());
    }
}
