//! Splitting local files into fixed-size parts.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use md5::{Digest, Md5};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};
use tracing::debug;

use super::error::{CloudError, Result};

/// Size of every part except the last (10MB); advertised to the service
pub const SLICE_SIZE: u64 = 10 * 1024 * 1024;

/// A file the upload pipeline can negotiate and commit
pub trait UploadableFile: Send + Sync {
    fn name(&self) -> &str;
    fn size(&self) -> u64;
    fn parent_id(&self) -> &str;
    /// Whole-file MD5, lowercase hex
    fn file_md5(&self) -> &str;
    fn slice_md5(&self) -> &str;
    fn slice_count(&self) -> usize;

    fn slice_size(&self) -> u64 {
        SLICE_SIZE
    }

    fn upload_id(&self) -> Option<&str>;
    fn set_upload_id(&mut self, upload_id: String);
    fn exists(&self) -> bool;
    fn set_exists(&mut self, exists: bool);
}

/// One part of an [`UploadableFile`]
#[async_trait]
pub trait UploadablePart: Send + Sync {
    /// 0-based position within the file
    fn index(&self) -> usize;
    fn name(&self) -> &str;
    fn len(&self) -> u64;
    async fn bytes(&self) -> Result<Vec<u8>>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct LocalPart {
    path: PathBuf,
    index: usize,
    offset: u64,
    len: u64,
    name: String,
}

impl LocalPart {
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

#[async_trait]
impl UploadablePart for LocalPart {
    fn index(&self) -> usize {
        self.index
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> u64 {
        self.len
    }

    async fn bytes(&self) -> Result<Vec<u8>> {
        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(self.offset)).await?;

        let mut buffer = vec![0u8; self.len as usize];
        file.read_exact(&mut buffer).await?;
        Ok(buffer)
    }
}

/// A local file with its fingerprints computed
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
    name: String,
    size: u64,
    parent_id: String,
    slice_size: u64,
    file_md5: String,
    slice_md5: String,
    parts: Vec<LocalPart>,
    upload_id: Option<String>,
    exists: bool,
}

impl LocalFile {
    /// Read `path` once, fingerprinting the whole file and each slice
    pub async fn open(path: impl AsRef<Path>, parent_id: impl Into<String>) -> Result<Self> {
        Self::open_with_slice_size(path.as_ref(), parent_id.into(), SLICE_SIZE).await
    }

    pub(crate) async fn open_with_slice_size(
        path: &Path,
        parent_id: String,
        slice_size: u64,
    ) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                CloudError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("{} has no file name", path.display()),
                ))
            })?;

        let mut file = tokio::fs::File::open(path).await?;
        let mut whole = Md5::new();
        let mut parts = Vec::new();
        let mut slice_digests = Vec::new();
        let mut offset = 0u64;
        let mut buffer = vec![0u8; slice_size as usize];

        loop {
            let bytes_read = read_full(&mut file, &mut buffer).await?;
            if bytes_read == 0 && !parts.is_empty() {
                break; // EOF
            }

            let chunk = &buffer[..bytes_read];
            whole.update(chunk);
            let digest = Md5::digest(chunk);

            parts.push(LocalPart {
                path: path.to_path_buf(),
                index: parts.len(),
                offset,
                len: bytes_read as u64,
                name: STANDARD.encode(digest),
            });
            slice_digests.push(format!("{:X}", digest));
            offset += bytes_read as u64;

            if (bytes_read as u64) < slice_size {
                break;
            }
        }

        let file_md5 = format!("{:x}", whole.finalize());
        let slice_md5 = if slice_digests.len() > 1 {
            format!("{:x}", Md5::digest(slice_digests.join("\n")))
        } else {
            file_md5.clone()
        };

        debug!(
            "Sliced {} ({} bytes) into {} part(s), md5 {}",
            path.display(),
            offset,
            parts.len(),
            file_md5
        );

        Ok(Self {
            path: path.to_path_buf(),
            name,
            size: offset,
            parent_id,
            slice_size,
            file_md5,
            slice_md5,
            parts,
            upload_id: None,
            exists: false,
        })
    }

    /// Resume against an upload session opened earlier
    pub fn with_upload_id(mut self, upload_id: impl Into<String>) -> Self {
        self.upload_id = Some(upload_id.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn parts(&self) -> &[LocalPart] {
        &self.parts
    }
}

impl UploadableFile for LocalFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn parent_id(&self) -> &str {
        &self.parent_id
    }

    fn file_md5(&self) -> &str {
        &self.file_md5
    }

    fn slice_md5(&self) -> &str {
        &self.slice_md5
    }

    fn slice_count(&self) -> usize {
        self.parts.len()
    }

    fn slice_size(&self) -> u64 {
        self.slice_size
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

/// Fill `buffer` unless EOF comes first; returns the bytes read
async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buffer: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        let n = reader.read(&mut buffer[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
