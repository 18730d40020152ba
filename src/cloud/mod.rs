//! Client for the Cloud189 storage service.
//!
//! [`CloudClient`] covers listing, path resolution, folder creation,
//! server-side copy/move/delete, downloads and the resumable chunked upload
//! pipeline. All network traffic goes through the [`Transport`] seam.

pub mod account;
pub mod batch;
pub mod client;
pub mod download;
pub mod error;
pub mod folder;
pub mod helpers;
pub mod listing;
pub mod multipart;
pub mod node;
pub mod resolve;
pub mod session;
pub mod slicer;
pub mod transport;
pub mod upload;

#[cfg(test)]
mod mock;

pub use account::SignResult;
pub use batch::{BatchOutcome, TaskKind};
pub use client::{ClientOptions, CloudClient};
pub use error::{CloudError, Result};
pub use helpers::{format_size, parse_request_header};
pub use listing::{PAGE_SIZE, Page};
pub use multipart::SignedUploadTarget;
pub use node::{FileHandle, KNOWN_FOLDERS, ROOT_ID};
pub use resolve::{join_path, split_path};
pub use session::UploadSession;
pub use slicer::{LocalFile, LocalPart, SLICE_SIZE, UploadableFile, UploadablePart};
pub use transport::{ApiRequest, ApiResponse, Authenticator, HttpTransport, Transport};
pub use upload::{CommitMode, FileRecord, UploadResult};
