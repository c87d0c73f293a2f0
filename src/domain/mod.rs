//! Domain types for autotag.
//!
//! This module contains the core data structures:
//! - Album: A provisioned gallery directory and its front matter
//! - Upload: Transfer events and media classification

pub mod album;
pub mod upload;

// Re-export commonly used types
pub use album::{Album, AlbumFrontMatter, AlbumSource};
pub use upload::{MediaKind, TransferEvent, UploadCompleted, UploadIncomplete};
