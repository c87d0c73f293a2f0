//! Gallery storage: album directories and their published manifests.
//!
//! # Storage Layout
//!
//! ```text
//! <galleries>/
//! └── <album-key>/              # slug or YYYY-MM-DD
//!     ├── index.md              # front matter, written once
//!     ├── IMG_0001.JPG          # uploaded media
//!     └── IMG_0001.WAV          # voice note, removed after the agent ran
//!
//! <manifest output>/
//! └── <album-key>/
//!     └── data.json             # [{file, date}], rebuilt on every build
//! ```

pub mod albums;
pub mod manifest;

pub use albums::{slugify, AlbumProvisioner, ProvisioningError};
pub use manifest::{ManifestError, ManifestGenerator, ManifestRecord, ManifestReport};
