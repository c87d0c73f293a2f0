//! Album types.
//!
//! An album is a directory under the galleries root, named by its key, with an
//! index document whose front matter carries the display title.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where an album key comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlbumSource {
    /// Explicit album name, slugified into the key
    Named(String),

    /// Today's date in the configured timezone
    Today,
}

impl AlbumSource {
    /// Album source for an explicit name
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Album source from an optional name (absent means today)
    pub fn from_option(name: Option<String>) -> Self {
        match name {
            Some(name) => Self::Named(name),
            None => Self::Today,
        }
    }
}

/// A resolved album directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Album {
    /// Directory name under the galleries root (slug or `YYYY-MM-DD`)
    pub key: String,

    /// Human-readable title written to the index document
    pub title: String,

    /// Absolute or base-relative path of the album directory
    pub path: PathBuf,

    /// True when this resolution created the directory and its index
    pub created: bool,
}

/// Front matter block of an album's index document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumFrontMatter {
    pub title: String,
    pub categories: Vec<String>,
}

impl AlbumFrontMatter {
    /// Render the full index document (front matter only, no body)
    pub fn render(&self) -> Result<String, serde_yaml::Error> {
        let yaml = serde_yaml::to_string(self)?;
        Ok(format!("---\n{}---\n", yaml))
    }

    /// Parse the front matter block out of an index document
    pub fn parse(document: &str) -> Option<Self> {
        let rest = document.trim_start().strip_prefix("---")?;
        let end = rest.find("\n---")?;
        serde_yaml::from_str(&rest[..end]).ok()
    }
}
