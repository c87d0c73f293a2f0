//! Album provisioning.
//!
//! Resolves an album source to a directory under the galleries root, creating
//! the directory and its index document the first time. An existing album is
//! never touched, so a title edited by hand survives later resolutions.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use deunicode::deunicode;
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::config::{default_categories, paths, AlbumSettings};
use crate::domain::{Album, AlbumFrontMatter, AlbumSource};

/// Errors from album provisioning
#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("Album name '{0}' has no usable characters")]
    InvalidName(String),

    #[error("Failed to create album directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write album index {path}: {source}")]
    WriteIndex {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to render album front matter: {0}")]
    FrontMatter(#[from] serde_yaml::Error),
}

/// Creates album directories under a galleries root
#[derive(Debug, Clone)]
pub struct AlbumProvisioner {
    base_dir: PathBuf,
    timezone: Tz,
    categories: Vec<String>,
}

impl AlbumProvisioner {
    /// Provisioner with the default categories
    pub fn new(base_dir: impl Into<PathBuf>, timezone: Tz) -> Self {
        Self {
            base_dir: base_dir.into(),
            timezone,
            categories: default_categories(),
        }
    }

    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    pub fn from_config(settings: &AlbumSettings) -> Self {
        Self::new(&settings.galleries_dir, settings.timezone)
            .with_categories(settings.categories.clone())
    }

    /// Galleries root this provisioner writes under
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve an album as of now
    pub async fn resolve(&self, source: &AlbumSource) -> Result<Album, ProvisioningError> {
        self.resolve_at(source, Utc::now()).await
    }

    /// Resolve an album as of `now`, creating it if absent
    pub async fn resolve_at(
        &self,
        source: &AlbumSource,
        now: DateTime<Utc>,
    ) -> Result<Album, ProvisioningError> {
        let (key, title) = self.album_key(source, now)?;
        let path = self.base_dir.join(&key);

        if fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false) {
            tracing::debug!(album = %key, "Album already exists");
            return Ok(Album {
                key,
                title,
                path,
                created: false,
            });
        }

        fs::create_dir_all(&path)
            .await
            .map_err(|source| ProvisioningError::CreateDir {
                path: path.clone(),
                source,
            })?;

        let front = AlbumFrontMatter {
            title: title.clone(),
            categories: self.categories.clone(),
        };
        let created = self.write_index(&path, &front).await?;

        if created {
            tracing::info!(album = %key, path = %path.display(), "Created album");
        }

        Ok(Album {
            key,
            title,
            path,
            created,
        })
    }

    /// Key and title for a source. Dates use the provisioner's timezone.
    pub fn album_key(
        &self,
        source: &AlbumSource,
        now: DateTime<Utc>,
    ) -> Result<(String, String), ProvisioningError> {
        match source {
            AlbumSource::Named(name) => {
                let key = slugify(name);
                if key.is_empty() {
                    return Err(ProvisioningError::InvalidName(name.clone()));
                }
                Ok((key, name.clone()))
            }
            AlbumSource::Today => {
                let local = now.with_timezone(&self.timezone);
                Ok((
                    local.format("%Y-%m-%d").to_string(),
                    local.format("%b %d, %Y").to_string(),
                ))
            }
        }
    }

    /// Write the index document unless one already exists.
    /// Returns true when this call wrote it.
    async fn write_index(
        &self,
        dir: &Path,
        front: &AlbumFrontMatter,
    ) -> Result<bool, ProvisioningError> {
        let index_path = dir.join(paths::ALBUM_INDEX);
        let document = front.render()?;

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&index_path)
            .await
        {
            Ok(file) => file,
            // Lost a race with a concurrent session; the other writer owns it
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(source) => {
                return Err(ProvisioningError::WriteIndex {
                    path: index_path,
                    source,
                })
            }
        };

        file.write_all(document.as_bytes())
            .await
            .map_err(|source| ProvisioningError::WriteIndex {
                path: index_path.clone(),
                source,
            })?;
        file.flush()
            .await
            .map_err(|source| ProvisioningError::WriteIndex {
                path: index_path,
                source,
            })?;

        Ok(true)
    }
}

/// Lowercase ASCII slug. Non-ASCII text is transliterated first, then
/// alphanumerics are kept and every other run becomes one `-`.
pub fn slugify(name: &str) -> String {
    let ascii = deunicode(name);
    let mut slug = String::with_capacity(ascii.len());
    let mut pending_dash = false;

    for c in ascii.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Trip to Japan"), "trip-to-japan");
        assert_eq!(slugify("  Hello,   World!  "), "hello-world");
        assert_eq!(slugify("already-slugged"), "already-slugged");
        assert_eq!(slugify("Café 2024"), "cafe-2024");
        assert_eq!(slugify("Zürich Trip"), "zurich-trip");
        assert_eq!(slugify("東京"), "dong-jing");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_today_key_uses_timezone() {
        // 23:30 UTC on March 5th is already March 6th in Tokyo
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 23, 30, 0).unwrap();

        let utc = AlbumProvisioner::new("/tmp", Tz::UTC);
        let (key, title) = utc.album_key(&AlbumSource::Today, now).unwrap();
        assert_eq!(key, "2024-03-05");
        assert_eq!(title, "Mar 05, 2024");

        let tokyo = AlbumProvisioner::new("/tmp", chrono_tz::Asia::Tokyo);
        let (key, _) = tokyo.album_key(&AlbumSource::Today, now).unwrap();
        assert_eq!(key, "2024-03-06");
    }

    #[test]
    fn test_named_key_rejects_empty_slug() {
        let provisioner = AlbumProvisioner::new("/tmp", Tz::UTC);
        let result = provisioner.album_key(&AlbumSource::named("???"), Utc::now());
        assert!(matches!(result, Err(ProvisioningError::InvalidName(_))));
    }

    #[tokio::test]
    async fn test_resolve_creates_once() {
        let temp = TempDir::new().unwrap();
        let provisioner = AlbumProvisioner::new(temp.path(), Tz::UTC);
        let source = AlbumSource::named("Trip to Japan");

        let first = provisioner.resolve(&source).await.unwrap();
        assert!(first.created);
        assert_eq!(first.key, "trip-to-japan");
        assert_eq!(first.path, temp.path().join("trip-to-japan"));

        let index = std::fs::read_to_string(first.path.join("index.md")).unwrap();
        let front = AlbumFrontMatter::parse(&index).unwrap();
        assert_eq!(front.title, "Trip to Japan");
        assert_eq!(front.categories, vec!["travel", "tech", "foo", "bar", "baz"]);

        let second = provisioner.resolve(&source).await.unwrap();
        assert!(!second.created);
        assert_eq!(second.path, first.path);
    }

    #[tokio::test]
    async fn test_existing_index_is_preserved() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("beach");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("index.md"), "---\ntitle: Edited\n---\n").unwrap();

        let provisioner = AlbumProvisioner::new(temp.path(), Tz::UTC);
        let album = provisioner.resolve(&AlbumSource::named("Beach")).await.unwrap();

        assert!(!album.created);
        let index = std::fs::read_to_string(dir.join("index.md")).unwrap();
        assert_eq!(index, "---\ntitle: Edited\n---\n");
    }
}
