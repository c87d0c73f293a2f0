//! Canonical file names and default locations.
//!
//! Single source of truth - import this instead of hardcoding paths.
//!
//! | Location | Owner | Purpose |
//! |----------|-------|---------|
//! | `<galleries>/<key>/index.md` | Album provisioner | Album front matter |
//! | `<manifest output>/<key>/data.json` | Manifest generator | Client polling |
//! | `.autotag/config.yaml` | Operator | Non-secret settings |

use std::path::{Path, PathBuf};

/// Index document written once into every new album
pub const ALBUM_INDEX: &str = "index.md";

/// Per-album media listing polled by the gallery page
pub const MANIFEST_FILE: &str = "data.json";

/// Directory holding the project config file
pub const CONFIG_DIR: &str = ".autotag";

/// Config file name inside `CONFIG_DIR`
pub const CONFIG_FILE: &str = "config.yaml";

/// Default galleries root (content directory of the site)
pub const DEFAULT_GALLERIES: &str = "web/content/galleries";

/// Default working directory of the site generator
pub const DEFAULT_SITE_DIR: &str = "web";

/// Default TLS certificate and key for the transfer server
pub const DEFAULT_CERT: &str = "ftpd.crt";
pub const DEFAULT_KEY: &str = "ftpd.key";

/// Project config path under a directory
pub fn project_config(dir: &Path) -> PathBuf {
    dir.join(CONFIG_DIR).join(CONFIG_FILE)
}

/// Per-user fallback config path (~/.autotag/config.yaml)
pub fn user_config() -> Option<PathBuf> {
    dirs::home_dir().map(|home| project_config(&home))
}

/// Manifest path for an album (relative to the source root) under the output root
pub fn manifest_path(output_root: &Path, album: &Path) -> PathBuf {
    output_root.join(album).join(MANIFEST_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_config_layout() {
        assert_eq!(
            project_config(Path::new("/srv/photos")),
            PathBuf::from("/srv/photos/.autotag/config.yaml")
        );
    }

    #[test]
    fn test_manifest_path_layout() {
        assert_eq!(
            manifest_path(Path::new("/srv/_build"), Path::new("2024-03-05")),
            PathBuf::from("/srv/_build/2024-03-05/data.json")
        );
    }

    #[test]
    fn test_user_config_is_under_home() {
        if let Some(path) = user_config() {
            assert!(path.ends_with(".autotag/config.yaml"));
        }
    }
}
