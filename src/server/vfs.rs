//! Virtual file system view of a session home.
//!
//! Clients see `/` as their home directory. Paths are normalized lexically and
//! `..` never climbs above `/`, so every resolved path stays under the home.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VfsError {
    #[error("Invalid path '{0}'")]
    InvalidPath(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),
}

/// Normalize `arg` against the virtual directory `cwd`
pub fn normalize(cwd: &str, arg: &str) -> Result<String, VfsError> {
    if arg.contains('\0') || arg.contains('\\') {
        return Err(VfsError::InvalidPath(arg.to_string()));
    }

    let mut segments: Vec<&str> = if arg.starts_with('/') {
        Vec::new()
    } else {
        cwd.split('/').filter(|s| !s.is_empty()).collect()
    };

    for segment in arg.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    Ok(format!("/{}", segments.join("/")))
}

/// A session's view of its home directory
#[derive(Debug, Clone)]
pub struct HomeFs {
    home: PathBuf,
    cwd: String,
}

impl HomeFs {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            cwd: "/".to_string(),
        }
    }

    /// Current virtual directory
    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    /// Virtual path of `arg` relative to the current directory
    pub fn virtual_path(&self, arg: &str) -> Result<String, VfsError> {
        normalize(&self.cwd, arg)
    }

    /// Real path of `arg` under the home directory
    pub fn resolve(&self, arg: &str) -> Result<PathBuf, VfsError> {
        let virtual_path = self.virtual_path(arg)?;
        Ok(self.real_path(&virtual_path))
    }

    fn real_path(&self, virtual_path: &str) -> PathBuf {
        let relative = virtual_path.trim_start_matches('/');
        if relative.is_empty() {
            self.home.clone()
        } else {
            self.home.join(relative)
        }
    }

    /// Change the current directory; the target must be an existing directory
    pub async fn change_dir(&mut self, arg: &str) -> Result<&str, VfsError> {
        let target = self.virtual_path(arg)?;
        let is_dir = tokio::fs::metadata(self.real_path(&target))
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);

        if !is_dir {
            return Err(VfsError::NotADirectory(target));
        }

        self.cwd = target;
        Ok(&self.cwd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/", "IMG_1.JPG").unwrap(), "/IMG_1.JPG");
        assert_eq!(normalize("/a", "b/./c").unwrap(), "/a/b/c");
        assert_eq!(normalize("/a/b", "../c").unwrap(), "/a/c");
        assert_eq!(normalize("/a", "/IMG_1.JPG").unwrap(), "/IMG_1.JPG");
        assert_eq!(normalize("/", "").unwrap(), "/");
    }

    #[test]
    fn test_dotdot_is_confined_to_home() {
        assert_eq!(normalize("/", "../../etc/passwd").unwrap(), "/etc/passwd");
        assert_eq!(normalize("/a", "/../../..").unwrap(), "/");

        let fs = HomeFs::new("/srv/galleries/2024-03-05");
        assert_eq!(
            fs.resolve("../../../etc/passwd").unwrap(),
            PathBuf::from("/srv/galleries/2024-03-05/etc/passwd")
        );
        assert_eq!(fs.resolve("/").unwrap(), PathBuf::from("/srv/galleries/2024-03-05"));
    }

    #[test]
    fn test_rejects_nul_and_backslash() {
        assert!(matches!(normalize("/", "a\0b"), Err(VfsError::InvalidPath(_))));
        assert!(matches!(normalize("/", "..\\x"), Err(VfsError::InvalidPath(_))));
    }

    #[tokio::test]
    async fn test_change_dir() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("sub")).unwrap();
        std::fs::write(temp.path().join("file.jpg"), b"x").unwrap();

        let mut fs = HomeFs::new(temp.path());
        assert_eq!(fs.change_dir("sub").await.unwrap(), "/sub");
        assert_eq!(fs.change_dir("..").await.unwrap(), "/");
        assert_eq!(
            fs.change_dir("file.jpg").await,
            Err(VfsError::NotADirectory("/file.jpg".to_string()))
        );
        assert_eq!(
            fs.change_dir("missing").await,
            Err(VfsError::NotADirectory("/missing".to_string()))
        );
        assert_eq!(fs.cwd(), "/");
    }
}
