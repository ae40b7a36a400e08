use anyhow::{Context, Result};
use std::path::Path;
#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::path::PathBuf;
#[cfg(test)]
use std::sync::{Arc, RwLock};

/// Trait for filesystem operations to enable testing with mocks
pub trait FileSystem: Send + Sync {
    /// Read file contents as string
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Write string contents to file, replacing it
    fn write(&self, path: &Path, contents: &str) -> Result<()>;

    /// Create directory and all parent directories
    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Check if path exists
    fn exists(&self, path: &Path) -> bool;
}

/// Real filesystem implementation using std::fs
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {:?}", path))
    }

    fn write(&self, path: &Path, contents: &str) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create parent directory: {:?}", parent))?;
        }

        // Stage then rename: readers only ever see a complete document
        let staging = path.with_extension("tmp");
        std::fs::write(&staging, contents)
            .with_context(|| format!("Failed to write file: {:?}", staging))?;
        std::fs::rename(&staging, path).with_context(|| format!("Failed to write file: {:?}", path))
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {:?}", path))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Mock filesystem implementation for testing (in-memory)
#[cfg(test)]
pub struct MockFileSystem {
    files: Arc<RwLock<HashMap<PathBuf, String>>>,
    directories: Arc<RwLock<HashMap<PathBuf, ()>>>,
    writes: Arc<RwLock<HashMap<PathBuf, usize>>>,
}

#[cfg(test)]
impl MockFileSystem {
    /// Create new empty mock filesystem
    pub fn new() -> Self {
        Self {
            files: Arc::new(RwLock::new(HashMap::new())),
            directories: Arc::new(RwLock::new(HashMap::new())),
            writes: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get captured file contents for testing assertions
    pub fn get_file_contents(&self, path: &Path) -> Option<String> {
        self.files.read().unwrap().get(path).cloned()
    }

    /// Check if file was written
    pub fn has_file(&self, path: &Path) -> bool {
        self.files.read().unwrap().contains_key(path)
    }

    /// List all files in mock filesystem
    pub fn list_files(&self) -> Vec<PathBuf> {
        self.files.read().unwrap().keys().cloned().collect()
    }

    /// How many times a file has been written
    pub fn write_count(&self, path: &Path) -> usize {
        self.writes.read().unwrap().get(path).copied().unwrap_or(0)
    }
}

#[cfg(test)]
impl Default for MockFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.files
            .read()
            .unwrap()
            .get(path)
            .cloned()
            .with_context(|| format!("File not found in mock filesystem: {:?}", path))
    }

    fn write(&self, path: &Path, contents: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            self.create_dir_all(parent)?;
        }

        self.files
            .write()
            .unwrap()
            .insert(path.to_path_buf(), contents.to_string());
        *self.writes.write().unwrap().entry(path.to_path_buf()).or_insert(0) += 1;
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut directories = self.directories.write().unwrap();
        let mut current = Some(path);
        while let Some(dir) = current {
            directories.insert(dir.to_path_buf(), ());
            current = dir.parent();
        }
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.read().unwrap().contains_key(path)
            || self.directories.read().unwrap().contains_key(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_write_creates_parents() {
        let fs = MockFileSystem::new();
        let path = Path::new("/work/metadata/west-us.json");
        fs.write(path, "{}").unwrap();

        assert!(fs.exists(Path::new("/work/metadata")));
        assert_eq!(fs.get_file_contents(path).as_deref(), Some("{}"));
        assert_eq!(fs.write_count(path), 1);
    }

    #[test]
    fn test_real_write_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("status.json");
        let fs = RealFileSystem;

        fs.write(&path, "first").unwrap();
        fs.write(&path, "second").unwrap();

        assert_eq!(fs.read_to_string(&path).unwrap(), "second");
        assert!(!path.with_extension("tmp").exists());
    }
}
