use crate::traits::{FileSystem, Output, RealFileSystem, TerminalOutput};
#[cfg(test)]
use crate::traits::{MockFileSystem, MockOutput};
use std::sync::Arc;

/// Application context that holds all dependencies for dependency injection
pub struct Context {
    pub fs: Arc<dyn FileSystem>,
    pub output: Arc<dyn Output>,
}

impl Context {
    /// Create a new context with real implementations (for production use)
    pub fn new() -> Self {
        Self {
            fs: Arc::new(RealFileSystem),
            output: Arc::new(TerminalOutput),
        }
    }

    /// Create a test context with specific mock implementations
    #[cfg(test)]
    pub fn test_with(fs: Arc<MockFileSystem>, output: Arc<MockOutput>) -> Self {
        Self { fs, output }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Context {
    fn clone(&self) -> Self {
        Self {
            fs: Arc::clone(&self.fs),
            output: Arc::clone(&self.output),
        }
    }
}
