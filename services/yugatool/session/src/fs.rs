//! Filesystem abstraction used to load certificate material.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::RwLock;

/// Read-only view of a filesystem
pub trait Filesystem: Send + Sync + fmt::Debug {
    /// Read the whole file at `path`
    fn read_file(&self, path: &str) -> io::Result<Vec<u8>>;
}

/// The host operating system's filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFilesystem;

impl Filesystem for OsFilesystem {
    fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}

/// In-memory filesystem for development and testing
#[derive(Debug, Default)]
pub struct MemoryFilesystem {
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryFilesystem {
    /// Create an empty filesystem
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a file
    pub fn write_file(&self, path: impl Into<String>, contents: impl Into<Vec<u8>>) {
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        files.insert(path.into(), contents.into());
    }

    /// Remove a file, returning whether it existed
    pub fn remove_file(&self, path: &str) -> bool {
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        files.remove(path).is_some()
    }
}

impl Filesystem for MemoryFilesystem {
    fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("open {}: file does not exist", path),
            )
        })
    }
}
