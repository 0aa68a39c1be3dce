//! Non-volatile storage backends
//!
//! Both backends model a fixed-size device that reads back `0xFF` where
//! nothing was ever written, like erased flash.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use irlearn_core::{IrError, IrResult, NvStorage};

const ERASED: u8 = 0xFF;

fn check_fits(image: &[u8], capacity: usize) -> IrResult<()> {
    if image.len() > capacity {
        return Err(IrError::Storage(format!(
            "image of {} bytes exceeds device capacity {}",
            image.len(),
            capacity
        )));
    }
    Ok(())
}

/// RAM-backed device, lost when dropped
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    bytes: Vec<u8>,
    fail_writes: bool,
    commits: usize,
}

impl MemoryStorage {
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: vec![ERASED; capacity],
            fail_writes: false,
            commits: 0,
        }
    }

    /// Make every commit fail until cleared
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Successful commits so far
    pub fn commits(&self) -> usize {
        self.commits
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Overwrite raw device bytes (corruption tests)
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl NvStorage for MemoryStorage {
    fn capacity(&self) -> usize {
        self.bytes.len()
    }

    fn read_image(&mut self) -> IrResult<Vec<u8>> {
        Ok(self.bytes.clone())
    }

    fn write_image(&mut self, image: &[u8]) -> IrResult<()> {
        if self.fail_writes {
            return Err(IrError::Storage("commit failed".into()));
        }
        check_fits(image, self.bytes.len())?;
        self.bytes[..image.len()].copy_from_slice(image);
        self.commits += 1;
        Ok(())
    }
}

/// File-backed device. Each commit rewrites the whole file through a
/// temporary file and a rename.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
    capacity: usize,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            path: path.into(),
            capacity,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NvStorage for FileStorage {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn read_image(&mut self) -> IrResult<Vec<u8>> {
        let mut bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No store file yet, device is erased");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };
        bytes.resize(self.capacity, ERASED);
        Ok(bytes)
    }

    fn write_image(&mut self, image: &[u8]) -> IrResult<()> {
        check_fits(image, self.capacity)?;
        let mut contents = image.to_vec();
        contents.resize(self.capacity, ERASED);

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &contents)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), bytes = image.len(), "Store file committed");
        Ok(())
    }
}
