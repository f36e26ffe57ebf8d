//! Key and payload loading.
//!
//! Both files are read completely into owned buffers before any worker
//! starts. Buffers are wiped when dropped, including when a load fails after
//! the allocation succeeded.

use crate::error::{Result, TransformError};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tracing::debug;
use zeroize::Zeroizing;

/// Repeating key, shared read-only by every worker
pub struct KeyBuffer {
    bytes: Zeroizing<Vec<u8>>,
}

impl KeyBuffer {
    /// Load a key file
    ///
    /// # Errors
    ///
    /// Returns `NotFound`/`PermissionDenied` if the file cannot be opened,
    /// `EmptyOrInvalid` for a zero-length key, `TooLarge` if `limit` is
    /// exceeded, `OutOfMemory` if the buffer cannot be allocated, and
    /// `ShortRead`/`Io` if the contents cannot be read in full.
    pub fn load(path: &Path, limit: Option<u64>) -> Result<Self> {
        let bytes = load_file(path, "key", limit)?;
        Ok(Self { bytes })
    }

    /// Build a key from bytes already in memory
    ///
    /// # Errors
    ///
    /// Returns `EmptyOrInvalid` if `bytes` is empty.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(TransformError::EmptyOrInvalid {
                what: "key",
                detail: "zero-length key".to_string(),
            });
        }
        Ok(Self {
            bytes: Zeroizing::new(bytes),
        })
    }

    /// Key length in bytes (always at least 1)
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false; a key cannot be constructed empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Key bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for KeyBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyBuffer")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

/// Full payload, transformed in place by the workers
pub struct DataBuffer {
    bytes: Zeroizing<Vec<u8>>,
}

impl DataBuffer {
    /// Load an input file
    ///
    /// # Errors
    ///
    /// Same classification as [`KeyBuffer::load`], reported against the input.
    pub fn load(path: &Path, limit: Option<u64>) -> Result<Self> {
        let bytes = load_file(path, "input", limit)?;
        Ok(Self { bytes })
    }

    /// Build a payload from bytes already in memory
    ///
    /// # Errors
    ///
    /// Returns `EmptyOrInvalid` if `bytes` is empty.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(TransformError::EmptyOrInvalid {
                what: "input",
                detail: "zero-length payload".to_string(),
            });
        }
        Ok(Self {
            bytes: Zeroizing::new(bytes),
        })
    }

    /// Payload size in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false; a payload cannot be constructed empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Payload bytes
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Mutable payload bytes, for splitting into fragments
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl fmt::Debug for DataBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataBuffer")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

fn load_file(path: &Path, what: &'static str, limit: Option<u64>) -> Result<Zeroizing<Vec<u8>>> {
    let mut file = File::open(path).map_err(|e| TransformError::from_io(path, e))?;
    let size = file
        .metadata()
        .map_err(|e| TransformError::from_io(path, e))?
        .len();

    if size == 0 {
        return Err(TransformError::EmptyOrInvalid {
            what,
            detail: path.display().to_string(),
        });
    }

    if let Some(limit) = limit {
        if size > limit {
            return Err(TransformError::TooLarge {
                path: path.to_path_buf(),
                size,
                limit,
            });
        }
    }

    let len = usize::try_from(size).map_err(|_| TransformError::OutOfMemory { requested: size })?;
    let mut raw = Vec::new();
    raw.try_reserve_exact(len)
        .map_err(|_| TransformError::OutOfMemory { requested: size })?;
    raw.resize(len, 0);
    let mut buffer = Zeroizing::new(raw);

    let mut filled = 0;
    while filled < len {
        match file.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(TransformError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }
    }

    if filled < len {
        return Err(TransformError::ShortRead {
            path: path.to_path_buf(),
            expected: size,
            actual: filled as u64,
        });
    }

    debug!("Loaded {} ({} bytes) from {:?}", what, len, path);
    Ok(buffer)
}
