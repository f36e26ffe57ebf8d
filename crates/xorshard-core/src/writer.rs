//! Result write-back.

use crate::error::{Result, TransformError};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use tracing::debug;

/// Write `data` verbatim to `path`, creating or truncating it
///
/// When `sync` is set the file is flushed to stable storage before returning.
///
/// # Errors
///
/// Returns `NotFound`/`PermissionDenied` if the output cannot be opened,
/// `ShortWrite` if the file stops accepting bytes, and `Io` for any other
/// write or sync failure.
pub fn write_output(path: &Path, data: &[u8], sync: bool) -> Result<u64> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|e| TransformError::from_io(path, e))?;

    let written = write_counted(&mut file, data, path)?;

    if sync {
        file.sync_all().map_err(|source| TransformError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    }

    debug!("Wrote {} bytes to {:?}", written, path);
    Ok(written)
}

/// Write all of `data`, reporting how far a failed write got
pub(crate) fn write_counted<W: Write>(sink: &mut W, data: &[u8], path: &Path) -> Result<u64> {
    let expected = data.len() as u64;
    let mut written = 0usize;

    while written < data.len() {
        match sink.write(&data[written..]) {
            Ok(0) => {
                return Err(TransformError::ShortWrite {
                    path: path.to_path_buf(),
                    expected,
                    actual: written as u64,
                });
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(TransformError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }
    }

    sink.flush().map_err(|source| TransformError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(expected)
}
