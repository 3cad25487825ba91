//! Append-only mirror of the bytes read during one session.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Binary session log, flushed and closed exactly once:
/// by [`RawLog::close`], or on drop if the owner unwinds first.
pub struct RawLog {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    written: u64,
}

impl RawLog {
    /// Create (or truncate) the log file.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|source| Error::LogFile {
            path: path.to_owned(),
            source,
        })?;
        Ok(Self {
            path: path.to_owned(),
            writer: Some(BufWriter::new(file)),
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        match self.writer.as_mut() {
            Some(w) => {
                w.write_all(bytes)?;
                self.written += bytes.len() as u64;
                Ok(())
            }
            None => Err(Error::Io(std::io::Error::other("log file already closed"))),
        }
    }

    /// Flush and close the file, returning the total bytes written.
    pub fn close(&mut self) -> Result<u64> {
        if let Some(mut w) = self.writer.take() {
            w.flush()?;
        }
        Ok(self.written)
    }
}

impl Drop for RawLog {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_are_flushed_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        let mut log = RawLog::create(&path).unwrap();
        log.write(&[1, 2, 3]).unwrap();
        log.write(&[4]).unwrap();
        assert_eq!(log.close().unwrap(), 4);
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3, 4]);

        assert!(log.write(&[5]).is_err());
        // Closing again is harmless
        assert_eq!(log.close().unwrap(), 4);
    }

    #[test]
    fn drop_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.bin");
        {
            let mut log = RawLog::create(&path).unwrap();
            log.write(b"$GPGLL").unwrap();
        }
        assert_eq!(std::fs::read(&path).unwrap(), b"$GPGLL");
    }

    #[test]
    fn missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = RawLog::create(&dir.path().join("nope").join("c.bin")).err().unwrap();
        assert!(matches!(err, Error::LogFile { .. }));
    }
}
