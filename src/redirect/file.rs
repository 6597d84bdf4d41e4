// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Append-mode file sink for redirected diagnostic output.
// Author: Lukas Bower

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const START_MARKER: &[u8] = b"--- starting log ---\n";

/// Synchronous append-mode log file.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: Option<File>,
}

impl FileSink {
    /// Open `path` for appending and write the session marker.
    pub fn open(path: &Path) -> io::Result<Self> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(START_MARKER)?;
        file.flush()?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
        })
    }

    /// Path the sink appends to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `buf` and flush before returning.
    pub fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let Some(file) = self.file.as_mut() else {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "log file closed"));
        };
        if buf.is_empty() {
            return Ok(0);
        }
        file.write_all(buf)?;
        file.flush()?;
        Ok(buf.len())
    }

    /// Flush and close the file. Closing twice is a no-op.
    pub fn close(&mut self) -> io::Result<()> {
        match self.file.take() {
            Some(mut file) => file.flush(),
            None => Ok(()),
        }
    }
}
