// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Single-sink stdio redirection multiplexer.
// Author: Lukas Bower

//! Stdio redirection.
//!
//! Exactly one sink is installed per process, chosen once from the
//! configuration with priority file, then UDP, then kernel debug. The
//! transition from no sink to a sink is one-way.

pub mod file;
pub mod udp;

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use log::info;
use thiserror::Error;

use crate::config::AppConfiguration;
use crate::platform::{Platform, PlatformError};
use crate::sockets::SocketService;

pub use file::FileSink;
pub use udp::{UdpSink, UDP_CHUNK_SIZE};

/// Longest line accepted by [`StdioRedirect::debug_line`], excluding the newline.
pub const DEBUG_LINE_MAX: usize = 511;

/// Installed sink kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RedirectKind {
    /// Kernel debug-output channel.
    KernelDebug,
    /// Append-mode file.
    File,
    /// UDP datagrams.
    Udp,
}

impl RedirectKind {
    /// Short label used in log lines.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            RedirectKind::KernelDebug => "svc",
            RedirectKind::File => "file",
            RedirectKind::Udp => "udp",
        }
    }
}

/// Redirection failures.
#[derive(Debug, Error)]
pub enum RedirectError {
    /// A sink was already installed; it cannot be replaced.
    #[error("stdio is already redirected to {}", .0.label())]
    AlreadyActive(RedirectKind),
    /// The log file could not be opened.
    #[error("failed to redirect stdio to file {path}: {source}")]
    FileOpen {
        /// Requested log file.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// The UDP host is not an IPv4 literal.
    #[error("failed to redirect stdio to udp: invalid host {0:?}")]
    UdpAddress(String),
    /// The shared sockets subsystem could not be brought up.
    #[error("failed to redirect stdio to udp: sockets unavailable: {0}")]
    Sockets(#[from] PlatformError),
    /// The datagram socket could not be created.
    #[error("failed to redirect stdio to udp: {0}")]
    Socket(#[source] io::Error),
    /// Flushing the sink at teardown failed.
    #[error("failed to close {} sink: {source}", .kind.label())]
    Close {
        /// Sink being closed.
        kind: RedirectKind,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
}

enum RedirectSink {
    None,
    KernelDebug,
    File(FileSink),
    Udp(UdpSink),
}

impl RedirectSink {
    fn kind(&self) -> Option<RedirectKind> {
        match self {
            RedirectSink::None => None,
            RedirectSink::KernelDebug => Some(RedirectKind::KernelDebug),
            RedirectSink::File(_) => Some(RedirectKind::File),
            RedirectSink::Udp(_) => Some(RedirectKind::Udp),
        }
    }
}

struct RedirectState {
    sink: RedirectSink,
    finished: bool,
}

/// Process-wide diagnostic output multiplexer.
pub struct StdioRedirect {
    platform: Arc<dyn Platform>,
    state: Mutex<RedirectState>,
}

impl StdioRedirect {
    /// Create a multiplexer with no sink installed.
    #[must_use]
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self {
            platform,
            state: Mutex::new(RedirectState {
                sink: RedirectSink::None,
                finished: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RedirectState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Install the configured sink.
    ///
    /// Returns `Ok(None)` when no target is configured. Once a sink is in
    /// place every further call fails with [`RedirectError::AlreadyActive`]
    /// and changes nothing.
    ///
    /// The sink is built without holding the state lock, since sockets
    /// bring-up logs and the installed logger writes back through here.
    pub fn activate(
        &self,
        config: &AppConfiguration,
        sockets: &SocketService,
    ) -> Result<Option<RedirectKind>, RedirectError> {
        if let Some(kind) = self.kind() {
            return Err(RedirectError::AlreadyActive(kind));
        }

        let sink = if let Some(path) = &config.redirect_to_file {
            let sink = FileSink::open(path).map_err(|source| RedirectError::FileOpen {
                path: path.clone(),
                source,
            })?;
            RedirectSink::File(sink)
        } else if let Some(host) = &config.redirect_to_udp_host {
            let addr: Ipv4Addr = host
                .parse()
                .map_err(|_| RedirectError::UdpAddress(host.clone()))?;
            sockets.ensure_ready()?;
            let sink = UdpSink::connect(SocketAddrV4::new(addr, config.redirect_udp_port))
                .map_err(RedirectError::Socket)?;
            RedirectSink::Udp(sink)
        } else if config.redirect_to_kernel_debug {
            RedirectSink::KernelDebug
        } else {
            return Ok(None);
        };

        let kind = sink.kind();
        let mut state = self.lock();
        if let Some(existing) = state.sink.kind() {
            return Err(RedirectError::AlreadyActive(existing));
        }
        state.sink = sink;
        drop(state);

        if kind == Some(RedirectKind::KernelDebug) {
            let _ = self.write(b"Enabled print to svc redirection\n");
        }
        if let Some(kind) = kind {
            info!("[redirect] stdio redirected to {}", kind.label());
        }
        Ok(kind)
    }

    /// Installed sink, if any. Stays set after [`StdioRedirect::finish`].
    #[must_use]
    pub fn kind(&self) -> Option<RedirectKind> {
        self.lock().sink.kind()
    }

    /// Whether a sink owns diagnostic output.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.kind().is_some()
    }

    /// Write raw bytes to the active sink, or to the platform console if none.
    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.lock();
        match &mut state.sink {
            RedirectSink::None => {
                self.platform.console_write(buf);
                Ok(buf.len())
            }
            RedirectSink::KernelDebug => {
                self.platform.debug_output(buf);
                Ok(buf.len())
            }
            RedirectSink::File(sink) => sink.write(buf),
            RedirectSink::Udp(sink) => Ok(sink.write(buf)),
        }
    }

    /// Emit one diagnostic line.
    ///
    /// The line always reaches the kernel debug channel; it is then written
    /// to the active sink (or console) unless that sink is the debug channel.
    pub fn debug_line(&self, line: &str) {
        let line = truncate_line(line);
        if self.kind() != Some(RedirectKind::KernelDebug) {
            self.platform.debug_output(line.as_bytes());
        }
        let mut out = String::with_capacity(line.len() + 1);
        out.push_str(line);
        out.push('\n');
        let _ = self.write(out.as_bytes());
    }

    /// `io::Write` adaptor routing through this multiplexer.
    #[must_use]
    pub fn writer(self: &Arc<Self>) -> RedirectWriter {
        RedirectWriter {
            inner: Arc::clone(self),
        }
    }

    /// Close the active sink. Only the first call has an effect.
    pub fn finish(&self) -> Result<(), RedirectError> {
        let mut state = self.lock();
        if state.finished {
            return Ok(());
        }
        state.finished = true;
        match &mut state.sink {
            RedirectSink::None | RedirectSink::KernelDebug => Ok(()),
            RedirectSink::File(sink) => sink.close().map_err(|source| RedirectError::Close {
                kind: RedirectKind::File,
                source,
            }),
            RedirectSink::Udp(sink) => {
                sink.close();
                Ok(())
            }
        }
    }
}

/// Writer handed to the runtime's stdout/stderr plumbing.
#[derive(Clone)]
pub struct RedirectWriter {
    inner: Arc<StdioRedirect>,
}

impl io::Write for RedirectWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn truncate_line(line: &str) -> &str {
    if line.len() <= DEBUG_LINE_MAX {
        return line;
    }
    let mut end = DEBUG_LINE_MAX;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    &line[..end]
}
