// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Platform capability trait used by the host subsystems, plus a development host backend.
// Author: Lukas Bower

//! Platform abstraction bridging the console firmware primitives and host builds.
//!
//! Every subsystem in this crate reaches the hardware through [`Platform`], so
//! tests substitute a recording double and development builds run on
//! [`HostPlatform`].

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use bitflags::bitflags;
use thiserror::Error;

/// Frame period the host console refresh waits out, roughly one 60 Hz vsync.
pub const CONSOLE_FRAME: Duration = Duration::from_millis(16);

bitflags! {
    /// Buttons sampled from the primary input device.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct Buttons: u32 {
        /// Designated confirm control (`+` on the reference pad).
        const CONFIRM = 1 << 0;
        /// Designated cancel control (`-` on the reference pad).
        const CANCEL = 1 << 1;
        /// Face button A.
        const A = 1 << 2;
        /// Face button B.
        const B = 1 << 3;
    }
}

impl Buttons {
    /// Controls that end the fatal-halt wait loop.
    pub const EXIT: Buttons = Buttons::CONFIRM.union(Buttons::CANCEL);
}

/// Failure reported by a platform primitive.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The primitive returned a non-success result code.
    #[error("{op} failed with result code 0x{code:x}")]
    ResultCode {
        /// Primitive that failed.
        op: &'static str,
        /// Raw platform result code.
        code: u32,
    },
    /// The primitive is not available on this platform.
    #[error("{0} is unavailable on this platform")]
    Unavailable(&'static str),
    /// Free-form failure reported by a backend.
    #[error("{0}")]
    Other(String),
}

/// Minimal facilities the host needs from the console platform.
///
/// Implementations must be shareable across threads: the sockets subsystem
/// and the debug channel are reachable from runtime worker threads.
pub trait Platform: Send + Sync {
    /// Write raw bytes to the kernel debug-output channel.
    fn debug_output(&self, bytes: &[u8]);

    /// Write raw bytes to the process's default standard output surface.
    fn console_write(&self, bytes: &[u8]);

    /// Bring up the on-screen text console.
    fn console_init(&self) -> Result<(), PlatformError>;

    /// Present the current console frame, waiting for the next frame boundary.
    ///
    /// Callers rely on this to pace refresh loops, so it must not return
    /// immediately while the console is active.
    fn console_update(&self);

    /// Tear down the on-screen text console.
    fn console_exit(&self) -> Result<(), PlatformError>;

    /// Configure the primary input device.
    fn input_configure(&self);

    /// Sample the buttons pressed since the previous poll.
    fn input_poll(&self) -> Buttons;

    /// Whether the platform main loop still wants the application to run.
    fn main_loop_running(&self) -> bool {
        true
    }

    /// Initialise the secure random number service.
    fn rng_init(&self) -> Result<(), PlatformError>;

    /// Release the secure random number service.
    fn rng_exit(&self) -> Result<(), PlatformError>;

    /// Initialise the platform socket service.
    fn socket_init(&self) -> Result<(), PlatformError>;

    /// Release the platform socket service.
    fn socket_exit(&self) -> Result<(), PlatformError>;

    /// Install text-conversion tables from an in-memory data blob.
    fn text_data_install(&self, data: Vec<u8>) -> Result<(), PlatformError>;

    /// Release the installed text-conversion tables.
    fn text_data_release(&self) -> Result<(), PlatformError>;

    /// Yield the processor for roughly `period`.
    fn idle(&self, period: Duration) {
        thread::sleep(period);
    }

    /// Terminate the process through the platform's own exit path.
    fn exit_process(&self, code: i32) -> !;
}

/// Host-mode platform that proxies console primitives through the standard streams.
///
/// Confirm is reported once a line (or EOF) arrives on standard input, so a
/// fatal halt on a development machine waits for Enter. The debug channel is
/// silent unless echo to standard error is enabled.
pub struct HostPlatform {
    debug_echo: bool,
    console_active: AtomicBool,
    input_armed: AtomicBool,
    confirm: Arc<AtomicBool>,
    text_data: Mutex<Option<Vec<u8>>>,
}

impl HostPlatform {
    /// Create a host platform with no console and no input reader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            debug_echo: false,
            console_active: AtomicBool::new(false),
            input_armed: AtomicBool::new(false),
            confirm: Arc::new(AtomicBool::new(false)),
            text_data: Mutex::new(None),
        }
    }

    /// Echo the kernel debug channel to standard error.
    #[must_use]
    pub fn with_debug_echo(mut self, enabled: bool) -> Self {
        self.debug_echo = enabled;
        self
    }
}

impl Default for HostPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for HostPlatform {
    fn debug_output(&self, bytes: &[u8]) {
        if !self.debug_echo {
            return;
        }
        let mut err = io::stderr().lock();
        let _ = err.write_all(bytes);
        if !bytes.ends_with(b"\n") {
            let _ = err.write_all(b"\n");
        }
    }

    fn console_write(&self, bytes: &[u8]) {
        let _ = io::stdout().lock().write_all(bytes);
    }

    fn console_init(&self) -> Result<(), PlatformError> {
        self.console_active.store(true, Ordering::Release);
        Ok(())
    }

    fn console_update(&self) {
        if self.console_active.load(Ordering::Acquire) {
            let _ = io::stdout().flush();
            thread::sleep(CONSOLE_FRAME);
        }
    }

    fn console_exit(&self) -> Result<(), PlatformError> {
        self.console_active.store(false, Ordering::Release);
        let _ = io::stdout().flush();
        Ok(())
    }

    fn input_configure(&self) {
        if self.input_armed.swap(true, Ordering::AcqRel) {
            return;
        }
        let confirm = Arc::clone(&self.confirm);
        thread::spawn(move || {
            let mut line = String::new();
            let _ = io::stdin().lock().read_line(&mut line);
            confirm.store(true, Ordering::Release);
        });
    }

    fn input_poll(&self) -> Buttons {
        if self.confirm.load(Ordering::Acquire) {
            Buttons::CONFIRM
        } else {
            Buttons::empty()
        }
    }

    fn rng_init(&self) -> Result<(), PlatformError> {
        let mut probe = [0u8; 8];
        getrandom::getrandom(&mut probe).map_err(|err| PlatformError::Other(err.to_string()))
    }

    fn rng_exit(&self) -> Result<(), PlatformError> {
        Ok(())
    }

    fn socket_init(&self) -> Result<(), PlatformError> {
        Ok(())
    }

    fn socket_exit(&self) -> Result<(), PlatformError> {
        Ok(())
    }

    fn text_data_install(&self, data: Vec<u8>) -> Result<(), PlatformError> {
        if data.is_empty() {
            return Err(PlatformError::Other("text conversion data is empty".into()));
        }
        let mut slot = self
            .text_data
            .lock()
            .map_err(|_| PlatformError::Other("text data lock poisoned".into()))?;
        *slot = Some(data);
        Ok(())
    }

    fn text_data_release(&self) -> Result<(), PlatformError> {
        let mut slot = self
            .text_data
            .lock()
            .map_err(|_| PlatformError::Other("text data lock poisoned".into()))?;
        *slot = None;
        Ok(())
    }

    fn exit_process(&self, code: i32) -> ! {
        let _ = io::stdout().flush();
        std::process::exit(code)
    }
}
