// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Lazily initialised, thread-safe platform sockets subsystem.
// Author: Lukas Bower

//! Shared sockets subsystem.
//!
//! First use may come from UDP log redirection on the hosting thread or from
//! guest networking on any runtime worker, so bring-up is double-checked: an
//! unsynchronised readiness probe, then a locked re-check around the one-time
//! platform call. Readiness is only published after the call succeeds.
//! Callers queued behind a failing attempt share its error; only callers that
//! arrive after the failure was reported run the platform call again.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::platform::{Platform, PlatformError};
use crate::SubsystemState;

/// Platform sockets service with exactly-once initialisation.
pub struct SocketService {
    platform: Arc<dyn Platform>,
    ready: AtomicBool,
    activated: AtomicBool,
    attempts: AtomicU64,
    last_error: Mutex<Option<PlatformError>>,
    disposed: AtomicBool,
}

impl SocketService {
    /// Create an uninitialised service.
    #[must_use]
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self {
            platform,
            ready: AtomicBool::new(false),
            activated: AtomicBool::new(false),
            attempts: AtomicU64::new(0),
            last_error: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    /// Bring the service up if it is not already, reporting the platform error on failure.
    pub fn ensure_ready(&self) -> Result<(), PlatformError> {
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }
        let seen = self.attempts.load(Ordering::Acquire);
        let mut last_error = self
            .last_error
            .lock()
            .map_err(|_| PlatformError::Other("socket init lock poisoned".into()))?;
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }
        if self.attempts.load(Ordering::Acquire) != seen {
            if let Some(err) = last_error.as_ref() {
                return Err(err.clone());
            }
        }

        let outcome = self.platform.socket_init();
        match &outcome {
            Ok(()) => {
                *last_error = None;
                self.activated.store(true, Ordering::Release);
                self.disposed.store(false, Ordering::Release);
                self.ready.store(true, Ordering::Release);
            }
            Err(err) => *last_error = Some(err.clone()),
        }
        self.attempts.fetch_add(1, Ordering::AcqRel);
        drop(last_error);

        match &outcome {
            Ok(()) => debug!("[sockets] initialised"),
            Err(err) => warn!("[sockets] init failed: {err}"),
        }
        outcome
    }

    /// Whether the service is currently up.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Whether initialisation ever succeeded.
    #[must_use]
    pub fn was_activated(&self) -> bool {
        self.activated.load(Ordering::Acquire)
    }

    /// Current subsystem state.
    #[must_use]
    pub fn state(&self) -> SubsystemState {
        if self.is_ready() {
            SubsystemState::Ready
        } else if self.disposed.load(Ordering::Acquire) {
            SubsystemState::Disposed
        } else {
            SubsystemState::Uninitialized
        }
    }

    /// Release the service if it was ever brought up.
    ///
    /// Callers must have stopped all network traffic first; no lock is taken.
    pub fn release(&self) -> Result<(), PlatformError> {
        if !self.ready.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        self.disposed.store(true, Ordering::Release);
        self.platform.socket_exit()
    }
}
