// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: On-screen console and input device state plus the console host extensions.
// Author: Lukas Bower

//! Console and input bookkeeping.
//!
//! Guest code drives the console through three host extensions resolved from
//! the `Internal` library. Those are plain `extern "C"` functions, so they
//! reach the live [`ConsoleState`] through a process-wide slot that the
//! lifecycle controller fills at startup and clears at teardown.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, RwLock};

use log::{debug, warn};
use once_cell::sync::Lazy;

use crate::dl::{HostExtension, SymbolAddress};
use crate::platform::{Platform, PlatformError};
use crate::redirect::StdioRedirect;
use crate::SubsystemState;

const STATE_UNINITIALIZED: u8 = 0;
const STATE_READY: u8 = 1;
const STATE_DISPOSED: u8 = 2;

fn state_from_u8(value: u8) -> SubsystemState {
    match value {
        STATE_READY => SubsystemState::Ready,
        STATE_DISPOSED => SubsystemState::Disposed,
        _ => SubsystemState::Uninitialized,
    }
}

/// Console and input device state owned by the lifecycle controller.
pub struct ConsoleState {
    platform: Arc<dyn Platform>,
    redirect: Arc<StdioRedirect>,
    console: AtomicU8,
    input_ready: AtomicBool,
}

impl ConsoleState {
    /// Create state with neither console nor input initialised.
    #[must_use]
    pub fn new(platform: Arc<dyn Platform>, redirect: Arc<StdioRedirect>) -> Self {
        Self {
            platform,
            redirect,
            console: AtomicU8::new(STATE_UNINITIALIZED),
            input_ready: AtomicBool::new(false),
        }
    }

    /// Bring up the on-screen console unless a redirect sink owns output.
    ///
    /// Returns whether the console is active afterwards.
    pub fn ensure_init(&self) -> Result<bool, PlatformError> {
        if self.redirect.is_active() {
            return Ok(false);
        }
        if self.is_active() {
            return Ok(true);
        }
        self.platform.console_init()?;
        self.console.store(STATE_READY, Ordering::Release);
        debug!("[console] initialised");
        Ok(true)
    }

    /// Configure the input device once.
    pub fn ensure_input(&self) {
        if self.input_ready.swap(true, Ordering::AcqRel) {
            return;
        }
        self.platform.input_configure();
        debug!("[console] input configured");
    }

    /// Present the console frame if the console is active.
    pub fn update(&self) {
        if self.is_active() {
            self.platform.console_update();
        }
    }

    /// Tear down the console if it is active.
    pub fn dispose(&self) -> Result<(), PlatformError> {
        if self
            .console
            .compare_exchange(
                STATE_READY,
                STATE_DISPOSED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Ok(());
        }
        self.platform.console_exit()
    }

    /// Whether the on-screen console is up.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.console.load(Ordering::Acquire) == STATE_READY
    }

    /// Console subsystem state.
    #[must_use]
    pub fn console_state(&self) -> SubsystemState {
        state_from_u8(self.console.load(Ordering::Acquire))
    }

    /// Input subsystem state. Input is never torn down explicitly.
    #[must_use]
    pub fn input_state(&self) -> SubsystemState {
        if self.input_ready.load(Ordering::Acquire) {
            SubsystemState::Ready
        } else {
            SubsystemState::Uninitialized
        }
    }
}

static EXTENSION_TARGET: Lazy<RwLock<Option<Arc<ConsoleState>>>> =
    Lazy::new(|| RwLock::new(None));

/// Point the console host extensions at `state`.
pub fn install_extension_target(state: Arc<ConsoleState>) {
    match EXTENSION_TARGET.write() {
        Ok(mut slot) => *slot = Some(state),
        Err(poisoned) => *poisoned.into_inner() = Some(state),
    }
}

/// Detach the console host extensions; later calls become no-ops.
pub fn clear_extension_target() {
    match EXTENSION_TARGET.write() {
        Ok(mut slot) => *slot = None,
        Err(poisoned) => *poisoned.into_inner() = None,
    }
}

fn extension_target() -> Option<Arc<ConsoleState>> {
    match EXTENSION_TARGET.read() {
        Ok(slot) => slot.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

extern "C" fn ext_console_ensure_init() {
    if let Some(console) = extension_target() {
        if let Err(err) = console.ensure_init() {
            warn!("[console] console_ensure_init failed: {err}");
        }
    }
}

extern "C" fn ext_console_dispose() {
    if let Some(console) = extension_target() {
        if let Err(err) = console.dispose() {
            warn!("[console] console_dispose failed: {err}");
        }
    }
}

extern "C" fn ext_console_update() {
    if let Some(console) = extension_target() {
        console.update();
    }
}

/// Host extensions published through the `Internal` library.
#[must_use]
pub fn host_extensions() -> Vec<HostExtension> {
    let entries: [(&'static str, extern "C" fn()); 3] = [
        ("console_ensure_init", ext_console_ensure_init),
        ("console_dispose", ext_console_dispose),
        ("console_update", ext_console_update),
    ];
    entries
        .into_iter()
        .filter_map(|(name, func)| {
            SymbolAddress::from_ptr(func as *const ()).map(|address| HostExtension { name, address })
        })
        .collect()
}
