// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Boundary between the host and the embedded managed runtime.
// Author: Lukas Bower

//! The runtime itself is an external collaborator. [`RuntimeHost`] is the
//! narrow surface the lifecycle controller drives during startup; the hooks
//! defined here are what the runtime calls back into.

use std::path::Path;
use std::sync::Arc;

use crate::dl::SymbolResolver;
use crate::lifecycle::FatalGate;
use crate::redirect::StdioRedirect;

/// Banner written before an unhandled fault is reported.
pub const UNHANDLED_FAULT_BANNER: &str = "--- Unhandled exception ---";

/// Line written before a fatal runtime log record is reported.
pub const FATAL_LOG_BANNER: &str = "Fatal error in runtime";

/// Operations the host needs from the embedded runtime.
pub trait RuntimeHost {
    /// Point the runtime at its module and configuration directories.
    fn set_module_dirs(&mut self, module_dir: &Path, config_dir: &Path);

    /// Register `resolver` as the loader fallback for native library lookups.
    fn install_loader(&mut self, resolver: Arc<SymbolResolver>);

    /// Register the hook invoked for faults guest code did not handle.
    fn install_fault_hook(&mut self, hook: FaultHook);

    /// Route runtime trace output through `handler`. Only called when verbose.
    fn install_log_handler(&mut self, _handler: RuntimeLogHandler) {}
}

/// Runtime-fatal path for unhandled guest faults.
#[derive(Clone)]
pub struct FaultHook {
    redirect: Arc<StdioRedirect>,
    gate: FatalGate,
}

impl FaultHook {
    /// Hook writing through `redirect` and halting through `gate`.
    #[must_use]
    pub fn new(redirect: Arc<StdioRedirect>, gate: FatalGate) -> Self {
        Self { redirect, gate }
    }

    /// Report the rendered fault and enter the fatal halt.
    pub fn on_unhandled_fault(&self, rendered: &str) -> ! {
        self.redirect.debug_line(UNHANDLED_FAULT_BANNER);
        self.gate.enter(rendered)
    }
}

/// Sink for the runtime's own trace records.
#[derive(Clone)]
pub struct RuntimeLogHandler {
    redirect: Arc<StdioRedirect>,
    gate: FatalGate,
    verbose: bool,
}

impl RuntimeLogHandler {
    /// Handler writing through `redirect`; records are echoed only when `verbose`.
    #[must_use]
    pub fn new(redirect: Arc<StdioRedirect>, gate: FatalGate, verbose: bool) -> Self {
        Self {
            redirect,
            gate,
            verbose,
        }
    }

    /// Handle one record. A fatal record never returns.
    pub fn on_log(&self, domain: &str, level: &str, message: &str, fatal: bool) {
        if self.verbose {
            self.redirect
                .debug_line(&format!("{domain} {level} {message}"));
        }
        if fatal {
            self.redirect.debug_line(FATAL_LOG_BANNER);
            self.gate.enter(message);
        }
    }
}
