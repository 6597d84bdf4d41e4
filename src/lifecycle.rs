// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Ordered subsystem bring-up and teardown for the runtime host.
// Author: Lukas Bower

//! Application lifecycle.
//!
//! The controller owns every subsystem the host manages and moves through
//! `Uninitialized → Initializing → Running → Terminating → Terminated`.
//! `FatalHalt` is reachable from any state and is terminal.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use log::{debug, error, info, warn};
use thiserror::Error;

use crate::config::{AppConfiguration, ConfigError};
use crate::console::{self, ConsoleState};
use crate::dl::{ModuleTables, SymbolResolver};
use crate::fatal::{FatalErrorHandler, FatalHalt};
use crate::platform::{Platform, PlatformError};
use crate::redirect::{RedirectError, StdioRedirect};
use crate::runtime::{FaultHook, RuntimeHost, RuntimeLogHandler};
use crate::sockets::SocketService;
use crate::SubsystemState;

/// Process exit code used after a clean teardown.
pub const CLEAN_EXIT_CODE: i32 = 0;

/// Lifecycle position of the host.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    /// Nothing has been brought up.
    Uninitialized = 0,
    /// Startup sequence in progress.
    Initializing = 1,
    /// Startup finished; the runtime may execute guest code.
    Running = 2,
    /// Teardown sequence in progress.
    Terminating = 3,
    /// Teardown finished.
    Terminated = 4,
    /// The fatal-error path owns the process.
    FatalHalt = 5,
}

fn state_from_u8(value: u8) -> LifecycleState {
    match value {
        1 => LifecycleState::Initializing,
        2 => LifecycleState::Running,
        3 => LifecycleState::Terminating,
        4 => LifecycleState::Terminated,
        5 => LifecycleState::FatalHalt,
        _ => LifecycleState::Uninitialized,
    }
}

/// Short label used in transition log lines.
#[must_use]
pub const fn state_label(state: LifecycleState) -> &'static str {
    match state {
        LifecycleState::Uninitialized => "UNINITIALIZED",
        LifecycleState::Initializing => "INITIALIZING",
        LifecycleState::Running => "RUNNING",
        LifecycleState::Terminating => "TERMINATING",
        LifecycleState::Terminated => "TERMINATED",
        LifecycleState::FatalHalt => "FATAL_HALT",
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(state_label(*self))
    }
}

/// Atomically shared lifecycle state, visible to runtime callbacks.
#[derive(Debug)]
pub struct LifecycleStatus {
    state: AtomicU8,
}

impl LifecycleStatus {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Uninitialized as u8),
        }
    }

    /// Current state.
    #[must_use]
    pub fn get(&self) -> LifecycleState {
        state_from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Move to `new`, logging the transition. Returns the previous state.
    pub fn transition(&self, new: LifecycleState, reason: &'static str) -> LifecycleState {
        let old = state_from_u8(self.state.swap(new as u8, Ordering::SeqCst));
        info!(
            "lifecycle transition old={} new={} reason={}",
            state_label(old),
            state_label(new),
            reason
        );
        old
    }
}

/// Entry into the fatal halt, shared by the controller and runtime hooks.
#[derive(Clone)]
pub struct FatalGate {
    status: Arc<LifecycleStatus>,
    handler: Arc<dyn FatalErrorHandler>,
}

impl FatalGate {
    /// Record the fatal transition and hand over to the handler.
    pub fn enter(&self, message: &str) -> ! {
        self.status.transition(LifecycleState::FatalHalt, "fatal");
        error!("[lifecycle] entering fatal halt");
        self.handler.halt(message)
    }
}

/// Startup failures. Every variant is startup-fatal.
#[derive(Debug, Error)]
pub enum HostError {
    /// The operation is not valid in the current state.
    #[error("cannot {op} while {state}")]
    InvalidState {
        /// Attempted operation.
        op: &'static str,
        /// State at the time of the attempt.
        state: LifecycleState,
    },
    /// Required configuration paths were not set.
    #[error("some paths are missing from the config file: {}", .0.join(", "))]
    MissingPaths(Vec<&'static str>),
    /// Redirection could not be activated.
    #[error(transparent)]
    Redirect(#[from] RedirectError),
    /// The text-conversion data file could not be read.
    #[error("failed to read text conversion data {path}: {source}")]
    TextDataRead {
        /// Configured data file.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// The platform rejected the text-conversion data.
    #[error("text conversion init failed: {0}")]
    TextDataInstall(#[source] PlatformError),
    /// Configuration could not be validated.
    #[error(transparent)]
    Config(ConfigError),
}

impl From<ConfigError> for HostError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::MissingPaths(names) => HostError::MissingPaths(names),
            other => HostError::Config(other),
        }
    }
}

/// Outcome of [`LifecycleController::terminate`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TeardownReport {
    /// Steps that ran, in order.
    pub steps: Vec<&'static str>,
    /// Steps that failed, with the rendered error.
    pub failures: Vec<(&'static str, String)>,
}

impl TeardownReport {
    /// Whether every step succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record<E: fmt::Display>(&mut self, step: &'static str, outcome: Result<(), E>) {
        self.steps.push(step);
        match outcome {
            Ok(()) => debug!("[lifecycle] teardown step={step} ok"),
            Err(err) => {
                warn!("[lifecycle] teardown step={step} failed: {err}");
                self.failures.push((step, err.to_string()));
            }
        }
    }
}

/// Owner of host subsystems and their ordered bring-up and teardown.
pub struct LifecycleController {
    platform: Arc<dyn Platform>,
    status: Arc<LifecycleStatus>,
    resolver: Arc<SymbolResolver>,
    sockets: Arc<SocketService>,
    redirect: Arc<StdioRedirect>,
    console: Arc<ConsoleState>,
    fatal: Arc<dyn FatalErrorHandler>,
    config: Option<AppConfiguration>,
    rng: SubsystemState,
    text_data: SubsystemState,
}

impl LifecycleController {
    /// Build a controller over `platform` resolving symbols from `tables`.
    #[must_use]
    pub fn new(platform: Arc<dyn Platform>, tables: ModuleTables) -> Self {
        let redirect = Arc::new(StdioRedirect::new(Arc::clone(&platform)));
        let console = Arc::new(ConsoleState::new(
            Arc::clone(&platform),
            Arc::clone(&redirect),
        ));
        let fatal: Arc<dyn FatalErrorHandler> = Arc::new(FatalHalt::new(
            Arc::clone(&platform),
            Arc::clone(&console),
            Arc::clone(&redirect),
        ));
        Self {
            sockets: Arc::new(SocketService::new(Arc::clone(&platform))),
            resolver: Arc::new(SymbolResolver::new(tables, console::host_extensions())),
            status: Arc::new(LifecycleStatus::new()),
            platform,
            redirect,
            console,
            fatal,
            config: None,
            rng: SubsystemState::Uninitialized,
            text_data: SubsystemState::Uninitialized,
        }
    }

    /// Replace the fatal-error handler.
    #[must_use]
    pub fn with_fatal_handler(mut self, handler: Arc<dyn FatalErrorHandler>) -> Self {
        self.fatal = handler;
        self
    }

    /// Bring every subsystem up in dependency order.
    pub fn try_initialize(
        &mut self,
        config: AppConfiguration,
        runtime: &mut dyn RuntimeHost,
    ) -> Result<(), HostError> {
        let state = self.state();
        if state != LifecycleState::Uninitialized {
            return Err(HostError::InvalidState {
                op: "initialize",
                state,
            });
        }
        self.status
            .transition(LifecycleState::Initializing, "initialize");
        console::install_extension_target(Arc::clone(&self.console));

        let paths = config.required_paths()?;
        let text_data_path = paths.text_data.to_path_buf();
        let module_dir = paths.module_search.to_path_buf();
        let config_dir = paths.module_config.to_path_buf();

        let verbose = config.verbose_logging;
        self.resolver.set_verbose(verbose);

        if config.force_console_at_startup {
            if let Err(err) = self.console.ensure_init() {
                warn!("[lifecycle] forced console init failed: {err}");
            }
            self.console.ensure_input();
        }

        match self.platform.rng_init() {
            Ok(()) => self.rng = SubsystemState::Ready,
            Err(err) => warn!("[lifecycle] secure rng unavailable, continuing: {err}"),
        }

        self.redirect.activate(&config, &self.sockets)?;

        self.load_text_data(&text_data_path)?;

        runtime.set_module_dirs(&module_dir, &config_dir);
        runtime.install_loader(Arc::clone(&self.resolver));
        runtime.install_fault_hook(FaultHook::new(
            Arc::clone(&self.redirect),
            self.fatal_gate(),
        ));
        if verbose {
            runtime.install_log_handler(RuntimeLogHandler::new(
                Arc::clone(&self.redirect),
                self.fatal_gate(),
                verbose,
            ));
        }

        self.config = Some(config);
        self.status.transition(LifecycleState::Running, "initialized");
        Ok(())
    }

    /// Run [`LifecycleController::try_initialize`], halting on any failure.
    pub fn initialize(&mut self, config: AppConfiguration, runtime: &mut dyn RuntimeHost) {
        if let Err(err) = self.try_initialize(config, runtime) {
            self.fatal_halt(&err.to_string());
        }
    }

    fn load_text_data(&mut self, path: &Path) -> Result<(), HostError> {
        let data = fs::read(path).map_err(|source| HostError::TextDataRead {
            path: path.to_path_buf(),
            source,
        })?;
        let len = data.len();
        self.platform
            .text_data_install(data)
            .map_err(HostError::TextDataInstall)?;
        self.text_data = SubsystemState::Ready;
        debug!(
            "[lifecycle] text conversion data installed path={} bytes={len}",
            path.display()
        );
        Ok(())
    }

    /// Release every subsystem in reverse dependency order.
    ///
    /// Each step runs even if an earlier one failed. Exits the process with
    /// code 0 afterwards when the configuration asks for it.
    pub fn terminate(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();
        let state = self.state();
        if matches!(
            state,
            LifecycleState::Terminating | LifecycleState::Terminated
        ) {
            return report;
        }
        self.status
            .transition(LifecycleState::Terminating, "terminate");

        self.console.update();
        report.steps.push("console-refresh");

        if self.rng == SubsystemState::Ready {
            self.rng = SubsystemState::Disposed;
            report.record("rng", self.platform.rng_exit());
        }

        report.record("redirect", self.redirect.finish());

        if self.sockets.was_activated() {
            report.record("sockets", self.sockets.release());
        }

        report.record("console", self.console.dispose());

        if self.text_data == SubsystemState::Ready {
            self.text_data = SubsystemState::Disposed;
            report.record("text-data", self.platform.text_data_release());
        }

        console::clear_extension_target();
        let exit_process = self
            .config
            .take()
            .is_some_and(|config| config.exit_process_on_teardown);

        self.status
            .transition(LifecycleState::Terminated, "terminated");
        if !report.is_clean() {
            warn!(
                "[lifecycle] teardown finished with {} failure(s)",
                report.failures.len()
            );
        }
        if exit_process {
            self.platform.exit_process(CLEAN_EXIT_CODE);
        }
        report
    }

    /// Enter the unrecoverable-error path. Never returns.
    pub fn fatal_halt(&self, message: &str) -> ! {
        self.fatal_gate().enter(message)
    }

    /// Gate runtime callbacks use to reach the fatal path.
    #[must_use]
    pub fn fatal_gate(&self) -> FatalGate {
        FatalGate {
            status: Arc::clone(&self.status),
            handler: Arc::clone(&self.fatal),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.status.get()
    }

    /// Shared lifecycle state.
    #[must_use]
    pub fn status(&self) -> Arc<LifecycleStatus> {
        Arc::clone(&self.status)
    }

    /// Active configuration, present while running.
    #[must_use]
    pub fn config(&self) -> Option<&AppConfiguration> {
        self.config.as_ref()
    }

    /// Loader shim shared with the runtime.
    #[must_use]
    pub fn resolver(&self) -> Arc<SymbolResolver> {
        Arc::clone(&self.resolver)
    }

    /// Diagnostic output multiplexer.
    #[must_use]
    pub fn redirect(&self) -> Arc<StdioRedirect> {
        Arc::clone(&self.redirect)
    }

    /// Shared sockets subsystem.
    #[must_use]
    pub fn sockets(&self) -> Arc<SocketService> {
        Arc::clone(&self.sockets)
    }

    /// Console and input state.
    #[must_use]
    pub fn console(&self) -> Arc<ConsoleState> {
        Arc::clone(&self.console)
    }

    /// Secure RNG subsystem state.
    #[must_use]
    pub fn rng_state(&self) -> SubsystemState {
        self.rng
    }

    /// Text-conversion subsystem state.
    #[must_use]
    pub fn text_data_state(&self) -> SubsystemState {
        self.text_data
    }
}

/// Directory to change into before launching `entry`, if it names one.
///
/// `/x` yields `/`; a bare file name yields nothing.
#[must_use]
pub fn entry_module_dir(entry: &str) -> Option<&str> {
    if entry.len() < 2 {
        return None;
    }
    match entry.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&entry[..idx]),
        None => None,
    }
}
