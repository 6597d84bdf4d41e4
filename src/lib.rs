// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Library surface for the embedhost runtime host.
// Author: Lukas Bower
#![deny(unsafe_op_in_unsafe_fn)]
#![deny(deprecated)]
#![warn(missing_docs)]

//! Hosting shim that lets a managed runtime boot on a console platform without
//! a dynamic loader.
//!
//! The crate answers the runtime's library and symbol lookups from statically
//! linked module tables, routes diagnostic output to a single configured sink,
//! and drives subsystem bring-up and teardown through [`lifecycle`].

pub mod config;
pub mod console;
pub mod dl;
pub mod fatal;
pub mod lifecycle;
pub mod logging;
pub mod platform;
pub mod redirect;
pub mod runtime;
pub mod sockets;

pub use config::{AppConfiguration, ConfigError, ConfigSource, ConfigStore, TomlSource};
pub use dl::{LibraryHandle, ModuleTables, ResolveError, SymbolAddress, SymbolResolver};
pub use fatal::{FatalErrorHandler, FatalHalt, HaltReason};
pub use lifecycle::{HostError, LifecycleController, LifecycleState, TeardownReport};
pub use platform::{Buttons, HostPlatform, Platform, PlatformError};
pub use redirect::{RedirectError, RedirectKind, StdioRedirect};
pub use runtime::{FaultHook, RuntimeHost, RuntimeLogHandler};
pub use sockets::SocketService;

/// Tri-state tracked independently for every managed subsystem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SubsystemState {
    /// Never brought up, or bring-up failed.
    #[default]
    Uninitialized,
    /// Brought up and usable.
    Ready,
    /// Released during teardown.
    Disposed,
}

impl SubsystemState {
    /// Short label used in log lines.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            SubsystemState::Uninitialized => "uninitialized",
            SubsystemState::Ready => "ready",
            SubsystemState::Disposed => "disposed",
        }
    }
}
