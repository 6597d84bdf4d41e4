// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Last-resort fatal-error halt that waits for an exit control before leaving the process.
// Author: Lukas Bower

//! Fatal-error escape path.
//!
//! Every unrecoverable condition ends here: make sure the user can see output,
//! print the message and an exit prompt, then spin until an exit control is
//! pressed or the platform shuts the main loop down.

use std::sync::Arc;
use std::time::Duration;

use log::{error, info};

use crate::console::ConsoleState;
use crate::platform::{Buttons, Platform};
use crate::redirect::StdioRedirect;

/// Prompt printed after the fatal message.
pub const EXIT_PROMPT: &str = "Press confirm or cancel to exit";

/// Process exit code used by the fatal path.
pub const FATAL_EXIT_CODE: i32 = 1;

const IDLE_TICK: Duration = Duration::from_millis(1);

/// Owner of the unrecoverable-error path. Never returns.
pub trait FatalErrorHandler: Send + Sync {
    /// Report `message` and leave the process.
    fn halt(&self, message: &str) -> !;
}

/// Why the wait loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HaltReason {
    /// The confirm control was pressed.
    Confirmed,
    /// The cancel control was pressed.
    Cancelled,
    /// The platform main loop requested shutdown.
    MainLoopExited,
}

impl HaltReason {
    const fn label(self) -> &'static str {
        match self {
            HaltReason::Confirmed => "confirm",
            HaltReason::Cancelled => "cancel",
            HaltReason::MainLoopExited => "main-loop-exit",
        }
    }
}

/// Default fatal handler built on the platform's console, input and idle primitives.
pub struct FatalHalt {
    platform: Arc<dyn Platform>,
    console: Arc<ConsoleState>,
    redirect: Arc<StdioRedirect>,
}

impl FatalHalt {
    /// Create a handler over the shared console and redirect state.
    #[must_use]
    pub fn new(
        platform: Arc<dyn Platform>,
        console: Arc<ConsoleState>,
        redirect: Arc<StdioRedirect>,
    ) -> Self {
        Self {
            platform,
            console,
            redirect,
        }
    }

    /// Make output visible, print `message` and the prompt, and arm input.
    pub fn announce(&self, message: &str) {
        if let Err(err) = self.console.ensure_init() {
            error!("[fatal] console unavailable: {err}");
        }
        if !message.is_empty() {
            self.redirect.debug_line(message);
        }
        self.redirect.debug_line(EXIT_PROMPT);
        self.console.ensure_input();
    }

    /// Block until an exit control is pressed or the main loop stops.
    pub fn wait_for_exit_gesture(&self) -> HaltReason {
        while self.platform.main_loop_running() {
            let pressed = self.platform.input_poll();
            if pressed.contains(Buttons::CONFIRM) {
                return HaltReason::Confirmed;
            }
            if pressed.intersects(Buttons::EXIT) {
                return HaltReason::Cancelled;
            }
            if self.console.is_active() {
                self.console.update();
            } else {
                self.platform.idle(IDLE_TICK);
            }
        }
        HaltReason::MainLoopExited
    }
}

impl FatalErrorHandler for FatalHalt {
    fn halt(&self, message: &str) -> ! {
        self.announce(message);
        let reason = self.wait_for_exit_gesture();
        info!("[fatal] leaving process reason={}", reason.label());
        if let Err(err) = self.redirect.finish() {
            error!("[fatal] {err}");
        }
        self.platform.exit_process(FATAL_EXIT_CODE)
    }
}
