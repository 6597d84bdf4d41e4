// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: log facade backend that writes through the stdio redirect debug path.
// Author: Lukas Bower

use std::sync::Arc;

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

use crate::redirect::StdioRedirect;

/// Logger forwarding formatted records to [`StdioRedirect::debug_line`].
pub struct HostLogger {
    redirect: Arc<StdioRedirect>,
    level: LevelFilter,
}

impl HostLogger {
    /// Logger at `Debug` when `verbose`, `Info` otherwise.
    #[must_use]
    pub fn new(redirect: Arc<StdioRedirect>, verbose: bool) -> Self {
        Self {
            redirect,
            level: level_for(verbose),
        }
    }

    /// Most verbose level this logger emits.
    #[must_use]
    pub fn level(&self) -> LevelFilter {
        self.level
    }
}

impl Log for HostLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.redirect.debug_line(&format_record(record));
    }

    fn flush(&self) {}
}

fn level_for(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

fn format_record(record: &Record<'_>) -> String {
    format!(
        "[{level} {target}] {message}",
        level = record.level(),
        target = record.target(),
        message = record.args(),
    )
}

/// Install [`HostLogger`] as the process logger.
pub fn init(redirect: Arc<StdioRedirect>, verbose: bool) -> Result<(), SetLoggerError> {
    let logger = HostLogger::new(redirect, verbose);
    let level = logger.level();
    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(level);
    Ok(())
}
