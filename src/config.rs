// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Startup configuration record and the key/value store that populates it.
// Author: Lukas Bower

//! Startup configuration.
//!
//! A [`ConfigSource`] walks its entries and hands each `(section, key, value)`
//! triple to [`ConfigStore::on_entry`]. Unrecognised pairs are rejected so the
//! source can surface a malformed file as a load failure.
//!
//! ```text
//! [runtime]
//! logging = true
//! text_data = "/embedhost/icudt.dat"
//! module_dir = "/embedhost/lib"
//! config_dir = "/embedhost/etc"
//! entry_module = "/embedhost/app/program.dll"
//!
//! [platform]
//! udp_io_redirect = "192.168.1.20"
//! force_console_init = true
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Default configuration path on the console filesystem.
pub const DEFAULT_CONFIG_PATH: &str = "/embedhost/config.toml";

/// UDP port the log listener is expected on when none is configured.
pub const DEFAULT_UDP_LOG_PORT: u16 = 9999;

/// Errors produced while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("can't load app config from {path}: {source}")]
    Read {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The configuration text is not well formed.
    #[error("malformed app config: {0}")]
    Malformed(String),
    /// The store refused an entry.
    #[error("unrecognised config entry [{section}] {key}")]
    Rejected {
        /// Section of the refused entry.
        section: String,
        /// Key of the refused entry.
        key: String,
    },
    /// Required paths were not supplied.
    #[error("some paths are missing from the config file: {}", .0.join(", "))]
    MissingPaths(Vec<&'static str>),
}

/// Immutable startup configuration owned by the lifecycle controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfiguration {
    /// Emit runtime and resolver diagnostics.
    pub verbose_logging: bool,
    /// Text-conversion data file loaded at startup.
    pub text_data_path: Option<PathBuf>,
    /// Directory the runtime searches for modules.
    pub module_search_dir: Option<PathBuf>,
    /// Directory holding the runtime's own configuration.
    pub module_config_dir: Option<PathBuf>,
    /// Module executed after startup.
    pub entry_module: Option<PathBuf>,
    /// Append diagnostic output to this file.
    pub redirect_to_file: Option<PathBuf>,
    /// Send diagnostic output as UDP datagrams to this IPv4 host.
    pub redirect_to_udp_host: Option<String>,
    /// Destination port for UDP redirection.
    pub redirect_udp_port: u16,
    /// Route diagnostic output to the kernel debug channel.
    pub redirect_to_kernel_debug: bool,
    /// Bring up the on-screen console before anything else.
    pub force_console_at_startup: bool,
    /// End teardown through the platform process exit.
    pub exit_process_on_teardown: bool,
}

impl Default for AppConfiguration {
    fn default() -> Self {
        Self {
            verbose_logging: false,
            text_data_path: None,
            module_search_dir: None,
            module_config_dir: None,
            entry_module: None,
            redirect_to_file: None,
            redirect_to_udp_host: None,
            redirect_udp_port: DEFAULT_UDP_LOG_PORT,
            redirect_to_kernel_debug: false,
            force_console_at_startup: false,
            exit_process_on_teardown: false,
        }
    }
}

/// Borrowed view of the paths every boot needs.
#[derive(Clone, Copy, Debug)]
pub struct RequiredPaths<'a> {
    /// Text-conversion data file.
    pub text_data: &'a Path,
    /// Module search directory.
    pub module_search: &'a Path,
    /// Runtime configuration directory.
    pub module_config: &'a Path,
}

impl AppConfiguration {
    /// Check that the required paths are present.
    pub fn required_paths(&self) -> Result<RequiredPaths<'_>, ConfigError> {
        let mut missing = Vec::new();
        if self.text_data_path.is_none() {
            missing.push("text_data");
        }
        if self.module_search_dir.is_none() {
            missing.push("module_dir");
        }
        if self.module_config_dir.is_none() {
            missing.push("config_dir");
        }
        match (
            self.text_data_path.as_deref(),
            self.module_search_dir.as_deref(),
            self.module_config_dir.as_deref(),
        ) {
            (Some(text_data), Some(module_search), Some(module_config)) => Ok(RequiredPaths {
                text_data,
                module_search,
                module_config,
            }),
            _ => Err(ConfigError::MissingPaths(missing)),
        }
    }

    /// Whether any redirection target is configured.
    #[must_use]
    pub fn has_redirect_target(&self) -> bool {
        self.redirect_to_file.is_some()
            || self.redirect_to_udp_host.is_some()
            || self.redirect_to_kernel_debug
    }
}

/// Accumulates entries from a [`ConfigSource`] into an [`AppConfiguration`].
#[derive(Debug, Default)]
pub struct ConfigStore {
    config: AppConfiguration,
}

impl ConfigStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept one configuration entry; returns `false` for unrecognised pairs.
    pub fn on_entry(&mut self, section: &str, key: &str, value: &str) -> bool {
        let cfg = &mut self.config;
        match (section, key) {
            ("runtime", "logging") => cfg.verbose_logging = parse_flag(value),
            ("runtime", "text_data") => cfg.text_data_path = Some(PathBuf::from(unquote(value))),
            ("runtime", "module_dir") => {
                cfg.module_search_dir = Some(PathBuf::from(unquote(value)));
            }
            ("runtime", "config_dir") => {
                cfg.module_config_dir = Some(PathBuf::from(unquote(value)));
            }
            ("runtime", "entry_module") => {
                cfg.entry_module = Some(PathBuf::from(unquote(value)));
            }
            ("platform", "file_io_redirect") => {
                cfg.redirect_to_file = Some(PathBuf::from(unquote(value)));
            }
            ("platform", "udp_io_redirect") => {
                cfg.redirect_to_udp_host = Some(unquote(value).to_owned());
            }
            ("platform", "udp_io_port") => match unquote(value).parse::<u16>() {
                Ok(port) if port != 0 => cfg.redirect_udp_port = port,
                _ => return false,
            },
            ("platform", "debug_io_redirect") => cfg.redirect_to_kernel_debug = parse_flag(value),
            ("platform", "force_console_init") => cfg.force_console_at_startup = parse_flag(value),
            ("platform", "exit_process") => cfg.exit_process_on_teardown = parse_flag(value),
            _ => return false,
        }
        true
    }

    /// Drive `source` through this store.
    pub fn load(&mut self, source: &dyn ConfigSource) -> Result<(), ConfigError> {
        source.visit(&mut |section, key, value| self.on_entry(section, key, value))
    }

    /// Read and parse a TOML configuration file.
    pub fn load_file(path: &Path) -> Result<AppConfiguration, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut store = Self::new();
        store.load(&TomlSource::new(&text))?;
        Ok(store.finish())
    }

    /// Freeze the accumulated configuration.
    #[must_use]
    pub fn finish(self) -> AppConfiguration {
        self.config
    }
}

/// Producer of `(section, key, value)` configuration triples.
pub trait ConfigSource {
    /// Feed every entry to `sink`; a `false` return from `sink` must fail the load.
    fn visit(&self, sink: &mut dyn FnMut(&str, &str, &str) -> bool) -> Result<(), ConfigError>;
}

/// TOML-backed configuration source with one level of `[section]` tables.
pub struct TomlSource<'a> {
    text: &'a str,
}

impl<'a> TomlSource<'a> {
    /// Wrap TOML text.
    #[must_use]
    pub fn new(text: &'a str) -> Self {
        Self { text }
    }
}

impl ConfigSource for TomlSource<'_> {
    fn visit(&self, sink: &mut dyn FnMut(&str, &str, &str) -> bool) -> Result<(), ConfigError> {
        let table: toml::Table = self
            .text
            .parse()
            .map_err(|err: toml::de::Error| ConfigError::Malformed(err.message().to_owned()))?;
        for (section, entries) in &table {
            let toml::Value::Table(entries) = entries else {
                return Err(ConfigError::Rejected {
                    section: String::new(),
                    key: section.clone(),
                });
            };
            for (key, value) in entries {
                let text = match value {
                    toml::Value::String(s) => s.clone(),
                    toml::Value::Boolean(b) => b.to_string(),
                    toml::Value::Integer(i) => i.to_string(),
                    other => {
                        return Err(ConfigError::Malformed(format!(
                            "[{section}] {key} has unsupported type {}",
                            other.type_str()
                        )))
                    }
                };
                if !sink(section, key, &text) {
                    return Err(ConfigError::Rejected {
                        section: section.clone(),
                        key: key.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> bool {
    value == "true"
}

/// Strip one pair of matching surrounding quotes.
fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        if (first == b'"' || first == b'\'') && bytes[bytes.len() - 1] == first {
            return &value[1..value.len() - 1];
        }
    }
    value
}
