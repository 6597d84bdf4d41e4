// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Development entry point that boots the host lifecycle against the host platform.
// Author: Lukas Bower

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use embedhost::config::DEFAULT_CONFIG_PATH;
use embedhost::lifecycle::entry_module_dir;
use embedhost::{
    logging, ConfigStore, FaultHook, HostPlatform, LibraryHandle, LifecycleController,
    ModuleTables, Platform, RuntimeHost, RuntimeLogHandler, SymbolResolver,
};
use log::{debug, info, warn};

#[derive(Parser)]
#[command(
    name = "embedhost",
    about = "Boot the runtime host lifecycle with statically linked native modules",
    version = "0.1"
)]
struct Cli {
    /// Configuration file to load.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Echo the kernel debug channel to standard error.
    #[arg(long)]
    debug_echo: bool,
    /// Entry module, overriding `runtime.entry_module`.
    entry: Option<String>,
}

/// Runtime stand-in that records what the host hands over and checks the entry module exists.
#[derive(Default)]
struct DryRunRuntime {
    module_dirs: Option<(PathBuf, PathBuf)>,
    loader: Option<Arc<SymbolResolver>>,
    fault_hook: Option<FaultHook>,
    log_handler: Option<RuntimeLogHandler>,
}

impl RuntimeHost for DryRunRuntime {
    fn set_module_dirs(&mut self, module_dir: &Path, config_dir: &Path) {
        self.module_dirs = Some((module_dir.to_path_buf(), config_dir.to_path_buf()));
    }

    fn install_loader(&mut self, resolver: Arc<SymbolResolver>) {
        self.loader = Some(resolver);
    }

    fn install_fault_hook(&mut self, hook: FaultHook) {
        self.fault_hook = Some(hook);
    }

    fn install_log_handler(&mut self, handler: RuntimeLogHandler) {
        self.log_handler = Some(handler);
    }
}

impl DryRunRuntime {
    fn launch(&self, module: &Path) -> Result<()> {
        let loader = self
            .loader
            .as_ref()
            .ok_or_else(|| anyhow!("loader fallback was never installed"))?;
        if self.fault_hook.is_none() {
            return Err(anyhow!("fault hook was never installed"));
        }
        let handle = loader.load(None)?;
        let update = loader.resolve_symbol(handle, "console_update")?;
        debug!(
            "[runtime] {} console_update at {update:?}",
            LibraryHandle::Internal.library_name()
        );
        if let Some((module_dir, config_dir)) = &self.module_dirs {
            debug!(
                "[runtime] module_dir={} config_dir={}",
                module_dir.display(),
                config_dir.display()
            );
        }
        if let Some(handler) = &self.log_handler {
            handler.on_log("runtime", "debug", "dry run, guest code is not executed", false);
        }
        std::fs::metadata(module)
            .with_context(|| format!("failed to load module {}", module.display()))?;
        Ok(())
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = ConfigStore::load_file(&cli.config).context("startup configuration")?;

    let platform: Arc<dyn Platform> = Arc::new(HostPlatform::new().with_debug_echo(cli.debug_echo));
    let mut controller = LifecycleController::new(platform, ModuleTables::empty());
    if let Err(err) = logging::init(controller.redirect(), config.verbose_logging) {
        eprintln!("embedhost: logger already installed: {err}");
    }

    let entry = cli.entry.clone().or_else(|| {
        config
            .entry_module
            .as_ref()
            .map(|path| path.display().to_string())
    });

    let mut runtime = DryRunRuntime::default();
    controller.initialize(config, &mut runtime);

    let Some(entry) = entry else {
        controller.fatal_halt("No entry module was specified");
    };

    let mut module = PathBuf::from(&entry);
    if let Some(dir) = entry_module_dir(&entry) {
        match std::env::set_current_dir(dir) {
            Ok(()) => {
                if let Some(name) = Path::new(&entry).file_name() {
                    module = PathBuf::from(name);
                }
            }
            Err(err) => warn!("[embedhost] chdir to {dir} failed: {err}"),
        }
    }

    info!("Loading module {entry}");
    if let Err(err) = runtime.launch(&module) {
        controller.fatal_halt(&format!("{err:#}"));
    }

    let report = controller.terminate();
    if !report.is_clean() {
        warn!(
            "[embedhost] teardown failures: {}",
            report
                .failures
                .iter()
                .map(|(step, _)| *step)
                .collect::<Vec<_>>()
                .join(",")
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("embedhost: {err:#}");
            ExitCode::from(1)
        }
    }
}
