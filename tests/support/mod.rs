// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Recording platform and runtime doubles shared by the integration tests.
// Author: Lukas Bower
#![allow(dead_code)]

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use embedhost::{
    AppConfiguration, Buttons, FaultHook, Platform, PlatformError, RuntimeHost,
    RuntimeLogHandler, SymbolResolver,
};

/// Panic payload standing in for a real process exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit(pub i32);

/// Primitives the mock should fail.
#[derive(Clone, Debug, Default)]
pub struct Failures {
    pub rng_init: bool,
    pub socket_init: bool,
    pub text_data_install: bool,
    pub text_data_release: bool,
    pub console_init: bool,
}

pub struct MockPlatform {
    calls: Mutex<Vec<String>>,
    debug: Mutex<Vec<u8>>,
    console: Mutex<Vec<u8>>,
    failures: Mutex<Failures>,
    pub socket_inits: AtomicUsize,
    pub socket_init_delay: Mutex<Duration>,
    polls_before_press: AtomicUsize,
    press: Mutex<Buttons>,
    pub polls: AtomicUsize,
    pub idles: AtomicUsize,
}

impl MockPlatform {
    pub fn new() -> Arc<Self> {
        Self::with_failures(Failures::default())
    }

    pub fn with_failures(failures: Failures) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            debug: Mutex::new(Vec::new()),
            console: Mutex::new(Vec::new()),
            failures: Mutex::new(failures),
            socket_inits: AtomicUsize::new(0),
            socket_init_delay: Mutex::new(Duration::ZERO),
            polls_before_press: AtomicUsize::new(0),
            press: Mutex::new(Buttons::CONFIRM),
            polls: AtomicUsize::new(0),
            idles: AtomicUsize::new(0),
        })
    }

    /// Report `buttons` after `polls` empty samples.
    pub fn press_after(&self, polls: usize, buttons: Buttons) {
        self.polls_before_press.store(polls, Ordering::SeqCst);
        *self.press.lock().unwrap() = buttons;
    }

    pub fn set_failures(&self, failures: Failures) {
        *self.failures.lock().unwrap() = failures;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == call)
            .count()
    }

    pub fn debug_text(&self) -> String {
        String::from_utf8_lossy(&self.debug.lock().unwrap()).into_owned()
    }

    pub fn console_text(&self) -> String {
        String::from_utf8_lossy(&self.console.lock().unwrap()).into_owned()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_owned());
    }

    fn outcome(&self, call: &'static str, fail: bool) -> Result<(), PlatformError> {
        self.record(call);
        if fail {
            Err(PlatformError::ResultCode { op: call, code: 0x2a })
        } else {
            Ok(())
        }
    }

    fn failures(&self) -> Failures {
        self.failures.lock().unwrap().clone()
    }
}

impl Platform for MockPlatform {
    fn debug_output(&self, bytes: &[u8]) {
        let mut debug = self.debug.lock().unwrap();
        debug.extend_from_slice(bytes);
        if !bytes.ends_with(b"\n") {
            debug.push(b'\n');
        }
    }

    fn console_write(&self, bytes: &[u8]) {
        self.console.lock().unwrap().extend_from_slice(bytes);
    }

    fn console_init(&self) -> Result<(), PlatformError> {
        let fail = self.failures().console_init;
        self.outcome("console_init", fail)
    }

    fn console_update(&self) {
        self.record("console_update");
    }

    fn console_exit(&self) -> Result<(), PlatformError> {
        self.outcome("console_exit", false)
    }

    fn input_configure(&self) {
        self.record("input_configure");
    }

    fn input_poll(&self) -> Buttons {
        let n = self.polls.fetch_add(1, Ordering::SeqCst);
        if n >= self.polls_before_press.load(Ordering::SeqCst) {
            *self.press.lock().unwrap()
        } else {
            Buttons::empty()
        }
    }

    fn rng_init(&self) -> Result<(), PlatformError> {
        let fail = self.failures().rng_init;
        self.outcome("rng_init", fail)
    }

    fn rng_exit(&self) -> Result<(), PlatformError> {
        self.outcome("rng_exit", false)
    }

    fn socket_init(&self) -> Result<(), PlatformError> {
        self.socket_inits.fetch_add(1, Ordering::SeqCst);
        let delay = *self.socket_init_delay.lock().unwrap();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        let fail = self.failures().socket_init;
        self.outcome("socket_init", fail)
    }

    fn socket_exit(&self) -> Result<(), PlatformError> {
        self.outcome("socket_exit", false)
    }

    fn text_data_install(&self, data: Vec<u8>) -> Result<(), PlatformError> {
        let fail = self.failures().text_data_install || data.is_empty();
        self.outcome("text_data_install", fail)
    }

    fn text_data_release(&self) -> Result<(), PlatformError> {
        let fail = self.failures().text_data_release;
        self.outcome("text_data_release", fail)
    }

    fn idle(&self, _period: Duration) {
        self.idles.fetch_add(1, Ordering::SeqCst);
    }

    fn exit_process(&self, code: i32) -> ! {
        self.record(&format!("exit_process({code})"));
        panic::panic_any(ProcessExit(code))
    }
}

/// Runtime double recording everything the controller installs.
#[derive(Default)]
pub struct RecordingRuntime {
    pub module_dirs: Option<(PathBuf, PathBuf)>,
    pub loader: Option<Arc<SymbolResolver>>,
    pub fault_hook: Option<FaultHook>,
    pub log_handler: Option<RuntimeLogHandler>,
}

impl RuntimeHost for RecordingRuntime {
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

/// Configuration with every required path pointing into `dir`.
pub fn config_in(dir: &Path) -> AppConfiguration {
    let text_data = dir.join("textdata.dat");
    fs::write(&text_data, b"conversion tables").unwrap();
    let modules = dir.join("modules");
    let etc = dir.join("etc");
    fs::create_dir_all(&modules).unwrap();
    fs::create_dir_all(&etc).unwrap();
    AppConfiguration {
        text_data_path: Some(text_data),
        module_search_dir: Some(modules),
        module_config_dir: Some(etc),
        ..AppConfiguration::default()
    }
}

/// Run `f`, which must end in a process exit, and return the exit code.
pub fn expect_exit<F: FnOnce()>(f: F) -> i32 {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => panic!("expected the process to exit"),
        Err(payload) => match payload.downcast::<ProcessExit>() {
            Ok(exit) => exit.0,
            Err(other) => panic::resume_unwind(other),
        },
    }
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
