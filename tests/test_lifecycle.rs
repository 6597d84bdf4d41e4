// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Ordered bring-up, best-effort teardown and the fatal-halt path.
// Author: Lukas Bower

mod support;

use std::fs;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use embedhost::fatal::{EXIT_PROMPT, FATAL_EXIT_CODE};
use embedhost::runtime::{FATAL_LOG_BANNER, UNHANDLED_FAULT_BANNER};
use embedhost::{
    AppConfiguration, Buttons, FatalErrorHandler, FatalHalt, HaltReason, HostError,
    LibraryHandle, LifecycleController, LifecycleState, ModuleTables, SubsystemState,
};
use serial_test::serial;
use support::{expect_exit, Failures, MockPlatform, RecordingRuntime};
use tempfile::tempdir;

fn position(calls: &[String], call: &str) -> usize {
    calls
        .iter()
        .position(|c| c == call)
        .unwrap_or_else(|| panic!("{call} missing from {calls:?}"))
}

#[test]
#[serial]
fn initialize_then_terminate_runs_in_dependency_order() {
    support::init_logger();
    let dir = tempdir().unwrap();
    let platform = MockPlatform::new();
    let mut controller = LifecycleController::new(platform.clone(), ModuleTables::empty());
    let mut config = support::config_in(dir.path());
    config.verbose_logging = true;
    config.force_console_at_startup = true;
    let modules = config.module_search_dir.clone().unwrap();
    let etc = config.module_config_dir.clone().unwrap();
    let mut runtime = RecordingRuntime::default();

    controller.try_initialize(config, &mut runtime).unwrap();

    assert_eq!(controller.state(), LifecycleState::Running);
    assert_eq!(controller.rng_state(), SubsystemState::Ready);
    assert_eq!(controller.text_data_state(), SubsystemState::Ready);
    assert!(controller.console().is_active());
    assert_eq!(controller.console().input_state(), SubsystemState::Ready);
    assert_eq!(runtime.module_dirs, Some((modules, etc)));
    assert!(runtime.fault_hook.is_some());
    assert!(runtime.log_handler.is_some());
    let loader = runtime.loader.clone().unwrap();
    assert!(Arc::ptr_eq(&loader, &controller.resolver()));
    assert!(loader
        .resolve_symbol(LibraryHandle::Internal, "console_update")
        .is_ok());

    let calls = platform.calls();
    assert!(position(&calls, "console_init") < position(&calls, "rng_init"));
    assert!(position(&calls, "rng_init") < position(&calls, "text_data_install"));

    let report = controller.terminate();
    assert!(report.is_clean(), "{report:?}");
    assert_eq!(
        report.steps,
        vec!["console-refresh", "rng", "redirect", "console", "text-data"]
    );
    assert_eq!(controller.state(), LifecycleState::Terminated);
    assert_eq!(controller.rng_state(), SubsystemState::Disposed);
    assert_eq!(controller.text_data_state(), SubsystemState::Disposed);
    assert!(controller.config().is_none());

    let calls = platform.calls();
    assert!(position(&calls, "rng_exit") < position(&calls, "console_exit"));
    assert!(position(&calls, "console_exit") < position(&calls, "text_data_release"));
    assert_eq!(platform.count("socket_exit"), 0);

    assert!(controller.terminate().steps.is_empty());
}

#[test]
#[serial]
fn teardown_continues_past_failing_text_release() {
    support::init_logger();
    let dir = tempdir().unwrap();
    let platform = MockPlatform::with_failures(Failures {
        text_data_release: true,
        ..Failures::default()
    });
    let mut controller = LifecycleController::new(platform.clone(), ModuleTables::empty());
    let mut config = support::config_in(dir.path());
    config.redirect_to_udp_host = Some("127.0.0.1".into());
    config.redirect_udp_port = 9;
    controller
        .try_initialize(config, &mut RecordingRuntime::default())
        .unwrap();

    let report = controller.terminate();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, "text-data");
    assert_eq!(
        report.steps,
        vec!["console-refresh", "rng", "redirect", "sockets", "console", "text-data"]
    );
    assert_eq!(platform.count("rng_exit"), 1);
    assert_eq!(platform.count("socket_exit"), 1);
    assert_eq!(controller.state(), LifecycleState::Terminated);
}

#[test]
#[serial]
fn rng_failure_is_soft() {
    let dir = tempdir().unwrap();
    let platform = MockPlatform::with_failures(Failures {
        rng_init: true,
        ..Failures::default()
    });
    let mut controller = LifecycleController::new(platform.clone(), ModuleTables::empty());
    controller
        .try_initialize(support::config_in(dir.path()), &mut RecordingRuntime::default())
        .unwrap();

    assert_eq!(controller.state(), LifecycleState::Running);
    assert_eq!(controller.rng_state(), SubsystemState::Uninitialized);
    controller.terminate();
    assert_eq!(platform.count("rng_exit"), 0);
}

#[test]
#[serial]
fn text_data_failures_are_startup_fatal() {
    let dir = tempdir().unwrap();
    let platform = MockPlatform::with_failures(Failures {
        text_data_install: true,
        ..Failures::default()
    });
    let mut controller = LifecycleController::new(platform.clone(), ModuleTables::empty());
    let err = controller
        .try_initialize(support::config_in(dir.path()), &mut RecordingRuntime::default())
        .unwrap_err();
    assert!(matches!(err, HostError::TextDataInstall(_)));

    let mut controller = LifecycleController::new(MockPlatform::new(), ModuleTables::empty());
    let mut config = support::config_in(dir.path());
    config.text_data_path = Some(dir.path().join("absent.dat"));
    let mut runtime = RecordingRuntime::default();
    let err = controller.try_initialize(config, &mut runtime).unwrap_err();
    assert!(matches!(err, HostError::TextDataRead { .. }));
    assert!(runtime.loader.is_none());
}

#[test]
#[serial]
fn second_initialize_is_rejected() {
    let dir = tempdir().unwrap();
    let mut controller = LifecycleController::new(MockPlatform::new(), ModuleTables::empty());
    let mut runtime = RecordingRuntime::default();
    controller
        .try_initialize(support::config_in(dir.path()), &mut runtime)
        .unwrap();
    let err = controller
        .try_initialize(support::config_in(dir.path()), &mut runtime)
        .unwrap_err();
    assert!(matches!(
        err,
        HostError::InvalidState {
            state: LifecycleState::Running,
            ..
        }
    ));
    controller.terminate();
}

#[test]
#[serial]
fn missing_module_dir_enters_fatal_halt() {
    support::init_logger();
    let dir = tempdir().unwrap();
    let platform = MockPlatform::new();
    platform.press_after(3, Buttons::CONFIRM);
    let mut controller = LifecycleController::new(platform.clone(), ModuleTables::empty());
    let mut config = support::config_in(dir.path());
    config.module_search_dir = None;
    let mut runtime = RecordingRuntime::default();

    let code = expect_exit(|| controller.initialize(config, &mut runtime));

    assert_eq!(code, FATAL_EXIT_CODE);
    assert_eq!(controller.state(), LifecycleState::FatalHalt);
    assert!(runtime.loader.is_none());
    let debug = platform.debug_text();
    assert!(debug.contains("some paths are missing from the config file: module_dir"));
    assert!(debug.contains(EXIT_PROMPT));
    assert_eq!(platform.count("console_init"), 1);
    assert_eq!(platform.count("input_configure"), 1);
    assert_eq!(platform.polls.load(Ordering::SeqCst), 4);
    assert_eq!(platform.count("console_update"), 3);
    assert_eq!(platform.idles.load(Ordering::SeqCst), 0);
}

#[test]
#[serial]
fn fatal_halt_idles_when_a_redirect_owns_output() {
    let dir = tempdir().unwrap();
    let platform = MockPlatform::new();
    platform.press_after(5, Buttons::CANCEL);
    let mut controller = LifecycleController::new(platform.clone(), ModuleTables::empty());
    let mut config = support::config_in(dir.path());
    config.redirect_to_file = Some(dir.path().join("host.log"));
    controller
        .try_initialize(config, &mut RecordingRuntime::default())
        .unwrap();

    let code = expect_exit(|| controller.fatal_halt("guest corrupted its heap"));

    assert_eq!(code, FATAL_EXIT_CODE);
    assert_eq!(platform.count("console_init"), 0);
    assert_eq!(platform.idles.load(Ordering::SeqCst), 5);
    let log = fs::read_to_string(dir.path().join("host.log")).unwrap();
    assert!(log.contains("guest corrupted its heap\n"));
    assert!(log.contains(EXIT_PROMPT));

    let redirect = controller.redirect();
    assert!(redirect.write(b"after exit\n").is_err());
    assert!(!fs::read_to_string(dir.path().join("host.log"))
        .unwrap()
        .contains("after exit"));
}

#[test]
#[serial]
fn fault_hook_and_fatal_log_record_halt() {
    let dir = tempdir().unwrap();
    let platform = MockPlatform::new();
    let mut controller = LifecycleController::new(platform.clone(), ModuleTables::empty());
    let mut config = support::config_in(dir.path());
    config.verbose_logging = true;
    let mut runtime = RecordingRuntime::default();
    controller.try_initialize(config, &mut runtime).unwrap();

    let handler = runtime.log_handler.clone().unwrap();
    handler.on_log("runtime", "debug", "assembly loaded", false);
    assert!(platform.debug_text().contains("runtime debug assembly loaded"));
    assert_eq!(controller.state(), LifecycleState::Running);

    let code = expect_exit(|| handler.on_log("runtime", "error", "heap exhausted", true));
    assert_eq!(code, FATAL_EXIT_CODE);
    assert!(platform.debug_text().contains(FATAL_LOG_BANNER));
    assert_eq!(controller.state(), LifecycleState::FatalHalt);

    let hook = runtime.fault_hook.clone().unwrap();
    let code = expect_exit(|| hook.on_unhandled_fault("NullReference at Main()"));
    assert_eq!(code, FATAL_EXIT_CODE);
    let debug = platform.debug_text();
    let banner = debug.find(UNHANDLED_FAULT_BANNER).unwrap();
    let rendered = debug.find("NullReference at Main()").unwrap();
    assert!(banner < rendered);
}

#[test]
#[serial]
fn quiet_runtime_gets_no_log_handler() {
    let dir = tempdir().unwrap();
    let mut controller = LifecycleController::new(MockPlatform::new(), ModuleTables::empty());
    let mut runtime = RecordingRuntime::default();
    controller
        .try_initialize(support::config_in(dir.path()), &mut runtime)
        .unwrap();
    assert!(runtime.log_handler.is_none());
    assert!(runtime.fault_hook.is_some());
    controller.terminate();
}

#[test]
#[serial]
fn exit_process_on_teardown_exits_cleanly() {
    let dir = tempdir().unwrap();
    let platform = MockPlatform::new();
    let mut controller = LifecycleController::new(platform.clone(), ModuleTables::empty());
    let config = AppConfiguration {
        exit_process_on_teardown: true,
        ..support::config_in(dir.path())
    };
    controller
        .try_initialize(config, &mut RecordingRuntime::default())
        .unwrap();

    let code = expect_exit(|| {
        controller.terminate();
    });
    assert_eq!(code, 0);
    assert_eq!(platform.count("text_data_release"), 1);
}

struct RecordingHandler {
    messages: std::sync::Mutex<Vec<String>>,
}

impl FatalErrorHandler for RecordingHandler {
    fn halt(&self, message: &str) -> ! {
        self.messages.lock().unwrap().push(message.to_owned());
        std::panic::panic_any(support::ProcessExit(42))
    }
}

#[test]
#[serial]
fn custom_fatal_handler_receives_startup_error() {
    let dir = tempdir().unwrap();
    let handler = Arc::new(RecordingHandler {
        messages: std::sync::Mutex::new(Vec::new()),
    });
    let mut controller = LifecycleController::new(MockPlatform::new(), ModuleTables::empty())
        .with_fatal_handler(handler.clone());
    let mut config = support::config_in(dir.path());
    config.text_data_path = None;
    config.module_config_dir = None;

    let code = expect_exit(|| controller.initialize(config, &mut RecordingRuntime::default()));

    assert_eq!(code, 42);
    assert_eq!(
        handler.messages.lock().unwrap().as_slice(),
        ["some paths are missing from the config file: text_data, config_dir"]
    );
}

#[test]
fn halt_wait_loop_stops_on_confirm() {
    let platform = MockPlatform::new();
    platform.press_after(2, Buttons::CONFIRM | Buttons::A);
    let controller = LifecycleController::new(platform.clone(), ModuleTables::empty());
    let halt = FatalHalt::new(platform.clone(), controller.console(), controller.redirect());
    assert_eq!(halt.wait_for_exit_gesture(), HaltReason::Confirmed);
    assert_eq!(platform.idles.load(Ordering::SeqCst), 2);
}
