use super::*;
use tether_core::IdleOutcome;

#[test]
fn std_clock_measures_forward_time() {
    let clock = StdClock;
    let start = clock.now();
    std::thread::sleep(Duration::from_millis(2));

    assert!(clock.elapsed_millis(start) >= 1);
    assert!(clock.elapsed(start) >= Duration::from_millis(2));
}

#[test]
fn run_idle_flushes_reported_elements() {
    let runtime = StdRuntime::new();
    runtime.runtime_handle().report_deleted(&[1, 2, 3]);

    let report = runtime.run_idle();

    assert_eq!(report.outcome, IdleOutcome::Completed);
    assert_eq!(report.flush.processed, 3);
    assert_eq!(runtime.runtime().deleted_nodes().pending_len(), 0);
}

#[test]
fn zero_budget_yields_without_processing() {
    let runtime = StdRuntime::with_config(RuntimeConfig {
        idle_budget_millis: 0,
        ..RuntimeConfig::default()
    });
    runtime.runtime_handle().report_deleted(&[1]);

    let report = runtime.run_idle();

    assert_eq!(report.outcome, IdleOutcome::Yielded);
    assert_eq!(report.flush.remaining, 1);
}

#[test]
fn from_runtime_shares_state_with_the_wrapped_runtime() {
    let runtime = Runtime::new();
    let std_runtime = StdRuntime::from_runtime(runtime.clone());

    runtime.deleted_nodes().report(&[9]);
    assert_eq!(std_runtime.runtime().deleted_nodes().pending_ids(), vec![9]);
}
