//! The six end-to-end scenarios this crate's call-tree instrumentation is
//! built around: a single scope, nested reuse, a depth ceiling, a
//! multi-thread merge, the disabled path, and report-time derivation.
//!
//! These tests share one process-wide `Manager` singleton and one
//! thread-local call tree per test thread, so scenarios that flip global
//! state (enable flag, max depth) run under `TEST_LOCK` to avoid racing
//! concurrently-run tests in this binary.
//!
//! Each scenario's measuring work runs on a `thread::spawn(...).join()`'d
//! worker thread created while `TEST_LOCK` is held. A worker's storage is
//! only handed off to the manager's merge pool when its `thread_local!`
//! state tears down, which happens during `join()` — running the measured
//! work directly on the test-harness thread instead would let that handoff
//! race past the end of the guarded section, since the harness thread's own
//! teardown happens later than the test function returning.

use perf_instrument::{
    finalize, get_max_depth, is_enabled, scope_begin, set_enabled, set_max_depth, CpuClock,
    CpuUtilization, WallClock,
};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

static TEST_LOCK: Mutex<()> = Mutex::new(());

fn lock() -> std::sync::MutexGuard<'static, ()> {
    TEST_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[test]
fn single_scope_measures_wall_clock() {
    let _guard = lock();
    set_enabled(true);
    set_max_depth(u32::MAX);

    thread::spawn(|| {
        let _scope = scope_begin("foo", 10, "cxx", false, vec![Box::new(WallClock::new())]);
        thread::sleep(Duration::from_millis(100));
    })
    .join()
    .unwrap();

    let dir = std::env::temp_dir().join(format!("perf_instrument_test_{}_single", std::process::id()));
    std::env::set_var("OUTPUT_PATH", &dir);
    finalize("single_scope").expect("finalize should succeed");

    let archive = std::fs::read_to_string(dir.join("single_scope.json")).unwrap();
    assert!(archive.contains("\"foo\""));
    assert!(archive.contains("wall_clock"));
    std::env::remove_var("OUTPUT_PATH");
}

#[test]
fn nested_scopes_reuse_the_same_node() {
    let _guard = lock();
    set_enabled(true);
    set_max_depth(u32::MAX);

    thread::spawn(|| {
        let _outer = scope_begin("outer", 20, "cxx", false, vec![Box::new(WallClock::new())]);
        {
            let _inner = scope_begin("inner", 21, "cxx", false, vec![Box::new(WallClock::new())]);
        }
        {
            let _inner_again = scope_begin("inner", 21, "cxx", false, vec![Box::new(WallClock::new())]);
        }
    })
    .join()
    .unwrap();

    let dir = std::env::temp_dir().join(format!("perf_instrument_test_{}_nested", std::process::id()));
    std::env::set_var("OUTPUT_PATH", &dir);
    finalize("nested").expect("finalize should succeed");
    let text = std::fs::read_to_string(dir.join("nested.out")).unwrap();

    let outer_line = text.lines().find(|l| l.contains("outer")).unwrap();
    let inner_line = text.lines().find(|l| l.contains("inner")).unwrap();
    assert!(outer_line.contains("[laps: 1]"));
    assert!(inner_line.contains("[laps: 2]"));
    std::env::remove_var("OUTPUT_PATH");
}

#[test]
fn max_depth_stores_only_the_outermost_scope() {
    let _guard = lock();
    set_enabled(true);
    let previous = get_max_depth();
    set_max_depth(1);

    thread::spawn(|| {
        let _one = scope_begin("level1", 30, "cxx", false, vec![Box::new(WallClock::new())]);
        {
            let _two = scope_begin("level2", 31, "cxx", false, vec![Box::new(WallClock::new())]);
            {
                let _three = scope_begin("level3", 32, "cxx", false, vec![Box::new(WallClock::new())]);
            }
        }
    })
    .join()
    .unwrap();

    set_max_depth(previous);

    let dir = std::env::temp_dir().join(format!("perf_instrument_test_{}_maxdepth", std::process::id()));
    std::env::set_var("OUTPUT_PATH", &dir);
    finalize("max_depth").expect("finalize should succeed");
    let text = std::fs::read_to_string(dir.join("max_depth.out")).unwrap();

    assert!(text.contains("level1"));
    assert!(!text.contains("level2"));
    assert!(!text.contains("level3"));
    std::env::remove_var("OUTPUT_PATH");
}

#[test]
fn multi_thread_scopes_merge_into_one_node_on_finalize() {
    let _guard = lock();
    set_enabled(true);
    set_max_depth(u32::MAX);

    let worker_a = thread::spawn(|| {
        for _ in 0..5 {
            let _scope = scope_begin("work", 40, "cxx", false, vec![Box::new(WallClock::new())]);
        }
    });
    let worker_b = thread::spawn(|| {
        for _ in 0..5 {
            let _scope = scope_begin("work", 40, "cxx", false, vec![Box::new(WallClock::new())]);
        }
    });
    worker_a.join().unwrap();
    worker_b.join().unwrap();

    let dir = std::env::temp_dir().join(format!("perf_instrument_test_{}_merge", std::process::id()));
    std::env::set_var("OUTPUT_PATH", &dir);
    finalize("merge").expect("finalize should succeed");
    let text = std::fs::read_to_string(dir.join("merge.out")).unwrap();

    let work_line = text.lines().find(|l| l.contains("work")).unwrap();
    assert!(work_line.contains("[laps: 10]"));
    std::env::remove_var("OUTPUT_PATH");
}

#[test]
fn disabled_manager_measures_nothing() {
    let _guard = lock();
    set_enabled(false);

    thread::spawn(|| {
        let _scope = scope_begin("never_recorded", 50, "cxx", false, vec![Box::new(WallClock::new())]);
    })
    .join()
    .unwrap();

    set_enabled(true);

    let dir = std::env::temp_dir().join(format!("perf_instrument_test_{}_disabled", std::process::id()));
    std::env::set_var("OUTPUT_PATH", &dir);
    finalize("disabled").expect("finalize should succeed");
    let text = std::fs::read_to_string(dir.join("disabled.out")).unwrap();

    assert!(!text.contains("never_recorded"));
    std::env::remove_var("OUTPUT_PATH");
}

#[test]
fn cpu_utilization_is_derived_at_report_time() {
    let _guard = lock();
    set_enabled(true);
    set_max_depth(u32::MAX);

    thread::spawn(|| {
        let _scope = scope_begin(
            "busy",
            60,
            "cxx",
            false,
            vec![
                Box::new(WallClock::new()),
                Box::new(CpuClock::new()),
                Box::new(CpuUtilization::new()),
            ],
        );
        let deadline = std::time::Instant::now() + Duration::from_millis(200);
        let mut acc: u64 = 0;
        while std::time::Instant::now() < deadline {
            acc = acc.wrapping_add(1);
        }
        std::hint::black_box(acc);
    })
    .join()
    .unwrap();

    let dir = std::env::temp_dir().join(format!("perf_instrument_test_{}_derive", std::process::id()));
    std::env::set_var("OUTPUT_PATH", &dir);
    finalize("derive").expect("finalize should succeed");
    let text = std::fs::read_to_string(dir.join("derive.out")).unwrap();

    let line = text.lines().find(|l| l.contains("busy")).unwrap();
    assert!(line.contains("cpu_util"));
    std::env::remove_var("OUTPUT_PATH");
}

#[test]
fn is_enabled_reflects_set_enabled() {
    let _guard = lock();
    let previous = is_enabled();
    set_enabled(false);
    assert!(!is_enabled());
    set_enabled(previous);
}
