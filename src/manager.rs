//! Process- and thread-wide state (`spec.md` §4.6): the global enable/
//! max-depth switches, per-thread call-tree storage, and the merge pool
//! that collects a thread's storage when it exits so `finalize` can fold
//! every thread's tree into one before reporting.

use crate::component::Component;
use crate::error::Result;
use crate::report;
use crate::settings::Settings;
use crate::storage::Storage;
use std::cell::RefCell;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, OnceLock};

/// Per-thread bookkeeping a [`crate::scope::Scope`] reads and writes on
/// every entry/exit. Lives in a `thread_local!`, handed off to the
/// manager's merge pool when the thread tears down.
pub(crate) struct ThreadState {
    pub depth: u32,
    pub current_identity: crate::identity::Identity,
    pub storage: Storage,
    /// Component kinds whose `ensure_thread_init` has already run on this
    /// thread (`spec.md` §4.1).
    pub initialized_kinds: HashSet<&'static str>,
}

impl ThreadState {
    fn new() -> Self {
        ThreadState {
            depth: 0,
            current_identity: crate::identity::Identity::ROOT,
            storage: Storage::new(),
            initialized_kinds: HashSet::new(),
        }
    }
}

impl Drop for ThreadState {
    fn drop(&mut self) {
        let storage = std::mem::take(&mut self.storage);
        Manager::global().absorb(storage);
    }
}

thread_local! {
    pub(crate) static THREAD_STATE: RefCell<ThreadState> = RefCell::new(ThreadState::new());
}

/// Process-wide singleton. Every piece of shared, cross-thread state this
/// crate needs — lock-free where contention would matter (enable/depth
/// checked on every scope entry), behind a `Mutex` where it's touched only
/// at thread teardown and finalize.
pub struct Manager {
    enabled: AtomicBool,
    max_depth: AtomicU32,
    record_memory: AtomicBool,
    rank_prefix: Mutex<Option<u32>>,
    merge_pool: Mutex<Vec<Storage>>,
    io_lock: Mutex<()>,
    auto_list_init: String,
    globally_initialized: Mutex<HashSet<&'static str>>,
}

static GLOBAL: OnceLock<Manager> = OnceLock::new();

impl Manager {
    /// The process-wide instance, built from [`Settings::from_env`] on
    /// first access.
    pub fn global() -> &'static Manager {
        GLOBAL.get_or_init(|| {
            let settings = Settings::from_env();
            Manager {
                enabled: AtomicBool::new(settings.enabled),
                max_depth: AtomicU32::new(settings.max_depth),
                record_memory: AtomicBool::new(false),
                rank_prefix: Mutex::new(None),
                merge_pool: Mutex::new(Vec::new()),
                io_lock: Mutex::new(()),
                auto_list_init: settings.auto_list_init,
                globally_initialized: Mutex::new(HashSet::new()),
            }
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth.load(Ordering::Relaxed)
    }

    pub fn set_max_depth(&self, depth: u32) {
        self.max_depth.store(depth, Ordering::Relaxed);
    }

    pub fn should_record_memory(&self) -> bool {
        self.record_memory.load(Ordering::Relaxed)
    }

    pub fn set_record_memory(&self, enabled: bool) {
        self.record_memory.store(enabled, Ordering::Relaxed);
    }

    /// Rank-prefix label printed ahead of every report line — the
    /// multi-process complement to thread identity, read from the caller's
    /// MPI-like rank assignment (`SPEC_FULL.md` §3).
    pub fn rank_prefix(&self) -> Option<u32> {
        *self.rank_prefix.lock().unwrap()
    }

    pub fn set_rank_prefix(&self, rank: Option<u32>) {
        *self.rank_prefix.lock().unwrap() = rank;
    }

    /// Receive a thread's storage at teardown. Called by [`ThreadState`]'s
    /// `Drop`, never directly.
    fn absorb(&self, storage: Storage) {
        self.merge_pool.lock().unwrap().push(storage);
    }

    /// Invoke each component's `ensure_global_init`/`ensure_thread_init`
    /// exactly once per kind (globally) and exactly once per kind per
    /// thread, forwarding the `AUTO_LIST_INIT` directive (`spec.md` §4.1,
    /// §6). Called by [`crate::scope::Scope::new`] on every freshly built
    /// bundle's components, before anything measures.
    pub(crate) fn ensure_initialized(&self, components: &mut [Box<dyn Component>]) {
        for c in components.iter_mut() {
            let kind = c.kind();

            let first_globally = self.globally_initialized.lock().unwrap().insert(kind);
            if first_globally {
                c.ensure_global_init(&self.auto_list_init);
            }

            let first_on_thread =
                THREAD_STATE.with(|cell| cell.borrow_mut().initialized_kinds.insert(kind));
            if first_on_thread {
                c.ensure_thread_init(&self.auto_list_init);
            }
        }
    }

    /// Serialize a printed report line so concurrent `report_on_exit`
    /// scopes on different threads don't interleave mid-line.
    pub(crate) fn with_io_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.io_lock.lock().unwrap();
        f()
    }

    /// Merge every thread's call tree — the exited ones drained from the
    /// merge pool, plus the calling thread's own still-live tree — into
    /// one, then hand it to [`report`] for text and JSON emission.
    ///
    /// Draining the pool (rather than peeking it) is what makes repeated
    /// `finalize` calls observe each exited thread's contribution exactly
    /// once (`spec.md` §9 "Global state"); the calling thread's own tree
    /// is only merged by reference since it keeps running afterward.
    ///
    /// `output_basename` names both `<basename>.out` and `<basename>.json`
    /// under [`Settings::output_path`].
    pub fn finalize(&self, output_basename: impl AsRef<Path>) -> Result<()> {
        let mut combined = Storage::new();

        THREAD_STATE.with(|cell| {
            combined.merge(&cell.borrow().storage);
        });

        let drained = std::mem::take(&mut *self.merge_pool.lock().unwrap());
        for storage in &drained {
            combined.merge(storage);
        }

        report::write_outputs(&combined, self, output_basename.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::test_support::Counter;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Clone, Default)]
    struct InitCounting {
        inner: Counter,
    }

    static GLOBAL_INIT_CALLS: AtomicUsize = AtomicUsize::new(0);
    static THREAD_INIT_CALLS: AtomicUsize = AtomicUsize::new(0);

    impl Component for InitCounting {
        fn kind(&self) -> &'static str {
            "init_counting"
        }
        fn start(&mut self) {
            self.inner.start();
        }
        fn stop(&mut self) {
            self.inner.stop();
        }
        fn conditional_start(&mut self) -> bool {
            self.inner.conditional_start()
        }
        fn conditional_stop(&mut self) -> bool {
            self.inner.conditional_stop()
        }
        fn record(&mut self) {
            self.inner.record();
        }
        fn reset(&mut self) {
            self.inner.reset();
        }
        fn add_assign(&mut self, other: &dyn Component) {
            self.inner.add_assign(other);
        }
        fn sub_assign(&mut self, other: &dyn Component) {
            self.inner.sub_assign(other);
        }
        fn scale(&mut self, factor: f64) {
            self.inner.scale(factor);
        }
        fn serialize_into(&self, map: &mut serde_json::Map<String, serde_json::Value>) {
            self.inner.serialize_into(map);
        }
        fn print(&self, f: &mut dyn std::fmt::Write, index: usize, total: usize) -> std::fmt::Result {
            self.inner.print(f, index, total)
        }
        fn clone_box(&self) -> Box<dyn Component> {
            Box::new(self.clone())
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
        fn ensure_global_init(&self, _directive: &str) {
            GLOBAL_INIT_CALLS.fetch_add(1, Ordering::SeqCst);
        }
        fn ensure_thread_init(&mut self, _directive: &str) {
            THREAD_INIT_CALLS.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn ensure_initialized_runs_hooks_once_per_kind_per_thread() {
        let manager = Manager::global();
        let before_global = GLOBAL_INIT_CALLS.load(Ordering::SeqCst);
        let before_thread = THREAD_INIT_CALLS.load(Ordering::SeqCst);

        let mut a: Vec<Box<dyn Component>> = vec![Box::new(InitCounting::default())];
        manager.ensure_initialized(&mut a);
        let mut b: Vec<Box<dyn Component>> = vec![Box::new(InitCounting::default())];
        manager.ensure_initialized(&mut b);

        assert_eq!(GLOBAL_INIT_CALLS.load(Ordering::SeqCst), before_global + 1);
        assert_eq!(THREAD_INIT_CALLS.load(Ordering::SeqCst), before_thread + 1);
    }
}
