//! The scope handle (`spec.md` §4.3): an RAII guard that brackets a region
//! of code, bridging the stable identity scheme (§4.4) and the per-thread
//! call tree (§4.5) the way `sample::Sampler` brackets a counter group's
//! read with acquire-in-`new`/release-in-`Drop` (`examples/Thaumy-perf-event-open/src/sample/mod.rs`).
//!
//! Depth and the running identity are kept balanced unconditionally, even
//! on the disabled path — only whether a measurement gets attached to
//! storage depends on `enabled`/`max_depth` (`spec.md` §7 kind 1, §8.5).

use crate::bundle::Bundle;
use crate::identity::Identity;
use crate::manager::{Manager, THREAD_STATE};
use crate::report;
use crate::storage::NodeId;

enum Target {
    /// Measured directly against the stored node's own accumulator — no
    /// clone, no report-on-exit print.
    Stored(NodeId),
    /// A fresh clone of the node's shape, measured standalone so it can be
    /// printed in isolation, then folded into the node on exit.
    Cloned { node: NodeId, bundle: Bundle },
    /// Disabled or past `max_depth`: measured but never attached to
    /// storage (`spec.md` §7 kind 1 — "not an error; still balances
    /// counters and produces no measurement").
    Ephemeral(Bundle),
}

/// A single bracketed region. Dropping it closes the region; there is no
/// other way to end one.
pub struct Scope {
    parent_identity: Identity,
    report_on_exit: bool,
    target: Target,
}

impl Scope {
    /// Enter a region identified by `(key, line)` under the caller's
    /// current scope, measuring with `components`.
    ///
    /// `components` is built fresh by the caller on every call — cheap
    /// relative to the measurement itself, and it keeps `Scope` from
    /// needing a registry of component factories keyed by call site.
    pub fn new(
        key: impl Into<String>,
        line: u32,
        tag: impl Into<String>,
        report_on_exit: bool,
        mut components: Vec<Box<dyn crate::component::Component>>,
    ) -> Scope {
        let key = key.into();
        let tag = tag.into();
        let manager = Manager::global();
        manager.ensure_initialized(&mut components);

        let (depth, identity, parent_identity) = THREAD_STATE.with(|cell| {
            let mut state = cell.borrow_mut();
            let parent_identity = state.current_identity;
            let identity = Identity::derive(parent_identity, &key, line);
            state.depth += 1;
            state.current_identity = identity;
            (state.depth, identity, parent_identity)
        });

        let enabled = manager.is_enabled();
        let max_depth = manager.max_depth();

        let target = if !enabled || depth > max_depth {
            log::trace!("{key}:{line} measured but not stored (enabled={enabled}, depth={depth}, max_depth={max_depth})");
            let mut bundle = Bundle::new(key, tag, depth, identity, components);
            bundle.start();
            Target::Ephemeral(bundle)
        } else {
            let template = Bundle::new(key, tag, depth, identity, components);
            let node = THREAD_STATE.with(|cell| cell.borrow_mut().storage.push(identity, &template));

            if report_on_exit {
                let mut clone = THREAD_STATE.with(|cell| {
                    let state = cell.borrow();
                    Bundle::zeroed_like(state.storage.node(node).accumulator(), identity, depth)
                });
                clone.start();
                Target::Cloned { node, bundle: clone }
            } else {
                THREAD_STATE.with(|cell| {
                    cell.borrow_mut().storage.node_mut(node).accumulator_mut().start();
                });
                Target::Stored(node)
            }
        };

        Scope { parent_identity, report_on_exit, target }
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        THREAD_STATE.with(|cell| {
            let mut state = cell.borrow_mut();
            state.depth = state
                .depth
                .checked_sub(1)
                .expect("scope exited without a matching entry (depth underflow)");
            state.current_identity = self.parent_identity;
        });

        match &mut self.target {
            Target::Stored(node) => {
                THREAD_STATE.with(|cell| {
                    cell.borrow_mut().storage.node_mut(*node).accumulator_mut().stop();
                });
            }
            Target::Cloned { node, bundle } => {
                bundle.stop();
                if self.report_on_exit {
                    report::emit_inline(bundle, Manager::global());
                }
                THREAD_STATE.with(|cell| {
                    cell.borrow_mut().storage.node_mut(*node).accumulator_mut().add_assign(bundle);
                });
            }
            Target::Ephemeral(bundle) => {
                bundle.stop();
                if self.report_on_exit {
                    report::emit_inline(bundle, Manager::global());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::test_support::Counter;

    fn reset_thread_state() {
        THREAD_STATE.with(|cell| {
            let mut state = cell.borrow_mut();
            state.depth = 0;
            state.current_identity = Identity::ROOT;
            state.storage = crate::storage::Storage::new();
        });
    }

    #[test]
    fn balances_depth_across_enter_and_exit() {
        reset_thread_state();
        {
            let _s = Scope::new("a", 1, "cxx", false, vec![Box::new(Counter::default())]);
            THREAD_STATE.with(|cell| assert_eq!(cell.borrow().depth, 1));
        }
        THREAD_STATE.with(|cell| assert_eq!(cell.borrow().depth, 0));
    }

    #[test]
    fn repeat_visits_accumulate_on_the_same_node() {
        reset_thread_state();
        for _ in 0..3 {
            let _s = Scope::new("loop_body", 10, "cxx", false, vec![Box::new(Counter::default())]);
        }
        THREAD_STATE.with(|cell| {
            let state = cell.borrow();
            let root = state.storage.root();
            let child = state.storage.node(root).children()[0];
            assert_eq!(state.storage.node(child).laps(), 3);
        });
    }

    #[test]
    fn disabled_manager_leaves_storage_untouched() {
        reset_thread_state();
        let manager = Manager::global();
        let was_enabled = manager.is_enabled();
        manager.set_enabled(false);
        {
            let _s = Scope::new("never_stored", 20, "cxx", false, vec![Box::new(Counter::default())]);
        }
        manager.set_enabled(was_enabled);
        THREAD_STATE.with(|cell| {
            let state = cell.borrow();
            assert_eq!(state.storage.node(state.storage.root()).children().len(), 0);
        });
    }

    #[test]
    #[should_panic(expected = "depth underflow")]
    fn unmatched_exit_panics() {
        reset_thread_state();
        THREAD_STATE.with(|cell| cell.borrow_mut().depth = 0);
        let scope = Scope::new("x", 1, "cxx", false, vec![]);
        drop(scope);
        THREAD_STATE.with(|cell| cell.borrow_mut().depth = 0);
        let phantom = Scope {
            parent_identity: Identity::ROOT,
            report_on_exit: false,
            target: Target::Ephemeral(Bundle::new("y", "cxx", 1, Identity::ROOT, vec![])),
        };
        drop(phantom);
    }
}
