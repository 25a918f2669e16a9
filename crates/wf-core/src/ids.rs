//! Cheap, copyable handles.
//!
//! The source keeps cyclic references (context <-> dispatcher <-> coroutine
//! <-> channel <-> selector) alive with garbage collection; we break the
//! cycle the way the GLOSSARY's "Non-goals" note prescribes: integer handles
//! rather than pointers. Runtime objects reachable from user code
//! (`Channel<T>`, `Future<T>`) are `Rc`-shared directly instead of being
//! looked up in a central arena — Rust's ownership model makes that the
//! idiomatic substitute for an arena-of-everything, since the thing that
//! really needs a stable integer identity is coroutines (for scheduling
//! order and stack traces) and decisions (for the history correlation the
//! registry performs).

use std::fmt;

macro_rules! id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            pub const fn raw(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(CoroutineId, "Identifies one coroutine within a dispatcher.");
id_type!(ContextId, "Identifies one node in a context graph.");
id_type!(DecisionId, "Identifies one decision state machine in a registry.");

/// Monotonic id allocator. Unlike the teacher's `id_alloc::Ids`, handles here
/// are never freed and reused mid-run — a workflow run is short-lived and
/// determinism requires ids to never collide across the run, so the
/// generation-reuse machinery Bevy needs for long-lived entity storage buys
/// us nothing here.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    pub fn alloc(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}
