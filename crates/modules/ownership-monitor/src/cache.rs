//! Per-task syscall correlation store.
//!
//! One slot per `(thread, event class)` pair links a syscall's entry with its
//! exit. Syscalls on a single thread are serialized by the kernel, so a slot
//! never holds more than one in-flight operation: a push over a stale entry
//! covers signal interruption and non-matching exits, a pop is destructive so
//! concurrent exit observers produce at most one event.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use goshawk_core::{
    event::{EventClass, FileRef},
    policy::Policy,
};
use hook_common::{Pid, TaskId};

use crate::hooks::ChownArgs;

/// Argument selector bits for context snapshots, mirroring the raw argument
/// positions of the normalized `(path, uid, gid)` signature.
pub const SNAP_ARG_STR0: u8 = 1 << 0;
pub const SNAP_ARG_INT1: u8 = 1 << 1;
pub const SNAP_ARG_INT2: u8 = 1 << 2;

pub const CHOWN_SNAPSHOT_MASK: u8 = SNAP_ARG_STR0 | SNAP_ARG_INT1 | SNAP_ARG_INT2;

/// An operation observed at syscall entry, waiting for its exit.
///
/// Exclusively owned by one per-task cache slot: created on entry, consumed
/// exactly once at exit, or silently overwritten if no matching exit ever
/// arrives.
#[derive(Debug, Clone)]
pub struct PendingOperation {
    pub class: EventClass,
    pub policy: Policy,
    pub uid: u32,
    pub gid: u32,
    pub file: FileRef,
    pub ctx_id: u64,
}

/// Raw captured arguments of a syscall entry, kept for audit purposes and
/// linked 1:1 to a [`PendingOperation`] through its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSnapshot {
    pub id: u64,
    pub path: Option<PathBuf>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

/// Bound on retained snapshots; old entries are overwritten, never freed.
const SNAPSHOT_SLOTS: usize = 256;

pub struct SyscallCache {
    slots: Mutex<HashMap<(Pid, EventClass), PendingOperation>>,
    snapshots: Mutex<Vec<Option<ContextSnapshot>>>,
    next_ctx_id: AtomicU64,
}

impl Default for SyscallCache {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            snapshots: Mutex::new(vec![None; SNAPSHOT_SLOTS]),
            next_ctx_id: AtomicU64::new(1),
        }
    }
}

impl SyscallCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the selected raw arguments and return the id linking them to
    /// the pending operation.
    pub fn capture_snapshot(&self, mask: u8, args: &ChownArgs) -> u64 {
        let id = self.next_ctx_id.fetch_add(1, Ordering::Relaxed);
        let snapshot = ContextSnapshot {
            id,
            path: (mask & SNAP_ARG_STR0 != 0)
                .then(|| args.path.clone())
                .flatten(),
            uid: (mask & SNAP_ARG_INT1 != 0).then_some(args.uid),
            gid: (mask & SNAP_ARG_INT2 != 0).then_some(args.gid),
        };
        let mut snapshots = self.snapshots.lock().unwrap();
        snapshots[(id as usize) % SNAPSHOT_SLOTS] = Some(snapshot);
        id
    }

    /// Audit lookup. Returns `None` for unknown ids and for snapshots already
    /// overwritten by newer captures.
    pub fn snapshot(&self, id: u64) -> Option<ContextSnapshot> {
        let snapshots = self.snapshots.lock().unwrap();
        snapshots[(id as usize) % SNAPSHOT_SLOTS]
            .as_ref()
            .filter(|snapshot| snapshot.id == id)
            .cloned()
    }

    /// EMPTY -> PENDING. An unconsumed entry of the same type on the same
    /// task is stale and gets overwritten.
    pub fn push(&self, task: &TaskId, operation: PendingOperation) {
        let mut slots = self.slots.lock().unwrap();
        if let Some(stale) = slots.insert((task.tid, operation.class), operation) {
            log::trace!("task {task}: overwriting stale {} entry", stale.class);
        }
    }

    /// PENDING -> EMPTY. Destructive: a second pop for the same logical
    /// syscall observes an empty slot.
    pub fn pop(&self, task: &TaskId, class: EventClass) -> Option<PendingOperation> {
        self.slots.lock().unwrap().remove(&(task.tid, class))
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.slots.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operation(uid: u32, ctx_id: u64) -> PendingOperation {
        PendingOperation {
            class: EventClass::Chown,
            policy: Policy::default(),
            uid,
            gid: uid,
            file: FileRef::default(),
            ctx_id,
        }
    }

    #[test]
    fn pop_is_destructive() {
        let cache = SyscallCache::new();
        let task = TaskId::from_pid(Pid::from_raw(10));
        cache.push(&task, operation(0, 1));
        assert!(cache.pop(&task, EventClass::Chown).is_some());
        assert!(cache.pop(&task, EventClass::Chown).is_none());
    }

    #[test]
    fn push_overwrites_stale_entry() {
        let cache = SyscallCache::new();
        let task = TaskId::from_pid(Pid::from_raw(10));
        cache.push(&task, operation(1, 1));
        cache.push(&task, operation(2, 2));
        let popped = cache.pop(&task, EventClass::Chown).unwrap();
        assert_eq!(popped.uid, 2);
        assert!(cache.pop(&task, EventClass::Chown).is_none());
    }

    #[test]
    fn slots_are_per_thread() {
        let cache = SyscallCache::new();
        let task_a = TaskId::new(Pid::from_raw(10), Pid::from_raw(11), 0);
        let task_b = TaskId::new(Pid::from_raw(10), Pid::from_raw(12), 0);
        cache.push(&task_a, operation(1, 1));
        assert!(cache.pop(&task_b, EventClass::Chown).is_none());
        assert!(cache.pop(&task_a, EventClass::Chown).is_some());
    }

    #[test]
    fn snapshots_respect_the_selector_mask() {
        let cache = SyscallCache::new();
        let args = ChownArgs {
            path: Some(PathBuf::from("/tmp/a")),
            uid: 1000,
            gid: 1001,
        };
        let id = cache.capture_snapshot(SNAP_ARG_INT1 | SNAP_ARG_INT2, &args);
        let snapshot = cache.snapshot(id).unwrap();
        assert_eq!(snapshot.path, None);
        assert_eq!(snapshot.uid, Some(1000));
        assert_eq!(snapshot.gid, Some(1001));
    }

    #[test]
    fn old_snapshots_are_overwritten_not_leaked() {
        let cache = SyscallCache::new();
        let args = ChownArgs {
            path: None,
            uid: 0,
            gid: 0,
        };
        let first = cache.capture_snapshot(CHOWN_SNAPSHOT_MASK, &args);
        for _ in 0..SNAPSHOT_SLOTS {
            cache.capture_snapshot(CHOWN_SNAPSHOT_MASK, &args);
        }
        assert!(cache.snapshot(first).is_none());
    }
}
