//! Identity of the task observed by a hook invocation.

use std::fmt;

use nix::unistd::Pid;

/// Identity of the kernel task a hook fired for.
///
/// Syscalls on a single thread are serialized by the kernel, so `tid` is the
/// natural correlation key between a syscall entry and its exit. `pid` and
/// `cgroup_id` identify the process for filtering purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId {
    /// Thread group id (the process).
    pub pid: Pid,
    /// Thread id (the task actually running the syscall).
    pub tid: Pid,
    /// Id of the cgroup the task belongs to, 0 if unknown.
    pub cgroup_id: u64,
}

impl TaskId {
    pub fn new(pid: Pid, tid: Pid, cgroup_id: u64) -> Self {
        Self {
            pid,
            tid,
            cgroup_id,
        }
    }

    /// Identity for a single threaded process where pid == tid.
    pub fn from_pid(pid: Pid) -> Self {
        Self::new(pid, pid, 0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.pid, self.tid)
    }
}
