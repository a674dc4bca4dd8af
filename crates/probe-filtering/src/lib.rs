//! # Events filtering
//!
//! This crate contains the logic for deciding whether the process behind a
//! hook invocation is interesting for the rest of the system or if all its
//! events should be discarded.
//!
//! # Requirements
//!
//! - The check runs on every hooked syscall on the host, before any state
//!   mutation, so it must be a single O(1) lookup.
//! - Support for global monitoring (track everything by default) and for very
//!   specific monitoring (track only a handful of targets).
//! - Allow whitelisting of uninteresting processes.
//! - Allow specification of multiple targets.
//!
//! # General design
//!
//! We allow the user to specify:
//! - Targets: a list of processes we're interested in
//!   - each target is either a Pid or an Image (the executable path)
//!     - Pid targets are checked only on startup
//!   - specifies if we should consider its children as targets as well
//! - Whitelist: a list of processes we're not interested in
//!   - always specified with Image
//!   - specifies if we should consider its children as whitelist as well
//! - Cgroup targets: every process inside a target cgroup is tracked.
//!
//! By default everything is interesting.
//! We do filtering based on process id, we ignore thread id.
//!
//! # Implementation
//!
//! The decision store maps each Pid to whether we should generate events for
//! it and for its children. It is seeded from `procfs` on startup and kept
//! current by the process lifecycle callbacks:
//! - on fork the child inherits `children_interesting` from its parent
//! - on exec the image rules are re-evaluated for the process
//! - on exit the entry is removed
//!
//! Probes consult the store through [`DiscardFilter::is_discarded`] before
//! doing anything else.

pub(crate) mod config;
pub(crate) mod interest;
pub(crate) mod process_tree;

pub use config::Config;
pub use interest::{DiscardFilter, ProcessUpdate, setup_discard_filter};
