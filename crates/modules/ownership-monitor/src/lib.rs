//! Ownership-change syscall monitor.
//!
//! Observes every variant of the chown syscall family on entry and exit,
//! correlates the entry arguments with the matching return code through a
//! per-task cache slot, and emits one enriched [`goshawk_core::event::Event`]
//! per logical syscall. Nothing here is allowed to fail the observed syscall
//! or to block: every failure mode resolves to the smallest silent skip.

use goshawk_core::{
    event::{Event, EventClass, FileRef},
    pdk::{ConfigError, ContextEnricher, FileLayerResolver, ModuleConfig, TaskFilter},
    policy::PolicyResolver,
};
use hook_common::{EventSender, TaskId};
use nix::errno::Errno;

pub mod cache;
pub mod hooks;

mod correlator;

use cache::{CHOWN_SNAPSHOT_MASK, PendingOperation, SyscallCache};
use hooks::{EntryArgs, VariantDef, variant};

pub const MODULE_NAME: &str = "ownership-monitor";

/// The chown correlation pipeline with its injected collaborators.
///
/// Entry and exit hooks for all seven syscall variants dispatch into one
/// instance; invocations for different tasks may run concurrently while
/// invocations for the same task are serialized by the kernel.
pub struct OwnershipMonitor<F, R, E, S> {
    filter: F,
    policy: PolicyResolver,
    config: Config,
    cache: SyscallCache,
    resolver: R,
    enricher: E,
    sender: S,
}

impl<F, R, E, S> OwnershipMonitor<F, R, E, S>
where
    F: TaskFilter,
    R: FileLayerResolver,
    E: ContextEnricher,
    S: EventSender<Event>,
{
    pub fn new(
        filter: F,
        policy: PolicyResolver,
        config: Config,
        resolver: R,
        enricher: E,
        sender: S,
    ) -> Self {
        Self {
            filter,
            policy,
            config,
            cache: SyscallCache::new(),
            resolver,
            enricher,
            sender,
        }
    }

    /// Apply a new module configuration generation, typically observed on a
    /// watched config channel. In-flight operations keep the policy they
    /// resolved at entry; only later syscalls see the new decisions.
    pub fn reload_config(&mut self, module_config: &ModuleConfig) -> Result<(), ConfigError> {
        self.policy.reload(module_config)?;
        self.config = Config::try_from(module_config)?;
        Ok(())
    }

    /// Entry hook shared by the seven variant trampolines. Unknown syscall
    /// names are ignored. Always succeeds: the observed syscall is never
    /// affected.
    pub fn on_syscall_enter(&self, task: TaskId, syscall: &str, args: &EntryArgs) {
        if let Some(variant) = variant(syscall) {
            self.syscall_enter(task, variant, args);
        }
    }

    /// Dedicated exit hook of a variant. All seven converge here.
    pub fn on_syscall_exit(&self, task: TaskId, syscall: &str, retval: i64) {
        if variant(syscall).is_some() {
            self.syscall_exit(task, retval);
        }
    }

    /// The generic exit-observation tracepoint. Shares the correlator with
    /// the dedicated exit hooks; whichever observer fires first consumes the
    /// pending operation, the other one finds the slot empty.
    pub fn on_raw_syscall_exit(&self, task: TaskId, retval: i64) {
        self.syscall_exit(task, retval);
    }

    fn syscall_enter(&self, task: TaskId, variant: &VariantDef, args: &EntryArgs) {
        // Hot path: this runs for every chown-family call on the host, so the
        // discard check comes before any state mutation.
        if self.filter.is_discarded(&task) {
            return;
        }

        let policy = self.policy.resolve(EventClass::Chown);
        let normalized = (variant.normalize)(args);
        let ctx_id = self.cache.capture_snapshot(CHOWN_SNAPSHOT_MASK, &normalized);
        self.cache.push(
            &task,
            PendingOperation {
                class: EventClass::Chown,
                policy,
                uid: normalized.uid,
                gid: normalized.gid,
                file: FileRef {
                    path: normalized.path,
                    entry: args.entry,
                },
                ctx_id,
            },
        );
    }
}

/// Module configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Errno values whose failed syscalls are consumed without emission.
    /// Retry-style and environment-specific codes by default; the concrete
    /// classification is externally defined and can be replaced here.
    ignored_retvals: Vec<i32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ignored_retvals: vec![
                Errno::EINTR as i32,
                Errno::EAGAIN as i32,
                Errno::ENOSYS as i32,
            ],
        }
    }
}

impl Config {
    /// True for return codes which are consumed but never emitted.
    pub(crate) fn is_ignored(&self, retval: i64) -> bool {
        retval < 0 && self.ignored_retvals.contains(&(-retval as i32))
    }
}

impl TryFrom<&ModuleConfig> for Config {
    type Error = ConfigError;

    fn try_from(config: &ModuleConfig) -> Result<Self, Self::Error> {
        Ok(Config {
            ignored_retvals: config
                .get_list_with_default("ignored_retvals", Config::default().ignored_retvals)?,
        })
    }
}
