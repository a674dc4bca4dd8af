use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use anyhow::{Context, Result};
use hook_common::{Pid, TaskId};
use tokio::sync::mpsc;

use crate::{
    config::Config,
    process_tree::{PID_0, ProcessData, ProcessTree},
};

/// Process lifecycle updates produced by the process monitor and consumed to
/// keep the decision store current.
#[derive(Debug, Clone)]
pub enum ProcessUpdate {
    Fork { pid: Pid, ppid: Pid },
    Exec { pid: Pid, image: String },
    Exit { pid: Pid },
}

/// Tracking status of a process and of its future children.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct PolicyDecision {
    pub(crate) interesting: bool,
    pub(crate) children_interesting: bool,
}

/// Cheap per-task predicate deciding whether to ignore all events from the
/// current process.
///
/// This runs on every hooked syscall on the host before any state mutation,
/// so the decision is a single map lookup. The store is seeded from procfs at
/// startup and kept current by the process lifecycle callbacks.
#[derive(Clone)]
pub struct DiscardFilter {
    inner: Arc<Inner>,
}

struct Inner {
    decisions: RwLock<HashMap<Pid, PolicyDecision>>,
    config: Config,
}

impl DiscardFilter {
    pub(crate) fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(Inner {
                decisions: RwLock::new(HashMap::new()),
                config,
            }),
        }
    }

    /// True if all events from the process behind `task` must be ignored.
    /// Filtering is process based, the thread id is ignored.
    pub fn is_discarded(&self, task: &TaskId) -> bool {
        let decisions = self.inner.decisions.read().unwrap();
        let interesting = decisions
            .get(&task.pid)
            .map(|decision| decision.interesting)
            .unwrap_or(self.inner.config.track_by_default);
        !interesting
    }

    /// A new process was forked: it inherits the tracking status its parent
    /// assigns to children.
    pub fn on_fork(&self, pid: Pid, ppid: Pid) {
        let mut decisions = self.inner.decisions.write().unwrap();
        let inherited = decisions
            .get(&ppid)
            .map(|decision| decision.children_interesting)
            .unwrap_or(self.inner.config.track_by_default);
        decisions.insert(
            pid,
            PolicyDecision {
                interesting: inherited,
                children_interesting: inherited,
            },
        );
    }

    /// A process changed image: re-evaluate the image rules for it.
    pub fn on_exec(&self, pid: Pid, image: &str) {
        let mut decisions = self.inner.decisions.write().unwrap();
        let mut decision = decisions.get(&pid).copied().unwrap_or(PolicyDecision {
            interesting: self.inner.config.track_by_default,
            children_interesting: self.inner.config.track_by_default,
        });
        if let Some(rule) = self
            .inner
            .config
            .rules
            .iter()
            .find(|rule| rule.image == image)
        {
            decision.interesting = rule.track;
            if rule.with_children {
                decision.children_interesting = rule.track;
            }
        }
        decisions.insert(pid, decision);
    }

    /// A process exited: drop its entry.
    pub fn on_exit(&self, pid: Pid) {
        self.inner.decisions.write().unwrap().remove(&pid);
    }

    fn set(&self, pid: Pid, decision: PolicyDecision) {
        log::trace!("Set decision for {}: {:?}", pid, decision);
        self.inner.decisions.write().unwrap().insert(pid, decision);
    }

    /// Seed the decision store by walking a parent-first process tree and
    /// applying the configured rules, propagating decisions to children.
    pub(crate) fn seed_from_tree(&self, tree: &ProcessTree) {
        for process in tree {
            self.seed_process(process);
        }
    }

    fn seed_process(&self, process: &ProcessData) {
        // Cgroup targets are applied before the process hierarchy; if one
        // already marked this process we don't want to override that decision
        // and stop tracking it.
        let decisions = self.inner.decisions.read().unwrap();
        if matches!(
            decisions.get(&process.pid),
            Some(PolicyDecision {
                interesting: true,
                children_interesting: true,
            })
        ) {
            return;
        }
        let config = &self.inner.config;
        let parent_decision = decisions.get(&process.parent).copied().unwrap_or_else(|| {
            if process.pid != PID_0 {
                log::warn!(
                    "process {} not found while seeding the decision store",
                    process.parent
                );
            }
            PolicyDecision {
                interesting: config.track_by_default,
                children_interesting: config.track_by_default,
            }
        });
        drop(decisions);

        let inherited = parent_decision.children_interesting;
        let mut decision = PolicyDecision {
            interesting: inherited,
            children_interesting: inherited,
        };
        if let Some(rule) = config.rules.iter().find(|r| r.image == process.image) {
            decision.interesting = rule.track;
            if rule.with_children {
                decision.children_interesting = rule.track;
            }
        }
        if let Some(rule) = config
            .pid_targets
            .iter()
            .find(|r| r.pid == process.pid)
        {
            decision.interesting = true;
            if rule.with_children {
                decision.children_interesting = true;
            }
        }
        if decision.interesting {
            log::debug!("tracking {} {}", process.pid, process.image);
        }
        self.set(process.pid, decision);
    }

    /// Apply a queued lifecycle update to both the process tree and the
    /// decision store. Used during setup to replay updates which raced the
    /// procfs scan.
    pub(crate) fn apply_update(&self, tree: &mut ProcessTree, update: ProcessUpdate) {
        match update {
            ProcessUpdate::Fork { pid, ppid } => {
                if let Err(err) = tree.fork(pid, ppid) {
                    hook_common::log_error("(pre-loading) fork event error", err);
                }
                self.on_fork(pid, ppid);
            }
            ProcessUpdate::Exec { pid, image } => {
                if let Err(err) = tree.exec(pid, &image) {
                    hook_common::log_error("(pre-loading) exec event error", err);
                }
                self.on_exec(pid, &image);
            }
            ProcessUpdate::Exit { pid } => {
                self.on_exit(pid);
            }
        }
    }

    /// Mark every process of the target cgroups as tracked, children included.
    fn track_target_cgroups(&self) -> Result<()> {
        let cgroups: Vec<String> = self
            .inner
            .config
            .cgroup_targets
            .iter()
            // the cgroup.procs file contains the list of pids belonging to this cgroup
            .map(|cgroup| format!("/sys/fs/cgroup{cgroup}/cgroup.procs"))
            .collect();
        for cgroup in cgroups {
            let processes = std::fs::read_to_string(&cgroup)
                .with_context(|| format!("Error reading processes in cgroup {:?}", cgroup))?;
            for process in processes.lines() {
                let pid: i32 = process.parse().context("Invalid content")?;
                self.set(
                    Pid::from_raw(pid),
                    PolicyDecision {
                        interesting: true,
                        children_interesting: true,
                    },
                );
            }
        }
        Ok(())
    }
}

impl goshawk_core::pdk::TaskFilter for DiscardFilter {
    fn is_discarded(&self, task: &TaskId) -> bool {
        DiscardFilter::is_discarded(self, task)
    }
}

/// Build the [`DiscardFilter`] by reading from procfs.
///
/// In order not to lose anything, this strategy is used:
/// 1. The process monitor is already running and queuing updates on
///    `rx_updates`.
/// 2. Cgroup targets are applied.
/// 3. The procfs process tree is walked parent-first applying pid and image
///    rules.
/// 4. Updates which raced the procfs scan are replayed, correcting decisions
///    derived from entries that did not exist yet.
pub fn setup_discard_filter(
    mut config: Config,
    rx_updates: &mut mpsc::UnboundedReceiver<ProcessUpdate>,
) -> Result<DiscardFilter> {
    // Add a rule to ignore the agent executable itself, to avoid loops where
    // agent events generate further events.
    if config.ignore_self {
        match whitelist_for_current_process() {
            Ok(rule) => config.rules.push(rule),
            Err(err) => log::error!("Failed to add current process to whitelist: {:?}", err),
        }
    }

    let mut tree = ProcessTree::load_from_procfs()?;
    let filter = DiscardFilter::new(config);
    if let Err(err) = filter.track_target_cgroups() {
        log::warn!("Error loading cgroup information: {err:?}");
    }
    filter.seed_from_tree(&tree);
    while let Ok(update) = rx_updates.try_recv() {
        filter.apply_update(&mut tree, update);
    }
    Ok(filter)
}

/// Return a rule which whitelists the current executable.
fn whitelist_for_current_process() -> Result<crate::config::Rule> {
    let agent_exec = std::fs::read_link("/proc/self/exe")
        .context("Failed to read current process executable name")?;
    Ok(crate::config::Rule {
        image: agent_exec.to_string_lossy().to_string(),
        with_children: true,
        track: false,
    })
}
