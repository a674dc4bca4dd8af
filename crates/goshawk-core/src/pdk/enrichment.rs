use hook_common::TaskId;

use crate::event::{ContainerContext, FileEvent, FileRef, ProcessContext, SpanContext};

/// Cheap per-task predicate deciding whether to ignore all events from the
/// current process. Runs on every hooked syscall before any state mutation,
/// so implementations must be O(1).
pub trait TaskFilter {
    fn is_discarded(&self, task: &TaskId) -> bool;
}

/// Opaque reference into the process metadata cache, returned by a successful
/// process enrichment and used to look up the matching container entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessCacheHandle(pub u64);

/// Supplies file identity and layer data for the filesystem entry tied to an
/// operation.
///
/// Invoked synchronously right before emission, so implementations must be
/// non-blocking and bounded. `None` means the entry could not be resolved;
/// callers fall back to whatever was captured at syscall entry.
pub trait FileLayerResolver {
    fn resolve_file_layer(&self, file: &FileRef) -> Option<FileEvent>;
}

/// Process, container and span metadata providers.
///
/// All three fills are best-effort: on a cache miss the output argument is
/// left at its defaults and event assembly carries on.
pub trait ContextEnricher {
    /// Fill process metadata for `task`, returning a handle into the process
    /// cache when the task is known.
    fn fill_process(&self, task: &TaskId, process: &mut ProcessContext)
    -> Option<ProcessCacheHandle>;

    /// Fill container metadata for the process behind `handle`.
    fn fill_container(&self, handle: ProcessCacheHandle, container: &mut ContainerContext);

    /// Fill the distributed-tracing span active on `task`, if any.
    fn fill_span(&self, task: &TaskId, span: &mut SpanContext);
}
