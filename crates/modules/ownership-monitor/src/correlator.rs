//! Exit-side correlation: pop the pending operation, classify the return
//! code, enrich and emit.

use std::time::SystemTime;

use goshawk_core::{
    event::{
        ChownEvent, ContainerContext, Event, EventClass, FileEvent, Header, Payload,
        ProcessContext, SpanContext,
    },
    pdk::{ContextEnricher, FileLayerResolver, TaskFilter},
    policy::PolicyMode,
};
use hook_common::{EventSender, TaskId};

use crate::{MODULE_NAME, OwnershipMonitor, cache::PendingOperation};

impl<F, R, E, S> OwnershipMonitor<F, R, E, S>
where
    F: TaskFilter,
    R: FileLayerResolver,
    E: ContextEnricher,
    S: EventSender<Event>,
{
    pub(crate) fn syscall_exit(&self, task: TaskId, retval: i64) {
        // An empty slot is a valid outcome: the entry was discarded, the task
        // is not monitored, or another exit observer got here first.
        let Some(operation) = self.cache.pop(&task, EventClass::Chown) else {
            return;
        };

        // Consumed either way; these codes just never become events.
        if self.config.is_ignored(retval) {
            return;
        }
        if operation.policy.mode == PolicyMode::Discard {
            return;
        }

        self.sender.clone().send(self.assemble(&task, operation, retval));
    }

    fn assemble(&self, task: &TaskId, operation: PendingOperation, retval: i64) -> Event {
        // The concrete file identity comes from the resolver; on a miss the
        // event degrades to whatever the entry captured.
        let file = self
            .resolver
            .resolve_file_layer(&operation.file)
            .unwrap_or_else(|| FileEvent {
                path: operation
                    .file
                    .path
                    .as_deref()
                    .map(|path| path.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                ..Default::default()
            });

        let mut process = ProcessContext::default();
        let mut container = ContainerContext::default();
        let mut span = SpanContext::default();
        if let Some(handle) = self.enricher.fill_process(task, &mut process) {
            self.enricher.fill_container(handle, &mut container);
        }
        self.enricher.fill_span(task, &mut span);

        Event::new(
            Header {
                class: EventClass::Chown,
                timestamp: SystemTime::now(),
                source: MODULE_NAME.to_string(),
            },
            Payload::Chown(ChownEvent {
                retval,
                ctx_id: operation.ctx_id,
                file,
                uid: operation.uid,
                gid: operation.gid,
                process,
                container,
                span,
            }),
        )
    }
}
