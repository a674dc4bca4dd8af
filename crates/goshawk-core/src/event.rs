use std::{fmt, path::PathBuf, time::SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{EnumDiscriminants, EnumString};

/// Class of security event. Used to tag events on the wire and to key the
/// per-task syscall cache slots.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    strum::Display,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum EventClass {
    Chown,
}

impl EventClass {
    pub const COUNT: usize = 1;

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub(crate) header: Header,
    pub(crate) payload: Payload,
}

impl Event {
    pub fn new(header: Header, payload: Payload) -> Self {
        Self { header, payload }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header = self.header();
        let time = DateTime::<Utc>::from(header.timestamp).format("%Y-%m-%dT%TZ");
        let class = &header.class;
        let source = &header.source;
        let payload = self.payload();

        writeln!(f, "[{time} EVENT {class}] [{source}] {payload}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    pub class: EventClass,
    pub timestamp: SystemTime,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, EnumDiscriminants)]
#[serde(tag = "type", content = "content")]
#[strum_discriminants(derive(EnumString, Hash))]
#[strum_discriminants(name(PayloadDiscriminant))]
#[non_exhaustive]
pub enum Payload {
    Chown(ChownEvent),
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Chown(event) => write!(f, "Chown {event}"),
        }
    }
}

/// Output record for one correlated chown-family syscall.
///
/// Constructed at syscall exit from the pending operation and the return
/// code, then immediately serialized and emitted. Missing enrichment data
/// degrades to the field defaults, it never suppresses the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChownEvent {
    pub retval: i64,
    pub ctx_id: u64,
    pub file: FileEvent,
    pub uid: u32,
    pub gid: u32,
    pub process: ProcessContext,
    pub container: ContainerContext,
    pub span: SpanContext,
}

impl fmt::Display for ChownEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ file: {}, uid: {}, gid: {}, retval: {} }}",
            self.file.path, self.uid, self.gid, self.retval
        )
    }
}

/// Resolved file identity and layer data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEvent {
    pub path: String,
    pub inode: u64,
    pub mount_id: u32,
    pub in_upper_layer: bool,
}

/// Partial reference to the file a syscall operates on, captured at entry.
///
/// Descriptor-based syscall variants carry no pathname, so `path` stays
/// `None` for them; the concrete identity always comes from the file-layer
/// resolution step at exit, keyed by the filesystem entry handle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileRef {
    pub path: Option<PathBuf>,
    pub entry: Option<EntryHandle>,
}

/// Opaque handle to the kernel filesystem entry (dentry) of an operation,
/// assigned by the hook layer and understood only by the file-layer resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryHandle(pub u64);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessContext {
    pub pid: i32,
    pub tid: i32,
    pub ppid: i32,
    pub image: String,
    pub uid: u32,
    pub gid: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerContext {
    pub id: String,
    pub image: String,
}

/// Distributed-tracing identifiers attached to an event, correlating it with
/// the request trace active in the instrumented process, if any.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanContext {
    pub span_id: u64,
    pub trace_id: u128,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chown_event_is_tagged_with_its_class() {
        let event = Event::new(
            Header {
                class: EventClass::Chown,
                timestamp: SystemTime::UNIX_EPOCH,
                source: "ownership-monitor".to_string(),
            },
            Payload::Chown(ChownEvent {
                retval: 0,
                ctx_id: 1,
                file: FileEvent {
                    path: "/tmp/a".to_string(),
                    ..Default::default()
                },
                uid: 1000,
                gid: 1000,
                process: ProcessContext::default(),
                container: ContainerContext::default(),
                span: SpanContext::default(),
            }),
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["header"]["class"], "chown");
        assert_eq!(json["payload"]["type"], "Chown");
        assert_eq!(json["payload"]["content"]["file"]["path"], "/tmp/a");
    }

    #[test]
    fn event_class_parses_from_config_names() {
        use std::str::FromStr;
        assert_eq!(EventClass::from_str("chown").unwrap(), EventClass::Chown);
        assert!(EventClass::from_str("chmod").is_err());
    }
}
