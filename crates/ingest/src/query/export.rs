//! Export - projection into the nested common event schema.
//!
//! This JSON shape is the engine's only wire contract with downstream
//! indexers. Groups with nothing in them are left out of the document.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::parser::serde_utils::{deserialize_fields_from_map, serialize_fields_as_map};
use crate::parser::{LogFormat, NormalizedEvent, Severity};

macro_rules! group_is_empty {
    ($ty:ty { $($field:ident),+ }) => {
        impl $ty {
            pub fn is_empty(&self) -> bool {
                true $(&& self.$field.is_none())+
            }
        }
    };
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DestinationGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Always present: it carries the declared format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_out: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

/// Always present: it carries the original line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facility: Option<String>,
    pub original: String,
}

group_is_empty!(SourceGroup { ip, port, hostname, service });
group_is_empty!(DestinationGroup { ip, port });
group_is_empty!(UserGroup { id, name });
group_is_empty!(NetworkGroup { protocol, bytes_in, bytes_out });
group_is_empty!(HttpGroup { method, status, url, user_agent });
group_is_empty!(FileGroup { path, hash });
group_is_empty!(ProcessGroup { name, pid });

/// One event in the common schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonSchemaEvent {
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,
    pub level: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "SourceGroup::is_empty")]
    pub source: SourceGroup,
    #[serde(default, skip_serializing_if = "DestinationGroup::is_empty")]
    pub destination: DestinationGroup,
    pub event: EventGroup,
    #[serde(default, skip_serializing_if = "UserGroup::is_empty")]
    pub user: UserGroup,
    #[serde(default, skip_serializing_if = "NetworkGroup::is_empty")]
    pub network: NetworkGroup,
    #[serde(default, skip_serializing_if = "HttpGroup::is_empty")]
    pub http: HttpGroup,
    #[serde(default, skip_serializing_if = "FileGroup::is_empty")]
    pub file: FileGroup,
    #[serde(default, skip_serializing_if = "ProcessGroup::is_empty")]
    pub process: ProcessGroup,
    pub log: LogGroup,
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        serialize_with = "serialize_fields_as_map",
        deserialize_with = "deserialize_fields_from_map"
    )]
    pub labels: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl From<&NormalizedEvent> for CommonSchemaEvent {
    fn from(e: &NormalizedEvent) -> Self {
        Self {
            timestamp: e.timestamp,
            level: e.level,
            message: e.message.clone(),
            source: SourceGroup {
                ip: e.source_ip.clone(),
                port: e.source_port,
                hostname: e.hostname.clone(),
                service: e.service.clone(),
            },
            destination: DestinationGroup {
                ip: e.dest_ip.clone(),
                port: e.dest_port,
            },
            event: EventGroup {
                category: e.category.clone(),
                action: e.action.clone(),
                outcome: e.outcome.clone(),
                format: e.format.clone(),
            },
            user: UserGroup {
                id: e.user_id.clone(),
                name: e.user_name.clone(),
            },
            network: NetworkGroup {
                protocol: e.protocol.clone(),
                bytes_in: e.bytes_in,
                bytes_out: e.bytes_out,
            },
            http: HttpGroup {
                method: e.http_method.clone(),
                status: e.http_status,
                url: e.url.clone(),
                user_agent: e.user_agent.clone(),
            },
            file: FileGroup {
                path: e.file_path.clone(),
                hash: e.file_hash.clone(),
            },
            process: ProcessGroup {
                name: e.process_name.clone(),
                pid: e.pid,
            },
            log: LogGroup {
                facility: e.facility.clone(),
                original: e.raw.clone(),
            },
            labels: e.fields.clone(),
            tags: e.tags.clone(),
        }
    }
}

impl CommonSchemaEvent {
    /// Rebuild the canonical event this projection was made from.
    pub fn into_event(self) -> NormalizedEvent {
        let mut event = NormalizedEvent::new(
            self.timestamp,
            self.level,
            self.message,
            self.log.original,
            self.event.format,
        );
        event.source_ip = self.source.ip;
        event.source_port = self.source.port;
        event.hostname = self.source.hostname;
        event.service = self.source.service;
        event.dest_ip = self.destination.ip;
        event.dest_port = self.destination.port;
        event.category = self.event.category;
        event.action = self.event.action;
        event.outcome = self.event.outcome;
        event.user_id = self.user.id;
        event.user_name = self.user.name;
        event.protocol = self.network.protocol;
        event.bytes_in = self.network.bytes_in;
        event.bytes_out = self.network.bytes_out;
        event.http_method = self.http.method;
        event.http_status = self.http.status;
        event.url = self.http.url;
        event.user_agent = self.http.user_agent;
        event.file_path = self.file.path;
        event.file_hash = self.file.hash;
        event.process_name = self.process.name;
        event.pid = self.process.pid;
        event.facility = self.log.facility;
        event.fields = self.labels;
        event.tags = self.tags;
        event
    }
}

/// Project stored events into the common schema, preserving order.
pub fn export(events: &[Arc<NormalizedEvent>]) -> Vec<CommonSchemaEvent> {
    events
        .iter()
        .map(|event| CommonSchemaEvent::from(event.as_ref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::Value;

    fn full_event() -> NormalizedEvent {
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        let mut e = NormalizedEvent::new(ts, Severity::Critical, "blocked", "CEF:0|...", LogFormat::Cef);
        e.source_ip = Some("1.2.3.4".into());
        e.source_port = Some(4433);
        e.hostname = Some("fw".into());
        e.service = Some("Acme Wall".into());
        e.dest_ip = Some("5.6.7.8".into());
        e.dest_port = Some(22);
        e.category = Some("network".into());
        e.action = Some("deny".into());
        e.outcome = Some("failure".into());
        e.user_id = Some("1001".into());
        e.user_name = Some("bob".into());
        e.protocol = Some("tcp".into());
        e.bytes_in = Some(10);
        e.bytes_out = Some(20);
        e.http_method = Some("GET".into());
        e.http_status = Some(403);
        e.url = Some("/admin".into());
        e.user_agent = Some("curl".into());
        e.file_path = Some("/tmp/x".into());
        e.file_hash = Some("abc".into());
        e.process_name = Some("sshd".into());
        e.pid = Some(42);
        e.facility = Some("auth".into());
        e.tags = vec!["authentication".into()];
        e.fields = vec![("zone".into(), "dmz".into()), ("rule".into(), "7".into())];
        e
    }

    #[test]
    fn test_round_trip_is_lossless() {
        let original = full_event();
        let exported = export(&[Arc::new(original.clone())]);
        let json = serde_json::to_string(&exported[0]).unwrap();
        let back: CommonSchemaEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.into_event(), original);
    }

    #[test]
    fn test_minimal_event_round_trip() {
        let original = NormalizedEvent::new(Utc::now(), Severity::Info, "m", "m", LogFormat::Other("custom".into()));
        let json = serde_json::to_string(&CommonSchemaEvent::from(&original)).unwrap();
        let back: CommonSchemaEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.into_event(), original);
    }

    #[test]
    fn test_nested_shape_and_empty_groups_omitted() {
        let mut e = NormalizedEvent::new(Utc::now(), Severity::Warning, "x", "raw line", LogFormat::HttpLog);
        e.http_status = Some(404);
        e.source_ip = Some("10.0.0.5".into());
        let value: Value = serde_json::to_value(CommonSchemaEvent::from(&e)).unwrap();

        assert_eq!(value["level"], "warning");
        assert_eq!(value["http"]["status"], 404);
        assert_eq!(value["source"]["ip"], "10.0.0.5");
        assert_eq!(value["event"]["format"], "http_log");
        assert_eq!(value["log"]["original"], "raw line");
        assert!(value.get("@timestamp").is_some());
        for absent in ["destination", "user", "network", "file", "process", "labels", "tags"] {
            assert!(value.get(absent).is_none(), "{} should be omitted", absent);
        }
    }
}
