//! Entity extraction from loosely structured alert payloads.
//!
//! Each entity kind is resolved through an ordered list of sources; the first
//! non-blank string wins. Values are not validated here.

use crate::types::{Alert, Entities};
use serde_json::Value;

/// Where an entity value may come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntitySource {
    /// An `observables` entry with this `type`.
    Observable(&'static str),
    /// A top-level field of the raw payload.
    Field(&'static str),
}

pub const IP_SOURCES: &[EntitySource] = &[
    EntitySource::Observable("ip"),
    EntitySource::Field("src_ip"),
    EntitySource::Field("source_ip"),
    EntitySource::Field("sourceIp"),
    EntitySource::Field("ip"),
    EntitySource::Field("remote_ip"),
    EntitySource::Field("client_ip"),
];

pub const USERNAME_SOURCES: &[EntitySource] = &[
    EntitySource::Observable("username"),
    EntitySource::Observable("user"),
    EntitySource::Field("username"),
    EntitySource::Field("user"),
    EntitySource::Field("user_name"),
    EntitySource::Field("userName"),
    EntitySource::Field("account"),
];

pub const HASH_SOURCES: &[EntitySource] = &[
    EntitySource::Observable("hash"),
    EntitySource::Observable("sha256"),
    EntitySource::Observable("md5"),
    EntitySource::Field("file_hash"),
    EntitySource::Field("hash"),
    EntitySource::Field("sha256"),
    EntitySource::Field("sha1"),
    EntitySource::Field("md5"),
];

/// Pull canonical IP, username, and hash values out of an alert.
pub fn extract_entities(alert: &Alert) -> Entities {
    Entities {
        ip: resolve(alert, IP_SOURCES),
        username: resolve(alert, USERNAME_SOURCES),
        hash: resolve(alert, HASH_SOURCES),
    }
}

fn resolve(alert: &Alert, sources: &[EntitySource]) -> Option<String> {
    sources.iter().find_map(|source| match source {
        EntitySource::Observable(kind) => alert
            .observables
            .iter()
            .filter(|o| o.kind.eq_ignore_ascii_case(kind))
            .find_map(|o| non_blank(&o.value)),
        EntitySource::Field(name) => match alert.raw_payload.get(*name) {
            Some(Value::String(s)) => non_blank(s),
            _ => None,
        },
    })
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Observable;
    use serde_json::json;

    fn alert_with(payload: Value, observables: Vec<(&str, &str)>) -> Alert {
        Alert {
            id: "a1".into(),
            raw_payload: payload.as_object().cloned().unwrap_or_default(),
            observables: observables
                .into_iter()
                .map(|(k, v)| Observable {
                    kind: k.into(),
                    value: v.into(),
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_observable_wins_over_payload() {
        let alert = alert_with(json!({"src_ip": "9.9.9.9"}), vec![("ip", "1.1.1.1")]);
        assert_eq!(extract_entities(&alert).ip.as_deref(), Some("1.1.1.1"));
    }

    #[test]
    fn test_payload_field_order() {
        let alert = alert_with(json!({"ip": "3.3.3.3", "source_ip": "2.2.2.2"}), vec![]);
        assert_eq!(extract_entities(&alert).ip.as_deref(), Some("2.2.2.2"));
    }

    #[test]
    fn test_blank_and_non_string_values_skipped() {
        let alert = alert_with(
            json!({"src_ip": "  ", "source_ip": 42, "remote_ip": "4.4.4.4"}),
            vec![("ip", "")],
        );
        assert_eq!(extract_entities(&alert).ip.as_deref(), Some("4.4.4.4"));
    }

    #[test]
    fn test_all_entity_kinds() {
        let alert = alert_with(
            json!({"user": "jdoe", "md5": "d41d8cd98f00b204e9800998ecf8427e"}),
            vec![("IP", "10.0.0.5")],
        );
        let entities = extract_entities(&alert);
        assert_eq!(entities.ip.as_deref(), Some("10.0.0.5"));
        assert_eq!(entities.username.as_deref(), Some("jdoe"));
        assert_eq!(
            entities.hash.as_deref(),
            Some("d41d8cd98f00b204e9800998ecf8427e")
        );
    }

    #[test]
    fn test_no_validation_of_format() {
        let alert = alert_with(json!({"src_ip": "not-an-ip"}), vec![]);
        assert_eq!(extract_entities(&alert).ip.as_deref(), Some("not-an-ip"));
    }

    #[test]
    fn test_empty_alert() {
        assert!(extract_entities(&Alert::default()).is_empty());
    }
}
