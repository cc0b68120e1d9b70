//! Pipeline message as seen by a script.
//!
//! Scripts never hold a `Message`; they read it field by field through the
//! `read_message(name)` accessor while `process_message` runs.

use rhai::Dynamic;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::convert::json_to_dynamic;

/// A structured pipeline message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    pub uuid: String,
    /// Unix nanoseconds.
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub msg_type: String,
    pub logger: String,
    pub severity: i32,
    pub payload: String,
    pub env_version: String,
    pub pid: i32,
    pub hostname: String,
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl Default for Message {
    fn default() -> Self {
        Self {
            uuid: uuid::Uuid::now_v7().to_string(),
            timestamp: chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            msg_type: String::new(),
            logger: String::new(),
            severity: 7,
            payload: String::new(),
            env_version: String::new(),
            pid: std::process::id() as i32,
            hostname: String::new(),
            fields: BTreeMap::new(),
        }
    }
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_payload(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            ..Self::default()
        }
    }

    pub fn set_payload(&mut self, payload: impl Into<String>) {
        self.payload = payload.into();
    }

    pub fn with_type(mut self, msg_type: &str) -> Self {
        self.msg_type = msg_type.to_string();
        self
    }

    pub fn with_logger(mut self, logger: &str) -> Self {
        self.logger = logger.to_string();
        self
    }

    pub fn with_field<T: Into<serde_json::Value>>(mut self, name: &str, value: T) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Look a value up by its accessor name (`"Payload"`, `"Fields[name]"`, ...).
    ///
    /// Unknown names resolve to `()`.
    pub fn lookup(&self, name: &str) -> Dynamic {
        if let Some(field) = name
            .strip_prefix("Fields[")
            .and_then(|rest| rest.strip_suffix(']'))
        {
            return self
                .fields
                .get(field)
                .map(json_to_dynamic)
                .unwrap_or(Dynamic::UNIT);
        }
        match name {
            "Uuid" => Dynamic::from(self.uuid.clone()),
            "Timestamp" => Dynamic::from(self.timestamp),
            "Type" => Dynamic::from(self.msg_type.clone()),
            "Logger" => Dynamic::from(self.logger.clone()),
            "Severity" => Dynamic::from(self.severity as i64),
            "Payload" => Dynamic::from(self.payload.clone()),
            "EnvVersion" => Dynamic::from(self.env_version.clone()),
            "Pid" => Dynamic::from(self.pid as i64),
            "Hostname" => Dynamic::from(self.hostname.clone()),
            _ => Dynamic::UNIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup() {
        let msg = Message::with_payload("hello")
            .with_type("logfile")
            .with_logger("nginx");
        assert_eq!(msg.lookup("Payload").into_string().unwrap(), "hello");
        assert_eq!(msg.lookup("Type").into_string().unwrap(), "logfile");
        assert_eq!(msg.lookup("Logger").into_string().unwrap(), "nginx");
        assert_eq!(msg.lookup("Severity").as_int().unwrap(), 7);
        assert!(!msg.lookup("Uuid").into_string().unwrap().is_empty());
    }

    #[test]
    fn field_lookup() {
        let msg = Message::new().with_field("status", 200).with_field("path", "/");
        assert_eq!(msg.lookup("Fields[status]").as_int().unwrap(), 200);
        assert_eq!(msg.lookup("Fields[path]").into_string().unwrap(), "/");
        assert!(msg.lookup("Fields[missing]").is_unit());
    }

    #[test]
    fn unknown_name_is_unit() {
        let msg = Message::new();
        assert!(msg.lookup("Bogus").is_unit());
        assert!(msg.lookup("Fields[").is_unit());
    }

    #[test]
    fn deserializes_with_defaults() {
        let msg: Message = serde_json::from_str(r#"{"payload":"x","type":"t"}"#).unwrap();
        assert_eq!(msg.payload, "x");
        assert_eq!(msg.msg_type, "t");
        assert_eq!(msg.severity, 7);
    }
}
