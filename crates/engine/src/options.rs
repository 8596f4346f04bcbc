//! Per-sandbox options supplied at creation time.
//!
//! The set of options is closed. String-keyed input (from JSON request bodies)
//! is parsed with [`SandboxOption::parse`], which rejects keys it does not
//! recognize. Merging is order-insensitive: a second, different value for the
//! same option or label key is a conflict rather than an override.

use std::{collections::BTreeMap, time::Duration};

use serde_json::Value;

use crate::error::{Result, SandboxError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxOption {
    /// Namespace the pod is created in.
    Namespace(String),
    /// Extra pod labels.
    Labels(BTreeMap<String, String>),
    Label(String, String),
    /// Override the engine's readiness timeout for this sandbox.
    ReadyTimeout(Duration),
    /// Override the engine's exec timeout for this sandbox.
    ExecTimeout(Duration),
}

impl SandboxOption {
    /// Parse a single string-keyed option.
    pub fn parse(key: &str, value: &Value) -> Result<Self> {
        match key {
            "namespace" => value
                .as_str()
                .map(|ns| Self::Namespace(ns.to_string()))
                .ok_or_else(|| invalid(format!("namespace must be a string, got {value}"))),
            "labels" => {
                let map = value
                    .as_object()
                    .ok_or_else(|| invalid(format!("labels must be an object, got {value}")))?;
                let mut labels = BTreeMap::new();
                for (k, v) in map {
                    let v = v
                        .as_str()
                        .ok_or_else(|| invalid(format!("label {k} must be a string")))?;
                    labels.insert(k.clone(), v.to_string());
                }
                Ok(Self::Labels(labels))
            },
            "ready_timeout_secs" => parse_secs(key, value).map(Self::ReadyTimeout),
            "exec_timeout_secs" => parse_secs(key, value).map(Self::ExecTimeout),
            other => Err(invalid(format!("unrecognized option: {other}"))),
        }
    }
}

fn parse_secs(key: &str, value: &Value) -> Result<Duration> {
    match value.as_u64() {
        Some(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(invalid(format!("{key} must be a positive integer, got {value}"))),
    }
}

fn invalid(message: String) -> SandboxError {
    SandboxError::InvalidOption(message)
}

/// Options after merging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SandboxOptions {
    pub namespace: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub ready_timeout: Option<Duration>,
    pub exec_timeout: Option<Duration>,
}

impl SandboxOptions {
    pub fn merge(options: &[SandboxOption]) -> Result<Self> {
        let mut merged = Self::default();
        for option in options {
            match option {
                SandboxOption::Namespace(ns) => {
                    validate_namespace(ns)?;
                    set_once(&mut merged.namespace, ns.clone(), "namespace")?;
                },
                SandboxOption::Labels(labels) => {
                    for (k, v) in labels {
                        merged.add_label(k, v)?;
                    }
                },
                SandboxOption::Label(k, v) => merged.add_label(k, v)?,
                SandboxOption::ReadyTimeout(t) => {
                    set_once(&mut merged.ready_timeout, *t, "ready_timeout")?;
                },
                SandboxOption::ExecTimeout(t) => {
                    set_once(&mut merged.exec_timeout, *t, "exec_timeout")?;
                },
            }
        }
        Ok(merged)
    }

    fn add_label(&mut self, key: &str, value: &str) -> Result<()> {
        if key.is_empty() {
            return Err(invalid("label keys must not be empty".into()));
        }
        match self.labels.get(key) {
            Some(existing) if existing != value => Err(invalid(format!(
                "conflicting values for label {key}: {existing:?} and {value:?}"
            ))),
            _ => {
                self.labels.insert(key.to_string(), value.to_string());
                Ok(())
            },
        }
    }
}

fn set_once<T: PartialEq + std::fmt::Debug>(
    slot: &mut Option<T>,
    value: T,
    what: &str,
) -> Result<()> {
    match slot {
        Some(existing) if *existing != value => Err(invalid(format!(
            "conflicting values for {what}: {existing:?} and {value:?}"
        ))),
        _ => {
            *slot = Some(value);
            Ok(())
        },
    }
}

fn validate_namespace(ns: &str) -> Result<()> {
    if is_dns_label(ns) {
        Ok(())
    } else {
        Err(invalid(format!("invalid namespace: {ns:?}")))
    }
}

/// RFC 1123 label: lowercase alphanumerics and `-`, alphanumeric at both ends,
/// at most 63 characters.
pub(crate) fn is_dns_label(s: &str) -> bool {
    let bytes = s.as_bytes();
    !bytes.is_empty()
        && bytes.len() <= 63
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        && bytes.first().is_some_and(u8::is_ascii_alphanumeric)
        && bytes.last().is_some_and(u8::is_ascii_alphanumeric)
}
