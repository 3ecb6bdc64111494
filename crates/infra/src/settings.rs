//! Engine settings loaded from the environment.

use depotflow_core::{DomainError, DomainResult};

pub const NOTIFY_SUPPLIER_ON_ISSUE: &str = "DEPOTFLOW_NOTIFY_SUPPLIER_ON_ISSUE";
pub const SEQUENCE_BACKEND: &str = "DEPOTFLOW_SEQUENCE_BACKEND";
pub const DATABASE_URL: &str = "DATABASE_URL";

/// Where sequence counters live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceBackend {
    Memory,
    Postgres { database_url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Whether issuing an order asks the mail collaborator to send it to the
    /// supplier.
    pub notify_supplier_on_issue: bool,
    pub sequence_backend: SequenceBackend,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            notify_supplier_on_issue: true,
            sequence_backend: SequenceBackend::Memory,
        }
    }
}

fn parse_bool(name: &str, raw: &str) -> DomainResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(DomainError::configuration(format!(
            "{name} must be a boolean, got '{other}'"
        ))),
    }
}

impl EngineSettings {
    pub fn from_env() -> DomainResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from any key/value source (the environment in
    /// production, a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> DomainResult<Self> {
        let defaults = Self::default();

        let notify_supplier_on_issue = match lookup(NOTIFY_SUPPLIER_ON_ISSUE) {
            Some(raw) => parse_bool(NOTIFY_SUPPLIER_ON_ISSUE, &raw)?,
            None => defaults.notify_supplier_on_issue,
        };

        let backend = lookup(SEQUENCE_BACKEND).unwrap_or_else(|| "memory".to_string());
        let sequence_backend = match backend.trim().to_ascii_lowercase().as_str() {
            "memory" => SequenceBackend::Memory,
            "postgres" => {
                let database_url = lookup(DATABASE_URL)
                    .filter(|url| !url.trim().is_empty())
                    .ok_or_else(|| {
                        DomainError::configuration(format!(
                            "{DATABASE_URL} must be set when {SEQUENCE_BACKEND}=postgres"
                        ))
                    })?;
                SequenceBackend::Postgres { database_url }
            }
            other => {
                return Err(DomainError::configuration(format!(
                    "unknown {SEQUENCE_BACKEND} '{other}' (expected memory or postgres)"
                )));
            }
        };

        Ok(Self {
            notify_supplier_on_issue,
            sequence_backend,
        })
    }
}
