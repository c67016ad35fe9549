//! Audit metadata carried by every ledger record
//!
//! Records embed an [`AuditMetadata`] value instead of inheriting audit
//! columns. Deletion is a lifecycle tag; rows are never physically removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Soft-delete lifecycle of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Active,
    Deleted,
}

impl Lifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Active => "active",
            Lifecycle::Deleted => "deleted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Lifecycle::Active),
            "deleted" => Some(Lifecycle::Deleted),
            _ => None,
        }
    }
}

/// Who touched a record and when, plus its lifecycle tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditMetadata {
    pub lifecycle: Lifecycle,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
}

impl AuditMetadata {
    /// Metadata for a record created at `at`
    pub fn created(at: DateTime<Utc>) -> Self {
        Self {
            lifecycle: Lifecycle::Active,
            created_at: at,
            updated_at: at,
            created_by: None,
            updated_by: None,
        }
    }

    /// Metadata for a record created now
    pub fn now() -> Self {
        Self::created(Utc::now())
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        let actor = actor.into();
        self.created_by = Some(actor.clone());
        self.updated_by = Some(actor);
        self
    }

    pub fn touch(&mut self, at: DateTime<Utc>, actor: Option<&str>) {
        self.updated_at = at;
        if let Some(actor) = actor {
            self.updated_by = Some(actor.to_string());
        }
    }

    pub fn soft_delete(&mut self, at: DateTime<Utc>, actor: Option<&str>) {
        self.lifecycle = Lifecycle::Deleted;
        self.touch(at, actor);
    }

    pub fn restore(&mut self, at: DateTime<Utc>, actor: Option<&str>) {
        self.lifecycle = Lifecycle::Active;
        self.touch(at, actor);
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle == Lifecycle::Active
    }

    pub fn is_deleted(&self) -> bool {
        self.lifecycle == Lifecycle::Deleted
    }
}
