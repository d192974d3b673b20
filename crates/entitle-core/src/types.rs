//! Core domain types for the Entitle graph.
//!
//! A `User` is a principal; an `EntitlementDefinition` is a time-bounded
//! grant that belongs to exactly one user through an `ASSOCIATED_TO` edge.
//! JSON field names follow the graph property names.

use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EntitleError;

// ── Identifiers ───────────────────────────────────────────────────

/// Unique identifier for a user node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse the string form stored in the graph.
    pub fn parse(raw: &str) -> Result<Self, EntitleError> {
        Uuid::parse_str(raw)
            .map(Self)
            .map_err(|source| EntitleError::InvalidId {
                kind: "user",
                value: raw.to_string(),
                source,
            })
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique identifier for an entitlement node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EntitlementId(pub Uuid);

impl EntitlementId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse the string form stored in the graph.
    pub fn parse(raw: &str) -> Result<Self, EntitleError> {
        Uuid::parse_str(raw)
            .map(Self)
            .map_err(|source| EntitleError::InvalidId {
                kind: "entitlement",
                value: raw.to_string(),
                source,
            })
    }
}

impl Default for EntitlementId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntitlementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ── Entities ──────────────────────────────────────────────────────

/// A principal that entitlements are granted to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    #[serde(rename = "userID")]
    pub id: UserId,
    pub name: String,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            name: name.into(),
        }
    }
}

/// A time-bounded grant held by one user.
///
/// Timestamps are persisted as Unix seconds, so values read back from the
/// graph carry no sub-second part.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntitlementDefinition {
    #[serde(rename = "entitlementID")]
    pub id: EntitlementId,

    /// The owning user. Always set on definitions passed to `add`; `None` on
    /// read when the stored node has no `ASSOCIATED_TO` edge.
    #[serde(rename = "userID")]
    pub user_id: Option<UserId>,

    #[serde(rename = "effectiveDate")]
    pub effective_date: DateTime<Utc>,

    #[serde(rename = "termDate")]
    pub term_date: DateTime<Utc>,

    #[serde(rename = "createdBy")]
    pub created_by: String,

    #[serde(rename = "createdTs")]
    pub created_ts: DateTime<Utc>,

    #[serde(rename = "modifiedBy")]
    pub modified_by: Option<String>,

    #[serde(rename = "modifiedTs")]
    pub modified_ts: Option<DateTime<Utc>>,

    pub roles: Vec<String>,
}

impl EntitlementDefinition {
    /// A fresh definition for `user_id`, created now by `created_by`.
    pub fn new(
        user_id: UserId,
        effective_date: DateTime<Utc>,
        term_date: DateTime<Utc>,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            id: EntitlementId::new(),
            user_id: Some(user_id),
            effective_date: effective_date.trunc_subsecs(0),
            term_date: term_date.trunc_subsecs(0),
            created_by: created_by.into(),
            created_ts: Utc::now().trunc_subsecs(0),
            modified_by: None,
            modified_ts: None,
            roles: Vec::new(),
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Record who last modified the definition and when.
    pub fn with_modification(mut self, by: impl Into<String>, at: DateTime<Utc>) -> Self {
        self.modified_by = Some(by.into());
        self.modified_ts = Some(at.trunc_subsecs(0));
        self
    }
}
