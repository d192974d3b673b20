//! Schema-aware row decoding.
//!
//! Rows are deserialized by column name into a row struct, then converted
//! into domain types. Any type or value mismatch is a [`DecodeError`].

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use entitle_core::{EntitlementDefinition, EntitlementId, UserId};

use crate::boundary::Record;

/// A row that does not match its projection.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Row does not match {target}: {reason}")]
    Shape { target: &'static str, reason: String },

    #[error("Column {column} holds an invalid value: {reason}")]
    Value { column: &'static str, reason: String },
}

impl Record for neo4rs::Row {
    fn decode<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        self.to::<T>().map_err(|e| DecodeError::Shape {
            target: std::any::type_name::<T>(),
            reason: e.to_string(),
        })
    }
}

/// Columns returned by every entitlement read.
#[derive(Debug, Deserialize)]
pub(crate) struct EntitlementRow {
    id: String,
    #[serde(rename = "userID")]
    user_id: Option<String>,
    #[serde(rename = "effectiveDate")]
    effective_date: i64,
    #[serde(rename = "termDate")]
    term_date: i64,
    #[serde(rename = "createdBy")]
    created_by: String,
    #[serde(rename = "createdTs")]
    created_ts: i64,
    #[serde(rename = "modifiedBy")]
    modified_by: Option<String>,
    #[serde(rename = "modifiedTs")]
    modified_ts: Option<i64>,
    roles: Option<Vec<String>>,
}

impl EntitlementRow {
    fn into_definition(self) -> Result<EntitlementDefinition, DecodeError> {
        let id = EntitlementId::parse(&self.id).map_err(|e| invalid("id", e))?;
        let user_id = self
            .user_id
            .as_deref()
            .map(UserId::parse)
            .transpose()
            .map_err(|e| invalid("userID", e))?;

        Ok(EntitlementDefinition {
            id,
            user_id,
            effective_date: timestamp("effectiveDate", self.effective_date)?,
            term_date: timestamp("termDate", self.term_date)?,
            created_by: self.created_by,
            created_ts: timestamp("createdTs", self.created_ts)?,
            modified_by: self.modified_by,
            modified_ts: self
                .modified_ts
                .map(|secs| timestamp("modifiedTs", secs))
                .transpose()?,
            roles: self.roles.unwrap_or_default(),
        })
    }
}

/// The single column returned by link counts.
#[derive(Debug, Deserialize)]
pub(crate) struct LinkCountRow {
    pub links: i64,
}

/// Decode one entitlement row.
pub(crate) fn entitlement<R: Record>(record: &R) -> Result<EntitlementDefinition, DecodeError> {
    record.decode::<EntitlementRow>()?.into_definition()
}

fn timestamp(column: &'static str, secs: i64) -> Result<DateTime<Utc>, DecodeError> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| DecodeError::Value {
        column,
        reason: format!("{secs} is out of range for a timestamp"),
    })
}

fn invalid(column: &'static str, err: impl std::fmt::Display) -> DecodeError {
    DecodeError::Value {
        column,
        reason: err.to_string(),
    }
}
