//! Row-level change records.
//!
//! A [`ChangeRecord`] describes one insert, update, or delete of a row in a
//! table. Row images are carried as JSON so the change feed stays agnostic of
//! the table's schema; consumers decode the image they need.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Error;

/// Table holding notification rows.
pub const NOTIFICATIONS_TABLE: &str = "notifications";

/// Types of changes that can occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    /// A new row was inserted.
    Insert,
    /// An existing row was updated.
    Update,
    /// A row was deleted.
    Delete,
}

impl ChangeKind {
    /// All change kinds.
    pub const ALL: [ChangeKind; 3] = [ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete];
}

/// One observed row mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Table the row belongs to.
    pub table: String,
    /// The type of change.
    pub kind: ChangeKind,
    /// Row image after the change (inserts and updates).
    pub new: Option<Value>,
    /// Row image before the change (updates and deletes).
    pub old: Option<Value>,
    /// When the change was committed.
    pub committed_at: DateTime<Utc>,
}

impl ChangeRecord {
    /// Record an inserted row.
    pub fn insert(table: impl Into<String>, new: Value) -> Self {
        Self {
            table: table.into(),
            kind: ChangeKind::Insert,
            new: Some(new),
            old: None,
            committed_at: Utc::now(),
        }
    }

    /// Record an updated row.
    pub fn update(table: impl Into<String>, old: Value, new: Value) -> Self {
        Self {
            table: table.into(),
            kind: ChangeKind::Update,
            new: Some(new),
            old: Some(old),
            committed_at: Utc::now(),
        }
    }

    /// Record a deleted row.
    pub fn delete(table: impl Into<String>, old: Value) -> Self {
        Self {
            table: table.into(),
            kind: ChangeKind::Delete,
            new: None,
            old: Some(old),
            committed_at: Utc::now(),
        }
    }

    /// The row image a filter should be evaluated against.
    ///
    /// Deletes only carry the old image; everything else uses the new one.
    pub fn row(&self) -> Option<&Value> {
        match self.kind {
            ChangeKind::Delete => self.old.as_ref(),
            ChangeKind::Insert | ChangeKind::Update => self.new.as_ref().or(self.old.as_ref()),
        }
    }

    /// Decode the new row image.
    pub fn decode_new<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let row = self.new.as_ref().ok_or(Error::MissingRow("new"))?;
        serde_json::from_value(row.clone()).map_err(|e| Error::MalformedPayload(e.to_string()))
    }

    /// Read a single column from the old row image.
    pub fn old_column(&self, column: &str) -> Result<&Value, Error> {
        let row = self.old.as_ref().ok_or(Error::MissingRow("old"))?;
        row.get(column)
            .ok_or_else(|| Error::MalformedPayload(format!("old row has no `{column}` column")))
    }
}

/// Predicate restricting which rows a subscription observes.
#[derive(Debug, Clone, PartialEq)]
pub enum RowFilter {
    /// Every row matches.
    All,
    /// Rows whose `column` equals `value`.
    Eq { column: String, value: Value },
}

impl RowFilter {
    /// Match rows whose `column` equals `value`.
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        RowFilter::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Check a change record against this filter.
    pub fn matches(&self, record: &ChangeRecord) -> bool {
        match self {
            RowFilter::All => true,
            RowFilter::Eq { column, value } => record
                .row()
                .and_then(|row| row.get(column))
                .map(|actual| actual == value)
                .unwrap_or(false),
        }
    }
}
