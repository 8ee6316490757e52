// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! GitHub activity archive as persisted in Open Humans.
//!
//! The archive is a JSON array of weekly records. Each record carries a
//! `date` (`YYYYMMDD`) plus whatever fields GitHub returned for that week.

use crate::error::{AppError, Result};
use crate::time_utils::{parse_record_date, IsoWeek};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One entry of GitHub activity for a single ISO week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// First day queried for this week (`YYYYMMDD`)
    pub date: String,
    /// Upstream fields, copied verbatim
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl ActivityRecord {
    /// Parse the record date.
    pub fn day(&self) -> Result<NaiveDate> {
        parse_record_date(&self.date).ok_or_else(|| {
            AppError::InvalidData(format!("record date '{}' is not YYYYMMDD", self.date))
        })
    }

    /// The ISO week this record belongs to.
    pub fn week(&self) -> Result<IsoWeek> {
        self.day().map(IsoWeek::of)
    }
}

/// Full ordered history of activity records for one member.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityArchive(Vec<ActivityRecord>);

impl ActivityArchive {
    pub fn new(records: Vec<ActivityRecord>) -> Self {
        Self(records)
    }

    /// Parse an archive from the bytes of a stored JSON file.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| AppError::InvalidData(format!("archive is not a record array: {}", e)))
    }

    /// Serialize the archive to JSON bytes.
    pub fn to_json_vec(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.0)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("JSON error: {}", e)))
    }

    pub fn records(&self) -> &[ActivityRecord] {
        &self.0
    }

    pub fn last(&self) -> Option<&ActivityRecord> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append records in order.
    pub fn extend(&mut self, records: impl IntoIterator<Item = ActivityRecord>) {
        self.0.extend(records);
    }

    /// Keep only records for which `keep` returns true, preserving order.
    pub fn retain(&mut self, keep: impl FnMut(&ActivityRecord) -> bool) {
        self.0.retain(keep);
    }
}

/// Convert one weekly GitHub response body into archive records.
///
/// The body is normally an array of record objects; a single object is
/// accepted as a one-record week.
pub fn records_from_response(body: Value) -> Result<Vec<ActivityRecord>> {
    let value = match body {
        Value::Array(items) => Value::Array(items),
        Value::Object(map) => Value::Array(vec![Value::Object(map)]),
        other => {
            return Err(AppError::InvalidData(format!(
                "unexpected weekly response: {}",
                other
            )))
        }
    };

    serde_json::from_value(value)
        .map_err(|e| AppError::InvalidData(format!("weekly record missing date: {}", e)))
}
