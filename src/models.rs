use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Review workflow state of a live document record. Transitions happen only
/// through submit/approve/reject/restore; classification never mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewState {
    Pending,
    Approved,
    Rejected,
}

impl ReviewState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl FromStr for ReviewState {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(AppError::invariant(format!(
                "unknown review state '{other}'"
            ))),
        }
    }
}

impl fmt::Display for ReviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal state of an archived revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionState {
    Replaced,
    Rejected,
    Restored,
}

impl VersionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Replaced => "replaced",
            Self::Rejected => "rejected",
            Self::Restored => "restored",
        }
    }
}

impl FromStr for VersionState {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "replaced" => Ok(Self::Replaced),
            "rejected" => Ok(Self::Rejected),
            "restored" => Ok(Self::Restored),
            other => Err(AppError::invariant(format!(
                "unknown version state '{other}'"
            ))),
        }
    }
}

impl fmt::Display for VersionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live pointer for one (participant, document type) pair. At most one row per
/// pair exists; absence means the document is missing.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRecord {
    pub id: i64,
    pub participant_id: i64,
    pub document_type_code: String,
    pub external_file_id: String,
    pub file_name: String,
    pub file_type: Option<String>,
    pub size_bytes: i64,
    pub upload_count: i32,
    pub last_reset_date: NaiveDate,
    pub last_upload_at: Option<DateTime<Utc>>,
    pub review_state: ReviewState,
    pub rejection_reason: Option<String>,
    pub current_version: i32,
    pub has_prior_version: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDocumentRecord {
    pub participant_id: i64,
    pub document_type_code: String,
    pub external_file_id: String,
    pub file_name: String,
    pub file_type: Option<String>,
    pub size_bytes: i64,
    pub upload_count: i32,
    pub last_reset_date: NaiveDate,
    pub last_upload_at: Option<DateTime<Utc>>,
    pub review_state: ReviewState,
    pub current_version: i32,
}

/// Immutable snapshot of a live pointer taken right before it was overwritten
/// or rejected. Version numbers per record are strictly increasing and never
/// reused, even across restores.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentVersion {
    pub id: i64,
    pub document_record_id: i64,
    pub external_file_id: String,
    pub file_name: String,
    pub file_type: Option<String>,
    pub size_bytes: i64,
    pub version_number: i32,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
    pub state: VersionState,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDocumentVersion {
    pub document_record_id: i64,
    pub external_file_id: String,
    pub file_name: String,
    pub file_type: Option<String>,
    pub size_bytes: i64,
    pub version_number: i32,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
    pub state: VersionState,
    pub reason: Option<String>,
}

/// The youth member whose paperwork is tracked. Identity in the object store is
/// full name + section; the birth year only picks the browsing bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: i64,
    pub full_name: String,
    pub section_slug: String,
    pub birth_date: NaiveDate,
}

impl Participant {
    pub fn birth_year(&self) -> i32 {
        self.birth_date.year()
    }

    /// Completed years of age on the given calendar day.
    pub fn age_years(&self, on: NaiveDate) -> i32 {
        let mut age = on.year() - self.birth_date.year();
        if (on.month(), on.day()) < (self.birth_date.month(), self.birth_date.day()) {
            age -= 1;
        }
        age
    }
}

/// Metadata of a file already placed in the object store by the upload
/// boundary. The core records it; it never touches file content.
#[derive(Debug, Clone, Deserialize)]
pub struct FileMetadata {
    pub external_file_id: String,
    pub file_name: String,
    pub file_type: Option<String>,
    pub size_bytes: i64,
}

/// Remaining wait before the next upload slot opens.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Cooldown {
    pub remaining_ms: i64,
    pub next_allowed_at: DateTime<Utc>,
}

/// Outcome of a quota check, shaped for the boundary: a denial always carries
/// the cooldown rather than a bare rejection.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub count: i32,
    pub limit: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown: Option<Cooldown>,
}
