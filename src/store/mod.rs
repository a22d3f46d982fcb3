use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::AppResult;
use crate::models::{
    DocumentRecord, DocumentVersion, NewDocumentRecord, NewDocumentVersion, VersionState,
};

pub mod pg;

pub use pg::PgMetadataStore;

/// The relational collaborator: parameterized CRUD over the two tables plus
/// the atomic conditional update the rate limiter needs.
#[async_trait]
pub trait MetadataStore: Send + Sync + 'static {
    async fn find_record(
        &self,
        participant_id: i64,
        document_type_code: &str,
    ) -> AppResult<Option<DocumentRecord>>;

    async fn find_record_by_id(&self, record_id: i64) -> AppResult<Option<DocumentRecord>>;

    async fn records_for_participant(&self, participant_id: i64)
        -> AppResult<Vec<DocumentRecord>>;

    async fn insert_record(&self, record: NewDocumentRecord) -> AppResult<DocumentRecord>;

    /// Overwrites the mutable columns of the live pointer, quota columns
    /// included. Only the restore path uses this; it resets the quota window
    /// on purpose.
    async fn update_record(&self, record: &DocumentRecord) -> AppResult<DocumentRecord>;

    /// Overwrites the live pointer's file and review columns while leaving
    /// `upload_count`, `last_reset_date` and `last_upload_at` untouched; those
    /// belong to the atomic claim, and writing them back from memory would
    /// clobber a concurrent claimant.
    async fn update_record_content(&self, record: &DocumentRecord) -> AppResult<DocumentRecord>;

    /// Persists `upload_count = 0, last_reset_date = today` iff the stored
    /// reset date is stale, then returns the fresh row. Any operation that
    /// observes a new calendar day goes through here first.
    async fn reset_quota_if_stale(
        &self,
        record_id: i64,
        today: NaiveDate,
    ) -> AppResult<DocumentRecord>;

    /// Consumes one upload slot as a single conditional update against the
    /// persisted row and returns the row as the claim left it. `None` when the
    /// quota is already exhausted for `today`; two concurrent claims can never
    /// both succeed past the limit.
    async fn claim_upload_slot(
        &self,
        record_id: i64,
        today: NaiveDate,
        now: DateTime<Utc>,
        limit: i32,
    ) -> AppResult<Option<DocumentRecord>>;

    /// Archives one snapshot. Idempotent per (record, version number): when
    /// that snapshot already exists the stored row comes back unchanged, so a
    /// wholesale retry of an interrupted overwrite sails past its archive
    /// step.
    async fn insert_version(&self, version: NewDocumentVersion) -> AppResult<DocumentVersion>;

    async fn find_version(&self, version_id: i64) -> AppResult<Option<DocumentVersion>>;

    /// History for one record, most recent version first.
    async fn versions_for_record(&self, record_id: i64) -> AppResult<Vec<DocumentVersion>>;

    async fn set_version_state(
        &self,
        version_id: i64,
        state: VersionState,
    ) -> AppResult<DocumentVersion>;

    /// Deletes all but the `keep` newest versions. Explicitly invoked only;
    /// nothing in the upload or restore paths calls this.
    async fn prune_versions(&self, record_id: i64, keep: usize) -> AppResult<usize>;
}
