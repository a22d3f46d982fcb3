use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::models::{DocumentRecord, DocumentVersion, NewDocumentVersion, ReviewState, VersionState};
use crate::store::MetadataStore;

/// Standard reason written on the version that a restore pushes aside.
pub const RESTORE_SUPERSEDED_REASON: &str = "superseded by restored version";

pub const DEFAULT_KEEP_VERSIONS: usize = 5;

/// Append-oriented history of prior document revisions.
///
/// Every archive snapshots the live pointer at `record.current_version`, and
/// every overwrite bumps that counter afterwards, so version numbers per
/// record are strictly increasing and never reused, restores included.
pub struct VersionLedger {
    store: Arc<dyn MetadataStore>,
}

impl VersionLedger {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// Snapshots the live pointer into an immutable row. Must run before the
    /// pointer is overwritten; the snapshot has to reflect pre-overwrite
    /// state. A failure here leaves the live record untouched, and archiving
    /// an already-archived version number hands back the stored snapshot, so
    /// an interrupted overwrite can be retried wholesale.
    pub async fn archive_current(
        &self,
        record: &DocumentRecord,
        state: VersionState,
        reason: Option<String>,
        actor: &str,
        now: DateTime<Utc>,
    ) -> AppResult<DocumentVersion> {
        let snapshot = NewDocumentVersion {
            document_record_id: record.id,
            external_file_id: record.external_file_id.clone(),
            file_name: record.file_name.clone(),
            file_type: record.file_type.clone(),
            size_bytes: record.size_bytes,
            version_number: record.current_version,
            uploaded_by: actor.to_string(),
            uploaded_at: record.last_upload_at.unwrap_or(now),
            state,
            reason,
        };
        let stored = self.store.insert_version(snapshot).await?;
        info!(
            record_id = record.id,
            version = stored.version_number,
            state = %stored.state,
            "archived live pointer"
        );
        Ok(stored)
    }

    /// Most recent first.
    pub async fn history(&self, record_id: i64) -> AppResult<Vec<DocumentVersion>> {
        self.store.versions_for_record(record_id).await
    }

    /// Reinstates an archived revision as the live pointer.
    ///
    /// The current pointer is archived first (as `rejected`), the target's
    /// file fields are copied back, review state becomes approved with the
    /// rejection reason cleared and the quota window reset, and the target
    /// itself flips to `restored`.
    pub async fn restore(
        &self,
        record: &DocumentRecord,
        version: &DocumentVersion,
        actor: &str,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> AppResult<DocumentRecord> {
        if version.document_record_id != record.id {
            return Err(AppError::invariant(format!(
                "version {} does not belong to document record {}",
                version.id, record.id
            )));
        }

        self.archive_current(
            record,
            VersionState::Rejected,
            Some(RESTORE_SUPERSEDED_REASON.to_string()),
            actor,
            now,
        )
        .await?;

        let mut updated = record.clone();
        updated.external_file_id = version.external_file_id.clone();
        updated.file_name = version.file_name.clone();
        updated.file_type = version.file_type.clone();
        updated.size_bytes = version.size_bytes;
        updated.review_state = ReviewState::Approved;
        updated.rejection_reason = None;
        updated.upload_count = 0;
        updated.last_reset_date = today;
        updated.current_version = record.current_version + 1;
        updated.has_prior_version = true;
        updated.updated_at = now;
        let persisted = self.store.update_record(&updated).await?;

        self.store
            .set_version_state(version.id, VersionState::Restored)
            .await?;

        info!(
            record_id = record.id,
            restored_version = version.version_number,
            actor = %actor,
            "restored archived revision onto live pointer"
        );
        Ok(persisted)
    }

    /// Deletes all but the `keep` newest versions. On demand only.
    pub async fn prune(&self, record_id: i64, keep: usize) -> AppResult<usize> {
        let deleted = self.store.prune_versions(record_id, keep).await?;
        if deleted > 0 {
            info!(record_id, deleted, keep, "pruned version history");
        }
        Ok(deleted)
    }
}
