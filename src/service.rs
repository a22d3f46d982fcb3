use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::info;

use crate::classifier::{classify, FolderStatus};
use crate::config::AppConfig;
use crate::drive::ObjectStore;
use crate::error::{AppError, AppResult};
use crate::ledger::VersionLedger;
use crate::models::{
    DocumentRecord, DocumentVersion, FileMetadata, NewDocumentRecord, Participant, QuotaDecision,
    ReviewState, VersionState,
};
use crate::provisioner::FolderProvisioner;
use crate::quota;
use crate::registry::DocumentTypeRegistry;
use crate::store::MetadataStore;

/// Time source, swappable so tests can cross calendar days.
pub trait Clock: Send + Sync + 'static {
    fn now_utc(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

const REPLACED_BY_UPLOAD_REASON: &str = "replaced by new upload";

/// Sequences every multi-step operation over the two stores and exposes the
/// crate's caller-facing surface. Stateless apart from the immutable registry
/// and configuration; every store call is an I/O boundary.
pub struct DocumentService {
    config: Arc<AppConfig>,
    registry: Arc<DocumentTypeRegistry>,
    drive: Arc<dyn ObjectStore>,
    store: Arc<dyn MetadataStore>,
    provisioner: FolderProvisioner,
    ledger: VersionLedger,
    clock: Arc<dyn Clock>,
}

impl DocumentService {
    pub fn new(
        config: Arc<AppConfig>,
        registry: Arc<DocumentTypeRegistry>,
        drive: Arc<dyn ObjectStore>,
        store: Arc<dyn MetadataStore>,
    ) -> Self {
        Self::with_clock(config, registry, drive, store, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: Arc<AppConfig>,
        registry: Arc<DocumentTypeRegistry>,
        drive: Arc<dyn ObjectStore>,
        store: Arc<dyn MetadataStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let provisioner = FolderProvisioner::new(config.clone(), drive.clone());
        let ledger = VersionLedger::new(store.clone());
        Self {
            config,
            registry,
            drive,
            store,
            provisioner,
            ledger,
            clock,
        }
    }

    fn now_and_today(&self) -> (DateTime<Utc>, NaiveDate) {
        let now = self.clock.now_utc();
        (now, quota::local_today(now, self.config.local_offset()))
    }

    /// Quota verdict for one (participant, type) pair. Observing a new local
    /// day persists the window reset even on this read path.
    pub async fn can_upload(
        &self,
        participant_id: i64,
        document_type_code: &str,
    ) -> AppResult<QuotaDecision> {
        self.registry.get(document_type_code)?;
        let (now, today) = self.now_and_today();

        let record = match self
            .store
            .find_record(participant_id, document_type_code)
            .await?
        {
            Some(record) if record.last_reset_date != today => {
                Some(self.store.reset_quota_if_stale(record.id, today).await?)
            }
            other => other,
        };

        Ok(quota::decision(
            record.as_ref(),
            today,
            now,
            self.config.local_offset(),
            self.config.daily_upload_limit,
        ))
    }

    /// Per-type compliance status for a participant: provision the folder,
    /// list it, cross-reference against the metadata rows. Read-only with
    /// respect to records; a brand-new participant reads as all types missing.
    pub async fn folder_status(&self, participant: &Participant) -> AppResult<FolderStatus> {
        let (_, today) = self.now_and_today();
        let folder_id = self.provisioner.resolve_or_create(participant).await?;
        let entries = self.drive.list_children(&folder_id).await?;
        let records = self.store.records_for_participant(participant.id).await?;
        let age = participant.age_years(today);
        Ok(classify(&self.registry, age, &entries, &records))
    }

    /// Records an upload whose file the boundary has already placed in the
    /// object store. Executes in exactly this order: quota reset + atomic
    /// claim, archive the current pointer, overwrite the live pointer. A
    /// failure between archive and overwrite leaves the prior live state
    /// intact, so the operation can be retried wholesale.
    pub async fn record_upload(
        &self,
        participant: &Participant,
        document_type_code: &str,
        file: FileMetadata,
        actor: &str,
    ) -> AppResult<DocumentRecord> {
        self.registry.get(document_type_code)?;
        let (now, today) = self.now_and_today();
        let limit = self.config.daily_upload_limit;

        let existing = self
            .store
            .find_record(participant.id, document_type_code)
            .await?;

        let persisted = match existing {
            Some(record) => {
                let record = self.store.reset_quota_if_stale(record.id, today).await?;
                let Some(claimed) = self
                    .store
                    .claim_upload_slot(record.id, today, now, limit)
                    .await?
                else {
                    return Err(AppError::QuotaExceeded {
                        count: record.upload_count,
                        limit,
                        cooldown: quota::cooldown(&record, now, self.config.local_offset()),
                    });
                };

                // Snapshot carries the pre-claim pointer, including the
                // previous upload's timestamp.
                self.ledger
                    .archive_current(
                        &record,
                        VersionState::Replaced,
                        Some(REPLACED_BY_UPLOAD_REASON.to_string()),
                        actor,
                        now,
                    )
                    .await?;

                // Quota columns are settled; the content update leaves them
                // alone so a concurrent claimant is never clobbered.
                let mut updated = claimed;
                updated.external_file_id = file.external_file_id;
                updated.file_name = file.file_name;
                updated.file_type = file.file_type;
                updated.size_bytes = file.size_bytes;
                updated.review_state = ReviewState::Pending;
                updated.rejection_reason = None;
                updated.current_version = record.current_version + 1;
                updated.has_prior_version = true;
                updated.updated_at = now;
                self.store.update_record_content(&updated).await?
            }
            None => {
                self.store
                    .insert_record(NewDocumentRecord {
                        participant_id: participant.id,
                        document_type_code: document_type_code.to_string(),
                        external_file_id: file.external_file_id,
                        file_name: file.file_name,
                        file_type: file.file_type,
                        size_bytes: file.size_bytes,
                        upload_count: 1,
                        last_reset_date: today,
                        last_upload_at: Some(now),
                        review_state: ReviewState::Pending,
                        current_version: 1,
                    })
                    .await?
            }
        };

        info!(
            participant_id = participant.id,
            document_type = %document_type_code,
            record_id = persisted.id,
            version = persisted.current_version,
            actor = %actor,
            "recorded document upload"
        );
        Ok(persisted)
    }

    /// Version history for one document, most recent first.
    pub async fn get_history(
        &self,
        participant_id: i64,
        document_type_code: &str,
    ) -> AppResult<Vec<DocumentVersion>> {
        self.registry.get(document_type_code)?;
        let record = self
            .store
            .find_record(participant_id, document_type_code)
            .await?
            .ok_or_else(|| {
                AppError::not_found(
                    "document record",
                    format!("{participant_id}/{document_type_code}"),
                )
            })?;
        self.ledger.history(record.id).await
    }

    /// Reinstates an archived revision. Authorization is the caller's
    /// problem; the ownership check is not.
    pub async fn restore_version(
        &self,
        version_id: i64,
        actor: &str,
    ) -> AppResult<DocumentRecord> {
        let (now, today) = self.now_and_today();
        let version = self
            .store
            .find_version(version_id)
            .await?
            .ok_or_else(|| AppError::not_found("document version", version_id))?;
        let record = self
            .store
            .find_record_by_id(version.document_record_id)
            .await?
            .ok_or_else(|| {
                AppError::not_found("document record", version.document_record_id)
            })?;
        self.ledger
            .restore(&record, &version, actor, today, now)
            .await
    }

    /// Marks the live document approved.
    pub async fn approve(
        &self,
        participant_id: i64,
        document_type_code: &str,
        actor: &str,
    ) -> AppResult<DocumentRecord> {
        let (now, _) = self.now_and_today();
        let record = self
            .require_record(participant_id, document_type_code)
            .await?;

        let mut updated = record;
        updated.review_state = ReviewState::Approved;
        updated.rejection_reason = None;
        updated.updated_at = now;
        let persisted = self.store.update_record_content(&updated).await?;
        info!(
            record_id = persisted.id,
            actor = %actor,
            "approved document"
        );
        Ok(persisted)
    }

    /// Rejects the live document: the current pointer is archived as a
    /// rejected version carrying the reviewer's reason, then the record is
    /// marked rejected so the family can re-upload.
    pub async fn reject(
        &self,
        participant_id: i64,
        document_type_code: &str,
        reason: &str,
        actor: &str,
    ) -> AppResult<DocumentRecord> {
        let (now, _) = self.now_and_today();
        let record = self
            .require_record(participant_id, document_type_code)
            .await?;

        self.ledger
            .archive_current(
                &record,
                VersionState::Rejected,
                Some(reason.to_string()),
                actor,
                now,
            )
            .await?;

        let mut updated = record.clone();
        updated.review_state = ReviewState::Rejected;
        updated.rejection_reason = Some(reason.to_string());
        updated.current_version = record.current_version + 1;
        updated.has_prior_version = true;
        updated.updated_at = now;
        let persisted = self.store.update_record_content(&updated).await?;
        info!(
            record_id = persisted.id,
            actor = %actor,
            "rejected document"
        );
        Ok(persisted)
    }

    /// Trims a document's history down to its `keep` newest versions. Only
    /// ever runs when explicitly asked for.
    pub async fn prune_history(&self, record_id: i64, keep: usize) -> AppResult<usize> {
        self.store
            .find_record_by_id(record_id)
            .await?
            .ok_or_else(|| AppError::not_found("document record", record_id))?;
        self.ledger.prune(record_id, keep).await
    }

    async fn require_record(
        &self,
        participant_id: i64,
        document_type_code: &str,
    ) -> AppResult<DocumentRecord> {
        self.registry.get(document_type_code)?;
        self.store
            .find_record(participant_id, document_type_code)
            .await?
            .ok_or_else(|| {
                AppError::not_found(
                    "document record",
                    format!("{participant_id}/{document_type_code}"),
                )
            })
    }
}
