use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use diesel::sql_types::{BigInt, Date, Integer, Timestamptz};

use crate::db::PgPool;
use crate::error::{AppError, AppResult};
use crate::models::{
    DocumentRecord, DocumentVersion, NewDocumentRecord, NewDocumentVersion, ReviewState,
    VersionState,
};
use crate::schema::{document_records, document_versions};
use crate::store::MetadataStore;

type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

/// Postgres-backed metadata store.
pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> AppResult<PgPooledConnection> {
        self.pool
            .get()
            .map_err(|err| AppError::Pool(err.to_string()))
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    async fn find_record(
        &self,
        participant_id: i64,
        document_type_code: &str,
    ) -> AppResult<Option<DocumentRecord>> {
        let mut conn = self.conn()?;
        let row: Option<RecordRow> = document_records::table
            .filter(document_records::participant_id.eq(participant_id))
            .filter(document_records::document_type_code.eq(document_type_code))
            .first(&mut conn)
            .optional()?;
        row.map(RecordRow::into_domain).transpose()
    }

    async fn find_record_by_id(&self, record_id: i64) -> AppResult<Option<DocumentRecord>> {
        let mut conn = self.conn()?;
        let row: Option<RecordRow> = document_records::table
            .find(record_id)
            .first(&mut conn)
            .optional()?;
        row.map(RecordRow::into_domain).transpose()
    }

    async fn records_for_participant(
        &self,
        participant_id: i64,
    ) -> AppResult<Vec<DocumentRecord>> {
        let mut conn = self.conn()?;
        let rows: Vec<RecordRow> = document_records::table
            .filter(document_records::participant_id.eq(participant_id))
            .order(document_records::document_type_code.asc())
            .load(&mut conn)?;
        rows.into_iter().map(RecordRow::into_domain).collect()
    }

    async fn insert_record(&self, record: NewDocumentRecord) -> AppResult<DocumentRecord> {
        let mut conn = self.conn()?;
        let row: RecordRow = diesel::insert_into(document_records::table)
            .values(NewRecordRow::from(&record))
            .get_result(&mut conn)?;
        row.into_domain()
    }

    async fn update_record(&self, record: &DocumentRecord) -> AppResult<DocumentRecord> {
        let mut conn = self.conn()?;
        let row: RecordRow = diesel::update(document_records::table.find(record.id))
            .set(RecordChangeset::from(record))
            .get_result(&mut conn)?;
        row.into_domain()
    }

    async fn update_record_content(&self, record: &DocumentRecord) -> AppResult<DocumentRecord> {
        let mut conn = self.conn()?;
        let row: RecordRow = diesel::update(document_records::table.find(record.id))
            .set(ContentChangeset::from(record))
            .get_result(&mut conn)?;
        row.into_domain()
    }

    async fn reset_quota_if_stale(
        &self,
        record_id: i64,
        today: NaiveDate,
    ) -> AppResult<DocumentRecord> {
        let mut conn = self.conn()?;
        diesel::update(
            document_records::table
                .filter(document_records::id.eq(record_id))
                .filter(document_records::last_reset_date.ne(today)),
        )
        .set((
            document_records::upload_count.eq(0),
            document_records::last_reset_date.eq(today),
        ))
        .execute(&mut conn)?;

        let row: Option<RecordRow> = document_records::table
            .find(record_id)
            .first(&mut conn)
            .optional()?;
        row.map(RecordRow::into_domain)
            .transpose()?
            .ok_or_else(|| AppError::not_found("document record", record_id))
    }

    async fn claim_upload_slot(
        &self,
        record_id: i64,
        today: NaiveDate,
        now: DateTime<Utc>,
        limit: i32,
    ) -> AppResult<Option<DocumentRecord>> {
        let mut conn = self.conn()?;
        // Reset-and-increment as one conditional statement, so two concurrent
        // claims can never both slip under the limit. The caller gets the row
        // as the claim left it, never a pre-claim read.
        let row: Option<RecordRow> = diesel::sql_query(
            "UPDATE document_records \
             SET upload_count = CASE WHEN last_reset_date = $2 THEN upload_count + 1 ELSE 1 END, \
                 last_reset_date = $2, \
                 last_upload_at = $3, \
                 updated_at = $3 \
             WHERE id = $1 AND (last_reset_date <> $2 OR upload_count < $4) \
             RETURNING *",
        )
        .bind::<BigInt, _>(record_id)
        .bind::<Date, _>(today)
        .bind::<Timestamptz, _>(now)
        .bind::<Integer, _>(limit)
        .get_result(&mut conn)
        .optional()?;
        row.map(RecordRow::into_domain).transpose()
    }

    async fn insert_version(&self, version: NewDocumentVersion) -> AppResult<DocumentVersion> {
        let mut conn = self.conn()?;
        // A retried overwrite re-archives the same snapshot; the unique key on
        // (record, version number) turns that into a fetch of the stored row.
        let inserted: Option<VersionRow> = diesel::insert_into(document_versions::table)
            .values(NewVersionRow::from(&version))
            .on_conflict((
                document_versions::document_record_id,
                document_versions::version_number,
            ))
            .do_nothing()
            .get_result(&mut conn)
            .optional()?;
        let row = match inserted {
            Some(row) => row,
            None => document_versions::table
                .filter(document_versions::document_record_id.eq(version.document_record_id))
                .filter(document_versions::version_number.eq(version.version_number))
                .first(&mut conn)?,
        };
        row.into_domain()
    }

    async fn find_version(&self, version_id: i64) -> AppResult<Option<DocumentVersion>> {
        let mut conn = self.conn()?;
        let row: Option<VersionRow> = document_versions::table
            .find(version_id)
            .first(&mut conn)
            .optional()?;
        row.map(VersionRow::into_domain).transpose()
    }

    async fn versions_for_record(&self, record_id: i64) -> AppResult<Vec<DocumentVersion>> {
        let mut conn = self.conn()?;
        let rows: Vec<VersionRow> = document_versions::table
            .filter(document_versions::document_record_id.eq(record_id))
            .order(document_versions::version_number.desc())
            .load(&mut conn)?;
        rows.into_iter().map(VersionRow::into_domain).collect()
    }

    async fn set_version_state(
        &self,
        version_id: i64,
        state: VersionState,
    ) -> AppResult<DocumentVersion> {
        let mut conn = self.conn()?;
        let row: VersionRow = diesel::update(document_versions::table.find(version_id))
            .set(document_versions::state.eq(state.as_str()))
            .get_result(&mut conn)?;
        row.into_domain()
    }

    async fn prune_versions(&self, record_id: i64, keep: usize) -> AppResult<usize> {
        let mut conn = self.conn()?;
        let stale_ids: Vec<i64> = document_versions::table
            .filter(document_versions::document_record_id.eq(record_id))
            .order(document_versions::version_number.desc())
            .offset(keep as i64)
            .select(document_versions::id)
            .load(&mut conn)?;

        if stale_ids.is_empty() {
            return Ok(0);
        }

        let deleted = diesel::delete(
            document_versions::table.filter(document_versions::id.eq_any(&stale_ids)),
        )
        .execute(&mut conn)?;
        Ok(deleted)
    }
}

#[derive(Debug, Queryable, QueryableByName)]
#[diesel(table_name = document_records)]
struct RecordRow {
    id: i64,
    participant_id: i64,
    document_type_code: String,
    external_file_id: String,
    file_name: String,
    file_type: Option<String>,
    size_bytes: i64,
    upload_count: i32,
    last_reset_date: NaiveDate,
    last_upload_at: Option<DateTime<Utc>>,
    review_state: String,
    rejection_reason: Option<String>,
    current_version: i32,
    has_prior_version: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RecordRow {
    fn into_domain(self) -> AppResult<DocumentRecord> {
        Ok(DocumentRecord {
            id: self.id,
            participant_id: self.participant_id,
            document_type_code: self.document_type_code,
            external_file_id: self.external_file_id,
            file_name: self.file_name,
            file_type: self.file_type,
            size_bytes: self.size_bytes,
            upload_count: self.upload_count,
            last_reset_date: self.last_reset_date,
            last_upload_at: self.last_upload_at,
            review_state: self.review_state.parse::<ReviewState>()?,
            rejection_reason: self.rejection_reason,
            current_version: self.current_version,
            has_prior_version: self.has_prior_version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = document_records)]
struct NewRecordRow {
    participant_id: i64,
    document_type_code: String,
    external_file_id: String,
    file_name: String,
    file_type: Option<String>,
    size_bytes: i64,
    upload_count: i32,
    last_reset_date: NaiveDate,
    last_upload_at: Option<DateTime<Utc>>,
    review_state: String,
    current_version: i32,
}

impl From<&NewDocumentRecord> for NewRecordRow {
    fn from(record: &NewDocumentRecord) -> Self {
        Self {
            participant_id: record.participant_id,
            document_type_code: record.document_type_code.clone(),
            external_file_id: record.external_file_id.clone(),
            file_name: record.file_name.clone(),
            file_type: record.file_type.clone(),
            size_bytes: record.size_bytes,
            upload_count: record.upload_count,
            last_reset_date: record.last_reset_date,
            last_upload_at: record.last_upload_at,
            review_state: record.review_state.as_str().to_string(),
            current_version: record.current_version,
        }
    }
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = document_records)]
#[diesel(treat_none_as_null = true)]
struct RecordChangeset {
    external_file_id: String,
    file_name: String,
    file_type: Option<String>,
    size_bytes: i64,
    upload_count: i32,
    last_reset_date: NaiveDate,
    last_upload_at: Option<DateTime<Utc>>,
    review_state: String,
    rejection_reason: Option<String>,
    current_version: i32,
    has_prior_version: bool,
    updated_at: DateTime<Utc>,
}

impl From<&DocumentRecord> for RecordChangeset {
    fn from(record: &DocumentRecord) -> Self {
        Self {
            external_file_id: record.external_file_id.clone(),
            file_name: record.file_name.clone(),
            file_type: record.file_type.clone(),
            size_bytes: record.size_bytes,
            upload_count: record.upload_count,
            last_reset_date: record.last_reset_date,
            last_upload_at: record.last_upload_at,
            review_state: record.review_state.as_str().to_string(),
            rejection_reason: record.rejection_reason.clone(),
            current_version: record.current_version,
            has_prior_version: record.has_prior_version,
            updated_at: record.updated_at,
        }
    }
}

/// Everything of the live pointer except the three quota columns the atomic
/// claim owns.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = document_records)]
#[diesel(treat_none_as_null = true)]
struct ContentChangeset {
    external_file_id: String,
    file_name: String,
    file_type: Option<String>,
    size_bytes: i64,
    review_state: String,
    rejection_reason: Option<String>,
    current_version: i32,
    has_prior_version: bool,
    updated_at: DateTime<Utc>,
}

impl From<&DocumentRecord> for ContentChangeset {
    fn from(record: &DocumentRecord) -> Self {
        Self {
            external_file_id: record.external_file_id.clone(),
            file_name: record.file_name.clone(),
            file_type: record.file_type.clone(),
            size_bytes: record.size_bytes,
            review_state: record.review_state.as_str().to_string(),
            rejection_reason: record.rejection_reason.clone(),
            current_version: record.current_version,
            has_prior_version: record.has_prior_version,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Queryable)]
struct VersionRow {
    id: i64,
    document_record_id: i64,
    external_file_id: String,
    file_name: String,
    file_type: Option<String>,
    size_bytes: i64,
    version_number: i32,
    uploaded_by: String,
    uploaded_at: DateTime<Utc>,
    state: String,
    reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl VersionRow {
    fn into_domain(self) -> AppResult<DocumentVersion> {
        Ok(DocumentVersion {
            id: self.id,
            document_record_id: self.document_record_id,
            external_file_id: self.external_file_id,
            file_name: self.file_name,
            file_type: self.file_type,
            size_bytes: self.size_bytes,
            version_number: self.version_number,
            uploaded_by: self.uploaded_by,
            uploaded_at: self.uploaded_at,
            state: self.state.parse::<VersionState>()?,
            reason: self.reason,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = document_versions)]
struct NewVersionRow {
    document_record_id: i64,
    external_file_id: String,
    file_name: String,
    file_type: Option<String>,
    size_bytes: i64,
    version_number: i32,
    uploaded_by: String,
    uploaded_at: DateTime<Utc>,
    state: String,
    reason: Option<String>,
}

impl From<&NewDocumentVersion> for NewVersionRow {
    fn from(version: &NewDocumentVersion) -> Self {
        Self {
            document_record_id: version.document_record_id,
            external_file_id: version.external_file_id.clone(),
            file_name: version.file_name.clone(),
            file_type: version.file_type.clone(),
            size_bytes: version.size_bytes,
            version_number: version.version_number,
            uploaded_by: version.uploaded_by.clone(),
            uploaded_at: version.uploaded_at,
            state: version.state.as_str().to_string(),
            reason: version.reason.clone(),
        }
    }
}
