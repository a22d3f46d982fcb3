use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::drive::RemoteEntry;
use crate::models::{DocumentRecord, ReviewState};
use crate::registry::{DocumentTypeDefinition, DocumentTypeRegistry};

/// Derived status of one document type for one participant. A read-only
/// projection: classification never creates rows or touches review state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    Missing,
    Uploaded,
    PendingReview,
    Rejected,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchedFile {
    pub external_file_id: String,
    pub file_name: String,
    pub mime_type: String,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypeStatus {
    pub code: String,
    pub display_name: String,
    pub state: DocumentState,
    pub mandatory: bool,
    pub has_template: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_file: Option<MatchedFile>,
    /// `None` with a matched file means the file sits in the folder without a
    /// metadata row: present but unregistered. No workflow state is invented
    /// for it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub uploaded: u32,
    pub pending_review: u32,
    pub rejected: u32,
    pub missing_mandatory: u32,
    pub missing_optional: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct FolderStatus {
    pub per_type: Vec<TypeStatus>,
    pub summary: StatusSummary,
}

/// Cross-references a folder listing against the catalog and the metadata rows
/// for one participant. Pure and idempotent; handles empty folders and absent
/// rows (a brand-new participant reads as "all types missing", never as an
/// error).
pub fn classify(
    registry: &DocumentTypeRegistry,
    age_years: i32,
    entries: &[RemoteEntry],
    records: &[DocumentRecord],
) -> FolderStatus {
    let mut per_type = Vec::with_capacity(registry.len());
    let mut summary = StatusSummary::default();

    for definition in registry.iter() {
        if !definition.applies_to_age(age_years) {
            continue;
        }

        let matched = entries
            .iter()
            .filter(|entry| !entry.is_folder())
            .filter(|entry| matches_definition(registry, definition, &entry.name))
            .max_by_key(|entry| entry.modified_at);

        let (state, matched_file, record_id) = match matched {
            Some(file) => {
                let record = records
                    .iter()
                    .find(|record| record.external_file_id == file.id)
                    .or_else(|| {
                        records
                            .iter()
                            .find(|record| record.document_type_code == definition.code)
                    });
                let state = match record.map(|record| record.review_state) {
                    Some(ReviewState::Pending) => DocumentState::PendingReview,
                    Some(ReviewState::Approved) | None => DocumentState::Uploaded,
                    Some(ReviewState::Rejected) => DocumentState::Rejected,
                };
                (
                    state,
                    Some(MatchedFile {
                        external_file_id: file.id.clone(),
                        file_name: file.name.clone(),
                        mime_type: file.mime_type.clone(),
                        modified_at: file.modified_at,
                    }),
                    record.map(|record| record.id),
                )
            }
            None => (DocumentState::Missing, None, None),
        };

        match state {
            DocumentState::Uploaded => summary.uploaded += 1,
            DocumentState::PendingReview => summary.pending_review += 1,
            DocumentState::Rejected => summary.rejected += 1,
            DocumentState::Missing => {
                if definition.mandatory {
                    summary.missing_mandatory += 1;
                } else {
                    summary.missing_optional += 1;
                }
            }
        }

        per_type.push(TypeStatus {
            code: definition.code.clone(),
            display_name: definition.display_name.clone(),
            state,
            mandatory: definition.mandatory,
            has_template: definition.has_template,
            matched_file,
            record_id,
        });
    }

    FolderStatus { per_type, summary }
}

/// Filename match for one definition, case-insensitive.
///
/// Current format: `{prefix}[_{token}]_...` or `{prefix}[_{token}].ext`.
/// Legacy format (`"{prefix} - ..."` and close variants) is only honored when
/// the prefix is unshared; a bare shared prefix cannot say which type it means.
fn matches_definition(
    registry: &DocumentTypeRegistry,
    definition: &DocumentTypeDefinition,
    file_name: &str,
) -> bool {
    let name = file_name.to_lowercase();
    let mut stem = definition.prefix.to_lowercase();
    if let Some(token) = &definition.disambiguation_token {
        stem.push('_');
        stem.push_str(&token.to_lowercase());
    }

    if name.starts_with(&format!("{stem}_")) || name.starts_with(&format!("{stem}.")) {
        return true;
    }

    if registry.is_prefix_shared(&definition.prefix) {
        return false;
    }

    let prefix = definition.prefix.to_lowercase();
    name.starts_with(&format!("{prefix} - "))
        || name.starts_with(&format!("{prefix}- "))
        || name.starts_with(&format!("{prefix} -"))
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone};

    use super::*;
    use crate::models::NewDocumentRecord;

    fn file(id: &str, name: &str, modified_minute: u32) -> RemoteEntry {
        RemoteEntry {
            id: id.to_string(),
            name: name.to_string(),
            mime_type: "application/pdf".to_string(),
            size_bytes: Some(1024),
            parent_id: Some("participant-folder".to_string()),
            modified_at: Utc
                .with_ymd_and_hms(2024, 3, 1, 10, modified_minute, 0)
                .unwrap(),
        }
    }

    fn folder(id: &str, name: &str) -> RemoteEntry {
        RemoteEntry {
            id: id.to_string(),
            name: name.to_string(),
            mime_type: crate::drive::FOLDER_MIME_TYPE.to_string(),
            size_bytes: None,
            parent_id: Some("participant-folder".to_string()),
            modified_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
        }
    }

    fn record(id: i64, code: &str, file_id: &str, review_state: ReviewState) -> DocumentRecord {
        let new = NewDocumentRecord {
            participant_id: 7,
            document_type_code: code.to_string(),
            external_file_id: file_id.to_string(),
            file_name: format!("{code}.pdf"),
            file_type: Some("application/pdf".to_string()),
            size_bytes: 1024,
            upload_count: 1,
            last_reset_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            last_upload_at: Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()),
            review_state,
            current_version: 1,
        };
        DocumentRecord {
            id,
            participant_id: new.participant_id,
            document_type_code: new.document_type_code,
            external_file_id: new.external_file_id,
            file_name: new.file_name,
            file_type: new.file_type,
            size_bytes: new.size_bytes,
            upload_count: new.upload_count,
            last_reset_date: new.last_reset_date,
            last_upload_at: new.last_upload_at,
            review_state: new.review_state,
            rejection_reason: None,
            current_version: new.current_version,
            has_prior_version: false,
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
        }
    }

    fn status_of<'a>(status: &'a FolderStatus, code: &str) -> &'a TypeStatus {
        status
            .per_type
            .iter()
            .find(|entry| entry.code == code)
            .unwrap()
    }

    #[test]
    fn empty_folder_and_no_rows_reads_as_all_missing() {
        let registry = DocumentTypeRegistry::builtin();
        let status = classify(&registry, 15, &[], &[]);

        assert_eq!(status.per_type.len(), 7);
        assert!(status
            .per_type
            .iter()
            .all(|entry| entry.state == DocumentState::Missing));
        assert_eq!(status.summary.uploaded, 0);
        assert_eq!(status.summary.missing_mandatory, 5);
        assert_eq!(status.summary.missing_optional, 2);
    }

    #[test]
    fn shared_prefix_disambiguates_by_token() {
        let registry = DocumentTypeRegistry::builtin();
        let entries = vec![
            file("sip-1", "A02_SIP_JuanPerez.pdf", 0),
            file("vac-1", "A02_Vacunas_JuanPerez.pdf", 1),
        ];
        let status = classify(&registry, 10, &entries, &[]);

        let sip = status_of(&status, "tarjeta_sip");
        let vaccination = status_of(&status, "cartilla_vacunas");
        assert_eq!(
            sip.matched_file.as_ref().unwrap().external_file_id,
            "sip-1"
        );
        assert_eq!(
            vaccination.matched_file.as_ref().unwrap().external_file_id,
            "vac-1"
        );
    }

    #[test]
    fn legacy_format_matches_unshared_prefix_only() {
        let registry = DocumentTypeRegistry::builtin();
        let entries = vec![
            file("f-1", "DOC01 - JuanPerez.pdf", 0),
            file("f-2", "A02 - JuanPerez.pdf", 1),
        ];
        let status = classify(&registry, 10, &entries, &[]);

        assert_eq!(
            status_of(&status, "ficha_inscripcion").state,
            DocumentState::Uploaded
        );
        // A shared prefix forbids the legacy fallback for both claimants.
        assert_eq!(status_of(&status, "tarjeta_sip").state, DocumentState::Missing);
        assert_eq!(
            status_of(&status, "cartilla_vacunas").state,
            DocumentState::Missing
        );
    }

    #[test]
    fn legacy_spacing_variants_match() {
        let registry = DocumentTypeRegistry::builtin();
        for name in ["DOC01 - Juan.pdf", "DOC01- Juan.pdf", "DOC01 -Juan.pdf"] {
            let entries = vec![file("f-1", name, 0)];
            let status = classify(&registry, 10, &entries, &[]);
            assert_eq!(
                status_of(&status, "ficha_inscripcion").state,
                DocumentState::Uploaded,
                "expected legacy match for {name}"
            );
        }
    }

    #[test]
    fn current_format_requires_separator_after_stem() {
        let registry = DocumentTypeRegistry::builtin();
        // "DOC01Juan.pdf" runs the prefix into the name; no separator, no match.
        let entries = vec![file("f-1", "DOC01Juan.pdf", 0)];
        let status = classify(&registry, 10, &entries, &[]);
        assert_eq!(
            status_of(&status, "ficha_inscripcion").state,
            DocumentState::Missing
        );

        let entries = vec![file("f-2", "doc01.pdf", 0)];
        let status = classify(&registry, 10, &entries, &[]);
        assert_eq!(
            status_of(&status, "ficha_inscripcion").state,
            DocumentState::Uploaded
        );
    }

    #[test]
    fn matching_is_case_insensitive() {
        let registry = DocumentTypeRegistry::builtin();
        let entries = vec![file("sip-1", "a02_sip_juan.PDF", 0)];
        let status = classify(&registry, 10, &entries, &[]);
        assert_eq!(
            status_of(&status, "tarjeta_sip").state,
            DocumentState::Uploaded
        );
    }

    #[test]
    fn most_recently_modified_file_wins() {
        let registry = DocumentTypeRegistry::builtin();
        let entries = vec![
            file("old", "DOC01_Juan_old.pdf", 0),
            file("new", "DOC01_Juan_new.pdf", 30),
        ];
        let status = classify(&registry, 10, &entries, &[]);
        assert_eq!(
            status_of(&status, "ficha_inscripcion")
                .matched_file
                .as_ref()
                .unwrap()
                .external_file_id,
            "new"
        );
    }

    #[test]
    fn age_gate_excludes_then_includes() {
        let registry = DocumentTypeRegistry::builtin();
        let at_13 = classify(&registry, 13, &[], &[]);
        let at_14 = classify(&registry, 14, &[], &[]);

        assert!(at_13.per_type.iter().all(|entry| entry.code != "dni"));
        assert!(at_14.per_type.iter().any(|entry| entry.code == "dni"));
    }

    #[test]
    fn review_state_maps_onto_document_state() {
        let registry = DocumentTypeRegistry::builtin();
        let entries = vec![file("f-1", "DOC01_Juan.pdf", 0)];

        let pending = classify(
            &registry,
            10,
            &entries,
            &[record(1, "ficha_inscripcion", "f-1", ReviewState::Pending)],
        );
        assert_eq!(
            status_of(&pending, "ficha_inscripcion").state,
            DocumentState::PendingReview
        );

        let approved = classify(
            &registry,
            10,
            &entries,
            &[record(1, "ficha_inscripcion", "f-1", ReviewState::Approved)],
        );
        assert_eq!(
            status_of(&approved, "ficha_inscripcion").state,
            DocumentState::Uploaded
        );

        let rejected = classify(
            &registry,
            10,
            &entries,
            &[record(1, "ficha_inscripcion", "f-1", ReviewState::Rejected)],
        );
        assert_eq!(
            status_of(&rejected, "ficha_inscripcion").state,
            DocumentState::Rejected
        );
        assert_eq!(rejected.summary.rejected, 1);
    }

    #[test]
    fn file_without_row_is_uploaded_but_unregistered() {
        let registry = DocumentTypeRegistry::builtin();
        let entries = vec![file("f-1", "DOC03_Juan.pdf", 0)];
        let status = classify(&registry, 10, &entries, &[]);

        let medical = status_of(&status, "ficha_medica");
        assert_eq!(medical.state, DocumentState::Uploaded);
        assert!(medical.matched_file.is_some());
        assert_eq!(medical.record_id, None);
    }

    #[test]
    fn row_matched_by_file_id_before_type_code() {
        let registry = DocumentTypeRegistry::builtin();
        let entries = vec![file("f-new", "DOC01_Juan.pdf", 0)];
        // A stale row for the same type points at an older file; the row found
        // by file id must win over the one found by code.
        let by_code = record(1, "ficha_inscripcion", "f-old", ReviewState::Rejected);
        let by_file = record(2, "ficha_inscripcion", "f-new", ReviewState::Pending);
        let status = classify(&registry, 10, &entries, &[by_code, by_file]);

        let entry = status_of(&status, "ficha_inscripcion");
        assert_eq!(entry.record_id, Some(2));
        assert_eq!(entry.state, DocumentState::PendingReview);
    }

    #[test]
    fn subfolders_never_match() {
        let registry = DocumentTypeRegistry::builtin();
        let entries = vec![folder("sub-1", "DOC01_Juan")];
        let status = classify(&registry, 10, &entries, &[]);
        assert_eq!(
            status_of(&status, "ficha_inscripcion").state,
            DocumentState::Missing
        );
    }

    #[test]
    fn classification_is_idempotent() {
        let registry = DocumentTypeRegistry::builtin();
        let entries = vec![
            file("sip-1", "A02_SIP_Juan.pdf", 0),
            file("f-1", "DOC01_Juan.pdf", 1),
        ];
        let rows = vec![record(1, "ficha_inscripcion", "f-1", ReviewState::Approved)];

        let first = classify(&registry, 15, &entries, &rows);
        let second = classify(&registry, 15, &entries, &rows);
        assert_eq!(first.summary, second.summary);
        assert_eq!(first.per_type.len(), second.per_type.len());
    }
}
