mod common;

use chrono::{Duration, TimeZone, Utc};
use common::{file_metadata, flaky_harness, harness, harness_with_config, participant, test_config};
use paperscout::error::AppError;
use paperscout::models::{ReviewState, VersionState};

#[tokio::test]
async fn first_upload_creates_record_and_consumes_the_day() {
    let harness = harness().await;
    let juan = participant();

    let decision = harness
        .service
        .can_upload(juan.id, "ficha_inscripcion")
        .await
        .unwrap();
    assert!(decision.allowed);
    assert_eq!(decision.count, 0);

    let record = harness
        .service
        .record_upload(&juan, "ficha_inscripcion", file_metadata("f-1", "DOC01.pdf"), "familia.perez")
        .await
        .unwrap();
    assert_eq!(record.current_version, 1);
    assert_eq!(record.upload_count, 1);
    assert_eq!(record.review_state, ReviewState::Pending);
    assert_eq!(record.external_file_id, "f-1");
    assert!(!record.has_prior_version);

    let decision = harness
        .service
        .can_upload(juan.id, "ficha_inscripcion")
        .await
        .unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.count, 1);

    let history = harness
        .service
        .get_history(juan.id, "ficha_inscripcion")
        .await
        .unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn second_upload_same_day_is_denied_with_cooldown() {
    let harness = harness().await;
    let juan = participant();
    harness
        .service
        .record_upload(&juan, "ficha_medica", file_metadata("f-1", "DOC03.pdf"), "familia.perez")
        .await
        .unwrap();

    let err = harness
        .service
        .record_upload(&juan, "ficha_medica", file_metadata("f-2", "DOC03.pdf"), "familia.perez")
        .await
        .unwrap_err();

    // Uploaded at 10:00 UTC with a +01:00 section day; the window reopens at
    // local midnight, 23:00 UTC.
    match err {
        AppError::QuotaExceeded { count, limit, cooldown } => {
            assert_eq!(count, 1);
            assert_eq!(limit, 1);
            assert_eq!(
                cooldown.next_allowed_at,
                Utc.with_ymd_and_hms(2024, 3, 1, 23, 0, 0).unwrap()
            );
            assert!(cooldown.remaining_ms > 0);
        }
        other => panic!("expected QuotaExceeded, got {other:?}"),
    }

    // Denial does not disturb the quota state.
    let decision = harness
        .service
        .can_upload(juan.id, "ficha_medica")
        .await
        .unwrap();
    assert!(!decision.allowed);
}

#[tokio::test]
async fn next_day_reupload_archives_the_previous_version() {
    let harness = harness().await;
    let juan = participant();
    harness
        .service
        .record_upload(&juan, "ficha_inscripcion", file_metadata("f-1", "DOC01_v1.pdf"), "familia.perez")
        .await
        .unwrap();

    harness.clock.advance(Duration::hours(24));
    let decision = harness
        .service
        .can_upload(juan.id, "ficha_inscripcion")
        .await
        .unwrap();
    assert!(decision.allowed);

    let record = harness
        .service
        .record_upload(&juan, "ficha_inscripcion", file_metadata("f-2", "DOC01_v2.pdf"), "familia.perez")
        .await
        .unwrap();
    assert_eq!(record.current_version, 2);
    assert_eq!(record.external_file_id, "f-2");
    assert_eq!(record.review_state, ReviewState::Pending);
    assert!(record.has_prior_version);

    let history = harness
        .service
        .get_history(juan.id, "ficha_inscripcion")
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].version_number, 1);
    assert_eq!(history[0].external_file_id, "f-1");
    assert_eq!(history[0].state, VersionState::Replaced);
    assert_eq!(history[0].reason.as_deref(), Some("replaced by new upload"));
}

#[tokio::test]
async fn quota_is_per_document_type() {
    let harness = harness().await;
    let juan = participant();
    harness
        .service
        .record_upload(&juan, "ficha_inscripcion", file_metadata("f-1", "DOC01.pdf"), "familia.perez")
        .await
        .unwrap();

    // A different type still has its slot for the day.
    let decision = harness
        .service
        .can_upload(juan.id, "ficha_medica")
        .await
        .unwrap();
    assert!(decision.allowed);
    harness
        .service
        .record_upload(&juan, "ficha_medica", file_metadata("f-2", "DOC03.pdf"), "familia.perez")
        .await
        .unwrap();
}

#[tokio::test]
async fn higher_limit_allows_same_day_replacement() {
    let mut config = test_config();
    config.daily_upload_limit = 2;
    let harness = harness_with_config(config).await;
    let juan = participant();

    harness
        .service
        .record_upload(&juan, "dni", file_metadata("f-1", "DOC06.pdf"), "familia.perez")
        .await
        .unwrap();
    let record = harness
        .service
        .record_upload(&juan, "dni", file_metadata("f-2", "DOC06.pdf"), "familia.perez")
        .await
        .unwrap();
    assert_eq!(record.upload_count, 2);
    assert_eq!(record.current_version, 2);

    let err = harness
        .service
        .record_upload(&juan, "dni", file_metadata("f-3", "DOC06.pdf"), "familia.perez")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::QuotaExceeded { limit: 2, .. }));
}

#[tokio::test]
async fn version_numbers_never_repeat_across_days() {
    let harness = harness().await;
    let juan = participant();

    for day in 0..3 {
        if day > 0 {
            harness.clock.advance(Duration::hours(24));
        }
        harness
            .service
            .record_upload(
                &juan,
                "ficha_inscripcion",
                file_metadata(&format!("f-{day}"), "DOC01.pdf"),
                "familia.perez",
            )
            .await
            .unwrap();
    }

    let history = harness
        .service
        .get_history(juan.id, "ficha_inscripcion")
        .await
        .unwrap();
    let numbers: Vec<i32> = history.iter().map(|version| version.version_number).collect();
    assert_eq!(numbers, vec![2, 1]);
}

#[tokio::test]
async fn interrupted_reupload_can_be_retried_wholesale() {
    let mut config = test_config();
    config.daily_upload_limit = 2;
    let harness = flaky_harness(config).await;
    let juan = participant();
    harness
        .service
        .record_upload(&juan, "ficha_inscripcion", file_metadata("f-1", "DOC01_v1.pdf"), "familia.perez")
        .await
        .unwrap();
    harness.clock.advance(Duration::hours(24));

    // First attempt archives version 1, then dies on the pointer overwrite.
    harness.store.fail_next_content_update();
    let err = harness
        .service
        .record_upload(&juan, "ficha_inscripcion", file_metadata("f-2", "DOC01_v2.pdf"), "familia.perez")
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    let record = harness
        .service
        .record_upload(&juan, "ficha_inscripcion", file_metadata("f-2", "DOC01_v2.pdf"), "familia.perez")
        .await
        .unwrap();
    assert_eq!(record.external_file_id, "f-2");
    assert_eq!(record.current_version, 2);

    // The snapshot of version 1 exists exactly once.
    let history = harness
        .service
        .get_history(juan.id, "ficha_inscripcion")
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].version_number, 1);
    assert_eq!(history[0].external_file_id, "f-1");
}

#[tokio::test]
async fn concurrent_claim_is_not_clobbered_by_the_pointer_overwrite() {
    let mut config = test_config();
    config.daily_upload_limit = 3;
    let harness = flaky_harness(config).await;
    let juan = participant();
    harness
        .service
        .record_upload(&juan, "ficha_medica", file_metadata("f-1", "DOC03.pdf"), "familia.perez")
        .await
        .unwrap();

    // Another upload of the same document claims its slot between this
    // upload's claim and its pointer overwrite.
    harness.store.claim_during_next_content_update();
    harness
        .service
        .record_upload(&juan, "ficha_medica", file_metadata("f-2", "DOC03.pdf"), "familia.perez")
        .await
        .unwrap();

    let decision = harness
        .service
        .can_upload(juan.id, "ficha_medica")
        .await
        .unwrap();
    assert_eq!(decision.count, 3);
    assert!(!decision.allowed);
}

#[tokio::test]
async fn reject_archives_current_and_records_the_reason() {
    let harness = harness().await;
    let juan = participant();
    harness
        .service
        .record_upload(&juan, "ficha_medica", file_metadata("f-1", "DOC03.pdf"), "familia.perez")
        .await
        .unwrap();

    let record = harness
        .service
        .reject(juan.id, "ficha_medica", "photo is unreadable", "monitor.ana")
        .await
        .unwrap();
    assert_eq!(record.review_state, ReviewState::Rejected);
    assert_eq!(record.rejection_reason.as_deref(), Some("photo is unreadable"));
    assert_eq!(record.current_version, 2);

    let history = harness
        .service
        .get_history(juan.id, "ficha_medica")
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].state, VersionState::Rejected);
    assert_eq!(history[0].reason.as_deref(), Some("photo is unreadable"));
}

#[tokio::test]
async fn approve_clears_the_rejection_reason() {
    let harness = harness().await;
    let juan = participant();
    harness
        .service
        .record_upload(&juan, "ficha_medica", file_metadata("f-1", "DOC03.pdf"), "familia.perez")
        .await
        .unwrap();
    harness
        .service
        .reject(juan.id, "ficha_medica", "wrong document", "monitor.ana")
        .await
        .unwrap();

    let record = harness
        .service
        .approve(juan.id, "ficha_medica", "monitor.ana")
        .await
        .unwrap();
    assert_eq!(record.review_state, ReviewState::Approved);
    assert_eq!(record.rejection_reason, None);
}

#[tokio::test]
async fn unknown_type_is_a_configuration_error() {
    let harness = harness().await;
    let juan = participant();

    let upload = harness
        .service
        .record_upload(&juan, "no_such_type", file_metadata("f-1", "X.pdf"), "familia.perez")
        .await;
    assert!(matches!(upload, Err(AppError::Configuration(_))));

    let check = harness.service.can_upload(juan.id, "no_such_type").await;
    assert!(matches!(check, Err(AppError::Configuration(_))));
}

#[tokio::test]
async fn history_of_unknown_record_is_not_found() {
    let harness = harness().await;
    let result = harness
        .service
        .get_history(participant().id, "ficha_inscripcion")
        .await;
    assert!(matches!(result, Err(AppError::NotFound { .. })));
}
