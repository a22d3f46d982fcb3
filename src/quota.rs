use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};

use crate::models::{Cooldown, DocumentRecord, QuotaDecision};

/// The organization's calendar day for a given instant.
pub fn local_today(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

/// Local midnight following the calendar day of `instant`, expressed in UTC.
pub fn next_local_midnight(instant: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    let local_day = instant.with_timezone(&offset).date_naive();
    let next_local = local_day
        .succ_opt()
        .unwrap_or(local_day)
        .and_time(NaiveTime::MIN);
    let utc_naive = next_local - Duration::seconds(i64::from(offset.local_minus_utc()));
    DateTime::from_naive_utc_and_offset(utc_naive, Utc)
}

/// Remaining wait until the quota window rolls over. Anchored on the last
/// upload: the next slot opens at local midnight after that upload's day.
pub fn cooldown(record: &DocumentRecord, now: DateTime<Utc>, offset: FixedOffset) -> Cooldown {
    let anchor = record.last_upload_at.unwrap_or(now);
    let next_allowed_at = next_local_midnight(anchor, offset);
    Cooldown {
        remaining_ms: (next_allowed_at - now).num_milliseconds().max(0),
        next_allowed_at,
    }
}

/// Quota verdict for a (possibly absent) record. Pure: the day-rollover reset
/// is persisted elsewhere, but a stale `last_reset_date` is still read as a
/// fresh window here so the verdict never depends on write ordering.
pub fn decision(
    record: Option<&DocumentRecord>,
    today: NaiveDate,
    now: DateTime<Utc>,
    offset: FixedOffset,
    limit: i32,
) -> QuotaDecision {
    let Some(record) = record else {
        // First upload creates the row; nothing to throttle yet.
        return QuotaDecision {
            allowed: true,
            count: 0,
            limit,
            cooldown: None,
        };
    };

    let count = if record.last_reset_date == today {
        record.upload_count
    } else {
        0
    };
    let allowed = count < limit;

    QuotaDecision {
        allowed,
        count,
        limit,
        cooldown: (!allowed).then(|| cooldown(record, now, offset)),
    }
}
