//! Booking time-window rules: whether a calendar date can still take a new
//! booking, and whether an existing booking can still be cancelled.
//!
//! Both checks are pure functions of their inputs plus an explicit `now`;
//! callers re-evaluate on each request since the answer moves with the
//! clock.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

// ── Constants ──

/// Wall-clock hour after which next-day bookings close.
pub const BOOKING_CUTOFF_HOUR: u32 = 18;

/// Hours before a session's start at which cancellation locks.
pub const CANCEL_WINDOW_HOURS: i64 = 24;

// ── Booking cutoff ──

/// Why a date cannot take a new booking. Serialized as the reason key the
/// frontend maps to display copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotBookableReason {
    Past,
    Today,
    TomorrowAfterCutoff,
    InvalidDate,
}

impl NotBookableReason {
    /// The serialized reason key, for error payloads.
    pub fn key(&self) -> &'static str {
        match self {
            NotBookableReason::Past => "past",
            NotBookableReason::Today => "today",
            NotBookableReason::TomorrowAfterCutoff => "tomorrow-after-cutoff",
            NotBookableReason::InvalidDate => "invalid-date",
        }
    }
}

/// Outcome of checking a calendar date against the booking rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingVerdict {
    Bookable,
    NotBookable(NotBookableReason),
}

impl BookingVerdict {
    pub fn is_bookable(&self) -> bool {
        matches!(self, BookingVerdict::Bookable)
    }

    pub fn reason(&self) -> Option<NotBookableReason> {
        match self {
            BookingVerdict::Bookable => None,
            BookingVerdict::NotBookable(reason) => Some(*reason),
        }
    }
}

/// Classify a calendar date for new bookings.
///
/// Same-day booking is never allowed, and tomorrow closes at
/// [`BOOKING_CUTOFF_HOUR`] — 18:00:00 sharp is already closed.
pub fn booking_verdict(date: NaiveDate, now: NaiveDateTime) -> BookingVerdict {
    let today = now.date();
    if date < today {
        return BookingVerdict::NotBookable(NotBookableReason::Past);
    }
    if date == today {
        return BookingVerdict::NotBookable(NotBookableReason::Today);
    }
    if date == today + Duration::days(1) && !before_cutoff(now) {
        return BookingVerdict::NotBookable(NotBookableReason::TomorrowAfterCutoff);
    }
    BookingVerdict::Bookable
}

/// Like [`booking_verdict`] but parses a `YYYY-MM-DD` string first.
/// Malformed input fails closed to `invalid-date` rather than erroring.
pub fn booking_verdict_str(date: &str, now: NaiveDateTime) -> BookingVerdict {
    match parse_date(date) {
        Some(date) => booking_verdict(date, now),
        None => BookingVerdict::NotBookable(NotBookableReason::InvalidDate),
    }
}

/// The first date currently accepting bookings: tomorrow until the cutoff,
/// the day after tomorrow from then on.
pub fn earliest_bookable_date(now: NaiveDateTime) -> NaiveDate {
    let days = if before_cutoff(now) { 1 } else { 2 };
    now.date() + Duration::days(days)
}

fn before_cutoff(now: NaiveDateTime) -> bool {
    now.time() < NaiveTime::from_hms_opt(BOOKING_CUTOFF_HOUR, 0, 0).unwrap()
}

// ── Cancellation deadline ──

/// A scheduled session's occupied interval, as stored on a booking.
#[derive(Debug, Clone)]
pub struct SessionWindow {
    pub date: String,
    pub start_time: String,
    /// Missing end times fall back to one hour after start.
    pub end_time: Option<String>,
}

/// Where a session currently sits relative to its cancellation deadline.
///
/// For any `now` exactly one state holds: the timeline splits into
/// `can-cancel` → `locked-24h` → `in-progress` → `past` with no gaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationState {
    CanCancel {
        deadline: NaiveDateTime,
        hours_left: i64,
    },
    Locked24h,
    InProgress,
    Past,
}

/// Renderable deadline copy for a booking detail view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancellationNotice {
    pub message: String,
    /// Accessible long form carrying the full deadline timestamp.
    pub description: String,
}

impl CancellationState {
    /// Stable key for API payloads and the frontend's message lookup.
    pub fn key(&self) -> &'static str {
        match self {
            CancellationState::CanCancel { .. } => "can-cancel",
            CancellationState::Locked24h => "locked-24h",
            CancellationState::InProgress => "in-progress",
            CancellationState::Past => "past",
        }
    }

    pub fn allows_cancellation(&self) -> bool {
        matches!(self, CancellationState::CanCancel { .. })
    }

    /// Deadline notice to render, or `None` for past sessions (nothing is
    /// shown once the session has ended).
    pub fn notice(&self) -> Option<CancellationNotice> {
        match self {
            CancellationState::CanCancel {
                deadline,
                hours_left,
            } => Some(CancellationNotice {
                message: format!(
                    "Cancel by {} ({}h left)",
                    deadline.format("%-d %b %Y, %H:%M"),
                    hours_left
                ),
                description: format!(
                    "Free cancellation until {}, {} hours from now",
                    deadline.format("%Y-%m-%d %H:%M"),
                    hours_left
                ),
            }),
            CancellationState::Locked24h => Some(CancellationNotice {
                message: "Cannot cancel (within 24h)".into(),
                description: "The session starts in less than 24 hours, so this booking \
                              can no longer be cancelled"
                    .into(),
            }),
            CancellationState::InProgress => Some(CancellationNotice {
                message: "In progress".into(),
                description: "The session is currently running".into(),
            }),
            CancellationState::Past => None,
        }
    }
}

/// Classify a session window against the cancellation rules. First match
/// wins: ended, running, inside the 24h lock, then free cancellation.
///
/// Unparseable fields are treated as `Past` — a broken record hides its
/// cancel UI instead of failing the whole view.
pub fn cancellation_state(window: &SessionWindow, now: NaiveDateTime) -> CancellationState {
    let Some(start) = session_start(window) else {
        return CancellationState::Past;
    };
    let Some(end) = session_end(window, start) else {
        return CancellationState::Past;
    };
    let deadline = start - Duration::hours(CANCEL_WINDOW_HOURS);

    if now >= end {
        return CancellationState::Past;
    }
    if now >= start {
        return CancellationState::InProgress;
    }
    if now >= deadline {
        return CancellationState::Locked24h;
    }
    CancellationState::CanCancel {
        deadline,
        hours_left: (deadline - now).num_hours().max(0),
    }
}

fn session_start(window: &SessionWindow) -> Option<NaiveDateTime> {
    Some(parse_date(&window.date)?.and_time(parse_time(&window.start_time)?))
}

fn session_end(window: &SessionWindow, start: NaiveDateTime) -> Option<NaiveDateTime> {
    let Some(end_str) = window.end_time.as_deref() else {
        return Some(start + Duration::hours(1));
    };
    let end = parse_date(&window.date)?.and_time(parse_time(end_str)?);
    if end <= start {
        // Degenerate stored window; keep the default length.
        return Some(start + Duration::hours(1));
    }
    Some(end)
}

// ── Date/time parsing ──

/// Parse `YYYY-MM-DD`.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Parse `HH:MM`, tolerating a seconds component.
pub fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    /// Reference instant used across the scenarios: a Tuesday morning.
    fn reference_now() -> NaiveDateTime {
        at("2025-06-10 10:00:00")
    }

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn day(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    fn window(date: &str, start: &str, end: Option<&str>) -> SessionWindow {
        SessionWindow {
            date: date.into(),
            start_time: start.into(),
            end_time: end.map(Into::into),
        }
    }

    /// The session from the reference scenarios: 2025-06-12, 10:00–11:00.
    fn reference_session() -> SessionWindow {
        window("2025-06-12", "10:00", Some("11:00"))
    }

    // ── booking_verdict ──

    #[test]
    fn test_yesterday_not_bookable() {
        assert_eq!(
            booking_verdict(day("2025-06-09"), reference_now()),
            BookingVerdict::NotBookable(NotBookableReason::Past)
        );
    }

    #[test]
    fn test_distant_past_not_bookable() {
        assert_eq!(
            booking_verdict(day("2024-01-01"), reference_now()),
            BookingVerdict::NotBookable(NotBookableReason::Past)
        );
    }

    #[test]
    fn test_today_not_bookable() {
        assert_eq!(
            booking_verdict(day("2025-06-10"), reference_now()),
            BookingVerdict::NotBookable(NotBookableReason::Today)
        );
    }

    #[test]
    fn test_tomorrow_before_cutoff_bookable() {
        assert!(booking_verdict(day("2025-06-11"), reference_now()).is_bookable());
    }

    #[test]
    fn test_tomorrow_after_cutoff_not_bookable() {
        assert_eq!(
            booking_verdict(day("2025-06-11"), at("2025-06-10 19:00:00")),
            BookingVerdict::NotBookable(NotBookableReason::TomorrowAfterCutoff)
        );
    }

    #[test]
    fn test_tomorrow_exactly_at_cutoff_not_bookable() {
        // The cutoff is an exclusive upper bound: 18:00:00 is already closed.
        assert_eq!(
            booking_verdict(day("2025-06-11"), at("2025-06-10 18:00:00")),
            BookingVerdict::NotBookable(NotBookableReason::TomorrowAfterCutoff)
        );
    }

    #[test]
    fn test_tomorrow_one_second_before_cutoff_bookable() {
        assert!(booking_verdict(day("2025-06-11"), at("2025-06-10 17:59:59")).is_bookable());
    }

    #[test]
    fn test_day_after_tomorrow_bookable_even_late() {
        assert!(booking_verdict(day("2025-06-12"), at("2025-06-10 23:30:00")).is_bookable());
    }

    #[test]
    fn test_far_future_bookable() {
        assert!(booking_verdict(day("2025-12-24"), reference_now()).is_bookable());
    }

    #[test]
    fn test_verdict_reason_accessor() {
        assert_eq!(
            booking_verdict(day("2025-06-10"), reference_now()).reason(),
            Some(NotBookableReason::Today)
        );
        assert_eq!(
            booking_verdict(day("2025-06-20"), reference_now()).reason(),
            None
        );
    }

    #[test]
    fn test_verdict_is_idempotent() {
        let first = booking_verdict(day("2025-06-11"), reference_now());
        let second = booking_verdict(day("2025-06-11"), reference_now());
        assert_eq!(first, second);
    }

    // ── booking_verdict_str ──

    #[test]
    fn test_verdict_str_parses_valid_date() {
        assert!(booking_verdict_str("2025-06-13", reference_now()).is_bookable());
    }

    #[test]
    fn test_verdict_str_malformed_fails_closed() {
        assert_eq!(
            booking_verdict_str("not-a-date", reference_now()),
            BookingVerdict::NotBookable(NotBookableReason::InvalidDate)
        );
    }

    #[test]
    fn test_verdict_str_wrong_order_fails_closed() {
        assert_eq!(
            booking_verdict_str("10-06-2025", reference_now()),
            BookingVerdict::NotBookable(NotBookableReason::InvalidDate)
        );
    }

    #[test]
    fn test_reason_key_serialization() {
        let json = serde_json::to_string(&NotBookableReason::TomorrowAfterCutoff).unwrap();
        assert_eq!(json, "\"tomorrow-after-cutoff\"");
        let json = serde_json::to_string(&NotBookableReason::Past).unwrap();
        assert_eq!(json, "\"past\"");
    }

    // ── earliest_bookable_date ──

    #[test]
    fn test_earliest_is_tomorrow_before_cutoff() {
        assert_eq!(earliest_bookable_date(reference_now()), day("2025-06-11"));
    }

    #[test]
    fn test_earliest_moves_out_after_cutoff() {
        assert_eq!(
            earliest_bookable_date(at("2025-06-10 19:00:00")),
            day("2025-06-12")
        );
    }

    #[test]
    fn test_earliest_moves_out_exactly_at_cutoff() {
        assert_eq!(
            earliest_bookable_date(at("2025-06-10 18:00:00")),
            day("2025-06-12")
        );
    }

    #[test]
    fn test_earliest_is_always_bookable() {
        for now in [
            reference_now(),
            at("2025-06-10 17:59:59"),
            at("2025-06-10 18:00:00"),
            at("2025-06-10 23:59:59"),
            at("2025-12-31 20:00:00"),
        ] {
            assert!(booking_verdict(earliest_bookable_date(now), now).is_bookable());
        }
    }

    // ── cancellation_state: reference scenarios ──

    #[test]
    fn test_two_days_out_can_cancel() {
        let state = cancellation_state(&reference_session(), reference_now());
        assert_eq!(
            state,
            CancellationState::CanCancel {
                deadline: at("2025-06-11 10:00:00"),
                hours_left: 24,
            }
        );
    }

    #[test]
    fn test_past_deadline_locked() {
        let state = cancellation_state(&reference_session(), at("2025-06-11 15:00:00"));
        assert_eq!(state, CancellationState::Locked24h);
    }

    #[test]
    fn test_during_session_in_progress() {
        let state = cancellation_state(&reference_session(), at("2025-06-12 10:30:00"));
        assert_eq!(state, CancellationState::InProgress);
    }

    #[test]
    fn test_after_end_past() {
        let state = cancellation_state(&reference_session(), at("2025-06-12 12:00:00"));
        assert_eq!(state, CancellationState::Past);
    }

    // ── cancellation_state: boundaries ──

    #[test]
    fn test_exactly_at_deadline_locked() {
        let state = cancellation_state(&reference_session(), at("2025-06-11 10:00:00"));
        assert_eq!(state, CancellationState::Locked24h);
    }

    #[test]
    fn test_one_second_before_deadline_can_cancel() {
        let state = cancellation_state(&reference_session(), at("2025-06-11 09:59:59"));
        assert!(state.allows_cancellation());
    }

    #[test]
    fn test_exactly_at_start_in_progress() {
        let state = cancellation_state(&reference_session(), at("2025-06-12 10:00:00"));
        assert_eq!(state, CancellationState::InProgress);
    }

    #[test]
    fn test_exactly_at_end_past() {
        let state = cancellation_state(&reference_session(), at("2025-06-12 11:00:00"));
        assert_eq!(state, CancellationState::Past);
    }

    #[test]
    fn test_exactly_one_state_across_timeline() {
        // Walk the whole timeline and check the states come out in order
        // with no overlap or gap.
        let session = reference_session();
        let expected = [
            ("2025-06-01 00:00:00", "can-cancel"),
            ("2025-06-11 09:59:59", "can-cancel"),
            ("2025-06-11 10:00:00", "locked-24h"),
            ("2025-06-12 09:59:59", "locked-24h"),
            ("2025-06-12 10:00:00", "in-progress"),
            ("2025-06-12 10:59:59", "in-progress"),
            ("2025-06-12 11:00:00", "past"),
            ("2025-07-01 00:00:00", "past"),
        ];
        for (instant, key) in expected {
            assert_eq!(
                cancellation_state(&session, at(instant)).key(),
                key,
                "wrong state at {instant}"
            );
        }
    }

    // ── cancellation_state: defaults and leniency ──

    #[test]
    fn test_missing_end_defaults_to_one_hour() {
        let session = window("2025-06-12", "10:00", None);
        assert_eq!(
            cancellation_state(&session, at("2025-06-12 10:59:59")),
            CancellationState::InProgress
        );
        assert_eq!(
            cancellation_state(&session, at("2025-06-12 11:00:00")),
            CancellationState::Past
        );
    }

    #[test]
    fn test_times_with_seconds_accepted() {
        let session = window("2025-06-12", "10:00:00", Some("11:30:00"));
        assert_eq!(
            cancellation_state(&session, at("2025-06-12 11:15:00")),
            CancellationState::InProgress
        );
    }

    #[test]
    fn test_sub_hour_remaining_floors_to_zero() {
        let state = cancellation_state(&reference_session(), at("2025-06-11 09:30:00"));
        match state {
            CancellationState::CanCancel { hours_left, .. } => assert_eq!(hours_left, 0),
            other => panic!("expected can-cancel, got {other:?}"),
        }
    }

    #[test]
    fn test_remaining_hours_floor() {
        // 25.5h ahead of the deadline → 25 full hours.
        let state = cancellation_state(&reference_session(), at("2025-06-10 08:30:00"));
        match state {
            CancellationState::CanCancel { hours_left, .. } => assert_eq!(hours_left, 25),
            other => panic!("expected can-cancel, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_date_fails_closed_to_past() {
        let session = window("12/06/2025", "10:00", Some("11:00"));
        assert_eq!(
            cancellation_state(&session, reference_now()),
            CancellationState::Past
        );
    }

    #[test]
    fn test_malformed_start_fails_closed_to_past() {
        let session = window("2025-06-12", "ten o'clock", Some("11:00"));
        assert_eq!(
            cancellation_state(&session, reference_now()),
            CancellationState::Past
        );
    }

    #[test]
    fn test_malformed_end_fails_closed_to_past() {
        let session = window("2025-06-12", "10:00", Some("eleven"));
        assert_eq!(
            cancellation_state(&session, reference_now()),
            CancellationState::Past
        );
    }

    #[test]
    fn test_end_before_start_keeps_default_length() {
        let session = window("2025-06-12", "10:00", Some("09:00"));
        assert_eq!(
            cancellation_state(&session, at("2025-06-12 10:30:00")),
            CancellationState::InProgress
        );
        assert_eq!(
            cancellation_state(&session, at("2025-06-12 11:00:00")),
            CancellationState::Past
        );
    }

    // ── notices ──

    #[test]
    fn test_can_cancel_notice_carries_deadline() {
        let notice = cancellation_state(&reference_session(), reference_now())
            .notice()
            .unwrap();
        assert_eq!(notice.message, "Cancel by 11 Jun 2025, 10:00 (24h left)");
        assert!(notice.description.contains("2025-06-11 10:00"));
        assert!(notice.description.contains("24 hours"));
    }

    #[test]
    fn test_locked_notice_fixed_copy() {
        let notice = CancellationState::Locked24h.notice().unwrap();
        assert_eq!(notice.message, "Cannot cancel (within 24h)");
    }

    #[test]
    fn test_in_progress_notice_fixed_copy() {
        let notice = CancellationState::InProgress.notice().unwrap();
        assert_eq!(notice.message, "In progress");
    }

    #[test]
    fn test_past_renders_nothing() {
        assert!(CancellationState::Past.notice().is_none());
    }

    // ── parse_time ──

    #[test]
    fn test_parse_time_short_form() {
        assert_eq!(parse_time("09:30"), NaiveTime::from_hms_opt(9, 30, 0));
    }

    #[test]
    fn test_parse_time_with_seconds() {
        assert_eq!(parse_time("09:30:15"), NaiveTime::from_hms_opt(9, 30, 15));
    }

    #[test]
    fn test_parse_time_garbage() {
        assert_eq!(parse_time("half nine"), None);
        assert_eq!(parse_time(""), None);
    }

    #[test]
    fn test_parse_date_rejects_impossible_day() {
        assert_eq!(parse_date("2025-02-30"), None);
    }
}
