use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Datelike, NaiveDate};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::{models::*, policy, AppState};

// ── Shared booking query (used by admin.rs too) ──

const BOOKING_DETAIL_SELECT: &str =
    "SELECT b.id, b.reference, p.name AS programme_name, p.price,
            s.date, s.start_time, s.end_time,
            b.parent_name, b.parent_email, b.child_name,
            b.status, b.created_at
     FROM bookings b
     JOIN sessions s ON s.id = b.session_id
     JOIN programmes p ON p.id = s.programme_id";

pub fn booking_detail_select() -> &'static str {
    BOOKING_DETAIL_SELECT
}

// ── Endpoints ──

/// GET /api/programmes — list the active activity catalogue.
pub async fn list_programmes(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<Programme>>>, StatusCode> {
    let programmes = sqlx::query_as::<_, Programme>(
        "SELECT id, name, description, price, duration_min, min_age, max_age, is_active, sort_order
         FROM programmes WHERE is_active = 1 ORDER BY sort_order ASC",
    )
    .fetch_all(&state.db)
    .await
    .map_err(|e| {
        tracing::error!("list_programmes: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(ApiResponse::success(programmes)))
}

/// GET /api/availability/dates?programme_id=N — dates that still have a free
/// place AND pass the booking cutoff rules.
pub async fn available_dates(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AvailableDatesQuery>,
) -> Result<Json<ApiResponse<AvailableDatesResponse>>, StatusCode> {
    let now = state.clock.now();

    let dates: Vec<String> = sqlx::query_scalar(
        "SELECT DISTINCT s.date FROM sessions s
         JOIN programmes p ON p.id = s.programme_id
         WHERE p.is_active = 1
           AND (? IS NULL OR s.programme_id = ?)
           AND (SELECT COUNT(*) FROM bookings b
                WHERE b.session_id = s.id AND b.status = 'confirmed') < s.capacity
         ORDER BY s.date ASC",
    )
    .bind(query.programme_id)
    .bind(query.programme_id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| {
        tracing::error!("available_dates: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let dates = dates
        .into_iter()
        .filter(|date| policy::booking_verdict_str(date, now).is_bookable())
        .collect();

    Ok(Json(ApiResponse::success(AvailableDatesResponse {
        earliest_bookable: policy::earliest_bookable_date(now)
            .format("%Y-%m-%d")
            .to_string(),
        dates,
    })))
}

/// GET /api/availability/times?date=YYYY-MM-DD&programme_id=N — free sessions
/// for a date, together with the date's own verdict.
pub async fn available_times(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AvailableTimesQuery>,
) -> Result<Json<ApiResponse<AvailableTimesResponse>>, StatusCode> {
    let now = state.clock.now();
    let verdict = policy::booking_verdict_str(&query.date, now);

    // A closed date offers no times, whatever the schedule holds.
    if !verdict.is_bookable() {
        return Ok(Json(ApiResponse::success(AvailableTimesResponse {
            verdict: DateVerdict::from_policy(verdict),
            times: vec![],
        })));
    }

    let slots = sqlx::query_as::<_, SessionSlot>(
        "SELECT s.id, s.programme_id, p.name AS programme_name,
                s.start_time, s.end_time, s.capacity,
                s.capacity - (SELECT COUNT(*) FROM bookings b
                              WHERE b.session_id = s.id AND b.status = 'confirmed') AS places_left
         FROM sessions s
         JOIN programmes p ON p.id = s.programme_id
         WHERE s.date = ? AND p.is_active = 1
           AND (? IS NULL OR s.programme_id = ?)
         ORDER BY s.start_time ASC",
    )
    .bind(&query.date)
    .bind(query.programme_id)
    .bind(query.programme_id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| {
        tracing::error!("available_times: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let times = slots.into_iter().filter(|s| s.places_left > 0).collect();

    Ok(Json(ApiResponse::success(AvailableTimesResponse {
        verdict: DateVerdict::from_policy(verdict),
        times,
    })))
}

/// GET /api/calendar?year=2026&month=2&programme_id=1 — per-day totals for
/// the booking calendar.
///
/// Fetches ALL sessions for the month in a single query (no N+1).
pub async fn calendar(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<ApiResponse<Vec<CalendarDay>>>, StatusCode> {
    let now = state.clock.now();

    let Some((month_start, month_end, days_in_month)) = month_bounds(query.year, query.month)
    else {
        return Err(StatusCode::BAD_REQUEST);
    };

    let sessions: Vec<(String, i64, i64)> = sqlx::query_as(
        "SELECT s.date, s.capacity,
                (SELECT COUNT(*) FROM bookings b
                 WHERE b.session_id = s.id AND b.status = 'confirmed') AS booked
         FROM sessions s
         JOIN programmes p ON p.id = s.programme_id
         WHERE s.date >= ? AND s.date <= ? AND p.is_active = 1
           AND (? IS NULL OR s.programme_id = ?)",
    )
    .bind(&month_start)
    .bind(&month_end)
    .bind(query.programme_id)
    .bind(query.programme_id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| {
        tracing::error!("calendar: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    // Group by date
    let mut by_date: HashMap<String, (i64, i64)> = HashMap::new();
    for (date, capacity, booked) in sessions {
        let entry = by_date.entry(date).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += (capacity - booked).max(0);
    }

    let mut calendar_days = Vec::with_capacity(days_in_month as usize);
    for day in 1..=days_in_month {
        let date = NaiveDate::from_ymd_opt(query.year, query.month, day)
            .ok_or(StatusCode::BAD_REQUEST)?;
        let verdict = policy::booking_verdict(date, now);
        let (total_sessions, free_places) =
            by_date.get(&date.format("%Y-%m-%d").to_string()).copied().unwrap_or((0, 0));

        calendar_days.push(CalendarDay {
            date: date.format("%Y-%m-%d").to_string(),
            total_sessions,
            free_places,
            bookable: verdict.is_bookable() && free_places > 0,
            reason: verdict.reason(),
        });
    }

    Ok(Json(ApiResponse::success(calendar_days)))
}

/// POST /api/bookings — book a place on a session.
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateBookingRequest>,
) -> Result<Json<ApiResponse<BookingDetail>>, (StatusCode, Json<ApiResponse<()>>)> {
    let now = state.clock.now();

    if body.parent_name.trim().is_empty() || body.child_name.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Parent and child names are required")),
        ));
    }
    if !valid_email(&body.parent_email) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Invalid email address")),
        ));
    }

    let session = sqlx::query_as::<_, Session>(
        "SELECT s.id, s.programme_id, s.date, s.start_time, s.end_time, s.capacity
         FROM sessions s
         JOIN programmes p ON p.id = s.programme_id
         WHERE s.id = ? AND p.is_active = 1",
    )
    .bind(body.session_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| {
        tracing::error!("create_booking session lookup: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("DB error")),
        )
    })?
    .ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error("Session not found")),
        )
    })?;

    // The cutoff rules gate every new booking; the frontend maps the reason
    // key to display copy.
    let verdict = policy::booking_verdict_str(&session.date, now);
    if let Some(reason) = verdict.reason() {
        return Err((
            StatusCode::CONFLICT,
            Json(ApiResponse::error(format!("date-not-bookable:{}", reason.key()))),
        ));
    }

    let reference = Uuid::new_v4().to_string();
    let created_at = now.format("%Y-%m-%d %H:%M:%S").to_string();

    // Conditional insert so two racing requests cannot oversubscribe the
    // session.
    let inserted = sqlx::query(
        "INSERT INTO bookings (reference, session_id, parent_name, parent_email,
                               child_name, status, created_at)
         SELECT ?, ?, ?, ?, ?, 'confirmed', ?
         WHERE (SELECT COUNT(*) FROM bookings
                WHERE session_id = ? AND status = 'confirmed') < ?",
    )
    .bind(&reference)
    .bind(session.id)
    .bind(body.parent_name.trim())
    .bind(body.parent_email.trim())
    .bind(body.child_name.trim())
    .bind(&created_at)
    .bind(session.id)
    .bind(session.capacity)
    .execute(&state.db)
    .await
    .map_err(|e| {
        tracing::error!("create_booking INSERT failed: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("DB error")),
        )
    })?
    .rows_affected();

    if inserted == 0 {
        return Err((
            StatusCode::CONFLICT,
            Json(ApiResponse::error("Session is fully booked")),
        ));
    }

    let mut detail = fetch_booking_by_reference(&state, &reference)
        .await
        .map_err(|e| {
            tracing::error!("create_booking readback: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("DB error")),
            )
        })?
        .ok_or_else(|| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("DB error")),
            )
        })?;
    attach_cancellation(&mut detail, now);

    notify_staff(
        &state.webhook_url,
        "booking-created",
        &format!(
            "New booking: {} ({}) on {} at {}",
            detail.child_name, detail.programme_name, detail.date, detail.start_time
        ),
    )
    .await;

    Ok(Json(ApiResponse::success(detail)))
}

/// GET /api/bookings/{reference} — booking detail with its cancellation
/// state embedded (nothing embedded once the session is past).
pub async fn booking_by_reference(
    State(state): State<Arc<AppState>>,
    Path(reference): Path<String>,
) -> Result<Json<ApiResponse<BookingDetail>>, (StatusCode, Json<ApiResponse<()>>)> {
    let now = state.clock.now();

    let mut detail = fetch_booking_by_reference(&state, &reference)
        .await
        .map_err(|e| {
            tracing::error!("booking_by_reference: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("DB error")),
            )
        })?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ApiResponse::error("Booking not found")),
            )
        })?;
    attach_cancellation(&mut detail, now);

    Ok(Json(ApiResponse::success(detail)))
}

/// DELETE /api/bookings/{reference} — cancel a booking, subject to the
/// 24-hour deadline.
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Path(reference): Path<String>,
) -> Result<Json<ApiResponse<&'static str>>, (StatusCode, Json<ApiResponse<()>>)> {
    let now = state.clock.now();

    let detail = fetch_booking_by_reference(&state, &reference)
        .await
        .map_err(|e| {
            tracing::error!("cancel_booking lookup: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("DB error")),
            )
        })?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ApiResponse::error("Booking not found")),
            )
        })?;

    if detail.status != "confirmed" {
        return Err((
            StatusCode::CONFLICT,
            Json(ApiResponse::error("Booking is already cancelled")),
        ));
    }

    let cancel_state = policy::cancellation_state(&booking_window(&detail), now);
    if !cancel_state.allows_cancellation() {
        let message = cancel_state
            .notice()
            .map(|n| n.message)
            .unwrap_or_else(|| "Session has already taken place".into());
        return Err((StatusCode::CONFLICT, Json(ApiResponse::error(message))));
    }

    let cancelled_at = now.format("%Y-%m-%d %H:%M:%S").to_string();
    if let Err(e) = sqlx::query(
        "UPDATE bookings SET status = 'cancelled', cancelled_at = ? WHERE reference = ?",
    )
    .bind(&cancelled_at)
    .bind(&reference)
    .execute(&state.db)
    .await
    {
        tracing::error!("cancel_booking {}: {}", reference, e);
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("DB error")),
        ));
    }

    notify_staff(
        &state.webhook_url,
        "booking-cancelled",
        &format!(
            "Cancelled: {} ({}) on {} at {}",
            detail.child_name, detail.programme_name, detail.date, detail.start_time
        ),
    )
    .await;

    Ok(Json(ApiResponse::success("Booking cancelled")))
}

// ── Shared helpers (pub for admin.rs) ──

/// Post a notification event to the staff webhook, if one is configured.
pub async fn notify_staff(webhook_url: &str, event: &str, text: &str) {
    if webhook_url.is_empty() {
        return;
    }
    let client = reqwest::Client::new();
    if let Err(e) = client
        .post(webhook_url)
        .json(&serde_json::json!({ "event": event, "text": text }))
        .send()
        .await
    {
        tracing::error!("Failed to deliver staff notification: {}", e);
    }
}

pub async fn fetch_booking_by_reference(
    state: &AppState,
    reference: &str,
) -> Result<Option<BookingDetail>, sqlx::Error> {
    let query = format!("{} WHERE b.reference = ?", BOOKING_DETAIL_SELECT);
    sqlx::query_as::<_, BookingDetail>(&query)
        .bind(reference)
        .fetch_optional(&state.db)
        .await
}

// ── Private helpers ──

/// The session interval a booking occupies, for the cancellation rules.
fn booking_window(detail: &BookingDetail) -> policy::SessionWindow {
    policy::SessionWindow {
        date: detail.date.clone(),
        start_time: detail.start_time.clone(),
        end_time: Some(detail.end_time.clone()),
    }
}

/// Embed the cancellation block on confirmed bookings. Cancelled ones keep
/// nothing to act on.
fn attach_cancellation(detail: &mut BookingDetail, now: chrono::NaiveDateTime) {
    if detail.status == "confirmed" {
        let state = policy::cancellation_state(&booking_window(detail), now);
        detail.cancellation = CancellationInfo::from_state(&state);
    }
}

/// First/last day of a month as `YYYY-MM-DD` strings plus the day count.
fn month_bounds(year: i32, month: u32) -> Option<(String, String, u32)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let last = next_month.pred_opt()?;
    Some((
        first.format("%Y-%m-%d").to_string(),
        last.format("%Y-%m-%d").to_string(),
        last.day(),
    ))
}

/// Light sanity check; real validation is the mail provider's problem.
fn valid_email(email: &str) -> bool {
    if email.contains(' ') || email.matches('@').count() != 1 {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn make_detail(date: &str, start: &str, end: &str, status: &str) -> BookingDetail {
        BookingDetail {
            id: 1,
            reference: "11111111-2222-3333-4444-555555555555".into(),
            programme_name: "Mini Kickers".into(),
            price: 1200,
            date: date.into(),
            start_time: start.into(),
            end_time: end.into(),
            parent_name: "Sam Taylor".into(),
            parent_email: "sam@example.com".into(),
            child_name: "Alex".into(),
            status: status.into(),
            created_at: "2025-06-01 09:00:00".into(),
            cancellation: None,
        }
    }

    // ── month_bounds ──

    #[test]
    fn test_month_bounds_regular() {
        let (start, end, days) = month_bounds(2026, 3).unwrap();
        assert_eq!(start, "2026-03-01");
        assert_eq!(end, "2026-03-31");
        assert_eq!(days, 31);
    }

    #[test]
    fn test_month_bounds_february_leap() {
        let (_, end, days) = month_bounds(2024, 2).unwrap();
        assert_eq!(end, "2024-02-29");
        assert_eq!(days, 29);
    }

    #[test]
    fn test_month_bounds_february_non_leap() {
        let (_, end, days) = month_bounds(2025, 2).unwrap();
        assert_eq!(end, "2025-02-28");
        assert_eq!(days, 28);
    }

    #[test]
    fn test_month_bounds_december_rolls_year() {
        let (start, end, days) = month_bounds(2025, 12).unwrap();
        assert_eq!(start, "2025-12-01");
        assert_eq!(end, "2025-12-31");
        assert_eq!(days, 31);
    }

    #[test]
    fn test_month_bounds_invalid_month() {
        assert!(month_bounds(2025, 13).is_none());
        assert!(month_bounds(2025, 0).is_none());
    }

    // ── valid_email ──

    #[test]
    fn test_valid_email_accepts_plain() {
        assert!(valid_email("parent@example.com"));
    }

    #[test]
    fn test_valid_email_rejects_missing_at() {
        assert!(!valid_email("parent.example.com"));
    }

    #[test]
    fn test_valid_email_rejects_double_at() {
        assert!(!valid_email("a@b@example.com"));
    }

    #[test]
    fn test_valid_email_rejects_empty_local() {
        assert!(!valid_email("@example.com"));
    }

    #[test]
    fn test_valid_email_rejects_bare_domain() {
        assert!(!valid_email("parent@example"));
    }

    #[test]
    fn test_valid_email_rejects_spaces() {
        assert!(!valid_email("parent name@example.com"));
    }

    #[test]
    fn test_valid_email_rejects_dot_edges() {
        assert!(!valid_email("parent@.com"));
        assert!(!valid_email("parent@example.com."));
    }

    // ── attach_cancellation ──

    #[test]
    fn test_attach_cancellation_confirmed_upcoming() {
        let mut detail = make_detail("2025-06-12", "10:00", "11:00", "confirmed");
        attach_cancellation(&mut detail, at("2025-06-10 10:00:00"));
        let info = detail.cancellation.expect("cancellation block");
        assert_eq!(info.state, "can-cancel");
        assert!(info.can_cancel);
    }

    #[test]
    fn test_attach_cancellation_confirmed_locked() {
        let mut detail = make_detail("2025-06-12", "10:00", "11:00", "confirmed");
        attach_cancellation(&mut detail, at("2025-06-11 15:00:00"));
        let info = detail.cancellation.expect("cancellation block");
        assert_eq!(info.state, "locked-24h");
        assert!(!info.can_cancel);
    }

    #[test]
    fn test_attach_cancellation_past_session_renders_nothing() {
        let mut detail = make_detail("2025-06-12", "10:00", "11:00", "confirmed");
        attach_cancellation(&mut detail, at("2025-06-12 12:00:00"));
        assert!(detail.cancellation.is_none());
    }

    #[test]
    fn test_attach_cancellation_skips_cancelled_bookings() {
        let mut detail = make_detail("2025-06-12", "10:00", "11:00", "cancelled");
        attach_cancellation(&mut detail, at("2025-06-10 10:00:00"));
        assert!(detail.cancellation.is_none());
    }

    // ── booking_window ──

    #[test]
    fn test_booking_window_carries_times() {
        let detail = make_detail("2025-06-12", "10:00", "11:30", "confirmed");
        let window = booking_window(&detail);
        assert_eq!(window.date, "2025-06-12");
        assert_eq!(window.start_time, "10:00");
        assert_eq!(window.end_time.as_deref(), Some("11:30"));
    }
}
