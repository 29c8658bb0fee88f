use serde::{Deserialize, Serialize};

use crate::policy::{CancellationState, NotBookableReason};

// ── Database models ──

/// A bookable activity programme (football, gymnastics, mentoring...).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Programme {
    pub id: i64,
    pub name: String,
    pub description: String,
    /// Price per session, in pence.
    pub price: i64,
    pub duration_min: i64,
    pub min_age: i64,
    pub max_age: i64,
    pub is_active: bool,
    pub sort_order: i64,
}

/// A scheduled class: one programme running on a date with limited places.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub id: i64,
    pub programme_id: i64,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub capacity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Booking {
    pub id: i64,
    pub reference: String,
    pub session_id: i64,
    pub parent_name: String,
    pub parent_email: String,
    pub child_name: String,
    pub status: String,
    pub created_at: String,
    pub cancelled_at: Option<String>,
}

// ── API request/query types ──

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub session_id: i64,
    pub parent_name: String,
    pub parent_email: String,
    pub child_name: String,
}

#[derive(Debug, Deserialize)]
pub struct AvailableDatesQuery {
    pub programme_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AvailableTimesQuery {
    pub date: String,
    pub programme_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub year: i32,
    pub month: u32,
    pub programme_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SessionsQuery {
    pub date: String,
}

#[derive(Debug, Deserialize)]
pub struct BookingsQuery {
    pub date: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateProgrammeRequest {
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub duration_min: i64,
    pub min_age: Option<i64>,
    pub max_age: Option<i64>,
    pub sort_order: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProgrammeRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub duration_min: Option<i64>,
    pub min_age: Option<i64>,
    pub max_age: Option<i64>,
    pub is_active: Option<bool>,
    pub sort_order: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionsRequest {
    pub programme_id: i64,
    pub date: String,
    pub sessions: Vec<SessionTime>,
}

#[derive(Debug, Deserialize)]
pub struct SessionTime {
    pub start_time: String,
    pub end_time: String,
    pub capacity: Option<i64>,
}

// ── API response types ──

/// A date's verdict as exposed to the frontend: a flag plus the reason key
/// the frontend maps to display copy.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DateVerdict {
    pub bookable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<NotBookableReason>,
}

impl DateVerdict {
    pub fn from_policy(verdict: crate::policy::BookingVerdict) -> Self {
        Self {
            bookable: verdict.is_bookable(),
            reason: verdict.reason(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AvailableDatesResponse {
    /// First date currently accepting bookings, per the cutoff rules.
    pub earliest_bookable: String,
    pub dates: Vec<String>,
}

/// One free session offered for a date.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct SessionSlot {
    pub id: i64,
    pub programme_id: i64,
    pub programme_name: String,
    pub start_time: String,
    pub end_time: String,
    pub capacity: i64,
    pub places_left: i64,
}

#[derive(Debug, Serialize)]
pub struct AvailableTimesResponse {
    pub verdict: DateVerdict,
    /// Empty whenever the date itself is not bookable.
    pub times: Vec<SessionSlot>,
}

#[derive(Debug, Serialize)]
pub struct CalendarDay {
    pub date: String,
    pub total_sessions: i64,
    pub free_places: i64,
    pub bookable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<NotBookableReason>,
}

/// Cancellation block embedded in a booking detail. Absent entirely once
/// the session is in the past.
#[derive(Debug, Clone, Serialize)]
pub struct CancellationInfo {
    pub state: &'static str,
    pub can_cancel: bool,
    pub message: String,
    pub description: String,
}

impl CancellationInfo {
    /// Build the embeddable block, or `None` when nothing should render.
    pub fn from_state(state: &CancellationState) -> Option<Self> {
        let notice = state.notice()?;
        Some(Self {
            state: state.key(),
            can_cancel: state.allows_cancellation(),
            message: notice.message,
            description: notice.description,
        })
    }
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct BookingDetail {
    pub id: i64,
    pub reference: String,
    pub programme_name: String,
    pub price: i64,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub parent_name: String,
    pub parent_email: String,
    pub child_name: String,
    pub status: String,
    pub created_at: String,
    #[sqlx(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation: Option<CancellationInfo>,
}

// ── Response envelope ──

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
