use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::{
    handlers::client::{booking_detail_select, notify_staff},
    models::*,
    policy, AppState,
};

/// Default places on a session when the scheduler does not say otherwise.
const DEFAULT_CAPACITY: i64 = 10;

// ── Programme management ──

/// GET /api/admin/programmes — list ALL programmes (including inactive).
pub async fn list_all_programmes(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<Programme>>>, (StatusCode, Json<ApiResponse<()>>)> {
    let programmes = sqlx::query_as::<_, Programme>(
        "SELECT id, name, description, price, duration_min, min_age, max_age, is_active, sort_order
         FROM programmes ORDER BY sort_order ASC",
    )
    .fetch_all(&state.db)
    .await
    .map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("DB error")),
        )
    })?;

    Ok(Json(ApiResponse::success(programmes)))
}

/// POST /api/admin/programmes — add a programme to the catalogue.
pub async fn create_programme(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateProgrammeRequest>,
) -> Result<Json<ApiResponse<Programme>>, (StatusCode, Json<ApiResponse<()>>)> {
    if body.name.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Programme name is required")),
        ));
    }

    let id = sqlx::query(
        "INSERT INTO programmes (name, description, price, duration_min, min_age, max_age, sort_order)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(body.name.trim())
    .bind(body.description.as_deref().unwrap_or(""))
    .bind(body.price)
    .bind(body.duration_min)
    .bind(body.min_age.unwrap_or(4))
    .bind(body.max_age.unwrap_or(11))
    .bind(body.sort_order.unwrap_or(0))
    .execute(&state.db)
    .await
    .map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("DB error")),
        )
    })?
    .last_insert_rowid();

    let programme = fetch_programme(&state, id).await?;
    Ok(Json(ApiResponse::success(programme)))
}

/// PUT /api/admin/programmes/{id} — update a programme.
pub async fn update_programme(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateProgrammeRequest>,
) -> Result<Json<ApiResponse<Programme>>, (StatusCode, Json<ApiResponse<()>>)> {
    if let Some(name) = &body.name {
        sqlx::query("UPDATE programmes SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id)
            .execute(&state.db)
            .await
            .ok();
    }
    if let Some(desc) = &body.description {
        sqlx::query("UPDATE programmes SET description = ? WHERE id = ?")
            .bind(desc)
            .bind(id)
            .execute(&state.db)
            .await
            .ok();
    }
    if let Some(price) = body.price {
        sqlx::query("UPDATE programmes SET price = ? WHERE id = ?")
            .bind(price)
            .bind(id)
            .execute(&state.db)
            .await
            .ok();
    }
    if let Some(dur) = body.duration_min {
        sqlx::query("UPDATE programmes SET duration_min = ? WHERE id = ?")
            .bind(dur)
            .bind(id)
            .execute(&state.db)
            .await
            .ok();
    }
    if let Some(min_age) = body.min_age {
        sqlx::query("UPDATE programmes SET min_age = ? WHERE id = ?")
            .bind(min_age)
            .bind(id)
            .execute(&state.db)
            .await
            .ok();
    }
    if let Some(max_age) = body.max_age {
        sqlx::query("UPDATE programmes SET max_age = ? WHERE id = ?")
            .bind(max_age)
            .bind(id)
            .execute(&state.db)
            .await
            .ok();
    }
    if let Some(active) = body.is_active {
        sqlx::query("UPDATE programmes SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(&state.db)
            .await
            .ok();
    }
    if let Some(order) = body.sort_order {
        sqlx::query("UPDATE programmes SET sort_order = ? WHERE id = ?")
            .bind(order)
            .bind(id)
            .execute(&state.db)
            .await
            .ok();
    }

    let programme = fetch_programme(&state, id).await?;
    Ok(Json(ApiResponse::success(programme)))
}

// ── Session scheduling ──

/// GET /api/admin/sessions?date=YYYY-MM-DD — the day's schedule, full
/// sessions included.
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionsQuery>,
) -> Result<Json<ApiResponse<Vec<SessionSlot>>>, (StatusCode, Json<ApiResponse<()>>)> {
    let slots = fetch_day_sessions(&state, &query.date).await?;
    Ok(Json(ApiResponse::success(slots)))
}

/// POST /api/admin/sessions — schedule sessions for a date.
pub async fn create_sessions(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateSessionsRequest>,
) -> Result<Json<ApiResponse<Vec<SessionSlot>>>, (StatusCode, Json<ApiResponse<()>>)> {
    if policy::parse_date(&body.date).is_none() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Invalid date format")),
        ));
    }

    for session in &body.sessions {
        let (Some(start), Some(end)) = (
            policy::parse_time(&session.start_time),
            policy::parse_time(&session.end_time),
        ) else {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::error("Invalid time format")),
            ));
        };
        if end <= start {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::error("Session must end after it starts")),
            ));
        }
        if session.capacity.is_some_and(|c| c < 1) {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::error("Capacity must be at least 1")),
            ));
        }
    }

    for session in &body.sessions {
        sqlx::query(
            "INSERT INTO sessions (programme_id, date, start_time, end_time, capacity)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(body.programme_id)
        .bind(&body.date)
        .bind(&session.start_time)
        .bind(&session.end_time)
        .bind(session.capacity.unwrap_or(DEFAULT_CAPACITY))
        .execute(&state.db)
        .await
        .map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("DB error")),
            )
        })?;
    }

    let slots = fetch_day_sessions(&state, &body.date).await?;
    Ok(Json(ApiResponse::success(slots)))
}

/// DELETE /api/admin/sessions/{id} — remove a session that has no
/// confirmed bookings.
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<&'static str>>, (StatusCode, Json<ApiResponse<()>>)> {
    let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM sessions WHERE id = ?")
        .bind(id)
        .fetch_one(&state.db)
        .await
        .map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("DB error")),
            )
        })?;
    if !exists {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error("Session not found")),
        ));
    }

    let booked: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM bookings WHERE session_id = ? AND status = 'confirmed'",
    )
    .bind(id)
    .fetch_one(&state.db)
    .await
    .map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("DB error")),
        )
    })?;

    if booked > 0 {
        return Err((
            StatusCode::CONFLICT,
            Json(ApiResponse::error(
                "Session has confirmed bookings. Cancel them first.",
            )),
        ));
    }

    sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(id)
        .execute(&state.db)
        .await
        .ok();

    Ok(Json(ApiResponse::success("Session removed")))
}

// ── Bookings ──

/// GET /api/admin/bookings — schedule views: a single day, a range, or
/// everything upcoming.
pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<ApiResponse<Vec<BookingDetail>>>, (StatusCode, Json<ApiResponse<()>>)> {
    let base = booking_detail_select();

    let bookings = if let Some(date) = &query.date {
        let sql = format!(
            "{base} WHERE s.date = ? AND b.status = 'confirmed'
             ORDER BY s.start_time ASC"
        );
        sqlx::query_as::<_, BookingDetail>(&sql)
            .bind(date)
            .fetch_all(&state.db)
            .await
    } else if let (Some(from), Some(to)) = (&query.from, &query.to) {
        let sql = format!(
            "{base} WHERE s.date BETWEEN ? AND ? AND b.status = 'confirmed'
             ORDER BY s.date ASC, s.start_time ASC"
        );
        sqlx::query_as::<_, BookingDetail>(&sql)
            .bind(from)
            .bind(to)
            .fetch_all(&state.db)
            .await
    } else {
        let today = state.clock.now().date().format("%Y-%m-%d").to_string();
        let sql = format!(
            "{base} WHERE s.date >= ? AND b.status = 'confirmed'
             ORDER BY s.date ASC, s.start_time ASC"
        );
        sqlx::query_as::<_, BookingDetail>(&sql)
            .bind(&today)
            .fetch_all(&state.db)
            .await
    }
    .map_err(|e| {
        tracing::error!("list_bookings: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("DB error")),
        )
    })?;

    Ok(Json(ApiResponse::success(bookings)))
}

/// POST /api/admin/bookings/{id}/cancel — staff cancellation. The 24-hour
/// deadline does not apply here.
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<&'static str>>, (StatusCode, Json<ApiResponse<()>>)> {
    let sql = format!(
        "{} WHERE b.id = ? AND b.status = 'confirmed'",
        booking_detail_select()
    );
    let detail = sqlx::query_as::<_, BookingDetail>(&sql)
        .bind(id)
        .fetch_optional(&state.db)
        .await
        .map_err(|_| {
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

    let cancelled_at = state.clock.now().format("%Y-%m-%d %H:%M:%S").to_string();
    sqlx::query("UPDATE bookings SET status = 'cancelled', cancelled_at = ? WHERE id = ?")
        .bind(&cancelled_at)
        .bind(id)
        .execute(&state.db)
        .await
        .ok();

    notify_staff(
        &state.webhook_url,
        "booking-cancelled-by-staff",
        &format!(
            "Staff cancelled: {} ({}) on {} at {} — parent {} <{}>",
            detail.child_name,
            detail.programme_name,
            detail.date,
            detail.start_time,
            detail.parent_name,
            detail.parent_email
        ),
    )
    .await;

    Ok(Json(ApiResponse::success("Booking cancelled")))
}

// ── Private helpers ──

async fn fetch_programme(
    state: &AppState,
    id: i64,
) -> Result<Programme, (StatusCode, Json<ApiResponse<()>>)> {
    sqlx::query_as::<_, Programme>(
        "SELECT id, name, description, price, duration_min, min_age, max_age, is_active, sort_order
         FROM programmes WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&state.db)
    .await
    .map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("DB error")),
        )
    })?
    .ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error("Programme not found")),
        )
    })
}

async fn fetch_day_sessions(
    state: &AppState,
    date: &str,
) -> Result<Vec<SessionSlot>, (StatusCode, Json<ApiResponse<()>>)> {
    sqlx::query_as::<_, SessionSlot>(
        "SELECT s.id, s.programme_id, p.name AS programme_name,
                s.start_time, s.end_time, s.capacity,
                s.capacity - (SELECT COUNT(*) FROM bookings b
                              WHERE b.session_id = s.id AND b.status = 'confirmed') AS places_left
         FROM sessions s
         JOIN programmes p ON p.id = s.programme_id
         WHERE s.date = ?
         ORDER BY s.start_time ASC",
    )
    .bind(date)
    .fetch_all(&state.db)
    .await
    .map_err(|e| {
        tracing::error!("fetch_day_sessions: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("DB error")),
        )
    })
}
