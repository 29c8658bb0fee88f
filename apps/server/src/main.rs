mod clock;
mod db;
mod handlers;
mod models;
mod policy;
mod rate_limit;
mod webhook_layer;

use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use clock::{Clock, LondonClock};
use rate_limit::{rate_limit, RateLimiter, Tier};

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub webhook_url: String,
    pub started_at: Instant,
    pub clock: Arc<dyn Clock>,
}

/// Rate limit cleanup interval (seconds).
const RATE_LIMIT_CLEANUP_SECS: u64 = 300;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:brightsteps.db?mode=rwc".into());
    let webhook_url = std::env::var("STAFF_WEBHOOK_URL").unwrap_or_default();

    // ── Tracing: console + optional staff webhook error notifications ──
    let env_filter = EnvFilter::from_default_env().add_directive("info".parse()?);
    let fmt_layer = tracing_subscriber::fmt::layer();
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    if !webhook_url.is_empty() {
        let hook_layer = webhook_layer::WebhookLayer::new(webhook_url.clone());
        registry.with(hook_layer).init();
    } else {
        registry.init();
    }

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".into());
    let cors_origin = std::env::var("CORS_ORIGIN").unwrap_or_default();

    if webhook_url.is_empty() {
        tracing::warn!("STAFF_WEBHOOK_URL not set — staff notifications disabled");
    }

    // ── Database ──
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    db::run_migrations(&pool).await?;

    let state = Arc::new(AppState {
        db: pool,
        webhook_url,
        started_at: Instant::now(),
        clock: Arc::new(LondonClock),
    });

    // ── Rate limiter + background cleanup of stale entries ──
    let limiter = RateLimiter::new();
    let cleanup_limiter = limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(RATE_LIMIT_CLEANUP_SECS));
        loop {
            interval.tick().await;
            cleanup_limiter.cleanup();
        }
    });

    // ── CORS: whitelist CORS_ORIGIN when configured, otherwise allow any ──
    let cors = if !cors_origin.is_empty() {
        let origin = cors_origin
            .parse()
            .expect("CORS_ORIGIN must be a valid origin");
        CorsLayer::new()
            .allow_origin(AllowOrigin::exact(origin))
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // ── Router (tiered rate limits per group) ──

    // 1. No-limit: health checks
    let no_limit_routes = Router::new().route("/api/health", get(handlers::health::health));

    // 2. Public: read-only catalogue and availability (60 req/min)
    let public_routes = Router::new()
        .route("/api/programmes", get(handlers::client::list_programmes))
        .route(
            "/api/availability/dates",
            get(handlers::client::available_dates),
        )
        .route(
            "/api/availability/times",
            get(handlers::client::available_times),
        )
        .route("/api/calendar", get(handlers::client::calendar))
        .layer(from_fn_with_state(
            (limiter.clone(), Tier::Public),
            rate_limit,
        ));

    // 3. Booking creation: strictest limit (5 req/5min)
    let booking_routes = Router::new()
        .route("/api/bookings", post(handlers::client::create_booking))
        .layer(from_fn_with_state(
            (limiter.clone(), Tier::Booking),
            rate_limit,
        ));

    // 4. Reference-scoped lookup and cancellation (30 req/min)
    let lookup_routes = Router::new()
        .route(
            "/api/bookings/{reference}",
            get(handlers::client::booking_by_reference),
        )
        .route(
            "/api/bookings/{reference}",
            delete(handlers::client::cancel_booking),
        )
        .layer(from_fn_with_state(
            (limiter.clone(), Tier::Lookup),
            rate_limit,
        ));

    // 5. Admin scheduling endpoints (120 req/min); authentication is left
    // to the reverse proxy in front of this service.
    let admin_routes = Router::new()
        .route(
            "/api/admin/programmes",
            get(handlers::admin::list_all_programmes),
        )
        .route(
            "/api/admin/programmes",
            post(handlers::admin::create_programme),
        )
        .route(
            "/api/admin/programmes/{id}",
            put(handlers::admin::update_programme),
        )
        .route("/api/admin/sessions", get(handlers::admin::list_sessions))
        .route("/api/admin/sessions", post(handlers::admin::create_sessions))
        .route(
            "/api/admin/sessions/{id}",
            delete(handlers::admin::delete_session),
        )
        .route("/api/admin/bookings", get(handlers::admin::list_bookings))
        .route(
            "/api/admin/bookings/{id}/cancel",
            post(handlers::admin::cancel_booking),
        )
        .layer(from_fn_with_state(
            (limiter.clone(), Tier::Admin),
            rate_limit,
        ));

    let app = Router::new()
        .merge(no_limit_routes)
        .merge(public_routes)
        .merge(booking_routes)
        .merge(lookup_routes)
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", host, port);
    tracing::info!("BrightSteps booking server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
