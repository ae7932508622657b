use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{delete, get, post, put},
    Router,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/entries", get(handlers::list_entries))
        .route(
            "/api/entries/:date",
            get(handlers::get_entry)
                .put(handlers::put_entry)
                .delete(handlers::delete_entry),
        )
        .route("/api/phases", get(handlers::list_phases).post(handlers::add_phase))
        .route("/api/phases/current", get(handlers::current_phase))
        .route("/api/phases/:id/end", post(handlers::end_phase))
        .route("/api/phases/:id", delete(handlers::delete_phase))
        .route("/api/stats/rolling", get(handlers::rolling_average))
        .route("/api/stats/summary", get(handlers::metric_summary))
        .route("/api/stats/phases/:id", get(handlers::phase_stats))
        .route("/api/stats/streaks", get(handlers::streaks))
        .route("/api/sync", get(handlers::sync_status).post(handlers::sync_now))
        .route("/api/sync/commits-today", get(handlers::commits_today))
        .route("/api/visibility", post(handlers::visibility))
        .route(
            "/api/settings/remote",
            put(handlers::connect_remote).delete(handlers::disconnect_remote),
        )
        .with_state(state)
}
