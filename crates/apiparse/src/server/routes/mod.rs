//! API routes for the parsing server

pub mod jobs;

use axum::{
    routing::{get, post},
    Router,
};

use crate::server::state::AppState;

/// Build the job lifecycle routes
pub fn job_routes() -> Router<AppState> {
    Router::new()
        // Submission
        .route("/text", post(jobs::submit_text))
        .route("/file", post(jobs::submit_file))
        // Polling, entry point selection and removal
        .route(
            "/job/:id",
            get(jobs::poll_job)
                .put(jobs::select_entry_point)
                .delete(jobs::delete_job),
        )
}
