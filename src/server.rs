//! HTTP endpoint serving the cached seed list.
//!
//! Every path and method gets the current artifact verbatim.

use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::{extract::State, Router};

use crate::cache::SeedCache;

const CONTENT_TYPE: &str = "text/plain; charset=UTF-8";

pub fn router(cache: SeedCache) -> Router {
    Router::new().fallback(serve_seed_list).with_state(cache)
}

async fn serve_seed_list(State(cache): State<SeedCache>) -> impl IntoResponse {
    let seed_list = cache.read().await;
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, CONTENT_TYPE)],
        seed_list.body(),
    )
}
