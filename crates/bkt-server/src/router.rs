use std::sync::Arc;

use axum::{middleware, Router};
use tower_http::trace::TraceLayer;

use bkt_store::Db;

use crate::csrf::{csrf_middleware, CsrfGuard};
use crate::handler;

/// Shared per-router state.
#[derive(Clone, Debug)]
pub struct AppState {
    pub db: Arc<Db>,
    pub max_body_size: usize,
}

impl AppState {
    pub fn new(db: Arc<Db>, max_body_size: usize) -> Self {
        Self { db, max_body_size }
    }
}

/// Build the axum router. Every path and verb goes to the dispatcher; CSRF
/// checks wrap it only when a guard is given.
pub fn build_router(state: AppState, csrf: Option<Arc<CsrfGuard>>) -> Router {
    let router = Router::new().fallback(handler::dispatch).with_state(state);
    let router = match csrf {
        Some(guard) => router.layer(middleware::from_fn_with_state(guard, csrf_middleware)),
        None => router,
    };
    router.layer(TraceLayer::new_for_http())
}
