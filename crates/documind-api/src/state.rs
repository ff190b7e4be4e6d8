//! Application state.
//!
//! Every pipeline stage sits behind a trait object so handlers and the
//! ingestion service can be exercised against in-memory fakes. The pool is
//! optional: it backs the readiness probe, while document writes go through
//! the `DocumentStore` trait.

use std::sync::Arc;

use documind_core::Config;
use documind_db::DocumentStore;
use documind_services::{Archive, Converter, TextAnalyzer};
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub pool: Option<PgPool>,
    pub converter: Arc<dyn Converter>,
    pub analyzer: Arc<dyn TextAnalyzer>,
    pub archive: Arc<dyn Archive>,
    pub documents: Arc<dyn DocumentStore>,
}

fn _assert_app_state_send_sync() {
    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}
    assert_send::<AppState>();
    assert_sync::<AppState>();
}
