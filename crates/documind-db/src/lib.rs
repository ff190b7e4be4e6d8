//! Document store over Postgres.
//!
//! The pool is built once at startup and shared by every pipeline run
//! (connect-once, reuse). The `DocumentStore` trait is the seam the
//! ingestion coordinator depends on, so tests can substitute an in-memory
//! fake for the real `PgDocumentStore`.

mod documents;

pub use documents::{DocumentStore, PgDocumentStore, StoreError};
