//! # API Module
//!
//! The HTTP face of the replication target. Routes follow the CouchDB
//! replication protocol so stock replicators can push into the server.
//!
//! ## Endpoints Overview
//!
//! ### Server
//! - `GET /` - Welcome object
//! - `GET /_up` - Liveness probe
//! - `GET /_all_dbs` - Database names
//! - `GET /_metrics` - Prometheus metrics (path configurable)
//!
//! ### Databases
//! - `PUT /{db}` - Create database (412 if it exists)
//! - `GET|HEAD /{db}` - Database info
//! - `DELETE /{db}` - Drop database
//! - `POST /{db}/_revs_diff` - Revisions the database lacks
//! - `POST /{db}/_bulk_docs` - Write many documents, failures inline
//! - `POST /{db}/_ensure_full_commit` - Commit acknowledgement
//! - `GET /{db}/_changes` - One-shot change feed
//!
//! ### Documents
//! - `GET|HEAD|PUT|DELETE /{db}/{docid}`
//! - `GET|HEAD|PUT|DELETE /{db}/_design/{docid}`
//! - `GET|HEAD|PUT|DELETE /{db}/_local/{docid}`

pub mod error;
pub mod handlers;
pub mod server;

#[cfg(test)]
mod tests;

pub use error::{ApiError, ApiResult};
pub use server::{create_router, start_server};
