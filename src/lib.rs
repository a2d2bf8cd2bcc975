//! File fields backed by S3-compatible buckets.
//!
//! - resolve slash-delimited field paths through nested collection schemas
//! - presign uploads and verify the checksum bound to each uploaded file
//! - reconcile buckets against the keys records still reference

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
