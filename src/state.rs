//! Shared state handed to every HTTP handler.

use crate::services::{repository::SchemaRepository, signer::UploadSigner};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn SchemaRepository>,
    pub signer: UploadSigner,
}

impl AppState {
    pub fn new(repo: Arc<dyn SchemaRepository>, signer: UploadSigner) -> Self {
        Self { repo, signer }
    }
}
