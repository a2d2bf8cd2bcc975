pub mod field_path;
pub mod file_field;
pub mod object_store;
pub mod reconcile;
pub mod record_walker;
pub mod repository;
pub mod s3;
pub mod signer;
