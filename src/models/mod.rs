//! Core data models for file fields stored in S3-compatible buckets.
//!
//! Schema nodes (`Fieldable`, `FieldDefinition`) are read from the schema
//! repository; records carry the data trees that reference uploaded objects.
//! `BucketTarget` and `PreSignedUpload` are built per operation.

pub mod bucket;
pub mod field;
pub mod fieldable;
pub mod record;
pub mod upload;
