//! Presigned upload URLs and the checksum that binds an upload's id and name.
//!
//! Flow: the client asks for an upload of `filename` into some file field;
//! it receives `{url, id, name, checksum}`, PUTs the bytes to `url`, then
//! submits `{id, name, size, checksum}` as the field value. On write the
//! checksum is recomputed from `id`, `name` and the server secret, so
//! neither half of the object key can be swapped after issue.

use crate::{
    errors::{StorageError, StorageResult},
    models::{
        field::BucketSettings,
        fieldable::Fieldable,
        record::object_key,
        upload::PreSignedUpload,
    },
    services::{field_path::resolve_file_field, object_store::ObjectStoreFactory},
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Lifetime of a presigned PUT URL.
pub const UPLOAD_URL_TTL: Duration = Duration::from_secs(5 * 60);

/// Allow-list used when a field declares no `file_types`.
pub const ANY_FILE_TYPE: &str = "*";

#[derive(Clone)]
pub struct UploadSigner {
    secret: String,
    stores: Arc<dyn ObjectStoreFactory>,
    ttl: Duration,
}

impl UploadSigner {
    pub fn new(secret: impl Into<String>, stores: Arc<dyn ObjectStoreFactory>) -> Self {
        Self {
            secret: secret.into(),
            stores,
            ttl: UPLOAD_URL_TTL,
        }
    }

    /// Presign an upload of `filename` into the bucket described by `bucket`.
    ///
    /// `allowed_file_types` is a comma-separated extension list; `*` allows
    /// any extension, but a filename without one is always rejected.
    pub async fn sign(
        &self,
        filename: &str,
        bucket: &BucketSettings,
        allowed_file_types: &str,
    ) -> StorageResult<PreSignedUpload> {
        ensure_filename_safe(filename)?;
        ensure_extension_allowed(filename, allowed_file_types)?;

        let id = Uuid::new_v4().to_string();
        let key = object_key(&id, filename);
        let store = self.stores.connect(bucket)?;
        let url = store.presign_put(&bucket.bucket, &key, self.ttl).await?;

        info!(bucket = %bucket.location(), key = %key, "presigned upload issued");

        Ok(PreSignedUpload {
            url,
            checksum: checksum(&self.secret, &id, filename),
            id,
            name: filename.to_string(),
        })
    }

    /// Resolve `field_path` on `fieldable` and presign with that field's settings.
    pub async fn sign_for_field_path(
        &self,
        filename: &str,
        fieldable: &Fieldable,
        field_path: &str,
    ) -> StorageResult<PreSignedUpload> {
        let field = resolve_file_field(fieldable, field_path).map_err(|_| {
            StorageError::invalid(format!("Field \"{field_path}\" not found in fieldable."))
        })?;

        let bucket = field
            .settings
            .bucket()
            .ok_or_else(|| StorageError::invalid("Invalid field definition."))?;
        let allowed = field.settings.file_types().unwrap_or(ANY_FILE_TYPE);

        debug!(field = %field_path, filename = %filename, "signing upload for field");
        self.sign(filename, &bucket, allowed).await
    }
}

/// Hex HMAC-SHA256 of `id/name` under `secret`.
pub fn checksum(secret: &str, id: &str, name: &str) -> String {
    hex::encode(mac(secret, id, name).finalize().into_bytes())
}

/// Constant-time check of `checksum` against `id`, `name` and `secret`.
pub fn verify(secret: &str, id: &str, name: &str, checksum: &str) -> bool {
    match hex::decode(checksum) {
        Ok(expected) => mac(secret, id, name).verify_slice(&expected).is_ok(),
        Err(_) => false,
    }
}

fn mac(secret: &str, id: &str, name: &str) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(object_key(id, name).as_bytes());
    mac
}

/// The filename becomes the last segment of the object key.
fn ensure_filename_safe(filename: &str) -> StorageResult<()> {
    if filename.is_empty()
        || filename.contains('/')
        || filename.contains('\\')
        || filename.chars().any(char::is_control)
    {
        return Err(StorageError::invalid("Invalid filename."));
    }
    Ok(())
}

fn ensure_extension_allowed(filename: &str, allowed_file_types: &str) -> StorageResult<()> {
    let extension = match filename.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => ext.to_lowercase(),
        _ => {
            return Err(StorageError::invalid(
                "Filename must include a file type extension.",
            ));
        }
    };

    let supported = allowed_file_types
        .split(',')
        .map(str::trim)
        .filter(|candidate| !candidate.is_empty())
        .any(|candidate| candidate == ANY_FILE_TYPE || candidate.to_lowercase() == extension);

    if supported {
        Ok(())
    } else {
        Err(StorageError::invalid(format!(
            "File type \"{extension}\" not supported"
        )))
    }
}
