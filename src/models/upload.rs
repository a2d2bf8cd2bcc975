//! Presigned upload handed out to clients.

use serde::{Deserialize, Serialize};

/// A time-limited authorization to write exactly one object.
///
/// `checksum` binds `id` and `name` to the server secret; the client echoes
/// it back inside the stored file value so a later write can prove the pair
/// was issued here. It is not part of the signed URL itself.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PreSignedUpload {
    pub url: String,
    pub id: String,
    pub name: String,
    pub checksum: String,
}
