pub mod blob_upload;
pub mod null;

use crate::error::GatewayError;

/// Which side of a route a buffer was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// The closed set of shortcut implementations, dispatched by tag rather
/// than through `dyn Trait` since the variant set is fixed at compile
/// time.
pub enum Shortcut {
    Null(null::NullShortcut),
    BlobUpload(blob_upload::BlobUploadShortcut),
}

impl Shortcut {
    /// Called whenever new bytes arrive from the peer identified by
    /// `role`. Returns the number of bytes consumed from `buffer` (always
    /// `buffer.len()` in this implementation — nothing here does partial
    /// consumption of the input, only of writes).
    pub async fn take(&self, role: Role, buffer: &[u8]) -> Result<usize, GatewayError> {
        match self {
            Shortcut::Null(s) => s.take(role, buffer).await,
            Shortcut::BlobUpload(s) => s.take(role, buffer).await,
        }
    }

    /// Closes both peer connections the shortcut holds. Called once a
    /// route's pumps have both terminated.
    pub async fn shutdown(&self) {
        match self {
            Shortcut::Null(s) => s.shutdown().await,
            Shortcut::BlobUpload(s) => s.shutdown().await,
        }
    }
}
