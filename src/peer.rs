use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;

use crate::error::GatewayError;

/// Serializes writes to one peer connection.
///
/// A shortcut's synthesized writes and the opposite-direction pump's
/// forwarded writes can both target the same peer; without this wrapper
/// they would interleave mid-write. Every write to a peer MUST go through
/// its `PeerWriter`.
pub struct PeerWriter {
    inner: Mutex<OwnedWriteHalf>,
}

impl PeerWriter {
    pub fn new(half: OwnedWriteHalf) -> PeerWriter {
        PeerWriter {
            inner: Mutex::new(half),
        }
    }

    /// Writes the full buffer, retrying on partial writes until all bytes
    /// are consumed or a write fails.
    pub async fn write_all(&self, buffer: &[u8]) -> Result<(), GatewayError> {
        let mut half = self.inner.lock().await;
        half.write_all(buffer).await.map_err(GatewayError::Io)
    }

    pub async fn shutdown(&self) {
        let mut half = self.inner.lock().await;
        let _ = half.shutdown().await;
    }
}
