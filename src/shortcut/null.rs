use std::sync::Arc;

use crate::error::GatewayError;
use crate::peer::PeerWriter;

use super::Role;

/// Default passthrough shortcut: writes whatever it receives to the
/// opposite peer, retrying on partial writes until the buffer is fully
/// consumed or the write fails.
pub struct NullShortcut {
    client: Arc<PeerWriter>,
    server: Arc<PeerWriter>,
}

impl NullShortcut {
    pub fn new(client: Arc<PeerWriter>, server: Arc<PeerWriter>) -> NullShortcut {
        NullShortcut { client, server }
    }

    pub async fn take(&self, role: Role, buffer: &[u8]) -> Result<usize, GatewayError> {
        let target = match role {
            Role::Client => &self.server,
            Role::Server => &self.client,
        };
        target.write_all(buffer).await?;
        Ok(buffer.len())
    }

    pub async fn shutdown(&self) {
        self.client.shutdown().await;
        self.server.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    async fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = TcpStream::connect(addr);
        let (accept, connect) = tokio::join!(listener.accept(), connect);
        (accept.unwrap().0, connect.unwrap())
    }

    #[tokio::test]
    async fn client_role_forwards_to_server_peer() {
        let (client_read, client_write) = connected_pair().await;
        let (server_read, server_write) = connected_pair().await;
        let _keep_alive = (client_read, server_read);

        let shortcut = NullShortcut::new(
            Arc::new(PeerWriter::new(client_write.into_split().1)),
            Arc::new(PeerWriter::new(server_write.into_split().1)),
        );

        let written = shortcut.take(Role::Client, b"hello").await.unwrap();
        assert_eq!(written, 5);
    }
}
