use std::sync::Arc;

use tokio::net::TcpStream;

use crate::error::GatewayError;
use crate::guide::Guide;
use crate::peer::PeerWriter;
use crate::shortcut::null::NullShortcut;
use crate::shortcut::Shortcut;

use super::ResolvedRoute;

/// Round-robin TCP load balancer: dials `dst[route_number % dst.len()]`.
pub struct TcpMap {
    destinations: Vec<String>,
}

impl TcpMap {
    pub fn new(destinations: Vec<String>) -> TcpMap {
        TcpMap { destinations }
    }

    pub async fn find_route(
        &self,
        route_number: u64,
        _guide: &Guide,
        client_writer: Arc<PeerWriter>,
    ) -> Result<ResolvedRoute, GatewayError> {
        let index = (route_number as usize) % self.destinations.len();
        let addr = &self.destinations[index];

        let stream = TcpStream::connect(addr).await.map_err(|source| GatewayError::Dial {
            addr: addr.clone(),
            source,
        })?;
        let _ = stream.set_nodelay(true);
        let (server_read, server_write) = stream.into_split();
        let server_writer = Arc::new(PeerWriter::new(server_write));

        // No client signature is available for a plain TCP route; always
        // a null shortcut.
        let shortcut = Shortcut::Null(NullShortcut::new(client_writer, server_writer));

        Ok(ResolvedRoute {
            server_read,
            shortcut,
        })
    }
}
