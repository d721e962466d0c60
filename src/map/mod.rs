pub mod http;
pub mod http2;
pub mod tcp;

use std::sync::Arc;

use tokio::net::tcp::OwnedReadHalf;

use crate::config::Route;
use crate::error::GatewayError;
use crate::guide::Guide;
use crate::peer::PeerWriter;
use crate::shortcut::{Role, Shortcut};

/// Everything the route pipeline needs after destination resolution: the
/// read half of the dialed server connection and the shortcut that now
/// owns both peers' write sides.
pub struct ResolvedRoute {
    pub server_read: OwnedReadHalf,
    pub shortcut: Shortcut,
}

/// Resolves a destination connection for a newly accepted client
/// connection, then attaches a shortcut to the resulting route.
///
/// Two variants: plain TCP round-robin load balancing, or HTTP/HTTPS
/// inspection of the first bytes on the wire. Chosen per-route by
/// `Route::inspect`.
pub enum Map {
    Tcp(tcp::TcpMap),
    Http(http::HttpMap),
}

impl Map {
    pub fn new(route: &Route) -> Map {
        if route.inspect {
            Map::Http(http::HttpMap::new())
        } else {
            Map::Tcp(tcp::TcpMap::new(route.dst.clone()))
        }
    }

    /// Resolves the destination. `client_read` is read from directly when
    /// HTTP inspection needs the first bytes on the wire; `client_writer`
    /// is used both to reply to `CONNECT` locally and as the shortcut's
    /// client-side write target.
    pub async fn find_route(
        &self,
        route_number: u64,
        guide: &Guide,
        client_read: &mut OwnedReadHalf,
        client_writer: Arc<PeerWriter>,
    ) -> Result<ResolvedRoute, GatewayError> {
        match self {
            Map::Tcp(m) => m.find_route(route_number, guide, client_writer).await,
            Map::Http(m) => {
                m.find_route(route_number, guide, client_read, client_writer)
                    .await
            }
        }
    }
}

/// Forwards `buffer`, read from the peer identified by `role`, into the
/// route's shortcut.
pub async fn detour(shortcut: &Shortcut, role: Role, buffer: &[u8]) -> Result<usize, GatewayError> {
    shortcut.take(role, buffer).await
}
