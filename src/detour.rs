use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};

use crate::config::{FlowPolicy, Route};
use crate::error::GatewayError;
use crate::guide::Guide;
use crate::map::{self, Map};
use crate::metrics::Metrics;
use crate::peer::PeerWriter;
use crate::shortcut::{Role, Shortcut};
use crate::tokenbucket::TokenBucket;

/// Runs one route's listener forever: accept, resolve, pump, repeat.
pub async fn run(route: Route, guide: Arc<Guide>) -> Result<(), GatewayError> {
    let listener = TcpListener::bind(&route.src)
        .await
        .map_err(|source| GatewayError::Bind {
            addr: route.src.clone(),
            source,
        })?;
    log::info!("route {}: listening on {}", route.name, route.src);

    let route = Arc::new(route);
    let route_counter = Arc::new(AtomicU64::new(0));

    loop {
        let (client, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                log::warn!("route {}: accept failed: {e}", route.name);
                continue;
            }
        };

        let route_number = route_counter.fetch_add(1, Ordering::SeqCst);
        let route = route.clone();
        let guide = guide.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(route.clone(), guide, route_number, client).await {
                log::warn!(
                    "route {}: connection from {peer_addr} ended: {e}",
                    route.name
                );
            }
        });
    }
}

async fn handle_connection(
    route: Arc<Route>,
    guide: Arc<Guide>,
    route_number: u64,
    client: TcpStream,
) -> Result<(), GatewayError> {
    let _ = client.set_nodelay(true);
    let flow = route.flow.effective(route_number);

    let (mut client_read, client_write) = client.into_split();
    let client_writer = Arc::new(PeerWriter::new(client_write));

    let map = Map::new(&route);
    let resolved = map
        .find_route(route_number, &guide, &mut client_read, client_writer.clone())
        .await?;
    let shortcut = Arc::new(resolved.shortcut);

    if flow == FlowPolicy::Closed {
        shortcut.shutdown().await;
        return Ok(());
    }

    let bandwidth = route.bandwidth.max(0) as u64 / 8;
    let rate = if route.bandwidth <= 0 { 0 } else { bandwidth as i64 };
    let capacity = route.buffer_size.max(bandwidth) * 10;

    let client_metrics = Metrics::new(1_000_000_000, 1_000_000, format!("{}.client", route.name));
    let server_metrics = Metrics::new(1_000_000_000, 1_000_000, format!("{}.server", route.name));

    let client_to_server = pump(
        client_read,
        shortcut.clone(),
        Role::Client,
        flow,
        route.buffer_size,
        TokenBucket::new(rate, capacity),
        client_metrics,
    );
    let server_to_client = pump(
        resolved.server_read,
        shortcut.clone(),
        Role::Server,
        flow,
        route.buffer_size,
        TokenBucket::new(rate, capacity),
        server_metrics,
    );

    let _ = tokio::join!(client_to_server, server_to_client);

    shortcut.shutdown().await;
    Ok(())
}

/// One direction of a route's byte pump: read from `source`, shape with
/// `bucket`, and hand the bytes to the shortcut unless the flow policy
/// discards this direction.
async fn pump(
    mut source: OwnedReadHalf,
    shortcut: Arc<Shortcut>,
    role: Role,
    flow: FlowPolicy,
    buffer_size: u64,
    mut bucket: TokenBucket,
    mut metrics: Metrics,
) {
    let mut buffer = BytesMut::zeroed(buffer_size as usize);
    let discard = matches!(
        (role, flow),
        (Role::Server, FlowPolicy::OneWay) | (Role::Client, FlowPolicy::Closed)
    );

    loop {
        let granted = bucket.take(buffer_size);
        if granted < buffer_size {
            bucket.return_tokens(granted);
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            continue;
        }

        let n = match source.read(&mut buffer).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => break,
        };

        if !discard {
            if let Err(e) = map::detour(&shortcut, role, &buffer[..n]).await {
                log::debug!("pump terminating after forwarding error: {e}");
                break;
            }
        }

        metrics.add(n as u64);

        if (n as u64) < buffer_size {
            bucket.return_tokens(buffer_size - n as u64);
        }
    }

    metrics.dump();
}
