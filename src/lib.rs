pub mod config;
pub mod detour;
pub mod discovery;
pub mod error;
pub mod guide;
pub mod logging;
pub mod map;
pub mod metrics;
pub mod peer;
pub mod shortcut;
pub mod signal;
pub mod tokenbucket;

use std::path::Path;
use std::sync::Arc;

use guide::Guide;

/// Loads `itinerary_path`, resolves any discovery probes, and runs every
/// route's listener concurrently until all of them exit (which, for a
/// healthy bind, never happens on its own).
pub async fn run_itinerary(itinerary_path: &Path) -> Result<(), error::GatewayError> {
    let itinerary = config::load(itinerary_path)?;

    let mut guide = Guide::new();
    guide.load_shortcuts(&itinerary.shortcuts);
    let guide = Arc::new(guide);

    let mut tasks = Vec::new();
    for mut route in itinerary.routes {
        if let Some(spec) = route.guide.clone() {
            discovery::resolve_destinations(&spec, &mut route.dst).await;
        }

        if route.dst.is_empty() {
            log::error!("route {}: no destinations available, skipping", route.name);
            continue;
        }

        let guide = guide.clone();
        tasks.push(tokio::spawn(
            async move { detour::run(route, guide).await },
        ));
    }

    for task in tasks {
        if let Ok(Err(e)) = task.await {
            log::error!("route listener exited: {e}");
        }
    }

    Ok(())
}
