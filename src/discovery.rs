use std::time::Duration;

use crate::config::GuideSpec;

/// Consecutive no-new-address polls before discovery gives up on a route.
const TIME_TO_LIVE: u32 = 10;
const POLL_TIMEOUT: Duration = Duration::from_secs(2);
const KNOWN_ADDRESS_SLEEP: Duration = Duration::from_millis(250);

/// Polls `spec.url`, extracts `spec.field` as a string, and appends
/// `value:spec.port` to `destinations` whenever a new address is found.
/// Stops after `TIME_TO_LIVE` consecutive polls return nothing new.
pub async fn resolve_destinations(spec: &GuideSpec, destinations: &mut Vec<String>) {
    let client = match reqwest::Client::builder()
        .timeout(POLL_TIMEOUT)
        .pool_max_idle_per_host(0)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            log::warn!("{}: failed to build discovery client: {e}", spec.url);
            return;
        }
    };

    let mut ask = TIME_TO_LIVE;
    while ask > 0 {
        match poll_once(&client, spec).await {
            Some(address) => {
                if destinations.contains(&address) {
                    tokio::time::sleep(KNOWN_ADDRESS_SLEEP).await;
                    ask -= 1;
                } else {
                    log::info!("{}: found {address}", spec.url);
                    destinations.push(address);
                    ask = TIME_TO_LIVE;
                }
            }
            None => {
                ask -= 1;
            }
        }
    }
}

async fn poll_once(client: &reqwest::Client, spec: &GuideSpec) -> Option<String> {
    let response = client.get(&spec.url).send().await.ok()?;
    let body: serde_json::Value = response.json().await.ok()?;
    let value = body.get(spec.field.as_str())?.as_str()?;
    Some(format!("{value}:{}", spec.port))
}
