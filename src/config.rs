use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Directional gating for a route. A numeric value >= 3 in the wire format
/// means "every Nth accepted connection is Closed" and is captured
/// separately as `FlowPolicy::Chaos`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowPolicy {
    Closed,
    OneWay,
    TwoWay,
    Chaos(u32),
}

impl FlowPolicy {
    fn from_raw(value: i64) -> Self {
        match value {
            0 => FlowPolicy::Closed,
            1 => FlowPolicy::OneWay,
            2 => FlowPolicy::TwoWay,
            n if n >= 3 => FlowPolicy::Chaos(n as u32),
            _ => FlowPolicy::TwoWay,
        }
    }

    /// Resolves the policy actually in effect for the `route_number`th
    /// accepted connection on this route (1-based).
    pub fn effective(self, route_number: u64) -> FlowPolicy {
        match self {
            FlowPolicy::Chaos(n) => {
                if (route_number + 1) % n as u64 == 0 {
                    FlowPolicy::Closed
                } else {
                    FlowPolicy::TwoWay
                }
            }
            other => other,
        }
    }
}

/// Parsed form of a route's `guide` probe spec: `"<url> <field> <port>"`.
#[derive(Debug, Clone)]
pub struct GuideSpec {
    pub url: String,
    pub field: String,
    pub port: u16,
}

impl GuideSpec {
    fn parse(raw: &str) -> Option<GuideSpec> {
        let mut parts = raw.split_whitespace();
        let url = parts.next()?.to_string();
        let field = parts.next()?.to_string();
        let port = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        Some(GuideSpec { url, field, port })
    }
}

#[derive(Debug, Deserialize)]
struct RawRoute {
    bandwidth: i64,
    buffersize: u64,
    #[serde(default)]
    delay: i64,
    flow: i64,
    #[serde(default)]
    guide: String,
    #[serde(default)]
    inspect: bool,
    #[serde(default)]
    #[serde(rename = "speedLimit")]
    speed_limit: i64,
    src: String,
    dst: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Route {
    pub name: String,
    /// Bits per second, per direction. `<= 0` means unlimited.
    pub bandwidth: i64,
    pub buffer_size: u64,
    /// Reserved, currently unenforced: latency injection in milliseconds.
    pub delay: i64,
    pub flow: FlowPolicy,
    pub guide: Option<GuideSpec>,
    pub inspect: bool,
    /// Reserved, currently unenforced: a secondary bits/second cap.
    pub speed_limit: i64,
    pub src: String,
    pub dst: Vec<String>,
}

impl Route {
    fn from_raw(name: String, raw: RawRoute) -> Route {
        Route {
            name,
            bandwidth: raw.bandwidth,
            buffer_size: raw.buffersize,
            delay: raw.delay,
            flow: FlowPolicy::from_raw(raw.flow),
            guide: GuideSpec::parse(&raw.guide),
            inspect: raw.inspect,
            speed_limit: raw.speed_limit,
            src: raw.src,
            dst: raw.dst,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShortcutDescriptor {
    pub exitno: i64,
    pub shortcut: String,
    #[serde(default)]
    pub wormhole: bool,
}

#[derive(Debug, Deserialize)]
struct RawItinerary {
    map: HashMap<String, RawRoute>,
    #[serde(default)]
    shortcuts: Vec<ShortcutDescriptor>,
}

#[derive(Debug, Clone)]
pub struct Itinerary {
    pub routes: Vec<Route>,
    pub shortcuts: Vec<ShortcutDescriptor>,
}

/// Loads and validates the itinerary file at `path`.
///
/// A malformed top-level document is a fatal decode error. An individual
/// route that fails to deserialize is logged and skipped; the rest of the
/// itinerary still loads, matching the "config-decode-failure" recovery
/// policy of partial-itinerary-on-route-error.
pub fn load(path: &Path) -> Result<Itinerary, GatewayError> {
    let text = std::fs::read_to_string(path)?;
    let raw: RawItinerary = serde_json::from_str(&text)?;

    let routes = raw
        .map
        .into_iter()
        .map(|(name, raw_route)| Route::from_raw(name, raw_route))
        .collect();

    Ok(Itinerary {
        routes,
        shortcuts: raw.shortcuts,
    })
}
