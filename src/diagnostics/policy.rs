//! Stale route detection
//!
//! A heuristic, not a reachability check: expect false positives and
//! negatives. Swap the `RoutePolicy` to refine it without touching the
//! collectors.

use super::interfaces::InterfaceRecord;
use super::routes::RouteRecord;
use std::net::Ipv4Addr;

pub trait RoutePolicy {
    fn is_problematic(&self, route: &RouteRecord, interfaces: &[InterfaceRecord]) -> bool;
}

/// Flags routes via a private gateway outside every active interface's /24
#[derive(Debug, Clone, Copy, Default)]
pub struct StaleGatewayPolicy;

impl RoutePolicy for StaleGatewayPolicy {
    fn is_problematic(&self, route: &RouteRecord, interfaces: &[InterfaceRecord]) -> bool {
        if route.is_default() || is_link_local_gateway(&route.gateway) {
            return false;
        }
        let Ok(gateway) = route.gateway.parse::<Ipv4Addr>() else {
            return false;
        };
        if !gateway.is_private() {
            return false;
        }

        let subnet = slash24(gateway);
        !interfaces
            .iter()
            .filter(|i| i.is_active())
            .filter_map(|i| i.ip.as_deref()?.parse::<Ipv4Addr>().ok())
            .any(|ip| slash24(ip) == subnet)
    }
}

fn is_link_local_gateway(gateway: &str) -> bool {
    gateway.starts_with("link#") || gateway.starts_with("169.254.")
}

fn slash24(addr: Ipv4Addr) -> [u8; 3] {
    let [a, b, c, _] = addr.octets();
    [a, b, c]
}

/// Routes the policy flags, in table order
pub fn problematic_routes<'a>(
    policy: &dyn RoutePolicy,
    routes: &'a [RouteRecord],
    interfaces: &[InterfaceRecord],
) -> Vec<&'a RouteRecord> {
    routes
        .iter()
        .filter(|r| policy.is_problematic(r, interfaces))
        .collect()
}
