//! Literal output markers the classifier matches against
//!
//! These strings are observed openconnect and driver-script output, not a
//! documented contract. Matching is case-sensitive substring search. Keep
//! every literal here so an upstream wording change is a one-line edit.
//! `scripts/vpn-connect.exp` prints the sentinel lines verbatim.

use crate::error::AuthFailure;

/// Any of these on either stream means the tunnel is up
pub const SUCCESS_MARKERS: &[&str] = &["CONNECTED", "Established", "Configured as"];

/// Route-configuration errors from vpnc-script that do not break the tunnel
pub const BENIGN_NOISE_MARKERS: &[&str] = &[
    "is not a recognized network service",
    "Error: The parameters were not valid",
];

/// Prefix shared by every driver sentinel line
pub const SENTINEL_PREFIX: &str = "[EXPECT ERROR]";

/// What a driver sentinel reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverSignal {
    AuthFailed(AuthFailure),
    Timeout,
}

/// Driver sentinels, matched in order
pub const DRIVER_SENTINELS: &[(&str, DriverSignal)] = &[
    (
        "[EXPECT ERROR] Incorrect sudo password",
        DriverSignal::AuthFailed(AuthFailure::Elevation),
    ),
    (
        "[EXPECT ERROR] Incorrect VPN credentials",
        DriverSignal::AuthFailed(AuthFailure::Tunnel),
    ),
    ("[EXPECT ERROR] Timeout", DriverSignal::Timeout),
];

/// Informational line emitted once when the tunnel comes up
pub const CONNECTED_NOTICE: &str = "Connection established successfully!";

/// Informational line emitted after benign route-configuration noise
pub const BENIGN_NOISE_NOTICE: &str =
    "Note: Route configuration had errors but VPN tunnel is established";

pub fn is_success_line(line: &str) -> bool {
    SUCCESS_MARKERS.iter().any(|m| line.contains(m))
}

pub fn is_benign_noise(line: &str) -> bool {
    BENIGN_NOISE_MARKERS.iter().any(|m| line.contains(m))
}

pub fn driver_signal(line: &str) -> Option<DriverSignal> {
    if !line.contains(SENTINEL_PREFIX) {
        return None;
    }
    DRIVER_SENTINELS
        .iter()
        .find(|(marker, _)| line.contains(marker))
        .map(|(_, signal)| *signal)
}
