//! OpenConnect integration
//!
//! openconnect is driven as an interactive subprocess: the bridge starts it
//! with credentials pre-seeded, and the classifier reads its console output
//! to infer the lifecycle.
//!
//! # Lifecycle
//!
//! - `locate`: find `openconnect`, `vpnc-script`, `expect` and the driver script
//! - `bridge`: spawn `expect -f vpn-connect.exp -- openconnect ...`
//! - `classifier`: turn each output line into observations using `markers`

pub mod bridge;
pub mod classifier;
pub mod locate;
pub mod markers;
pub mod profile;

pub use bridge::{ExpectBridge, LaunchRequest, TunnelLauncher};
pub use classifier::{Observation, OutputClassifier, Stream};
pub use locate::{check_binary_presence, BinaryPresence, Locations};
pub use profile::{ConnectionConfig, Protocol};
