//! Read-only system diagnostics
//!
//! Everything here is recomputed on each call; nothing is cached.

pub mod interfaces;
pub mod policy;
pub mod probe;
pub mod processes;
pub mod routes;

pub use interfaces::{list_interfaces, InterfaceRecord};
pub use policy::{problematic_routes, RoutePolicy, StaleGatewayPolicy};
pub use probe::{test_connectivity, ProbeResult, DEFAULT_PROBE_DEADLINE};
pub use processes::{list_tunnel_processes, ProcessRecord};
pub use routes::{list_routes, RouteRecord, RouteTableFormat};
