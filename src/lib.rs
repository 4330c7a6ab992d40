//! ocvpn - OpenConnect session supervisor
//!
//! Runs the `openconnect` client under sudo, feeds it credentials through
//! an `expect` driver, and follows its console output to report the
//! connection state. Also provides the privileged helpers and network
//! diagnostics a VPN front-end needs.
//!
//! # Architecture
//!
//! - `validate`: typed, shell-safe values built from caller input
//! - `privileged`: one-shot commands through `sudo -S`
//! - `openconnect`: binary discovery, launch bridge, output classifier
//! - `supervisor`: the connection state machine
//! - `diagnostics`: routes, interfaces, processes, reachability probe
//! - `platform`: per-OS command sets and signal delivery
//! - `config` / `profiles`: TOML settings and JSON connection profiles

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod openconnect;
pub mod platform;
pub mod privileged;
pub mod profiles;
pub mod supervisor;
pub mod validate;

pub use config::Config;
pub use error::{AuthFailure, ErrorKind, VpnError};
pub use events::{LogEvent, LogKind, SupervisorEvent};
pub use openconnect::{ConnectionConfig, Protocol};
pub use privileged::{Classification, PrivilegedCommandResult, PrivilegedRunner};
pub use supervisor::{ConnectionState, ConnectionSupervisor, CredentialPrompt};
