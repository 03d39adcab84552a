//! tether - keeps one working DevTools control connection alive across
//! networks that lie about reachability.
//!
//! # Components
//!
//! - [`resolver`] - turns a discovery origin into an endpoint that can actually be dialed
//! - [`prober`] - expands discovery hints into ordered candidates and tries them in turn
//! - [`manager`] - owns the single active connection; connect-vs-launch policy and timeouts
//! - [`session`] - capability view bound to one connection, rebuilt on replacement
//! - [`dispatch`] - FIFO admission, one operation in flight at a time
//! - [`switch`] - replaces the active connection on demand
//! - [`bridge`] - the facade wiring all of the above together
//!
//! # Example
//!
//! ```ignore
//! use tether::{Bridge, BridgeConfig};
//!
//! let bridge = Bridge::new(BridgeConfig::default())?;
//! let version = bridge
//!     .execute(|session| async move { session.send("Browser.getVersion", serde_json::json!({})).await })
//!     .await?;
//! ```

pub mod bridge;
pub mod config;
pub mod connection;
pub mod dialer;
pub mod dispatch;
pub mod endpoint;
pub mod error;
pub mod launcher;
pub mod manager;
pub mod prober;
pub mod resolver;
pub mod session;
pub mod switch;

#[cfg(test)]
pub(crate) mod testing;

pub use bridge::Bridge;
pub use config::{BridgeConfig, LaunchOptions, Timeouts};
pub use connection::Connection;
pub use dialer::{Dialer, NetworkDialer};
pub use dispatch::Dispatcher;
pub use endpoint::{Origin, ReachableEndpoint, TargetSpec};
pub use error::{CandidateFailure, Error, Result};
pub use launcher::{ChromeLauncher, Launcher, LocalInstance, ProfileDir};
pub use manager::{ConnectOptions, ConnectionManager, ConnectionState, DiscoveryHint};
pub use prober::{Candidate, CandidateProber, PortPlan, ProbeHint};
pub use resolver::EndpointResolver;
pub use session::{InstanceInfo, InstanceSource, SessionContext};
pub use switch::SwitchConfirmation;
pub use tether_protocol::{TargetInfo, VersionInfo};
