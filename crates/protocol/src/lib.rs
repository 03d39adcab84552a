//! Wire types consumed from the DevTools protocol.
//!
//! The remote protocol is an external contract: these types model only the
//! fields tether reads or writes, and tolerate everything else.
//!
//! # Main Types
//!
//! - [`VersionInfo`] - `/json/version` discovery document
//! - [`Request`], [`Response`], [`Event`], [`Message`] - control channel envelopes
//! - [`TargetInfo`] - top-level contexts exposed by the remote process

pub mod discovery;
pub mod message;
pub mod target;

pub use discovery::{VERSION_PATH, VersionInfo};
pub use message::{Event, Message, RemoteError, Request, Response};
pub use target::{AttachToTargetResult, GetTargetsResult, TargetInfo};
