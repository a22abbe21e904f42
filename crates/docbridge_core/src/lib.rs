//! # DocBridge Core
//!
//! The document engine that the DocBridge C boundary drives.
//!
//! This crate provides:
//! - The dynamic document value model (`Value`, `Thing`, `Id`, `Object`)
//! - The `Engine` trait and endpoint dispatch via `connect`
//! - An in-memory `Datastore` with a small statement language
//! - Live queries over record changes
//! - A CBOR request/response surface (`rpc::Rpc`)

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod datastore;
mod engine;
mod error;
mod live;
pub mod rpc;
pub mod sql;
mod value;

pub use config::Config;
pub use datastore::Datastore;
pub use engine::{connect, Engine, Session};
pub use error::{CoreError, CoreResult};
pub use live::{Action, Change, LiveFeed, LiveScope, LiveSubscription, Notification};
pub use sql::Vars;
pub use value::{Id, Number, Object, RecordKey, Thing, Value, MAX_NESTING_DEPTH};
