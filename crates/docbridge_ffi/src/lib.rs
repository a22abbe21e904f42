//! # DocBridge FFI
//!
//! Stable C ABI over the DocBridge document engine.
//!
//! This crate provides:
//! - Connection handles with per-handle error slots (`dbr_connect`,
//!   `dbr_handle_clone`, `dbr_take_error`)
//! - Two calling shapes: an `int` status with out-parameters, and
//!   `DbrResult` envelopes (`*_result` functions)
//! - Marshaling of document values (`DbrValue`, `DbrObject`, `DbrArray`)
//! - Live-query streams (`dbr_select_live`, `dbr_stream_next`)
//! - CBOR RPC endpoints (`dbr_rpc_new`, `dbr_rpc_execute`)
//!
//! ## Ownership
//!
//! Everything the library returns is owned by the caller and must be
//! released exactly once with the matching `dbr_free_*` function. Freeing
//! an aggregate frees everything inside it. Pointers passed in (`vars`,
//! `content`) are borrowed unless a function says it takes ownership.
//!
//! ## Errors
//!
//! Status-returning functions return a nonnegative value on success and
//! `DBR_ERROR` or `DBR_FATAL` on failure; the message is then in the
//! handle's error slot, drained with `dbr_take_error`. After `DBR_FATAL`
//! every handle of the connection fails until it is disconnected.

#![warn(missing_docs)]

mod array;
mod bytes;
mod connection;
mod error;
mod logging;
mod notification;
mod object;
mod result;
mod rpc;
mod stream;
mod string;
mod types;
mod value;

pub use array::*;
pub use bytes::*;
pub use connection::*;
pub use error::*;
pub use logging::*;
pub use notification::*;
pub use object::*;
pub use result::*;
pub use rpc::*;
pub use stream::*;
pub use string::*;
pub use types::*;
pub use value::*;
