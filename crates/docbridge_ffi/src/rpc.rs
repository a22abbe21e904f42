//! CBOR RPC endpoints.
//!
//! An RPC handle carries its own session and parameters, separate from
//! any connection handle. Requests and responses are CBOR byte buffers;
//! see `docbridge_core::rpc` for their layout. A panic poisons the
//! handle, after which every call fails with `DBR_FATAL`.

use crate::bytes::DbrBytes;
use crate::connection::panic_message;
use crate::error::{BoundaryError, BoundaryResult};
use crate::result::{out_param, DbrBytesResult};
use crate::string::{str_arg, DbrString};
use crate::types::{DbrOptions, DbrRpc};
use docbridge_core::rpc::Rpc;
use docbridge_core::Config;
use std::ffi::{c_char, c_int};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};

/// An RPC endpoint behind a `DbrRpc` pointer.
pub struct RpcEndpoint {
    rpc: Rpc,
    poisoned: AtomicBool,
}

impl RpcEndpoint {
    /// Opens an endpoint over a fresh engine.
    pub fn connect(endpoint: &str, config: Config) -> BoundaryResult<Self> {
        let engine = docbridge_core::connect(endpoint, config)?;
        tracing::debug!(endpoint, "rpc endpoint opened");
        Ok(Self {
            rpc: Rpc::new(engine),
            poisoned: AtomicBool::new(false),
        })
    }

    /// Returns true once a call has panicked.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    /// Runs one encoded request and returns the encoded response.
    pub fn execute(&self, request: &[u8]) -> BoundaryResult<Vec<u8>> {
        if self.is_poisoned() {
            return Err(BoundaryError::fatal("rpc endpoint is poisoned"));
        }
        let run = AssertUnwindSafe(|| self.rpc.execute(request).map_err(BoundaryError::from));
        panic::catch_unwind(run).unwrap_or_else(|payload| {
            self.poisoned.store(true, Ordering::Release);
            let err = BoundaryError::fatal(format!(
                "panic during rpc: {}",
                panic_message(payload.as_ref())
            ));
            tracing::warn!(error = %err, "rpc endpoint poisoned");
            Err(err)
        })
    }

    fn into_raw(self) -> *mut DbrRpc {
        Box::into_raw(Box::new(self)).cast::<DbrRpc>()
    }
}

unsafe fn rpc_ref<'a>(rpc: *const DbrRpc) -> BoundaryResult<&'a RpcEndpoint> {
    rpc.cast::<RpcEndpoint>()
        .as_ref()
        .ok_or_else(|| BoundaryError::null_argument("rpc"))
}

unsafe fn request_arg<'a>(request: *const u8, len: usize) -> BoundaryResult<&'a [u8]> {
    if request.is_null() {
        if len == 0 {
            return Ok(&[]);
        }
        return Err(BoundaryError::null_argument("request"));
    }
    Ok(std::slice::from_raw_parts(request, len))
}

unsafe fn run_execute(rpc: *const DbrRpc, request: *const u8, len: usize) -> BoundaryResult<DbrBytes> {
    let rpc = rpc_ref(rpc)?;
    let request = request_arg(request, len)?;
    rpc.execute(request).map(DbrBytes::from_vec)
}

/// Writes an error's message through `err_out` and returns its status.
unsafe fn report(err_out: *mut DbrString, err: BoundaryError) -> c_int {
    let code = err.code();
    if !err_out.is_null() {
        err_out.write(DbrString::from(err.message));
    }
    code
}

/// Opens an RPC endpoint.
///
/// On success writes the handle to `rpc_out` and returns 0. On failure
/// returns `DBR_ERROR` or `DBR_FATAL` and, if `err_out` is not null,
/// writes the message there. `options` may be null for the defaults.
/// Release the handle with `dbr_rpc_free`.
///
/// # Safety
///
/// - `err_out` must be null or valid for writes
/// - `rpc_out` must be valid for writes
/// - `endpoint` must be a null-terminated UTF-8 string
/// - `options` must be null or point to a valid `DbrOptions`
#[no_mangle]
pub unsafe extern "C" fn dbr_rpc_new(
    err_out: *mut DbrString,
    rpc_out: *mut *mut DbrRpc,
    endpoint: *const c_char,
    options: *const DbrOptions,
) -> c_int {
    if rpc_out.is_null() {
        return report(err_out, BoundaryError::null_argument("rpc_out"));
    }
    let opened = str_arg(endpoint, "endpoint").and_then(|endpoint| {
        let options = options.as_ref().copied().unwrap_or_default();
        RpcEndpoint::connect(endpoint, options.into())
    });
    match opened {
        Ok(rpc) => {
            rpc_out.write(rpc.into_raw());
            0
        }
        Err(err) => {
            tracing::warn!(error = %err, "rpc open failed");
            report(err_out, err)
        }
    }
}

/// Runs one CBOR request.
///
/// On success writes the CBOR response to `res_out` and returns its
/// length; free it with `dbr_free_bytes`. On failure returns `DBR_ERROR`
/// or `DBR_FATAL`, writes nothing to `res_out`, and writes the message to
/// `err_out` if it is not null.
///
/// # Safety
///
/// - `rpc` must be a live RPC handle
/// - `err_out` must be null or valid for writes
/// - `res_out` must be valid for writes
/// - `request` must point to `len` readable bytes, or be null with `len == 0`
#[no_mangle]
pub unsafe extern "C" fn dbr_rpc_execute(
    rpc: *const DbrRpc,
    err_out: *mut DbrString,
    res_out: *mut DbrBytes,
    request: *const u8,
    len: usize,
) -> c_int {
    if res_out.is_null() {
        return report(err_out, BoundaryError::null_argument("res_out"));
    }
    let result = run_execute(rpc, request, len).and_then(|bytes| {
        let status = c_int::try_from(bytes.len)
            .map_err(|_| BoundaryError::recoverable("response too large for a status"))?;
        Ok((bytes, status))
    });
    match result {
        Ok(payload) => out_param(Ok(payload), res_out),
        Err(err) => report(err_out, err),
    }
}

/// As `dbr_rpc_execute`, returning the response in an envelope.
///
/// # Safety
///
/// As `dbr_rpc_execute`.
#[no_mangle]
pub unsafe extern "C" fn dbr_rpc_execute_result(
    rpc: *const DbrRpc,
    request: *const u8,
    len: usize,
) -> DbrBytesResult {
    run_execute(rpc, request, len).into()
}

/// Releases an RPC handle.
///
/// # Safety
///
/// `rpc` must be null or a handle from `dbr_rpc_new` that has not been
/// freed.
#[no_mangle]
pub unsafe extern "C" fn dbr_rpc_free(rpc: *mut DbrRpc) {
    if !rpc.is_null() {
        drop(Box::from_raw(rpc.cast::<RpcEndpoint>()));
    }
}
