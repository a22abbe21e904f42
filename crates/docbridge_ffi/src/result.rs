//! Result envelopes.
//!
//! Every fallible operation has one internal result type,
//! `BoundaryResult<T>`, and two ways out of the library:
//!
//! - the out-parameter shape returns a `c_int` status (nonnegative on
//!   success, `DBR_ERROR` or `DBR_FATAL` on failure) and writes the payload
//!   through a caller-supplied pointer, see [`out_param`];
//! - the value shape returns a `DbrResult<T>` whose `err.code` is 0 on
//!   success, see `From<BoundaryResult<T>> for DbrResult<T>`.
//!
//! On failure no payload is written (out-parameter shape) or the payload is
//! the empty value for its type (value shape), so there is nothing to free
//! besides the error message.

use crate::array::{drop_raw_slice, into_raw_slice, DbrArray};
use crate::bytes::DbrBytes;
use crate::error::{BoundaryResult, DbrError};
use crate::string::DbrString;
use crate::value::DbrValue;
use std::ffi::c_int;

/// Success payload plus error descriptor.
///
/// Check `err.code` before reading `ok`.
#[repr(C)]
#[derive(Debug, PartialEq)]
pub struct DbrResult<T> {
    /// Payload, valid only when `err.code == 0`.
    pub ok: T,
    /// Error descriptor.
    pub err: DbrError,
}

/// A payload type that has an empty value to stand in on failure.
pub trait Payload {
    /// The empty payload.
    fn absent() -> Self;
}

impl Payload for DbrString {
    fn absent() -> Self {
        DbrString::null()
    }
}

impl Payload for DbrArray {
    fn absent() -> Self {
        DbrArray::null()
    }
}

impl Payload for DbrBytes {
    fn absent() -> Self {
        Self {
            data: std::ptr::null_mut(),
            len: 0,
        }
    }
}

impl Payload for DbrValue {
    fn absent() -> Self {
        DbrValue::None
    }
}

impl Payload for DbrArrayResultArray {
    fn absent() -> Self {
        Self {
            arr: std::ptr::null_mut(),
            len: 0,
        }
    }
}

impl<T> Payload for *mut T {
    fn absent() -> Self {
        std::ptr::null_mut()
    }
}

impl<T: Payload> From<BoundaryResult<T>> for DbrResult<T> {
    fn from(result: BoundaryResult<T>) -> Self {
        match result {
            Ok(ok) => Self {
                ok,
                err: DbrError::none(),
            },
            Err(err) => Self {
                ok: T::absent(),
                err: err.into(),
            },
        }
    }
}

/// Writes a successful payload through `out` and returns its status.
///
/// # Safety
///
/// `out` must be valid for writes when `result` is `Ok`. The previous
/// contents of `*out` are overwritten without being dropped.
pub(crate) unsafe fn out_param<T>(result: BoundaryResult<(T, c_int)>, out: *mut T) -> c_int {
    match result {
        Ok((payload, status)) => {
            out.write(payload);
            status
        }
        Err(err) => err.code(),
    }
}

/// Envelope holding one statement's result.
pub type DbrArrayResult = DbrResult<DbrArray>;

/// Envelope holding a string.
pub type DbrStringResult = DbrResult<DbrString>;

/// Envelope holding a single value.
pub type DbrValueResult = DbrResult<DbrValue>;

/// Envelope holding a byte buffer.
pub type DbrBytesResult = DbrResult<DbrBytes>;

/// Owned array of per-statement envelopes.
#[repr(C)]
#[derive(Debug, PartialEq)]
pub struct DbrArrayResultArray {
    /// Pointer to the first envelope.
    pub arr: *mut DbrArrayResult,
    /// Number of envelopes (one per statement).
    pub len: usize,
}

impl DbrArrayResultArray {
    /// Creates an array from a Vec.
    pub fn from_vec(results: Vec<DbrArrayResult>) -> Self {
        let (arr, len) = into_raw_slice(results);
        Self { arr, len }
    }

    /// Borrows the envelopes.
    pub fn as_slice(&self) -> &[DbrArrayResult] {
        if self.arr.is_null() {
            return &[];
        }
        // Safety: a non-null array always comes from `from_vec`.
        unsafe { std::slice::from_raw_parts(self.arr, self.len) }
    }
}

impl Drop for DbrArrayResultArray {
    fn drop(&mut self) {
        // Safety: the pointer came from `from_vec`.
        unsafe { drop_raw_slice(self.arr, self.len) };
        self.arr = std::ptr::null_mut();
    }
}

/// Envelope holding a whole batch.
pub type DbrQueryResult = DbrResult<DbrArrayResultArray>;

/// Frees one statement envelope: its array on success, its message on error.
///
/// # Safety
///
/// The envelope must have been returned by DocBridge and not freed before.
#[no_mangle]
pub unsafe extern "C" fn dbr_free_arr_res(res: DbrArrayResult) {
    drop(res);
}

/// Frees a batch result given as pointer and length.
///
/// Walks every envelope and frees its payload or message.
///
/// # Safety
///
/// `ptr` and `len` must come from `dbr_query` and not have been freed.
#[no_mangle]
pub unsafe extern "C" fn dbr_free_arr_res_arr(ptr: *mut DbrArrayResult, len: usize) {
    drop_raw_slice(ptr, len);
}

/// Frees a batch result.
///
/// # Safety
///
/// The array must have been returned by DocBridge and not freed before.
#[no_mangle]
pub unsafe extern "C" fn dbr_free_arr_res_array(arr: DbrArrayResultArray) {
    drop(arr);
}

/// Frees a batch envelope returned by `dbr_query_result`.
///
/// # Safety
///
/// The envelope must not have been freed before.
#[no_mangle]
pub unsafe extern "C" fn dbr_free_query_result(res: DbrQueryResult) {
    drop(res);
}

/// Frees a string envelope.
///
/// # Safety
///
/// The envelope must not have been freed before.
#[no_mangle]
pub unsafe extern "C" fn dbr_free_string_result(res: DbrStringResult) {
    drop(res);
}

/// Frees a value envelope.
///
/// # Safety
///
/// The envelope must not have been freed before.
#[no_mangle]
pub unsafe extern "C" fn dbr_free_value_result(res: DbrValueResult) {
    drop(res);
}

/// Frees a bytes envelope returned by `dbr_rpc_execute_result`.
///
/// # Safety
///
/// The envelope must not have been freed before.
#[no_mangle]
pub unsafe extern "C" fn dbr_free_bytes_result(res: DbrBytesResult) {
    drop(res);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BoundaryError, DBR_ERROR, DBR_FATAL};

    #[test]
    fn value_shape_success() {
        let res = DbrStringResult::from(Ok(DbrString::new("1.0")));
        assert_eq!(res.err.code, 0);
        assert!(res.err.msg.is_null());
        assert_eq!(unsafe { res.ok.as_str() }, Some("1.0"));
        unsafe { dbr_free_string_result(res) };
    }

    #[test]
    fn value_shape_failure_has_no_payload() {
        let res = DbrArrayResult::from(Err(BoundaryError::recoverable("nope")));
        assert_eq!(res.err.code, DBR_ERROR);
        assert!(res.ok.arr.is_null());
        assert_eq!(unsafe { res.err.msg.as_str() }, Some("nope"));

        let res: DbrResult<*mut u8> = Err(BoundaryError::fatal("gone")).into();
        assert!(res.ok.is_null());
        assert_eq!(res.err.code, DBR_FATAL);
    }

    #[test]
    fn out_param_writes_only_on_success() {
        let mut out = DbrValue::Null;
        let status = unsafe { out_param(Ok((DbrValue::Bool(true), 1)), &mut out) };
        assert_eq!(status, 1);
        assert_eq!(out, DbrValue::Bool(true));

        let status = unsafe { out_param(Err(BoundaryError::recoverable("x")), &mut out) };
        assert_eq!(status, DBR_ERROR);
        assert_eq!(out, DbrValue::Bool(true));
    }

    #[test]
    fn batch_array_frees_every_slot() {
        let batch = DbrArrayResultArray::from_vec(vec![
            Ok(DbrArray::from_vec(vec![DbrValue::Null])).into(),
            Err(BoundaryError::recoverable("failed")).into(),
        ]);
        assert_eq!(batch.len, 2);
        assert_eq!(batch.as_slice()[1].err.code, DBR_ERROR);
        let batch = std::mem::ManuallyDrop::new(batch);
        unsafe { dbr_free_arr_res_arr(batch.arr, batch.len) };
    }
}
