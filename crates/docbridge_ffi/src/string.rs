//! Owned strings crossing the boundary.

use crate::error::{BoundaryError, BoundaryResult};
use std::ffi::{c_char, CStr};

/// A UTF-8 string for FFI.
///
/// Null-terminated, with the length (not including the terminator) kept
/// alongside so strings with interior NUL bytes survive the trip.
/// Memory is owned by Rust. Call `dbr_free_string` to release.
#[repr(C)]
#[derive(Debug)]
pub struct DbrString {
    /// Pointer to null-terminated string.
    pub ptr: *mut c_char,
    /// Length in bytes (not including null terminator).
    pub len: usize,
}

impl DbrString {
    /// Creates an FFI string from a Rust string.
    pub fn new(s: &str) -> Self {
        let mut bytes = Vec::with_capacity(s.len() + 1);
        bytes.extend_from_slice(s.as_bytes());
        bytes.push(0);
        let len = s.len();
        let ptr = Box::into_raw(bytes.into_boxed_slice()).cast::<c_char>();
        Self { ptr, len }
    }

    /// Creates a null string.
    pub fn null() -> Self {
        Self {
            ptr: std::ptr::null_mut(),
            len: 0,
        }
    }

    /// Returns true if the string is null.
    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    /// Converts to a Rust string slice.
    ///
    /// Returns None for a null string or invalid UTF-8.
    ///
    /// # Safety
    ///
    /// A non-null pointer must point to `len` readable bytes.
    pub unsafe fn as_str(&self) -> Option<&str> {
        if self.ptr.is_null() {
            return None;
        }
        let bytes = std::slice::from_raw_parts(self.ptr.cast::<u8>(), self.len);
        std::str::from_utf8(bytes).ok()
    }
}

impl From<&str> for DbrString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for DbrString {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

impl PartialEq for DbrString {
    fn eq(&self, other: &Self) -> bool {
        match (self.ptr.is_null(), other.ptr.is_null()) {
            (true, true) => true,
            (false, false) => {
                // Safety: both are live strings owned by their holders.
                let a = unsafe { std::slice::from_raw_parts(self.ptr.cast::<u8>(), self.len) };
                let b = unsafe { std::slice::from_raw_parts(other.ptr.cast::<u8>(), other.len) };
                a == b
            }
            _ => false,
        }
    }
}

impl Drop for DbrString {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            // Safety: allocated in `new` as a boxed slice of len + 1 bytes.
            unsafe {
                drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                    self.ptr.cast::<u8>(),
                    self.len + 1,
                )));
            }
            self.ptr = std::ptr::null_mut();
        }
    }
}

/// Reads a null-terminated UTF-8 argument.
///
/// # Safety
///
/// `ptr` must be null or point to a null-terminated string.
pub(crate) unsafe fn str_arg<'a>(ptr: *const c_char, name: &str) -> BoundaryResult<&'a str> {
    if ptr.is_null() {
        return Err(BoundaryError::null_argument(name));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| BoundaryError::recoverable(format!("invalid UTF-8 in {name}")))
}

/// Frees a string allocated by DocBridge.
///
/// # Safety
///
/// The string must have been allocated by DocBridge FFI functions and
/// not freed before.
#[no_mangle]
pub unsafe extern "C" fn dbr_free_string(string: DbrString) {
    drop(string);
}
