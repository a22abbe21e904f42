//! Byte blobs crossing the boundary.

/// A byte buffer for FFI.
///
/// Memory is owned by Rust. Call `dbr_free_bytes` to release.
#[repr(C)]
#[derive(Debug)]
pub struct DbrBytes {
    /// Pointer to data.
    pub data: *mut u8,
    /// Length in bytes.
    pub len: usize,
}

impl DbrBytes {
    /// Creates a buffer from a Vec.
    pub fn from_vec(vec: Vec<u8>) -> Self {
        let len = vec.len();
        let data = Box::into_raw(vec.into_boxed_slice()).cast::<u8>();
        Self { data, len }
    }

    /// Returns true if the buffer is null.
    pub fn is_null(&self) -> bool {
        self.data.is_null()
    }

    /// Borrows the contents.
    ///
    /// # Safety
    ///
    /// A non-null pointer must point to `len` readable bytes.
    pub unsafe fn as_slice(&self) -> &[u8] {
        if self.data.is_null() {
            return &[];
        }
        std::slice::from_raw_parts(self.data, self.len)
    }
}

impl PartialEq for DbrBytes {
    fn eq(&self, other: &Self) -> bool {
        // Safety: both buffers are owned by their holders.
        unsafe { self.as_slice() == other.as_slice() }
    }
}

impl Drop for DbrBytes {
    fn drop(&mut self) {
        if !self.data.is_null() {
            // Safety: allocated in `from_vec` as a boxed slice.
            unsafe {
                drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                    self.data, self.len,
                )));
            }
            self.data = std::ptr::null_mut();
        }
    }
}

/// Frees a byte buffer allocated by DocBridge.
///
/// # Safety
///
/// The buffer must have been allocated by DocBridge FFI functions and
/// not freed before.
#[no_mangle]
pub unsafe extern "C" fn dbr_free_bytes(bytes: DbrBytes) {
    drop(bytes);
}
