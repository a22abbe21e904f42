//! Value arrays crossing the boundary.

use crate::value::DbrValue;

/// Leaks a Vec as a pointer and length, to be reclaimed by `drop_raw_slice`.
pub(crate) fn into_raw_slice<T>(vec: Vec<T>) -> (*mut T, usize) {
    let len = vec.len();
    (Box::into_raw(vec.into_boxed_slice()).cast::<T>(), len)
}

/// Reclaims and drops a slice leaked by `into_raw_slice`.
///
/// # Safety
///
/// `ptr` and `len` must come from `into_raw_slice` and not have been
/// reclaimed before. A null `ptr` is ignored.
pub(crate) unsafe fn drop_raw_slice<T>(ptr: *mut T, len: usize) {
    if !ptr.is_null() {
        drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(ptr, len)));
    }
}

/// An owned array of values.
///
/// Call `dbr_free_array` to release, which frees every element.
#[repr(C)]
#[derive(Debug)]
pub struct DbrArray {
    /// Pointer to the first element.
    pub arr: *mut DbrValue,
    /// Number of elements.
    pub len: usize,
}

impl DbrArray {
    /// Creates an array from a Vec.
    pub fn from_vec(values: Vec<DbrValue>) -> Self {
        let (arr, len) = into_raw_slice(values);
        Self { arr, len }
    }

    /// Creates a null array, used where no payload is present.
    pub fn null() -> Self {
        Self {
            arr: std::ptr::null_mut(),
            len: 0,
        }
    }

    /// Borrows the elements.
    pub fn as_slice(&self) -> &[DbrValue] {
        if self.arr.is_null() {
            return &[];
        }
        // Safety: a non-null array always comes from `from_vec`.
        unsafe { std::slice::from_raw_parts(self.arr, self.len) }
    }
}

impl PartialEq for DbrArray {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Drop for DbrArray {
    fn drop(&mut self) {
        // Safety: the pointer came from `from_vec`.
        unsafe { drop_raw_slice(self.arr, self.len) };
        self.arr = std::ptr::null_mut();
    }
}

/// Frees an array of values given as pointer and length.
///
/// # Safety
///
/// `ptr` and `len` must be the `arr` and `len` of a `DbrArray` returned by
/// DocBridge, and the array must not be freed again.
#[no_mangle]
pub unsafe extern "C" fn dbr_free_arr(ptr: *mut DbrValue, len: usize) {
    drop_raw_slice(ptr, len);
}

/// Frees an array of values.
///
/// # Safety
///
/// The array must have been returned by DocBridge and not freed before.
#[no_mangle]
pub unsafe extern "C" fn dbr_free_array(array: DbrArray) {
    drop(array);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::DbrNumber;

    #[test]
    fn array_from_vec() {
        let array = DbrArray::from_vec(vec![
            DbrValue::Bool(true),
            DbrValue::Number(DbrNumber::Int(3)),
        ]);
        assert_eq!(array.len, 2);
        assert_eq!(array.as_slice()[0], DbrValue::Bool(true));
        unsafe { dbr_free_array(array) };
    }

    #[test]
    fn free_by_parts() {
        let array = DbrArray::from_vec(vec![DbrValue::Null, DbrValue::None]);
        let array = std::mem::ManuallyDrop::new(array);
        unsafe { dbr_free_arr(array.arr, array.len) };
    }

    #[test]
    fn null_array_is_empty() {
        assert!(DbrArray::null().as_slice().is_empty());
    }
}
