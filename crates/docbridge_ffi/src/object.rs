//! Object accessor.
//!
//! An object is an ordered string-keyed map behind an opaque pointer.
//! Callers build parameter objects with the typed insert functions and
//! read result objects with point lookup. Inserting an existing key
//! replaces the old value, which is freed.

use crate::array::DbrArray;
use crate::bytes::DbrBytes;
use crate::error::{BoundaryError, BoundaryResult, DBR_ERROR};
use crate::string::{str_arg, DbrString};
use crate::value::{decode_value, DbrNumber, DbrValue};
use docbridge_core::Object;
use std::collections::BTreeMap;
use std::ffi::{c_char, c_int};

/// An owned object.
///
/// Layout is a single pointer. Call `dbr_free_object` to release.
#[repr(transparent)]
#[derive(Debug, Default, PartialEq)]
pub struct DbrObject(Box<BTreeMap<String, DbrValue>>);

impl DbrObject {
    /// Creates an empty object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a field.
    pub fn get(&self, key: &str) -> Option<&DbrValue> {
        self.0.get(key)
    }

    /// Inserts a field, returning the displaced value.
    pub fn insert(&mut self, key: impl Into<String>, value: DbrValue) -> Option<DbrValue> {
        self.0.insert(key.into(), value)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the object has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }
}

impl From<Object> for DbrObject {
    fn from(obj: Object) -> Self {
        Self(Box::new(
            obj.0.into_iter().map(|(k, v)| (k, DbrValue::from(v))).collect(),
        ))
    }
}

pub(crate) fn decode_object(obj: &DbrObject, depth: usize) -> BoundaryResult<Object> {
    obj.0
        .iter()
        .map(|(k, v)| Ok((k.clone(), decode_value(v, depth)?)))
        .collect()
}

impl TryFrom<&DbrObject> for Object {
    type Error = BoundaryError;

    fn try_from(obj: &DbrObject) -> BoundaryResult<Self> {
        decode_object(obj, 1)
    }
}

/// Runs an insert against a caller-held object.
///
/// # Safety
///
/// `obj` must be null or point to a live object; `key` must be null or a
/// null-terminated string.
unsafe fn insert_with(obj: *mut DbrObject, key: *const c_char, value: DbrValue) -> c_int {
    let Some(obj) = obj.as_mut() else {
        return DBR_ERROR;
    };
    match str_arg(key, "key") {
        Ok(key) => {
            obj.insert(key, value);
            0
        }
        Err(_) => DBR_ERROR,
    }
}

/// Creates an empty object.
///
/// Free with `dbr_free_object`, or hand it to `dbr_object_insert_object`.
#[no_mangle]
pub extern "C" fn dbr_object_new() -> DbrObject {
    DbrObject::new()
}

/// Looks up a field by key.
///
/// Returns a pointer borrowed from `obj`, valid until the object is
/// modified or freed, or null if the key is not present.
///
/// # Safety
///
/// - `obj` must be null or point to a live object
/// - `key` must be null or a null-terminated UTF-8 string
#[no_mangle]
pub unsafe extern "C" fn dbr_object_get(obj: *const DbrObject, key: *const c_char) -> *const DbrValue {
    let Some(obj) = obj.as_ref() else {
        return std::ptr::null();
    };
    let Ok(key) = str_arg(key, "key") else {
        return std::ptr::null();
    };
    obj.get(key).map_or(std::ptr::null(), std::ptr::from_ref)
}

/// Returns the number of fields, or 0 for a null object.
///
/// # Safety
///
/// `obj` must be null or point to a live object.
#[no_mangle]
pub unsafe extern "C" fn dbr_object_len(obj: *const DbrObject) -> usize {
    obj.as_ref().map_or(0, DbrObject::len)
}

/// Returns the object's keys, in order, as an array of strings.
///
/// Free the result with `dbr_free_array`.
///
/// # Safety
///
/// `obj` must be null or point to a live object.
#[no_mangle]
pub unsafe extern "C" fn dbr_object_keys(obj: *const DbrObject) -> DbrArray {
    let keys = obj.as_ref().map_or_else(Vec::new, |obj| {
        obj.keys()
            .map(|k| DbrValue::Strand(DbrString::new(k)))
            .collect()
    });
    DbrArray::from_vec(keys)
}

/// Inserts a value, taking ownership of it.
///
/// Returns 0 on success or `DBR_ERROR` for a null object or invalid key,
/// in which case the value is freed.
///
/// # Safety
///
/// - `obj` must be null or point to a live object
/// - `key` must be null or a null-terminated string
#[no_mangle]
pub unsafe extern "C" fn dbr_object_insert(
    obj: *mut DbrObject,
    key: *const c_char,
    value: DbrValue,
) -> c_int {
    insert_with(obj, key, value)
}

/// Inserts an integer.
///
/// # Safety
///
/// See `dbr_object_insert`.
#[no_mangle]
pub unsafe extern "C" fn dbr_object_insert_int(
    obj: *mut DbrObject,
    key: *const c_char,
    value: i64,
) -> c_int {
    insert_with(obj, key, DbrValue::Number(DbrNumber::Int(value)))
}

/// Inserts a float.
///
/// # Safety
///
/// See `dbr_object_insert`.
#[no_mangle]
pub unsafe extern "C" fn dbr_object_insert_float(
    obj: *mut DbrObject,
    key: *const c_char,
    value: f64,
) -> c_int {
    insert_with(obj, key, DbrValue::Number(DbrNumber::Float(value)))
}

/// Inserts a string, copying it.
///
/// # Safety
///
/// See `dbr_object_insert`; `value` must be null or a null-terminated string.
#[no_mangle]
pub unsafe extern "C" fn dbr_object_insert_str(
    obj: *mut DbrObject,
    key: *const c_char,
    value: *const c_char,
) -> c_int {
    match str_arg(value, "value") {
        Ok(value) => insert_with(obj, key, DbrValue::Strand(DbrString::new(value))),
        Err(_) => DBR_ERROR,
    }
}

/// Inserts a boolean.
///
/// # Safety
///
/// See `dbr_object_insert`.
#[no_mangle]
pub unsafe extern "C" fn dbr_object_insert_bool(
    obj: *mut DbrObject,
    key: *const c_char,
    value: bool,
) -> c_int {
    insert_with(obj, key, DbrValue::Bool(value))
}

/// Inserts an explicit null.
///
/// # Safety
///
/// See `dbr_object_insert`.
#[no_mangle]
pub unsafe extern "C" fn dbr_object_insert_null(obj: *mut DbrObject, key: *const c_char) -> c_int {
    insert_with(obj, key, DbrValue::Null)
}

/// Inserts a nested object, taking ownership of it.
///
/// # Safety
///
/// See `dbr_object_insert`; `value` must not be used after this call.
#[no_mangle]
pub unsafe extern "C" fn dbr_object_insert_object(
    obj: *mut DbrObject,
    key: *const c_char,
    value: DbrObject,
) -> c_int {
    insert_with(obj, key, DbrValue::Object(value))
}

/// Inserts a byte blob, copying it.
///
/// # Safety
///
/// See `dbr_object_insert`; `data` must point to `len` readable bytes, or be
/// null with `len == 0`.
#[no_mangle]
pub unsafe extern "C" fn dbr_object_insert_bytes(
    obj: *mut DbrObject,
    key: *const c_char,
    data: *const u8,
    len: usize,
) -> c_int {
    let bytes = if data.is_null() {
        if len != 0 {
            return DBR_ERROR;
        }
        Vec::new()
    } else {
        std::slice::from_raw_parts(data, len).to_vec()
    };
    insert_with(obj, key, DbrValue::Bytes(DbrBytes::from_vec(bytes)))
}

/// Frees an object and everything it owns.
///
/// # Safety
///
/// The object must have been returned by DocBridge and not freed before.
#[no_mangle]
pub unsafe extern "C" fn dbr_free_object(obj: DbrObject) {
    drop(obj);
}
