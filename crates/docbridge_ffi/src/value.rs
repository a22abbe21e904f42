//! The boundary value representation and its codec.
//!
//! `DbrValue` is a `#[repr(C)]` tagged union mirroring the engine's value
//! model. Arrays, objects, strings and byte blobs own their children, so
//! dropping a `DbrValue` frees the whole tree exactly once.
//!
//! Encoding (`From<Value>`) is total. Decoding (`TryFrom<&DbrValue>`)
//! fails on payloads the boundary cannot read back, such as null
//! pointers or invalid UTF-8; those failures are fatal. A tree nested
//! deeper than `MAX_NESTING_DEPTH` is refused with a recoverable error.

use crate::array::DbrArray;
use crate::bytes::DbrBytes;
use crate::error::{BoundaryError, BoundaryResult};
use crate::object::{decode_object, DbrObject};
use crate::string::DbrString;
use docbridge_core::{Id, Number, Thing, Value, MAX_NESTING_DEPTH};
use std::ffi::c_char;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// A number, keeping integer and float apart.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub enum DbrNumber {
    /// Signed 64-bit integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
}

impl PartialEq for DbrNumber {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

/// A span of time.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbrDuration {
    /// Whole seconds.
    pub secs: u64,
    /// Nanoseconds past `secs`.
    pub nanos: u32,
}

/// A 128-bit UUID in big-endian byte order.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbrUuid(pub [u8; 16]);

impl From<Uuid> for DbrUuid {
    fn from(uuid: Uuid) -> Self {
        Self(*uuid.as_bytes())
    }
}

/// A record id.
#[repr(C)]
#[derive(Debug, PartialEq)]
pub enum DbrId {
    /// Integer id.
    Number(i64),
    /// String id.
    String(DbrString),
    /// Composite array id.
    Array(Box<DbrArray>),
    /// Composite object id.
    Object(DbrObject),
}

/// A record reference.
#[repr(C)]
#[derive(Debug, PartialEq)]
pub struct DbrThing {
    /// Table name.
    pub table: DbrString,
    /// Record id.
    pub id: DbrId,
}

/// A value crossing the boundary.
///
/// Read the tag before the payload. `None` (absent field) and `Null` are
/// different values.
#[repr(C)]
#[derive(Debug, PartialEq)]
pub enum DbrValue {
    /// Absent field.
    None,
    /// Explicit null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer or float.
    Number(DbrNumber),
    /// UTF-8 string.
    Strand(DbrString),
    /// Span of time.
    Duration(DbrDuration),
    /// RFC 3339 date-time string.
    Datetime(DbrString),
    /// UUID.
    Uuid(DbrUuid),
    /// Array of values.
    Array(Box<DbrArray>),
    /// Object.
    Object(DbrObject),
    /// Byte blob.
    Bytes(DbrBytes),
    /// Record reference.
    Thing(DbrThing),
}

fn encode_array(values: Vec<Value>) -> Box<DbrArray> {
    Box::new(DbrArray::from_vec(
        values.into_iter().map(DbrValue::from).collect(),
    ))
}

impl From<Id> for DbrId {
    fn from(id: Id) -> Self {
        match id {
            Id::Number(n) => DbrId::Number(n),
            Id::String(s) => DbrId::String(s.into()),
            Id::Array(a) => DbrId::Array(encode_array(a)),
            Id::Object(o) => DbrId::Object(o.into()),
        }
    }
}

impl From<Thing> for DbrThing {
    fn from(thing: Thing) -> Self {
        Self {
            table: thing.tb.into(),
            id: thing.id.into(),
        }
    }
}

impl From<Value> for DbrValue {
    fn from(value: Value) -> Self {
        match value {
            Value::None => DbrValue::None,
            Value::Null => DbrValue::Null,
            Value::Bool(b) => DbrValue::Bool(b),
            Value::Number(Number::Int(i)) => DbrValue::Number(DbrNumber::Int(i)),
            Value::Number(Number::Float(f)) => DbrValue::Number(DbrNumber::Float(f)),
            Value::Strand(s) => DbrValue::Strand(s.into()),
            Value::Duration(d) => DbrValue::Duration(DbrDuration {
                secs: d.as_secs(),
                nanos: d.subsec_nanos(),
            }),
            Value::Datetime(s) => DbrValue::Datetime(s.into()),
            Value::Uuid(u) => DbrValue::Uuid(u.into()),
            Value::Array(a) => DbrValue::Array(encode_array(a)),
            Value::Object(o) => DbrValue::Object(o.into()),
            Value::Bytes(b) => DbrValue::Bytes(DbrBytes::from_vec(b)),
            Value::Thing(t) => DbrValue::Thing(t.into()),
        }
    }
}

pub(crate) fn decode_str(s: &DbrString, what: &str) -> BoundaryResult<String> {
    // Safety: strings reachable from a value are owned by that value.
    unsafe { s.as_str() }
        .map(str::to_string)
        .ok_or_else(|| BoundaryError::fatal(format!("cannot decode {what}: null or invalid UTF-8")))
}

fn decode_array(array: &DbrArray, depth: usize) -> BoundaryResult<Vec<Value>> {
    array
        .as_slice()
        .iter()
        .map(|v| decode_value(v, depth))
        .collect()
}

/// Fails once a caller-built tree nests deeper than the engine accepts.
pub(crate) fn descend(depth: usize) -> BoundaryResult<usize> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(BoundaryError::recoverable("value nesting too deep"));
    }
    Ok(depth + 1)
}

pub(crate) fn decode_id(id: &DbrId, depth: usize) -> BoundaryResult<Id> {
    Ok(match id {
        DbrId::Number(n) => Id::Number(*n),
        DbrId::String(s) => Id::String(decode_str(s, "record id")?),
        DbrId::Array(a) => Id::Array(decode_array(a, descend(depth)?)?),
        DbrId::Object(o) => Id::Object(decode_object(o, descend(depth)?)?),
    })
}

pub(crate) fn decode_value(value: &DbrValue, depth: usize) -> BoundaryResult<Value> {
    Ok(match value {
        DbrValue::None => Value::None,
        DbrValue::Null => Value::Null,
        DbrValue::Bool(b) => Value::Bool(*b),
        DbrValue::Number(DbrNumber::Int(i)) => Value::from(*i),
        DbrValue::Number(DbrNumber::Float(f)) => Value::from(*f),
        DbrValue::Strand(s) => Value::Strand(decode_str(s, "string")?),
        DbrValue::Duration(d) => Value::Duration(
            Duration::from_secs(d.secs)
                .checked_add(Duration::from_nanos(u64::from(d.nanos)))
                .ok_or_else(|| BoundaryError::fatal("cannot decode duration: overflow"))?,
        ),
        DbrValue::Datetime(s) => Value::Datetime(decode_str(s, "datetime")?),
        DbrValue::Uuid(u) => Value::Uuid(Uuid::from_bytes(u.0)),
        DbrValue::Array(a) => Value::Array(decode_array(a, descend(depth)?)?),
        DbrValue::Object(o) => Value::Object(decode_object(o, descend(depth)?)?),
        // Safety: the buffer is owned by this value.
        DbrValue::Bytes(b) => Value::Bytes(unsafe { b.as_slice() }.to_vec()),
        DbrValue::Thing(t) => Value::Thing(Thing::new(
            decode_str(&t.table, "table name")?,
            decode_id(&t.id, descend(depth)?)?,
        )),
    })
}

impl TryFrom<&DbrId> for Id {
    type Error = BoundaryError;

    fn try_from(id: &DbrId) -> BoundaryResult<Self> {
        decode_id(id, 0)
    }
}

impl TryFrom<&DbrValue> for Value {
    type Error = BoundaryError;

    fn try_from(value: &DbrValue) -> BoundaryResult<Self> {
        decode_value(value, 0)
    }
}

impl fmt::Display for DbrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Value::try_from(self) {
            Ok(value) => write!(f, "{value}"),
            Err(err) => write!(f, "<{err}>"),
        }
    }
}

/// Renders a value, or `(null)` for a null pointer.
///
/// # Safety
///
/// `val` must be null or point to a live value.
pub(crate) unsafe fn render(val: *const DbrValue) -> String {
    match val.as_ref() {
        Some(val) => val.to_string(),
        None => "(null)".to_string(),
    }
}

/// Prints a value to standard output.
///
/// # Safety
///
/// `val` must be null or point to a live value.
#[no_mangle]
pub unsafe extern "C" fn dbr_value_print(val: *const DbrValue) {
    println!("{}", render(val));
}

/// Renders a value into an owned string.
///
/// Free the result with `dbr_free_string`.
///
/// # Safety
///
/// `val` must be null or point to a live value.
#[no_mangle]
pub unsafe extern "C" fn dbr_value_to_string(val: *const DbrValue) -> DbrString {
    DbrString::new(&render(val))
}

/// Compares two values structurally.
///
/// Integer and float numbers are never equal to each other; floats
/// compare by bit pattern. Two null pointers compare equal.
///
/// # Safety
///
/// Each pointer must be null or point to a live value.
#[no_mangle]
pub unsafe extern "C" fn dbr_value_eq(a: *const DbrValue, b: *const DbrValue) -> bool {
    a.as_ref() == b.as_ref()
}

/// Frees a value and everything it owns.
///
/// # Safety
///
/// The value must have been returned by DocBridge and not freed before.
#[no_mangle]
pub unsafe extern "C" fn dbr_free_value(val: DbrValue) {
    drop(val);
}

/// Returns the value's tag name, for diagnostics.
///
/// The returned pointer is static and must not be freed. A null `val`
/// yields an empty string.
///
/// # Safety
///
/// `val` must be null or point to a live value.
#[no_mangle]
pub unsafe extern "C" fn dbr_value_kind(val: *const DbrValue) -> *const c_char {
    let kind: &'static [u8] = match val.as_ref() {
        None => b"\0",
        Some(DbrValue::None) => b"none\0",
        Some(DbrValue::Null) => b"null\0",
        Some(DbrValue::Bool(_)) => b"bool\0",
        Some(DbrValue::Number(DbrNumber::Int(_))) => b"int\0",
        Some(DbrValue::Number(DbrNumber::Float(_))) => b"float\0",
        Some(DbrValue::Strand(_)) => b"string\0",
        Some(DbrValue::Duration(_)) => b"duration\0",
        Some(DbrValue::Datetime(_)) => b"datetime\0",
        Some(DbrValue::Uuid(_)) => b"uuid\0",
        Some(DbrValue::Array(_)) => b"array\0",
        Some(DbrValue::Object(_)) => b"object\0",
        Some(DbrValue::Bytes(_)) => b"bytes\0",
        Some(DbrValue::Thing(_)) => b"record\0",
    };
    kind.as_ptr().cast::<c_char>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbridge_core::Object;
    use proptest::prelude::*;
    use std::ffi::CStr;

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::None),
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            any::<f64>().prop_map(Value::from),
            ".*".prop_map(Value::Strand),
            (any::<u64>(), 0u32..1_000_000_000)
                .prop_map(|(s, n)| Value::Duration(Duration::new(s, n))),
            "[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:00:00Z".prop_map(Value::Datetime),
            any::<[u8; 16]>().prop_map(|b| Value::Uuid(Uuid::from_bytes(b))),
            proptest::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
            ("[a-z]{1,8}", any::<i64>())
                .prop_map(|(tb, n)| Value::Thing(Thing::new(tb, Id::Number(n)))),
            ("[a-z]{1,8}", "[a-z0-9]{1,8}")
                .prop_map(|(tb, s)| Value::Thing(Thing::new(tb, Id::String(s)))),
        ];
        leaf.prop_recursive(5, 96, 6, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                proptest::collection::btree_map("[a-z ]{0,6}", inner.clone(), 0..6)
                    .prop_map(|m| Value::Object(Object::from(m))),
                ("[a-z]{1,8}", proptest::collection::vec(inner.clone(), 0..3))
                    .prop_map(|(tb, a)| Value::Thing(Thing::new(tb, Id::Array(a)))),
                ("[a-z]{1,8}", proptest::collection::btree_map("[a-z]{1,4}", inner, 0..3))
                    .prop_map(|(tb, m)| {
                        Value::Thing(Thing::new(tb, Id::Object(Object::from(m))))
                    }),
            ]
        })
    }

    proptest! {
        #[test]
        fn encode_decode_round_trip(value in arb_value()) {
            let encoded = DbrValue::from(value.clone());
            let decoded = Value::try_from(&encoded).unwrap();
            prop_assert_eq!(DbrValue::from(decoded), encoded);
        }

        #[test]
        fn equality_is_reflexive_across_encodings(value in arb_value()) {
            let a = DbrValue::from(value.clone());
            let b = DbrValue::from(value);
            let eq = unsafe { dbr_value_eq(&a, &b) };
            prop_assert!(eq);
        }
    }

    fn nest(depth: usize) -> Value {
        let mut value = Value::from("leaf");
        for level in 0..depth {
            if level % 2 == 0 {
                value = Value::Array(vec![value, Value::Null]);
            } else {
                let mut obj = Object::new();
                obj.insert(format!("k{level}"), value);
                value = Value::Object(obj);
            }
        }
        value
    }

    #[test]
    fn deep_nesting_round_trips() {
        let value = nest(12);
        let encoded = DbrValue::from(value.clone());
        assert_eq!(Value::try_from(&encoded).unwrap(), value);
    }

    #[test]
    fn nesting_past_the_limit_is_recoverable() {
        let mut value = DbrValue::Null;
        for _ in 0..1000 {
            let mut obj = DbrObject::new();
            obj.insert("k", value);
            value = DbrValue::Object(obj);
        }
        let err = Value::try_from(&value).unwrap_err();
        assert!(!err.is_fatal());
        assert_eq!(err.message, "value nesting too deep");

        let at_limit = nest(MAX_NESTING_DEPTH);
        let encoded = DbrValue::from(at_limit.clone());
        assert_eq!(Value::try_from(&encoded).unwrap(), at_limit);
        let past = DbrValue::from(nest(MAX_NESTING_DEPTH + 1));
        assert!(Value::try_from(&past).is_err());
    }

    #[test]
    fn int_and_float_are_not_equal() {
        let int = DbrValue::from(Value::from(23i64));
        let float = DbrValue::from(Value::from(23.0f64));
        assert!(matches!(int, DbrValue::Number(DbrNumber::Int(23))));
        assert!(matches!(float, DbrValue::Number(DbrNumber::Float(_))));
        assert!(!unsafe { dbr_value_eq(&int, &float) });
        assert!(unsafe { dbr_value_eq(&int, &DbrValue::Number(DbrNumber::Int(23))) });
    }

    #[test]
    fn none_and_null_are_not_equal() {
        assert_ne!(DbrValue::None, DbrValue::Null);
        assert!(unsafe { dbr_value_eq(std::ptr::null(), std::ptr::null()) });
        assert!(!unsafe { dbr_value_eq(&DbrValue::None, std::ptr::null()) });
    }

    #[test]
    fn nan_equals_itself_by_bits() {
        let a = DbrValue::Number(DbrNumber::Float(f64::NAN));
        let b = DbrValue::Number(DbrNumber::Float(f64::NAN));
        assert_eq!(a, b);
    }

    #[test]
    fn render_value() {
        let mut obj = Object::new();
        obj.insert("val", Value::from(42i64));
        obj.insert("id", Value::Thing(Thing::new("foo", Id::Number(1))));
        let value = DbrValue::from(Value::Object(obj));
        let s = unsafe { dbr_value_to_string(&value) };
        assert_eq!(unsafe { s.as_str() }, Some("{ id: foo:1, val: 42 }"));
    }

    #[test]
    fn decode_rejects_null_string() {
        let value = DbrValue::Strand(DbrString::null());
        let err = Value::try_from(&value).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn kind_names() {
        let value = DbrValue::from(Value::from(1.5f64));
        let kind = unsafe { CStr::from_ptr(dbr_value_kind(&value)) };
        assert_eq!(kind.to_str().unwrap(), "float");
    }
}
