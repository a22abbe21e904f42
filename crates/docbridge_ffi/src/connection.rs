//! Connection handles and the operations issued through them.
//!
//! A [`Connection`] is one handle: a reference to the shared connection
//! plus a private error slot. Copies made with `dbr_handle_clone` share the
//! engine and the selected namespace/database but never the error slot.
//! `Connection` is `Send` but not `Sync`, so a single handle cannot be
//! shared between threads from safe code.
//!
//! Every operation runs through [`Connection::call`], which refuses to run
//! on a poisoned connection, turns panics into fatal errors, and records
//! failures in the error slot. Any fatal error poisons the shared
//! connection for every handle.

use crate::array::{drop_raw_slice, into_raw_slice, DbrArray};
use crate::error::{BoundaryError, BoundaryResult, DbrError, DBR_ERROR, DBR_NONE};
use crate::object::DbrObject;
use crate::result::{
    out_param, DbrArrayResult, DbrArrayResultArray, DbrQueryResult, DbrResult, DbrStringResult,
    DbrValueResult,
};
use crate::stream::Stream;
use crate::string::{str_arg, DbrString};
use crate::types::{DbrHandle, DbrOptions, DbrStream};
use crate::value::DbrValue;
use docbridge_core::{Config, Engine, Object, Session, Value, Vars};
use parking_lot::RwLock;
use std::any::Any;
use std::cell::RefCell;
use std::ffi::{c_char, c_int};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// State shared by every handle of one connection.
struct Shared {
    engine: Arc<dyn Engine>,
    session: RwLock<Session>,
    poisoned: AtomicBool,
}

/// One handle to a shared connection.
pub struct Connection {
    shared: Arc<Shared>,
    last_error: RefCell<Option<BoundaryError>>,
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Unpacks a statement result into the rows of its result slot.
fn into_rows(value: Value) -> Vec<Value> {
    match value {
        Value::Array(rows) => rows,
        other => vec![other],
    }
}

fn encode_rows(rows: Vec<Value>) -> DbrArray {
    DbrArray::from_vec(rows.into_iter().map(DbrValue::from).collect())
}

impl Connection {
    /// Connects to an endpoint.
    pub fn connect(endpoint: &str, config: Config) -> BoundaryResult<Self> {
        let engine = docbridge_core::connect(endpoint, config)?;
        tracing::debug!(endpoint, "connected");
        Ok(Self::with_engine(engine))
    }

    /// Wraps an already-open engine.
    pub fn with_engine(engine: Arc<dyn Engine>) -> Self {
        Self {
            shared: Arc::new(Shared {
                engine,
                session: RwLock::new(Session::default()),
                poisoned: AtomicBool::new(false),
            }),
            last_error: RefCell::new(None),
        }
    }

    /// Drains this handle's error slot.
    pub fn take_error(&self) -> Option<BoundaryError> {
        self.last_error.borrow_mut().take()
    }

    /// Returns true once a fatal error has been seen on any handle.
    pub fn is_poisoned(&self) -> bool {
        self.shared.poisoned.load(Ordering::Acquire)
    }

    /// Number of handles sharing this connection.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.shared)
    }

    /// Records an error raised before an operation could start.
    fn check<T>(&self, result: BoundaryResult<T>) -> BoundaryResult<T> {
        if let Err(err) = &result {
            *self.last_error.borrow_mut() = Some(err.clone());
        }
        result
    }

    fn call<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&Shared) -> BoundaryResult<T>,
    ) -> BoundaryResult<T> {
        *self.last_error.borrow_mut() = None;
        let result = if self.is_poisoned() {
            Err(BoundaryError::fatal("connection is poisoned"))
        } else {
            panic::catch_unwind(AssertUnwindSafe(|| f(&self.shared))).unwrap_or_else(|payload| {
                Err(BoundaryError::fatal(format!(
                    "panic during {op}: {}",
                    panic_message(payload.as_ref())
                )))
            })
        };
        if let Err(err) = &result {
            if err.is_fatal() && !self.shared.poisoned.swap(true, Ordering::AcqRel) {
                tracing::warn!(op, error = %err, "connection poisoned");
            }
            *self.last_error.borrow_mut() = Some(err.clone());
        }
        result
    }

    /// Switches the namespace for every handle of this connection.
    pub fn use_ns(&self, ns: &str) -> BoundaryResult<()> {
        self.call("use_ns", |shared| {
            let mut session = shared.session.write();
            Ok(shared.engine.use_ns(&mut session, ns)?)
        })
    }

    /// Switches the database for every handle of this connection.
    pub fn use_db(&self, db: &str) -> BoundaryResult<()> {
        self.call("use_db", |shared| {
            let mut session = shared.session.write();
            Ok(shared.engine.use_db(&mut session, db)?)
        })
    }

    /// Engine version string.
    pub fn version(&self) -> BoundaryResult<String> {
        self.call("version", |shared| Ok(shared.engine.version()))
    }

    /// Runs a batch of statements.
    ///
    /// The outer error is a whole-call failure. Each inner result is one
    /// statement's slot, in submission order.
    pub fn query(
        &self,
        text: &str,
        vars: Option<&DbrObject>,
    ) -> BoundaryResult<Vec<BoundaryResult<Vec<Value>>>> {
        self.call("query", |shared| {
            let vars: Vars = match vars {
                Some(obj) => Object::try_from(obj)?.0,
                None => Vars::new(),
            };
            let before = shared.session.read().clone();
            let mut session = before.clone();
            let results = shared.engine.execute(&mut session, text, &vars)?;
            if session != before {
                shared.session.write().apply_changes(&before, &session);
            }
            Ok(results
                .into_iter()
                .map(|r| r.map(into_rows).map_err(BoundaryError::from))
                .collect())
        })
    }

    /// Reads a table or record.
    pub fn select(&self, resource: &str) -> BoundaryResult<Vec<Value>> {
        self.call("select", |shared| {
            let session = shared.session.read().clone();
            Ok(into_rows(shared.engine.select(&session, resource)?))
        })
    }

    /// Creates a record from an object.
    pub fn create(&self, resource: &str, content: &DbrObject) -> BoundaryResult<Value> {
        self.call("create", |shared| {
            let content = Object::try_from(content)?;
            let session = shared.session.read().clone();
            Ok(shared.engine.create(&session, resource, content)?)
        })
    }

    /// Opens a live query on a table or record.
    pub fn live(&self, resource: &str) -> BoundaryResult<Stream> {
        self.call("live", |shared| {
            let session = shared.session.read().clone();
            let subscription = shared.engine.live(&session, resource)?;
            tracing::debug!(id = %subscription.id(), resource, "stream opened");
            Ok(Stream::new(subscription))
        })
    }

    /// Moves the handle behind an opaque pointer.
    pub fn into_raw(self) -> *mut DbrHandle {
        Box::into_raw(Box::new(self)).cast::<DbrHandle>()
    }
}

impl Clone for Connection {
    /// Returns a new handle to the same connection with an empty error slot.
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            last_error: RefCell::new(None),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        tracing::debug!(
            remaining = Arc::strong_count(&self.shared) - 1,
            "handle disconnected"
        );
    }
}

/// Borrows the connection behind a handle pointer.
///
/// # Safety
///
/// `handle` must be null or a live handle not in use on another thread.
unsafe fn handle_ref<'a>(handle: *const DbrHandle) -> BoundaryResult<&'a Connection> {
    handle
        .cast::<Connection>()
        .as_ref()
        .ok_or_else(|| BoundaryError::null_argument("handle"))
}

/// Collapses a result to a status code, writing nothing.
fn status(result: BoundaryResult<c_int>) -> c_int {
    result.unwrap_or_else(|err| err.code())
}

unsafe fn connect_with(
    endpoint: *const c_char,
    options: *const DbrOptions,
) -> BoundaryResult<*mut DbrHandle> {
    let endpoint = str_arg(endpoint, "endpoint")?;
    let options = options.as_ref().copied().unwrap_or_default();
    let result = Connection::connect(endpoint, options.into());
    if let Err(err) = &result {
        tracing::warn!(endpoint, error = %err, "connect failed");
    }
    result.map(Connection::into_raw)
}

unsafe fn connect_out(
    err_out: *mut DbrString,
    handle_out: *mut *mut DbrHandle,
    endpoint: *const c_char,
    options: *const DbrOptions,
) -> c_int {
    let result = if handle_out.is_null() {
        Err(BoundaryError::null_argument("handle_out"))
    } else {
        connect_with(endpoint, options)
    };
    match result {
        Ok(handle) => {
            handle_out.write(handle);
            0
        }
        Err(err) => {
            let code = err.code();
            if !err_out.is_null() {
                err_out.write(DbrString::from(err.message));
            }
            code
        }
    }
}

/// Connects to an endpoint.
///
/// `memory` and `mem://...` open an in-memory datastore. On success writes
/// the handle to `handle_out` and returns 0. On failure returns `DBR_ERROR`
/// or `DBR_FATAL` and, if `err_out` is not null, writes the message there
/// (free with `dbr_free_string`).
///
/// # Safety
///
/// - `err_out` must be null or valid for writes
/// - `handle_out` must be valid for writes
/// - `endpoint` must be a null-terminated UTF-8 string
#[no_mangle]
pub unsafe extern "C" fn dbr_connect(
    err_out: *mut DbrString,
    handle_out: *mut *mut DbrHandle,
    endpoint: *const c_char,
) -> c_int {
    connect_out(err_out, handle_out, endpoint, std::ptr::null())
}

/// Connects to an endpoint with options.
///
/// A null `options` uses the defaults. Otherwise as `dbr_connect`.
///
/// # Safety
///
/// As `dbr_connect`; `options` must be null or point to valid options.
#[no_mangle]
pub unsafe extern "C" fn dbr_connect_with_options(
    err_out: *mut DbrString,
    handle_out: *mut *mut DbrHandle,
    endpoint: *const c_char,
    options: *const DbrOptions,
) -> c_int {
    connect_out(err_out, handle_out, endpoint, options)
}

/// Connects to an endpoint, returning an envelope.
///
/// # Safety
///
/// `endpoint` must be a null-terminated UTF-8 string.
#[no_mangle]
pub unsafe extern "C" fn dbr_connect_result(endpoint: *const c_char) -> DbrResult<*mut DbrHandle> {
    connect_with(endpoint, std::ptr::null()).into()
}

/// Connects to an endpoint with options, returning an envelope.
///
/// # Safety
///
/// As `dbr_connect_result`; `options` must be null or point to valid options.
#[no_mangle]
pub unsafe extern "C" fn dbr_connect_with_options_result(
    endpoint: *const c_char,
    options: *const DbrOptions,
) -> DbrResult<*mut DbrHandle> {
    connect_with(endpoint, options).into()
}

/// Copies a handle.
///
/// The copy shares the connection and has its own empty error slot. Make a
/// copy for each thread that uses the connection. Returns null for a null
/// handle.
///
/// # Safety
///
/// `handle` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn dbr_handle_clone(handle: *const DbrHandle) -> *mut DbrHandle {
    match handle_ref(handle) {
        Ok(conn) => conn.clone().into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Releases a handle.
///
/// The connection is torn down when its last handle is released. Live
/// streams opened on it end.
///
/// # Safety
///
/// `handle` must be null or a live handle. It must not be used after this
/// call.
#[no_mangle]
pub unsafe extern "C" fn dbr_disconnect(handle: *mut DbrHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle.cast::<Connection>()));
    }
}

/// Drains the handle's error slot.
///
/// Returns `DBR_NONE` if there is no stored error. Otherwise returns the
/// error's code and, if `err_out` is not null, writes its message there
/// (free with `dbr_free_string`). Returns `DBR_ERROR` for a null handle.
///
/// # Safety
///
/// - `handle` must be null or a live handle
/// - `err_out` must be null or valid for writes
#[no_mangle]
pub unsafe extern "C" fn dbr_take_error(handle: *const DbrHandle, err_out: *mut DbrString) -> c_int {
    let Ok(conn) = handle_ref(handle) else {
        return DBR_ERROR;
    };
    match conn.take_error() {
        Some(err) => {
            let code = err.code();
            if !err_out.is_null() {
                err_out.write(DbrString::from(err.message));
            }
            code
        }
        None => DBR_NONE,
    }
}

/// Drains the handle's error slot, returning a descriptor.
///
/// `code == 0` means there was no stored error.
///
/// # Safety
///
/// `handle` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn dbr_take_error_result(handle: *const DbrHandle) -> DbrError {
    match handle_ref(handle) {
        Ok(conn) => conn.take_error().map_or_else(DbrError::none, DbrError::from),
        Err(err) => err.into(),
    }
}

/// Selects the namespace.
///
/// Returns 0 on success, or a negative status with the error in the slot.
///
/// # Safety
///
/// - `handle` must be a live handle
/// - `ns` must be a null-terminated UTF-8 string
#[no_mangle]
pub unsafe extern "C" fn dbr_use_ns(handle: *const DbrHandle, ns: *const c_char) -> c_int {
    status(handle_ref(handle).and_then(|conn| {
        conn.use_ns(conn.check(str_arg(ns, "ns"))?).map(|()| 0)
    }))
}

/// Selects the namespace, returning a descriptor.
///
/// # Safety
///
/// As `dbr_use_ns`.
#[no_mangle]
pub unsafe extern "C" fn dbr_use_ns_result(handle: *const DbrHandle, ns: *const c_char) -> DbrError {
    handle_ref(handle)
        .and_then(|conn| conn.use_ns(conn.check(str_arg(ns, "ns"))?))
        .into()
}

/// Selects the database.
///
/// Returns 0 on success, or a negative status with the error in the slot.
///
/// # Safety
///
/// - `handle` must be a live handle
/// - `db` must be a null-terminated UTF-8 string
#[no_mangle]
pub unsafe extern "C" fn dbr_use_db(handle: *const DbrHandle, db: *const c_char) -> c_int {
    status(handle_ref(handle).and_then(|conn| {
        conn.use_db(conn.check(str_arg(db, "db"))?).map(|()| 0)
    }))
}

/// Selects the database, returning a descriptor.
///
/// # Safety
///
/// As `dbr_use_db`.
#[no_mangle]
pub unsafe extern "C" fn dbr_use_db_result(handle: *const DbrHandle, db: *const c_char) -> DbrError {
    handle_ref(handle)
        .and_then(|conn| conn.use_db(conn.check(str_arg(db, "db"))?))
        .into()
}

/// Reads the engine version.
///
/// On success writes the version to `res_out` (free with
/// `dbr_free_string`) and returns 0.
///
/// # Safety
///
/// - `handle` must be a live handle
/// - `res_out` must be valid for writes
#[no_mangle]
pub unsafe extern "C" fn dbr_version(handle: *const DbrHandle, res_out: *mut DbrString) -> c_int {
    let result = handle_ref(handle).and_then(|conn| {
        if res_out.is_null() {
            return conn.check(Err(BoundaryError::null_argument("res_out")));
        }
        conn.version().map(|v| (DbrString::from(v), 0))
    });
    out_param(result, res_out)
}

/// Reads the engine version, returning an envelope.
///
/// # Safety
///
/// `handle` must be a live handle.
#[no_mangle]
pub unsafe extern "C" fn dbr_version_result(handle: *const DbrHandle) -> DbrStringResult {
    handle_ref(handle)
        .and_then(|conn| conn.version().map(DbrString::from))
        .into()
}

fn encode_batch(results: Vec<BoundaryResult<Vec<Value>>>) -> Vec<DbrArrayResult> {
    results
        .into_iter()
        .map(|slot| DbrArrayResult::from(slot.map(encode_rows)))
        .collect()
}

unsafe fn run_query(
    handle: *const DbrHandle,
    query: *const c_char,
    vars: *const DbrObject,
) -> BoundaryResult<Vec<DbrArrayResult>> {
    let conn = handle_ref(handle)?;
    let text = conn.check(str_arg(query, "query"))?;
    conn.query(text, vars.as_ref()).map(encode_batch)
}

/// Runs a batch of `;`-separated statements.
///
/// On success writes an array with one envelope per statement to
/// `res_out` and returns its length. Each envelope succeeds or fails on its
/// own. Free the array with `dbr_free_arr_res_arr(ptr, len)`. A whole-call
/// failure, such as a parse error, returns a negative status and writes
/// nothing.
///
/// `vars` is optional and is not consumed.
///
/// # Safety
///
/// - `handle` must be a live handle
/// - `res_out` must be valid for writes
/// - `query` must be a null-terminated UTF-8 string
/// - `vars` must be null or point to a live object
#[no_mangle]
pub unsafe extern "C" fn dbr_query(
    handle: *const DbrHandle,
    res_out: *mut *mut DbrArrayResult,
    query: *const c_char,
    vars: *const DbrObject,
) -> c_int {
    if res_out.is_null() {
        return status(
            handle_ref(handle)
                .and_then(|conn| conn.check(Err(BoundaryError::null_argument("res_out")))),
        );
    }
    let result = run_query(handle, query, vars).and_then(|slots| {
        let (ptr, len) = into_raw_slice(slots);
        match c_int::try_from(len) {
            Ok(count) => Ok((ptr, count)),
            Err(_) => {
                drop_raw_slice(ptr, len);
                Err(BoundaryError::recoverable("too many statements"))
            }
        }
    });
    out_param(result, res_out)
}

/// Runs a batch of statements, returning an envelope.
///
/// Free with `dbr_free_query_result`.
///
/// # Safety
///
/// As `dbr_query`.
#[no_mangle]
pub unsafe extern "C" fn dbr_query_result(
    handle: *const DbrHandle,
    query: *const c_char,
    vars: *const DbrObject,
) -> DbrQueryResult {
    run_query(handle, query, vars)
        .map(DbrArrayResultArray::from_vec)
        .into()
}

unsafe fn run_select(handle: *const DbrHandle, resource: *const c_char) -> BoundaryResult<Vec<DbrValue>> {
    let conn = handle_ref(handle)?;
    let resource = conn.check(str_arg(resource, "resource"))?;
    let rows = conn.select(resource)?;
    Ok(rows.into_iter().map(DbrValue::from).collect())
}

/// Reads every record of a table, or a single record.
///
/// On success writes the first element to `res_out` and returns the
/// element count. Free with `dbr_free_arr(ptr, len)`.
///
/// # Safety
///
/// - `handle` must be a live handle
/// - `res_out` must be valid for writes
/// - `resource` must be a null-terminated UTF-8 string
#[no_mangle]
pub unsafe extern "C" fn dbr_select(
    handle: *const DbrHandle,
    res_out: *mut *mut DbrValue,
    resource: *const c_char,
) -> c_int {
    if res_out.is_null() {
        return status(
            handle_ref(handle)
                .and_then(|conn| conn.check(Err(BoundaryError::null_argument("res_out")))),
        );
    }
    let result = run_select(handle, resource).and_then(|rows| {
        let (ptr, len) = into_raw_slice(rows);
        match c_int::try_from(len) {
            Ok(count) => Ok((ptr, count)),
            Err(_) => {
                drop_raw_slice(ptr, len);
                Err(BoundaryError::recoverable("too many records"))
            }
        }
    });
    out_param(result, res_out)
}

/// Reads every record of a table, or a single record, as an envelope.
///
/// Free with `dbr_free_arr_res`.
///
/// # Safety
///
/// As `dbr_select`.
#[no_mangle]
pub unsafe extern "C" fn dbr_select_result(
    handle: *const DbrHandle,
    resource: *const c_char,
) -> DbrArrayResult {
    run_select(handle, resource).map(DbrArray::from_vec).into()
}

unsafe fn run_create(
    handle: *const DbrHandle,
    resource: *const c_char,
    content: *const DbrObject,
) -> BoundaryResult<DbrValue> {
    let conn = handle_ref(handle)?;
    let resource = conn.check(str_arg(resource, "resource"))?;
    let empty = DbrObject::new();
    let content = content.as_ref().unwrap_or(&empty);
    conn.create(resource, content).map(DbrValue::from)
}

/// Creates a record and returns it.
///
/// `resource` is a table (a random id is generated) or `table:id`.
/// `content` is optional and is not consumed. On success writes the new
/// record to `res_out` (free with `dbr_free_value`) and returns 1.
///
/// # Safety
///
/// - `handle` must be a live handle
/// - `res_out` must be valid for writes
/// - `resource` must be a null-terminated UTF-8 string
/// - `content` must be null or point to a live object
#[no_mangle]
pub unsafe extern "C" fn dbr_create(
    handle: *const DbrHandle,
    res_out: *mut DbrValue,
    resource: *const c_char,
    content: *const DbrObject,
) -> c_int {
    if res_out.is_null() {
        return status(
            handle_ref(handle)
                .and_then(|conn| conn.check(Err(BoundaryError::null_argument("res_out")))),
        );
    }
    out_param(run_create(handle, resource, content).map(|v| (v, 1)), res_out)
}

/// Creates a record, returning an envelope.
///
/// Free with `dbr_free_value_result`.
///
/// # Safety
///
/// As `dbr_create`.
#[no_mangle]
pub unsafe extern "C" fn dbr_create_result(
    handle: *const DbrHandle,
    resource: *const c_char,
    content: *const DbrObject,
) -> DbrValueResult {
    run_create(handle, resource, content).into()
}

unsafe fn run_live(handle: *const DbrHandle, resource: *const c_char) -> BoundaryResult<*mut DbrStream> {
    let conn = handle_ref(handle)?;
    let resource = conn.check(str_arg(resource, "resource"))?;
    conn.live(resource).map(Stream::into_raw)
}

/// Opens a live query on a table or record.
///
/// On success writes the stream to `stream_out` and returns 0. Release it
/// with `dbr_stream_free`. The stream must not be used after the last
/// handle of its connection is disconnected.
///
/// # Safety
///
/// - `handle` must be a live handle
/// - `stream_out` must be valid for writes
/// - `resource` must be a null-terminated UTF-8 string
#[no_mangle]
pub unsafe extern "C" fn dbr_select_live(
    handle: *const DbrHandle,
    stream_out: *mut *mut DbrStream,
    resource: *const c_char,
) -> c_int {
    if stream_out.is_null() {
        return status(
            handle_ref(handle)
                .and_then(|conn| conn.check(Err(BoundaryError::null_argument("stream_out")))),
        );
    }
    out_param(run_live(handle, resource).map(|s| (s, 0)), stream_out)
}

/// Opens a live query, returning an envelope.
///
/// # Safety
///
/// As `dbr_select_live`.
#[no_mangle]
pub unsafe extern "C" fn dbr_select_live_result(
    handle: *const DbrHandle,
    resource: *const c_char,
) -> DbrResult<*mut DbrStream> {
    run_live(handle, resource).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DBR_FATAL;
    use docbridge_core::{CoreResult, LiveSubscription};
    use std::ffi::CString;

    fn open() -> Connection {
        let conn = Connection::connect("memory", Config::default()).unwrap();
        conn.use_ns("test").unwrap();
        conn.use_db("test").unwrap();
        conn
    }

    struct PanickingEngine;

    impl Engine for PanickingEngine {
        fn execute(&self, _: &mut Session, _: &str, _: &Vars) -> CoreResult<Vec<CoreResult<Value>>> {
            panic!("engine exploded")
        }
        fn select(&self, _: &Session, _: &str) -> CoreResult<Value> {
            Ok(Value::Array(Vec::new()))
        }
        fn create(&self, _: &Session, _: &str, _: Object) -> CoreResult<Value> {
            Ok(Value::None)
        }
        fn live(&self, _: &Session, _: &str) -> CoreResult<LiveSubscription> {
            Err(docbridge_core::CoreError::NotificationsDisabled)
        }
        fn version(&self) -> String {
            "panicking".into()
        }
    }

    /// Switches the namespace, after letting another handle switch the
    /// database mid-batch.
    struct InterleavingEngine {
        other: parking_lot::Mutex<Option<Connection>>,
    }

    impl Engine for InterleavingEngine {
        fn execute(
            &self,
            session: &mut Session,
            _: &str,
            _: &Vars,
        ) -> CoreResult<Vec<CoreResult<Value>>> {
            if let Some(other) = self.other.lock().take() {
                other.use_db("concurrent").unwrap();
            }
            session.ns = Some("mine".into());
            Ok(vec![Ok(Value::None)])
        }
        fn select(&self, _: &Session, _: &str) -> CoreResult<Value> {
            Ok(Value::Array(Vec::new()))
        }
        fn create(&self, _: &Session, _: &str, _: Object) -> CoreResult<Value> {
            Ok(Value::None)
        }
        fn live(&self, _: &Session, _: &str) -> CoreResult<LiveSubscription> {
            Err(docbridge_core::CoreError::NotificationsDisabled)
        }
        fn version(&self) -> String {
            "interleaving".into()
        }
    }

    #[test]
    fn query_writes_back_only_what_it_changed() {
        let engine = Arc::new(InterleavingEngine {
            other: parking_lot::Mutex::new(None),
        });
        let conn = Connection::with_engine(engine.clone());
        conn.use_db("original").unwrap();
        *engine.other.lock() = Some(conn.clone());

        conn.query("USE NS mine", None).unwrap();
        let session = conn.shared.session.read().clone();
        assert_eq!(session.ns.as_deref(), Some("mine"));
        assert_eq!(session.db.as_deref(), Some("concurrent"));
    }

    #[test]
    fn query_slots() {
        let conn = open();
        let slots = conn
            .query("CREATE foo:1 SET val = 42; CREATE foo:1 SET val = 48; RETURN 5", None)
            .unwrap();
        assert_eq!(slots.len(), 3);
        assert!(slots[0].is_ok());
        assert!(!slots[1].as_ref().unwrap_err().is_fatal());
        assert_eq!(slots[2].as_ref().unwrap(), &vec![Value::from(5i64)]);
        assert!(conn.take_error().is_none());
    }

    #[test]
    fn clone_has_fresh_error_slot() {
        let conn = open();
        assert!(conn.query("NOT A STATEMENT", None).is_err());
        let copy = conn.clone();
        assert_eq!(conn.handle_count(), 2);
        assert!(copy.take_error().is_none());
        assert!(conn.take_error().is_some());
        assert!(conn.take_error().is_none());
    }

    #[test]
    fn session_is_shared_between_copies() {
        let conn = open();
        let copy = conn.clone();
        copy.query("USE DB other", None).unwrap();
        conn.query("CREATE foo:1", None).unwrap();
        assert_eq!(copy.select("foo").unwrap().len(), 1);
        conn.use_db("test").unwrap();
        assert!(copy.select("foo").unwrap().is_empty());
    }

    #[test]
    fn panic_poisons_every_handle() {
        let conn = Connection::with_engine(Arc::new(PanickingEngine));
        let copy = conn.clone();

        let err = conn.query("RETURN 1", None).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.message.contains("engine exploded"));
        assert!(conn.is_poisoned());

        let err = copy.version().unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.message, "connection is poisoned");
    }

    #[test]
    fn unsupported_endpoint_is_fatal() {
        let endpoint = CString::new("ws://localhost:8000").unwrap();
        let mut err = DbrString::null();
        let mut handle: *mut DbrHandle = std::ptr::null_mut();
        let code = unsafe { dbr_connect(&mut err, &mut handle, endpoint.as_ptr()) };
        assert_eq!(code, DBR_FATAL);
        assert!(handle.is_null());
        assert_eq!(
            unsafe { err.as_str() },
            Some("unsupported endpoint: ws://localhost:8000")
        );
    }

    #[test]
    fn null_handle() {
        let query = CString::new("RETURN 1").unwrap();
        let mut res: *mut DbrArrayResult = std::ptr::null_mut();
        unsafe {
            assert_eq!(dbr_query(std::ptr::null(), &mut res, query.as_ptr(), std::ptr::null()), DBR_ERROR);
            let envelope = dbr_version_result(std::ptr::null());
            assert_eq!(envelope.err.code, DBR_ERROR);
            assert!(envelope.ok.is_null());
            assert!(dbr_handle_clone(std::ptr::null()).is_null());
            assert_eq!(dbr_take_error(std::ptr::null(), std::ptr::null_mut()), DBR_ERROR);
            dbr_disconnect(std::ptr::null_mut());
        }
    }

    #[test]
    fn null_argument_is_recoverable_and_recorded() {
        let handle = open().into_raw();
        unsafe {
            assert_eq!(dbr_use_ns(handle, std::ptr::null()), DBR_ERROR);
            let mut msg = DbrString::null();
            assert_eq!(dbr_take_error(handle, &mut msg), DBR_ERROR);
            assert_eq!(msg.as_str(), Some("null pointer argument: ns"));
            assert_eq!(dbr_take_error(handle, std::ptr::null_mut()), DBR_NONE);
            dbr_disconnect(handle);
        }
    }
}
