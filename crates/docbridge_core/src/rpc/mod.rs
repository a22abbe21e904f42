//! CBOR request/response surface over an engine.
//!
//! A request is a CBOR map holding a `method` name, an optional `params`
//! array and an optional `id`. The response is a map holding the same
//! `id` and the method's `result`. A request that fails is reported as
//! an error to the caller, not as an encoded response.
//!
//! An [`Rpc`] owns its own session and parameters. Methods that only
//! read them run concurrently; `use`, `let`, `unset` and `query` take
//! the context exclusively.

mod format;
mod method;

pub use format::{
    decode as decode_value, encode as encode_value, TAG_DATETIME, TAG_DURATION, TAG_NONE,
    TAG_RECORD_ID, TAG_UUID,
};
pub use method::Method;

use crate::engine::{Engine, Session};
use crate::error::{CoreError, CoreResult};
use crate::sql::Vars;
use crate::value::{Object, Value};
use ciborium::value::Value as Cbor;
use parking_lot::RwLock;
use std::sync::Arc;

/// One decoded request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Caller-chosen id, echoed in the response.
    pub id: Option<Cbor>,
    /// Method name as sent.
    pub method: String,
    /// Positional parameters.
    pub params: Vec<Value>,
}

impl Request {
    /// Decodes a request from CBOR bytes.
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        let cbor: Cbor = ciborium::from_reader(bytes)
            .map_err(|e| CoreError::invalid_request(format!("malformed CBOR: {e}")))?;
        let Cbor::Map(entries) = cbor else {
            return Err(CoreError::invalid_request("a request must be a map"));
        };
        let mut id = None;
        let mut method = None;
        let mut params = Vec::new();
        for (key, value) in entries {
            match (key.as_text(), value) {
                (Some("id"), value) => id = Some(value),
                (Some("method"), Cbor::Text(name)) => method = Some(name),
                (Some("params"), Cbor::Array(items)) => {
                    params = items
                        .into_iter()
                        .map(format::decode)
                        .collect::<CoreResult<_>>()?;
                }
                (Some("method" | "params"), _) => {
                    return Err(CoreError::invalid_request(
                        "`method` must be text and `params` an array",
                    ))
                }
                _ => {}
            }
        }
        let method = method.ok_or_else(|| CoreError::invalid_request("missing `method`"))?;
        Ok(Self { id, method, params })
    }
}

/// Encodes a successful response.
pub fn encode_response(id: Option<Cbor>, result: Value) -> CoreResult<Vec<u8>> {
    let mut entries = Vec::with_capacity(2);
    if let Some(id) = id {
        entries.push((Cbor::Text("id".into()), id));
    }
    entries.push((Cbor::Text("result".into()), format::encode(result)));
    let mut out = Vec::new();
    ciborium::into_writer(&Cbor::Map(entries), &mut out)
        .map_err(|e| CoreError::invalid_operation(format!("cannot encode response: {e}")))?;
    Ok(out)
}

/// Session and parameters that RPC methods run against.
pub struct RpcContext {
    engine: Arc<dyn Engine>,
    session: Session,
    vars: Vars,
}

fn param(params: &[Value], index: usize) -> &Value {
    static NONE: Value = Value::None;
    params.get(index).unwrap_or(&NONE)
}

fn text_param<'a>(params: &'a [Value], index: usize, what: &str) -> CoreResult<&'a str> {
    match param(params, index) {
        Value::Strand(s) => Ok(s),
        other => Err(CoreError::invalid_params(format!(
            "expected {what} as a string, found {}",
            other.kind()
        ))),
    }
}

/// Table name or record id to operate on, in resource form.
fn resource_param(params: &[Value], index: usize) -> CoreResult<String> {
    match param(params, index) {
        Value::Strand(s) => Ok(s.clone()),
        Value::Thing(t) => Ok(t.to_string()),
        other => Err(CoreError::invalid_params(format!(
            "expected a table or record id, found {}",
            other.kind()
        ))),
    }
}

fn object_param(params: &[Value], index: usize) -> CoreResult<Object> {
    match param(params, index) {
        Value::Object(o) => Ok(o.clone()),
        Value::None | Value::Null => Ok(Object::new()),
        other => Err(CoreError::invalid_params(format!(
            "expected an object, found {}",
            other.kind()
        ))),
    }
}

impl RpcContext {
    /// Creates a context with an empty session.
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            session: Session::default(),
            vars: Vars::new(),
        }
    }

    /// The context's session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Parameters bound with `let`.
    pub fn vars(&self) -> &Vars {
        &self.vars
    }

    /// Runs a method that does not touch the session or parameters.
    pub fn execute_immut(&self, method: Method, params: &[Value]) -> CoreResult<Value> {
        match method {
            Method::Ping => Ok(Value::None),
            Method::Version => Ok(Value::Strand(self.engine.version())),
            Method::Select => self.engine.select(&self.session, &resource_param(params, 0)?),
            Method::Create => self.engine.create(
                &self.session,
                &resource_param(params, 0)?,
                object_param(params, 1)?,
            ),
            _ => Err(CoreError::invalid_operation(format!(
                "{method:?} needs exclusive access to the context"
            ))),
        }
    }

    /// Runs any method.
    pub fn execute(&mut self, method: Method, params: &[Value]) -> CoreResult<Value> {
        match method {
            Method::Use => {
                if let Value::Strand(ns) = param(params, 0) {
                    self.engine.use_ns(&mut self.session, ns)?;
                }
                if let Value::Strand(db) = param(params, 1) {
                    self.engine.use_db(&mut self.session, db)?;
                }
                Ok(Value::None)
            }
            Method::Let => {
                let name = text_param(params, 0, "a parameter name")?;
                let name = name.strip_prefix('$').unwrap_or(name).to_string();
                self.vars.insert(name, param(params, 1).clone());
                Ok(Value::None)
            }
            Method::Unset => {
                let name = text_param(params, 0, "a parameter name")?;
                self.vars.remove(name.strip_prefix('$').unwrap_or(name));
                Ok(Value::None)
            }
            Method::Query => {
                let text = text_param(params, 0, "statement text")?;
                let mut vars = self.vars.clone();
                vars.extend(object_param(params, 1)?.0);
                let results = self.engine.execute(&mut self.session, text, &vars)?;
                Ok(Value::Array(results.into_iter().map(query_result).collect()))
            }
            _ => self.execute_immut(method, params),
        }
    }
}

/// One statement's outcome in the shape `query` returns.
fn query_result(result: CoreResult<Value>) -> Value {
    let mut out = Object::new();
    match result {
        Ok(value) => {
            out.insert("status", Value::from("OK"));
            out.insert("result", value);
        }
        Err(err) => {
            out.insert("status", Value::from("ERR"));
            out.insert("result", Value::Strand(err.to_string()));
        }
    }
    Value::Object(out)
}

/// An RPC endpoint bound to one engine.
pub struct Rpc {
    inner: RwLock<RpcContext>,
}

impl Rpc {
    /// Creates an endpoint over an engine.
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            inner: RwLock::new(RpcContext::new(engine)),
        }
    }

    /// Decodes, runs and answers one request.
    pub fn execute(&self, request: &[u8]) -> CoreResult<Vec<u8>> {
        let Request { id, method, params } = Request::decode(request)?;
        let parsed = Method::parse(&method);
        tracing::trace!(method = %method, "rpc request");
        let result = match parsed {
            Method::Unknown => return Err(CoreError::method_not_found(method)),
            m if m.can_be_immut() => self.inner.read().execute_immut(m, &params),
            m => self.inner.write().execute(m, &params),
        }?;
        encode_response(id, result)
    }

    /// A snapshot of the endpoint's session.
    pub fn session(&self) -> Session {
        self.inner.read().session().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engine::connect;
    use crate::value::{Id, Thing};

    fn request(id: Option<i64>, method: &str, params: Vec<Value>) -> Vec<u8> {
        let mut entries = Vec::new();
        if let Some(id) = id {
            entries.push((Cbor::Text("id".into()), Cbor::Integer(id.into())));
        }
        entries.push((Cbor::Text("method".into()), Cbor::Text(method.into())));
        entries.push((
            Cbor::Text("params".into()),
            Cbor::Array(params.into_iter().map(encode_value).collect()),
        ));
        let mut out = Vec::new();
        ciborium::into_writer(&Cbor::Map(entries), &mut out).unwrap();
        out
    }

    fn response(bytes: &[u8]) -> (Option<Cbor>, Value) {
        let Cbor::Map(entries) = ciborium::from_reader(bytes).unwrap() else {
            panic!("expected a map");
        };
        let mut id = None;
        let mut result = None;
        for (k, v) in entries {
            match k.as_text() {
                Some("id") => id = Some(v),
                Some("result") => result = Some(decode_value(v).unwrap()),
                _ => {}
            }
        }
        (id, result.unwrap())
    }

    fn rpc() -> Rpc {
        Rpc::new(connect("memory", Config::default()).unwrap())
    }

    #[test]
    fn ping_echoes_id() {
        let rpc = rpc();
        let (id, result) = response(&rpc.execute(&request(Some(7), "ping", vec![])).unwrap());
        assert_eq!(id, Some(Cbor::Integer(7.into())));
        assert_eq!(result, Value::None);
    }

    #[test]
    fn use_let_query_select() {
        let rpc = rpc();
        rpc.execute(&request(None, "use", vec!["test".into(), "test".into()]))
            .unwrap();
        assert_eq!(rpc.session().db.as_deref(), Some("test"));
        rpc.execute(&request(None, "let", vec!["val".into(), Value::from(23i64)]))
            .unwrap();

        let bytes = rpc
            .execute(&request(
                Some(1),
                "query",
                vec!["CREATE foo:1 SET val = $val; CREATE foo:1".into()],
            ))
            .unwrap();
        let (_, Value::Array(results)) = response(&bytes) else {
            panic!("expected an array");
        };
        assert_eq!(results.len(), 2);
        let first = results[0].as_object().unwrap();
        assert_eq!(first.get("status"), Some(&Value::from("OK")));
        let second = results[1].as_object().unwrap();
        assert_eq!(second.get("status"), Some(&Value::from("ERR")));
        assert_eq!(
            second.get("result"),
            Some(&Value::from("Database record `foo:1` already exists"))
        );

        let thing = Value::Thing(Thing::new("foo", Id::Number(1)));
        let (_, selected) =
            response(&rpc.execute(&request(None, "select", vec![thing.clone()])).unwrap());
        let Value::Array(rows) = selected else {
            panic!("expected an array");
        };
        let row = rows[0].as_object().unwrap();
        assert_eq!(row.get("id"), Some(&thing));
        assert_eq!(row.get("val"), Some(&Value::from(23i64)));
    }

    #[test]
    fn query_sees_use_statements() {
        let rpc = rpc();
        rpc.execute(&request(None, "query", vec!["USE NS a DB b".into()]))
            .unwrap();
        assert_eq!(rpc.session().ns.as_deref(), Some("a"));
        assert_eq!(rpc.session().db.as_deref(), Some("b"));
    }

    #[test]
    fn unset_removes_parameter() {
        let rpc = rpc();
        rpc.execute(&request(None, "let", vec!["$x".into(), Value::from(1i64)]))
            .unwrap();
        assert!(rpc.inner.read().vars().contains_key("x"));
        rpc.execute(&request(None, "unset", vec!["x".into()])).unwrap();
        assert!(rpc.inner.read().vars().is_empty());
    }

    #[test]
    fn create_returns_record() {
        let rpc = rpc();
        rpc.execute(&request(None, "use", vec!["t".into(), "t".into()]))
            .unwrap();
        let mut content = Object::new();
        content.insert("a", Value::from(1.5f64));
        let (_, created) = response(
            &rpc.execute(&request(None, "create", vec!["foo:x".into(), Value::Object(content)]))
                .unwrap(),
        );
        assert_eq!(
            created.as_object().unwrap().get("a"),
            Some(&Value::from(1.5f64))
        );
    }

    #[test]
    fn request_errors() {
        let rpc = rpc();
        assert_eq!(
            rpc.execute(&request(None, "live", vec![])).unwrap_err(),
            CoreError::method_not_found("live")
        );
        assert!(matches!(
            rpc.execute(&[0xff, 0x00]).unwrap_err(),
            CoreError::InvalidRequest { .. }
        ));
        assert!(matches!(
            rpc.execute(&request(None, "let", vec![Value::from(1i64)])).unwrap_err(),
            CoreError::InvalidParams { .. }
        ));
        assert_eq!(
            rpc.execute(&request(None, "select", vec!["foo".into()])).unwrap_err(),
            CoreError::NoNamespace
        );

        let mut missing = Vec::new();
        ciborium::into_writer(&Cbor::Map(vec![]), &mut missing).unwrap();
        assert_eq!(
            rpc.execute(&missing).unwrap_err(),
            CoreError::invalid_request("missing `method`")
        );
    }
}
