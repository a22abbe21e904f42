//! In-memory datastore.
//!
//! Records live in a catalog keyed by namespace and database, then by
//! table. Each statement runs under the catalog's write lock, so a
//! statement is atomic with respect to other connections. Live-query
//! notifications are emitted once the statement has succeeded.
//!
//! With a transaction timeout configured, a statement works on a copy of
//! its database that replaces the original only if the statement both
//! succeeds and finishes in time.

use crate::config::Config;
use crate::engine::{Engine, Session};
use crate::error::{CoreError, CoreResult};
use crate::live::{Action, Change, LiveFeed, LiveScope, LiveSubscription};
use crate::sql::{
    field_of, parse, parse_target, value_to_id, Cond, Data, Projection, Statement, Target, Vars,
};
use crate::value::{Id, Object, RecordKey, Thing, Value};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Default, Clone)]
struct Table {
    defined: bool,
    records: BTreeMap<RecordKey, Object>,
}

#[derive(Debug, Default, Clone)]
struct Database {
    tables: BTreeMap<String, Table>,
}

impl Database {
    fn table(&self, tb: &str, strict: bool) -> CoreResult<Option<&Table>> {
        match self.tables.get(tb) {
            Some(table) if table.defined || !strict => Ok(Some(table)),
            None if !strict => Ok(None),
            _ => Err(CoreError::table_not_found(tb)),
        }
    }

    fn table_mut(&mut self, tb: &str, strict: bool) -> CoreResult<&mut Table> {
        if strict && !self.tables.get(tb).is_some_and(|t| t.defined) {
            return Err(CoreError::table_not_found(tb));
        }
        Ok(self.tables.entry(tb.to_string()).or_default())
    }
}

/// The in-memory engine.
pub struct Datastore {
    config: Config,
    catalog: RwLock<BTreeMap<(String, String), Database>>,
    feed: Arc<LiveFeed>,
}

impl Datastore {
    /// Creates an empty datastore.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            catalog: RwLock::new(BTreeMap::new()),
            feed: LiveFeed::new(),
        }
    }

    fn run(&self, session: &mut Session, stmt: &Statement, vars: &Vars) -> CoreResult<Value> {
        match stmt {
            Statement::Use { ns, db } => {
                if let Some(ns) = ns {
                    self.use_ns(session, ns)?;
                }
                if let Some(db) = db {
                    self.use_db(session, db)?;
                }
                Ok(Value::None)
            }
            Statement::Return(expr) => expr.eval(vars),
            _ => self.with_database(session, |database, changes| {
                self.apply(database, stmt, vars, changes)
            }),
        }
    }

    fn apply(
        &self,
        database: &mut Database,
        stmt: &Statement,
        vars: &Vars,
        changes: &mut Vec<Change>,
    ) -> CoreResult<Value> {
        let strict = self.config.strict;
        match stmt {
            Statement::DefineTable(tb) => {
                database.tables.entry(tb.clone()).or_default().defined = true;
                Ok(Value::None)
            }
            Statement::Create { only, what, data } => {
                let id = what.resolve_id(vars)?;
                let content = match data {
                    Some(data) => build_content(data, &Object::new(), vars)?,
                    None => Object::new(),
                };
                let record = insert(database, strict, what.table(), id, content, changes)?;
                Ok(shape(*only, vec![Value::Object(record)]))
            }
            Statement::Select {
                projection,
                only,
                what,
                cond,
                limit,
            } => {
                let Some(table) = database.table(what.table(), strict)? else {
                    return single_or_array(*only, Vec::new());
                };
                let mut rows = Vec::new();
                for key in matching(table, what, cond.as_ref(), vars)? {
                    if limit.is_some_and(|n| rows.len() >= n) {
                        break;
                    }
                    if let Some(record) = table.records.get(&key) {
                        rows.push(project(projection, record));
                    }
                }
                single_or_array(*only, rows)
            }
            Statement::Update {
                only,
                what,
                data,
                cond,
            } => {
                let table = database.table_mut(what.table(), strict)?;
                let mut rows = Vec::new();
                for key in matching(table, what, cond.as_ref(), vars)? {
                    let Some(record) = table.records.get_mut(&key) else {
                        continue;
                    };
                    if let Some(data) = data {
                        let id = record.get("id").cloned().unwrap_or_default();
                        let mut updated = build_content(data, record, vars)?;
                        updated.insert("id", id);
                        *record = updated;
                    }
                    changes.push(Change {
                        tb: what.table().to_string(),
                        key,
                        action: Action::Update,
                        data: Value::Object(record.clone()),
                    });
                    rows.push(Value::Object(record.clone()));
                }
                single_or_array(*only, rows)
            }
            Statement::Delete { only, what, cond } => {
                let table = database.table_mut(what.table(), strict)?;
                for key in matching(table, what, cond.as_ref(), vars)? {
                    if let Some(record) = table.records.remove(&key) {
                        changes.push(Change {
                            tb: what.table().to_string(),
                            key,
                            action: Action::Delete,
                            data: Value::Object(record),
                        });
                    }
                }
                Ok(shape(*only, Vec::new()))
            }
            Statement::Use { .. } | Statement::Return(_) => Err(CoreError::invalid_operation(
                "statement does not touch the catalog",
            )),
        }
    }

    fn with_database<T>(
        &self,
        session: &Session,
        f: impl FnOnce(&mut Database, &mut Vec<Change>) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let (ns, db) = session.selected()?;
        let mut changes = Vec::new();
        let out = {
            let mut catalog = self.catalog.write();
            let database = catalog
                .entry((ns.to_string(), db.to_string()))
                .or_default();
            match self.config.transaction_timeout {
                None => f(database, &mut changes)?,
                Some(limit) => {
                    let started = Instant::now();
                    let mut scratch = database.clone();
                    let out = f(&mut scratch, &mut changes)?;
                    if started.elapsed() >= limit {
                        tracing::debug!(?limit, "transaction timed out, rolled back");
                        return Err(CoreError::TransactionTimedOut);
                    }
                    *database = scratch;
                    out
                }
            }
        };
        for change in &changes {
            self.feed.emit(ns, db, change);
        }
        Ok(out)
    }
}

impl Engine for Datastore {
    fn execute(
        &self,
        session: &mut Session,
        text: &str,
        vars: &Vars,
    ) -> CoreResult<Vec<CoreResult<Value>>> {
        let statements = parse(text)?;
        let started = Instant::now();
        let mut results = Vec::with_capacity(statements.len());
        for stmt in &statements {
            if self
                .config
                .query_timeout
                .is_some_and(|limit| started.elapsed() >= limit)
            {
                results.push(Err(CoreError::QueryTimedOut));
                continue;
            }
            results.push(self.run(session, stmt, vars));
        }
        tracing::trace!(statements = results.len(), "batch executed");
        Ok(results)
    }

    fn select(&self, session: &Session, resource: &str) -> CoreResult<Value> {
        let what = parse_target(resource)?;
        let vars = Vars::new();
        self.with_database(session, |database, _| {
            let Some(table) = database.table(what.table(), self.config.strict)? else {
                return Ok(Value::Array(Vec::new()));
            };
            let rows = matching(table, &what, None, &vars)?
                .into_iter()
                .filter_map(|key| table.records.get(&key).cloned().map(Value::Object))
                .collect();
            Ok(Value::Array(rows))
        })
    }

    fn create(&self, session: &Session, resource: &str, content: Object) -> CoreResult<Value> {
        let what = parse_target(resource)?;
        let id = what.resolve_id(&Vars::new())?;
        self.with_database(session, |database, changes| {
            insert(database, self.config.strict, what.table(), id, content, changes)
                .map(Value::Object)
        })
    }

    fn live(&self, session: &Session, resource: &str) -> CoreResult<LiveSubscription> {
        if !self.config.notifications {
            return Err(CoreError::NotificationsDisabled);
        }
        let what = parse_target(resource)?;
        let record = what.resolve_id(&Vars::new())?.map(|id| id.key());
        let (ns, db) = session.selected()?;
        if self.config.strict {
            let catalog = self.catalog.read();
            let defined = catalog
                .get(&(ns.to_string(), db.to_string()))
                .and_then(|d| d.tables.get(what.table()))
                .is_some_and(|t| t.defined);
            if !defined {
                return Err(CoreError::table_not_found(what.table()));
            }
        }
        Ok(self.feed.subscribe(LiveScope {
            ns: ns.to_string(),
            db: db.to_string(),
            tb: what.table().to_string(),
            record,
        }))
    }

    fn version(&self) -> String {
        format!("docbridge-{}", env!("CARGO_PKG_VERSION"))
    }
}

/// Creates one record, failing if its id is taken.
fn insert(
    database: &mut Database,
    strict: bool,
    tb: &str,
    id: Option<Id>,
    mut content: Object,
    changes: &mut Vec<Change>,
) -> CoreResult<Object> {
    let table = database.table_mut(tb, strict)?;
    let id = match (id, content.remove("id")) {
        (Some(id), _) => id,
        (None, Some(Value::Thing(thing))) => thing.id,
        (None, Some(value)) if !value.is_none() => value_to_id(value)?,
        (None, _) => Id::rand(),
    };
    let thing = Thing::new(tb, id);
    let key = thing.id.key();
    if table.records.contains_key(&key) {
        return Err(CoreError::record_exists(thing.to_string()));
    }
    content.insert("id", Value::Thing(thing));
    table.records.insert(key.clone(), content.clone());
    changes.push(Change {
        tb: tb.to_string(),
        key,
        action: Action::Create,
        data: Value::Object(content.clone()),
    });
    Ok(content)
}

/// Applies SET assignments to `base`, or replaces it with CONTENT.
fn build_content(data: &Data, base: &Object, vars: &Vars) -> CoreResult<Object> {
    match data {
        Data::Set(fields) => {
            let mut out = base.clone();
            for (field, expr) in fields {
                if field != "id" {
                    out.insert(field.clone(), expr.eval(vars)?);
                }
            }
            Ok(out)
        }
        Data::Content(expr) => match expr.eval(vars)? {
            Value::Object(obj) => Ok(obj),
            other => Err(CoreError::type_mismatch(format!(
                "CONTENT expects an object, found {}",
                other.kind()
            ))),
        },
    }
}

/// Keys of the records a target and filter select, in key order.
fn matching(
    table: &Table,
    what: &Target,
    cond: Option<&Cond>,
    vars: &Vars,
) -> CoreResult<Vec<RecordKey>> {
    let candidates: Vec<(&RecordKey, &Object)> = match what.resolve_id(vars)? {
        Some(id) => table.records.get_key_value(&id.key()).into_iter().collect(),
        None => table.records.iter().collect(),
    };
    let mut keys = Vec::with_capacity(candidates.len());
    for (key, record) in candidates {
        if match cond {
            Some(cond) => cond.matches(record, vars)?,
            None => true,
        } {
            keys.push(key.clone());
        }
    }
    Ok(keys)
}

fn project(projection: &Projection, record: &Object) -> Value {
    match projection {
        Projection::All => Value::Object(record.clone()),
        Projection::Value(field) => field_of(record, field),
        Projection::Fields(fields) => Value::Object(
            fields
                .iter()
                .filter_map(|f| record.get(f).map(|v| (f.clone(), v.clone())))
                .collect(),
        ),
    }
}

fn shape(only: bool, mut rows: Vec<Value>) -> Value {
    if only {
        rows.pop().unwrap_or_default()
    } else {
        Value::Array(rows)
    }
}

fn single_or_array(only: bool, rows: Vec<Value>) -> CoreResult<Value> {
    if only && rows.len() > 1 {
        return Err(CoreError::invalid_operation(
            "expected a single result when using ONLY",
        ));
    }
    Ok(shape(only, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn session() -> Session {
        Session {
            ns: Some("test".into()),
            db: Some("test".into()),
        }
    }

    fn run(ds: &Datastore, text: &str) -> Vec<CoreResult<Value>> {
        ds.execute(&mut session(), text, &Vars::new()).unwrap()
    }

    fn record(fields: &[(&str, Value)]) -> Value {
        Value::Object(
            fields
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn duplicate_create_fails_only_its_slot() {
        let ds = Datastore::new(Config::default());
        let results = run(
            &ds,
            "CREATE foo:1 SET val = 42; CREATE foo:1 SET val = 48; SELECT * FROM foo;",
        );
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert_eq!(
            results[1].as_ref().unwrap_err().to_string(),
            "Database record `foo:1` already exists"
        );
        let thing = Value::Thing(Thing::new("foo", Id::Number(1)));
        assert_eq!(
            results[2].as_ref().unwrap(),
            &Value::Array(vec![record(&[("id", thing), ("val", Value::from(42i64))])])
        );
    }

    #[test]
    fn params_keep_integer_kind() {
        let ds = Datastore::new(Config::default());
        let mut vars = Vars::new();
        vars.insert("val".into(), Value::from(23i64));
        let mut s = session();
        ds.execute(&mut s, "CREATE foo:2 SET val = $val", &vars)
            .unwrap();
        let results = ds
            .execute(&mut s, "SELECT VALUE val FROM foo:2", &vars)
            .unwrap();
        assert_eq!(
            results[0].as_ref().unwrap(),
            &Value::Array(vec![Value::from(23i64)])
        );
    }

    #[test]
    fn statements_need_a_database() {
        let ds = Datastore::new(Config::default());
        let mut s = Session::default();
        let results = ds
            .execute(&mut s, "RETURN 1; SELECT * FROM foo; USE NS a DB b; SELECT * FROM foo", &Vars::new())
            .unwrap();
        assert_eq!(results[0].as_ref().unwrap(), &Value::from(1i64));
        assert_eq!(results[1].as_ref().unwrap_err(), &CoreError::NoNamespace);
        assert!(results[2].is_ok());
        assert_eq!(results[3].as_ref().unwrap(), &Value::Array(vec![]));
        assert_eq!(s.ns.as_deref(), Some("a"));
    }

    #[test]
    fn parse_error_fails_whole_batch() {
        let ds = Datastore::new(Config::default());
        let err = ds
            .execute(&mut session(), "CREATE foo:1; SELEKT", &Vars::new())
            .unwrap_err();
        assert!(matches!(err, CoreError::Parse { .. }));
    }

    #[test]
    fn create_without_id_generates_one() {
        let ds = Datastore::new(Config::default());
        let results = run(&ds, "CREATE ONLY foo SET a = 1");
        let obj = results[0].as_ref().unwrap().as_object().unwrap().clone();
        let Some(Value::Thing(thing)) = obj.get("id") else {
            panic!("missing id");
        };
        assert_eq!(thing.tb, "foo");
        assert!(matches!(&thing.id, Id::String(s) if s.len() == 32));
    }

    #[test]
    fn update_and_delete() {
        let ds = Datastore::new(Config::default());
        run(&ds, "CREATE foo:1 SET n = 1; CREATE foo:2 SET n = 2; CREATE foo:3 SET n = 3");
        let results = run(&ds, "UPDATE foo SET big = true WHERE n >= 2");
        let Value::Array(rows) = results[0].as_ref().unwrap() else {
            panic!("expected array");
        };
        assert_eq!(rows.len(), 2);

        let results = run(&ds, "DELETE foo:1; SELECT VALUE n FROM foo WHERE big = true");
        assert_eq!(results[0].as_ref().unwrap(), &Value::Array(vec![]));
        assert_eq!(
            results[1].as_ref().unwrap(),
            &Value::Array(vec![Value::from(2i64), Value::from(3i64)])
        );
    }

    #[test]
    fn select_projection_and_limit() {
        let ds = Datastore::new(Config::default());
        run(&ds, "CREATE foo:1 CONTENT { a: 1, b: 'x' }; CREATE foo:2 CONTENT { a: 2 }");
        let results = run(&ds, "SELECT a FROM foo LIMIT 1; SELECT * FROM ONLY foo:2; SELECT * FROM ONLY foo");
        assert_eq!(
            results[0].as_ref().unwrap(),
            &Value::Array(vec![record(&[("a", Value::from(1i64))])])
        );
        assert_eq!(
            results[1].as_ref().unwrap().as_object().unwrap().get("a"),
            Some(&Value::from(2i64))
        );
        assert!(results[2].is_err());
    }

    #[test]
    fn strict_mode_requires_defined_tables() {
        let ds = Datastore::new(Config::new().strict(true));
        let results = run(&ds, "CREATE foo:1; DEFINE TABLE foo; CREATE foo:1");
        assert_eq!(
            results[0].as_ref().unwrap_err(),
            &CoreError::table_not_found("foo")
        );
        assert!(results[1].is_ok());
        assert!(results[2].is_ok());
        assert!(ds.select(&session(), "bar").is_err());
    }

    #[test]
    fn timeout_keeps_slot_count() {
        let ds = Datastore::new(Config::new().query_timeout(Some(Duration::ZERO)));
        let results = run(&ds, "RETURN 1; RETURN 2");
        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .all(|r| r.as_ref().unwrap_err() == &CoreError::QueryTimedOut));
    }

    #[test]
    fn transaction_timeout_rolls_back_writes() {
        let ds = Datastore::new(Config::new().transaction_timeout(Some(Duration::ZERO)));
        let sub = ds.live(&session(), "foo").unwrap();
        let results = run(&ds, "RETURN 1; CREATE foo:1 SET a = 1");
        assert_eq!(results[0].as_ref().unwrap(), &Value::from(1i64));
        assert_eq!(
            results[1].as_ref().unwrap_err(),
            &CoreError::TransactionTimedOut
        );
        let catalog = ds.catalog.read();
        let database = &catalog[&("test".to_string(), "test".to_string())];
        assert!(database.tables.get("foo").is_none());
        drop(catalog);
        assert!(ds.feed.kill(sub.id()));
        assert!(sub.next().is_none());
    }

    #[test]
    fn generous_transaction_timeout_commits() {
        let ds = Datastore::new(Config::new().transaction_timeout(Some(Duration::from_secs(60))));
        run(&ds, "CREATE foo:1 SET a = 1");
        let Value::Array(rows) = ds.select(&session(), "foo").unwrap() else {
            panic!("expected array");
        };
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn create_and_select_methods() {
        let ds = Datastore::new(Config::default());
        let mut content = Object::new();
        content.insert("val", Value::from(7i64));
        let created = ds.create(&session(), "foo:bar", content).unwrap();
        assert_eq!(
            created.as_object().unwrap().get("id"),
            Some(&Value::Thing(Thing::new("foo", Id::String("bar".into()))))
        );
        let Value::Array(rows) = ds.select(&session(), "foo").unwrap() else {
            panic!("expected array");
        };
        assert_eq!(rows, vec![created]);
        assert_eq!(
            ds.select(&session(), "foo:missing").unwrap(),
            Value::Array(vec![])
        );
    }

    #[test]
    fn live_query_sees_mutations() {
        let ds = Arc::new(Datastore::new(Config::default()));
        let sub = ds.live(&session(), "foo").unwrap();

        let writer = {
            let ds = Arc::clone(&ds);
            thread::spawn(move || {
                ds.execute(
                    &mut session(),
                    "CREATE foo:1 SET a = 1; UPDATE foo:1 SET a = 2; DELETE foo:1; CREATE bar:1",
                    &Vars::new(),
                )
                .unwrap();
            })
        };
        writer.join().unwrap();

        let actions: Vec<Action> = (0..3).map(|_| sub.next().unwrap().action).collect();
        assert_eq!(actions, vec![Action::Create, Action::Update, Action::Delete]);

        sub.kill();
        assert!(sub.next().is_none());
        assert_eq!(ds.feed.subscriber_count(), 0);
    }

    #[test]
    fn live_disabled() {
        let ds = Datastore::new(Config::new().notifications(false));
        assert_eq!(
            ds.live(&session(), "foo").unwrap_err(),
            CoreError::NotificationsDisabled
        );
    }

    #[test]
    fn dropping_engine_ends_live_queries() {
        let ds = Datastore::new(Config::default());
        let sub = ds.live(&session(), "foo").unwrap();
        drop(ds);
        assert!(sub.next().is_none());
    }
}
