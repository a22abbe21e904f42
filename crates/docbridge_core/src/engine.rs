//! Engine interface and endpoint dispatch.

use crate::config::Config;
use crate::datastore::Datastore;
use crate::error::{CoreError, CoreResult};
use crate::live::LiveSubscription;
use crate::sql::Vars;
use crate::value::{Object, Value};
use std::sync::Arc;

/// Namespace and database selected for a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Selected namespace.
    pub ns: Option<String>,
    /// Selected database.
    pub db: Option<String>,
}

impl Session {
    /// Returns the selected namespace and database.
    pub fn selected(&self) -> CoreResult<(&str, &str)> {
        let ns = self.ns.as_deref().ok_or(CoreError::NoNamespace)?;
        let db = self.db.as_deref().ok_or(CoreError::NoDatabase)?;
        Ok((ns, db))
    }

    /// Copies over the selections that differ between `before` and
    /// `after`, keeping the current value of the others.
    pub fn apply_changes(&mut self, before: &Session, after: &Session) {
        if before.ns != after.ns {
            self.ns.clone_from(&after.ns);
        }
        if before.db != after.db {
            self.db.clone_from(&after.db);
        }
    }
}

/// A document engine that the boundary layer drives.
///
/// Implementations must be safe to share across threads. Every method is
/// synchronous.
pub trait Engine: Send + Sync {
    /// Runs a batch of statements.
    ///
    /// The outer error is a whole-call failure such as a parse error. Each
    /// inner result belongs to one statement, in submission order.
    fn execute(
        &self,
        session: &mut Session,
        text: &str,
        vars: &Vars,
    ) -> CoreResult<Vec<CoreResult<Value>>>;

    /// Reads every record of a table, or a single record, as an array.
    fn select(&self, session: &Session, resource: &str) -> CoreResult<Value>;

    /// Creates a record from the given content and returns it.
    fn create(&self, session: &Session, resource: &str, content: Object) -> CoreResult<Value>;

    /// Opens a live query on a table or record.
    fn live(&self, session: &Session, resource: &str) -> CoreResult<LiveSubscription>;

    /// Engine version string.
    fn version(&self) -> String;

    /// Switches the session's namespace.
    fn use_ns(&self, session: &mut Session, ns: &str) -> CoreResult<()> {
        if ns.is_empty() {
            return Err(CoreError::invalid_operation("namespace name is empty"));
        }
        session.ns = Some(ns.to_string());
        Ok(())
    }

    /// Switches the session's database.
    fn use_db(&self, session: &mut Session, db: &str) -> CoreResult<()> {
        if db.is_empty() {
            return Err(CoreError::invalid_operation("database name is empty"));
        }
        session.db = Some(db.to_string());
        Ok(())
    }
}

/// Opens an engine for the given endpoint.
///
/// `memory` and any `mem://` endpoint select the in-memory datastore.
pub fn connect(endpoint: &str, config: Config) -> CoreResult<Arc<dyn Engine>> {
    if endpoint == "memory" || endpoint.starts_with("mem://") {
        tracing::debug!(endpoint, ?config, "opening in-memory datastore");
        Ok(Arc::new(Datastore::new(config)))
    } else {
        Err(CoreError::unsupported_endpoint(endpoint))
    }
}
