//! Live-query feed.
//!
//! The feed fans record changes out to live-query subscribers. Each
//! subscriber is scoped to one namespace, database and table, and
//! optionally to a single record. Changes are emitted only after the
//! statement that made them has succeeded.
//!
//! A [`LiveSubscription`] is the reading end. `next()` blocks until a
//! notification arrives or the subscription ends; `kill()` may be called
//! from another thread while `next()` is blocked and wakes it.

use crate::value::{RecordKey, Value};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Weak};
use uuid::Uuid;

/// Kind of change carried by a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Record was created.
    Create,
    /// Record was updated.
    Update,
    /// Record was deleted.
    Delete,
}

/// One change delivered to a live query.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Id of the live query that matched.
    pub query_id: Uuid,
    /// Type of change.
    pub action: Action,
    /// The record after the change, or the removed record for deletes.
    pub data: Value,
}

/// A record change produced by a statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// Table of the changed record.
    pub tb: String,
    /// Key of the changed record.
    pub key: RecordKey,
    /// Type of change.
    pub action: Action,
    /// Record contents.
    pub data: Value,
}

/// What a live query listens to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveScope {
    /// Namespace.
    pub ns: String,
    /// Database.
    pub db: String,
    /// Table.
    pub tb: String,
    /// Single record, or every record of the table.
    pub record: Option<RecordKey>,
}

impl LiveScope {
    fn covers(&self, ns: &str, db: &str, change: &Change) -> bool {
        self.ns == ns
            && self.db == db
            && self.tb == change.tb
            && self.record.as_ref().map_or(true, |k| *k == change.key)
    }
}

#[derive(Debug)]
enum LiveMessage {
    Notify(Notification),
    Closed,
}

struct Subscriber {
    id: Uuid,
    scope: LiveScope,
    tx: Sender<LiveMessage>,
}

/// Distributes record changes to live-query subscribers.
#[derive(Default)]
pub struct LiveFeed {
    subscribers: RwLock<Vec<Subscriber>>,
}

impl LiveFeed {
    /// Creates an empty feed.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a live query.
    pub fn subscribe(self: &Arc<Self>, scope: LiveScope) -> LiveSubscription {
        let (tx, rx) = mpsc::channel();
        let id = Uuid::new_v4();
        self.subscribers.write().push(Subscriber { id, scope, tx });
        tracing::debug!(%id, "live query registered");
        LiveSubscription {
            id,
            receiver: Mutex::new(rx),
            closed: AtomicBool::new(false),
            feed: Arc::downgrade(self),
        }
    }

    /// Delivers a change to every subscriber whose scope covers it.
    ///
    /// Subscribers whose reading end has gone away are dropped.
    pub fn emit(&self, ns: &str, db: &str, change: &Change) {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|sub| {
            if !sub.scope.covers(ns, db, change) {
                return true;
            }
            let notification = Notification {
                query_id: sub.id,
                action: change.action,
                data: change.data.clone(),
            };
            sub.tx.send(LiveMessage::Notify(notification)).is_ok()
        });
    }

    /// Ends a live query, waking its reader.
    ///
    /// Returns false if no live query has that id.
    pub fn kill(&self, id: Uuid) -> bool {
        let mut subscribers = self.subscribers.write();
        let Some(pos) = subscribers.iter().position(|sub| sub.id == id) else {
            return false;
        };
        let sub = subscribers.swap_remove(pos);
        let _ = sub.tx.send(LiveMessage::Closed);
        tracing::debug!(%id, "live query killed");
        true
    }

    /// Returns the number of registered live queries.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

/// The reading end of a live query.
///
/// `Open` until the query is killed or the engine goes away, then
/// `Closed` for good.
pub struct LiveSubscription {
    id: Uuid,
    receiver: Mutex<Receiver<LiveMessage>>,
    closed: AtomicBool,
    feed: Weak<LiveFeed>,
}

impl LiveSubscription {
    /// Id of this live query.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns true once the subscription has ended.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Blocks until the next notification, or returns None once closed.
    pub fn next(&self) -> Option<Notification> {
        if self.is_closed() {
            return None;
        }
        let receiver = self.receiver.lock();
        if self.is_closed() {
            return None;
        }
        match receiver.recv() {
            Ok(LiveMessage::Notify(notification)) => Some(notification),
            Ok(LiveMessage::Closed) | Err(_) => {
                self.closed.store(true, Ordering::Release);
                None
            }
        }
    }

    /// Ends the live query. Idempotent.
    pub fn kill(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(feed) = self.feed.upgrade() {
            feed.kill(self.id);
        }
    }
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        self.kill();
    }
}

impl std::fmt::Debug for LiveSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSubscription")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn scope(record: Option<RecordKey>) -> LiveScope {
        LiveScope {
            ns: "test".into(),
            db: "test".into(),
            tb: "foo".into(),
            record,
        }
    }

    fn change(key: i64, action: Action) -> Change {
        Change {
            tb: "foo".into(),
            key: RecordKey::Number(key),
            action,
            data: Value::from(key),
        }
    }

    #[test]
    fn emit_and_receive() {
        let feed = LiveFeed::new();
        let sub = feed.subscribe(scope(None));

        feed.emit("test", "test", &change(1, Action::Create));

        let n = sub.next().unwrap();
        assert_eq!(n.query_id, sub.id());
        assert_eq!(n.action, Action::Create);
        assert_eq!(n.data, Value::from(1i64));
    }

    #[test]
    fn scope_filters_changes() {
        let feed = LiveFeed::new();
        let sub = feed.subscribe(scope(Some(RecordKey::Number(2))));

        feed.emit("test", "test", &change(1, Action::Create));
        feed.emit("other", "test", &change(2, Action::Create));
        feed.emit("test", "test", &change(2, Action::Update));

        let n = sub.next().unwrap();
        assert_eq!(n.action, Action::Update);
        assert_eq!(n.data, Value::from(2i64));
    }

    #[test]
    fn kill_is_terminal_and_idempotent() {
        let feed = LiveFeed::new();
        let sub = feed.subscribe(scope(None));
        assert_eq!(feed.subscriber_count(), 1);

        sub.kill();
        sub.kill();
        assert_eq!(feed.subscriber_count(), 0);
        assert!(sub.next().is_none());
        assert!(sub.next().is_none());

        feed.emit("test", "test", &change(1, Action::Create));
        assert!(sub.next().is_none());
    }

    #[test]
    fn kill_wakes_blocked_reader() {
        let feed = LiveFeed::new();
        let sub = Arc::new(feed.subscribe(scope(None)));

        let reader = {
            let sub = Arc::clone(&sub);
            thread::spawn(move || sub.next())
        };
        thread::sleep(Duration::from_millis(50));
        sub.kill();

        assert!(reader.join().unwrap().is_none());
        assert!(sub.is_closed());
    }

    #[test]
    fn dropping_feed_ends_subscription() {
        let feed = LiveFeed::new();
        let sub = feed.subscribe(scope(None));
        drop(feed);
        assert!(sub.next().is_none());
        assert!(sub.is_closed());
    }

    #[test]
    fn dropped_subscription_unregisters() {
        let feed = LiveFeed::new();
        let sub = feed.subscribe(scope(None));
        drop(sub);
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn unknown_kill_returns_false() {
        let feed = LiveFeed::new();
        assert!(!feed.kill(Uuid::new_v4()));
    }
}
