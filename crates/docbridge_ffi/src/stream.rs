//! Live-query stream FFI functions.

use crate::notification::DbrNotification;
use crate::types::DbrStream;
use docbridge_core::{LiveSubscription, Notification};

/// Internal stream state behind a `DbrStream` pointer.
pub struct Stream {
    subscription: LiveSubscription,
}

impl Stream {
    /// Wraps a live subscription.
    pub fn new(subscription: LiveSubscription) -> Self {
        Self { subscription }
    }

    /// Blocks until the next notification, or returns None once closed.
    pub fn next(&self) -> Option<Notification> {
        self.subscription.next()
    }

    /// Ends the stream. Idempotent.
    pub fn kill(&self) {
        self.subscription.kill();
    }

    /// Moves the stream behind an opaque pointer.
    pub fn into_raw(self) -> *mut DbrStream {
        Box::into_raw(Box::new(self)).cast::<DbrStream>()
    }
}

/// Blocks until the next notification arrives or the stream ends.
///
/// Once the stream has ended (killed, or the connection went away) every
/// call returns `present = false` without blocking. A null stream also
/// yields `present = false`.
///
/// # Safety
///
/// `stream` must be null or a live stream from `dbr_select_live`. Only
/// `dbr_stream_kill` may be called on it concurrently.
#[no_mangle]
pub unsafe extern "C" fn dbr_stream_next(stream: *mut DbrStream) -> DbrNotification {
    let Some(stream) = stream.cast::<Stream>().as_ref() else {
        return DbrNotification::end();
    };
    DbrNotification::from(stream.next())
}

/// Ends a stream and releases its subscription.
///
/// Safe to call from another thread while `dbr_stream_next` is blocked;
/// that call then returns `present = false`. The handle stays valid until
/// `dbr_stream_free`.
///
/// # Safety
///
/// `stream` must be null or a live stream from `dbr_select_live`.
#[no_mangle]
pub unsafe extern "C" fn dbr_stream_kill(stream: *mut DbrStream) {
    if let Some(stream) = stream.cast::<Stream>().as_ref() {
        stream.kill();
        tracing::debug!(id = %stream.subscription.id(), "stream killed");
    }
}

/// Releases a stream handle, killing it first if needed.
///
/// # Safety
///
/// `stream` must be null or a live stream from `dbr_select_live`, with no
/// other call in progress on it. It must not be used after this call.
#[no_mangle]
pub unsafe extern "C" fn dbr_stream_free(stream: *mut DbrStream) {
    if !stream.is_null() {
        let stream = Box::from_raw(stream.cast::<Stream>());
        stream.kill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::DbrAction;
    use docbridge_core::{Action, Change, LiveFeed, LiveScope, RecordKey, Value};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn open(feed: &Arc<LiveFeed>) -> *mut DbrStream {
        let sub = feed.subscribe(LiveScope {
            ns: "test".into(),
            db: "test".into(),
            tb: "foo".into(),
            record: None,
        });
        Stream::new(sub).into_raw()
    }

    #[test]
    fn next_after_kill_is_terminal() {
        let feed = LiveFeed::new();
        let stream = open(&feed);
        unsafe {
            dbr_stream_kill(stream);
            assert!(!dbr_stream_next(stream).present);
            assert!(!dbr_stream_next(stream).present);
            dbr_stream_kill(stream);
            dbr_stream_free(stream);
        }
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn delivers_notification() {
        let feed = LiveFeed::new();
        let stream = open(&feed);
        feed.emit(
            "test",
            "test",
            &Change {
                tb: "foo".into(),
                key: RecordKey::Number(1),
                action: Action::Create,
                data: Value::from(1i64),
            },
        );
        unsafe {
            let n = dbr_stream_next(stream);
            assert!(n.present);
            assert_eq!(n.action, DbrAction::Create);
            dbr_stream_free(stream);
        }
    }

    #[test]
    fn kill_from_another_thread_unblocks_next() {
        struct SendPtr(*mut DbrStream);
        // Safety: the stream is only killed from the other thread.
        unsafe impl Send for SendPtr {}

        let feed = LiveFeed::new();
        let stream = open(&feed);
        let killer = SendPtr(stream);
        let handle = thread::spawn(move || {
            let killer = killer;
            thread::sleep(Duration::from_millis(50));
            unsafe { dbr_stream_kill(killer.0) };
        });
        let n = unsafe { dbr_stream_next(stream) };
        assert!(!n.present);
        handle.join().unwrap();
        unsafe { dbr_stream_free(stream) };
    }

    #[test]
    fn null_stream() {
        unsafe {
            assert!(!dbr_stream_next(std::ptr::null_mut()).present);
            dbr_stream_kill(std::ptr::null_mut());
            dbr_stream_free(std::ptr::null_mut());
        }
    }
}
