//! Live-query notifications.

use crate::value::{render, DbrUuid, DbrValue};
use docbridge_core::{Action, Notification};
use uuid::Uuid;

/// Type of change in a notification.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbrAction {
    /// Record was created.
    Create,
    /// Record was updated.
    Update,
    /// Record was deleted.
    Delete,
}

impl From<Action> for DbrAction {
    fn from(action: Action) -> Self {
        match action {
            Action::Create => DbrAction::Create,
            Action::Update => DbrAction::Update,
            Action::Delete => DbrAction::Delete,
        }
    }
}

/// One item from a live-query stream.
///
/// `present == false` marks the end of the stream; the other fields are
/// then empty and nothing needs to be freed.
#[repr(C)]
#[derive(Debug, PartialEq)]
pub struct DbrNotification {
    /// Whether this is a notification or the end-of-stream marker.
    pub present: bool,
    /// Id of the live query.
    pub query_id: DbrUuid,
    /// Type of change.
    pub action: DbrAction,
    /// The record after the change, or the removed record for deletes.
    pub data: DbrValue,
}

impl DbrNotification {
    /// The end-of-stream marker.
    pub fn end() -> Self {
        Self {
            present: false,
            query_id: DbrUuid::from(Uuid::nil()),
            action: DbrAction::Create,
            data: DbrValue::None,
        }
    }
}

impl From<Option<Notification>> for DbrNotification {
    fn from(notification: Option<Notification>) -> Self {
        match notification {
            Some(n) => Self {
                present: true,
                query_id: n.query_id.into(),
                action: n.action.into(),
                data: n.data.into(),
            },
            None => Self::end(),
        }
    }
}

/// Prints a notification to standard output.
///
/// # Safety
///
/// `notification` must be null or point to a live notification.
#[no_mangle]
pub unsafe extern "C" fn dbr_print_notification(notification: *const DbrNotification) {
    let Some(n) = notification.as_ref() else {
        println!("(null)");
        return;
    };
    if !n.present {
        println!("Notification {{ end of stream }}");
        return;
    }
    println!(
        "Notification {{ query_id: {}, action: {:?}, data: {} }}",
        Uuid::from_bytes(n.query_id.0),
        n.action,
        render(&n.data)
    );
}

/// Frees a notification's data.
///
/// # Safety
///
/// The notification must have come from `dbr_stream_next` and not been
/// freed before.
#[no_mangle]
pub unsafe extern "C" fn dbr_free_notification(notification: DbrNotification) {
    drop(notification);
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbridge_core::Value;

    #[test]
    fn from_core_notification() {
        let id = Uuid::new_v4();
        let n = DbrNotification::from(Some(Notification {
            query_id: id,
            action: Action::Delete,
            data: Value::from(7i64),
        }));
        assert!(n.present);
        assert_eq!(n.query_id, DbrUuid(*id.as_bytes()));
        assert_eq!(n.action, DbrAction::Delete);
        assert_eq!(n.data, DbrValue::from(Value::from(7i64)));
        unsafe { dbr_free_notification(n) };
    }

    #[test]
    fn end_of_stream() {
        let n = DbrNotification::from(None);
        assert!(!n.present);
        assert_eq!(n.data, DbrValue::None);
        assert_eq!(n, DbrNotification::end());
    }
}
