use crate::db::models::notification::{PRIORITY_CRITICAL, PRIORITY_HIGH, PRIORITY_NORMAL};
use crate::events::{ORDER_COMPLETED, PAYMENT_FAILED, USER_REGISTERED};

/// Static event-type -> priority mapping. Every entry in
/// `events::ALL_EVENT_TYPES` must be covered here; an unmatched event type
/// is a programming error, not a data error, since `parse_event` has
/// already rejected unknown types by the time priority is looked up.
pub fn priority_for_event_type(event_type: &str) -> &'static str {
    match event_type {
        USER_REGISTERED => PRIORITY_NORMAL,
        ORDER_COMPLETED => PRIORITY_HIGH,
        PAYMENT_FAILED => PRIORITY_CRITICAL,
        other => unreachable!("no priority mapping for event type {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_event_types() {
        assert_eq!(priority_for_event_type(USER_REGISTERED), PRIORITY_NORMAL);
        assert_eq!(priority_for_event_type(ORDER_COMPLETED), PRIORITY_HIGH);
        assert_eq!(priority_for_event_type(PAYMENT_FAILED), PRIORITY_CRITICAL);
    }

    #[test]
    #[should_panic]
    fn panics_on_unknown_event_type() {
        priority_for_event_type("something.else");
    }
}
