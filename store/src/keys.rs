//! Redis key builders.
//!
//! One function per namespace so the layout stays greppable from the
//! operational docs. Changing any of these is a data migration.

use rushgate_core::{BookingId, EventId, UserId, ZoneId};

/// `zone:availability:{zone_id}` -- live seat counter.
#[must_use]
pub fn zone_availability(zone_id: &ZoneId) -> String {
    format!("zone:availability:{zone_id}")
}

/// `user:reservations:{user_id}:{event_id}` -- active booking ids per user.
#[must_use]
pub fn user_reservations(user_id: UserId, event_id: &EventId) -> String {
    format!("user:reservations:{user_id}:{event_id}")
}

/// `reservation:{booking_id}` -- JSON reservation record.
#[must_use]
pub fn reservation(booking_id: BookingId) -> String {
    format!("reservation:{booking_id}")
}

/// `queue:event:{event_id}` -- per-event FIFO ordered set.
#[must_use]
pub fn queue_event(event_id: &EventId) -> String {
    format!("queue:event:{event_id}")
}

/// `queue:event:{event_id}:seq` -- monotonically increasing join sequence.
#[must_use]
pub fn queue_seq(event_id: &EventId) -> String {
    format!("queue:event:{event_id}:seq")
}

/// `queue:events` -- registry of events with an active queue.
#[must_use]
pub fn queue_registry() -> String {
    "queue:events".to_string()
}

/// `queue:user:{event_id}:{user_id}` -- per-user queue hash.
#[must_use]
pub fn queue_user(event_id: &EventId, user_id: UserId) -> String {
    format!("queue:user:{event_id}:{user_id}")
}

/// Prefix for [`queue_user`] keys, used by scripts that derive the key
/// from a popped member.
#[must_use]
pub fn queue_user_prefix(event_id: &EventId) -> String {
    format!("queue:user:{event_id}:")
}

/// `queue:pass:{event_id}:{user_id}` -- issued queue-pass mirror.
#[must_use]
pub fn queue_pass(event_id: &EventId, user_id: UserId) -> String {
    format!("queue:pass:{event_id}:{user_id}")
}

/// `idem:{key}` -- idempotency record.
#[must_use]
pub fn idempotency(key: &str) -> String {
    format!("idem:{key}")
}

/// `ratelimit:{scope}:{key}` -- shared token-bucket hash.
#[must_use]
pub fn rate_limit(scope: &str, key: &str) -> String {
    format!("ratelimit:{scope}:{key}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn namespaces_match_operational_docs() {
        let user = UserId(Uuid::nil());
        let event = EventId::from("ev1");
        assert_eq!(zone_availability(&ZoneId::from("z1")), "zone:availability:z1");
        assert_eq!(
            user_reservations(user, &event),
            format!("user:reservations:{}:ev1", Uuid::nil())
        );
        assert_eq!(queue_event(&event), "queue:event:ev1");
        assert_eq!(queue_user_prefix(&event), "queue:user:ev1:");
        assert_eq!(idempotency("abc"), "idem:abc");
        assert_eq!(rate_limit("shared", "ip:1.2.3.4"), "ratelimit:shared:ip:1.2.3.4");
    }
}
