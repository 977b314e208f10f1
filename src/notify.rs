use std::fmt;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::{BookingStatus, DateRange, Event};

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for committed events, one channel per room.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to notifications for a room. Creates the channel if needed.
    pub fn subscribe(&self, room_id: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, room_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&room_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Remove a channel (e.g. when a room is deleted).
    pub fn remove(&self, room_id: &Ulid) {
        self.channels.remove(room_id);
    }
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Post-commit delivery seam for guest-facing confirmations.
///
/// Invoked fire-and-forget after a booking commits; a failed delivery is
/// logged and never rolls the booking back.
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(
        &self,
        summary: String,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Guest-facing summary of a committed booking.
#[derive(Debug, Clone, Serialize)]
pub struct BookingNotice {
    pub code: String,
    pub room_id: Ulid,
    pub range: DateRange,
    pub guests: u32,
    pub total_price: f64,
    pub status: BookingStatus,
}

impl BookingNotice {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl fmt::Display for BookingNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "booking {}: room {} from {} to {} for {} guest(s), total {:.2} ({})",
            self.code,
            self.room_id,
            self.range.start,
            self.range.end,
            self.guests,
            self.total_price,
            self.status
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let room_id = Ulid::new();
        let mut rx = hub.subscribe(room_id);

        let event = Event::RoomDeleted { id: room_id };
        hub.send(room_id, &event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        let room_id = Ulid::new();
        // No subscriber — should not panic
        hub.send(room_id, &Event::RoomDeleted { id: room_id });
    }

    #[test]
    fn notice_summary_mentions_code_and_dates() {
        let notice = BookingNotice {
            code: "RES-AB1234".into(),
            room_id: Ulid::new(),
            range: DateRange::new(
                NaiveDate::from_ymd_opt(2025, 8, 15).unwrap(),
                NaiveDate::from_ymd_opt(2025, 8, 18).unwrap(),
            ),
            guests: 2,
            total_price: 300.0,
            status: BookingStatus::Pending,
        };
        let text = notice.to_string();
        assert!(text.contains("RES-AB1234"));
        assert!(text.contains("2025-08-15"));
        assert!(text.contains("300.00"));

        let json = notice.to_json();
        assert!(json.contains("\"code\":\"RES-AB1234\""));
    }
}
