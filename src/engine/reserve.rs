//! The reservation path: create, reschedule, lifecycle transitions,
//! deletion. Every mutating call here runs under the room's write lock
//! (both rooms', in sorted id order, for a cross-room move) and commits
//! as a single WAL event.

use std::time::Instant;

use ulid::Ulid;

use super::conflict::{self, now_ms};
use super::error::{EngineError, Result};
use super::{Engine, pricing};
use crate::identity::Caller;
use crate::model::{
    Booking, BookingChange, BookingReceipt, BookingRequest, BookingStatus, Event,
};
use crate::notify::BookingNotice;
use crate::observability;

impl Engine {
    /// Reserve a room for a date range. On success the booking is durably
    /// committed, `Pending`, with every covered ledger row flipped to
    /// `NotAvailable`; on any failure nothing is applied and the first
    /// failing reason propagates.
    pub async fn create_booking(
        &self,
        caller: &Caller,
        req: BookingRequest,
    ) -> Result<BookingReceipt> {
        let started = Instant::now();
        let result = self.create_booking_inner(caller, &req).await;
        record_outcome("create", started, &result);
        result
    }

    async fn create_booking_inner(
        &self,
        caller: &Caller,
        req: &BookingRequest,
    ) -> Result<BookingReceipt> {
        let _gate = self.compact_gate.read().await;
        let rs_arc = self
            .room(&req.room_id)
            .ok_or(EngineError::RoomNotFound(req.room_id))?;
        let range = conflict::validate_range(req.start_date, req.end_date)?;
        conflict::validate_guests(req.guests)?;
        if !self.users.contains_key(&caller.user_id) {
            return Err(EngineError::UserNotFound(caller.user_id));
        }

        // Lock held from the conflict check through the applied write:
        // no concurrent attempt can interleave on this room.
        let mut rs = rs_arc.write_owned().await;
        self.room_live(&req.room_id)?;
        conflict::check_range_open(&rs, &range, None, None)?;
        let total_price = pricing::quote(&rs, &range)?;

        let booking_id = Ulid::new();
        let code = self.claim_code(booking_id)?;
        let event = Event::BookingCreated {
            id: booking_id,
            room_id: req.room_id,
            user_id: caller.user_id,
            range,
            guests: req.guests,
            code: code.clone(),
            total_price,
            created_at: now_ms(),
        };

        if let Err(e) = self.persist_and_apply(req.room_id, &mut rs, &event).await {
            // The code claim is the only state touched before the WAL
            // append; release it so the failed attempt leaves no trace.
            self.codes.remove(&code);
            return Err(e);
        }
        drop(rs);

        metrics::gauge!(observability::BOOKINGS_ACTIVE).increment(1.0);
        tracing::info!(booking = %booking_id, room = %req.room_id, %code, "booking created");
        self.dispatch_notice(BookingNotice {
            code: code.clone(),
            room_id: req.room_id,
            range,
            guests: req.guests,
            total_price,
            status: BookingStatus::Pending,
        });

        Ok(BookingReceipt {
            booking_id,
            code,
            total_price,
            status: BookingStatus::Pending,
        })
    }

    /// Reschedule a booking: new dates, new guest count and/or a new room.
    /// The old range is released and the new one reserved as one committed
    /// event; the booking's own current hold never blocks its own move.
    pub async fn update_booking(
        &self,
        booking_id: Ulid,
        change: BookingChange,
    ) -> Result<BookingReceipt> {
        let started = Instant::now();
        let result = self.update_booking_inner(booking_id, &change).await;
        record_outcome("update", started, &result);
        result
    }

    async fn update_booking_inner(
        &self,
        booking_id: Ulid,
        change: &BookingChange,
    ) -> Result<BookingReceipt> {
        let _gate = self.compact_gate.read().await;
        let old_room_id = self
            .room_for_entity(&booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        let new_room_id = change.room_id.unwrap_or(old_room_id);
        let old_arc = self
            .room(&old_room_id)
            .ok_or(EngineError::RoomNotFound(old_room_id))?;

        // Cross-room moves take both locks in sorted id order so two
        // opposite moves cannot deadlock.
        let (mut old_guard, mut new_guard) = if new_room_id == old_room_id {
            (old_arc.write_owned().await, None)
        } else {
            let new_arc = self
                .room(&new_room_id)
                .ok_or(EngineError::RoomNotFound(new_room_id))?;
            if old_room_id < new_room_id {
                let a = old_arc.write_owned().await;
                let b = new_arc.write_owned().await;
                (a, Some(b))
            } else {
                let b = new_arc.write_owned().await;
                let a = old_arc.write_owned().await;
                (a, Some(b))
            }
        };
        self.room_live(&old_room_id)?;
        if new_room_id != old_room_id {
            self.room_live(&new_room_id)?;
        }

        let booking: Booking = old_guard
            .booking(booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?
            .clone();
        if !booking.status.is_active() {
            return Err(EngineError::BookingClosed(booking_id));
        }

        let start = change.start_date.unwrap_or(booking.range.start);
        let end = change.end_date.unwrap_or(booking.range.end);
        let range = conflict::validate_range(start, end)?;
        let guests = change.guests.unwrap_or(booking.guests);
        conflict::validate_guests(guests)?;

        let own_rows = (new_room_id == old_room_id).then_some(booking.range);
        let total_price = {
            let target = new_guard.as_deref().unwrap_or(&old_guard);
            conflict::check_range_open(target, &range, Some(booking_id), own_rows.as_ref())?;
            pricing::quote(target, &range)?
        };

        let event = Event::BookingRescheduled {
            id: booking_id,
            old_room_id,
            room_id: new_room_id,
            range,
            guests,
            total_price,
        };
        self.wal_append(&event).await?;
        self.apply_reschedule(
            &mut old_guard,
            new_guard.as_deref_mut(),
            booking_id,
            range,
            guests,
            total_price,
        );
        self.notify.send(old_room_id, &event);
        if new_room_id != old_room_id {
            self.notify.send(new_room_id, &event);
        }

        tracing::info!(booking = %booking_id, room = %new_room_id, "booking rescheduled");
        self.dispatch_notice(BookingNotice {
            code: booking.code.clone(),
            room_id: new_room_id,
            range,
            guests,
            total_price,
            status: booking.status,
        });

        Ok(BookingReceipt {
            booking_id,
            code: booking.code,
            total_price,
            status: booking.status,
        })
    }

    /// Move a booking through its lifecycle. Allowed transitions:
    /// `Pending → Confirmed`, `Pending/Confirmed → Cancelled`,
    /// `Confirmed → Completed`. Cancellation releases the held dates and
    /// restores the room flag if no other active booking remains.
    pub async fn transition_booking(&self, booking_id: Ulid, to: BookingStatus) -> Result<()> {
        let _gate = self.compact_gate.read().await;
        let (room_id, mut rs) = self
            .resolve_entity_write(&booking_id, EngineError::BookingNotFound)
            .await?;
        let from = rs
            .booking(booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?
            .status;

        let allowed = matches!(
            (from, to),
            (BookingStatus::Pending, BookingStatus::Confirmed)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Completed)
        );
        if !allowed {
            return Err(EngineError::InvalidTransition { from, to });
        }

        let event = Event::BookingStatusChanged {
            id: booking_id,
            room_id,
            status: to,
        };
        self.persist_and_apply(room_id, &mut rs, &event).await?;
        if !to.is_active() {
            metrics::gauge!(observability::BOOKINGS_ACTIVE).decrement(1.0);
        }
        tracing::info!(booking = %booking_id, %from, %to, "booking transitioned");
        Ok(())
    }

    pub async fn cancel_booking(&self, booking_id: Ulid) -> Result<()> {
        self.transition_booking(booking_id, BookingStatus::Cancelled)
            .await
    }

    /// Remove a booking entirely. An active booking's held dates are
    /// released exactly as on cancellation — deletion never strands
    /// `NotAvailable` rows.
    pub async fn delete_booking(&self, booking_id: Ulid) -> Result<()> {
        let _gate = self.compact_gate.read().await;
        let (room_id, mut rs) = self
            .resolve_entity_write(&booking_id, EngineError::BookingNotFound)
            .await?;
        let was_active = rs
            .booking(booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?
            .status
            .is_active();

        let event = Event::BookingDeleted {
            id: booking_id,
            room_id,
        };
        self.persist_and_apply(room_id, &mut rs, &event).await?;
        if was_active {
            metrics::gauge!(observability::BOOKINGS_ACTIVE).decrement(1.0);
        }
        tracing::info!(booking = %booking_id, "booking deleted");
        Ok(())
    }

    /// Fire-and-forget guest notification. Delivery failures are logged,
    /// never surfaced — the booking is already committed.
    fn dispatch_notice(&self, notice: BookingNotice) {
        let Some(sink) = self.sink.clone() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = sink.deliver(notice.to_string()).await {
                tracing::warn!(code = %notice.code, error = %e, "notification delivery failed");
            }
        });
    }
}

fn record_outcome<T>(op: &'static str, started: Instant, result: &Result<T>) {
    let outcome = observability::outcome_label(result);
    metrics::counter!(observability::RESERVATIONS_TOTAL, "op" => op, "outcome" => outcome)
        .increment(1);
    metrics::histogram!(observability::RESERVATION_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());
}
