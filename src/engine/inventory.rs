//! Registry CRUD: users, accommodations, rooms, and the host-facing
//! availability ledger operations.

use chrono::NaiveDate;
use ulid::Ulid;

use super::error::{EngineError, Result};
use super::Engine;
use crate::limits;
use crate::model::{AvailabilityStatus, Event, Role};
use crate::observability;

fn check_len(value: &str, max: usize, what: &'static str) -> Result<()> {
    if value.is_empty() || value.len() > max {
        return Err(EngineError::LimitExceeded(what));
    }
    Ok(())
}

fn check_price(price: f64) -> Result<()> {
    if !(price > 0.0) {
        return Err(EngineError::InvalidPrice(price));
    }
    Ok(())
}

impl Engine {
    // ── Users & accommodations ───────────────────────────

    /// Register an account. Emails are unique; a second registration with
    /// the same address is rejected with the existing account's id.
    pub async fn register_user(&self, name: &str, email: &str, role: Role) -> Result<Ulid> {
        let _gate = self.compact_gate.read().await;
        check_len(name, limits::MAX_NAME_LEN, "user name")?;
        check_len(email, limits::MAX_NAME_LEN, "email")?;
        if let Some(existing) = self.emails.get(email) {
            return Err(EngineError::AlreadyExists(*existing.value()));
        }

        let id = Ulid::new();
        self.persist_global(&Event::UserRegistered {
            id,
            name: name.to_string(),
            email: email.to_string(),
            role,
        })
        .await?;
        tracing::info!(user = %id, %email, "user registered");
        Ok(id)
    }

    pub async fn create_accommodation(
        &self,
        host_id: Ulid,
        name: &str,
        location: &str,
    ) -> Result<Ulid> {
        let _gate = self.compact_gate.read().await;
        check_len(name, limits::MAX_NAME_LEN, "accommodation name")?;
        check_len(location, limits::MAX_LOCATION_LEN, "location")?;
        if !self.users.contains_key(&host_id) {
            return Err(EngineError::UserNotFound(host_id));
        }

        let id = Ulid::new();
        self.persist_global(&Event::AccommodationCreated {
            id,
            host_id,
            name: name.to_string(),
            location: location.to_string(),
        })
        .await?;
        tracing::info!(accommodation = %id, host = %host_id, "accommodation created");
        Ok(id)
    }

    // ── Rooms ────────────────────────────────────────────

    pub async fn create_room(
        &self,
        accommodation_id: Ulid,
        room_type: &str,
        capacity: u32,
        beds: u32,
        base_price: f64,
    ) -> Result<Ulid> {
        let _gate = self.compact_gate.read().await;
        check_len(room_type, limits::MAX_ROOM_TYPE_LEN, "room type")?;
        check_price(base_price)?;
        if !self.accommodations.contains_key(&accommodation_id) {
            return Err(EngineError::AccommodationNotFound(accommodation_id));
        }
        if self.rooms.len() >= limits::MAX_ROOMS {
            return Err(EngineError::LimitExceeded("room count"));
        }

        let id = Ulid::new();
        self.persist_global(&Event::RoomCreated {
            id,
            accommodation_id,
            room_type: room_type.to_string(),
            capacity,
            beds,
            base_price,
        })
        .await?;
        metrics::gauge!(observability::ROOMS_ACTIVE).increment(1.0);
        Ok(id)
    }

    pub async fn update_room(
        &self,
        room_id: Ulid,
        room_type: &str,
        capacity: u32,
        beds: u32,
        base_price: f64,
    ) -> Result<()> {
        let _gate = self.compact_gate.read().await;
        check_len(room_type, limits::MAX_ROOM_TYPE_LEN, "room type")?;
        check_price(base_price)?;
        let rs_arc = self.room(&room_id).ok_or(EngineError::RoomNotFound(room_id))?;
        let mut rs = rs_arc.write_owned().await;
        self.room_live(&room_id)?;

        let event = Event::RoomUpdated {
            id: room_id,
            room_type: room_type.to_string(),
            capacity,
            beds,
            base_price,
        };
        self.persist_and_apply(room_id, &mut rs, &event).await
    }

    /// Remove a room and its ledger. Refused while any pending or
    /// confirmed booking still references the room; closed bookings go
    /// down with it.
    pub async fn delete_room(&self, room_id: Ulid) -> Result<()> {
        let _gate = self.compact_gate.read().await;
        let rs_arc = self.room(&room_id).ok_or(EngineError::RoomNotFound(room_id))?;
        // Write lock held through the map removal so no booking can slip
        // into the room between the check and the delete.
        let rs = rs_arc.write().await;
        self.room_live(&room_id)?;
        if rs.has_active_booking_excluding(None) {
            return Err(EngineError::HasActiveBookings(room_id));
        }

        let event = Event::RoomDeleted { id: room_id };
        self.wal_append(&event).await?;
        for record in &rs.records {
            self.entity_to_room.remove(&record.id);
        }
        for booking in &rs.bookings {
            self.entity_to_room.remove(&booking.id);
            self.codes.remove(&booking.code);
        }
        self.rooms.remove(&room_id);
        drop(rs);

        self.notify.send(room_id, &event);
        self.notify.remove(&room_id);
        metrics::gauge!(observability::ROOMS_ACTIVE).decrement(1.0);
        tracing::info!(room = %room_id, "room deleted");
        Ok(())
    }

    // ── Availability ledger ──────────────────────────────

    /// Open a (room, date) ledger row at a nightly price. One row per
    /// date per room.
    pub async fn open_availability(
        &self,
        room_id: Ulid,
        date: NaiveDate,
        price: f64,
    ) -> Result<Ulid> {
        let _gate = self.compact_gate.read().await;
        check_price(price)?;
        let rs_arc = self.room(&room_id).ok_or(EngineError::RoomNotFound(room_id))?;
        let mut rs = rs_arc.write_owned().await;
        self.room_live(&room_id)?;

        if rs.record_at(date).is_some() {
            return Err(EngineError::DuplicateDate { room_id, date });
        }
        if rs.records.len() >= limits::MAX_RECORDS_PER_ROOM {
            return Err(EngineError::LimitExceeded("ledger rows per room"));
        }

        let id = Ulid::new();
        let event = Event::AvailabilityOpened {
            id,
            room_id,
            date,
            price,
        };
        self.persist_and_apply(room_id, &mut rs, &event).await?;
        Ok(id)
    }

    pub async fn reprice_availability(&self, record_id: Ulid, price: f64) -> Result<()> {
        let _gate = self.compact_gate.read().await;
        check_price(price)?;
        let (room_id, mut rs) = self
            .resolve_entity_write(&record_id, EngineError::AvailabilityNotFound)
            .await?;
        if rs.record_by_id(record_id).is_none() {
            return Err(EngineError::AvailabilityNotFound(record_id));
        }

        let event = Event::AvailabilityRepriced {
            id: record_id,
            room_id,
            price,
        };
        self.persist_and_apply(room_id, &mut rs, &event).await
    }

    /// Remove a ledger row. A `NotAvailable` row is held by a booking and
    /// cannot be closed out from under it.
    pub async fn close_availability(&self, record_id: Ulid) -> Result<()> {
        let _gate = self.compact_gate.read().await;
        let (room_id, mut rs) = self
            .resolve_entity_write(&record_id, EngineError::AvailabilityNotFound)
            .await?;
        let record = rs
            .record_by_id(record_id)
            .ok_or(EngineError::AvailabilityNotFound(record_id))?;
        if record.status == AvailabilityStatus::NotAvailable {
            return Err(EngineError::DateRangeUnavailable {
                room_id,
                date: record.date,
            });
        }

        let event = Event::AvailabilityClosed {
            id: record_id,
            room_id,
        };
        self.persist_and_apply(room_id, &mut rs, &event).await
    }

    /// Operator hold: flip a row between `Available` and `Busy`. Rows held
    /// by a booking (`NotAvailable`) are off limits in both directions.
    pub async fn set_availability_status(
        &self,
        record_id: Ulid,
        status: AvailabilityStatus,
    ) -> Result<()> {
        let _gate = self.compact_gate.read().await;
        let (room_id, mut rs) = self
            .resolve_entity_write(&record_id, EngineError::AvailabilityNotFound)
            .await?;
        let record = rs
            .record_by_id(record_id)
            .ok_or(EngineError::AvailabilityNotFound(record_id))?;
        if record.status == AvailabilityStatus::NotAvailable
            || status == AvailabilityStatus::NotAvailable
        {
            return Err(EngineError::DateRangeUnavailable {
                room_id,
                date: record.date,
            });
        }

        let event = Event::AvailabilityStatusSet {
            id: record_id,
            room_id,
            status,
        };
        self.persist_and_apply(room_id, &mut rs, &event).await
    }
}
