//! Read-only queries and host-facing reports. Everything here takes room
//! read locks only and never touches the WAL.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use ulid::Ulid;

use super::error::{EngineError, Result};
use super::{Engine, SharedRoomState};
use crate::model::{
    Accommodation, AccommodationIncome, AvailabilityRecord, Booking, BookingStatus, DateRange,
    Period, PeriodCount, RoomInfo, UserAccount,
};

impl Engine {
    fn room_arcs(&self) -> Vec<SharedRoomState> {
        self.rooms.iter().map(|e| e.value().clone()).collect()
    }

    // ── Lookups ──────────────────────────────────────────

    pub fn user(&self, id: &Ulid) -> Option<UserAccount> {
        self.users.get(id).map(|e| e.value().clone())
    }

    pub fn accommodation(&self, id: &Ulid) -> Option<Accommodation> {
        self.accommodations.get(id).map(|e| e.value().clone())
    }

    pub fn list_accommodations(&self) -> Vec<Accommodation> {
        self.accommodations.iter().map(|e| e.value().clone()).collect()
    }

    pub async fn room_info(&self, id: &Ulid) -> Result<RoomInfo> {
        let rs_arc = self.room(id).ok_or(EngineError::RoomNotFound(*id))?;
        let rs = rs_arc.read().await;
        Ok(RoomInfo {
            id: rs.id,
            accommodation_id: rs.accommodation_id,
            room_type: rs.room_type.clone(),
            capacity: rs.capacity,
            beds: rs.beds,
            base_price: rs.base_price,
            is_available: rs.is_available,
        })
    }

    pub async fn list_rooms(&self) -> Vec<RoomInfo> {
        let mut rooms = Vec::new();
        for rs_arc in self.room_arcs() {
            let rs = rs_arc.read().await;
            rooms.push(RoomInfo {
                id: rs.id,
                accommodation_id: rs.accommodation_id,
                room_type: rs.room_type.clone(),
                capacity: rs.capacity,
                beds: rs.beds,
                base_price: rs.base_price,
                is_available: rs.is_available,
            });
        }
        rooms
    }

    /// Ledger rows for a room over a half-open range, ordered by date.
    pub async fn availability_in_range(
        &self,
        room_id: &Ulid,
        range: &DateRange,
    ) -> Result<Vec<AvailabilityRecord>> {
        let rs_arc = self.room(room_id).ok_or(EngineError::RoomNotFound(*room_id))?;
        let rs = rs_arc.read().await;
        Ok(rs.records_in_range(range).to_vec())
    }

    // ── Bookings ─────────────────────────────────────────

    pub async fn booking_by_id(&self, booking_id: &Ulid) -> Option<Booking> {
        let room_id = self.room_for_entity(booking_id)?;
        let rs_arc = self.room(&room_id)?;
        let rs = rs_arc.read().await;
        rs.booking(*booking_id).cloned()
    }

    pub async fn booking_by_code(&self, code: &str) -> Option<Booking> {
        let booking_id = *self.codes.get(code)?.value();
        self.booking_by_id(&booking_id).await
    }

    pub async fn list_bookings(&self) -> Vec<Booking> {
        let mut bookings = Vec::new();
        for rs_arc in self.room_arcs() {
            let rs = rs_arc.read().await;
            bookings.extend(rs.bookings.iter().cloned());
        }
        bookings
    }

    /// All bookings taken on the host's accommodations.
    pub async fn bookings_by_host(&self, host_id: &Ulid) -> Vec<Booking> {
        let mut bookings = Vec::new();
        for rs_arc in self.room_arcs() {
            let rs = rs_arc.read().await;
            let hosted = self
                .accommodations
                .get(&rs.accommodation_id)
                .is_some_and(|a| a.host_id == *host_id);
            if hosted {
                bookings.extend(rs.bookings.iter().cloned());
            }
        }
        bookings
    }

    // ── Reports ──────────────────────────────────────────

    /// Total booking income per accommodation, highest earner first.
    /// Counts every committed booking regardless of status — income here
    /// is gross, not realized.
    pub async fn income_by_accommodation(&self) -> Vec<AccommodationIncome> {
        let mut totals: BTreeMap<Ulid, f64> = BTreeMap::new();
        for rs_arc in self.room_arcs() {
            let rs = rs_arc.read().await;
            let total: f64 = rs.bookings.iter().map(|b| b.total_price).sum();
            *totals.entry(rs.accommodation_id).or_insert(0.0) += total;
        }

        let mut report: Vec<AccommodationIncome> = self
            .accommodations
            .iter()
            .map(|acc| AccommodationIncome {
                accommodation_id: acc.id,
                name: acc.name.clone(),
                total_income: totals.get(&acc.id).copied().unwrap_or(0.0),
            })
            .collect();
        report.sort_by(|a, b| {
            b.total_income
                .partial_cmp(&a.total_income)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        report
    }

    /// Realized earnings for one host: confirmed bookings whose stay falls
    /// entirely inside the window.
    pub async fn earnings_by_host(&self, host_id: &Ulid, window: &DateRange) -> f64 {
        let mut earned = 0.0;
        for rs_arc in self.room_arcs() {
            let rs = rs_arc.read().await;
            let hosted = self
                .accommodations
                .get(&rs.accommodation_id)
                .is_some_and(|a| a.host_id == *host_id);
            if !hosted {
                continue;
            }
            earned += rs
                .bookings
                .iter()
                .filter(|b| {
                    b.status == BookingStatus::Confirmed
                        && b.range.start >= window.start
                        && b.range.end <= window.end
                })
                .map(|b| b.total_price)
                .sum::<f64>();
        }
        earned
    }

    /// Booking counts bucketed by check-in date, truncated to the period.
    /// Optionally restricted to one accommodation. Buckets come back in
    /// chronological order; empty buckets are omitted.
    pub async fn bookings_grouped_by_period(
        &self,
        period: Period,
        accommodation_id: Option<Ulid>,
    ) -> Vec<PeriodCount> {
        let mut buckets: BTreeMap<NaiveDate, u64> = BTreeMap::new();
        for rs_arc in self.room_arcs() {
            let rs = rs_arc.read().await;
            if let Some(acc) = accommodation_id
                && rs.accommodation_id != acc
            {
                continue;
            }
            for booking in &rs.bookings {
                *buckets.entry(period.truncate(booking.range.start)).or_insert(0) += 1;
            }
        }
        buckets
            .into_iter()
            .map(|(bucket, bookings)| PeriodCount { bucket, bookings })
            .collect()
    }
}
