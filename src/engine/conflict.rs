use chrono::NaiveDate;

use ulid::Ulid;

use super::error::{EngineError, Result};
use crate::limits;
use crate::model::{AvailabilityStatus, DateRange, Ms, RoomState};

/// Current unix time in milliseconds.
pub fn now_ms() -> Ms {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// Check-in must precede check-out, and the stay must fit the hard cap.
pub fn validate_range(start: NaiveDate, end: NaiveDate) -> Result<DateRange> {
    if end <= start {
        return Err(EngineError::InvalidDateRange { start, end });
    }
    let range = DateRange::new(start, end);
    if range.nights() > limits::MAX_STAY_NIGHTS {
        return Err(EngineError::LimitExceeded("stay length"));
    }
    Ok(range)
}

pub fn validate_guests(guests: u32) -> Result<()> {
    if guests == 0 || guests > limits::MAX_GUESTS {
        return Err(EngineError::InvalidGuestCount(guests));
    }
    Ok(())
}

/// The conflict check, two layers:
/// 1. No active booking on this room may overlap `range`. Ledger rows are
///    optional (missing dates are bookable), so the booking scan, not the
///    row scan, is what guarantees no double booking.
/// 2. Every ledger row covered by `range` must be open — `Busy` and
///    `NotAvailable` rows block.
///
/// On a reschedule, `exempt_booking` is the booking being moved (its own
/// hold never blocks its own move) and `exempt_rows` is its old range on
/// this room: `NotAvailable` rows inside it are that booking's own and
/// are skipped.
///
/// Must run under the room's write lock — the lock held from this check
/// through the status write is what rules out a double booking.
pub fn check_range_open(
    rs: &RoomState,
    range: &DateRange,
    exempt_booking: Option<Ulid>,
    exempt_rows: Option<&DateRange>,
) -> Result<()> {
    for booking in &rs.bookings {
        if booking.status.is_active()
            && Some(booking.id) != exempt_booking
            && booking.range.overlaps(range)
        {
            return Err(EngineError::DateRangeUnavailable {
                room_id: rs.id,
                date: range.start.max(booking.range.start),
            });
        }
    }

    for record in rs.records_in_range(range) {
        if !record.status.blocks_booking() {
            continue;
        }
        if record.status == AvailabilityStatus::NotAvailable
            && let Some(own) = exempt_rows
            && own.contains(record.date)
        {
            continue;
        }
        return Err(EngineError::DateRangeUnavailable {
            room_id: rs.id,
            date: record.date,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AvailabilityRecord, Booking, BookingStatus};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn room_with_days(days: std::ops::RangeInclusive<u32>) -> RoomState {
        let mut rs = RoomState::new(Ulid::new(), Ulid::new(), "double".into(), 2, 1, 100.0);
        for day in days {
            rs.insert_record(AvailabilityRecord {
                id: Ulid::new(),
                date: d(2025, 8, day),
                price: 100.0,
                status: AvailabilityStatus::Available,
            });
        }
        rs
    }

    #[test]
    fn rejects_inverted_and_empty_ranges() {
        assert!(matches!(
            validate_range(d(2025, 8, 18), d(2025, 8, 15)),
            Err(EngineError::InvalidDateRange { .. })
        ));
        assert!(matches!(
            validate_range(d(2025, 8, 15), d(2025, 8, 15)),
            Err(EngineError::InvalidDateRange { .. })
        ));
        assert!(validate_range(d(2025, 8, 15), d(2025, 8, 16)).is_ok());
    }

    #[test]
    fn rejects_marathon_stays() {
        let err = validate_range(d(2025, 1, 1), d(2027, 1, 1)).unwrap_err();
        assert_eq!(err, EngineError::LimitExceeded("stay length"));
    }

    #[test]
    fn guest_bounds() {
        assert!(validate_guests(0).is_err());
        assert!(validate_guests(1).is_ok());
        assert!(validate_guests(50).is_ok());
        assert!(validate_guests(51).is_err());
    }

    fn booking(rs: &RoomState, range: DateRange, status: BookingStatus) -> Booking {
        Booking {
            id: Ulid::new(),
            code: "RES-AB1234".into(),
            user_id: Ulid::new(),
            room_id: rs.id,
            range,
            guests: 2,
            status,
            total_price: 100.0,
            created_at: 0,
        }
    }

    #[test]
    fn open_rows_do_not_block() {
        let rs = room_with_days(15..=18);
        let range = DateRange::new(d(2025, 8, 15), d(2025, 8, 18));
        assert!(check_range_open(&rs, &range, None, None).is_ok());
    }

    #[test]
    fn missing_rows_do_not_block() {
        let rs = room_with_days(15..=15);
        let range = DateRange::new(d(2025, 8, 15), d(2025, 8, 20));
        assert!(check_range_open(&rs, &range, None, None).is_ok());
    }

    #[test]
    fn active_booking_blocks_even_without_rows() {
        let mut rs = RoomState::new(Ulid::new(), Ulid::new(), "double".into(), 2, 1, 100.0);
        let held = DateRange::new(d(2025, 8, 15), d(2025, 8, 18));
        let b = booking(&rs, held, BookingStatus::Pending);
        rs.bookings.push(b);

        let overlap = DateRange::new(d(2025, 8, 17), d(2025, 8, 20));
        assert!(check_range_open(&rs, &overlap, None, None).is_err());
        // The adjacent range is fine, and so is the booking's own move.
        let adjacent = DateRange::new(d(2025, 8, 18), d(2025, 8, 20));
        assert!(check_range_open(&rs, &adjacent, None, None).is_ok());
        assert!(check_range_open(&rs, &overlap, Some(rs.bookings[0].id), None).is_ok());
    }

    #[test]
    fn closed_bookings_do_not_block() {
        let mut rs = RoomState::new(Ulid::new(), Ulid::new(), "double".into(), 2, 1, 100.0);
        let held = DateRange::new(d(2025, 8, 15), d(2025, 8, 18));
        let b = booking(&rs, held, BookingStatus::Cancelled);
        rs.bookings.push(b);
        assert!(check_range_open(&rs, &held, None, None).is_ok());
    }

    #[test]
    fn busy_row_blocks() {
        let mut rs = room_with_days(15..=18);
        rs.records[1].status = AvailabilityStatus::Busy;
        let range = DateRange::new(d(2025, 8, 15), d(2025, 8, 18));
        let err = check_range_open(&rs, &range, None, None).unwrap_err();
        assert!(matches!(
            err,
            EngineError::DateRangeUnavailable { date, .. } if date == d(2025, 8, 16)
        ));
    }

    #[test]
    fn booked_row_outside_range_does_not_block() {
        let mut rs = room_with_days(15..=20);
        rs.records[4].status = AvailabilityStatus::NotAvailable; // aug 19
        let range = DateRange::new(d(2025, 8, 15), d(2025, 8, 18));
        assert!(check_range_open(&rs, &range, None, None).is_ok());
    }

    #[test]
    fn own_hold_is_exempt_on_reschedule() {
        let mut rs = room_with_days(15..=20);
        let own = DateRange::new(d(2025, 8, 15), d(2025, 8, 18));
        rs.set_status_in_range(&own, AvailabilityStatus::NotAvailable);
        let b = booking(&rs, own, BookingStatus::Confirmed);
        let bid = b.id;
        rs.bookings.push(b);

        // Shift one day later: aug 16–18 overlap the booking's own hold.
        let shifted = DateRange::new(d(2025, 8, 16), d(2025, 8, 19));
        assert!(check_range_open(&rs, &shifted, Some(bid), Some(&own)).is_ok());
        // Without the exemptions the same move must be rejected.
        assert!(check_range_open(&rs, &shifted, None, None).is_err());
    }
}
