use super::error::{EngineError, Result};
use crate::model::{DateRange, RoomState};

/// Price a stay: per night, the ledger row's price if one exists for that
/// date, otherwise the room's base price. Deterministic — the same room
/// state and range always quote the same total.
pub fn quote(rs: &RoomState, range: &DateRange) -> Result<f64> {
    let mut total = 0.0;
    for date in range.days() {
        let nightly = match rs.record_at(date) {
            Some(record) => record.price,
            None => rs.base_price,
        };
        total += nightly;
    }
    if !(total > 0.0) {
        return Err(EngineError::PricingFailure(total));
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AvailabilityRecord, AvailabilityStatus};
    use chrono::NaiveDate;
    use ulid::Ulid;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn room(base_price: f64) -> RoomState {
        RoomState::new(Ulid::new(), Ulid::new(), "double".into(), 2, 1, base_price)
    }

    fn add_row(rs: &mut RoomState, date: NaiveDate, price: f64) {
        rs.insert_record(AvailabilityRecord {
            id: Ulid::new(),
            date,
            price,
            status: AvailabilityStatus::Available,
        });
    }

    #[test]
    fn base_price_when_no_rows() {
        let rs = room(100.0);
        let range = DateRange::new(d(2025, 8, 15), d(2025, 8, 18));
        assert_eq!(quote(&rs, &range).unwrap(), 300.0);
    }

    #[test]
    fn row_price_overrides_base() {
        let mut rs = room(100.0);
        add_row(&mut rs, d(2025, 8, 16), 150.0); // weekend uplift
        let range = DateRange::new(d(2025, 8, 15), d(2025, 8, 18));
        // aug 15 base + aug 16 override + aug 17 base
        assert_eq!(quote(&rs, &range).unwrap(), 350.0);
    }

    #[test]
    fn quote_is_deterministic() {
        let mut rs = room(87.5);
        add_row(&mut rs, d(2025, 8, 15), 92.25);
        add_row(&mut rs, d(2025, 8, 17), 110.0);
        let range = DateRange::new(d(2025, 8, 15), d(2025, 8, 19));
        let first = quote(&rs, &range).unwrap();
        for _ in 0..10 {
            assert_eq!(quote(&rs, &range).unwrap(), first);
        }
    }

    #[test]
    fn non_positive_total_is_rejected() {
        let rs = room(0.0);
        let range = DateRange::new(d(2025, 8, 15), d(2025, 8, 18));
        assert!(matches!(
            quote(&rs, &range),
            Err(EngineError::PricingFailure(_))
        ));
    }
}
