use std::fmt;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::BookingStatus;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Every way a call into the engine can be rejected. A rejected call
/// leaves engine state untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    RoomNotFound(Ulid),
    UserNotFound(Ulid),
    BookingNotFound(Ulid),
    AccommodationNotFound(Ulid),
    AvailabilityNotFound(Ulid),
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
    InvalidGuestCount(u32),
    DateRangeUnavailable { room_id: Ulid, date: NaiveDate },
    PricingFailure(f64),
    InvalidPrice(f64),
    CodeSpaceExhausted,
    InvalidTransition { from: BookingStatus, to: BookingStatus },
    BookingClosed(Ulid),
    HasActiveBookings(Ulid),
    DuplicateDate { room_id: Ulid, date: NaiveDate },
    AlreadyExists(Ulid),
    LimitExceeded(&'static str),
    Storage(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoomNotFound(id) => write!(f, "room not found: {id}"),
            Self::UserNotFound(id) => write!(f, "user not found: {id}"),
            Self::BookingNotFound(id) => write!(f, "booking not found: {id}"),
            Self::AccommodationNotFound(id) => write!(f, "accommodation not found: {id}"),
            Self::AvailabilityNotFound(id) => write!(f, "availability record not found: {id}"),
            Self::InvalidDateRange { start, end } => {
                write!(f, "invalid date range: start {start} must precede end {end}")
            }
            Self::InvalidGuestCount(n) => write!(f, "invalid guest count: {n}"),
            Self::DateRangeUnavailable { room_id, date } => {
                write!(f, "room {room_id} is not available on {date}")
            }
            Self::PricingFailure(total) => {
                write!(f, "computed price is not positive: {total}")
            }
            Self::InvalidPrice(price) => write!(f, "price must be positive: {price}"),
            Self::CodeSpaceExhausted => {
                write!(f, "could not generate a unique booking code")
            }
            Self::InvalidTransition { from, to } => {
                write!(f, "invalid booking transition: {from} -> {to}")
            }
            Self::BookingClosed(id) => {
                write!(f, "booking {id} is cancelled or completed and cannot change")
            }
            Self::HasActiveBookings(id) => {
                write!(f, "room {id} still has active bookings")
            }
            Self::DuplicateDate { room_id, date } => {
                write!(f, "room {room_id} already has an availability record for {date}")
            }
            Self::AlreadyExists(id) => write!(f, "entity already exists: {id}"),
            Self::LimitExceeded(what) => write!(f, "limit exceeded: {what}"),
            Self::Storage(msg) => write!(f, "storage failure: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}
