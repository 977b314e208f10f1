use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — used for record-keeping timestamps only.
/// Calendar math happens on `NaiveDate`; one night = one date step.
pub type Ms = i64;

/// Half-open date range `[start, end)`. A guest staying `[aug 15, aug 18)`
/// occupies the nights of the 15th, 16th and 17th and is gone on the 18th.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Callers validate date inputs before building a range: the engine
    /// rejects `end <= start` with `InvalidDateRange` at every entry
    /// point. An inverted pair here is a caller bug, caught in debug
    /// builds.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        debug_assert!(start < end, "DateRange start must be before end");
        Self { start, end }
    }

    /// Number of nights covered; always >= 1 for a validly constructed range.
    pub fn nights(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }

    /// Iterate every covered night, in order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(move |d| *d < self.end)
    }
}

/// Per-date booking state of an availability record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AvailabilityStatus {
    Available,
    Busy,
    NotAvailable,
}

impl AvailabilityStatus {
    /// Whether a record in this state blocks a new reservation on its date.
    /// `Busy` is operator-held, `NotAvailable` is booking-held; both block.
    pub fn blocks_booking(&self) -> bool {
        match self {
            AvailabilityStatus::Available => false,
            AvailabilityStatus::Busy | AvailabilityStatus::NotAvailable => true,
        }
    }
}

/// One (room, date) row of the availability ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityRecord {
    pub id: Ulid,
    pub date: NaiveDate,
    /// Nightly price for this date; overrides the room's base price.
    pub price: f64,
    pub status: AvailabilityStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    /// Active bookings hold their dates; cancelled/completed ones do not
    /// keep the room's coarse flag down.
    pub fn is_active(&self) -> bool {
        match self {
            BookingStatus::Pending | BookingStatus::Confirmed => true,
            BookingStatus::Cancelled | BookingStatus::Completed => false,
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    /// Human-shareable reference, unique across all bookings.
    pub code: String,
    pub user_id: Ulid,
    pub room_id: Ulid,
    pub range: DateRange,
    pub guests: u32,
    pub status: BookingStatus,
    pub total_price: f64,
    pub created_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accommodation {
    pub id: Ulid,
    pub host_id: Ulid,
    pub name: String,
    pub location: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Guest,
    Host,
    Operator,
}

/// A registered account. Identity *resolution* (tokens, sessions) lives in
/// the request layer; the engine only needs the resolved rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: Ulid,
    pub name: String,
    pub email: String,
    pub role: Role,
}

/// The lockable aggregate: one room, its ledger rows, and every booking
/// ever taken on it. All reservation-path mutations happen while holding
/// this aggregate's write lock, which is what makes the conflict check and
/// the status write one serializable unit per room.
#[derive(Debug, Clone)]
pub struct RoomState {
    pub id: Ulid,
    pub accommodation_id: Ulid,
    pub room_type: String,
    pub capacity: u32,
    pub beds: u32,
    /// Fallback nightly price for dates with no ledger row.
    pub base_price: f64,
    /// Coarse filter flag; false while any active booking holds the room.
    pub is_available: bool,
    /// Availability ledger rows, sorted by `date`.
    pub records: Vec<AvailabilityRecord>,
    /// Bookings in creation order (historical, including closed ones).
    pub bookings: Vec<Booking>,
}

impl RoomState {
    pub fn new(
        id: Ulid,
        accommodation_id: Ulid,
        room_type: String,
        capacity: u32,
        beds: u32,
        base_price: f64,
    ) -> Self {
        Self {
            id,
            accommodation_id,
            room_type,
            capacity,
            beds,
            base_price,
            is_available: true,
            records: Vec::new(),
            bookings: Vec::new(),
        }
    }

    /// Insert a ledger row maintaining date order. An existing row for the
    /// same date is replaced (relevant only during WAL replay).
    pub fn insert_record(&mut self, record: AvailabilityRecord) {
        match self.records.binary_search_by_key(&record.date, |r| r.date) {
            Ok(pos) => self.records[pos] = record,
            Err(pos) => self.records.insert(pos, record),
        }
    }

    pub fn record_at(&self, date: NaiveDate) -> Option<&AvailabilityRecord> {
        self.records
            .binary_search_by_key(&date, |r| r.date)
            .ok()
            .map(|pos| &self.records[pos])
    }

    pub fn record_by_id(&self, id: Ulid) -> Option<&AvailabilityRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn record_by_id_mut(&mut self, id: Ulid) -> Option<&mut AvailabilityRecord> {
        self.records.iter_mut().find(|r| r.id == id)
    }

    pub fn remove_record(&mut self, id: Ulid) -> Option<AvailabilityRecord> {
        let pos = self.records.iter().position(|r| r.id == id)?;
        Some(self.records.remove(pos))
    }

    /// Ledger rows covering `[range.start, range.end)`, ordered by date.
    /// Dates with no row are simply absent from the slice.
    pub fn records_in_range(&self, range: &DateRange) -> &[AvailabilityRecord] {
        let lo = self.records.partition_point(|r| r.date < range.start);
        let hi = self.records.partition_point(|r| r.date < range.end);
        &self.records[lo..hi]
    }

    /// Batch status write over a range. Applied inside the caller's locked
    /// transition; never commits on its own.
    pub fn set_status_in_range(&mut self, range: &DateRange, status: AvailabilityStatus) {
        let lo = self.records.partition_point(|r| r.date < range.start);
        let hi = self.records.partition_point(|r| r.date < range.end);
        for record in &mut self.records[lo..hi] {
            record.status = status;
        }
    }

    /// Release a stay's hold over a range: rows the booking marked
    /// `NotAvailable` go back to `Available`. Operator `Busy` holds on
    /// rows opened mid-stay are left standing.
    pub fn release_range(&mut self, range: &DateRange) {
        let lo = self.records.partition_point(|r| r.date < range.start);
        let hi = self.records.partition_point(|r| r.date < range.end);
        for record in &mut self.records[lo..hi] {
            if record.status == AvailabilityStatus::NotAvailable {
                record.status = AvailabilityStatus::Available;
            }
        }
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    pub fn take_booking(&mut self, id: Ulid) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    /// True if any pending/confirmed booking other than `exclude` still
    /// holds this room. Drives the coarse `is_available` flag on release.
    pub fn has_active_booking_excluding(&self, exclude: Option<Ulid>) -> bool {
        self.bookings
            .iter()
            .any(|b| b.status.is_active() && Some(b.id) != exclude)
    }

    /// Recompute the coarse flag from the remaining active bookings.
    pub fn refresh_available_flag(&mut self) {
        self.is_available = !self.has_active_booking_excluding(None);
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    UserRegistered {
        id: Ulid,
        name: String,
        email: String,
        role: Role,
    },
    AccommodationCreated {
        id: Ulid,
        host_id: Ulid,
        name: String,
        location: String,
    },
    RoomCreated {
        id: Ulid,
        accommodation_id: Ulid,
        room_type: String,
        capacity: u32,
        beds: u32,
        base_price: f64,
    },
    RoomUpdated {
        id: Ulid,
        room_type: String,
        capacity: u32,
        beds: u32,
        base_price: f64,
    },
    RoomDeleted {
        id: Ulid,
    },
    AvailabilityOpened {
        id: Ulid,
        room_id: Ulid,
        date: NaiveDate,
        price: f64,
    },
    AvailabilityRepriced {
        id: Ulid,
        room_id: Ulid,
        price: f64,
    },
    AvailabilityClosed {
        id: Ulid,
        room_id: Ulid,
    },
    /// A single row's status. The live operator op only moves a row
    /// between `Available` and `Busy`; compaction snapshots also emit
    /// this to pin each row to its exact status after booking replay.
    AvailabilityStatusSet {
        id: Ulid,
        room_id: Ulid,
        status: AvailabilityStatus,
    },
    /// The committed form of a whole reservation attempt: booking row,
    /// ledger status flips and the room flag drop are one record.
    BookingCreated {
        id: Ulid,
        room_id: Ulid,
        user_id: Ulid,
        range: DateRange,
        guests: u32,
        code: String,
        total_price: f64,
        created_at: Ms,
    },
    /// Release-then-reserve of a room/date change, committed as one record
    /// so a crash can never leave the old dates freed without the new ones
    /// taken (or the reverse).
    BookingRescheduled {
        id: Ulid,
        old_room_id: Ulid,
        room_id: Ulid,
        range: DateRange,
        guests: u32,
        total_price: f64,
    },
    BookingStatusChanged {
        id: Ulid,
        room_id: Ulid,
        status: BookingStatus,
    },
    BookingDeleted {
        id: Ulid,
        room_id: Ulid,
    },
}

// ── Request / result types ───────────────────────────────────────

/// What the request layer hands the engine for a new reservation.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub room_id: Ulid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub guests: u32,
}

/// Partial update for an existing booking; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct BookingChange {
    pub room_id: Option<Ulid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub guests: Option<u32>,
}

/// What a committed reservation attempt returns to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingReceipt {
    pub booking_id: Ulid,
    pub code: String,
    pub total_price: f64,
    pub status: BookingStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomInfo {
    pub id: Ulid,
    pub accommodation_id: Ulid,
    pub room_type: String,
    pub capacity: u32,
    pub beds: u32,
    pub base_price: f64,
    pub is_available: bool,
}

// ── Reporting types ──────────────────────────────────────────────

/// Bucket width for grouped booking counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Day,
    Week,
    Month,
}

impl Period {
    /// Truncate a date to the start of its bucket (day itself, Monday of
    /// its week, or first of its month).
    pub fn truncate(&self, date: NaiveDate) -> NaiveDate {
        use chrono::Datelike;
        match self {
            Period::Day => date,
            Period::Week => {
                date - chrono::Days::new(u64::from(date.weekday().num_days_from_monday()))
            }
            Period::Month => date.with_day(1).expect("day 1 exists in every month"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccommodationIncome {
    pub accommodation_id: Ulid,
    pub name: String,
    pub total_income: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodCount {
    pub bucket: NaiveDate,
    pub bookings: u64,
}
