//! Hard bounds on inputs and internal retry loops. Exceeding one is a
//! client error (`LimitExceeded`), never a panic.

/// Upper bound on guests per booking; the lower bound is 1.
pub const MAX_GUESTS: u32 = 50;

/// Longest bookable stay, in nights.
pub const MAX_STAY_NIGHTS: i64 = 365;

/// Draws of a fresh booking code before giving up with `CodeSpaceExhausted`.
pub const MAX_CODE_ATTEMPTS: usize = 32;

/// WAL append attempts before a storage failure surfaces to the caller.
pub const MAX_STORAGE_RETRIES: usize = 3;

pub const MAX_NAME_LEN: usize = 160;
pub const MAX_LOCATION_LEN: usize = 120;
pub const MAX_ROOM_TYPE_LEN: usize = 50;

/// Ledger rows a single room may hold open (ten years of nightly rows).
pub const MAX_RECORDS_PER_ROOM: usize = 3_653;

pub const MAX_ROOMS: usize = 100_000;
