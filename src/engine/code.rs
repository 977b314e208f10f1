use rand::Rng;
use ulid::Ulid;

use super::error::{EngineError, Result};
use super::Engine;
use crate::limits;

/// One draw from the code space: `RES-` + two uppercase letters + four
/// digits (about 6.8 million codes).
fn draft_code(rng: &mut impl Rng) -> String {
    let a = (b'A' + rng.random_range(0..26u8)) as char;
    let b = (b'A' + rng.random_range(0..26u8)) as char;
    let digits: u16 = rng.random_range(0..10_000);
    format!("RES-{a}{b}{digits:04}")
}

impl Engine {
    /// Claim a globally unique booking code for `booking_id`. The claim
    /// must be released by the caller if the booking fails to commit.
    pub(super) fn claim_code(&self, booking_id: Ulid) -> Result<String> {
        let mut rng = rand::rng();
        self.claim_code_with(booking_id, || draft_code(&mut rng))
    }

    /// Claim loop with an injectable draft source. The dashmap entry API
    /// makes the existence check and the insert one atomic step, so two
    /// concurrent claims can never both win the same code.
    pub(super) fn claim_code_with(
        &self,
        booking_id: Ulid,
        mut draft: impl FnMut() -> String,
    ) -> Result<String> {
        use dashmap::mapref::entry::Entry;

        for attempt in 0..limits::MAX_CODE_ATTEMPTS {
            let candidate = draft();
            match self.codes.entry(candidate.clone()) {
                Entry::Vacant(slot) => {
                    if attempt > 0 {
                        metrics::counter!(crate::observability::CODE_RETRIES_TOTAL)
                            .increment(attempt as u64);
                    }
                    slot.insert(booking_id);
                    return Ok(candidate);
                }
                Entry::Occupied(_) => continue,
            }
        }
        Err(EngineError::CodeSpaceExhausted)
    }
}
