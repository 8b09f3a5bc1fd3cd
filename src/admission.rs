//! How long a new request may be, given how much is already queued.

use std::time::Duration;

use crate::error::{RequestErr, RequestResult};

const MINUTE: Duration = Duration::from_secs(60);

/// (queued load upper bound, max new-song length), checked in order.
const STEPS: [(Duration, Duration); 3] = [
    (MINUTE, Duration::from_secs(60 * 60)),
    (Duration::from_secs(20 * 60), Duration::from_secs(20 * 60)),
    (Duration::from_secs(60 * 60), Duration::from_secs(10 * 60)),
];
const CROWDED: Duration = Duration::from_secs(5 * 60);

pub fn max_duration(queued: Duration) -> Duration {
    STEPS
        .iter()
        .find(|(load, _)| queued <= *load)
        .map(|(_, max)| *max)
        .unwrap_or(CROWDED)
}

/// `queued` must be measured before the candidate is added.
pub fn check(queued: Duration, candidate: Duration) -> RequestResult<()> {
    let max = max_duration(queued);
    if candidate >= max {
        return Err(RequestErr::SongTooLong { max_minutes: max.as_secs() / 60 });
    }
    Ok(())
}
