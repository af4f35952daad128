use near_sdk::Timestamp;

pub const NANOS_IN_SEC: u64 = 1_000_000_000;

/// Creation time of a deposit together with its requested delay in seconds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Timelock {
    pub created_at: Timestamp,
    pub delay_seconds: u64,
}

impl Timelock {
    pub fn new(created_at: Timestamp, delay_seconds: u64) -> Self {
        Self {
            created_at,
            delay_seconds,
        }
    }

    /// Absolute maturity in nanoseconds, or `None` when it does not fit a timestamp.
    pub fn matures_at(&self) -> Option<Timestamp> {
        self.delay_seconds
            .checked_mul(NANOS_IN_SEC)
            .and_then(|delay| self.created_at.checked_add(delay))
    }
}

pub fn is_matured(matures_at: Timestamp, now: Timestamp) -> bool {
    now >= matures_at
}
