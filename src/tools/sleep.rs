use schemars::JsonSchema;
use serde::Deserialize;

/// Cap on how long a single `sleep` call may block.
pub const MAX_SLEEP_MS: u64 = 295_000;

/// Block the calling turn for a bounded amount of time, e.g. to give a
/// backgrounded task a head start before the first `process_status` poll.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SleepRequest {
    pub milliseconds: u64,
}

impl SleepRequest {
    /// Requested duration clamped to `MAX_SLEEP_MS`.
    pub fn clamped_duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.milliseconds.min(MAX_SLEEP_MS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_under_cap_passes_through() {
        let req = SleepRequest { milliseconds: 1000 };
        assert_eq!(req.clamped_duration(), std::time::Duration::from_millis(1000));
    }

    #[test]
    fn duration_over_cap_is_clamped() {
        let req = SleepRequest { milliseconds: 999_999 };
        assert_eq!(req.clamped_duration(), std::time::Duration::from_millis(MAX_SLEEP_MS));
    }
}
