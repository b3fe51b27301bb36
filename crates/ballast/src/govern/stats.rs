//! Governor counters surfaced to the display layer.

use serde::Serialize;

/// Running totals for the governor's maintenance work.
///
/// Every field except `ram_mb` is a monotonically increasing counter; only
/// an explicit [`clear`](Self::clear) resets them. `ram_mb` is the latest
/// instantaneous memory sample.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// Oversized content nodes simplified by the flattener.
    pub flattened: u64,
    /// Conversation entries evicted by the purge pass.
    pub purged: u64,
    /// Media elements whose sources were wiped during purges.
    pub media_wiped: u64,
    /// Suggestion chips with click interception installed.
    pub chips_hooked: u64,
    /// Latest memory sample in MB. Not monotonic.
    pub ram_mb: u64,
}

impl Stats {
    /// Reset everything to zero. User action only.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_zeroes_all_fields() {
        let mut stats = Stats {
            flattened: 4,
            purged: 9,
            media_wiped: 2,
            chips_hooked: 7,
            ram_mb: 333,
        };
        stats.clear();
        assert_eq!(stats, Stats::default());
    }
}
