use tracing_subscriber::{fmt, EnvFilter};

/// Install the global fmt subscriber. `RUST_LOG` overrides the `info` default.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(true).init();
}

/// Per-room tick report, emitted by each room's ticker.
#[derive(Debug, Clone)]
pub struct RoomTickMetrics {
    pub room: String,
    pub tick_number: u64,
    pub duration_us: u128,
    pub detonated: usize,
    pub blasts_cleared: usize,
    pub eliminated: usize,
    pub players: usize,
}

impl RoomTickMetrics {
    /// Time a room may hold its lock for one tick before we complain.
    pub const TICK_BUDGET_US: u128 = 5_000;

    pub fn over_budget(&self) -> bool {
        self.duration_us > Self::TICK_BUDGET_US
    }

    pub fn log(&self) {
        if self.over_budget() {
            tracing::warn!(
                room = %self.room,
                tick = self.tick_number,
                duration_us = self.duration_us,
                detonated = self.detonated,
                blasts_cleared = self.blasts_cleared,
                eliminated = self.eliminated,
                players = self.players,
                "room tick exceeded budget ({}us > {}us)",
                self.duration_us,
                Self::TICK_BUDGET_US
            );
        } else if self.detonated > 0 || self.blasts_cleared > 0 {
            tracing::debug!(
                room = %self.room,
                tick = self.tick_number,
                duration_us = self.duration_us,
                detonated = self.detonated,
                blasts_cleared = self.blasts_cleared,
                eliminated = self.eliminated,
                players = self.players,
                "room tick resolved"
            );
        } else {
            tracing::trace!(room = %self.room, tick = self.tick_number, "room tick idle");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(duration_us: u128) -> RoomTickMetrics {
        RoomTickMetrics {
            room: "room-1".to_string(),
            tick_number: 1,
            duration_us,
            detonated: 1,
            blasts_cleared: 0,
            eliminated: 0,
            players: 2,
        }
    }

    #[test]
    fn budget_check() {
        assert!(!metrics(10).over_budget());
        assert!(metrics(RoomTickMetrics::TICK_BUDGET_US + 1).over_budget());
    }

    #[test]
    fn log_without_subscriber_is_harmless() {
        metrics(10).log();
        metrics(1_000_000).log();
    }
}
