use std::sync::Arc;
use std::time::{Duration, Instant};

use arena::Clock;
use observability::RoomTickMetrics;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::room::Room;

/// Room ticker configuration.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Time between ticks. Fuse and decay timing is quantized to this.
    pub interval: Duration,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
        }
    }
}

impl TickConfig {
    pub fn from_millis(ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(ms),
        }
    }
}

/// Drive one room until shutdown: tick, log metrics, deliver outside the lock.
pub async fn run_room_ticker(
    room: Arc<Room>,
    clock: Arc<dyn Clock>,
    config: TickConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(config.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    interval.tick().await;

    let mut tick_number = 0u64;
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = net::wait_for_shutdown(&mut shutdown) => break,
        }
        tick_number += 1;

        let start = Instant::now();
        let report = room.tick(clock.now());
        let duration = start.elapsed();

        RoomTickMetrics {
            room: room.name().to_string(),
            tick_number,
            duration_us: duration.as_micros(),
            detonated: report.outcome.detonated,
            blasts_cleared: report.outcome.blasts_cleared,
            eliminated: report.outcome.eliminated.len(),
            players: report.players,
        }
        .log();

        report.deliver();
    }
    tracing::debug!(room = %room.name(), ticks = tick_number, "room ticker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    use arena::{Board, Grid, ManualClock, PlayerId, DEVICE_FUSE};
    use net::session_channel;
    use session::{reply, SessionId};

    #[test]
    fn default_interval_is_half_a_second() {
        assert_eq!(TickConfig::default().interval, Duration::from_millis(500));
        assert_eq!(TickConfig::from_millis(20).interval, Duration::from_millis(20));
    }

    #[tokio::test]
    async fn ticker_detonates_on_clock_time_and_stops_on_shutdown() {
        let grid = Grid::from_rows(&["#####", "#   #", "#####"]).unwrap();
        let room = Arc::new(Room::new("t", Board::from_grid(grid, 0), 4));
        let clock = Arc::new(ManualClock::new());
        let (tx, mut rx) = session_channel();
        let me = PlayerId::from("a");
        room.join(SessionId(1), me.clone(), tx).unwrap().1.deliver();
        room.plant_device(&me, clock.now()).deliver();
        // Join reply, join snapshot, plant snapshot.
        for _ in 0..3 {
            rx.recv().await.unwrap();
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_room_ticker(
            room.clone(),
            clock.clone(),
            TickConfig::from_millis(10),
            shutdown_rx,
        ));

        // Nothing happens while the manual clock stands still.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());

        clock.advance(DEVICE_FUSE);
        let snapshot = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(snapshot.text.contains('X'));
        let farewell = rx.recv().await.unwrap();
        assert_eq!(farewell.text, reply::DESTROYED);
        assert!(farewell.disconnect);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
