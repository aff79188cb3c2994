use std::sync::Arc;
use std::time::Duration;

use rcutil_scripting_host::{EventDispatcher, Tick, Transport};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// How the host loop paces and bounds itself
#[derive(Debug, Clone, Copy)]
pub struct TickLoopConfig {
    /// Ticks per second
    pub tick_rate: u32,
    /// Stop after this many ticks; run until shutdown otherwise
    pub max_ticks: Option<u64>,
}

impl TickLoopConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate.max(1)
    }
}

/// Drive the dispatcher's tick hooks at a fixed rate.
///
/// Each tick runs on the blocking pool since transports block. Returns the
/// number of ticks completed.
pub async fn run_tick_loop<T>(
    dispatcher: Arc<EventDispatcher<T>>,
    config: TickLoopConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<u64>
where
    T: Transport + 'static,
{
    let mut interval = tokio::time::interval(config.tick_interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut completed = 0u64;
    info!(
        "Running tick loop at {} TPS ({:?} per tick)",
        config.tick_rate,
        config.tick_interval()
    );

    loop {
        if config.max_ticks.is_some_and(|max| completed >= max) {
            break;
        }

        tokio::select! {
            _ = interval.tick() => {}
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("Shutdown requested, stopping tick loop");
                    break;
                }
                continue;
            }
        }

        let tick_dispatcher = dispatcher.clone();
        let tick: Tick = tokio::task::spawn_blocking(move || {
            tick_dispatcher.on_gametick_start();
            tick_dispatcher.on_gametick_end();
            tick_dispatcher.current_tick()
        })
        .await?;

        completed += 1;
        debug!("Completed tick {} (now at {})", completed, tick);
    }

    let pending = dispatcher.scheduler().pending_count();
    if pending > 0 {
        warn!("{} timer(s) still pending when the loop stopped", pending);
    }
    Ok(completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcutil_scripting_host::{LoggingTransport, TickPhase};

    #[test]
    fn test_tick_interval() {
        let config = TickLoopConfig {
            tick_rate: 20,
            max_ticks: None,
        };
        assert_eq!(config.tick_interval(), Duration::from_millis(50));

        let config = TickLoopConfig {
            tick_rate: 0,
            max_ticks: None,
        };
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_runs_bounded_number_of_ticks() {
        let dispatcher = Arc::new(EventDispatcher::new(LoggingTransport::new()));
        let script = dispatcher.register_script("main", "", "127.0.0.1:1").unwrap();
        dispatcher
            .schedule_timer(&script, TickPhase::Start, 2, "alarm")
            .unwrap();

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = TickLoopConfig {
            tick_rate: 1000,
            max_ticks: Some(5),
        };

        let completed = run_tick_loop(dispatcher.clone(), config, shutdown_rx)
            .await
            .unwrap();
        assert_eq!(completed, 5);
        assert_eq!(dispatcher.current_tick(), 5);
        assert_eq!(dispatcher.scheduler().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_stops_on_shutdown() {
        let dispatcher = Arc::new(EventDispatcher::new(LoggingTransport::new()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        shutdown_tx.send(true).unwrap();

        let config = TickLoopConfig {
            tick_rate: 1,
            max_ticks: None,
        };
        let completed = run_tick_loop(dispatcher, config, shutdown_rx).await.unwrap();
        assert!(completed <= 1);
    }
}
