use anyhow::Result;
use lookahead::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::info;
use tracing_subscriber::EnvFilter;

const BPM: f64 = 120.0;
const BEATS_PER_BAR: u32 = 4;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging. `RUST_LOG=lookahead=trace` shows every window.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // 2. Load the configuration: an optional TOML path, then LOOKAHEAD_* overrides.
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = SchedulerConfig::load(config_path.as_deref())?;
    info!("Loaded configuration: {:?}", config);

    // 3. Create the scheduler on the system clock and the tokio timer.
    let scheduler = Scheduler::builder(Arc::new(SystemClock::new()))
        .config(config)
        .build()?;

    // 4. Listen to the scheduler's activity stream.
    spawn_event_listener(&scheduler);

    // 5. Start the timer with a metronome that keeps re-scheduling itself.
    let spacing = 60.0 / BPM;
    scheduler.start(Some(metronome(spacing)))?;
    scheduler.insert(0.0, heartbeat(), vec![arg(0u64)])?;

    info!("Metronome running at {} BPM. Press Ctrl+C to stop.", BPM);
    tokio::signal::ctrl_c().await?;

    scheduler.stop(true);
    info!("Scheduler stopped and cleared.");
    Ok(())
}

/// Logs each beat and queues the next one `spacing` seconds after it.
///
/// The first beat is anchored to the playback time it was dispatched at; later
/// beats carry their exact time and count as arguments so they never drift.
fn metronome(spacing: f64) -> Callback {
    callback(move |ctx, args| {
        let time = args
            .first()
            .and_then(|a| a.downcast_ref::<f64>())
            .copied()
            .unwrap_or(ctx.playback_time);
        let beat = args
            .get(1)
            .and_then(|a| a.downcast_ref::<u32>())
            .copied()
            .unwrap_or(0);

        let accent = if beat % BEATS_PER_BAR == 0 { "TICK" } else { "tock" };
        info!("[METRONOME] {} beat {} at {:.3}s", accent, beat + 1, ctx.playback_time);

        let next = time + spacing;
        if let Err(e) = ctx
            .target
            .insert(next, metronome(spacing), vec![arg(next), arg(beat + 1)])
        {
            tracing::error!("Failed to queue the next beat: {}", e);
        }
    })
}

/// Counts lookahead windows by chaining itself through `next_tick`.
fn heartbeat() -> Callback {
    callback(|ctx, args| {
        let count = args
            .first()
            .and_then(|a| a.downcast_ref::<u64>())
            .copied()
            .unwrap_or(0);
        if count % 50 == 0 {
            info!("[HEARTBEAT] window #{} at {:.3}s", count, ctx.playback_time);
        }
        ctx.target.next_tick(heartbeat(), vec![arg(count + 1)]).ok();
    })
}

/// Spawns a task that prints the scheduler's lifecycle events.
fn spawn_event_listener(scheduler: &Scheduler) {
    let mut events_rx = scheduler.subscribe();
    tokio::spawn(async move {
        loop {
            match events_rx.recv().await {
                Ok(event @ (SchedulerEvent::Started | SchedulerEvent::Stopped { .. })) => {
                    info!("[SYSTEM] => {:?}", event)
                }
                Ok(SchedulerEvent::Cleared { count }) if count > 0 => {
                    info!("[SYSTEM] => cleared {} pending event(s)", count)
                }
                Ok(_) => {}
                // Dispatch traffic is high; a slow listener just skips ahead.
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    });
}
