//! Simulate command - replays one ad viewing on a manual clock.

use crate::catalog::{Advertisement, Catalog};
use crate::cli::args::{OutputFormat, SimulateArgs};
use crate::engine::{
    ControllerSettings, RewardEvent, RewardModifier, RewardPolicy, RewardSink, SessionController,
    SessionSummary, WatchSession, TICK_QUANTUM,
};
use crate::time::ManualClock;
use anyhow::{bail, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

const SIMULATED_AD_ID: &str = "simulated-ad";

/// Everything a simulated viewing produced.
#[derive(Debug, Clone)]
pub struct Simulation {
    pub events: Vec<RewardEvent>,
    pub summary: Option<SessionSummary>,
    /// Clock time that passed, paused spans included.
    pub elapsed: Duration,
}

impl Simulation {
    pub fn total_points(&self) -> u64 {
        self.events.iter().map(|event| event.points).sum()
    }
}

#[derive(Default)]
struct Collector {
    events: Mutex<Vec<RewardEvent>>,
    summaries: Mutex<Vec<SessionSummary>>,
}

impl RewardSink for Collector {
    fn reward(&self, event: RewardEvent) {
        self.events.lock().push(event);
    }

    fn session_finished(&self, summary: &SessionSummary) {
        self.summaries.lock().push(summary.clone());
    }
}

/// Drive a single session second by second until it completes or is left.
pub fn simulate(args: &SimulateArgs) -> Result<Simulation> {
    if !args.multiplier.is_finite() || args.multiplier <= 0.0 {
        bail!("multiplier must be a positive number");
    }
    let clock = ManualClock::new();
    let collector = Arc::new(Collector::default());
    let settings = ControllerSettings {
        policy: RewardPolicy {
            seconds_per_point: args.seconds_per_point,
            min_watch_seconds: args.min_watch,
            max_countable_seconds_per_ad: None,
        },
        modifier: RewardModifier::new(args.multiplier, 0),
        ..ControllerSettings::default()
    };
    let ad = Advertisement::new(SIMULATED_AD_ID, args.duration, args.points);
    let mut controller = SessionController::new(clock.clone(), collector.clone(), settings)
        .with_catalog(Catalog::new(vec![ad]));
    controller.open(0);

    let mut paused = false;
    while let Some(watched) = controller.active().map(WatchSession::elapsed_watched_seconds) {
        if args.leave_at == Some(watched) {
            controller.close();
            break;
        }
        if !paused && args.pause_at == Some(watched) {
            paused = true;
            controller.pause();
            let Some(pause_for) = args.resume_after else {
                controller.close();
                break;
            };
            for _ in 0..pause_for {
                clock.advance(TICK_QUANTUM);
                controller.tick();
            }
            controller.resume();
        }
        clock.advance(TICK_QUANTUM);
        controller.tick();
    }

    let events = std::mem::take(&mut *collector.events.lock());
    let summary = collector.summaries.lock().pop();
    Ok(Simulation {
        events,
        summary,
        elapsed: clock.elapsed(),
    })
}

pub fn run_simulate(args: SimulateArgs) -> Result<()> {
    let simulation = simulate(&args)?;
    match args.format {
        OutputFormat::Json => {
            for event in &simulation.events {
                println!("{}", serde_json::to_string(event)?);
            }
            if let Some(summary) = &simulation.summary {
                println!("{}", serde_json::to_string(summary)?);
            }
        }
        OutputFormat::Text => {
            for event in &simulation.events {
                println!(
                    "interval {} at {}s watched: +{} points",
                    event.session_interval_index, event.watch_time, event.points
                );
            }
            if let Some(summary) = &simulation.summary {
                println!(
                    "{:?} after {}s watched ({}s elapsed): {} points in {} rewards",
                    summary.outcome,
                    summary.watched_seconds,
                    simulation.elapsed.as_secs(),
                    summary.points_earned,
                    summary.rewards
                );
            }
        }
    }
    Ok(())
}
