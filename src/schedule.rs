//! Timers driving photo rotation and clock refresh.
//!
//! Two independent periodic triggers feed one loop, so actions never run
//! concurrently: the device and rotation state are only ever touched by one
//! action at a time. An action that blocks on the network delays the other
//! timer rather than overlapping it; the late tick fires as soon as the loop
//! is free again.
//!
//! Which timers exist is decided once, from the settings read at startup.
//! Later settings changes are honored inside each action instead, so a photo
//! timer armed at startup keeps firing (as a no-op on the index) after
//! photos are turned off, and resumes rotating when they come back on.
//!
//! # Usage
//!
//! ```rust,ignore
//! use eink_photoframe::schedule::Scheduler;
//!
//! let scheduler = Scheduler::new(Duration::from_secs(300), Duration::from_secs(60));
//! scheduler.run(&mut rotator, shutdown_signal()).await;
//! ```

use std::future::{pending, Future};
use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::device::DisplayDevice;
use crate::remote::SettingsStore;
use crate::rotator::DisplayRotator;

/// Which timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Advance to the next photo
    Photo,
    /// Redraw the current screen
    Clock,
}

/// Photo and clock periods.
#[derive(Debug, Clone)]
pub struct Scheduler {
    photo_interval: Duration,
    clock_interval: Duration,
}

impl Scheduler {
    pub fn new(photo_interval: Duration, clock_interval: Duration) -> Self {
        Self {
            photo_interval,
            clock_interval,
        }
    }

    pub fn photo_interval(&self) -> Duration {
        self.photo_interval
    }

    pub fn clock_interval(&self) -> Duration {
        self.clock_interval
    }

    /// Show the first frame, arm the timers and run until `shutdown`
    /// completes. The panel is cleared and put to sleep before returning.
    pub async fn run<D, S, F>(&self, rotator: &mut DisplayRotator<D, S>, shutdown: F)
    where
        D: DisplayDevice,
        S: SettingsStore,
        F: Future<Output = ()>,
    {
        if let Err(e) = rotator.refresh_display().await {
            tracing::error!("Failed to show first frame: {}", e);
        }

        // the first frame just read the settings; arm from that snapshot
        let settings = rotator.state().settings().clone();
        let mut photo_timer = settings
            .show_photos
            .then(|| ticker(self.photo_interval));
        let mut clock_timer = settings.show_clock.then(|| ticker(self.clock_interval));
        tracing::info!(
            "Starting main loop - photo timer: {}, clock timer: {}",
            describe(&photo_timer, self.photo_interval),
            describe(&clock_timer, self.clock_interval)
        );

        tokio::pin!(shutdown);
        loop {
            let trigger = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = tick(&mut photo_timer) => Trigger::Photo,
                _ = tick(&mut clock_timer) => Trigger::Clock,
            };

            tracing::debug!("{:?} timer fired", trigger);
            let result = match trigger {
                Trigger::Photo => rotator.advance().await,
                Trigger::Clock => rotator.refresh_display().await,
            };
            if let Err(e) = result {
                tracing::error!("{:?} update skipped: {}", trigger, e);
            }
        }

        tracing::info!("Shutting down, clearing panel");
        rotator.power_down();
    }
}

/// A repeating timer whose first tick is one period from now.
fn ticker(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Wait for the next tick, or forever if the timer is not armed.
async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending::<()>().await,
    }
}

fn describe(timer: &Option<Interval>, period: Duration) -> String {
    match timer {
        Some(_) => format!("every {}s", period.as_secs()),
        None => "off".to_string(),
    }
}
