//! One wake cycle: light check, fetch, render, display, then pick a sleep.
//!
//! Nothing carries over between cycles. Recovery from any failure is the short
//! sleep followed by a fresh boot.

use std::{fmt, time::Duration};

use log::{error, info};

use crate::{
    config::StationConfig,
    dashboard::{compose, DashboardData, Screen},
    error::{CycleError, DeviceError},
    feeds::FeedSource,
    forecast::ForecastSource,
    readings::Readings,
    trend::pressure_diff_or_steady,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Bringing up services and hardware before the cycle proper.
    Setup,
    LightCheck,
    Fetching,
    Rendering,
    Displaying,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::LightCheck => "light-check",
            Self::Fetching => "fetching",
            Self::Rendering => "rendering",
            Self::Displaying => "displaying",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Board-side hardware used during a cycle.
pub trait Device {
    /// Powers the light sensor, lets it settle, samples it and powers it down.
    fn read_ambient_light(&mut self) -> Result<u16, DeviceError>;

    /// Rasterizes the screen and triggers a panel refresh.
    fn present(&mut self, screen: &Screen) -> Result<(), DeviceError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub light: u16,
    pub readings: Readings,
    pub pressure_diff: f64,
    pub screen: Screen,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    TooDark { light: u16 },
    Refreshed(Box<CycleReport>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    TooDark,
    Refreshed,
    Failed(Phase),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepPlan {
    pub duration: Duration,
    pub reason: WakeReason,
}

impl SleepPlan {
    pub fn for_result(result: &Result<CycleOutcome, CycleError>, config: &StationConfig) -> Self {
        let long = Duration::from_secs(config.long_sleep_secs);
        match result {
            Ok(CycleOutcome::TooDark { .. }) => Self {
                duration: long,
                reason: WakeReason::TooDark,
            },
            Ok(CycleOutcome::Refreshed(_)) => Self {
                duration: long,
                reason: WakeReason::Refreshed,
            },
            Err(err) => Self::failed(err.phase, config),
        }
    }

    pub fn failed(phase: Phase, config: &StationConfig) -> Self {
        Self {
            duration: Duration::from_secs(config.short_sleep_secs),
            reason: WakeReason::Failed(phase),
        }
    }
}

/// Runs the phases in order, stopping at the first failure.
pub fn run_phases<D, F, S>(
    device: &mut D,
    forecast_source: &mut F,
    feeds: &mut S,
    config: &StationConfig,
) -> Result<CycleOutcome, CycleError>
where
    D: Device + ?Sized,
    F: ForecastSource + ?Sized,
    S: FeedSource + ?Sized,
{
    let light = device
        .read_ambient_light()
        .map_err(|err| CycleError::new(Phase::LightCheck, err))?;
    info!("light is {light}");

    // Nobody can read the panel in the dark.
    if light <= config.light_threshold {
        return Ok(CycleOutcome::TooDark { light });
    }

    info!("fetching forecast");
    let forecast = forecast_source
        .fetch_forecast()
        .map_err(|err| CycleError::new(Phase::Fetching, err))?;

    info!("reading station feeds");
    let readings = Readings::collect(feeds, &config.feeds)
        .map_err(|err| CycleError::new(Phase::Fetching, err))?;
    let pressure_diff = pressure_diff_or_steady(feeds, &config.pressure_history);
    info!(
        "battery {:.2}V, pressure diff {:+.2}kPa",
        readings.battery_voltage, pressure_diff
    );

    let data = DashboardData::derive(&readings, &forecast, pressure_diff)
        .map_err(|err| CycleError::new(Phase::Rendering, err))?;
    let screen = compose(&data);

    info!("refreshing display");
    device
        .present(&screen)
        .map_err(|err| CycleError::new(Phase::Displaying, err))?;

    Ok(CycleOutcome::Refreshed(Box::new(CycleReport {
        light,
        readings,
        pressure_diff,
        screen,
    })))
}

/// Outer error boundary: every failure is logged with its phase and becomes a
/// short sleep.
pub fn run_cycle<D, F, S>(
    device: &mut D,
    forecast_source: &mut F,
    feeds: &mut S,
    config: &StationConfig,
) -> SleepPlan
where
    D: Device + ?Sized,
    F: ForecastSource + ?Sized,
    S: FeedSource + ?Sized,
{
    let result = run_phases(device, forecast_source, feeds, config);
    let plan = SleepPlan::for_result(&result, config);

    match &result {
        Ok(CycleOutcome::TooDark { light }) => {
            info!("too dark to read (light {light}), skipping refresh")
        }
        Ok(CycleOutcome::Refreshed(_)) => info!("display refreshed"),
        Err(err) => error!(
            "wake cycle failed phase={} error={}",
            err.phase,
            error_chain(err)
        ),
    }
    info!("sleeping for {}s", plan.duration.as_secs());

    plan
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
