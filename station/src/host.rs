use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use anyhow::Context;
use chrono::{Offset, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use ureq::Agent;

use weather_common::{
    dashboard::{Anchor, Font, SpriteSheet, SCREEN_WIDTH},
    render, run_cycle, AdafruitIo, Device, DeviceError, HttpTransport, IconAtlas, OpenWeather,
    Phase, RuntimeConfig, Screen, Secrets, SheetImage, SleepPlan, TransportError,
};

use crate::assets::{bundled_atlas, sheet_width};

const DEFAULT_LIGHT_LEVEL: u16 = 1_000;

/// Runtime config and secrets on disk, mirroring the device's storage.
struct ConfigStore {
    data_dir: PathBuf,
}

#[derive(Clone)]
struct UreqTransport {
    agent: Agent,
}

/// Simulated board: a fixed light level and a panel backed by files in the
/// data directory.
struct HostDevice {
    light_level: u16,
    settle: Duration,
    output_dir: PathBuf,
    atlas: IconAtlas,
}

#[derive(Serialize)]
struct LabelDump<'a> {
    x: i32,
    y: i32,
    font: Font,
    anchor: Anchor,
    text: &'a str,
}

pub fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = ConfigStore::new();
    let mut runtime = store.load_runtime_config().unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    match store.load_secrets() {
        Ok(Some(secrets)) => runtime.secrets = secrets,
        Ok(None) => {}
        Err(err) => warn!("failed to load secrets file: {err:#}"),
    }
    runtime.sanitize();
    runtime
        .secrets
        .validate()
        .context("secrets are incomplete")?;

    let oneshot = std::env::var_os("WEATHER_ONESHOT").is_some();
    let light_level = std::env::var("WEATHER_LIGHT_LEVEL")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(DEFAULT_LIGHT_LEVEL);

    info!(
        "weather station started (data dir {}, light level {light_level})",
        store.data_dir.display()
    );

    loop {
        let plan = wake_or_sleep_short(&runtime, &store, light_level);
        if oneshot {
            break;
        }
        // Stands in for deep sleep; the next pass starts from scratch.
        thread::sleep(plan.duration);
    }

    Ok(())
}

/// Setup errors get the same short sleep as a failed cycle.
fn wake_or_sleep_short(
    runtime: &RuntimeConfig,
    store: &ConfigStore,
    light_level: u16,
) -> SleepPlan {
    wake(runtime, store, light_level).unwrap_or_else(|err| {
        error!("wake cycle failed phase={} error={err:#}", Phase::Setup);
        SleepPlan::failed(Phase::Setup, &runtime.station)
    })
}

fn wake(
    runtime: &RuntimeConfig,
    store: &ConfigStore,
    light_level: u16,
) -> anyhow::Result<SleepPlan> {
    let station = &runtime.station;
    let secrets = &runtime.secrets;

    match now_in_timezone(&secrets.timezone) {
        Some(now) => info!("woke at {}", now.format("%Y-%m-%d %H:%M:%S %:z")),
        None => info!("woke at {} (utc)", Utc::now().format("%Y-%m-%d %H:%M:%S")),
    }

    let transport = UreqTransport::new(Duration::from_secs(station.http_timeout_secs));
    let mut forecast = OpenWeather::new(transport.clone(), station, &secrets.openweather_key)
        .context("invalid forecast endpoint")?;
    let mut feeds = AdafruitIo::new(
        transport,
        &station.aio_url,
        &secrets.aio_username,
        &secrets.aio_key,
    );
    let mut device = HostDevice {
        light_level,
        settle: Duration::from_millis(station.light_settle_ms),
        output_dir: store.data_dir.clone(),
        atlas: load_atlas(&store.data_dir.join("assets")),
    };

    Ok(run_cycle(&mut device, &mut forecast, &mut feeds, station))
}

impl ConfigStore {
    fn new() -> Self {
        let data_dir = std::env::var("WEATHER_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.weather"));

        Self { data_dir }
    }

    fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        match fs::read(self.data_dir.join("runtime.json")) {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    fn load_secrets(&self) -> anyhow::Result<Option<Secrets>> {
        match fs::read(self.data_dir.join("secrets.json")) {
            Ok(raw) => Ok(Some(serde_json::from_slice::<Secrets>(&raw)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

impl UreqTransport {
    fn new(timeout: Duration) -> Self {
        let config = Agent::config_builder().timeout_global(Some(timeout)).build();

        Self {
            agent: config.into(),
        }
    }
}

impl HttpTransport for UreqTransport {
    fn get(&mut self, url: &str, headers: &[(&str, &str)]) -> Result<String, TransportError> {
        let mut request = self.agent.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let mut response = request.call().map_err(|err| match err {
            ureq::Error::StatusCode(status) => TransportError::Status {
                url: url.to_string(),
                status,
            },
            other => TransportError::Request {
                url: url.to_string(),
                reason: other.to_string(),
            },
        })?;

        response
            .body_mut()
            .read_to_string()
            .map_err(|err| TransportError::Request {
                url: url.to_string(),
                reason: err.to_string(),
            })
    }
}

impl Device for HostDevice {
    fn read_ambient_light(&mut self) -> Result<u16, DeviceError> {
        thread::sleep(self.settle);
        Ok(self.light_level)
    }

    fn present(&mut self, screen: &Screen) -> Result<(), DeviceError> {
        let frame = render(screen, &self.atlas);

        fs::create_dir_all(&self.output_dir).map_err(|err| {
            DeviceError::new(format!("create {}: {err}", self.output_dir.display()))
        })?;

        let image_path = self.output_dir.join("screen.pbm");
        fs::write(&image_path, frame.to_pbm())
            .map_err(|err| DeviceError::new(format!("write {}: {err}", image_path.display())))?;

        let labels = label_dump(screen);
        for label in &labels {
            debug!("label ({}, {}) {:?}: {}", label.x, label.y, label.anchor, label.text);
        }
        let payload = serde_json::to_vec_pretty(&labels)
            .map_err(|err| DeviceError::new(format!("encode labels: {err}")))?;
        let labels_path = self.output_dir.join("labels.json");
        fs::write(&labels_path, payload)
            .map_err(|err| DeviceError::new(format!("write {}: {err}", labels_path.display())))?;

        info!(
            "panel image written to {} ({} ink pixels)",
            image_path.display(),
            frame.ink_count()
        );
        Ok(())
    }
}

fn label_dump(screen: &Screen) -> Vec<LabelDump<'_>> {
    screen
        .labels()
        .into_iter()
        .map(|(x, y, label)| LabelDump {
            x,
            y,
            font: label.font,
            anchor: label.anchor,
            text: &label.text,
        })
        .collect()
}

/// Starts from the bundled sheets and lets files under `dir` replace them.
fn load_atlas(dir: &Path) -> IconAtlas {
    let mut atlas = bundled_atlas().unwrap_or_else(|err| {
        warn!("bundled icons unusable: {err}");
        IconAtlas::default()
    });
    if let Some(background) = load_sheet(&dir.join("background.bin"), SCREEN_WIDTH) {
        atlas.background = Some(background);
    }

    for (sheet, file) in [
        (SpriteSheet::Large, "icons-large.bin"),
        (SpriteSheet::Small, "icons-small.bin"),
        (SpriteSheet::Generic, "icons-generic.bin"),
    ] {
        if let Some(image) = load_sheet(&dir.join(file), sheet_width(sheet)) {
            atlas.set_sheet(sheet, image);
        }
    }
    atlas
}

fn load_sheet(path: &Path, width: u32) -> Option<SheetImage> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!("no sprite sheet at {}", path.display());
            return None;
        }
        Err(err) => {
            warn!("failed to read {}: {err}", path.display());
            return None;
        }
    };

    SheetImage::new(raw, width)
        .map_err(|err| warn!("ignoring {}: {err}", path.display()))
        .ok()
}

fn now_in_timezone(timezone: &str) -> Option<chrono::DateTime<chrono::FixedOffset>> {
    let tz: Tz = timezone.parse().ok()?;
    let local = Utc::now().with_timezone(&tz);
    Some(local.with_timezone(&local.offset().fix()))
}
