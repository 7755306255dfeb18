use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_OPENWEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/onecall";
pub const DEFAULT_AIO_URL: &str = "https://io.adafruit.com";

/// Credentials loaded once at boot. Key names match the on-device secrets file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Secrets {
    pub ssid: String,
    pub password: String,
    pub timezone: String,
    pub aio_username: String,
    pub aio_key: String,
    pub openweather_key: String,
}

impl Secrets {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("aio_username", &self.aio_username),
            ("aio_key", &self.aio_key),
            ("openweather_key", &self.openweather_key),
        ];

        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingSecret(key));
            }
        }
        Ok(())
    }

    pub fn has_wifi_credentials(&self) -> bool {
        !self.ssid.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl Default for Location {
    fn default() -> Self {
        Self {
            lat: 49.8844,
            lon: -97.147,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    Average,
    Sum,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedQuery {
    pub feed: String,
    pub samples: usize,
    pub aggregate: Aggregate,
}

impl FeedQuery {
    fn average(feed: &str, samples: usize) -> Self {
        Self {
            feed: feed.to_string(),
            samples,
            aggregate: Aggregate::Average,
        }
    }

    fn sum(feed: &str, samples: usize) -> Self {
        Self {
            feed: feed.to_string(),
            samples,
            aggregate: Aggregate::Sum,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FeedPlan {
    pub temperature: FeedQuery,
    pub pressure: FeedQuery,
    pub humidity: FeedQuery,
    #[serde(rename = "windSpeed")]
    pub wind_speed: FeedQuery,
    #[serde(rename = "windGust")]
    pub wind_gust: FeedQuery,
    #[serde(rename = "windDirection")]
    pub wind_direction: FeedQuery,
    pub rain: FeedQuery,
    #[serde(rename = "batteryVoltage")]
    pub battery_voltage: FeedQuery,
}

impl Default for FeedPlan {
    fn default() -> Self {
        Self {
            temperature: FeedQuery::average("temperature", 5),
            pressure: FeedQuery::average("pressure", 5),
            humidity: FeedQuery::average("humidity", 5),
            wind_speed: FeedQuery::average("wind-speed", 1),
            wind_gust: FeedQuery::average("wind-gust", 1),
            wind_direction: FeedQuery::average("wind-direction", 1),
            rain: FeedQuery::sum("rain", 60),
            battery_voltage: FeedQuery::average("battery-voltage", 1),
        }
    }
}

impl FeedPlan {
    fn queries_mut(&mut self) -> [&mut FeedQuery; 8] {
        [
            &mut self.temperature,
            &mut self.pressure,
            &mut self.humidity,
            &mut self.wind_speed,
            &mut self.wind_gust,
            &mut self.wind_direction,
            &mut self.rain,
            &mut self.battery_voltage,
        ]
    }
}

/// Window passed to the chart endpoint when looking up the pressure trend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HistoryWindow {
    pub feed: String,
    pub hours: u32,
    pub resolution: u32,
}

impl Default for HistoryWindow {
    fn default() -> Self {
        Self {
            feed: "pressure".to_string(),
            hours: 6,
            resolution: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub location: Location,
    #[serde(rename = "lightThreshold")]
    pub light_threshold: u16,
    #[serde(rename = "lightSettleMs")]
    pub light_settle_ms: u64,
    #[serde(rename = "shortSleepSecs")]
    pub short_sleep_secs: u64,
    #[serde(rename = "longSleepSecs")]
    pub long_sleep_secs: u64,
    #[serde(rename = "httpTimeoutSecs")]
    pub http_timeout_secs: u64,
    #[serde(rename = "openweatherUrl")]
    pub openweather_url: String,
    #[serde(rename = "aioUrl")]
    pub aio_url: String,
    pub feeds: FeedPlan,
    #[serde(rename = "pressureHistory")]
    pub pressure_history: HistoryWindow,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            location: Location::default(),
            light_threshold: 600,
            light_settle_ms: 50,
            short_sleep_secs: 30,
            long_sleep_secs: 300,
            http_timeout_secs: 30,
            openweather_url: DEFAULT_OPENWEATHER_URL.to_string(),
            aio_url: DEFAULT_AIO_URL.to_string(),
            feeds: FeedPlan::default(),
            pressure_history: HistoryWindow::default(),
        }
    }
}

impl StationConfig {
    pub fn sanitize(&mut self) {
        let defaults = Self::default();

        if self.short_sleep_secs == 0 {
            self.short_sleep_secs = defaults.short_sleep_secs;
        }
        if self.long_sleep_secs == 0 {
            self.long_sleep_secs = defaults.long_sleep_secs;
        }
        if self.http_timeout_secs == 0 {
            self.http_timeout_secs = defaults.http_timeout_secs;
        }
        self.light_settle_ms = self.light_settle_ms.min(5_000);

        if !self.location.lat.is_finite() || !(-90.0..=90.0).contains(&self.location.lat) {
            self.location.lat = defaults.location.lat;
        }
        if !self.location.lon.is_finite() || !(-180.0..=180.0).contains(&self.location.lon) {
            self.location.lon = defaults.location.lon;
        }

        for query in self.feeds.queries_mut() {
            query.samples = query.samples.max(1);
        }
        self.pressure_history.hours = self.pressure_history.hours.max(1);
        self.pressure_history.resolution = self.pressure_history.resolution.max(1);

        if self.openweather_url.trim().is_empty() {
            self.openweather_url = defaults.openweather_url;
        }
        if self.aio_url.trim().is_empty() {
            self.aio_url = defaults.aio_url;
        }
        self.aio_url = self.aio_url.trim_end_matches('/').to_string();
    }
}

/// Stretches a raw ADC sample onto the 16-bit range `light_threshold` is
/// expressed in. Samples above `full_scale` clamp.
pub fn scale_light(raw: u16, full_scale: u16) -> u16 {
    if full_scale == 0 {
        return raw;
    }
    let full_scale = u32::from(full_scale);
    let scaled = u32::from(raw).min(full_scale) * u32::from(u16::MAX) / full_scale;
    u16::try_from(scaled).unwrap_or(u16::MAX)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub station: StationConfig,
    #[serde(default)]
    pub secrets: Secrets,
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.station.sanitize();
    }
}
