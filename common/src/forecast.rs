//! OpenWeather One Call client and the subset of its response the dashboard reads.

use chrono::{DateTime, FixedOffset, TimeZone};
use serde::Deserialize;

use crate::{
    config::StationConfig,
    error::{ConfigError, ForecastError},
    http::{build_url, HttpTransport},
    icons::icon_index,
};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub id: u32,
    #[serde(default)]
    pub main: String,
    #[serde(default)]
    pub description: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Current {
    pub dt: i64,
    pub sunrise: i64,
    pub sunset: i64,
    pub temp: f64,
    pub weather: Vec<Condition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct DailyTemp {
    pub day: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Daily {
    pub dt: i64,
    pub temp: DailyTemp,
    pub weather: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Hourly {
    pub dt: i64,
    pub temp: f64,
    pub weather: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OneCall {
    pub timezone_offset: i32,
    pub current: Current,
    pub daily: Vec<Daily>,
    pub hourly: Vec<Hourly>,
}

impl OneCall {
    pub fn parse(body: &str) -> Result<Self, ForecastError> {
        Ok(serde_json::from_str(body)?)
    }

    pub fn offset(&self) -> Result<FixedOffset, ForecastError> {
        FixedOffset::east_opt(self.timezone_offset)
            .ok_or_else(|| ForecastError::MissingField("timezone_offset".to_string()))
    }

    /// Converts an API timestamp into the forecast location's local time.
    pub fn local_time(&self, timestamp: i64) -> Result<DateTime<FixedOffset>, ForecastError> {
        self.offset()?
            .timestamp_opt(timestamp, 0)
            .single()
            .ok_or(ForecastError::Timestamp(timestamp))
    }

    pub fn day(&self, index: usize) -> Result<&Daily, ForecastError> {
        self.daily
            .get(index)
            .ok_or_else(|| ForecastError::MissingField(format!("daily[{index}]")))
    }

    pub fn hour(&self, index: usize) -> Result<&Hourly, ForecastError> {
        self.hourly
            .get(index)
            .ok_or_else(|| ForecastError::MissingField(format!("hourly[{index}]")))
    }
}

/// Sprite index of the first listed condition.
pub fn condition_icon(weather: &[Condition], field: &str) -> Result<usize, ForecastError> {
    let condition = weather
        .first()
        .ok_or_else(|| ForecastError::MissingField(format!("{field}.weather[0]")))?;
    Ok(icon_index(&condition.icon)?)
}

pub trait ForecastSource {
    fn fetch_forecast(&mut self) -> Result<OneCall, ForecastError>;
}

impl<F: ForecastSource + ?Sized> ForecastSource for &mut F {
    fn fetch_forecast(&mut self) -> Result<OneCall, ForecastError> {
        (**self).fetch_forecast()
    }
}

pub fn onecall_url(config: &StationConfig, api_key: &str) -> Result<String, ConfigError> {
    build_url(
        &config.openweather_url,
        &[
            ("lon", config.location.lon.to_string()),
            ("lat", config.location.lat.to_string()),
            ("APPID", api_key.to_string()),
            ("units", "metric".to_string()),
            ("exclude", "minutely,alerts".to_string()),
        ],
    )
}

pub struct OpenWeather<T> {
    transport: T,
    url: String,
}

impl<T: HttpTransport> OpenWeather<T> {
    pub fn new(transport: T, config: &StationConfig, api_key: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            transport,
            url: onecall_url(config, api_key)?,
        })
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T: HttpTransport> ForecastSource for OpenWeather<T> {
    fn fetch_forecast(&mut self) -> Result<OneCall, ForecastError> {
        let body = self.transport.get(&self.url, &[("Accept", "application/json")])?;
        OneCall::parse(&body)
    }
}


#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike, Weekday};

    use super::*;
    use crate::http::testing::CannedTransport;

    #[test]
    fn parses_sections() {
        let forecast = OneCall::parse(fixtures::ONECALL).unwrap();

        assert_eq!(forecast.timezone_offset, -18_000);
        assert_eq!(forecast.daily.len(), 8);
        assert_eq!(forecast.hourly.len(), 48);
        assert_eq!(forecast.current.weather[0].icon, "02d");
        assert_eq!(forecast.day(0).unwrap().temp.day, 23.4);
    }

    #[test]
    fn local_time_applies_offset() {
        let forecast = OneCall::parse(fixtures::ONECALL).unwrap();

        let sunrise = forecast.local_time(forecast.current.sunrise).unwrap();

        assert_eq!((sunrise.hour(), sunrise.minute()), (5, 21));
        let now = forecast.local_time(forecast.current.dt).unwrap();
        assert_eq!(now.weekday(), Weekday::Wed);
    }

    #[test]
    fn short_arrays_are_missing_fields() {
        let mut forecast = OneCall::parse(fixtures::ONECALL).unwrap();
        forecast.hourly.truncate(4);

        assert!(matches!(
            forecast.hour(8),
            Err(ForecastError::MissingField(field)) if field == "hourly[8]"
        ));
        assert!(matches!(
            condition_icon(&[], "current"),
            Err(ForecastError::MissingField(field)) if field == "current.weather[0]"
        ));
    }

    #[test]
    fn missing_section_fails_to_decode() {
        let body = r#"{"timezone_offset":0,"current":{"dt":0,"sunrise":0,"sunset":0,"temp":1.0,"weather":[]},"daily":[]}"#;

        assert!(matches!(OneCall::parse(body), Err(ForecastError::Decode(_))));
    }

    #[test]
    fn requests_onecall_with_location_and_key() {
        let config = StationConfig {
            openweather_url: "https://owm.example.com/data/2.5/onecall".to_string(),
            ..StationConfig::default()
        };
        let transport = CannedTransport::new().respond("/onecall", fixtures::ONECALL);
        let mut client = OpenWeather::new(transport, &config, "owm_123").unwrap();

        let forecast = client.fetch_forecast().unwrap();

        assert_eq!(forecast.hourly[1].temp, 22.1);
        assert_eq!(
            client.transport.requests[0].0,
            "https://owm.example.com/data/2.5/onecall?lon=-97.147&lat=49.8844&APPID=owm_123&units=metric&exclude=minutely%2Calerts"
        );
    }
}
