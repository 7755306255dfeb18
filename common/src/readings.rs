use crate::{
    config::FeedPlan,
    error::FeedError,
    feeds::{read_aggregate, FeedSource},
};

/// Station measurements aggregated from the cloud feeds for one wake cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Readings {
    pub temperature: f64,
    pub pressure: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    pub wind_gust: f64,
    pub wind_direction: f64,
    pub rain: f64,
    pub battery_voltage: f64,
}

impl Readings {
    pub fn collect<S: FeedSource + ?Sized>(
        source: &mut S,
        plan: &FeedPlan,
    ) -> Result<Self, FeedError> {
        Ok(Self {
            temperature: read_aggregate(source, &plan.temperature)?,
            pressure: read_aggregate(source, &plan.pressure)?,
            humidity: read_aggregate(source, &plan.humidity)?,
            wind_speed: read_aggregate(source, &plan.wind_speed)?,
            wind_gust: read_aggregate(source, &plan.wind_gust)?,
            wind_direction: read_aggregate(source, &plan.wind_direction)?,
            rain: read_aggregate(source, &plan.rain)?,
            battery_voltage: read_aggregate(source, &plan.battery_voltage)?,
        })
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::http::testing::CannedTransport;

    /// Feed responses matching the default plan.
    pub fn station_feeds(transport: CannedTransport) -> CannedTransport {
        transport
            .respond(
                "/feeds/temperature/data",
                r#"[{"value":"21.9"},{"value":"21.8"},{"value":"21.7"},{"value":"21.6"},{"value":"21.5"}]"#,
            )
            .respond(
                "/feeds/pressure/data",
                r#"[{"value":"101.3"},{"value":"101.3"},{"value":"101.2"},{"value":"101.2"},{"value":"101.2"}]"#,
            )
            .respond(
                "/feeds/humidity/data",
                r#"[{"value":"45"},{"value":"46"},{"value":"47"},{"value":"48"},{"value":"49"}]"#,
            )
            .respond("/feeds/wind-speed/data", r#"[{"value":"12.3"}]"#)
            .respond("/feeds/wind-gust/data", r#"[{"value":"18.9"}]"#)
            .respond("/feeds/wind-direction/data", r#"[{"value":"200"}]"#)
            .respond(
                "/feeds/rain/data",
                r#"[{"value":"0.2"},{"value":"0.0"},{"value":"1.0"}]"#,
            )
            .respond("/feeds/battery-voltage/data", r#"[{"value":"4.05"}]"#)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{feeds::AdafruitIo, http::testing::CannedTransport};

    #[test]
    fn collects_every_feed_in_plan() {
        let transport = fixtures::station_feeds(CannedTransport::new());
        let mut io = AdafruitIo::new(transport, "https://io.example.com", "station", "key");

        let readings = Readings::collect(&mut io, &FeedPlan::default()).unwrap();

        assert!((readings.temperature - 21.7).abs() < 1e-9);
        assert!((readings.pressure - 101.24).abs() < 1e-9);
        assert!((readings.humidity - 47.0).abs() < 1e-9);
        assert!((readings.rain - 1.2).abs() < 1e-9);
        assert_eq!(readings.wind_direction, 200.0);
        assert_eq!(readings.battery_voltage, 4.05);
    }

    #[test]
    fn first_failing_feed_aborts_collection() {
        let transport = fixtures::station_feeds(CannedTransport::new())
            .fail("/feeds/wind-gust/data", 503);
        let mut io = AdafruitIo::new(transport, "https://io.example.com", "station", "key");

        let err = Readings::collect(&mut io, &FeedPlan::default()).unwrap_err();

        assert!(matches!(err, FeedError::Transport(_)));
    }
}
