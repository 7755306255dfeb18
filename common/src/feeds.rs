//! Adafruit IO feed access and the aggregate readers built on top of it.

use serde::Deserialize;
use url::Url;

use crate::{
    config::{Aggregate, FeedQuery, HistoryWindow},
    error::{ConfigError, FeedError},
    http::HttpTransport,
};

/// A sample value. Adafruit IO stores everything as text, but the chart
/// endpoint sometimes hands back bare numbers.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FeedScalar {
    Number(f64),
    Text(String),
}

impl FeedScalar {
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            Self::Number(value) => Some(*value),
            Self::Text(text) => text.trim().parse::<f64>().ok(),
        };
        value.filter(|value| value.is_finite())
    }

    fn to_f64(&self, feed: &str) -> Result<f64, FeedError> {
        self.as_f64().ok_or_else(|| FeedError::InvalidValue {
            feed: feed.to_string(),
            value: match self {
                Self::Number(value) => value.to_string(),
                Self::Text(text) => text.clone(),
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeedValue {
    pub value: FeedScalar,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeedHistory {
    pub data: Vec<(String, FeedScalar)>,
}

impl FeedHistory {
    pub fn values(&self, feed: &str) -> Result<Vec<f64>, FeedError> {
        self.data
            .iter()
            .map(|(_, value)| value.to_f64(feed))
            .collect()
    }
}

/// Read access to named data streams.
pub trait FeedSource {
    /// Most recent `limit` values, newest first.
    fn receive_last(&mut self, feed: &str, limit: usize) -> Result<Vec<FeedValue>, FeedError>;

    /// Bucketed history over the trailing window, oldest first.
    fn receive_history(&mut self, window: &HistoryWindow) -> Result<FeedHistory, FeedError>;
}

impl<S: FeedSource + ?Sized> FeedSource for &mut S {
    fn receive_last(&mut self, feed: &str, limit: usize) -> Result<Vec<FeedValue>, FeedError> {
        (**self).receive_last(feed, limit)
    }

    fn receive_history(&mut self, window: &HistoryWindow) -> Result<FeedHistory, FeedError> {
        (**self).receive_history(window)
    }
}

pub struct AdafruitIo<T> {
    transport: T,
    base_url: String,
    username: String,
    key: String,
}

impl<T: HttpTransport> AdafruitIo<T> {
    pub fn new(transport: T, base_url: &str, username: &str, key: &str) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            key: key.to_string(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn data_url(
        &self,
        feed: &str,
        chart: bool,
        query: &[(&str, String)],
    ) -> Result<String, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidUrl {
            url: self.base_url.clone(),
            reason,
        };

        let mut url = Url::parse(&self.base_url).map_err(|err| invalid(err.to_string()))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| invalid("base url cannot carry a path".to_string()))?;
            segments
                .pop_if_empty()
                .extend(["api", "v2", self.username.as_str(), "feeds", feed, "data"]);
            if chart {
                segments.push("chart");
            }
        }
        url.query_pairs_mut()
            .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        Ok(url.into())
    }

    fn fetch(&mut self, url: &str) -> Result<String, FeedError> {
        let headers = [("X-AIO-Key", self.key.as_str()), ("Accept", "application/json")];
        Ok(self.transport.get(url, &headers)?)
    }
}

impl<T: HttpTransport> FeedSource for AdafruitIo<T> {
    fn receive_last(&mut self, feed: &str, limit: usize) -> Result<Vec<FeedValue>, FeedError> {
        let url = self.data_url(feed, false, &[("limit", limit.to_string())])?;
        let body = self.fetch(&url)?;
        serde_json::from_str(&body).map_err(|source| FeedError::Decode {
            feed: feed.to_string(),
            source,
        })
    }

    fn receive_history(&mut self, window: &HistoryWindow) -> Result<FeedHistory, FeedError> {
        let url = self.data_url(
            &window.feed,
            true,
            &[
                ("hours", window.hours.to_string()),
                ("resolution", window.resolution.to_string()),
            ],
        )?;
        let body = self.fetch(&url)?;
        serde_json::from_str(&body).map_err(|source| FeedError::Decode {
            feed: window.feed.clone(),
            source,
        })
    }
}

pub fn parse_samples(feed: &str, values: &[FeedValue]) -> Result<Vec<f64>, FeedError> {
    values.iter().map(|sample| sample.value.to_f64(feed)).collect()
}

/// Arithmetic mean. An empty stream is an error, never a silent zero.
pub fn average(feed: &str, samples: &[f64]) -> Result<f64, FeedError> {
    if samples.is_empty() {
        return Err(FeedError::Empty(feed.to_string()));
    }
    Ok(samples.iter().sum::<f64>() / samples.len() as f64)
}

pub fn sum(feed: &str, samples: &[f64]) -> Result<f64, FeedError> {
    if samples.is_empty() {
        return Err(FeedError::Empty(feed.to_string()));
    }
    Ok(samples.iter().sum())
}

pub fn average_last<S: FeedSource + ?Sized>(
    source: &mut S,
    feed: &str,
    limit: usize,
) -> Result<f64, FeedError> {
    let values = source.receive_last(feed, limit)?;
    average(feed, &parse_samples(feed, &values)?)
}

pub fn sum_last<S: FeedSource + ?Sized>(
    source: &mut S,
    feed: &str,
    limit: usize,
) -> Result<f64, FeedError> {
    let values = source.receive_last(feed, limit)?;
    sum(feed, &parse_samples(feed, &values)?)
}

pub fn read_aggregate<S: FeedSource + ?Sized>(
    source: &mut S,
    query: &FeedQuery,
) -> Result<f64, FeedError> {
    match query.aggregate {
        Aggregate::Average => average_last(source, &query.feed, query.samples),
        Aggregate::Sum => sum_last(source, &query.feed, query.samples),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::CannedTransport;

    fn client(transport: CannedTransport) -> AdafruitIo<CannedTransport> {
        AdafruitIo::new(transport, "https://io.example.com/", "station", "aio_key")
    }

    #[test]
    fn average_and_sum_of_fixed_samples() {
        let samples = [1.5, 2.5, 3.0, 4.0];

        assert!((average("t", &samples).unwrap() - 2.75).abs() < 1e-9);
        assert!((sum("t", &samples).unwrap() - 11.0).abs() < 1e-9);
    }

    #[test]
    fn empty_stream_is_an_error() {
        assert!(matches!(average("rain", &[]), Err(FeedError::Empty(feed)) if feed == "rain"));
        assert!(matches!(sum("rain", &[]), Err(FeedError::Empty(_))));

        let mut io = client(CannedTransport::new().respond("/feeds/rain/data", "[]"));
        assert!(matches!(
            sum_last(&mut io, "rain", 60),
            Err(FeedError::Empty(_))
        ));
    }

    #[test]
    fn reads_last_values_with_key_header() {
        let transport = CannedTransport::new().respond(
            "/feeds/temperature/data",
            r#"[{"id":"a","value":"21.5"},{"id":"b","value":"22.0"},{"id":"c","value":21.6}]"#,
        );
        let mut io = client(transport);

        let avg = average_last(&mut io, "temperature", 3).unwrap();

        assert!((avg - 21.7).abs() < 1e-9);
        let (url, headers) = &io.transport.requests[0];
        assert_eq!(
            url,
            "https://io.example.com/api/v2/station/feeds/temperature/data?limit=3"
        );
        assert!(headers.contains(&("X-AIO-Key".to_string(), "aio_key".to_string())));
    }

    #[test]
    fn non_numeric_sample_is_rejected() {
        let mut io = client(
            CannedTransport::new().respond("/feeds/humidity/data", r#"[{"value":"n/a"}]"#),
        );

        assert!(matches!(
            average_last(&mut io, "humidity", 1),
            Err(FeedError::InvalidValue { value, .. }) if value == "n/a"
        ));
    }

    #[test]
    fn reads_chart_history() {
        let transport = CannedTransport::new().respond(
            "/feeds/pressure/data/chart",
            r#"{"columns":["date","avg"],"data":[["2024-05-01T10:00:00Z","101.20"],["2024-05-01T11:00:00Z",101.4]]}"#,
        );
        let mut io = client(transport);

        let history = io.receive_history(&HistoryWindow::default()).unwrap();

        assert_eq!(history.values("pressure").unwrap(), vec![101.2, 101.4]);
        assert_eq!(
            io.transport.requests[0].0,
            "https://io.example.com/api/v2/station/feeds/pressure/data/chart?hours=6&resolution=60"
        );
    }

    #[test]
    fn aggregate_follows_query_kind() {
        let transport = CannedTransport::new()
            .respond("/feeds/rain/data", r#"[{"value":"0.2"},{"value":"0.3"}]"#);
        let mut io = client(transport);
        let query = FeedQuery {
            feed: "rain".to_string(),
            samples: 60,
            aggregate: Aggregate::Sum,
        };

        assert!((read_aggregate(&mut io, &query).unwrap() - 0.5).abs() < 1e-9);
    }
}
