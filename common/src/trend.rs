use log::warn;

use crate::{config::HistoryWindow, error::FeedError, feeds::FeedSource};

/// Change (kPa) over the history window that counts as a real trend.
pub const TREND_THRESHOLD_KPA: f64 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressureTrend {
    Rising,
    Falling,
    Steady,
}

impl PressureTrend {
    pub fn classify(diff: f64) -> Self {
        if diff > TREND_THRESHOLD_KPA {
            Self::Rising
        } else if diff < -TREND_THRESHOLD_KPA {
            Self::Falling
        } else {
            Self::Steady
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rising => "Rising",
            Self::Falling => "Falling",
            Self::Steady => "Steady",
        }
    }
}

/// Last minus first sample of the window.
pub fn history_diff<S: FeedSource + ?Sized>(
    source: &mut S,
    window: &HistoryWindow,
) -> Result<f64, FeedError> {
    let values = source.receive_history(window)?.values(&window.feed)?;
    match (values.first(), values.last()) {
        (Some(first), Some(last)) => Ok(last - first),
        _ => Err(FeedError::Empty(window.feed.clone())),
    }
}

/// Best effort: a missing or broken history reads as no change.
pub fn pressure_diff_or_steady<S: FeedSource + ?Sized>(
    source: &mut S,
    window: &HistoryWindow,
) -> f64 {
    match history_diff(source, window) {
        Ok(diff) => diff,
        Err(err) => {
            warn!("pressure history unavailable, assuming steady: {err}");
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        feeds::{AdafruitIo, FeedHistory, FeedScalar, FeedValue},
        http::testing::CannedTransport,
    };

    struct History(Vec<f64>);

    impl FeedSource for History {
        fn receive_last(&mut self, feed: &str, _limit: usize) -> Result<Vec<FeedValue>, FeedError> {
            Err(FeedError::Empty(feed.to_string()))
        }

        fn receive_history(&mut self, _window: &HistoryWindow) -> Result<FeedHistory, FeedError> {
            Ok(FeedHistory {
                data: self
                    .0
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (format!("t{i}"), FeedScalar::Number(*v)))
                    .collect(),
            })
        }
    }

    #[test]
    fn classifies_against_threshold() {
        assert_eq!(PressureTrend::classify(0.20), PressureTrend::Rising);
        assert_eq!(PressureTrend::classify(0.05), PressureTrend::Steady);
        assert_eq!(PressureTrend::classify(-0.05), PressureTrend::Steady);
        assert_eq!(PressureTrend::classify(0.0), PressureTrend::Steady);
    }

    #[test]
    fn falling_uses_negative_threshold() {
        assert_eq!(PressureTrend::classify(-0.20), PressureTrend::Falling);
        // The single-sided `< 0.15` comparison would have labelled exactly
        // -0.15 as falling; the symmetric band keeps it steady.
        assert_eq!(PressureTrend::classify(-0.15), PressureTrend::Steady);
        assert_eq!(PressureTrend::classify(0.15), PressureTrend::Steady);
    }

    #[test]
    fn diff_is_last_minus_first() {
        let mut source = History(vec![101.0, 101.1, 100.9, 101.2, 101.3, 101.25]);

        let diff = history_diff(&mut source, &HistoryWindow::default()).unwrap();

        assert!((diff - 0.25).abs() < 1e-9);
    }

    #[test]
    fn unavailable_history_reads_as_steady() {
        let mut empty = History(Vec::new());
        assert_eq!(pressure_diff_or_steady(&mut empty, &HistoryWindow::default()), 0.0);

        let mut io = AdafruitIo::new(
            CannedTransport::new().fail("/data/chart", 500),
            "https://io.example.com",
            "station",
            "key",
        );
        assert_eq!(pressure_diff_or_steady(&mut io, &HistoryWindow::default()), 0.0);
    }
}
