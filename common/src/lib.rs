pub mod compass;
pub mod config;
pub mod cycle;
pub mod dashboard;
pub mod error;
pub mod feeds;
pub mod forecast;
pub mod http;
pub mod icons;
pub mod raster;
pub mod readings;
pub mod trend;

pub use config::{RuntimeConfig, Secrets, StationConfig};
pub use cycle::{run_cycle, CycleOutcome, Device, Phase, SleepPlan, WakeReason};
pub use dashboard::{compose, DashboardData, Screen};
pub use error::{CycleError, DeviceError, TransportError};
pub use feeds::{AdafruitIo, FeedSource};
pub use forecast::{ForecastSource, OneCall, OpenWeather};
pub use http::HttpTransport;
pub use raster::{render, FrameBuffer, IconAtlas, SheetImage};
pub use readings::Readings;
pub use trend::PressureTrend;
