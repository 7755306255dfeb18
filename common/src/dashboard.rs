//! Fixed dashboard layout for the 296x128 panel.
//!
//! Composition only produces a tree of labels and icon tiles; `raster` turns
//! that tree into pixels.

use chrono::{DateTime, Datelike, FixedOffset, Timelike, Weekday};
use serde::Serialize;

use crate::{
    compass::wind_direction,
    error::ForecastError,
    forecast::{condition_icon, OneCall},
    icons::GenericIcon,
    readings::Readings,
    trend::PressureTrend,
};

pub const SCREEN_WIDTH: u32 = 296;
pub const SCREEN_HEIGHT: u32 = 128;

/// Hours ahead shown in the outlook strip, with the strip's x positions.
pub const OUTLOOK_HOURS: [(usize, i32); 4] = [(1, 90), (2, 120), (4, 150), (8, 180)];
const OUTLOOK_Y: i32 = 95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Font {
    Bold,
    Medium,
    Small,
}

/// Which point of the text's bounding box sits on the label position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Anchor {
    TopLeft,
    TopCenter,
    TopRight,
    MiddleLeft,
    BottomCenter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SpriteSheet {
    Large,
    Small,
    Generic,
}

impl SpriteSheet {
    pub fn tile_size(self) -> u32 {
        match self {
            Self::Large => 50,
            Self::Small | Self::Generic => 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Label {
    pub font: Font,
    pub text: String,
    pub anchor: Anchor,
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Tile {
    pub sheet: SpriteSheet,
    pub index: usize,
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub x: i32,
    pub y: i32,
    pub children: Vec<Element>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Element {
    Label(Label),
    Tile(Tile),
    Group(Group),
}

impl Element {
    fn label(font: Font, text: impl Into<String>, anchor: Anchor, x: i32, y: i32) -> Self {
        Self::Label(Label {
            font,
            text: text.into(),
            anchor,
            x,
            y,
        })
    }

    fn tile(sheet: SpriteSheet, index: usize, x: i32, y: i32) -> Self {
        Self::Tile(Tile { sheet, index, x, y })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Screen {
    pub width: u32,
    pub height: u32,
    pub elements: Vec<Element>,
}

impl Default for Screen {
    fn default() -> Self {
        Self {
            width: SCREEN_WIDTH,
            height: SCREEN_HEIGHT,
            elements: Vec::new(),
        }
    }
}

impl Screen {
    fn push(&mut self, element: Element) {
        self.elements.push(element);
    }

    /// Every label with its absolute position, depth first.
    pub fn labels(&self) -> Vec<(i32, i32, &Label)> {
        fn walk<'a>(
            elements: &'a [Element],
            dx: i32,
            dy: i32,
            out: &mut Vec<(i32, i32, &'a Label)>,
        ) {
            for element in elements {
                match element {
                    Element::Label(label) => out.push((label.x + dx, label.y + dy, label)),
                    Element::Tile(_) => {}
                    Element::Group(group) => walk(&group.children, dx + group.x, dy + group.y, out),
                }
            }
        }

        let mut out = Vec::new();
        walk(&self.elements, 0, 0, &mut out);
        out
    }

    pub fn label_at(&self, x: i32, y: i32) -> Option<&str> {
        self.labels()
            .into_iter()
            .find(|(lx, ly, _)| *lx == x && *ly == y)
            .map(|(_, _, label)| label.text.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HourOutlook {
    pub hours_ahead: usize,
    pub temp: f64,
    pub icon: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayOutlook {
    pub weekday: Weekday,
    pub min: f64,
    pub max: f64,
    pub icon: usize,
}

/// Every value the dashboard shows, already derived and looked up.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardData {
    pub today: Weekday,
    pub readings: Readings,
    pub wind_direction: &'static str,
    pub pressure_trend: PressureTrend,
    pub sunrise: DateTime<FixedOffset>,
    pub sunset: DateTime<FixedOffset>,
    pub today_high: f64,
    pub today_low: f64,
    pub current_icon: usize,
    pub outlook: Vec<HourOutlook>,
    pub next_day: DayOutlook,
}

impl DashboardData {
    pub fn derive(
        readings: &Readings,
        forecast: &OneCall,
        pressure_diff: f64,
    ) -> Result<Self, ForecastError> {
        let today = forecast.day(0)?;
        let tomorrow = forecast.day(1)?;

        let outlook = OUTLOOK_HOURS
            .iter()
            .map(|&(hours_ahead, _)| {
                let hour = forecast.hour(hours_ahead)?;
                Ok(HourOutlook {
                    hours_ahead,
                    temp: hour.temp,
                    icon: condition_icon(&hour.weather, &format!("hourly[{hours_ahead}]"))?,
                })
            })
            .collect::<Result<Vec<_>, ForecastError>>()?;

        Ok(Self {
            today: forecast.local_time(forecast.current.dt)?.weekday(),
            readings: *readings,
            wind_direction: wind_direction(readings.wind_direction),
            pressure_trend: PressureTrend::classify(pressure_diff),
            sunrise: forecast.local_time(forecast.current.sunrise)?,
            sunset: forecast.local_time(forecast.current.sunset)?,
            // Daytime temperature rather than the daily max, which can land at odd hours.
            today_high: today.temp.day,
            today_low: today.temp.min,
            current_icon: condition_icon(&forecast.current.weather, "current")?,
            outlook,
            next_day: DayOutlook {
                weekday: forecast.local_time(tomorrow.dt)?.weekday(),
                min: tomorrow.temp.min,
                max: tomorrow.temp.max,
                icon: condition_icon(&tomorrow.weather, "daily[1]")?,
            },
        })
    }
}

pub fn day_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// `" 5:21am"` style 12-hour clock.
pub fn format_clock(time: &DateTime<FixedOffset>) -> String {
    let (pm, hour) = time.hour12();
    let suffix = if pm { "pm" } else { "am" };
    format!("{:2}:{:02}{}", hour, time.minute(), suffix)
}

pub fn future_hour_group(outlook: &HourOutlook, x: i32, y: i32) -> Element {
    Element::Group(Group {
        x,
        y,
        children: vec![
            Element::tile(SpriteSheet::Small, outlook.icon, 0, 0),
            Element::label(Font::Small, format!("{:.1}", outlook.temp), Anchor::TopCenter, 10, 20),
            Element::label(
                Font::Small,
                format!("+{}", outlook.hours_ahead),
                Anchor::TopCenter,
                10,
                -7,
            ),
        ],
    })
}

pub fn next_day_group(outlook: &DayOutlook, x: i32, y: i32) -> Element {
    Element::Group(Group {
        x,
        y,
        children: vec![
            Element::tile(SpriteSheet::Small, outlook.icon, 25, 10),
            Element::label(Font::Small, format!("{:.1}", outlook.min), Anchor::TopRight, 24, 15),
            Element::label(Font::Small, format!("{:4.1}", outlook.max), Anchor::TopLeft, 46, 15),
            Element::label(Font::Small, day_name(outlook.weekday), Anchor::BottomCenter, 35, 9),
        ],
    })
}

pub fn compose(data: &DashboardData) -> Screen {
    let readings = &data.readings;
    let mut screen = Screen::default();

    // Centre column: conditions measured by the station.
    screen.push(Element::label(Font::Medium, day_name(data.today), Anchor::TopCenter, 148, 4));
    screen.push(Element::label(
        Font::Bold,
        format!("{:.1}°C", readings.temperature),
        Anchor::TopCenter,
        148,
        24,
    ));
    screen.push(Element::label(
        Font::Medium,
        format!("{:.1}/{:.1}km/h", readings.wind_speed, readings.wind_gust),
        Anchor::TopCenter,
        148,
        55,
    ));
    screen.push(Element::label(Font::Medium, data.wind_direction, Anchor::TopCenter, 148, 70));

    // Left column.
    screen.push(Element::label(
        Font::Medium,
        format!("{:.1}kPa", readings.pressure),
        Anchor::MiddleLeft,
        5,
        65,
    ));
    screen.push(Element::label(
        Font::Medium,
        data.pressure_trend.as_str(),
        Anchor::MiddleLeft,
        5,
        80,
    ));
    screen.push(Element::label(
        Font::Medium,
        format!("{:.1}%", readings.humidity),
        Anchor::MiddleLeft,
        5,
        100,
    ));
    screen.push(Element::label(
        Font::Medium,
        format!("{:.1}mm", readings.rain),
        Anchor::MiddleLeft,
        5,
        115,
    ));

    // Right column: sun times and today's range.
    screen.push(Element::tile(SpriteSheet::Generic, GenericIcon::Sunrise.index(), 220, 5));
    screen.push(Element::label(
        Font::Medium,
        format_clock(&data.sunrise),
        Anchor::TopRight,
        294,
        7,
    ));
    screen.push(Element::tile(SpriteSheet::Generic, GenericIcon::Sunset.index(), 220, 25));
    screen.push(Element::label(
        Font::Medium,
        format_clock(&data.sunset),
        Anchor::TopRight,
        294,
        27,
    ));
    screen.push(Element::tile(SpriteSheet::Generic, GenericIcon::High.index(), 220, 45));
    screen.push(Element::label(
        Font::Medium,
        format!("{:.1}°C", data.today_high),
        Anchor::TopRight,
        288,
        50,
    ));
    screen.push(Element::tile(SpriteSheet::Generic, GenericIcon::Low.index(), 220, 65));
    screen.push(Element::label(
        Font::Medium,
        format!("{:.1}°C", data.today_low),
        Anchor::TopRight,
        288,
        68,
    ));

    screen.push(Element::tile(SpriteSheet::Large, data.current_icon, 10, 5));

    for (outlook, &(_, x)) in data.outlook.iter().zip(OUTLOOK_HOURS.iter()) {
        screen.push(future_hour_group(outlook, x, OUTLOOK_Y));
    }
    screen.push(next_day_group(&data.next_day, 220, 93));

    screen
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::forecast::fixtures::ONECALL;

    fn readings() -> Readings {
        Readings {
            temperature: 21.7,
            pressure: 101.24,
            humidity: 47.0,
            wind_speed: 12.3,
            wind_gust: 18.9,
            wind_direction: 200.0,
            rain: 1.2,
            battery_voltage: 4.05,
        }
    }

    fn data() -> DashboardData {
        let forecast = OneCall::parse(ONECALL).unwrap();
        DashboardData::derive(&readings(), &forecast, 0.2).unwrap()
    }

    #[test]
    fn derives_forecast_values() {
        let data = data();

        assert_eq!(data.today, Weekday::Wed);
        assert_eq!(data.wind_direction, "SSW");
        assert_eq!(data.pressure_trend, PressureTrend::Rising);
        assert_eq!(data.current_icon, 1);
        assert_eq!(
            data.outlook,
            vec![
                HourOutlook { hours_ahead: 1, temp: 22.1, icon: 2 },
                HourOutlook { hours_ahead: 2, temp: 22.7, icon: 3 },
                HourOutlook { hours_ahead: 4, temp: 23.9, icon: 4 },
                HourOutlook { hours_ahead: 8, temp: 26.3, icon: 6 },
            ]
        );
        assert_eq!(
            data.next_day,
            DayOutlook { weekday: Weekday::Thu, min: 4.6, max: 9.5, icon: 5 }
        );
    }

    #[test]
    fn composes_fixed_layout() {
        let screen = compose(&data());

        assert_eq!(screen.label_at(148, 4), Some("Wednesday"));
        assert_eq!(screen.label_at(148, 24), Some("21.7°C"));
        assert_eq!(screen.label_at(148, 55), Some("12.3/18.9km/h"));
        assert_eq!(screen.label_at(148, 70), Some("SSW"));
        assert_eq!(screen.label_at(5, 65), Some("101.2kPa"));
        assert_eq!(screen.label_at(5, 80), Some("Rising"));
        assert_eq!(screen.label_at(5, 100), Some("47.0%"));
        assert_eq!(screen.label_at(5, 115), Some("1.2mm"));
        assert_eq!(screen.label_at(294, 7), Some(" 5:21am"));
        assert_eq!(screen.label_at(294, 27), Some(" 9:14pm"));
        assert_eq!(screen.label_at(288, 50), Some("23.4°C"));
        assert_eq!(screen.label_at(288, 68), Some("11.2°C"));
    }

    #[test]
    fn outlook_groups_are_offset() {
        let screen = compose(&data());

        assert_eq!(screen.label_at(100, 115), Some("22.1"));
        assert_eq!(screen.label_at(100, 88), Some("+1"));
        assert_eq!(screen.label_at(190, 88), Some("+8"));
        assert_eq!(screen.label_at(244, 108), Some("4.6"));
        assert_eq!(screen.label_at(266, 108), Some(" 9.5"));
        assert_eq!(screen.label_at(255, 102), Some("Thursday"));
    }

    #[test]
    fn places_icon_tiles() {
        let screen = compose(&data());
        let tiles: Vec<Tile> = screen
            .elements
            .iter()
            .filter_map(|element| match element {
                Element::Tile(tile) => Some(*tile),
                _ => None,
            })
            .collect();

        assert_eq!(
            tiles,
            vec![
                Tile { sheet: SpriteSheet::Generic, index: 2, x: 220, y: 5 },
                Tile { sheet: SpriteSheet::Generic, index: 3, x: 220, y: 25 },
                Tile { sheet: SpriteSheet::Generic, index: 1, x: 220, y: 45 },
                Tile { sheet: SpriteSheet::Generic, index: 0, x: 220, y: 65 },
                Tile { sheet: SpriteSheet::Large, index: 1, x: 10, y: 5 },
            ]
        );
    }

    #[test]
    fn clock_uses_twelve_hour_format() {
        let offset = FixedOffset::east_opt(0).unwrap();
        let noon = DateTime::parse_from_rfc3339("2024-05-15T12:05:00Z")
            .unwrap()
            .with_timezone(&offset);
        let midnight = DateTime::parse_from_rfc3339("2024-05-15T00:30:00Z")
            .unwrap()
            .with_timezone(&offset);

        assert_eq!(format_clock(&noon), "12:05pm");
        assert_eq!(format_clock(&midnight), "12:30am");
    }

    #[test]
    fn unknown_forecast_icon_fails_derivation() {
        let mut forecast = OneCall::parse(ONECALL).unwrap();
        forecast.hourly[4].weather[0].icon = "99d".to_string();

        assert!(matches!(
            DashboardData::derive(&readings(), &forecast, 0.0),
            Err(ForecastError::Icon(_))
        ));
    }
}
