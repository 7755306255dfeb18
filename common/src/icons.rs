use crate::error::IconError;

/// OpenWeather icon prefixes in sprite-sheet order. Day/night suffixes share a tile.
pub const ICON_CODES: [&str; 9] = ["01", "02", "03", "04", "09", "10", "11", "13", "50"];

pub fn icon_index(icon: &str) -> Result<usize, IconError> {
    let code = icon.get(..2).ok_or_else(|| IconError(icon.to_string()))?;
    ICON_CODES
        .iter()
        .position(|candidate| *candidate == code)
        .ok_or_else(|| IconError(icon.to_string()))
}

/// Tiles of the generic 20px sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenericIcon {
    Low,
    High,
    Sunrise,
    Sunset,
}

impl GenericIcon {
    pub fn index(self) -> usize {
        match self {
            Self::Low => 0,
            Self::High => 1,
            Self::Sunrise => 2,
            Self::Sunset => 3,
        }
    }
}
