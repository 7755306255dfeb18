pub const DIRECTIONS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

const SECTOR_DEG: f64 = 22.5;

/// Compass label for a bearing in degrees. Any finite input wraps onto 0..360.
pub fn wind_direction(degrees: f64) -> &'static str {
    if !degrees.is_finite() {
        return DIRECTIONS[0];
    }
    let sector = ((degrees + SECTOR_DEG / 2.0) / SECTOR_DEG).floor();
    DIRECTIONS[sector.rem_euclid(16.0) as usize]
}
