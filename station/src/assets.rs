//! Background and icon sheets compiled into the firmware image.

use weather_common::{
    dashboard::{SpriteSheet, SCREEN_WIDTH},
    error::RenderError,
    icons::ICON_CODES,
    IconAtlas, SheetImage,
};

const BACKGROUND: &[u8] = include_bytes!("../assets/background.bin");
const LARGE_ICONS: &[u8] = include_bytes!("../assets/icons-large.bin");
const SMALL_ICONS: &[u8] = include_bytes!("../assets/icons-small.bin");
const GENERIC_ICONS: &[u8] = include_bytes!("../assets/icons-generic.bin");

pub const GENERIC_ICON_COUNT: u32 = 4;

/// Pixel width of a full strip for `sheet`.
pub fn sheet_width(sheet: SpriteSheet) -> u32 {
    let tiles = match sheet {
        SpriteSheet::Large | SpriteSheet::Small => ICON_CODES.len() as u32,
        SpriteSheet::Generic => GENERIC_ICON_COUNT,
    };
    sheet.tile_size() * tiles
}

pub fn bundled_atlas() -> Result<IconAtlas, RenderError> {
    let mut atlas = IconAtlas {
        background: Some(SheetImage::new(BACKGROUND.to_vec(), SCREEN_WIDTH)?),
        ..IconAtlas::default()
    };
    for (sheet, data) in [
        (SpriteSheet::Large, LARGE_ICONS),
        (SpriteSheet::Small, SMALL_ICONS),
        (SpriteSheet::Generic, GENERIC_ICONS),
    ] {
        atlas.set_sheet(sheet, SheetImage::new(data.to_vec(), sheet_width(sheet))?);
    }
    Ok(atlas)
}
