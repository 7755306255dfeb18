//! Rasterizes a composed [`Screen`] with embedded-graphics.
//!
//! Ink is `BinaryColor::On`. Sprite sheets are raw 1-bpp strips (MSB first,
//! rows padded to whole bytes, set bit = ink) with square tiles laid out left
//! to right.

use core::convert::Infallible;

use embedded_graphics::{
    image::{Image, ImageDrawableExt, ImageRaw},
    mono_font::{
        iso_8859_1::{FONT_10X20, FONT_6X10, FONT_7X13},
        MonoFont, MonoTextStyle,
    },
    pixelcolor::BinaryColor,
    prelude::*,
    primitives::{PrimitiveStyle, Rectangle},
    text::{Alignment, Baseline, Text, TextStyleBuilder},
};

use crate::{
    dashboard::{
        Anchor, Element, Font, Label, Screen, SpriteSheet, Tile, SCREEN_HEIGHT, SCREEN_WIDTH,
    },
    error::RenderError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetImage {
    data: Vec<u8>,
    width: u32,
}

impl SheetImage {
    pub fn new(data: Vec<u8>, width: u32) -> Result<Self, RenderError> {
        if width == 0 {
            return Err(RenderError::ZeroWidth);
        }
        let row_bytes = width.div_ceil(8) as usize;
        if data.is_empty() || data.len() % row_bytes != 0 {
            return Err(RenderError::RaggedRows {
                len: data.len(),
                width,
            });
        }
        Ok(Self { data, width })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        (self.data.len() / self.width.div_ceil(8) as usize) as u32
    }

    fn raw(&self) -> ImageRaw<'_, BinaryColor> {
        ImageRaw::new(&self.data, self.width)
    }
}

/// Background and icon sheets loaded from storage. Missing sheets render as
/// outlined placeholders.
#[derive(Debug, Clone, Default)]
pub struct IconAtlas {
    pub background: Option<SheetImage>,
    pub large: Option<SheetImage>,
    pub small: Option<SheetImage>,
    pub generic: Option<SheetImage>,
}

impl IconAtlas {
    pub fn sheet(&self, sheet: SpriteSheet) -> Option<&SheetImage> {
        match sheet {
            SpriteSheet::Large => self.large.as_ref(),
            SpriteSheet::Small => self.small.as_ref(),
            SpriteSheet::Generic => self.generic.as_ref(),
        }
    }

    pub fn set_sheet(&mut self, sheet: SpriteSheet, image: SheetImage) {
        match sheet {
            SpriteSheet::Large => self.large = Some(image),
            SpriteSheet::Small => self.small = Some(image),
            SpriteSheet::Generic => self.generic = Some(image),
        }
    }
}

/// 1-bpp in-memory panel image.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    ink: Vec<bool>,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new(SCREEN_WIDTH, SCREEN_HEIGHT)
    }
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ink: vec![false; width as usize * height as usize],
        }
    }

    pub fn is_ink(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.ink[(y * self.width + x) as usize]
    }

    pub fn ink_count(&self) -> usize {
        self.ink.iter().filter(|ink| **ink).count()
    }

    /// Row-major, MSB-first packing. `ink_bit` is the bit value written for ink;
    /// most e-paper controllers want `false` (0 = black).
    pub fn to_packed(&self, ink_bit: bool) -> Vec<u8> {
        let row_bytes = self.width.div_ceil(8) as usize;
        let mut out = vec![if ink_bit { 0x00 } else { 0xFF }; row_bytes * self.height as usize];

        for y in 0..self.height as usize {
            for x in 0..self.width as usize {
                if self.ink[y * self.width as usize + x] {
                    let byte = &mut out[y * row_bytes + x / 8];
                    let mask = 0x80 >> (x % 8);
                    if ink_bit {
                        *byte |= mask;
                    } else {
                        *byte &= !mask;
                    }
                }
            }
        }
        out
    }

    /// Quarter turn clockwise, for panels whose native scan runs along the
    /// short edge.
    pub fn rotated_clockwise(&self) -> Self {
        let mut out = Self::new(self.height, self.width);
        for y in 0..self.height {
            for x in 0..self.width {
                if self.is_ink(x, y) {
                    let (nx, ny) = (self.height - 1 - y, x);
                    out.ink[(ny * out.width + nx) as usize] = true;
                }
            }
        }
        out
    }

    /// Binary PBM (`P4`) image, handy for checking a layout on the host.
    pub fn to_pbm(&self) -> Vec<u8> {
        let mut out = format!("P4\n{} {}\n", self.width, self.height).into_bytes();
        out.extend(self.to_packed(true));
        out
    }
}

impl OriginDimensions for FrameBuffer {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl DrawTarget for FrameBuffer {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(coord, color) in pixels {
            if coord.x >= 0
                && coord.y >= 0
                && (coord.x as u32) < self.width
                && (coord.y as u32) < self.height
            {
                let idx = coord.y as usize * self.width as usize + coord.x as usize;
                self.ink[idx] = color.is_on();
            }
        }
        Ok(())
    }
}

fn mono_font(font: Font) -> &'static MonoFont<'static> {
    match font {
        Font::Bold => &FONT_10X20,
        Font::Medium => &FONT_7X13,
        Font::Small => &FONT_6X10,
    }
}

fn text_layout(anchor: Anchor) -> (Alignment, Baseline) {
    match anchor {
        Anchor::TopLeft => (Alignment::Left, Baseline::Top),
        Anchor::TopCenter => (Alignment::Center, Baseline::Top),
        Anchor::TopRight => (Alignment::Right, Baseline::Top),
        Anchor::MiddleLeft => (Alignment::Left, Baseline::Middle),
        Anchor::BottomCenter => (Alignment::Center, Baseline::Bottom),
    }
}

fn draw_label<D>(target: &mut D, label: &Label, origin: Point) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    let (alignment, baseline) = text_layout(label.anchor);
    let text_style = TextStyleBuilder::new()
        .alignment(alignment)
        .baseline(baseline)
        .build();
    let character_style = MonoTextStyle::new(mono_font(label.font), BinaryColor::On);

    Text::with_text_style(
        &label.text,
        origin + Point::new(label.x, label.y),
        character_style,
        text_style,
    )
    .draw(target)?;
    Ok(())
}

fn draw_tile<D>(
    target: &mut D,
    tile: &Tile,
    atlas: &IconAtlas,
    origin: Point,
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    let size = tile.sheet.tile_size();
    let top_left = origin + Point::new(tile.x, tile.y);
    let column = tile.index as u32 * size;

    match atlas.sheet(tile.sheet) {
        Some(sheet) if column + size <= sheet.width() && size <= sheet.height() => {
            let raw = sheet.raw();
            let sprite = raw.sub_image(&Rectangle::new(
                Point::new(column as i32, 0),
                Size::new_equal(size),
            ));
            Image::new(&sprite, top_left).draw(target)
        }
        _ => Rectangle::new(top_left, Size::new_equal(size))
            .into_styled(PrimitiveStyle::with_stroke(BinaryColor::On, 1))
            .draw(target),
    }
}

fn draw_elements<D>(
    target: &mut D,
    elements: &[Element],
    atlas: &IconAtlas,
    origin: Point,
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    for element in elements {
        match element {
            Element::Label(label) => draw_label(target, label, origin)?,
            Element::Tile(tile) => draw_tile(target, tile, atlas, origin)?,
            Element::Group(group) => draw_elements(
                target,
                &group.children,
                atlas,
                origin + Point::new(group.x, group.y),
            )?,
        }
    }
    Ok(())
}

pub fn draw_screen<D>(target: &mut D, screen: &Screen, atlas: &IconAtlas) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    target.clear(BinaryColor::Off)?;
    if let Some(background) = &atlas.background {
        Image::new(&background.raw(), Point::zero()).draw(target)?;
    }
    draw_elements(target, &screen.elements, atlas, Point::zero())
}

pub fn render(screen: &Screen, atlas: &IconAtlas) -> FrameBuffer {
    let mut frame = FrameBuffer::new(screen.width, screen.height);
    draw_screen(&mut frame, screen, atlas).unwrap_or_else(|never| match never {});
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::Group;

    fn screen(elements: Vec<Element>) -> Screen {
        Screen {
            elements,
            ..Screen::default()
        }
    }

    fn tile(sheet: SpriteSheet, index: usize, x: i32, y: i32) -> Element {
        Element::Tile(Tile { sheet, index, x, y })
    }

    /// Two 20px tiles: the first blank, the second solid.
    fn two_tile_sheet() -> SheetImage {
        let mut data = Vec::new();
        for _ in 0..20 {
            // 40px row = 5 bytes; bits 20..40 set.
            data.extend([0x00, 0x00, 0x0F, 0xFF, 0xFF]);
        }
        SheetImage::new(data, 40).unwrap()
    }

    #[test]
    fn rejects_ragged_sheet_data() {
        assert_eq!(
            SheetImage::new(vec![0; 7], 40),
            Err(RenderError::RaggedRows { len: 7, width: 40 })
        );
        assert_eq!(SheetImage::new(vec![0; 5], 0), Err(RenderError::ZeroWidth));
    }

    #[test]
    fn draws_selected_tile_from_sheet() {
        let mut atlas = IconAtlas::default();
        atlas.set_sheet(SpriteSheet::Small, two_tile_sheet());

        let blank = render(&screen(vec![tile(SpriteSheet::Small, 0, 10, 10)]), &atlas);
        let solid = render(&screen(vec![tile(SpriteSheet::Small, 1, 10, 10)]), &atlas);

        assert_eq!(blank.ink_count(), 0);
        assert_eq!(solid.ink_count(), 400);
        assert!(solid.is_ink(10, 10) && solid.is_ink(29, 29));
        assert!(!solid.is_ink(30, 30));
    }

    #[test]
    fn missing_sheet_draws_outline() {
        let frame = render(
            &screen(vec![tile(SpriteSheet::Large, 3, 0, 0)]),
            &IconAtlas::default(),
        );

        assert!(frame.is_ink(0, 0));
        assert!(frame.is_ink(49, 49));
        assert!(!frame.is_ink(25, 25));
    }

    #[test]
    fn right_anchored_text_ends_at_anchor() {
        let label = Element::Label(Label {
            font: Font::Medium,
            text: "23.4°C".to_string(),
            anchor: Anchor::TopRight,
            x: 288,
            y: 50,
        });

        let frame = render(&screen(vec![label]), &IconAtlas::default());

        assert!(frame.ink_count() > 0);
        for y in 0..SCREEN_HEIGHT {
            for x in 289..SCREEN_WIDTH {
                assert!(!frame.is_ink(x, y), "ink right of anchor at ({x}, {y})");
            }
            if y < 50 {
                for x in 0..SCREEN_WIDTH {
                    assert!(!frame.is_ink(x, y), "ink above anchor at ({x}, {y})");
                }
            }
        }
    }

    #[test]
    fn groups_offset_children() {
        let mut atlas = IconAtlas::default();
        atlas.set_sheet(SpriteSheet::Small, two_tile_sheet());
        let group = Element::Group(Group {
            x: 100,
            y: 50,
            children: vec![tile(SpriteSheet::Small, 1, 5, 5)],
        });

        let frame = render(&screen(vec![group]), &atlas);

        assert!(frame.is_ink(105, 55));
        assert!(!frame.is_ink(104, 54));
    }

    #[test]
    fn packs_rows_msb_first() {
        let mut frame = FrameBuffer::new(10, 2);
        Pixel(Point::new(0, 0), BinaryColor::On).draw(&mut frame).unwrap();
        Pixel(Point::new(9, 1), BinaryColor::On).draw(&mut frame).unwrap();

        assert_eq!(frame.to_packed(true), vec![0x80, 0x00, 0x00, 0x40]);
        assert_eq!(frame.to_packed(false), vec![0x7F, 0xFF, 0xFF, 0xBF]);
        assert!(frame.to_pbm().starts_with(b"P4\n10 2\n"));
    }

    #[test]
    fn rotation_maps_top_left_to_top_right() {
        let mut frame = FrameBuffer::new(4, 2);
        Pixel(Point::new(0, 0), BinaryColor::On).draw(&mut frame).unwrap();
        Pixel(Point::new(3, 1), BinaryColor::On).draw(&mut frame).unwrap();

        let rotated = frame.rotated_clockwise();

        assert_eq!(rotated.size(), Size::new(2, 4));
        assert!(rotated.is_ink(1, 0));
        assert!(rotated.is_ink(0, 3));
        assert_eq!(rotated.ink_count(), 2);
    }
}
