use std::path::Path;

use anyhow::Context;

use crate::processing::color::Color;

/// Supplier of one layer's pixels.
///
/// Pixels are row-major with row 0 at the top. Components are nominally in
/// [0, 1]; anything outside is quantised naively, so callers that cannot
/// guarantee the range should clamp first (see [`RasterSource::clamp_unit`]).
pub trait PixelSource {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn pixels(&self) -> Vec<Color>;

    /// Top-left corner on the canvas as (left, top)
    fn origin(&self) -> (u32, u32) {
        (0, 0)
    }

    fn is_clipped(&self) -> bool {
        false
    }

    fn is_visible(&self) -> bool {
        true
    }
}

/// In-memory pixel buffer, the common currency of all loaders
#[derive(Clone, Debug, Default)]
pub struct RasterSource {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<Color>,
    pub origin: (u32, u32),
    pub clipped: bool,
    pub visible: bool,
}

impl RasterSource {
    pub fn new(width: u32, height: u32, pixels: Vec<Color>) -> Self {
        Self { width, height, pixels, origin: (0, 0), clipped: false, visible: true }
    }

    pub fn with_origin(mut self, left: u32, top: u32) -> Self {
        self.origin = (left, top);
        self
    }

    pub fn with_clipped(mut self, clipped: bool) -> Self {
        self.clipped = clipped;
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    /// Run every pixel through a colour selector
    pub fn map_colors(mut self, f: impl Fn(Color) -> Color) -> Self {
        for c in self.pixels.iter_mut() {
            *c = f(*c);
        }
        self
    }

    /// Pre-clamp to [0, 1] so out-of-range HDR values do not wrap on quantisation
    pub fn clamp_unit(self) -> Self {
        self.map_colors(Color::saturate)
    }

    /// Flip rows for sources that store the bottom row first
    pub fn flip_vertical(mut self) -> Self {
        let width = self.width as usize;
        if width > 0 {
            let rows: Vec<Vec<Color>> = self.pixels.chunks(width).rev().map(|r| r.to_vec()).collect();
            self.pixels = rows.concat();
        }
        self
    }
}

impl PixelSource for RasterSource {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn pixels(&self) -> Vec<Color> {
        self.pixels.clone()
    }

    fn origin(&self) -> (u32, u32) {
        self.origin
    }

    fn is_clipped(&self) -> bool {
        self.clipped
    }

    fn is_visible(&self) -> bool {
        self.visible
    }
}

/// Load any raster format supported by the `image` crate as a single layer source
pub fn load_image_source(path: &Path) -> anyhow::Result<RasterSource> {
    let img = image::open(path)
        .with_context(|| format!("Failed to read image: {}", path.display()))?
        .into_rgba32f();

    let (width, height) = img.dimensions();
    let pixels = img
        .pixels()
        .map(|p| Color::new(p.0[0], p.0[1], p.0[2], p.0[3]))
        .collect();

    Ok(RasterSource::new(width, height, pixels))
}
