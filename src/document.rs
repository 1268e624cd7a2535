use crate::error::{PsdError, Result};
use crate::io::pixel_source::PixelSource;
use crate::processing::blend::{apply_alpha, BlendMode};
use crate::processing::color::Color;

/// Colour mode written to the header; only RGB is produced
pub const COLOR_MODE_RGB: u16 = 3;

/// The layer count is stored as a signed 16-bit value
pub const MAX_LAYERS: usize = i16::MAX as usize;

/// Bits per channel sample
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ColorDepth {
    Bitmap,
    #[default]
    Eight,
    Sixteen,
}

impl ColorDepth {
    pub const fn bits(self) -> u16 {
        match self {
            ColorDepth::Bitmap => 1,
            ColorDepth::Eight => 8,
            ColorDepth::Sixteen => 16,
        }
    }

    /// Encoded size of one scanline of `width` samples
    pub const fn row_bytes(self, width: usize) -> usize {
        match self {
            ColorDepth::Bitmap => width.div_ceil(8),
            ColorDepth::Eight => width,
            ColorDepth::Sixteen => width * 2,
        }
    }
}

impl TryFrom<u16> for ColorDepth {
    type Error = PsdError;

    fn try_from(bits: u16) -> Result<Self> {
        match bits {
            1 => Ok(ColorDepth::Bitmap),
            8 => Ok(ColorDepth::Eight),
            16 => Ok(ColorDepth::Sixteen),
            other => Err(PsdError::InvalidDepth(other)),
        }
    }
}

/// Layer bounds in canvas pixels; bottom and right are exclusive
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub top: u32,
    pub left: u32,
    pub bottom: u32,
    pub right: u32,
}

impl Rect {
    pub fn new(top: u32, left: u32, bottom: u32, right: u32) -> Self {
        Self { top, left, bottom, right }
    }

    /// Rectangle of the given size anchored at (left, top)
    pub fn at(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self::new(top, left, top.saturating_add(height), left.saturating_add(width))
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    #[inline]
    pub fn area(&self) -> usize {
        self.width() as usize * self.height() as usize
    }
}

/// One raster layer of the document
#[derive(Clone, Debug)]
pub struct Layer {
    pub name: String,
    pub rect: Rect,
    /// 3 (RGB) or 4 (RGBA); 1 and 2 write only the leading components
    pub channel_count: u16,
    pub blend_mode: BlendMode,
    pub opacity: u8,
    pub clipping: bool,
    pub protect_transparency: bool,
    pub visible: bool,
    /// Row-major, top row first, `rect.area()` entries
    pub colors: Vec<Color>,
}

impl Default for Layer {
    fn default() -> Self {
        Self {
            name: "layer".to_string(),
            rect: Rect::default(),
            channel_count: 4,
            blend_mode: BlendMode::Normal,
            opacity: 0xFF,
            clipping: false,
            protect_transparency: false,
            visible: true,
            colors: Vec::new(),
        }
    }
}

impl Layer {
    pub fn new(name: impl Into<String>, rect: Rect, colors: Vec<Color>) -> Self {
        Self { name: name.into(), rect, colors, ..Default::default() }
    }

    /// Build a layer from an external pixel source, keeping its clip and visibility flags
    pub fn from_source(name: impl Into<String>, source: &dyn PixelSource) -> Self {
        let (left, top) = source.origin();
        Self {
            name: name.into(),
            rect: Rect::at(left, top, source.width(), source.height()),
            clipping: source.is_clipped(),
            visible: source.is_visible(),
            colors: source.pixels(),
            ..Default::default()
        }
    }

    pub fn with_blend_mode(mut self, mode: BlendMode) -> Self {
        self.blend_mode = mode;
        self
    }

    pub fn with_opacity(mut self, opacity: u8) -> Self {
        self.opacity = opacity;
        self
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.rect.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.rect.height()
    }

    /// Structural checks that do not depend on the owning document
    pub fn validate(&self, index: usize) -> Result<()> {
        if self.name.is_empty() {
            return Err(PsdError::EmptyLayerName { index });
        }

        let r = &self.rect;
        if r.bottom <= r.top || r.right <= r.left {
            return Err(PsdError::InvalidLayerSize {
                name: self.name.clone(),
                width: r.right as i64 - r.left as i64,
                height: r.bottom as i64 - r.top as i64,
            });
        }

        if !(1..=4).contains(&self.channel_count) {
            return Err(PsdError::InvalidLayerChannelCount {
                name: self.name.clone(),
                count: self.channel_count,
            });
        }

        if self.colors.len() != r.area() {
            return Err(PsdError::LayerBufferSize {
                name: self.name.clone(),
                expected: r.area(),
                actual: self.colors.len(),
            });
        }

        Ok(())
    }
}

/// Layered RGB document: the layer stack plus its flattened preview
#[derive(Clone, Debug)]
pub struct Document {
    pub channel_count: u16,
    pub width: u32,
    pub height: u32,
    pub depth: ColorDepth,
    /// Paint order, index 0 is the bottom layer
    pub layers: Vec<Layer>,
    colors: Vec<Color>,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            channel_count: 3,
            width: 0,
            height: 0,
            depth: ColorDepth::Eight,
            layers: Vec::new(),
            colors: Vec::new(),
        }
    }
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate from `(name, source)` pairs, bottom layer first
    pub fn from_sources<'a, I>(sources: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a dyn PixelSource)>,
    {
        let mut doc = Self::new();
        for (name, source) in sources {
            doc.push_layer(Layer::from_source(name, source));
        }
        doc
    }

    /// Append a layer on top and grow the canvas to cover it
    pub fn push_layer(&mut self, layer: Layer) {
        self.width = self.width.max(layer.rect.right);
        self.height = self.height.max(layer.rect.bottom);
        self.layers.push(layer);
    }

    #[inline]
    pub fn color_mode(&self) -> u16 {
        COLOR_MODE_RGB
    }

    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Flattened preview; empty until [`Document::build_colors`] runs
    pub fn colors(&self) -> &[Color] {
        &self.colors
    }

    /// Flatten the layer stack into the composite buffer.
    ///
    /// Hidden layers are skipped and opacity scales the source alpha. Every
    /// stored pixel is saturated, so NaN or infinite blend results never leak
    /// into the preview.
    pub fn build_colors(&mut self) -> Result<()> {
        self.validate_layers()?;

        let width = self.width as usize;
        let pixel_count = self.pixel_count();
        self.colors.clear();
        self.colors.resize(pixel_count, Color::TRANSPARENT);

        for layer in self.layers.iter().filter(|l| l.visible) {
            let combine = layer
                .blend_mode
                .combiner()
                .ok_or(PsdError::UnsupportedBlendMode(layer.blend_mode))?;
            let opacity = layer.opacity as f32 / 255.0;
            let layer_width = layer.width() as usize;
            let left = layer.rect.left as usize;

            for (row, src_row) in layer.colors.chunks_exact(layer_width).enumerate() {
                let start = (layer.rect.top as usize + row) * width + left;
                let dst_row = &mut self.colors[start..start + layer_width];
                for (dst, src) in dst_row.iter_mut().zip(src_row) {
                    let src = src.with_alpha(src.a * opacity);
                    *dst = apply_alpha(combine(src, *dst), src, *dst).saturate();
                }
            }
        }

        Ok(())
    }

    /// Checks everything except the composite buffer
    fn validate_layers(&self) -> Result<()> {
        if self.layers.is_empty() {
            return Err(PsdError::NoLayers);
        }
        if self.layers.len() > MAX_LAYERS {
            return Err(PsdError::TooManyLayers { count: self.layers.len() });
        }
        if self.width == 0 || self.height == 0 {
            return Err(PsdError::InvalidDocumentSize { width: self.width, height: self.height });
        }

        for (index, layer) in self.layers.iter().enumerate() {
            layer.validate(index)?;
            if layer.rect.right > self.width || layer.rect.bottom > self.height {
                return Err(PsdError::LayerOutOfBounds {
                    name: layer.name.clone(),
                    width: self.width,
                    height: self.height,
                });
            }
        }
        Ok(())
    }

    /// Precondition gate for encoding
    pub fn validate(&self) -> Result<()> {
        if !(1..=3).contains(&self.channel_count) {
            return Err(PsdError::InvalidChannelCount(self.channel_count));
        }
        self.validate_layers()?;
        if self.colors.len() != self.pixel_count() {
            return Err(PsdError::CompositeSize {
                expected: self.pixel_count(),
                actual: self.colors.len(),
            });
        }
        Ok(())
    }
}
