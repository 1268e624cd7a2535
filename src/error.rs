//! Error types for document validation, compositing and PSD encoding.

use crate::processing::blend::BlendMode;

/// Errors produced by the document model and the PSD encoder.
///
/// Validation variants are reported before any encoding work starts. The
/// size-field variants indicate a broken layout and abort the whole encode.
#[derive(Debug, thiserror::Error)]
pub enum PsdError {
    /// Document channel count outside 1..=3.
    #[error("document channel count is invalid: {0}")]
    InvalidChannelCount(u16),

    /// Colour depth other than 1, 8 or 16.
    #[error("colour depth is invalid: {0}")]
    InvalidDepth(u16),

    /// The document holds no layers.
    #[error("document has no layers")]
    NoLayers,

    /// More layers than the signed 16-bit layer count can hold.
    #[error("too many layers: {count} (at most 32767)")]
    TooManyLayers { count: usize },

    /// Document canvas has a zero dimension.
    #[error("document size is invalid: {width}x{height}")]
    InvalidDocumentSize { width: u32, height: u32 },

    /// `build_colors` has not been run, or the canvas changed afterwards.
    #[error("composite length is invalid: {actual} != {expected}")]
    CompositeSize { expected: usize, actual: usize },

    /// A layer without a name.
    #[error("layer #{index} has no name")]
    EmptyLayerName { index: usize },

    /// A layer whose rectangle has no area (or is inverted).
    #[error("layer [{name}] w/h is invalid: ({width},{height})")]
    InvalidLayerSize { name: String, width: i64, height: i64 },

    /// Layer channel count outside 1..=4.
    #[error("layer [{name}] channel count is invalid: {count}")]
    InvalidLayerChannelCount { name: String, count: u16 },

    /// Pixel buffer length differs from the rectangle area.
    #[error("layer [{name}] colors length is invalid: {actual} != {expected}")]
    LayerBufferSize { name: String, expected: usize, actual: usize },

    /// Layer rectangle reaches past the document canvas.
    #[error("layer [{name}] lies outside the {width}x{height} canvas")]
    LayerOutOfBounds { name: String, width: u32, height: u32 },

    /// PassThrough and Dissolve have no per-pixel formula.
    #[error("unsupported blend mode: {0}")]
    UnsupportedBlendMode(BlendMode),

    /// A measured length does not fit the reserved size field.
    #[error("size field overflow: {value} does not fit in {width} bytes")]
    SizeFieldOverflow { value: usize, width: usize },

    /// A size patch points outside the written buffer.
    #[error("size field at {offset} (+{width}) is outside the {len}-byte buffer")]
    PatchOutOfBounds { offset: usize, width: usize, len: usize },

    /// Blocks were opened and closed out of order.
    #[error("unbalanced size blocks ({open} open)")]
    UnbalancedBlocks { open: usize },

    /// Writing the encoded buffer failed.
    #[error("write error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PsdError>;
