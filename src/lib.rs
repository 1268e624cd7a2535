//! Layered PSD export: blend-mode compositing, PackBits compression and the
//! `8BPS` container writer, plus EXR / raster sources for the `exr2psd` tool.

pub mod document;
pub mod error;
pub mod io;
pub mod processing;
pub mod progress;
pub mod psd_writer;
pub mod utils;

pub use document::{ColorDepth, Document, Layer, Rect};
pub use error::{PsdError, Result};
pub use io::pixel_source::{PixelSource, RasterSource};
pub use processing::blend::BlendMode;
pub use processing::color::{Color, Hcy};
pub use psd_writer::{encode_document, write_psd};
