//! PSD (`8BPS`) encoder.
//!
//! The whole file is laid out in one pass over an in-memory buffer. Section
//! sizes are unknown until their content has been written, so they are
//! reserved as zero placeholders and patched afterwards.

use std::io::Write;

use crate::document::{ColorDepth, Document, Layer};
use crate::error::{PsdError, Result};
use crate::processing::color::Color;
use crate::processing::rle;

const SIGNATURE: &[u8; 4] = b"8BPS";
const VERSION: u16 = 1;
const RESOURCE_SIGNATURE: &[u8; 4] = b"8BIM";
const COMPRESSION_RLE: u16 = 1;
/// Channel id of the transparency channel in layer records
const ALPHA_CHANNEL_ID: u16 = 0xFFFF;
/// Blending range pair covering the full black..white span
const FULL_BLEND_RANGE: u32 = 0x0000_FFFF;
const MAX_PASCAL_LEN: usize = 255;

/// Width in bytes of a size field
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldWidth {
    U16,
    U32,
}

impl FieldWidth {
    pub const fn bytes(self) -> usize {
        match self {
            FieldWidth::U16 => 2,
            FieldWidth::U32 => 4,
        }
    }

    const fn max_value(self) -> usize {
        match self {
            FieldWidth::U16 => u16::MAX as usize,
            FieldWidth::U32 => u32::MAX as usize,
        }
    }
}

/// A reserved size field waiting for its value
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placeholder {
    pub offset: usize,
    pub width: FieldWidth,
}

/// Open nested block: the size field and where the block content starts
#[derive(Clone, Copy, Debug)]
struct PendingBlock {
    field: Placeholder,
    start: usize,
}

/// Big-endian byte buffer with deferred size fields
#[derive(Debug, Default)]
pub struct BinaryBuilder {
    buf: Vec<u8>,
    blocks: Vec<PendingBlock>,
}

impl BinaryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { buf: Vec::with_capacity(capacity), blocks: Vec::new() }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    #[inline]
    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    #[inline]
    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    #[inline]
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn put_zeros(&mut self, count: usize) {
        self.buf.resize(self.buf.len() + count, 0);
    }

    /// Length byte, then the name padded so that length byte + name is a multiple of 4.
    ///
    /// Characters outside Latin-1 are written as `?`; names over 255 bytes are truncated.
    pub fn put_pascal_string(&mut self, name: &str) {
        let bytes: Vec<u8> = name
            .chars()
            .map(|c| if (c as u32) < 0x100 { c as u8 } else { b'?' })
            .take(MAX_PASCAL_LEN)
            .collect();
        let padded = (1 + bytes.len() + 3) / 4 * 4 - 1;
        self.put_u8(bytes.len() as u8);
        self.put_bytes(&bytes);
        self.put_zeros(padded - bytes.len());
    }

    /// Reserve a zeroed size field to be patched later
    pub fn reserve(&mut self, width: FieldWidth) -> Placeholder {
        let field = Placeholder { offset: self.buf.len(), width };
        self.put_zeros(width.bytes());
        field
    }

    /// Write `value` into a reserved field
    pub fn patch(&mut self, field: Placeholder, value: usize) -> Result<()> {
        let width = field.width.bytes();
        let end = field.offset.checked_add(width).filter(|&end| end <= self.buf.len());
        let Some(end) = end else {
            return Err(PsdError::PatchOutOfBounds { offset: field.offset, width, len: self.buf.len() });
        };
        if value > field.width.max_value() {
            return Err(PsdError::SizeFieldOverflow { value, width });
        }
        let target = &mut self.buf[field.offset..end];
        match field.width {
            FieldWidth::U16 => target.copy_from_slice(&(value as u16).to_be_bytes()),
            FieldWidth::U32 => target.copy_from_slice(&(value as u32).to_be_bytes()),
        }
        Ok(())
    }

    /// Patch a field with the number of bytes written since `start`
    pub fn patch_since(&mut self, field: Placeholder, start: usize) -> Result<()> {
        let size = self.buf.len().saturating_sub(start);
        self.patch(field, size)
    }

    /// Open a block prefixed by a u32 size covering everything up to `end_block`
    pub fn begin_block(&mut self) {
        let field = self.reserve(FieldWidth::U32);
        self.blocks.push(PendingBlock { field, start: self.buf.len() });
    }

    /// Close the innermost block, returning its content length
    pub fn end_block(&mut self) -> Result<usize> {
        let block = self.blocks.pop().ok_or(PsdError::UnbalancedBlocks { open: 0 })?;
        let size = self.buf.len() - block.start;
        self.patch(block.field, size)?;
        Ok(size)
    }

    /// Bytes written into the innermost open block so far
    pub fn block_len(&self) -> Option<usize> {
        self.blocks.last().map(|b| self.buf.len() - b.start)
    }

    /// Hand over the buffer; every block must have been closed
    pub fn finish(self) -> Result<Vec<u8>> {
        if !self.blocks.is_empty() {
            return Err(PsdError::UnbalancedBlocks { open: self.blocks.len() });
        }
        Ok(self.buf)
    }
}

#[inline]
fn unit(v: f32) -> f32 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

/// Quantise one component of a row of pixels into `out` (cleared first)
fn quantize_row(row: &[Color], component: usize, depth: ColorDepth, out: &mut Vec<u8>) {
    out.clear();
    match depth {
        ColorDepth::Eight => {
            out.extend(row.iter().map(|c| (unit(c.component(component)) * 255.0).round() as u8));
        }
        ColorDepth::Sixteen => {
            for c in row {
                let v = (unit(c.component(component)) * 65535.0).round() as u16;
                out.extend_from_slice(&v.to_be_bytes());
            }
        }
        ColorDepth::Bitmap => {
            // 1 = ink, MSB first
            for chunk in row.chunks(8) {
                let mut byte = 0u8;
                for (bit, c) in chunk.iter().enumerate() {
                    if unit(c.component(component)) < 0.5 {
                        byte |= 0x80 >> bit;
                    }
                }
                out.push(byte);
            }
        }
    }
}

/// Reusable buffers for scanline encoding
#[derive(Default)]
struct ScanlineScratch {
    raw: Vec<u8>,
    packed: Vec<u8>,
}

impl ScanlineScratch {
    fn pack(&mut self, row: &[Color], component: usize, depth: ColorDepth) -> &[u8] {
        quantize_row(row, component, depth, &mut self.raw);
        self.packed.clear();
        rle::compress_into(&self.raw, &mut self.packed);
        &self.packed
    }
}

/// Channel ids and the colour component each one carries
fn layer_channels(layer: &Layer) -> Vec<(u16, usize)> {
    let count = layer.channel_count as usize;
    (0..count)
        .map(|k| {
            if count == 4 {
                let id = if k == 0 { ALPHA_CHANNEL_ID } else { (k - 1) as u16 };
                (id, (k + 3) % 4)
            } else {
                (k as u16, k)
            }
        })
        .collect()
}

fn flags(layer: &Layer) -> u8 {
    let mut flags = 0u8;
    if layer.protect_transparency {
        flags |= 0b01;
    }
    if !layer.visible {
        flags |= 0b10;
    }
    flags
}

fn write_header(b: &mut BinaryBuilder, doc: &Document) {
    b.put_bytes(SIGNATURE);
    b.put_u16(VERSION);
    b.put_zeros(6);
    b.put_u16(doc.channel_count);
    b.put_u32(doc.height);
    b.put_u32(doc.width);
    b.put_u16(doc.depth.bits());
    b.put_u16(doc.color_mode());

    // Colour mode data, image resources
    b.put_u32(0);
    b.put_u32(0);
}

/// Layer record; returns the channel-data size fields in channel order
fn write_layer_record(b: &mut BinaryBuilder, layer: &Layer) -> Result<Vec<Placeholder>> {
    let r = &layer.rect;
    b.put_u32(r.top);
    b.put_u32(r.left);
    b.put_u32(r.bottom);
    b.put_u32(r.right);
    b.put_u16(layer.channel_count);

    let channels = layer_channels(layer);
    let mut sizes = Vec::with_capacity(channels.len());
    for (id, _) in &channels {
        b.put_u16(*id);
        sizes.push(b.reserve(FieldWidth::U32));
    }

    b.put_bytes(RESOURCE_SIGNATURE);
    b.put_bytes(layer.blend_mode.key());
    b.put_u8(layer.opacity);
    b.put_u8(layer.clipping as u8);
    b.put_u8(flags(layer));
    b.put_u8(0);

    b.begin_block();
    {
        // No layer mask
        b.put_u32(0);

        let ranges = layer.channel_count as u32 + 1;
        b.put_u32(ranges * 8);
        for _ in 0..ranges {
            b.put_u32(FULL_BLEND_RANGE);
            b.put_u32(FULL_BLEND_RANGE);
        }

        b.put_pascal_string(&layer.name);

        b.put_bytes(RESOURCE_SIGNATURE);
        b.put_bytes(b"tsly");
        b.put_u32(4);
        b.put_bytes(&[1, 0, 0, 0]);

        write_unicode_name(b, &layer.name)?;
    }
    b.end_block()?;

    Ok(sizes)
}

/// `luni` block carrying the full name as UTF-16
fn write_unicode_name(b: &mut BinaryBuilder, name: &str) -> Result<()> {
    b.put_bytes(RESOURCE_SIGNATURE);
    b.put_bytes(b"luni");
    b.begin_block();
    let units: Vec<u16> = name.encode_utf16().collect();
    b.put_u32(units.len() as u32);
    for code in &units {
        b.put_u16(*code);
    }
    while b.block_len().is_some_and(|len| len % 4 != 0) {
        b.put_u8(0);
    }
    b.end_block()?;
    Ok(())
}

fn write_layer_channels(
    b: &mut BinaryBuilder,
    layer: &Layer,
    sizes: &[Placeholder],
    depth: ColorDepth,
    scratch: &mut ScanlineScratch,
) -> Result<()> {
    let width = layer.width() as usize;
    let height = layer.height() as usize;

    for ((_, component), size) in layer_channels(layer).into_iter().zip(sizes) {
        let start = b.len();
        b.put_u16(COMPRESSION_RLE);
        let counts: Vec<Placeholder> = (0..height).map(|_| b.reserve(FieldWidth::U16)).collect();

        for (row, count) in layer.colors.chunks_exact(width).zip(counts) {
            let packed = scratch.pack(row, component, depth);
            b.patch(count, packed.len())?;
            b.put_bytes(packed);
        }
        b.patch_since(*size, start)?;
    }
    Ok(())
}

fn write_global_mask(b: &mut BinaryBuilder) {
    b.put_u32(14);
    b.put_u16(0); // overlay colour space
    b.put_u32(0);
    b.put_u32(0);
    b.put_u16(0); // opacity
    b.put_u8(0x80); // kind
    b.put_u8(0);
}

fn write_layer_and_mask(b: &mut BinaryBuilder, doc: &Document, scratch: &mut ScanlineScratch) -> Result<()> {
    b.begin_block();
    {
        b.begin_block();
        let count = i16::try_from(doc.layers.len())
            .map_err(|_| PsdError::TooManyLayers { count: doc.layers.len() })?;
        b.put_u16(count as u16);

        let mut channel_sizes = Vec::with_capacity(doc.layers.len());
        for layer in &doc.layers {
            channel_sizes.push(write_layer_record(b, layer)?);
        }
        for (layer, sizes) in doc.layers.iter().zip(&channel_sizes) {
            write_layer_channels(b, layer, sizes, doc.depth, scratch)?;
        }

        if b.block_len().is_some_and(|len| len % 2 == 1) {
            b.put_u8(0);
        }
        b.end_block()?;

        write_global_mask(b);
    }
    b.end_block()?;
    Ok(())
}

/// Flattened composite; the length table is indexed `channel * height + row`
fn write_image_data(b: &mut BinaryBuilder, doc: &Document, scratch: &mut ScanlineScratch) -> Result<()> {
    let width = doc.width as usize;
    let height = doc.height as usize;
    let channels = doc.channel_count as usize;

    b.put_u16(COMPRESSION_RLE);
    let counts: Vec<Placeholder> = (0..channels * height).map(|_| b.reserve(FieldWidth::U16)).collect();

    for channel in 0..channels {
        for (row_index, row) in doc.colors().chunks_exact(width).enumerate() {
            let packed = scratch.pack(row, channel, doc.depth);
            b.patch(counts[channel * height + row_index], packed.len())?;
            b.put_bytes(packed);
        }
    }
    Ok(())
}

/// Rough output size, used to pre-size the buffer
fn estimate_size(doc: &Document) -> usize {
    let layer_pixels: usize = doc.layers.iter().map(|l| l.colors.len() * l.channel_count as usize).sum();
    let composite = doc.pixel_count() * doc.channel_count as usize;
    let bytes_per_sample = (doc.depth.bits() as usize).div_ceil(8);
    1024 + doc.layers.len() * 256 + (layer_pixels + composite) * bytes_per_sample
}

/// Encode a validated, composited document into a complete PSD file image
pub fn encode_document(doc: &Document) -> Result<Vec<u8>> {
    doc.validate()?;

    let mut b = BinaryBuilder::with_capacity(estimate_size(doc));
    let mut scratch = ScanlineScratch::default();

    write_header(&mut b, doc);
    write_layer_and_mask(&mut b, doc, &mut scratch)?;
    write_image_data(&mut b, doc, &mut scratch)?;

    b.finish()
}

/// Encode and write in one go; nothing is written if encoding fails
pub fn write_psd<W: Write>(mut out: W, doc: &Document) -> Result<()> {
    let bytes = encode_document(doc)?;
    out.write_all(&bytes)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Rect;
    use crate::processing::blend::BlendMode;

    fn be16(bytes: &[u8], at: usize) -> u16 {
        u16::from_be_bytes([bytes[at], bytes[at + 1]])
    }

    fn be32(bytes: &[u8], at: usize) -> u32 {
        u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
    }

    fn composited(layers: Vec<Layer>) -> Document {
        let mut doc = Document::new();
        for layer in layers {
            doc.push_layer(layer);
        }
        doc.build_colors().unwrap();
        doc
    }

    #[test]
    fn test_nested_blocks_are_patched() {
        let mut b = BinaryBuilder::new();
        b.begin_block();
        b.put_u16(7);
        b.begin_block();
        b.put_bytes(&[1, 2, 3]);
        assert_eq!(b.end_block().unwrap(), 3);
        assert_eq!(b.end_block().unwrap(), 2 + 4 + 3);
        let bytes = b.finish().unwrap();
        assert_eq!(be32(&bytes, 0), 9);
        assert_eq!(be32(&bytes, 6), 3);
    }

    #[test]
    fn test_unbalanced_blocks_fail() {
        let mut b = BinaryBuilder::new();
        b.begin_block();
        assert!(matches!(b.finish(), Err(PsdError::UnbalancedBlocks { open: 1 })));

        let mut b = BinaryBuilder::new();
        assert!(matches!(b.end_block(), Err(PsdError::UnbalancedBlocks { open: 0 })));
    }

    #[test]
    fn test_patch_errors() {
        let mut b = BinaryBuilder::new();
        let field = b.reserve(FieldWidth::U16);
        assert!(matches!(b.patch(field, 70_000), Err(PsdError::SizeFieldOverflow { value: 70_000, width: 2 })));
        let stray = Placeholder { offset: 1, width: FieldWidth::U32 };
        assert!(matches!(b.patch(stray, 1), Err(PsdError::PatchOutOfBounds { offset: 1, width: 4, len: 2 })));
        b.patch(field, 0xBEEF).unwrap();
        assert_eq!(b.finish().unwrap(), vec![0xBE, 0xEF]);
    }

    #[test]
    fn test_pascal_string_padding() {
        let cases = [("", 4), ("a", 4), ("abc", 4), ("abcd", 8), ("Layer 1", 8)];
        for (name, total) in cases {
            let mut b = BinaryBuilder::new();
            b.put_pascal_string(name);
            let bytes = b.finish().unwrap();
            assert_eq!(bytes.len(), total, "name {:?}", name);
            assert_eq!(bytes[0] as usize, name.len());
            assert_eq!(&bytes[1..1 + name.len()], name.as_bytes());
        }
    }

    #[test]
    fn test_pascal_string_truncates_and_replaces() {
        let mut b = BinaryBuilder::new();
        b.put_pascal_string(&"x".repeat(300));
        let bytes = b.finish().unwrap();
        assert_eq!(bytes[0], 255);
        assert_eq!(bytes.len(), 256);

        let mut b = BinaryBuilder::new();
        b.put_pascal_string("é層");
        let bytes = b.finish().unwrap();
        assert_eq!(&bytes[..3], &[2, 0xE9, b'?']);
    }

    #[test]
    fn test_quantize_depths() {
        let row = [Color::rgb(0.0, 0.5, 1.0), Color::rgb(2.0, -1.0, f32::NAN)];
        let mut out = Vec::new();

        quantize_row(&row, 1, ColorDepth::Eight, &mut out);
        assert_eq!(out, vec![128, 0]);

        quantize_row(&row, 0, ColorDepth::Sixteen, &mut out);
        assert_eq!(out, vec![0, 0, 0xFF, 0xFF]);

        // Ink where below half: 0.0 and NaN
        quantize_row(&row, 2, ColorDepth::Bitmap, &mut out);
        assert_eq!(out, vec![0b0100_0000]);

        let wide = vec![Color::BLACK; 9];
        quantize_row(&wide, 0, ColorDepth::Bitmap, &mut out);
        assert_eq!(out, vec![0xFF, 0x80]);
    }

    #[test]
    fn test_layer_channel_order() {
        let mut layer = Layer::new("l", Rect::new(0, 0, 1, 1), vec![Color::WHITE]);
        assert_eq!(layer_channels(&layer), vec![(0xFFFF, 3), (0, 0), (1, 1), (2, 2)]);
        layer.channel_count = 3;
        assert_eq!(layer_channels(&layer), vec![(0, 0), (1, 1), (2, 2)]);
    }

    #[test]
    fn test_header_fields() {
        let doc = composited(vec![Layer::new("a", Rect::new(0, 0, 2, 3), vec![Color::WHITE; 6])]);
        let bytes = encode_document(&doc).unwrap();
        assert_eq!(&bytes[0..4], b"8BPS");
        assert_eq!(be16(&bytes, 4), 1);
        assert_eq!(&bytes[6..12], &[0; 6]);
        assert_eq!(be16(&bytes, 12), 3);
        assert_eq!(be32(&bytes, 14), 2);
        assert_eq!(be32(&bytes, 18), 3);
        assert_eq!(be16(&bytes, 22), 8);
        assert_eq!(be16(&bytes, 24), 3);
        assert_eq!(be32(&bytes, 26), 0);
        assert_eq!(be32(&bytes, 30), 0);
        // Layer-and-mask section spans to the image data
        let section = be32(&bytes, 34) as usize;
        assert_eq!(be16(&bytes, 38 + section), COMPRESSION_RLE);
    }

    #[test]
    fn test_layer_flags_and_key() {
        let mut layer = Layer::new("a", Rect::new(0, 0, 1, 1), vec![Color::WHITE]).with_blend_mode(BlendMode::Screen);
        layer.protect_transparency = true;
        layer.clipping = true;
        layer.opacity = 0x40;
        let mut doc = composited(vec![layer]);
        doc.layers[0].visible = false;

        let bytes = encode_document(&doc).unwrap();
        // header 26 + 8, section 4, info 4, count 2, rect 16, channels 2 + 4 * 6
        let at = 26 + 8 + 4 + 4 + 2 + 16 + 2 + 24;
        assert_eq!(&bytes[at..at + 4], b"8BIM");
        assert_eq!(&bytes[at + 4..at + 8], b"scrn");
        assert_eq!(&bytes[at + 8..at + 12], &[0x40, 1, 0b11, 0]);
    }

    #[test]
    fn test_encode_rejects_unbuilt_document() {
        let mut doc = Document::new();
        doc.push_layer(Layer::new("a", Rect::new(0, 0, 1, 1), vec![Color::WHITE]));
        assert!(matches!(encode_document(&doc), Err(PsdError::CompositeSize { .. })));

        let mut sink = Vec::new();
        assert!(write_psd(&mut sink, &doc).is_err());
        assert!(sink.is_empty());
    }

    #[test]
    fn test_write_psd_matches_encode() {
        let doc = composited(vec![Layer::new("a", Rect::new(0, 0, 4, 4), vec![Color::rgb(0.2, 0.4, 0.6); 16])]);
        let mut sink = Vec::new();
        write_psd(&mut sink, &doc).unwrap();
        assert_eq!(sink, encode_document(&doc).unwrap());
    }

    #[test]
    fn test_sixteen_bit_rows_double() {
        let mut doc = composited(vec![Layer::new("a", Rect::new(0, 0, 1, 3), vec![Color::rgb(0.1, 0.2, 0.3); 3])]);
        let eight = encode_document(&doc).unwrap();
        doc.depth = ColorDepth::Sixteen;
        let sixteen = encode_document(&doc).unwrap();
        assert_eq!(be16(&sixteen, 22), 16);
        assert!(sixteen.len() > eight.len());
    }
}
