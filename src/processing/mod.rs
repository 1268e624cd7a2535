pub mod blend;
pub mod color;
pub mod rle;
