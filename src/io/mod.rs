pub mod exr_layers;
pub mod pixel_source;

// Re-export the loaders used by the CLI
pub use exr_layers::read_exr_sources;
pub use pixel_source::load_image_source;
