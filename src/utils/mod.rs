pub mod export_config;
pub mod logging;
pub mod names;

// Re-export specific functions that are needed by other modules
pub use export_config::{load_export_config, ExportConfig, LayerOverride};
pub use logging::{ConsoleLogger, LoggingExt, StderrConsole};
pub use names::{human_size, layer_name_from_path, normalize_channel_name, split_layer_and_short};
