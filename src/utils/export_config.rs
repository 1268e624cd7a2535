//! PSD export settings kept as JSON next to the executable or passed with `--config`
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::document::{ColorDepth, Document, Layer};
use crate::processing::blend::BlendMode;

pub const EXPORT_CONFIG_FILE: &str = "psd_export.json";

/// Returns the config path in the executable's directory
pub fn get_export_config_path() -> Result<PathBuf> {
    let exe_path = env::current_exe()
        .with_context(|| "Failed to get executable path")?;
    let exe_dir = exe_path.parent()
        .ok_or_else(|| anyhow::anyhow!("Failed to get executable directory"))?;
    Ok(exe_dir.join(EXPORT_CONFIG_FILE))
}

/// Per-layer settings; unset fields keep the layer's own value
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LayerOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blend_mode: Option<BlendMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opacity: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clipping: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protect_transparency: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Bits per sample: 1, 8 or 16
    pub depth: u16,
    /// Composite channels, 1..=3
    pub channels: u16,
    pub default_blend_mode: BlendMode,
    /// Clamp source pixels to [0, 1] before building layers
    pub clamp_input: bool,
    /// Sources store the bottom row first
    pub flip_vertical: bool,
    pub layers: BTreeMap<String, LayerOverride>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            depth: 8,
            channels: 3,
            default_blend_mode: BlendMode::Normal,
            clamp_input: true,
            flip_vertical: false,
            layers: BTreeMap::new(),
        }
    }
}

impl ExportConfig {
    pub fn color_depth(&self) -> Result<ColorDepth> {
        ColorDepth::try_from(self.depth).with_context(|| "Unsupported PSD depth (expected 1, 8 or 16)")
    }

    pub fn validate(&self) -> Result<()> {
        self.color_depth()?;
        if !(1..=3).contains(&self.channels) {
            anyhow::bail!("Unsupported channel count {} (expected 1..=3)", self.channels);
        }
        for (name, o) in &self.layers {
            if name.is_empty() {
                anyhow::bail!("Layer override with an empty name");
            }
            if let Some(mode) = o.blend_mode {
                if !mode.is_compositable() {
                    anyhow::bail!("Layer '{}': blend mode '{}' cannot be composited", name, mode);
                }
            }
        }
        Ok(())
    }

    /// Default blend mode first, then the named override if any
    pub fn apply_to_layer(&self, layer: &mut Layer) {
        layer.blend_mode = self.default_blend_mode;
        let Some(o) = self.layers.get(&layer.name) else { return };
        if let Some(mode) = o.blend_mode { layer.blend_mode = mode; }
        if let Some(opacity) = o.opacity { layer.opacity = opacity; }
        if let Some(visible) = o.visible { layer.visible = visible; }
        if let Some(clipping) = o.clipping { layer.clipping = clipping; }
        if let Some(protect) = o.protect_transparency { layer.protect_transparency = protect; }
    }

    /// Document-wide settings plus every layer override
    pub fn apply(&self, doc: &mut Document) -> Result<()> {
        doc.depth = self.color_depth()?;
        doc.channel_count = self.channels;
        for layer in doc.layers.iter_mut() {
            self.apply_to_layer(layer);
        }
        Ok(())
    }

    /// Override names that match no layer, for warnings
    pub fn unmatched_overrides<'a>(&'a self, doc: &Document) -> Vec<&'a str> {
        self.layers
            .keys()
            .filter(|name| !doc.layers.iter().any(|l| &l.name == *name))
            .map(|s| s.as_str())
            .collect()
    }
}

/// Reads and validates a config file
pub fn read_export_config(path: &Path) -> Result<ExportConfig> {
    let config_content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: ExportConfig = serde_json::from_str(&config_content)
        .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?;

    config.validate()
        .with_context(|| format!("Invalid config: {}", path.display()))?;
    Ok(config)
}

/// Explicit path, else `psd_export.json` next to the executable, else defaults
pub fn load_export_config(explicit: Option<&Path>) -> Result<ExportConfig> {
    if let Some(path) = explicit {
        return read_export_config(path);
    }

    let config_path = get_export_config_path()?;
    if config_path.exists() {
        read_export_config(&config_path)
    } else {
        Ok(ExportConfig::default())
    }
}

pub fn save_export_config(config: &ExportConfig, path: &Path) -> Result<()> {
    let json_content = serde_json::to_string_pretty(config)
        .context("Failed to serialize config to JSON")?;

    fs::write(path, json_content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Rect;
    use crate::processing::color::Color;

    fn temp_path(tag: &str) -> PathBuf {
        env::temp_dir().join(format!("psd_export_cfg_{}_{}.json", tag, std::process::id()))
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "depth": 16, "layers": { "glow": { "blend_mode": "linear_dodge", "opacity": 128 } } }"#;
        let cfg: ExportConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.depth, 16);
        assert_eq!(cfg.channels, 3);
        assert!(cfg.clamp_input);
        assert_eq!(cfg.layers["glow"].blend_mode, Some(BlendMode::LinearDodge));
        assert_eq!(cfg.layers["glow"].visible, None);
        cfg.validate().unwrap();
    }

    #[test]
    fn test_validation_errors() {
        let cfg = ExportConfig { depth: 32, ..Default::default() };
        assert!(format!("{:#}", cfg.validate().unwrap_err()).contains("depth"));

        let cfg = ExportConfig { channels: 4, ..Default::default() };
        assert!(cfg.validate().is_err());

        let mut cfg = ExportConfig::default();
        cfg.layers.insert("fx".into(), LayerOverride { blend_mode: Some(BlendMode::Dissolve), ..Default::default() });
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_apply_overrides() {
        let mut doc = Document::new();
        doc.push_layer(Layer::new("base", Rect::new(0, 0, 1, 1), vec![Color::WHITE]));
        doc.push_layer(Layer::new("glow", Rect::new(0, 0, 1, 1), vec![Color::WHITE]));

        let mut cfg = ExportConfig { depth: 16, channels: 1, default_blend_mode: BlendMode::Multiply, ..Default::default() };
        cfg.layers.insert(
            "glow".into(),
            LayerOverride { blend_mode: Some(BlendMode::Screen), opacity: Some(10), visible: Some(false), ..Default::default() },
        );
        cfg.layers.insert("missing".into(), LayerOverride::default());
        cfg.apply(&mut doc).unwrap();

        assert_eq!(doc.depth, ColorDepth::Sixteen);
        assert_eq!(doc.channel_count, 1);
        assert_eq!(doc.layers[0].blend_mode, BlendMode::Multiply);
        assert_eq!(doc.layers[1].blend_mode, BlendMode::Screen);
        assert_eq!(doc.layers[1].opacity, 10);
        assert!(!doc.layers[1].visible);
        assert_eq!(cfg.unmatched_overrides(&doc), vec!["missing"]);
    }

    #[test]
    fn test_save_and_read() {
        let path = temp_path("roundtrip");
        let mut cfg = ExportConfig { depth: 1, ..Default::default() };
        cfg.layers.insert("a".into(), LayerOverride { clipping: Some(true), ..Default::default() });
        save_export_config(&cfg, &path).unwrap();
        let read = load_export_config(Some(&path)).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(read, cfg);
    }

    #[test]
    fn test_bad_json_has_context() {
        let path = temp_path("bad");
        fs::write(&path, "{ depth: ").unwrap();
        let err = read_export_config(&path).unwrap_err();
        let _ = fs::remove_file(&path);
        assert!(format!("{}", err).contains("Failed to parse JSON config"));

        let err = load_export_config(Some(Path::new("/definitely/not/here.json"))).unwrap_err();
        assert!(format!("{}", err).contains("Failed to read config file"));
    }
}
