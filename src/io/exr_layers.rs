use std::path::Path;

use anyhow::Context;
use exr::prelude as exr;
use rayon::prelude::*;

use crate::io::pixel_source::RasterSource;
use crate::processing::color::Color;
use crate::progress::ProgressSink;
use crate::utils::names::{normalize_channel_name, split_layer_and_short};

/// Name given to the EXR main layer, which carries no name of its own
pub const BACKGROUND_LAYER_NAME: &str = "Background";

/// Channel indices of one logical layer inside an EXR part
struct ChannelGroup {
    name: String,
    // (short name, index into the part's channel list), file order
    channels: Vec<(String, usize)>,
}

impl ChannelGroup {
    fn find(&self, wanted: &str) -> Option<usize> {
        self.channels
            .iter()
            .find(|(short, _)| normalize_channel_name(short) == wanted)
            .map(|(_, idx)| *idx)
    }

    /// Indices feeding R, G, B and optionally A.
    ///
    /// Missing colour channels fall back to the previous one, so a lone
    /// channel (Y, Z, mask, ...) ends up as grey.
    fn rgba_indices(&self) -> Option<(usize, usize, usize, Option<usize>)> {
        let alpha = self.find("A");
        let first_colour = self
            .channels
            .iter()
            .map(|(_, idx)| *idx)
            .find(|idx| Some(*idx) != alpha)
            .or(alpha)?;

        let r = self.find("R").or_else(|| self.find("Y")).unwrap_or(first_colour);
        let g = self.find("G").unwrap_or(r);
        let b = self.find("B").unwrap_or(g);
        Some((r, g, b, alpha))
    }
}

/// Group the channels of one EXR part by their layer prefix, keeping file order
fn group_channels(channel_names: &[String], base_attr: Option<&str>) -> Vec<ChannelGroup> {
    let mut groups: Vec<ChannelGroup> = Vec::new();
    for (idx, full) in channel_names.iter().enumerate() {
        let (layer_name, short) = split_layer_and_short(full, base_attr);
        match groups.iter_mut().find(|g| g.name == layer_name) {
            Some(group) => group.channels.push((short, idx)),
            None => groups.push(ChannelGroup { name: layer_name, channels: vec![(short, idx)] }),
        }
    }
    groups
}

/// Read every layer of an EXR file as a pixel source, bottom layer first.
///
/// Each part is split into logical layers by channel prefix. The data
/// window position becomes the layer origin, clamped at the canvas edge.
pub fn read_exr_sources(
    path: &Path,
    progress: Option<&dyn ProgressSink>,
) -> anyhow::Result<Vec<(String, RasterSource)>> {
    if let Some(p) = progress { p.start_indeterminate(Some("Reading EXR...")); }

    let image = exr::read_all_flat_layers_from_file(path)
        .with_context(|| format!("Failed to read EXR: {}", path.display()))?;

    let part_count = image.layer_data.len().max(1);
    let mut out: Vec<(String, RasterSource)> = Vec::new();

    for (part_index, layer) in image.layer_data.iter().enumerate() {
        let width = layer.size.width() as u32;
        let height = layer.size.height() as u32;
        let pixel_count = width as usize * height as usize;

        let base_attr: Option<String> = layer.attributes.layer_name.as_ref().map(|s| s.to_string());
        let position = layer.attributes.layer_position;
        let origin = (position.0.max(0) as u32, position.1.max(0) as u32);

        let channel_names: Vec<String> =
            layer.channel_data.list.iter().map(|ch| ch.name.to_string()).collect();

        for group in group_channels(&channel_names, base_attr.as_deref()) {
            let Some((r, g, b, a)) = group.rgba_indices() else { continue };
            let list = &layer.channel_data.list;
            let sample = |ch: usize, i: usize| list[ch].sample_data.value_by_flat_index(i).to_f32();

            let mut pixels = vec![Color::TRANSPARENT; pixel_count];
            pixels.par_iter_mut().enumerate().for_each(|(i, px)| {
                *px = Color::new(
                    sample(r, i),
                    sample(g, i),
                    sample(b, i),
                    a.map_or(1.0, |a| sample(a, i)),
                );
            });

            let name = if group.name.is_empty() { BACKGROUND_LAYER_NAME.to_string() } else { group.name };
            if let Some(p) = progress {
                let message = format!(
                    "layer '{}' {}x{} at ({}, {}) from {} channel(s)",
                    name,
                    width,
                    height,
                    origin.0,
                    origin.1,
                    group.channels.len()
                );
                p.set(part_index as f32 / part_count as f32, Some(&message));
            }
            out.push((name, RasterSource::new(width, height, pixels).with_origin(origin.0, origin.1)));
        }

        if let Some(p) = progress {
            p.set((part_index + 1) as f32 / part_count as f32, None);
        }
    }

    if out.is_empty() {
        anyhow::bail!("EXR contains no readable layers: {}", path.display());
    }

    if let Some(p) = progress { p.finish(Some("EXR loaded")); }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_group_channels_by_prefix() {
        let groups = group_channels(&names(&["A", "B", "G", "R", "specular.B", "specular.G", "specular.R"]), None);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "");
        assert_eq!(groups[1].name, "specular");
        assert_eq!(groups[1].rgba_indices(), Some((6, 5, 4, None)));
        assert_eq!(groups[0].rgba_indices(), Some((3, 2, 1, Some(0))));
    }

    #[test]
    fn test_part_name_wins() {
        let groups = group_channels(&names(&["x.R", "y.G"]), Some("beauty"));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "beauty");
    }

    #[test]
    fn test_single_channel_is_grey() {
        let groups = group_channels(&names(&["depth.Z"]), None);
        assert_eq!(groups[0].rgba_indices(), Some((0, 0, 0, None)));

        let groups = group_channels(&names(&["red", "alpha"]), None);
        assert_eq!(groups[0].rgba_indices(), Some((0, 0, 0, Some(1))));
    }

    #[test]
    fn test_read_rgba_file() {
        let path = std::env::temp_dir().join(format!("psd_export_layers_{}.exr", std::process::id()));
        ::exr::prelude::write_rgba_file(&path, 2, 1, |x, _y| {
            if x == 0 { (1.0f32, 0.0f32, 0.0f32, 1.0f32) } else { (0.0, 0.5, 1.0, 0.25) }
        })
        .unwrap();

        let sources = read_exr_sources(&path, Some(&crate::progress::NoopProgress)).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(sources.len(), 1);
        let (name, src) = &sources[0];
        assert_eq!(name, BACKGROUND_LAYER_NAME);
        assert_eq!((src.width, src.height, src.origin), (2, 1, (0, 0)));
        assert_eq!(src.pixels[0], Color::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(src.pixels[1], Color::new(0.0, 0.5, 1.0, 0.25));
    }

    /// Keeps every message it is given
    #[derive(Default)]
    struct RecordingProgress {
        messages: std::sync::Mutex<Vec<String>>,
    }

    impl ProgressSink for RecordingProgress {
        fn start_indeterminate(&self, _message: Option<&str>) {}
        fn set(&self, _progress_0_1: f32, message: Option<&str>) {
            if let Some(m) = message {
                self.messages.lock().unwrap().push(m.to_string());
            }
        }
        fn finish(&self, _message: Option<&str>) {}
        fn reset(&self) {}
    }

    #[test]
    fn test_layer_details_go_to_progress() {
        let path = std::env::temp_dir().join(format!("psd_export_progress_{}.exr", std::process::id()));
        ::exr::prelude::write_rgba_file(&path, 3, 2, |_x, _y| (0.5f32, 0.5f32, 0.5f32, 1.0f32)).unwrap();

        let progress = RecordingProgress::default();
        let sources = read_exr_sources(&path, Some(&progress)).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(sources.len(), 1);
        let messages = progress.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0], "layer 'Background' 3x2 at (0, 0) from 4 channel(s)");
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = read_exr_sources(Path::new("/definitely/not/here.exr"), None).unwrap_err();
        assert!(format!("{}", err).contains("Failed to read EXR"));
    }
}
