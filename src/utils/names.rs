// Naming helpers shared by the loaders and the CLI

/// Split a full EXR channel name into (layer, short channel).
///
/// With a part-level layer name attribute every channel belongs to that
/// layer; otherwise the prefix before the last dot is the layer name.
#[inline]
pub fn split_layer_and_short(full: &str, base_attr: Option<&str>) -> (String, String) {
    if let Some(base) = base_attr {
        let short = full.rsplit('.').next().unwrap_or(full).to_string();
        (base.to_string(), short)
    } else if let Some(p) = full.rfind('.') {
        (full[..p].to_string(), full[p + 1..].to_string())
    } else {
        ("".to_string(), full.to_string())
    }
}

/// Normalise long channel names to R/G/B/A
#[inline]
pub fn normalize_channel_name(channel: &str) -> String {
    let upper = channel.trim().to_ascii_uppercase();
    match upper.as_str() {
        "RED" => "R".to_string(),
        "GREEN" => "G".to_string(),
        "BLUE" => "B".to_string(),
        "ALPHA" => "A".to_string(),
        _ => upper,
    }
}

#[inline]
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    let mut size = bytes as f64;
    let mut unit = 0usize;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.2} {}", size, UNITS[unit])
    }
}

/// Layer name for an image file: its stem, or "layer" when there is none
pub fn layer_name_from_path(path: &std::path::Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "layer".to_string())
}
