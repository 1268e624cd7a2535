use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PsdError, Result};
use crate::processing::color::Color;

/// Signature of a blend formula producing the fully opaque ("combined") result
pub type CombineFn = fn(Color, Color) -> Color;

/// Layer blend modes understood by the PSD layer record.
///
/// Every mode has a 4-byte key written to the file. All but `PassThrough` and
/// `Dissolve` can also be composited.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    PassThrough,
    #[default]
    Normal,
    Dissolve,
    Darken,
    Multiply,
    ColorBurn,
    LinearBurn,
    DarkerColor,
    Lighten,
    Screen,
    ColorDodge,
    LinearDodge,
    LighterColor,
    Overlay,
    SoftLight,
    HardLight,
    VividLight,
    LinearLight,
    PinLight,
    HardMix,
    Difference,
    Exclusion,
    Subtract,
    Divide,
    Hue,
    Saturation,
    Color,
    Luminosity,
}

impl BlendMode {
    pub const ALL: [BlendMode; 28] = [
        BlendMode::PassThrough,
        BlendMode::Normal,
        BlendMode::Dissolve,
        BlendMode::Darken,
        BlendMode::Multiply,
        BlendMode::ColorBurn,
        BlendMode::LinearBurn,
        BlendMode::DarkerColor,
        BlendMode::Lighten,
        BlendMode::Screen,
        BlendMode::ColorDodge,
        BlendMode::LinearDodge,
        BlendMode::LighterColor,
        BlendMode::Overlay,
        BlendMode::SoftLight,
        BlendMode::HardLight,
        BlendMode::VividLight,
        BlendMode::LinearLight,
        BlendMode::PinLight,
        BlendMode::HardMix,
        BlendMode::Difference,
        BlendMode::Exclusion,
        BlendMode::Subtract,
        BlendMode::Divide,
        BlendMode::Hue,
        BlendMode::Saturation,
        BlendMode::Color,
        BlendMode::Luminosity,
    ];

    /// Key written after the `8BIM` blend signature
    pub const fn key(self) -> &'static [u8; 4] {
        match self {
            BlendMode::PassThrough => b"pass",
            BlendMode::Normal => b"norm",
            BlendMode::Dissolve => b"diss",
            BlendMode::Darken => b"dark",
            BlendMode::Multiply => b"mul ",
            BlendMode::ColorBurn => b"idiv",
            BlendMode::LinearBurn => b"lbrn",
            BlendMode::DarkerColor => b"dkCl",
            BlendMode::Lighten => b"lite",
            BlendMode::Screen => b"scrn",
            BlendMode::ColorDodge => b"div ",
            BlendMode::LinearDodge => b"lddg",
            BlendMode::LighterColor => b"lgCl",
            BlendMode::Overlay => b"over",
            BlendMode::SoftLight => b"sLit",
            BlendMode::HardLight => b"hLit",
            BlendMode::VividLight => b"vLit",
            BlendMode::LinearLight => b"lLit",
            BlendMode::PinLight => b"pLit",
            BlendMode::HardMix => b"hMix",
            BlendMode::Difference => b"diff",
            BlendMode::Exclusion => b"smud",
            BlendMode::Subtract => b"fsub",
            BlendMode::Divide => b"fdiv",
            BlendMode::Hue => b"hue ",
            BlendMode::Saturation => b"sat ",
            BlendMode::Color => b"colr",
            BlendMode::Luminosity => b"lum ",
        }
    }

    pub fn from_key(key: &[u8; 4]) -> Option<BlendMode> {
        Self::ALL.iter().copied().find(|mode| mode.key() == key)
    }

    pub const fn name(self) -> &'static str {
        match self {
            BlendMode::PassThrough => "pass_through",
            BlendMode::Normal => "normal",
            BlendMode::Dissolve => "dissolve",
            BlendMode::Darken => "darken",
            BlendMode::Multiply => "multiply",
            BlendMode::ColorBurn => "color_burn",
            BlendMode::LinearBurn => "linear_burn",
            BlendMode::DarkerColor => "darker_color",
            BlendMode::Lighten => "lighten",
            BlendMode::Screen => "screen",
            BlendMode::ColorDodge => "color_dodge",
            BlendMode::LinearDodge => "linear_dodge",
            BlendMode::LighterColor => "lighter_color",
            BlendMode::Overlay => "overlay",
            BlendMode::SoftLight => "soft_light",
            BlendMode::HardLight => "hard_light",
            BlendMode::VividLight => "vivid_light",
            BlendMode::LinearLight => "linear_light",
            BlendMode::PinLight => "pin_light",
            BlendMode::HardMix => "hard_mix",
            BlendMode::Difference => "difference",
            BlendMode::Exclusion => "exclusion",
            BlendMode::Subtract => "subtract",
            BlendMode::Divide => "divide",
            BlendMode::Hue => "hue",
            BlendMode::Saturation => "saturation",
            BlendMode::Color => "color",
            BlendMode::Luminosity => "luminosity",
        }
    }

    /// Formula for the mode, `None` for the group-only and dithered modes
    pub const fn combiner(self) -> Option<CombineFn> {
        let f: CombineFn = match self {
            BlendMode::PassThrough | BlendMode::Dissolve => return None,
            BlendMode::Normal => normal,
            BlendMode::Darken => darken,
            BlendMode::Multiply => multiply,
            BlendMode::ColorBurn => color_burn,
            BlendMode::LinearBurn => linear_burn,
            BlendMode::DarkerColor => darker_color,
            BlendMode::Lighten => lighten,
            BlendMode::Screen => screen,
            BlendMode::ColorDodge => color_dodge,
            BlendMode::LinearDodge => linear_dodge,
            BlendMode::LighterColor => lighter_color,
            BlendMode::Overlay => overlay,
            BlendMode::SoftLight => soft_light,
            BlendMode::HardLight => hard_light,
            BlendMode::VividLight => vivid_light,
            BlendMode::LinearLight => linear_light,
            BlendMode::PinLight => pin_light,
            BlendMode::HardMix => hard_mix,
            BlendMode::Difference => difference,
            BlendMode::Exclusion => exclusion,
            BlendMode::Subtract => subtract,
            BlendMode::Divide => divide,
            BlendMode::Hue => hue,
            BlendMode::Saturation => saturation,
            BlendMode::Color => color,
            BlendMode::Luminosity => luminosity,
        };
        Some(f)
    }

    #[inline]
    pub const fn is_compositable(self) -> bool {
        self.combiner().is_some()
    }

    /// Composite `src` over `dst`
    pub fn blend(self, src: Color, dst: Color) -> Result<Color> {
        let combine = self.combiner().ok_or(PsdError::UnsupportedBlendMode(self))?;
        Ok(apply_alpha(combine(src, dst), src, dst))
    }
}

impl fmt::Display for BlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Free-function form of [`BlendMode::blend`]
#[inline]
pub fn blend(mode: BlendMode, src: Color, dst: Color) -> Result<Color> {
    mode.blend(src, dst)
}

/// Shared alpha correction turning a combined term into the final pixel
#[inline]
pub fn apply_alpha(combined: Color, src: Color, dst: Color) -> Color {
    let weight = src.a * dst.a + (1.0 - dst.a);
    let mix = |c: f32, d: f32| (c - d) * weight + d;
    Color::new(
        mix(combined.r, dst.r),
        mix(combined.g, dst.g),
        mix(combined.b, dst.b),
        dst.a + (1.0 - dst.a) * src.a,
    )
}

fn normal(src: Color, _dst: Color) -> Color {
    src
}

fn darken(src: Color, dst: Color) -> Color {
    src.min(dst)
}

fn multiply(src: Color, dst: Color) -> Color {
    src * dst
}

fn color_burn(src: Color, dst: Color) -> Color {
    (dst.invert() / src).invert()
}

fn linear_burn(src: Color, dst: Color) -> Color {
    src + dst - 1.0
}

fn darker_color(src: Color, dst: Color) -> Color {
    if src.rgb_sum() < dst.rgb_sum() { src } else { dst }
}

fn lighten(src: Color, dst: Color) -> Color {
    src.max(dst)
}

fn screen(src: Color, dst: Color) -> Color {
    (src.invert() * dst.invert()).invert()
}

fn color_dodge(src: Color, dst: Color) -> Color {
    dst / src.invert()
}

fn linear_dodge(src: Color, dst: Color) -> Color {
    src + dst
}

fn lighter_color(src: Color, dst: Color) -> Color {
    if src.rgb_sum() < dst.rgb_sum() { dst } else { src }
}

fn overlay(src: Color, dst: Color) -> Color {
    Color::select(
        src.less_than_value(0.5),
        2.0 * src * dst,
        (src.invert() * dst.invert() * 2.0).invert(),
    )
}

// Wikipedia (pegtop-style) variant; sources disagree on this one
fn soft_light(src: Color, dst: Color) -> Color {
    Color::select(
        dst.less_than_value(0.5),
        2.0 * src * dst + src * src * (2.0 * dst).invert(),
        2.0 * src * dst.invert() + src.sqrt() * (2.0 * dst - 1.0),
    )
}

fn hard_light(src: Color, dst: Color) -> Color {
    Color::select(
        dst.less_than_value(0.5),
        src * dst * 2.0,
        (src.invert() * dst.invert() * 2.0).invert(),
    )
}

fn vivid_light(src: Color, dst: Color) -> Color {
    Color::select(
        src.less_than_value(0.5),
        dst / (src * 2.0).invert(),
        (dst.invert() / (2.0 * src - 1.0)).invert(),
    )
}

// Light and dark halves reduce to the same linear map
fn linear_light(src: Color, dst: Color) -> Color {
    dst + 2.0 * src - 1.0
}

fn pin_light(src: Color, dst: Color) -> Color {
    Color::select(
        src.less_than_value(0.5),
        dst.min(2.0 * src),
        dst.max(2.0 * src - 1.0),
    )
}

// 1 where linear light would brighten dst, 0 where it would darken it
fn hard_mix(src: Color, dst: Color) -> Color {
    dst.less_than(linear_light(src, dst))
}

fn difference(src: Color, dst: Color) -> Color {
    (src - dst).abs()
}

fn exclusion(src: Color, dst: Color) -> Color {
    dst.invert() * src + src.invert() * dst
}

fn subtract(src: Color, dst: Color) -> Color {
    dst - src
}

fn divide(src: Color, dst: Color) -> Color {
    dst / src
}

fn hue(src: Color, dst: Color) -> Color {
    let mut ret = dst.to_hcy();
    ret.h = src.to_hcy().h;
    ret.to_rgb()
}

fn saturation(src: Color, dst: Color) -> Color {
    let mut ret = dst.to_hcy();
    ret.c = src.to_hcy().c;
    ret.to_rgb()
}

fn color(src: Color, dst: Color) -> Color {
    let from = src.to_hcy();
    let mut ret = dst.to_hcy();
    ret.h = from.h;
    ret.c = from.c;
    ret.to_rgb()
}

fn luminosity(src: Color, dst: Color) -> Color {
    let mut ret = dst.to_hcy();
    ret.y = src.to_hcy().y;
    ret.to_rgb()
}
