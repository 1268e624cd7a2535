use std::ops::{Add, Div, Mul, Sub};

use glam::DVec3;

/// Luma weights shared by both HCY conversions
const LUMA_WEIGHTS: DVec3 = DVec3::new(0.212, 0.701, 0.087);

/// Below this chroma the hue is undefined and pinned to 0
const CHROMA_EPSILON: f64 = 1e-8;

/// RGBA colour with unbounded float components.
///
/// Blend formulas work on this type directly; values are only clamped when
/// the result is stored or quantised.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const TRANSPARENT: Color = Color::new(0.0, 0.0, 0.0, 0.0);
    pub const BLACK: Color = Color::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0, 1.0);

    #[inline]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque colour
    #[inline]
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self::new(r, g, b, 1.0)
    }

    /// Same value in all four components
    #[inline]
    pub const fn splat(v: f32) -> Self {
        Self::new(v, v, v, v)
    }

    #[inline]
    pub fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }

    /// Component by channel index: 0 = r, 1 = g, 2 = b, anything else = a
    #[inline]
    pub fn component(&self, index: usize) -> f32 {
        match index {
            0 => self.r,
            1 => self.g,
            2 => self.b,
            _ => self.a,
        }
    }

    #[inline]
    fn map(self, f: impl Fn(f32) -> f32) -> Self {
        Self::new(f(self.r), f(self.g), f(self.b), f(self.a))
    }

    #[inline]
    fn zip(self, other: Self, f: impl Fn(f32, f32) -> f32) -> Self {
        Self::new(f(self.r, other.r), f(self.g, other.g), f(self.b, other.b), f(self.a, other.a))
    }

    /// `1 - x` per component
    #[inline]
    pub fn invert(self) -> Self {
        self.map(|v| 1.0 - v)
    }

    #[inline]
    pub fn sqrt(self) -> Self {
        self.map(f32::sqrt)
    }

    #[inline]
    pub fn abs(self) -> Self {
        self.map(f32::abs)
    }

    #[inline]
    pub fn min(self, other: Self) -> Self {
        self.zip(other, f32::min)
    }

    #[inline]
    pub fn max(self, other: Self) -> Self {
        self.zip(other, f32::max)
    }

    /// 1.0 where `self < other`, 0.0 elsewhere
    #[inline]
    pub fn less_than(self, other: Self) -> Self {
        self.zip(other, |a, b| if a < b { 1.0 } else { 0.0 })
    }

    /// Mask against a scalar threshold
    #[inline]
    pub fn less_than_value(self, threshold: f32) -> Self {
        self.less_than(Color::splat(threshold))
    }

    /// Per component: `when_false` where the mask is below 0.5, `when_true` otherwise
    #[inline]
    pub fn select(mask: Self, when_true: Self, when_false: Self) -> Self {
        let pick = |m: f32, t: f32, f: f32| if m < 0.5 { f } else { t };
        Self::new(
            pick(mask.r, when_true.r, when_false.r),
            pick(mask.g, when_true.g, when_false.g),
            pick(mask.b, when_true.b, when_false.b),
            pick(mask.a, when_true.a, when_false.a),
        )
    }

    /// r + g + b, used to rank whole colours
    #[inline]
    pub fn rgb_sum(&self) -> f32 {
        self.r + self.g + self.b
    }

    /// Clamp to [0, 1]; NaN becomes 0
    #[inline]
    pub fn saturate(self) -> Self {
        self.map(|v| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) })
    }

    pub fn to_hcy(&self) -> Hcy {
        let (r, g, b) = (self.r as f64, self.g as f64, self.b as f64);

        // (max, min, hexagon sector, signed delta inside the sector)
        let (max, min, sector, delta) = if r < g {
            if g < b {
                (b, r, 4.0, r - g)
            } else {
                (g, r.min(b), 2.0, b - r)
            }
        } else if r < b {
            (b, g, 4.0, r - g)
        } else {
            (r, g.min(b), 0.0, g - b)
        };

        let chroma = max - min;
        let hue = if chroma < CHROMA_EPSILON {
            0.0
        } else {
            (1.0 + (sector + delta / chroma) / 6.0).rem_euclid(1.0)
        };

        Hcy {
            h: hue,
            c: chroma,
            y: DVec3::new(r, g, b).dot(LUMA_WEIGHTS),
            a: self.a as f64,
        }
    }
}

impl Add for Color {
    type Output = Color;
    #[inline]
    fn add(self, rhs: Color) -> Color {
        self.zip(rhs, |a, b| a + b)
    }
}

impl Add<f32> for Color {
    type Output = Color;
    #[inline]
    fn add(self, rhs: f32) -> Color {
        self.map(|v| v + rhs)
    }
}

impl Sub for Color {
    type Output = Color;
    #[inline]
    fn sub(self, rhs: Color) -> Color {
        self.zip(rhs, |a, b| a - b)
    }
}

impl Sub<f32> for Color {
    type Output = Color;
    #[inline]
    fn sub(self, rhs: f32) -> Color {
        self.map(|v| v - rhs)
    }
}

impl Mul for Color {
    type Output = Color;
    #[inline]
    fn mul(self, rhs: Color) -> Color {
        self.zip(rhs, |a, b| a * b)
    }
}

impl Mul<f32> for Color {
    type Output = Color;
    #[inline]
    fn mul(self, rhs: f32) -> Color {
        self.map(|v| v * rhs)
    }
}

impl Mul<Color> for f32 {
    type Output = Color;
    #[inline]
    fn mul(self, rhs: Color) -> Color {
        rhs * self
    }
}

impl Div for Color {
    type Output = Color;
    #[inline]
    fn div(self, rhs: Color) -> Color {
        self.zip(rhs, |a, b| a / b)
    }
}

/// Hue / chroma / luma representation (Adobe Y240 style weights).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Hcy {
    /// Hue in [0, 1)
    pub h: f64,
    pub c: f64,
    pub y: f64,
    pub a: f64,
}

impl Hcy {
    pub fn new(h: f64, c: f64, y: f64, a: f64) -> Self {
        Self { h, c, y, a }
    }

    pub fn to_rgb(&self) -> Color {
        let h_dash = self.h * 6.0;
        let c = self.c;
        let x = c * (1.0 - (h_dash.rem_euclid(2.0) - 1.0).abs());

        let (r, g, b) = if h_dash < 1.0 {
            (c, x, 0.0)
        } else if h_dash < 2.0 {
            (x, c, 0.0)
        } else if h_dash < 3.0 {
            (0.0, c, x)
        } else if h_dash < 4.0 {
            (0.0, x, c)
        } else if h_dash < 5.0 {
            (x, 0.0, c)
        } else {
            (c, 0.0, x)
        };

        let m = self.y - DVec3::new(r, g, b).dot(LUMA_WEIGHTS);

        Color::new((r + m) as f32, (g + m) as f32, (b + m) as f32, self.a as f32)
    }
}

impl From<Color> for Hcy {
    fn from(c: Color) -> Self {
        c.to_hcy()
    }
}

impl From<Hcy> for Color {
    fn from(h: Hcy) -> Self {
        h.to_rgb()
    }
}
