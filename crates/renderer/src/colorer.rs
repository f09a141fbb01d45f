//! Value → color mapping over discretized named ramps, plus the arrow
//! primitive used by vector overlays.

use crate::raster::Raster;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of discrete shades per ramp.
pub const SHADES: usize = 15;

/// Opacity ceiling for data-driven alpha, so the basemap stays visible.
const MAX_AUTO_OPACITY: f32 = 0.8;

/// Color value in RGBA format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    pub const fn transparent() -> Self {
        Self::new(0, 0, 0, 0)
    }

    pub const fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }

    /// `#rrggbb`, alpha dropped.
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Named color ramps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorScheme {
    Jet,
    Rainbow,
    Plasma,
    Hsv,
}

impl ColorScheme {
    pub const ALL: [ColorScheme; 4] = [
        ColorScheme::Jet,
        ColorScheme::Rainbow,
        ColorScheme::Plasma,
        ColorScheme::Hsv,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ColorScheme::Jet => "jet",
            ColorScheme::Rainbow => "rainbow",
            ColorScheme::Plasma => "plasma",
            ColorScheme::Hsv => "hsv",
        }
    }

    /// Control points the shades are interpolated from, low to high.
    fn stops(&self) -> &'static [(u8, u8, u8)] {
        match self {
            ColorScheme::Jet => &[
                (0, 0, 131),
                (0, 60, 170),
                (5, 255, 255),
                (255, 255, 0),
                (250, 0, 0),
                (128, 0, 0),
            ],
            ColorScheme::Rainbow => &[
                (150, 0, 90),
                (0, 0, 200),
                (0, 25, 255),
                (0, 152, 255),
                (44, 255, 150),
                (151, 255, 0),
                (255, 234, 0),
                (255, 111, 0),
                (255, 0, 0),
            ],
            ColorScheme::Plasma => &[
                (13, 8, 135),
                (117, 1, 168),
                (182, 48, 139),
                (230, 108, 92),
                (252, 180, 44),
                (240, 249, 33),
            ],
            ColorScheme::Hsv => &[
                (255, 0, 0),
                (253, 255, 2),
                (247, 255, 8),
                (0, 252, 4),
                (0, 252, 255),
                (1, 0, 253),
                (253, 0, 251),
                (255, 0, 23),
            ],
        }
    }

    fn index(&self) -> usize {
        match self {
            ColorScheme::Jet => 0,
            ColorScheme::Rainbow => 1,
            ColorScheme::Plasma => 2,
            ColorScheme::Hsv => 3,
        }
    }
}

impl fmt::Display for ColorScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColorScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ColorScheme::ALL
            .into_iter()
            .find(|scheme| scheme.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown color scheme '{}'", s))
    }
}

/// Maps normalized values onto precomputed shade palettes.
#[derive(Debug, Clone)]
pub struct Colorer {
    palettes: [[Color; SHADES]; 4],
}

impl Default for Colorer {
    fn default() -> Self {
        Self::new()
    }
}

impl Colorer {
    pub fn new() -> Self {
        let mut palettes = [[Color::transparent(); SHADES]; 4];
        for scheme in ColorScheme::ALL {
            palettes[scheme.index()] = build_palette(scheme.stops());
        }
        Self { palettes }
    }

    /// Color for `value` normalized against `range`.
    ///
    /// Alpha is `fixed_opacity` when given, else the normalized value capped
    /// at 0.8. NaN and non-positive ranges normalize to 0.
    pub fn render(
        &self,
        value: f32,
        range: f32,
        scheme: ColorScheme,
        fixed_opacity: Option<f32>,
    ) -> Color {
        let norm = normalize(value, range);
        let shade = ((norm * SHADES as f32).floor() as usize).min(SHADES - 1);
        let opacity = fixed_opacity
            .unwrap_or_else(|| norm.min(MAX_AUTO_OPACITY))
            .clamp(0.0, 1.0);

        self.palettes[scheme.index()][shade].with_alpha((opacity * 255.0).round() as u8)
    }

    /// Opaque shades of a ramp, lowest first.
    pub fn palette(&self, scheme: ColorScheme) -> &[Color; SHADES] {
        &self.palettes[scheme.index()]
    }

    /// Hex strings of a ramp's shades, for legends.
    pub fn scale(&self, scheme: ColorScheme) -> Vec<String> {
        self.palette(scheme).iter().map(Color::to_hex).collect()
    }
}

fn normalize(value: f32, range: f32) -> f32 {
    if value.is_nan() || !(range > 0.0) {
        return 0.0;
    }
    (value / range).clamp(0.0, 1.0)
}

fn build_palette(stops: &[(u8, u8, u8)]) -> [Color; SHADES] {
    let mut palette = [Color::transparent(); SHADES];
    let segments = (stops.len() - 1) as f32;

    for (i, shade) in palette.iter_mut().enumerate() {
        let t = i as f32 / (SHADES - 1) as f32 * segments;
        let lo = (t.floor() as usize).min(stops.len() - 2);
        *shade = interpolate(stops[lo], stops[lo + 1], t - lo as f32);
    }
    palette
}

fn interpolate(a: (u8, u8, u8), b: (u8, u8, u8), t: f32) -> Color {
    let t = t.clamp(0.0, 1.0);
    let mix = |x: u8, y: u8| (x as f32 + (y as f32 - x as f32) * t).round() as u8;
    Color::rgb(mix(a.0, b.0), mix(a.1, b.1), mix(a.2, b.2))
}

/// Pixel position (x right, y down).
pub type Point = (i32, i32);

/// Head and arrowhead corners for a shaft starting at `origin` with pixel
/// components `(dx, dy)`. Corners sit 150° either side of the shaft at 30%
/// of its length.
pub fn arrow_geometry(origin: (f32, f32), dx: f32, dy: f32) -> (Point, Point, Point) {
    let head = (origin.0 + dx, origin.1 + dy);
    let length = dx.hypot(dy);
    let angle = dy.atan2(dx);
    let barb = length * 0.3;

    let corner = |offset: f32| {
        let a = angle + offset;
        (head.0 + barb * a.cos(), head.1 + barb * a.sin())
    };
    let spread = 150f32.to_radians();

    (
        round_point(head),
        round_point(corner(spread)),
        round_point(corner(-spread)),
    )
}

fn round_point(p: (f32, f32)) -> Point {
    (p.0.round() as i32, p.1.round() as i32)
}

/// Shaft from `origin` to `head` plus the two arrowhead strokes, clipped to
/// the raster.
pub fn draw_vector(
    raster: &mut Raster,
    origin: Point,
    head: Point,
    corner_a: Point,
    corner_b: Point,
    color: Color,
) {
    raster.draw_line(origin, head, color);
    raster.draw_line(head, corner_a, color);
    raster.draw_line(head, corner_b, color);
}
