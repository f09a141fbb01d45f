//! Surface temperature. Kelvin is mapped so 230 K..270 K spans the ramp.

use super::{ScalarLayer, Shading};
use renderer::ColorScheme;

fn scaled(kelvin: f32) -> f32 {
    (kelvin - 210.0) / 10.0 - 2.0
}

pub fn temperature_layer() -> ScalarLayer {
    ScalarLayer {
        name: "temperature",
        sources: &["gfs"],
        variable: "temperature",
        shading: Shading {
            range: 4.0,
            scheme: ColorScheme::Rainbow,
            opacity: Some(0.7),
        },
        transform: scaled,
    }
}
