//! Likelihood of lightning near simulated storms.

use super::{ScalarLayer, Shading};
use renderer::ColorScheme;

pub fn lightning_probability_layer() -> ScalarLayer {
    ScalarLayer {
        name: "lightningProbability",
        sources: &["lightning"],
        variable: "probability",
        shading: Shading {
            range: 1.0,
            scheme: ColorScheme::Hsv,
            opacity: None,
        },
        transform: |probability| probability,
    }
}
