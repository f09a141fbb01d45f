//! 500 hPa absolute vorticity, shifted so zero sits mid-ramp.

use super::{ScalarLayer, Shading};
use renderer::ColorScheme;

fn scaled(per_second: f32) -> f32 {
    per_second * 1e6 + 300.0
}

pub fn vorticity_layer() -> ScalarLayer {
    ScalarLayer {
        name: "vorticity",
        sources: &["gfs"],
        variable: "vorticity",
        shading: Shading {
            range: 600.0,
            scheme: ColorScheme::Rainbow,
            opacity: Some(0.75),
        },
        transform: scaled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_mid_ramp() {
        assert_eq!(scaled(0.0), 300.0);
        assert!((scaled(3e-4) - 600.0).abs() < 1e-3);
        assert!(scaled(-3e-4).abs() < 1e-3);
    }
}
