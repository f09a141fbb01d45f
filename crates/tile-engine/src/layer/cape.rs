//! Convective available potential energy, J/kg.

use super::{ScalarLayer, Shading};
use renderer::ColorScheme;

pub fn cape_layer() -> ScalarLayer {
    ScalarLayer {
        name: "cape",
        sources: &["gfs", "hrrr"],
        variable: "cape",
        shading: Shading {
            range: 2500.0,
            scheme: ColorScheme::Jet,
            opacity: None,
        },
        transform: |joules| joules,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::Layer;

    #[test]
    fn test_gfs_is_default_source() {
        let layer = cape_layer();
        assert_eq!(layer.supported_sources(), &["gfs", "hrrr"]);
        assert_eq!((layer.transform)(1200.0), 1200.0);
    }
}
