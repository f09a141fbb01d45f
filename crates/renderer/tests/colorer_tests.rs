//! Colorer ramps and vector drawing.

use renderer::{arrow_geometry, draw_vector, Color, ColorScheme, Colorer, Raster, SHADES};

// ============================================================================
// Ramp selection
// ============================================================================

#[test]
fn test_zero_is_first_shade_fully_transparent() {
    let colorer = Colorer::new();
    let color = colorer.render(0.0, 100.0, ColorScheme::Jet, None);
    let first = colorer.palette(ColorScheme::Jet)[0];
    assert_eq!((color.r, color.g, color.b), (first.r, first.g, first.b));
    assert_eq!(color.a, 0);
}

#[test]
fn test_overflow_is_last_shade_capped_opacity() {
    let colorer = Colorer::new();
    let color = colorer.render(150.0, 100.0, ColorScheme::Jet, None);
    let last = colorer.palette(ColorScheme::Jet)[SHADES - 1];
    assert_eq!((color.r, color.g, color.b), (last.r, last.g, last.b));
    assert_eq!(color.a, (0.8f32 * 255.0).round() as u8);
}

#[test]
fn test_negative_values_clamp_to_zero() {
    let colorer = Colorer::new();
    assert_eq!(
        colorer.render(-40.0, 100.0, ColorScheme::Rainbow, None),
        colorer.render(0.0, 100.0, ColorScheme::Rainbow, None)
    );
}

#[test]
fn test_shade_is_monotonic_in_value() {
    let colorer = Colorer::new();
    let palette = colorer.palette(ColorScheme::Plasma);
    let shade_of = |v: f32| {
        let c = colorer.render(v, 1.0, ColorScheme::Plasma, Some(1.0));
        palette.iter().position(|p| *p == c).unwrap()
    };

    let mut previous = 0;
    for step in 0..=100 {
        let shade = shade_of(step as f32 / 100.0);
        assert!(shade >= previous);
        previous = shade;
    }
    assert_eq!(previous, SHADES - 1);
}

#[test]
fn test_auto_opacity_tracks_value_below_cap() {
    let colorer = Colorer::new();
    let color = colorer.render(50.0, 100.0, ColorScheme::Hsv, None);
    assert_eq!(color.a, 128);
}

#[test]
fn test_every_scheme_has_distinct_endpoints() {
    let colorer = Colorer::new();
    for scheme in ColorScheme::ALL {
        let scale = colorer.scale(scheme);
        assert_eq!(scale.len(), SHADES);
        if scheme != ColorScheme::Hsv {
            assert_ne!(scale[0], scale[SHADES - 1], "{}", scheme);
        }
    }
}

// ============================================================================
// Vectors
// ============================================================================

#[test]
fn test_draw_vector_marks_shaft_and_head() {
    let white = Color::rgb(255, 255, 255);
    let mut raster = Raster::new(32, 32);
    let (head, a, b) = arrow_geometry((16.0, 16.0), 0.0, -12.0);
    draw_vector(&mut raster, (16, 16), head, a, b, white);

    assert_eq!(head, (16, 4));
    assert_eq!(raster.get(16, 16), Some(white));
    assert_eq!(raster.get(16, 10), Some(white));
    assert_eq!(raster.get(16, 4), Some(white));
    assert_eq!(raster.get(a.0 as usize, a.1 as usize), Some(white));
    assert_eq!(raster.get(b.0 as usize, b.1 as usize), Some(white));
    // Corners sit behind the head, on either side of the shaft
    assert!(a.1 > 4 && b.1 > 4);
    assert!((a.0 < 16) != (b.0 < 16));
}

#[test]
fn test_draw_vector_clips_at_edges() {
    let white = Color::rgb(255, 255, 255);
    let mut raster = Raster::new(8, 8);
    let (head, a, b) = arrow_geometry((6.0, 6.0), 20.0, 0.0);
    draw_vector(&mut raster, (6, 6), head, a, b, white);
    assert_eq!(raster.get(7, 6), Some(white));
    assert_eq!(raster.get(0, 0), Some(Color::transparent()));
}
