pub const MIN_ZOOM: f64 = 0.25;
pub const MAX_ZOOM: f64 = 4.0;

/// Steps taken by zoom in / zoom out
pub const ZOOM_LEVELS: [f64; 16] =
    [0.25, 0.33, 0.5, 0.67, 0.75, 0.8, 0.9, 1.0, 1.1, 1.25, 1.5, 1.75, 2.0, 2.5, 3.0, 4.0];

// Levels closer than this to the current scale are skipped
const STEP_EPSILON: f64 = 0.01;

pub fn clamp_zoom(scale: f64) -> f64 {
    if scale.is_finite() {
        scale.clamp(MIN_ZOOM, MAX_ZOOM)
    } else {
        1.0
    }
}

pub fn zoom_in_from(current: f64) -> f64 {
    ZOOM_LEVELS.iter().copied().find(|level| *level > current + STEP_EPSILON).unwrap_or(MAX_ZOOM)
}

pub fn zoom_out_from(current: f64) -> f64 {
    ZOOM_LEVELS.iter().rev().copied().find(|level| *level < current - STEP_EPSILON).unwrap_or(MIN_ZOOM)
}
