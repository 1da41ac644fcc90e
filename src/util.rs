use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Two values in `[-1, 1]` derived from the id hash. Stable across runs, so
/// anything seeded from it stays reproducible.
pub fn stable_pair(id: &str) -> (f64, f64) {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    let hash = hasher.finish();

    let x = (hash & 0xffff_ffff) as f64 / u32::MAX as f64;
    let y = ((hash >> 32) & 0xffff_ffff) as f64 / u32::MAX as f64;
    ((x * 2.0) - 1.0, (y * 2.0) - 1.0)
}

/// Unit direction for coincident points, spread by the golden angle so that
/// neighbouring indices never share a direction.
pub fn fallback_direction(a: usize, b: usize) -> (f64, f64) {
    let angle = ((a as f64) * 0.618_034 + (b as f64) * 0.414_214 + 0.37) * std::f64::consts::TAU;
    (angle.cos(), angle.sin())
}

pub fn format_progress(progress: f64) -> String {
    format!("{:>5.1}%", (progress * 100.0).clamp(0.0, 100.0))
}
