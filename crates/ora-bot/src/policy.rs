//! Coordinator policy: quorum threshold, skip decisions and price noise.

use ora_types::Price;
use rand::Rng;

/// Parts-per-million denominator for price variance.
pub const PPM: i128 = 1_000_000;

/// Reports needed before the coordinator finalizes a bucket with
/// `active_nodes` registered: `ceil(2N / 3)`, computed as `(2N + 2) / 3`.
///
/// Zero nodes never reach quorum; callers must check `active_nodes > 0`.
pub fn required_reports(active_nodes: usize) -> usize {
    (2 * active_nodes + 2) / 3
}

/// Whether `reported` out of `active_nodes` is enough to finalize.
pub fn has_quorum(reported: usize, active_nodes: usize) -> bool {
    active_nodes > 0 && reported >= required_reports(active_nodes)
}

/// Roll against `probability` in `[0, 1]`.
pub fn should_skip<R: Rng + ?Sized>(rng: &mut R, probability: f64) -> bool {
    if probability <= 0.0 {
        return false;
    }
    rng.gen::<f64>() < probability
}

/// Perturb `base` by a uniform offset within `±variance` (relative).
///
/// Integer math in parts per million: `delta = base * ppm / 1e6`, with
/// `ppm` drawn from `[-v, v]` where `v = floor(variance * 1e6)`. The result
/// never drops below 1.
pub fn perturb_price<R: Rng + ?Sized>(rng: &mut R, base: Price, variance: f64) -> Price {
    let bound = (variance.clamp(0.0, 1.0) * PPM as f64).floor() as i128;
    if bound == 0 {
        return base;
    }
    let ppm = rng.gen_range(-bound..=bound);
    apply_ppm(base, ppm)
}

/// `base + base * ppm / 1e6`, truncating toward zero, floored at 1.
pub fn apply_ppm(base: Price, ppm: i128) -> Price {
    let magnitude = base.saturating_mul(ppm.unsigned_abs()) / PPM as u128;
    let price = if ppm >= 0 {
        base.saturating_add(magnitude)
    } else {
        base.saturating_sub(magnitude)
    };
    price.max(1)
}
