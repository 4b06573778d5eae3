/// Evenly spaced values from `start` to `end`, both inclusive.
pub fn linspace(start: f64, end: f64, steps: usize) -> Vec<f64> {
    if steps <= 1 {
        return vec![start];
    }
    let delta = (end - start) / (steps as f64 - 1.0);
    (0..steps).map(|i| start + delta * i as f64).collect()
}

/// Piecewise-linear interpolation of `(xs, ys)` at `x`, with linear
/// extrapolation past either end. `xs` must be strictly increasing.
pub fn interpolate(x: f64, xs: &[f64], ys: &[f64]) -> f64 {
    debug_assert_eq!(xs.len(), ys.len());
    match xs.len() {
        0 => f64::NAN,
        1 => ys[0],
        n => {
            // Index of the left knot of the segment used for `x`.
            let i = if x <= xs[0] {
                0
            } else {
                xs.iter().position(|&k| k >= x).map_or(n - 2, |i| i - 1)
            };
            let (x0, x1) = (xs[i], xs[i + 1]);
            let (y0, y1) = (ys[i], ys[i + 1]);
            y0 + (y1 - y0) * (x - x0) / (x1 - x0)
        }
    }
}
