// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Some helper mathematics.


/// Get the `q`th percentile (0 to 100) of the supplied values. Like numpy's
/// default, this interpolates linearly between the two closest ranks. NaNs are
/// ignored. `None` is returned if there are no finite values.
pub(crate) fn percentile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_unstable_by(f64::total_cmp);

    let pos = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    Some(sorted[lower] + frac * (sorted[upper] - sorted[lower]))
}

/// The inverse-variance-weighted mean of some values, and the variance of that
/// mean. Values with non-positive or non-finite variances are ignored. `None`
/// is returned if nothing can be used.
pub(crate) fn inverse_variance_mean<I>(values_and_variances: I) -> Option<(f64, f64)>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let (sum, sum_weights) = values_and_variances
        .into_iter()
        .filter(|(v, var)| v.is_finite() && var.is_finite() && *var > 0.0)
        .fold((0.0, 0.0), |(sum, sum_weights), (v, var)| {
            (sum + v / var, sum_weights + 1.0 / var)
        });
    if sum_weights > 0.0 {
        Some((sum / sum_weights, 1.0 / sum_weights))
    } else {
        None
    }
}

/// A natural cubic spline through strictly-increasing abscissae. Evaluating
/// outside of the sampled domain yields `None`; there is no extrapolation.
#[derive(Debug, Clone)]
pub(crate) struct CubicSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    /// Second derivatives at each knot.
    y2: Vec<f64>,
}

impl CubicSpline {
    /// Set up a spline. The abscissae must be strictly increasing, and there
    /// must be at least two knots; `None` is returned otherwise. With only two
    /// knots the spline is a straight line.
    pub(crate) fn new(x: Vec<f64>, y: Vec<f64>) -> Option<CubicSpline> {
        let n = x.len();
        if n < 2 || y.len() != n || x.windows(2).any(|w| !(w[1] > w[0])) {
            return None;
        }

        // Solve the tridiagonal system for the second derivatives with the
        // Thomas algorithm. The "natural" boundary conditions pin the second
        // derivatives at both ends to 0.
        let mut y2 = vec![0.0; n];
        let mut c_prime = vec![0.0; n];
        let mut d_prime = vec![0.0; n];
        for i in 1..n - 1 {
            let h_lo = x[i] - x[i - 1];
            let h_hi = x[i + 1] - x[i];
            let a = h_lo;
            let b = 2.0 * (h_lo + h_hi);
            let c = h_hi;
            let d = 6.0 * ((y[i + 1] - y[i]) / h_hi - (y[i] - y[i - 1]) / h_lo);

            let denom = b - a * c_prime[i - 1];
            c_prime[i] = c / denom;
            d_prime[i] = (d - a * d_prime[i - 1]) / denom;
        }
        for i in (1..n - 1).rev() {
            y2[i] = d_prime[i] - c_prime[i] * y2[i + 1];
        }

        Some(CubicSpline { x, y, y2 })
    }

    pub(crate) fn domain(&self) -> (f64, f64) {
        (self.x[0], self.x[self.x.len() - 1])
    }

    pub(crate) fn eval(&self, t: f64) -> Option<f64> {
        let (lo, hi) = self.domain();
        if !(lo..=hi).contains(&t) {
            return None;
        }

        // The index of the knot at the upper end of the interval containing
        // `t`.
        let upper = self.x.partition_point(|&x| x < t).clamp(1, self.x.len() - 1);
        let lower = upper - 1;
        let h = self.x[upper] - self.x[lower];
        let a = (self.x[upper] - t) / h;
        let b = (t - self.x[lower]) / h;
        Some(
            a * self.y[lower]
                + b * self.y[upper]
                + ((a.powi(3) - a) * self.y2[lower] + (b.powi(3) - b) * self.y2[upper]) * h * h
                    / 6.0,
        )
    }
}
