// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Rotation of linear polarisation between reference frames.
//!
//! Rotating the frame by a position angle θ rotates (Q, U) by 2θ in Stokes
//! space:
//!
//! Q' = Q cos2θ − U sin2θ
//! U' = Q sin2θ + U cos2θ
//!
//! The variances and the Q-U covariance are propagated with the same
//! rotation. Stokes V (if present) and I are untouched.

#[cfg(test)]
mod tests;

use ndarray::prelude::*;

/// How Stokes parameters are laid out along the first axis of the arrays
/// given to [`rotate_stokes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StokesLayout {
    /// Stokes are I, Q, U (, V). Variances are I, Q, U, QU covariance (, V).
    Unnormalised,

    /// There is no intensity; Stokes are q, u (, v). Variances are q, u, qu
    /// covariance (, v).
    Normalised,
}

impl StokesLayout {
    fn q_index(self) -> usize {
        match self {
            StokesLayout::Unnormalised => 1,
            StokesLayout::Normalised => 0,
        }
    }
}

/// Rotate linear polarisation by the position angles `pa_w` \[degrees\], one
/// per wavelength. New arrays are returned; the inputs are not modified.
///
/// # Panics
///
/// Panics if the arrays don't have enough Stokes rows for the given layout, or
/// if the wavelength axes don't all have the same length.
pub fn rotate_stokes(
    stokes_sw: ArrayView2<f64>,
    var_sw: ArrayView2<f64>,
    pa_w: ArrayView1<f64>,
    layout: StokesLayout,
) -> (Array2<f64>, Array2<f64>) {
    let q = layout.q_index();
    let u = q + 1;
    let qu = q + 2;
    assert!(stokes_sw.len_of(Axis(0)) > u);
    assert!(var_sw.len_of(Axis(0)) > qu);
    assert_eq!(stokes_sw.len_of(Axis(1)), pa_w.len());
    assert_eq!(var_sw.len_of(Axis(1)), pa_w.len());

    let mut stokes_out = stokes_sw.to_owned();
    let mut var_out = var_sw.to_owned();
    for (i_wav, pa) in pa_w.iter().enumerate() {
        let (s, c) = (2.0 * pa.to_radians()).sin_cos();

        let (q_in, u_in) = (stokes_sw[(q, i_wav)], stokes_sw[(u, i_wav)]);
        stokes_out[(q, i_wav)] = q_in * c - u_in * s;
        stokes_out[(u, i_wav)] = q_in * s + u_in * c;

        let (var_q, var_u, cov_qu) = (var_sw[(q, i_wav)], var_sw[(u, i_wav)], var_sw[(qu, i_wav)]);
        // Rotating by θ and then by -θ restores the input variances only with
        // the covariance terms present.
        var_out[(q, i_wav)] = var_q * c * c + var_u * s * s - 2.0 * c * s * cov_qu;
        var_out[(u, i_wav)] = var_q * s * s + var_u * c * c + 2.0 * c * s * cov_qu;
        var_out[(qu, i_wav)] = c * s * (var_q - var_u) + (c * c - s * s) * cov_qu;
    }

    (stokes_out, var_out)
}
