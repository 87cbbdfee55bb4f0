// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Estimating a systematic error from excess chi-square.
//!
//! If the errors of an observation are purely statistical, the mean
//! chi-square of its consistency tests (cycle-vs-cycle, or LINEAR-HI
//! primary-vs-secondary) is 1 with spread `sqrt(2/dof)`. A significantly
//! larger value is explained by a systematic fractional error added in
//! quadrature. The estimate is reported only; variances are not changed.


use ndarray::prelude::*;

use crate::{
    combine::{CombinedStokes, Observation},
    constants::SYSERR_SIGMA_THRESHOLD,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystematicError {
    /// The mean chi-square per degree of freedom, if any non-zero consistency
    /// chi-square was available.
    pub mean_chi2: Option<f64>,
    /// The number of valid wavelengths.
    pub dof: usize,
    /// The estimated fractional systematic error; zero if the chi-square is
    /// consistent with statistical errors or there was nothing to test.
    pub syserr: f64,
}

impl SystematicError {
    pub fn percent(&self) -> f64 {
        100.0 * self.syserr
    }
}

/// The chi-squares (one per pattern pair) that describe an observation's
/// consistency. LINEAR-HI redundancy chi-squares take precedence over cycle
/// chi-squares. `None` if no consistency test could be made.
pub fn consistency_chi2(
    observation: &Observation,
    combined: &CombinedStokes,
) -> Option<Vec<Option<f64>>> {
    if let Some(redundancy) = &combined.redundancy {
        if redundancy.chi2_p.iter().any(Option::is_some) {
            return Some(redundancy.chi2_p.clone());
        }
    }

    let mut chi2_p = vec![None; combined.pattern.num_pairs()];
    let mut any = false;
    for pair in observation.pairs.iter() {
        if let Some(p) = combined.pattern.pair_index(pair.waveplate) {
            chi2_p[p] = pair.diagnostics.chi2_net;
            any |= pair.diagnostics.compared;
        }
    }
    any.then_some(chi2_p)
}

/// Estimate the systematic error of combined (uncalibrated) Stokes
/// parameters from the consistency chi-squares `chi2_p`. Zero chi-squares are
/// ignored. With nothing to average, or no valid wavelengths, the systematic
/// error is zero.
pub fn estimate_systematic_error(
    chi2_p: &[Option<f64>],
    stokes_fw: ArrayView2<f64>,
    var_fw: ArrayView2<f64>,
    ok_w: ArrayView1<bool>,
) -> SystematicError {
    let chi2s = chi2_p
        .iter()
        .flatten()
        .copied()
        .filter(|&c| c != 0.0)
        .collect::<Vec<_>>();
    let dof = ok_w.iter().filter(|&&ok| ok).count();
    if chi2s.is_empty() || dof == 0 {
        return SystematicError {
            mean_chi2: None,
            dof,
            syserr: 0.0,
        };
    }
    let mean_chi2 = chi2s.iter().sum::<f64>() / chi2s.len() as f64;
    let spread = (2.0 / dof as f64).sqrt();

    let mut syserr = 0.0;
    if mean_chi2 - 1.0 > SYSERR_SIGMA_THRESHOLD * spread {
        // The sum of the inverse variances of normalised q.
        let sum_weights = ok_w
            .iter()
            .enumerate()
            .filter(|(_, &ok)| ok)
            .map(|(i_wav, _)| {
                let i = stokes_fw[(0, i_wav)];
                i * i / var_fw[(1, i_wav)]
            })
            .sum::<f64>();
        if sum_weights.is_finite() && sum_weights > 0.0 {
            syserr = (dof as f64 * (mean_chi2 - 1.0) / sum_weights).sqrt();
        }
    }

    SystematicError {
        mean_chi2: Some(mean_chi2),
        dof,
        syserr,
    }
}
