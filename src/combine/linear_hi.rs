// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The redundant LINEAR-HI combination.
//!
//! Pair p measures the normalised linear polarisation along 22.5°·p, so
//! pairs 0 and 2 are q and u, and pairs 1 and 3 are (q+u)/√2 and (u−q)/√2.
//! Any pair can therefore also be reconstructed from the others (its
//! "secondary" path). Both paths are averaged where they exist, and their
//! disagreement is used to cull wavelengths.

use ndarray::prelude::*;

use crate::{
    constants::{
        CHI2_FENCE_FACTOR, CHI2_FENCE_FLOOR, CHI2_FENCE_Q3_RATIOS, FRAC_1_SQRT_2 as QQ,
        LINEAR_HI_FENCE_DOF,
    },
    math::percentile,
};

/// The two pairs that reconstruct each pair.
pub(crate) const SECONDARIES: [[usize; 2]; 4] = [[1, 3], [0, 2], [1, 3], [0, 2]];

/// Row p reconstructs pair p when both of its secondaries are available.
pub(crate) const SEC_BOTH: [[f64; 4]; 4] = [
    [0.0, QQ, 0.0, -QQ],
    [QQ, 0.0, QQ, 0.0],
    [0.0, QQ, 0.0, QQ],
    [-QQ, 0.0, QQ, 0.0],
];

/// Row p reconstructs pair p when only its first secondary is available; the
/// missing second secondary is itself reconstructed.
pub(crate) const SEC_FIRST: [[f64; 4]; 4] = [
    [0.5, QQ, -0.5, 0.0],
    [QQ, 0.5, 0.0, 0.5],
    [-0.5, QQ, 0.5, 0.0],
    [-QQ, 0.5, 0.0, 0.5],
];

/// As [`SEC_FIRST`], but only the second secondary is available.
pub(crate) const SEC_SECOND: [[f64; 4]; 4] = [
    [0.5, 0.0, 0.5, -QQ],
    [0.0, 0.5, QQ, -0.5],
    [0.5, 0.0, 0.5, QQ],
    [0.0, -0.5, QQ, 0.5],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SecondaryPath {
    Both,
    OnlyFirst,
    OnlySecond,
}

impl SecondaryPath {
    /// Which secondary path reconstructs pair `p`, given which pairs have
    /// data.
    pub(crate) fn select(p: usize, have: [bool; 4]) -> Option<SecondaryPath> {
        let [first, second] = SECONDARIES[p];
        let reconstructible = |q: usize| SECONDARIES[q].iter().all(|&i| have[i]);
        if have[first] && have[second] {
            Some(SecondaryPath::Both)
        } else if have[first] && reconstructible(second) {
            Some(SecondaryPath::OnlyFirst)
        } else if have[second] && reconstructible(first) {
            Some(SecondaryPath::OnlySecond)
        } else {
            None
        }
    }

    pub(crate) fn coefficients(self, p: usize) -> [f64; 4] {
        match self {
            SecondaryPath::Both => SEC_BOTH[p],
            SecondaryPath::OnlyFirst => SEC_FIRST[p],
            SecondaryPath::OnlySecond => SEC_SECOND[p],
        }
    }
}

/// Whether both q (pair 0) and u (pair 2) can be derived from the pairs
/// present.
pub(crate) fn can_reconstruct(have: [bool; 4]) -> bool {
    let derivable = |p: usize| have[p] || SecondaryPath::select(p, have).is_some();
    derivable(0) && derivable(2)
}

/// The coefficients deriving pair `p` from all four pairs: the primary alone,
/// the secondary alone, or the mean of both.
fn combined_coefficients(p: usize, have: [bool; 4]) -> Option<[f64; 4]> {
    let mut primary = [0.0; 4];
    primary[p] = 1.0;
    let secondary = SecondaryPath::select(p, have).map(|path| path.coefficients(p));
    match (have[p], secondary) {
        (true, None) => Some(primary),
        (false, Some(sec)) => Some(sec),
        (true, Some(sec)) => Some(std::array::from_fn(|i| 0.5 * (primary[i] + sec[i]))),
        (false, None) => None,
    }
}

fn dot(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// How the primary and secondary paths of LINEAR-HI agreed.
#[derive(Debug, Clone)]
pub struct RedundancyDiagnostics {
    /// Wavelengths culled because a pair's primary and secondary disagreed.
    pub culled_w: Array1<bool>,
    /// The mean primary-vs-secondary chi-square of each pair over the final
    /// valid wavelengths.
    pub chi2_p: Vec<Option<f64>>,
    /// The chi-square fence of each pair.
    pub fence_p: Vec<Option<f64>>,
}

impl RedundancyDiagnostics {
    pub fn num_culled(&self) -> usize {
        self.culled_w.iter().filter(|&&c| c).count()
    }
}

/// Normalised q and u from LINEAR-HI.
#[derive(Debug, Clone)]
pub(crate) struct LinearHiCombination {
    /// \[q, u\]\[wavelength\]
    pub(crate) stokes_sw: Array2<f64>,
    /// \[q, u, qu covariance\]\[wavelength\]
    pub(crate) var_sw: Array2<f64>,
    pub(crate) ok_w: Array1<bool>,
    pub(crate) diagnostics: RedundancyDiagnostics,
}

/// Combine the four LINEAR-HI pairs.
///
/// `n_pw` and `nvar_pw` are the normalised differences of each pair and
/// their variances, and `have_pw` says where they are usable. `okcal_w` marks
/// calibratable wavelengths and `okall_w` the wavelengths where every present
/// pair has all of its cycles; the latter set the chi-square fences.
pub(crate) fn combine_linear_hi(
    n_pw: ArrayView2<f64>,
    nvar_pw: ArrayView2<f64>,
    have_pw: ArrayView2<bool>,
    okcal_w: ArrayView1<bool>,
    okall_w: ArrayView1<bool>,
) -> LinearHiCombination {
    let num_wavs = n_pw.len_of(Axis(1));
    let mut stokes_sw = Array2::zeros((2, num_wavs));
    let mut var_sw = Array2::zeros((3, num_wavs));
    let mut ok_w = Array1::from_elem(num_wavs, false);
    let mut chi2_pw = Array2::zeros((4, num_wavs));
    let mut prisec_pw = Array2::from_elem((4, num_wavs), false);

    for i_wav in 0..num_wavs {
        let have: [bool; 4] = std::array::from_fn(|p| have_pw[(p, i_wav)]);
        let n: [f64; 4] = std::array::from_fn(|p| if have[p] { n_pw[(p, i_wav)] } else { 0.0 });
        let nvar: [f64; 4] =
            std::array::from_fn(|p| if have[p] { nvar_pw[(p, i_wav)] } else { 0.0 });

        // Primary-vs-secondary chi-square for every pair with both paths.
        for p in 0..4 {
            let Some(path) = SecondaryPath::select(p, have).filter(|_| have[p]) else {
                continue;
            };
            let sec_cof = path.coefficients(p);
            let sec = dot(&sec_cof, &n);
            let var_sec = dot(&sec_cof.map(|c| c * c), &nvar);
            // The reconstruction may use the primary itself.
            let cov = sec_cof[p] * nvar[p];
            let denom = nvar[p] + var_sec - 2.0 * cov;
            if denom > 0.0 {
                chi2_pw[(p, i_wav)] = (n[p] - sec).powi(2) / denom;
                prisec_pw[(p, i_wav)] = true;
            }
        }

        let (Some(q_cof), Some(u_cof)) =
            (combined_coefficients(0, have), combined_coefficients(2, have))
        else {
            continue;
        };
        stokes_sw[(0, i_wav)] = dot(&q_cof, &n);
        stokes_sw[(1, i_wav)] = dot(&u_cof, &n);
        var_sw[(0, i_wav)] = dot(&q_cof.map(|c| c * c), &nvar);
        var_sw[(1, i_wav)] = dot(&u_cof.map(|c| c * c), &nvar);
        var_sw[(2, i_wav)] = dot(&std::array::from_fn(|i| q_cof[i] * u_cof[i]), &nvar);
        ok_w[i_wav] = okcal_w[i_wav];
    }

    // Fence each pair's chi-squares at a multiple of their upper quartile.
    let fence_multiplier = CHI2_FENCE_FACTOR * CHI2_FENCE_Q3_RATIOS[LINEAR_HI_FENCE_DOF - 1];
    let fence_p = (0..4)
        .map(|p| {
            let chi2s = (0..num_wavs)
                .filter(|&i_wav| okall_w[i_wav] && prisec_pw[(p, i_wav)])
                .map(|i_wav| chi2_pw[(p, i_wav)])
                .collect::<Vec<_>>();
            percentile(&chi2s, 75.0).map(|q3| (fence_multiplier * q3).max(CHI2_FENCE_FLOOR))
        })
        .collect::<Vec<_>>();

    let culled_w = Array1::from_shape_fn(num_wavs, |i_wav| {
        ok_w[i_wav]
            && fence_p.iter().enumerate().any(|(p, fence)| {
                matches!(fence, Some(f) if prisec_pw[(p, i_wav)] && chi2_pw[(p, i_wav)] > *f)
            })
    });
    ok_w.zip_mut_with(&culled_w, |ok, &culled| *ok &= !culled);

    let chi2_p = (0..4)
        .map(|p| {
            let chi2s = (0..num_wavs)
                .filter(|&i_wav| ok_w[i_wav] && prisec_pw[(p, i_wav)])
                .map(|i_wav| chi2_pw[(p, i_wav)])
                .collect::<Vec<_>>();
            if chi2s.is_empty() {
                None
            } else {
                Some(chi2s.iter().sum::<f64>() / chi2s.len() as f64)
            }
        })
        .collect();

    LinearHiCombination {
        stokes_sw,
        var_sw,
        ok_w,
        diagnostics: RedundancyDiagnostics {
            culled_w,
            chi2_p,
            fence_p,
        },
    }
}
