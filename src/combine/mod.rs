// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Combining the waveplate pairs of an observation into I, Q and U.
//!
//! Before combining, each pair's intensity is scaled to the mean over all
//! pairs; this removes differences in exposure (e.g. from clouds or seeing)
//! between the pairs.

mod linear_hi;
#[cfg(test)]
mod tests;

pub use linear_hi::RedundancyDiagnostics;

use itertools::Itertools;
use log::trace;
use ndarray::prelude::*;
use thiserror::Error;
use vec1::Vec1;

use crate::{
    cycles::WaveplatePair,
    exposure::WaveplateCode,
    pattern::{Pattern, PatternKind, PatternTable},
};
use linear_hi::combine_linear_hi;

/// The cycle-combined waveplate pairs of one object in one configuration.
#[derive(Debug, Clone)]
pub struct Observation {
    pub object: String,
    pub config: String,
    pub pattern: String,
    /// Sorted by waveplate code.
    pub pairs: Vec1<WaveplatePair>,
}

impl Observation {
    /// The name used for this observation's outputs:
    /// `<object>_<config>_<cycles>...`, where `<cycles>` are the last digits
    /// of a pair's cycle numbers. Only the first pair's cycles are given when
    /// all pairs have the same number of cycles.
    pub fn name(&self) -> String {
        let mut name = format!("{}_{}", self.object, self.config);
        let all_same = self.pairs.iter().map(|p| p.num_cycles()).all_equal();
        let pairs = if all_same {
            &self.pairs[..1]
        } else {
            &self.pairs[..]
        };
        for pair in pairs {
            name.push('_');
            for cycle in &pair.cycles {
                name.push_str(&(cycle % 10).to_string());
            }
        }
        name
    }
}

/// Why an observation couldn't be combined. Skipping an observation isn't an
/// error; the remaining observations are still processed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    #[error("Unknown waveplate pattern '{0}'")]
    UnknownPattern(String),

    #[error("Waveplate pattern {0} is not supported")]
    UnsupportedPattern(String),

    #[error("Waveplate pair {code} is not part of pattern {pattern}")]
    UnexpectedWaveplate { code: WaveplateCode, pattern: String },

    #[error("Only {0} waveplate pair(s) present")]
    TooFewPairs(usize),

    #[error("Pattern {pattern} can't be combined from pairs {pairs}")]
    Unusable { pattern: String, pairs: String },
}

/// The combined, uncalibrated Stokes parameters of an observation.
#[derive(Debug, Clone)]
pub struct CombinedStokes {
    pub pattern: Pattern,
    /// Whether each of the pattern's pairs was observed.
    pub present_p: Vec<bool>,
    /// \[I, Q, U\]\[wavelength\]
    pub stokes_fw: Array2<f64>,
    /// \[I, Q, U, QU covariance\]\[wavelength\]
    pub var_fw: Array2<f64>,
    /// Wavelengths where Q and U are usable.
    pub ok_w: Array1<bool>,
    /// LINEAR-HI only.
    pub redundancy: Option<RedundancyDiagnostics>,
}

impl CombinedStokes {
    pub fn num_ok(&self) -> usize {
        self.ok_w.iter().filter(|&&ok| ok).count()
    }
}

/// Combine the pairs of an observation according to its waveplate pattern.
/// `okcal_w` marks the wavelengths where the calibration is available.
pub fn combine_observation(
    observation: &Observation,
    patterns: &PatternTable,
    okcal_w: ArrayView1<bool>,
) -> Result<CombinedStokes, SkipReason> {
    let pattern = patterns
        .get(&observation.pattern)
        .ok_or_else(|| SkipReason::UnknownPattern(observation.pattern.clone()))?;
    if pattern.kind == PatternKind::Unsupported {
        return Err(SkipReason::UnsupportedPattern(pattern.name.clone()));
    }

    let mut pairs_p: Vec<Option<&WaveplatePair>> = vec![None; pattern.num_pairs()];
    for pair in observation.pairs.iter() {
        let p = pattern
            .pair_index(pair.waveplate)
            .ok_or_else(|| SkipReason::UnexpectedWaveplate {
                code: pair.waveplate,
                pattern: pattern.name.clone(),
            })?;
        pairs_p[p] = Some(pair);
    }
    let present_p = pairs_p.iter().map(Option::is_some).collect::<Vec<_>>();
    let present = pairs_p.iter().flatten().copied().collect::<Vec<_>>();
    if present.len() < 2 {
        return Err(SkipReason::TooFewPairs(present.len()));
    }
    let usable = match pattern.kind {
        PatternKind::Linear => present.len() == pattern.num_pairs(),
        PatternKind::LinearHi => {
            linear_hi::can_reconstruct(std::array::from_fn(|p| present_p[p]))
        }
        PatternKind::Unsupported => false,
    };
    if !usable {
        return Err(SkipReason::Unusable {
            pattern: pattern.name.clone(),
            pairs: present.iter().map(|p| p.waveplate).join(","),
        });
    }

    let num_wavs = okcal_w.len();
    // Where every present pair has all of its cycles.
    let okall_w = Array1::from_shape_fn(num_wavs, |i_wav| {
        okcal_w[i_wav] && present.iter().all(|p| p.all_cycles_valid(i_wav))
    });

    // Scale each pair's intensity to the mean intensity over the pairs.
    let sums = present
        .iter()
        .map(|pair| {
            pair.stokes_sw
                .row(0)
                .iter()
                .zip(okall_w.iter())
                .filter(|(_, &ok)| ok)
                .map(|(s, _)| s)
                .sum::<f64>()
        })
        .collect::<Vec<_>>();
    let mean_sum = sums.iter().sum::<f64>() / sums.len() as f64;
    let norms: Vec<f64> = if okall_w.iter().any(|&ok| ok)
        && mean_sum.is_finite()
        && mean_sum > 0.0
        && sums.iter().all(|s| s.is_finite() && *s > 0.0)
    {
        sums.iter().map(|s| s / mean_sum).collect()
    } else {
        vec![1.0; present.len()]
    };
    trace!("Pair intensity normalisations: {norms:?}");

    let mut stokes_fw = Array2::zeros((3, num_wavs));
    let mut var_fw = Array2::zeros((4, num_wavs));
    for i_wav in 0..num_wavs {
        let with_data = present
            .iter()
            .zip(norms.iter())
            .filter(|(pair, _)| pair.has_data(i_wav))
            .collect::<Vec<_>>();
        let used: Vec<_> = if with_data.is_empty() {
            present.iter().zip(norms.iter()).collect()
        } else {
            with_data
        };
        let n = used.len() as f64;
        for (pair, &norm) in used {
            stokes_fw[(0, i_wav)] += pair.stokes_sw[(0, i_wav)] / norm / n;
            var_fw[(0, i_wav)] += pair.var_sw[(0, i_wav)] / (norm * norm * n * n);
        }
    }

    let (ok_w, redundancy) = match pattern.kind {
        PatternKind::Linear => {
            let ok_w = Array1::from_shape_fn(num_wavs, |i_wav| {
                okcal_w[i_wav] && present.iter().all(|p| p.has_data(i_wav))
            });
            // Pair 0 gives Q, pair 1 gives U.
            for (p, pair) in present.iter().enumerate() {
                for i_wav in (0..num_wavs).filter(|&i_wav| ok_w[i_wav]) {
                    let i = stokes_fw[(0, i_wav)];
                    stokes_fw[(p + 1, i_wav)] = pair.nstokes_w[i_wav] * i;
                    var_fw[(p + 1, i_wav)] = pair.nvar_w[i_wav] * i * i;
                }
            }
            (ok_w, None)
        }

        PatternKind::LinearHi => {
            let mut n_pw = Array2::zeros((4, num_wavs));
            let mut nvar_pw = Array2::zeros((4, num_wavs));
            let mut have_pw = Array2::from_elem((4, num_wavs), false);
            for (p, pair) in pairs_p.iter().enumerate() {
                if let Some(pair) = pair {
                    n_pw.row_mut(p).assign(&pair.nstokes_w);
                    nvar_pw.row_mut(p).assign(&pair.nvar_w);
                    for i_wav in 0..num_wavs {
                        have_pw[(p, i_wav)] = pair.has_data(i_wav);
                    }
                }
            }
            let combination = combine_linear_hi(
                n_pw.view(),
                nvar_pw.view(),
                have_pw.view(),
                okcal_w,
                okall_w.view(),
            );
            for i_wav in (0..num_wavs).filter(|&i_wav| combination.ok_w[i_wav]) {
                let i = stokes_fw[(0, i_wav)];
                for s in 0..2 {
                    stokes_fw[(s + 1, i_wav)] = combination.stokes_sw[(s, i_wav)] * i;
                }
                for s in 0..3 {
                    var_fw[(s + 1, i_wav)] = combination.var_sw[(s, i_wav)] * i * i;
                }
            }
            (combination.ok_w, Some(combination.diagnostics))
        }

        PatternKind::Unsupported => unreachable!("unsupported patterns were skipped"),
    };

    Ok(CombinedStokes {
        pattern: pattern.clone(),
        present_p,
        stokes_fw,
        var_fw,
        ok_w,
        redundancy,
    })
}
