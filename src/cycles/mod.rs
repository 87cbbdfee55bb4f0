// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Combining repeated exposure cycles of one waveplate pair.
//!
//! When there is more than one cycle, every pair of cycles is compared at
//! every wavelength with a 1-dof chi-square of their normalised difference.
//! Where a comparison exceeds [`CYCLE_CHI2_LIMIT`], a culprit is culled:
//!
//! - with fewer than 3 valid cycles, a culprit can't be isolated and all
//!   cycles are culled at that wavelength;
//! - otherwise, cycles vote (see [`vote_culprit`]) and the culprit is culled
//!   alone, unless the remaining cycles still disagree, in which case all are
//!   culled.
//!
//! The combined measurement is the mean of the cycles that remain valid.


use ndarray::prelude::*;
use vec1::Vec1;

use crate::{constants::CYCLE_CHI2_LIMIT, exposure::WaveplateCode};

/// One cycle of a waveplate pair, ready to be combined (i.e. after any
/// telescope zero-point correction).
#[derive(Debug, Clone)]
pub struct CycleData {
    pub cycle: u32,
    /// \[channel (sum, difference)\]\[wavelength\]
    pub stokes_sw: Array2<f64>,
    pub var_sw: Array2<f64>,
    pub bpm_sw: Array2<bool>,
}

impl CycleData {
    fn valid_w(&self) -> Array1<bool> {
        Array1::from_shape_fn(self.stokes_sw.len_of(Axis(1)), |i_wav| {
            let s0 = self.stokes_sw[(0, i_wav)];
            !self.bpm_sw[(0, i_wav)] && !self.bpm_sw[(1, i_wav)] && s0.is_finite() && s0 != 0.0
        })
    }

    /// The normalised difference and its variance at a wavelength.
    fn normalised(&self, i_wav: usize) -> (f64, f64) {
        let s0 = self.stokes_sw[(0, i_wav)];
        (
            self.stokes_sw[(1, i_wav)] / s0,
            self.var_sw[(1, i_wav)] / (s0 * s0),
        )
    }
}

/// What happened while combining cycles.
#[derive(Debug, Clone)]
pub struct CycleDiagnostics {
    /// Whether each cycle was culled at each wavelength
    /// \[cycle\]\[wavelength\].
    pub culled_jw: Array2<bool>,
    /// The mean chi-square of each cycle against the combined measurement.
    pub chi2_j: Vec<Option<f64>>,
    /// The mean chi-square over all cycles.
    pub chi2_net: Option<f64>,
    /// Whether any wavelength had at least two valid cycles to compare.
    pub compared: bool,
}

impl CycleDiagnostics {
    /// The number of culled wavelengths for each cycle.
    pub fn culls_j(&self) -> Vec<usize> {
        self.culled_jw
            .outer_iter()
            .map(|culled_w| culled_w.iter().filter(|&&c| c).count())
            .collect()
    }

    /// The number of wavelengths where every cycle was culled.
    pub fn net_culls(&self) -> usize {
        self.culled_jw
            .axis_iter(Axis(1))
            .filter(|culled_j| culled_j.iter().all(|&c| c))
            .count()
    }
}

/// The cycle-combined measurement of one waveplate pair.
#[derive(Debug, Clone)]
pub struct WaveplatePair {
    pub waveplate: WaveplateCode,
    /// The cycle numbers that were combined.
    pub cycles: Vec<u32>,
    /// \[channel (sum, difference)\]\[wavelength\]
    pub stokes_sw: Array2<f64>,
    pub var_sw: Array2<f64>,
    /// The number of valid cycles at each wavelength.
    pub num_valid_w: Array1<usize>,
    /// The combined normalised difference and its variance. Zero where there
    /// are no valid cycles.
    pub nstokes_w: Array1<f64>,
    pub nvar_w: Array1<f64>,
    pub diagnostics: CycleDiagnostics,
}

impl WaveplatePair {
    /// Combine the cycles of a waveplate pair. All cycles must have the same
    /// number of wavelengths.
    pub fn combine(waveplate: WaveplateCode, cycles: Vec1<CycleData>) -> WaveplatePair {
        let num_cycles = cycles.len();
        let num_wavs = cycles.first().stokes_sw.len_of(Axis(1));

        let mut valid_jw = Array2::from_elem((num_cycles, num_wavs), false);
        for (mut valid_w, cycle) in valid_jw.outer_iter_mut().zip(cycles.iter()) {
            valid_w.assign(&cycle.valid_w());
        }
        let compared = valid_jw
            .axis_iter(Axis(1))
            .any(|valid_j| valid_j.iter().filter(|&&v| v).count() > 1);

        let culled_jw = if num_cycles > 1 {
            cull_cycles(&cycles, valid_jw.view())
        } else {
            Array2::from_elem((num_cycles, num_wavs), false)
        };
        valid_jw.zip_mut_with(&culled_jw, |valid, &culled| *valid &= !culled);
        let num_valid_w = valid_jw.map_axis(Axis(0), |valid_j| {
            valid_j.iter().filter(|&&v| v).count()
        });

        let mut stokes_sw = Array2::zeros((2, num_wavs));
        let mut var_sw = Array2::zeros((2, num_wavs));
        for i_wav in 0..num_wavs {
            let n = num_valid_w[i_wav];
            // With nothing valid, fall back on the plain mean so that the
            // values are at least defined; they are flagged downstream.
            let use_all = n == 0;
            let divisor = (if use_all { num_cycles } else { n }) as f64;
            for (j, cycle) in cycles.iter().enumerate() {
                if use_all || valid_jw[(j, i_wav)] {
                    for s in 0..2 {
                        stokes_sw[(s, i_wav)] += cycle.stokes_sw[(s, i_wav)];
                        var_sw[(s, i_wav)] += cycle.var_sw[(s, i_wav)];
                    }
                }
            }
            for s in 0..2 {
                stokes_sw[(s, i_wav)] /= divisor;
                var_sw[(s, i_wav)] /= divisor * divisor;
            }
        }

        let mut nstokes_w = Array1::<f64>::zeros(num_wavs);
        let mut nvar_w = Array1::<f64>::zeros(num_wavs);
        for i_wav in 0..num_wavs {
            if num_valid_w[i_wav] > 0 {
                let s0 = stokes_sw[(0, i_wav)];
                nstokes_w[i_wav] = stokes_sw[(1, i_wav)] / s0;
                nvar_w[i_wav] = var_sw[(1, i_wav)] / (s0 * s0);
            }
        }

        // Compare each surviving cycle with the combination.
        let mut chi2_j = Vec::with_capacity(num_cycles);
        let mut all_chi2 = vec![];
        for (j, cycle) in cycles.iter().enumerate() {
            let mut chi2s = vec![];
            for i_wav in 0..num_wavs {
                if num_valid_w[i_wav] < 2 || !valid_jw[(j, i_wav)] {
                    continue;
                }
                let (n, nvar) = cycle.normalised(i_wav);
                let denom = nvar - nvar_w[i_wav];
                if denom > 0.0 {
                    chi2s.push((n - nstokes_w[i_wav]).powi(2) / denom);
                }
            }
            chi2_j.push(mean(&chi2s));
            all_chi2.extend(chi2s);
        }
        let chi2_net = mean(&all_chi2);

        WaveplatePair {
            waveplate,
            cycles: cycles.iter().map(|c| c.cycle).collect(),
            stokes_sw,
            var_sw,
            num_valid_w,
            nstokes_w,
            nvar_w,
            diagnostics: CycleDiagnostics {
                culled_jw,
                chi2_j,
                chi2_net,
                compared,
            },
        }
    }

    pub fn num_cycles(&self) -> usize {
        self.cycles.len()
    }

    /// Whether any cycle is valid at a wavelength.
    pub fn has_data(&self, i_wav: usize) -> bool {
        self.num_valid_w[i_wav] > 0
    }

    /// Whether every cycle is valid at a wavelength.
    pub fn all_cycles_valid(&self, i_wav: usize) -> bool {
        self.num_valid_w[i_wav] == self.cycles.len()
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// A chi-square comparison between cycles `j1` < `j2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct CycleComparison {
    pub(crate) chi2: f64,
    pub(crate) j1: usize,
    pub(crate) j2: usize,
}

impl CycleComparison {
    fn involves(&self, j: usize) -> bool {
        self.j1 == j || self.j2 == j
    }
}

/// Work out which cycles are culled at each wavelength.
fn cull_cycles(cycles: &[CycleData], valid_jw: ArrayView2<bool>) -> Array2<bool> {
    let (num_cycles, num_wavs) = valid_jw.dim();
    let mut culled_jw = Array2::from_elem((num_cycles, num_wavs), false);

    for i_wav in 0..num_wavs {
        let valid_cycles = (0..num_cycles)
            .filter(|&j| valid_jw[(j, i_wav)])
            .collect::<Vec<_>>();
        if valid_cycles.len() < 2 {
            continue;
        }

        let normalised = valid_cycles
            .iter()
            .map(|&j| cycles[j].normalised(i_wav))
            .collect::<Vec<_>>();
        let mut comparisons = vec![];
        for (a, &j1) in valid_cycles.iter().enumerate() {
            for (b, &j2) in valid_cycles.iter().enumerate().skip(a + 1) {
                let (n1, v1) = normalised[a];
                let (n2, v2) = normalised[b];
                let denom = v1 + v2;
                let chi2 = if denom > 0.0 {
                    (n1 - n2).powi(2) / denom
                } else {
                    0.0
                };
                comparisons.push(CycleComparison { chi2, j1, j2 });
            }
        }
        if !comparisons.iter().any(|c| c.chi2 > CYCLE_CHI2_LIMIT) {
            continue;
        }

        let cull_all = match vote_culprit(&mut comparisons) {
            Some(culprit) if valid_cycles.len() >= 3 => {
                let still_bad = comparisons
                    .iter()
                    .any(|c| !c.involves(culprit) && c.chi2 > CYCLE_CHI2_LIMIT);
                if !still_bad {
                    culled_jw[(culprit, i_wav)] = true;
                }
                still_bad
            }
            _ => true,
        };
        if cull_all {
            for &j in &valid_cycles {
                culled_jw[(j, i_wav)] = true;
            }
        }
    }

    culled_jw
}

/// Pick the cycle most implicated in disagreement at one wavelength.
///
/// Comparisons are sorted by ascending chi-square (ties broken by cycle
/// indices), and cycles are listed in the order they first appear. The last
/// cycle to appear is the culprit: it only takes part in the worst
/// comparisons. When both cycles of a comparison first appear together, the
/// higher-indexed one is later. `None` is returned if there are no
/// comparisons.
pub(crate) fn vote_culprit(comparisons: &mut [CycleComparison]) -> Option<usize> {
    comparisons.sort_by(|a, b| {
        a.chi2
            .total_cmp(&b.chi2)
            .then(a.j1.cmp(&b.j1))
            .then(a.j2.cmp(&b.j2))
    });
    let mut seen = vec![];
    for c in comparisons.iter() {
        for j in [c.j1, c.j2] {
            if !seen.contains(&j) {
                seen.push(j);
            }
        }
    }
    seen.last().copied()
}
