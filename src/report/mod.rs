// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Human-readable summaries of an observation: combination diagnostics and
//! the 1/variance-weighted mean polarisation. Nothing here feeds back into
//! the stored spectra.


use std::{collections::BTreeSet, fmt::Display};

use itertools::Itertools;
use ndarray::prelude::*;

use crate::{
    combine::{CombinedStokes, Observation},
    math::inverse_variance_mean,
};

/// The weighted mean normalised linear polarisation of an observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedStokes {
    /// \[Angstroms\]
    pub wavelength: f64,
    pub q: f64,
    pub var_q: f64,
    pub u: f64,
    pub var_u: f64,
}

impl WeightedStokes {
    /// The degree of linear polarisation and its error \[percent\].
    pub fn polarisation(&self) -> (f64, f64) {
        let p = self.q.hypot(self.u);
        let err = if p > 0.0 {
            (self.q.powi(2) * self.var_q + self.u.powi(2) * self.var_u).sqrt() / p
        } else {
            // Without a detection, quote the mean q, u error.
            (0.5 * (self.var_q + self.var_u)).sqrt()
        };
        (100.0 * p, 100.0 * err)
    }

    /// The position angle in [0°, 180°) and its error \[degrees\].
    pub fn position_angle(&self) -> (f64, f64) {
        let pa = (0.5 * self.u.atan2(self.q).to_degrees()).rem_euclid(180.0);
        let (p, err_p) = self.polarisation();
        let err = if p > 0.0 {
            (0.5 * err_p / p).to_degrees()
        } else {
            90.0
        };
        (pa, err)
    }
}

impl Display for WeightedStokes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (p, err_p) = self.polarisation();
        let (pa, err_pa) = self.position_angle();
        write!(
            f,
            "Weighted mean at {:.1} Å: %Q {:+.4} ± {:.4}, %U {:+.4} ± {:.4}, %P {:.4} ± {:.4}, PA {:.2}° ± {:.2}°",
            self.wavelength,
            100.0 * self.q,
            100.0 * self.var_q.sqrt(),
            100.0 * self.u,
            100.0 * self.var_u.sqrt(),
            p,
            err_p,
            pa,
            err_pa,
        )
    }
}

/// Average normalised q = Q/I and u = U/I over the valid wavelengths,
/// weighting by inverse variance. The wavelength is weighted the same way as
/// q and u combined. `None` if no wavelength is usable.
pub fn weighted_average(
    stokes_fw: ArrayView2<f64>,
    var_fw: ArrayView2<f64>,
    ok_w: ArrayView1<bool>,
    wavelengths: ArrayView1<f64>,
) -> Option<WeightedStokes> {
    let usable = (0..ok_w.len())
        .filter(|&i_wav| {
            let i = stokes_fw[(0, i_wav)];
            ok_w[i_wav]
                && i.is_finite()
                && i != 0.0
                && var_fw[(1, i_wav)] > 0.0
                && var_fw[(2, i_wav)] > 0.0
        })
        .collect::<Vec<_>>();
    let normalised = |s: usize| {
        usable.iter().map(move |&i_wav| {
            let i = stokes_fw[(0, i_wav)];
            (stokes_fw[(s, i_wav)] / i, var_fw[(s, i_wav)] / (i * i))
        })
    };
    let (q, var_q) = inverse_variance_mean(normalised(1))?;
    let (u, var_u) = inverse_variance_mean(normalised(2))?;

    let (wavelength, _) = inverse_variance_mean(usable.iter().map(|&i_wav| {
        let i2 = stokes_fw[(0, i_wav)].powi(2);
        let weight = i2 / var_fw[(1, i_wav)] + i2 / var_fw[(2, i_wav)];
        (wavelengths[i_wav], 1.0 / weight)
    }))?;

    Some(WeightedStokes {
        wavelength,
        q,
        var_q,
        u,
        var_u,
    })
}

/// Cycle-combination diagnostics as a table with a column per pattern pair:
/// the number of culled wavelengths and the mean chi-square of each cycle,
/// followed by the wavelengths culled for every cycle and the net mean
/// chi-square. Per-cycle rows are only given for more than two cycles.
/// Empty if no pair had cycles to compare.
pub fn cycle_report(observation: &Observation, combined: &CombinedStokes) -> Vec<String> {
    let pairs_p = combined
        .pattern
        .pair_codes
        .iter()
        .map(|&code| observation.pairs.iter().find(|p| p.waveplate == code))
        .collect::<Vec<_>>();
    if !pairs_p.iter().flatten().any(|p| p.diagnostics.compared) {
        return vec![];
    }

    let num_pairs = pairs_p.len();
    let codes = combined
        .pattern
        .pair_codes
        .iter()
        .map(|code| format!("{code:>6}"))
        .join(" ");
    let mut lines = vec![
        format!(
            "{:14}{:^w$}{:^w$}",
            "",
            "culled",
            "mean chisq",
            w = 7 * num_pairs
        ),
        format!("{:9}HW  {codes} {codes}", ""),
    ];

    let row = |label: String, culls: Vec<usize>, chi2s: Vec<Option<f64>>| {
        format!(
            "{label}: {} {}",
            culls.iter().map(|c| format!("{c:>6}")).join(" "),
            chi2s
                .iter()
                .map(|c| format!("{:>6.2}", c.unwrap_or(0.0)))
                .join(" ")
        )
    };

    if pairs_p.iter().flatten().any(|p| p.num_cycles() > 2) {
        let cycle_numbers = pairs_p
            .iter()
            .flatten()
            .flat_map(|p| p.cycles.iter().copied())
            .collect::<BTreeSet<_>>();
        for number in cycle_numbers {
            let (culls, chi2s) = pairs_p
                .iter()
                .map(|pair| {
                    pair.and_then(|pair| {
                        let j = pair.cycles.iter().position(|&c| c == number)?;
                        Some((pair.diagnostics.culls_j()[j], pair.diagnostics.chi2_j[j]))
                    })
                    .unwrap_or((0, None))
                })
                .unzip::<_, _, Vec<_>, Vec<_>>();
            lines.push(row(format!("   cycle {number:>2}"), culls, chi2s));
        }
    }

    let (culls, chi2s) = pairs_p
        .iter()
        .map(|pair| match pair {
            Some(pair) => (pair.diagnostics.net_culls(), pair.diagnostics.chi2_net),
            None => (0, None),
        })
        .unzip::<_, _, Vec<_>, Vec<_>>();
    lines.push(row("    net    ".to_string(), culls, chi2s));
    lines
}

/// LINEAR-HI primary-vs-secondary diagnostics. Empty for other patterns.
pub fn redundancy_report(combined: &CombinedStokes) -> Vec<String> {
    let Some(redundancy) = &combined.redundancy else {
        return vec![];
    };
    if redundancy.chi2_p.iter().all(Option::is_none) {
        return vec![];
    }
    vec![
        format!(
            "Wavelengths culled by LINEAR-HI chisq: {}",
            redundancy.num_culled()
        ),
        format!(
            "{:10}HW {}",
            "",
            combined
                .pattern
                .pair_codes
                .iter()
                .map(|code| format!("{code:>6}"))
                .join(" ")
        ),
        format!(
            "   Pair chisq: {}",
            redundancy
                .chi2_p
                .iter()
                .map(|c| format!("{:>6.2}", c.unwrap_or(0.0)))
                .join(" ")
        ),
    ]
}
