// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;

use super::*;
use crate::{
    constants::{CHI2_FENCE_FLOOR, FRAC_1_SQRT_2},
    cycles::CycleData,
};

const NVAR: f64 = 1e-5;

/// A single-cycle pair with the given intensity and normalised differences.
fn pair_with_cycles(code: &str, intensity: f64, n_w: &[f64], cycles: &[u32]) -> WaveplatePair {
    let num_wavs = n_w.len();
    let cycles = cycles
        .iter()
        .map(|&number| {
            let mut stokes_sw = Array2::zeros((2, num_wavs));
            let mut var_sw = Array2::zeros((2, num_wavs));
            for (i_wav, n) in n_w.iter().enumerate() {
                stokes_sw[(0, i_wav)] = intensity;
                stokes_sw[(1, i_wav)] = n * intensity;
                var_sw[(0, i_wav)] = intensity;
                var_sw[(1, i_wav)] = NVAR * intensity * intensity;
            }
            CycleData {
                cycle: number,
                stokes_sw,
                var_sw,
                bpm_sw: Array2::from_elem((2, num_wavs), false),
            }
        })
        .collect::<Vec<_>>();
    WaveplatePair::combine(code.parse().unwrap(), cycles.try_into().unwrap())
}

fn pair(code: &str, intensity: f64, n_w: &[f64]) -> WaveplatePair {
    pair_with_cycles(code, intensity, n_w, &[1])
}

fn observation(pattern: &str, pairs: Vec<WaveplatePair>) -> Observation {
    Observation {
        object: "HD1234".to_string(),
        config: "c0".to_string(),
        pattern: pattern.to_string(),
        pairs: pairs.try_into().unwrap(),
    }
}

/// The four LINEAR-HI pairs of a source with constant q and u.
fn linear_hi_pairs(q: f64, u: f64, num_wavs: usize) -> Vec<WaveplatePair> {
    let n = [
        q,
        (q + u) * FRAC_1_SQRT_2,
        u,
        (u - q) * FRAC_1_SQRT_2,
    ];
    ["04", "15", "26", "37"]
        .iter()
        .zip(n)
        .map(|(code, n)| pair(code, 1000.0, &vec![n; num_wavs]))
        .collect()
}

fn all_ok(num_wavs: usize) -> Array1<bool> {
    Array1::from_elem(num_wavs, true)
}

#[test]
fn test_linear() {
    let obs = observation(
        "LINEAR",
        vec![
            pair("04", 1000.0, &[0.01, 0.02, 0.03]),
            pair("26", 1000.0, &[-0.01, 0.0, 0.01]),
        ],
    );
    let combined = combine_observation(&obs, &PatternTable::builtin(), all_ok(3).view()).unwrap();
    assert_eq!(combined.pattern.kind, PatternKind::Linear);
    assert!(combined.redundancy.is_none());
    assert_eq!(combined.num_ok(), 3);
    assert_abs_diff_eq!(
        combined.stokes_fw,
        array![
            [1000.0, 1000.0, 1000.0],
            [10.0, 20.0, 30.0],
            [-10.0, 0.0, 10.0]
        ],
        epsilon = 1e-9
    );
    // Intensity variance is halved by averaging two pairs.
    assert_abs_diff_eq!(combined.var_fw.row(0), Array1::from_elem(3, 500.0), epsilon = 1e-9);
    assert_abs_diff_eq!(combined.var_fw.row(1), Array1::from_elem(3, NVAR * 1e6), epsilon = 1e-9);
    assert_abs_diff_eq!(combined.var_fw.row(2), Array1::from_elem(3, NVAR * 1e6), epsilon = 1e-9);
    assert_abs_diff_eq!(combined.var_fw.row(3), Array1::from_elem(3, 0.0));
}

#[test]
fn test_pair_intensities_are_normalised() {
    let obs = observation(
        "LINEAR",
        vec![
            pair("04", 900.0, &[0.01, 0.01]),
            pair("26", 1100.0, &[0.02, 0.02]),
        ],
    );
    let combined = combine_observation(&obs, &PatternTable::builtin(), all_ok(2).view()).unwrap();
    assert_abs_diff_eq!(combined.stokes_fw.row(0), array![1000.0, 1000.0], epsilon = 1e-9);
    assert_abs_diff_eq!(combined.stokes_fw.row(1), array![10.0, 10.0], epsilon = 1e-9);
    assert_abs_diff_eq!(combined.stokes_fw.row(2), array![20.0, 20.0], epsilon = 1e-9);
}

#[test]
fn test_uncalibratable_wavelengths_are_not_ok() {
    let obs = observation(
        "LINEAR",
        vec![
            pair("04", 1000.0, &[0.01, 0.01]),
            pair("26", 1000.0, &[0.02, 0.02]),
        ],
    );
    let combined =
        combine_observation(&obs, &PatternTable::builtin(), array![true, false].view()).unwrap();
    assert_eq!(combined.ok_w, array![true, false]);
    assert_abs_diff_eq!(combined.stokes_fw[(1, 1)], 0.0);
    assert_abs_diff_eq!(combined.stokes_fw[(0, 1)], 1000.0, epsilon = 1e-9);
}

#[test]
fn test_linear_hi_full_redundancy() {
    let (q, u) = (0.02, -0.01);
    let obs = observation("LINEAR-HI", linear_hi_pairs(q, u, 4));
    let combined = combine_observation(&obs, &PatternTable::builtin(), all_ok(4).view()).unwrap();
    assert_eq!(combined.num_ok(), 4);
    assert_abs_diff_eq!(combined.stokes_fw.row(1), Array1::from_elem(4, q * 1000.0), epsilon = 1e-9);
    assert_abs_diff_eq!(combined.stokes_fw.row(2), Array1::from_elem(4, u * 1000.0), epsilon = 1e-9);
    // The mean of a primary and a secondary built from two other pairs.
    let expected_var = 0.5 * NVAR * 1e6;
    assert_abs_diff_eq!(combined.var_fw.row(1), Array1::from_elem(4, expected_var), epsilon = 1e-9);
    assert_abs_diff_eq!(combined.var_fw.row(2), Array1::from_elem(4, expected_var), epsilon = 1e-9);

    let redundancy = combined.redundancy.as_ref().unwrap();
    assert_eq!(redundancy.num_culled(), 0);
    for &chi2 in &redundancy.chi2_p {
        assert_abs_diff_eq!(chi2.unwrap(), 0.0, epsilon = 1e-9);
    }
    for &fence in &redundancy.fence_p {
        assert_abs_diff_eq!(fence.unwrap(), 1.0);
    }
}

#[test]
fn test_linear_hi_redundancy_outlier_is_culled() {
    let mut pairs = linear_hi_pairs(0.02, -0.01, 10);
    let mut bad = pairs[1].clone();
    bad.nstokes_w[5] += 0.1;
    pairs[1] = bad;
    let obs = observation("LINEAR-HI", pairs);
    let combined = combine_observation(&obs, &PatternTable::builtin(), all_ok(10).view()).unwrap();
    let redundancy = combined.redundancy.as_ref().unwrap();
    assert_eq!(redundancy.num_culled(), 1);
    assert!(redundancy.culled_w[5]);
    assert!(!combined.ok_w[5]);
    assert_eq!(combined.num_ok(), 9);
    // The remaining wavelengths are consistent.
    assert_abs_diff_eq!(redundancy.chi2_p[1].unwrap(), 0.0, epsilon = 1e-9);
}

#[test]
fn test_linear_hi_fence_has_a_floor() {
    // Nine identical wavelengths put Q3 at zero; a small disagreement at the
    // tenth is well below a chi-square of 1 and must survive.
    let mut pairs = linear_hi_pairs(0.02, -0.01, 10);
    let mut off = pairs[1].clone();
    off.nstokes_w[5] += 0.001;
    pairs[1] = off;
    let obs = observation("LINEAR-HI", pairs);
    let combined = combine_observation(&obs, &PatternTable::builtin(), all_ok(10).view()).unwrap();
    let redundancy = combined.redundancy.as_ref().unwrap();
    assert_eq!(redundancy.num_culled(), 0);
    assert!(combined.ok_w[5]);
    assert!(redundancy.chi2_p[1].unwrap() > 0.0);
    assert_abs_diff_eq!(redundancy.fence_p[1].unwrap(), CHI2_FENCE_FLOOR);
}

#[test]
fn test_linear_hi_with_only_primaries() {
    let (q, u) = (0.02, -0.01);
    let pairs = linear_hi_pairs(q, u, 3);
    let obs = observation("LINEAR-HI", vec![pairs[0].clone(), pairs[2].clone()]);
    let combined = combine_observation(&obs, &PatternTable::builtin(), all_ok(3).view()).unwrap();
    assert_eq!(combined.present_p, vec![true, false, true, false]);
    assert_abs_diff_eq!(combined.stokes_fw.row(1), Array1::from_elem(3, q * 1000.0), epsilon = 1e-9);
    assert_abs_diff_eq!(combined.stokes_fw.row(2), Array1::from_elem(3, u * 1000.0), epsilon = 1e-9);
    assert_abs_diff_eq!(combined.var_fw.row(1), Array1::from_elem(3, NVAR * 1e6), epsilon = 1e-9);
    let redundancy = combined.redundancy.as_ref().unwrap();
    assert!(redundancy.chi2_p.iter().all(Option::is_none));
    assert!(redundancy.fence_p.iter().all(Option::is_none));
}

#[test]
fn test_linear_hi_with_only_secondaries() {
    let (q, u) = (0.02, -0.01);
    let pairs = linear_hi_pairs(q, u, 3);
    let obs = observation("LINEAR-HI", vec![pairs[1].clone(), pairs[3].clone()]);
    let combined = combine_observation(&obs, &PatternTable::builtin(), all_ok(3).view()).unwrap();
    assert_eq!(combined.num_ok(), 3);
    assert_abs_diff_eq!(combined.stokes_fw.row(1), Array1::from_elem(3, q * 1000.0), epsilon = 1e-9);
    assert_abs_diff_eq!(combined.stokes_fw.row(2), Array1::from_elem(3, u * 1000.0), epsilon = 1e-9);
    // q = (n1 - n3)/√2 and u = (n1 + n3)/√2 share their errors with opposite
    // signs, so they are uncorrelated.
    assert_abs_diff_eq!(combined.var_fw.row(3), Array1::from_elem(3, 0.0), epsilon = 1e-9);
}

#[test]
fn test_linear_hi_with_three_pairs() {
    let (q, u) = (0.02, -0.01);
    let pairs = linear_hi_pairs(q, u, 3);
    let obs = observation(
        "LINEAR-HI",
        vec![pairs[0].clone(), pairs[1].clone(), pairs[2].clone()],
    );
    let combined = combine_observation(&obs, &PatternTable::builtin(), all_ok(3).view()).unwrap();
    assert_eq!(combined.num_ok(), 3);
    assert_abs_diff_eq!(combined.stokes_fw.row(1), Array1::from_elem(3, q * 1000.0), epsilon = 1e-9);
    assert_abs_diff_eq!(combined.stokes_fw.row(2), Array1::from_elem(3, u * 1000.0), epsilon = 1e-9);
}

#[test]
fn test_skips() {
    let patterns = PatternTable::builtin();
    let ok = all_ok(2);
    let pairs = linear_hi_pairs(0.02, -0.01, 2);

    let obs = observation("LINEAR-HI", vec![pairs[0].clone()]);
    assert_eq!(
        combine_observation(&obs, &patterns, ok.view()).unwrap_err(),
        SkipReason::TooFewPairs(1)
    );

    // Neither u nor its secondary are available.
    let obs = observation("LINEAR-HI", vec![pairs[0].clone(), pairs[3].clone()]);
    assert!(matches!(
        combine_observation(&obs, &patterns, ok.view()),
        Err(SkipReason::Unusable { .. })
    ));

    let obs = observation("LINEAR", vec![pairs[0].clone(), pairs[1].clone()]);
    assert_eq!(
        combine_observation(&obs, &patterns, ok.view()).unwrap_err(),
        SkipReason::UnexpectedWaveplate {
            code: WaveplateCode::new(1, 5),
            pattern: "LINEAR".to_string()
        }
    );

    let obs = observation("CIRCULAR", vec![pairs[0].clone(), pairs[2].clone()]);
    assert_eq!(
        combine_observation(&obs, &patterns, ok.view()).unwrap_err(),
        SkipReason::UnsupportedPattern("CIRCULAR".to_string())
    );

    let obs = observation("SPIRAL", vec![pairs[0].clone(), pairs[2].clone()]);
    assert_eq!(
        combine_observation(&obs, &patterns, ok.view()).unwrap_err(),
        SkipReason::UnknownPattern("SPIRAL".to_string())
    );
}

#[test]
fn test_observation_names() {
    let obs = observation(
        "LINEAR",
        vec![pair("04", 1.0, &[0.0]), pair("26", 1.0, &[0.0])],
    );
    assert_eq!(obs.name(), "HD1234_c0_1");

    let obs = observation(
        "LINEAR",
        vec![
            pair_with_cycles("04", 1.0, &[0.0], &[1, 2]),
            pair_with_cycles("26", 1.0, &[0.0], &[3, 14]),
        ],
    );
    assert_eq!(obs.name(), "HD1234_c0_12");

    let obs = observation(
        "LINEAR",
        vec![
            pair_with_cycles("04", 1.0, &[0.0], &[1, 2]),
            pair_with_cycles("26", 1.0, &[0.0], &[1]),
        ],
    );
    assert_eq!(obs.name(), "HD1234_c0_12_1");
}
