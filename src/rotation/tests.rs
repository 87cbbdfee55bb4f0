// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use ndarray::prelude::*;

use super::*;

fn example_unnormalised() -> (Array2<f64>, Array2<f64>) {
    let stokes_sw = array![
        [1000.0, 1010.0, 990.0, 1005.0],
        [10.0, -3.0, 25.0, 0.5],
        [-7.0, 12.0, 1.0, -20.0],
    ];
    let var_sw = array![
        [100.0, 101.0, 99.0, 100.5],
        [4.0, 9.0, 1.0, 2.5],
        [1.0, 16.0, 3.0, 2.0],
        [0.5, -2.0, 0.0, 1.0],
    ];
    (stokes_sw, var_sw)
}

#[test]
fn test_rotation_round_trip_constant_angle() {
    let (stokes_sw, var_sw) = example_unnormalised();
    for pa in [-170.0, -45.0, 0.0, 12.5, 33.3, 90.0, 135.0] {
        let pa_w = Array1::from_elem(4, pa);
        let (rot_stokes, rot_var) = rotate_stokes(
            stokes_sw.view(),
            var_sw.view(),
            pa_w.view(),
            StokesLayout::Unnormalised,
        );
        let (back_stokes, back_var) = rotate_stokes(
            rot_stokes.view(),
            rot_var.view(),
            (-&pa_w).view(),
            StokesLayout::Unnormalised,
        );
        assert_abs_diff_eq!(back_stokes, stokes_sw, epsilon = 1e-10);
        assert_abs_diff_eq!(back_var, var_sw, epsilon = 1e-10);
    }
}

#[test]
fn test_rotation_round_trip_wavelength_dependent_angle() {
    let (stokes_sw, var_sw) = example_unnormalised();
    let pa_w = array![3.0, 47.5, -88.0, 121.0];
    let (rot_stokes, rot_var) = rotate_stokes(
        stokes_sw.view(),
        var_sw.view(),
        pa_w.view(),
        StokesLayout::Unnormalised,
    );
    // Intensity is never touched.
    assert_abs_diff_eq!(rot_stokes.row(0), stokes_sw.row(0));
    assert_abs_diff_eq!(rot_var.row(0), var_sw.row(0));

    let (back_stokes, back_var) = rotate_stokes(
        rot_stokes.view(),
        rot_var.view(),
        (-&pa_w).view(),
        StokesLayout::Unnormalised,
    );
    assert_abs_diff_eq!(back_stokes, stokes_sw, epsilon = 1e-10);
    assert_abs_diff_eq!(back_var, var_sw, epsilon = 1e-10);
}

#[test]
fn test_rotation_by_90_degrees_flips_sign() {
    let (stokes_sw, var_sw) = example_unnormalised();
    let pa_w = Array1::from_elem(4, 90.0);
    let (rot_stokes, rot_var) = rotate_stokes(
        stokes_sw.view(),
        var_sw.view(),
        pa_w.view(),
        StokesLayout::Unnormalised,
    );
    assert_abs_diff_eq!(rot_stokes.row(1), (-&stokes_sw.row(1)), epsilon = 1e-10);
    assert_abs_diff_eq!(rot_stokes.row(2), (-&stokes_sw.row(2)), epsilon = 1e-10);
    assert_abs_diff_eq!(rot_var, var_sw, epsilon = 1e-10);
}

#[test]
fn test_rotation_by_45_degrees_swaps_q_and_u() {
    let stokes_sw = array![[0.02, -0.01], [0.005, 0.03]];
    let var_sw = array![[1e-4, 2e-4], [3e-4, 4e-4], [0.0, 0.0]];
    let pa_w = array![45.0, 45.0];
    let (rot_stokes, rot_var) = rotate_stokes(
        stokes_sw.view(),
        var_sw.view(),
        pa_w.view(),
        StokesLayout::Normalised,
    );
    // Q' = -U, U' = Q
    assert_abs_diff_eq!(rot_stokes.row(0), (-&stokes_sw.row(1)), epsilon = 1e-12);
    assert_abs_diff_eq!(rot_stokes.row(1), stokes_sw.row(0), epsilon = 1e-12);
    assert_abs_diff_eq!(rot_var.row(0), var_sw.row(1), epsilon = 1e-12);
    assert_abs_diff_eq!(rot_var.row(1), var_sw.row(0), epsilon = 1e-12);
    assert_abs_diff_eq!(rot_var.row(2), array![0.0, 0.0], epsilon = 1e-12);
}

#[test]
fn test_rotation_leaves_circular_polarisation_alone() {
    let stokes_sw = array![[1.0], [0.1], [0.2], [0.3]];
    let var_sw = array![[0.01], [0.02], [0.03], [0.0], [0.04]];
    let (rot_stokes, rot_var) = rotate_stokes(
        stokes_sw.view(),
        var_sw.view(),
        array![30.0].view(),
        StokesLayout::Unnormalised,
    );
    assert_abs_diff_eq!(rot_stokes[(3, 0)], 0.3);
    assert_abs_diff_eq!(rot_var[(4, 0)], 0.04);
}

#[test]
fn test_rotation_does_not_mutate_inputs() {
    let (stokes_sw, var_sw) = example_unnormalised();
    let before = (stokes_sw.clone(), var_sw.clone());
    let _ = rotate_stokes(
        stokes_sw.view(),
        var_sw.view(),
        Array1::from_elem(4, 20.0).view(),
        StokesLayout::Unnormalised,
    );
    assert_eq!(stokes_sw, before.0);
    assert_eq!(var_sw, before.1);
}
