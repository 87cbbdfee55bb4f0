// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use tempfile::TempDir;

use polstokes::calibration::CalibrationFrame;

use crate::{
    get_cmd_output, get_linear_files, polstokes, read_spectrum, write_linear_exposure, Files,
    NUM_WAVS,
};

#[test]
fn test_uncalibrated_linear() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let Files { exposures, .. } = get_linear_files(tmp_dir.path());
    let out_dir = tmp_dir.path().join("out");

    #[rustfmt::skip]
    let cmd = polstokes()
        .args([
            "final-stokes",
            "--exposures", &exposures,
            "--no-hw-cal",
            "-o", &format!("{}", out_dir.display()),
            "--no-progress-bars",
        ])
        .ok();
    assert!(cmd.is_ok(), "final-stokes failed: {}", cmd.err().unwrap());
    let (stdout, stderr) = get_cmd_output(cmd);
    assert!(stderr.is_empty(), "stderr wasn't empty: {stderr}");
    assert!(stdout.contains("HD1234_c0_1"), "{stdout}");

    let spectrum = read_spectrum(&out_dir.join("HD1234_c0_1_stokes.json"));
    assert_eq!(spectrum.name, "HD1234_c0_1");
    assert_eq!(spectrum.pattern, "LINEAR");
    assert_eq!(spectrum.frame, CalibrationFrame::Instrumental);
    assert_abs_diff_eq!(spectrum.wavelength_start, 5000.0);
    assert_abs_diff_eq!(spectrum.wavelength_step, 20.0);
    assert_eq!(spectrum.stokes.len(), 3);
    assert_eq!(spectrum.variance.len(), 4);
    for i_wav in 0..NUM_WAVS {
        assert_abs_diff_eq!(spectrum.stokes[0][i_wav], 1000.0, epsilon = 1e-9);
        assert_abs_diff_eq!(spectrum.stokes[1][i_wav], 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(spectrum.stokes[2][i_wav], 20.0, epsilon = 1e-9);
        assert_abs_diff_eq!(spectrum.variance[3][i_wav], 0.0);
    }
    assert!(spectrum.bad_pixels.iter().flatten().all(|&b| b == 0));
    assert_abs_diff_eq!(spectrum.syserr_percent, 0.0);
    assert_eq!(spectrum.provenance[1], "HWCal: Uncalibrated");
}

#[test]
fn test_calibrated_linear() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let Files {
        exposures,
        hw_cal,
        tel_zeropoint,
    } = get_linear_files(tmp_dir.path());

    #[rustfmt::skip]
    let cmd = polstokes()
        .args([
            "final-stokes",
            "--exposures", &exposures,
            "--hw-cal", &hw_cal,
            "--tel-zeropoint", &tel_zeropoint,
            "--pa-zeropoint", "0.3",
            "--pa-zeropoint-version", "v2",
            "-o", &format!("{}", tmp_dir.path().display()),
            "--no-progress-bars",
        ])
        .ok();
    assert!(cmd.is_ok(), "final-stokes failed: {}", cmd.err().unwrap());

    let spectrum = read_spectrum(&tmp_dir.path().join("HD1234_c0_1_stokes.json"));
    assert_eq!(spectrum.frame, CalibrationFrame::Equatorial);
    assert_eq!(
        spectrum.provenance,
        vec![
            "PolCal Model: 20170429",
            "HWCal: hwcal.txt",
            "PolZeropoint: telzero.txt",
            "PAZeropoint: v2 0.3",
        ]
    );
    for i_wav in 0..NUM_WAVS {
        // Calibration rotates and rescales Q and U, but leaves I alone.
        assert_abs_diff_eq!(spectrum.stokes[0][i_wav], 1000.0, epsilon = 1e-9);
        let p = spectrum.stokes[1][i_wav].hypot(spectrum.stokes[2][i_wav]);
        assert!(p > 0.0 && p < 1000.0);
    }
}

#[test]
fn test_too_few_pairs_is_skipped() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    write_linear_exposure(tmp_dir.path(), "HD5678_c1_h04_1", 0.01);
    let exposures = tmp_dir.path().join("*.json").display().to_string();

    #[rustfmt::skip]
    let cmd = polstokes()
        .args([
            "final-stokes",
            "--exposures", &exposures,
            "--no-hw-cal",
            "-o", &format!("{}", tmp_dir.path().display()),
            "--no-progress-bars",
        ])
        .ok();
    assert!(cmd.is_ok(), "final-stokes failed: {}", cmd.err().unwrap());
    let (stdout, _) = get_cmd_output(cmd);
    assert!(stdout.contains("skipping observation"), "{stdout}");
    assert!(!tmp_dir.path().join("HD5678_c1_1_stokes.json").exists());
}

#[test]
fn test_missing_exposures_fail() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let exposures = tmp_dir.path().join("nothing_*.json").display().to_string();

    #[rustfmt::skip]
    let cmd = polstokes()
        .args([
            "final-stokes",
            "--exposures", &exposures,
            "--no-hw-cal",
        ])
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.starts_with("Error: "), "{stderr}");
    assert!(stderr.contains("nothing_"), "{stderr}");
}

#[test]
fn test_hw_cal_required() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let Files { exposures, .. } = get_linear_files(tmp_dir.path());

    let cmd = polstokes()
        .args(["final-stokes", "--exposures", &exposures])
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("--no-hw-cal"), "{stderr}");
}

#[test]
fn test_finalstokes_alias() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let Files { exposures, .. } = get_linear_files(tmp_dir.path());

    #[rustfmt::skip]
    let cmd = polstokes()
        .args([
            "finalstokes",
            "--exposures", &exposures,
            "--no-hw-cal",
            "--dry-run",
        ])
        .ok();
    assert!(cmd.is_ok(), "finalstokes alias failed: {}", cmd.err().unwrap());
}
