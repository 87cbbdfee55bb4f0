// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Tests to ensure there is no stderr output for successful commands.

use tempfile::TempDir;

use crate::{get_cmd_output, get_linear_files, polstokes, Files};

#[test]
fn test_final_stokes_no_stderr() {
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
            "--output-dir", &format!("{}", tmp_dir.path().display()),
            "--no-progress-bars",
        ])
        .ok();
    assert!(
        cmd.is_ok(),
        "final-stokes failed on simple test data: {}",
        cmd.err().unwrap()
    );
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.is_empty(), "stderr wasn't empty: {stderr}");
}

#[test]
fn test_dry_run_no_stderr() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let Files { exposures, .. } = get_linear_files(tmp_dir.path());

    #[rustfmt::skip]
    let cmd = polstokes()
        .args([
            "final-stokes",
            "--exposures", &exposures,
            "--no-hw-cal",
            "--output-dir", &format!("{}", tmp_dir.path().display()),
            "--dry-run",
        ])
        .ok();
    assert!(cmd.is_ok(), "dry run failed: {}", cmd.err().unwrap());
    let (stdout, stderr) = get_cmd_output(cmd);
    assert!(stderr.is_empty(), "stderr wasn't empty: {stderr}");
    assert!(stdout.contains("Dry run -- exiting now."), "{stdout}");
    assert!(!tmp_dir.path().join("HD1234_c0_1_stokes.json").exists());
}
