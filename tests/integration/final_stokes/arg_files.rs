// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use tempfile::TempDir;

use crate::{get_cmd_output, get_linear_files, polstokes, read_spectrum, Files};

#[test]
fn test_toml_arg_file() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let Files { exposures, .. } = get_linear_files(tmp_dir.path());
    let arg_file = tmp_dir.path().join("args.toml");
    std::fs::write(
        &arg_file,
        format!(
            "exposures = [{exposures:?}]\nno_hw_cal = true\noutput_dir = {:?}\n",
            tmp_dir.path().display().to_string()
        ),
    )
    .unwrap();

    let cmd = polstokes()
        .args([
            "final-stokes",
            &format!("{}", arg_file.display()),
            "--no-progress-bars",
        ])
        .ok();
    assert!(cmd.is_ok(), "final-stokes failed: {}", cmd.err().unwrap());
    let spectrum = read_spectrum(&tmp_dir.path().join("HD1234_c0_1_stokes.json"));
    assert_eq!(spectrum.provenance[1], "HWCal: Uncalibrated");
}

#[test]
fn test_save_toml_round_trip() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let Files { exposures, .. } = get_linear_files(tmp_dir.path());
    let saved = tmp_dir.path().join("saved.toml");
    let out_dir = tmp_dir.path().join("out");

    #[rustfmt::skip]
    let cmd = polstokes()
        .args([
            "final-stokes",
            "--exposures", &exposures,
            "--no-hw-cal",
            "-o", &format!("{}", out_dir.display()),
            "--output-type", "yaml",
            "--save-toml", &format!("{}", saved.display()),
            "--dry-run",
        ])
        .ok();
    assert!(cmd.is_ok(), "final-stokes failed: {}", cmd.err().unwrap());
    assert!(saved.exists());
    assert!(!out_dir.join("HD1234_c0_1_stokes.yaml").exists());

    let cmd = polstokes()
        .args([
            "final-stokes",
            &format!("{}", saved.display()),
            "--no-progress-bars",
        ])
        .ok();
    assert!(cmd.is_ok(), "final-stokes failed: {}", cmd.err().unwrap());
    assert!(out_dir.join("HD1234_c0_1_stokes.yaml").exists());
}

#[test]
fn test_bad_arg_file() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let arg_file = tmp_dir.path().join("args.toml");
    std::fs::write(&arg_file, "exposures = 3\n").unwrap();

    let cmd = polstokes()
        .args(["final-stokes", &format!("{}", arg_file.display())])
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("Couldn't decode toml structure"), "{stderr}");
}
