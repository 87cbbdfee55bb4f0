// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Integration tests.
//!
//! Some help for laying out these tests was taken from:
//! https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html

mod final_stokes;
mod no_stderr;

use std::{
    path::{Path, PathBuf},
    process::Output,
    str::from_utf8,
};

use assert_cmd::{output::OutputError, Command};
use indoc::indoc;

use polstokes::io::{read::ExposureRecord, write::FinalStokesSpectrum};

const NUM_WAVS: usize = 16;

fn polstokes() -> Command {
    Command::cargo_bin("polstokes").unwrap()
}

fn get_cmd_output(result: Result<Output, OutputError>) -> (String, String) {
    let output = match result {
        Ok(o) => o,
        Err(o) => o.as_output().unwrap().clone(),
    };
    (
        from_utf8(&output.stdout).unwrap().to_string(),
        from_utf8(&output.stderr).unwrap().to_string(),
    )
}

/// Write a LINEAR exposure with intensity 1000 and normalised difference `n`
/// at every wavelength.
fn write_linear_exposure(dir: &Path, stem: &str, n: f64) -> PathBuf {
    let record = ExposureRecord {
        object: None,
        config: None,
        waveplate: None,
        cycle: None,
        pattern: "LINEAR".to_string(),
        lamp: "NONE".to_string(),
        telescope_pa: 30.0,
        tracker_rho: 0.0,
        grating: Some("PG0900".to_string()),
        wavelength_start: 5000.0,
        wavelength_step: 20.0,
        stokes: [vec![1000.0; NUM_WAVS], vec![n * 1000.0; NUM_WAVS]],
        variance: [vec![100.0; NUM_WAVS], vec![1e-6 * 1000.0 * 1000.0; NUM_WAVS]],
        bad_pixels: [vec![0; NUM_WAVS], vec![0; NUM_WAVS]],
    };
    let path = dir.join(format!("{stem}.json"));
    std::fs::write(&path, serde_json::to_string_pretty(&record).unwrap()).unwrap();
    path
}

struct Files {
    exposures: String,
    hw_cal: String,
    tel_zeropoint: String,
}

/// A LINEAR observation of "HD1234" (one cycle of both waveplate pairs) and
/// calibration tables covering it.
fn get_linear_files(dir: &Path) -> Files {
    write_linear_exposure(dir, "HD1234_c0_h04_1", 0.01);
    write_linear_exposure(dir, "HD1234_c0_h26_1", 0.02);

    let hw_cal = dir.join("hwcal.txt");
    std::fs::write(
        &hw_cal,
        indoc! {"
            # wavelength  efficiency  PA offset
            4000.0  0.96  0.0
            5000.0  0.97  0.5
            6000.0  0.98  1.0
            7000.0  0.99  1.5
        "},
    )
    .unwrap();
    let tel_zeropoint = dir.join("telzero.txt");
    std::fs::write(
        &tel_zeropoint,
        indoc! {"
            # wavelength  q0 (%)  u0 (%)  error (%)
            4000.0  0.05  -0.02  0.01
            5500.0  0.04  -0.02  0.01
            7000.0  0.03  -0.01  0.01
        "},
    )
    .unwrap();

    Files {
        exposures: dir.join("HD1234_c0_h*.json").display().to_string(),
        hw_cal: hw_cal.display().to_string(),
        tel_zeropoint: tel_zeropoint.display().to_string(),
    }
}

fn read_spectrum(path: &Path) -> FinalStokesSpectrum {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}
