// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.


use std::{borrow::Cow, path::PathBuf, str::FromStr};

use clap::Parser;
use itertools::Itertools;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::common::{display_warnings, InfoPrinter, Warn, ARG_FILE_HELP};
use crate::{
    calibration::{Calibration, HwCalibration, PaZeropoint, TelZeropoint},
    io::{
        get_all_matches_from_glob, get_single_match_from_glob,
        read::EXPOSURE_FILE_EXTENSIONS,
        write::{can_write_to_dir, FinalStokesOutputType, FINAL_STOKES_OUTPUT_EXTENSIONS},
    },
    params::FinalStokesParams,
    pattern::{PatternTable, PATTERN_NAMES_COMMA_SEPARATED},
    PolstokesError,
};

const DEFAULT_OUTPUT_TYPE: FinalStokesOutputType = FinalStokesOutputType::Json;

lazy_static::lazy_static! {
    static ref EXPOSURES_HELP: String =
        format!("Paths to the raw Stokes exposure files. Globs are expanded. Supported formats: {}", *EXPOSURE_FILE_EXTENSIONS);

    static ref PATTERNS_HELP: String =
        format!("Path to a waveplate pattern table. The built-in table is used if this isn't given. Built-in patterns: {}", *PATTERN_NAMES_COMMA_SEPARATED);

    static ref OUTPUT_TYPE_HELP: String =
        format!("The format of the final Stokes spectra. Supported formats: {}. Default: {DEFAULT_OUTPUT_TYPE}", *FINAL_STOKES_OUTPUT_EXTENSIONS);
}

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct FinalStokesArgs {
    #[clap(name = "ARGUMENTS_FILE", help = ARG_FILE_HELP.as_str(), parse(from_os_str))]
    pub(super) args_file: Option<PathBuf>,

    #[clap(
        short,
        long,
        multiple_values(true),
        help = EXPOSURES_HELP.as_str(),
        help_heading = "INPUT FILES"
    )]
    pub(super) exposures: Option<Vec<String>>,

    /// Path to the half-wave-plate calibration table (columns: wavelength,
    /// efficiency, PA offset in degrees).
    #[clap(long, help_heading = "CALIBRATION")]
    pub(super) hw_cal: Option<String>,

    /// Path to the telescope Q/U zero-point table (columns: wavelength, q0 %,
    /// u0 %).
    #[clap(long, help_heading = "CALIBRATION")]
    pub(super) tel_zeropoint: Option<String>,

    /// The PA zero-point [degrees]. Recorded with the output spectra.
    #[clap(long, help_heading = "CALIBRATION", allow_hyphen_values = true)]
    pub(super) pa_zeropoint: Option<f64>,

    /// The version label of the PA zero-point.
    #[clap(long, help_heading = "CALIBRATION")]
    pub(super) pa_zeropoint_version: Option<String>,

    /// The spectrograph zero-point table used upstream. Recorded with the
    /// output spectra.
    #[clap(long, help_heading = "CALIBRATION")]
    pub(super) spec_zeropoint: Option<String>,

    #[clap(long, help = PATTERNS_HELP.as_str(), help_heading = "INPUT FILES")]
    pub(super) patterns: Option<String>,

    /// Don't apply the half-wave-plate calibration. This also disables the
    /// telescope and PA zero-points.
    #[clap(long, help_heading = "CALIBRATION")]
    #[serde(default)]
    pub(super) no_hw_cal: bool,

    /// Don't subtract the telescope zero-point. This also disables the PA
    /// zero-point.
    #[clap(long, help_heading = "CALIBRATION")]
    #[serde(default)]
    pub(super) no_pol_zeropoint: bool,

    /// Don't record a PA zero-point.
    #[clap(long, help_heading = "CALIBRATION")]
    #[serde(default)]
    pub(super) no_pa_zeropoint: bool,

    /// The directory to write final Stokes spectra into. Default: the current
    /// directory.
    #[clap(short, long, help_heading = "OUTPUT FILES")]
    pub(super) output_dir: Option<PathBuf>,

    #[clap(long, help = OUTPUT_TYPE_HELP.as_str(), help_heading = "OUTPUT FILES")]
    pub(super) output_type: Option<String>,
}

impl FinalStokesArgs {
    /// Both command-line and file arguments overlap in terms of what is
    /// available; this function consolidates everything that was specified into
    /// a single struct. Where applicable, it will prefer CLI parameters over
    /// those in the file.
    ///
    /// This function should only ever merge arguments, and not try to make
    /// sense of them.
    pub(super) fn merge(self) -> Result<FinalStokesArgs, PolstokesError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            // Ensure all of the file args are accounted for by pattern
            // matching.
            let FinalStokesArgs {
                args_file: _,
                exposures,
                hw_cal,
                tel_zeropoint,
                pa_zeropoint,
                pa_zeropoint_version,
                spec_zeropoint,
                patterns,
                no_hw_cal,
                no_pol_zeropoint,
                no_pa_zeropoint,
                output_dir,
                output_type,
            } = unpack_arg_file!(arg_file);

            Ok(FinalStokesArgs {
                args_file: None,
                exposures: cli_args.exposures.or(exposures),
                hw_cal: cli_args.hw_cal.or(hw_cal),
                tel_zeropoint: cli_args.tel_zeropoint.or(tel_zeropoint),
                pa_zeropoint: cli_args.pa_zeropoint.or(pa_zeropoint),
                pa_zeropoint_version: cli_args.pa_zeropoint_version.or(pa_zeropoint_version),
                spec_zeropoint: cli_args.spec_zeropoint.or(spec_zeropoint),
                patterns: cli_args.patterns.or(patterns),
                no_hw_cal: cli_args.no_hw_cal || no_hw_cal,
                no_pol_zeropoint: cli_args.no_pol_zeropoint || no_pol_zeropoint,
                no_pa_zeropoint: cli_args.no_pa_zeropoint || no_pa_zeropoint,
                output_dir: cli_args.output_dir.or(output_dir),
                output_type: cli_args.output_type.or(output_type),
            })
        } else {
            Ok(cli_args)
        }
    }

    pub(super) fn parse(self) -> Result<FinalStokesParams, PolstokesError> {
        debug!("{:#?}", self);

        let Self {
            args_file: _,
            exposures,
            hw_cal,
            tel_zeropoint,
            pa_zeropoint,
            pa_zeropoint_version,
            spec_zeropoint,
            patterns,
            no_hw_cal,
            no_pol_zeropoint,
            no_pa_zeropoint,
            output_dir,
            output_type,
        } = self;

        let mut exposure_paths = vec![];
        for e in exposures.unwrap_or_default() {
            let path = PathBuf::from(&e);
            if path.is_file() {
                exposure_paths.push(path);
            } else {
                let matches = get_all_matches_from_glob(&e)?;
                if matches.is_empty() {
                    return Err(FinalStokesArgsError::ExposureNotFound(e).into());
                }
                exposure_paths.extend(matches);
            }
        }
        if exposure_paths.is_empty() {
            return Err(FinalStokesArgsError::NoExposures.into());
        }
        exposure_paths.sort_unstable();
        exposure_paths.dedup();

        let mut printer = InfoPrinter::new("Final Stokes set up".into());
        printer.push_line(format!("{} raw Stokes exposures", exposure_paths.len()).into());

        // Each stage needs all of the stages before it.
        let hw = if no_hw_cal {
            if hw_cal.is_some() {
                "--no-hw-cal was given; ignoring the HW calibration table".warn();
            }
            None
        } else {
            let hw_cal = hw_cal.ok_or(FinalStokesArgsError::NoHwCal)?;
            let path = get_single_match_from_glob(&hw_cal)?;
            Some(HwCalibration::from_file(&path)?)
        };
        let tel = if hw.is_none() || no_pol_zeropoint {
            None
        } else {
            let tel_zeropoint = tel_zeropoint.ok_or(FinalStokesArgsError::NoTelZeropoint)?;
            let path = get_single_match_from_glob(&tel_zeropoint)?;
            Some(TelZeropoint::from_file(&path)?)
        };
        let pa = if tel.is_none() || no_pa_zeropoint {
            None
        } else {
            match pa_zeropoint {
                Some(value) => Some(PaZeropoint {
                    version: pa_zeropoint_version.unwrap_or_else(|| "unversioned".to_string()),
                    value,
                }),
                None => {
                    "No PA zero-point was given; it will be recorded as Null".warn();
                    None
                }
            }
        };
        let calibration = Calibration::new(hw, tel, pa, spec_zeropoint);
        printer.push_block(
            calibration
                .provenance()
                .into_iter()
                .map(|l| l.into())
                .collect(),
        );

        let patterns = match patterns {
            Some(p) => {
                let path = get_single_match_from_glob(&p)?;
                let table = PatternTable::from_file(&path)?;
                printer.push_line(format!("Waveplate patterns from {}", path.display()).into());
                table
            }
            None => PatternTable::builtin(),
        };
        trace!("Waveplate patterns: {}", patterns.names().join(", "));

        let output_dir = output_dir.unwrap_or_else(|| PathBuf::from("."));
        can_write_to_dir(&output_dir)?;
        let output_type = match output_type {
            Some(t) => FinalStokesOutputType::from_str(&t.to_lowercase())
                .map_err(|_| FinalStokesArgsError::InvalidOutputType(t))?,
            None => DEFAULT_OUTPUT_TYPE,
        };
        printer.push_line(
            format!(
                "Writing {output_type} final Stokes spectra to {}",
                output_dir.display()
            )
            .into(),
        );
        printer.display();

        display_warnings();

        Ok(FinalStokesParams {
            exposures: exposure_paths,
            calibration,
            patterns,
            output_dir,
            output_type,
        })
    }

    pub(super) fn run(self, dry_run: bool) -> Result<(), PolstokesError> {
        debug!("Converting arguments into parameters");
        trace!("{:#?}", self);
        let params = self.parse()?;

        if dry_run {
            info!("Dry run -- exiting now.");
            return Ok(());
        }

        let summary = params.run()?;
        display_warnings();

        let mut printer = InfoPrinter::new("Final Stokes summary".into());
        printer.push_line(format!("{} final Stokes spectra written", summary.written.len()).into());
        let mut skipped: Vec<Cow<'static, str>> = vec![];
        if summary.skipped_exposures > 0 {
            skipped.push(format!("{} exposures skipped", summary.skipped_exposures).into());
        }
        if summary.skipped_configurations > 0 {
            skipped.push(format!("{} configurations skipped", summary.skipped_configurations).into());
        }
        if summary.skipped_observations > 0 {
            skipped.push(format!("{} observations skipped", summary.skipped_observations).into());
        }
        printer.push_block(skipped);
        printer.display();

        Ok(())
    }
}

#[derive(Error, Debug)]
pub(super) enum FinalStokesArgsError {
    #[error("No raw Stokes exposures were specified")]
    NoExposures,

    #[error("Raw Stokes exposure '{0}' doesn't exist and doesn't match any files")]
    ExposureNotFound(String),

    #[error("No HW calibration table was specified; use --hw-cal, or --no-hw-cal to leave Q and U uncalibrated")]
    NoHwCal,

    #[error("No telescope zero-point table was specified; use --tel-zeropoint, or --no-pol-zeropoint to skip it")]
    NoTelZeropoint,

    #[error("Invalid output type '{0}'; supported formats: {}", *FINAL_STOKES_OUTPUT_EXTENSIONS)]
    InvalidOutputType(String),
}
