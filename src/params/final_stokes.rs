// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.


use std::path::{Path, PathBuf};

use indicatif::{ParallelProgressIterator, ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info, warn};
use rayon::prelude::*;
use thiserror::Error;

use crate::{
    calibration::{Calibration, CalibrationFrame, SampledCalibration},
    cli::Warn,
    combine::{combine_observation, CombinedStokes, Observation, SkipReason},
    constants::NO_LAMP,
    cycles::{CycleData, WaveplatePair},
    exposure::{group_exposures, ObservationExposures, RawStokesExposure, WavelengthGrid},
    io::{
        read::{read_exposure, ExposureReadError},
        write::{
            write_final_stokes, FinalStokesOutputType, FinalStokesSpectrum,
            FinalStokesWriteError,
        },
    },
    pattern::PatternTable,
    report::{cycle_report, redundancy_report, weighted_average, WeightedStokes},
    syserr::{consistency_chi2, estimate_systematic_error, SystematicError},
    PROGRESS_BARS,
};

/// Flux calibration of written final Stokes spectra. This happens outside of
/// `polstokes`; each written file is handed over here.
pub trait FluxCalibration: Sync {
    fn calibrate(&self, path: &Path) {
        debug!("Flux calibration of {} is pending", path.display());
    }
}

/// The default hand-off, which only notes that flux calibration is still to
/// be done.
pub struct PendingFluxCalibration;

impl FluxCalibration for PendingFluxCalibration {}

/// What happened during a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub written: Vec<PathBuf>,
    pub skipped_exposures: usize,
    pub skipped_configurations: usize,
    pub skipped_observations: usize,
}

pub(crate) struct FinalStokesParams {
    /// Raw Stokes exposure files.
    pub(crate) exposures: Vec<PathBuf>,
    pub(crate) calibration: Calibration,
    pub(crate) patterns: PatternTable,
    pub(crate) output_dir: PathBuf,
    pub(crate) output_type: FinalStokesOutputType,
}

/// A calibrated observation, ready to be written.
struct CalibratedObservation {
    combined: CombinedStokes,
    syserr: SystematicError,
    weighted: Option<WeightedStokes>,
    spectrum: FinalStokesSpectrum,
}

struct ProcessedObservation {
    observation: Observation,
    outcome: Result<Box<CalibratedObservation>, SkipReason>,
}

impl FinalStokesParams {
    pub(crate) fn run(&self) -> Result<RunSummary, FinalStokesError> {
        self.run_with_flux_calibration(&PendingFluxCalibration)
    }

    pub(crate) fn run_with_flux_calibration(
        &self,
        flux_calibration: &dyn FluxCalibration,
    ) -> Result<RunSummary, FinalStokesError> {
        let mut summary = RunSummary::default();

        let mut exposures = Vec::with_capacity(self.exposures.len());
        for path in &self.exposures {
            let record = read_exposure(path)?;
            match RawStokesExposure::from_record(record, path.clone()) {
                Ok(e) => exposures.push(e),
                Err(e) => {
                    format!("Skipping {}: {e}", path.display()).warn();
                    summary.skipped_exposures += 1;
                }
            }
        }

        let (configurations, grouping_errors) = group_exposures(exposures);
        for e in grouping_errors {
            e.to_string().warn();
            summary.skipped_configurations += 1;
        }
        if configurations.is_empty() {
            "No usable raw Stokes exposures; nothing to do".warn();
            return Ok(summary);
        }

        let provenance = self.calibration.provenance();
        let num_observations = configurations
            .iter()
            .map(|c| c.observations.len())
            .sum::<usize>();
        let progress = ProgressBar::with_draw_target(
            Some(num_observations as _),
            if PROGRESS_BARS.load() {
                ProgressDrawTarget::stdout()
            } else {
                ProgressDrawTarget::hidden()
            },
        )
        .with_style(
            ProgressStyle::default_bar()
                .template("{msg:18}: [{wide_bar:.blue}] {pos:3}/{len:3} observations ({elapsed_precise}<{eta_precise})").unwrap()
                .progress_chars("=> "),
        )
        .with_position(0)
        .with_message("Combining");

        for configuration in configurations {
            let grid = configuration.grid;
            let first = configuration.first_exposure();
            let frame = self.calibration.frame(&first.lamp);
            let telescope_pa = first.telescope_pa;
            info!("Configuration {}", configuration.config);
            info!(
                "  {} wavelengths from {} Å in steps of {} Å; PA type: {frame}",
                grid.len, grid.start, grid.step
            );
            if !first.lamp.eq_ignore_ascii_case(NO_LAMP) {
                debug!("  Calibration lamp {}; not rotating onto the sky", first.lamp);
            }
            let sampled = self.calibration.sample(&grid);
            let num_uncalibratable = sampled.ok_w.iter().filter(|&&ok| !ok).count();
            if num_uncalibratable > 0 {
                debug!("  {num_uncalibratable} wavelengths are outside of the calibration");
            }

            // Observations are independent; combine them in parallel, then
            // report them in order.
            let processed = configuration
                .observations
                .into_vec()
                .into_par_iter()
                .progress_with(progress.clone())
                .map(|exposures| {
                    process_observation(
                        exposures,
                        &sampled,
                        &self.patterns,
                        frame,
                        telescope_pa,
                        grid,
                        &provenance,
                    )
                })
                .collect::<Vec<_>>();

            for ProcessedObservation {
                observation,
                outcome,
            } in processed
            {
                let name = observation.name();
                info!("  Observation: {name}");
                let calibrated = match outcome {
                    Ok(c) => c,
                    Err(reason) => {
                        warn!("    {reason}; skipping observation");
                        summary.skipped_observations += 1;
                        continue;
                    }
                };

                for line in cycle_report(&observation, &calibrated.combined) {
                    info!("    {line}");
                }
                for line in redundancy_report(&calibrated.combined) {
                    info!("    {line}");
                }
                if let Some(mean_chi2) = calibrated.syserr.mean_chi2 {
                    info!(
                        "    Mean chisq: {:6.2}  Estimated sys %error: {:5.2}",
                        mean_chi2,
                        calibrated.syserr.percent()
                    );
                }
                debug!(
                    "    {} of {} wavelengths usable",
                    calibrated.combined.num_ok(),
                    grid.len
                );
                match calibrated.weighted {
                    Some(weighted) => info!("    {weighted}"),
                    None => warn!("    No usable wavelengths for a weighted mean"),
                }

                let path =
                    write_final_stokes(&calibrated.spectrum, &self.output_dir, self.output_type)?;
                info!("    {} Stokes I,Q,U", path.display());
                flux_calibration.calibrate(&path);
                summary.written.push(path);
            }
        }
        progress.abandon_with_message("Finished");

        Ok(summary)
    }
}

/// Everything done to an observation between grouping and writing. Nothing is
/// logged here.
fn process_observation(
    exposures: ObservationExposures,
    sampled: &SampledCalibration,
    patterns: &PatternTable,
    frame: CalibrationFrame,
    telescope_pa: f64,
    grid: WavelengthGrid,
    provenance: &[String],
) -> ProcessedObservation {
    let ObservationExposures {
        object,
        config,
        pattern,
        pairs,
    } = exposures;
    let pairs = pairs.mapped(|pair| {
        let cycles = pair.exposures.mapped(|exposure| CycleData {
            cycle: exposure.key.cycle,
            stokes_sw: sampled.subtract_tel_zeropoint(&exposure),
            var_sw: exposure.var_sw,
            bpm_sw: exposure.bpm_sw,
        });
        WaveplatePair::combine(pair.waveplate, cycles)
    });
    let observation = Observation {
        object,
        config,
        pattern,
        pairs,
    };

    let outcome = combine_observation(&observation, patterns, sampled.ok_w.view()).map(|combined| {
        let chi2_p = consistency_chi2(&observation, &combined).unwrap_or_default();
        let syserr = estimate_systematic_error(
            &chi2_p,
            combined.stokes_fw.view(),
            combined.var_fw.view(),
            combined.ok_w.view(),
        );
        let (stokes_fw, var_fw) = sampled.apply_hw_calibration(
            combined.stokes_fw.view(),
            combined.var_fw.view(),
            combined.ok_w.view(),
            frame,
            telescope_pa,
        );
        let weighted = weighted_average(
            stokes_fw.view(),
            var_fw.view(),
            combined.ok_w.view(),
            grid.wavelengths().view(),
        );
        let spectrum = FinalStokesSpectrum::assemble(
            &observation,
            frame,
            grid,
            stokes_fw.view(),
            var_fw.view(),
            combined.ok_w.view(),
            syserr,
            provenance.to_vec(),
        );
        Box::new(CalibratedObservation {
            combined,
            syserr,
            weighted,
            spectrum,
        })
    });

    ProcessedObservation {
        observation,
        outcome,
    }
}

#[derive(Error, Debug)]
pub(crate) enum FinalStokesError {
    #[error(transparent)]
    ExposureRead(#[from] ExposureReadError),

    #[error(transparent)]
    Write(#[from] FinalStokesWriteError),
}
