// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Polarimetric calibration.
//!
//! Three stages are applied, each of which can be switched off:
//!
//! 1. the telescope Q/U zero-point is subtracted from every raw exposure,
//!    before cycles are combined;
//! 2. Q and U are divided by the half-wave-plate efficiency after the
//!    waveplate pairs are combined;
//! 3. Q and U are rotated from the instrumental frame into the equatorial
//!    frame.
//!
//! Switching off a stage switches off everything downstream of it: without
//! the half-wave-plate calibration there is no telescope zero-point and no PA
//! zero-point.

mod curve;

pub use curve::CalibrationCurve;

use std::path::Path;

use log::debug;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use thiserror::Error;

use crate::{
    constants::{HW_CODE_PA_STEP_DEG, NO_LAMP, POLCAL_MODEL},
    exposure::{RawStokesExposure, WavelengthGrid},
    io::read::{read_table, TableReadError},
    rotation::{rotate_stokes, StokesLayout},
};

/// The reference frame of the final Stokes parameters.
#[derive(Debug, Display, EnumString, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationFrame {
    Instrumental,
    Equatorial,
}

/// Half-wave-plate efficiency and position-angle offset against wavelength.
#[derive(Debug, Clone)]
pub struct HwCalibration {
    pub label: String,
    pub efficiency: CalibrationCurve,
    /// \[degrees\]
    pub pa_offset: CalibrationCurve,
}

impl HwCalibration {
    /// Read a table with columns wavelength, efficiency, PA offset.
    pub fn from_file(path: &Path) -> Result<HwCalibration, CalibrationError> {
        let [wav, eff, pa]: [Vec<f64>; 3] = read_table(path, 3)?
            .try_into()
            .map_err(|_| CalibrationError::Columns)?;
        Ok(HwCalibration {
            label: file_label(path),
            efficiency: CalibrationCurve::new("HW efficiency", wav.clone(), eff)?,
            pa_offset: CalibrationCurve::new("HW PA offset", wav, pa)?,
        })
    }
}

/// The telescope's instrumental Q/U zero-point against wavelength, as
/// fractions (the table itself is in percent).
#[derive(Debug, Clone)]
pub struct TelZeropoint {
    pub label: String,
    pub q0: CalibrationCurve,
    pub u0: CalibrationCurve,
}

impl TelZeropoint {
    /// Read a table with columns wavelength, q0 \[%\], u0 \[%\]. Further
    /// columns (e.g. errors) are ignored.
    pub fn from_file(path: &Path) -> Result<TelZeropoint, CalibrationError> {
        let [wav, q0, u0]: [Vec<f64>; 3] = read_table(path, 3)?
            .try_into()
            .map_err(|_| CalibrationError::Columns)?;
        let percent = |v: Vec<f64>| v.into_iter().map(|x| x / 100.0).collect::<Vec<_>>();
        Ok(TelZeropoint {
            label: file_label(path),
            q0: CalibrationCurve::new("telescope q zero-point", wav.clone(), percent(q0))?,
            u0: CalibrationCurve::new("telescope u zero-point", wav, percent(u0))?,
        })
    }
}

/// An already-resolved PA zero-point.
#[derive(Debug, Clone, PartialEq)]
pub struct PaZeropoint {
    pub version: String,
    /// \[degrees\]
    pub value: f64,
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// All of the calibration used for a run.
#[derive(Debug, Clone)]
pub struct Calibration {
    hw: Option<HwCalibration>,
    tel_zeropoint: Option<TelZeropoint>,
    pa_zeropoint: Option<PaZeropoint>,
    spec_zeropoint: Option<String>,
}

impl Calibration {
    pub fn new(
        hw: Option<HwCalibration>,
        mut tel_zeropoint: Option<TelZeropoint>,
        mut pa_zeropoint: Option<PaZeropoint>,
        spec_zeropoint: Option<String>,
    ) -> Calibration {
        if hw.is_none() && (tel_zeropoint.is_some() || pa_zeropoint.is_some()) {
            debug!("No HW calibration; ignoring the telescope and PA zero-points");
            tel_zeropoint = None;
            pa_zeropoint = None;
        }
        if tel_zeropoint.is_none() && pa_zeropoint.is_some() {
            debug!("No telescope zero-point; ignoring the PA zero-point");
            pa_zeropoint = None;
        }
        Calibration {
            hw,
            tel_zeropoint,
            pa_zeropoint,
            spec_zeropoint,
        }
    }

    /// No calibration at all.
    pub fn uncalibrated() -> Calibration {
        Calibration::new(None, None, None, None)
    }

    #[cfg(test)]
    pub(crate) fn has_hw(&self) -> bool {
        self.hw.is_some()
    }

    /// The frame that output Stokes will be in. Exposures with a calibration
    /// lamp are never rotated onto the sky.
    pub fn frame(&self, lamp: &str) -> CalibrationFrame {
        if self.hw.is_some() && lamp.trim().eq_ignore_ascii_case(NO_LAMP) {
            CalibrationFrame::Equatorial
        } else {
            CalibrationFrame::Instrumental
        }
    }

    /// Human-readable lines describing what calibration is applied.
    pub fn provenance(&self) -> Vec<String> {
        let mut lines = vec![format!("PolCal Model: {POLCAL_MODEL}")];
        lines.push(match &self.hw {
            Some(hw) => format!("HWCal: {}", hw.label),
            None => "HWCal: Uncalibrated".to_string(),
        });
        lines.push(match &self.tel_zeropoint {
            Some(tel) => format!("PolZeropoint: {}", tel.label),
            None => "PolZeropoint: Null".to_string(),
        });
        lines.push(match &self.pa_zeropoint {
            Some(pa) => format!("PAZeropoint: {} {}", pa.version, pa.value),
            None => "PAZeropoint: Null".to_string(),
        });
        if let Some(spec) = &self.spec_zeropoint {
            lines.push(format!("SpecZeropoint: {spec}"));
        }
        lines
    }

    /// Evaluate the calibration curves on a wavelength grid.
    pub fn sample(&self, grid: &WavelengthGrid) -> SampledCalibration {
        let wavs = grid.wavelengths();
        let mut ok_w = Array1::from_elem(grid.len, true);

        let hw = self.hw.as_ref().map(|hw| {
            let mut efficiency_w = Array1::zeros(grid.len);
            let mut pa_offset_w = Array1::zeros(grid.len);
            for (i_wav, &wav) in wavs.iter().enumerate() {
                match (hw.efficiency.sample(wav), hw.pa_offset.sample(wav)) {
                    (Some(eff), Some(pa)) => {
                        efficiency_w[i_wav] = eff;
                        pa_offset_w[i_wav] = -pa;
                    }
                    _ => ok_w[i_wav] = false,
                }
            }
            SampledHw {
                efficiency_w,
                pa_offset_w,
            }
        });

        let tel_zeropoint_sw = self.tel_zeropoint.as_ref().map(|tel| {
            let mut tel_sw = Array2::zeros((2, grid.len));
            for (i_wav, &wav) in wavs.iter().enumerate() {
                match (tel.q0.sample(wav), tel.u0.sample(wav)) {
                    (Some(q0), Some(u0)) => {
                        tel_sw[(0, i_wav)] = q0;
                        tel_sw[(1, i_wav)] = u0;
                    }
                    _ => ok_w[i_wav] = false,
                }
            }
            tel_sw
        });

        // The PA offset only applies where everything is calibratable.
        let hw = hw.map(|mut hw| {
            for (pa, &ok) in hw.pa_offset_w.iter_mut().zip(ok_w.iter()) {
                if !ok {
                    *pa = 0.0;
                }
            }
            hw
        });

        SampledCalibration {
            ok_w,
            hw,
            tel_zeropoint_sw,
        }
    }
}

#[derive(Debug, Clone)]
struct SampledHw {
    efficiency_w: Array1<f64>,
    /// The sign-flipped PA offset \[degrees\].
    pa_offset_w: Array1<f64>,
}

/// Calibration curves evaluated on one configuration's wavelength grid.
#[derive(Debug, Clone)]
pub struct SampledCalibration {
    /// Whether each wavelength can be calibrated.
    pub ok_w: Array1<bool>,
    hw: Option<SampledHw>,
    tel_zeropoint_sw: Option<Array2<f64>>,
}

impl SampledCalibration {
    #[cfg(test)]
    pub(crate) fn efficiency_w(&self) -> Option<ArrayView1<'_, f64>> {
        self.hw.as_ref().map(|hw| hw.efficiency_w.view())
    }

    /// The angle \[degrees\] rotating instrumental Stokes onto the sky, before
    /// the telescope PA is added. Zero without HW calibration.
    #[cfg(test)]
    pub(crate) fn pa_offset_w(&self) -> Array1<f64> {
        match &self.hw {
            Some(hw) => hw.pa_offset_w.clone(),
            None => Array1::zeros(self.ok_w.len()),
        }
    }

    /// Subtract the telescope zero-point from the difference channel of a raw
    /// exposure. The zero-point is rotated into the exposure's raw frame and
    /// scaled by the HW efficiency. A copy of the exposure's Stokes is
    /// returned; without a zero-point it is unchanged.
    pub fn subtract_tel_zeropoint(&self, exposure: &RawStokesExposure) -> Array2<f64> {
        let mut stokes_sw = exposure.stokes_sw.clone();
        let (Some(tel0_sw), Some(hw)) = (&self.tel_zeropoint_sw, &self.hw) else {
            return stokes_sw;
        };

        let raw_pa_w = hw.pa_offset_w.mapv(|hpar| {
            -(HW_CODE_PA_STEP_DEG * f64::from(exposure.key.waveplate.first())
                + hpar
                + exposure.tracker_rho)
        });
        let (raw_tel0_sw, _) = rotate_stokes(
            tel0_sw.view(),
            Array2::zeros((3, self.ok_w.len())).view(),
            raw_pa_w.view(),
            StokesLayout::Normalised,
        );
        for (i_wav, &ok) in self.ok_w.iter().enumerate() {
            if ok {
                let q0 = raw_tel0_sw[(0, i_wav)] * hw.efficiency_w[i_wav];
                stokes_sw[(1, i_wav)] -= stokes_sw[(0, i_wav)] * q0;
            }
        }
        stokes_sw
    }

    /// Divide polarised Stokes by the HW efficiency and rotate them into
    /// `frame`. `stokes_fw` is I,Q,U and `var_fw` is I,Q,U,QU. Only
    /// wavelengths in `ok_w` are divided. Nothing happens without HW
    /// calibration.
    pub fn apply_hw_calibration(
        &self,
        stokes_fw: ArrayView2<f64>,
        var_fw: ArrayView2<f64>,
        ok_w: ArrayView1<bool>,
        frame: CalibrationFrame,
        telescope_pa: f64,
    ) -> (Array2<f64>, Array2<f64>) {
        let Some(hw) = &self.hw else {
            return (stokes_fw.to_owned(), var_fw.to_owned());
        };

        let mut stokes_fw = stokes_fw.to_owned();
        let mut var_fw = var_fw.to_owned();
        for (i_wav, &ok) in ok_w.iter().enumerate() {
            if !ok {
                continue;
            }
            let eff = hw.efficiency_w[i_wav];
            stokes_fw
                .slice_mut(s![1.., i_wav])
                .mapv_inplace(|v| v / eff);
            var_fw
                .slice_mut(s![1.., i_wav])
                .mapv_inplace(|v| v / (eff * eff));
        }

        let pa_w = match frame {
            CalibrationFrame::Equatorial => {
                let telpa = telescope_pa.rem_euclid(180.0);
                hw.pa_offset_w.mapv(|hpar| hpar + telpa)
            }
            CalibrationFrame::Instrumental => hw.pa_offset_w.clone(),
        };
        rotate_stokes(
            stokes_fw.view(),
            var_fw.view(),
            pa_w.view(),
            StokesLayout::Unnormalised,
        )
    }
}

#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("The {name} calibration table has different numbers of wavelengths and values")]
    LengthMismatch { name: String },

    #[error("The {name} calibration table needs at least two wavelengths")]
    TooFewSamples { name: String },

    #[error("The wavelengths of the {name} calibration table aren't strictly increasing")]
    NotIncreasing { name: String },

    #[error("A calibration table didn't have the expected columns")]
    Columns,

    #[error(transparent)]
    Table(#[from] TableReadError),
}
