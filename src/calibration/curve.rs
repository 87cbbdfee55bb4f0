// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use super::CalibrationError;
use crate::math::CubicSpline;

/// A calibration quantity tabulated against wavelength. Non-finite samples
/// mark gaps in the table; wavelengths next to a gap, or outside of the table,
/// can't be calibrated.
#[derive(Debug, Clone)]
pub struct CalibrationCurve {
    wavelengths: Vec<f64>,
    values: Vec<f64>,
    spline: Option<CubicSpline>,
}

impl CalibrationCurve {
    pub fn new(
        name: &str,
        wavelengths: Vec<f64>,
        values: Vec<f64>,
    ) -> Result<CalibrationCurve, CalibrationError> {
        if wavelengths.len() != values.len() {
            return Err(CalibrationError::LengthMismatch {
                name: name.to_string(),
            });
        }
        if wavelengths.len() < 2 {
            return Err(CalibrationError::TooFewSamples {
                name: name.to_string(),
            });
        }
        if wavelengths.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(CalibrationError::NotIncreasing {
                name: name.to_string(),
            });
        }

        let (x, y): (Vec<f64>, Vec<f64>) = wavelengths
            .iter()
            .zip(values.iter())
            .filter(|(_, v)| v.is_finite())
            .map(|(&w, &v)| (w, v))
            .unzip();
        let spline = CubicSpline::new(x, y);

        Ok(CalibrationCurve {
            wavelengths,
            values,
            spline,
        })
    }

    /// Interpolate the curve at `wavelength`.
    pub fn sample(&self, wavelength: f64) -> Option<f64> {
        let spline = self.spline.as_ref()?;
        let n = self.wavelengths.len();
        if !(self.wavelengths[0]..=self.wavelengths[n - 1]).contains(&wavelength) {
            return None;
        }
        let upper = self
            .wavelengths
            .partition_point(|&w| w < wavelength)
            .clamp(1, n - 1);
        if !self.values[upper - 1].is_finite() || !self.values[upper].is_finite() {
            return None;
        }
        spline.eval(wavelength).filter(|v| v.is_finite())
    }
}
