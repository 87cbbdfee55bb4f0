// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Useful constants.

All constants *must* be double precision. `polstokes` should do as many
calculations as possible in double precision.
 */

pub use std::f64::consts::FRAC_1_SQRT_2;

/// Two cycles of the same waveplate pair are inconsistent at a wavelength if
/// the chi-square of their normalised difference (1 degree of freedom) exceeds
/// this value. This corresponds to P < 0.05% (1/2000).
pub const CYCLE_CHI2_LIMIT: f64 = 12.2;

/// The upper-outer-fence multiplier applied to the third quartile of a
/// chi-square distribution.
pub const CHI2_FENCE_FACTOR: f64 = 2.2;

/// Ratios of the upper outer fence to the third quartile of a chi-square
/// distribution, indexed by degrees of freedom minus one.
pub const CHI2_FENCE_Q3_RATIOS: [f64; 8] = [6.43, 4.08, 3.31, 2.91, 2.65, 2.49, 2.35, 2.25];

/// The degrees of freedom of the reference distribution used to fence
/// LINEAR-HI primary-vs-secondary chi-squares.
pub const LINEAR_HI_FENCE_DOF: usize = 3;

/// The lowest LINEAR-HI redundancy fence. It applies on top of the
/// `CHI2_FENCE_FACTOR` x Q3 fence, which on its own would be ~0 for highly
/// consistent data and cull wavelengths with chi-square below its expectation
/// value (1). See "LINEAR-HI fence" in DESIGN.md.
pub const CHI2_FENCE_FLOOR: f64 = 1.0;

/// The number of expected-spread units an observed chi-square/dof has to
/// exceed 1 by before a systematic error is estimated.
pub const SYSERR_SIGMA_THRESHOLD: f64 = 3.0;

/// The polarisation-angle step between consecutive half-wave-plate station
/// codes \[degrees\]. The plate rotates by half of this.
pub const HW_CODE_PA_STEP_DEG: f64 = 22.5;

/// The polarimetric calibration model that the calibration tables belong to.
pub const POLCAL_MODEL: &str = "20170429";

/// The lamp ID of exposures without a calibration lamp.
pub const NO_LAMP: &str = "NONE";
