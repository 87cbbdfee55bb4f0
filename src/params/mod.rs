// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Parameters that are ready to be used directly.
//!
//! The code here is kind of "mirroring" the code within the `cli` module; the
//! idea is that `cli` is unparsed, user-facing code, whereas parameters have
//! been parsed and validated.

mod final_stokes;

pub use final_stokes::{FluxCalibration, PendingFluxCalibration, RunSummary};
pub(crate) use final_stokes::{FinalStokesError, FinalStokesParams};
