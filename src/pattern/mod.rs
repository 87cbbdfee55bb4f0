// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Waveplate patterns: which waveplate pairs make up an observation, and how
//! they combine into Stokes parameters.
//!
//! A pattern table has one pattern per line:
//!
//! ```text
//! # name     stokes  positions  pair codes...
//! LINEAR     3       4          0 4  2 6
//! ```
//!
//! A waveplate pair's index within a pattern is the position of its code
//! (e.g. "26") in the sorted list of the pattern's codes.

#[cfg(test)]
mod tests;

use std::{fs::read_to_string, path::Path, str::FromStr};

use indexmap::IndexMap;
use itertools::Itertools;
use log::debug;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};
use thiserror::Error;

use crate::exposure::WaveplateCode;

const BUILTIN_PATTERNS: &str = "\
# name       stokes positions  pair codes
LINEAR       3      4          0 4  2 6
LINEAR-HI    3      8          0 4  1 5  2 6  3 7
CIRCULAR     2      4          0 4  2 6
CIRCULAR-HI  2      8          0 4  1 5  2 6  3 7
ALL-STOKES   4      8          0 4  1 5  2 6  3 7
";

/// Patterns known to the pipeline.
#[derive(Debug, Display, EnumIter, EnumString, Clone, Copy, PartialEq, Eq)]
pub enum PatternName {
    #[strum(serialize = "LINEAR")]
    Linear,
    #[strum(serialize = "LINEAR-HI")]
    LinearHi,
    #[strum(serialize = "CIRCULAR")]
    Circular,
    #[strum(serialize = "CIRCULAR-HI")]
    CircularHi,
    #[strum(serialize = "ALL-STOKES")]
    AllStokes,
}

lazy_static::lazy_static! {
    pub(crate) static ref PATTERN_NAMES_COMMA_SEPARATED: String = PatternName::iter().join(", ");
}

/// How the pairs of a pattern are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    /// Two pairs, each giving one of Q and U.
    Linear,
    /// Four pairs; Q and U each have a primary pair and a secondary
    /// reconstruction from the other pairs.
    LinearHi,
    /// Anything else (circular, all-Stokes or unknown). Observations with
    /// these patterns are skipped.
    Unsupported,
}

impl PatternKind {
    fn of(name: &str) -> PatternKind {
        match PatternName::from_str(name) {
            Ok(PatternName::Linear) => PatternKind::Linear,
            Ok(PatternName::LinearHi) => PatternKind::LinearHi,
            _ => PatternKind::Unsupported,
        }
    }

    /// The number of waveplate pairs the combination scheme works with, if
    /// it's supported.
    fn num_pairs(self) -> Option<usize> {
        match self {
            PatternKind::Linear => Some(2),
            PatternKind::LinearHi => Some(4),
            PatternKind::Unsupported => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub name: String,
    pub kind: PatternKind,
    /// The number of final Stokes parameters, including intensity.
    pub num_stokes: usize,
    /// Sorted.
    pub pair_codes: Vec<WaveplateCode>,
}

impl Pattern {
    pub fn num_pairs(&self) -> usize {
        self.pair_codes.len()
    }

    /// The index of a waveplate pair within this pattern.
    pub fn pair_index(&self, code: WaveplateCode) -> Option<usize> {
        self.pair_codes.iter().position(|&c| c == code)
    }
}

/// All patterns, keyed by (upper-case) name.
#[derive(Debug, Clone)]
pub struct PatternTable {
    patterns: IndexMap<String, Pattern>,
}

impl PatternTable {
    pub fn builtin() -> PatternTable {
        PatternTable::parse(BUILTIN_PATTERNS).expect("built-in pattern table is valid")
    }

    pub fn from_file(path: &Path) -> Result<PatternTable, PatternError> {
        debug!("Reading waveplate patterns from {}", path.display());
        PatternTable::parse(&read_to_string(path)?)
    }

    pub fn parse(s: &str) -> Result<PatternTable, PatternError> {
        let mut patterns = IndexMap::new();
        for (i_line, line) in s.lines().enumerate() {
            let line = line.split('#').next().unwrap_or_default();
            let words = line.split_whitespace().collect::<Vec<_>>();
            let (name, num_stokes, num_positions, codes) = match words.as_slice() {
                [] => continue,
                [name, num_stokes, num_positions, codes @ ..] => {
                    (*name, *num_stokes, *num_positions, codes)
                }
                _ => {
                    return Err(PatternError::Parse {
                        line: i_line + 1,
                        reason: "expected a name, the number of Stokes parameters, the number of waveplate positions and pair codes",
                    })
                }
            };
            let parse_usize = |w: &str, reason| {
                w.parse::<usize>().map_err(|_| PatternError::Parse {
                    line: i_line + 1,
                    reason,
                })
            };
            let num_stokes = parse_usize(num_stokes, "couldn't parse the number of Stokes parameters")?;
            let num_positions =
                parse_usize(num_positions, "couldn't parse the number of waveplate positions")?;
            if codes.len() != num_positions || codes.is_empty() || codes.len() % 2 != 0 {
                return Err(PatternError::Parse {
                    line: i_line + 1,
                    reason: "the number of waveplate positions doesn't match the pair codes",
                });
            }
            let mut pair_codes = codes
                .chunks(2)
                .map(|pair| {
                    let first = parse_usize(pair[0], "couldn't parse a waveplate position")?;
                    let second = parse_usize(pair[1], "couldn't parse a waveplate position")?;
                    match (u8::try_from(first), u8::try_from(second)) {
                        (Ok(a), Ok(b)) if a < 10 && b < 10 => Ok(WaveplateCode::new(a, b)),
                        _ => Err(PatternError::Parse {
                            line: i_line + 1,
                            reason: "waveplate positions must be single digits",
                        }),
                    }
                })
                .collect::<Result<Vec<_>, _>>()?;
            pair_codes.sort();

            let name = name.to_uppercase();
            let kind = PatternKind::of(&name);
            if let Some(expected) = kind.num_pairs() {
                if pair_codes.len() != expected {
                    return Err(PatternError::PairCount {
                        name,
                        expected,
                        got: pair_codes.len(),
                    });
                }
            }
            patterns.insert(
                name.clone(),
                Pattern {
                    name,
                    kind,
                    num_stokes,
                    pair_codes,
                },
            );
        }

        Ok(PatternTable { patterns })
    }

    pub fn get(&self, name: &str) -> Option<&Pattern> {
        self.patterns.get(&name.trim().to_uppercase())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.patterns.keys().map(|k| k.as_str())
    }
}

#[derive(Error, Debug)]
pub enum PatternError {
    #[error("Waveplate pattern table line {line}: {reason}")]
    Parse { line: usize, reason: &'static str },

    #[error("Waveplate pattern {name} needs {expected} pairs, but {got} were given")]
    PairCount {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error(transparent)]
    IO(#[from] std::io::Error),
}
