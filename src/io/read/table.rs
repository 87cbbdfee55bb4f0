// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Whitespace-separated numeric tables, as used for calibration curves.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use thiserror::Error;

/// Read the first `num_columns` columns of a numeric text table. Blank lines
/// and everything after a '#' are ignored. "nan" is a valid value. The
/// returned vector is indexed by column.
pub(crate) fn read_table(path: &Path, num_columns: usize) -> Result<Vec<Vec<f64>>, TableReadError> {
    let f = BufReader::new(File::open(path)?);
    let mut columns = vec![vec![]; num_columns];
    for (i_line, line) in f.lines().enumerate() {
        let line = line?;
        let line = match line.split_once('#') {
            Some((data, _comment)) => data,
            None => line.as_str(),
        };
        let words = line.split_whitespace().collect::<Vec<_>>();
        if words.is_empty() {
            continue;
        }
        if words.len() < num_columns {
            return Err(TableReadError::TooFewColumns {
                path: path.display().to_string(),
                line: i_line + 1,
                expected: num_columns,
                got: words.len(),
            });
        }

        for (column, word) in columns.iter_mut().zip(words) {
            let value = word.parse().map_err(|_| TableReadError::Parse {
                path: path.display().to_string(),
                line: i_line + 1,
                word: word.to_string(),
            })?;
            column.push(value);
        }
    }

    if columns[0].is_empty() {
        return Err(TableReadError::Empty {
            path: path.display().to_string(),
        });
    }
    Ok(columns)
}

#[derive(Error, Debug)]
pub enum TableReadError {
    #[error("'{path}' line {line}: expected at least {expected} columns, got {got}")]
    TooFewColumns {
        path: String,
        line: usize,
        expected: usize,
        got: usize,
    },

    #[error("'{path}' line {line}: couldn't parse '{word}' as a number")]
    Parse {
        path: String,
        line: usize,
        word: String,
    },

    #[error("'{path}' contains no data")]
    Empty { path: String },

    #[error(transparent)]
    IO(#[from] std::io::Error),
}
