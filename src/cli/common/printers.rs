// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Pretty printers for reporting information.

use std::{borrow::Cow, sync::Mutex};

use log::Level;

const VERTICAL: char = '│';
const UP_AND_RIGHT: char = '└';
const VERTICAL_AND_RIGHT: char = '├';

lazy_static::lazy_static! {
    static ref WARNING_PRINTER: Mutex<Vec<Vec<Cow<'static, str>>>> = Mutex::new(vec![]);
}

/// Log a bold title, then blocks of lines joined by box-drawing characters.
fn display_blocks(level: Level, title: &str, blocks: &[Vec<Cow<'static, str>>]) {
    log::log!(level, "{}", console::style(title).bold());
    let num_blocks = blocks.len();
    for (i_block, block) in blocks.iter().enumerate() {
        let num_lines = block.len();
        for (i_line, line) in block.iter().enumerate() {
            let symbol = match (i_line, i_line + 1 == num_lines, i_block + 1 == num_blocks) {
                (0, false, _) => VERTICAL_AND_RIGHT,
                (0, _, false) => VERTICAL_AND_RIGHT,
                (0, true, true) => UP_AND_RIGHT,
                _ => VERTICAL,
            };
            log::log!(level, "{symbol} {line}");
        }
    }
    log::log!(level, "");
}

pub(crate) struct InfoPrinter {
    title: Cow<'static, str>,
    blocks: Vec<Vec<Cow<'static, str>>>,
}

impl InfoPrinter {
    pub(crate) fn new(title: Cow<'static, str>) -> Self {
        Self {
            title,
            blocks: vec![],
        }
    }

    pub(crate) fn push_line(&mut self, line: Cow<'static, str>) {
        self.blocks.push(vec![line]);
    }

    pub(crate) fn push_block(&mut self, block: Vec<Cow<'static, str>>) {
        if !block.is_empty() {
            self.blocks.push(block);
        }
    }

    pub(crate) fn display(self) {
        display_blocks(Level::Info, &self.title, &self.blocks);
    }
}

/// Warnings are collected while arguments are parsed and exposures are read,
/// and displayed together.
pub(crate) trait Warn {
    fn warn(self);
}

impl Warn for &'static str {
    fn warn(self) {
        WARNING_PRINTER.lock().unwrap().push(vec![self.into()]);
    }
}

impl Warn for String {
    fn warn(self) {
        WARNING_PRINTER.lock().unwrap().push(vec![self.into()]);
    }
}

impl Warn for Cow<'static, str> {
    fn warn(self) {
        WARNING_PRINTER.lock().unwrap().push(vec![self]);
    }
}

impl Warn for Vec<Cow<'static, str>> {
    fn warn(self) {
        WARNING_PRINTER.lock().unwrap().push(self);
    }
}

/// Print out any warnings that have been collected, then forget them.
pub(crate) fn display_warnings() {
    log::debug!("Displaying warnings");
    let mut blocks = WARNING_PRINTER.lock().unwrap();
    if blocks.is_empty() {
        return;
    }
    display_blocks(Level::Warn, "Warnings", &blocks);
    blocks.clear();
}
