// Copyright 2025 Pavel Roskin
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Capability lookup and expansion for one terminal

use std::{env, fs, io, path::Path};

use tracing::debug;

use crate::{
    expand::{self, ExpandContext},
    parse::{self, Terminfo},
};

/// Terminal described by the built-in database
pub const BUILTIN_TERM: &str = "xterm-256color";

/// Environment variable with the path of an `infocmp` dump to use instead
/// of the built-in database
pub const SOURCE_VARIABLE: &str = "TERMINFO_SOURCE";

// terminfo data obtained with: infocmp xterm-256color
const BUILTIN_SOURCE: &str = include_str!("../data/xterm-256color.ti");

/// Errors reported when loading a terminal database
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The database file could not be read
    #[error("I/O error")]
    IO(#[from] io::Error),
    /// The database source is malformed
    #[error("Invalid terminfo source: {0}")]
    Parse(#[from] parse::Error),
}

/// Capabilities of one terminal
#[derive(Debug, Clone)]
pub struct Terminal {
    terminfo: Terminfo,
}

impl Terminal {
    pub const fn new(terminfo: Terminfo) -> Self {
        Self { terminfo }
    }

    /// Terminal from the built-in `xterm-256color` database
    pub fn builtin() -> Result<Self, parse::Error> {
        Self::from_source(BUILTIN_SOURCE)
    }

    /// Terminal from `infocmp` output
    pub fn from_source(source: &str) -> Result<Self, parse::Error> {
        Ok(Self::new(Terminfo::parse(source)?))
    }

    /// Terminal from a file with `infocmp` output
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let source = fs::read_to_string(path)?;
        Ok(Self::from_source(&source)?)
    }

    /// Terminal from the file named by `TERMINFO_SOURCE`, or the built-in one
    ///
    /// An empty variable is treated as unset.
    pub fn from_env() -> Result<Self, Error> {
        match env::var_os(SOURCE_VARIABLE) {
            Some(path) if !path.is_empty() => {
                debug!(path = ?path, "loading terminfo source");
                Self::from_file(path)
            }
            _ => Ok(Self::builtin()?),
        }
    }

    pub const fn terminfo(&self) -> &Terminfo {
        &self.terminfo
    }

    /// Raw string capability, `None` if the terminal does not support it
    pub fn get_capability(&self, name: &str) -> Option<&[u8]> {
        self.terminfo.get_string(name)
    }

    /// Expand the capability `name` with `params`
    ///
    /// Returns `Ok(None)` if the terminal does not have the capability.
    /// Variables set by `%P` are discarded afterwards.
    pub fn evaluate(
        &self,
        name: &str,
        params: &[i32],
    ) -> Result<Option<Vec<u8>>, expand::Error> {
        self.evaluate_with(&mut ExpandContext::new(), name, params)
    }

    /// Like [`Terminal::evaluate`], but variables persist in `context`
    pub fn evaluate_with(
        &self,
        context: &mut ExpandContext,
        name: &str,
        params: &[i32],
    ) -> Result<Option<Vec<u8>>, expand::Error> {
        self.get_capability(name)
            .map(|cap| context.expand(cap, params))
            .transpose()
    }
}

/// Prepare the terminal on `fd` for output
///
/// Present for parity with curses `setupterm()`. The terminal type is not
/// queried, so there is nothing to do.
pub const fn setup_terminal(_term_name: &str, _fd: i32) {}

/// Expand a raw capability template, see [`expand::expand`]
pub fn tparm(cap: &[u8], params: &[i32]) -> Result<Vec<u8>, expand::Error> {
    expand::expand(cap, params)
}
