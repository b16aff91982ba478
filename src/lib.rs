// Copyright 2025 Pavel Roskin
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Terminal capabilities from `infocmp` source, without a terminfo library
//!
//! [`parse()`](parse::parse) turns the text printed by `infocmp` into a [`Terminfo`] with
//! all escapes resolved, [`expand()`] runs the `%` parameter language of a
//! capability, and [`Terminal`] ties both together for the built-in
//! `xterm-256color` database or any other dump.

pub mod expand;
pub mod parse;
pub mod terminal;

pub use expand::{ExpandContext, expand};
pub use parse::Terminfo;
pub use terminal::{BUILTIN_TERM, Terminal, setup_terminal, tparm};
