// Copyright 2019 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Parameterized string expansion
//!
//! Capability templates embed a small stack language introduced by `%`.
//! Expansion scans the template once, copies literal bytes to the output and
//! decodes every `%` sequence into an operator before executing it.

use std::{collections::BTreeMap, iter::repeat_n, ops::ControlFlow};

use tracing::trace;

/// Reasons for an expansion to fail
#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone, Copy)]
#[non_exhaustive]
pub enum ErrorKind {
    #[error("Not enough stack elements for operator {0}")]
    StackUnderflow(char),
    #[error("Invalid parameter index: {0}")]
    InvalidParameterIndex(char),
    #[error("Missing operand for operator {0}")]
    MissingOperand(char),
    #[error("Malformed character constant")]
    MalformedCharacterConstant,
    #[error("Integer constant too large")]
    IntegerConstantOverflow,
    #[error("Integer constant malformed")]
    MalformedIntegerConstant,
    #[error("Format without conversion character")]
    UnterminatedFormat,
    #[error("Unrecognized format option: {0}")]
    UnrecognizedFormatOption(char),
    #[error("Overflow in format width")]
    FormatWidthOverflow,
    #[error("Overflow in format precision")]
    FormatPrecisionOverflow,
    #[error("Unknown operator: {0}")]
    UnknownOperator(char),
    #[error("Division by zero in operator {0}")]
    DivisionByZero(char),
    #[error("Operator {0} outside of a conditional")]
    UnbalancedConditional(char),
}

/// Error reported when expanding a string
///
/// Output produced before the failure is discarded.
#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone)]
#[error("{kind} at offset {offset} in \"{template}\"")]
pub struct Error {
    pub kind: ErrorKind,
    /// Offset of the `%` that introduced the failing operator
    pub offset: usize,
    /// The template with non-printable bytes escaped
    pub template: String,
}

impl Error {
    fn new(kind: ErrorKind, offset: usize, template: &[u8]) -> Self {
        Self {
            kind,
            offset,
            template: template.escape_ascii().to_string(),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    BitAnd,
    BitOr,
    BitXor,
    Equal,
    Greater,
    Less,
    And,
    Or,
}

impl BinaryOp {
    const fn from_selector(selector: u8) -> Option<Self> {
        Some(match selector {
            b'+' => Self::Add,
            b'-' => Self::Subtract,
            b'*' => Self::Multiply,
            b'/' => Self::Divide,
            b'm' => Self::Modulo,
            b'&' => Self::BitAnd,
            b'|' => Self::BitOr,
            b'^' => Self::BitXor,
            b'=' => Self::Equal,
            b'>' => Self::Greater,
            b'<' => Self::Less,
            b'A' => Self::And,
            b'O' => Self::Or,
            _ => return None,
        })
    }

    /// Returns `None` when dividing by zero
    fn apply(self, x: i32, y: i32) -> Option<i32> {
        Some(match self {
            Self::Divide | Self::Modulo if y == 0 => return None,
            Self::Add => x.wrapping_add(y),
            Self::Subtract => x.wrapping_sub(y),
            Self::Multiply => x.wrapping_mul(y),
            // Both truncate toward zero, the remainder takes the sign of `x`.
            Self::Divide => x.wrapping_div(y),
            Self::Modulo => x.wrapping_rem(y),
            Self::BitAnd => x & y,
            Self::BitOr => x | y,
            Self::BitXor => x ^ y,
            Self::Equal => i32::from(x == y),
            Self::Greater => i32::from(x > y),
            Self::Less => i32::from(x < y),
            Self::And => i32::from(x != 0 && y != 0),
            Self::Or => i32::from(x != 0 || y != 0),
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Conversion {
    Decimal,
    Octal,
    Hex,
    UpperHex,
    String,
}

impl Conversion {
    const fn letter(self) -> char {
        match self {
            Self::Decimal => 'd',
            Self::Octal => 'o',
            Self::Hex => 'x',
            Self::UpperHex => 'X',
            Self::String => 's',
        }
    }
}

#[derive(Copy, PartialEq, Eq, Clone, Debug)]
enum FormatState {
    Flags,
    Width,
    Precision,
}

#[derive(Copy, PartialEq, Eq, Clone, Default, Debug)]
struct Flags {
    width: u16,
    precision: Option<u16>,
    alternate: bool,
    left: bool,
    sign: bool,
    space: bool,
    zero: bool,
}

/// One decoded `%` sequence
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Op {
    Percent,
    Char,
    PrintIf,
    Length,
    Binary(BinaryOp),
    Not,
    Complement,
    PushParam(usize),
    SetVar(u8),
    GetVar(u8),
    Constant(i32),
    Increment,
    If,
    Then,
    Else,
    EndIf,
    Format(Flags, Conversion),
}

/// Decode the operator whose selector byte is at `start`
///
/// Returns the operator and the offset of the first byte after it.
/// Operators in branches that are not taken are decoded and checked too.
fn decode(template: &[u8], start: usize) -> Result<(Op, usize), ErrorKind> {
    let selector = template[start];
    let cur = char::from(selector);
    let operand = || {
        template
            .get(start + 1)
            .copied()
            .ok_or(ErrorKind::MissingOperand(cur))
    };
    let op = match selector {
        b'%' => Op::Percent,
        b'c' => Op::Char,
        b's' => Op::PrintIf,
        b'l' => Op::Length,
        b'!' => Op::Not,
        b'~' => Op::Complement,
        b'i' => Op::Increment,
        b'?' => Op::If,
        b't' => Op::Then,
        b'e' => Op::Else,
        b';' => Op::EndIf,
        b'p' => {
            // params are 1-indexed
            let index = operand()?;
            return match index {
                b'1'..=b'9' => Ok((Op::PushParam(usize::from(index - b'1')), start + 2)),
                _ => Err(ErrorKind::InvalidParameterIndex(char::from(index))),
            };
        }
        b'P' => return Ok((Op::SetVar(operand()?), start + 2)),
        b'g' => return Ok((Op::GetVar(operand()?), start + 2)),
        b'\'' => {
            let value = operand()?;
            if template.get(start + 2) != Some(&b'\'') {
                return Err(ErrorKind::MalformedCharacterConstant);
            }
            return Ok((Op::Constant(i32::from(value)), start + 3));
        }
        b'{' => return decode_integer(template, start + 1),
        b':' | b'#' | b' ' | b'.' | b'0'..=b'9' | b'd' | b'o' | b'x' | b'X' => {
            return decode_format(template, start);
        }
        _ => match BinaryOp::from_selector(selector) {
            Some(op) => Op::Binary(op),
            None => return Err(ErrorKind::UnknownOperator(cur)),
        },
    };
    Ok((op, start + 1))
}

/// Decode `%{n}`, `start` is the offset just past the opening brace
fn decode_integer(template: &[u8], start: usize) -> Result<(Op, usize), ErrorKind> {
    let Some(length) = template[start..].iter().position(|&c| c == b'}') else {
        return Err(ErrorKind::MalformedIntegerConstant);
    };
    let text = &template[start..start + length];
    let (negative, digits) = match text.split_first() {
        Some((b'-', rest)) => (true, rest),
        Some((b'+', rest)) => (false, rest),
        _ => (false, text),
    };
    if digits.is_empty() {
        return Err(ErrorKind::MalformedIntegerConstant);
    }
    let mut value: i32 = 0;
    for &digit in digits {
        if !digit.is_ascii_digit() {
            return Err(ErrorKind::MalformedIntegerConstant);
        }
        let digit = i32::from(digit - b'0');
        value = value
            .checked_mul(10)
            .and_then(|ten| {
                if negative {
                    ten.checked_sub(digit)
                } else {
                    ten.checked_add(digit)
                }
            })
            .ok_or(ErrorKind::IntegerConstantOverflow)?;
    }
    Ok((Op::Constant(value), start + length + 1))
}

/// Decode a printf-style format, `start` is the offset of the byte after `%`
fn decode_format(template: &[u8], start: usize) -> Result<(Op, usize), ErrorKind> {
    // `%:` lets the `-` and `+` flags through without being read as operators.
    let spec_start = if template[start] == b':' {
        start + 1
    } else {
        start
    };
    let Some(length) = template[spec_start..]
        .iter()
        .position(|c| b"doxXs".contains(c))
    else {
        return Err(ErrorKind::UnterminatedFormat);
    };
    let end = spec_start + length;
    let conversion = match template[end] {
        b'd' => Conversion::Decimal,
        b'o' => Conversion::Octal,
        b'x' => Conversion::Hex,
        b'X' => Conversion::UpperHex,
        _ => Conversion::String,
    };

    let mut flags = Flags::default();
    let mut fstate = FormatState::Flags;
    for &c in &template[spec_start..end] {
        match (fstate, c) {
            (FormatState::Flags, b'#') => flags.alternate = true,
            (FormatState::Flags, b'-') => flags.left = true,
            (FormatState::Flags, b'+') => flags.sign = true,
            (FormatState::Flags, b' ') => flags.space = true,
            (FormatState::Flags, b'0') => flags.zero = true,
            (FormatState::Flags, b'1'..=b'9') | (FormatState::Width, b'0'..=b'9') => {
                flags.width = flags
                    .width
                    .checked_mul(10)
                    .and_then(|w| w.checked_add(u16::from(c - b'0')))
                    .ok_or(ErrorKind::FormatWidthOverflow)?;
                fstate = FormatState::Width;
            }
            (FormatState::Flags | FormatState::Width, b'.') => {
                flags.precision = Some(0);
                fstate = FormatState::Precision;
            }
            (FormatState::Precision, b'0'..=b'9') => {
                flags.precision = Some(
                    flags
                        .precision
                        .unwrap_or(0)
                        .checked_mul(10)
                        .and_then(|p| p.checked_add(u16::from(c - b'0')))
                        .ok_or(ErrorKind::FormatPrecisionOverflow)?,
                );
            }
            _ => return Err(ErrorKind::UnrecognizedFormatOption(char::from(c))),
        }
    }
    Ok((Op::Format(flags, conversion), end + 1))
}

/// State of one open `%?` block
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Branch {
    /// Evaluating a condition, output follows the enclosing blocks
    Condition,
    /// Condition held, output enabled
    Then,
    /// Condition failed, waiting for `%e`
    Wait,
    /// A branch was taken, the rest of the block is suppressed
    Skip,
}

/// Transient state of a single expansion
struct Machine {
    stack: Vec<i32>,
    params: Vec<i32>,
    branches: Vec<Branch>,
    active: bool,
    output: Vec<u8>,
}

impl Machine {
    fn new(params: &[i32], capacity: usize) -> Self {
        Self {
            stack: Vec::new(),
            params: params.to_vec(),
            branches: Vec::new(),
            active: true,
            // expanded cap will only rarely be larger than the cap itself
            output: Vec::with_capacity(capacity),
        }
    }

    fn emit(&mut self, bytes: &[u8]) {
        if self.active {
            self.output.extend_from_slice(bytes);
        }
    }

    fn pop(&mut self, cur: char) -> Result<i32, ErrorKind> {
        self.stack.pop().ok_or(ErrorKind::StackUnderflow(cur))
    }

    /// Parameters that were not supplied read as 0
    fn param(&self, index: usize) -> i32 {
        self.params.get(index).copied().unwrap_or(0)
    }

    fn branch(&mut self, op: Op, cur: char) -> Result<(), ErrorKind> {
        match op {
            Op::If => self.branches.push(Branch::Condition),
            Op::EndIf => {
                if self.branches.pop().is_none() {
                    return Err(ErrorKind::UnbalancedConditional(cur));
                }
            }
            Op::Then => {
                if self.branches.is_empty() {
                    return Err(ErrorKind::UnbalancedConditional(cur));
                }
                if self.active {
                    let next = if self.pop(cur)? != 0 {
                        Branch::Then
                    } else {
                        Branch::Wait
                    };
                    if let Some(branch) = self.branches.last_mut() {
                        *branch = next;
                    }
                }
            }
            Op::Else => {
                let Some(branch) = self.branches.last_mut() else {
                    return Err(ErrorKind::UnbalancedConditional(cur));
                };
                match *branch {
                    // else-if: the rest of the block is tested again
                    Branch::Wait => *branch = Branch::Condition,
                    Branch::Then => *branch = Branch::Skip,
                    Branch::Condition | Branch::Skip => {}
                }
            }
            _ => {}
        }
        self.active = self
            .branches
            .iter()
            .all(|branch| matches!(branch, Branch::Condition | Branch::Then));
        Ok(())
    }

    /// Run one operator, breaking when a NUL character ends the output
    fn execute(
        &mut self,
        op: Op,
        cur: char,
        variables: &mut BTreeMap<u8, i32>,
    ) -> Result<ControlFlow<()>, ErrorKind> {
        match op {
            Op::If | Op::Then | Op::Else | Op::EndIf => self.branch(op, cur)?,
            _ if !self.active => {}
            Op::Percent => self.output.push(b'%'),
            Op::Char => {
                // 0 is sent as 0200 (128), a NUL would end the string
                let value = self.pop(cur)?;
                let byte = if value == 0 { 0x80 } else { value as u8 };
                if byte == 0 {
                    return Ok(ControlFlow::Break(()));
                }
                self.output.push(byte);
            }
            Op::PrintIf => {
                if self.pop(cur)? != 0 {
                    let value = self.pop(cur)?;
                    self.output.extend(value.to_string().bytes());
                }
            }
            Op::Length => {
                let value = self.pop(cur)?;
                self.stack.push(value.to_string().len() as i32);
            }
            Op::Binary(binary) => {
                let y = self.pop(cur)?;
                let x = self.pop(cur)?;
                let result = binary
                    .apply(x, y)
                    .ok_or(ErrorKind::DivisionByZero(cur))?;
                self.stack.push(result);
            }
            Op::Not => {
                let value = self.pop(cur)?;
                self.stack.push(i32::from(value == 0));
            }
            Op::Complement => {
                let value = self.pop(cur)?;
                self.stack.push(!value);
            }
            Op::PushParam(index) => {
                let value = self.param(index);
                self.stack.push(value);
            }
            Op::SetVar(name) => {
                let value = self.pop(cur)?;
                variables.insert(name, value);
            }
            Op::GetVar(name) => self
                .stack
                .push(variables.get(&name).copied().unwrap_or(0)),
            Op::Constant(value) => self.stack.push(value),
            Op::Increment => {
                let row = self.param(0).wrapping_add(1);
                let column = self.param(1).wrapping_add(1);
                if self.params.len() < 2 {
                    self.params.resize(2, 0);
                }
                self.params[0] = row;
                self.params[1] = column;
                self.stack.push(row);
                self.stack.push(column);
            }
            Op::Format(flags, conversion) => {
                let value = self.pop(conversion.letter())?;
                self.output.extend(format(value, conversion, flags));
            }
        }
        Ok(ControlFlow::Continue(()))
    }
}

/// Context for variable expansion
///
/// Holds the variables set by `%P` and read by `%g`. Every expansion through
/// the same context sees the variables left by the previous ones; use
/// [`expand`] or a new context to start from an empty store.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExpandContext {
    variables: BTreeMap<u8, i32>,
}

impl ExpandContext {
    /// Return a newly initialized ExpandContext
    pub const fn new() -> Self {
        Self {
            variables: BTreeMap::new(),
        }
    }

    /// Value of the variable `name`, 0 if it was never set
    pub fn variable(&self, name: u8) -> i32 {
        self.variables.get(&name).copied().unwrap_or(0)
    }

    pub fn set_variable(&mut self, name: u8, value: i32) {
        self.variables.insert(name, value);
    }

    /// Forget all variables
    pub fn clear(&mut self) {
        self.variables.clear();
    }

    /// Expand a parameterized capability
    ///
    /// # Arguments
    /// * `cap`    - string to expand
    /// * `params` - parameters for %p1 etc, missing ones read as 0
    pub fn expand(&mut self, cap: &[u8], params: &[i32]) -> Result<Vec<u8>, Error> {
        let mut machine = Machine::new(params, cap.len());
        let mut pos = 0;
        while pos < cap.len() {
            let Some(length) = cap[pos..].iter().position(|&c| c == b'%') else {
                machine.emit(&cap[pos..]);
                break;
            };
            let percent = pos + length;
            machine.emit(&cap[pos..percent]);

            // a lone `%` at the very end is dropped
            let Some(&selector) = cap.get(percent + 1) else {
                break;
            };
            let (op, next) =
                decode(cap, percent + 1).map_err(|kind| Error::new(kind, percent, cap))?;
            match machine.execute(op, char::from(selector), &mut self.variables) {
                Ok(ControlFlow::Continue(())) => {}
                Ok(ControlFlow::Break(())) => {
                    trace!(offset = percent, "NUL character ends the expansion");
                    break;
                }
                Err(kind) => return Err(Error::new(kind, percent, cap)),
            }
            pos = next;
        }
        Ok(machine.output)
    }
}

/// Expand a parameterized capability with an empty variable store
pub fn expand(cap: &[u8], params: &[i32]) -> Result<Vec<u8>, Error> {
    ExpandContext::new().expand(cap, params)
}

/// Format like C `printf`, unsigned conversions see the 32-bit pattern of `val`
fn format(val: i32, conversion: Conversion, flags: Flags) -> Vec<u8> {
    let unsigned = val as u32;
    let (prefix, mut digits) = match conversion {
        Conversion::Decimal => {
            let sign = if val < 0 {
                "-"
            } else if flags.sign {
                "+"
            } else if flags.space {
                " "
            } else {
                ""
            };
            (sign, val.unsigned_abs().to_string())
        }
        Conversion::Octal => ("", format!("{unsigned:o}")),
        Conversion::Hex => (
            if flags.alternate && unsigned != 0 {
                "0x"
            } else {
                ""
            },
            format!("{unsigned:x}"),
        ),
        Conversion::UpperHex => (
            if flags.alternate && unsigned != 0 {
                "0X"
            } else {
                ""
            },
            format!("{unsigned:X}"),
        ),
        Conversion::String => {
            let mut text = val.to_string();
            if let Some(precision) = flags.precision {
                text.truncate(usize::from(precision));
            }
            return pad("", &text, flags, false);
        }
    };
    if let Some(precision) = flags.precision.map(usize::from) {
        // zero with zero precision prints no digits
        if precision == 0 && unsigned == 0 {
            digits.clear();
        }
        if digits.len() < precision {
            digits.insert_str(0, &"0".repeat(precision - digits.len()));
        }
    }
    // Leading octal zero counts against precision.
    if conversion == Conversion::Octal && flags.alternate && !digits.starts_with('0') {
        digits.insert(0, '0');
    }
    pad(prefix, &digits, flags, flags.zero && flags.precision.is_none())
}

fn pad(prefix: &str, digits: &str, flags: Flags, zero_fill: bool) -> Vec<u8> {
    let length = prefix.len() + digits.len();
    let n = usize::from(flags.width).saturating_sub(length);
    let mut s = Vec::with_capacity(length + n);
    if flags.left {
        s.extend(prefix.bytes());
        s.extend(digits.bytes());
        s.extend(repeat_n(b' ', n));
    } else if zero_fill {
        s.extend(prefix.bytes());
        s.extend(repeat_n(b'0', n));
        s.extend(digits.bytes());
    } else {
        s.extend(repeat_n(b' ', n));
        s.extend(prefix.bytes());
        s.extend(digits.bytes());
    }
    s
}
