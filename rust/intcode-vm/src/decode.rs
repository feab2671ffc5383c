//! Instruction decoding.
//!
//! An instruction word packs the opcode into its low two decimal digits and
//! one addressing-mode digit per operand above that: the hundreds digit
//! governs operand 1, the thousands digit operand 2, and the ten-thousands
//! digit operand 3. Missing digits read as position mode.

use std::fmt;
use thiserror::Error;

/// The word that halts the machine.
pub const HALT_WORD: i64 = 99;

/// Widest operand list of any opcode.
pub const MAX_PARAMS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid opcode {opcode} in instruction word {word}")]
    InvalidOpcode { opcode: i64, word: i64 },
    #[error("invalid addressing mode {mode} for operand {operand} in instruction word {word}")]
    InvalidMode { mode: i64, operand: usize, word: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Add,
    Multiply,
    Input,
    Output,
    JumpIfTrue,
    JumpIfFalse,
    LessThan,
    Equals,
    AdjustRelativeBase,
    Halt,
}

impl Opcode {
    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            1 => Self::Add,
            2 => Self::Multiply,
            3 => Self::Input,
            4 => Self::Output,
            5 => Self::JumpIfTrue,
            6 => Self::JumpIfFalse,
            7 => Self::LessThan,
            8 => Self::Equals,
            9 => Self::AdjustRelativeBase,
            99 => Self::Halt,
            _ => return None,
        })
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Add => 1,
            Self::Multiply => 2,
            Self::Input => 3,
            Self::Output => 4,
            Self::JumpIfTrue => 5,
            Self::JumpIfFalse => 6,
            Self::LessThan => 7,
            Self::Equals => 8,
            Self::AdjustRelativeBase => 9,
            Self::Halt => 99,
        }
    }

    /// Number of operand words following the instruction word.
    pub fn arity(self) -> usize {
        match self {
            Self::Add | Self::Multiply | Self::LessThan | Self::Equals => 3,
            Self::JumpIfTrue | Self::JumpIfFalse => 2,
            Self::Input | Self::Output | Self::AdjustRelativeBase => 1,
            Self::Halt => 0,
        }
    }

    /// Index of the operand the instruction writes to, if any.
    pub fn destination(self) -> Option<usize> {
        match self {
            Self::Add | Self::Multiply | Self::LessThan | Self::Equals => Some(2),
            Self::Input => Some(0),
            _ => None,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Multiply => "mul",
            Self::Input => "in",
            Self::Output => "out",
            Self::JumpIfTrue => "jnz",
            Self::JumpIfFalse => "jz",
            Self::LessThan => "lt",
            Self::Equals => "eq",
            Self::AdjustRelativeBase => "arb",
            Self::Halt => "halt",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Operand addressing mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Mode {
    /// The raw value is a memory address.
    #[default]
    Position,
    /// The raw value is the operand itself. Never writable.
    Immediate,
    /// The raw value plus the relative base is a memory address.
    Relative,
}

impl Mode {
    pub fn from_digit(digit: i64) -> Option<Self> {
        match digit {
            0 => Some(Self::Position),
            1 => Some(Self::Immediate),
            2 => Some(Self::Relative),
            _ => None,
        }
    }
}

/// One operand: the raw word following the instruction and its mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Param {
    pub raw: i64,
    pub mode: Mode,
}

impl Param {
    pub fn new(raw: i64, mode: Mode) -> Self {
        Self { raw, mode }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            Mode::Position => write!(f, "[{}]", self.raw),
            Mode::Immediate => write!(f, "{}", self.raw),
            Mode::Relative => write!(f, "[rb{:+}]", self.raw),
        }
    }
}

/// A fully decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    params: [Param; MAX_PARAMS],
}

impl Instruction {
    pub(crate) fn from_parts(opcode: Opcode, params: [Param; MAX_PARAMS]) -> Self {
        Self { opcode, params }
    }

    /// Operands in order; the slice is exactly `opcode.arity()` long.
    pub fn params(&self) -> &[Param] {
        &self.params[..self.opcode.arity()]
    }

    pub fn param(&self, index: usize) -> Param {
        self.params[index]
    }

    /// Words occupied by this instruction, including the instruction word.
    pub fn width(&self) -> usize {
        1 + self.opcode.arity()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        for (i, param) in self.params().iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{}{}", sep, param)?;
        }
        Ok(())
    }
}

/// Split an instruction word into its opcode and the modes of its operands.
///
/// Only the mode digits the opcode actually consumes are validated. The halt
/// opcode is recognised only as the bare word `99`.
pub fn decode_word(word: i64) -> Result<(Opcode, [Mode; MAX_PARAMS]), DecodeError> {
    let code = word % 100;
    let opcode = Opcode::from_code(code)
        .filter(|op| *op != Opcode::Halt || word == HALT_WORD)
        .ok_or(DecodeError::InvalidOpcode { opcode: code, word })?;

    let mut modes = [Mode::Position; MAX_PARAMS];
    let mut digits = word / 100;
    for (operand, slot) in modes.iter_mut().enumerate().take(opcode.arity()) {
        let digit = digits % 10;
        *slot = Mode::from_digit(digit).ok_or(DecodeError::InvalidMode {
            mode: digit,
            operand: operand + 1,
            word,
        })?;
        digits /= 10;
    }
    Ok((opcode, modes))
}

/// Decode the instruction starting at `words[0]`, reading operand words from
/// the rest of the slice. Operand words past the end of the slice read as 0.
pub fn decode_at(words: &[i64]) -> Result<Instruction, DecodeError> {
    let word = words.first().copied().unwrap_or(0);
    let (opcode, modes) = decode_word(word)?;
    let mut params = [Param::default(); MAX_PARAMS];
    for (i, slot) in params.iter_mut().enumerate().take(opcode.arity()) {
        let raw = words.get(i + 1).copied().unwrap_or(0);
        *slot = Param::new(raw, modes[i]);
    }
    Ok(Instruction::from_parts(opcode, params))
}

/// One line of a static listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingEntry {
    Instruction { addr: usize, instruction: Instruction },
    Data { addr: usize, value: i64 },
}

impl fmt::Display for ListingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListingEntry::Instruction { addr, instruction } => {
                write!(f, "{:>6}  {}", addr, instruction)
            }
            ListingEntry::Data { addr, value } => write!(f, "{:>6}  .data {}", addr, value),
        }
    }
}

/// Linear sweep over a program image.
///
/// Words that decode as a complete instruction are listed as instructions;
/// everything else is listed as a single data word. Programs modify
/// themselves, so this reflects only the initial image.
pub fn listing(words: &[i64]) -> Vec<ListingEntry> {
    let mut entries = Vec::new();
    let mut addr = 0;
    while addr < words.len() {
        match decode_at(&words[addr..]) {
            Ok(instruction) if addr + instruction.width() <= words.len() => {
                entries.push(ListingEntry::Instruction { addr, instruction });
                addr += instruction.width();
            }
            _ => {
                entries.push(ListingEntry::Data {
                    addr,
                    value: words[addr],
                });
                addr += 1;
            }
        }
    }
    entries
}
