//! Fetch-decode-execute loop.
//!
//! Every run mode is built from single-instruction steps. Steps come in two
//! flavours that differ only in how the input opcode treats an empty input
//! channel: a *polling* step reports [`Step::AwaitingInput`] and leaves the
//! machine exactly where it was, while a *blocking* step waits on the channel
//! until a value arrives. [`Vm::step`] and [`Vm::resume`] poll;
//! [`Vm::run_until_halt`] and [`Vm::run_until_next_output`] block.

use crate::channel::{CancelToken, Channel};
use crate::decode::{decode_word, DecodeError, Instruction, Mode, Opcode, Param, HALT_WORD};
use crate::image::Program;
use crate::memory::Memory;
use thiserror::Error;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    #[error("invalid opcode {opcode} in word {word} at address {cursor}")]
    InvalidOpcode { opcode: i64, word: i64, cursor: usize },
    #[error("invalid addressing mode {mode} for operand {operand} at address {cursor}")]
    InvalidMode {
        mode: i64,
        operand: usize,
        cursor: usize,
    },
    #[error("write destination in immediate mode at address {cursor}")]
    InvalidDestination { cursor: usize },
    #[error("negative address {address} at address {cursor}")]
    NegativeAddress { address: i64, cursor: usize },
    #[error("instruction limit exceeded: {0}")]
    InstructionLimitExceeded(u64),
    #[error("cancelled while waiting for input at address {cursor}")]
    Cancelled { cursor: usize },
}

impl VmError {
    /// Address of the instruction that faulted, where one applies.
    pub fn cursor(&self) -> Option<usize> {
        match self {
            VmError::InvalidOpcode { cursor, .. }
            | VmError::InvalidMode { cursor, .. }
            | VmError::InvalidDestination { cursor }
            | VmError::NegativeAddress { cursor, .. }
            | VmError::Cancelled { cursor } => Some(*cursor),
            VmError::InstructionLimitExceeded(_) => None,
        }
    }

    fn from_decode(err: DecodeError, cursor: usize) -> Self {
        match err {
            DecodeError::InvalidOpcode { opcode, word } => VmError::InvalidOpcode {
                opcode,
                word,
                cursor,
            },
            DecodeError::InvalidMode { mode, operand, .. } => VmError::InvalidMode {
                mode,
                operand,
                cursor,
            },
        }
    }
}

/// Outcome of executing a single instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// An instruction ran and produced no output.
    Executed,
    /// An output instruction appended this value to the output channel.
    Output(i64),
    /// The input channel was empty; nothing changed.
    AwaitingInput,
    /// The cursor rests on the halt word.
    Halted,
}

/// Why a non-blocking run returned control to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Output(i64),
    AwaitingInput,
    Halted,
}

/// A resolved operand: either a literal value or a memory address.
///
/// Only addresses can be written through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operand {
    Value(i64),
    Address(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wait {
    Poll,
    Block,
}

/// An Intcode virtual machine.
#[derive(Debug)]
pub struct Vm {
    memory: Memory,
    cursor: usize,
    relative_base: i64,
    input: Channel,
    output: Channel,
    steps: u64,
    instruction_limit: Option<u64>,
    cancel: Option<CancelToken>,
}

impl Vm {
    /// Build a VM over a private copy of `image` with fresh channels.
    pub fn new(image: impl AsRef<[i64]>) -> Self {
        Self::with_channels(image, Channel::new(), Channel::new())
    }

    /// Build a VM that reads from `input` and writes to `output`.
    ///
    /// Pass a clone of another VM's output handle as `input` to chain them.
    pub fn with_channels(image: impl AsRef<[i64]>, input: Channel, output: Channel) -> Self {
        Self {
            memory: Memory::new(image.as_ref()),
            cursor: 0,
            relative_base: 0,
            input,
            output,
            steps: 0,
            instruction_limit: None,
            cancel: None,
        }
    }

    pub fn from_program(program: &Program) -> Self {
        Self::new(program.words())
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    /// Fail with [`VmError::InstructionLimitExceeded`] once `limit`
    /// instructions have executed.
    pub fn set_instruction_limit(&mut self, limit: u64) {
        self.instruction_limit = Some(limit);
    }

    /// Let a blocked input instruction give up when `token` is cancelled.
    pub fn set_cancel_token(&mut self, token: CancelToken) {
        self.cancel = Some(token);
    }

    // -----------------------------------------------------------------------
    // Inspection and mutation
    // -----------------------------------------------------------------------

    /// The machine is halted exactly when the word at the cursor is `99`.
    /// Recomputed on every call, so self-modification can halt it.
    pub fn is_halted(&self) -> bool {
        self.memory.load(self.cursor) == HALT_WORD
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn relative_base(&self) -> i64 {
        self.relative_base
    }

    /// Instructions executed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn memory(&self) -> &[i64] {
        self.memory.as_slice()
    }

    /// Read a cell without growing memory.
    pub fn peek(&self, addr: usize) -> i64 {
        self.memory.load(addr)
    }

    /// Overwrite a cell, growing memory if needed.
    pub fn poke(&mut self, addr: usize, value: i64) {
        self.memory.store(addr, value);
    }

    /// Cell 0, where single-shot programs conventionally leave their answer.
    pub fn first(&self) -> i64 {
        self.memory.load(0)
    }

    // -----------------------------------------------------------------------
    // I/O
    // -----------------------------------------------------------------------

    pub fn input(&self) -> &Channel {
        &self.input
    }

    pub fn output(&self) -> &Channel {
        &self.output
    }

    pub fn push_input(&self, value: i64) {
        self.input.push(value);
    }

    /// Discard queued input, returning how many values were dropped.
    pub fn clear_input(&self) -> usize {
        self.input.clear()
    }

    /// Number of output values not yet consumed.
    pub fn pending_output(&self) -> usize {
        self.output.len()
    }

    /// Remove and return every buffered output value.
    pub fn drain_output(&self) -> Vec<i64> {
        self.output.drain()
    }

    // -----------------------------------------------------------------------
    // Run modes
    // -----------------------------------------------------------------------

    /// Execute one instruction without blocking on input.
    pub fn step(&mut self) -> Result<Step, VmError> {
        self.step_with(Wait::Poll)
    }

    /// Run until the machine halts, blocking whenever input is empty.
    pub fn run_until_halt(&mut self) -> Result<(), VmError> {
        loop {
            if self.step_with(Wait::Block)? == Step::Halted {
                debug!(steps = self.steps, "halted");
                return Ok(());
            }
        }
    }

    /// Return the next output value, running the machine until it produces
    /// one. Blocks whenever input is empty.
    ///
    /// Values already waiting in the output channel are returned first, oldest
    /// first, without executing anything. Returns `None` once the machine has
    /// halted with nothing left to report.
    pub fn run_until_next_output(&mut self) -> Result<Option<i64>, VmError> {
        if let Some(value) = self.output.try_pop() {
            return Ok(Some(value));
        }
        loop {
            match self.step_with(Wait::Block)? {
                Step::Output(_) => {
                    if let Some(value) = self.output.try_pop() {
                        return Ok(Some(value));
                    }
                }
                Step::Halted => return Ok(None),
                Step::Executed | Step::AwaitingInput => {}
            }
        }
    }

    /// Run until the machine produces an output, halts, or needs input that
    /// is not there. Never blocks.
    ///
    /// Like [`run_until_next_output`](Vm::run_until_next_output), pending
    /// output is reported before anything executes.
    pub fn resume(&mut self) -> Result<Event, VmError> {
        if let Some(value) = self.output.try_pop() {
            return Ok(Event::Output(value));
        }
        loop {
            match self.step_with(Wait::Poll)? {
                Step::Output(_) => {
                    if let Some(value) = self.output.try_pop() {
                        return Ok(Event::Output(value));
                    }
                }
                Step::AwaitingInput => return Ok(Event::AwaitingInput),
                Step::Halted => return Ok(Event::Halted),
                Step::Executed => {}
            }
        }
    }

    // -----------------------------------------------------------------------
    // Executor
    // -----------------------------------------------------------------------

    /// Decode the instruction at the cursor. The cursor itself only moves
    /// once the instruction completes, so a fault leaves it on the faulting
    /// instruction.
    fn fetch(&mut self) -> Result<Instruction, VmError> {
        let start = self.cursor;
        let word = self.memory.load(start);
        let (opcode, modes) =
            decode_word(word).map_err(|err| VmError::from_decode(err, start))?;
        let mut params = [Param::default(); crate::decode::MAX_PARAMS];
        for (i, slot) in params.iter_mut().enumerate().take(opcode.arity()) {
            *slot = Param::new(self.memory.load(start + 1 + i), modes[i]);
        }
        Ok(Instruction::from_parts(opcode, params))
    }

    fn step_with(&mut self, wait: Wait) -> Result<Step, VmError> {
        if self.is_halted() {
            return Ok(Step::Halted);
        }
        if let Some(limit) = self.instruction_limit {
            if self.steps >= limit {
                return Err(VmError::InstructionLimitExceeded(limit));
            }
        }

        let result = self.execute(wait);
        if let Err(err) = &result {
            warn!(cursor = self.cursor, error = %err, "vm fault");
        }
        result
    }

    fn execute(&mut self, wait: Wait) -> Result<Step, VmError> {
        let start = self.cursor;
        let instr = self.fetch()?;
        trace!(cursor = start, op = %instr, "step");
        let next = start + instr.width();

        let outcome = match instr.opcode {
            Opcode::Add => {
                let dst = self.write_target(instr.param(2))?;
                let value = self
                    .read(instr.param(0))?
                    .wrapping_add(self.read(instr.param(1))?);
                self.memory.store(dst, value);
                Step::Executed
            }
            Opcode::Multiply => {
                let dst = self.write_target(instr.param(2))?;
                let value = self
                    .read(instr.param(0))?
                    .wrapping_mul(self.read(instr.param(1))?);
                self.memory.store(dst, value);
                Step::Executed
            }
            Opcode::Input => {
                let dst = self.write_target(instr.param(0))?;
                let value = match wait {
                    Wait::Poll => match self.input.try_pop() {
                        Some(value) => value,
                        None => {
                            debug!(cursor = start, "awaiting input");
                            return Ok(Step::AwaitingInput);
                        }
                    },
                    Wait::Block => self.pop_blocking()?,
                };
                self.memory.store(dst, value);
                Step::Executed
            }
            Opcode::Output => {
                let value = self.read(instr.param(0))?;
                self.output.push(value);
                Step::Output(value)
            }
            Opcode::JumpIfTrue | Opcode::JumpIfFalse => {
                let test = self.read(instr.param(0))?;
                let target = self.read(instr.param(1))?;
                let taken = (test != 0) == (instr.opcode == Opcode::JumpIfTrue);
                let dest = if taken {
                    Self::address(target, start)?
                } else {
                    next
                };
                self.steps += 1;
                self.cursor = dest;
                return Ok(Step::Executed);
            }
            Opcode::LessThan => {
                let dst = self.write_target(instr.param(2))?;
                let value = self.read(instr.param(0))? < self.read(instr.param(1))?;
                self.memory.store(dst, value as i64);
                Step::Executed
            }
            Opcode::Equals => {
                let dst = self.write_target(instr.param(2))?;
                let value = self.read(instr.param(0))? == self.read(instr.param(1))?;
                self.memory.store(dst, value as i64);
                Step::Executed
            }
            Opcode::AdjustRelativeBase => {
                let delta = self.read(instr.param(0))?;
                self.relative_base = self.relative_base.wrapping_add(delta);
                Step::Executed
            }
            // fetch only yields Halt for the bare halt word, which is_halted
            // already caught.
            Opcode::Halt => return Ok(Step::Halted),
        };

        self.steps += 1;
        self.cursor = next;
        Ok(outcome)
    }

    fn pop_blocking(&self) -> Result<i64, VmError> {
        let value = match &self.cancel {
            Some(token) => self.input.pop_cancellable(token),
            None => self.input.pop(),
        };
        value.ok_or(VmError::Cancelled {
            cursor: self.cursor,
        })
    }

    fn resolve(&self, param: Param) -> Result<Operand, VmError> {
        match param.mode {
            Mode::Position => Ok(Operand::Address(Self::address(param.raw, self.cursor)?)),
            Mode::Immediate => Ok(Operand::Value(param.raw)),
            Mode::Relative => Ok(Operand::Address(Self::address(
                self.relative_base.wrapping_add(param.raw),
                self.cursor,
            )?)),
        }
    }

    fn read(&self, param: Param) -> Result<i64, VmError> {
        match self.resolve(param)? {
            Operand::Value(value) => Ok(value),
            Operand::Address(addr) => Ok(self.memory.load(addr)),
        }
    }

    fn write_target(&self, param: Param) -> Result<usize, VmError> {
        match self.resolve(param)? {
            Operand::Address(addr) => Ok(addr),
            Operand::Value(_) => Err(VmError::InvalidDestination {
                cursor: self.cursor,
            }),
        }
    }

    fn address(raw: i64, cursor: usize) -> Result<usize, VmError> {
        usize::try_from(raw).map_err(|_| VmError::NegativeAddress {
            address: raw,
            cursor,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
