//! Intcode VM: a self-modifying integer machine with channel-based I/O.
//!
//! A [`Vm`] executes a program image over its own growable memory tape,
//! reading from an input [`Channel`] and appending to an output [`Channel`].
//! Several VMs can share channels to form pipelines; see [`pipeline`].

pub mod channel;
pub mod decode;
pub mod image;
pub mod memory;
pub mod pipeline;
pub mod vm;

pub use channel::{cancel_pair, CancelToken, Canceller, Channel};
pub use decode::{Instruction, Mode, Opcode, Param};
pub use image::{ImageError, Program};
pub use memory::Memory;
pub use pipeline::{spawn, Pipeline, PipelineError, PipelineRun};
pub use vm::{Event, Step, Vm, VmError};
