//! Pipelines: several VMs running the same program, chained by channels.
//!
//! Stage `i` reads from channel `i` and writes to channel `i + 1`. With
//! feedback enabled the last stage writes back into channel 0, closing the
//! loop. Each stage can be given initial input (for example a phase setting)
//! that is queued ahead of anything its upstream produces.
//!
//! Two execution strategies are offered:
//!
//! * [`Pipeline::run_serial`] runs each stage to completion in order on the
//!   calling thread. Valid only for open chains, where a stage never needs
//!   input its successors produce.
//! * [`Pipeline::run_threaded`] runs every stage on its own OS thread and waits
//!   for all of them. A stage blocked on input blocks only its own thread. If
//!   any stage fails, the rest are cancelled so the wait cannot hang.
//!
//! [`Pipeline::run`] picks threaded execution when feedback is on.

use crate::channel::{cancel_pair, Channel};
use crate::image::Program;
use crate::vm::{Step, Vm, VmError};

use crossbeam_channel::{self as cb};
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline has no stages")]
    NoStages,
    #[error("stage {index} failed: {source}")]
    Stage {
        index: usize,
        #[source]
        source: VmError,
    },
    #[error("stage {index} panicked: {message}")]
    Panicked { index: usize, message: String },
    #[error("stage {index} is waiting for input no earlier stage will produce")]
    Starved { index: usize },
    #[error("failed to spawn thread for stage {index}: {message}")]
    Spawn { index: usize, message: String },
}

/// Result of a completed pipeline run.
#[derive(Debug)]
pub struct PipelineRun {
    /// Values left in the last stage's output channel, oldest first.
    pub output: Vec<i64>,
    /// The halted machines, in stage order.
    pub machines: Vec<Vm>,
}

impl PipelineRun {
    /// The last value the final stage produced.
    pub fn last_output(&self) -> Option<i64> {
        self.output.last().copied()
    }
}

/// Builder for a chain of VMs sharing one program image.
#[derive(Debug, Clone)]
pub struct Pipeline {
    program: Program,
    stages: Vec<Vec<i64>>,
    feedback: bool,
    instruction_limit: Option<u64>,
}

impl Pipeline {
    pub fn new(program: Program) -> Self {
        Self {
            program,
            stages: Vec::new(),
            feedback: false,
            instruction_limit: None,
        }
    }

    /// Append a stage whose input channel starts with `initial`.
    pub fn stage(mut self, initial: impl IntoIterator<Item = i64>) -> Self {
        self.stages.push(initial.into_iter().collect());
        self
    }

    /// Append one stage per value, each seeded with that single value.
    pub fn phases(mut self, phases: &[i64]) -> Self {
        self.stages.extend(phases.iter().map(|p| vec![*p]));
        self
    }

    /// Wire the last stage's output back into the first stage's input.
    pub fn feedback(mut self, enabled: bool) -> Self {
        self.feedback = enabled;
        self
    }

    /// Cap every stage at `limit` executed instructions.
    pub fn instruction_limit(mut self, limit: u64) -> Self {
        self.instruction_limit = Some(limit);
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run with the strategy that suits the topology.
    pub fn run(&self, seed: &[i64]) -> Result<PipelineRun, PipelineError> {
        if self.feedback {
            self.run_threaded(seed)
        } else {
            self.run_serial(seed)
        }
    }

    /// Build the machines and their channels. Returns the machines and the
    /// channel the last stage writes to.
    fn build(&self, seed: &[i64]) -> Result<(Vec<Vm>, Channel), PipelineError> {
        if self.stages.is_empty() {
            return Err(PipelineError::NoStages);
        }
        let n = self.stages.len();
        let mut channels: Vec<Channel> = (0..n).map(|_| Channel::new()).collect();
        let tail = if self.feedback {
            channels[0].clone()
        } else {
            Channel::new()
        };
        channels.push(tail.clone());

        for (chan, initial) in channels.iter().zip(&self.stages) {
            for value in initial {
                chan.push(*value);
            }
        }
        for value in seed {
            channels[0].push(*value);
        }

        let machines = (0..n)
            .map(|i| {
                let mut vm = Vm::with_channels(
                    self.program.words(),
                    channels[i].clone(),
                    channels[i + 1].clone(),
                );
                if let Some(limit) = self.instruction_limit {
                    vm.set_instruction_limit(limit);
                }
                vm
            })
            .collect();
        Ok((machines, tail))
    }

    /// Run each stage to completion in order on the calling thread.
    ///
    /// A stage that asks for input after its upstream has halted fails with
    /// [`PipelineError::Starved`] instead of blocking forever.
    pub fn run_serial(&self, seed: &[i64]) -> Result<PipelineRun, PipelineError> {
        let (mut machines, tail) = self.build(seed)?;
        for (index, vm) in machines.iter_mut().enumerate() {
            debug!(stage = index, "stage started");
            run_to_halt_polling(vm).map_err(|err| match err {
                StageFailure::Starved => PipelineError::Starved { index },
                StageFailure::Vm(source) => PipelineError::Stage { index, source },
            })?;
            debug!(stage = index, steps = vm.steps(), "stage halted");
        }
        Ok(PipelineRun {
            output: tail.drain(),
            machines,
        })
    }

    /// Run every stage on its own thread and wait for all of them.
    ///
    /// The first stage to fail cancels the others; its error is the one
    /// reported.
    pub fn run_threaded(&self, seed: &[i64]) -> Result<PipelineRun, PipelineError> {
        let (machines, tail) = self.build(seed)?;
        let n = machines.len();
        let (mut canceller, token) = cancel_pair();
        let (done_tx, done_rx) = cb::unbounded::<(usize, Result<(), StageFault>)>();

        let mut handles = Vec::with_capacity(n);
        for (index, mut vm) in machines.into_iter().enumerate() {
            vm.set_cancel_token(token.clone());
            let done = done_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("intcode-stage-{}", index))
                .spawn(move || {
                    debug!(stage = index, "stage started");
                    let result = panic::catch_unwind(AssertUnwindSafe(|| vm.run_until_halt()));
                    let report = match result {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(err)) => Err(StageFault::Vm(err)),
                        Err(payload) => Err(StageFault::Panic(panic_message(payload))),
                    };
                    let _ = done.send((index, report));
                    vm
                });
            match handle {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    canceller.cancel();
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(PipelineError::Spawn {
                        index,
                        message: err.to_string(),
                    });
                }
            }
        }
        drop(done_tx);

        let mut first_error: Option<PipelineError> = None;
        for _ in 0..n {
            let Ok((index, report)) = done_rx.recv() else {
                break;
            };
            match report {
                Ok(()) => debug!(stage = index, "stage halted"),
                Err(fault) => {
                    canceller.cancel();
                    let is_cancel = matches!(fault, StageFault::Vm(VmError::Cancelled { .. }));
                    let err = fault.into_error(index);
                    if !is_cancel {
                        error!(stage = index, error = %err, "stage failed");
                    }
                    // A cancellation is a consequence, not a cause.
                    let replace = match &first_error {
                        None => true,
                        Some(prev) => is_cancellation(prev) && !is_cancel,
                    };
                    if replace {
                        first_error = Some(err);
                    }
                }
            }
        }

        let mut finished = Vec::with_capacity(n);
        for (index, handle) in handles.into_iter().enumerate() {
            match handle.join() {
                Ok(vm) => finished.push(vm),
                Err(payload) => {
                    return Err(PipelineError::Panicked {
                        index,
                        message: panic_message(payload),
                    })
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(PipelineRun {
                output: tail.drain(),
                machines: finished,
            }),
        }
    }
}

/// Run a single VM on its own named thread until it halts.
///
/// The handle yields the machine back along with how the run ended, so the
/// caller can inspect its memory after joining.
pub fn spawn(mut vm: Vm, name: &str) -> std::io::Result<JoinHandle<(Vm, Result<(), VmError>)>> {
    thread::Builder::new().name(name.to_string()).spawn(move || {
        let result = vm.run_until_halt();
        (vm, result)
    })
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

enum StageFailure {
    Starved,
    Vm(VmError),
}

enum StageFault {
    Vm(VmError),
    Panic(String),
}

impl StageFault {
    fn into_error(self, index: usize) -> PipelineError {
        match self {
            StageFault::Vm(source) => PipelineError::Stage { index, source },
            StageFault::Panic(message) => PipelineError::Panicked { index, message },
        }
    }
}

fn is_cancellation(err: &PipelineError) -> bool {
    matches!(
        err,
        PipelineError::Stage {
            source: VmError::Cancelled { .. },
            ..
        }
    )
}

/// Drive a VM to halt without ever blocking on input. Output stays in the
/// VM's output channel for the next stage.
fn run_to_halt_polling(vm: &mut Vm) -> Result<(), StageFailure> {
    loop {
        match vm.step().map_err(StageFailure::Vm)? {
            Step::Halted => return Ok(()),
            Step::AwaitingInput => return Err(StageFailure::Starved),
            Step::Executed | Step::Output(_) => {}
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const AMP_OPEN: [i64; 17] = [
        3, 15, 3, 16, 1002, 16, 10, 16, 1, 16, 15, 15, 4, 15, 99, 0, 0,
    ];

    const AMP_FEEDBACK: [i64; 29] = [
        3, 26, 1001, 26, -4, 26, 3, 27, 1002, 27, 2, 27, 1, 27, 26, 27, 4, 27, 1001, 28, -1, 28,
        1005, 28, 6, 99, 0, 0, 5,
    ];

    #[test]
    fn serial_chain() {
        let run = Pipeline::new(Program::from(AMP_OPEN.to_vec()))
            .phases(&[4, 3, 2, 1, 0])
            .run(&[0])
            .unwrap();
        assert_eq!(run.output, vec![43210]);
        assert_eq!(run.machines.len(), 5);
        assert!(run.machines.iter().all(Vm::is_halted));
    }

    #[test]
    fn threaded_open_chain_matches_serial() {
        let pipeline = Pipeline::new(Program::from(AMP_OPEN.to_vec())).phases(&[4, 3, 2, 1, 0]);
        let serial = pipeline.run_serial(&[0]).unwrap();
        let threaded = pipeline.run_threaded(&[0]).unwrap();
        assert_eq!(serial.output, threaded.output);
    }

    #[test]
    fn feedback_loop() {
        let run = Pipeline::new(Program::from(AMP_FEEDBACK.to_vec()))
            .phases(&[9, 8, 7, 6, 5])
            .feedback(true)
            .run(&[0])
            .unwrap();
        assert_eq!(run.last_output(), Some(139629729));
    }

    #[test]
    fn no_stages() {
        let err = Pipeline::new(Program::from(vec![99])).run(&[]).unwrap_err();
        assert!(matches!(err, PipelineError::NoStages));
    }

    #[test]
    fn serial_starvation_is_reported() {
        // Each stage wants two inputs but only receives one.
        let err = Pipeline::new(Program::from(vec![3, 0, 3, 0, 99]))
            .stage([])
            .run_serial(&[1])
            .unwrap_err();
        assert!(matches!(err, PipelineError::Starved { index: 0 }));
    }

    #[test]
    fn failing_stage_cancels_the_rest() {
        // Stage 0 faults immediately; stage 1 would wait on it forever.
        let program = Program::from(vec![3, 20, 1, 20, 20, 21, 42, 99]);
        let err = Pipeline::new(program)
            .stage([])
            .stage([])
            .feedback(true)
            .run_threaded(&[5])
            .unwrap_err();
        match err {
            PipelineError::Stage { index, source } => {
                assert_eq!(index, 0);
                assert!(matches!(source, VmError::InvalidOpcode { opcode: 42, .. }));
            }
            other => panic!("expected stage failure, got {:?}", other),
        }
    }

    #[test]
    fn instruction_limit_applies_per_stage() {
        let err = Pipeline::new(Program::from(vec![1105, 1, 0]))
            .stage([])
            .instruction_limit(10)
            .run_serial(&[])
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Stage {
                index: 0,
                source: VmError::InstructionLimitExceeded(10)
            }
        ));
    }

    #[test]
    fn spawn_returns_the_machine() {
        let vm = Vm::new([1101, 2, 3, 0, 99]);
        let (vm, result) = spawn(vm, "solo").unwrap().join().unwrap();
        result.unwrap();
        assert_eq!(vm.first(), 5);
    }
}
