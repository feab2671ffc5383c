//! Multi-VM topologies: shared channels, threads, and feedback loops.

use intcode_vm::{spawn, Channel, Pipeline, PipelineError, Program, Vm};

/// Reads forever, echoing each value. Never halts on its own.
const FORWARD: [i64; 6] = [3, 100, 4, 100, 1105, 1];

/// Reads three values, echoing each, then halts.
fn forward_three() -> Vec<i64> {
    vec![3, 100, 4, 100, 3, 100, 4, 100, 3, 100, 4, 100, 99]
}

#[test]
fn output_channel_is_next_input() {
    let a_out = Channel::new();
    let mut a = Vm::with_channels(forward_three(), Channel::new(), a_out.clone());
    let mut b = Vm::with_channels(forward_three(), a_out.clone(), Channel::new());
    assert!(a.output().same_channel(b.input()));

    for v in [1, 2, 3] {
        a.push_input(v);
    }
    a.run_until_halt().unwrap();
    b.run_until_halt().unwrap();
    assert_eq!(b.drain_output(), vec![1, 2, 3]);
    assert!(a_out.is_empty());
}

#[test]
fn threaded_hand_off_preserves_order() {
    let link = Channel::new();
    let sink = Channel::new();
    let a = Vm::with_channels(forward_three(), Channel::new(), link.clone());
    let b = Vm::with_channels(forward_three(), link, sink.clone());
    let feed = a.input().clone();

    // Start the consumer first so it is blocked on an empty channel.
    let hb = spawn(b, "consumer").unwrap();
    let ha = spawn(a, "producer").unwrap();
    for v in [1, 2, 3] {
        feed.push(v);
    }
    let (_, ra) = ha.join().unwrap();
    let (b, rb) = hb.join().unwrap();
    ra.unwrap();
    rb.unwrap();
    assert!(b.is_halted());
    assert_eq!(sink.drain(), vec![1, 2, 3]);
}

#[test]
fn forwarding_loop_machine_can_be_stepped() {
    let mut vm = Vm::new(FORWARD);
    vm.push_input(9);
    assert_eq!(vm.run_until_next_output().unwrap(), Some(9));
    assert!(!vm.is_halted());
}

#[test]
fn amplifier_chain_serial() {
    let program = Program::parse(
        "3,23,3,24,1002,24,10,24,1002,23,-1,23,101,5,23,23,1,24,23,23,4,23,99,0,0",
    )
    .unwrap();
    let run = Pipeline::new(program).phases(&[0, 1, 2, 3, 4]).run(&[0]).unwrap();
    assert_eq!(run.output, vec![54321]);
}

#[test]
fn amplifier_feedback_threaded() {
    let program = Program::parse(
        "3,52,1001,52,-5,52,3,53,1,52,56,54,1007,54,5,55,1005,55,26,1001,54,\
-5,54,1105,1,12,1,53,54,53,1008,54,0,55,1001,55,1,55,2,53,55,53,4,\
53,1001,56,-1,56,1005,56,6,99,0,0,0,0,10",
    )
    .unwrap();
    let run = Pipeline::new(program)
        .phases(&[9, 7, 8, 5, 6])
        .feedback(true)
        .run(&[0])
        .unwrap();
    assert_eq!(run.last_output(), Some(18216));
    assert!(run.machines.iter().all(Vm::is_halted));
}

#[test]
fn best_phase_order_search() {
    let program = Program::parse("3,15,3,16,1002,16,10,16,1,16,15,15,4,15,99,0,0").unwrap();
    let mut best = i64::MIN;
    let mut phases = [0, 1, 2, 3, 4];
    permute(&mut phases, 0, &mut |p| {
        let run = Pipeline::new(program.clone()).phases(p).run(&[0]).unwrap();
        best = best.max(run.last_output().unwrap());
    });
    assert_eq!(best, 43210);
}

#[test]
fn stage_failure_is_reported() {
    let program = Program::from(vec![3, 0, 4, 0, 12]);
    let err = Pipeline::new(program)
        .stage([])
        .stage([])
        .feedback(true)
        .run(&[1])
        .unwrap_err();
    assert!(matches!(err, PipelineError::Stage { .. }));
    assert!(err.to_string().contains("invalid opcode 12"));
}

fn permute(items: &mut [i64], k: usize, visit: &mut dyn FnMut(&[i64])) {
    if k == items.len() {
        visit(items);
        return;
    }
    for i in k..items.len() {
        items.swap(k, i);
        permute(items, k + 1, visit);
        items.swap(k, i);
    }
}
