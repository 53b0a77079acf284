//! Queue discipline tests
//!
//! Drive the full submission/polling state machine through the software
//! scheduler channel: no hardware required.

use ert_driver::{ensure_completed, CommandQueue, ErtError, PollResult, SimChannel};
use ert_proto::{CmdState, ConfigureCommand, PacketHeader, RegisterMap, StartKernelCommand};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(1);

fn configure_words() -> Vec<u32> {
    ConfigureCommand::new(1024, 16, vec![0x1800_0000, 0x1801_0000])
        .build()
        .unwrap()
}

fn start_words() -> Vec<u32> {
    let mut regmap = RegisterMap::new();
    regmap.set(0x0, 0).unwrap();
    regmap.set_arg64(0x40, 0x0000_bbbb_aaaa_0000).unwrap();
    StartKernelCommand::new(0x1, regmap).build().unwrap()
}

#[test]
fn configure_completes_and_retires() {
    let mut queue = CommandQueue::new(SimChannel::new(8, 4096));
    let words = configure_words();
    let sub = queue.submit(&words).unwrap();
    assert_eq!(queue.outstanding(), 1);

    let state = queue.wait(&sub, TIMEOUT).unwrap();
    assert_eq!(state, CmdState::Completed);

    let retired = queue.retire(sub).unwrap();
    assert_eq!(queue.outstanding(), 0);
    // Identical to what was submitted apart from the state nibble.
    assert_eq!(retired.len(), words.len());
    assert_eq!(&retired[1..], &words[1..]);
    assert_eq!(
        PacketHeader::decode(retired[0]).cmd_state(),
        Some(CmdState::Completed)
    );
}

#[test]
fn one_poll_may_cover_many_completions() {
    let mut queue = CommandQueue::new(SimChannel::new(8, 4096));
    let cfg = queue.submit(&configure_words()).unwrap();
    queue.wait(&cfg, TIMEOUT).unwrap();
    queue.retire(cfg).unwrap();

    // Two independent commands in flight at once.
    let a = queue.submit(&start_words()).unwrap();
    let b = queue.submit(&start_words()).unwrap();
    assert_eq!(queue.outstanding(), 2);

    // A single positive poll never says which command finished, nor how
    // many: both must be re-checked individually.
    assert_eq!(queue.poll(TIMEOUT).unwrap(), PollResult::Ready);
    assert_eq!(queue.state(&a).unwrap(), CmdState::Completed);
    assert_eq!(queue.state(&b).unwrap(), CmdState::Completed);

    queue.retire(a).unwrap();
    queue.retire(b).unwrap();
}

#[test]
fn wait_rescans_under_completion_lag() {
    let mut queue = CommandQueue::new(SimChannel::new(8, 4096).with_completion_lag(3));
    let sub = queue.submit(&configure_words()).unwrap();
    // Not yet terminal: the first polls come back empty.
    assert_eq!(queue.state(&sub).unwrap(), CmdState::Running);
    let state = queue.wait(&sub, TIMEOUT).unwrap();
    assert_eq!(state, CmdState::Completed);
}

#[test]
fn wait_deadline_elapses_on_hung_command() {
    let mut queue = CommandQueue::new(SimChannel::new(8, 4096));
    queue.channel_mut().hang_next();
    let sub = queue.submit(&configure_words()).unwrap();

    let err = queue.wait(&sub, Duration::from_millis(20)).unwrap_err();
    assert!(matches!(err, ErtError::Timeout { .. }));

    // The slot stays pinned; only a device reset would free it.
    assert_eq!(queue.outstanding(), 1);
    assert!(matches!(
        queue.retire(sub),
        Err(ErtError::InvalidState { .. })
    ));
}

#[test]
fn queue_full_rejects_submission() {
    let mut queue = CommandQueue::new(SimChannel::new(1, 4096).with_completion_lag(10));
    let _held = queue.submit(&configure_words()).unwrap();
    let err = queue.submit(&configure_words()).unwrap_err();
    assert!(matches!(err, ErtError::Submission { .. }));
}

#[test]
fn header_count_mismatch_rejected() {
    let mut queue = CommandQueue::new(SimChannel::new(8, 4096));
    let mut words = configure_words();
    words.push(0xdead_beef); // no longer matches the header count
    let err = queue.submit(&words).unwrap_err();
    assert!(matches!(err, ErtError::Submission { .. }));
}

#[test]
fn oversized_command_rejected() {
    let mut queue = CommandQueue::new(SimChannel::new(8, 256));
    // 2 + 5 + 64 words > 256 bytes
    let words = ConfigureCommand::new(1024, 16, vec![0x1000; 64]).build().unwrap();
    let err = queue.submit(&words).unwrap_err();
    assert!(matches!(err, ErtError::Submission { .. }));
}

#[test]
fn start_before_configure_reports_device_error() {
    let mut queue = CommandQueue::new(SimChannel::new(8, 4096));
    let sub = queue.submit(&start_words()).unwrap();
    let state = queue.wait(&sub, TIMEOUT).unwrap();
    assert_eq!(state, CmdState::Error);
    assert!(matches!(
        ensure_completed(state),
        Err(ErtError::Device {
            state: CmdState::Error
        })
    ));
    queue.retire(sub).unwrap();
}

#[test]
fn return_code_readable_after_completion() {
    let mut queue = CommandQueue::new(SimChannel::new(8, 4096));
    let cfg = queue.submit(&configure_words()).unwrap();
    queue.wait(&cfg, TIMEOUT).unwrap();
    queue.retire(cfg).unwrap();

    let sub = queue.submit(&start_words()).unwrap();
    // In flight: no return code yet.
    assert!(queue.return_code(&sub).is_err());
    queue.wait(&sub, TIMEOUT).unwrap();
    assert_eq!(queue.return_code(&sub).unwrap(), 0);
    queue.retire(sub).unwrap();
}

#[test]
fn slot_reuse_after_retire() {
    let mut queue = CommandQueue::new(SimChannel::new(1, 4096));
    for _ in 0..3 {
        let sub = queue.submit(&configure_words()).unwrap();
        queue.wait(&sub, TIMEOUT).unwrap();
        queue.retire(sub).unwrap();
    }
    assert_eq!(queue.outstanding(), 0);
}
