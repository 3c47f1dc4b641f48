// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the session state machine

use digicam::session::{Mode, SessionPhase, SessionState};

#[test]
fn busy_session_rejects_every_second_operation() {
    let mut state = SessionState::new();
    state.set_mode(Mode::Video).unwrap();
    let generation = state.begin_stream().unwrap();

    // While starting: no capture, no second start, no mode switch
    assert!(state.begin_photo_capture().is_err());
    assert!(state.begin_stream().is_err());
    assert!(state.set_mode(Mode::Photo).is_err());

    state.stream_started(generation);

    // While active: same rejections
    assert!(state.begin_photo_capture().is_err());
    assert!(state.begin_stream().is_err());
    assert!(state.set_mode(Mode::Photo).is_err());
}

#[test]
fn rejected_operations_have_no_side_effects() {
    let mut state = SessionState::new();
    let generation = state.begin_photo_capture().unwrap();
    let before = state.generation();

    let _ = state.begin_stream();
    let _ = state.begin_photo_capture();

    assert_eq!(state.generation(), before);
    assert_eq!(state.phase(), SessionPhase::CapturingPhoto);

    // The original operation still completes normally
    assert!(state.complete_photo_capture(generation));
}

#[test]
fn stop_on_stopped_session_is_a_no_op() {
    let mut state = SessionState::new();

    // Idle: stop accepted but reports nothing to kill
    assert_eq!(state.begin_stop().unwrap(), false);
    assert_eq!(state.phase(), SessionPhase::Idle(Mode::Photo));

    // After a full start/stop cycle, the same holds
    state.set_mode(Mode::Video).unwrap();
    let generation = state.begin_stream().unwrap();
    state.stream_started(generation);
    assert!(state.begin_stop().unwrap());
    state.stop_complete();

    assert_eq!(state.begin_stop().unwrap(), false);
    assert_eq!(state.phase(), SessionPhase::Idle(Mode::Video));
}

#[test]
fn completion_of_cancelled_start_is_ignored() {
    let mut state = SessionState::new();
    let generation = state.begin_stream().unwrap();

    // User stops while the helper is still starting
    assert!(state.begin_stop().unwrap());
    state.stop_complete();

    // The helper's late success must not resurrect the stream
    assert!(!state.stream_started(generation));
    assert!(!state.stream_failed(generation));
    assert_eq!(state.phase(), SessionPhase::Idle(Mode::Video));
}

#[test]
fn phases_report_their_mode() {
    assert_eq!(SessionPhase::CapturingPhoto.mode(), Mode::Photo);
    assert_eq!(SessionPhase::StartingStream.mode(), Mode::Video);
    assert_eq!(SessionPhase::StreamActive.mode(), Mode::Video);
    assert_eq!(SessionPhase::Stopping.mode(), Mode::Video);
    assert_eq!(SessionPhase::Idle(Mode::Photo).mode(), Mode::Photo);
}

#[test]
fn only_idle_counts_as_not_busy() {
    assert!(!SessionPhase::Idle(Mode::Photo).is_busy());
    assert!(!SessionPhase::Idle(Mode::Video).is_busy());
    assert!(SessionPhase::CapturingPhoto.is_busy());
    assert!(SessionPhase::StartingStream.is_busy());
    assert!(SessionPhase::StreamActive.is_busy());
    assert!(SessionPhase::Stopping.is_busy());
}
