// Integration tests for continuous recognition: delayed restarts, error
// classes and the recognition/synthesis exclusion
//
// Timing tests run on a paused tokio clock.

mod common;

use common::started;
use interview_session::error::{RecognitionErrorKind, SessionError};
use interview_session::session::RecognitionState;
use proptest::prelude::*;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_unexpected_end_restarts_after_delay() {
    let mut h = started(2, 0).await;
    h.finish_speech();
    let starts = h.recognizer.starts();

    h.drop_recognition();
    assert_eq!(h.session.recognition_state(), RecognitionState::Restarting);
    assert!(h.session.restart_pending());

    h.session.run_for(Duration::from_millis(999)).await;
    assert_eq!(h.recognizer.starts(), starts, "no restart before the delay");

    h.session.run_for(Duration::from_millis(2)).await;
    assert_eq!(h.recognizer.starts(), starts + 1);
    assert_eq!(h.session.recognition_state(), RecognitionState::Listening);
    assert!(!h.session.restart_pending());
    assert_eq!(h.recognizer.last_lang().as_deref(), Some("ja-JP"));
}

#[tokio::test(start_paused = true)]
async fn test_not_allowed_is_sticky() {
    let mut h = started(2, 0).await;
    h.finish_speech();
    let starts = h.recognizer.starts();

    h.recognizer.emit_error(RecognitionErrorKind::NotAllowed);
    h.drop_recognition();

    assert!(!h.session.auto_restart());
    assert!(!h.session.recognition_enabled());
    assert_eq!(h.session.recognition_state(), RecognitionState::Stopped);
    assert_eq!(
        h.session.visible_error(),
        Some(&SessionError::Recognition(RecognitionErrorKind::NotAllowed))
    );

    h.session.run_for(Duration::from_secs(10)).await;
    assert_eq!(h.recognizer.starts(), starts, "never retried");

    // Reading the next question does not bring it back either
    h.session.advance_question().await.unwrap();
    h.session.pump();
    h.finish_speech();
    assert_eq!(h.session.recognition_state(), RecognitionState::Stopped);
    assert_eq!(h.recognizer.starts(), starts);

    // Only the user can turn it back on
    assert!(h.session.toggle_recognition().unwrap());
    h.session.pump();
    assert_eq!(h.session.recognition_state(), RecognitionState::Listening);
    assert!(h.session.auto_restart());
}

#[tokio::test(start_paused = true)]
async fn test_no_speech_changes_nothing() {
    let mut h = started(1, 0).await;
    h.finish_speech();
    let starts = h.recognizer.starts();

    h.recognizer.emit_error(RecognitionErrorKind::NoSpeech);
    h.session.pump();

    assert_eq!(h.session.recognition_state(), RecognitionState::Listening);
    assert!(!h.session.restart_pending());
    assert!(h.session.visible_error().is_none());

    h.session.run_for(Duration::from_secs(3)).await;
    assert_eq!(h.recognizer.starts(), starts);
}

#[tokio::test(start_paused = true)]
async fn test_aborted_then_end_restarts_exactly_once() {
    let mut h = started(1, 0).await;
    h.finish_speech();
    let starts = h.recognizer.starts();

    h.recognizer.emit_error(RecognitionErrorKind::Aborted);
    h.session.pump();
    assert!(h.session.restart_pending());

    h.drop_recognition();
    assert!(h.session.restart_pending());

    h.session.run_for(Duration::from_millis(1500)).await;
    assert_eq!(h.recognizer.starts(), starts + 1);
    assert_eq!(h.session.recognition_state(), RecognitionState::Listening);
}

#[tokio::test(start_paused = true)]
async fn test_other_errors_are_shown_and_retried() {
    let mut h = started(1, 0).await;
    h.finish_speech();
    let starts = h.recognizer.starts();

    h.recognizer.emit_error(RecognitionErrorKind::Other("network".to_string()));
    h.session.pump();

    assert_eq!(
        h.session.visible_error(),
        Some(&SessionError::Recognition(RecognitionErrorKind::Other(
            "network".to_string()
        )))
    );

    h.session.run_for(Duration::from_millis(1100)).await;
    assert_eq!(h.recognizer.starts(), starts + 1);
}

#[tokio::test(start_paused = true)]
async fn test_restarts_are_bounded() {
    let mut h = started(1, 0).await;
    h.finish_speech();
    let starts = h.recognizer.starts();

    for attempt in 1..=3 {
        h.drop_recognition();
        h.session.run_for(Duration::from_millis(1100)).await;
        assert_eq!(h.recognizer.starts(), starts + attempt);
    }

    h.drop_recognition();
    assert!(!h.session.auto_restart());
    assert!(!h.session.restart_pending());
    assert_eq!(h.session.recognition_state(), RecognitionState::Stopped);
    assert!(h.session.visible_error().is_some());

    h.session.run_for(Duration::from_secs(5)).await;
    assert_eq!(h.recognizer.starts(), starts + 3);

    // Not blocked, so a toggle brings it back
    assert!(h.session.toggle_recognition().unwrap());
    h.session.pump();
    assert_eq!(h.session.recognition_state(), RecognitionState::Listening);
    assert_eq!(h.recognizer.starts(), starts + 4);
}

#[tokio::test(start_paused = true)]
async fn test_restart_refused_as_not_allowed_is_sticky() {
    let mut h = started(1, 0).await;
    h.finish_speech();
    let starts = h.recognizer.starts();

    h.recognizer.refuse_next_start("not-allowed");
    h.drop_recognition();
    h.session.run_for(Duration::from_millis(1100)).await;

    assert_eq!(h.recognizer.starts(), starts);
    assert!(!h.session.recognition_enabled());
    assert!(!h.session.auto_restart());
    assert!(!h.session.restart_pending());
    assert_eq!(h.session.recognition_state(), RecognitionState::Stopped);
    assert_eq!(
        h.session.visible_error(),
        Some(&SessionError::Recognition(RecognitionErrorKind::NotAllowed))
    );

    h.session.run_for(Duration::from_secs(10)).await;
    assert_eq!(h.recognizer.starts(), starts, "never retried");
}

#[tokio::test(start_paused = true)]
async fn test_recognized_speech_resets_restart_budget() {
    let mut h = started(1, 0).await;
    h.finish_speech();
    let starts = h.recognizer.starts();

    for _ in 0..2 {
        h.drop_recognition();
        h.session.run_for(Duration::from_millis(1100)).await;
    }
    h.say("still here");

    for _ in 0..3 {
        h.drop_recognition();
        h.session.run_for(Duration::from_millis(1100)).await;
    }

    assert_eq!(h.recognizer.starts(), starts + 5);
    assert_eq!(h.session.recognition_state(), RecognitionState::Listening);
}

#[tokio::test(start_paused = true)]
async fn test_speaking_cancels_pending_restart() {
    let mut h = started(2, 0).await;
    h.finish_speech();

    h.drop_recognition();
    assert!(h.session.restart_pending());

    h.session.advance_question().await.unwrap();
    h.session.pump();
    assert!(!h.session.restart_pending());

    h.session.run_for(Duration::from_secs(2)).await;
    assert!(h.session.is_speaking());
    assert!(!h.recognizer.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_late_results_from_stopped_run_are_ignored() {
    let mut h = started(2, 0).await;
    h.finish_speech();
    let old_run = h.recognizer.handle().unwrap();

    h.session.advance_question().await.unwrap();
    h.session.pump();

    old_run.result(interview_session::media::RecognitionBatch::final_text("late words"));
    h.session.pump();
    assert!(h.session.transcript().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_user_can_turn_recognition_off() {
    let mut h = started(2, 0).await;
    h.finish_speech();

    assert!(!h.session.toggle_recognition().unwrap());
    h.session.pump();
    assert_eq!(h.session.recognition_state(), RecognitionState::Stopped);
    assert!(!h.recognizer.is_running());

    // Stays off across the next question
    h.session.advance_question().await.unwrap();
    h.session.pump();
    h.finish_speech();
    assert!(!h.recognizer.is_running());
    assert!(!h.session.view().recognition_enabled);
}

#[tokio::test(start_paused = true)]
async fn test_turning_recognition_off_while_question_is_read() {
    let mut h = started(2, 0).await;
    assert!(h.session.is_speaking());

    assert!(!h.session.toggle_recognition().unwrap());
    assert!(!h.session.recognition_enabled());

    h.finish_speech();
    assert!(!h.recognizer.is_running());
    assert_eq!(h.session.recognition_state(), RecognitionState::Stopped);

    assert!(h.session.toggle_recognition().unwrap());
    h.session.pump();
    assert_eq!(h.session.recognition_state(), RecognitionState::Listening);
}

#[tokio::test(start_paused = true)]
async fn test_speech_error_resumes_recognition() {
    let mut h = started(1, 0).await;

    h.synthesizer.fail("synthesis-failed");
    h.session.pump();

    assert!(!h.session.is_speaking());
    assert!(h.session.is_listening());
    assert_eq!(
        h.session.visible_error(),
        Some(&SessionError::Synthesis("synthesis-failed".to_string()))
    );
}

#[tokio::test(start_paused = true)]
async fn test_errors_clear_after_display_window() {
    let mut h = started(1, 0).await;
    h.finish_speech();

    h.recognizer.emit_error(RecognitionErrorKind::Other("network".to_string()));
    h.session.pump();
    assert!(h.session.visible_error().is_some());

    tokio::time::advance(Duration::from_secs(6)).await;
    assert!(h.session.visible_error().is_none());
    assert!(h.session.view().error.is_none());
}

// ============================================================================
// Recognition and synthesis never overlap
// ============================================================================

#[derive(Debug, Clone)]
enum Step {
    FinishSpeech,
    FailSpeech,
    Replay,
    Interim,
    Final,
    End,
    Error(u8),
    Advance,
    Toggle,
    Wait(u64),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::FinishSpeech),
        Just(Step::FailSpeech),
        Just(Step::Replay),
        Just(Step::Interim),
        Just(Step::Final),
        Just(Step::End),
        (0u8..4).prop_map(Step::Error),
        Just(Step::Advance),
        Just(Step::Toggle),
        (0u64..2500).prop_map(Step::Wait),
    ]
}

async fn apply(h: &mut common::Harness, step: Step) {
    match step {
        Step::FinishSpeech => h.synthesizer.finish(),
        Step::FailSpeech => h.synthesizer.fail("interrupted"),
        Step::Replay => {
            let _ = h.session.replay_question();
        }
        Step::Interim => h.recognizer.emit_interim("partial"),
        Step::Final => h.recognizer.emit_final("final words"),
        Step::End => h.recognizer.emit_end(),
        Step::Error(code) => h.recognizer.emit_error(match code {
            0 => RecognitionErrorKind::NotAllowed,
            1 => RecognitionErrorKind::NoSpeech,
            2 => RecognitionErrorKind::Aborted,
            _ => RecognitionErrorKind::Other("network".to_string()),
        }),
        Step::Advance => {
            let _ = h.session.advance_question().await;
        }
        Step::Toggle => {
            let _ = h.session.toggle_recognition();
        }
        Step::Wait(ms) => h.session.run_for(Duration::from_millis(ms)).await,
    }
    h.session.pump();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn never_listening_while_speaking(steps in prop::collection::vec(step(), 1..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap();

        runtime.block_on(async move {
            let mut h = started(2, 1).await;
            assert!(!(h.session.is_listening() && h.session.is_speaking()));

            for step in steps {
                apply(&mut h, step.clone()).await;
                assert!(
                    !(h.session.is_listening() && h.session.is_speaking()),
                    "controller listening while speaking after {:?}",
                    step
                );
                assert!(
                    !(h.recognizer.is_running() && h.synthesizer.is_speaking()),
                    "devices overlap after {:?}",
                    step
                );
            }
        });
    }
}
