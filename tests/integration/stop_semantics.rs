//! Stop, restart, and shutdown behaviour of the assistant lifecycle.

use crate::helpers::{HarnessBuilder, Stalled, harness};
use lara::intent::IntentClassifier;
use lara::services::SilentSpeech;
use lara::{AssistantEvent, AssistantState, ClassifierChain};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent_in_every_state() {
    let h = harness();
    h.assistant.stop();
    assert_eq!(h.assistant.state(), AssistantState::Stopped);

    h.assistant.start();
    h.wait_for_state(AssistantState::WakeListening).await;
    h.assistant.stop();
    h.assistant.stop();
    assert_eq!(h.assistant.state(), AssistantState::Stopped);
    assert!(!h.assistant.is_running());
}

#[tokio::test(start_paused = true)]
async fn concurrent_stops_from_shared_handles() {
    let h = harness();
    h.assistant.start();
    h.feed.say("hey lara");
    h.wait_for_state(AssistantState::CommandListening).await;

    let stops: Vec<_> = (0..8)
        .map(|_| {
            let assistant = Arc::clone(&h.assistant);
            tokio::spawn(async move { assistant.stop() })
        })
        .collect();
    for stop in stops {
        stop.await.unwrap();
    }

    assert_eq!(h.assistant.state(), AssistantState::Stopped);
    assert!(!h.assistant.is_running());

    // Still startable afterwards.
    assert!(h.assistant.start());
    h.wait_for_state(AssistantState::WakeListening).await;
    h.assistant.stop();
}

#[tokio::test(start_paused = true)]
async fn stop_during_classification_discards_the_command() {
    let stalled = Stalled::new();
    let tier: Arc<dyn IntentClassifier> = stalled.clone();
    let mut h = HarnessBuilder::new()
        .classifier(ClassifierChain::new(vec![tier]))
        .build();
    h.assistant.start();
    h.speak_command("go to reminders page");

    h.wait_for_state(AssistantState::Classifying).await;
    h.assistant.stop();
    assert_eq!(h.assistant.state(), AssistantState::Stopped);

    // Give any stray continuation a chance to run.
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(stalled.calls(), 1);
    assert_eq!(h.assistant.state(), AssistantState::Stopped);
    assert!(h.navigator.visited().is_empty());
    let routed = h.drain().into_iter().any(|e| {
        matches!(
            e,
            AssistantEvent::ActionCompleted(_) | AssistantEvent::Navigated { .. }
        )
    });
    assert!(!routed, "nothing may be routed after stop");
}

#[tokio::test(start_paused = true)]
async fn stop_during_command_capture_releases_microphone() {
    let mut h = harness();
    h.assistant.start();
    h.feed.say("hey lara");
    h.wait_for_state(AssistantState::CommandListening).await;

    h.assistant.stop();
    tokio::time::sleep(Duration::from_secs(30)).await;

    // A command spoken after the stop must not be picked up by the dead session.
    h.feed.say("show my tasks");
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(h.navigator.visited().is_empty());
    let captured = h
        .drain()
        .into_iter()
        .any(|e| matches!(e, AssistantEvent::CommandCaptured { .. }));
    assert!(!captured);
    assert_eq!(h.assistant.state(), AssistantState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_speech_in_progress() {
    let mut h = HarnessBuilder::new()
        .speech(SilentSpeech::new().with_speaking_time(Duration::from_secs(60)))
        .build();
    h.assistant.start();
    h.speak_command("play some jazz");

    h.next_matching(|e| matches!(e, AssistantEvent::ActionCompleted(_)))
        .await;
    // Let the lifecycle reach the confirmation.
    tokio::task::yield_now().await;
    h.assistant.stop();

    assert!(h.speech.cancel_count() >= 1);
    assert_eq!(h.assistant.state(), AssistantState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn activation_cancelled_by_stop_does_not_fire_on_next_start() {
    let mut h = harness();
    h.assistant.start();
    h.wait_for_state(AssistantState::WakeListening).await;

    assert!(h.assistant.activate());
    h.assistant.stop();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(h.assistant.start());
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(h.assistant.state(), AssistantState::WakeListening);
    let woke = h
        .drain()
        .into_iter()
        .any(|e| matches!(e, AssistantEvent::WakeDetected { .. }));
    assert!(!woke, "a stopped activation must not wake the next lifecycle");

    // Fresh activations still work.
    assert!(h.assistant.activate());
    h.next_matching(|e| matches!(e, AssistantEvent::WakeDetected { transcript: None }))
        .await;
    h.assistant.stop();
}

#[tokio::test(start_paused = true)]
async fn restart_returns_to_wake_listening() {
    let mut h = harness();
    h.assistant.start();
    h.wait_for_state(AssistantState::WakeListening).await;

    assert!(h.assistant.restart().await);
    assert_eq!(h.assistant.state(), AssistantState::WakeListening);

    h.speak_command("open settings");
    h.next_matching(|e| matches!(e, AssistantEvent::Navigated { .. }))
        .await;
    assert_eq!(h.navigator.visited(), vec!["/settings"]);
    h.assistant.stop();
}

#[tokio::test(start_paused = true)]
async fn state_changes_are_published_in_order() {
    let mut h = harness();
    h.assistant.start();
    h.speak_command("show my tasks");
    h.next_matching(|e| matches!(e, AssistantEvent::Navigated { .. }))
        .await;
    h.wait_for_state(AssistantState::WakeListening).await;
    h.assistant.stop();

    let transitions: Vec<AssistantState> = h
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            AssistantEvent::StateChanged { to, .. } => Some(to),
            _ => None,
        })
        .collect();
    assert_eq!(
        transitions,
        vec![AssistantState::WakeListening, AssistantState::Stopped]
    );
}

#[tokio::test(start_paused = true)]
async fn dropping_the_assistant_stops_it() {
    let h = harness();
    h.assistant.start();
    h.wait_for_state(AssistantState::WakeListening).await;

    let mut state = h.assistant.watch_state();
    drop(h);
    // The sender lives inside the assistant; its final value is Stopped.
    assert_eq!(*state.borrow_and_update(), AssistantState::Stopped);
}
