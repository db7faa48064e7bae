//! End-to-end command scenarios through the scripted microphone.

use crate::helpers::{HarnessBuilder, harness};
use lara::intent::{Intent, IntentSource};
use lara::runtime::WriteKind;
use lara::services::InMemoryTaskStore;
use lara::{AssistantEvent, AssistantState};

#[tokio::test(start_paused = true)]
async fn wake_then_play_music_uses_offline_classifier() {
    let mut h = harness();
    h.assistant.start();
    h.speak_command("play telugu songs");

    let event = h
        .next_matching(|e| matches!(e, AssistantEvent::IntentClassified(_)))
        .await;
    let AssistantEvent::IntentClassified(classified) = event else {
        unreachable!()
    };
    assert_eq!(
        classified.intent,
        Intent::PlayMusic {
            query: "telugu songs".to_owned()
        }
    );
    assert_eq!(classified.source, IntentSource::Fallback);

    let event = h
        .next_matching(|e| matches!(e, AssistantEvent::ActionCompleted(_)))
        .await;
    let AssistantEvent::ActionCompleted(result) = event else {
        unreachable!()
    };
    assert!(result.success, "{}", result.message);
    assert_eq!(h.media.now_playing().as_deref(), Some("tel-001"));

    h.wait_for_state(AssistantState::WakeListening).await;
    assert!(h.navigator.visited().is_empty());
    h.assistant.stop();
}

#[tokio::test(start_paused = true)]
async fn command_in_wake_utterance_is_handled_directly() {
    let mut h = harness();
    h.assistant.start();
    h.feed.say("Hey Lara, play telugu songs");

    let event = h
        .next_matching(|e| matches!(e, AssistantEvent::CommandCaptured { .. }))
        .await;
    assert!(matches!(
        event,
        AssistantEvent::CommandCaptured { ref text, .. } if text == "play telugu songs"
    ));

    h.next_matching(|e| matches!(e, AssistantEvent::ActionCompleted(_)))
        .await;
    assert_eq!(h.media.now_playing().as_deref(), Some("tel-001"));

    h.wait_for_state(AssistantState::WakeListening).await;
    let stray = h
        .drain()
        .into_iter()
        .any(|e| matches!(e, AssistantEvent::NoSpeechCaptured { .. }));
    assert!(!stray);
    h.assistant.stop();
}

#[tokio::test(start_paused = true)]
async fn navigation_command_visits_page_once() {
    let mut h = harness();
    h.assistant.start();
    h.speak_command("go to reminders page");

    let event = h
        .next_matching(|e| matches!(e, AssistantEvent::Navigated { .. }))
        .await;
    assert!(matches!(event, AssistantEvent::Navigated { ref path } if path == "/reminders"));

    h.wait_for_state(AssistantState::WakeListening).await;
    assert_eq!(h.navigator.visited(), vec!["/reminders"]);
    h.assistant.stop();
}

#[tokio::test(start_paused = true)]
async fn wake_event_carries_transcript() {
    let mut h = harness();
    h.assistant.start();
    h.feed.say("Hey, Laura!");

    let event = h
        .next_matching(|e| matches!(e, AssistantEvent::WakeDetected { .. }))
        .await;
    assert!(matches!(
        event,
        AssistantEvent::WakeDetected { transcript: Some(ref t) } if t == "Hey, Laura!"
    ));
    h.wait_for_state(AssistantState::CommandListening).await;
    h.assistant.stop();
}

#[tokio::test(start_paused = true)]
async fn failed_task_write_is_reported_after_optimistic_success() {
    let mut h = HarnessBuilder::new()
        .tasks(InMemoryTaskStore::failing())
        .build();
    h.assistant.start();
    h.speak_command("add a task buy milk");

    let event = h
        .next_matching(|e| matches!(e, AssistantEvent::ActionCompleted(_)))
        .await;
    let AssistantEvent::ActionCompleted(result) = event else {
        unreachable!()
    };
    assert!(result.success);
    assert!(result.message.contains("buy milk"));

    let event = h
        .next_matching(|e| matches!(e, AssistantEvent::BackgroundFailure { .. }))
        .await;
    let AssistantEvent::BackgroundFailure { kind, text, .. } = event else {
        unreachable!()
    };
    assert_eq!(kind, WriteKind::Task);
    assert_eq!(text, "buy milk");

    h.assistant.router().flush().await;
    assert!(h.tasks.tasks().is_empty());
    h.assistant.stop();
}

#[tokio::test(start_paused = true)]
async fn reminder_write_completes_in_background() {
    let mut h = harness();
    h.assistant.start();
    h.speak_command("remind me to call mom tomorrow at 5 pm");

    let event = h
        .next_matching(|e| matches!(e, AssistantEvent::BackgroundWriteCompleted { .. }))
        .await;
    assert!(matches!(
        event,
        AssistantEvent::BackgroundWriteCompleted {
            kind: WriteKind::Reminder,
            ..
        }
    ));

    let reminders = h.tasks.reminders();
    assert_eq!(reminders.len(), 1);
    assert_eq!(reminders[0].text, "call mom");
    h.assistant.stop();
}

#[tokio::test(start_paused = true)]
async fn silence_after_wake_returns_to_wake_listening() {
    let mut h = harness();
    h.assistant.start();
    h.feed.say("hey lara");
    h.feed.silence();

    h.next_matching(|e| matches!(e, AssistantEvent::NoSpeechCaptured { .. }))
        .await;
    h.wait_for_state(AssistantState::WakeListening).await;

    let stray = h
        .drain()
        .into_iter()
        .any(|e| matches!(e, AssistantEvent::IntentClassified(_)));
    assert!(!stray, "no intent should be classified without speech");
    assert!(h.assistant.is_running());
    h.assistant.stop();
}

#[tokio::test(start_paused = true)]
async fn speech_without_wake_phrase_is_ignored() {
    let mut h = harness();
    h.assistant.start();
    h.feed.say("play telugu songs");
    h.feed.say("clara is at the door");
    h.speak_command("show my tasks");

    let event = h
        .next_matching(|e| matches!(e, AssistantEvent::CommandCaptured { .. }))
        .await;
    assert!(matches!(
        event,
        AssistantEvent::CommandCaptured { ref text, .. } if text == "show my tasks"
    ));

    let event = h
        .next_matching(|e| matches!(e, AssistantEvent::Navigated { .. }))
        .await;
    assert!(matches!(event, AssistantEvent::Navigated { ref path } if path == "/tasks"));
    assert!(h.media.now_playing().is_none());
    h.assistant.stop();
}

#[tokio::test(start_paused = true)]
async fn continuous_mode_handles_consecutive_commands() {
    let mut h = harness();
    h.assistant.start();
    h.speak_command("open settings");
    h.speak_command("show my reminders");

    for expected in ["/settings", "/reminders"] {
        let event = h
            .next_matching(|e| matches!(e, AssistantEvent::Navigated { .. }))
            .await;
        assert!(matches!(event, AssistantEvent::Navigated { ref path } if path == expected));
    }
    assert_eq!(h.navigator.visited(), vec!["/settings", "/reminders"]);
    h.assistant.stop();
}

#[tokio::test(start_paused = true)]
async fn one_shot_config_stops_after_first_command() {
    let mut h = HarnessBuilder::new()
        .config(|c| c.orchestrator.one_shot = true)
        .build();
    h.assistant.start();
    h.speak_command("show my tasks");

    h.next_matching(|e| matches!(e, AssistantEvent::Navigated { .. }))
        .await;
    h.wait_for_state(AssistantState::Stopped).await;
    assert!(!h.assistant.is_running());
    assert_eq!(h.navigator.visited(), vec!["/tasks"]);
}

#[tokio::test(start_paused = true)]
async fn manual_activation_while_listening_skips_wake_phrase() {
    let mut h = harness();
    h.assistant.start();
    h.wait_for_state(AssistantState::WakeListening).await;
    assert!(h.assistant.activate());

    let event = h
        .next_matching(|e| matches!(e, AssistantEvent::WakeDetected { .. }))
        .await;
    assert!(matches!(event, AssistantEvent::WakeDetected { transcript: None }));

    h.feed.say("list my reminders");
    h.next_matching(|e| matches!(e, AssistantEvent::Navigated { .. }))
        .await;
    assert_eq!(h.navigator.visited(), vec!["/reminders"]);
    h.assistant.stop();
}

#[tokio::test(start_paused = true)]
async fn confirmation_is_spoken() {
    let mut h = harness();
    h.assistant.start();
    h.speak_command("play some jazz");

    h.next_matching(|e| matches!(e, AssistantEvent::ActionCompleted(_)))
        .await;
    h.wait_for_state(AssistantState::WakeListening).await;
    let spoken = h.speech.spoken();
    assert_eq!(spoken.len(), 1);
    assert!(spoken[0].starts_with("Playing"), "{spoken:?}");
    h.assistant.stop();
}
