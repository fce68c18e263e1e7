//! Idle behaviour driven through a real controller with the echo backend.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use amica::config::LifeConfig;
use amica::pipeline::messages::{Message, Role};
use amica::{ChatConfig, ChatController};

fn lively_config() -> ChatConfig {
    let mut config = ChatConfig::default();
    config.life = LifeConfig {
        enabled: true,
        time_before_idle_sec: 0,
        min_interval_sec: 1,
        max_interval_sec: 1,
        skip_probability: 0.0,
        idle_text_prompts: vec!["Say something nice.".to_owned()],
        ..LifeConfig::default()
    };
    config
}

#[tokio::test]
async fn idle_prompt_follows_user_engagement() {
    let controller = ChatController::from_config(lively_config()).unwrap();
    assert!(controller.life_enabled());

    // Nothing happens until the user has spoken once.
    tokio::time::sleep(Duration::from_millis(1300)).await;
    assert!(controller.chat_log().is_empty());

    controller.receive_message_from_user("hi", false).unwrap().await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while !controller
            .chat_log()
            .snapshot()
            .contains(&Message::system("Say something nice."))
        {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("no idle prompt was sent");

    let log = controller.chat_log().snapshot();
    assert_eq!(log[0], Message::user("hi"));
    assert_eq!(log.iter().filter(|m| m.role == Role::User).count(), 1);
    controller.shutdown();
}

#[tokio::test]
async fn disabling_life_stops_idle_prompts() {
    let controller = ChatController::from_config(lively_config()).unwrap();
    controller.set_life_enabled(false);

    controller.receive_message_from_user("hi", false).unwrap().await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert!(controller.chat_log().snapshot().iter().all(|m| m.role != Role::System));
}
