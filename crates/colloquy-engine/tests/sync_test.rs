mod common;

use colloquy_engine::scripts;
use colloquy_engine::{EngineError, SendOptions, Session, SessionConfig, Timings};
use common::MockProbe;
use serde_json::{Value, json};
use std::time::Duration;

fn token_config() -> SessionConfig {
    SessionConfig {
        token: Some("tok".into()),
        timings: Timings::immediate(),
        attempt_verification: true,
        ..SessionConfig::default()
    }
}

fn textbox_candidates() -> Value {
    json!([{
        "tag": "textarea",
        "selector": "textarea#chat",
        "placeholder": "Message DeepSeek",
        "rect": {"x": 0.0, "y": 700.0, "width": 600.0, "height": 40.0},
        "viewport_height": 800.0,
    }])
}

fn send_button() -> Value {
    json!({
        "tag": "button",
        "selector": "button#send",
        "label": "Send message",
        "has_icon": true,
        "rect": {"x": 610.0, "y": 700.0, "width": 40.0, "height": 40.0},
    })
}

async fn active_session(probe: &MockProbe) -> Session<MockProbe> {
    probe.on_wait(scripts::TEXT_SURFACE_QUERY, true);
    probe.on_eval(
        scripts::collect_candidates(scripts::TEXT_SURFACE_QUERY),
        textbox_candidates(),
    );
    let mut session = Session::new(probe.clone(), token_config()).unwrap();
    session.initialize().await.unwrap();
    session
}

fn quick_options() -> SendOptions {
    SendOptions {
        timeout: Duration::from_secs(2),
        ..SendOptions::default()
    }
}

#[tokio::test(start_paused = true)]
async fn send_message_returns_extracted_reply() {
    let probe = MockProbe::new();
    probe.on_eval(
        scripts::collect_candidates(scripts::CLICKABLE_QUERY),
        json!([send_button()]),
    );
    probe.on_eval(scripts::GENERATION_ACTIVE, json!(true));
    probe.on_eval(scripts::GENERATION_ACTIVE, json!(false));
    probe.on_eval(scripts::EXTRACT_REPLY, json!("Hello from the model"));

    let mut session = active_session(&probe).await;
    let reply = session
        .send_message("hello", quick_options())
        .await
        .unwrap()
        .expect("reply should be extracted");

    assert_eq!(reply.text, "Hello from the model");
    assert!(reply.deepthink_duration.is_none());
    assert!(reply.search_results.is_none());

    let state = probe.state();
    assert_eq!(
        state.typed,
        vec![("textarea#chat".to_string(), "hello".to_string())]
    );
    assert!(state.clicked.contains(&"button#send".to_string()));
}

#[tokio::test(start_paused = true)]
async fn slow_mode_paces_each_character() {
    let probe = MockProbe::new();
    probe.on_eval(
        scripts::collect_candidates(scripts::CLICKABLE_QUERY),
        json!([send_button()]),
    );
    probe.on_eval(scripts::GENERATION_ACTIVE, json!(true));
    probe.on_eval(scripts::GENERATION_ACTIVE, json!(false));
    probe.on_eval(scripts::EXTRACT_REPLY, json!("ok"));

    let mut session = active_session(&probe).await;
    let options = SendOptions {
        slow_mode: true,
        slow_mode_delay: Duration::from_millis(5),
        ..quick_options()
    };
    session.send_message("hi", options).await.unwrap();

    let state = probe.state();
    assert_eq!(
        state.typed,
        vec![
            ("textarea#chat".to_string(), "h".to_string()),
            ("textarea#chat".to_string(), "i".to_string()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn extraction_retries_until_text_appears() {
    let probe = MockProbe::new();
    probe.on_eval(
        scripts::collect_candidates(scripts::CLICKABLE_QUERY),
        json!([send_button()]),
    );
    probe.on_eval(scripts::GENERATION_ACTIVE, json!(true));
    probe.on_eval(scripts::GENERATION_ACTIVE, json!(false));
    // The message block renders empty for a couple of polls before the text
    // lands; extraction must keep retrying on the same cadence.
    probe.on_eval(scripts::EXTRACT_REPLY, Value::Null);
    probe.on_eval(scripts::EXTRACT_REPLY, Value::Null);
    probe.on_eval(scripts::EXTRACT_REPLY, json!("Late reply"));

    let mut session = active_session(&probe).await;
    let reply = session
        .send_message("hello", quick_options())
        .await
        .unwrap()
        .expect("reply should be extracted");
    assert_eq!(reply.text, "Late reply");
}

#[tokio::test(start_paused = true)]
async fn busy_message_raises_server_busy() {
    let probe = MockProbe::new();
    probe.on_eval(
        scripts::collect_candidates(scripts::CLICKABLE_QUERY),
        json!([send_button()]),
    );
    probe.on_eval(scripts::GENERATION_ACTIVE, json!(true));
    probe.on_eval(scripts::GENERATION_ACTIVE, json!(false));
    // Case differs from the canonical phrase; the match is case-insensitive.
    probe.on_eval(
        scripts::EXTRACT_REPLY,
        json!("the server is busy. please try again later."),
    );

    let mut session = active_session(&probe).await;
    let err = session
        .send_message("hello", quick_options())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ServerBusy(_)));
}

#[tokio::test(start_paused = true)]
async fn deadline_without_text_is_absent_not_error() {
    let probe = MockProbe::new();
    probe.on_eval(
        scripts::collect_candidates(scripts::CLICKABLE_QUERY),
        json!([send_button()]),
    );
    // Indicator never appears and no text ever extracts.
    probe.on_eval(scripts::GENERATION_ACTIVE, json!(false));

    let mut session = active_session(&probe).await;
    let options = SendOptions {
        timeout: Duration::from_millis(200),
        ..SendOptions::default()
    };
    let reply = session.send_message("hello", options).await.unwrap();
    assert!(reply.is_none());
}

#[tokio::test(start_paused = true)]
async fn missing_textbox_is_could_not_find_element() {
    let probe = MockProbe::new();
    probe.on_wait(scripts::TEXT_SURFACE_QUERY, true);
    // No text surface snapshot and no fallback selector hit: the page has
    // no composer at all when the message is sent.
    let mut session = Session::new(probe.clone(), token_config()).unwrap();
    session.initialize().await.unwrap();

    let err = session
        .send_message("hello", quick_options())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CouldNotFindElement(_)));
}

#[tokio::test(start_paused = true)]
async fn requested_modes_toggle_and_fill_side_channels() {
    let probe = MockProbe::new();
    probe.on_eval(
        scripts::collect_candidates(scripts::CLICKABLE_QUERY),
        json!([
            send_button(),
            {
                "tag": "button",
                "selector": "button#deepthink",
                "text": "DeepThink (R1)",
                "rect": {"x": 40.0, "y": 750.0, "width": 90.0, "height": 28.0},
            },
            {
                "tag": "button",
                "selector": "button#search",
                "text": "Search",
                "rect": {"x": 140.0, "y": 750.0, "width": 70.0, "height": 28.0},
            },
        ]),
    );
    probe.on_eval(scripts::GENERATION_ACTIVE, json!(true));
    probe.on_eval(scripts::GENERATION_ACTIVE, json!(false));
    probe.on_eval(scripts::EXTRACT_REPLY, json!("Considered answer"));
    probe.on_eval(
        scripts::EXTRACT_REASONING,
        json!({"duration_text": "Thought for 12 seconds", "content": "step by step"}),
    );
    probe.on_eval(
        scripts::EXTRACT_SEARCH_RESULTS,
        json!([
            {"image_url": "a.png", "website": "a.com", "date": "Yesterday",
             "index_text": "1", "title": "A", "description": "first hit"},
            {"image_url": "b.png", "website": "b.com", "date": "Today",
             "index_text": "4", "title": "B", "description": "second hit"},
        ]),
    );

    let mut session = active_session(&probe).await;
    let options = SendOptions {
        deepthink: true,
        search: true,
        timeout: Duration::from_secs(2),
        ..SendOptions::default()
    };
    let reply = session
        .send_message("question", options)
        .await
        .unwrap()
        .expect("reply should be extracted");

    assert_eq!(reply.deepthink_duration, Some(12.0));
    assert_eq!(reply.deepthink_content.as_deref(), Some("step by step"));
    let results = reply.search_results.expect("search results expected");
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].index, 1);
    assert_eq!(results[1].website, "b.com");

    assert!(session.deepthink_enabled());
    assert!(session.search_enabled());
    let state = probe.state();
    assert!(state.clicked.contains(&"button#deepthink".to_string()));
    assert!(state.clicked.contains(&"button#search".to_string()));
}

#[tokio::test(start_paused = true)]
async fn side_channel_failure_is_non_fatal() {
    let probe = MockProbe::new();
    probe.on_eval(
        scripts::collect_candidates(scripts::CLICKABLE_QUERY),
        json!([
            send_button(),
            {
                "tag": "button",
                "selector": "button#deepthink",
                "text": "DeepThink (R1)",
                "rect": {"x": 40.0, "y": 750.0, "width": 90.0, "height": 28.0},
            },
            {
                "tag": "button",
                "selector": "button#search",
                "text": "Search",
                "rect": {"x": 140.0, "y": 750.0, "width": 70.0, "height": 28.0},
            },
        ]),
    );
    probe.on_eval(scripts::GENERATION_ACTIVE, json!(true));
    probe.on_eval(scripts::GENERATION_ACTIVE, json!(false));
    probe.on_eval(scripts::EXTRACT_REPLY, json!("Answer"));
    // Reasoning and search payloads stay null: channels resolve to absent.

    let mut session = active_session(&probe).await;
    let options = SendOptions {
        deepthink: true,
        search: true,
        timeout: Duration::from_secs(2),
        ..SendOptions::default()
    };
    let reply = session
        .send_message("question", options)
        .await
        .unwrap()
        .expect("reply should be extracted");

    assert_eq!(reply.text, "Answer");
    assert!(reply.deepthink_duration.is_none());
    assert!(reply.deepthink_content.is_none());
    assert!(reply.search_results.is_none());
}

#[tokio::test(start_paused = true)]
async fn regenerate_runs_the_same_protocol() {
    let probe = MockProbe::new();
    probe.on_eval(scripts::CLICK_REGENERATE, json!(true));
    probe.on_eval(scripts::GENERATION_ACTIVE, json!(true));
    probe.on_eval(scripts::GENERATION_ACTIVE, json!(false));
    probe.on_eval(scripts::EXTRACT_REPLY, json!("Take two"));

    let mut session = active_session(&probe).await;
    let reply = session
        .regenerate(Duration::from_secs(2))
        .await
        .unwrap()
        .expect("reply should be extracted");
    assert_eq!(reply.text, "Take two");
}

#[tokio::test(start_paused = true)]
async fn regenerate_without_toolbar_fails() {
    let probe = MockProbe::new();
    probe.on_eval(scripts::CLICK_REGENERATE, json!(false));

    let mut session = active_session(&probe).await;
    let err = session.regenerate(Duration::from_secs(2)).await.unwrap_err();
    assert!(matches!(err, EngineError::CouldNotFindElement(_)));
}
