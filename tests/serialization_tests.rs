use serde_json::json;
use voicelive_bridge::events::SessionInfo;
use voicelive_bridge::protocol::models::{Item, ResponseStatus, Voice};
use voicelive_bridge::{ClientEvent, EventKind, OutboundEvent, OutboundKind, ServerEvent};

#[test]
fn test_function_call_item_created() {
    let event: ServerEvent = serde_json::from_value(json!({
        "type": "conversation.item.created",
        "event_id": "evt_1",
        "previous_item_id": "item_0",
        "item": {
            "type": "function_call",
            "id": "item_1",
            "status": "in_progress",
            "name": "get_product_information",
            "call_id": "call_9",
            "arguments": ""
        }
    }))
    .expect("Failed to deserialize conversation.item.created");

    assert_eq!(event.kind(), EventKind::ConversationItemCreated);
    match event {
        ServerEvent::ConversationItemCreated { previous_item_id, item, .. } => {
            assert_eq!(previous_item_id.as_deref(), Some("item_0"));
            match item {
                Item::FunctionCall { name, call_id, .. } => {
                    assert_eq!(name, "get_product_information");
                    assert_eq!(call_id, "call_9");
                }
                other => panic!("Wrong item: {other:?}"),
            }
        }
        _ => panic!("Wrong event type"),
    }
}

#[test]
fn test_function_call_missing_name_is_preserved_raw() {
    let event: ServerEvent = serde_json::from_value(json!({
        "type": "conversation.item.created",
        "event_id": "evt_1",
        "item": { "type": "function_call", "id": "item_1", "call_id": "call_9" }
    }))
    .unwrap();

    let ServerEvent::ConversationItemCreated { item, .. } = event else {
        panic!("Wrong event type");
    };
    assert!(matches!(item, Item::Unknown(_)));
    assert_eq!(item.kind(), "function_call");
    assert_eq!(item.id(), Some("item_1"));
}

#[test]
fn test_arguments_done_and_response_done() {
    let done: ServerEvent = serde_json::from_value(json!({
        "type": "response.function_call_arguments.done",
        "event_id": "evt_2",
        "response_id": "resp_1",
        "item_id": "item_1",
        "output_index": 0,
        "call_id": "call_9",
        "arguments": "{\"query\":\"taxas\"}"
    }))
    .unwrap();
    match done {
        ServerEvent::ResponseFunctionCallArgumentsDone { call_id, arguments, name, .. } => {
            assert_eq!(call_id, "call_9");
            assert_eq!(arguments, r#"{"query":"taxas"}"#);
            assert!(name.is_none());
        }
        _ => panic!("Wrong event type"),
    }

    let response: ServerEvent = serde_json::from_value(json!({
        "type": "response.done",
        "event_id": "evt_3",
        "response": { "id": "resp_1", "status": "completed", "output": [] }
    }))
    .unwrap();
    match response {
        ServerEvent::ResponseDone { response, .. } => {
            assert_eq!(response.id, "resp_1");
            assert_eq!(response.status, Some(ResponseStatus::Completed));
        }
        _ => panic!("Wrong event type"),
    }
}

#[test]
fn test_unknown_events_round_trip() {
    let raw = json!({ "type": "response.animation_blendshapes.delta", "event_id": "evt_4", "frame": [0.1, 0.2] });
    let event: ServerEvent = serde_json::from_value(raw.clone()).unwrap();
    assert_eq!(event.kind(), EventKind::Unknown);
    assert_eq!(event.event_type(), "response.animation_blendshapes.delta");
    assert_eq!(event.event_id(), Some("evt_4"));
    assert_eq!(serde_json::to_value(&event).unwrap(), raw);
}

#[test]
fn test_voicelive_session_created() {
    let event: ServerEvent = serde_json::from_value(json!({
        "type": "session.created",
        "event_id": "evt_0",
        "session": {
            "id": "sess_1",
            "model": "gpt-4o-realtime",
            "voice": { "type": "azure-standard", "name": "pt-BR-FranciscaNeural" }
        }
    }))
    .unwrap();
    match event {
        ServerEvent::SessionCreated { session, .. } => {
            assert_eq!(session.id, "sess_1");
            assert_eq!(session.voice, Some(Voice::from("pt-BR-FranciscaNeural")));
        }
        _ => panic!("Wrong event type"),
    }
}

#[test]
fn test_function_call_output_item_serialization() {
    let event = ClientEvent::ConversationItemCreate {
        event_id: None,
        previous_item_id: Some("item_1".to_string()),
        item: Box::new(Item::FunctionCallOutput {
            id: None,
            call_id: "call_9".to_string(),
            output: "\"ok\"".to_string(),
        }),
    };
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(
        value,
        json!({
            "type": "conversation.item.create",
            "previous_item_id": "item_1",
            "item": { "type": "function_call_output", "call_id": "call_9", "output": "\"ok\"" }
        })
    );
}

#[test]
fn test_control_events_serialization() {
    let cancel = serde_json::to_value(ClientEvent::ResponseCancel { event_id: None, response_id: None }).unwrap();
    assert_eq!(cancel, json!({ "type": "response.cancel" }));

    let clear = serde_json::to_value(ClientEvent::InputAudioBufferClear { event_id: None }).unwrap();
    assert_eq!(clear, json!({ "type": "input_audio_buffer.clear" }));

    let append = serde_json::to_value(ClientEvent::InputAudioBufferAppend {
        event_id: Some("evt_a".to_string()),
        audio: "AAAA".to_string(),
    })
    .unwrap();
    assert_eq!(append, json!({ "type": "input_audio_buffer.append", "event_id": "evt_a", "audio": "AAAA" }));
}

#[test]
fn test_outbound_event_shapes() {
    let audio: ServerEvent = serde_json::from_value(json!({
        "type": "response.audio.delta",
        "event_id": "evt_6",
        "response_id": "resp_1",
        "item_id": "item_3",
        "delta": "AAAAAA=="
    }))
    .unwrap();

    let cases = [
        (OutboundEvent::session_started("m", "v", 2), "session_started"),
        (OutboundEvent::session_stopped(), "session_stopped"),
        (OutboundEvent::session_error("boom"), "session_error"),
        (OutboundEvent::assistant_interrupted(), "assistant_interrupted"),
        (OutboundEvent::tool_call_started("f", "c"), "tool_call_started"),
        (OutboundEvent::tool_call_arguments("f", "c", "{}"), "tool_call_arguments"),
        (OutboundEvent::tool_call_executing("f", "c"), "tool_call_executing"),
        (OutboundEvent::tool_call_completed("f", "c", "ok", 0.25), "tool_call_completed"),
        (OutboundEvent::tool_call_error("f", "c", "bad"), "tool_call_error"),
        (OutboundEvent::voice_event(&audio), "voice_event"),
    ];

    for (event, expected) in cases {
        assert_eq!(event.event_type(), expected);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], expected);
        assert!(value["timestamp"].is_f64());
        let back: OutboundEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }
}

#[test]
fn test_session_started_payload() {
    let value = serde_json::to_value(OutboundEvent::session_started("gpt-4o-realtime", "alloy", 2)).unwrap();
    assert_eq!(value["status"], "success");
    assert_eq!(value["config"], json!({ "model": "gpt-4o-realtime", "voice": "alloy", "tools_count": 2 }));

    let event: OutboundEvent = serde_json::from_value(value).unwrap();
    assert!(matches!(
        event.kind,
        OutboundKind::SessionStarted { config: SessionInfo { tools_count: 2, .. }, .. }
    ));
}

#[test]
fn test_voice_event_summarizes_transcript() {
    let event: ServerEvent = serde_json::from_value(json!({
        "type": "conversation.item.input_audio_transcription.completed",
        "event_id": "evt_5",
        "item_id": "item_2",
        "content_index": 0,
        "transcript": "Quais são as taxas?"
    }))
    .unwrap();

    let value = serde_json::to_value(OutboundEvent::voice_event(&event)).unwrap();
    assert_eq!(value["type"], "voice_event");
    assert_eq!(value["event_type"], "conversation.item.input_audio_transcription.completed");
    assert_eq!(value["data"]["transcript"], "Quais são as taxas?");
    assert!(value["data"].get("has_audio").is_none());
}

#[test]
fn test_voice_event_hides_audio_payload() {
    let event: ServerEvent = serde_json::from_value(json!({
        "type": "response.audio.delta",
        "event_id": "evt_6",
        "response_id": "resp_1",
        "item_id": "item_3",
        "delta": "AAAAAA=="
    }))
    .unwrap();

    let value = serde_json::to_value(OutboundEvent::voice_event(&event)).unwrap();
    assert_eq!(value["data"]["has_audio"], true);
    assert_eq!(value["data"]["audio_length"], 8);
    assert!(!value.to_string().contains("AAAAAA=="));
}
