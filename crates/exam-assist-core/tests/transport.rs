mod support;

use std::{sync::Arc, time::Duration};

use exam_assist_core::{transport::serve, ControllerOptions, SessionDriver};
use serde_json::Value;
use support::FakeStore;

#[tokio::test]
async fn json_lines_round_trip_a_conversation() {
    let store = Arc::new(FakeStore::with_capital());
    let driver = SessionDriver::new(store, ControllerOptions::default(), Duration::from_secs(5));

    let input = concat!(
        "{\"type\":\"open\"}\n",
        "{\"type\":\"submit_name\",\"name\":\"سارة\"}\n",
        "not json\n",
        "\n",
        "{\"type\":\"send\",\"text\":\"ما عاصمة السعودية\"}\n",
    );
    let mut output = Vec::new();
    serve(driver, input.as_bytes(), &mut output)
        .await
        .expect("transport finishes");

    let frames: Vec<Value> = String::from_utf8(output)
        .expect("utf8 output")
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line is json"))
        .collect();

    let errors = frames.iter().filter(|f| f["type"] == "error").count();
    assert_eq!(errors, 1);

    let texts: Vec<String> = frames
        .iter()
        .filter(|f| f["type"] == "event")
        .flat_map(|f| f["messages"].as_array().cloned().unwrap_or_default())
        .filter_map(|m| m["text"].as_str().map(str::to_string))
        .collect();

    let question = texts
        .iter()
        .position(|t| t == "ما عاصمة السعودية")
        .expect("question echoed");
    let answer = texts.iter().position(|t| t == "الرياض").expect("answered");
    assert!(question < answer);
    assert!(texts[0].contains("سارة"));
}

#[tokio::test]
async fn empty_input_still_drains_bootstrap() {
    let store = Arc::new(FakeStore::with_capital());
    let driver = SessionDriver::new(store, ControllerOptions::default(), Duration::from_secs(5));

    let mut output = Vec::new();
    serve(driver, &b""[..], &mut output)
        .await
        .expect("transport finishes");

    let text = String::from_utf8(output).expect("utf8 output");
    let frame: Value = serde_json::from_str(text.trim()).expect("one frame");
    assert_eq!(frame["corpus_size"], 1);
    assert_eq!(frame["phase"], "closed");
}
