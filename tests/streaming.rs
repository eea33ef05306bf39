//! Streaming prediction iterator behavior: control events, session state,
//! cancellation, and failure frames.

use std::sync::{Arc, Mutex};

use serde_json::json;
use skyinfer::client::blocking;
use skyinfer::{Client, Error, EventType, Payload};

const STREAM_PATH: &str = "/api/v1/acme/echo/predict/stream/";

fn sse_body(frames: &[&str]) -> String {
    frames
        .iter()
        .map(|frame| format!("{frame}\n\n"))
        .collect::<Vec<_>>()
        .join("")
}

fn control_frame(body: &str) -> String {
    format!("event: meta\ndata: {body}")
}

async fn client_for(server: &mockito::ServerGuard) -> Client {
    Client::builder("test-key")
        .model("acme/echo")
        .base_url(server.url())
        .build()
        .expect("client should build")
}

#[tokio::test]
async fn control_events_are_skipped_and_cancelling_stops_iteration() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", STREAM_PATH)
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse_body(&[
            &control_frame(
                "{\"status\": 200, \"event_type\": \"id\", \"prediction_id\": \"abc\"}",
            ),
            "data: {\"status\": 200, \"output_data\": {\"token\": \"a\"}}",
            "data: {\"status\": 200, \"output_data\": {\"token\": \"b\"}}",
            &control_frame("{\"status\": 200, \"event_type\": \"stream_cancelling\"}"),
            "data: {\"status\": 200, \"output_data\": {\"token\": \"never seen\"}}",
        ]))
        .create_async()
        .await;

    let client = client_for(&server).await;
    let mut stream = client.stream(&Payload::new().field("prompt", "hi"), None).await.unwrap();

    let mut partials = Vec::new();
    while let Some(partial) = stream.next().await {
        partials.push(partial.unwrap());
    }

    assert_eq!(partials.len(), 2);
    assert_eq!(partials[0].output_data, Some(json!({"token": "a"})));
    assert_eq!(partials[1].output_data, Some(json!({"token": "b"})));
    assert_eq!(stream.prediction_id(), Some("abc"));

    // Terminal states are sticky.
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn event_callback_sees_every_control_event() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", STREAM_PATH)
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse_body(&[
            &control_frame(
                "{\"status\": 200, \"event_type\": \"id\", \"prediction_id\": \"abc\"}",
            ),
            "data: {\"status\": 200, \"output_data\": {}}",
            &control_frame("{\"status\": 200, \"event_type\": \"stream_cancelling\"}"),
        ]))
        .create_async()
        .await;

    let client = client_for(&server).await;
    let mut stream = client.stream(&Payload::new().field("prompt", "hi"), None).await.unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    stream.on_event(move |event| sink.lock().unwrap().push(event.event_type));

    while let Some(partial) = stream.next().await {
        partial.unwrap();
    }

    assert_eq!(
        *seen.lock().unwrap(),
        vec![EventType::StreamId, EventType::Cancelling]
    );
}

#[tokio::test]
async fn deferred_event_callbacks_run_without_stalling_iteration() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", STREAM_PATH)
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse_body(&[
            &control_frame(
                "{\"status\": 200, \"event_type\": \"id\", \"prediction_id\": \"abc\"}",
            ),
            "data: {\"status\": 200, \"output_data\": {}}",
        ]))
        .create_async()
        .await;

    let client = client_for(&server).await;
    let mut stream = client.stream(&Payload::new().field("prompt", "hi"), None).await.unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    stream.on_event_async(move |event| {
        let sink = sink.clone();
        Box::pin(async move {
            sink.lock().unwrap().push(event.event_type);
        })
    });

    while let Some(partial) = stream.next().await {
        partial.unwrap();
    }

    // Give the spawned callback a chance to run.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(*seen.lock().unwrap(), vec![EventType::StreamId]);
}

#[tokio::test]
async fn cancelling_event_is_ignored_when_not_following() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", STREAM_PATH)
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse_body(&[
            &control_frame("{\"status\": 200, \"event_type\": \"stream_cancelling\"}"),
            "data: {\"status\": 200, \"output_data\": {\"token\": \"a\"}}",
        ]))
        .create_async()
        .await;

    let client = client_for(&server).await;
    let mut stream = client.stream(&Payload::new().field("prompt", "hi"), None).await.unwrap();
    stream.follow_cancelling(false);

    let mut partials = Vec::new();
    while let Some(partial) = stream.next().await {
        partials.push(partial.unwrap());
    }
    assert_eq!(partials.len(), 1);
}

#[tokio::test]
async fn stream_details_are_captured_once_from_the_terminal_frame() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", STREAM_PATH)
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse_body(&[
            "data: {\"status\": 200, \"output_data\": {\"token\": \"a\"}}",
            "data: {\"status\": 200, \"output_data\": {}, \"stream_details\": {\"input_tokens\": 5, \"output_tokens\": 9, \"model_size_in_billions\": 7.5}}",
        ]))
        .create_async()
        .await;

    let client = client_for(&server).await;
    let mut stream = client.stream(&Payload::new().field("prompt", "hi"), None).await.unwrap();

    while let Some(partial) = stream.next().await {
        partial.unwrap();
    }

    let details = stream.stream_details().expect("details should be captured");
    assert_eq!(details.input_tokens, Some(5));
    assert_eq!(details.output_tokens, Some(9));
    assert_eq!(details.size_in_billions, Some(7.5));
}

#[tokio::test]
async fn failed_frame_ends_the_stream_with_its_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", STREAM_PATH)
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse_body(&[
            "data: {\"status\": 200, \"output_data\": {\"token\": \"a\"}}",
            "data: {\"status\": 500, \"stream_details\": {\"output_tokens\": 2}}",
        ]))
        .create_async()
        .await;

    let client = client_for(&server).await;
    let mut stream = client.stream(&Payload::new().field("prompt", "hi"), None).await.unwrap();

    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.output_data, Some(json!({"token": "a"})));

    match stream.next().await {
        Some(Err(Error::Api(failure))) => {
            assert!(!failure.requires_retry);
            assert_eq!(failure.envelope.as_ref().unwrap().status, 500);
        }
        other => panic!("expected a classified failure, got {other:?}"),
    }

    // Details were mined from the failing frame's envelope.
    assert_eq!(stream.stream_details().unwrap().output_tokens, Some(2));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn empty_stream_stops_cleanly() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", STREAM_PATH)
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body("")
        .create_async()
        .await;

    let client = client_for(&server).await;
    let mut stream = client.stream(&Payload::new().field("prompt", "hi"), None).await.unwrap();
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn cancel_before_the_id_is_announced_fails() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", STREAM_PATH)
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body("")
        .create_async()
        .await;

    let client = client_for(&server).await;
    let stream = client.stream(&Payload::new().field("prompt", "hi"), None).await.unwrap();
    assert!(matches!(stream.cancel().await, Err(Error::Cancellation(_))));
}

#[tokio::test]
async fn cancel_after_the_id_hits_the_cancel_route() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", STREAM_PATH)
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse_body(&[
            &control_frame(
                "{\"status\": 200, \"event_type\": \"id\", \"prediction_id\": \"abc\"}",
            ),
            "data: {\"status\": 200, \"output_data\": {}}",
        ]))
        .create_async()
        .await;
    let cancel_mock = server
        .mock("PATCH", "/api/v1/acme/echo/predict/cancel/")
        .match_body(mockito::Matcher::Json(json!({"infer_id": "abc"})))
        .with_status(200)
        .with_body("{\"status\": 200}")
        .create_async()
        .await;

    let client = client_for(&server).await;
    let mut stream = client.stream(&Payload::new().field("prompt", "hi"), None).await.unwrap();

    // Pull until the id announcement has been processed.
    stream.next().await.unwrap().unwrap();
    assert_eq!(stream.prediction_id(), Some("abc"));

    let envelope = stream.cancel().await.unwrap();
    assert_eq!(envelope.status, 200);
    cancel_mock.assert_async().await;
}

#[tokio::test]
async fn transport_level_error_on_open_is_classified() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", STREAM_PATH)
        .with_status(503)
        .with_body("maintenance window")
        .create_async()
        .await;

    let client = client_for(&server).await;
    let outcome = client.stream(&Payload::new().field("prompt", "hi"), None).await;
    match outcome {
        Err(Error::Api(failure)) => {
            assert!(!failure.requires_retry);
            assert!(failure.message.contains("503"));
        }
        other => panic!("expected a classified failure, got {other:?}"),
    }
}

#[test]
fn blocking_stream_iterates_partials_and_follows_cancelling() {
    let mut server = mockito::Server::new();
    server
        .mock("POST", STREAM_PATH)
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse_body(&[
            &control_frame(
                "{\"status\": 200, \"event_type\": \"id\", \"prediction_id\": \"xyz\"}",
            ),
            "data: {\"status\": 200, \"output_data\": {\"token\": \"a\"}}",
            "data: {\"status\": 200, \"output_data\": {\"token\": \"b\"}}",
            &control_frame("{\"status\": 200, \"event_type\": \"stream_cancelling\"}"),
        ]))
        .create();

    let client = blocking::Client::builder("test-key")
        .model("acme/echo")
        .base_url(server.url())
        .build_blocking()
        .unwrap();
    let mut stream = client.stream(&Payload::new().field("prompt", "hi"), None).unwrap();

    let partials: Vec<_> = stream.by_ref().map(|partial| partial.unwrap()).collect();
    assert_eq!(partials.len(), 2);
    assert_eq!(stream.prediction_id(), Some("xyz"));
}
