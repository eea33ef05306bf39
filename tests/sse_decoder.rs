//! SSE decoder properties: frame round-trips, accumulator discipline, and
//! JSON memoization.

use futures::StreamExt;
use serde_json::json;
use skyinfer::sse::SseDecoder;
use skyinfer::Error;

fn feed(lines: &[&str]) -> Vec<skyinfer::ServerSentEvent> {
    let mut decoder = SseDecoder::new();
    let mut records = Vec::new();
    for line in lines {
        if let Some(record) = decoder.decode_line(line) {
            records.push(record);
        }
    }
    records
}

#[test]
fn round_trips_well_formed_frames() {
    let records = feed(&[
        "event: meta",
        "data: {\"status\": 200}",
        "id: 7",
        "retry: 1500",
        "",
        ": heartbeat comment",
        "data: first",
        "data: second",
        "",
    ]);

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].event(), Some("meta"));
    assert_eq!(records[0].data(), "{\"status\": 200}");
    assert_eq!(records[0].id(), Some("7"));
    assert_eq!(records[0].retry(), Some(1500));

    // Multi-line data joins with a newline; event/retry reset per frame.
    assert_eq!(records[1].event(), None);
    assert_eq!(records[1].data(), "first\nsecond");
    assert_eq!(records[1].retry(), None);
}

#[test]
fn leading_blank_line_yields_no_record() {
    assert!(feed(&[""]).is_empty());
    assert!(feed(&["", "", ""]).is_empty());

    // But once anything accumulated, the separator flushes.
    let records = feed(&["", "data: x", ""]);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].data(), "x");
}

#[test]
fn last_event_id_persists_across_frames() {
    let records = feed(&["id: 42", "data: a", "", "data: b", ""]);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id(), Some("42"));
    assert_eq!(records[1].id(), Some("42"));
}

#[test]
fn id_with_null_byte_is_ignored() {
    let records = feed(&["id: bad\0id", "data: a", ""]);
    assert_eq!(records[0].id(), None);
}

#[test]
fn unknown_fields_are_ignored() {
    let records = feed(&["whatever: 1", "data: a", ""]);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].data(), "a");
}

#[test]
fn value_space_prefix_is_stripped_once() {
    let records = feed(&["data:  two spaces", ""]);
    assert_eq!(records[0].data(), " two spaces");
}

#[test]
fn json_accessor_is_memoized() {
    let records = feed(&["data: {\"status\": 200, \"output_data\": {\"x\": 1}}", ""]);
    let first = records[0].json().unwrap();
    assert_eq!(first["output_data"], json!({"x": 1}));
    let second = records[0].json().unwrap();
    assert!(std::ptr::eq(first, second));
}

#[test]
fn json_falls_back_to_event_when_data_is_empty() {
    let records = feed(&["event: {\"status\": 200, \"event_type\": \"id\"}", ""]);
    assert_eq!(records[0].json().unwrap()["event_type"], "id");
}

#[test]
fn invalid_json_surfaces_a_decode_error() {
    let records = feed(&["data: not json", ""]);
    assert!(matches!(records[0].json(), Err(Error::Decode(_))));
}

#[tokio::test]
async fn async_driving_mode_matches_sync_semantics() {
    let lines = vec![
        Ok("data: {\"status\": 200}".to_owned()),
        Ok("".to_owned()),
        Ok("event: meta".to_owned()),
        Ok("data: {\"status\": 200, \"event_type\": \"id\"}".to_owned()),
        Ok("".to_owned()),
    ];
    let records: Vec<_> = SseDecoder::new()
        .into_stream(tokio_stream::iter(lines))
        .collect()
        .await;

    assert_eq!(records.len(), 2);
    let first = records[0].as_ref().unwrap();
    let second = records[1].as_ref().unwrap();
    assert_eq!(first.event(), None);
    assert_eq!(second.event(), Some("meta"));
}

#[tokio::test]
async fn async_driving_mode_forwards_line_errors() {
    let lines = vec![
        Ok("data: {\"status\": 200}".to_owned()),
        Ok("".to_owned()),
        Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "peer went away",
        ))),
    ];
    let records: Vec<_> = SseDecoder::new()
        .into_stream(tokio_stream::iter(lines))
        .collect()
        .await;

    assert_eq!(records.len(), 2);
    assert!(records[0].is_ok());
    assert!(matches!(records[1], Err(Error::Io(_))));
}
