//! Integration tests for the session coordinator and event sinks

use chrono::{DateTime, Duration, Utc};
use proctor_watch::{
    perception::BoundingBox, ClockPolicy, Config, CoordinatorError, Detection, Direction,
    EventSink, EventType, JsonlSink, MemorySink, ObjectDetection, QueuedSink, RecordedSource,
    SessionCoordinator,
};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

fn at(secs: f64) -> DateTime<Utc> {
    let base = "2024-05-01T09:00:00Z"
        .parse::<DateTime<Utc>>()
        .expect("valid base time");
    base + Duration::milliseconds((secs * 1000.0).round() as i64)
}

fn coordinator() -> (SessionCoordinator, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    (SessionCoordinator::new(Config::default(), sink.clone()), sink)
}

fn phone(confidence: f64) -> ObjectDetection {
    ObjectDetection::new("cell phone", confidence, BoundingBox::new(0.6, 0.5, 0.8, 0.9))
}

fn temp_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("proctor-watch-{name}-{}", uuid::Uuid::new_v4()))
}

/// Feed frames every `step` seconds over [from, to]; return (time, type) of each event.
fn drive(
    coordinator: &SessionCoordinator,
    candidate: &str,
    frame: impl Fn(f64) -> Detection,
    from: f64,
    to: f64,
    step: f64,
) -> Vec<(f64, EventType)> {
    let mut seen = Vec::new();
    let mut i = 0;
    loop {
        let t = ((from + step * i as f64) * 1000.0).round() / 1000.0;
        if t > to + 1e-9 {
            break;
        }
        let events = coordinator
            .process_frame(candidate, &frame(t), at(t))
            .expect("memory sink never fails");
        seen.extend(events.into_iter().map(|e| (t, e.event_type)));
        i += 1;
    }
    seen
}

#[test]
fn test_absence_then_look_away_scenario() {
    let (coordinator, sink) = coordinator();

    let mut emitted = Vec::new();
    for t in 0..10 {
        emitted.extend(
            coordinator
                .process_frame("cand", &Detection::empty(), at(t as f64))
                .unwrap(),
        );
    }
    assert!(emitted.is_empty(), "no event before 10s of absence");

    let events = coordinator
        .process_frame("cand", &Detection::empty(), at(10.0))
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::NoFace);
    assert_eq!(events[0].details, "No face detected for >10 seconds");
    assert_eq!(events[0].extra.frame_id, Some(10));

    assert!(coordinator
        .process_frame("cand", &Detection::single_face(0.0), at(10.1))
        .unwrap()
        .is_empty());

    let deviating = drive(
        &coordinator,
        "cand",
        |_| Detection::single_face(0.3),
        15.0,
        19.9,
        0.1,
    );
    assert!(deviating.is_empty(), "4.9s away is not yet a violation");

    let events = coordinator
        .process_frame("cand", &Detection::single_face(0.3), at(20.1))
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::FocusLost);
    assert_eq!(events[0].extra.direction, Some(Direction::Right));

    let stored = sink.query("cand", 10).unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].event_type, EventType::FocusLost);
    assert_eq!(stored[1].event_type, EventType::NoFace);
}

#[test]
fn test_sustained_absence_repeats_every_threshold() {
    let (coordinator, _) = coordinator();
    let seen = drive(&coordinator, "cand", |_| Detection::empty(), 0.0, 35.0, 0.5);
    let times: Vec<f64> = seen.iter().map(|(t, _)| *t).collect();
    assert_eq!(times, vec![10.0, 20.0, 30.0]);
}

#[test]
fn test_multiple_faces_rate_limited() {
    let (coordinator, _) = coordinator();
    let seen = drive(&coordinator, "cand", |_| Detection::faces(2), 0.0, 25.0, 1.0);
    assert!(seen.iter().all(|(_, kind)| *kind == EventType::MultipleFaces));
    let times: Vec<f64> = seen.iter().map(|(t, _)| *t).collect();
    assert_eq!(times, vec![0.0, 11.0, 22.0]);
}

#[test]
fn test_long_deviation_reports_once_per_cycle() {
    let (coordinator, _) = coordinator();
    let seen = drive(
        &coordinator,
        "cand",
        |_| Detection::single_face(-0.4),
        0.0,
        11.0,
        1.0,
    );
    assert_eq!(seen, vec![(6.0, EventType::FocusLost)]);
}

#[test]
fn test_object_cooldown_is_per_label() {
    let (coordinator, _) = coordinator();
    let book = ObjectDetection::new("Book ", 0.8, BoundingBox::new(0.1, 0.1, 0.3, 0.4));

    let first = coordinator
        .process_frame(
            "cand",
            &Detection::single_face(0.0)
                .with_object(phone(0.9))
                .with_object(book.clone()),
            at(0.0),
        )
        .unwrap();
    assert_eq!(first.len(), 2);
    assert!(first.iter().all(|e| e.event_type == EventType::ObjectDetected));
    assert_eq!(first[0].extra.confidence, Some(0.9));
    assert!(first[0].extra.bbox.is_some());

    let suppressed = coordinator
        .process_frame(
            "cand",
            &Detection::single_face(0.0).with_object(phone(0.95)),
            at(5.0),
        )
        .unwrap();
    assert!(suppressed.is_empty(), "exactly at the cooldown is still suppressed");

    let again = coordinator
        .process_frame(
            "cand",
            &Detection::single_face(0.0)
                .with_object(phone(0.95))
                .with_object(book),
            at(5.5),
        )
        .unwrap();
    assert_eq!(again.len(), 2);

    let ignored = coordinator
        .process_frame(
            "cand",
            &Detection::single_face(0.0).with_object(ObjectDetection::new(
                "cup",
                0.99,
                BoundingBox::new(0.0, 0.0, 0.1, 0.1),
            )),
            at(20.0),
        )
        .unwrap();
    assert!(ignored.is_empty());
}

#[test]
fn test_sessions_are_isolated() {
    let (coordinator, sink) = coordinator();

    for t in 0..=12 {
        let t = t as f64;
        coordinator
            .process_frame("a", &Detection::empty(), at(t))
            .unwrap();
        coordinator
            .process_frame("b", &Detection::single_face(0.0), at(t))
            .unwrap();
    }

    assert_eq!(sink.query("a", 10).unwrap().len(), 1);
    assert!(sink.query("b", 10).unwrap().is_empty());
    assert_eq!(coordinator.active_sessions(), vec!["a", "b"]);

    let b = coordinator.snapshot("b").unwrap();
    assert_eq!(b.last_no_face_logged_at, None);
    assert_eq!(b.frame_counter, 13);
}

#[test]
fn test_focus_timers_are_isolated() {
    let (coordinator, sink) = coordinator();

    let mut a_events = Vec::new();
    for i in 0..=24 {
        let t = i as f64 * 0.5;
        a_events.extend(
            coordinator
                .process_frame("a", &Detection::single_face(0.4), at(t))
                .unwrap(),
        );
        let b_events = coordinator
            .process_frame("b", &Detection::single_face(0.0), at(t))
            .unwrap();
        assert!(b_events.is_empty(), "centered candidate emitted at t={t}");
        assert_eq!(coordinator.snapshot("b").unwrap().focus_away_since, None);
    }

    let a_times: Vec<_> = a_events.iter().map(|e| e.timestamp).collect();
    assert_eq!(a_times, vec![at(5.5), at(11.5)]);
    assert!(a_events.iter().all(|e| e.event_type == EventType::FocusLost));
    assert_eq!(
        coordinator.snapshot("a").unwrap().focus_away_since,
        Some(at(12.0))
    );
    assert!(sink.query("b", 10).unwrap().is_empty());
}

#[test]
fn test_replay_after_reset_is_deterministic() {
    let script = |t: f64| match t as u32 {
        0..=11 => Detection::empty(),
        12..=19 => Detection::single_face(0.5),
        _ => Detection::faces(3).with_object(phone(0.7)),
    };

    let (coordinator, _) = coordinator();
    let first = drive(&coordinator, "cand", script, 0.0, 30.0, 0.5);

    assert!(coordinator.reset_session("cand", at(100.0)));
    let second: Vec<(f64, EventType)> =
        drive(&coordinator, "cand", |t| script(t - 100.0), 100.0, 130.0, 0.5)
            .into_iter()
            .map(|(t, kind)| (t - 100.0, kind))
            .collect();

    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn test_frame_ids_follow_frame_order() {
    let (coordinator, _) = coordinator();
    for t in 0..3 {
        coordinator
            .process_frame("cand", &Detection::single_face(0.0), at(t as f64))
            .unwrap();
    }
    let events = coordinator
        .process_frame("cand", &Detection::faces(2).with_object(phone(0.8)), at(3.0))
        .unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_type, EventType::MultipleFaces);
    assert_eq!(events[1].event_type, EventType::ObjectDetected);
    assert!(events.iter().all(|e| e.extra.frame_id == Some(3)));
}

#[test]
fn test_clock_policy() {
    let (coordinator, _) = coordinator();
    coordinator
        .process_frame("cand", &Detection::empty(), at(5.0))
        .unwrap();
    let err = coordinator
        .process_frame("cand", &Detection::empty(), at(4.0))
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::ClockWentBackwards { .. }));
    assert_eq!(coordinator.snapshot("cand").unwrap().frame_counter, 1);

    let config = Config {
        clock_policy: ClockPolicy::Clamp,
        ..Config::default()
    };
    let clamped = SessionCoordinator::new(config, Arc::new(MemorySink::new()));
    clamped
        .process_frame("cand", &Detection::empty(), at(5.0))
        .unwrap();
    clamped
        .process_frame("cand", &Detection::empty(), at(4.0))
        .unwrap();
    let snapshot = clamped.snapshot("cand").unwrap();
    assert_eq!(snapshot.frame_counter, 2);
    assert_eq!(snapshot.last_frame_at, Some(at(5.0)));
}

#[test]
fn test_concurrent_candidates() {
    let (coordinator, sink) = coordinator();
    let coordinator = Arc::new(coordinator);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let coordinator = Arc::clone(&coordinator);
            thread::spawn(move || {
                let candidate = format!("cand-{i}");
                for t in 0..=25 {
                    coordinator
                        .process_frame(&candidate, &Detection::empty(), at(t as f64))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(coordinator.active_sessions().len(), 8);
    for i in 0..8 {
        let events = sink.query(&format!("cand-{i}"), 10).unwrap();
        assert_eq!(events.len(), 2, "NO_FACE at 10s and 20s");
    }
    assert_eq!(coordinator.transparency().stats().frames_analyzed, 8 * 26);
}

#[test]
fn test_close_session_starts_fresh() {
    let (coordinator, _) = coordinator();
    coordinator
        .process_frame("cand", &Detection::faces(2), at(0.0))
        .unwrap();

    let closed = coordinator.close_session("cand").unwrap();
    assert_eq!(closed.frame_counter, 1);
    assert!(coordinator.close_session("cand").is_none());

    let events = coordinator
        .process_frame("cand", &Detection::faces(2), at(1.0))
        .unwrap();
    assert_eq!(events.len(), 1, "new session has no cooldown history");
}

#[test]
fn test_close_idle_sessions() {
    let (coordinator, _) = coordinator();
    coordinator
        .process_frame("old", &Detection::single_face(0.0), at(0.0))
        .unwrap();
    coordinator
        .process_frame("new", &Detection::single_face(0.0), at(250.0))
        .unwrap();

    let closed = coordinator.close_idle(at(400.0));
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].candidate_id, "old");
    assert_eq!(coordinator.active_sessions(), vec!["new"]);
}

#[test]
fn test_jsonl_sink_persists_across_reopen() {
    let dir = temp_dir("jsonl");
    {
        let sink = Arc::new(JsonlSink::open(&dir).unwrap());
        let coordinator = SessionCoordinator::new(Config::default(), sink);
        drive(&coordinator, "cand/1", |_| Detection::empty(), 0.0, 20.0, 1.0);
    }

    let reopened = JsonlSink::open(&dir).unwrap();
    let events = reopened.query("cand/1", 10).unwrap();
    assert_eq!(events.len(), 2);
    assert!(events[0].timestamp > events[1].timestamp);
    assert_eq!(events[0].candidate_id, "cand/1");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_queued_sink_delivers_to_store() {
    let dir = temp_dir("queued");
    let store: Arc<dyn EventSink> = Arc::new(JsonlSink::open(&dir).unwrap());
    let queued = Arc::new(QueuedSink::new(Arc::clone(&store), 64));
    let coordinator = SessionCoordinator::new(Config::default(), queued.clone());

    drive(&coordinator, "cand", |_| Detection::faces(2), 0.0, 30.0, 1.0);
    queued.flush().unwrap();

    assert_eq!(store.query("cand", 10).unwrap().len(), 3);
    assert_eq!(queued.failed_writes(), 0);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_recorded_source_replay() {
    let recording = r#"
{"captured_at":"2024-05-01T09:00:00Z"}
{"captured_at":"2024-05-01T09:00:05Z","face_boxes":[{"x":0.1,"y":0.1}]}

{"captured_at":"2024-05-01T09:00:10Z","objects":[{"label":"phone","confidence":0.8}]}
{"captured_at":"2024-05-01T09:00:11Z","face_boxes":[{"x":0.1,"y":0.1,"w":0.2,"h":0.3},{"x":0.5,"y":0.1,"w":0.2,"h":0.3}],"head_offset":0.0}
"#;
    let (coordinator, sink) = coordinator();

    let mut kinds = Vec::new();
    for frame in RecordedSource::new(Cursor::new(recording)) {
        let frame = frame.unwrap();
        let events = coordinator
            .process_raw("cand", frame.detection, frame.captured_at)
            .unwrap();
        kinds.extend(events.into_iter().map(|e| e.event_type));
    }

    // Malformed faces and objects are dropped, leaving the frames empty.
    assert_eq!(kinds, vec![EventType::NoFace, EventType::MultipleFaces]);
    assert_eq!(sink.len(), 2);
    assert_eq!(coordinator.transparency().stats().detections_skipped, 2);
}

#[test]
fn test_mistyped_object_does_not_hide_valid_book() {
    let (coordinator, _) = coordinator();
    let raw = serde_json::from_value(serde_json::json!({
        "face_boxes": [{"x": 0.3, "y": 0.2, "w": 0.3, "h": 0.4}],
        "head_offset": 0.0,
        "objects": [
            {"label": "cell phone", "confidence": "high",
             "bbox": {"x_min": 0.6, "y_min": 0.5, "x_max": 0.8, "y_max": 0.9}},
            {"label": "book", "confidence": 0.8,
             "bbox": {"x_min": 0.1, "y_min": 0.1, "x_max": 0.3, "y_max": 0.4}}
        ]
    }))
    .unwrap();

    let events = coordinator.process_raw("cand", raw, at(0.0)).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::ObjectDetected);
    assert!(events[0].details.starts_with("book"));
    assert_eq!(coordinator.transparency().stats().detections_skipped, 1);
}

#[test]
fn test_recorded_line_with_mistyped_face_is_replayed() {
    let recording = concat!(
        r#"{"captured_at":"2024-05-01T09:00:00Z","face_boxes":[{"x":"a","y":0.1,"w":0.2,"h":0.3}],"#,
        r#""objects":[{"label":"book","confidence":0.8,"bbox":{"x_min":0.1,"y_min":0.1,"x_max":0.3,"y_max":0.4}}]}"#,
        "\n"
    );
    let (coordinator, _) = coordinator();

    let mut kinds = Vec::new();
    for frame in RecordedSource::new(Cursor::new(recording)) {
        let frame = frame.expect("mistyped entries must not fail the line");
        let events = coordinator
            .process_raw("cand", frame.detection, frame.captured_at)
            .unwrap();
        kinds.extend(events.into_iter().map(|e| e.event_type));
    }

    assert_eq!(kinds, vec![EventType::ObjectDetected]);
    assert_eq!(coordinator.snapshot("cand").unwrap().frame_counter, 1);
}
