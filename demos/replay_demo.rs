//! Demonstration of the Proctor Watch trackers.
//!
//! This example shows how to:
//! 1. Create a session coordinator backed by an in-memory sink
//! 2. Feed it a scripted sequence of frames
//! 3. Print the events raised along the way
//! 4. Read the stored events back as a report
//!
//! Run with: cargo run --example replay_demo

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use proctor_watch::{
    perception::BoundingBox, Config, Detection, EventSink, EventSummary, MemorySink,
    ObjectDetection, SessionCoordinator, MONITORING_NOTICE,
};

const CANDIDATE: &str = "candidate_demo";

/// The frame seen `secs` seconds into the exam.
fn scripted_frame(secs: f64) -> Detection {
    match secs {
        // Candidate steps away
        s if s < 10.05 => Detection::empty(),
        // Back and centered
        s if s < 15.0 => Detection::single_face(0.0),
        // Looking right for a while
        s if s < 21.0 => Detection::single_face(0.3),
        // A second person leans in
        s if s < 23.0 => Detection::faces(2),
        // A phone shows up on the desk
        _ => Detection::single_face(0.0).with_object(ObjectDetection::new(
            "cell phone",
            0.91,
            BoundingBox::new(0.6, 0.5, 0.8, 0.9),
        )),
    }
}

fn main() {
    println!("Proctor Watch - Replay Demo");
    println!("===========================");
    println!();
    println!("{MONITORING_NOTICE}");

    let sink = Arc::new(MemorySink::new());
    let coordinator = SessionCoordinator::new(Config::default(), sink.clone());

    let start: DateTime<Utc> = Utc::now();
    let mut secs = 0.0_f64;
    while secs <= 30.0 {
        let now = start + Duration::milliseconds((secs * 1000.0) as i64);
        match coordinator.process_frame(CANDIDATE, &scripted_frame(secs), now) {
            Ok(events) => {
                for event in events {
                    println!("[t={secs:>5.1}s] {:<16} {}", event.event_type, event.details);
                }
            }
            Err(e) => eprintln!("[t={secs:>5.1}s] error: {e}"),
        }
        // Frames arrive at 10 fps; step in whole tenths to avoid drift.
        secs = ((secs * 10.0).round() + 1.0) / 10.0;
    }

    if let Some(snapshot) = coordinator.close_session(CANDIDATE) {
        println!();
        println!("Session closed after {} frames", snapshot.frame_counter);
    }

    let events = sink.query(CANDIDATE, usize::MAX).unwrap_or_default();
    let summary = EventSummary::from_events(CANDIDATE, &events);
    println!();
    println!("{}", summary.report(&events));
    println!("{}", coordinator.transparency().summary());
}
