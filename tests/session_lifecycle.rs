//! End-to-end session tests against an in-process collector.

mod common;

use common::{reserve_port, test_config, wait_for, Collector};
use magscout::session::Session;
use magscout::source::SimulatedSource;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[test]
fn test_stream_structure_end_to_end() {
    let collector = Collector::spawn("MMPS");
    let config = test_config(collector.port());
    let subject = config.session.subject_id.clone();

    let mut session = Session::new(config, Arc::new(SimulatedSource::new(42)));
    session.enter().expect("enter");

    assert!(wait_for(
        || session.recorded_bytes() > 2000,
        Duration::from_secs(5)
    ));
    session.leave();

    assert!(wait_for(
        || collector.received().ends_with(b"END\n"),
        Duration::from_secs(5)
    ));

    let text = collector.received_string();
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(lines.first().copied(), Some(subject.as_str()));
    assert_eq!(lines.last().copied(), Some("END"));

    let rows = &lines[1..lines.len() - 1];
    assert!(rows.len() >= 10, "only {} rows arrived", rows.len());

    let mut last_ts = 0u64;
    for row in rows {
        let fields: Vec<&str> = row.split(',').collect();
        assert_eq!(fields.len(), 14, "bad row: {}", row);
        let ts: u64 = fields[0].parse().expect("timestamp field");
        assert!(ts >= last_ts, "timestamps must be non-decreasing");
        last_ts = ts;
    }
}

#[test]
fn test_double_enter_keeps_a_single_pair() {
    let collector = Collector::spawn("MMPS");
    let config = test_config(collector.port());

    let mut session = Session::new(config, Arc::new(SimulatedSource::new(42)));
    session.enter().expect("first enter");
    assert!(wait_for(
        || collector.connections() == 1 && !collector.received().is_empty(),
        Duration::from_secs(5)
    ));

    // Entering again implicitly leaves: the first uplink drains and closes
    // before the replacement claims the collector's slot.
    session.enter().expect("second enter");
    assert!(session.is_active());
    assert!(wait_for(
        || collector.connections() == 2,
        Duration::from_secs(5)
    ));

    session.leave();
    assert!(!session.is_active());

    // Both streams terminate cleanly: the first via the implicit leave, the
    // second via the explicit one.
    assert!(wait_for(
        || {
            let segments = collector.segments();
            segments.len() == 2 && segments.iter().all(|s| s.ends_with(b"END\n"))
        },
        Duration::from_secs(5)
    ));
}

#[test]
fn test_leave_is_bounded_without_a_collector() {
    // Nobody listens on this port
    let config = test_config(reserve_port());

    let mut session = Session::new(config, Arc::new(SimulatedSource::new(42)));
    session.enter().expect("enter");
    std::thread::sleep(Duration::from_millis(150));

    let begin = Instant::now();
    session.leave();
    assert!(
        begin.elapsed() < Duration::from_secs(2),
        "leave() took {:?}",
        begin.elapsed()
    );
    assert!(!session.is_active());
}
