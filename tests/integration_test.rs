mod common;

use common::{FakeTask, OFFSETS};
use oomkill::channel;
use oomkill::common::probe::handle_mark_victim;
use oomkill::common::OomKillEvent;
use oomkill::ebpf::{EventBatch, OomKill};
use oomkill::error::{OomKillError, Result};
use oomkill::ledger::BoundedLedger;

#[test]
fn test_error_types() {
    let err = OomKillError::MapNotFound {
        name: "EVENTS".to_string(),
        available: vec!["KILL_LEDGER".to_string()],
    };

    assert!(err.to_string().contains("EVENTS"));
    assert!(err.to_string().contains("KILL_LEDGER"));

    let result: Result<()> = Err(OomKillError::BtfNotAvailable);
    assert!(result.unwrap_err().to_string().contains("--btf"));
}

#[test]
fn test_version_const() {
    assert!(!oomkill::VERSION.is_empty());
}

#[test]
fn test_victim_reaches_consumer() {
    let ledger = BoundedLedger::new();
    let (producer, mut consumer) = channel::default_sized();

    let victim = FakeTask::new(4242, 1, 204800, 0).at(1_000_000);
    assert_eq!(handle_mark_victim(&victim, &ledger, &producer, &OFFSETS), 0);

    let mut batch = EventBatch::new();
    for raw in consumer.drain() {
        batch.push_raw(&raw);
    }

    assert_eq!(batch.events(), &[OomKillEvent::new(4242, 1, 204800, 0)]);
    assert_eq!(ledger.entries(), vec![(4242, 1_000_000)]);

    let kill = OomKill::from_event(&batch.events()[0], 4096);
    assert_eq!(kill.highwater_rss_bytes, 838_860_800);
}

#[test]
fn test_two_victims_in_order() {
    let ledger = BoundedLedger::new();
    let (producer, mut consumer) = channel::default_sized();

    handle_mark_victim(&FakeTask::new(100, 1, 10, 0).at(5), &ledger, &producer, &OFFSETS);
    handle_mark_victim(&FakeTask::new(200, 100, 20, 9).at(6), &ledger, &producer, &OFFSETS);

    let events: Vec<_> = consumer
        .drain()
        .iter()
        .filter_map(|raw| OomKillEvent::from_bytes(raw))
        .collect();
    assert_eq!(
        events,
        vec![
            OomKillEvent::new(100, 1, 10, 0),
            OomKillEvent::new(200, 100, 20, 9),
        ]
    );
    assert_eq!(ledger.entries(), vec![(100, 5), (200, 6)]);
}

#[test]
fn test_repeat_kill_overwrites_ledger() {
    let ledger = BoundedLedger::new();
    let (producer, mut consumer) = channel::default_sized();

    handle_mark_victim(&FakeTask::new(77, 1, 10, 0).at(100), &ledger, &producer, &OFFSETS);
    handle_mark_victim(&FakeTask::new(77, 1, 12, 0).at(250), &ledger, &producer, &OFFSETS);

    assert_eq!(ledger.get(77), Some(250));
    assert_eq!(consumer.drain().len(), 2);
}

#[test]
fn test_full_channel_drops_event_but_updates_ledger() {
    let ledger = BoundedLedger::new();
    // Room for exactly two records.
    let (producer, mut consumer) = channel::with_byte_size(64).unwrap();

    for (i, pid) in [10u32, 11, 12].into_iter().enumerate() {
        let task = FakeTask::new(pid, 1, 1, 0).at(i as u64 + 1);
        assert_eq!(handle_mark_victim(&task, &ledger, &producer, &OFFSETS), 0);
    }

    let pids: Vec<_> = consumer
        .drain()
        .iter()
        .filter_map(|raw| OomKillEvent::from_bytes(raw))
        .map(|e| e.pid)
        .collect();
    assert_eq!(pids, vec![10, 11]);
    assert_eq!(ledger.get(12), Some(3));
}

#[test]
fn test_task_without_mm_reports_zero_rss() {
    let ledger = BoundedLedger::new();
    let (producer, mut consumer) = channel::default_sized();

    let task = FakeTask::new(55, 2, 999, 0).without_mm();
    handle_mark_victim(&task, &ledger, &producer, &OFFSETS);

    let raw = consumer.pop().expect("event");
    assert_eq!(
        OomKillEvent::from_bytes(&raw),
        Some(OomKillEvent::new(55, 2, 0, 0))
    );
}

#[test]
fn test_negative_exit_code_round_trips() {
    let ledger = BoundedLedger::new();
    let (producer, mut consumer) = channel::default_sized();

    handle_mark_victim(&FakeTask::new(9, 1, 1, -9), &ledger, &producer, &OFFSETS);

    let event = OomKillEvent::from_bytes(&consumer.pop().expect("event")).expect("decode");
    assert_eq!(event.exit_code, (-9i32) as u32);
    assert_eq!(OomKill::from_event(&event, 4096).exit_code, -9);
}

#[test]
fn test_bpf_crate_declares_own_workspace() {
    // The root build script runs `cargo metadata` on this manifest; with the
    // root workspace listing "." it must declare its own workspace root.
    let manifest = include_str!("../oomkill-probes/Cargo.toml");
    assert!(manifest.lines().any(|line| line.trim() == "[workspace]"));
}
