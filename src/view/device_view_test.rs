use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::Rng;
use tracing_test::traced_test;

use super::*;
use crate::DeviceIdentity;
use crate::DeviceKey;
use crate::DeviceRef;
use crate::DeviceState;
use crate::Error;
use crate::TrackedDevice;
use crate::ViewError;

const TIMEOUT: Duration = Duration::from_secs(5);

fn device(
    phy: &str,
    mac: &str,
    signal: i32,
) -> DeviceRef {
    TrackedDevice::new(
        DeviceIdentity::new(phy, mac),
        DeviceState {
            signal_dbm: signal,
            ..Default::default()
        },
    )
}

fn view_with(predicates: ViewPredicates) -> DeviceView {
    DeviceView::new("test", "test view", predicates, TIMEOUT)
}

fn assert_consistent(view: &DeviceView) {
    let mut listed = view.device_keys();
    let mut dedup = listed.clone();
    dedup.sort();
    dedup.dedup();
    assert_eq!(dedup.len(), listed.len(), "duplicate keys in device list");

    listed.sort();
    let present: Vec<DeviceKey> = view
        .presence_keys()
        .into_iter()
        .filter(|(_, present)| *present)
        .map(|(k, _)| k)
        .collect();
    assert_eq!(listed, present, "presence index diverged from device list");
}

#[test]
#[traced_test]
fn new_device_joins_only_when_new_cb_accepts() {
    let view = view_with(ViewPredicates::uniform(by_phy("802.11")));
    let d1 = device("802.11", "00:00:00:00:00:01", -50);
    let d2 = device("BT", "00:00:00:00:00:02", -50);

    assert_eq!(view.on_device_created(&d1).unwrap(), MembershipChange::Added);
    assert_eq!(view.on_device_created(&d2).unwrap(), MembershipChange::Unchanged);

    assert_eq!(view.device_keys(), vec![d1.key()]);
    assert_eq!(view.presence_keys(), vec![(d1.key(), true)]);
    assert!(!view.contains(&d2.key()).unwrap());
}

#[test]
fn duplicate_create_is_ignored() {
    let view = view_with(ViewPredicates::accept_all());
    let d1 = device("802.11", "00:00:00:00:00:01", -50);

    view.on_device_created(&d1).unwrap();
    assert_eq!(view.on_device_created(&d1).unwrap(), MembershipChange::Unchanged);
    assert_eq!(view.len().unwrap(), 1);
}

#[test]
fn update_admits_late_qualifier_exactly_once() {
    let view = view_with(ViewPredicates::uniform(signal_above(-60)));
    let d1 = device("802.11", "00:00:00:00:00:01", -70);

    view.on_device_created(&d1).unwrap();
    assert!(view.device_keys().is_empty());

    d1.update(|s| s.signal_dbm = -40);
    assert_eq!(view.on_device_updated(&d1).unwrap(), MembershipChange::Added);
    assert_eq!(view.on_device_updated(&d1).unwrap(), MembershipChange::Unchanged);

    assert_eq!(view.device_keys(), vec![d1.key()]);
    assert_consistent(&view);
}

#[test]
fn update_evicts_when_update_cb_rejects() {
    let view = view_with(ViewPredicates::new(|_| true, signal_above(-60)));
    let d1 = device("802.11", "00:00:00:00:00:01", -70);
    let d2 = device("802.11", "00:00:00:00:00:02", -70);

    view.on_device_created(&d1).unwrap();
    view.on_device_created(&d2).unwrap();
    assert_eq!(view.len().unwrap(), 2);

    assert_eq!(view.on_device_updated(&d1).unwrap(), MembershipChange::Removed);
    assert_eq!(view.device_keys(), vec![d2.key()]);

    // already absent and still rejected
    assert_eq!(view.on_device_updated(&d1).unwrap(), MembershipChange::Unchanged);
    assert_consistent(&view);
}

#[test]
fn update_does_not_reorder_present_devices() {
    let view = view_with(ViewPredicates::accept_all());
    let devices: Vec<_> = (1..=3).map(|i| device("802.11", &format!("00:00:00:00:00:0{i}"), -50)).collect();
    for d in &devices {
        view.on_device_created(d).unwrap();
    }

    view.on_device_updated(&devices[0]).unwrap();

    let expected: Vec<_> = devices.iter().map(|d| d.key()).collect();
    assert_eq!(view.device_keys(), expected);
}

#[test]
fn remove_keeps_relative_order() {
    let view = view_with(ViewPredicates::accept_all());
    let d1 = device("802.11", "00:00:00:00:00:01", -50);
    let d2 = device("802.11", "00:00:00:00:00:02", -50);
    let d3 = device("802.11", "00:00:00:00:00:03", -50);
    for d in [&d1, &d2, &d3] {
        view.on_device_created(d).unwrap();
    }

    assert_eq!(view.on_device_removed(&d2).unwrap(), MembershipChange::Removed);

    assert_eq!(view.device_keys(), vec![d1.key(), d3.key()]);
    assert!(!view.contains(&d2.key()).unwrap());
    assert!(view.presence_keys().iter().all(|(k, _)| *k != d2.key()));
}

#[test]
fn removing_absent_device_leaves_state_unchanged() {
    let view = view_with(ViewPredicates::accept_all());
    let d1 = device("802.11", "00:00:00:00:00:01", -50);
    let stranger = device("802.11", "00:00:00:00:00:09", -50);
    view.on_device_created(&d1).unwrap();

    let keys_before = view.device_keys();
    let presence_before = view.presence_keys();

    assert_eq!(view.on_device_removed(&stranger).unwrap(), MembershipChange::Unchanged);
    assert_eq!(view.on_device_removed(&stranger).unwrap(), MembershipChange::Unchanged);

    assert_eq!(view.device_keys(), keys_before);
    assert_eq!(view.presence_keys(), presence_before);
}

#[test]
fn snapshot_and_work_filters_and_sorts_descending() {
    let view = view_with(ViewPredicates::accept_all());
    for (i, signal) in [-40, -70, -30].into_iter().enumerate() {
        view.on_device_created(&device("802.11", &format!("00:00:00:00:00:0{i}"), signal))
            .unwrap();
    }

    let worker = MatcherWorker::new(|d: &DeviceRef| d.read(|s| s.signal_dbm > -50))
        .sorted_by(|a, b| b.read(|s| s.signal_dbm).cmp(&a.read(|s| s.signal_dbm)));
    let result = view.snapshot_and_work(&worker).unwrap();

    let signals: Vec<i32> = result.iter().map(|d| d.read(|s| s.signal_dbm)).collect();
    assert_eq!(signals, vec![-30, -40]);
    // the view itself is untouched by the read
    assert_eq!(view.len().unwrap(), 3);
}

#[test]
fn work_chains_on_isolated_list() {
    let view = view_with(ViewPredicates::accept_all());
    for (i, signal) in [-40, -70, -30, -90].into_iter().enumerate() {
        view.on_device_created(&device("802.11", &format!("00:00:00:00:00:0{i}"), signal))
            .unwrap();
    }

    let stage1 = view
        .snapshot_and_work(&SignalRangeWorker { min: -80, max: -35 })
        .unwrap();
    let stage2 = DeviceView::work(
        &MatcherWorker::new(|_: &DeviceRef| true).sorted_by(|a, b| {
            a.read(|s| s.signal_dbm).cmp(&b.read(|s| s.signal_dbm))
        }),
        stage1,
    );

    let signals: Vec<i32> = stage2.iter().map(|d| d.read(|s| s.signal_dbm)).collect();
    assert_eq!(signals, vec![-70, -40]);
}

#[test]
fn serialize_summary_reports_size() {
    let view = DeviceView::new("phy-802.11", "IEEE802.11 devices", ViewPredicates::accept_all(), TIMEOUT);
    view.on_device_created(&device("802.11", "00:00:00:00:00:01", -50)).unwrap();
    view.on_device_created(&device("802.11", "00:00:00:00:00:02", -50)).unwrap();

    let mut out = Vec::new();
    view.serialize_summary(&mut out).unwrap();
    let summary: ViewSummary = serde_json::from_slice(&out).unwrap();

    assert_eq!(summary.id, "phy-802.11");
    assert_eq!(summary.description, "IEEE802.11 devices");
    assert_eq!(summary.uuid, view.uuid());
    assert_eq!(summary.size, 2);
    assert_eq!(summary, view.summary().unwrap());
}

#[test]
fn serialize_summary_nested_read_survives_queued_writers() {
    let view = Arc::new(view_with(ViewPredicates::accept_all()));
    let writer = {
        let view = Arc::clone(&view);
        thread::spawn(move || {
            for i in 0..200u32 {
                let d = device("802.11", &format!("aa:{i}"), -50);
                view.on_device_created(&d).unwrap();
            }
        })
    };

    for _ in 0..200 {
        let mut out = Vec::new();
        view.serialize_summary(&mut out).unwrap();
    }
    writer.join().unwrap();
    assert_eq!(view.len().unwrap(), 200);
}

#[test]
#[traced_test]
fn lock_timeout_is_surfaced_and_leaves_state_intact() {
    let view = Arc::new(DeviceView::new(
        "contended",
        "contended view",
        ViewPredicates::accept_all(),
        Duration::from_millis(20),
    ));
    let (tx, rx) = mpsc::channel();
    let holder = {
        let view = Arc::clone(&view);
        thread::spawn(move || {
            view.hold_write_lock(Duration::from_millis(300), || tx.send(()).unwrap());
        })
    };
    rx.recv().unwrap();

    let d1 = device("802.11", "00:00:00:00:00:01", -50);
    let err = view.on_device_created(&d1).unwrap_err();
    assert!(matches!(
        err,
        Error::View(ViewError::LockTimeout { op: "on_device_created", .. })
    ));
    assert!(matches!(
        view.snapshot_and_work(&TimeWorker { since: 0 }),
        Err(Error::View(ViewError::LockTimeout { .. }))
    ));

    holder.join().unwrap();
    assert!(view.device_keys().is_empty());
    assert_consistent(&view);
    assert!(logs_contain("view lock acquisition timed out"));
}

#[test]
fn shutdown_moves_to_destroyed_and_rejects_operations() {
    let view = view_with(ViewPredicates::accept_all());
    let d1 = device("802.11", "00:00:00:00:00:01", -50);
    view.on_device_created(&d1).unwrap();
    let snapshot = view.snapshot_and_work(&TimeWorker { since: 0 }).unwrap();

    assert_eq!(view.lifecycle(), Lifecycle::Active);
    view.shutdown().unwrap();
    assert_eq!(view.lifecycle(), Lifecycle::Destroyed);
    // idempotent
    view.shutdown().unwrap();

    assert!(matches!(view.on_device_created(&d1), Err(Error::View(ViewError::Closed(_)))));
    assert!(matches!(view.len(), Err(Error::View(ViewError::Closed(_)))));
    assert!(matches!(view.serialize_summary(Vec::new()), Err(Error::View(ViewError::Closed(_)))));

    // worker output taken before teardown still holds live device handles
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].key(), d1.key());
}

#[test]
fn random_operation_sequences_keep_index_consistent() {
    let view = view_with(ViewPredicates::new(|_| true, signal_above(-60)));
    let pool: Vec<_> = (0..16).map(|i| device("802.11", &format!("00:00:00:00:01:{i:02}"), -50)).collect();
    let mut rng = rand::thread_rng();

    for _ in 0..2_000 {
        let d = &pool[rng.gen_range(0..pool.len())];
        match rng.gen_range(0..3) {
            0 => {
                view.on_device_created(d).unwrap();
            }
            1 => {
                d.update(|s| s.signal_dbm = rng.gen_range(-90..-30));
                view.on_device_updated(d).unwrap();
            }
            _ => {
                view.on_device_removed(d).unwrap();
            }
        }
    }

    assert_consistent(&view);
}

#[test]
fn concurrent_readers_see_whole_devices() {
    let view = Arc::new(view_with(ViewPredicates::accept_all()));
    let devices: Vec<_> = (0..32).map(|i| device("802.11", &format!("00:00:00:00:02:{i:02}"), -50)).collect();
    for d in &devices {
        view.on_device_created(d).unwrap();
    }

    let writers: Vec<_> = (0..4)
        .map(|w| {
            let view = Arc::clone(&view);
            let devices = devices.clone();
            thread::spawn(move || {
                for round in 0..200i64 {
                    let d = &devices[(round as usize + w) % devices.len()];
                    d.update(|s| {
                        s.first_time = round;
                        s.last_time = round;
                    });
                    if round % 3 == 0 {
                        view.on_device_removed(d).unwrap();
                    } else {
                        view.on_device_updated(d).unwrap();
                    }
                }
            })
        })
        .collect();

    let worker = MatcherWorker::new(|_: &DeviceRef| true).sorted_by(|a, b| a.key().cmp(&b.key()));
    for _ in 0..200 {
        let out = view.snapshot_and_work(&worker).unwrap();
        for d in out {
            let s = d.snapshot();
            assert_eq!(s.first_time, s.last_time);
        }
    }

    for w in writers {
        w.join().unwrap();
    }
    assert_consistent(&view);
}

#[test]
fn seen_since_tracks_recent_devices() {
    let view = view_with(ViewPredicates::uniform(seen_since(100)));
    let stale = device("802.11", "00:00:00:00:00:01", -50);
    stale.update(|s| s.last_time = 99);
    let fresh = device("802.11", "00:00:00:00:00:02", -50);
    fresh.update(|s| s.last_time = 100);

    view.on_device_created(&stale).unwrap();
    view.on_device_created(&fresh).unwrap();
    assert_eq!(view.device_keys(), vec![fresh.key()]);

    stale.update(|s| s.last_time = 150);
    assert_eq!(view.on_device_updated(&stale).unwrap(), MembershipChange::Added);
    assert_eq!(view.device_keys(), vec![fresh.key(), stale.key()]);
    assert_consistent(&view);
}

#[test]
fn retired_device_is_never_admitted() {
    let view = view_with(ViewPredicates::accept_all());
    let d1 = device("802.11", "00:00:00:00:00:01", -50);
    let d2 = device("802.11", "00:00:00:00:00:02", -50);
    view.on_device_created(&d1).unwrap();

    d1.set_retired(true);
    d2.set_retired(true);
    assert_eq!(view.on_device_updated(&d1).unwrap(), MembershipChange::Removed);
    assert_eq!(view.on_device_created(&d2).unwrap(), MembershipChange::Unchanged);
    assert!(view.is_empty().unwrap());

    d2.set_retired(false);
    assert_eq!(view.on_device_updated(&d2).unwrap(), MembershipChange::Added);
    assert_consistent(&view);
}
