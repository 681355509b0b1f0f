use super::*;
use crate::DeviceIdentity;
use crate::DeviceRef;
use crate::DeviceState;
use crate::RequestError;
use crate::TrackedDevice;

fn device(
    name: &str,
    mac: &str,
    signal: i32,
    last_time: i64,
) -> DeviceRef {
    TrackedDevice::new(
        DeviceIdentity::new("IEEE802.11", mac),
        DeviceState {
            name: name.to_string(),
            signal_dbm: signal,
            last_time,
            ..Default::default()
        },
    )
}

fn fleet() -> Vec<DeviceRef> {
    vec![
        device("Kitchen AP", "00:00:00:00:00:01", -40, 100),
        device("garage-printer", "00:00:00:00:00:02", -70, 200),
        device("Office AP", "00:00:00:00:00:03", -30, 300),
        device("phone", "aa:bb:cc:00:00:04", -55, 400),
    ]
}

fn names(devices: &[DeviceRef]) -> Vec<String> {
    devices.iter().map(|d| d.read(|s| s.name.clone())).collect()
}

#[test]
fn search_is_case_insensitive_substring() {
    let page = SearchWorker::new().with_search("ap").search(fleet());

    assert_eq!(names(&page.rows), vec!["Kitchen AP", "Office AP"]);
    assert_eq!(page.total, 4);
    assert_eq!(page.filtered, 2);
}

#[test]
fn search_matches_mac_and_phy() {
    let out = SearchWorker::new().with_search("AA:BB").work(fleet());
    assert_eq!(names(&out), vec!["phone"]);

    let out = SearchWorker::new().with_search("802.11").work(fleet());
    assert_eq!(out.len(), 4);
}

#[test]
fn blank_search_matches_everything() {
    let page = SearchWorker::new().with_search("   ").search(fleet());
    assert_eq!(page.rows.len(), 4);
    assert_eq!(page.filtered, 4);
}

#[test]
fn sort_descending_by_signal_then_page() {
    let worker = SearchWorker::new()
        .with_sort(SortField::Signal, SortDirection::Descending)
        .with_page(1, 2);
    let page = worker.search(fleet());

    assert_eq!(names(&page.rows), vec!["Kitchen AP", "phone"]);
    assert_eq!(page.filtered, 4);
    assert_eq!(names(&worker.work(fleet())), names(&page.rows));
}

#[test]
fn page_past_the_end_is_empty() {
    let page = SearchWorker::new().with_page(10, 5).search(fleet());
    assert!(page.rows.is_empty());
    assert_eq!(page.total, 4);
}

#[test]
fn sort_is_stable_for_ties() {
    let devices = vec![
        device("b", "00:00:00:00:00:01", -50, 1),
        device("a", "00:00:00:00:00:02", -50, 1),
        device("c", "00:00:00:00:00:03", -50, 1),
    ];
    let asc = SearchWorker::new()
        .with_sort(SortField::Signal, SortDirection::Ascending)
        .work(devices.clone());
    let desc = SearchWorker::new()
        .with_sort(SortField::Signal, SortDirection::Descending)
        .work(devices);

    assert_eq!(names(&asc), vec!["b", "a", "c"]);
    assert_eq!(names(&desc), vec!["b", "a", "c"]);
}

#[test]
fn time_worker_keeps_recent_devices() {
    let out = TimeWorker { since: 300 }.work(fleet());
    assert_eq!(names(&out), vec!["Office AP", "phone"]);
}

#[test]
fn signal_range_is_inclusive() {
    let out = SignalRangeWorker { min: -55, max: -40 }.work(fleet());
    assert_eq!(names(&out), vec!["Kitchen AP", "phone"]);
}

#[test]
fn parse_sort_field_and_direction() {
    assert_eq!("last_time".parse::<SortField>().unwrap(), SortField::LastTime);
    assert_eq!("phy".parse::<SortField>().unwrap(), SortField::Phy);
    assert_eq!("DESC".parse::<SortDirection>().unwrap(), SortDirection::Descending);
    assert!(matches!(
        "bogus".parse::<SortField>(),
        Err(RequestError::InvalidSortField(f)) if f == "bogus"
    ));
    assert!(matches!(
        "sideways".parse::<SortDirection>(),
        Err(RequestError::InvalidDirection(_))
    ));
}

#[test]
fn shared_worker_reports_counts_per_run() {
    let worker = std::sync::Arc::new(SearchWorker::new().with_search("ap"));

    let handles: Vec<_> = (0..4)
        .map(|n| {
            let worker = std::sync::Arc::clone(&worker);
            std::thread::spawn(move || {
                let devices: Vec<DeviceRef> = fleet().into_iter().take(n + 1).collect();
                let expected_filtered = names(&devices)
                    .iter()
                    .filter(|name| name.ends_with("AP"))
                    .count();
                for _ in 0..200 {
                    let page = worker.search(devices.clone());
                    assert_eq!(page.total, n + 1);
                    assert_eq!(page.filtered, expected_filtered);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}
