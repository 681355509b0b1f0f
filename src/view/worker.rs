//! Read-time strategies applied to a view snapshot.
//!
//! Workers run after the view has released its lock and must never call back
//! into the view that produced their input.

use std::cmp::Ordering;
use std::str::FromStr;

use crate::DeviceRef;
use crate::DeviceState;
use crate::RequestError;

pub trait ViewWorker: Send + Sync {
    /// Filter, order or otherwise transform one batch of devices
    fn work(
        &self,
        devices: Vec<DeviceRef>,
    ) -> Vec<DeviceRef>;
}

pub type DeviceComparator = Box<dyn Fn(&DeviceRef, &DeviceRef) -> Ordering + Send + Sync>;

/// Keeps devices accepted by `matcher`, optionally ordered by a comparator.
pub struct MatcherWorker<F> {
    matcher: F,
    comparator: Option<DeviceComparator>,
}

impl<F> MatcherWorker<F>
where
    F: Fn(&DeviceRef) -> bool + Send + Sync,
{
    pub fn new(matcher: F) -> Self {
        Self {
            matcher,
            comparator: None,
        }
    }

    pub fn sorted_by<C>(
        mut self,
        comparator: C,
    ) -> Self
    where
        C: Fn(&DeviceRef, &DeviceRef) -> Ordering + Send + Sync + 'static,
    {
        self.comparator = Some(Box::new(comparator));
        self
    }
}

impl<F> ViewWorker for MatcherWorker<F>
where
    F: Fn(&DeviceRef) -> bool + Send + Sync,
{
    fn work(
        &self,
        devices: Vec<DeviceRef>,
    ) -> Vec<DeviceRef> {
        let mut kept: Vec<DeviceRef> = devices.into_iter().filter(|d| (self.matcher)(d)).collect();
        if let Some(cmp) = &self.comparator {
            kept.sort_by(|a, b| cmp(a, b));
        }
        kept
    }
}

/// Devices last seen at or after `since`
#[derive(Debug, Clone, Copy)]
pub struct TimeWorker {
    pub since: i64,
}

impl ViewWorker for TimeWorker {
    fn work(
        &self,
        devices: Vec<DeviceRef>,
    ) -> Vec<DeviceRef> {
        devices
            .into_iter()
            .filter(|d| d.read(|s| s.last_time >= self.since))
            .collect()
    }
}

/// Devices whose current signal lies in `[min, max]`
#[derive(Debug, Clone, Copy)]
pub struct SignalRangeWorker {
    pub min: i32,
    pub max: i32,
}

impl ViewWorker for SignalRangeWorker {
    fn work(
        &self,
        devices: Vec<DeviceRef>,
    ) -> Vec<DeviceRef> {
        devices
            .into_iter()
            .filter(|d| d.read(|s| (self.min..=self.max).contains(&s.signal_dbm)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Name,
    MacAddr,
    Phy,
    DeviceType,
    Channel,
    Signal,
    MaxSignal,
    Packets,
    FirstTime,
    LastTime,
}

impl SortField {
    fn compare(
        &self,
        a: &(DeviceRef, DeviceState),
        b: &(DeviceRef, DeviceState),
    ) -> Ordering {
        let (da, sa) = a;
        let (db, sb) = b;
        match self {
            SortField::Name => sa.name.cmp(&sb.name),
            SortField::MacAddr => da.macaddr().cmp(db.macaddr()),
            SortField::Phy => da.phyname().cmp(db.phyname()),
            SortField::DeviceType => sa.device_type.cmp(&sb.device_type),
            SortField::Channel => sa.channel.cmp(&sb.channel),
            SortField::Signal => sa.signal_dbm.cmp(&sb.signal_dbm),
            SortField::MaxSignal => sa.max_signal_dbm.cmp(&sb.max_signal_dbm),
            SortField::Packets => sa.packets.cmp(&sb.packets),
            SortField::FirstTime => sa.first_time.cmp(&sb.first_time),
            SortField::LastTime => sa.last_time.cmp(&sb.last_time),
        }
    }
}

impl FromStr for SortField {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(SortField::Name),
            "macaddr" => Ok(SortField::MacAddr),
            "phyname" | "phy" => Ok(SortField::Phy),
            "device_type" | "type" => Ok(SortField::DeviceType),
            "channel" => Ok(SortField::Channel),
            "signal" | "signal_dbm" => Ok(SortField::Signal),
            "max_signal" | "max_signal_dbm" => Ok(SortField::MaxSignal),
            "packets" => Ok(SortField::Packets),
            "first_time" => Ok(SortField::FirstTime),
            "last_time" => Ok(SortField::LastTime),
            other => Err(RequestError::InvalidSortField(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl FromStr for SortDirection {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Ascending),
            "desc" | "descending" => Ok(SortDirection::Descending),
            _ => Err(RequestError::InvalidDirection(s.to_string())),
        }
    }
}

/// Free-text search, column sort and pagination in one pass.
///
/// Matching is a case-insensitive substring test over name, type, channel,
/// MAC, phy and key. Sorting is stable, so ties keep snapshot order.
/// Pagination is applied last; a `length` of 0 returns every row from `start`.
#[derive(Debug, Default)]
pub struct SearchWorker {
    term: Option<String>,
    sort: Option<(SortField, SortDirection)>,
    start: usize,
    length: usize,
}

/// One page of a search together with the counts of the run that produced it
#[derive(Debug)]
pub struct SearchPage {
    /// Devices handed to the search
    pub total: usize,
    /// Devices that matched the search term
    pub filtered: usize,
    pub rows: Vec<DeviceRef>,
}

impl SearchWorker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search(
        mut self,
        term: impl AsRef<str>,
    ) -> Self {
        let term = term.as_ref().trim();
        self.term = (!term.is_empty()).then(|| term.to_lowercase());
        self
    }

    pub fn with_sort(
        mut self,
        field: SortField,
        direction: SortDirection,
    ) -> Self {
        self.sort = Some((field, direction));
        self
    }

    pub fn with_page(
        mut self,
        start: usize,
        length: usize,
    ) -> Self {
        self.start = start;
        self.length = length;
        self
    }

    fn matches(
        &self,
        device: &DeviceRef,
        state: &DeviceState,
    ) -> bool {
        let Some(term) = &self.term else {
            return true;
        };
        let contains = |field: &str| field.to_lowercase().contains(term.as_str());

        contains(&state.name)
            || contains(&state.device_type)
            || contains(&state.channel)
            || contains(device.macaddr())
            || contains(device.phyname())
            || contains(&device.key().to_string())
    }
}

impl SearchWorker {
    pub fn search(
        &self,
        devices: Vec<DeviceRef>,
    ) -> SearchPage {
        let total = devices.len();

        let mut rows: Vec<(DeviceRef, DeviceState)> = devices
            .into_iter()
            .map(|d| {
                let state = d.snapshot();
                (d, state)
            })
            .filter(|(d, s)| self.matches(d, s))
            .collect();
        let filtered = rows.len();

        if let Some((field, direction)) = self.sort {
            rows.sort_by(|a, b| {
                let ord = field.compare(a, b);
                match direction {
                    SortDirection::Ascending => ord,
                    SortDirection::Descending => ord.reverse(),
                }
            });
        }

        let page = rows.into_iter().skip(self.start).map(|(d, _)| d);
        let rows = if self.length == 0 {
            page.collect()
        } else {
            page.take(self.length).collect()
        };
        SearchPage { total, filtered, rows }
    }
}

impl ViewWorker for SearchWorker {
    fn work(
        &self,
        devices: Vec<DeviceRef>,
    ) -> Vec<DeviceRef> {
        self.search(devices).rows
    }
}
