//! Tracked device handles shared between the registry and every view.
//!
//! A device has an immutable identity (key, MAC, phy) and a mutable
//! [`DeviceState`] guarded by its own lock. Views and workers only ever hold
//! [`DeviceRef`] clones; they never copy device state into their own storage.

mod key;

pub use key::*;

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Shared, reference-counted handle to a tracked device
pub type DeviceRef = Arc<TrackedDevice>;

/// Identity fields fixed for the lifetime of a device record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub key: DeviceKey,
    pub macaddr: String,
    pub phyname: String,
}

impl DeviceIdentity {
    pub fn new(
        phyname: impl Into<String>,
        macaddr: impl Into<String>,
    ) -> Self {
        let phyname = phyname.into();
        let macaddr = macaddr.into();
        Self {
            key: DeviceKey::from_parts(&phyname, &macaddr),
            macaddr,
            phyname,
        }
    }
}

/// Mutable per-device state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    pub name: String,
    pub device_type: String,
    pub channel: String,
    pub signal_dbm: i32,
    pub max_signal_dbm: i32,
    pub packets: u64,
    pub first_time: i64,
    pub last_time: i64,
}

impl DeviceState {
    /// Account one received packet at `ts` with the given signal.
    pub fn record_packet(
        &mut self,
        signal_dbm: i32,
        ts: i64,
    ) {
        if self.packets == 0 {
            self.first_time = ts;
            self.max_signal_dbm = signal_dbm;
        } else if signal_dbm > self.max_signal_dbm {
            self.max_signal_dbm = signal_dbm;
        }
        self.signal_dbm = signal_dbm;
        self.packets += 1;
        self.last_time = self.last_time.max(ts);
    }
}

pub struct TrackedDevice {
    identity: DeviceIdentity,
    state: RwLock<DeviceState>,
    /// Set while the registry is purging this device; views refuse to admit it
    retired: AtomicBool,
}

impl std::fmt::Debug for TrackedDevice {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("TrackedDevice")
            .field("key", &self.identity.key)
            .field("macaddr", &self.identity.macaddr)
            .field("phyname", &self.identity.phyname)
            .finish_non_exhaustive()
    }
}

impl TrackedDevice {
    pub fn new(
        identity: DeviceIdentity,
        state: DeviceState,
    ) -> DeviceRef {
        Arc::new(Self {
            identity,
            state: RwLock::new(state),
            retired: AtomicBool::new(false),
        })
    }

    pub fn from_record(record: DeviceRecord) -> Result<DeviceRef> {
        let key = record.key.parse::<DeviceKey>()?;
        Ok(Self::new(
            DeviceIdentity {
                key,
                macaddr: record.macaddr,
                phyname: record.phyname,
            },
            record.state,
        ))
    }

    pub fn key(&self) -> DeviceKey {
        self.identity.key
    }

    pub fn macaddr(&self) -> &str {
        &self.identity.macaddr
    }

    pub fn phyname(&self) -> &str {
        &self.identity.phyname
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    pub(crate) fn set_retired(
        &self,
        retired: bool,
    ) {
        self.retired.store(retired, Ordering::Release);
    }

    /// Read a value out of the current state without copying the whole record
    pub fn read<R>(
        &self,
        f: impl FnOnce(&DeviceState) -> R,
    ) -> R {
        let guard = self.state.read();
        f(&guard)
    }

    /// Apply one atomic mutation to the device state
    pub fn update<R>(
        &self,
        f: impl FnOnce(&mut DeviceState) -> R,
    ) -> R {
        let mut guard = self.state.write();
        f(&mut guard)
    }

    /// Whole-record copy; never observes a half-applied [`TrackedDevice::update`]
    pub fn snapshot(&self) -> DeviceState {
        self.state.read().clone()
    }

    pub fn record(&self) -> DeviceRecord {
        DeviceRecord {
            key: self.identity.key.to_string(),
            macaddr: self.identity.macaddr.clone(),
            phyname: self.identity.phyname.clone(),
            state: self.snapshot(),
        }
    }
}

/// Flattened export of a device, used by HTTP responses and persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub key: String,
    pub macaddr: String,
    pub phyname: String,
    #[serde(flatten)]
    pub state: DeviceState,
}
