use std::collections::HashMap;
use std::io;
use std::time::Duration;

use parking_lot::RwLock;
use parking_lot::RwLockReadGuard;
use parking_lot::RwLockWriteGuard;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::ViewPredicates;
use super::ViewWorker;
use crate::DeviceKey;
use crate::DeviceRef;
use crate::Result;
use crate::ViewError;
use crate::VIEW_LOCK_TIMEOUTS_METRIC;
use crate::VIEW_MUTATIONS_METRIC;
use crate::VIEW_SIZE_METRIC;

/// Lifecycle of a view: `Active -> Draining -> Destroyed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Active,
    Draining,
    Destroyed,
}

/// Outcome of one registry-driven mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipChange {
    Added,
    Removed,
    Unchanged,
}

/// Exported view metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewSummary {
    pub id: String,
    pub uuid: String,
    pub description: String,
    pub size: usize,
}

struct ViewState {
    /// Ordered device list; order is append order, read-time workers sort
    devices: Vec<DeviceRef>,
    /// Presence map for fast membership checks during updates
    presence: HashMap<DeviceKey, bool>,
    lifecycle: Lifecycle,
}

impl ViewState {
    fn is_present(
        &self,
        key: &DeviceKey,
    ) -> bool {
        self.presence.get(key).copied().unwrap_or(false)
    }

    fn insert(
        &mut self,
        device: &DeviceRef,
    ) -> MembershipChange {
        let key = device.key();
        if self.is_present(&key) {
            return MembershipChange::Unchanged;
        }
        self.devices.push(DeviceRef::clone(device));
        self.presence.insert(key, true);
        MembershipChange::Added
    }

    /// Linear scan; preserves the relative order of the remaining devices
    fn evict(
        &mut self,
        key: &DeviceKey,
    ) -> MembershipChange {
        if self.presence.remove(key).is_none() {
            return MembershipChange::Unchanged;
        }
        if let Some(pos) = self.devices.iter().position(|d| d.key() == *key) {
            self.devices.remove(pos);
        }
        MembershipChange::Removed
    }
}

/// A filtered projection of the live device set.
///
/// Mutation entry points are crate-private: only the
/// [`DeviceRegistry`](crate::DeviceRegistry) drives them, so the membership
/// predicates are always invoked with the intended discipline.
pub struct DeviceView {
    id: String,
    uuid: String,
    description: String,
    predicates: ViewPredicates,
    lock_timeout: Duration,
    state: RwLock<ViewState>,
}

impl std::fmt::Debug for DeviceView {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("DeviceView")
            .field("id", &self.id)
            .field("uuid", &self.uuid)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl DeviceView {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        predicates: ViewPredicates,
        lock_timeout: Duration,
    ) -> Self {
        let id = id.into();
        VIEW_SIZE_METRIC.with_label_values(&[&id]).set(0);
        Self {
            id,
            uuid: nanoid::nanoid!(),
            description: description.into(),
            predicates,
            lock_timeout,
            state: RwLock::new(ViewState {
                devices: Vec::new(),
                presence: HashMap::new(),
                lifecycle: Lifecycle::Active,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.state.read_recursive().lifecycle
    }

    fn lock_timeout_error(
        &self,
        op: &'static str,
    ) -> ViewError {
        VIEW_LOCK_TIMEOUTS_METRIC.with_label_values(&[&self.id]).inc();
        warn!(view = %self.id, op, timeout = ?self.lock_timeout, "view lock acquisition timed out");
        ViewError::LockTimeout {
            view: self.id.clone(),
            op,
        }
    }

    fn write_state(
        &self,
        op: &'static str,
    ) -> Result<RwLockWriteGuard<'_, ViewState>> {
        let guard = self
            .state
            .try_write_for(self.lock_timeout)
            .ok_or_else(|| self.lock_timeout_error(op))?;
        if guard.lifecycle != Lifecycle::Active {
            return Err(ViewError::Closed(self.id.clone()).into());
        }
        Ok(guard)
    }

    /// Shared acquisition that may nest on the same thread even while a
    /// writer is queued.
    fn read_state(
        &self,
        op: &'static str,
    ) -> Result<RwLockReadGuard<'_, ViewState>> {
        let guard = self
            .state
            .try_read_recursive_for(self.lock_timeout)
            .ok_or_else(|| self.lock_timeout_error(op))?;
        if guard.lifecycle != Lifecycle::Active {
            return Err(ViewError::Closed(self.id.clone()).into());
        }
        Ok(guard)
    }

    fn record_change(
        &self,
        change: MembershipChange,
        size: usize,
    ) {
        let op = match change {
            MembershipChange::Added => "added",
            MembershipChange::Removed => "removed",
            MembershipChange::Unchanged => return,
        };
        VIEW_MUTATIONS_METRIC.with_label_values(&[&self.id, op]).inc();
        VIEW_SIZE_METRIC.with_label_values(&[&self.id]).set(size as i64);
    }

    /// A brand-new device appeared in the registry.
    pub(crate) fn on_device_created(
        &self,
        device: &DeviceRef,
    ) -> Result<MembershipChange> {
        let mut state = self.write_state("on_device_created")?;

        let change = if !device.is_retired() && self.predicates.admits_new(device) {
            state.insert(device)
        } else {
            MembershipChange::Unchanged
        };

        self.record_change(change, state.devices.len());
        trace!(view = %self.id, key = %device.key(), ?change, "device created");
        Ok(change)
    }

    /// A filter-relevant change happened on `device`.
    ///
    /// Rejection by the update predicate evicts a present device; acceptance
    /// admits an absent one at the end of the list. Present devices are never
    /// reordered.
    pub(crate) fn on_device_updated(
        &self,
        device: &DeviceRef,
    ) -> Result<MembershipChange> {
        let mut state = self.write_state("on_device_updated")?;

        let key = device.key();
        // a device being purged is treated as rejected
        let retain = !device.is_retired() && self.predicates.retains(device);
        let change = match (retain, state.is_present(&key)) {
            (false, true) => state.evict(&key),
            (true, false) => state.insert(device),
            _ => MembershipChange::Unchanged,
        };

        self.record_change(change, state.devices.len());
        trace!(view = %self.id, key = %key, ?change, "device updated");
        Ok(change)
    }

    /// The device was purged from the registry; idempotent.
    pub(crate) fn on_device_removed(
        &self,
        device: &DeviceRef,
    ) -> Result<MembershipChange> {
        let mut state = self.write_state("on_device_removed")?;

        let change = state.evict(&device.key());

        self.record_change(change, state.devices.len());
        trace!(view = %self.id, key = %device.key(), ?change, "device removed");
        Ok(change)
    }

    /// Copy the device list under a shared lock, then run `worker` on the
    /// copy with no lock held.
    pub fn snapshot_and_work<W>(
        &self,
        worker: &W,
    ) -> Result<Vec<DeviceRef>>
    where
        W: ViewWorker + ?Sized,
    {
        let snapshot = self.snapshot("snapshot_and_work")?;
        Ok(Self::work(worker, snapshot))
    }

    /// Copy of the device list taken under the shared lock
    pub fn snapshot_devices(&self) -> Result<Vec<DeviceRef>> {
        self.snapshot("snapshot_devices")
    }

    fn snapshot(
        &self,
        op: &'static str,
    ) -> Result<Vec<DeviceRef>> {
        Ok(self.read_state(op)?.devices.clone())
    }

    /// Run `worker` on a list the caller already isolated, e.g. the output of
    /// a previous stage. Ownership of `devices` is the isolation guarantee.
    pub fn work<W>(
        worker: &W,
        devices: Vec<DeviceRef>,
    ) -> Vec<DeviceRef>
    where
        W: ViewWorker + ?Sized,
    {
        worker.work(devices)
    }

    /// Emit the view metadata as JSON. The shared lock is held for the whole
    /// emission so the size cannot drift while it is written.
    pub fn serialize_summary<Wr: io::Write>(
        &self,
        writer: Wr,
    ) -> Result<()> {
        let _guard = self.read_state("serialize_summary")?;
        let summary = ViewSummary {
            id: self.id.clone(),
            uuid: self.uuid.clone(),
            description: self.description.clone(),
            // nested shared acquisition on the same thread
            size: self.len()?,
        };
        serde_json::to_writer(writer, &summary)?;
        Ok(())
    }

    pub fn summary(&self) -> Result<ViewSummary> {
        let state = self.read_state("summary")?;
        Ok(ViewSummary {
            id: self.id.clone(),
            uuid: self.uuid.clone(),
            description: self.description.clone(),
            size: state.devices.len(),
        })
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read_state("len")?.devices.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn contains(
        &self,
        key: &DeviceKey,
    ) -> Result<bool> {
        Ok(self.read_state("contains")?.is_present(key))
    }

    /// Drain and destroy the view.
    ///
    /// Waits for shared holders (summary emission, snapshot copies) to finish.
    /// Workers that already hold a snapshot keep valid device handles.
    pub(crate) fn shutdown(&self) -> Result<()> {
        let mut state = self
            .state
            .try_write_for(self.lock_timeout)
            .ok_or_else(|| self.lock_timeout_error("shutdown"))?;
        if state.lifecycle == Lifecycle::Destroyed {
            return Ok(());
        }

        // only observable under this exclusive section
        state.lifecycle = Lifecycle::Draining;
        let released = std::mem::take(&mut state.devices).len();
        state.presence.clear();
        state.lifecycle = Lifecycle::Destroyed;

        let _ = VIEW_SIZE_METRIC.remove_label_values(&[&self.id]);
        debug!(view = %self.id, released, "view destroyed");
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn device_keys(&self) -> Vec<DeviceKey> {
        self.state.read().devices.iter().map(|d| d.key()).collect()
    }

    #[cfg(test)]
    pub(crate) fn presence_keys(&self) -> Vec<(DeviceKey, bool)> {
        let mut keys: Vec<_> = self.state.read().presence.iter().map(|(k, v)| (*k, *v)).collect();
        keys.sort();
        keys
    }

    /// Hold the exclusive lock for `hold`; test-only contention
    #[cfg(test)]
    pub(crate) fn hold_write_lock(
        &self,
        hold: Duration,
        on_acquired: impl FnOnce(),
    ) {
        let _guard = self.state.write();
        on_acquired();
        std::thread::sleep(hold);
    }
}
