//! The live device set and the views it drives.
//!
//! Devices live in a sharded map; the list of views is copy-on-write so that
//! event fan-out never blocks on view registration. A coarse lifecycle lock
//! keeps view registration and device events apart: device events share it,
//! `add_view` / `remove_view` / `shutdown` take it exclusively. That is what
//! guarantees a newly registered view sees every device exactly once, either
//! through the replay or through the live event.
//!
//! Lock order is map shard, then view lock, then device lock. Device state is
//! mutated before any view is notified and no device lock is held across a
//! view call. Removal is the one path that keeps its map entry locked while
//! views are notified: the key stays tracked until every view let go of it.


use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use autometrics::autometrics;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::by_phy;
use crate::signal_above;
use crate::DeviceHistory;
use crate::DeviceIdentity;
use crate::DeviceKey;
use crate::DeviceRef;
use crate::DeviceState;
use crate::DeviceView;
use crate::MembershipChange;
use crate::RegistryError;
use crate::Result;
use crate::TrackedDevice;
use crate::ViewPredicates;
use crate::ViewsConfig;
use crate::API_SLO;
use crate::TRACKED_DEVICES_METRIC;

const REGISTRY_LABEL: &str = "devices";

pub struct DeviceRegistry {
    devices: DashMap<DeviceKey, DeviceRef>,
    views: ArcSwap<Vec<Arc<DeviceView>>>,
    /// Shared by device events, exclusive for view registration
    lifecycle: RwLock<()>,
    history: Option<DeviceHistory>,
    config: ViewsConfig,
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("devices", &self.devices.len())
            .field("views", &self.views.load().len())
            .finish()
    }
}

impl DeviceRegistry {
    pub fn new(config: ViewsConfig) -> Self {
        TRACKED_DEVICES_METRIC.with_label_values(&[REGISTRY_LABEL]).set(0);
        Self {
            devices: DashMap::new(),
            views: ArcSwap::from_pointee(Vec::new()),
            lifecycle: RwLock::new(()),
            history: None,
            config,
        }
    }

    /// Archive removed devices into `history`
    pub fn with_history(
        mut self,
        history: DeviceHistory,
    ) -> Self {
        self.history = Some(history);
        self
    }

    pub fn lock_timeout(&self) -> Duration {
        self.config.lock_timeout()
    }

    pub fn max_page_size(&self) -> usize {
        self.config.max_page_size
    }

    /// Register the built-in views: `all`, one `phy-<name>` per configured phy
    /// and `strong`.
    pub fn register_default_views(&self) -> Result<()> {
        self.add_view("all", "All devices", ViewPredicates::accept_all())?;

        for phy in &self.config.default_phys {
            self.add_view(
                &format!("phy-{phy}"),
                &format!("{phy} devices"),
                ViewPredicates::uniform(by_phy(phy.as_str())),
            )?;
        }

        let threshold = self.config.strong_signal_dbm;
        self.add_view(
            "strong",
            &format!("Devices with signal above {threshold} dBm"),
            ViewPredicates::uniform(signal_above(threshold)),
        )?;
        Ok(())
    }

    /// Register a view and replay every known device through its creation
    /// predicate, oldest first.
    #[autometrics(objective = API_SLO)]
    pub fn add_view(
        &self,
        id: &str,
        description: &str,
        predicates: ViewPredicates,
    ) -> Result<Arc<DeviceView>> {
        let _guard = self.lifecycle.write();

        if self.views.load().iter().any(|v| v.id() == id) {
            return Err(RegistryError::DuplicateView(id.to_string()).into());
        }

        let view = Arc::new(DeviceView::new(id, description, predicates, self.lock_timeout()));

        let mut known: Vec<DeviceRef> = self.devices.iter().map(|e| DeviceRef::clone(e.value())).collect();
        known.sort_by_key(|d| (d.read(|s| s.first_time), d.key()));
        for device in &known {
            view.on_device_created(device)?;
        }

        let mut next = Vec::clone(&self.views.load());
        next.push(Arc::clone(&view));
        self.views.store(Arc::new(next));

        info!(view = %id, replayed = known.len(), "view registered");
        Ok(view)
    }

    #[autometrics(objective = API_SLO)]
    pub fn remove_view(
        &self,
        id: &str,
    ) -> Result<()> {
        let _guard = self.lifecycle.write();

        let current = self.views.load_full();
        let view = current
            .iter()
            .find(|v| v.id() == id)
            .cloned()
            .ok_or_else(|| RegistryError::ViewNotFound(id.to_string()))?;

        let next: Vec<_> = current.iter().filter(|v| v.id() != id).cloned().collect();
        self.views.store(Arc::new(next));

        info!(view = %id, "view unregistered");
        view.shutdown()
    }

    pub fn view(
        &self,
        id: &str,
    ) -> Option<Arc<DeviceView>> {
        self.views.load().iter().find(|v| v.id() == id).cloned()
    }

    pub fn views(&self) -> Vec<Arc<DeviceView>> {
        Vec::clone(&self.views.load())
    }

    pub fn device(
        &self,
        key: DeviceKey,
    ) -> Option<DeviceRef> {
        self.devices.get(&key).map(|d| DeviceRef::clone(d.value()))
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Find or create the device behind `identity` and apply `f` to its state.
    ///
    /// A brand-new device is offered to every view's creation predicate once;
    /// a known device is routed through the update predicates.
    pub fn observe(
        &self,
        identity: DeviceIdentity,
        f: impl FnOnce(&mut DeviceState),
    ) -> Result<DeviceRef> {
        let _guard = self.lifecycle.read();

        // mutate under the entry so a concurrent purge sees the new state
        let (device, created) = match self.devices.entry(identity.key) {
            Entry::Occupied(e) => {
                let device = DeviceRef::clone(e.get());
                device.update(f);
                (device, false)
            }
            Entry::Vacant(e) => {
                let device = TrackedDevice::new(identity, DeviceState::default());
                device.update(f);
                e.insert(DeviceRef::clone(&device));
                (device, true)
            }
        };

        if created {
            self.record_count();
            debug!(key = %device.key(), mac = device.macaddr(), "new device");
            self.notify("on_device_created", |view| view.on_device_created(&device))?;
        } else {
            self.notify("on_device_updated", |view| view.on_device_updated(&device))?;
        }
        Ok(device)
    }

    /// Mutate a known device. Views only re-evaluate it when the change is
    /// `relevant` to their filters.
    pub fn update_device<R>(
        &self,
        key: DeviceKey,
        f: impl FnOnce(&mut DeviceState) -> R,
        relevant: bool,
    ) -> Result<R> {
        let _guard = self.lifecycle.read();

        let (device, out) = {
            let entry = self
                .devices
                .get(&key)
                .ok_or_else(|| RegistryError::DeviceNotFound(key.to_string()))?;
            let out = entry.value().update(f);
            (DeviceRef::clone(entry.value()), out)
        };

        if relevant {
            self.notify("on_device_updated", |view| view.on_device_updated(&device))?;
        }
        Ok(out)
    }

    /// Purge a device from the registry and every view, archiving it when a
    /// history store is attached.
    ///
    /// Views are evicted first. If any view fails the device stays tracked,
    /// so a later `remove_device` or `purge_idle` retries the eviction.
    #[autometrics(objective = API_SLO)]
    pub fn remove_device(
        &self,
        key: DeviceKey,
    ) -> Result<DeviceRef> {
        self.remove_device_if(key, |_| true)?
            .ok_or_else(|| RegistryError::DeviceNotFound(key.to_string()).into())
    }

    /// Remove every device last seen before `older_than`; returns how many
    /// were removed.
    #[autometrics(objective = API_SLO)]
    pub fn purge_idle(
        &self,
        older_than: i64,
    ) -> Result<usize> {
        let idle = |s: &DeviceState| s.last_time < older_than;
        let candidates: Vec<DeviceKey> = self
            .devices
            .iter()
            .filter(|e| e.value().read(idle))
            .map(|e| *e.key())
            .collect();

        let mut purged = 0;
        let mut first_err = None;
        for key in candidates {
            // idleness is re-checked under the entry; re-observed or already
            // removed devices are skipped
            match self.remove_device_if(key, idle) {
                Ok(Some(_)) => purged += 1,
                Ok(None) => {}
                Err(e) => {
                    warn!(key = %key, "failed to purge idle device: {}", e);
                    first_err.get_or_insert(e);
                }
            }
        }

        if purged > 0 {
            info!(purged, older_than, "purged idle devices");
        }
        first_err.map_or(Ok(purged), Err)
    }

    /// Remove `key` when `doomed` holds for its current state. `Ok(None)` when
    /// the key is not tracked or `doomed` rejected it.
    fn remove_device_if(
        &self,
        key: DeviceKey,
        doomed: impl Fn(&DeviceState) -> bool,
    ) -> Result<Option<DeviceRef>> {
        let _guard = self.lifecycle.read();

        let entry = match self.devices.entry(key) {
            Entry::Occupied(e) => e,
            Entry::Vacant(_) => return Ok(None),
        };
        let device = DeviceRef::clone(entry.get());
        if !device.read(&doomed) {
            return Ok(None);
        }

        device.set_retired(true);
        if let Err(e) = self.notify("on_device_removed", |view| view.on_device_removed(&device)) {
            device.set_retired(false);
            return Err(e);
        }
        entry.remove();
        self.record_count();

        if let Some(history) = &self.history {
            history.archive(&device.record())?;
        }
        debug!(key = %key, "device removed");
        Ok(Some(device))
    }

    /// Introduce archived devices last seen at or after `since` as new
    /// devices. Keys already tracked are left alone.
    #[autometrics(objective = API_SLO)]
    pub fn hydrate(
        &self,
        history: &DeviceHistory,
        since: i64,
    ) -> Result<usize> {
        let mut loaded = 0;
        for record in history.load_since(since)? {
            let device = TrackedDevice::from_record(record)?;
            if self.introduce(device)? {
                loaded += 1;
            }
        }
        info!(loaded, since, "hydrated devices from history");
        Ok(loaded)
    }

    fn introduce(
        &self,
        device: DeviceRef,
    ) -> Result<bool> {
        let _guard = self.lifecycle.read();

        match self.devices.entry(device.key()) {
            Entry::Occupied(_) => return Ok(false),
            Entry::Vacant(e) => {
                e.insert(DeviceRef::clone(&device));
            }
        }
        self.record_count();
        self.notify("on_device_created", |view| view.on_device_created(&device))?;
        Ok(true)
    }

    /// Unregister and destroy every view, then flush the history store.
    pub fn shutdown(&self) -> Result<()> {
        let _guard = self.lifecycle.write();

        let views = self.views.swap(Arc::new(Vec::new()));
        for view in views.iter() {
            if let Err(e) = view.shutdown() {
                warn!(view = %view.id(), "view shutdown failed: {}", e);
            }
        }
        if let Some(history) = &self.history {
            history.flush()?;
        }
        info!(views = views.len(), devices = self.devices.len(), "registry shut down");
        Ok(())
    }

    /// Deliver one event to every view. A failing view does not stop delivery
    /// to the others; the first error is returned.
    fn notify(
        &self,
        op: &'static str,
        f: impl Fn(&DeviceView) -> Result<MembershipChange>,
    ) -> Result<()> {
        let views = self.views.load();
        let mut first_err = None;
        for view in views.iter() {
            if let Err(e) = f(view) {
                warn!(view = %view.id(), op, "view notification failed: {}", e);
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn record_count(&self) {
        TRACKED_DEVICES_METRIC
            .with_label_values(&[REGISTRY_LABEL])
            .set(self.devices.len() as i64);
    }
}
