use std::sync::Arc;

use crate::DeviceRef;

/// Membership test evaluated against a shared device handle
pub type DevicePredicate = Arc<dyn Fn(&DeviceRef) -> bool + Send + Sync>;

/// The filtering policy of one view.
///
/// `new_cb` decides whether a brand-new device joins the view; it is also
/// replayed against every known device when the view is registered.
/// `update_cb` runs on filter-relevant changes; answering `false` evicts the
/// device, answering `true` admits a device that was previously rejected.
#[derive(Clone)]
pub struct ViewPredicates {
    new_cb: DevicePredicate,
    update_cb: DevicePredicate,
}

impl std::fmt::Debug for ViewPredicates {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ViewPredicates").finish_non_exhaustive()
    }
}

impl ViewPredicates {
    pub fn new<N, U>(
        new_cb: N,
        update_cb: U,
    ) -> Self
    where
        N: Fn(&DeviceRef) -> bool + Send + Sync + 'static,
        U: Fn(&DeviceRef) -> bool + Send + Sync + 'static,
    {
        Self {
            new_cb: Arc::new(new_cb),
            update_cb: Arc::new(update_cb),
        }
    }

    /// Same policy for creation and updates
    pub fn uniform<F>(cb: F) -> Self
    where
        F: Fn(&DeviceRef) -> bool + Send + Sync + 'static,
    {
        let cb: DevicePredicate = Arc::new(cb);
        Self {
            new_cb: Arc::clone(&cb),
            update_cb: cb,
        }
    }

    pub fn accept_all() -> Self {
        Self::uniform(|_| true)
    }

    pub(crate) fn admits_new(
        &self,
        device: &DeviceRef,
    ) -> bool {
        (self.new_cb)(device)
    }

    pub(crate) fn retains(
        &self,
        device: &DeviceRef,
    ) -> bool {
        (self.update_cb)(device)
    }
}

pub fn by_phy(phyname: impl Into<String>) -> impl Fn(&DeviceRef) -> bool + Send + Sync + Clone + 'static {
    let phyname = phyname.into();
    move |device| device.phyname() == phyname
}

/// Strictly greater than `dbm`
pub fn signal_above(dbm: i32) -> impl Fn(&DeviceRef) -> bool + Send + Sync + Clone + 'static {
    move |device| device.read(|s| s.signal_dbm > dbm)
}

pub fn seen_since(ts: i64) -> impl Fn(&DeviceRef) -> bool + Send + Sync + Clone + 'static {
    move |device| device.read(|s| s.last_time >= ts)
}
