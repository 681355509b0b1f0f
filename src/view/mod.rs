//! Device views: independent filtered projections of the live device set
//!
//! Views are optimized for maintaining long-lived alternate representations of
//! the device set, such as "all access points" or "all devices of a given
//! phy". Each view owns one vector of [`DeviceRef`](crate::DeviceRef)s, a
//! presence index for O(1) membership checks and its own lock; no lock is ever
//! shared between two views.
//!
//! ```text
//!  DeviceRegistry ── created / updated / removed ──▶ DeviceView (exclusive lock)
//!                                                        │
//!  HTTP handler ── snapshot_and_work ── copy (shared lock) ┘
//!                        │
//!                        ▼
//!                  ViewWorker (no lock held): filter, sort, paginate
//! ```
//!
//! The backing vector is cheap to scan and copy but evicting a device is a
//! linear scan, so membership predicates should drop devices rarely.

mod device_view;
mod predicate;
mod worker;

#[cfg(test)]
mod device_view_test;
#[cfg(test)]
mod worker_test;

pub use device_view::*;
pub use predicate::*;
pub use worker::*;
