use std::sync::Arc;

use tracing::debug;

use super::insert;
use super::select;
use super::update;
use super::where_;
use super::Op;
use super::Row;
use super::SqlBackend;
use super::SqlValue;
use crate::DeviceKey;
use crate::DeviceRecord;
use crate::DeviceState;
use crate::Result;

pub const DEVICE_TABLE: &str = "devices";

const KEY_COLUMN: &str = "devkey";

const DEVICE_COLUMNS: [&str; 11] = [
    KEY_COLUMN,
    "macaddr",
    "phyname",
    "name",
    "device_type",
    "channel",
    "signal",
    "max_signal",
    "packets",
    "first_time",
    "last_time",
];

/// Archive of device records that outlive the in-memory registry
#[derive(Clone)]
pub struct DeviceHistory {
    backend: Arc<dyn SqlBackend>,
}

impl std::fmt::Debug for DeviceHistory {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("DeviceHistory").field("table", &DEVICE_TABLE).finish()
    }
}

impl DeviceHistory {
    pub fn new(backend: Arc<dyn SqlBackend>) -> Result<Self> {
        let columns: Vec<String> = DEVICE_COLUMNS.iter().map(|c| c.to_string()).collect();
        backend.create_table(DEVICE_TABLE, &columns)?;
        Ok(Self { backend })
    }

    /// Insert `record`, or overwrite the row already stored under its key
    pub fn archive(
        &self,
        record: &DeviceRecord,
    ) -> Result<()> {
        let mut values = record_values(record);
        let key = values.remove(0);

        let changed = self.backend.execute_update(
            &update(DEVICE_TABLE, DEVICE_COLUMNS[1..].iter().copied(), values)
                .filter(where_(KEY_COLUMN, Op::Eq, key)),
        )?;
        if changed == 0 {
            debug!(key = %record.key, "archive new device");
            self.backend
                .execute_insert(&insert(DEVICE_TABLE, DEVICE_COLUMNS, record_values(record)))?;
        }
        Ok(())
    }

    /// Records last seen at or after `ts`, oldest first
    pub fn load_since(
        &self,
        ts: i64,
    ) -> Result<Vec<DeviceRecord>> {
        let rows = self.backend.prepare_select(
            &select(DEVICE_TABLE, DEVICE_COLUMNS)
                .filter(where_("last_time", Op::Ge, ts))
                .order_by("last_time"),
        )?;
        rows.map(|row| row_to_record(&row)).collect()
    }

    pub fn load(
        &self,
        key: DeviceKey,
    ) -> Result<Option<DeviceRecord>> {
        let mut rows = self.backend.prepare_select(
            &select(DEVICE_TABLE, DEVICE_COLUMNS)
                .filter(where_(KEY_COLUMN, Op::Eq, key.to_string()))
                .limit(1),
        )?;
        rows.next().map(|row| row_to_record(&row)).transpose()
    }

    pub fn flush(&self) -> Result<usize> {
        self.backend.flush()
    }
}

/// Values in `DEVICE_COLUMNS` order
fn record_values(record: &DeviceRecord) -> Vec<SqlValue> {
    let state = &record.state;
    vec![
        record.key.as_str().into(),
        record.macaddr.as_str().into(),
        record.phyname.as_str().into(),
        state.name.as_str().into(),
        state.device_type.as_str().into(),
        state.channel.as_str().into(),
        state.signal_dbm.into(),
        state.max_signal_dbm.into(),
        state.packets.into(),
        state.first_time.into(),
        state.last_time.into(),
    ]
}

fn row_to_record(row: &Row) -> Result<DeviceRecord> {
    Ok(DeviceRecord {
        key: row.get_named(KEY_COLUMN)?,
        macaddr: row.get_named("macaddr")?,
        phyname: row.get_named("phyname")?,
        state: DeviceState {
            name: row.get_named("name")?,
            device_type: row.get_named("device_type")?,
            channel: row.get_named("channel")?,
            signal_dbm: row.get_named("signal")?,
            max_signal_dbm: row.get_named("max_signal")?,
            packets: row.get_named("packets")?,
            first_time: row.get_named("first_time")?,
            last_time: row.get_named("last_time")?,
        },
    })
}
