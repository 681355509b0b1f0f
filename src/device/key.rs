use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::convert::fnv1a_32;
use crate::ConvertError;
use crate::StorageError;

/// Globally unique, stable device identifier.
///
/// The upper 32 bits hash the phy name and the lower 32 bits hash the MAC
/// address, so the same radio seen by two phys yields two devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceKey(u64);

impl DeviceKey {
    pub fn from_parts(
        phyname: &str,
        macaddr: &str,
    ) -> Self {
        let phy = fnv1a_32(phyname) as u64;
        let mac = fnv1a_32(&macaddr.to_ascii_uppercase()) as u64;
        Self((phy << 32) | mac)
    }

    pub const fn phy_hash(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub const fn mac_hash(&self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{:08X}_{:08X}", self.phy_hash(), self.mac_hash())
    }
}

impl FromStr for DeviceKey {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || StorageError::from(ConvertError::InvalidDeviceKey(s.to_string()));

        let (phy, mac) = s.split_once('_').ok_or_else(invalid)?;
        if phy.len() != 8 || mac.len() != 8 {
            return Err(invalid());
        }
        let phy = u32::from_str_radix(phy, 16).map_err(|_| invalid())?;
        let mac = u32::from_str_radix(mac, 16).map_err(|_| invalid())?;
        Ok(Self(((phy as u64) << 32) | mac as u64))
    }
}
