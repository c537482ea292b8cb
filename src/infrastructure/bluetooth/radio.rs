//! Radio Control Seam
//!
//! The adapter operations the droid core needs. The production implementation is
//! [`crate::infrastructure::bluetooth::bluez::BluezRadio`]; tests drive the core
//! through a recording fake.

use anyhow::Result;
use btleplug::api::BDAddr;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Opaque id of an open GATT link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkHandle(pub u64);

impl fmt::Display for LinkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

/// A peer the adapter currently knows about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisiblePeer {
    pub address: BDAddr,
    pub name: String,
}

#[async_trait::async_trait]
pub trait RadioControl: Send + Sync + 'static {
    async fn power(&self, on: bool) -> Result<()>;

    async fn set_scan(&self, enabled: bool) -> Result<()>;

    /// Vendor info dump for `address`, manufacturer data included when known
    async fn query_peer_record(&self, address: &BDAddr) -> Result<String>;

    async fn list_visible_peers(&self) -> Result<Vec<VisiblePeer>>;

    /// `data` excludes the manufacturer id
    async fn set_advertisement_payload(&self, manufacturer_id: u16, data: &[u8]) -> Result<()>;

    async fn set_advertisement_enabled(&self, enabled: bool) -> Result<()>;

    /// Wait until `address` is reachable.
    ///
    /// May wait indefinitely; callers bound it with their own timeout. `Ok(false)`
    /// means the backend gave up on its own.
    async fn resolve_peer(&self, address: &BDAddr) -> Result<bool>;

    async fn gatt_connect(&self, address: &BDAddr, timeout: Duration) -> Result<LinkHandle>;

    async fn gatt_write(&self, link: LinkHandle, characteristic: Uuid, data: &[u8]) -> Result<()>;

    async fn gatt_disconnect(&self, link: LinkHandle) -> Result<()>;
}
