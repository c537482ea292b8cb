//! GATT Links
//!
//! btleplug central used for the droid command link. Open links are kept in a
//! table and handed out as opaque [`LinkHandle`]s.

use crate::infrastructure::bluetooth::protocol::{COMMAND_CHAR_UUID, SERVICE_UUID};
use crate::infrastructure::bluetooth::radio::LinkHandle;
use anyhow::{anyhow, bail, Context, Result};
use btleplug::api::{BDAddr, Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Poll interval while waiting for a peer to show up
const RESOLVE_POLL: Duration = Duration::from_millis(300);

#[derive(Clone)]
struct Link {
    peripheral: Peripheral,
    command: Characteristic,
}

pub struct GattLinks {
    adapter: Adapter,
    links: Mutex<HashMap<LinkHandle, Link>>,
    next_id: AtomicU64,
}

impl GattLinks {
    /// Use the first adapter the platform reports
    pub async fn new() -> Result<Self> {
        let manager = Manager::new().await.context("Bluetooth manager unavailable")?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No Bluetooth adapter found"))?;
        info!("Using adapter {}", adapter.adapter_info().await.unwrap_or_default());
        Ok(Self {
            adapter,
            links: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Scan until `address` is visible. Does not give up on its own; the
    /// caller bounds it, and discovery is stopped however the future ends.
    pub async fn resolve(&self, address: &BDAddr) -> Result<bool> {
        self.adapter.start_scan(ScanFilter::default()).await?;
        let adapter = self.adapter.clone();
        let mut discovery = DiscoveryGuard::new(move || {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move {
                    if let Err(e) = adapter.stop_scan().await {
                        debug!("Stopping discovery failed: {}", e);
                    }
                });
            }
        });
        loop {
            if self.find_peripheral(address).await?.is_some() {
                discovery.disarm();
                let _ = self.adapter.stop_scan().await;
                debug!("Peer {} visible", address);
                return Ok(true);
            }
            tokio::time::sleep(RESOLVE_POLL).await;
        }
    }

    pub async fn connect(&self, address: &BDAddr, timeout: Duration) -> Result<LinkHandle> {
        // A resolve cut short by its caller may have left discovery running
        let _ = self.adapter.stop_scan().await;

        let peripheral = self
            .find_peripheral(address)
            .await?
            .ok_or_else(|| anyhow!("Peer {} is not known to the adapter", address))?;
        tokio::time::timeout(timeout, peripheral.connect())
            .await
            .map_err(|_| anyhow!("Connect to {} timed out", address))??;
        peripheral.discover_services().await?;

        let Some(command) = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.service_uuid == SERVICE_UUID && c.uuid == COMMAND_CHAR_UUID)
        else {
            let _ = peripheral.disconnect().await;
            bail!("{} has no droid command characteristic", address);
        };

        let handle = LinkHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.links
            .lock()
            .await
            .insert(handle, Link { peripheral, command });
        info!("Opened {} to {}", handle, address);
        Ok(handle)
    }

    pub async fn write(&self, handle: LinkHandle, characteristic: Uuid, data: &[u8]) -> Result<()> {
        let link = self.link(handle).await?;
        let target = if characteristic == link.command.uuid {
            link.command.clone()
        } else {
            link.peripheral
                .characteristics()
                .into_iter()
                .find(|c| c.uuid == characteristic)
                .ok_or_else(|| anyhow!("Characteristic {} not found", characteristic))?
        };
        link.peripheral
            .write(&target, data, WriteType::WithoutResponse)
            .await
            .with_context(|| format!("Write on {handle} failed"))
    }

    pub async fn disconnect(&self, handle: LinkHandle) -> Result<()> {
        let Some(link) = self.links.lock().await.remove(&handle) else {
            warn!("Disconnect of unknown {}", handle);
            return Ok(());
        };
        link.peripheral.disconnect().await?;
        debug!("Closed {}", handle);
        Ok(())
    }

    async fn link(&self, handle: LinkHandle) -> Result<Link> {
        self.links
            .lock()
            .await
            .get(&handle)
            .cloned()
            .ok_or_else(|| anyhow!("{} is not open", handle))
    }

    async fn find_peripheral(&self, address: &BDAddr) -> Result<Option<Peripheral>> {
        Ok(self
            .adapter
            .peripherals()
            .await?
            .into_iter()
            .find(|p| p.address() == *address))
    }
}

/// Runs `stop` when dropped unless disarmed first
struct DiscoveryGuard<F: FnOnce()> {
    stop: Option<F>,
}

impl<F: FnOnce()> DiscoveryGuard<F> {
    fn new(stop: F) -> Self {
        Self { stop: Some(stop) }
    }

    fn disarm(&mut self) {
        self.stop = None;
    }
}

impl<F: FnOnce()> Drop for DiscoveryGuard<F> {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn timed_out_resolve_stops_discovery() {
        let stopped = Arc::new(AtomicBool::new(false));
        let flag = stopped.clone();
        let resolve = async move {
            let _discovery = DiscoveryGuard::new(move || flag.store(true, Ordering::SeqCst));
            std::future::pending::<()>().await;
        };

        let outcome = tokio::time::timeout(Duration::from_secs(5), resolve).await;

        assert!(outcome.is_err());
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[test]
    fn disarmed_guard_leaves_discovery_running() {
        let stopped = Arc::new(AtomicBool::new(false));
        let flag = stopped.clone();
        let mut discovery = DiscoveryGuard::new(move || flag.store(true, Ordering::SeqCst));

        discovery.disarm();
        drop(discovery);

        assert!(!stopped.load(Ordering::SeqCst));
    }
}
