//! BlueZ Radio
//!
//! Production [`RadioControl`]: adapter, discovery and advertising go through
//! `bluetoothctl`, the droid command link through btleplug.

use crate::domain::settings::TimingSettings;
use crate::infrastructure::bluetooth::bluetoothctl::BluetoothCtl;
use crate::infrastructure::bluetooth::gatt::GattLinks;
use crate::infrastructure::bluetooth::radio::{LinkHandle, RadioControl, VisiblePeer};
use anyhow::Result;
use btleplug::api::BDAddr;
use std::time::Duration;
use uuid::Uuid;

pub struct BluezRadio {
    ctl: BluetoothCtl,
    gatt: GattLinks,
}

impl BluezRadio {
    pub async fn new(timing: &TimingSettings) -> Result<Self> {
        Ok(Self {
            ctl: BluetoothCtl::spawn(timing).await?,
            gatt: GattLinks::new().await?,
        })
    }

    pub async fn close(&self) {
        self.ctl.close().await;
    }
}

fn on_off(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

#[async_trait::async_trait]
impl RadioControl for BluezRadio {
    async fn power(&self, on: bool) -> Result<()> {
        self.ctl.send(&format!("power {}", on_off(on))).await
    }

    async fn set_scan(&self, enabled: bool) -> Result<()> {
        self.ctl.send(&format!("scan {}", on_off(enabled))).await
    }

    async fn query_peer_record(&self, address: &BDAddr) -> Result<String> {
        self.ctl.info(address).await
    }

    async fn list_visible_peers(&self) -> Result<Vec<VisiblePeer>> {
        self.ctl.devices().await
    }

    async fn set_advertisement_payload(&self, manufacturer_id: u16, data: &[u8]) -> Result<()> {
        self.ctl.set_manufacturer_data(manufacturer_id, data).await
    }

    async fn set_advertisement_enabled(&self, enabled: bool) -> Result<()> {
        self.ctl.send(&format!("advertise {}", on_off(enabled))).await
    }

    async fn resolve_peer(&self, address: &BDAddr) -> Result<bool> {
        self.gatt.resolve(address).await
    }

    async fn gatt_connect(&self, address: &BDAddr, timeout: Duration) -> Result<LinkHandle> {
        self.gatt.connect(address, timeout).await
    }

    async fn gatt_write(&self, link: LinkHandle, characteristic: Uuid, data: &[u8]) -> Result<()> {
        self.gatt.write(link, characteristic, data).await
    }

    async fn gatt_disconnect(&self, link: LinkHandle) -> Result<()> {
        self.gatt.disconnect(link).await
    }
}
