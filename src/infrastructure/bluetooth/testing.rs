//! Recording radio double for unit tests.

use crate::infrastructure::bluetooth::radio::{LinkHandle, RadioControl, VisiblePeer};
use anyhow::{bail, Result};
use btleplug::api::BDAddr;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    Power(bool),
    SetScan(bool),
    QueryPeerRecord(BDAddr),
    ListVisiblePeers,
    SetAdvertisementPayload(u16, Vec<u8>),
    SetAdvertisementEnabled(bool),
    ResolvePeer(BDAddr),
    GattConnect(BDAddr),
    GattWrite(LinkHandle, Uuid, Vec<u8>),
    GattDisconnect(LinkHandle),
}

#[derive(Default)]
struct FakeState {
    calls: Vec<RadioCall>,
    peers: Vec<VisiblePeer>,
    records: HashMap<BDAddr, VecDeque<String>>,
    unresolvable: bool,
    link_hangs: bool,
    fail_advertise_start: bool,
    fail_write_number: Option<usize>,
    writes_seen: usize,
    next_link: u64,
}

#[derive(Default)]
pub struct FakeRadio {
    state: Mutex<FakeState>,
}

impl FakeRadio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_peer(self, address: &str, name: &str) -> Self {
        let address: BDAddr = address.parse().unwrap();
        self.state.lock().unwrap().peers.push(VisiblePeer {
            address,
            name: name.to_string(),
        });
        self
    }

    /// Successive records returned for `address`; the last one repeats
    pub fn with_records(self, address: &str, records: &[&str]) -> Self {
        let address: BDAddr = address.parse().unwrap();
        self.state
            .lock()
            .unwrap()
            .records
            .insert(address, records.iter().map(|r| r.to_string()).collect());
        self
    }

    pub fn unresolvable(self) -> Self {
        self.state.lock().unwrap().unresolvable = true;
        self
    }

    pub fn link_hangs(self) -> Self {
        self.state.lock().unwrap().link_hangs = true;
        self
    }

    pub fn failing_advertise_start(self) -> Self {
        self.state.lock().unwrap().fail_advertise_start = true;
        self
    }

    /// Fail the n-th GATT write (1-based)
    pub fn failing_write(self, number: usize) -> Self {
        self.state.lock().unwrap().fail_write_number = Some(number);
        self
    }

    pub fn calls(&self) -> Vec<RadioCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, call: &RadioCall) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RadioCall::GattWrite(_, _, data) => Some(data),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: RadioCall) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait::async_trait]
impl RadioControl for FakeRadio {
    async fn power(&self, on: bool) -> Result<()> {
        self.record(RadioCall::Power(on));
        Ok(())
    }

    async fn set_scan(&self, enabled: bool) -> Result<()> {
        self.record(RadioCall::SetScan(enabled));
        Ok(())
    }

    async fn query_peer_record(&self, address: &BDAddr) -> Result<String> {
        self.record(RadioCall::QueryPeerRecord(*address));
        let mut state = self.state.lock().unwrap();
        let Some(records) = state.records.get_mut(address) else {
            return Ok(String::new());
        };
        let record = if records.len() > 1 {
            records.pop_front()
        } else {
            records.front().cloned()
        };
        Ok(record.unwrap_or_default())
    }

    async fn list_visible_peers(&self) -> Result<Vec<VisiblePeer>> {
        self.record(RadioCall::ListVisiblePeers);
        Ok(self.state.lock().unwrap().peers.clone())
    }

    async fn set_advertisement_payload(&self, manufacturer_id: u16, data: &[u8]) -> Result<()> {
        self.record(RadioCall::SetAdvertisementPayload(manufacturer_id, data.to_vec()));
        Ok(())
    }

    async fn set_advertisement_enabled(&self, enabled: bool) -> Result<()> {
        self.record(RadioCall::SetAdvertisementEnabled(enabled));
        if enabled && self.state.lock().unwrap().fail_advertise_start {
            bail!("advertising rejected");
        }
        Ok(())
    }

    async fn resolve_peer(&self, address: &BDAddr) -> Result<bool> {
        self.record(RadioCall::ResolvePeer(*address));
        let unresolvable = self.state.lock().unwrap().unresolvable;
        if unresolvable {
            std::future::pending::<()>().await;
        }
        Ok(true)
    }

    async fn gatt_connect(&self, address: &BDAddr, _timeout: Duration) -> Result<LinkHandle> {
        self.record(RadioCall::GattConnect(*address));
        let hangs = self.state.lock().unwrap().link_hangs;
        if hangs {
            std::future::pending::<()>().await;
        }
        let mut state = self.state.lock().unwrap();
        state.next_link += 1;
        Ok(LinkHandle(state.next_link))
    }

    async fn gatt_write(&self, link: LinkHandle, characteristic: Uuid, data: &[u8]) -> Result<()> {
        self.record(RadioCall::GattWrite(link, characteristic, data.to_vec()));
        let mut state = self.state.lock().unwrap();
        state.writes_seen += 1;
        if state.fail_write_number == Some(state.writes_seen) {
            bail!("write {} dropped", state.writes_seen);
        }
        Ok(())
    }

    async fn gatt_disconnect(&self, link: LinkHandle) -> Result<()> {
        self.record(RadioCall::GattDisconnect(link));
        Ok(())
    }
}
