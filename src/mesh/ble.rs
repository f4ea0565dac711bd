//! BLE radio backend
//!
//! Advertises the Waymesh service and serves the local beacon as a readable
//! GATT characteristic; scanning discovers devices advertising the same
//! service, reads each one's beacon once, and disconnects.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bluer::adv::{Advertisement, AdvertisementHandle};
use bluer::gatt::local::{
    Application, ApplicationHandle, Characteristic, CharacteristicRead, Service,
};
use bluer::{Adapter, AdapterEvent, Address, Uuid};
use bytes::Bytes;
use futures::{FutureExt, StreamExt};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::mesh::radio::{DiscoveredPeer, MeshRadio};

/// Service UUID all Waymesh devices advertise
pub const WAYMESH_SERVICE_UUID: Uuid = Uuid::from_u128(0x57ae_4d45_5348_4000_8000_00805f9b34fb);

/// Characteristic holding the beacon payload
pub const POSITION_CHAR_UUID: Uuid = Uuid::from_u128(0x57ae_4d45_5348_4001_8000_00805f9b34fb);

/// BlueZ-backed mesh radio
pub struct BleRadio {
    adapter: Adapter,
    beacon: Arc<Mutex<Vec<u8>>>,
    _adv: AdvertisementHandle,
    _app: ApplicationHandle,
}

impl BleRadio {
    /// Power the default adapter, register the GATT application, and start
    /// advertising the service
    pub async fn new(device_name: &str) -> Result<Self> {
        let session = bluer::Session::new().await?;
        let adapter = session.default_adapter().await?;
        adapter.set_powered(true).await?;

        let beacon: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));

        let read_beacon = beacon.clone();
        let app = Application {
            services: vec![Service {
                uuid: WAYMESH_SERVICE_UUID,
                primary: true,
                characteristics: vec![Characteristic {
                    uuid: POSITION_CHAR_UUID,
                    read: Some(CharacteristicRead {
                        read: true,
                        fun: Box::new(move |_req| {
                            let beacon = read_beacon.clone();
                            async move { Ok(beacon.lock().await.clone()) }.boxed()
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        };
        let app_handle = adapter
            .serve_gatt_application(app)
            .await
            .context("registering GATT application")?;

        let adv = Advertisement {
            advertisement_type: bluer::adv::Type::Peripheral,
            service_uuids: vec![WAYMESH_SERVICE_UUID].into_iter().collect(),
            discoverable: Some(true),
            local_name: Some(device_name.to_string()),
            ..Default::default()
        };
        let adv_handle = adapter
            .advertise(adv)
            .await
            .context("starting BLE advertisement")?;

        info!(
            "[BLE] Advertising on adapter {} as \"{device_name}\"",
            adapter.name()
        );

        Ok(Self {
            adapter,
            beacon,
            _adv: adv_handle,
            _app: app_handle,
        })
    }

    /// Read the beacon characteristic of one peer, then disconnect.
    ///
    /// Returns `None` for devices not advertising the Waymesh service.
    async fn read_peer_beacon(&self, addr: Address) -> Result<Option<Bytes>> {
        let device = self.adapter.device(addr)?;

        let uuids = device.uuids().await?.unwrap_or_default();
        if !uuids.contains(&WAYMESH_SERVICE_UUID) {
            return Ok(None);
        }

        if !device.is_connected().await? {
            device.connect().await?;
        }

        let payload = self.find_and_read(&device).await;

        // Connection slots are scarce; always release
        let _ = device.disconnect().await;

        payload
    }

    async fn find_and_read(&self, device: &bluer::Device) -> Result<Option<Bytes>> {
        for service in device.services().await? {
            if service.uuid().await? != WAYMESH_SERVICE_UUID {
                continue;
            }
            for characteristic in service.characteristics().await? {
                if characteristic.uuid().await? == POSITION_CHAR_UUID {
                    let value = characteristic.read().await?;
                    return Ok(Some(Bytes::from(value)));
                }
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl MeshRadio for BleRadio {
    async fn set_beacon(&self, payload: Bytes) -> Result<()> {
        *self.beacon.lock().await = payload.to_vec();
        Ok(())
    }

    async fn scan(&self, window: Duration) -> Result<Vec<DiscoveredPeer>> {
        let mut found = Vec::new();
        let mut processed: HashSet<Address> = HashSet::new();

        let discover = self.adapter.discover_devices().await?;
        tokio::pin!(discover);

        let scan_result = timeout(window, async {
            while let Some(event) = discover.next().await {
                let AdapterEvent::DeviceAdded(addr) = event else {
                    continue;
                };
                if !processed.insert(addr) {
                    continue;
                }

                match self.read_peer_beacon(addr).await {
                    Ok(Some(payload)) => {
                        debug!("[BLE] Read beacon from {addr} ({} bytes)", payload.len());
                        found.push(DiscoveredPeer {
                            address: addr.to_string(),
                            payload,
                        });
                    }
                    Ok(None) => {}
                    Err(e) => {
                        debug!("[BLE] Failed to read {addr}: {e}");
                    }
                }
            }
        })
        .await;

        // Hitting the window is the normal way a scan ends
        if scan_result.is_err() {
            debug!("[BLE] Scan window elapsed, {} peers read", found.len());
        }

        Ok(found)
    }
}
