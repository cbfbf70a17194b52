// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The radio device seam. The vendor driver lives behind [`RadioDevice`];
//! the in-tree [`mock::MockRadio`] stands in for hardware in tests and
//! local development.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    /// The device answered with an ERROR-typed reply.
    #[error("device command failed: {0}")]
    Command(String),
    /// The serial link itself failed.
    #[error("device i/o error: {0}")]
    Io(String),
}

pub type DeviceResult<T> = Result<T, DeviceError>;

/// Reply to `send_msg`: the ACK code the mesh will echo back.
#[derive(Debug, Clone)]
pub struct SendReply {
    pub expected_ack: Vec<u8>,
}

/// Contact fields the device reports for a key prefix.
#[derive(Debug, Clone)]
pub struct ContactInfo {
    pub public_key: String,
    pub adv_name: Option<String>,
    pub node_type: i64,
    pub adv_lat: f64,
    pub adv_lon: f64,
}

/// Parsed advertisement broadcast from a peer node.
#[derive(Debug, Clone)]
pub struct AdvertInfo {
    pub public_key: String,
    pub name: Option<String>,
    pub node_type: i64,
    pub latitude: f64,
    pub longitude: f64,
    /// Opaque blob the device needs to re-add this contact.
    pub raw_advert_data: String,
}

impl AdvertInfo {
    /// Operational node id: first 16 hex chars of the public key.
    pub fn node_id(&self) -> String {
        self.public_key.chars().take(16).collect()
    }
}

/// Events the device pushes up to the engine.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    ContactMsgRecv { pubkey_prefix: String, text: String },
    Advertisement(AdvertInfo),
    NewContact(AdvertInfo),
    Ack { code: String },
}

/// Retry parameters for devices with native retry support.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub max_flood_attempts: u32,
    pub flood_after: u32,
    pub timeout: Duration,
}

/// Command surface of the mesh companion device.
#[async_trait]
pub trait RadioDevice: Send + Sync {
    async fn set_time(&self, unix_secs: i64) -> DeviceResult<()>;
    async fn set_radio(&self, freq_mhz: f64, bw_khz: f64, sf: u32, cr: u32) -> DeviceResult<()>;
    async fn set_tx_power(&self, dbm: u32) -> DeviceResult<()>;
    async fn set_name(&self, name: &str) -> DeviceResult<()>;
    async fn set_multi_acks(&self, enabled: bool) -> DeviceResult<()>;
    async fn set_manual_add_contacts(&self, enabled: bool) -> DeviceResult<()>;

    /// Key prefixes of every contact in device memory.
    async fn get_contacts(&self) -> DeviceResult<Vec<String>>;
    async fn get_contact_by_key_prefix(&self, prefix: &str)
        -> DeviceResult<Option<ContactInfo>>;
    async fn add_contact(&self, raw_advert: &str) -> DeviceResult<()>;
    async fn remove_contact(&self, public_key: &str) -> DeviceResult<()>;
    async fn ensure_contacts(&self) -> DeviceResult<()>;

    async fn send_advert(&self, flood: bool) -> DeviceResult<()>;
    async fn send_msg(&self, node_id: &str, text: &str) -> DeviceResult<SendReply>;

    /// Devices without native retry fall back to the engine's wrapper.
    fn supports_retry(&self) -> bool {
        false
    }

    async fn send_msg_with_retry(
        &self,
        node_id: &str,
        text: &str,
        policy: RetryPolicy,
    ) -> DeviceResult<SendReply> {
        let _ = policy;
        self.send_msg(node_id, text).await
    }

    async fn export_private_key(&self) -> DeviceResult<Vec<u8>>;
    async fn send_device_query(&self) -> DeviceResult<String>;

    async fn start_auto_fetch(&self) -> DeviceResult<()>;
    async fn stop_auto_fetch(&self) -> DeviceResult<()>;
    async fn disconnect(&self) -> DeviceResult<()>;

    /// Subscribe to the device's event stream.
    fn subscribe(&self) -> broadcast::Receiver<DeviceEvent>;
}

pub mod mock {
    //! Scripted radio for tests and hardware-free local runs.

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone)]
    pub struct SentPacket {
        pub node_id: String,
        pub text: String,
    }

    #[derive(Default)]
    struct MockState {
        contacts: HashMap<String, ContactInfo>,
        sent: Vec<SentPacket>,
        fail_sends: bool,
        fail_remove_contact: bool,
        io_error_sends: u32,
    }

    /// In-memory device: records sends, hands out sequential ACK codes,
    /// and can be told to auto-ack (the common case in tests).
    pub struct MockRadio {
        state: Mutex<MockState>,
        next_ack: AtomicU64,
        adverts: AtomicU64,
        auto_ack: bool,
        event_tx: broadcast::Sender<DeviceEvent>,
    }

    impl MockRadio {
        pub fn new(auto_ack: bool) -> Self {
            let (event_tx, _) = broadcast::channel(256);
            Self {
                state: Mutex::new(MockState::default()),
                next_ack: AtomicU64::new(1),
                adverts: AtomicU64::new(0),
                auto_ack,
                event_tx,
            }
        }

        pub fn advert_count(&self) -> u64 {
            self.adverts.load(Ordering::Relaxed)
        }

        /// Inject an event as if the radio had received it from the mesh.
        pub fn emit(&self, event: DeviceEvent) {
            let _ = self.event_tx.send(event);
        }

        pub fn emit_contact_msg(&self, node_id: &str, text: &str) {
            self.emit(DeviceEvent::ContactMsgRecv {
                pubkey_prefix: node_id.to_owned(),
                text: text.to_owned(),
            });
        }

        pub fn sent_packets(&self) -> Vec<SentPacket> {
            self.state.lock().map(|s| s.sent.clone()).unwrap_or_default()
        }

        pub fn contact_keys(&self) -> Vec<String> {
            self.state
                .lock()
                .map(|s| s.contacts.keys().cloned().collect())
                .unwrap_or_default()
        }

        /// Make every subsequent `send_msg` answer with an ERROR reply.
        pub fn set_fail_sends(&self, fail: bool) {
            if let Ok(mut s) = self.state.lock() {
                s.fail_sends = fail;
            }
        }

        /// Make the next `n` sends fail at the I/O level.
        pub fn set_io_error_sends(&self, n: u32) {
            if let Ok(mut s) = self.state.lock() {
                s.io_error_sends = n;
            }
        }

        pub fn set_fail_remove_contact(&self, fail: bool) {
            if let Ok(mut s) = self.state.lock() {
                s.fail_remove_contact = fail;
            }
        }

        pub fn add_device_contact(&self, info: ContactInfo) {
            if let Ok(mut s) = self.state.lock() {
                s.contacts.insert(info.public_key.clone(), info);
            }
        }
    }

    #[async_trait]
    impl RadioDevice for MockRadio {
        async fn set_time(&self, _unix_secs: i64) -> DeviceResult<()> {
            Ok(())
        }

        async fn set_radio(
            &self,
            _freq_mhz: f64,
            _bw_khz: f64,
            _sf: u32,
            _cr: u32,
        ) -> DeviceResult<()> {
            Ok(())
        }

        async fn set_tx_power(&self, _dbm: u32) -> DeviceResult<()> {
            Ok(())
        }

        async fn set_name(&self, _name: &str) -> DeviceResult<()> {
            Ok(())
        }

        async fn set_multi_acks(&self, _enabled: bool) -> DeviceResult<()> {
            Ok(())
        }

        async fn set_manual_add_contacts(&self, _enabled: bool) -> DeviceResult<()> {
            Ok(())
        }

        async fn get_contacts(&self) -> DeviceResult<Vec<String>> {
            Ok(self.contact_keys())
        }

        async fn get_contact_by_key_prefix(
            &self,
            prefix: &str,
        ) -> DeviceResult<Option<ContactInfo>> {
            let state = self
                .state
                .lock()
                .map_err(|_| DeviceError::Io("mock state poisoned".to_owned()))?;
            Ok(state
                .contacts
                .iter()
                .find(|(key, _)| key.starts_with(prefix))
                .map(|(_, info)| info.clone()))
        }

        async fn add_contact(&self, raw_advert: &str) -> DeviceResult<()> {
            let mut state = self
                .state
                .lock()
                .map_err(|_| DeviceError::Io("mock state poisoned".to_owned()))?;
            // The raw advert doubles as the public key in mock form.
            state.contacts.insert(
                raw_advert.to_owned(),
                ContactInfo {
                    public_key: raw_advert.to_owned(),
                    adv_name: None,
                    node_type: 1,
                    adv_lat: 0.0,
                    adv_lon: 0.0,
                },
            );
            Ok(())
        }

        async fn remove_contact(&self, public_key: &str) -> DeviceResult<()> {
            let mut state = self
                .state
                .lock()
                .map_err(|_| DeviceError::Io("mock state poisoned".to_owned()))?;
            if state.fail_remove_contact {
                return Err(DeviceError::Command("remove refused".to_owned()));
            }
            state.contacts.remove(public_key);
            Ok(())
        }

        async fn ensure_contacts(&self) -> DeviceResult<()> {
            Ok(())
        }

        async fn send_advert(&self, _flood: bool) -> DeviceResult<()> {
            self.adverts.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        async fn send_msg(&self, node_id: &str, text: &str) -> DeviceResult<SendReply> {
            {
                let mut state = self
                    .state
                    .lock()
                    .map_err(|_| DeviceError::Io("mock state poisoned".to_owned()))?;
                if state.io_error_sends > 0 {
                    state.io_error_sends -= 1;
                    return Err(DeviceError::Io("serial write failed".to_owned()));
                }
                if state.fail_sends {
                    return Err(DeviceError::Command("tx queue full".to_owned()));
                }
                state
                    .sent
                    .push(SentPacket { node_id: node_id.to_owned(), text: text.to_owned() });
            }
            let ack = self.next_ack.fetch_add(1, Ordering::Relaxed);
            let expected_ack = ack.to_be_bytes().to_vec();
            if self.auto_ack {
                self.emit(DeviceEvent::Ack { code: hex::encode(&expected_ack) });
            }
            Ok(SendReply { expected_ack })
        }

        async fn export_private_key(&self) -> DeviceResult<Vec<u8>> {
            Ok(vec![0u8; 32])
        }

        async fn send_device_query(&self) -> DeviceResult<String> {
            Ok("mock-radio 1.0".to_owned())
        }

        async fn start_auto_fetch(&self) -> DeviceResult<()> {
            Ok(())
        }

        async fn stop_auto_fetch(&self) -> DeviceResult<()> {
            Ok(())
        }

        async fn disconnect(&self) -> DeviceResult<()> {
            Ok(())
        }

        fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
            self.event_tx.subscribe()
        }
    }
}
