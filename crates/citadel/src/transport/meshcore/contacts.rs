// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Contact reconciliation between the persistent table and the device's
//! small contact memory.
//!
//! Authority is conditional and decided once per engine start:
//!
//! - DB count <= effective capacity: the DB is authoritative. Sync pushes
//!   DB contacts onto the device; DB rows are never deleted in this mode.
//! - DB count > capacity: the device is authoritative. Sync trims DB rows
//!   the device doesn't hold and inserts minimal rows for device contacts
//!   the DB doesn't know.
//!
//! A device failure must never cost a DB row: eviction removes from the
//! device first and deletes the row only after that succeeds.

use std::sync::Arc;

use chrono::Utc;
use tokio_rusqlite::rusqlite::{params, OptionalExtension};

use crate::config::ContactManagerConfig;
use crate::db::Db;
use crate::transport::meshcore::device::{AdvertInfo, RadioDevice};

#[derive(Debug, Clone)]
pub struct ContactRow {
    pub node_id: String,
    pub public_key: String,
    pub name: Option<String>,
    pub node_type: i64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub first_seen: i64,
    pub last_seen: i64,
    pub raw_advert_data: String,
}

pub struct ContactManager {
    device: Arc<dyn RadioDevice>,
    db: Db,
    config: ContactManagerConfig,
}

impl ContactManager {
    pub fn new(device: Arc<dyn RadioDevice>, db: Db, config: ContactManagerConfig) -> Self {
        Self { device, db, config }
    }

    pub fn effective_capacity(&self) -> u32 {
        self.config.effective_capacity()
    }

    /// Disable device auto-add and, when configured, reconcile once using
    /// the authority rule. The decision is made here and holds for the
    /// engine's lifetime.
    pub async fn start(&self) -> anyhow::Result<()> {
        if let Err(e) = self.device.set_manual_add_contacts(true).await {
            tracing::warn!(err = %e, "unable to disable device auto-add of contacts");
        } else {
            tracing::info!("disabled device auto-add of contacts");
        }

        let db_count = self.db_count().await?;
        let capacity = self.effective_capacity();
        let device_keys = self.device_contact_keys().await;
        tracing::info!(
            db = db_count,
            device = device_keys.len(),
            capacity,
            "contact manager started"
        );

        if !self.config.update_contacts {
            tracing::info!("contact update configured off, skipping sync");
            return Ok(());
        }
        self.reconcile(db_count, capacity, device_keys).await
    }

    /// Run the authority decision explicitly (also used by `start`).
    pub async fn reconcile(
        &self,
        db_count: i64,
        capacity: u32,
        device_keys: Vec<String>,
    ) -> anyhow::Result<()> {
        if db_count <= i64::from(capacity) {
            tracing::info!("synchronizing contacts from DB to device");
            self.sync_db_as_authority().await
        } else {
            tracing::info!("synchronizing contacts from device to DB");
            self.sync_node_as_authority(device_keys).await
        }
    }

    /// Push DB contacts onto the device, newest `last_seen` first, up to
    /// capacity. Device failures are logged; the DB is untouched.
    async fn sync_db_as_authority(&self) -> anyhow::Result<()> {
        let capacity = self.effective_capacity() as usize;
        let node_ids = self.node_ids_by_last_seen(false).await?;
        let mut loaded = 0usize;

        for node_id in node_ids {
            if loaded >= capacity {
                break;
            }
            let Some(row) = self.get_row(&node_id).await? else {
                tracing::warn!(node_id = %node_id, "sync: row vanished mid-walk");
                continue;
            };
            if row.raw_advert_data.is_empty() {
                tracing::warn!(node_id = %node_id, "sync: missing raw advert data");
                continue;
            }
            match self.device.add_contact(&row.raw_advert_data).await {
                Ok(()) => loaded += 1,
                Err(e) => {
                    tracing::error!(node_id = %node_id, err = %e,
                        "sync: failed to add contact to device; DB preserved");
                }
            }
        }
        tracing::info!(loaded, "loaded contacts into device");
        Ok(())
    }

    /// Trim the DB to the device's contact set, inserting minimal rows for
    /// device contacts the DB has never heard of.
    async fn sync_node_as_authority(&self, device_keys: Vec<String>) -> anyhow::Result<()> {
        let mut device_node_ids: Vec<String> = Vec::new();
        let now = Utc::now().timestamp();

        for key_prefix in device_keys {
            let info = match self.device.get_contact_by_key_prefix(&key_prefix).await {
                Ok(Some(info)) => info,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(prefix = %key_prefix, err = %e, "device contact fetch failed");
                    continue;
                }
            };
            let node_id: String = key_prefix.chars().take(16).collect();
            device_node_ids.push(node_id.clone());

            if self.get_row(&node_id).await?.is_none() {
                tracing::warn!(node_id = %node_id,
                    "device contact unknown to DB; inserting minimal row");
                self.upsert_row(ContactRow {
                    node_id,
                    public_key: info.public_key,
                    name: info.adv_name,
                    node_type: info.node_type,
                    latitude: Some(info.adv_lat),
                    longitude: Some(info.adv_lon),
                    first_seen: now,
                    last_seen: now,
                    raw_advert_data: String::new(),
                })
                .await?;
            }
        }

        for node_id in self.all_node_ids().await? {
            if !device_node_ids.contains(&node_id) {
                tracing::info!(node_id = %node_id, "trimming DB contact not on device");
                self.delete_row(&node_id).await?;
            }
        }
        Ok(())
    }

    /// Advert ingest: upsert the row, keeping `first_seen` and touching
    /// `last_seen`.
    pub async fn ingest_advert(&self, advert: &AdvertInfo) -> anyhow::Result<()> {
        let node_id = advert.node_id();
        let now = Utc::now().timestamp();
        let first_seen = match self.get_row(&node_id).await? {
            Some(existing) => existing.first_seen,
            None => now,
        };
        self.upsert_row(ContactRow {
            node_id,
            public_key: advert.public_key.clone(),
            name: advert.name.clone(),
            node_type: advert.node_type,
            latitude: Some(advert.latitude),
            longitude: Some(advert.longitude),
            first_seen,
            last_seen: now,
            raw_advert_data: advert.raw_advert_data.clone(),
        })
        .await
    }

    /// Explicit add: upsert the row, evict the oldest contact if the DB now
    /// exceeds capacity, then add to the device. Returns false if the
    /// device add failed (the DB keeps the row either way).
    pub async fn add_node(&self, advert: &AdvertInfo) -> anyhow::Result<bool> {
        self.ingest_advert(advert).await?;

        if self.db_count().await? > i64::from(self.effective_capacity()) {
            self.evict_one_contact().await?;
        }

        match self.device.add_contact(&advert.raw_advert_data).await {
            Ok(()) => Ok(true),
            Err(e) => {
                tracing::error!(node_id = %advert.node_id(), err = %e,
                    "add_node: device add failed; DB preserved");
                Ok(false)
            }
        }
    }

    /// Explicit delete: best-effort removal from the device, then the DB
    /// row is deleted unconditionally.
    pub async fn delete_node(&self, node_id: &str) -> anyhow::Result<bool> {
        let public_key = match self.get_row(node_id).await? {
            Some(row) => Some(row.public_key),
            None => match self.device.get_contact_by_key_prefix(node_id).await {
                Ok(Some(info)) => Some(info.public_key),
                _ => None,
            },
        };

        match public_key {
            Some(public_key) => {
                if let Err(e) = self.device.remove_contact(&public_key).await {
                    tracing::warn!(node_id = %node_id, err = %e,
                        "delete_node: device removal failed");
                }
            }
            None => {
                tracing::warn!(node_id = %node_id,
                    "delete_node: no public key; cannot remove from device");
            }
        }

        self.delete_row(node_id).await?;
        Ok(true)
    }

    /// Pick the oldest `last_seen` contact, remove it from the device, and
    /// delete the DB row only if the device removal succeeded.
    pub async fn evict_one_contact(&self) -> anyhow::Result<Option<String>> {
        let node_ids = self.node_ids_by_last_seen(true).await?;
        let Some(candidate) = node_ids.into_iter().next() else {
            return Ok(None);
        };
        let Some(row) = self.get_row(&candidate).await? else {
            tracing::warn!(node_id = %candidate, "eviction candidate vanished");
            return Ok(None);
        };

        if let Err(e) = self.device.remove_contact(&row.public_key).await {
            tracing::error!(node_id = %candidate, err = %e,
                "eviction: device removal failed; DB preserved");
            return Ok(None);
        }

        self.delete_row(&candidate).await?;
        tracing::info!(node_id = %candidate, "evicted contact from device and DB");
        Ok(Some(candidate))
    }

    pub async fn db_count(&self) -> anyhow::Result<i64> {
        self.db
            .call(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM mc_chat_contacts", [], |row| row.get(0))?)
            })
            .await
    }

    pub async fn get_row(&self, node_id: &str) -> anyhow::Result<Option<ContactRow>> {
        let node_id = node_id.to_owned();
        self.db
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT node_id, public_key, name, node_type, latitude, longitude,
                             first_seen, last_seen, raw_advert_data
                         FROM mc_chat_contacts WHERE node_id = ?1",
                        [&node_id],
                        |row| {
                            Ok(ContactRow {
                                node_id: row.get(0)?,
                                public_key: row.get(1)?,
                                name: row.get(2)?,
                                node_type: row.get(3)?,
                                latitude: row.get(4)?,
                                longitude: row.get(5)?,
                                first_seen: row.get(6)?,
                                last_seen: row.get(7)?,
                                raw_advert_data: row.get(8)?,
                            })
                        },
                    )
                    .optional()?)
            })
            .await
    }

    async fn upsert_row(&self, row: ContactRow) -> anyhow::Result<()> {
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO mc_chat_contacts (node_id, public_key, name, node_type,
                         latitude, longitude, first_seen, last_seen, raw_advert_data)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     ON CONFLICT(node_id) DO UPDATE SET
                         public_key = excluded.public_key,
                         name = excluded.name,
                         node_type = excluded.node_type,
                         latitude = excluded.latitude,
                         longitude = excluded.longitude,
                         last_seen = excluded.last_seen,
                         raw_advert_data = excluded.raw_advert_data",
                    params![
                        row.node_id,
                        row.public_key,
                        row.name,
                        row.node_type,
                        row.latitude,
                        row.longitude,
                        row.first_seen,
                        row.last_seen,
                        row.raw_advert_data
                    ],
                )?;
                Ok(())
            })
            .await
    }

    async fn delete_row(&self, node_id: &str) -> anyhow::Result<()> {
        let node_id = node_id.to_owned();
        self.db
            .call(move |conn| {
                conn.execute("DELETE FROM mc_chat_contacts WHERE node_id = ?1", [&node_id])?;
                Ok(())
            })
            .await
    }

    async fn all_node_ids(&self) -> anyhow::Result<Vec<String>> {
        self.db
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT node_id FROM mc_chat_contacts")?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
    }

    async fn node_ids_by_last_seen(&self, ascending: bool) -> anyhow::Result<Vec<String>> {
        self.db
            .call(move |conn| {
                let sql = if ascending {
                    "SELECT node_id FROM mc_chat_contacts ORDER BY last_seen ASC, node_id ASC"
                } else {
                    "SELECT node_id FROM mc_chat_contacts ORDER BY last_seen DESC, node_id ASC"
                };
                let mut stmt = conn.prepare(sql)?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
    }

    async fn device_contact_keys(&self) -> Vec<String> {
        match self.device.get_contacts().await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::error!(err = %e, "device get_contacts failed");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
#[path = "contacts_tests.rs"]
mod tests;
