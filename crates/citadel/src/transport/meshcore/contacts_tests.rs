// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::expect_used)]

use super::*;
use crate::transport::meshcore::device::mock::MockRadio;
use crate::transport::meshcore::device::ContactInfo;

fn advert(n: u8) -> AdvertInfo {
    // 64-hex public key; node id is its first 16 chars.
    let public_key = format!("{:02x}", n).repeat(32);
    AdvertInfo {
        public_key: public_key.clone(),
        name: Some(format!("node-{n}")),
        node_type: 1,
        latitude: 45.0,
        longitude: -122.0,
        raw_advert_data: public_key,
    }
}

async fn manager(capacity: u32, update: bool) -> (ContactManager, Arc<MockRadio>) {
    let db = Db::open_in_memory().await.expect("db");
    db.init_schema().await.expect("schema");
    let radio = Arc::new(MockRadio::new(true));
    let config = ContactManagerConfig {
        max_device_contacts: capacity,
        contact_limit_buffer: 0,
        update_contacts: update,
    };
    (ContactManager::new(Arc::clone(&radio) as Arc<dyn RadioDevice>, db, config), radio)
}

async fn backdate(mgr: &ContactManager, node_id: &str, secs: i64) {
    let node_id = node_id.to_owned();
    mgr.db
        .call(move |conn| {
            conn.execute(
                "UPDATE mc_chat_contacts SET last_seen = last_seen - ?1 WHERE node_id = ?2",
                tokio_rusqlite::rusqlite::params![secs, node_id],
            )?;
            Ok(())
        })
        .await
        .expect("backdate");
}

#[tokio::test]
async fn ingest_preserves_first_seen() {
    let (mgr, _radio) = manager(10, false).await;
    let a = advert(1);

    mgr.ingest_advert(&a).await.expect("ingest");
    let row1 = mgr.get_row(&a.node_id()).await.expect("get").expect("row");

    backdate(&mgr, &a.node_id(), 100).await;
    mgr.ingest_advert(&a).await.expect("reingest");
    let row2 = mgr.get_row(&a.node_id()).await.expect("get").expect("row");

    assert_eq!(row1.first_seen, row2.first_seen);
    assert!(row2.last_seen >= row1.last_seen);
    assert_eq!(mgr.db_count().await.expect("count"), 1);
}

#[tokio::test]
async fn eviction_never_deletes_db_row_on_device_failure() {
    let (mgr, radio) = manager(2, false).await;
    for n in 1..=3u8 {
        mgr.ingest_advert(&advert(n)).await.expect("ingest");
        // Older nodes get earlier last_seen stamps.
        backdate(&mgr, &advert(n).node_id(), 100 - i64::from(n) * 10).await;
    }
    assert_eq!(mgr.db_count().await.expect("count"), 3);

    // Device refuses removal: the DB must keep all 3 rows.
    radio.set_fail_remove_contact(true);
    let evicted = mgr.evict_one_contact().await.expect("evict call");
    assert!(evicted.is_none());
    assert_eq!(mgr.db_count().await.expect("count"), 3);

    // Second attempt succeeds: exactly one row goes.
    radio.set_fail_remove_contact(false);
    radio.add_device_contact(ContactInfo {
        public_key: advert(1).public_key,
        adv_name: None,
        node_type: 1,
        adv_lat: 0.0,
        adv_lon: 0.0,
    });
    let evicted = mgr.evict_one_contact().await.expect("evict call");
    assert!(evicted.is_some());
    assert_eq!(mgr.db_count().await.expect("count"), 2);
}

#[tokio::test]
async fn add_node_over_capacity_evicts_oldest() {
    let (mgr, radio) = manager(2, false).await;

    mgr.add_node(&advert(1)).await.expect("add");
    backdate(&mgr, &advert(1).node_id(), 1000).await;
    mgr.add_node(&advert(2)).await.expect("add");
    backdate(&mgr, &advert(2).node_id(), 500).await;

    // Third contact pushes the DB over capacity: the oldest must go.
    assert!(mgr.add_node(&advert(3)).await.expect("add"));
    assert_eq!(mgr.db_count().await.expect("count"), 2);
    assert!(mgr.get_row(&advert(1).node_id()).await.expect("get").is_none());
    assert!(mgr.get_row(&advert(3).node_id()).await.expect("get").is_some());
    // The device saw the new contact.
    assert!(radio.contact_keys().contains(&advert(3).public_key));
}

#[tokio::test]
async fn delete_node_removes_db_row_even_if_device_fails() {
    let (mgr, radio) = manager(10, false).await;
    mgr.add_node(&advert(1)).await.expect("add");

    radio.set_fail_remove_contact(true);
    assert!(mgr.delete_node(&advert(1).node_id()).await.expect("delete"));
    assert_eq!(mgr.db_count().await.expect("count"), 0);
}

#[tokio::test]
async fn db_authoritative_sync_pushes_rows_to_device() {
    let (mgr, radio) = manager(5, true).await;
    for n in 1..=3 {
        mgr.ingest_advert(&advert(n)).await.expect("ingest");
    }

    mgr.start().await.expect("start");
    let keys = radio.contact_keys();
    assert_eq!(keys.len(), 3);
    assert_eq!(mgr.db_count().await.expect("count"), 3);
}

#[tokio::test]
async fn node_authoritative_sync_trims_db_and_backfills() {
    let (mgr, radio) = manager(1, true).await;
    // DB over capacity: rows 1 and 2; device holds only contact 3.
    mgr.ingest_advert(&advert(1)).await.expect("ingest");
    mgr.ingest_advert(&advert(2)).await.expect("ingest");
    radio.add_device_contact(ContactInfo {
        public_key: advert(3).public_key,
        adv_name: Some("node-3".to_owned()),
        node_type: 1,
        adv_lat: 1.0,
        adv_lon: 2.0,
    });

    mgr.start().await.expect("start");

    // DB rows not on the device were trimmed; the device contact was
    // backfilled with an empty raw advert.
    assert_eq!(mgr.db_count().await.expect("count"), 1);
    let row = mgr.get_row(&advert(3).node_id()).await.expect("get").expect("row");
    assert_eq!(row.raw_advert_data, "");
    assert_eq!(row.name.as_deref(), Some("node-3"));
}

#[tokio::test]
async fn sync_skipped_when_update_contacts_off() {
    let (mgr, radio) = manager(5, false).await;
    mgr.ingest_advert(&advert(1)).await.expect("ingest");
    mgr.start().await.expect("start");
    assert!(radio.contact_keys().is_empty());
}
