// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::expect_used)]

use super::*;
use crate::transport::meshcore::device::mock::MockRadio;
use crate::transport::meshcore::device::DeviceEvent;

fn fast_config() -> MeshcoreConfig {
    let mut config = MeshcoreConfig::default();
    config.ack_timeout = 1;
    config.inter_packet_delay = 0.0;
    config.max_retries = 2;
    config
}

fn handler(auto_ack: bool) -> (Arc<ProtocolHandler>, Arc<MockRadio>) {
    let radio = Arc::new(MockRadio::new(auto_ack));
    let handler = ProtocolHandler::new(Arc::clone(&radio) as Arc<dyn RadioDevice>, fast_config());
    (handler, radio)
}

/// Pump mock radio events into the handler's ACK table.
fn pump_acks(handler: &Arc<ProtocolHandler>, radio: &Arc<MockRadio>) -> tokio::task::JoinHandle<()> {
    let mut rx = radio.subscribe();
    let handler = Arc::clone(handler);
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            if let DeviceEvent::Ack { code } = event {
                handler.handle_ack(&code);
            }
        }
    })
}

#[tokio::test]
async fn send_packet_success_with_auto_ack() {
    let (handler, radio) = handler(true);
    let pump = pump_acks(&handler, &radio);

    let ok = handler.send_packet("node1", "bob", "hello").await.expect("send");
    assert!(ok);
    assert_eq!(radio.sent_packets().len(), 1);
    pump.abort();
}

#[tokio::test]
async fn send_packet_times_out_without_ack() {
    let (handler, _radio) = handler(false);
    let ok = handler.send_packet("node1", "bob", "hello").await.expect("send");
    assert!(!ok);
}

#[tokio::test]
async fn device_error_reply_counts_as_failure_not_io_error() {
    let (handler, radio) = handler(true);
    radio.set_fail_sends(true);
    let ok = handler.send_packet("node1", "bob", "hello").await.expect("send");
    assert!(!ok);
}

#[tokio::test]
async fn io_errors_are_retried_then_surfaced() {
    let (handler, radio) = handler(true);
    let pump = pump_acks(&handler, &radio);

    // One transient failure, then success within max_retries.
    radio.set_io_error_sends(1);
    let ok = handler.send_packet("node1", "bob", "hello").await.expect("send");
    assert!(ok);

    // More failures than attempts: the error escapes.
    radio.set_io_error_sends(5);
    assert!(handler.send_packet("node1", "bob", "again").await.is_err());
    pump.abort();
}

#[tokio::test]
async fn long_text_goes_out_in_tagged_chunks() {
    let (handler, radio) = handler(true);
    let pump = pump_acks(&handler, &radio);

    let text = "word ".repeat(60);
    let ok = handler.send_text("node1", "bob", text.trim()).await.expect("send");
    assert!(ok);

    let sent = radio.sent_packets();
    assert!(sent.len() >= 2);
    let total = sent.len();
    for (i, packet) in sent.iter().enumerate() {
        assert!(packet.text.len() <= 140);
        assert!(packet.text.ends_with(&format!("[{}/{}]", i + 1, total)));
    }
    pump.abort();
}

#[tokio::test]
async fn stale_acks_never_match() {
    let (handler, _radio) = handler(false);
    handler.handle_ack("cafe");
    {
        // Backdate the entry past the freshness window.
        let mut acks = handler.acks.lock().expect("lock");
        if let Some(stamp) = acks.get_mut("cafe") {
            *stamp = Instant::now() - ACK_MAX_AGE - Duration::from_secs(1);
        }
    }
    assert!(!handler.wait_for_ack("cafe", Duration::from_millis(50)).await);
    // The stale entry was discarded on inspection.
    assert_eq!(handler.pending_acks(), 0);
}

#[tokio::test]
async fn structured_messages_are_formatted() {
    let (handler, radio) = handler(true);
    let pump = pump_acks(&handler, &radio);

    let view = MessageView {
        id: 7,
        sender: "alice".to_owned(),
        display_name: "Alice".to_owned(),
        timestamp: "2026-07-04T12:30:00+00:00".to_owned(),
        room: "Lobby".to_owned(),
        content: "hi there".to_owned(),
        blocked: false,
        recipient: Some("bob".to_owned()),
    };
    let packet = ToUser::new("sess", "").with_message(view);
    let ok = handler.send_to_node("node1", "bob", &[packet]).await.expect("send");
    assert!(ok);

    let sent = radio.sent_packets();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].text.starts_with("[7] From: Alice (alice) To: bob - 2026-07-04 12:30"));
    assert!(sent[0].text.ends_with("hi there"));
    pump.abort();
}

#[tokio::test]
async fn blocked_messages_are_redacted() {
    let (handler, radio) = handler(true);
    let pump = pump_acks(&handler, &radio);

    let view = MessageView {
        id: 8,
        sender: "mallory".to_owned(),
        display_name: "Mallory".to_owned(),
        timestamp: "2026-07-04T12:30:00+00:00".to_owned(),
        room: "Lobby".to_owned(),
        content: "you'll never see this".to_owned(),
        blocked: true,
        recipient: None,
    };
    let packet = ToUser::new("sess", "").with_message(view);
    handler.send_to_node("node1", "bob", &[packet]).await.expect("send");

    let sent = radio.sent_packets();
    assert!(sent[0].text.contains("[Message from blocked sender]"));
    assert!(!sent[0].text.contains("never see"));
    pump.abort();
}
