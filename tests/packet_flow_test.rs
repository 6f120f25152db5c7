//! End-to-end flow over the non-database pipeline pieces: raw TNC2 lines
//! through the parser, the dedup filter, and the live fan-out registry.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use aprshub::aprs::parser::parse_packet;
use aprshub::dedup::{DedupCache, fingerprint};
use aprshub::live_packets::{HubMessage, LivePacketService};
use aprshub::packet::PacketType;

const POSITION_LINE: &str = "N0CALL>APRS,WIDE1-1:!4903.50N/07201.75W-Test Packet";

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 10, 12, 0, 0).unwrap()
}

#[test]
fn position_line_decodes_to_the_expected_record() {
    let packet = parse_packet(POSITION_LINE, now()).unwrap();
    assert_eq!(packet.sender.value(), "N0CALL");
    assert_eq!(packet.packet_type, PacketType::PositionWithoutTimestamp);
    let position = packet.position.unwrap();
    assert_eq!(position.latitude, 49.058333);
    assert_eq!(position.longitude, -72.029167);
    assert_eq!(packet.raw_content, POSITION_LINE);
}

#[tokio::test]
async fn repeated_line_is_suppressed_within_the_window() {
    let dedup = DedupCache::new(Duration::from_millis(100));
    let mut stored = 0;

    for _ in 0..2 {
        let packet = parse_packet(POSITION_LINE, now()).unwrap();
        let key = fingerprint(packet.sender.value(), &packet.raw_content);
        if !dedup.seen(&key).await {
            stored += 1;
            dedup.insert(key).await;
        }
    }
    assert_eq!(stored, 1, "second arrival inside the window is dropped");

    // after the window the same line stores again
    tokio::time::sleep(Duration::from_millis(150)).await;
    let packet = parse_packet(POSITION_LINE, now()).unwrap();
    let key = fingerprint(packet.sender.value(), &packet.raw_content);
    assert!(!dedup.seen(&key).await);
}

#[tokio::test]
async fn parsed_packet_routes_to_the_matching_area_subscriber() {
    let live = LivePacketService::new();
    let connection_id = Uuid::new_v4();
    let rx = live.register(connection_id).await;
    live.subscribe_area(connection_id, 49.2, -72.7, 100.0)
        .await
        .unwrap();

    // (49.058333, -72.029167) floors into area:49_-73
    let packet = parse_packet(POSITION_LINE, now()).unwrap();
    live.broadcast(&packet).await;

    let delivered: Vec<HubMessage> = rx.try_iter().collect();
    assert_eq!(delivered.len(), 1);
    match &delivered[0] {
        HubMessage::ReceivePacket { packet } => {
            assert_eq!(packet.sender, "N0CALL");
            assert_eq!(packet.packet_type, "PositionWithoutTimestamp");
        }
        other => panic!("unexpected hub message: {other:?}"),
    }
}

#[tokio::test]
async fn subscriber_outside_the_cell_hears_nothing() {
    let live = LivePacketService::new();
    let connection_id = Uuid::new_v4();
    let rx = live.register(connection_id).await;
    live.subscribe_area(connection_id, 52.0, 21.0, 500.0)
        .await
        .unwrap();

    let packet = parse_packet(POSITION_LINE, now()).unwrap();
    live.broadcast(&packet).await;
    assert_eq!(rx.try_iter().count(), 0);
}
