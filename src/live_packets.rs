//! Real-time packet fan-out.
//!
//! A registry of named groups to subscriber connections. Broadcasts route
//! a packet to `all_packets`, to its sender's callsign group (plus the
//! base-callsign group for SSID variants), and to the 1°x1° area group of
//! its position. Subscribers joined to overlapping groups receive the
//! packet once per group.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::packet::{Packet, PacketDto};

pub const ALL_PACKETS_GROUP: &str = "all_packets";

/// Per-connection outbound buffer. Bounded so a subscriber that stops
/// draining its socket falls behind by at most this many messages;
/// further broadcasts to it are dropped.
pub const SUBSCRIBER_CHANNEL_CAPACITY: usize = 100;

pub fn callsign_group(callsign: &str) -> String {
    format!("callsign:{}", callsign.to_uppercase())
}

pub fn area_group(latitude: f64, longitude: f64) -> String {
    format!(
        "area:{}_{}",
        latitude.floor() as i64,
        longitude.floor() as i64
    )
}

/// Server-to-client envelope on the packets hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubMessage {
    ReceivePacket { packet: PacketDto },
    Error { message: String },
}

#[derive(Default)]
struct Registry {
    groups: HashMap<String, HashSet<Uuid>>,
    connections: HashMap<Uuid, flume::Sender<HubMessage>>,
}

#[derive(Clone, Default)]
pub struct LivePacketService {
    registry: Arc<RwLock<Registry>>,
}

impl LivePacketService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a connection and create its bounded outbound channel. The
    /// returned receiver feeds the connection's send task. Must precede
    /// any subscribe.
    pub async fn register(&self, connection_id: Uuid) -> flume::Receiver<HubMessage> {
        let (sender, receiver) = flume::bounded(SUBSCRIBER_CHANNEL_CAPACITY);
        let mut registry = self.registry.write().await;
        registry.connections.insert(connection_id, sender);
        metrics::gauge!("hub.subscribers").set(registry.connections.len() as f64);
        receiver
    }

    /// Push a protocol message to one connection (subscription errors).
    /// Dropped if the connection is gone or backlogged.
    pub async fn push(&self, connection_id: Uuid, message: HubMessage) {
        let registry = self.registry.read().await;
        if let Some(sender) = registry.connections.get(&connection_id) {
            let _ = sender.try_send(message);
        }
    }

    /// Drop a connection and remove it from every group.
    pub async fn unregister(&self, connection_id: Uuid) {
        let mut registry = self.registry.write().await;
        registry.connections.remove(&connection_id);
        registry.groups.retain(|_, members| {
            members.remove(&connection_id);
            !members.is_empty()
        });
        metrics::gauge!("hub.subscribers").set(registry.connections.len() as f64);
        info!(%connection_id, "subscriber removed");
    }

    async fn join(&self, connection_id: Uuid, group: String) {
        let mut registry = self.registry.write().await;
        debug!(%connection_id, group, "joining group");
        registry.groups.entry(group).or_default().insert(connection_id);
    }

    async fn leave(&self, connection_id: Uuid, group: &str) {
        let mut registry = self.registry.write().await;
        debug!(%connection_id, group, "leaving group");
        if let Some(members) = registry.groups.get_mut(group) {
            members.remove(&connection_id);
            if members.is_empty() {
                registry.groups.remove(group);
            }
        }
    }

    pub async fn subscribe_all(&self, connection_id: Uuid) {
        self.join(connection_id, ALL_PACKETS_GROUP.to_string()).await;
    }

    pub async fn unsubscribe_all(&self, connection_id: Uuid) {
        self.leave(connection_id, ALL_PACKETS_GROUP).await;
    }

    pub async fn subscribe_callsign(
        &self,
        connection_id: Uuid,
        callsign: &str,
    ) -> Result<(), AppError> {
        let callsign = validated_callsign(callsign)?;
        self.join(connection_id, callsign_group(callsign)).await;
        Ok(())
    }

    pub async fn unsubscribe_callsign(
        &self,
        connection_id: Uuid,
        callsign: &str,
    ) -> Result<(), AppError> {
        let callsign = validated_callsign(callsign)?;
        self.leave(connection_id, &callsign_group(callsign)).await;
        Ok(())
    }

    /// Join the 1°x1° cell containing the point. The radius is validated
    /// but advisory: routing covers the single containing cell.
    pub async fn subscribe_area(
        &self,
        connection_id: Uuid,
        latitude: f64,
        longitude: f64,
        radius_km: f64,
    ) -> Result<(), AppError> {
        validate_area(latitude, longitude)?;
        if !(1.0..=1000.0).contains(&radius_km) {
            return Err(AppError::validation(
                "radiusKm",
                format!("out of range [1, 1000]: {radius_km}"),
            ));
        }
        self.join(connection_id, area_group(latitude, longitude)).await;
        Ok(())
    }

    pub async fn unsubscribe_area(
        &self,
        connection_id: Uuid,
        latitude: f64,
        longitude: f64,
    ) -> Result<(), AppError> {
        validate_area(latitude, longitude)?;
        self.leave(connection_id, &area_group(latitude, longitude)).await;
        Ok(())
    }

    pub async fn subscriber_count(&self) -> usize {
        self.registry.read().await.connections.len()
    }

    fn matching_groups(packet: &Packet) -> Vec<String> {
        let mut groups = vec![
            ALL_PACKETS_GROUP.to_string(),
            callsign_group(packet.sender.value()),
        ];
        if packet.sender.ssid() != 0 {
            groups.push(callsign_group(packet.sender.base()));
        }
        if let Some(position) = &packet.position {
            groups.push(area_group(position.latitude, position.longitude));
        }
        groups
    }

    /// Route a packet to every matching group. A failed send to one
    /// subscriber never blocks the others and never raises.
    pub async fn broadcast(&self, packet: &Packet) {
        let message = HubMessage::ReceivePacket {
            packet: PacketDto::from(packet),
        };
        let registry = self.registry.read().await;
        for group in Self::matching_groups(packet) {
            let Some(members) = registry.groups.get(&group) else {
                continue;
            };
            for connection_id in members {
                let Some(sender) = registry.connections.get(connection_id) else {
                    continue;
                };
                match sender.try_send(message.clone()) {
                    Ok(()) => {
                        metrics::counter!("hub.messages.sent").increment(1);
                    }
                    Err(flume::TrySendError::Full(_)) => {
                        debug!(%connection_id, group, "subscriber backlogged, message dropped");
                        metrics::counter!("hub.messages.dropped").increment(1);
                    }
                    Err(flume::TrySendError::Disconnected(_)) => {
                        debug!(%connection_id, group, "subscriber channel closed, message dropped");
                        metrics::counter!("hub.messages.dropped").increment(1);
                    }
                }
            }
        }
    }
}

fn validated_callsign(callsign: &str) -> Result<&str, AppError> {
    let trimmed = callsign.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("callsign", "must not be empty"));
    }
    Ok(trimmed)
}

fn validate_area(latitude: f64, longitude: f64) -> Result<(), AppError> {
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(AppError::validation(
            "latitude",
            format!("out of range [-90, 90]: {latitude}"),
        ));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(AppError::validation(
            "longitude",
            format!("out of range [-180, 180]: {longitude}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callsign::Callsign;
    use crate::position::GeoCoordinate;
    use chrono::Utc;

    fn packet(sender: &str, position: Option<(f64, f64)>) -> Packet {
        let mut packet = Packet::new(
            Callsign::parse(sender).unwrap(),
            &format!("{sender}>APRS:>test"),
            Utc::now(),
        );
        packet.position =
            position.map(|(lat, lon)| GeoCoordinate::new(lat, lon).unwrap());
        packet
    }

    async fn subscriber(service: &LivePacketService) -> (Uuid, flume::Receiver<HubMessage>) {
        let id = Uuid::new_v4();
        let rx = service.register(id).await;
        (id, rx)
    }

    fn received(rx: &flume::Receiver<HubMessage>) -> usize {
        rx.try_iter().count()
    }

    #[tokio::test]
    async fn area_group_routing() {
        let service = LivePacketService::new();
        let (id, rx) = subscriber(&service).await;
        service.subscribe_area(id, 52.0, 21.0, 100.0).await.unwrap();

        service.broadcast(&packet("N0CALL", Some((52.9, 21.9)))).await;
        assert_eq!(received(&rx), 1);

        // outside the cell
        service.broadcast(&packet("N0CALL", Some((53.1, 21.5)))).await;
        assert_eq!(received(&rx), 0);
    }

    #[tokio::test]
    async fn negative_coordinates_floor_to_their_own_cell() {
        assert_eq!(area_group(-0.5, -0.5), "area:-1_-1");
        let service = LivePacketService::new();
        let (id, rx) = subscriber(&service).await;
        service.subscribe_area(id, -0.5, -0.5, 10.0).await.unwrap();
        service.broadcast(&packet("N0CALL", Some((-0.2, -0.9)))).await;
        assert_eq!(received(&rx), 1);
    }

    #[tokio::test]
    async fn callsign_routing_includes_base_group_for_ssid_variants() {
        let service = LivePacketService::new();
        let (id, rx) = subscriber(&service).await;
        service.subscribe_callsign(id, "n0call").await.unwrap();

        service.broadcast(&packet("N0CALL-9", None)).await;
        assert_eq!(received(&rx), 1, "base group gets SSID variants");

        service.broadcast(&packet("N0CALL", None)).await;
        assert_eq!(received(&rx), 1, "exact match still routes");

        service.broadcast(&packet("W1AW", None)).await;
        assert_eq!(received(&rx), 0);
    }

    #[tokio::test]
    async fn overlapping_groups_deliver_once_per_group() {
        let service = LivePacketService::new();
        let (id, rx) = subscriber(&service).await;
        service.subscribe_all(id).await;
        service.subscribe_callsign(id, "N0CALL").await.unwrap();

        service.broadcast(&packet("N0CALL", None)).await;
        assert_eq!(received(&rx), 2);
    }

    #[tokio::test]
    async fn packets_without_position_skip_area_groups() {
        let service = LivePacketService::new();
        let (id, rx) = subscriber(&service).await;
        service.subscribe_area(id, 52.0, 21.0, 50.0).await.unwrap();
        service.broadcast(&packet("N0CALL", None)).await;
        assert_eq!(received(&rx), 0);
    }

    #[tokio::test]
    async fn unsubscribe_and_unregister_stop_delivery() {
        let service = LivePacketService::new();
        let (id, rx) = subscriber(&service).await;
        service.subscribe_all(id).await;
        service.unsubscribe_all(id).await;
        service.broadcast(&packet("N0CALL", None)).await;
        assert_eq!(received(&rx), 0);

        service.subscribe_all(id).await;
        service.unregister(id).await;
        service.broadcast(&packet("N0CALL", None)).await;
        assert_eq!(received(&rx), 0);
        assert_eq!(service.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn backlogged_subscriber_drops_instead_of_blocking() {
        let service = LivePacketService::new();
        let (id, rx) = subscriber(&service).await;
        service.subscribe_all(id).await;

        for _ in 0..SUBSCRIBER_CHANNEL_CAPACITY + 5 {
            service.broadcast(&packet("N0CALL", None)).await;
        }
        assert_eq!(received(&rx), SUBSCRIBER_CHANNEL_CAPACITY);
    }

    #[tokio::test]
    async fn closed_subscriber_does_not_block_others() {
        let service = LivePacketService::new();
        let (dead, dead_rx) = subscriber(&service).await;
        let (alive, alive_rx) = subscriber(&service).await;
        service.subscribe_all(dead).await;
        service.subscribe_all(alive).await;
        drop(dead_rx);

        service.broadcast(&packet("N0CALL", None)).await;
        assert_eq!(received(&alive_rx), 1);
    }

    #[tokio::test]
    async fn subscription_validation() {
        let service = LivePacketService::new();
        let (id, _rx) = subscriber(&service).await;
        assert!(service.subscribe_callsign(id, "  ").await.is_err());
        assert!(service.subscribe_area(id, 91.0, 0.0, 10.0).await.is_err());
        assert!(service.subscribe_area(id, 0.0, 181.0, 10.0).await.is_err());
        assert!(service.subscribe_area(id, 0.0, 0.0, 0.5).await.is_err());
        assert!(service.subscribe_area(id, 0.0, 0.0, 1001.0).await.is_err());
        assert!(service.subscribe_area(id, 52.0, 21.0, 500.0).await.is_ok());
    }
}
