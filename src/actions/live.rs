//! Websocket hub at `/hubs/packets`.
//!
//! Clients send subscription commands as JSON text frames; the server
//! pushes `receive_packet` envelopes for every packet routed to a group
//! the connection has joined. Subscription errors come back on the same
//! channel as `error` envelopes.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{sink::SinkExt, stream::StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::live_packets::{HubMessage, LivePacketService};
use crate::web::AppState;

/// Client → server subscription commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SubscriptionMessage {
    #[serde(rename = "all")]
    All {
        action: String, // "subscribe" or "unsubscribe"
    },
    #[serde(rename = "callsign")]
    Callsign { action: String, callsign: String },
    #[serde(rename = "area")]
    Area {
        action: String,
        latitude: f64,
        longitude: f64,
        #[serde(rename = "radiusKm", default = "default_radius_km")]
        radius_km: f64,
    },
}

fn default_radius_km() -> f64 {
    1.0
}

pub async fn packets_hub(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.live))
}

async fn handle_socket(socket: WebSocket, live: LivePacketService) {
    let connection_id = Uuid::new_v4();
    info!(%connection_id, "live packet subscriber connected");
    metrics::gauge!("hub.connections").increment(1.0);

    let outbound_rx = live.register(connection_id).await;

    let (mut sink, mut stream) = socket.split();

    let write_task = tokio::spawn(async move {
        while let Ok(message) = outbound_rx.recv_async().await {
            let Ok(text) = serde_json::to_string(&message) else {
                continue;
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<SubscriptionMessage>(&text) {
                Ok(command) => {
                    if let Err(e) = apply_subscription(&live, connection_id, command).await {
                        live.push(
                            connection_id,
                            HubMessage::Error {
                                message: e.to_string(),
                            },
                        )
                        .await;
                    }
                }
                Err(e) => {
                    debug!(%connection_id, "malformed subscription message: {e}");
                    live.push(
                        connection_id,
                        HubMessage::Error {
                            message: format!("malformed subscription message: {e}"),
                        },
                    )
                    .await;
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    live.unregister(connection_id).await;
    let _ = write_task.await;
    metrics::gauge!("hub.connections").decrement(1.0);
    info!(%connection_id, "live packet subscriber disconnected");
}

async fn apply_subscription(
    live: &LivePacketService,
    connection_id: Uuid,
    command: SubscriptionMessage,
) -> Result<(), AppError> {
    match command {
        SubscriptionMessage::All { action } => match action.as_str() {
            "subscribe" => {
                live.subscribe_all(connection_id).await;
                Ok(())
            }
            "unsubscribe" => {
                live.unsubscribe_all(connection_id).await;
                Ok(())
            }
            other => Err(unknown_action(other)),
        },
        SubscriptionMessage::Callsign { action, callsign } => match action.as_str() {
            "subscribe" => live.subscribe_callsign(connection_id, &callsign).await,
            "unsubscribe" => live.unsubscribe_callsign(connection_id, &callsign).await,
            other => Err(unknown_action(other)),
        },
        SubscriptionMessage::Area {
            action,
            latitude,
            longitude,
            radius_km,
        } => match action.as_str() {
            "subscribe" => {
                live.subscribe_area(connection_id, latitude, longitude, radius_km)
                    .await
            }
            "unsubscribe" => live.unsubscribe_area(connection_id, latitude, longitude).await,
            other => Err(unknown_action(other)),
        },
    }
}

fn unknown_action(action: &str) -> AppError {
    AppError::validation("action", format!("must be subscribe or unsubscribe: {action:?}"))
}
