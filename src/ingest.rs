//! Ingestion pipeline.
//!
//! Supervises the APRS-IS client and drives the parse → dedup → persist →
//! broadcast chain: a bounded drop-oldest queue fed by a single producer,
//! drained by a fixed worker pool. A bad packet never stalls the pipeline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::aprs::client::{AprsClient, ClientEvent};
use crate::aprs::parser;
use crate::dedup::{self, DedupCache};
use crate::live_packets::LivePacketService;
use crate::packet::Packet;
use crate::packets_repo::PacketsRepository;

pub const PACKET_QUEUE_CAPACITY: usize = 10_000;
pub const PACKET_WORKERS: usize = 4;

const SUPERVISOR_INTERVAL: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

pub struct IngestPipeline {
    client: Arc<AprsClient>,
    repo: PacketsRepository,
    dedup: DedupCache,
    live: LivePacketService,
}

impl IngestPipeline {
    pub fn new(
        client: AprsClient,
        repo: PacketsRepository,
        dedup: DedupCache,
        live: LivePacketService,
    ) -> Self {
        Self {
            client: Arc::new(client),
            repo,
            dedup,
            live,
        }
    }

    /// Run until cancelled. On cancellation the queue is closed, workers
    /// drain the backlog (bounded by a 30 s timeout), and the upstream
    /// connection is torn down.
    pub async fn run(self, cancel: CancellationToken) {
        let (packet_tx, packet_rx) = flume::bounded::<Packet>(PACKET_QUEUE_CAPACITY);
        let (event_tx, event_rx) = flume::unbounded::<ClientEvent>();

        metrics::gauge!("aprs.connection.connected").set(0.0);
        metrics::counter!("aprs.packet_queue.dropped_oldest").absolute(0);
        metrics::counter!("aprs.packets.deduplicated").absolute(0);

        let mut workers = Vec::with_capacity(PACKET_WORKERS);
        for worker_id in 0..PACKET_WORKERS {
            let queue = packet_rx.clone();
            let repo = self.repo.clone();
            let dedup = self.dedup.clone();
            let live = self.live.clone();
            workers.push(tokio::spawn(async move {
                packet_worker(worker_id, queue, repo, dedup, live).await;
            }));
        }
        info!("Spawned {} packet workers", PACKET_WORKERS);

        let producer = {
            let queue_tx = packet_tx.clone();
            let queue_rx = packet_rx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                event_loop(event_rx, queue_tx, queue_rx, cancel).await;
            })
        };

        // Supervisor: connect when disconnected, watch queue depth.
        loop {
            if cancel.is_cancelled() {
                break;
            }
            if !self.client.is_connected() {
                match self.client.connect(event_tx.clone(), &cancel).await {
                    Ok(()) => {
                        info!("Connected to APRS-IS");
                        metrics::gauge!("aprs.connection.connected").set(1.0);
                        crate::metrics::ingest_health().write().await.upstream_connected = true;
                    }
                    Err(e) => {
                        warn!(
                            "APRS-IS connection failed: {e}; retrying in {}s",
                            RECONNECT_DELAY.as_secs()
                        );
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                        }
                        continue;
                    }
                }
            }

            let depth = packet_tx.len();
            metrics::gauge!("aprs.packet_queue.depth").set(depth as f64);
            if depth > PACKET_QUEUE_CAPACITY / 2 {
                warn!(
                    "Packet queue building up: {} packets (over 50% of capacity {})",
                    depth, PACKET_QUEUE_CAPACITY
                );
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(SUPERVISOR_INTERVAL) => {}
            }
        }

        info!("Ingest pipeline shutting down");
        let _ = producer.await;

        // Close the queue so workers exit once the backlog is drained.
        drop(packet_tx);
        drop(packet_rx);
        let drain = async {
            for worker in workers {
                let _ = worker.await;
            }
        };
        if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
            warn!(
                "Packet workers did not drain within {}s, abandoning backlog",
                DRAIN_TIMEOUT.as_secs()
            );
        } else {
            info!("Packet workers drained");
        }

        self.client.disconnect().await;
    }
}

/// Single producer: consume client events, parse raw lines at arrival
/// order, and enqueue the resulting packets.
async fn event_loop(
    events: flume::Receiver<ClientEvent>,
    queue_tx: flume::Sender<Packet>,
    queue_rx: flume::Receiver<Packet>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv_async() => match event {
                Ok(event) => event,
                Err(_) => break,
            },
        };

        match event {
            ClientEvent::Raw(line) => {
                crate::metrics::ingest_health().write().await.last_message_at =
                    Some(Instant::now());
                match parser::parse_packet(&line, Utc::now()) {
                    Ok(packet) => {
                        metrics::counter!("aprs.packets.parsed").increment(1);
                        enqueue_drop_oldest(&queue_tx, &queue_rx, packet);
                    }
                    Err(e) => {
                        metrics::counter!("aprs.packets.parse_failed").increment(1);
                        debug!("Dropping unparseable line: {e}");
                    }
                }
            }
            ClientEvent::Validated(true) => {
                info!("APRS-IS login validated");
            }
            ClientEvent::Validated(false) => {
                warn!("APRS-IS login not validated; continuing receive-only");
            }
            ClientEvent::Disconnected => {
                metrics::gauge!("aprs.connection.connected").set(0.0);
                crate::metrics::ingest_health().write().await.upstream_connected = false;
                info!("APRS-IS connection lost; supervisor will reconnect");
            }
        }
    }
}

/// Enqueue without ever blocking the producer: when the queue is full the
/// oldest packet is evicted so the newest survives.
fn enqueue_drop_oldest(
    queue_tx: &flume::Sender<Packet>,
    queue_rx: &flume::Receiver<Packet>,
    packet: Packet,
) {
    let mut pending = packet;
    loop {
        match queue_tx.try_send(pending) {
            Ok(()) => return,
            Err(flume::TrySendError::Full(rejected)) => {
                if queue_rx.try_recv().is_ok() {
                    metrics::counter!("aprs.packet_queue.dropped_oldest").increment(1);
                }
                pending = rejected;
            }
            Err(flume::TrySendError::Disconnected(_)) => {
                debug!("Packet queue closed; dropping packet");
                return;
            }
        }
    }
}

/// Worker: fingerprint → dedup check → persist → mark seen → broadcast.
/// Failures in the persist/broadcast steps are logged and skipped.
async fn packet_worker(
    worker_id: usize,
    queue: flume::Receiver<Packet>,
    repo: PacketsRepository,
    dedup: DedupCache,
    live: LivePacketService,
) {
    while let Ok(mut packet) = queue.recv_async().await {
        let start = Instant::now();

        let key = dedup::fingerprint(packet.sender.value(), &packet.raw_content);
        if dedup.seen(&key).await {
            metrics::counter!("aprs.packets.deduplicated").increment(1);
            continue;
        }

        match repo.insert(&packet).await {
            Ok(id) => {
                packet.id = Some(id);
                metrics::counter!("aprs.packets.persisted").increment(1);
            }
            Err(e) => {
                error!(worker_id, "Failed to persist packet: {e:#}");
            }
        }

        dedup.insert(key).await;
        live.broadcast(&packet).await;

        metrics::histogram!("aprs.packet.duration_ms")
            .record(start.elapsed().as_millis() as f64);
    }
    debug!(worker_id, "Packet worker drained and stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callsign::Callsign;

    fn packet(n: usize) -> Packet {
        Packet::new(
            Callsign::parse("N0CALL").unwrap(),
            &format!("N0CALL>APRS:>packet {n}"),
            Utc::now(),
        )
    }

    #[test]
    fn overflow_drops_the_oldest_packet() {
        let (tx, rx) = flume::bounded::<Packet>(3);
        for n in 0..3 {
            enqueue_drop_oldest(&tx, &rx, packet(n));
        }
        assert_eq!(tx.len(), 3);

        enqueue_drop_oldest(&tx, &rx, packet(3));
        assert_eq!(tx.len(), 3);

        let remaining: Vec<String> = rx.try_iter().map(|p| p.raw_content).collect();
        assert_eq!(
            remaining,
            vec![
                "N0CALL>APRS:>packet 1",
                "N0CALL>APRS:>packet 2",
                "N0CALL>APRS:>packet 3",
            ]
        );
    }

    #[test]
    fn enqueue_into_closed_queue_is_a_no_op() {
        let (tx, rx) = flume::bounded::<Packet>(1);
        drop(rx);
        enqueue_drop_oldest(&tx, &flume::bounded::<Packet>(1).1, packet(0));
    }
}
