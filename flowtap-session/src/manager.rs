//! Session lifecycle management (`§4.4`).
//!
//! One [`Flow`] per remote peer, held in a [`DashMap`] so independent flows
//! make progress without contending on a single lock. A background task
//! evicts flows that have been idle past `session_idle_timeout`, scanning
//! at most `eviction_scan_cap` entries per sweep so one oversized table
//! never stalls the eviction tick -- mirroring the capped sweep in the
//! original monitor's session map.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use flowtap_core::{Config, Direction, FlowKey};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::classifier::Classifier;
use crate::flow::Flow;
use crate::packet::TcpPacket;
use crate::sink::Sink;

#[derive(Debug, Default)]
pub struct SessionStatistics {
    pub packets_processed: AtomicU64,
    pub packets_missed: AtomicU64,
    pub sessions_created: AtomicU64,
    pub sessions_evicted: AtomicU64,
}

/// Owns every tracked flow and the classifier that feeds them.
pub struct SessionManager {
    flows: Arc<DashMap<FlowKey, Arc<Mutex<Flow>>>>,
    classifier: Classifier,
    sinks: Vec<Arc<dyn Sink>>,
    gap_skip_threshold: usize,
    session_idle_timeout: Duration,
    eviction_scan_cap: usize,
    eviction_cursor: AtomicUsize,
    stats: Arc<SessionStatistics>,
}

impl SessionManager {
    pub fn new(config: &Config, sinks: Vec<Arc<dyn Sink>>) -> Self {
        Self {
            flows: Arc::new(DashMap::new()),
            classifier: Classifier::new(config.local_host, config.local_port, config.only_in),
            sinks,
            gap_skip_threshold: config.gap_skip_threshold,
            session_idle_timeout: config.session_idle_timeout,
            eviction_scan_cap: config.eviction_scan_cap,
            eviction_cursor: AtomicUsize::new(0),
            stats: Arc::new(SessionStatistics::default()),
        }
    }

    pub fn stats(&self) -> Arc<SessionStatistics> {
        self.stats.clone()
    }

    pub fn live_sessions(&self) -> usize {
        self.flows.len()
    }

    /// Classify and admit one captured packet, dispatching any RESP values
    /// it completes to every registered sink.
    ///
    /// The sink fan-out runs while this flow's lock is still held, per the
    /// core's concurrency contract: it serializes sink delivery against
    /// every other call on the same flow, and leaves offloading a slow
    /// sink's own work to that sink.
    pub async fn feed(&self, pkt: TcpPacket) {
        let Some(classified) = self.classifier.classify(&pkt) else {
            return;
        };
        self.stats.packets_processed.fetch_add(1, Ordering::Relaxed);

        // Teardown signals remove the flow and drop the packet that carried
        // them; removal is idempotent if the flow is already gone.
        let teardown = match classified.direction {
            Direction::Out => pkt.rst,
            Direction::In => pkt.fin,
        };
        if teardown {
            self.flows.remove(&classified.flow_key);
            return;
        }

        let flow = Arc::clone(
            self.flows
                .entry(classified.flow_key)
                .or_insert_with(|| {
                    self.stats.sessions_created.fetch_add(1, Ordering::Relaxed);
                    Arc::new(Mutex::new(Flow::new(self.gap_skip_threshold)))
                })
                .value(),
        );

        let mut guard = flow.lock().await;
        let values = guard.feed(classified.direction, pkt);
        let missed_delta = guard.missed_delta();
        if missed_delta > 0 {
            self.stats
                .packets_missed
                .fetch_add(missed_delta, Ordering::Relaxed);
        }
        if values.is_empty() {
            return;
        }

        for value in &values {
            for sink in &self.sinks {
                sink.accept(classified.flow_key, classified.direction, value).await;
            }
        }
    }

    /// Spawn the periodic eviction and stats-logging tasks. Mirrors the two
    /// background loops the original monitor runs alongside packet
    /// ingestion.
    pub fn spawn_background_tasks(self: &Arc<Self>, config: &Config) {
        let evict = Arc::clone(self);
        let eviction_interval = config.eviction_interval;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(eviction_interval);
            loop {
                tick.tick().await;
                evict.evict_idle_sessions();
            }
        });

        let report = Arc::clone(self);
        let stats_interval = config.stats_log_interval;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(stats_interval);
            loop {
                tick.tick().await;
                report.log_stats();
            }
        });
    }

    fn evict_idle_sessions(&self) {
        let deadline = Instant::now();
        let total = self.flows.len();
        // Rotate the scan start point each sweep so a table larger than
        // `eviction_scan_cap` has every entry examined eventually instead
        // of always favoring whatever sorts first.
        let start = if total == 0 {
            0
        } else {
            self.eviction_cursor.load(Ordering::Relaxed) % total
        };

        let mut expired = Vec::new();
        for entry in self
            .flows
            .iter()
            .skip(start)
            .chain(self.flows.iter().take(start))
            .take(self.eviction_scan_cap)
        {
            // A flow actively being fed is, by definition, not idle; skip
            // it this sweep rather than wait on its lock.
            let Ok(guard) = entry.value().try_lock() else {
                continue;
            };
            if deadline.duration_since(guard.last_activity()) > self.session_idle_timeout {
                expired.push(*entry.key());
            }
        }
        self.eviction_cursor
            .store(start + self.eviction_scan_cap, Ordering::Relaxed);
        for key in &expired {
            self.flows.remove(key);
        }
        if !expired.is_empty() {
            self.stats
                .sessions_evicted
                .fetch_add(expired.len() as u64, Ordering::Relaxed);
            debug!(count = expired.len(), "evicted idle sessions");
        }
    }

    fn log_stats(&self) {
        info!(
            sessions = self.live_sessions(),
            processed = self.stats.packets_processed.load(Ordering::Relaxed),
            missed = self.stats.packets_missed.load(Ordering::Relaxed),
            evicted = self.stats.sessions_evicted.load(Ordering::Relaxed),
            "session manager stats"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn cfg() -> Config {
        Config {
            local_host: Ipv4Addr::new(10, 0, 0, 1),
            local_port: 6379,
            ..Config::default()
        }
    }

    fn pkt(seq: u32, payload: &[u8]) -> TcpPacket {
        TcpPacket {
            src_host: Ipv4Addr::new(10, 0, 0, 2),
            src_port: 5555,
            dst_host: Ipv4Addr::new(10, 0, 0, 1),
            dst_port: 6379,
            seq,
            syn: false,
            fin: false,
            rst: false,
            psh: true,
            payload: payload.to_vec(),
        }
    }

    #[tokio::test]
    async fn feeding_a_request_creates_one_session() {
        let mgr = SessionManager::new(&cfg(), Vec::new());
        mgr.feed(pkt(0, b"*1\r\n$4\r\nPING\r\n")).await;
        assert_eq!(mgr.live_sessions(), 1);
        assert_eq!(
            mgr.stats().packets_processed.load(Ordering::Relaxed),
            1
        );
    }

    #[tokio::test]
    async fn unrelated_packet_creates_no_session() {
        let mgr = SessionManager::new(&cfg(), Vec::new());
        let mut unrelated = pkt(0, b"x");
        unrelated.dst_port = 9999;
        mgr.feed(unrelated).await;
        assert_eq!(mgr.live_sessions(), 0);
    }

    #[tokio::test]
    async fn evict_idle_sessions_removes_flows_past_the_timeout() {
        let mut config = cfg();
        config.session_idle_timeout = Duration::from_millis(10);
        let mgr = SessionManager::new(&config, Vec::new());
        mgr.feed(pkt(0, b"*1\r\n$4\r\nPING\r\n")).await;
        assert_eq!(mgr.live_sessions(), 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        mgr.evict_idle_sessions();
        assert_eq!(mgr.live_sessions(), 0);
        assert_eq!(
            mgr.stats().sessions_evicted.load(Ordering::Relaxed),
            1
        );
    }

    #[tokio::test]
    async fn fin_tears_down_the_flow() {
        let mgr = SessionManager::new(&cfg(), Vec::new());
        mgr.feed(pkt(0, b"*1\r\n$4\r\nPING\r\n")).await;
        assert_eq!(mgr.live_sessions(), 1);

        let mut fin = pkt(100, b"");
        fin.fin = true;
        mgr.feed(fin).await;
        assert_eq!(mgr.live_sessions(), 0);
    }

    #[tokio::test]
    async fn rst_tears_down_the_flow_even_under_only_in() {
        let mut config = cfg();
        config.only_in = true;
        let mgr = SessionManager::new(&config, Vec::new());
        mgr.feed(pkt(0, b"*1\r\n$4\r\nPING\r\n")).await;
        assert_eq!(mgr.live_sessions(), 1);

        let rst = TcpPacket {
            src_host: Ipv4Addr::new(10, 0, 0, 1),
            src_port: 6379,
            dst_host: Ipv4Addr::new(10, 0, 0, 2),
            dst_port: 5555,
            seq: 100,
            syn: false,
            fin: false,
            rst: true,
            psh: false,
            payload: Vec::new(),
        };
        mgr.feed(rst).await;
        assert_eq!(mgr.live_sessions(), 0);
    }
}
