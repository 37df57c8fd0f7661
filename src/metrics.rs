//! In-process counters for each component.
//!
//! Every metrics struct is plain atomics behind an `Arc`, handed to the
//! component that owns it. `snapshot()` returns a serializable copy and
//! `reset()` zeroes everything, which keeps tests independent of each other.

use serde::Serialize;
use std::fmt::Write;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

fn load(c: &AtomicU64) -> u64 {
    c.load(Ordering::Relaxed)
}

fn bump(c: &AtomicU64) {
    c.fetch_add(1, Ordering::Relaxed);
}

fn average(total_ms: u64, samples: u64) -> f64 {
    if samples == 0 {
        0.0
    } else {
        total_ms as f64 / samples as f64
    }
}

fn prom_line(out: &mut String, name: &str, kind: &str, help: &str, value: impl std::fmt::Display) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
    let _ = writeln!(out, "{name} {value}");
}

// --- Stock ledger ---

#[derive(Debug, Default)]
pub struct LedgerMetrics {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    decrements: AtomicU64,
    version_conflicts: AtomicU64,
    insufficient_stock: AtomicU64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LedgerSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub decrements: u64,
    pub version_conflicts: u64,
    pub insufficient_stock: u64,
}

impl LedgerMetrics {
    pub fn cache_hit(&self) {
        bump(&self.cache_hits);
    }
    pub fn cache_miss(&self) {
        bump(&self.cache_misses);
    }
    pub fn decremented(&self) {
        bump(&self.decrements);
    }
    pub fn version_conflict(&self) {
        bump(&self.version_conflicts);
    }
    pub fn insufficient(&self) {
        bump(&self.insufficient_stock);
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            cache_hits: load(&self.cache_hits),
            cache_misses: load(&self.cache_misses),
            decrements: load(&self.decrements),
            version_conflicts: load(&self.version_conflicts),
            insufficient_stock: load(&self.insufficient_stock),
        }
    }

    pub fn reset(&self) {
        for c in [
            &self.cache_hits,
            &self.cache_misses,
            &self.decrements,
            &self.version_conflicts,
            &self.insufficient_stock,
        ] {
            c.store(0, Ordering::Relaxed);
        }
    }
}

// --- Broker ---

#[derive(Debug, Default)]
pub struct BrokerMetrics {
    published: AtomicU64,
    delivered: AtomicU64,
    acked: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
    reconnects: AtomicU64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BrokerSnapshot {
    pub published: u64,
    pub delivered: u64,
    pub acked: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    pub reconnects: u64,
}

impl BrokerMetrics {
    pub fn published(&self) {
        bump(&self.published);
    }
    pub fn delivered(&self) {
        bump(&self.delivered);
    }
    pub fn acked(&self) {
        bump(&self.acked);
    }
    pub fn retried(&self) {
        bump(&self.retried);
    }
    /// Terminal failure: the message will never be delivered again.
    pub fn dead_lettered(&self) {
        bump(&self.dead_lettered);
    }
    pub fn reconnected(&self) {
        bump(&self.reconnects);
    }

    pub fn snapshot(&self) -> BrokerSnapshot {
        BrokerSnapshot {
            published: load(&self.published),
            delivered: load(&self.delivered),
            acked: load(&self.acked),
            retried: load(&self.retried),
            dead_lettered: load(&self.dead_lettered),
            reconnects: load(&self.reconnects),
        }
    }

    pub fn reset(&self) {
        for c in [
            &self.published,
            &self.delivered,
            &self.acked,
            &self.retried,
            &self.dead_lettered,
            &self.reconnects,
        ] {
            c.store(0, Ordering::Relaxed);
        }
    }
}

// --- Kitchen ---

#[derive(Debug, Default)]
pub struct KitchenMetrics {
    processed: AtomicU64,
    failed: AtomicU64,
    duplicates_skipped: AtomicU64,
    total_latency_ms: AtomicU64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct KitchenSnapshot {
    pub processed: u64,
    pub failed: u64,
    pub duplicates_skipped: u64,
    pub avg_latency_ms: f64,
}

impl KitchenMetrics {
    pub fn cooked(&self, latency_ms: u64) {
        bump(&self.processed);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
    }
    pub fn failed(&self) {
        bump(&self.failed);
    }
    pub fn skipped(&self) {
        bump(&self.duplicates_skipped);
    }

    pub fn snapshot(&self) -> KitchenSnapshot {
        let processed = load(&self.processed);
        KitchenSnapshot {
            processed,
            failed: load(&self.failed),
            duplicates_skipped: load(&self.duplicates_skipped),
            avg_latency_ms: average(load(&self.total_latency_ms), processed),
        }
    }

    pub fn reset(&self) {
        for c in [
            &self.processed,
            &self.failed,
            &self.duplicates_skipped,
            &self.total_latency_ms,
        ] {
            c.store(0, Ordering::Relaxed);
        }
    }
}

// --- Relay ---

#[derive(Debug, Default)]
pub struct RelayMetrics {
    active_connections: AtomicI64,
    registrations: AtomicU64,
    evictions: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    heartbeat_terminations: AtomicU64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RelaySnapshot {
    pub active_connections: i64,
    pub registrations: u64,
    pub evictions: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub heartbeat_terminations: u64,
}

impl RelayMetrics {
    pub fn set_active(&self, n: usize) {
        self.active_connections.store(n as i64, Ordering::Relaxed);
    }
    pub fn registered(&self) {
        bump(&self.registrations);
    }
    pub fn evicted(&self) {
        bump(&self.evictions);
    }
    pub fn delivered(&self) {
        bump(&self.delivered);
    }
    pub fn dropped(&self) {
        bump(&self.dropped);
    }
    pub fn heartbeat_terminated(&self) {
        bump(&self.heartbeat_terminations);
    }

    pub fn snapshot(&self) -> RelaySnapshot {
        RelaySnapshot {
            active_connections: self.active_connections.load(Ordering::Relaxed),
            registrations: load(&self.registrations),
            evictions: load(&self.evictions),
            delivered: load(&self.delivered),
            dropped: load(&self.dropped),
            heartbeat_terminations: load(&self.heartbeat_terminations),
        }
    }

    pub fn reset(&self) {
        self.active_connections.store(0, Ordering::Relaxed);
        for c in [
            &self.registrations,
            &self.evictions,
            &self.delivered,
            &self.dropped,
            &self.heartbeat_terminations,
        ] {
            c.store(0, Ordering::Relaxed);
        }
    }

    pub fn render_prometheus(&self) -> String {
        let s = self.snapshot();
        let mut out = String::new();
        prom_line(&mut out, "relay_active_connections", "gauge", "Open WebSocket connections", s.active_connections);
        prom_line(&mut out, "relay_registrations_total", "counter", "Successful register handshakes", s.registrations);
        prom_line(&mut out, "relay_evictions_total", "counter", "Connections replaced by a newer registration", s.evictions);
        prom_line(&mut out, "relay_delivered_total", "counter", "Status events pushed to a live socket", s.delivered);
        prom_line(&mut out, "relay_dropped_total", "counter", "Status events with no live socket", s.dropped);
        prom_line(&mut out, "relay_heartbeat_terminations_total", "counter", "Connections closed for missing a pong", s.heartbeat_terminations);
        out
    }
}

// --- Gateway ---

#[derive(Debug, Default)]
pub struct GatewayMetrics {
    requests: AtomicU64,
    accepted: AtomicU64,
    failed: AtomicU64,
    auth_failures: AtomicU64,
    stock_rejections: AtomicU64,
    version_conflicts: AtomicU64,
    reconciliation_pending: AtomicU64,
    total_latency_ms: AtomicU64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GatewaySnapshot {
    pub requests: u64,
    pub accepted: u64,
    pub failed: u64,
    pub auth_failures: u64,
    pub stock_rejections: u64,
    pub version_conflicts: u64,
    pub reconciliation_pending: u64,
    pub avg_latency_ms: f64,
}

impl GatewayMetrics {
    /// Record one finished `POST /orders`.
    pub fn observe(&self, accepted: bool, latency_ms: u64) {
        bump(&self.requests);
        bump(if accepted { &self.accepted } else { &self.failed });
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
    }
    pub fn auth_failure(&self) {
        bump(&self.auth_failures);
    }
    pub fn stock_rejection(&self) {
        bump(&self.stock_rejections);
    }
    pub fn version_conflict(&self) {
        bump(&self.version_conflicts);
    }
    /// A reserved decrement could neither be queued nor compensated.
    pub fn reconciliation_needed(&self) {
        bump(&self.reconciliation_pending);
    }

    pub fn snapshot(&self) -> GatewaySnapshot {
        let requests = load(&self.requests);
        GatewaySnapshot {
            requests,
            accepted: load(&self.accepted),
            failed: load(&self.failed),
            auth_failures: load(&self.auth_failures),
            stock_rejections: load(&self.stock_rejections),
            version_conflicts: load(&self.version_conflicts),
            reconciliation_pending: load(&self.reconciliation_pending),
            avg_latency_ms: average(load(&self.total_latency_ms), requests),
        }
    }

    pub fn reset(&self) {
        for c in [
            &self.requests,
            &self.accepted,
            &self.failed,
            &self.auth_failures,
            &self.stock_rejections,
            &self.version_conflicts,
            &self.reconciliation_pending,
            &self.total_latency_ms,
        ] {
            c.store(0, Ordering::Relaxed);
        }
    }

    pub fn render_prometheus(&self) -> String {
        let s = self.snapshot();
        let mut out = String::new();
        prom_line(&mut out, "gateway_requests_total", "counter", "Order requests received", s.requests);
        prom_line(&mut out, "gateway_orders_accepted_total", "counter", "Orders reserved and queued", s.accepted);
        prom_line(&mut out, "gateway_orders_failed_total", "counter", "Orders rejected or failed", s.failed);
        prom_line(&mut out, "gateway_auth_failures_total", "counter", "Requests with a missing or invalid token", s.auth_failures);
        prom_line(&mut out, "gateway_stock_rejections_total", "counter", "Orders refused for lack of stock", s.stock_rejections);
        prom_line(&mut out, "gateway_version_conflicts_total", "counter", "Decrements that lost a version race", s.version_conflicts);
        prom_line(&mut out, "gateway_reconciliation_pending", "gauge", "Reservations neither queued nor compensated", s.reconciliation_pending);
        prom_line(&mut out, "gateway_avg_latency_ms", "gauge", "Mean order request latency", format!("{:.2}", s.avg_latency_ms));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kitchen_average_and_reset() {
        let m = KitchenMetrics::default();
        m.cooked(100);
        m.cooked(300);
        m.failed();
        let s = m.snapshot();
        assert_eq!(s.processed, 2);
        assert_eq!(s.failed, 1);
        assert_eq!(s.avg_latency_ms, 200.0);

        m.reset();
        assert_eq!(m.snapshot().processed, 0);
        assert_eq!(m.snapshot().avg_latency_ms, 0.0);
    }

    #[test]
    fn test_gateway_prometheus_text() {
        let m = GatewayMetrics::default();
        m.observe(true, 10);
        m.observe(false, 30);
        m.reconciliation_needed();
        let text = m.render_prometheus();
        assert!(text.contains("gateway_requests_total 2"));
        assert!(text.contains("gateway_orders_accepted_total 1"));
        assert!(text.contains("gateway_reconciliation_pending 1"));
        assert!(text.contains("gateway_avg_latency_ms 20.00"));
        assert!(text.contains("# TYPE gateway_requests_total counter"));
    }
}
