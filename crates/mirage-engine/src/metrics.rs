use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Latency record for one named operation.
#[derive(Debug, Clone, Copy)]
struct OpStats {
    count: u64,
    total: Duration,
    min: Duration,
    max: Duration,
}

impl OpStats {
    fn record(&mut self, elapsed: Duration) {
        self.count += 1;
        self.total += elapsed;
        self.min = self.min.min(elapsed);
        self.max = self.max.max(elapsed);
    }

    fn avg(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total / self.count as u32
        }
    }
}

impl Default for OpStats {
    fn default() -> Self {
        Self {
            count: 0,
            total: Duration::ZERO,
            min: Duration::MAX,
            max: Duration::ZERO,
        }
    }
}

/// Counters and timers for diagnosing slow paths. Shared between the main
/// loop and worker threads; every record is one short mutex hold.
#[derive(Debug, Default)]
pub struct Instrumentation {
    ops: Mutex<BTreeMap<&'static str, OpStats>>,
    counters: Mutex<BTreeMap<&'static str, u64>>,
}

impl Instrumentation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a timer; finish with [`record`](Self::record).
    pub fn start(&self) -> Instant {
        Instant::now()
    }

    pub fn record(&self, name: &'static str, started: Instant) {
        self.record_duration(name, started.elapsed());
    }

    pub fn record_duration(&self, name: &'static str, elapsed: Duration) {
        let mut ops = self.ops.lock().unwrap_or_else(|e| e.into_inner());
        ops.entry(name).or_default().record(elapsed);
    }

    pub fn inc(&self, name: &'static str) {
        self.add(name, 1);
    }

    pub fn add(&self, name: &'static str, delta: u64) {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        *counters.entry(name).or_insert(0) += delta;
    }

    pub fn counter(&self, name: &'static str) -> u64 {
        self.counters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    pub fn op_count(&self, name: &'static str) -> u64 {
        self.ops
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .map(|s| s.count)
            .unwrap_or(0)
    }

    /// Human-readable counter/latency table.
    pub fn report(&self) -> String {
        let mut out = String::new();
        out.push_str("operation                     count        min        avg        max\n");
        {
            let ops = self.ops.lock().unwrap_or_else(|e| e.into_inner());
            for (name, stats) in ops.iter() {
                let min = if stats.count == 0 {
                    Duration::ZERO
                } else {
                    stats.min
                };
                out.push_str(&format!(
                    "{:<28} {:>6} {:>10} {:>10} {:>10}\n",
                    name,
                    stats.count,
                    format_duration(min),
                    format_duration(stats.avg()),
                    format_duration(stats.max),
                ));
            }
        }
        let counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        if !counters.is_empty() {
            out.push_str("counters:\n");
            for (name, value) in counters.iter() {
                out.push_str(&format!("  {:<26} {:>10}\n", name, value));
            }
        }
        out
    }
}

fn format_duration(d: Duration) -> String {
    let micros = d.as_micros();
    if micros >= 10_000 {
        format!("{}ms", d.as_millis())
    } else {
        format!("{}us", micros)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_min_avg_max() {
        let metrics = Instrumentation::new();
        metrics.record_duration("synthesize", Duration::from_micros(10));
        metrics.record_duration("synthesize", Duration::from_micros(30));

        assert_eq!(metrics.op_count("synthesize"), 2);
        let report = metrics.report();
        assert!(report.contains("synthesize"));
        assert!(report.contains("10us"));
        assert!(report.contains("20us")); // avg
        assert!(report.contains("30us"));
    }

    #[test]
    fn counters_accumulate() {
        let metrics = Instrumentation::new();
        metrics.inc("chunks_sent");
        metrics.add("chunks_sent", 4);
        assert_eq!(metrics.counter("chunks_sent"), 5);
        assert!(metrics.report().contains("chunks_sent"));
    }

    #[test]
    fn empty_report_has_header_only() {
        let metrics = Instrumentation::new();
        let report = metrics.report();
        assert!(report.starts_with("operation"));
        assert!(!report.contains("counters:"));
    }
}
