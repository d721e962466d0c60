use std::time::{SystemTime, UNIX_EPOCH};

fn now_ns() -> i128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos() as i128
}

/// Accumulates byte counts for one route direction and emits CSV records
/// to the logger when either a wall-clock interval or a byte threshold is
/// crossed: `ts_s,tag,elapsed_us,delta_bytes,cumulative_bytes,mbps`.
pub struct Metrics {
    time_start_ns: i128,
    time_report_ns: i128,
    byte_report: u64,
    report_interval_ns: i128,
    report_interval_bytes: u64,
    byte_count: u64,
    tag: String,
    buffer: Vec<String>,
}

impl Metrics {
    pub fn new(report_interval_ns: i128, report_interval_bytes: u64, tag: impl Into<String>) -> Metrics {
        let start = now_ns();
        let mut metrics = Metrics {
            time_start_ns: start,
            time_report_ns: start,
            byte_report: 0,
            report_interval_ns,
            report_interval_bytes,
            byte_count: 0,
            tag: tag.into(),
            buffer: Vec::new(),
        };
        metrics.add(0);
        metrics
    }

    pub fn add(&mut self, bytes: u64) {
        let now = now_ns();
        self.byte_count += bytes;
        self.byte_report += bytes;

        if now >= self.time_report_ns || self.byte_report >= self.report_interval_bytes {
            let elapsed_ns = (now - self.time_start_ns).max(1);
            let avg_bps = self.byte_count as f64 * 8.0 * 1_000_000_000.0 / elapsed_ns as f64;

            self.buffer.push(format!(
                "{:.6},{},{},{},{},{:.6}",
                now as f64 / 1e9,
                self.tag,
                elapsed_ns / 1000,
                bytes,
                self.byte_count,
                avg_bps / 1e6,
            ));

            self.byte_report = 0;
            while self.time_report_ns <= now {
                self.time_report_ns += self.report_interval_ns;
            }
        }
    }

    /// Forces a final record and flushes the buffered CSV lines to the
    /// logger.
    pub fn dump(&mut self) {
        self.time_report_ns = now_ns();
        self.add(0);
        for line in self.buffer.drain(..) {
            log::info!("{line}");
        }
    }
}
