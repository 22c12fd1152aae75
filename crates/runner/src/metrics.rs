//! Per-request metric rows and the batched CSV sink.
//!
//! Two row shapes flow through the sink: plain KV rows and lock rows with
//! the extended lock columns. They are carried as a tagged variant with a
//! per-variant column projection; the sink writes whichever projection the
//! row carries, under the header chosen at open time.
//!
//! The sink buffers rows and flushes synchronously once `batch_size` rows
//! have accumulated. A flush failure is returned to the caller of
//! `add`/`close`; the buffered rows at that point are dropped, which is
//! acceptable for a benchmark, and there is no automatic retry.

use std::{path::PathBuf, time::Duration};

use kvbench_types::RunPhase;
use parking_lot::Mutex;
use snafu::ResultExt;

use crate::error::{MetricsIoSnafu, Result, SinkClosedSnafu};

/// Column order of plain KV rows.
pub const REQUEST_HEADER: [&str; 10] = [
    "unix_timestamp_nano",
    "key",
    "operation",
    "latency_ms",
    "success",
    "status_code",
    "status_text",
    "num_clients",
    "client_id",
    "run_phase",
];

/// Column order of lock rows: the KV columns plus the lock extension.
pub const LOCK_HEADER: [&str; 16] = [
    "unix_timestamp_nano",
    "key",
    "operation",
    "latency_ms",
    "success",
    "status_code",
    "status_text",
    "num_clients",
    "client_id",
    "run_phase",
    "lock_name",
    "acquire_latency_ms",
    "release_latency_ms",
    "lock_op_status_code",
    "lock_op_status_text",
    "contention_level",
];

/// Placeholder for fields without a meaningful value in a given row.
pub const NOT_APPLICABLE: &str = "N/A";

/// Nanoseconds since the epoch, for the row timestamp column.
#[must_use]
pub fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

/// One recorded KV operation.
#[derive(Debug, Clone)]
pub struct RequestMetric {
    /// Submission time, nanoseconds since the epoch.
    pub timestamp_nanos: i64,
    /// Key the operation touched, or `"N/A"`.
    pub key: String,
    /// Operation label, e.g. `read` or `lock-acquire+lock-release`.
    pub operation: String,
    /// Wall-clock latency of the whole operation.
    pub latency: Duration,
    /// Whether every phase of the operation succeeded.
    pub success: bool,
    /// Classified KV-phase status code; 0 on success.
    pub status_code: i32,
    /// Classified KV-phase status text.
    pub status_text: String,
    /// Worker count of the surrounding step.
    pub num_clients: usize,
    /// Issuing worker.
    pub client_id: usize,
    /// Step phase the row belongs to.
    pub run_phase: RunPhase,
}

impl RequestMetric {
    fn record(&self) -> Vec<String> {
        vec![
            self.timestamp_nanos.to_string(),
            self.key.clone(),
            self.operation.clone(),
            self.latency.as_millis().to_string(),
            self.success.to_string(),
            self.status_code.to_string(),
            self.status_text.clone(),
            self.num_clients.to_string(),
            self.client_id.to_string(),
            self.run_phase.as_str().to_owned(),
        ]
    }
}

/// One recorded lock operation: a [`RequestMetric`] plus the lock columns.
#[derive(Debug, Clone)]
pub struct LockMetric {
    /// The common columns.
    pub request: RequestMetric,
    /// Store key of the mutex.
    pub lock_name: String,
    /// Acquire-phase latency; zero when the phase did not occur.
    pub acquire_latency: Duration,
    /// Release-phase latency; zero when the phase did not occur.
    pub release_latency: Duration,
    /// Classified lock-phase status code; 0 on success.
    pub lock_op_status_code: i32,
    /// Classified lock-phase status text.
    pub lock_op_status_text: String,
    /// Width of the contention window at the time of the operation.
    pub contention_level: usize,
}

impl LockMetric {
    fn record(&self) -> Vec<String> {
        let mut record = self.request.record();
        record.extend([
            self.lock_name.clone(),
            self.acquire_latency.as_millis().to_string(),
            self.release_latency.as_millis().to_string(),
            self.lock_op_status_code.to_string(),
            self.lock_op_status_text.clone(),
            self.contention_level.to_string(),
        ]);
        record
    }
}

/// A metric row, tagged by shape.
#[derive(Debug, Clone)]
pub enum MetricRow {
    /// Plain KV row.
    Request(RequestMetric),
    /// Lock row with the extended columns.
    Lock(LockMetric),
}

impl MetricRow {
    fn record(&self) -> Vec<String> {
        match self {
            MetricRow::Request(metric) => metric.record(),
            MetricRow::Lock(metric) => metric.record(),
        }
    }
}

struct SinkInner {
    writer: csv::Writer<std::fs::File>,
    buffer: Vec<MetricRow>,
}

/// Thread-safe batched CSV sink.
pub struct MetricsSink {
    inner: Mutex<Option<SinkInner>>,
    batch_size: usize,
    path: PathBuf,
}

impl MetricsSink {
    /// Creates the file, writes `header` as the first row and returns the
    /// sink.
    pub fn open(path: impl Into<PathBuf>, batch_size: usize, header: &[&str]) -> Result<Self> {
        let path = path.into();
        let mut writer = csv::Writer::from_path(&path).context(MetricsIoSnafu { path: path.clone() })?;
        writer.write_record(header).context(MetricsIoSnafu { path: path.clone() })?;
        writer.flush().map_err(csv::Error::from).context(MetricsIoSnafu { path: path.clone() })?;

        Ok(Self {
            inner: Mutex::new(Some(SinkInner {
                writer,
                buffer: Vec::with_capacity(batch_size),
            })),
            batch_size: batch_size.max(1),
            path,
        })
    }

    /// Buffers one row, flushing synchronously at the batch boundary.
    pub fn add(&self, row: MetricRow) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = guard.as_mut().ok_or_else(|| SinkClosedSnafu.build())?;
        inner.buffer.push(row);
        if inner.buffer.len() >= self.batch_size {
            self.flush_locked(inner)?;
        }
        Ok(())
    }

    /// Flushes remaining rows and releases the file handle.
    ///
    /// Closing an already-closed sink is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.inner.lock();
        let Some(mut inner) = guard.take() else {
            return Ok(());
        };
        self.flush_locked(&mut inner)?;
        inner
            .writer
            .flush()
            .map_err(csv::Error::from)
            .context(MetricsIoSnafu { path: self.path.clone() })
    }

    fn flush_locked(&self, inner: &mut SinkInner) -> Result<()> {
        // Rows are dropped whether or not the write succeeds; a failed
        // flush loses its batch.
        let rows = std::mem::take(&mut inner.buffer);
        for row in &rows {
            inner
                .writer
                .write_record(row.record())
                .context(MetricsIoSnafu { path: self.path.clone() })?;
        }
        inner
            .writer
            .flush()
            .map_err(csv::Error::from)
            .context(MetricsIoSnafu { path: self.path.clone() })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn request_row(client_id: usize) -> MetricRow {
        MetricRow::Request(RequestMetric {
            timestamp_nanos: now_nanos(),
            key: "/usr/use/001x".to_owned(),
            operation: "read".to_owned(),
            latency: Duration::from_millis(3),
            success: true,
            status_code: 0,
            status_text: "success".to_owned(),
            num_clients: 2,
            client_id,
            run_phase: RunPhase::Main,
        })
    }

    fn lock_row() -> MetricRow {
        MetricRow::Lock(LockMetric {
            request: RequestMetric {
                timestamp_nanos: now_nanos(),
                key: NOT_APPLICABLE.to_owned(),
                operation: "lock-acquire+lock-release".to_owned(),
                latency: Duration::from_millis(5),
                success: true,
                status_code: 0,
                status_text: NOT_APPLICABLE.to_owned(),
                num_clients: 2,
                client_id: 0,
                run_phase: RunPhase::Warmup,
            },
            lock_name: "/lock/usr/use/001x/1".to_owned(),
            acquire_latency: Duration::from_millis(2),
            release_latency: Duration::from_millis(3),
            lock_op_status_code: 0,
            lock_op_status_text: NOT_APPLICABLE.to_owned(),
            contention_level: 1,
        })
    }

    fn read_lines(path: &std::path::Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn test_header_is_first_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        let sink = MetricsSink::open(&path, 10, &REQUEST_HEADER).unwrap();
        sink.close().unwrap();

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0], REQUEST_HEADER.join(","));
    }

    #[test]
    fn test_rows_buffer_until_batch_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        let sink = MetricsSink::open(&path, 3, &REQUEST_HEADER).unwrap();

        sink.add(request_row(0)).unwrap();
        sink.add(request_row(1)).unwrap();
        assert_eq!(read_lines(&path).len(), 1, "rows still buffered");

        sink.add(request_row(2)).unwrap();
        assert_eq!(read_lines(&path).len(), 4, "batch flushed");
    }

    #[test]
    fn test_close_flushes_partial_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        let sink = MetricsSink::open(&path, 100, &REQUEST_HEADER).unwrap();

        sink.add(request_row(0)).unwrap();
        sink.close().unwrap();

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 2);
        let fields: Vec<_> = lines[1].split(',').collect();
        assert_eq!(fields.len(), REQUEST_HEADER.len());
        assert_eq!(fields[1], "/usr/use/001x");
        assert_eq!(fields[2], "read");
        assert_eq!(fields[4], "true");
        assert_eq!(fields[9], "main");
    }

    #[test]
    fn test_lock_rows_carry_extended_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        let sink = MetricsSink::open(&path, 1, &LOCK_HEADER).unwrap();

        sink.add(lock_row()).unwrap();
        sink.close().unwrap();

        let lines = read_lines(&path);
        let fields: Vec<_> = lines[1].split(',').collect();
        assert_eq!(fields.len(), LOCK_HEADER.len());
        assert_eq!(fields[10], "/lock/usr/use/001x/1");
        assert_eq!(fields[11], "2");
        assert_eq!(fields[12], "3");
        assert_eq!(fields[15], "1");
    }

    #[test]
    fn test_close_is_idempotent_and_add_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        let sink = MetricsSink::open(&path, 10, &REQUEST_HEADER).unwrap();

        sink.add(request_row(0)).unwrap();
        sink.close().unwrap();
        let after_first_close = read_lines(&path);

        sink.close().unwrap();
        assert_eq!(read_lines(&path), after_first_close);

        assert!(matches!(
            sink.add(request_row(1)),
            Err(crate::RunnerError::SinkClosed)
        ));
    }

    #[test]
    fn test_concurrent_adds_keep_every_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        let sink = std::sync::Arc::new(MetricsSink::open(&path, 7, &REQUEST_HEADER).unwrap());

        std::thread::scope(|scope| {
            for worker in 0..4 {
                let sink = std::sync::Arc::clone(&sink);
                scope.spawn(move || {
                    for _ in 0..50 {
                        sink.add(request_row(worker)).unwrap();
                    }
                });
            }
        });
        sink.close().unwrap();

        assert_eq!(read_lines(&path).len(), 1 + 4 * 50);
    }
}
