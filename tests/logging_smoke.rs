use std::io;
use std::io::Write;
use std::sync::{Arc, Mutex};

use chrono::{Duration, NaiveDate};
use tracing::dispatcher::with_default;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriter;
use tsfeaturizer::{
    log_warnings, Column, Setting, Table, TimeSeriesConfig, TimeSeriesTransformer, WarningSet,
};

#[derive(Clone, Default)]
struct SharedWriter {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedWriter {
    fn output_string(&self) -> String {
        let bytes = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        String::from_utf8_lossy(&bytes).to_string()
    }
}

struct SharedWriterGuard {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedWriterGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut out = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        out.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture_logs(max_level: Level, f: impl FnOnce()) -> String {
    let writer = SharedWriter::default();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_ansi(false)
        .with_max_level(max_level)
        .with_writer(writer.clone())
        .finish();
    let dispatch = tracing::Dispatch::new(subscriber);

    with_default(&dispatch, f);
    writer.output_string()
}

fn daily_table(stores: &[(&str, i64)]) -> Table {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("valid date");
    let mut times = Vec::new();
    let mut ids = Vec::new();
    let mut values = Vec::new();
    for (store, days) in stores {
        for i in 0..*days {
            times.push(Some(start + Duration::days(i)));
            ids.push(*store);
            values.push(i as f64);
        }
    }
    Table::new()
        .with_column("date", Column::Datetime(times))
        .and_then(|t| t.with_column("store", Column::text(ids)))
        .and_then(|t| t.with_column("units", Column::Float(values)))
        .expect("table should build")
}

fn config() -> TimeSeriesConfig {
    let mut cfg = TimeSeriesConfig::new("date", "units");
    cfg.time_series_id_column_names = vec!["store".to_string()];
    cfg.frequency = Some("D".to_string());
    cfg.target_lags = Some(Setting::Value(vec![2]));
    cfg.max_horizon = Setting::Value(2);
    cfg
}

#[test]
fn fit_emits_lifecycle_and_step_events() {
    let logs = capture_logs(Level::INFO, || {
        let mut featurizer = TimeSeriesTransformer::new(config()).expect("config should validate");
        featurizer
            .fit(&daily_table(&[("a", 20), ("b", 20)]))
            .expect("fit should succeed");
    });

    assert!(logs.contains("\"event\":\"featurizer.fit.start\""));
    assert!(logs.contains("\"event\":\"frequency.user_supplied\""));
    assert!(logs.contains("\"event\":\"pipeline.step.finish\""));
    assert!(logs.contains("\"step\":\"lag_lead\""));
    assert!(logs.contains("\"event\":\"schema.locked\""));
    assert!(logs.contains("\"event\":\"featurizer.fit.finish\""));
    assert!(!logs.contains("\"event\":\"max_horizon.expanded\""));
}

#[test]
fn dropped_series_are_logged_as_warnings() {
    let logs = capture_logs(Level::WARN, || {
        let mut featurizer = TimeSeriesTransformer::new(config()).expect("config should validate");
        featurizer
            .fit(&daily_table(&[("a", 20), ("tiny", 2)]))
            .expect("the long series should survive");
    });

    assert!(logs.contains("\"event\":\"short_series.dropped\""));
    assert!(!logs.contains("\"event\":\"featurizer.fit.finish\""));
}

#[test]
fn failed_fit_is_logged() {
    let logs = capture_logs(Level::INFO, || {
        let mut featurizer = TimeSeriesTransformer::new(config()).expect("config should validate");
        featurizer
            .fit(&daily_table(&[("a", 2), ("b", 2)]))
            .expect_err("every series is too short");
    });

    assert!(logs.contains("\"event\":\"featurizer.fit.failed\""));
}

#[test]
fn debug_level_includes_transform_step_events() {
    let logs = capture_logs(Level::DEBUG, || {
        let mut featurizer = TimeSeriesTransformer::new(config()).expect("config should validate");
        featurizer
            .fit(&daily_table(&[("a", 20), ("b", 20)]))
            .expect("fit should succeed");
        let scoring = daily_table(&[("a", 22), ("b", 22)]);
        let tail: Vec<usize> = (0..scoring.nrows())
            .filter(|r| r % 22 >= 20)
            .collect();
        let out = featurizer
            .transform(&scoring.take(&tail))
            .expect("transform should succeed");
        assert_eq!(out.panel.nrows(), 4);
    });

    assert!(logs.contains("\"phase\":\"transform\""));
    assert!(logs.contains("\"event\":\"lookback.cache.built\""));
    assert!(logs.contains("\"event\":\"featurizer.transform.finish\""));
}

#[test]
fn recorded_warnings_can_be_reported() {
    let mut warnings = WarningSet::new();
    warnings.push(tsfeaturizer::FeaturizeWarning::RowsOutOfPhase { dropped: 3 });

    let logs = capture_logs(Level::WARN, || log_warnings("transform", &warnings));

    assert!(logs.contains("\"event\":\"featurizer.warning\""));
    assert!(logs.contains("\"code\":\"rows_out_of_phase\""));
    assert!(logs.contains("\"phase\":\"transform\""));
}
