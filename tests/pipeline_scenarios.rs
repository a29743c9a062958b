use std::collections::BTreeMap;
use std::f64::consts::PI;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use tsfeaturizer::{
    expand_horizons, min_points, pacf_orders, CategoricalFeaturizer, Column, DatetimeGapFiller,
    ImputeStrategy, LagLeadOperator, LookbackMode, MaxHorizonFeaturizer, Offset, Panel,
    SeriesKey, Setting, ShortSeriesDropper, ShortSeriesHandling, StlFeaturizer, StlMode, Table,
    TimeSeriesConfig, TimeSeriesTransformer, Transformer, WarningSet, HORIZON_COLUMN,
    OCCURRENCE_ORIGIN_COLUMN, ROW_IMPUTED_COLUMN, TARGET_IMPUTED_COLUMN,
};

#[test]
fn s1_daily_lag_one_reads_the_previous_day() {
    let panel = single_series(&[day(2020, 1, 1), day(2020, 1, 2), day(2020, 1, 3)], &[1.0, 2.0, 3.0]);
    let mut op = LagLeadOperator::new(lag_orders(&[1]), Offset::days(1), LookbackMode::ByTime, 1);
    let out = op
        .fit_transform(panel, &mut WarningSet::new())
        .expect("lag features");
    let lag = out.float_column("target_lag1_D").expect("lag column");
    assert!(lag[0].is_nan());
    assert_eq!(&lag[1..], &[1.0, 2.0]);

    let mut cfg = TimeSeriesConfig::new("date", "target");
    cfg.target_lags = Some(Setting::Value(vec![1]));
    let mut featurizer = TimeSeriesTransformer::new(cfg).expect("config");
    let table = Table::new()
        .with_column(
            "date",
            Column::Datetime(vec![
                Some(day(2020, 1, 1)),
                Some(day(2020, 1, 2)),
                Some(day(2020, 1, 3)),
            ]),
        )
        .and_then(|t| t.with_column("target", Column::Float(vec![1.0, 2.0, 3.0])))
        .expect("table");
    let out = featurizer.fit_transform(&table).expect("fit");
    assert_eq!(
        featurizer.frequency().expect("frequency").offset,
        Offset::days(1)
    );
    assert_eq!(out.panel.nrows(), 2);
    assert_eq!(
        out.panel.float_column("target_lag1_D").expect("lag column"),
        vec![1.0, 2.0]
    );
}

#[test]
fn s2_gap_is_filled_and_marked() {
    let panel = single_series(&[day(2020, 1, 1), day(2020, 1, 3)], &[1.0, 3.0]);
    let mut filler = DatetimeGapFiller::new("target", Offset::days(1), ImputeStrategy::Ffill);
    let out = filler.fit_transform(&panel).expect("gap fill");
    assert_eq!(out.times(), &[day(2020, 1, 1), day(2020, 1, 2), day(2020, 1, 3)]);
    assert_eq!(
        out.float_column("target").expect("target"),
        vec![1.0, 1.0, 3.0]
    );
    assert_eq!(out.column(ROW_IMPUTED_COLUMN), Some(&ints(&[0, 1, 0])));
    assert_eq!(out.column(TARGET_IMPUTED_COLUMN), Some(&ints(&[0, 1, 0])));
}

#[test]
fn s3_single_row_expands_to_three_origins() {
    let panel = single_series(&[day(2020, 1, 10)], &[5.0]);
    let mut step = MaxHorizonFeaturizer::new(3, Offset::days(1));
    let out = step
        .fit_transform(panel, &mut WarningSet::new())
        .expect("expand");
    assert_eq!(
        out.origins().expect("origins"),
        &[day(2020, 1, 9), day(2020, 1, 8), day(2020, 1, 7)]
    );
    assert_eq!(out.column(HORIZON_COLUMN), Some(&ints(&[1, 2, 3])));
    assert_eq!(out.float_column("target").expect("target"), vec![5.0; 3]);
}

#[test]
fn s4_irregular_series_by_occurrence_and_by_time() {
    let times = [day(2020, 1, 1), day(2020, 2, 1), day(2020, 4, 1)];
    let values = [8.0, 9.0, 10.0];

    let mut occurrence =
        LagLeadOperator::new(lag_orders(&[1]), Offset::days(1), LookbackMode::ByOccurrence, 1);
    let out = occurrence
        .fit_transform(single_series(&times, &values), &mut WarningSet::new())
        .expect("occurrence lags");
    let lag = out.float_column("target_occurrence_lag1_D").expect("lag");
    assert!(lag[0].is_nan());
    assert_eq!(&lag[1..], &[8.0, 9.0]);
    assert_eq!(
        out.column(OCCURRENCE_ORIGIN_COLUMN),
        Some(&Column::Datetime(vec![
            None,
            Some(day(2020, 1, 1)),
            Some(day(2020, 2, 1))
        ]))
    );

    let mut by_time =
        LagLeadOperator::new(lag_orders(&[1]), Offset::days(1), LookbackMode::ByTime, 1);
    let out = by_time
        .fit_transform(single_series(&times, &values), &mut WarningSet::new())
        .expect("time lags");
    assert!(out
        .float_column("target_lag1_D")
        .expect("lag")
        .iter()
        .all(|v| v.is_nan()));
}

#[test]
fn s5_pure_monthly_seasonality_goes_to_the_seasonal_column() {
    let monthly: Offset = "MS".parse().expect("month start");
    let values: Vec<f64> = (1..=24).map(|m| (2.0 * PI * m as f64 / 12.0).sin()).collect();
    let times: Vec<NaiveDateTime> = (0..24)
        .map(|k| monthly.shift(day(2018, 1, 1), k))
        .collect();
    let mut step = StlFeaturizer::new("target", StlMode::SeasonTrend, 12, monthly);
    let out = step
        .fit_transform(single_series(&times, &values), &mut WarningSet::new())
        .expect("stl");
    let seasonal = out.float_column("target_seasonal").expect("seasonal");
    let trend = out.float_column("target_trend").expect("trend");
    for (i, value) in values.iter().enumerate() {
        assert_close(seasonal[i], *value, 1e-6);
        assert_close(trend[i], 0.0, 1e-6);
    }
}

#[test]
fn s6_unseen_category_encodes_as_all_zero_and_warns() {
    let mut step = CategoricalFeaturizer::new(vec!["color".to_string()], false);
    step.fit(
        &categorical_panel(&["A", "B"]),
        &mut WarningSet::new(),
    )
    .expect("fit");
    let mut warnings = WarningSet::new();
    let out = step
        .transform(categorical_panel(&["A", "C"]), &mut warnings)
        .expect("transform");
    assert_eq!(out.column("color_A"), Some(&ints(&[1, 0])));
    assert_eq!(out.column("color_B"), Some(&ints(&[0, 0])));
    assert!(!out.data().contains("color"));
    assert!(!out.data().contains("color_nan"));
    assert!(warnings.contains_code("unseen_categories"));
}

#[test]
fn horizon_expansion_multiplies_rows_with_exact_origins() {
    let panel = two_series_panel(5);
    let out = expand_horizons(&panel, 4, Offset::days(1)).expect("expand");
    assert_eq!(out.nrows(), panel.nrows() * 4);
    let horizons = out
        .column(HORIZON_COLUMN)
        .and_then(Column::as_int)
        .expect("horizons");
    let origins = out.origins().expect("origins");
    for row in 0..out.nrows() {
        let k = horizons[row].expect("horizon");
        assert_eq!(origins[row], out.times()[row] - Duration::days(k));
        assert!(origins[row] <= out.times()[row]);
    }
}

#[test]
fn gap_filling_covers_every_grid_point_once() {
    let times = vec![
        Some(day(2021, 5, 1)),
        Some(day(2021, 5, 4)),
        Some(day(2021, 5, 5)),
        Some(day(2021, 5, 2)),
        Some(day(2021, 5, 9)),
    ];
    let table = Table::new()
        .with_column("date", Column::Datetime(times))
        .and_then(|t| t.with_column("store", Column::text(["a", "a", "a", "b", "b"])))
        .and_then(|t| t.with_column("target", Column::Float(vec![1.0, 2.0, 3.0, 4.0, 5.0])))
        .expect("table");
    let panel = Panel::from_table(&table, "date", &["store".to_string()]).expect("panel");
    let mut filler = DatetimeGapFiller::new("target", Offset::days(1), ImputeStrategy::Mean);
    let out = filler.fit_transform(&panel).expect("gap fill");
    let bounds = filler.bounds();

    for (key, rows) in out.groups() {
        let mut times: Vec<NaiveDateTime> = rows.iter().map(|&r| out.times()[r]).collect();
        times.sort();
        assert_eq!(times.first(), Some(&bounds[&key].start));
        assert_eq!(times.last(), Some(&bounds[&key].last));
        for pair in times.windows(2) {
            assert_eq!(pair[1] - pair[0], Duration::days(1));
        }
    }
    assert_eq!(out.nrows(), 5 + 8);
    let target = out.float_column("target").expect("target");
    assert!(target.iter().all(|v| !v.is_nan()));
}

#[test]
fn surviving_series_meet_the_minimum_length() {
    let required = min_points(2, &[3], 2, 1);
    assert_eq!(required, 9);

    let mut times = Vec::new();
    let mut stores = Vec::new();
    for (store, len) in [("long", 12), ("short", 5)] {
        for i in 0..len {
            times.push(Some(day(2022, 1, 1) + Duration::days(i)));
            stores.push(store);
        }
    }
    let n = times.len();
    let table = Table::new()
        .with_column("date", Column::Datetime(times))
        .and_then(|t| t.with_column("store", Column::text(stores)))
        .and_then(|t| t.with_column("target", Column::Float(vec![1.0; n])))
        .expect("table");
    let panel = Panel::from_table(&table, "date", &["store".to_string()]).expect("panel");

    let mut dropper =
        ShortSeriesDropper::new("target", Offset::days(1), ShortSeriesHandling::Drop, required);
    let mut warnings = WarningSet::new();
    let out = dropper
        .fit_transform(panel.clone(), &mut warnings)
        .expect("drop");
    for rows in out.groups().values() {
        assert!(rows.len() >= required);
    }
    assert_eq!(
        dropper.dropped_series(),
        vec![SeriesKey(vec!["short".to_string()])]
    );
    assert!(warnings.contains_code("series_dropped"));

    let mut strict =
        ShortSeriesDropper::new("target", Offset::days(1), ShortSeriesHandling::Drop, 20);
    let err = strict
        .fit_transform(panel, &mut WarningSet::new())
        .expect_err("every series is short");
    assert_eq!(err.kind(), tsfeaturizer::ErrorKind::InsufficientData);
}

#[test]
fn white_noise_has_no_lag_order() {
    for n in [500, 2000] {
        let selection = pacf_orders(&lcg_noise(n, 7), 1);
        assert_eq!(selection.p, 0, "white noise of length {n}");
        assert!(!selection.too_seasonal);
    }
}

#[test]
fn lag_and_window_features_only_see_data_up_to_the_origin() {
    let table = two_store_table(0, 30, true);
    let mut featurizer = TimeSeriesTransformer::new(lookback_config()).expect("config");
    let out = featurizer.fit_transform(&table).expect("fit");
    assert!(out.panel.nrows() > 0);

    let truth = target_lookup(&table);
    let origins = out.panel.origins().expect("origins");
    let lag1 = out.panel.float_column("target_lag1_D").expect("lag1");
    let lag2 = out.panel.float_column("target_lag2_D").expect("lag2");
    let mean3 = out.panel.float_column("target_mean_window3").expect("mean");
    for row in 0..out.panel.nrows() {
        let store = out.panel.series()[row].0[0].clone();
        let origin = origins[row];
        let at = |t: NaiveDateTime| truth[&(store.clone(), t)];
        assert!(origin < out.panel.times()[row]);
        assert_eq!(lag1[row], at(origin));
        assert_eq!(lag2[row], at(origin - Duration::days(1)));
        let expected = (at(origin) + at(origin - Duration::days(1)) + at(origin - Duration::days(2))) / 3.0;
        assert_close(mean3[row], expected, 1e-9);
    }
}

#[test]
fn scoring_rows_right_after_training_get_cached_lookbacks() {
    let mut featurizer = TimeSeriesTransformer::new(lookback_config()).expect("config");
    featurizer.fit(&two_store_table(0, 30, true)).expect("fit");

    let scored = featurizer
        .transform(&two_store_table(30, 4, false))
        .expect("transform");
    assert_eq!(scored.panel.nrows(), 8);
    for name in ["target_lag1_D", "target_lag2_D", "target_min_window3", "target_max_window3"] {
        let values = scored.panel.float_column(name).expect("feature");
        assert!(values.iter().all(|v| !v.is_nan()), "{name} has gaps");
    }
    let lag1 = scored.panel.float_column("target_lag1_D").expect("lag1");
    // Every scoring origin is capped at the last training day (day 29).
    assert!(lag1.iter().all(|v| *v == 129.0 || *v == 258.0));
    assert!(scored.warnings.contains_code("horizon_beyond_max"));
}

#[test]
fn transform_keeps_the_locked_schema_and_is_repeatable() {
    let mut featurizer = TimeSeriesTransformer::new(lookback_config()).expect("config");
    let fitted = featurizer.fit_transform(&two_store_table(0, 30, true)).expect("fit");
    let schema = featurizer.schema().expect("schema").names();
    assert_eq!(fitted.panel.data().names(), schema.as_slice());

    let labelled = featurizer
        .transform(&two_store_table(30, 3, true))
        .expect("labelled");
    assert_eq!(labelled.panel.data().names(), schema.as_slice());

    let unlabelled = two_store_table(30, 3, false);
    let first = featurizer.transform(&unlabelled).expect("first");
    let second = featurizer.transform(&unlabelled).expect("second");
    let without_target: Vec<String> = schema.into_iter().filter(|c| c != "target").collect();
    assert_eq!(first.panel.data().names(), without_target.as_slice());
    assert_same_table(
        &first.to_table().expect("table"),
        &second.to_table().expect("table"),
    );
}

// helpers

fn day(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("valid date")
}

fn ints(values: &[i64]) -> Column {
    Column::Int(values.iter().map(|v| Some(*v)).collect())
}

fn assert_close(actual: f64, expected: f64, tol: f64) {
    assert!(
        (actual - expected).abs() <= tol,
        "{actual} differs from {expected} by more than {tol}"
    );
}

fn lag_orders(orders: &[i64]) -> BTreeMap<String, Vec<i64>> {
    BTreeMap::from([("target".to_string(), orders.to_vec())])
}

fn single_series(times: &[NaiveDateTime], values: &[f64]) -> Panel {
    let table = Table::new()
        .with_column("date", Column::Datetime(times.iter().copied().map(Some).collect()))
        .and_then(|t| t.with_column("target", Column::Float(values.to_vec())))
        .and_then(|t| t.with_column(TARGET_IMPUTED_COLUMN, ints(&vec![0; times.len()])))
        .expect("table");
    Panel::from_table(&table, "date", &[]).expect("panel")
}

fn categorical_panel(colors: &[&str]) -> Panel {
    let times = (0..colors.len() as i64)
        .map(|i| Some(day(2020, 6, 1) + Duration::days(i)))
        .collect();
    let table = Table::new()
        .with_column("date", Column::Datetime(times))
        .and_then(|t| t.with_column("color", Column::text(colors.iter().copied())))
        .expect("table");
    Panel::from_table(&table, "date", &[]).expect("panel")
}

fn two_series_panel(len: i64) -> Panel {
    let mut times = Vec::new();
    let mut stores = Vec::new();
    for store in ["a", "b"] {
        for i in 0..len {
            times.push(Some(day(2021, 1, 1) + Duration::days(i)));
            stores.push(store);
        }
    }
    let n = times.len();
    let table = Table::new()
        .with_column("date", Column::Datetime(times))
        .and_then(|t| t.with_column("store", Column::text(stores)))
        .and_then(|t| t.with_column("target", Column::Float(vec![0.0; n])))
        .expect("table");
    Panel::from_table(&table, "date", &["store".to_string()]).expect("panel")
}

/// Store `a` is `100 + day`, store `b` is `200 + 2 * day`, counted from 2021-01-01.
fn two_store_table(first_day: i64, days: i64, labelled: bool) -> Table {
    let mut times = Vec::new();
    let mut stores = Vec::new();
    let mut values = Vec::new();
    for (store, base, slope) in [("a", 100.0, 1.0), ("b", 200.0, 2.0)] {
        for i in first_day..first_day + days {
            times.push(Some(day(2021, 1, 1) + Duration::days(i)));
            stores.push(store);
            values.push(base + slope * i as f64);
        }
    }
    let table = Table::new()
        .with_column("date", Column::Datetime(times))
        .and_then(|t| t.with_column("store", Column::text(stores)))
        .expect("table");
    if labelled {
        table
            .with_column("target", Column::Float(values))
            .expect("target")
    } else {
        table
    }
}

fn lookback_config() -> TimeSeriesConfig {
    let mut cfg = TimeSeriesConfig::new("date", "target");
    cfg.time_series_id_column_names = vec!["store".to_string()];
    cfg.frequency = Some("D".to_string());
    cfg.max_horizon = Setting::Value(2);
    cfg.target_lags = Some(Setting::Value(vec![1, 2]));
    cfg.target_rolling_window_size = Setting::Value(3);
    cfg
}

fn target_lookup(table: &Table) -> BTreeMap<(String, NaiveDateTime), f64> {
    let times = table
        .column("date")
        .and_then(Column::as_datetime)
        .expect("dates");
    let stores = table
        .column("store")
        .and_then(Column::as_text)
        .expect("stores");
    let values = table
        .column("target")
        .and_then(Column::as_float)
        .expect("target");
    (0..table.nrows())
        .map(|r| {
            (
                (
                    stores[r].clone().expect("store"),
                    times[r].expect("date"),
                ),
                values[r],
            )
        })
        .collect()
}

fn assert_same_table(a: &Table, b: &Table) {
    assert_eq!(a.names(), b.names());
    for (name, left) in a.iter() {
        let right = b.column(name).expect("same columns");
        match (left.to_f64(), right.to_f64()) {
            (Some(l), Some(r)) => {
                for (x, y) in l.iter().zip(&r) {
                    assert!(x == y || (x.is_nan() && y.is_nan()), "column {name} differs");
                }
            }
            _ => assert_eq!(left, right, "column {name} differs"),
        }
    }
}

fn lcg_noise(n: usize, mut seed: u64) -> Vec<f64> {
    (0..n)
        .map(|_| {
            seed = seed
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((seed >> 33) as f64 / (1u64 << 31) as f64) - 0.5
        })
        .collect()
}
