use std::sync::Arc;
use std::thread;

use tabquery::analysis::Statistics;
use tabquery::{classify, Engine, EngineError, Intent, LoadRequest};

fn engine_with(csv: &str) -> Engine {
    let engine = Engine::default();
    engine.load_csv(csv.as_bytes()).unwrap();
    engine
}

#[test]
fn grouped_average_becomes_a_breakdown_with_metric() {
    let engine = engine_with("price,category\n10,a\n20,a\n30,a\n40,b\n1000,c\n");
    let r = engine.run_query("what's the average price grouped by category").unwrap();
    assert_eq!(r.analysis_type, Intent::CategoricalBreakdown);

    match &r.statistics {
        Statistics::Breakdown { column, dominant, dominant_share, metric, metric_means, .. } => {
            assert_eq!(column, "category");
            assert_eq!(dominant.as_ref().unwrap().value, "a");
            assert!((dominant_share - 60.0).abs() < 1e-9);
            assert_eq!(metric.as_deref(), Some("price"));
            let c = metric_means.iter().find(|m| m.group == "c").unwrap();
            assert!((c.mean - 1000.0).abs() < 1e-9);
        }
        other => panic!("unexpected statistics {:?}", other),
    }
    assert!(r.chart_spec.is_some());
}

#[test]
fn empty_dataset_loads_but_every_query_is_insufficient() {
    let engine = Engine::default();
    let outcome = engine.load_csv("x,y\n".as_bytes()).unwrap();
    assert_eq!(outcome.profile.row_count, 0);
    assert_eq!(outcome.profile.completeness_score, 100.0);

    for q in ["average x", "correlation", "summary", "hello there"] {
        match engine.run_query(q) {
            Err(EngineError::InsufficientData { .. }) => {}
            other => panic!("{} gave {:?}", q, other),
        }
    }
    assert_eq!(engine.get_history().len(), 4);
}

#[test]
fn doubled_column_correlates_perfectly_and_noise_stays_out() {
    let engine = engine_with(
        "alpha,beta,noise\n1,2,5\n2,4,1\n3,6,7\n4,8,3\n5,10,3\n6,12,7\n7,14,1\n8,16,5\n",
    );
    let r = engine.run_query("show the correlation matrix").unwrap();
    assert_eq!(r.analysis_type, Intent::Correlation);
    assert_eq!(r.parameters["focused"], serde_json::json!(false));

    match &r.statistics {
        Statistics::Correlation { strong_correlations, highest_positive, .. } => {
            let ab = highest_positive.as_ref().unwrap();
            assert_eq!((ab.var1.as_str(), ab.var2.as_str()), ("alpha", "beta"));
            assert!((ab.correlation - 1.0).abs() < 1e-6);
            assert_eq!(strong_correlations.len(), 1);
            assert!(strong_correlations.iter().all(|p| p.var1 != "noise" && p.var2 != "noise"));
        }
        other => panic!("unexpected statistics {:?}", other),
    }
}

#[test]
fn single_letter_columns_inside_words_narrow_the_correlation() {
    let engine = engine_with("a,b,c\n1,2,5\n2,4,1\n3,6,7\n4,8,3\n5,10,3\n6,12,7\n7,14,1\n8,16,5\n");
    let r = engine.run_query("show the correlation matrix").unwrap();
    assert_eq!(r.parameters["resolved_columns"], serde_json::json!(["a", "c"]));
    assert_eq!(r.parameters["focused"], serde_json::json!(true));

    match &r.statistics {
        Statistics::Correlation { columns, pairs, .. } => {
            assert_eq!(columns, &vec!["a".to_string(), "c".to_string()]);
            assert!(pairs.iter().all(|p| p.var1 == "a" && p.var2 == "c"));
        }
        other => panic!("unexpected statistics {:?}", other),
    }
}

#[test]
fn single_extreme_value_is_the_only_outlier() {
    let engine = engine_with("v\n1\n2\n3\n4\n5\n100\n");
    let r = engine.run_query("any outliers in v").unwrap();
    assert_eq!(r.analysis_type, Intent::AnomalyDetection);

    match &r.statistics {
        Statistics::Anomalies { columns, total_outliers, .. } => {
            assert_eq!(*total_outliers, 1);
            let s = &columns[0].summary;
            assert!((s.q1 - 2.25).abs() < 1e-9);
            assert!((s.q3 - 4.75).abs() < 1e-9);
            assert!((s.upper_bound - 8.5).abs() < 1e-9);
            assert_eq!(s.outlier_values, vec![100.0]);
        }
        other => panic!("unexpected statistics {:?}", other),
    }
}

#[test]
fn reload_resets_history_and_insights() {
    let engine = engine_with("price,qty\n1,2\n2,4\n3,5\n");
    engine.run_query("average price").unwrap();
    let first = engine.get_comprehensive_insights().unwrap();
    assert_eq!(engine.get_history().len(), 1);

    let outcome = engine.load_csv("name,score\nann,10\nbob,20\ncid,15\n".as_bytes()).unwrap();
    assert!(engine.get_history().is_empty());

    let second = engine.get_comprehensive_insights().unwrap();
    assert_eq!(second.version, outcome.version);
    assert_ne!(first.version, second.version);
    assert!(second.top_numeric_volatility.iter().all(|v| v.column == "score"));
    assert!(!second.data_story.contains("price"));
}

#[test]
fn insights_are_cached_per_dataset_version() {
    let engine = engine_with("a,b\n1,3\n2,1\n3,4\n4,1\n5,5\n");
    let x = engine.get_comprehensive_insights().unwrap();
    let y = engine.get_comprehensive_insights().unwrap();
    assert!(Arc::ptr_eq(&x, &y));
    assert_eq!(*x, *y);
}

#[test]
fn classification_ignores_history() {
    let engine = engine_with("price,category\n10,a\n20,b\n30,a\n40,b\n50,c\n");
    let profile = engine.profile().unwrap();
    let resolved = vec!["price".to_string()];
    let before = classify("show the distribution of price", &resolved, &profile);

    let first = engine.run_query("show the distribution of price").unwrap();
    engine.run_query("top 3 price").unwrap();
    engine.run_query("summary").unwrap();
    let second = engine.run_query("show the distribution of price").unwrap();

    assert_eq!(classify("show the distribution of price", &resolved, &profile), before);
    assert_eq!(first.analysis_type, second.analysis_type);
    assert_eq!(first.statistics, second.statistics);
    assert_eq!(first.insight_text, second.insight_text);
}

#[test]
fn history_keeps_order_and_failures() {
    let engine = engine_with("name\nann\nbob\ncid\n");
    engine.run_query("summary").unwrap();
    assert!(engine.run_query("correlation please").is_err());
    engine.run_query("breakdown by name").unwrap();

    let h = engine.get_history();
    let queries: Vec<&str> = h.iter().map(|e| e.query_text.as_str()).collect();
    assert_eq!(queries, vec!["summary", "correlation please", "breakdown by name"]);
    assert!(h[1].result.is_none() && h[1].error.is_some());
    assert!(h.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[test]
fn failed_load_is_rejected_without_touching_the_session() {
    let engine = engine_with("x\n1\n2\n3\n");
    let version = engine.dataset_version();

    let bad = LoadRequest::new(Vec::new(), Vec::new());
    assert!(matches!(engine.load_dataset(bad), Err(EngineError::UnsupportedFormat { .. })));
    assert_eq!(engine.dataset_version(), version);
    assert!(engine.run_query("average x").is_ok());
}

#[test]
fn queries_and_reloads_can_run_side_by_side() {
    let engine = Arc::new(engine_with("a,b\n1,2\n2,4\n3,6\n4,8\n5,11\n"));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let e = Arc::clone(&engine);
            thread::spawn(move || {
                for _ in 0..25 {
                    let r = e.run_query("summary").unwrap();
                    match &r.statistics {
                        Statistics::Summary { rows, columns, .. } => assert!((*rows, *columns) == (5, 2) || (*rows, *columns) == (3, 3)),
                        other => panic!("unexpected statistics {:?}", other),
                    }
                }
            })
        })
        .collect();

    let writer = {
        let e = Arc::clone(&engine);
        thread::spawn(move || {
            for _ in 0..10 {
                e.load_csv("x,y,z\n1,2,3\n4,5,6\n7,8,9\n".as_bytes()).unwrap();
                e.load_csv("a,b\n1,2\n2,4\n3,6\n4,8\n5,11\n".as_bytes()).unwrap();
            }
        })
    };

    for r in readers {
        r.join().unwrap();
    }
    writer.join().unwrap();
    assert!(engine.dataset_version().unwrap() >= 21);
}

#[test]
fn spreadsheet_loads_through_the_engine_and_feeds_the_dashboard() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stores.xlsx");

    let mut workbook = rust_xlsxwriter::Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, name) in ["store", "revenue", "visits"].iter().enumerate() {
        sheet.write_string(0, col as u16, *name).unwrap();
    }
    let rows = [("north", 120.0, 12.0), ("south", 80.0, 8.0), ("north", 100.0, 10.0), ("east", 60.0, 6.0)];
    for (i, (store, revenue, visits)) in rows.iter().enumerate() {
        let row = i as u32 + 1;
        sheet.write_string(row, 0, *store).unwrap();
        sheet.write_number(row, 1, *revenue).unwrap();
        sheet.write_number(row, 2, *visits).unwrap();
    }
    workbook.save(&path).unwrap();

    let engine = Engine::default();
    let outcome = engine.load_path(&path).unwrap();
    assert_eq!((outcome.profile.row_count, outcome.profile.column_count), (4, 3));

    let r = engine.run_query("average revenue").unwrap();
    match &r.statistics {
        Statistics::Averages { columns } => assert!((columns[0].mean - 90.0).abs() < 1e-9),
        other => panic!("unexpected statistics {:?}", other),
    }

    let dashboard = engine.get_analytics_dashboard().unwrap();
    let corr = dashboard.correlation.as_ref().unwrap();
    assert_eq!(corr.total_strong_correlations, 1);
    assert_eq!(dashboard.summary_statistics.overall_summary.complete_rows, 4);
    assert_eq!(dashboard.categorical_analysis[0].most_common[0].value, "north");
}
