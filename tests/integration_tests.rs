use revenue_drop_monitor::*;

fn monthly_csv() -> String {
    let mut csv = String::from(
        "Month,Site/Application,Ad system,Customer Success Manager,Client,Revenue,Impressions\n",
    );
    let rows = [
        ("August 2025", "news.example", "AdX", "Anna", "Acme", "1200", "60000"),
        ("September 2025", "news.example", "AdX", "Anna", "Acme", "1000", "50000"),
        ("October 2025", "news.example", "AdX", "Anna", "Acme", "850", "47000"),
        // stale duplicate for the same site and month
        ("October 2025", "news.example", "AdX", "Anna", "Acme", "0", "0"),
        ("September 2025", "blog.example", "Prebid", "Boris", "\"Beta, Inc\"", "1000", "20000"),
        ("October 2025", "blog.example", "Prebid", "Boris", "\"Beta, Inc\"", "950", "19000"),
        ("October 2025", "shop.example", "AdX", "", "Gamma", "500", "7000"),
        ("September 2025", "old.example", "Prebid", "Anna", "Delta", "300", "9000"),
        ("October 2025", "TDS 12", "AdX", "Anna", "Internal", "5", "10"),
        ("October 2025", "", "", "Anna", "Nobody", "999", "10"),
    ];
    for (month, site, ad_system, manager, client, revenue, impressions) in rows {
        csv.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            month, site, ad_system, manager, client, revenue, impressions
        ));
    }
    csv
}

fn loaded_session() -> AnalysisSession {
    let mut session = AnalysisSession::new(MonitorConfig::default()).unwrap();
    session.load_csv(&monthly_csv()).unwrap();
    session
}

fn find<'a>(results: &'a [ComparisonResult], key: &str) -> &'a ComparisonResult {
    results
        .iter()
        .find(|r| r.entity_key == key)
        .unwrap_or_else(|| panic!("missing entity {}", key))
}

#[test]
fn test_load_summary_and_selectors() {
    let mut session = AnalysisSession::new(MonitorConfig::default()).unwrap();
    let summary = session.load_csv(&monthly_csv()).unwrap();

    assert_eq!(summary.input_rows, 10);
    assert_eq!(summary.kept_rows, 8);
    assert_eq!(summary.period_column, "Month");
    assert_eq!(summary.period_kind, PeriodKind::MonthlyName);
    assert_eq!(summary.metrics, vec!["Revenue", "Impressions"]);
    assert_eq!(summary.primary_metric.as_deref(), Some("Revenue"));
    assert!(summary.warnings.is_empty());

    assert_eq!(
        session.periods().unwrap(),
        vec!["October 2025", "September 2025", "August 2025"]
    );
    assert_eq!(session.managers().unwrap(), vec!["Anna", "Boris"]);
}

#[test]
fn test_monthly_site_comparison() {
    let mut session = loaded_session();
    let request = session.default_request(GroupBy::Site).unwrap();
    let run = session.compare(&request).unwrap();

    let keys: Vec<&str> = run.results.iter().map(|r| r.entity_key.as_str()).collect();
    assert_eq!(
        keys,
        vec!["news.example", "blog.example", "shop.example", "old.example"]
    );

    // 1000 -> 850: drop of 150 (> 100) and 15% (> 5%)
    let news = find(&run.results, "news.example");
    assert_eq!(news.flag, Flag::Yes);
    let revenue = news.metric("Revenue").unwrap();
    assert_eq!(revenue.value1, 1000.0);
    assert_eq!(revenue.value2, 850.0);
    assert!((revenue.change_pct + 0.15).abs() < 1e-9);

    // 1000 -> 950: drop of 50 does not exceed the monthly threshold
    assert_eq!(find(&run.results, "blog.example").flag, Flag::Empty);

    let shop = find(&run.results, "shop.example");
    assert_eq!(shop.flag, Flag::Null);
    assert_eq!(shop.metric("Revenue").unwrap().value1, 0.0);
    assert_eq!(shop.metric("Revenue").unwrap().change_pct, 1.0);
    assert_eq!(shop.manager(), None);

    let old = find(&run.results, "old.example");
    assert_eq!(old.flag, Flag::Null);
    assert_eq!(old.meta.client.as_deref(), Some("Delta"));
}

#[test]
fn test_flag_null_iff_one_period_missing() {
    let mut session = loaded_session();
    let request = ComparisonRequest::new("August 2025", "October 2025", GroupBy::Site);
    let run = session.compare(&request).unwrap();

    for result in &run.results {
        let in_august = result.entity_key == "news.example";
        let in_october = ["news.example", "blog.example", "shop.example"]
            .contains(&result.entity_key.as_str());
        assert_eq!(result.flag == Flag::Null, in_august != in_october, "{}", result.entity_key);
    }
}

#[test]
fn test_filters_export_and_report() -> anyhow::Result<()> {
    let mut session = loaded_session();
    let request = session.default_request(GroupBy::Site).unwrap();
    session.compare(&request)?;

    let anna_flagged = {
        session.set_flag_filter(FlagFilter::YesOrNull);
        session.set_manager_filter(ManagerFilter::named("Anna")).to_vec()
    };
    let keys: Vec<&str> = anna_flagged.iter().map(|r| r.entity_key.as_str()).collect();
    assert_eq!(keys, vec!["news.example", "old.example"]);

    let csv = session.export_csv()?;
    assert!(csv.starts_with(UTF8_BOM));
    let expected_records: usize = session.displayed().iter().map(|r| r.metrics.len()).sum();
    assert_eq!(csv.lines().count(), 1 + expected_records);
    assert!(csv.contains(
        "\"news.example\",\"Anna\",\"Acme\",\"Revenue\",\"1000.00\",\"850.00\",\"-15.00%\",\"YES\""
    ));
    assert!(csv.contains("\"Flag (on Revenue)\""));

    let report = session.report()?;
    assert!(report.starts_with(
        "news.example\nCS Manager - Anna\nClient - Acme\n% Change - -15.00%\n$ Change - -150,00\u{a0}$"
    ));
    assert!(
        report.contains("old.example\nCS Manager - Anna\nClient - Delta\n% Change - -100.00%")
    );
    assert!(report.ends_with(report::ENTRY_DELIMITER));
    Ok(())
}

#[test]
fn test_empty_filter_result_blocks_export() {
    let mut session = loaded_session();
    let request = session.default_request(GroupBy::Site).unwrap();
    session.compare(&request).unwrap();

    session.set_manager_filter(ManagerFilter::named("Nobody"));
    assert!(session.displayed().is_empty());
    assert!(matches!(session.export_csv(), Err(MonitorError::EmptyResult { .. })));
    assert!(matches!(session.report(), Err(MonitorError::EmptyResult { .. })));
}

#[test]
fn test_ad_system_grouping_select_best() {
    let mut session = loaded_session();
    let request = ComparisonRequest::new("September 2025", "October 2025", GroupBy::AdSystem);
    let run = session.compare(&request).unwrap();

    // AdX in October: news (850 and a stale 0) and shop (500); the best row wins
    let adx = find(&run.results, "AdX");
    assert_eq!(adx.metric("Revenue").unwrap().value2, 850.0);
    assert_eq!(adx.metric("Revenue").unwrap().value1, 1000.0);

    let csv = session.export_csv().unwrap();
    let header = csv.trim_start_matches(UTF8_BOM).lines().next().unwrap();
    assert_eq!(
        header,
        "\"Ad system\",\"Metric\",\"Period 1 (September 2025)\",\"Period 2 (October 2025)\",\"% Change\",\"Flag (on Revenue)\""
    );
}

#[test]
fn test_ad_system_feed_sums_and_recomputes_cpm() -> anyhow::Result<()> {
    let csv = "Date,Ad system,Revenue,Impressions,eCPM
2025-10-26,AdX,60,20000,3
2025-10-26,AdX,40,30000,1.33
2025-10-27,AdX,30,20000,1.5
2025-10-27,AdX,20,20000,1
2025-10-26,Prebid,10,5000,2
2025-10-27,Prebid,9,5000,1.8
";
    let mut config = MonitorConfig::default();
    config.aggregation = AggregationPolicy::DetectFromSchema;

    let request = ComparisonRequest::new("2025-10-26", "2025-10-27", GroupBy::AdSystem);
    let run = analyze_csv(csv, &config, &request)?;
    assert_eq!(run.aggregation, "sum_and_recompute");
    assert_eq!(run.granularity, Some(Granularity::Daily));

    let adx = find(&run.results, "AdX");
    let revenue = adx.metric("Revenue").unwrap();
    assert_eq!(revenue.value1, 100.0);
    assert_eq!(revenue.value2, 50.0);
    let ecpm = adx.metric("eCPM").unwrap();
    assert!((ecpm.value1 - 2.0).abs() < 1e-9);
    assert!((ecpm.value2 - 1.25).abs() < 1e-9);
    // daily threshold: drop of 50 > 15 and 50% > 5%
    assert_eq!(adx.flag, Flag::Yes);

    // drop of 1 stays below the daily threshold
    assert_eq!(find(&run.results, "Prebid").flag, Flag::Empty);
    Ok(())
}

#[test]
fn test_without_revenue_column_falls_back_to_first_metric() {
    let csv = "Date,Site/Application,Clicks,Impressions
2025-01-01,a.example,100,1
2025-01-02,a.example,10,1
";
    let mut session = AnalysisSession::new(MonitorConfig::default()).unwrap();
    let summary = session.load_csv(csv).unwrap();

    assert_eq!(summary.primary_metric.as_deref(), Some("Clicks"));
    assert_eq!(
        summary.warnings,
        vec![LoadWarning::MissingPrimaryMetric {
            fallback: Some("Clicks".to_string())
        }]
    );

    let request = ComparisonRequest::new("2025-01-01", "2025-01-02", GroupBy::Site);
    let run = session.compare(&request).unwrap();
    assert_eq!(run.results[0].flag, Flag::Yes);
}

#[test]
fn test_without_numeric_columns_nothing_is_flagged() {
    let csv = "Date,Site/Application,Notes\n2025-01-01,a.example,x\n2025-01-02,a.example,y\n";
    let request = ComparisonRequest::new("2025-01-01", "2025-01-02", GroupBy::Site);
    let run = analyze_csv(csv, &MonitorConfig::default(), &request).unwrap();

    assert_eq!(run.primary_metric, None);
    assert_eq!(run.results.len(), 1);
    assert_eq!(run.results[0].flag, Flag::Empty);
    assert!(run.results[0].metrics.is_empty());
}

#[test]
fn test_stricter_percent_threshold_from_json_config() {
    let config = MonitorConfig::from_json_str(r#"{ "thresholds": { "percent": 0.1 } }"#).unwrap();
    let csv = "Month,Site/Application,Revenue
September 2025,a.example,2000
October 2025,a.example,1850
";
    let request = ComparisonRequest::new("September 2025", "October 2025", GroupBy::Site);

    let strict = analyze_csv(csv, &config, &request).unwrap();
    assert_eq!(strict.results[0].flag, Flag::Empty);

    let default = analyze_csv(csv, &MonitorConfig::default(), &request).unwrap();
    assert_eq!(default.results[0].flag, Flag::Yes);
}

#[test]
fn test_load_errors_surface_to_caller() {
    let mut session = AnalysisSession::new(MonitorConfig::default()).unwrap();
    assert!(matches!(
        session.load_csv("Period,Site/Application,Revenue\nQ1,a,1\n"),
        Err(MonitorError::NoPeriodColumn { .. })
    ));
    assert!(matches!(
        session.load_csv("Date,Site/Application,Revenue\n2025-01-01,TDS 7,1\n"),
        Err(MonitorError::EmptyDataset { .. })
    ));
    assert!(matches!(
        session.load_csv("Date,Site/Application,Revenue\n"),
        Err(MonitorError::EmptyDataset { .. })
    ));
    assert!(session.dataset().is_none());
}

#[test]
fn test_later_numeric_cells_do_not_extend_metric_set() -> anyhow::Result<()> {
    let csv = "Date,Site/Application,Notes,Revenue
2025-01-01,a.example,x,200
2025-01-02,a.example,5,100
2025-01-02,b.example,7,30
";
    let mut session = AnalysisSession::new(MonitorConfig::default())?;
    let summary = session.load_csv(csv)?;
    assert_eq!(summary.metrics, vec!["Revenue"]);

    let request = ComparisonRequest::new("2025-01-01", "2025-01-02", GroupBy::Site);
    let run = session.compare(&request)?;
    let flags: Vec<Flag> = run.results.iter().map(|r| r.flag).collect();
    assert_eq!(flags, vec![Flag::Yes, Flag::Null]);
    for result in &run.results {
        let names: Vec<&str> = result.metrics.iter().map(|m| m.metric.as_str()).collect();
        assert_eq!(names, vec!["Revenue"]);
    }
    let entities = run.results.len();

    let export = session.export_csv()?;
    assert_eq!(export.lines().count(), 1 + entities * summary.metrics.len());
    assert!(!export.contains("Notes"));
    Ok(())
}

#[test]
fn test_file_round_trip() -> anyhow::Result<()> {
    let dir = std::env::temp_dir();
    let input = dir.join(format!("revenue-drop-monitor-in-{}.csv", std::process::id()));
    let output = dir.join(format!("revenue-drop-monitor-out-{}.csv", std::process::id()));
    std::fs::write(&input, monthly_csv())?;

    let mut session = AnalysisSession::new(MonitorConfig::default())?;
    let summary = session.load_csv_path(&input)?;
    assert_eq!(summary.kept_rows, 8);

    let request = session.default_request(GroupBy::Site).unwrap();
    session.compare(&request)?;
    session.export_csv_to_path(&output)?;

    let written = std::fs::read_to_string(&output)?;
    std::fs::remove_file(&input)?;
    std::fs::remove_file(&output)?;

    assert!(written.starts_with(UTF8_BOM));
    assert!(!written.ends_with('\n'));
    let records: usize = session.displayed().iter().map(|r| r.metrics.len()).sum();
    assert_eq!(records, 8);
    assert_eq!(written.lines().count(), 1 + records);
    assert_eq!(written, session.export_csv()?);
    Ok(())
}
