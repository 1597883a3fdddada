//! End-to-end pipeline runs against in-memory connectors

use recon_core::domain::analysis::{RiskLevel, RootCauseCategory, RunSummary, Severity, TrendDirection};
use recon_core::domain::mapping::{SchemaMapping, SystemId};
use recon_core::domain::pipeline::{PipelineDefinition, PipelineSettings, Step};
use recon_core::domain::run::RunStatus;
use recon_core::domain::step::{DifferenceType, ErrorKind, StepStatus};
use recon_engine::pool::memory::{MemoryConnector, MemoryConnectorFactory};
use recon_engine::pool::{ColumnSpec, RowSet};
use recon_engine::{EngineConfig, EngineError, InMemoryRecorder, PipelineRunner, RunContext};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn config() -> EngineConfig {
    EngineConfig {
        retry_backoff: Duration::from_millis(1),
        ..Default::default()
    }
}

fn mapping() -> SchemaMapping {
    SchemaMapping::from([("SALES", "SALES_DW")])
}

fn step(name: &str, validator_type: &str, config: serde_json::Value) -> Step {
    Step {
        name: name.to_string(),
        validator_type: validator_type.to_string(),
        config,
        timeout_seconds: None,
        table: None,
    }
}

fn pipeline(steps: Vec<Step>) -> PipelineDefinition {
    PipelineDefinition {
        name: "orders-migration".to_string(),
        description: None,
        settings: PipelineSettings::default(),
        steps,
    }
}

fn order_columns() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::new("ORDER_ID", "integer", false),
        ColumnSpec::new("AMOUNT", "numeric(12,2)", true),
    ]
}

fn count_and_shape_steps() -> Vec<Step> {
    vec![
        step("order count", "row_count", json!({ "source_table": "SALES.ORDERS" })),
        step("order shape", "schema_shape", json!({ "source_table": "SALES.ORDERS" })),
    ]
}

fn orders_factory(source_count: u64, target_count: u64) -> MemoryConnectorFactory {
    let source = MemoryConnector::new()
        .with_result("SELECT COUNT(*) FROM SALES.ORDERS", RowSet::scalar("count", source_count))
        .with_table("SALES.ORDERS", order_columns());
    let target = MemoryConnector::new()
        .with_result("SELECT COUNT(*) FROM SALES_DW.ORDERS", RowSet::scalar("COUNT", target_count))
        .with_table("SALES_DW.ORDERS", order_columns());
    MemoryConnectorFactory::new(source, target)
}

fn context(
    definition: PipelineDefinition,
    factory: MemoryConnectorFactory,
    recorder: &InMemoryRecorder,
) -> (RunContext, recon_engine::CancelHandle) {
    RunContext::new(definition, mapping(), Arc::new(factory), Arc::new(recorder.clone()))
}

#[tokio::test]
async fn test_count_mismatch_with_identical_schemas() {
    let recorder = InMemoryRecorder::new();
    let (ctx, _cancel) = context(pipeline(count_and_shape_steps()), orders_factory(1000, 985), &recorder);

    let report = PipelineRunner::new(config()).execute(ctx).await.unwrap();

    assert_eq!(report.run.status, RunStatus::Completed);
    assert_eq!(report.run.counters.total_steps, 2);
    assert_eq!(report.run.counters.failed_steps, 1);
    assert_eq!(report.run.counters.passed_steps, 1);

    let count = &report.steps[0];
    assert_eq!(count.status, StepStatus::Failed);
    assert_eq!(count.difference_type, DifferenceType::CountMismatch);
    assert_eq!(count.match_percentage, 98.5);
    assert_eq!(count.source_row_count, Some(1000));
    assert_eq!(count.target_row_count, Some(985));
    assert_eq!(count.table.as_deref(), Some("SALES.ORDERS"));

    let shape = &report.steps[1];
    assert_eq!(shape.status, StepStatus::Passed);
    assert_eq!(shape.match_percentage, 100.0);

    assert_eq!(report.root_causes.len(), 1);
    assert_eq!(report.root_causes[0].category, RootCauseCategory::RowCountDrift);
    assert_eq!(report.root_causes[0].error_count, 15);
    assert!(report.steps.iter().all(|s| s.is_consistent()));
}

#[tokio::test]
async fn test_results_are_recorded_in_declaration_order() {
    let recorder = InMemoryRecorder::new();
    let (ctx, _cancel) = context(pipeline(count_and_shape_steps()), orders_factory(10, 10), &recorder);
    let run_id = ctx.run_id;

    let report = PipelineRunner::new(config()).execute(ctx).await.unwrap();

    let recorded = recorder.steps(run_id);
    let names: Vec<_> = recorded.iter().map(|s| s.step_name.as_str()).collect();
    assert_eq!(names, vec!["order count", "order shape"]);
    assert_eq!(recorded, report.steps);
    assert_eq!(recorder.run(run_id).unwrap().status, RunStatus::Completed);
    assert_eq!(recorder.analysis(run_id), Some(Vec::new()));
}

#[tokio::test]
async fn test_timeout_fails_step_and_next_step_still_runs() {
    let source = MemoryConnector::new()
        .with_result("SELECT SUM(AMOUNT) FROM SALES.ORDERS", RowSet::scalar("total", 10))
        .with_result("SELECT COUNT(*) FROM SALES.ORDERS", RowSet::scalar("count", 3));
    let target = MemoryConnector::new()
        .with_slow_result(
            "SELECT SUM(AMOUNT) FROM SALES_DW.ORDERS",
            RowSet::scalar("total", 10),
            Duration::from_secs(3),
        )
        .with_result("SELECT COUNT(*) FROM SALES_DW.ORDERS", RowSet::scalar("count", 3));

    let mut slow = step("order total", "aggregate", json!({ "query": "SELECT SUM(AMOUNT) FROM SALES.ORDERS" }));
    slow.timeout_seconds = Some(1);
    let steps = vec![slow, step("order count", "row_count", json!({ "source_table": "SALES.ORDERS" }))];

    let recorder = InMemoryRecorder::new();
    let (ctx, _cancel) = context(pipeline(steps), MemoryConnectorFactory::new(source, target), &recorder);
    let report = PipelineRunner::new(config()).execute(ctx).await.unwrap();

    let timed_out = &report.steps[0];
    assert_eq!(timed_out.status, StepStatus::Failed);
    assert_eq!(timed_out.error_kind(), Some(ErrorKind::Timeout));
    assert!(timed_out.error_message().unwrap().starts_with("TIMEOUT_ERROR"));

    assert_eq!(report.steps[1].status, StepStatus::Passed);
    assert_eq!(report.run.status, RunStatus::Completed);
    assert_eq!(report.root_causes[0].category, RootCauseCategory::Connectivity);
}

#[tokio::test]
async fn test_validator_panic_is_contained_to_its_step() {
    let source = MemoryConnector::new()
        .panicking_on("SELECT * FROM SALES.ORDERS")
        .with_result("SELECT COUNT(*) FROM SALES.ORDERS", RowSet::scalar("count", 1));
    let target = MemoryConnector::new()
        .with_result("SELECT * FROM SALES_DW.ORDERS", RowSet::default())
        .with_result("SELECT COUNT(*) FROM SALES_DW.ORDERS", RowSet::scalar("count", 1));

    let steps = vec![
        step("order rows", "row_diff", json!({ "query": "SELECT * FROM SALES.ORDERS" })),
        step("order count", "row_count", json!({ "source_table": "SALES.ORDERS" })),
    ];
    let recorder = InMemoryRecorder::new();
    let (ctx, _cancel) = context(pipeline(steps), MemoryConnectorFactory::new(source, target), &recorder);
    let report = PipelineRunner::new(config()).execute(ctx).await.unwrap();

    let crashed = &report.steps[0];
    assert_eq!(crashed.status, StepStatus::Failed);
    assert_eq!(crashed.error_kind(), Some(ErrorKind::Crash));
    let error = crashed.error.as_ref().unwrap();
    assert!(error.message.contains("driver fault"));
    let trace = error.stack_trace.as_deref().unwrap();
    assert!(trace.contains("row_diff"));
    assert!(trace.lines().count() > 1, "backtrace frames follow the header");

    assert_eq!(report.steps[1].status, StepStatus::Passed);
    assert_eq!(report.run.status, RunStatus::Completed);
    assert_eq!(report.run.counters.error_count, 1);
}

#[tokio::test]
async fn test_cancellation_between_steps() {
    let source = MemoryConnector::new()
        .with_slow_result("SELECT COUNT(*) FROM SALES.ORDERS", RowSet::scalar("count", 5), Duration::from_millis(300))
        .with_table("SALES.ORDERS", order_columns());
    let target = MemoryConnector::new()
        .with_result("SELECT COUNT(*) FROM SALES_DW.ORDERS", RowSet::scalar("count", 5))
        .with_table("SALES_DW.ORDERS", order_columns());

    let recorder = InMemoryRecorder::new();
    let (ctx, cancel) = context(
        pipeline(count_and_shape_steps()),
        MemoryConnectorFactory::new(source, target),
        &recorder,
    );

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });
    let report = PipelineRunner::new(config()).execute(ctx).await.unwrap();

    // the step in flight finishes; the rest are skipped
    assert_eq!(report.steps[0].status, StepStatus::Passed);
    assert_eq!(report.steps[1].status, StepStatus::Skipped);
    assert_eq!(report.steps[1].error_kind(), Some(ErrorKind::Cancelled));
    assert_eq!(report.run.status, RunStatus::Failed);
    assert_eq!(report.run.failure_reason.as_deref(), Some("cancelled"));
    assert_eq!(report.run.counters.skipped_steps, 1);
    assert!(cancel.is_cancelled());
}

#[tokio::test]
async fn test_stop_on_first_failure_skips_the_rest() {
    let mut definition = pipeline(count_and_shape_steps());
    definition.settings.stop_on_first_failure = true;

    let recorder = InMemoryRecorder::new();
    let (ctx, _cancel) = context(definition, orders_factory(100, 80), &recorder);
    let report = PipelineRunner::new(config()).execute(ctx).await.unwrap();

    assert_eq!(report.steps.len(), 2);
    assert_eq!(report.steps[0].match_percentage, 80.0);
    assert_eq!(report.steps[1].status, StepStatus::Skipped);
    assert!(report.steps[1].error.is_none());
    assert_eq!(report.run.status, RunStatus::Completed);
}

#[tokio::test]
async fn test_unreachable_system_fails_the_run() {
    let factory = orders_factory(1, 1).unreachable(SystemId::Target);
    let recorder = InMemoryRecorder::new();
    let (ctx, _cancel) = context(pipeline(count_and_shape_steps()), factory, &recorder);
    let report = PipelineRunner::new(config()).execute(ctx).await.unwrap();

    assert_eq!(report.run.status, RunStatus::Failed);
    assert!(report.run.failure_reason.as_deref().unwrap().starts_with("CONNECTION_ERROR"));
    assert_eq!(report.steps.len(), 2);
    assert!(report.steps.iter().all(|s| s.status == StepStatus::Skipped));
    assert!(report.steps.iter().all(|s| s.error_kind() == Some(ErrorKind::Connection)));

    assert_eq!(report.root_causes.len(), 1);
    assert_eq!(report.root_causes[0].category, RootCauseCategory::Connectivity);
    assert_eq!(report.root_causes[0].severity, Severity::Blocker);
    assert_eq!(report.root_causes[0].total_affected, 2);
    assert_eq!(report.risk.level, RiskLevel::Critical);
}

#[tokio::test]
async fn test_invalid_definition_never_starts() {
    let steps = vec![step("mystery", "checksum", json!({}))];
    let recorder = InMemoryRecorder::new();
    let (ctx, _cancel) = context(pipeline(steps), orders_factory(1, 1), &recorder);
    let run_id = ctx.run_id;

    let err = PipelineRunner::new(config()).execute(ctx).await.unwrap_err();
    assert!(matches!(err, EngineError::Config(_)));
    assert!(err.to_string().contains("invalid pipeline configuration"));
    assert!(recorder.run(run_id).is_none());
}

#[tokio::test]
async fn test_lenient_lookup_skips_unknown_validator() {
    let mut steps = count_and_shape_steps();
    steps.insert(1, step("mystery", "checksum", json!({})));
    let mut definition = pipeline(steps);
    definition.settings.lenient_validator_lookup = true;

    let recorder = InMemoryRecorder::new();
    let (ctx, _cancel) = context(definition, orders_factory(7, 7), &recorder);
    let report = PipelineRunner::new(config()).execute(ctx).await.unwrap();

    assert_eq!(report.steps.len(), 3);
    assert_eq!(report.steps[1].status, StepStatus::Skipped);
    assert!(report.steps[1].error_message().unwrap().contains("validator not found"));
    assert_eq!(report.steps[2].status, StepStatus::Passed);
}

#[tokio::test]
async fn test_row_diff_through_rewritten_query() {
    let columns = vec!["ORDER_ID".to_string(), "AMOUNT".to_string()];
    let source_rows = RowSet::new(
        columns.clone(),
        vec![vec![json!(1), json!("10.00")], vec![json!(2), json!("20.00")]],
    )
    .with_numeric_columns(&["AMOUNT"]);
    let target_rows = RowSet::new(columns, vec![vec![json!(2), json!(20)], vec![json!(1), json!(10)]]);
    let source = MemoryConnector::new().with_result("SELECT ORDER_ID, AMOUNT FROM SALES.ORDERS", source_rows);
    let target = MemoryConnector::new().with_result("SELECT ORDER_ID, AMOUNT FROM SALES_DW.ORDERS", target_rows);

    let steps = vec![step(
        "order rows",
        "row_diff",
        json!({ "query": "SELECT ORDER_ID, AMOUNT FROM SALES.ORDERS", "key_columns": ["order_id"] }),
    )];
    let recorder = InMemoryRecorder::new();
    let (ctx, _cancel) = context(pipeline(steps), MemoryConnectorFactory::new(source, target), &recorder);
    let report = PipelineRunner::new(config()).execute(ctx).await.unwrap();

    assert_eq!(report.steps[0].status, StepStatus::Passed);
    assert_eq!(report.steps[0].match_percentage, 100.0);
}

fn row_diff_step(key_columns: serde_json::Value) -> Step {
    step(
        "order rows",
        "row_diff",
        json!({ "query": "SELECT ORDER_ID, AMOUNT FROM SALES.ORDERS", "key_columns": key_columns }),
    )
}

fn row_diff_factory(source_rows: RowSet, target_rows: RowSet) -> MemoryConnectorFactory {
    let source = MemoryConnector::new().with_result("SELECT ORDER_ID, AMOUNT FROM SALES.ORDERS", source_rows);
    let target = MemoryConnector::new().with_result("SELECT ORDER_ID, AMOUNT FROM SALES_DW.ORDERS", target_rows);
    MemoryConnectorFactory::new(source, target)
}

#[tokio::test]
async fn test_row_diff_stops_at_row_cap() {
    let columns = vec!["ORDER_ID".to_string(), "AMOUNT".to_string()];
    let source_rows = RowSet::new(columns.clone(), (1..=5).map(|i| vec![json!(i), json!(i * 10)]).collect());
    let target_rows = RowSet::new(columns, (1..=5).map(|i| vec![json!(i), json!(i * 10 + 1)]).collect());

    let recorder = InMemoryRecorder::new();
    let (ctx, _cancel) = context(
        pipeline(vec![row_diff_step(json!(["ORDER_ID"]))]),
        row_diff_factory(source_rows, target_rows),
        &recorder,
    );
    let engine = EngineConfig {
        default_row_cap: 3,
        default_sample_size: 2,
        ..config()
    };
    let report = PipelineRunner::new(engine).execute(ctx).await.unwrap();

    let diff = &report.steps[0];
    assert_eq!(diff.status, StepStatus::Failed);
    assert_eq!(diff.source_row_count, Some(3));
    assert_eq!(diff.target_row_count, Some(3));
    assert_eq!(diff.comparison["truncated"], json!(true));
    assert_eq!(diff.comparison["differing_rows_count"], json!(3));
    assert_eq!(diff.comparison["samples"].as_array().unwrap().len(), 2);
    assert_eq!(diff.affected_columns, vec!["AMOUNT"]);
}

#[tokio::test]
async fn test_row_diff_compares_cells_exactly() {
    let columns = vec!["ORDER_ID".to_string(), "AMOUNT".to_string()];
    let source_rows = RowSet::new(
        columns.clone(),
        vec![
            vec![json!(9_007_199_254_740_992_i64), json!("12345678901234567.89")],
            vec![json!(9_007_199_254_740_993_i64), json!("00123")],
        ],
    )
    .with_numeric_columns(&["ORDER_ID", "AMOUNT"]);
    let target_rows = RowSet::new(
        columns,
        vec![
            vec![json!(9_007_199_254_740_992_i64), json!("12345678901234567.01")],
            vec![json!(9_007_199_254_740_993_i64), json!("123")],
        ],
    )
    .with_numeric_columns(&["ORDER_ID", "AMOUNT"]);

    let recorder = InMemoryRecorder::new();
    let (ctx, _cancel) = context(
        pipeline(vec![row_diff_step(json!(["ORDER_ID"]))]),
        row_diff_factory(source_rows, target_rows),
        &recorder,
    );
    let report = PipelineRunner::new(config()).execute(ctx).await.unwrap();

    // the second row agrees by numeric value, the first differs in its last digits
    let diff = &report.steps[0];
    assert_eq!(diff.status, StepStatus::Failed);
    assert_eq!(diff.comparison["duplicate_keys"], json!(0));
    assert_eq!(diff.comparison["value_mismatches"], json!(1));
    assert_eq!(diff.comparison["matched_rows"], json!(1));
    assert_eq!(diff.match_percentage, 50.0);
}

#[tokio::test]
async fn test_aggregate_mismatch_on_text_values() {
    let query = "SELECT MAX(REGION), COUNT(*) FROM SALES.ORDERS";
    let source = MemoryConnector::new().with_result(
        query,
        RowSet::new(vec!["region".to_string(), "n".to_string()], vec![vec![json!("EU-WEST"), json!(7)]]),
    );
    let target = MemoryConnector::new().with_result(
        "SELECT MAX(REGION), COUNT(*) FROM SALES_DW.ORDERS",
        RowSet::new(vec!["region".to_string(), "n".to_string()], vec![vec![json!("eu-west"), json!(7)]]),
    );

    let steps = vec![step(
        "region max",
        "aggregate",
        json!({ "query": query, "tolerance": { "mode": "absolute", "value": 5.0 } }),
    )];
    let recorder = InMemoryRecorder::new();
    let (ctx, _cancel) = context(pipeline(steps), MemoryConnectorFactory::new(source, target), &recorder);
    let report = PipelineRunner::new(config()).execute(ctx).await.unwrap();

    let aggregate = &report.steps[0];
    assert_eq!(aggregate.status, StepStatus::Failed);
    assert_eq!(aggregate.difference_type, DifferenceType::DataMismatch);
    assert_eq!(aggregate.affected_columns, vec!["region"]);
    assert_eq!(aggregate.match_percentage, 50.0);
    assert_eq!(report.root_causes[0].category, RootCauseCategory::AggregateToleranceBreach);
}

#[tokio::test]
async fn test_trend_against_history() {
    let previous = RunSummary {
        run_id: Uuid::new_v4(),
        started_at: None,
        status: RunStatus::Completed,
        success_rate: 0.0,
        error_count: 2,
        blocker_count: 0,
        total_steps: 2,
    };

    let recorder = InMemoryRecorder::new();
    let (ctx, _cancel) = context(pipeline(count_and_shape_steps()), orders_factory(4, 4), &recorder);
    let ctx = ctx.with_history(vec![previous.clone()], None);
    let report = PipelineRunner::new(config()).execute(ctx).await.unwrap();

    assert_eq!(report.trend.compared_to, Some(previous.run_id));
    let success = &report.trend.metrics[0];
    assert_eq!(success.current, 100.0);
    assert_eq!(success.direction, TrendDirection::Up);
    assert_eq!(report.trend.velocity.as_ref().unwrap().estimated_runs_to_100, Some(0));
}
