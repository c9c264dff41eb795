//! Federated query detection and the debounced detector.

use std::sync::Arc;
use std::time::Duration;

use duckfed::config::DetectorConfig;
use duckfed::error::ExecutionError;
use duckfed::federation::{
    detect, AttachDatabase, ConnectionDirectory, ConnectionInfo, DatabaseType,
    FederatedQueryDetector, ParsePhase, QueryScope, SelectedTable, SourceKind, TableSelection,
};
use duckfed::router::attachments_for;

fn connections() -> Vec<ConnectionInfo> {
    vec![
        ConnectionInfo::new("c1", "orders", DatabaseType::Mysql),
        ConnectionInfo::new("c2", "Events", DatabaseType::Postgresql),
    ]
}

fn orders_conn() -> ConnectionInfo {
    connections().remove(0)
}

fn inline_detector() -> FederatedQueryDetector {
    FederatedQueryDetector::new(
        Arc::new(connections()),
        &DetectorConfig {
            debounce_ms: 0,
            ..Default::default()
        },
    )
}

fn detect_sql(sql: &str) -> duckfed::federation::Detection {
    detect(
        sql,
        &TableSelection::new(),
        &[],
        &ConnectionDirectory::new(connections()),
        &DetectorConfig::default().local_schemas,
    )
}

#[test]
fn registered_prefix_requires_federation() {
    let detection = detect_sql("SELECT * FROM mysql_orders.users");
    assert!(detection.requires_federated_query);
    assert_eq!(
        detection.attach_databases,
        vec![AttachDatabase::new("c1", "mysql_orders")]
    );
    assert_eq!(detection.table_source.kind, SourceKind::External);
    assert_eq!(detection.table_source.connection_id.as_deref(), Some("c1"));
    assert_eq!(detection.table_source.database_type, Some(DatabaseType::Mysql));
    assert_eq!(detection.scope, QueryScope::External);
}

#[test]
fn unknown_prefix_is_reported_not_attached() {
    let detection = detect_sql("SELECT * FROM unknown_db.users");
    assert!(!detection.requires_federated_query);
    assert!(detection.attach_databases.is_empty());
    assert_eq!(detection.unrecognized_prefixes.len(), 1);
    assert_eq!(detection.unrecognized_prefixes[0].prefix, "unknown_db");
    assert_eq!(detection.table_source.kind, SourceKind::Duckdb);
}

#[test]
fn local_schemas_and_bare_tables_stay_local() {
    let detection = detect_sql(
        "SELECT * FROM main.customers c JOIN postgresql_events.clicks k ON c.id = k.cid, orders",
    );
    assert_eq!(
        detection.attach_databases,
        vec![AttachDatabase::new("c2", "postgresql_events")]
    );
    assert!(detection.unrecognized_prefixes.is_empty());
    assert_eq!(detection.scope, QueryScope::Mixed);
}

#[test]
fn alias_matching_is_case_sensitive() {
    let detection = detect_sql("SELECT * FROM MYSQL_ORDERS.users");
    assert!(detection.attach_databases.is_empty());
    assert_eq!(detection.unrecognized_prefixes[0].prefix, "MYSQL_ORDERS");
}

#[test]
fn selection_parsed_and_manual_attachments_merge_once() {
    let selection = TableSelection::from(vec![SelectedTable::external("users", orders_conn())]);
    let detection = detect(
        "SELECT * FROM mysql_orders.users JOIN postgresql_events.clicks ON TRUE",
        &selection,
        &[
            AttachDatabase::new("c1", "mysql_orders"),
            AttachDatabase::new("c3", "sqlite_scratch"),
        ],
        &ConnectionDirectory::new(connections()),
        &[],
    );
    let ids: Vec<&str> = detection
        .attach_databases
        .iter()
        .map(|a| a.connection_id.as_str())
        .collect();
    assert_eq!(ids, vec!["c1", "c2", "c3"]);
    assert_eq!(detection.table_source.connection_name.as_deref(), Some("orders"));
}

#[test]
fn removing_the_last_table_drops_its_attachment() {
    let detector = inline_detector();
    let orders = SelectedTable::external("orders", orders_conn());
    let users = SelectedTable::external("users", orders_conn());
    assert!(detector.add_table(orders.clone()));
    assert!(detector.add_table(users.clone()));
    assert!(!detector.add_table(users.clone()));
    detector.add_table(SelectedTable::local("events"));

    let attached = detector.detection().attach_databases;
    assert_eq!(attached, vec![AttachDatabase::new("c1", "mysql_orders")]);
    assert_eq!(detector.detection().scope, QueryScope::Mixed);

    assert!(detector.remove_table(&orders));
    assert_eq!(detector.detection().attach_databases.len(), 1);

    assert!(detector.remove_table(&users));
    assert!(detector.detection().attach_databases.is_empty());
    assert!(!detector.detection().requires_federated_query);
    assert!(!detector.remove_table(&users));
}

#[test]
fn removing_a_table_prunes_a_manual_attachment_for_its_connection() {
    let detector = inline_detector();
    let users = SelectedTable::external("users", orders_conn());
    detector.add_table(users.clone());
    assert!(detector.add_attachment(AttachDatabase::new("c1", "mysql_orders")));
    assert!(!detector.add_attachment(AttachDatabase::new("c1", "mysql_orders")));

    detector.remove_table(&users);
    let state = detector.state();
    assert!(state.manual_attachments.is_empty());
    assert!(state.detection.attach_databases.is_empty());
}

#[test]
fn sql_reference_keeps_the_attachment_alive() {
    let detector = inline_detector();
    let users = SelectedTable::external("users", orders_conn());
    detector.add_table(users.clone());
    detector.set_sql("SELECT count(*) FROM mysql_orders.users");
    detector.remove_table(&users);
    assert_eq!(
        detector.detection().attach_databases,
        vec![AttachDatabase::new("c1", "mysql_orders")]
    );
}

#[test]
fn replacing_the_selection_prunes_dropped_connections() {
    let detector = inline_detector();
    let users = SelectedTable::external("users", orders_conn());
    detector.set_selected_tables(vec![users]);
    detector.add_attachment(AttachDatabase::new("c1", "mysql_orders"));
    detector.set_selected_tables(vec![SelectedTable::local("events")]);
    assert!(detector.state().manual_attachments.is_empty());
    assert_eq!(detector.detection().scope, QueryScope::Local);
}

#[test]
fn manual_attachments_can_be_removed_and_cleared() {
    let detector = inline_detector();
    detector.add_attachment(AttachDatabase::new("c1", "mysql_orders"));
    detector.add_attachment(AttachDatabase::new("c2", "postgresql_events"));
    assert!(detector.remove_attachment("c1"));
    assert!(!detector.remove_attachment("c1"));
    assert_eq!(detector.detection().attach_databases.len(), 1);
    detector.clear_attachments();
    assert!(detector.detection().attach_databases.is_empty());
}

#[tokio::test(start_paused = true)]
async fn only_the_latest_schedule_fires() {
    let detector = FederatedQueryDetector::new(Arc::new(connections()), &DetectorConfig::default());
    let mut rx = detector.subscribe();
    assert_eq!(detector.state().phase, ParsePhase::Idle);

    detector.set_sql("SELECT * FROM mysql_orders.users");
    assert_eq!(detector.state().phase, ParsePhase::Parsing);

    tokio::time::sleep(Duration::from_millis(100)).await;
    detector.set_sql("SELECT * FROM postgresql_events.clicks");

    // the first timer would have fired at 300ms
    tokio::time::sleep(Duration::from_millis(299)).await;
    assert_eq!(detector.state().phase, ParsePhase::Parsing);
    assert!(detector.detection().attach_databases.is_empty());

    let state = rx
        .wait_for(|s| s.phase == ParsePhase::Parsed)
        .await
        .expect("detector alive")
        .clone();
    assert_eq!(
        state.detection.attach_databases,
        vec![AttachDatabase::new("c2", "postgresql_events")]
    );
}

#[tokio::test(start_paused = true)]
async fn reparse_now_skips_the_delay() {
    let detector = FederatedQueryDetector::new(Arc::new(connections()), &DetectorConfig::default());
    detector.set_sql("SELECT * FROM mysql_orders.users");
    assert_eq!(detector.state().phase, ParsePhase::Parsing);
    detector.reparse_now();
    assert_eq!(detector.state().phase, ParsePhase::Parsed);
    assert!(detector.detection().requires_federated_query);

    // the aborted timer must not fire later
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(detector.state().phase, ParsePhase::Parsed);
}

#[tokio::test(start_paused = true)]
async fn removing_a_table_clears_the_source_before_the_timer_fires() {
    let detector = FederatedQueryDetector::new(Arc::new(connections()), &DetectorConfig::default());
    let users = SelectedTable::external("users", orders_conn());
    detector.add_table(users.clone());
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(detector.state().phase, ParsePhase::Parsed);
    assert_eq!(detector.detection().table_source.kind, SourceKind::External);

    detector.remove_table(&users);
    let state = detector.state();
    assert_eq!(state.phase, ParsePhase::Parsing);
    let source = state.detection.table_source;
    assert_eq!(source.kind, SourceKind::Duckdb);
    assert!(source.connection_id.is_none());
    assert!(!state.detection.requires_federated_query);
    assert_eq!(state.detection.scope, QueryScope::Local);
    assert!(matches!(
        attachments_for(&source),
        Err(ExecutionError::MissingAttachments(_))
    ));

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(detector.state().phase, ParsePhase::Parsed);
    assert_eq!(detector.detection().table_source.kind, SourceKind::Duckdb);
}
