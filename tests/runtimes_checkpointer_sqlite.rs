#![cfg(feature = "sqlite")]

mod common;
use common::*;

use chrono::Utc;
use serde_json::json;
use stategraph::app::App;
use stategraph::graphs::GraphBuilder;
use stategraph::runtimes::{
    AppRunner, Checkpoint, Checkpointer, CheckpointerType, RuntimeConfig, SQLiteCheckpointer,
    SessionInit, StepQuery,
};
use stategraph::state::GraphState;
use stategraph::types::NodeId;

fn sqlite_app(db_path: &str) -> App {
    GraphBuilder::new()
        .add_node("work", SetField::new("status", json!("done")))
        .set_entry_point("work")
        .add_edge("work", NodeId::End)
        .with_runtime_config(RuntimeConfig::new(
            None,
            Some(CheckpointerType::SQLite),
            Some(db_path.to_string()),
        ))
        .compile()
        .unwrap()
}

async fn connect(dir: &tempfile::TempDir, file: &str) -> SQLiteCheckpointer {
    let path = dir.path().join(file);
    std::fs::File::create(&path).unwrap();
    SQLiteCheckpointer::connect(&format!("sqlite://{}", path.display()))
        .await
        .unwrap()
}

fn checkpoint(session: &str, step: u64, updated_fields: Vec<String>) -> Checkpoint {
    Checkpoint {
        session_id: session.to_string(),
        step,
        state: GraphState::builder()
            .with_input("seed")
            .with_value("counter", json!(step))
            .build(),
        cursor: NodeId::from("next"),
        updated_fields,
        concurrency_limit: 4,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn checkpoints_survive_a_new_runner() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("runs.db").display().to_string();

    {
        let mut runner =
            AppRunner::new(sqlite_app(&db_path), CheckpointerType::SQLite).await;
        let init = runner
            .create_session("durable".to_string(), state_with_input("first"))
            .await
            .unwrap();
        assert_eq!(init, SessionInit::Fresh);
        runner.run_until_complete("durable").await.unwrap();
    }

    // A fresh runner over the same database resumes from disk.
    let mut runner = AppRunner::new(sqlite_app(&db_path), CheckpointerType::SQLite).await;
    let init = runner
        .create_session("durable".to_string(), state_with_input("ignored"))
        .await
        .unwrap();
    assert_eq!(init, SessionInit::Resumed { checkpoint_step: 1 });

    let session = runner.get_session("durable").unwrap();
    assert!(session.is_complete());
    assert_field(&session.state, "status", &json!("done"));
    assert_field(&session.state, "input", &json!("first"));
}

#[tokio::test]
async fn save_and_load_round_trip_the_state() {
    let dir = tempfile::tempdir().unwrap();
    let store = connect(&dir, "direct.db").await;

    store
        .save(checkpoint("s1", 1, vec!["counter".to_string()]))
        .await
        .unwrap();
    store
        .save(checkpoint("s1", 2, vec!["counter".to_string()]))
        .await
        .unwrap();

    let latest = store.load_latest("s1").await.unwrap().unwrap();
    assert_eq!(latest.step, 2);
    assert_eq!(latest.cursor, NodeId::from("next"));
    assert_eq!(latest.state.get("counter"), Some(&json!(2)));
    assert_eq!(latest.concurrency_limit, 4);

    assert!(store.load_latest("absent").await.unwrap().is_none());
    assert_eq!(store.list_sessions().await.unwrap(), vec!["s1".to_string()]);
}

#[tokio::test]
async fn resaving_a_step_replaces_the_row() {
    let dir = tempfile::tempdir().unwrap();
    let store = connect(&dir, "replace.db").await;

    store.save(checkpoint("s1", 1, vec![])).await.unwrap();
    let mut replacement = checkpoint("s1", 1, vec![]);
    replacement.cursor = NodeId::from("elsewhere");
    store.save(replacement).await.unwrap();

    let history = store.list_checkpoints("s1").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].cursor, NodeId::from("elsewhere"));
}

#[tokio::test]
async fn history_lists_in_ascending_step_order() {
    let dir = tempfile::tempdir().unwrap();
    let store = connect(&dir, "history.db").await;

    for step in [3, 1, 2] {
        store.save(checkpoint("s1", step, vec![])).await.unwrap();
    }

    let steps: Vec<u64> = store
        .list_checkpoints("s1")
        .await
        .unwrap()
        .iter()
        .map(|c| c.step)
        .collect();
    assert_eq!(steps, vec![1, 2, 3]);
}

#[tokio::test]
async fn query_steps_filters_and_paginates() {
    let dir = tempfile::tempdir().unwrap();
    let store = connect(&dir, "query.db").await;

    for step in 1..=5 {
        let field = if step % 2 == 0 { "summary" } else { "other" };
        store
            .save(checkpoint("s1", step, vec![field.to_string()]))
            .await
            .unwrap();
    }

    // Filter by the field the barrier changed; newest first.
    let result = store
        .query_steps(
            "s1",
            StepQuery {
                updated_field: Some("summary".to_string()),
                ..StepQuery::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(result.page_info.total_count, 2);
    let steps: Vec<u64> = result.checkpoints.iter().map(|c| c.step).collect();
    assert_eq!(steps, vec![4, 2]);

    // Step-range filter plus a page size of one.
    let result = store
        .query_steps(
            "s1",
            StepQuery {
                min_step: Some(2),
                max_step: Some(4),
                limit: Some(1),
                ..StepQuery::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(result.page_info.total_count, 3);
    assert_eq!(result.page_info.page_size, 1);
    assert!(result.page_info.has_next_page);
    assert_eq!(result.checkpoints[0].step, 4);
}
