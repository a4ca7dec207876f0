mod common;

use common::{ScriptedModel, PEOPLE_CSV};
use sheetsql::error::{ExecutionError, GenerationError, ValidationError};
use sheetsql::export;
use sheetsql::ingestion::{LocalFileSource, RawUpload};
use sheetsql::{Pipeline, PipelineConfig, SheetError};
use std::sync::Arc;

fn pipeline(reply: &str) -> (Pipeline, Arc<ScriptedModel>) {
    let model = Arc::new(ScriptedModel::new(reply));
    (Pipeline::new(PipelineConfig::default(), model.clone()), model)
}

fn people() -> RawUpload {
    RawUpload::new("people.csv", PEOPLE_CSV.as_bytes().to_vec())
}

#[tokio::test]
async fn test_fenced_completion_is_cleaned_and_executed() {
    let (pipeline, model) = pipeline(
        "```sql\nSELECT * FROM uploaded_csv WHERE CAST(age AS INTEGER) > 26;\n```",
    );

    let output = pipeline.run("people older than 26", people()).await.unwrap();

    assert_eq!(
        output.query,
        "SELECT * FROM uploaded_csv WHERE CAST(age AS INTEGER) > 26;"
    );
    assert_eq!(output.result.columns, vec!["name", "age"]);
    assert_eq!(output.result.len(), 1);
    assert_eq!(output.result.rows[0]["name"], "Alice");
    assert_eq!(output.result.rows[0]["age"], "30");
    assert!(!output.result.truncated);
    assert_eq!(model.calls(), 1);
}

#[tokio::test]
async fn test_prompt_describes_inferred_types() {
    let (pipeline, model) = pipeline("SELECT name FROM uploaded_csv;");
    pipeline.run("names", people()).await.unwrap();

    let prompt = model.prompts.lock().unwrap()[0].clone();
    assert!(prompt.contains(r#"Given this request: "names""#));
    assert!(prompt.contains(r#""inferred_type":"BIGINT""#));
    assert!(prompt.contains("uploaded_csv"));
}

#[tokio::test]
async fn test_ragged_rows_never_reach_the_model() {
    let (pipeline, model) = pipeline("SELECT * FROM uploaded_csv;");
    let upload = RawUpload::new("bad.csv", b"a,b,c\n1,2,3\n4,5\n".to_vec());

    let err = pipeline.run("all", upload).await.unwrap_err();
    assert!(matches!(
        err,
        SheetError::Validation(ValidationError::RowWidthMismatch {
            row: 3,
            actual: 2,
            expected: 3
        })
    ));
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn test_header_only_upload_is_rejected() {
    let (pipeline, _) = pipeline("SELECT * FROM uploaded_csv;");
    let upload = RawUpload::new("empty.csv", b"name,age\n".to_vec());

    let err = pipeline.run("all", upload).await.unwrap_err();
    assert!(matches!(
        err,
        SheetError::Validation(ValidationError::EmptyOrHeaderOnly)
    ));
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn test_write_statements_are_refused() {
    let (p, _) = pipeline("DELETE FROM uploaded_csv;");
    let err = p.run("remove everyone", people()).await.unwrap_err();
    assert!(matches!(err, SheetError::Generation(GenerationError::NotReadOnly(_))));

    let (p, _) = pipeline("SELECT 1; DROP TABLE uploaded_csv;");
    let err = p.run("sneaky", people()).await.unwrap_err();
    assert!(matches!(err, SheetError::Generation(GenerationError::MultipleStatements(_))));
}

#[tokio::test]
async fn test_blank_completion_is_an_empty_query() {
    let (pipeline, _) = pipeline("```sql\n```");
    let err = pipeline.run("anything", people()).await.unwrap_err();
    assert!(matches!(
        err,
        SheetError::Generation(GenerationError::EmptyGeneratedQuery)
    ));
}

#[tokio::test]
async fn test_engine_error_is_surfaced() {
    let (pipeline, _) = pipeline("SELECT salary FROM uploaded_csv;");
    let err = pipeline.run("salaries", people()).await.unwrap_err();
    match err {
        SheetError::Execution(ExecutionError::QueryExecutionError(detail)) => {
            assert!(detail.contains("salary"), "unexpected detail: {}", detail)
        }
        other => panic!("expected execution error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_no_matching_rows_is_an_error() {
    let (pipeline, _) = pipeline("SELECT * FROM uploaded_csv WHERE name = 'Zed';");
    let err = pipeline.run("zed", people()).await.unwrap_err();
    assert!(matches!(err, SheetError::Execution(ExecutionError::EmptyResult)));
    assert_eq!(err.to_string(), "Query returned no results");
}

#[tokio::test]
async fn test_whitespace_lines_are_not_counted() {
    let (pipeline, _) = pipeline("SELECT COUNT(*) AS total FROM uploaded_csv;");
    let upload = RawUpload::new(
        "people.csv",
        b"name,age\r\nAlice,30\r\n   \r\n\t\r\nBob,25\r\n\r\n\r\n".to_vec(),
    );

    let output = pipeline.run("how many people", upload).await.unwrap();
    assert_eq!(output.result.rows[0]["total"], 2);
}

#[tokio::test]
async fn test_requests_do_not_share_tables() {
    let (pipeline, _) = pipeline("SELECT * FROM uploaded_csv;");

    let first = pipeline
        .run("all", RawUpload::new("a.csv", b"x\n1\n2\n".to_vec()))
        .await
        .unwrap();
    let second = pipeline
        .run("all", RawUpload::new("b.csv", b"y,z\nq,r\n".to_vec()))
        .await
        .unwrap();

    assert_eq!(first.result.columns, vec!["x"]);
    assert_eq!(first.result.len(), 2);
    assert_eq!(second.result.columns, vec!["y", "z"]);
    assert_eq!(second.result.len(), 1);
}

#[tokio::test]
async fn test_large_results_are_truncated() {
    let mut csv = String::from("n\n");
    for i in 0..50 {
        csv.push_str(&format!("{}\n", i));
    }
    let model = Arc::new(ScriptedModel::new("SELECT * FROM uploaded_csv"));
    let config = PipelineConfig {
        max_result_rows: 10,
        ..PipelineConfig::default()
    };
    let pipeline = Pipeline::new(config, model);

    let output = pipeline
        .run("everything", RawUpload::new("n.csv", csv.into_bytes()))
        .await
        .unwrap();
    assert_eq!(output.result.len(), 10);
    assert!(output.result.truncated);
    assert!(output.query.ends_with(';'));
}

#[tokio::test]
async fn test_result_exports_as_csv() {
    let (pipeline, _) = pipeline("SELECT name, age FROM uploaded_csv ORDER BY name;");
    let output = pipeline.run("everyone", people()).await.unwrap();

    assert_eq!(
        export::to_csv(&output.result).unwrap(),
        "name,age\nAlice,30\nBob,25"
    );
}

#[tokio::test]
async fn test_run_from_local_reference() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("people.csv"), PEOPLE_CSV).unwrap();
    let source = LocalFileSource::new(dir.path());

    let (pipeline, _) = pipeline("SELECT COUNT(*) AS total FROM uploaded_csv;");
    let output = pipeline
        .run_from_reference(&source, "how many people", "people.csv")
        .await
        .unwrap();
    assert_eq!(output.result.rows[0]["total"], 2);

    let err = pipeline
        .run_from_reference(&source, "how many people", "../people.csv")
        .await
        .unwrap_err();
    assert!(matches!(err, SheetError::FileNotFound(_)));
}
