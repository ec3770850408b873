use assert_cmd::Command;
use predicates::prelude::*;

fn tutor_cmd() -> Command {
    let mut cmd = Command::cargo_bin("tutor").unwrap();
    cmd.env_remove("TUTOR_API_URL");
    cmd
}

#[tokio::test]
async fn test_ask_prints_timed_answer() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("POST", "/ask")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"answer":"A variable is a named box."}"#)
        .create_async()
        .await;

    tutor_cmd()
        .arg("-u")
        .arg(server.url())
        .arg("ask")
        .arg("What is a variable?")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^Bot \(\d+\.\d{2}s\): A variable is a named box\.\n$").unwrap());
}

#[tokio::test]
async fn test_ask_reports_server_error() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("POST", "/ask")
        .with_status(500)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error":"Generation failed: Transport error: refused"}"#)
        .create_async()
        .await;

    tutor_cmd()
        .env("TUTOR_API_URL", server.url())
        .arg("ask")
        .arg("hello")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error ("))
        .stderr(predicate::str::contains("Generation failed: Transport error: refused"));
}

#[tokio::test]
async fn test_chat_skips_blank_lines_and_exits() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/ask")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"answer":"Loops repeat steps."}"#)
        .expect(2)
        .create_async()
        .await;

    tutor_cmd()
        .arg("-u")
        .arg(server.url())
        .arg("chat")
        .write_stdin("What is a loop?\n\n   \nAnd a for loop?\nexit\nnever sent\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Bot (").count(2))
        .stdout(predicate::str::contains("Loops repeat steps."));

    mock.assert_async().await;
}

#[tokio::test]
async fn test_chat_continues_after_error() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("POST", "/ask")
        .with_status(504)
        .with_body(r#"{"error":"Generation timed out after 300s"}"#)
        .expect(2)
        .create_async()
        .await;

    tutor_cmd()
        .arg("-u")
        .arg(server.url())
        .arg("chat")
        .write_stdin("first\nsecond\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("Error (").count(2));
}

#[tokio::test]
async fn test_history_prints_entries() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("GET", "/api/v1/history")
        .match_query(mockito::Matcher::UrlEncoded("limit".into(), "2".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"entries":[{"user":"hi","assistant":"hello","topic":"on-topic","timestamp":"2025-01-01T10:00:00.000000"}]}"#,
        )
        .create_async()
        .await;

    tutor_cmd()
        .arg("-u")
        .arg(server.url())
        .arg("history")
        .arg("--limit")
        .arg("2")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"assistant\": \"hello\""));
}

#[test]
fn test_serve_with_missing_config_fails() {
    tutor_cmd()
        .arg("serve")
        .arg("--config")
        .arg("/nonexistent/tutor.json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to open"));
}
