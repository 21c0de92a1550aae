//! Integration tests for exec and the session/auth commands against a mock
//! agent server.


use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use fixtures::{error_sse, sse_response, turn_response};
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockBuilder, MockServer, ResponseTemplate};

fn can_bind_localhost() -> bool {
    std::net::TcpListener::bind("127.0.0.1:0").is_ok()
}

/// Command with an isolated JARVIS_HOME pointed at `server`.
fn jarvis(home: &TempDir, server: &MockServer) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("jarvis");
    cmd.env("JARVIS_HOME", home.path())
        .env("JARVIS_SERVER_URL", server.uri())
        .env_remove("JARVIS_AUTH_EMAIL")
        .env_remove("JARVIS_AUTH_PASSWORD");
    cmd
}

fn stream_mock() -> MockBuilder {
    Mock::given(method("GET")).and(path("/api/agent/stream"))
}

#[tokio::test]
async fn test_exec_streams_reply_to_stdout() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    stream_mock()
        .and(query_param("prompt", "hello"))
        .respond_with(turn_response("Hello from Jarvis"))
        .expect(1)
        .mount(&server)
        .await;

    jarvis(&home, &server)
        .args(["exec", "-p", "hello"])
        .assert()
        .success()
        .stdout(predicate::str::diff("Hello from Jarvis\n"));
}

#[tokio::test]
async fn test_exec_uses_persisted_session_id() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    fs::write(home.path().join("session_id"), "known-session\n").unwrap();
    let server = MockServer::start().await;
    stream_mock()
        .and(query_param("session_id", "known-session"))
        .respond_with(turn_response("ok"))
        .expect(1)
        .mount(&server)
        .await;

    jarvis(&home, &server)
        .args(["exec", "-p", "hi"])
        .assert()
        .success();
}

#[tokio::test]
async fn test_exec_creates_session_id_once() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    stream_mock()
        .respond_with(turn_response("ok"))
        .expect(2)
        .mount(&server)
        .await;

    jarvis(&home, &server)
        .args(["exec", "-p", "one"])
        .assert()
        .success();
    jarvis(&home, &server)
        .args(["exec", "-p", "two"])
        .assert()
        .success();

    let persisted = fs::read_to_string(home.path().join("session_id")).unwrap();
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    for request in requests {
        let session_id = request
            .url
            .query_pairs()
            .find(|(key, _)| key == "session_id")
            .map(|(_, value)| value.into_owned());
        assert_eq!(session_id.as_deref(), Some(persisted.as_str()));
    }
}

#[tokio::test]
async fn test_exec_reset_and_workdir_are_forwarded() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    fs::write(home.path().join("config.toml"), "workdir = \"/srv/app\"\n").unwrap();
    let server = MockServer::start().await;
    stream_mock()
        .and(query_param("reset", "true"))
        .and(query_param("workdir", "/srv/app"))
        .respond_with(turn_response("clean slate"))
        .expect(1)
        .mount(&server)
        .await;

    jarvis(&home, &server)
        .args(["exec", "-p", "again", "--reset"])
        .assert()
        .success()
        .stdout(predicate::str::contains("clean slate"));
}

#[tokio::test]
async fn test_exec_server_error_exits_nonzero() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    stream_mock()
        .respond_with(sse_response(&error_sse("local_agent.py not found")))
        .mount(&server)
        .await;

    jarvis(&home, &server)
        .args(["exec", "-p", "hi"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("local_agent.py not found"));
}

#[tokio::test]
async fn test_exec_dropped_stream_is_connection_error() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    stream_mock()
        .respond_with(sse_response(
            "data: {\"type\":\"chunk\",\"text\":\"half a reply\"}\n\n",
        ))
        .mount(&server)
        .await;

    jarvis(&home, &server)
        .args(["exec", "-p", "hi"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("half a reply"))
        .stderr(predicate::str::contains("stream connection error"));
}

#[tokio::test]
async fn test_server_flag_overrides_env() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    stream_mock()
        .respond_with(turn_response("via flag"))
        .expect(1)
        .mount(&server)
        .await;

    cargo_bin_cmd!("jarvis")
        .env("JARVIS_HOME", home.path())
        .env("JARVIS_SERVER_URL", "http://127.0.0.1:9")
        .env_remove("JARVIS_AUTH_EMAIL")
        .env_remove("JARVIS_AUTH_PASSWORD")
        .args(["--server", &server.uri(), "exec", "-p", "hi"])
        .assert()
        .success()
        .stdout(predicate::str::contains("via flag"));
}

#[tokio::test]
async fn test_exec_logs_in_when_credentials_configured() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "jarvis_session=tok; Path=/; HttpOnly")
                .set_body_json(json!({"ok": true, "email": "me@example.com"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    stream_mock()
        .and(header("cookie", "jarvis_session=tok"))
        .respond_with(turn_response("authenticated"))
        .expect(1)
        .mount(&server)
        .await;

    jarvis(&home, &server)
        .env("JARVIS_AUTH_EMAIL", "me@example.com")
        .env("JARVIS_AUTH_PASSWORD", "hunter2")
        .args(["exec", "-p", "hi"])
        .assert()
        .success()
        .stdout(predicate::str::contains("authenticated"));
}

#[tokio::test]
async fn test_exec_rejected_login_fails() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"detail": "Invalid email or password"})),
        )
        .mount(&server)
        .await;
    stream_mock()
        .respond_with(turn_response("unreachable"))
        .expect(0)
        .mount(&server)
        .await;

    jarvis(&home, &server)
        .env("JARVIS_AUTH_EMAIL", "me@example.com")
        .env("JARVIS_AUTH_PASSWORD", "wrong")
        .args(["exec", "-p", "hi"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid email or password"));
}

#[tokio::test]
async fn test_session_reset_calls_server_and_rotates() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    fs::write(home.path().join("session_id"), "old-session").unwrap();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/agent/session/reset"))
        .and(query_param("session_id", "old-session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let output = jarvis(&home, &server)
        .args(["session", "reset"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let new_id = String::from_utf8(output).unwrap().trim().to_string();
    assert!(!new_id.is_empty());
    assert_ne!(new_id, "old-session");
    assert_eq!(
        fs::read_to_string(home.path().join("session_id")).unwrap(),
        new_id
    );
}

#[test]
fn test_session_reset_survives_unreachable_server() {
    let home = TempDir::new().unwrap();
    fs::write(home.path().join("session_id"), "old-session").unwrap();

    cargo_bin_cmd!("jarvis")
        .env("JARVIS_HOME", home.path())
        .env("JARVIS_SERVER_URL", "http://127.0.0.1:9")
        .env_remove("JARVIS_AUTH_EMAIL")
        .env_remove("JARVIS_AUTH_PASSWORD")
        .args(["session", "reset"])
        .assert()
        .success();

    assert_ne!(
        fs::read_to_string(home.path().join("session_id")).unwrap(),
        "old-session"
    );
}

#[tokio::test]
async fn test_whoami() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"detail": "Not authenticated"})),
        )
        .mount(&server)
        .await;

    jarvis(&home, &server)
        .arg("whoami")
        .assert()
        .success()
        .stdout(predicate::str::contains("Not signed in"));
}
