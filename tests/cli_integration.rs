//! Integration tests for the demo and interactive client.
//!
//! Both run against the built-in server over an in-process transport pair,
//! with scripted input and captured output.

use toolwire::cli::{demo, repl, CliError};
use toolwire::config::ServerConfig;
use toolwire::mcp::error::{CloseReason, SessionError};
use toolwire::mcp::transport::{Transport, DEFAULT_MAX_FRAME_BYTES};
use toolwire::mcp::{ClientSession, McpServer, SessionConfig, ToolDispatcher};
use toolwire::tools::builtin_registry;

async fn connect(config: &ServerConfig) -> ClientSession {
    let (client_side, server_side) = Transport::pair(DEFAULT_MAX_FRAME_BYTES);
    let mut server = McpServer::new(
        ToolDispatcher::new(builtin_registry(config)),
        SessionConfig::default(),
    );
    tokio::spawn(async move { server.run(server_side).await });

    ClientSession::connect(client_side, SessionConfig::default())
        .await
        .unwrap()
}

// =============================================================================
// Interactive
// =============================================================================

#[tokio::test]
async fn test_repl_runs_script() {
    let dir = tempfile::tempdir().unwrap();
    let session = connect(&ServerConfig::default()).await;

    let file = dir.path().join("hello.txt");
    let file = file.to_string_lossy();
    let input = format!(
        "help\n\ncalc 2 + 3 * 4\nwrite \"{file}\" \"Hello, World!\"\nread \"{file}\"\n\
         calc 1 / 0\ntools\nbogus\nquit\ncalc 9 * 9\n"
    );

    let mut out = Vec::new();
    repl::run(&session, input.as_bytes(), &mut out).await.unwrap();
    let out = String::from_utf8(out).unwrap();

    assert!(out.contains("=== Available Commands ==="));
    assert!(out.contains("Result: 2 + 3 * 4 = 14"));
    assert!(out.contains("Successfully wrote 13 characters"));
    assert!(out.contains("Hello, World!"));
    assert!(out.contains("Error: calculation error: division by zero"));
    assert!(out.contains("• echo: Return the given text unchanged"));
    assert!(out.contains("Unknown command: bogus"));
    // Nothing after quit is executed.
    assert!(!out.contains("= 81"));

    assert_eq!(
        std::fs::read_to_string(dir.path().join("hello.txt")).unwrap(),
        "Hello, World!"
    );

    session.shutdown().await;
}

#[tokio::test]
async fn test_repl_stops_at_end_of_input() {
    let session = connect(&ServerConfig::default()).await;

    let mut out = Vec::new();
    repl::run(&session, &b"calc sqrt(16)\n"[..], &mut out)
        .await
        .unwrap();
    let out = String::from_utf8(out).unwrap();
    assert!(out.contains("Result: sqrt(16) = 4"));

    session.shutdown().await;
}

#[tokio::test]
async fn test_repl_reports_usage() {
    let session = connect(&ServerConfig::default()).await;

    let mut out = Vec::new();
    repl::run(&session, &b"calc\nread\nwrite only-path\n"[..], &mut out)
        .await
        .unwrap();
    let out = String::from_utf8(out).unwrap();
    assert!(out.contains("Usage: calc <expression>"));
    assert!(out.contains("Usage: read <filepath>"));
    assert!(out.contains("Usage: write <filepath> <content>"));

    session.shutdown().await;
}

#[tokio::test]
async fn test_repl_ends_when_session_closes() {
    let session = connect(&ServerConfig::default()).await;
    session.shutdown().await;

    let mut out = Vec::new();
    let err = repl::run(&session, &b"calc 1 + 1\ncalc 2 + 2\n"[..], &mut out)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CliError::Session(SessionError::Closed {
            reason: CloseReason::Shutdown
        })
    ));

    let out = String::from_utf8(out).unwrap();
    assert!(out.contains("Session closed: "));
    assert!(!out.contains("2 + 2"));
}

// =============================================================================
// Demo
// =============================================================================

#[tokio::test]
async fn test_demo_runs_every_step() {
    let dir = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        allowed_paths: vec![dir.path().to_path_buf()],
        ..ServerConfig::default()
    };
    let session = connect(&config).await;

    let root = dir.path().to_string_lossy().into_owned();
    let mut out = Vec::new();
    demo::run(&session, &root, &mut out).await.unwrap();
    let out = String::from_utf8(out).unwrap();

    assert!(out.contains("=== MCP Client Demo ==="));
    assert!(out.contains("2 + 3 * 4 = Result: 2 + 3 * 4 = 14"));
    assert!(out.contains("sqrt(16) = Result: sqrt(16) = 4"));
    assert!(out.contains("sin(pi/2) = Result: sin(pi/2) = 1"));
    assert!(out.contains("Current directory contents:"));
    assert!(out.contains("Write result: Successfully wrote"));
    assert!(out.contains("Read result: Contents of"));
    assert!(out.trim_end().ends_with("Demo completed!"));

    let written = std::fs::read_to_string(dir.path().join(demo::DEMO_FILE)).unwrap();
    assert_eq!(written, demo::DEMO_CONTENT);

    session.shutdown().await;
}

#[tokio::test]
async fn test_demo_fails_on_closed_session() {
    let session = connect(&ServerConfig::default()).await;
    session.shutdown().await;

    let mut out = Vec::new();
    let err = demo::run(&session, ".", &mut out).await.unwrap_err();
    assert!(matches!(err, CliError::Session(SessionError::Closed { .. })));
}
