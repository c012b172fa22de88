// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for interactive shell and exec sessions.

mod common;

use common::{argv, target, Reply, ScriptedTransport};
use podgate_core::application::{InteractiveSessionHandler, RemoteCommandChannel, TerminalSession};
use podgate_core::domain::target::CommandVector;
use podgate_core::domain::terminal::{ResizeSequence, WindowSize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn handler(transport: &Arc<ScriptedTransport>) -> InteractiveSessionHandler {
    InteractiveSessionHandler::new(
        RemoteCommandChannel::new(transport.clone()),
        CommandVector::new(["sh"]),
    )
}

struct Captured {
    code: i32,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

async fn run_session(
    transport: &Arc<ScriptedTransport>,
    command: Option<Vec<String>>,
    pty: Option<ResizeSequence>,
    stdin: &[u8],
) -> Captured {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let session = TerminalSession {
        command,
        pty,
        stdin: Box::new(stdin),
        stdout: Box::new(&mut stdout),
        stderr: Box::new(&mut stderr),
    };
    let code = handler(transport)
        .run(&target(), session, &CancellationToken::new())
        .await;
    Captured {
        code,
        stdout,
        stderr,
    }
}

#[tokio::test]
async fn test_clean_exit_reports_zero() {
    let transport = ScriptedTransport::always(Reply::stdout("hello\n"));

    let out = run_session(&transport, Some(argv(&["echo", "hello"])), None, b"").await;

    assert_eq!(out.code, 0);
    assert_eq!(out.stdout, b"hello\n");
    assert_eq!(transport.commands(), vec![argv(&["echo", "hello"])]);
}

#[tokio::test]
async fn test_default_shell_without_command() {
    let transport = ScriptedTransport::always(Reply::ok());

    run_session(&transport, None, None, b"exit\n").await;
    run_session(&transport, Some(Vec::new()), None, b"").await;

    let calls = transport.calls();
    assert_eq!(calls[0].command, argv(&["sh"]));
    assert_eq!(calls[0].stdin, b"exit\n");
    assert_eq!(calls[1].command, argv(&["sh"]));
}

#[tokio::test]
async fn test_remote_exit_code_becomes_session_code() {
    let transport = ScriptedTransport::always(Reply::exit(3, "no such table"));

    let out = run_session(&transport, Some(argv(&["sqlite3", "db", ".dump t"])), None, b"").await;

    assert_eq!(out.code, 3);
    let message = String::from_utf8(out.stdout).unwrap();
    assert!(message.contains("command terminated with exit code 3"));
    // Without a pty the remote stderr goes straight to the session.
    assert_eq!(out.stderr, b"no such table");
}

#[tokio::test]
async fn test_transport_failure_exits_one() {
    let transport = ScriptedTransport::always(Reply::Fail("daemon unreachable".to_string()));

    let out = run_session(&transport, None, None, b"").await;

    assert_eq!(out.code, 1);
    let message = String::from_utf8(out.stdout).unwrap();
    assert!(message.contains("daemon unreachable"));
}

#[tokio::test]
async fn test_pty_session_merges_stderr_and_forwards_window() {
    let transport = ScriptedTransport::always(Reply::Exit {
        stdout: b"$ ".to_vec(),
        stderr: b"warning".to_vec(),
        code: 0,
    });
    let (_notifier, sizes) = ResizeSequence::channel(WindowSize::new(120, 40));

    let out = run_session(&transport, None, Some(sizes), b"").await;

    assert_eq!(out.code, 0);
    assert_eq!(out.stdout, b"$ warning");
    assert!(out.stderr.is_empty());

    let call = &transport.calls()[0];
    assert!(call.tty);
    assert!(!call.stderr_wired);
    assert_eq!(call.initial_window, Some(WindowSize::new(120, 40)));
}

#[tokio::test]
async fn test_plain_session_wires_stderr() {
    let transport = ScriptedTransport::always(Reply::ok());

    run_session(&transport, Some(argv(&["ls"])), None, b"").await;

    let call = &transport.calls()[0];
    assert!(!call.tty);
    assert!(call.stderr_wired);
    assert!(call.stdout_wired);
}
