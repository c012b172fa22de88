// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the file-operation translator.
//!
//! Every test drives the translator against a scripted transport and checks
//! the exact command vectors it issues.

mod common;

use common::{argv, stat_report, target, Reply, ScriptedTransport};
use podgate_core::application::{FileOpError, FileOperationTranslator, RemoteCommandChannel};
use podgate_core::domain::attributes::FileType;
use podgate_core::domain::exec::ExecError;
use podgate_core::domain::file_request::{FileCommand, OpenFlags, SetAttributes};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn translator(transport: &Arc<ScriptedTransport>) -> FileOperationTranslator {
    FileOperationTranslator::new(RemoteCommandChannel::new(transport.clone()), target())
}

/// A tiny remote filesystem: `/data` holds three files, everything else is
/// a regular file.
fn tree_script(cmd: &[String]) -> Reply {
    match cmd[0].as_str() {
        "ls" => Reply::stdout("a.txt\nb.txt\nc.txt\n"),
        "stat" => {
            let path = &cmd[3];
            if path == "/data" {
                Reply::stdout(stat_report(path, 4096, "41ed", 1_700_000_000))
            } else {
                Reply::stdout(stat_report(path, 12, "81a4", 1_700_000_100))
            }
        }
        _ => Reply::ok(),
    }
}

#[tokio::test]
async fn test_read_spools_cat_output() {
    let transport = ScriptedTransport::always(Reply::stdout("node-1\n"));
    let translator = translator(&transport);

    let spooled = translator
        .read("/etc/hostname", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(spooled.len(), 7);
    let mut buf = [0u8; 16];
    let n = spooled.read_at(&mut buf, 0).await.unwrap();
    assert_eq!(&buf[..n], b"node-1\n");

    // Random-access re-reads never go back to the remote.
    let n = spooled.read_at(&mut buf, 5).await.unwrap();
    assert_eq!(&buf[..n], b"1\n");
    assert_eq!(transport.commands(), vec![argv(&["cat", "/etc/hostname"])]);
}

#[tokio::test]
async fn test_cancelled_read_deletes_spool_promptly() {
    let spool_dir = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::always(Reply::Hang {
        stdout: b"partial".to_vec(),
    });
    let translator = translator(&transport).with_spool_dir(spool_dir.path());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        translator.read("/var/log/huge.log", &cancel),
    )
    .await
    .expect("cancelled read must return promptly");

    assert!(matches!(result, Err(FileOpError::Exec(ExecError::Cancelled))));
    assert_eq!(std::fs::read_dir(spool_dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_read_without_spool_space_issues_no_command() {
    let transport = ScriptedTransport::always(Reply::ok());
    let translator = translator(&transport).with_spool_dir("/nonexistent/podgate/spool");

    let err = translator
        .read("/etc/hostname", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, FileOpError::Spool(_)));
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn test_open_prefix_commands() {
    let cases = [
        (true, true, Some(argv(&["truncate", "/f"]))),
        (true, false, Some(argv(&["truncate", "-c", "/f"]))),
        (false, true, Some(argv(&["touch", "/f"]))),
        (false, false, None),
    ];

    for (truncate, create, expected) in cases {
        let transport = ScriptedTransport::always(Reply::ok());
        let flags = OpenFlags {
            write: true,
            truncate,
            create,
            ..Default::default()
        };

        translator(&transport)
            .open_writer("/f", flags, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            transport.commands(),
            expected.into_iter().collect::<Vec<_>>(),
            "truncate={truncate} create={create}"
        );
    }
}

#[tokio::test]
async fn test_append_writes_ignore_offset() {
    let transport = ScriptedTransport::always(Reply::ok());
    let flags = OpenFlags {
        write: true,
        append: true,
        ..Default::default()
    };
    let writer = translator(&transport)
        .open_writer("/var/log/app.log", flags, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(writer.write_at(b"line 1\n", 0).await.unwrap(), 7);
    assert_eq!(writer.write_at(b"line 2\n", 4096).await.unwrap(), 7);

    let calls = transport.calls();
    let append = argv(&["dd", "bs=1", "conv=nocreat", "oflag=append", "of=/var/log/app.log"]);
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].command, append);
    assert_eq!(calls[1].command, append);
    assert_eq!(calls[0].stdin, b"line 1\n");
    assert_eq!(calls[1].stdin, b"line 2\n");
}

#[tokio::test]
async fn test_positional_writes_use_exact_offset() {
    let transport = ScriptedTransport::always(Reply::ok());
    let flags = OpenFlags {
        write: true,
        ..Default::default()
    };
    let writer = translator(&transport)
        .open_writer("/srv/blob", flags, &CancellationToken::new())
        .await
        .unwrap();

    writer.write_at(b"abc", 32768).await.unwrap();

    let calls = transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].command,
        argv(&["dd", "bs=1", "seek=32768", "conv=nocreat", "of=/srv/blob"])
    );
    assert_eq!(calls[0].stdin, b"abc");
}

#[tokio::test]
async fn test_failed_write_names_operation() {
    let transport = ScriptedTransport::new(|cmd| match cmd[0].as_str() {
        "dd" => Reply::exit(1, "dd: /ro/file: Read-only file system"),
        _ => Reply::ok(),
    });
    let writer = translator(&transport)
        .open_writer("/ro/file", OpenFlags { write: true, ..Default::default() }, &CancellationToken::new())
        .await
        .unwrap();

    let err = writer.write_at(b"x", 0).await.unwrap_err();
    assert!(matches!(err, FileOpError::Remote { operation: "write", .. }));
    assert!(err.to_string().starts_with("write failed"));
    assert!(err.to_string().contains("Read-only file system"));
}

#[tokio::test]
async fn test_setstat_size_only() {
    let transport = ScriptedTransport::always(Reply::ok());
    let attrs = SetAttributes {
        size: Some(1024),
        ..Default::default()
    };

    translator(&transport)
        .command("/srv/blob", &FileCommand::Setstat(attrs), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        transport.commands(),
        vec![argv(&["truncate", "-c", "-s", "1024", "/srv/blob"])]
    );
}

#[tokio::test]
async fn test_setstat_runs_steps_in_order() {
    let transport = ScriptedTransport::always(Reply::ok());
    let attrs = SetAttributes {
        size: Some(0),
        // 2023-11-14 22:13:20 UTC
        mtime: Some(1_700_000_000),
        permissions: Some(0o100644),
        uid_gid: Some((1000, 1000)),
    };

    translator(&transport)
        .command("/srv/blob", &FileCommand::Setstat(attrs), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        transport.commands(),
        vec![
            argv(&["truncate", "-c", "-s", "0", "/srv/blob"]),
            argv(&["touch", "-c", "-m", "-t", "202311142213.20", "/srv/blob"]),
            argv(&["chmod", "644", "/srv/blob"]),
            argv(&["chown", "1000:1000", "/srv/blob"]),
        ]
    );
}

#[tokio::test]
async fn test_setstat_mtime_uses_remote_clock_offset() {
    let transport = ScriptedTransport::always(Reply::ok());
    let attrs = SetAttributes {
        mtime: Some(1_700_000_000),
        ..Default::default()
    };
    let offset = chrono::FixedOffset::east_opt(2 * 3600).unwrap();

    translator(&transport)
        .with_remote_offset(offset)
        .command("/srv/blob", &FileCommand::Setstat(attrs), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        transport.commands(),
        vec![argv(&["touch", "-c", "-m", "-t", "202311150013.20", "/srv/blob"])]
    );
}

#[tokio::test]
async fn test_setstat_aborts_at_first_failure() {
    let transport = ScriptedTransport::new(|cmd| match cmd[0].as_str() {
        "chmod" => Reply::exit(1, "chmod: changing permissions of '/srv/blob': Operation not permitted"),
        _ => Reply::ok(),
    });
    let attrs = SetAttributes {
        size: Some(10),
        permissions: Some(0o600),
        uid_gid: Some((0, 0)),
        ..Default::default()
    };

    let err = translator(&transport)
        .command("/srv/blob", &FileCommand::Setstat(attrs), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("Operation not permitted"));
    let programs: Vec<String> = transport.commands().into_iter().map(|c| c[0].clone()).collect();
    assert_eq!(programs, vec!["truncate", "chmod"]);
}

#[tokio::test]
async fn test_directory_commands() {
    let transport = ScriptedTransport::always(Reply::ok());
    let translator = translator(&transport);
    let cancel = CancellationToken::new();

    translator.command("/tmp/new", &FileCommand::Mkdir, &cancel).await.unwrap();
    translator.command("/tmp/old.txt", &FileCommand::Remove, &cancel).await.unwrap();
    translator.command("/tmp/new", &FileCommand::Rmdir, &cancel).await.unwrap();

    assert_eq!(
        transport.commands(),
        vec![
            argv(&["mkdir", "/tmp/new"]),
            argv(&["rm", "/tmp/old.txt"]),
            argv(&["rmdir", "/tmp/new"]),
        ]
    );
}

#[tokio::test]
async fn test_rename_is_unsupported_without_remote_command() {
    let transport = ScriptedTransport::always(Reply::ok());

    let err = translator(&transport)
        .command(
            "/a",
            &FileCommand::Rename {
                target: "/b".to_string(),
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, FileOpError::Unsupported("Rename")));
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn test_stat_decodes_attributes() {
    let transport = ScriptedTransport::new(tree_script);

    let attrs = translator(&transport)
        .stat("/data", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(attrs.name, "data");
    assert_eq!(attrs.size, 4096);
    assert!(attrs.is_dir);
    assert_eq!(attrs.mode.file_type, FileType::Directory);
    assert_eq!(attrs.mode.to_unix(), 0o40755);
    assert_eq!(
        transport.commands(),
        vec![argv(&["stat", "-c", podgate_core::domain::attributes::STAT_FORMAT, "/data"])]
    );
}

#[tokio::test]
async fn test_stat_rejects_garbage_output() {
    let transport = ScriptedTransport::always(Reply::stdout("not a stat report"));

    let err = translator(&transport)
        .stat("/etc/passwd", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, FileOpError::Decode { .. }));
}

#[tokio::test]
async fn test_list_directory_stats_each_entry() {
    let transport = ScriptedTransport::new(tree_script);
    let lister = translator(&transport)
        .list("/data", &CancellationToken::new())
        .await
        .unwrap();

    let entries = lister.list_at(0, 100).await.unwrap();
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);

    let commands = transport.commands();
    assert_eq!(commands.iter().filter(|c| c[0] == "ls").count(), 1);
    let entry_stats: Vec<&str> = commands
        .iter()
        .filter(|c| c[0] == "stat" && c[3] != "/data")
        .map(|c| c[3].as_str())
        .collect();
    assert_eq!(entry_stats, vec!["/data/a.txt", "/data/b.txt", "/data/c.txt"]);
}

#[tokio::test]
async fn test_list_directory_resolves_page_by_page() {
    let transport = ScriptedTransport::new(tree_script);
    let lister = translator(&transport)
        .list("/data", &CancellationToken::new())
        .await
        .unwrap();
    let before = transport.calls().len();

    let first = lister.list_at(0, 2).await.unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(transport.calls().len(), before + 2);

    let second = lister.list_at(2, 2).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].name, "c.txt");

    assert!(lister.list_at(3, 2).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_list_file_yields_single_entry_without_ls() {
    let transport = ScriptedTransport::new(tree_script);
    let lister = translator(&transport)
        .list("/data/a.txt", &CancellationToken::new())
        .await
        .unwrap();

    let entries = lister.list_at(0, 100).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "a.txt");
    assert!(lister.list_at(1, 100).await.unwrap().is_empty());
    assert!(transport.commands().iter().all(|c| c[0] != "ls"));
}
