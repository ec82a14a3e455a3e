//! End-to-end scenarios against the local backend, grounded on the literal
//! scenarios and testable properties this crate's process-execution model is
//! specified against. Scenarios already covered by `src/local/mod.rs`'s own
//! `#[cfg(test)]` module (basic capture, signal delivery, PID reporting,
//! idempotence, nonexistent program/cwd) are not repeated here.

use std::io::Write;
use std::os::unix::fs::PermissionsExt;

use dualshell::process::Process;
use dualshell::{CommandSpec, Error, Shell};

#[test]
fn encoding_utf8_decodes_result_fields() {
    let shell = Shell::local();
    let result = shell
        .run(CommandSpec::new(["echo", "-n", "hello"]).encoding_utf8(true))
        .unwrap();
    assert!(result.output.is_text());
    assert_eq!(result.output.as_bytes(), b"hello");
}

#[test]
fn cwd_is_honored() {
    let shell = Shell::local();
    let result = shell.run(CommandSpec::new(["pwd"]).cwd("/")).unwrap();
    assert_eq!(result.output.as_bytes(), b"/\n");
}

#[test]
fn cwd_without_execute_permission_raises_could_not_change_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o600)).unwrap();

    let shell = Shell::local();
    let err = shell.run(CommandSpec::new(["echo", "1"]).cwd(dir.path())).unwrap_err();
    match err {
        Error::CouldNotChangeDirectory { directory, .. } => assert_eq!(directory, dir.path()),
        other => panic!("expected CouldNotChangeDirectory, got {other:?}"),
    }

    std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o700)).unwrap();
}

#[test]
fn cwd_precedence_wins_when_both_are_nonexistent() {
    let shell = Shell::local();
    let err = shell
        .run(CommandSpec::new(["i-am-not-a-command"]).cwd("/some/silly/path"))
        .unwrap_err();
    assert!(matches!(err, Error::CouldNotChangeDirectory { .. }));
}

#[test]
fn pty_reports_a_tty_and_merges_stderr_into_stdout() {
    let shell = Shell::local();
    let result = shell
        .run(CommandSpec::new(["bash", "-c", "[ -t 0 ]"]).use_pty(true))
        .unwrap();
    assert_eq!(result.return_code, 0);
    assert_eq!(result.stderr_output.as_bytes(), b"");
}

#[test]
fn pty_echoes_stdin_back_on_stdout() {
    let shell = Shell::local();
    let mut process = shell
        .spawn(CommandSpec::new(["cat"]).use_pty(true))
        .unwrap();
    process.stdin_write(b"hello\n").unwrap();
    process.send_signal("TERM").unwrap();
    let result = process.wait_for_result().unwrap();
    assert_eq!(result.output.as_bytes(), b"hello\r\nhello\r\n");
}

#[test]
fn streaming_sink_sees_bytes_while_child_still_running() {
    let (reader, writer) = std::os::unix::net::UnixStream::pair().unwrap();
    let shell = Shell::local();
    let mut process = shell
        .spawn(
            CommandSpec::new(["sh", "-c", "echo hello; sleep 5"])
                .stdout_sink(writer),
        )
        .unwrap();

    let mut reader = reader;
    let mut buf = [0u8; 6];
    std::io::Read::read_exact(&mut reader, &mut buf).unwrap();
    assert_eq!(&buf, b"hello\n");
    assert!(process.is_running().unwrap());

    process.send_signal("KILL").unwrap();
    let _ = process.wait_for_result();
}

#[test]
fn run_after_close_raises() {
    let shell = Shell::local();
    shell.close();
    assert!(shell.is_closed());
    let err = shell.run(CommandSpec::new(["true"])).unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn files_copy_file_round_trips() {
    let src_dir = tempfile::tempdir().unwrap();
    let dst_dir = tempfile::tempdir().unwrap();
    let src_path = src_dir.path().join("source.txt");
    std::fs::File::create(&src_path).unwrap().write_all(b"payload").unwrap();

    let shell = Shell::local();
    shell.files().copy_file(&src_path, dst_dir.path()).unwrap();

    let copied = std::fs::read(dst_dir.path().join("source.txt")).unwrap();
    assert_eq!(copied, b"payload");
}

#[test]
fn files_write_file_creates_contents() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("written.txt");

    let shell = Shell::local();
    shell.files().write_file(&path, b"new contents").unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), b"new contents");
}

#[test]
fn temporary_dir_is_removed_on_drop() {
    let shell = Shell::local();
    let path = {
        let guard = shell.temporary_dir().unwrap();
        let path = guard.path().to_string();
        assert!(std::path::Path::new(&path).is_dir());
        path
    };
    assert!(!std::path::Path::new(&path).exists());
}
