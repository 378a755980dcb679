//! Runs the built binaries as child processes.
//!
//! Run with: `cargo test -p compass-cli --test binaries`

use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

/// A command with configuration isolated from the user's environment.
fn isolated(program: &str, config_dir: &Path) -> Command {
    let mut cmd = Command::new(program);
    cmd.env("COMPASS_CONFIG_DIR", config_dir)
        .env_remove("COMPASS_VERSION")
        .env_remove("COMPASS_TOOL_TIMEOUT_MS")
        .env_remove("COMPASS_LOG")
        .env_remove("RUST_LOG");
    cmd
}

fn wait_for_exit(child: &mut Child, limit: Duration) -> Option<ExitStatus> {
    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait().unwrap() {
            return Some(status);
        }
        if Instant::now() >= deadline {
            return None;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn demo_client_prints_each_call() {
    let dir = tempfile::tempdir().unwrap();
    let output = isolated(env!("CARGO_BIN_EXE_compass-client"), dir.path())
        .args(["--server", env!("CARGO_BIN_EXE_compass-protocol"), "--name", "Bob"])
        .env("COMPASS_VERSION", "7.7.7")
        .stdin(Stdio::null())
        .output()
        .unwrap();

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(
        String::from_utf8(output.stdout).unwrap(),
        "Connecting to Compass Protocol MCP Server...\n\
         Connected successfully!\n\
         \n\
         Calling 'version' tool...\n\
         \x20 Response: Compass Protocol MCP Server version: 7.7.7\n\
         \n\
         Calling 'ping' tool...\n\
         \x20 Response: pong\n\
         \n\
         Calling 'greet' tool with name 'Bob'...\n\
         \x20 Response: Hello, Bob! Welcome to Compass Protocol MCP Server.\n\
         \n\
         All tool calls completed successfully!\n"
    );
}

#[test]
fn client_fails_when_server_is_missing() {
    let dir = tempfile::tempdir().unwrap();
    let output = isolated(env!("CARGO_BIN_EXE_compass-client"), dir.path())
        .args(["--server", "compass-no-such-server-binary"])
        .stdin(Stdio::null())
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(
        String::from_utf8_lossy(&output.stderr).contains("compass-no-such-server-binary")
    );
}

#[test]
fn server_exits_zero_when_input_ends() {
    let dir = tempfile::tempdir().unwrap();
    let mut child = isolated(env!("CARGO_BIN_EXE_compass-protocol"), dir.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    drop(child.stdin.take());

    let status = wait_for_exit(&mut child, Duration::from_secs(5));
    if status.is_none() {
        let _ = child.kill();
    }
    assert!(status.expect("server must exit at end of input").success());
}

#[test]
fn server_exits_non_zero_on_corrupt_input() {
    let dir = tempfile::tempdir().unwrap();
    let mut child = isolated(env!("CARGO_BIN_EXE_compass-protocol"), dir.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    {
        use std::io::Write;
        let mut stdin = child.stdin.take().unwrap();
        stdin.write_all(b"{not json\n").unwrap();
    }

    let status = wait_for_exit(&mut child, Duration::from_secs(5));
    if status.is_none() {
        let _ = child.kill();
    }
    assert!(!status.expect("server must exit on corrupt input").success());
}

#[cfg(unix)]
#[test]
fn server_exits_zero_on_interrupt_while_stdin_is_open() {
    use std::io::{BufRead, BufReader, Write};

    let dir = tempfile::tempdir().unwrap();
    let mut child = isolated(env!("CARGO_BIN_EXE_compass-protocol"), dir.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    let mut stdin = child.stdin.take().unwrap();
    let mut stdout = BufReader::new(child.stdout.take().unwrap());

    // Once a request is answered the interrupt handler is in place
    stdin
        .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n")
        .unwrap();
    stdin.flush().unwrap();
    let mut line = String::new();
    stdout.read_line(&mut line).unwrap();
    assert!(line.contains("\"id\":1"), "unexpected response: {line}");

    let signalled = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(signalled.success());

    let status = wait_for_exit(&mut child, Duration::from_secs(5));
    if status.is_none() {
        let _ = child.kill();
    }
    let status = status.expect("server must exit after an interrupt");
    assert!(status.success(), "exit status: {status:?}");
    drop(stdin);
}
