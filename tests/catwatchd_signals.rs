#![cfg(unix)]

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use tempfile::TempDir;

fn spawn_daemon(dir: &TempDir) -> Child {
    Command::new(env!("CARGO_BIN_EXE_catwatchd"))
        .env_clear()
        .env("RUST_LOG", "info")
        .env("CATWATCH_DEVICE", "stub://signals")
        .env("CATWATCH_MODEL_PATH", "stub")
        .env("CATWATCH_POLL_INTERVAL_SECS", "1")
        .env("CATWATCH_SNAPSHOT_PATH", dir.path().join("motion_detected.jpg"))
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn catwatchd")
}

/// Send `signal` once the daemon is polling; return its exit status and log.
fn signal_and_collect(signal: &str) -> (std::process::ExitStatus, String) {
    let dir = TempDir::new().expect("temp dir");
    let mut child = spawn_daemon(&dir);
    std::thread::sleep(Duration::from_millis(1500));

    let sent = Command::new("kill")
        .arg(format!("-{}", signal))
        .arg(child.id().to_string())
        .status()
        .expect("run kill");
    assert!(sent.success(), "kill -{} failed", signal);

    let deadline = Instant::now() + Duration::from_secs(10);
    let status = loop {
        if let Some(status) = child.try_wait().expect("wait for catwatchd") {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            panic!("catwatchd did not exit after SIG{}", signal);
        }
        std::thread::sleep(Duration::from_millis(50));
    };

    let mut log = String::new();
    if let Some(mut stderr) = child.stderr.take() {
        stderr.read_to_string(&mut log).expect("read stderr");
    }
    (status, log)
}

#[test]
fn sigterm_stops_the_source_and_exits_cleanly() {
    let (status, log) = signal_and_collect("TERM");
    assert!(status.success(), "exit status {:?}, log:\n{}", status, log);
    assert!(log.contains("SyntheticSource: stopped stub://signals"), "log:\n{}", log);
    assert!(log.contains("shutdown complete"), "log:\n{}", log);
}

#[test]
fn sigint_stops_the_source_and_exits_cleanly() {
    let (status, log) = signal_and_collect("INT");
    assert!(status.success(), "exit status {:?}, log:\n{}", status, log);
    assert!(log.contains("SyntheticSource: stopped stub://signals"), "log:\n{}", log);
    assert!(log.contains("shutdown complete"), "log:\n{}", log);
}
