#![cfg(unix)]

use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tempfile::TempDir;

#[test]
fn sigterm_stops_run_cleanly() {
    let home = TempDir::new().unwrap();
    let mount = TempDir::new().unwrap();

    let mut child = Command::new(assert_cmd::cargo::cargo_bin("pharsync"))
        .arg("run")
        .arg("--mount-path")
        .arg(mount.path())
        .arg("--store-dir")
        .arg(home.path().join("store"))
        .env("HOME", home.path())
        .env("NO_COLOR", "1")
        .env_remove("PHARSYNC_MOUNT_PATH")
        .env_remove("PHARSYNC_STORE_DIR")
        .env_remove("RUST_LOG")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn pharsync run");

    let stdout = child.stdout.take().unwrap();
    let (line_tx, line_rx) = mpsc::channel();
    let reader = thread::spawn(move || {
        for line in BufReader::new(stdout).lines().map_while(Result::ok) {
            let _ = line_tx.send(line);
        }
    });

    // Wait for the initial pass so the daemon is in its steady loop.
    let mut log = Vec::new();
    loop {
        let line = line_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("daemon never reached steady state");
        let steady = line.contains("watching for changes");
        log.push(line);
        if steady {
            break;
        }
    }

    let killed = Command::new("kill")
        .args(["-TERM", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(killed.success());

    let status = child.wait().unwrap();
    reader.join().unwrap();
    log.extend(line_rx.try_iter());
    let log = log.join("\n");

    assert!(status.success(), "exit status {status:?}\n{log}");
    assert!(log.contains("received SIGTERM"), "{log}");
    assert!(log.contains("plugin reconciler stopped"), "{log}");
}
