//! Tests driving the notify-relay binary

mod common;

use assert_cmd::cargo::CommandCargoExt;
use common::{free_port, test_config, TestCommand};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn write_config(dir: &Path, port: u16) -> std::path::PathBuf {
    let config = test_config(dir, port);
    let path = dir.join("relay.toml");
    std::fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();
    path
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    condition()
}

#[test]
fn test_help_lists_commands() {
    TestCommand::new()
        .arg("--help")
        .expect_success()
        .stdout_contains("daemon")
        .stdout_contains("send")
        .done();
}

#[test]
fn test_config_show_reflects_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("relay.toml");
    std::fs::write(&config_path, "[server]\nport = 9555\n\n[log]\nstrategy = \"lines\"\n").unwrap();

    TestCommand::new()
        .config(&config_path)
        .args(["config", "show"])
        .expect_success()
        .stdout_contains("port = 9555")
        .stdout_contains("strategy = \"lines\"")
        .done();
}

#[test]
fn test_init_creates_config_once() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("fresh").join("config.toml");

    TestCommand::new()
        .config(&config_path)
        .arg("init")
        .expect_success()
        .stdout_contains("Configuration initialized successfully")
        .done();
    assert!(config_path.exists());

    TestCommand::new()
        .config(&config_path)
        .arg("init")
        .expect_success()
        .stdout_contains("Use --force to overwrite")
        .done();
}

#[test]
fn test_send_without_server_fails_fast() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = write_config(temp_dir.path(), free_port());

    TestCommand::new()
        .config(&config_path)
        .args(["send", "--program", "svc-a", "--title", "nowhere to go"])
        .expect_failure()
        .stderr_contains("No relay server address configured")
        .done();
}

#[test]
fn test_status_when_not_running() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = write_config(temp_dir.path(), free_port());

    TestCommand::new()
        .config(&config_path)
        .args(["daemon", "status"])
        .expect_success()
        .stdout_contains("Relay daemon is not running")
        .done();
}

#[test]
fn test_daemon_lifecycle() {
    let temp_dir = TempDir::new().unwrap();
    let port = free_port();
    let config_path = write_config(temp_dir.path(), port);
    let pid_file = temp_dir.path().join("relay.pid");
    let address = format!("127.0.0.1:{port}");

    let mut daemon = Command::cargo_bin("notify-relay").unwrap();
    daemon
        .arg("--config")
        .arg(&config_path)
        .args(["daemon", "start"])
        .env_remove("NF_PORT")
        .env_remove("NF_PID_FILE")
        .env_remove("NF_LOG_FILE")
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    let mut child = daemon.spawn().unwrap();
    let daemon_pid = child.id();

    assert!(
        wait_until(Duration::from_secs(10), || pid_file.exists()
            && TcpStream::connect(&address).is_ok()),
        "relay never came up"
    );
    let recorded: u32 = std::fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
    assert_eq!(recorded, daemon_pid);

    TestCommand::new()
        .config(&config_path)
        .args(["daemon", "status"])
        .expect_success()
        .stdout_contains(format!("Relay daemon is running (PID: {daemon_pid})"))
        .done();

    TestCommand::new()
        .config(&config_path)
        .args(["daemon", "start"])
        .expect_failure()
        .stderr_contains("already running")
        .done();

    // send through the CLI client
    TestCommand::new()
        .config(&config_path)
        .args(["send", "-p", "svc-a", "-t", "disk full", "-l", "error", "--server"])
        .arg(&address)
        .expect_success()
        .stdout_contains("\"status\":\"success\"")
        .done();

    // and once more over a raw connection
    let mut stream = TcpStream::connect(&address).unwrap();
    stream
        .write_all(b"{\"program_name\":\"svc-b\",\"title\":\"raw line\"}\n")
        .unwrap();
    let mut reply = String::new();
    BufReader::new(stream).read_line(&mut reply).unwrap();
    assert!(reply.contains("\"status\":\"success\""));

    let log = std::fs::read_to_string(temp_dir.path().join("events.log")).unwrap();
    assert_eq!(log.lines().count(), 2);

    // reap the child concurrently so `stop` does not see a zombie
    let reaper = std::thread::spawn(move || child.wait().unwrap());
    TestCommand::new()
        .config(&config_path)
        .args(["daemon", "stop"])
        .expect_success()
        .stdout_contains("Relay daemon stopped")
        .done();

    let status = reaper.join().unwrap();
    assert!(status.success());
    assert!(!pid_file.exists());
    assert!(TcpStream::connect(&address).is_err());
}

#[test]
fn test_detached_startup_failure_is_logged() {
    let temp_dir = TempDir::new().unwrap();
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = occupied.local_addr().unwrap().port();
    let config_path = write_config(temp_dir.path(), port);

    // the invoking process exits before the relay tries to bind
    TestCommand::new()
        .config(&config_path)
        .args(["daemon", "start", "--detach"])
        .expect_success()
        .stdout_contains("notify-relay.log")
        .done();

    let logged_failure = || {
        std::fs::read_dir(temp_dir.path())
            .unwrap()
            .flatten()
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("notify-relay.log"))
            .any(|entry| {
                std::fs::read_to_string(entry.path())
                    .map(|content| content.contains("Failed to start relay"))
                    .unwrap_or(false)
            })
    };
    assert!(
        wait_until(Duration::from_secs(10), logged_failure),
        "bind failure never reached the diagnostic log"
    );
    assert!(!temp_dir.path().join("relay.pid").exists());
    drop(occupied);
}
