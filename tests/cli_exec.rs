// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn pathmutex(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("pathmutex").unwrap();
    cmd.env("PATHMUTEX_HOME", home.path())
        .env("PATHMUTEX_LOCKING__LOCK_DIR", home.path().join("locks"))
        .env_remove("PATHMUTEX_LOCKING__DEADLINE")
        .env_remove("PATHMUTEX_LOCKING__MODE");
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    let home = TempDir::new().unwrap();
    pathmutex(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("exec"))
        .stdout(contains("identity"))
        .stdout(contains("purge"));
}

#[test]
fn test_identity_replaces_separators() {
    let home = TempDir::new().unwrap();
    pathmutex(&home)
        .args(["identity", "/var/cache/packages/x.lock"])
        .assert()
        .success()
        .stdout("pathmutex__var_cache_packages_x.lock\n");

    pathmutex(&home)
        .args(["identity", "C:\\cache\\x.lock"])
        .assert()
        .success()
        .stdout("pathmutex_C:_cache_x.lock\n");
}

#[test]
fn test_exec_requires_command() {
    let home = TempDir::new().unwrap();
    pathmutex(&home)
        .args(["exec", "/tmp/x.lock"])
        .assert()
        .failure();
}

#[test]
fn test_invalid_mode_rejected() {
    let home = TempDir::new().unwrap();
    pathmutex(&home)
        .args(["exec", "--mode", "telepathy", "/tmp/x.lock", "--", "true"])
        .assert()
        .failure()
        .stderr(contains("unknown locking mode"));
}

#[test]
fn test_invalid_config_file_reports_config_error() {
    let home = TempDir::new().unwrap();
    std::fs::write(
        home.path().join("config.toml"),
        "[locking]\nwait_timeout_secs = 0\n",
    )
    .unwrap();

    pathmutex(&home)
        .args(["identity", "/x"])
        .assert()
        .code(2)
        .stderr(contains("wait_timeout_secs"));
}

#[cfg(unix)]
mod unix {
    use super::*;
    use pathmutex::config::{LockingConfig, LockingMode};
    use pathmutex::locking::PathLockController;
    use serial_test::serial;
    use std::fs;
    use std::process::{Child, Stdio};

    fn target(home: &TempDir) -> String {
        home.path().join("shared.db").to_string_lossy().into_owned()
    }

    #[test]
    #[serial]
    fn test_exec_reports_created_new_to_child() {
        let home = TempDir::new().unwrap();
        let path = target(&home);

        for expected in ["1\n", "0\n"] {
            pathmutex(&home)
                .args(["exec", "--mode", "advisory", &path, "--"])
                .args(["sh", "-c", "echo $PATHMUTEX_CREATED_NEW"])
                .assert()
                .success()
                .stdout(expected);
        }
    }

    #[test]
    #[serial]
    fn test_exec_propagates_child_exit_code() {
        let home = TempDir::new().unwrap();
        pathmutex(&home)
            .args(["exec", "--mode", "advisory", &target(&home), "--"])
            .args(["sh", "-c", "exit 7"])
            .assert()
            .code(7);
    }

    #[test]
    #[serial]
    fn test_exec_missing_program_exits_127() {
        let home = TempDir::new().unwrap();
        pathmutex(&home)
            .args(["exec", "--mode", "advisory", &target(&home), "--"])
            .arg("pathmutex-no-such-program")
            .assert()
            .code(127)
            .stderr(contains("Command failed"));
    }

    #[test]
    #[serial]
    fn test_exec_deadline_exceeded_while_held_by_other_process() {
        let home = TempDir::new().unwrap();
        let path = target(&home);
        let config = LockingConfig {
            mode: LockingMode::Advisory,
            lock_dir: Some(home.path().join("locks")),
            ..LockingConfig::default()
        };
        let controller = PathLockController::new(&config).unwrap();
        let _holder = controller.acquire(&path).unwrap();

        pathmutex(&home)
            .args(["exec", "--mode", "advisory", "--deadline", "1", &path, "--"])
            .arg("true")
            .assert()
            .code(124)
            .stderr(contains("was not acquired within 1s"))
            .stderr(contains("--deadline"));
    }

    fn spawn_writer(home: &TempDir, mode: &str, path: &str, log: &str, name: &str) -> Child {
        let script = format!(
            "echo {name}-start >> '{log}'; sleep 0.3; echo {name}-end >> '{log}'"
        );
        std::process::Command::new(assert_cmd::cargo::cargo_bin("pathmutex"))
            .env("PATHMUTEX_HOME", home.path())
            .env("PATHMUTEX_LOCKING__LOCK_DIR", home.path().join("locks"))
            .args(["exec", "--mode", mode, path, "--", "sh", "-c", &script])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap()
    }

    fn assert_processes_serialize(mode: &str, path: &str) {
        let home = TempDir::new().unwrap();
        let log = home.path().join("order.log");
        let log = log.to_string_lossy();

        let children: Vec<Child> = ["a", "b", "c"]
            .iter()
            .map(|name| spawn_writer(&home, mode, path, &log, name))
            .collect();
        for mut child in children {
            assert!(child.wait().unwrap().success());
        }

        let contents = fs::read_to_string(&*log).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 6, "{contents}");
        for pair in lines.chunks(2) {
            let name = pair[0].trim_end_matches("-start");
            assert!(pair[0].ends_with("-start"), "{contents}");
            assert_eq!(pair[1], format!("{name}-end"), "{contents}");
        }
    }

    #[test]
    #[serial]
    fn test_processes_serialize_with_advisory_locks() {
        let home = TempDir::new().unwrap();
        assert_processes_serialize("advisory", &target(&home));
    }

    #[cfg(target_os = "linux")]
    #[test]
    #[serial]
    fn test_processes_serialize_with_named_semaphores() {
        let home = TempDir::new().unwrap();
        let path = format!("/tmp/pathmutex-cli/{}", uuid::Uuid::new_v4());
        assert_processes_serialize("semaphore", &path);

        pathmutex(&home)
            .args(["purge", "--mode", "semaphore", &path])
            .assert()
            .success()
            .stdout(contains("Removed 1 lock object(s)"));
    }

    fn kill_holder(home: &TempDir, mode: Option<&str>, path: &str) {
        let mut cmd = std::process::Command::new(assert_cmd::cargo::cargo_bin("pathmutex"));
        cmd.env("PATHMUTEX_HOME", home.path())
            .env("PATHMUTEX_LOCKING__LOCK_DIR", home.path().join("locks"))
            .env_remove("PATHMUTEX_LOCKING__MODE")
            .arg("exec");
        if let Some(mode) = mode {
            cmd.args(["--mode", mode]);
        }
        let mut holder = cmd
            .args([path, "--", "sleep", "30"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();

        std::thread::sleep(std::time::Duration::from_millis(700));
        // SIGKILL: the holder gets no chance to release.
        holder.kill().unwrap();
        holder.wait().unwrap();
    }

    #[test]
    #[serial]
    fn test_default_mode_recovers_after_holder_is_killed() {
        let home = TempDir::new().unwrap();
        let path = target(&home);
        kill_holder(&home, None, &path);

        pathmutex(&home)
            .args(["exec", "--wait-timeout", "1", "--deadline", "3", &path, "--"])
            .args(["sh", "-c", "echo recovered"])
            .assert()
            .success()
            .stdout("recovered\n");
    }

    #[test]
    #[serial]
    fn test_advisory_mode_recovers_after_holder_is_killed() {
        let home = TempDir::new().unwrap();
        let path = target(&home);
        kill_holder(&home, Some("advisory"), &path);

        pathmutex(&home)
            .args(["exec", "--mode", "advisory", "--deadline", "3", &path, "--", "true"])
            .assert()
            .success();
    }

    #[test]
    #[serial]
    fn test_purge_removes_advisory_lock_file() {
        let home = TempDir::new().unwrap();
        let path = target(&home);
        pathmutex(&home)
            .args(["exec", "--mode", "advisory", &path, "--", "true"])
            .assert()
            .success();

        let locks = home.path().join("locks");
        assert_eq!(fs::read_dir(&locks).unwrap().count(), 1);

        pathmutex(&home)
            .args(["purge", "--mode", "advisory", &path])
            .assert()
            .success()
            .stdout(contains("Removed 1 lock object(s)"));
        assert!(fs::read_dir(&locks).unwrap().next().is_none());

        pathmutex(&home)
            .args(["purge", "--mode", "advisory", &path])
            .assert()
            .success()
            .stdout(contains("1 not present").and(contains("Removed 0")));
    }
}
