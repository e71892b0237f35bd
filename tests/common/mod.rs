//! Stand-in container engine for tests
//!
//! The fake engine is a shell script. It appends each command line it's given
//! to a log. During `create` it copies the bind-mounted connection file aside
//! and records the mount source, so tests can check what the container would
//! have seen.

#![allow(dead_code)]

use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};
use tempfile::TempDir;

pub const FRONTEND_FILE: &str =
    r#"{"ip":"127.0.0.1","transport":"tcp","shell_port":5555,"iopub_port":5556,"key":"abc"}"#;

pub const PORT_CONFLICT: &str = "Error response from daemon: driver failed programming external connectivity on endpoint kernelpod-1: Bind for 127.0.0.1:5555 failed: port is already allocated";
pub const NO_SUCH_IMAGE: &str = "Error response from daemon: No such image: missing/image:latest";
pub const NO_DAEMON: &str = "Cannot connect to the Docker daemon at unix:///var/run/docker.sock. Is the docker daemon running?";

/// What the fake engine does for one subcommand
pub enum Behavior {
    Succeed(&'static str),
    Fail(&'static str),
}

impl Behavior {
    fn script(&self) -> String {
        match self {
            Behavior::Succeed(stdout) => format!("printf '%s\\n' '{}'; exit 0", stdout),
            Behavior::Fail(stderr) => format!("printf '%s\\n' '{}' >&2; exit 125", stderr),
        }
    }
}

pub struct FakeEngine {
    pub dir: TempDir,
    pub program: PathBuf,
}

impl FakeEngine {
    pub fn new(create: Behavior, start: Behavior) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("fake-engine");
        let script = format!(
            r#"#!/bin/sh
printf '%s\n' "$*" >> '{log}'
for arg in "$@"; do
  case "$arg" in
    type=bind,source=*)
      src="${{arg#type=bind,source=}}"
      src="${{src%%,target=*}}"
      printf '%s\n' "$src" > '{source}'
      cp "$src" '{seen}'
      ;;
  esac
done
case "$1" in
  create) {create} ;;
  start) {start} ;;
  *) exit 0 ;;
esac
"#,
            log = dir.path().join("calls.log").display(),
            source = dir.path().join("mount-source").display(),
            seen = dir.path().join("seen.json").display(),
            create = create.script(),
            start = start.script(),
        );
        fs::write(&program, script).unwrap();
        fs::set_permissions(&program, fs::Permissions::from_mode(0o755)).unwrap();
        FakeEngine { dir, program }
    }

    pub fn working() -> Self {
        FakeEngine::new(
            Behavior::Succeed("0123456789abcdef"),
            Behavior::Succeed("kernelpod-1"),
        )
    }

    /// Every command line the engine was run with, one per call
    pub fn calls(&self) -> Vec<String> {
        match fs::read_to_string(self.dir.path().join("calls.log")) {
            Ok(log) => log.lines().map(str::to_owned).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Subcommand of each call
    pub fn subcommands(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|call| call.split(' ').next().unwrap_or("").to_owned())
            .collect()
    }

    /// Host path that was bind-mounted into the container
    pub fn mount_source(&self) -> PathBuf {
        PathBuf::from(
            fs::read_to_string(self.dir.path().join("mount-source"))
                .unwrap()
                .trim_end(),
        )
    }

    /// Contents of the mounted connection file at create time
    pub fn seen_connection(&self) -> String {
        fs::read_to_string(self.dir.path().join("seen.json")).unwrap()
    }
}

pub fn write_connection_file(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("kernel-1234.json");
    fs::write(&path, contents).unwrap();
    path
}
