//! Driving a Docker-compatible container engine through its command line
//! client

use crate::{
    errors::{LaunchError, Stage},
    ports::PortMap,
};
use regex::RegexSet;
use std::{
    ffi::OsString,
    io,
    path::PathBuf,
    process::{Output, Stdio},
};
use tokio::process::Command;

/// Environment variable that overrides the engine client program
pub const ENGINE_ENV_VAR: &str = "KERNELPOD_ENGINE";

/// Engine client program used when nothing else is configured
pub const DEFAULT_ENGINE: &str = "docker";

/// A host file or directory visible inside the container
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BindMount {
    pub source: PathBuf,
    pub target: PathBuf,
    pub read_only: bool,
}

impl BindMount {
    /// Value for `--mount`, which the engine reads as one line of CSV
    fn to_arg(&self) -> String {
        let mut fields = vec![
            "type=bind".to_owned(),
            csv_field(format!("source={}", self.source.display())),
            csv_field(format!("target={}", self.target.display())),
        ];
        if self.read_only {
            fields.push("readonly".to_owned());
        }
        fields.join(",")
    }
}

fn csv_field(field: String) -> String {
    if field.contains(|c: char| c == ',' || c == '"' || c == '\n' || c == '\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field
    }
}

/// Everything the engine needs to create one container
#[derive(Clone, Debug)]
pub struct ContainerRequest {
    pub image: String,
    pub name: String,
    pub command: Vec<String>,
    pub env: Vec<(String, String)>,
    pub mounts: Vec<BindMount>,
    pub ports: PortMap,
    pub memory_limit: String,
    pub pids_limit: u32,
    pub network: String,
    pub auto_remove: bool,
}

impl ContainerRequest {
    /// Arguments for the engine's `create` subcommand
    pub fn create_args(&self) -> Vec<String> {
        let mut args = vec!["create".to_owned(), "--name".to_owned(), self.name.clone()];
        if self.auto_remove {
            args.push("--rm".to_owned());
        }
        args.push("--pull".to_owned());
        args.push("never".to_owned());
        args.push("--network".to_owned());
        args.push(self.network.clone());
        args.push("--memory".to_owned());
        args.push(self.memory_limit.clone());
        args.push("--pids-limit".to_owned());
        args.push(self.pids_limit.to_string());
        for mount in &self.mounts {
            args.push("--mount".to_owned());
            args.push(mount.to_arg());
        }
        for (key, value) in &self.env {
            args.push("--env".to_owned());
            args.push(format!("{}={}", key, value));
        }
        args.extend(self.ports.publish_args());
        args.push(self.image.clone());
        args.extend(self.command.iter().cloned());
        args
    }
}

/// Client for a container engine
///
/// Each call runs the engine's command line client once and waits for it to
/// exit. Engine errors are sorted into [LaunchError] variants using the
/// client's stderr, which is kept in the error either way.
#[derive(Clone, Debug)]
pub struct ContainerEngine {
    program: OsString,
}

impl Default for ContainerEngine {
    fn default() -> Self {
        ContainerEngine::new(DEFAULT_ENGINE)
    }
}

impl ContainerEngine {
    pub fn new<S: Into<OsString>>(program: S) -> Self {
        ContainerEngine {
            program: program.into(),
        }
    }

    /// Use the program named by `KERNELPOD_ENGINE`, or `docker`
    pub fn from_env() -> Self {
        match std::env::var_os(ENGINE_ENV_VAR) {
            Some(program) if !program.is_empty() => ContainerEngine::new(program),
            _ => ContainerEngine::default(),
        }
    }

    pub fn program(&self) -> &OsString {
        &self.program
    }

    /// Create a container without starting it, returning its id
    ///
    /// This fails rather than pulling if the image isn't available locally.
    pub async fn create(&self, request: &ContainerRequest) -> Result<String, LaunchError> {
        let output = self.run(Stage::Create, request.create_args()).await?;
        Ok(String::from_utf8(output.stdout)?.trim().to_owned())
    }

    /// Start a created container, returning once the engine has started it
    pub async fn start(&self, name: &str) -> Result<(), LaunchError> {
        self.run(Stage::Start, vec!["start".to_owned(), name.to_owned()])
            .await?;
        Ok(())
    }

    /// Force removal of a container, running or not
    pub async fn remove(&self, name: &str) -> Result<(), LaunchError> {
        self.run(
            Stage::Remove,
            vec!["rm".to_owned(), "--force".to_owned(), name.to_owned()],
        )
        .await?;
        Ok(())
    }

    /// Copy the container's output to our own stdout and stderr until it
    /// exits
    ///
    /// A container that has already been removed is treated as having exited.
    pub async fn logs_follow(&self, name: &str) -> Result<(), LaunchError> {
        let args = vec!["logs".to_owned(), "--follow".to_owned(), name.to_owned()];
        log::debug!("{:?} {:?}", self.program, args);
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| self.spawn_error(Stage::Logs, err))?;

        let mut stderr = Vec::new();
        if let Some(mut pipe) = child.stderr.take() {
            tokio::io::copy(&mut pipe, &mut stderr)
                .await
                .map_err(|err| self.spawn_error(Stage::Logs, err))?;
        }
        let status = child.await.map_err(|err| self.spawn_error(Stage::Logs, err))?;
        let stderr = String::from_utf8_lossy(&stderr).into_owned();

        if status.success() || is_missing_container(&stderr) {
            if !stderr.is_empty() {
                eprint!("{}", stderr);
            }
            Ok(())
        } else {
            Err(classify(Stage::Logs, status, stderr))
        }
    }

    async fn run(&self, stage: Stage, args: Vec<String>) -> Result<Output, LaunchError> {
        log::debug!("{:?} {:?}", self.program, args);
        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|err| self.spawn_error(stage, err))?;

        if output.status.success() {
            Ok(output)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            Err(classify(stage, output.status, stderr))
        }
    }

    fn spawn_error(&self, stage: Stage, err: io::Error) -> LaunchError {
        LaunchError::EngineUnavailable {
            stage,
            message: format!("can't run {:?}: {}", self.program, err),
        }
    }
}

fn is_missing_container(stderr: &str) -> bool {
    lazy_static! {
        static ref RE: regex::Regex = regex::Regex::new(r"(?i)no such container").unwrap();
    }
    RE.is_match(stderr)
}

/// Sort a failed engine call into the error taxonomy by its stderr
pub(crate) fn classify(
    stage: Stage,
    status: std::process::ExitStatus,
    stderr: String,
) -> LaunchError {
    lazy_static! {
        static ref UNAVAILABLE: RegexSet = RegexSet::new(&[
            r"(?i)cannot connect to the docker daemon",
            r"(?i)error during connect",
            r"(?i)is the docker daemon running",
            r"(?i)cannot connect to podman",
        ])
        .unwrap();
        static ref IMAGE: RegexSet = RegexSet::new(&[
            r"(?i)no such image",
            r"(?i)unable to find image",
            r"(?i)pull access denied",
            r"(?i)manifest unknown",
            r"(?i)image not known",
        ])
        .unwrap();
        static ref PORT: RegexSet = RegexSet::new(&[
            r"(?i)port is already allocated",
            r"(?i)address already in use",
        ])
        .unwrap();
        static ref LIMITS: RegexSet = RegexSet::new(&[
            r"(?i)minimum memory limit",
            r"(?i)invalid (argument|value) .*(--memory|--pids-limit)",
            r"(?i)memory limit",
            r"(?i)pids[ _-]?limit",
        ])
        .unwrap();
    }

    let message = stderr.trim().to_owned();
    if UNAVAILABLE.is_match(&stderr) {
        LaunchError::EngineUnavailable { stage, message }
    } else if IMAGE.is_match(&stderr) {
        LaunchError::ImageNotFound { stage, message }
    } else if PORT.is_match(&stderr) {
        LaunchError::PortConflict { stage, message }
    } else if LIMITS.is_match(&stderr) {
        LaunchError::ResourceLimitRejected { stage, message }
    } else {
        LaunchError::Engine {
            stage,
            status,
            stderr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionInfo;
    use std::os::unix::process::ExitStatusExt;

    fn failed(stderr: &str) -> LaunchError {
        classify(Stage::Start, ExitStatusExt::from_raw(125 << 8), stderr.to_owned())
    }

    #[test]
    fn classify_engine_messages() {
        assert!(matches!(
            failed("Cannot connect to the Docker daemon at unix:///var/run/docker.sock. Is the docker daemon running?\n"),
            LaunchError::EngineUnavailable { stage: Stage::Start, .. }
        ));
        assert!(matches!(
            failed("Error response from daemon: No such image: jupyter/nope:latest\n"),
            LaunchError::ImageNotFound { .. }
        ));
        assert!(matches!(
            failed("Error response from daemon: driver failed programming external connectivity on endpoint kernelpod-1: Bind for 127.0.0.1:5555 failed: port is already allocated\n"),
            LaunchError::PortConflict { .. }
        ));
        assert!(matches!(
            failed("Error response from daemon: Minimum memory limit allowed is 6MB\n"),
            LaunchError::ResourceLimitRejected { .. }
        ));
        match failed("Error response from daemon: something new\n") {
            LaunchError::Engine { stage, stderr, .. } => {
                assert_eq!(stage, Stage::Start);
                assert_eq!(stderr, "Error response from daemon: something new\n");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn classified_errors_keep_engine_message() {
        let err = failed("Error response from daemon: No such image: busybox:nope\n");
        assert_eq!(
            err.to_string(),
            "image not found during start: Error response from daemon: No such image: busybox:nope"
        );
    }

    #[test]
    fn create_args_layout() {
        let info = ConnectionInfo::parse(r#"{"shell_port":5555}"#).unwrap();
        let request = ContainerRequest {
            image: "jupyter/base-notebook".to_owned(),
            name: "kernelpod-7".to_owned(),
            command: vec!["sh".to_owned(), "-c".to_owned(), "true".to_owned()],
            env: vec![("A".to_owned(), "b".to_owned())],
            mounts: vec![BindMount {
                source: "/tmp/x/connection.json".into(),
                target: "/kernel-connection-spec.json".into(),
                read_only: false,
            }],
            ports: PortMap::plan(&info),
            memory_limit: "1g".to_owned(),
            pids_limit: 200,
            network: "bridge".to_owned(),
            auto_remove: true,
        };
        assert_eq!(
            request.create_args(),
            vec![
                "create",
                "--name",
                "kernelpod-7",
                "--rm",
                "--pull",
                "never",
                "--network",
                "bridge",
                "--memory",
                "1g",
                "--pids-limit",
                "200",
                "--mount",
                "type=bind,source=/tmp/x/connection.json,target=/kernel-connection-spec.json",
                "--env",
                "A=b",
                "--publish",
                "127.0.0.1:5555:5555/tcp",
                "jupyter/base-notebook",
                "sh",
                "-c",
                "true",
            ]
        );
    }

    #[test]
    fn mount_arg_quotes_awkward_paths() {
        let mount = |source: &str, read_only| BindMount {
            source: source.into(),
            target: "/kernel-connection-spec.json".into(),
            read_only,
        };
        assert_eq!(
            mount("/tmp/plain/connection.json", true).to_arg(),
            "type=bind,source=/tmp/plain/connection.json,target=/kernel-connection-spec.json,readonly"
        );
        assert_eq!(
            mount("/tmp/a,b/connection.json", false).to_arg(),
            r#"type=bind,"source=/tmp/a,b/connection.json",target=/kernel-connection-spec.json"#
        );
        assert_eq!(
            mount(r#"/tmp/say "hi"/connection.json"#, false).to_arg(),
            r#"type=bind,"source=/tmp/say ""hi""/connection.json",target=/kernel-connection-spec.json"#
        );
    }

    #[tokio::test]
    async fn missing_engine_program_is_unavailable() {
        let engine = ContainerEngine::new("/nonexistent/kernelpod-engine");
        assert!(matches!(
            engine.start("kernelpod-1").await,
            Err(LaunchError::EngineUnavailable { stage: Stage::Start, .. })
        ));
    }
}
