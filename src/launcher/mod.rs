//! Launching a kernel inside a container
//!
//! A launch takes the connection file the front-end wrote for a new kernel,
//! makes a private copy the container can bind to, and asks the container
//! engine to run the image with that copy mounted and the kernel's ports
//! published back to the host.

mod builder;

pub use builder::LauncherBuilder;

use crate::{
    connection::{self, ConnectionInfo},
    engine::{BindMount, ContainerEngine, ContainerRequest},
    errors::LaunchError,
    ports::{PortMap, LOOPBACK_IP},
};
use std::{
    borrow::Cow,
    net::IpAddr,
    path::{Path, PathBuf},
};

/// Where the rewritten connection file is mounted inside the container
pub const CONTAINER_CONNECTION_PATH: &str = "/kernel-connection-spec.json";

/// Container-local copy the kernel actually reads
pub const PRIVATE_CONNECTION_PATH: &str = "/tmp/kernel-connection.json";

/// Environment variable telling the container where the mounted connection
/// file is
pub const CONNECTION_ENV_VAR: &str = "KERNELPOD_CONNECTION_FILE";

/// Placeholder in the kernel command for the connection file path
pub const CONNECTION_FILE_PLACEHOLDER: &str = "{connection_file}";

/// Prefix of every scratch directory and container name
pub const NAME_PREFIX: &str = "kernelpod-";

const SCRATCH_PREFIX: &str = "kernel-connection-";

/// Settings shared by every launch from one [Launcher]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LaunchConfig {
    /// Address the kernel binds to inside the container
    pub connection_ip: String,
    /// Host address the kernel's ports are published on
    pub host_ip: IpAddr,
    /// Memory ceiling, in the engine's syntax (`512m`, `1g`, ...)
    pub memory_limit: String,
    /// Maximum number of processes in the container
    pub pids_limit: u32,
    pub network: String,
    pub container_connection_path: PathBuf,
    pub private_connection_path: PathBuf,
    /// Kernel process to exec once the connection file is in place
    ///
    /// Words equal to `{connection_file}` are replaced with the private
    /// connection file path.
    pub kernel_command: Vec<String>,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        LaunchConfig {
            connection_ip: connection::WILDCARD_IP.to_owned(),
            host_ip: LOOPBACK_IP,
            memory_limit: "1g".to_owned(),
            pids_limit: 200,
            network: "bridge".to_owned(),
            container_connection_path: PathBuf::from(CONTAINER_CONNECTION_PATH),
            private_connection_path: PathBuf::from(PRIVATE_CONNECTION_PATH),
            kernel_command: default_kernel_command(),
        }
    }
}

/// Runs an ipython kernel against the connection file
pub fn default_kernel_command() -> Vec<String> {
    vec![
        "python".to_owned(),
        "-m".to_owned(),
        "ipykernel_launcher".to_owned(),
        "-f".to_owned(),
        CONNECTION_FILE_PLACEHOLDER.to_owned(),
    ]
}

impl LaunchConfig {
    /// Entrypoint that moves the mounted connection file somewhere private
    /// before starting the kernel
    ///
    /// The mount is copied into the container's own filesystem and then
    /// truncated. The kernel gets the copy, which it can reopen however it
    /// likes.
    pub fn bootstrap_command(&self) -> Vec<String> {
        let mount = quote(&self.container_connection_path.to_string_lossy());
        let private = self.private_connection_path.to_string_lossy();
        let kernel: Vec<String> = self
            .kernel_command
            .iter()
            .map(|word| {
                if word == CONNECTION_FILE_PLACEHOLDER {
                    quote(&private)
                } else {
                    quote(word)
                }
            })
            .collect();
        vec![
            "/usr/bin/env".to_owned(),
            "sh".to_owned(),
            "-c".to_owned(),
            format!(
                "cp {mount} {private} && : > {mount} && exec {kernel}",
                mount = mount,
                private = quote(&private),
                kernel = kernel.join(" ")
            ),
        ]
    }

    fn request(
        &self,
        image: &str,
        name: String,
        connection_file: &Path,
        ports: PortMap,
    ) -> ContainerRequest {
        let container_path = self.container_connection_path.to_string_lossy().into_owned();
        ContainerRequest {
            image: image.to_owned(),
            name,
            command: self.bootstrap_command(),
            env: vec![(CONNECTION_ENV_VAR.to_owned(), container_path)],
            mounts: vec![BindMount {
                source: connection_file.to_path_buf(),
                target: self.container_connection_path.clone(),
                // kernels may open the file read-write
                read_only: false,
            }],
            ports,
            memory_limit: self.memory_limit.clone(),
            pids_limit: self.pids_limit,
            network: self.network.clone(),
            auto_remove: true,
        }
    }
}

fn quote(s: &str) -> String {
    shell_escape::unix::escape(Cow::Borrowed(s)).into_owned()
}

/// Random container name, unique enough for concurrent launches on one host
pub fn generate_container_name() -> String {
    format!("{}{}", NAME_PREFIX, rand::random::<u64>())
}

/// Starts kernel containers
#[derive(Clone, Debug)]
pub struct Launcher {
    engine: ContainerEngine,
    config: LaunchConfig,
}

impl Launcher {
    /// Launcher with default settings, using the engine from the environment
    pub fn new() -> Self {
        Launcher::builder().build()
    }

    pub fn builder() -> LauncherBuilder {
        LauncherBuilder::new()
    }

    pub(crate) fn from_parts(engine: ContainerEngine, config: LaunchConfig) -> Self {
        Launcher { engine, config }
    }

    pub fn config(&self) -> &LaunchConfig {
        &self.config
    }

    pub fn engine(&self) -> &ContainerEngine {
        &self.engine
    }

    /// Start a kernel container for a front-end connection file
    ///
    /// Returns once the engine has started the container. The rewritten
    /// connection file lives in a temporary directory which is removed before
    /// this returns, successful or not. The container keeps the file through
    /// its bind mount, and copies it aside on entry.
    ///
    /// The front-end's file is read before any engine call, so an unreadable
    /// connection file never reaches the engine.
    pub async fn launch(
        &self,
        image: &str,
        connection_file: &Path,
    ) -> Result<Container, LaunchError> {
        let scratch = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir()
            .map_err(LaunchError::TempDir)?;
        log::debug!("launch scratch directory {:?}", scratch.path());

        let result = self.launch_in(image, connection_file, scratch.path()).await;
        if let Err(err) = scratch.close() {
            log::warn!("failed to remove launch scratch directory: {}", err);
        }
        result
    }

    async fn launch_in(
        &self,
        image: &str,
        connection_file: &Path,
        scratch: &Path,
    ) -> Result<Container, LaunchError> {
        let scratch = tokio::fs::canonicalize(scratch)
            .await
            .map_err(LaunchError::TempDir)?;
        let rewritten = connection::rewritten_path(&scratch);
        let original: ConnectionInfo = connection::rewrite_connection_file(
            connection_file,
            &rewritten,
            &self.config.connection_ip,
        )
        .await?;

        let ports = PortMap::plan_with_host_ip(&original, self.config.host_ip);
        log::debug!("publishing {} ports, {:?}", ports.len(), ports);

        let name = generate_container_name();
        let request = self.config.request(image, name.clone(), &rewritten, ports);
        let id = self.engine.create(&request).await?;
        log::debug!("created container {} ({})", name, id);

        if let Err(err) = self.engine.start(&name).await {
            if let Err(rm_err) = self.engine.remove(&name).await {
                log::warn!(
                    "failed to remove container {} after start failure: {}",
                    name,
                    rm_err
                );
            }
            return Err(err);
        }

        log::info!("started kernel container {} from image {}", name, image);
        Ok(Container {
            name,
            id,
            engine: self.engine.clone(),
        })
    }
}

impl Default for Launcher {
    fn default() -> Self {
        Launcher::new()
    }
}

/// A started kernel container
///
/// The engine removes the container by itself once the kernel exits.
#[derive(Clone, Debug)]
pub struct Container {
    name: String,
    id: String,
    engine: ContainerEngine,
}

impl Container {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Id assigned by the engine
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Forward the kernel's stdout and stderr to ours until the container
    /// exits
    pub async fn follow_output(&self) -> Result<(), LaunchError> {
        self.engine.logs_follow(&self.name).await
    }
}
