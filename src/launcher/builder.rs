use crate::{
    engine::ContainerEngine,
    launcher::{LaunchConfig, Launcher},
};
use std::{net::IpAddr, path::Path};

/// Builder for configuring custom [Launcher] instances
#[derive(Clone, Debug)]
pub struct LauncherBuilder {
    engine: Option<ContainerEngine>,
    config: LaunchConfig,
}

impl LauncherBuilder {
    /// Start with the default resource ceilings and the engine named by the
    /// environment
    pub fn new() -> Self {
        LauncherBuilder {
            engine: None,
            config: LaunchConfig::default(),
        }
    }

    /// Use a specific container engine client
    pub fn engine(mut self, engine: ContainerEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Change the memory ceiling, in the engine's syntax such as `512m`
    pub fn memory_limit<S: Into<String>>(mut self, limit: S) -> Self {
        self.config.memory_limit = limit.into();
        self
    }

    /// Change the maximum number of processes inside the container
    pub fn pids_limit(mut self, limit: u32) -> Self {
        self.config.pids_limit = limit;
        self
    }

    /// Publish the kernel's ports on a different host address
    ///
    /// The default is loopback, which keeps the kernel private to this host.
    pub fn host_ip(mut self, ip: IpAddr) -> Self {
        self.config.host_ip = ip;
        self
    }

    /// Change the address the kernel binds to inside the container
    pub fn connection_ip<S: Into<String>>(mut self, ip: S) -> Self {
        self.config.connection_ip = ip.into();
        self
    }

    /// Attach the container to a different engine network
    pub fn network<S: Into<String>>(mut self, network: S) -> Self {
        self.config.network = network.into();
        self
    }

    /// Mount the connection file somewhere else inside the container
    pub fn container_connection_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.container_connection_path = path.as_ref().to_path_buf();
        self
    }

    /// Change where the container keeps its private copy of the connection
    /// file
    pub fn private_connection_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.private_connection_path = path.as_ref().to_path_buf();
        self
    }

    /// Replace the kernel command run inside the container
    ///
    /// Any word equal to `{connection_file}` is replaced with the path of the
    /// container's private connection file.
    pub fn kernel_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.kernel_command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Construct a [Launcher] using the parameters from this builder
    pub fn build(self) -> Launcher {
        let engine = self.engine.unwrap_or_else(ContainerEngine::from_env);
        log::debug!("using container engine {:?}", engine.program());
        Launcher::from_parts(engine, self.config)
    }
}

impl Default for LauncherBuilder {
    fn default() -> Self {
        LauncherBuilder::new()
    }
}
