//! Publishing a kernel's sockets from the container to the host

use crate::connection::ConnectionInfo;
use std::{
    collections::BTreeMap,
    fmt,
    net::{IpAddr, Ipv4Addr},
};

/// Host address ports are published on unless configured otherwise
///
/// Loopback keeps the kernel reachable only from front-ends on this host.
pub const LOOPBACK_IP: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Host side of one published port
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PortBinding {
    pub host_ip: IpAddr,
    pub host_port: u16,
}

impl fmt::Display for PortBinding {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.host_ip {
            IpAddr::V4(ip) => write!(f, "{}:{}", ip, self.host_port),
            IpAddr::V6(ip) => write!(f, "[{}]:{}", ip, self.host_port),
        }
    }
}

/// Container ports to publish, keyed by `"{port}/tcp"`
///
/// Each port is published under the same number on both sides, since the
/// connection file the front-end holds already names those numbers.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PortMap {
    bindings: BTreeMap<String, PortBinding>,
}

impl PortMap {
    /// Publish every port field of the connection info on loopback
    pub fn plan(connection: &ConnectionInfo) -> Self {
        Self::plan_with_host_ip(connection, LOOPBACK_IP)
    }

    /// Publish every port field of the connection info on a chosen host
    /// address
    pub fn plan_with_host_ip(connection: &ConnectionInfo, host_ip: IpAddr) -> Self {
        let mut bindings = BTreeMap::new();
        for (_, port) in connection.port_fields() {
            bindings.insert(
                container_port_key(port),
                PortBinding {
                    host_ip,
                    host_port: port,
                },
            );
        }
        PortMap { bindings }
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&PortBinding> {
        self.bindings.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PortBinding)> {
        self.bindings.iter().map(|(key, binding)| (key.as_str(), binding))
    }

    /// Container engine arguments that publish these ports
    pub fn publish_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.bindings.len() * 2);
        for (key, binding) in &self.bindings {
            args.push("--publish".to_owned());
            args.push(format!("{}:{}", binding, key));
        }
        args
    }
}

fn container_port_key(port: u16) -> String {
    format!("{}/tcp", port)
}
