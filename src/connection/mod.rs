//! Kernel connection files, and rewriting them for use inside a container


use crate::errors::ConnectionError;
use serde_json::{Map, Value};
use std::{
    fs::Permissions,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};
use tokio::io::AsyncWriteExt;

/// Bind address that accepts connections on every interface
pub const WILDCARD_IP: &str = "0.0.0.0";

/// Name of the field holding the kernel's bind address
pub const IP_FIELD: &str = "ip";

/// Any field whose name contains this is a port to publish
///
/// The underscore keeps fields like `transport` out.
pub const PORT_FIELD_MARKER: &str = "_port";

/// Mode of the rewritten file. Some kernels open their connection file for
/// writing even though they never write to it.
pub const REWRITTEN_FILE_MODE: u32 = 0o666;

/// Parsed contents of a kernel connection file
///
/// The front-end writes one of these for each kernel it starts. It's a flat
/// json object with the transport address, signing key, and one field per
/// socket ending in `_port`. Fields are kept in their original order so that a
/// rewritten file differs from its source only in the fields we change.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionInfo {
    fields: Map<String, Value>,
}

impl ConnectionInfo {
    /// Validate a field mapping as connection info
    ///
    /// Every field whose name contains `_port` must hold a TCP port number
    /// from 1 to 65535.
    pub fn from_fields(fields: Map<String, Value>) -> Result<Self, ConnectionError> {
        for (name, value) in &fields {
            if is_port_field(name) && port_number(value).is_none() {
                return Err(ConnectionError::InvalidPort {
                    field: name.clone(),
                    value: value.clone(),
                });
            }
        }
        Ok(ConnectionInfo { fields })
    }

    /// Parse connection info from json text
    pub fn parse(s: &str) -> Result<Self, ConnectionError> {
        Self::parse_at(Path::new("<string>"), s)
    }

    fn parse_at(path: &Path, s: &str) -> Result<Self, ConnectionError> {
        match serde_json::from_str(s) {
            Ok(Value::Object(fields)) => Self::from_fields(fields),
            Ok(_) => Err(ConnectionError::NotAnObject {
                path: path.to_path_buf(),
            }),
            Err(source) => Err(ConnectionError::Parse {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Read and validate a connection file written by the front-end
    pub async fn read(path: &Path) -> Result<Self, ConnectionError> {
        log::debug!("reading connection file {:?}", path);
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConnectionError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse_at(path, &text)
    }

    /// All fields, in file order
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// The address the kernel will bind its sockets to, if present
    pub fn ip(&self) -> Option<&str> {
        self.fields.get(IP_FIELD).and_then(Value::as_str)
    }

    /// Returns a copy with the bind address replaced
    ///
    /// The field keeps its position. If there was no address, one is appended.
    pub fn with_ip(&self, ip: &str) -> Self {
        let mut fields = self.fields.clone();
        fields.insert(IP_FIELD.to_owned(), Value::String(ip.to_owned()));
        ConnectionInfo { fields }
    }

    /// Every port field, as (name, port number) in file order
    pub fn port_fields(&self) -> impl Iterator<Item = (&str, u16)> {
        self.fields.iter().filter_map(|(name, value)| {
            if is_port_field(name) {
                port_number(value).map(|port| (name.as_str(), port))
            } else {
                None
            }
        })
    }

    /// Serialize to the compact json text written into connection files
    pub fn to_json(&self) -> Result<String, ConnectionError> {
        Ok(serde_json::to_string(&self.fields)?)
    }

    /// Write to a new file, which must not exist yet
    ///
    /// The file is made readable and writable by everyone so that the kernel
    /// can open it no matter which user the container runs as.
    pub async fn write_new(&self, path: &Path) -> Result<(), ConnectionError> {
        let write_err = |source| ConnectionError::Write {
            path: path.to_path_buf(),
            source,
        };
        let json = self.to_json()?;

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
            .map_err(write_err)?;
        file.write_all(json.as_bytes()).await.map_err(write_err)?;
        file.flush().await.map_err(write_err)?;
        std::mem::drop(file);

        tokio::fs::set_permissions(path, Permissions::from_mode(REWRITTEN_FILE_MODE))
            .await
            .map_err(write_err)?;
        Ok(())
    }
}

/// Copy a front-end connection file to a new path with its bind address
/// replaced
///
/// The input file is left alone. Returns the connection info as it was read,
/// before the address was changed.
pub async fn rewrite_connection_file(
    input: &Path,
    output: &Path,
    ip: &str,
) -> Result<ConnectionInfo, ConnectionError> {
    let original = ConnectionInfo::read(input).await?;
    original.with_ip(ip).write_new(output).await?;
    log::debug!(
        "rewrote connection file {:?} -> {:?} with ip {}",
        input,
        output,
        ip
    );
    Ok(original)
}

/// Default file name for a rewritten connection file inside a scratch
/// directory
pub fn rewritten_path(dir: &Path) -> PathBuf {
    dir.join("connection.json")
}

pub fn is_port_field(name: &str) -> bool {
    name.contains(PORT_FIELD_MARKER)
}

fn port_number(value: &Value) -> Option<u16> {
    value.as_u64().and_then(|n| match n {
        1..=65535 => Some(n as u16),
        _ => None,
    })
}
