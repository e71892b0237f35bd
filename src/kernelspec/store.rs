use crate::{
    errors::InstallError,
    kernelspec::{kernelspec_file, KernelSpec},
};
use directories_next::BaseDirs;
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

/// Name of the descriptor file inside each kernel directory
pub const KERNELSPEC_FILE: &str = "kernel.json";

/// Overrides the front-end's data directory on every platform
pub const DATA_DIR_ENV_VAR: &str = "JUPYTER_DATA_DIR";

/// Operating system conventions for where per-user kernels live
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Linux
        }
    }
}

/// Per-user kernel directory for a platform, from the real environment
pub fn resolve_base_directory(platform: Platform) -> Result<PathBuf, InstallError> {
    let dirs = BaseDirs::new().ok_or(InstallError::NoDefaultStoreDir)?;
    resolve_base_directory_with(platform, dirs.home_dir(), |key| std::env::var_os(key))
}

pub(crate) fn resolve_base_directory_with<F>(
    platform: Platform,
    home: &Path,
    env: F,
) -> Result<PathBuf, InstallError>
where
    F: Fn(&str) -> Option<OsString>,
{
    let absolute = |key: &str| {
        env(key)
            .map(PathBuf::from)
            .filter(|path| path.is_absolute())
    };

    let data_dir = match absolute(DATA_DIR_ENV_VAR) {
        Some(dir) => dir,
        None => match platform {
            Platform::Linux => absolute("XDG_DATA_HOME")
                .unwrap_or_else(|| home.join(".local").join("share"))
                .join("jupyter"),
            Platform::MacOs => home.join("Library").join("Jupyter"),
            Platform::Windows => absolute("APPDATA")
                .unwrap_or_else(|| home.join("AppData").join("Roaming"))
                .join("jupyter"),
        },
    };
    Ok(data_dir.join("kernels"))
}

/// Directory of kernel descriptors the front-end searches
#[derive(Clone, Debug)]
pub struct KernelSpecStore {
    base: PathBuf,
}

impl KernelSpecStore {
    pub fn new<P: AsRef<Path>>(base: P) -> Self {
        KernelSpecStore {
            base: base.as_ref().to_path_buf(),
        }
    }

    /// The current user's kernel directory
    pub fn user_default() -> Result<Self, InstallError> {
        let base = resolve_base_directory(Platform::current())?;
        log::debug!("using kernel descriptor store {:?}", base);
        Ok(KernelSpecStore::new(base))
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Create the store directory if it's missing
    pub async fn ensure_exists(&self) -> Result<(), InstallError> {
        tokio::fs::create_dir_all(&self.base)
            .await
            .map_err(|source| InstallError::Storage {
                path: self.base.clone(),
                source,
            })
    }

    /// Directory for one kernel
    pub fn location(&self, kernel_id: &str) -> PathBuf {
        self.base.join(kernel_id)
    }

    /// Write a descriptor into a kernel directory, replacing any earlier one
    pub async fn write(&self, location: &Path, spec: &KernelSpec) -> Result<(), InstallError> {
        tokio::fs::create_dir_all(location)
            .await
            .map_err(|source| InstallError::Storage {
                path: location.to_path_buf(),
                source,
            })?;
        let path = kernelspec_file(location);
        let json = serde_json::to_string_pretty(spec)?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|source| InstallError::Storage { path, source })
    }

    /// Read back the descriptor in a kernel directory
    pub async fn read(&self, location: &Path) -> Result<KernelSpec, InstallError> {
        let path = kernelspec_file(location);
        let json = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| InstallError::Storage { path, source })?;
        Ok(serde_json::from_str(&json)?)
    }
}
