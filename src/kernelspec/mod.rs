//! Kernel descriptors, which tell a notebook front-end how to start a kernel
//!
//! Installing an image writes a `kernel.json` into the front-end's kernel
//! directory. Its command line calls back into our `start` subcommand with
//! the image name and the front-end's connection file.

#[cfg(test)] mod tests;

mod store;

pub use store::{resolve_base_directory, KernelSpecStore, Platform, KERNELSPEC_FILE};

use crate::{errors::InstallError, launcher::CONNECTION_FILE_PLACEHOLDER};
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

/// Program name used in descriptors when our own executable can't be found
pub const DEFAULT_PROGRAM: &str = "kernelpod";

/// How the front-end should deliver interrupts to the kernel
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum InterruptMode {
    /// send SIGINT to the process the front-end started
    Signal,
    /// send an interrupt request over the control channel
    Message,
}

/// Contents of a `kernel.json` descriptor
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
pub struct KernelSpec {
    pub argv: Vec<String>,
    pub display_name: String,
    pub language: String,
    pub interrupt_mode: InterruptMode,
}

/// Settings for [install()]
#[derive(Clone, Debug, Default)]
pub struct InstallOptions {
    /// Name shown by the front-end, defaults to the image name
    pub display_name: Option<String>,
    /// Language tag, empty if unset
    pub language: String,
    /// Program the front-end runs to start the kernel, defaults to the
    /// current executable
    pub program: Option<PathBuf>,
    /// Container engine client to record in the descriptor's command line
    pub engine: Option<OsString>,
}

impl KernelSpec {
    /// Descriptor that launches `image` through our `start` subcommand
    ///
    /// Interrupts go over the control channel, since a signal to the launcher
    /// would not reach the kernel inside its container.
    pub fn for_image(image: &str, options: &InstallOptions) -> Self {
        let program = match &options.program {
            Some(program) => program.clone(),
            None => default_program(),
        };
        let mut argv = vec![program.to_string_lossy().into_owned()];
        if let Some(engine) = &options.engine {
            argv.push("--engine".to_owned());
            argv.push(engine.to_string_lossy().into_owned());
        }
        argv.push("start".to_owned());
        argv.push(image.to_owned());
        argv.push(CONNECTION_FILE_PLACEHOLDER.to_owned());

        KernelSpec {
            argv,
            display_name: options
                .display_name
                .clone()
                .unwrap_or_else(|| image.to_owned()),
            language: options.language.clone(),
            interrupt_mode: InterruptMode::Message,
        }
    }
}

fn default_program() -> PathBuf {
    match std::env::current_exe() {
        Ok(path) => path,
        Err(err) => {
            log::warn!("can't locate current executable, using {:?}: {}", DEFAULT_PROGRAM, err);
            PathBuf::from(DEFAULT_PROGRAM)
        }
    }
}

/// Directory name identifying the kernel for an image
///
/// Kernels are identified by image name. The front-end only accepts
/// `[a-z0-9._-]` in kernel names, so anything else becomes a dash.
pub fn kernel_id(image: &str) -> Result<String, InstallError> {
    let id: String = image
        .trim()
        .chars()
        .map(|c| match c.to_ascii_lowercase() {
            c @ 'a'..='z' | c @ '0'..='9' | c @ '.' | c @ '_' | c @ '-' => c,
            _ => '-',
        })
        .collect();
    if id.chars().any(|c| c.is_ascii_alphanumeric()) {
        Ok(id)
    } else {
        Err(InstallError::InvalidKernelId(image.to_owned()))
    }
}

/// Register an image as a kernel, returning the descriptor's directory
pub async fn install(
    store: &KernelSpecStore,
    image: &str,
    options: &InstallOptions,
) -> Result<PathBuf, InstallError> {
    store.ensure_exists().await?;
    let spec = KernelSpec::for_image(image, options);
    let location = store.location(&kernel_id(image)?);
    store.write(&location, &spec).await?;
    log::info!(
        "installed kernel {:?} for image {} at {:?}",
        spec.display_name,
        image,
        location
    );
    Ok(location)
}

/// Path of the descriptor file inside a kernel directory
pub fn kernelspec_file(location: &Path) -> PathBuf {
    location.join(KERNELSPEC_FILE)
}
