#[cfg(not(unix))]
compile_error!("kernelpod only works on unix hosts");

#[macro_use] extern crate lazy_static;
#[macro_use] extern crate serde;

pub mod connection;
pub mod engine;
pub mod errors;
pub mod kernelspec;
pub mod launcher;
pub mod ports;

pub use crate::{
    connection::ConnectionInfo,
    engine::ContainerEngine,
    errors::ExitCode,
    kernelspec::{KernelSpec, KernelSpecStore},
    launcher::{Container, Launcher},
    ports::PortMap,
};
