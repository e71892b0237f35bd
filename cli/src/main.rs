#[macro_use] extern crate clap;

use clap::{App, ArgMatches};
use env_logger::{from_env, Env};
use kernelpod::{
    engine::ContainerEngine,
    kernelspec::{self, InstallOptions, KernelSpecStore},
    ExitCode, Launcher,
};
use std::{net::IpAddr, path::Path};

#[tokio::main]
async fn main() {
    let yaml = load_yaml!("cli.yml");
    let matches = App::from_yaml(yaml)
        .version(crate_version!())
        .get_matches();

    let log_level = matches.value_of("log_level").unwrap_or("warn");
    from_env(Env::default().default_filter_or(log_level)).init();

    let code = match matches.subcommand() {
        ("install", Some(sub)) => install(&matches, sub).await,
        ("start", Some(sub)) => start(&matches, sub).await,
        (name, _) => unreachable!("unknown subcommand {:?}", name),
    };
    std::process::exit(code.code());
}

async fn install(matches: &ArgMatches<'_>, sub: &ArgMatches<'_>) -> ExitCode {
    let image = sub.value_of("image_name").unwrap_or_default();
    let options = InstallOptions {
        display_name: sub.value_of("name").map(str::to_owned),
        language: sub.value_of("language").unwrap_or_default().to_owned(),
        program: None,
        engine: matches.value_of_os("engine").map(ToOwned::to_owned),
    };

    let result = match KernelSpecStore::user_default() {
        Ok(store) => kernelspec::install(&store, image, &options).await,
        Err(err) => Err(err),
    };
    match result {
        Ok(location) => {
            println!("Installed kernel for {} in {}", image, location.display());
            ExitCode::Success
        }
        Err(err) => {
            log::error!("{}", err);
            err.exit_code()
        }
    }
}

async fn start(matches: &ArgMatches<'_>, sub: &ArgMatches<'_>) -> ExitCode {
    let image = sub.value_of("image_name").unwrap_or_default();
    let connection_file = Path::new(sub.value_of_os("connection_file").unwrap_or_default());

    let mut launcher = Launcher::builder();
    if let Some(program) = matches.value_of_os("engine") {
        launcher = launcher.engine(ContainerEngine::new(program));
    }
    if let Some(memory) = sub.value_of("memory") {
        launcher = launcher.memory_limit(memory);
    }
    if sub.is_present("pids") {
        launcher = launcher.pids_limit(value_t_or_exit!(sub, "pids", u32));
    }
    if sub.is_present("host_ip") {
        launcher = launcher.host_ip(value_t_or_exit!(sub, "host_ip", IpAddr));
    }
    let launcher = launcher.build();

    let result = match launcher.launch(image, connection_file).await {
        Ok(container) => container.follow_output().await,
        Err(err) => Err(err),
    };
    match result {
        Ok(()) => ExitCode::Success,
        Err(err) => {
            log::error!("{}", err);
            err.exit_code()
        }
    }
}
