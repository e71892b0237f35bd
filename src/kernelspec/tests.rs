use super::{store::resolve_base_directory_with, *};
use std::collections::HashMap;

fn env_of(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<OsString> {
    let vars: HashMap<String, OsString> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), OsString::from(v)))
        .collect();
    move |key: &str| vars.get(key).cloned()
}

fn options() -> InstallOptions {
    InstallOptions {
        program: Some("/usr/local/bin/kernelpod".into()),
        ..InstallOptions::default()
    }
}

#[test]
fn base_directory_per_platform() {
    let home = Path::new("/home/someone");
    let none = env_of(&[]);
    assert_eq!(
        resolve_base_directory_with(Platform::Linux, home, &none).unwrap(),
        Path::new("/home/someone/.local/share/jupyter/kernels")
    );
    assert_eq!(
        resolve_base_directory_with(Platform::MacOs, home, &none).unwrap(),
        Path::new("/home/someone/Library/Jupyter/kernels")
    );
    assert_eq!(
        resolve_base_directory_with(Platform::Windows, home, &none).unwrap(),
        Path::new("/home/someone/AppData/Roaming/jupyter/kernels")
    );
}

#[test]
fn base_directory_from_environment() {
    let home = Path::new("/home/someone");
    assert_eq!(
        resolve_base_directory_with(Platform::Linux, home, env_of(&[("XDG_DATA_HOME", "/xdg")]))
            .unwrap(),
        Path::new("/xdg/jupyter/kernels")
    );
    assert_eq!(
        resolve_base_directory_with(
            Platform::Linux,
            home,
            env_of(&[("XDG_DATA_HOME", "relative/xdg")])
        )
        .unwrap(),
        Path::new("/home/someone/.local/share/jupyter/kernels")
    );
    for platform in &[Platform::Linux, Platform::MacOs, Platform::Windows] {
        assert_eq!(
            resolve_base_directory_with(
                *platform,
                home,
                env_of(&[("JUPYTER_DATA_DIR", "/data"), ("XDG_DATA_HOME", "/xdg")])
            )
            .unwrap(),
            Path::new("/data/kernels")
        );
    }
}

#[test]
fn kernel_ids_from_image_names() {
    assert_eq!(kernel_id("busybox").unwrap(), "busybox");
    assert_eq!(
        kernel_id("Jupyter/scipy-notebook:2023-10-20").unwrap(),
        "jupyter-scipy-notebook-2023-10-20"
    );
    assert_eq!(
        kernel_id("localhost:5000/team/r_kernel@sha256:abc").unwrap(),
        "localhost-5000-team-r_kernel-sha256-abc"
    );
    assert!(kernel_id("").is_err());
    assert!(kernel_id("/:@").is_err());
}

#[test]
fn spec_for_image() {
    let spec = KernelSpec::for_image("jupyter/base-notebook", &options());
    assert_eq!(
        spec.argv,
        vec![
            "/usr/local/bin/kernelpod",
            "start",
            "jupyter/base-notebook",
            "{connection_file}"
        ]
    );
    assert_eq!(spec.display_name, "jupyter/base-notebook");
    assert_eq!(spec.language, "");
    assert_eq!(spec.interrupt_mode, InterruptMode::Message);
}

#[test]
fn spec_with_name_language_and_engine() {
    let spec = KernelSpec::for_image(
        "r-kernel",
        &InstallOptions {
            display_name: Some("R (container)".to_owned()),
            language: "R".to_owned(),
            engine: Some("podman".into()),
            ..options()
        },
    );
    assert_eq!(
        spec.argv,
        vec![
            "/usr/local/bin/kernelpod",
            "--engine",
            "podman",
            "start",
            "r-kernel",
            "{connection_file}"
        ]
    );
    assert_eq!(spec.display_name, "R (container)");
    assert_eq!(spec.language, "R");
}

#[test]
fn spec_json_layout() {
    let json = serde_json::to_value(KernelSpec::for_image("img", &options())).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "argv": ["/usr/local/bin/kernelpod", "start", "img", "{connection_file}"],
            "display_name": "img",
            "language": "",
            "interrupt_mode": "message",
        })
    );
}

#[tokio::test]
async fn install_writes_descriptor() {
    let dir = tempfile::tempdir().unwrap();
    let store = KernelSpecStore::new(dir.path().join("kernels"));

    let location = install(&store, "jupyter/base-notebook:latest", &options())
        .await
        .unwrap();
    assert_eq!(location, dir.path().join("kernels/jupyter-base-notebook-latest"));
    assert!(kernelspec_file(&location).is_file());

    let spec = store.read(&location).await.unwrap();
    assert_eq!(spec, KernelSpec::for_image("jupyter/base-notebook:latest", &options()));
}

#[tokio::test]
async fn install_replaces_descriptor() {
    let dir = tempfile::tempdir().unwrap();
    let store = KernelSpecStore::new(dir.path());

    install(&store, "img", &options()).await.unwrap();
    let location = install(
        &store,
        "img",
        &InstallOptions {
            display_name: Some("Renamed".to_owned()),
            ..options()
        },
    )
    .await
    .unwrap();
    assert_eq!(store.read(&location).await.unwrap().display_name, "Renamed");
}
