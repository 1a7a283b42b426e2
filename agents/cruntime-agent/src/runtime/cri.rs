//! CRI helper verbs shared by runtimes that sit behind a CRI socket.
//!
//! Images and containers are driven through `crictl`; pause and resume go
//! to `runc` directly since CRI has no verb for them.

use semver::Version;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

use super::adapter::{ContainerState, ListContainersOptions, ListImage};
use super::error::{Result, ResultExt, RuntimeError};
use super::preload::fetch_inventory;
use crate::command::{shell_quote, Cmd, CommandError, CommandRunner};

pub const CRICTL_CONFIG_PATH: &str = "/etc/crictl.yaml";
pub const CNI_PLUGIN_DIR: &str = "/opt/cni/bin";
const NAMESPACE_LABEL: &str = "io.kubernetes.pod.namespace";
const STOP_TIMEOUT_SECS: u32 = 10;

/// Whether `crictl rmi` output says the image itself is absent, as opposed
/// to crictl or sudo failing to run.
fn image_absent(output: &str) -> bool {
    let output = output.to_lowercase();
    output.contains("no such image") || (output.contains("image") && output.contains("not found"))
}

/// Kubernetes release from which dockershim is gone and the CNI plugins
/// must be installed separately.
fn v1_24() -> Version {
    Version::new(1, 24, 0)
}

/// Absolute path of crictl on the host, falling back to a PATH lookup.
pub async fn crictl_path(runner: &dyn CommandRunner) -> String {
    match runner.run(&Cmd::new("which").arg("crictl")).await {
        Ok(result) if !result.stdout.trim().is_empty() => result.stdout.trim().to_string(),
        _ => "crictl".to_string(),
    }
}

pub async fn list_cri_images(runner: &dyn CommandRunner) -> Result<Vec<ListImage>> {
    let inventory = fetch_inventory(runner).await.context("crictl images")?;
    Ok(inventory
        .images
        .into_iter()
        .map(|img| ListImage {
            id: img.id,
            repo_tags: img.repo_tags,
            repo_digests: img.repo_digests,
            size: img.size,
        })
        .collect())
}

pub async fn pull_cri_image(runner: &dyn CommandRunner, name: &str) -> Result<()> {
    info!(image = %name, "Pulling image");
    runner.run(&Cmd::sudo(["crictl", "pull", name])).await?;
    info!(image = %name, "Image pulled");
    Ok(())
}

/// Remove an image; an image that is already absent counts as removed.
pub async fn remove_cri_image(runner: &dyn CommandRunner, name: &str) -> Result<()> {
    info!(image = %name, "Removing image");
    match runner.run(&Cmd::sudo(["crictl", "rmi", name])).await {
        Ok(_) => Ok(()),
        Err(CommandError::Failed(result)) if image_absent(&result.output()) => {
            debug!(image = %name, "Image already absent");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Deserialize)]
struct RuncContainer {
    id: String,
    status: String,
}

fn runc(root: Option<&str>) -> Cmd {
    let cmd = Cmd::sudo(["runc"]);
    match root {
        Some(root) => cmd.args(["--root", root]),
        None => cmd,
    }
}

/// IDs of containers matching `options`, in crictl order without duplicates.
pub async fn list_cri_containers(
    runner: &dyn CommandRunner,
    root: Option<&str>,
    options: &ListContainersOptions,
) -> Result<Vec<String>> {
    let mut cmd = Cmd::sudo(["crictl", "ps", "-a", "--quiet"]);
    if let Some(name) = &options.name {
        cmd = cmd.arg(format!("--name={}", name));
    }
    for namespace in &options.namespaces {
        cmd = cmd
            .arg("--label")
            .arg(format!("{}={}", NAMESPACE_LABEL, namespace));
    }

    let result = runner.run(&cmd).await.context("crictl list")?;

    let mut seen = HashSet::new();
    let ids: Vec<String> = result
        .stdout
        .lines()
        .map(str::trim)
        .filter(|id| !id.is_empty() && seen.insert(id.to_string()))
        .map(str::to_string)
        .collect();

    if ids.is_empty() || options.state == ContainerState::All {
        return Ok(ids);
    }

    let listing = runner
        .run(&runc(root).args(["list", "-f", "json"]))
        .await
        .context("runc list")?;
    let states: Vec<RuncContainer> =
        serde_json::from_str::<Option<Vec<RuncContainer>>>(&listing.stdout)
            .context("decoding runc list")?
            .unwrap_or_default();

    let wanted = options.state.to_string();
    let matching: HashSet<&str> = states
        .iter()
        .filter(|c| c.status == wanted)
        .map(|c| c.id.as_str())
        .collect();

    Ok(ids
        .into_iter()
        .filter(|id| matching.contains(id.as_str()))
        .collect())
}

async fn runc_each(
    runner: &dyn CommandRunner,
    root: Option<&str>,
    verb: &str,
    ids: &[String],
) -> Result<()> {
    for id in ids {
        runner
            .run(&runc(root).args([verb, id.as_str()]))
            .await
            .with_context(|| format!("runc {}", verb))?;
    }
    Ok(())
}

pub async fn pause_cri_containers(
    runner: &dyn CommandRunner,
    root: Option<&str>,
    ids: &[String],
) -> Result<()> {
    runc_each(runner, root, "pause", ids).await
}

pub async fn unpause_cri_containers(
    runner: &dyn CommandRunner,
    root: Option<&str>,
    ids: &[String],
) -> Result<()> {
    runc_each(runner, root, "resume", ids).await
}

/// Forcibly remove containers.
pub async fn kill_cri_containers(runner: &dyn CommandRunner, ids: &[String]) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    info!(count = ids.len(), "Killing containers");
    let cmd = Cmd::sudo(["crictl", "rm", "--force"]).args(ids.iter().map(String::as_str));
    runner.run(&cmd).await.context("crictl rm")?;
    Ok(())
}

pub async fn stop_cri_containers(runner: &dyn CommandRunner, ids: &[String]) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    info!(count = ids.len(), "Stopping containers");
    let cmd = Cmd::sudo(["crictl", "stop"])
        .arg(format!("--timeout={}", STOP_TIMEOUT_SECS))
        .args(ids.iter().map(String::as_str));
    runner.run(&cmd).await.context("crictl stop")?;
    Ok(())
}

pub async fn cri_container_log_cmd(
    runner: &dyn CommandRunner,
    id: &str,
    len: usize,
    follow: bool,
) -> String {
    let crictl = crictl_path(runner).await;
    let mut cmd = format!("sudo {} logs --tail {}", crictl, len);
    if follow {
        cmd.push_str(" --follow");
    }
    cmd.push(' ');
    cmd.push_str(id);
    cmd
}

/// Point crictl at the runtime's socket.
fn cri_config_script(socket: &str) -> String {
    let content = format!("runtime-endpoint: unix://{}\n", socket);
    format!(
        "sudo mkdir -p /etc && printf %s {} | sudo tee {}",
        shell_quote(&content),
        CRICTL_CONFIG_PATH
    )
}

pub async fn populate_cri_config(runner: &dyn CommandRunner, socket: &str) -> Result<()> {
    runner
        .run(&Cmd::shell(cri_config_script(socket)))
        .await
        .with_context(|| format!("populating {}", CRICTL_CONFIG_PATH))?;
    debug!(socket = %socket, "crictl configured");
    Ok(())
}

pub async fn enable_ip_forwarding(runner: &dyn CommandRunner) -> Result<()> {
    let bridge_check = Cmd::sudo(["sysctl", "net.bridge.bridge-nf-call-iptables"]);
    if let Err(e) = runner.run(&bridge_check).await {
        info!(error = %e, "couldn't verify netfilter, which might be okay");
        if let Err(e) = runner.run(&Cmd::sudo(["modprobe", "br_netfilter"])).await {
            warn!(error = %e, "loading br_netfilter failed, which may be ok");
        }
    }

    runner
        .run(&Cmd::sudo(["sh", "-c", "echo 1 > /proc/sys/net/ipv4/ip_forward"]))
        .await
        .context("ip_forward")?;
    Ok(())
}

pub fn kubelet_cri_options(socket: &str, kubernetes_version: &Version) -> BTreeMap<String, String> {
    let mut options = BTreeMap::new();
    options.insert(
        "container-runtime-endpoint".to_string(),
        format!("unix://{}", socket),
    );
    if *kubernetes_version < v1_24() {
        options.insert("container-runtime".to_string(), "remote".to_string());
    }
    options
}

/// Kubernetes >= 1.24 needs the CNI plugins present on the host.
pub async fn check_cni_plugins(
    runner: &dyn CommandRunner,
    kubernetes_version: &Version,
) -> Result<()> {
    if *kubernetes_version < v1_24() {
        return Ok(());
    }
    runner
        .run(&Cmd::new("test").args(["-d", CNI_PLUGIN_DIR]))
        .await
        .map_err(RuntimeError::from)
        .with_context(|| format!("CNI plugins not found in {}", CNI_PLUGIN_DIR))?;
    Ok(())
}
