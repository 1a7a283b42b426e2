//! Porto Adapter
//!
//! Implementation of RuntimeAdapter for Porto, reached through the
//! portoshim CRI socket. Image and container verbs go through the CRI
//! helpers; only version and image existence talk to Porto's own tools.

use async_trait::async_trait;
use semver::Version;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::adapter::{
    Advisory, BuildOptions, CgroupDriver, ClusterConfig, EnableOptions, EnableReport,
    ListContainersOptions, ListImage, ListImagesOptions, PreloadOutcome, RuntimeAdapter,
};
use super::cri;
use super::error::{Result, ResultExt, RuntimeError};
use super::images::{ImageCatalog, KubeadmCatalog};
use super::kernel::check_rootless;
use super::preload::check_preloaded;
use super::version::parse_version;
use super::RuntimeConfig;
use crate::command::{Cmd, CommandRunner};
use crate::sysinit::ServiceManager;

/// systemd unit managed by this adapter
pub const SERVICE: &str = "porto";
pub const DEFAULT_SOCKET: &str = "/run/portoshim.sock";
pub const LOG_FILE: &str = "/var/log/portod.log";

/// Porto's image seeding does not include the sandbox image, so it is
/// always pulled on enable.
pub const PAUSE_IMAGE: &str = "registry.k8s.io/pause:3.7";

/// Porto runtime adapter
pub struct PortoRuntime {
    socket: Option<String>,
    kubernetes_version: Version,
    image_repository: Option<String>,
    insecure_registries: Vec<String>,
    peer_services: Vec<String>,
    runner: Arc<dyn CommandRunner>,
    init: Arc<dyn ServiceManager>,
    catalog: Arc<dyn ImageCatalog>,
}

impl PortoRuntime {
    pub fn new(
        config: RuntimeConfig,
        runner: Arc<dyn CommandRunner>,
        init: Arc<dyn ServiceManager>,
    ) -> Self {
        Self {
            socket: config.socket,
            kubernetes_version: config.kubernetes_version,
            image_repository: config.image_repository,
            insecure_registries: config.insecure_registries,
            peer_services: config.peer_services,
            runner,
            init,
            catalog: Arc::new(KubeadmCatalog),
        }
    }

    /// Replace the image catalog used by [`RuntimeAdapter::preload`].
    pub fn with_catalog(mut self, catalog: Arc<dyn ImageCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    /// Override the CRI socket path
    pub fn set_socket(&mut self, socket: impl Into<String>) {
        self.socket = Some(socket.into());
    }

    pub fn kubernetes_version(&self) -> &Version {
        &self.kubernetes_version
    }

    fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    /// Stop every running peer runtime. Failures are reported, never fatal.
    async fn disable_others(&self) -> Vec<Advisory> {
        let mut warnings = Vec::new();
        for peer in self.peer_services.iter().filter(|p| p.as_str() != SERVICE) {
            if !self.init.active(peer).await {
                continue;
            }
            info!(service = %peer, "Disabling peer runtime");
            if let Err(e) = self.init.force_stop(peer).await {
                warn!(service = %peer, error = %e, "disableOthers");
                warnings.push(Advisory::new("disable others", format!("{}: {}", peer, e)));
            }
        }
        warnings
    }

    /// Porto is configured by its package; nothing is rendered per cluster.
    fn generate_config(&self, options: &EnableOptions) -> Result<()> {
        debug!(
            image_repository = ?self.image_repository,
            kubernetes_version = %self.kubernetes_version,
            cgroup_driver = %options.cgroup_driver,
            insecure_registries = ?self.insecure_registries,
            rootless = options.rootless,
            "porto needs no generated configuration"
        );
        Ok(())
    }

    fn unsupported(operation: &'static str) -> RuntimeError {
        RuntimeError::unsupported(SERVICE, operation)
    }
}

#[async_trait]
impl RuntimeAdapter for PortoRuntime {
    fn name(&self) -> &'static str {
        "porto"
    }

    async fn version(&self) -> Result<String> {
        let result = self
            .runner()
            .run(&Cmd::new("portod").arg("version"))
            .await
            .context("porto check version")?;
        parse_version(&result.stdout).context("porto check version")
    }

    fn socket_path(&self) -> &str {
        self.socket.as_deref().unwrap_or(DEFAULT_SOCKET)
    }

    async fn active(&self) -> bool {
        self.init.active(SERVICE).await
    }

    async fn available(&self) -> Result<()> {
        self.runner()
            .run(&Cmd::new("which").arg("portoshim"))
            .await
            .context("check porto availability")?;
        cri::check_cni_plugins(self.runner(), &self.kubernetes_version).await
    }

    async fn enable(&self, options: &EnableOptions) -> Result<EnableReport> {
        let mut report = EnableReport::default();

        if options.rootless {
            if let Some(advisory) = check_rootless(self.runner()).await? {
                report.warnings.push(advisory);
            }
        }

        if options.disable_others {
            report.warnings.extend(self.disable_others().await);
        }

        cri::populate_cri_config(self.runner(), self.socket_path())
            .await
            .context("configuring crictl")?;
        self.generate_config(options)
            .context("generating porto config")?;
        cri::enable_ip_forwarding(self.runner())
            .await
            .context("enabling ip forwarding")?;
        self.init
            .restart(SERVICE)
            .await
            .context("restarting porto")?;

        self.pull_image(PAUSE_IMAGE)
            .await
            .context("pulling pause image")?;

        info!(socket = %self.socket_path(), warnings = report.warnings.len(), "porto enabled");
        Ok(report)
    }

    async fn disable(&self) -> Result<()> {
        self.init
            .force_stop(SERVICE)
            .await
            .context("stopping porto")?;
        Ok(())
    }

    async fn restart(&self) -> Result<()> {
        self.init
            .restart(SERVICE)
            .await
            .context("restarting porto")?;
        Ok(())
    }

    /// Substring check over `portoctl docker-images`: a name that is a
    /// prefix of another image's name matches too.
    async fn image_exists(&self, name: &str, sha: &str) -> bool {
        info!(name = %name, sha = %sha, "Checking existence of image");
        // name and sha may sit on different lines of the listing
        match self
            .runner()
            .run(&Cmd::sudo(["portoctl", "docker-images"]))
            .await
        {
            Ok(result) => {
                let output = result.output();
                output.contains(name) && (sha.is_empty() || output.contains(sha))
            }
            Err(e) => {
                debug!(error = %e, "portoctl docker-images failed");
                false
            }
        }
    }

    async fn list_images(&self, _options: &ListImagesOptions) -> Result<Vec<ListImage>> {
        cri::list_cri_images(self.runner()).await
    }

    async fn load_image(&self, _path: &Path) -> Result<()> {
        Err(Self::unsupported("load image"))
    }

    async fn pull_image(&self, name: &str) -> Result<()> {
        cri::pull_cri_image(self.runner(), name).await
    }

    async fn save_image(&self, _name: &str, _path: &Path) -> Result<()> {
        Err(Self::unsupported("save image"))
    }

    async fn remove_image(&self, name: &str) -> Result<()> {
        cri::remove_cri_image(self.runner(), name).await
    }

    async fn tag_image(&self, _source: &str, _target: &str) -> Result<()> {
        Err(Self::unsupported("tag image"))
    }

    async fn build_image(&self, _options: &BuildOptions) -> Result<()> {
        Err(Self::unsupported("build image"))
    }

    async fn push_image(&self, _name: &str) -> Result<()> {
        Err(Self::unsupported("push image"))
    }

    fn cgroup_driver(&self) -> Result<CgroupDriver> {
        Ok(CgroupDriver::Systemd)
    }

    fn kubelet_options(&self) -> BTreeMap<String, String> {
        cri::kubelet_cri_options(self.socket_path(), &self.kubernetes_version)
    }

    async fn list_containers(&self, options: &ListContainersOptions) -> Result<Vec<String>> {
        cri::list_cri_containers(self.runner(), None, options).await
    }

    async fn pause_containers(&self, ids: &[String]) -> Result<()> {
        cri::pause_cri_containers(self.runner(), None, ids).await
    }

    async fn unpause_containers(&self, ids: &[String]) -> Result<()> {
        cri::unpause_cri_containers(self.runner(), None, ids).await
    }

    async fn kill_containers(&self, ids: &[String]) -> Result<()> {
        cri::kill_cri_containers(self.runner(), ids).await
    }

    async fn stop_containers(&self, ids: &[String]) -> Result<()> {
        cri::stop_cri_containers(self.runner(), ids).await
    }

    async fn container_log_cmd(&self, id: &str, len: usize, follow: bool) -> String {
        cri::cri_container_log_cmd(self.runner(), id, len, follow).await
    }

    fn system_log_cmd(&self, len: usize) -> String {
        format!("sudo tail -n {} {}", len, LOG_FILE)
    }

    async fn preload(&self, cluster: &ClusterConfig) -> Result<PreloadOutcome> {
        let repository = cluster
            .image_repository
            .as_deref()
            .or(self.image_repository.as_deref());
        let images = self
            .catalog
            .kubeadm_images(repository, &cluster.kubernetes_version)
            .context("getting images")?;

        if self.images_preloaded(&images).await {
            info!("Images already preloaded, skipping pull");
            return Ok(PreloadOutcome::AlreadyPreloaded);
        }

        for image in &images {
            self.pull_image(image)
                .await
                .with_context(|| format!("pulling image {:?}", image))?;
        }
        self.restart().await?;

        Ok(PreloadOutcome::Pulled(images.len()))
    }

    async fn images_preloaded(&self, images: &[String]) -> bool {
        let preloaded = check_preloaded(self.runner(), images).await;
        if preloaded {
            info!("all images are preloaded for porto runtime");
        }
        preloaded
    }
}
