//! Kubernetes control-plane image catalog.

use semver::Version;
use tracing::debug;

use super::error::{Result, RuntimeError};

pub const DEFAULT_IMAGE_REPOSITORY: &str = "registry.k8s.io";

/// Resolves the images a Kubernetes release needs on every node.
pub trait ImageCatalog: Send + Sync {
    fn kubeadm_images(&self, repository: Option<&str>, version: &Version) -> Result<Vec<String>>;
}

/// Image tags kubeadm pins for one minor release.
struct Pins {
    minor: u64,
    pause: &'static str,
    etcd: &'static str,
    coredns: &'static str,
}

impl Pins {
    const fn new(
        minor: u64,
        pause: &'static str,
        etcd: &'static str,
        coredns: &'static str,
    ) -> Self {
        Self {
            minor,
            pause,
            etcd,
            coredns,
        }
    }
}

const PINS: &[Pins] = &[
    Pins::new(22, "3.5", "3.5.0-0", "v1.8.4"),
    Pins::new(23, "3.6", "3.5.1-0", "v1.8.6"),
    Pins::new(24, "3.7", "3.5.3-0", "v1.8.6"),
    Pins::new(25, "3.8", "3.5.4-0", "v1.9.3"),
    Pins::new(26, "3.9", "3.5.6-0", "v1.9.3"),
    Pins::new(27, "3.9", "3.5.7-0", "v1.10.1"),
    Pins::new(28, "3.9", "3.5.9-0", "v1.10.1"),
    Pins::new(29, "3.9", "3.5.10-0", "v1.11.1"),
    Pins::new(30, "3.9", "3.5.12-0", "v1.11.1"),
    Pins::new(31, "3.10", "3.5.15-0", "v1.11.1"),
];

/// Catalog built from kubeadm's pinned component versions.
#[derive(Debug, Clone, Copy, Default)]
pub struct KubeadmCatalog;

impl KubeadmCatalog {
    fn pins(version: &Version) -> Result<&'static Pins> {
        let unsupported = || {
            RuntimeError::Catalog(format!("no image list for Kubernetes v{}", version))
        };

        if version.major != 1 {
            return Err(unsupported());
        }
        if let Some(pins) = PINS.iter().find(|p| p.minor == version.minor) {
            return Ok(pins);
        }
        match PINS.last() {
            Some(newest) if version.minor > newest.minor => {
                debug!(version = %version, "newer than known releases, using newest image pins");
                Ok(newest)
            }
            _ => Err(unsupported()),
        }
    }
}

impl ImageCatalog for KubeadmCatalog {
    fn kubeadm_images(&self, repository: Option<&str>, version: &Version) -> Result<Vec<String>> {
        let pins = Self::pins(version)?;
        let repo = repository
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_IMAGE_REPOSITORY)
            .trim_end_matches('/');
        let k8s_tag = format!("v{}.{}.{}", version.major, version.minor, version.patch);

        let mut images: Vec<String> = [
            "kube-apiserver",
            "kube-controller-manager",
            "kube-scheduler",
            "kube-proxy",
        ]
        .iter()
        .map(|component| format!("{}/{}:{}", repo, component, k8s_tag))
        .collect();

        images.push(format!("{}/pause:{}", repo, pins.pause));
        images.push(format!("{}/etcd:{}", repo, pins.etcd));
        // Mirrors flatten coredns to `<repo>/coredns`.
        let coredns = if repo == DEFAULT_IMAGE_REPOSITORY {
            "coredns/coredns"
        } else {
            "coredns"
        };
        images.push(format!("{}/{}:{}", repo, coredns, pins.coredns));
        Ok(images)
    }
}
