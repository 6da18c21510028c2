// config/types.rs
use crate::cluster::specs::{default_ca_specs, CaSpec, LeafSpec};
use crate::cluster::{CertificateOrchestrator, Node, PkiSettings, Platform, Topology, UserCaFiles};
use crate::utils::logging::Logger;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{
    fs, io,
    path::{Path, PathBuf},
};

pub const DEFAULT_API_PORT: u16 = 6443;
const CLUSTERS_DIR: &str = ".kubekit.d/clusters";

fn default_port() -> u16 {
    DEFAULT_API_PORT
}

fn invalid(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, message)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_dir: Option<String>,
    pub platform: Platform,
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// VIP address or load balancer DNS name of the API server.
    #[serde(default)]
    pub entrypoint: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// User supplied CA material, keyed by CA name.
    #[serde(default)]
    pub ca_files: BTreeMap<String, UserCaFiles>,
    #[serde(default)]
    pub pki: PkiSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_certs: Option<Vec<CaSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certs: Option<Vec<LeafSpec>>,
}

impl ClusterConfig {
    pub fn new(name: &str, platform: Platform) -> Self {
        Self {
            name: name.to_string(),
            cluster_dir: None,
            platform,
            nodes: Vec::new(),
            entrypoint: String::new(),
            port: DEFAULT_API_PORT,
            ca_files: BTreeMap::new(),
            pki: PkiSettings::default(),
            ca_certs: None,
            certs: None,
        }
    }

    fn is_yaml(path: &Path) -> bool {
        matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yaml") | Some("yml")
        )
    }

    pub fn load_from_file(path: &str) -> io::Result<Self> {
        let config_str = fs::read_to_string(path)?;
        if Self::is_yaml(Path::new(path)) {
            serde_yaml::from_str(&config_str)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
        } else {
            serde_json::from_str(&config_str)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
        }
    }

    pub fn save_to_file(&self, path: &str) -> io::Result<()> {
        let config_str = if Self::is_yaml(Path::new(path)) {
            serde_yaml::to_string(self).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
        } else {
            serde_json::to_string_pretty(self)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
        };
        fs::write(path, config_str)
    }

    pub fn validate(&self) -> io::Result<()> {
        if self.name.trim().is_empty() {
            return Err(invalid("cluster name is required".to_string()));
        }

        if let Some((index, _)) = self
            .nodes
            .iter()
            .enumerate()
            .find(|(_, node)| !node.has_address())
        {
            return Err(invalid(format!("node {} has no IP address or DNS name", index)));
        }

        let ca_specs = self.ca_specs();
        if let Some(unknown) = self
            .ca_files
            .keys()
            .find(|name| !ca_specs.iter().any(|ca| &ca.name == *name))
        {
            return Err(invalid(format!("ca_files names unknown CA: {}", unknown)));
        }
        Ok(())
    }

    pub fn ca_specs(&self) -> Vec<CaSpec> {
        self.ca_certs.clone().unwrap_or_else(default_ca_specs)
    }

    /// Configured directory with `~` expanded, else
    /// `<home>/.kubekit.d/clusters/<name>`.
    pub fn cluster_dir(&self) -> io::Result<PathBuf> {
        if let Some(dir) = &self.cluster_dir {
            return Ok(PathBuf::from(shellexpand::tilde(dir).to_string()));
        }
        let home = dirs::home_dir().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "home directory not found")
        })?;
        Ok(home.join(CLUSTERS_DIR).join(&self.name))
    }

    pub fn topology(&self) -> Topology {
        Topology::new(self.nodes.clone(), &self.entrypoint, self.port)
    }

    pub fn orchestrator(&self, logger: Box<dyn Logger>) -> io::Result<CertificateOrchestrator> {
        self.validate()?;
        let mut orchestrator = CertificateOrchestrator::new(
            &self.name,
            self.platform,
            &self.cluster_dir()?,
            self.topology(),
            logger,
        )
        .with_ca_specs(self.ca_specs())
        .with_user_ca_files(self.ca_files.clone())
        .with_settings(self.pki.clone());

        if let Some(certs) = &self.certs {
            orchestrator = orchestrator.with_leaf_specs(certs.clone());
        }
        Ok(orchestrator)
    }
}
