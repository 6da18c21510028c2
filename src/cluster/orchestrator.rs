// src/cluster/orchestrator.rs
use super::platform::Platform;
use super::san::{self, has_hostname_placeholder, substitute_hostname, NodeContext, SanKind};
use super::specs::{default_ca_specs, default_leaf_specs, CaSpec, LeafSpec};
use super::topology::Topology;
use crate::cert::key::{private_key_from_pem, DEFAULT_KEY_BITS};
use crate::cert::store::read_file;
use crate::cert::{Certificate, CertificateOptions, PkiError, Result, UsedAs};
use crate::utils::logging::Logger;
use openssl::pkey::{PKey, Private};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const CERTIFICATES_DIR: &str = "certificates";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PkiSettings {
    pub key_bits: u32,
    pub ca_duration_days: u32,
    pub duration_days: u32,
    /// Encrypts every generated private key when non-empty.
    #[serde(skip_serializing)]
    pub passphrase: String,
    /// Dedicated CAs without their own material reuse the generic CA key.
    pub share_generic_ca_key: bool,
    /// Always part of every leaf's IP SANs.
    pub generic_ips: Vec<String>,
    /// Always part of every leaf's DNS SANs.
    pub generic_dns: Vec<String>,
}

impl Default for PkiSettings {
    fn default() -> Self {
        Self {
            key_bits: DEFAULT_KEY_BITS,
            ca_duration_days: 3650,
            duration_days: 365,
            passphrase: String::new(),
            share_generic_ca_key: true,
            generic_ips: vec!["127.0.0.1".to_string()],
            generic_dns: vec!["localhost".to_string()],
        }
    }
}

/// CA material supplied by the user for one CA slot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserCaFiles {
    pub key_file: Option<PathBuf>,
    pub cert_file: Option<PathBuf>,
    #[serde(skip_serializing)]
    pub passphrase: String,
}

/// Certificates keyed by name, in the order they were produced.
#[derive(Debug, Default)]
pub struct CertificateSet {
    entries: Vec<Certificate>,
}

impl CertificateSet {
    pub fn insert(&mut self, certificate: Certificate) {
        match self
            .entries
            .iter_mut()
            .find(|c| c.name() == certificate.name())
        {
            Some(existing) => *existing = certificate,
            None => self.entries.push(certificate),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Certificate> {
        self.entries.iter().find(|c| c.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(Certificate::name).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Certificate> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct ClusterCertificates {
    pub cas: CertificateSet,
    pub leaves: CertificateSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaSource {
    UserSupplied {
        key_file: PathBuf,
        cert_file: Option<PathBuf>,
        passphrase: String,
    },
    Existing {
        cert_present: bool,
    },
    Generic,
    Fresh,
}

/// Decides, per CA and per leaf certificate of one cluster, whether to load,
/// derive or generate, and writes the result under the cluster's
/// certificate directory.
///
/// The caller must hold the cluster lock for the duration of a pass.
pub struct CertificateOrchestrator {
    cluster_name: String,
    platform: Platform,
    certs_dir: PathBuf,
    topology: Topology,
    user_ca_files: BTreeMap<String, UserCaFiles>,
    ca_specs: Vec<CaSpec>,
    leaf_specs: Vec<LeafSpec>,
    settings: PkiSettings,
    force: bool,
    logger: Box<dyn Logger>,
}

/// `<cluster-dir>/certificates/[<platform>/]`; platforms that manage their own
/// control-plane PKI get their own subdirectory.
pub fn certs_dir_for(cluster_dir: &Path, platform: Platform) -> PathBuf {
    let dir = cluster_dir.join(CERTIFICATES_DIR);
    if platform.manages_control_plane_pki() {
        dir.join(platform.as_str())
    } else {
        dir
    }
}

impl CertificateOrchestrator {
    pub fn new(
        cluster_name: &str,
        platform: Platform,
        cluster_dir: &Path,
        topology: Topology,
        logger: Box<dyn Logger>,
    ) -> Self {
        Self {
            cluster_name: cluster_name.to_string(),
            platform,
            certs_dir: certs_dir_for(cluster_dir, platform),
            topology,
            user_ca_files: BTreeMap::new(),
            ca_specs: default_ca_specs(),
            leaf_specs: default_leaf_specs(),
            settings: PkiSettings::default(),
            force: false,
            logger,
        }
    }

    pub fn with_ca_specs(mut self, ca_specs: Vec<CaSpec>) -> Self {
        self.ca_specs = ca_specs;
        self
    }

    pub fn with_leaf_specs(mut self, leaf_specs: Vec<LeafSpec>) -> Self {
        self.leaf_specs = leaf_specs;
        self
    }

    pub fn with_user_ca_files(mut self, files: BTreeMap<String, UserCaFiles>) -> Self {
        self.user_ca_files = files;
        self
    }

    pub fn with_settings(mut self, settings: PkiSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn certs_dir(&self) -> &Path {
        &self.certs_dir
    }

    pub fn log(&mut self, message: &str) {
        self.logger.log(message);
    }

    pub fn debug_log(&mut self, message: &str) {
        self.logger.debug_log(message);
    }

    fn warn(&mut self, message: &str) {
        self.logger.warn(message);
    }

    /// Full pass: every required CA, then every leaf. Fails on the first error.
    pub fn generate(&mut self) -> Result<ClusterCertificates> {
        self.log(&format!(
            "Generating certificates for cluster {} ({}) in {}",
            self.cluster_name,
            self.platform,
            self.certs_dir.display()
        ));
        fs::create_dir_all(&self.certs_dir)?;

        let cas = self.generate_cas()?;
        let leaves = self.generate_leaves(&cas)?;

        self.log(&format!(
            "Certificates ready: {} CAs, {} leaf certificates",
            cas.len(),
            leaves.len()
        ));
        Ok(ClusterCertificates { cas, leaves })
    }

    /// CA names materialized on this platform. Platforms with a managed
    /// control plane only get the CAs their remaining leaves are signed by.
    pub fn required_ca_names(&self) -> Vec<String> {
        self.ca_specs
            .iter()
            .filter(|ca| {
                !self.platform.manages_control_plane_pki()
                    || self
                        .leaf_specs
                        .iter()
                        .any(|leaf| leaf.ca == ca.name && self.platform.includes_leaf(&leaf.name))
            })
            .map(|ca| ca.name.clone())
            .collect()
    }

    fn ordered_ca_specs(&self) -> Result<Vec<CaSpec>> {
        let generic: Vec<&CaSpec> = self.ca_specs.iter().filter(|c| c.generic).collect();
        if generic.len() != 1 {
            return Err(PkiError::Validation(format!(
                "exactly one generic CA is required, found {}",
                generic.len()
            )));
        }

        let mut ordered = vec![generic[0].clone()];
        ordered.extend(self.ca_specs.iter().filter(|c| !c.generic).cloned());
        Ok(ordered)
    }

    pub fn generate_cas(&mut self) -> Result<CertificateSet> {
        fs::create_dir_all(&self.certs_dir)?;
        let required = self.required_ca_names();
        let mut cas = CertificateSet::default();
        let mut generic_key: Option<PKey<Private>> = None;

        for spec in self.ordered_ca_specs()? {
            if !required.contains(&spec.name) {
                self.debug_log(&format!(
                    "Skipping CA {}: not used on platform {}",
                    spec.name, self.platform
                ));
                continue;
            }

            let ca = self.materialize_ca(&spec, generic_key.as_ref())?;
            if spec.generic {
                generic_key = ca.private_key().cloned();
            }
            cas.insert(ca);
        }

        Ok(cas)
    }

    fn ca_options(&self, spec: &CaSpec) -> CertificateOptions {
        let mut options =
            CertificateOptions::new(&spec.common_name).with_certs_dir(&self.certs_dir);
        options.key_file = Some(self.certs_dir.join(format!("{}.key", spec.name)));
        options.cert_file = Some(self.certs_dir.join(format!("{}.crt", spec.name)));
        options.bits = self.settings.key_bits;
        options.passphrase = self.settings.passphrase.clone();
        options.duration_days = self.settings.ca_duration_days;
        options.used_as = UsedAs::Ca;
        options
    }

    /// Where the material for a CA slot comes from, in order of preference:
    /// user files, a previous run, the generic CA key, a fresh key.
    pub fn resolve_ca_source(&mut self, spec: &CaSpec, generic_available: bool) -> CaSource {
        if let Some(files) = self.user_ca_files.get(&spec.name).cloned() {
            match (&files.key_file, &files.cert_file) {
                (None, Some(cert_file)) => self.warn(&format!(
                    "CA {}: certificate file {} was given without a key file, ignoring it",
                    spec.name,
                    cert_file.display()
                )),
                (Some(key_file), cert_file) if key_file.exists() => {
                    let cert_file = match cert_file {
                        Some(path) if !path.exists() => {
                            self.warn(&format!(
                                "CA {}: certificate file {} does not exist, it will be generated",
                                spec.name,
                                path.display()
                            ));
                            None
                        }
                        other => other.clone(),
                    };
                    let passphrase = if files.passphrase.is_empty() {
                        self.settings.passphrase.clone()
                    } else {
                        files.passphrase.clone()
                    };
                    return CaSource::UserSupplied {
                        key_file: key_file.clone(),
                        cert_file,
                        passphrase,
                    };
                }
                (Some(key_file), _) => self.warn(&format!(
                    "CA {}: key file {} does not exist, ignoring user CA files",
                    spec.name,
                    key_file.display()
                )),
                (None, None) => {}
            }
        }

        let options = self.ca_options(spec);
        if !self.force && options.key_path().exists() {
            return CaSource::Existing {
                cert_present: options.cert_path().exists(),
            };
        }

        if !spec.generic && generic_available && self.settings.share_generic_ca_key {
            return CaSource::Generic;
        }

        CaSource::Fresh
    }

    fn materialize_ca(
        &mut self,
        spec: &CaSpec,
        generic_key: Option<&PKey<Private>>,
    ) -> Result<Certificate> {
        let options = self.ca_options(spec);
        let key_path = options.key_path();
        let cert_path = options.cert_path();
        let mut ca = Certificate::new(&spec.name, options);

        match self.resolve_ca_source(spec, generic_key.is_some()) {
            CaSource::UserSupplied {
                key_file,
                cert_file,
                passphrase,
            } => {
                self.log(&format!(
                    "CA {}: using user supplied key {}",
                    spec.name,
                    key_file.display()
                ));
                let pem = read_file(&key_file)?;
                ca.set_private_key(private_key_from_pem(&pem, &passphrase)?);
                match cert_file {
                    Some(path) => {
                        ca.read_cert_file(&path)?;
                    }
                    None => {
                        if !self.reuse_matching_certificate(&mut ca, &cert_path) {
                            ca.generate_ca()?;
                        }
                    }
                }
                self.store_imported_ca(&mut ca, &key_path, &cert_path)?;
            }
            CaSource::Existing { cert_present } => {
                ca.read_key_file(&key_path)?;
                if cert_present {
                    ca.read_cert_file(&cert_path)?;
                    self.log(&format!("CA {}: reusing {}", spec.name, cert_path.display()));
                } else {
                    self.log(&format!(
                        "CA {}: key found without certificate, generating certificate",
                        spec.name
                    ));
                    ca.generate_ca()?.write_cert_file(&cert_path)?;
                }
            }
            CaSource::Generic => {
                let key = generic_key.cloned().ok_or_else(|| {
                    PkiError::Precondition("generic CA has not been materialized".to_string())
                })?;
                self.log(&format!(
                    "CA {}: no dedicated material, deriving from the generic CA key",
                    spec.name
                ));
                ca.set_private_key(key);
                ca.generate_ca()?.persist()?;
            }
            CaSource::Fresh => {
                self.log(&format!("CA {}: generating new key and certificate", spec.name));
                ca.generate_ca()?.persist()?;
            }
        }

        Ok(ca)
    }

    /// A certificate left by an earlier import is reused when it belongs to
    /// the supplied key.
    fn reuse_matching_certificate(&mut self, ca: &mut Certificate, cert_path: &Path) -> bool {
        let Some(key) = ca.private_key().cloned() else {
            return false;
        };
        let matches = read_file(cert_path)
            .ok()
            .and_then(|pem| crate::cert::store::certificate_from_pem(&pem).ok())
            .filter(|cert| {
                cert.public_key()
                    .map(|public| public.public_eq(&key))
                    .unwrap_or(false)
            });

        match matches {
            Some(cert) => {
                self.debug_log(&format!(
                    "CA {}: existing certificate matches the supplied key",
                    ca.name()
                ));
                ca.set_certificate(cert);
                true
            }
            None => false,
        }
    }

    /// Copies imported material into the cluster directory, leaving files
    /// that already hold the same key or certificate untouched.
    fn store_imported_ca(
        &mut self,
        ca: &mut Certificate,
        key_path: &Path,
        cert_path: &Path,
    ) -> Result<()> {
        let passphrase = ca.options().passphrase.clone();
        let same_key = match (read_file(key_path).ok(), ca.private_key()) {
            (Some(pem), Some(key)) => private_key_from_pem(&pem, &passphrase)
                .map(|existing| existing.public_eq(key))
                .unwrap_or(false),
            _ => false,
        };
        if !same_key {
            ca.write_key_file(key_path)?;
        }

        let cert_pem = ca.certificate_to_pem()?;
        if read_file(cert_path).ok().as_deref() != Some(cert_pem.as_slice()) {
            ca.write_cert_file(cert_path)?;
        }
        Ok(())
    }

    pub fn generate_leaves(&mut self, cas: &CertificateSet) -> Result<CertificateSet> {
        let specs = self.leaf_specs.clone();
        let mut leaves = CertificateSet::default();

        for spec in &specs {
            if !self.platform.includes_leaf(&spec.name) {
                self.debug_log(&format!(
                    "Skipping certificate {}: not used on platform {}",
                    spec.name, self.platform
                ));
                continue;
            }

            let ca = cas.get(&spec.ca).ok_or_else(|| {
                PkiError::Precondition(format!(
                    "certificate {} is signed by CA {}, which was not generated",
                    spec.name, spec.ca
                ))
            })?;

            let planned = self.plan_leaf(spec);
            if planned.is_empty() {
                self.warn(&format!(
                    "Certificate {} is per node but the cluster has no nodes",
                    spec.name
                ));
            }
            for (name, options) in planned {
                let leaf = self.issue_leaf(&name, options, ca)?;
                leaves.insert(leaf);
            }
        }

        Ok(leaves)
    }

    /// Names and options of the certificates a leaf spec expands to: one per
    /// node (`name@hostname`) for per-node specs, otherwise exactly one.
    pub fn plan_leaf(&self, spec: &LeafSpec) -> Vec<(String, CertificateOptions)> {
        if !has_hostname_placeholder(&spec.common_name) {
            let options = self.leaf_options(spec, &spec.common_name, &self.certs_dir, None);
            return vec![(spec.name.clone(), options)];
        }

        self.topology
            .nodes
            .iter()
            .zip(self.topology.hostnames())
            .map(|(node, hostname)| {
                let context = NodeContext {
                    hostname: &hostname,
                    node,
                };
                let common_name = substitute_hostname(&spec.common_name, &hostname);
                let dir = self.certs_dir.join(&hostname);
                let options = self.leaf_options(spec, &common_name, &dir, Some(context));
                (format!("{}@{}", spec.name, hostname), options)
            })
            .collect()
    }

    fn leaf_options(
        &self,
        spec: &LeafSpec,
        common_name: &str,
        dir: &Path,
        node: Option<NodeContext<'_>>,
    ) -> CertificateOptions {
        let mut options = CertificateOptions::new(common_name).with_certs_dir(dir);
        options.key_file = Some(dir.join(format!("{}.key", spec.name)));
        options.cert_file = Some(dir.join(format!("{}.crt", spec.name)));
        options.bits = self.settings.key_bits;
        options.passphrase = self.settings.passphrase.clone();
        options.duration_days = self.settings.duration_days;
        options.organization = spec.organization.clone();
        options.used_as = UsedAs::from_ext_key_usage(&spec.ext_key_usage);
        options.ext_key_usage = spec.ext_key_usage.clone();

        let ips = san::resolve(
            &spec.ip_addresses,
            SanKind::Ip,
            &self.topology,
            node,
            &self.settings.generic_ips,
        );
        let dns = san::resolve(
            &spec.dns_names,
            SanKind::Dns,
            &self.topology,
            node,
            &self.settings.generic_dns,
        );
        options.add_alt_names(&ips);
        options.add_alt_names(&dns);
        options
    }

    /// Reuses the certificate on disk when both files load; otherwise issues
    /// and persists a new one. A reused certificate is not compared with the
    /// current SAN or usage configuration. Forced passes always reissue.
    fn issue_leaf(
        &mut self,
        name: &str,
        options: CertificateOptions,
        ca: &Certificate,
    ) -> Result<Certificate> {
        if !self.force {
            let mut existing = Certificate::new(name, options.clone());
            match existing.load().map(|_| ()) {
                Ok(_) => {
                    self.log(&format!(
                        "Certificate {} found at {}, reusing it",
                        name,
                        options.cert_path().display()
                    ));
                    return Ok(existing);
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        fs::create_dir_all(&options.certs_dir)?;
        let mut leaf = Certificate::new(name, options);
        leaf.generate_signed_certificate(ca)?.persist()?;
        self.log(&format!(
            "Certificate {} ({}) issued by {}",
            name,
            leaf.options().common_name,
            ca.name()
        ));
        Ok(leaf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::specs::{ETCD_ROOT_CA, INGRESS_ROOT_CA, ROOT_CA};
    use crate::cluster::topology::Node;
    use crate::utils::logging::tests::MockLogger;
    use tempfile::TempDir;

    fn settings() -> PkiSettings {
        PkiSettings {
            key_bits: 2048,
            ..PkiSettings::default()
        }
    }

    fn topology() -> Topology {
        Topology::new(
            vec![
                Node {
                    private_ip: "10.0.0.1".to_string(),
                    private_dns: "master-0.internal".to_string(),
                    role: "master".to_string(),
                    ..Node::default()
                },
                Node {
                    private_ip: "10.0.0.2".to_string(),
                    private_dns: "master-1.internal".to_string(),
                    role: "master".to_string(),
                    ..Node::default()
                },
                Node {
                    private_ip: "10.0.1.1".to_string(),
                    role: "worker".to_string(),
                    ..Node::default()
                },
            ],
            "10.0.0.100",
            6443,
        )
    }

    fn leaf(name: &str, common_name: &str, ca: &str) -> LeafSpec {
        LeafSpec {
            name: name.to_string(),
            common_name: common_name.to_string(),
            organization: String::new(),
            dns_names: Vec::new(),
            ip_addresses: Vec::new(),
            ca: ca.to_string(),
            ext_key_usage: Vec::new(),
        }
    }

    fn two_cas() -> Vec<CaSpec> {
        vec![
            CaSpec {
                name: ROOT_CA.to_string(),
                common_name: "kubernetes-ca".to_string(),
                generic: true,
            },
            CaSpec {
                name: ETCD_ROOT_CA.to_string(),
                common_name: "etcd-ca".to_string(),
                generic: false,
            },
        ]
    }

    fn user_ca(dir: &Path) -> Certificate {
        fs::create_dir_all(dir).unwrap();
        let mut options = CertificateOptions::new("corp-root").with_certs_dir(dir);
        options.bits = 2048;
        let mut ca = Certificate::new("corp-root", options);
        ca.generate_ca().unwrap().persist().unwrap();
        ca
    }

    fn orchestrator(dir: &Path, platform: Platform, logger: MockLogger) -> CertificateOrchestrator {
        CertificateOrchestrator::new("test", platform, dir, topology(), Box::new(logger))
            .with_settings(settings())
            .with_ca_specs(two_cas())
            .with_leaf_specs(Vec::new())
    }

    #[test]
    fn certs_dir_layout() {
        let root = Path::new("/clusters/demo");
        assert_eq!(
            certs_dir_for(root, Platform::Ec2),
            PathBuf::from("/clusters/demo/certificates")
        );
        assert_eq!(
            certs_dir_for(root, Platform::Eks),
            PathBuf::from("/clusters/demo/certificates/eks")
        );
    }

    #[test]
    fn dedicated_ca_falls_back_to_generic_key() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(dir.path(), Platform::Ec2, MockLogger::default());
        let cas = orch.generate_cas().unwrap();

        assert_eq!(cas.names(), vec![ROOT_CA, ETCD_ROOT_CA]);
        let root = cas.get(ROOT_CA).unwrap();
        let etcd = cas.get(ETCD_ROOT_CA).unwrap();
        assert!(root
            .private_key()
            .unwrap()
            .public_eq(etcd.private_key().unwrap()));
        assert_ne!(
            root.certificate_to_pem().unwrap(),
            etcd.certificate_to_pem().unwrap()
        );
        assert_eq!(etcd.options().common_name, "etcd-ca");
        assert!(orch.certs_dir().join("etcd_root_ca.key").exists());
        assert!(orch.certs_dir().join("etcd_root_ca.crt").exists());
    }

    #[test]
    fn key_sharing_can_be_disabled() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings();
        settings.share_generic_ca_key = false;
        let mut orch =
            orchestrator(dir.path(), Platform::Ec2, MockLogger::default()).with_settings(settings);
        let cas = orch.generate_cas().unwrap();

        let root = cas.get(ROOT_CA).unwrap().private_key().unwrap();
        let etcd = cas.get(ETCD_ROOT_CA).unwrap().private_key().unwrap();
        assert!(!root.public_eq(etcd));
    }

    #[test]
    fn generic_ca_must_be_unique() {
        let dir = TempDir::new().unwrap();
        let mut specs = two_cas();
        specs[1].generic = true;
        let mut orch =
            orchestrator(dir.path(), Platform::Ec2, MockLogger::default()).with_ca_specs(specs);
        assert!(matches!(
            orch.generate_cas().unwrap_err(),
            PkiError::Validation(_)
        ));
    }

    #[test]
    fn user_supplied_ca_is_used_as_is() {
        let dir = TempDir::new().unwrap();
        let user_dir = dir.path().join("user");
        let user_ca = user_ca(&user_dir);

        let mut files = BTreeMap::new();
        files.insert(
            ROOT_CA.to_string(),
            UserCaFiles {
                key_file: Some(user_dir.join("corp-root.key")),
                cert_file: Some(user_dir.join("corp-root.crt")),
                passphrase: String::new(),
            },
        );
        let mut orch = orchestrator(dir.path(), Platform::Ec2, MockLogger::default())
            .with_user_ca_files(files);
        let cas = orch.generate_cas().unwrap();

        let root = cas.get(ROOT_CA).unwrap();
        assert_eq!(
            root.certificate_to_pem().unwrap(),
            user_ca.certificate_to_pem().unwrap()
        );
        assert_eq!(
            fs::read(orch.certs_dir().join("root_ca.crt")).unwrap(),
            user_ca.certificate_to_pem().unwrap()
        );
    }

    #[test]
    fn user_key_without_cert_reuses_previous_import() {
        let dir = TempDir::new().unwrap();
        let user_dir = dir.path().join("user");
        let user_ca = user_ca(&user_dir);

        let mut files = BTreeMap::new();
        files.insert(
            ROOT_CA.to_string(),
            UserCaFiles {
                key_file: Some(user_dir.join("corp-root.key")),
                ..UserCaFiles::default()
            },
        );

        let first = orchestrator(dir.path(), Platform::Ec2, MockLogger::default())
            .with_user_ca_files(files.clone())
            .generate_cas()
            .unwrap();
        let root = first.get(ROOT_CA).unwrap();
        assert!(root
            .certificate()
            .unwrap()
            .public_key()
            .unwrap()
            .public_eq(user_ca.private_key().unwrap()));

        let second = orchestrator(dir.path(), Platform::Ec2, MockLogger::default())
            .with_user_ca_files(files)
            .generate_cas()
            .unwrap();
        assert_eq!(
            second.get(ROOT_CA).unwrap().certificate_to_pem().unwrap(),
            root.certificate_to_pem().unwrap()
        );
    }

    #[test]
    fn cert_without_key_is_discarded_with_warning() {
        let dir = TempDir::new().unwrap();
        let logger = MockLogger::default();
        let mut files = BTreeMap::new();
        files.insert(
            ROOT_CA.to_string(),
            UserCaFiles {
                cert_file: Some(dir.path().join("orphan.crt")),
                ..UserCaFiles::default()
            },
        );
        let mut orch =
            orchestrator(dir.path(), Platform::Ec2, logger.clone()).with_user_ca_files(files);
        let spec = two_cas().remove(0);

        assert_eq!(orch.resolve_ca_source(&spec, false), CaSource::Fresh);
        assert!(logger
            .lines()
            .iter()
            .any(|l| l.contains("[WARN]") && l.contains("without a key file")));
    }

    #[test]
    fn previous_run_is_reused_unless_forced() {
        let dir = TempDir::new().unwrap();
        let first = orchestrator(dir.path(), Platform::Ec2, MockLogger::default())
            .generate_cas()
            .unwrap();
        let root_pem = first.get(ROOT_CA).unwrap().certificate_to_pem().unwrap();

        let mut again = orchestrator(dir.path(), Platform::Ec2, MockLogger::default());
        let spec = two_cas().remove(0);
        assert_eq!(
            again.resolve_ca_source(&spec, false),
            CaSource::Existing { cert_present: true }
        );
        let second = again.generate_cas().unwrap();
        assert_eq!(
            second.get(ROOT_CA).unwrap().certificate_to_pem().unwrap(),
            root_pem
        );

        let forced = orchestrator(dir.path(), Platform::Ec2, MockLogger::default())
            .force(true)
            .generate_cas()
            .unwrap();
        assert_ne!(
            forced.get(ROOT_CA).unwrap().certificate_to_pem().unwrap(),
            root_pem
        );
    }

    #[test]
    fn missing_ca_certificate_is_regenerated_from_key() {
        let dir = TempDir::new().unwrap();
        let first = orchestrator(dir.path(), Platform::Ec2, MockLogger::default())
            .generate_cas()
            .unwrap();
        let certs_dir = certs_dir_for(dir.path(), Platform::Ec2);
        fs::remove_file(certs_dir.join("root_ca.crt")).unwrap();

        let second = orchestrator(dir.path(), Platform::Ec2, MockLogger::default())
            .generate_cas()
            .unwrap();
        let before = first.get(ROOT_CA).unwrap();
        let after = second.get(ROOT_CA).unwrap();
        assert!(after
            .certificate()
            .unwrap()
            .public_key()
            .unwrap()
            .public_eq(before.private_key().unwrap()));
        assert!(certs_dir.join("root_ca.crt").exists());
    }

    #[test]
    fn per_node_leaves_expand_by_hostname() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(dir.path(), Platform::Ec2, MockLogger::default())
            .with_leaf_specs(vec![leaf("kubelet", "system:node:{{ hostname }}", ROOT_CA)]);
        let certs = orch.generate().unwrap();

        assert_eq!(
            certs.leaves.names(),
            vec!["kubelet@master-0", "kubelet@master-1", "kubelet@node-2"]
        );
        let kubelet = certs.leaves.get("kubelet@node-2").unwrap();
        assert_eq!(kubelet.options().common_name, "system:node:node-2");
        assert!(orch.certs_dir().join("node-2").join("kubelet.crt").exists());
    }

    #[test]
    fn nodes_sharing_a_short_name_get_separate_certificates() {
        let dir = TempDir::new().unwrap();
        let zone_node = |ip: &str, dns: &str| Node {
            private_ip: ip.to_string(),
            private_dns: dns.to_string(),
            role: "master".to_string(),
            ..Node::default()
        };
        let topology = Topology::new(
            vec![
                zone_node("10.0.0.1", "master.zone-a.internal"),
                zone_node("10.0.0.2", "master.zone-b.internal"),
            ],
            "",
            6443,
        );
        let mut spec = leaf("kubelet", "system:node:{{hostname }}", ROOT_CA);
        spec.ip_addresses = vec!["{{ hostname }}".to_string()];
        let mut orch = CertificateOrchestrator::new(
            "test",
            Platform::Ec2,
            dir.path(),
            topology,
            Box::new(MockLogger::default()),
        )
        .with_settings(settings())
        .with_ca_specs(two_cas())
        .with_leaf_specs(vec![spec]);
        let certs = orch.generate().unwrap();

        assert_eq!(
            certs.leaves.names(),
            vec!["kubelet@master.zone-a.internal", "kubelet@master.zone-b.internal"]
        );
        for (name, ip) in [
            ("kubelet@master.zone-a.internal", "10.0.0.1"),
            ("kubelet@master.zone-b.internal", "10.0.0.2"),
        ] {
            let kubelet = certs.leaves.get(name).unwrap();
            let ips: Vec<String> = kubelet
                .options()
                .ip_addresses
                .iter()
                .map(|ip| ip.to_string())
                .collect();
            assert!(ips.contains(&ip.to_string()), "{} lacks {}", name, ip);
            assert_eq!(ips.iter().filter(|a| a.starts_with("10.0.0.")).count(), 1);
        }
        let a = certs.leaves.get("kubelet@master.zone-a.internal").unwrap();
        let b = certs.leaves.get("kubelet@master.zone-b.internal").unwrap();
        assert_ne!(a.options().cert_path(), b.options().cert_path());
        assert_ne!(a.certificate_to_pem().unwrap(), b.certificate_to_pem().unwrap());
        assert_eq!(a.options().common_name, "system:node:master.zone-a.internal");
    }

    #[test]
    fn forced_pass_reissues_leaves() {
        let dir = TempDir::new().unwrap();
        let specs = vec![leaf("admin", "admin", ROOT_CA)];
        let first = orchestrator(dir.path(), Platform::Ec2, MockLogger::default())
            .with_leaf_specs(specs.clone())
            .generate()
            .unwrap();
        let forced = orchestrator(dir.path(), Platform::Ec2, MockLogger::default())
            .with_leaf_specs(specs)
            .force(true)
            .generate()
            .unwrap();

        let admin = forced.leaves.get("admin").unwrap().certificate().unwrap();
        let root = forced.cas.get(ROOT_CA).unwrap();
        assert!(admin.verify(root.private_key().unwrap()).unwrap());
        assert_ne!(
            first.leaves.get("admin").unwrap().certificate_to_pem().unwrap(),
            forced.leaves.get("admin").unwrap().certificate_to_pem().unwrap()
        );
    }

    #[test]
    fn leaf_with_unknown_ca_aborts() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(dir.path(), Platform::Ec2, MockLogger::default())
            .with_leaf_specs(vec![leaf("admin", "admin", "missing_ca")]);
        assert!(matches!(
            orch.generate().unwrap_err(),
            PkiError::Precondition(_)
        ));
    }

    #[test]
    fn managed_platforms_only_build_cas_their_leaves_need() {
        let dir = TempDir::new().unwrap();
        let orch = CertificateOrchestrator::new(
            "test",
            Platform::Aks,
            dir.path(),
            topology(),
            Box::new(MockLogger::default()),
        );
        assert_eq!(orch.required_ca_names(), vec![INGRESS_ROOT_CA.to_string()]);

        let orch = CertificateOrchestrator::new(
            "test",
            Platform::Eks,
            dir.path(),
            topology(),
            Box::new(MockLogger::default()),
        );
        assert_eq!(orch.required_ca_names(), vec![INGRESS_ROOT_CA.to_string()]);

        let orch = CertificateOrchestrator::new(
            "test",
            Platform::Vsphere,
            dir.path(),
            topology(),
            Box::new(MockLogger::default()),
        );
        assert_eq!(orch.required_ca_names().len(), 4);
    }

    #[test]
    fn leaf_options_resolve_sans() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(dir.path(), Platform::Ec2, MockLogger::default());
        let mut spec = leaf("kube_apiserver", "kube-apiserver", ROOT_CA);
        spec.ip_addresses = vec!["{{ masters }}".to_string(), "{{ VIP }}".to_string()];
        spec.dns_names = vec!["kubernetes".to_string()];

        let planned = orch.plan_leaf(&spec);
        assert_eq!(planned.len(), 1);
        let options = &planned[0].1;
        let ips: Vec<String> = options.ip_addresses.iter().map(|ip| ip.to_string()).collect();
        assert_eq!(ips, vec!["127.0.0.1", "10.0.0.1", "10.0.0.2", "10.0.0.100"]);
        assert_eq!(options.dns_names, vec!["localhost", "kubernetes"]);
        assert_eq!(options.used_as, UsedAs::Server);
    }
}
