// src/cluster/mod.rs
pub mod orchestrator;
pub mod platform;
pub mod san;
pub mod specs;
pub mod topology;

pub use orchestrator::{
    certs_dir_for, CaSource, CertificateOrchestrator, CertificateSet, ClusterCertificates,
    PkiSettings, UserCaFiles,
};
pub use platform::Platform;
pub use specs::{CaSpec, LeafSpec};
pub use topology::{Entrypoint, Node, Topology};
