// src/lib.rs
//! Certificate authority and signed-certificate lifecycle for KubeKit
//! clusters.

pub mod cert;
pub mod cluster;
pub mod config;
pub mod discovery;
pub mod tls;
pub mod utils;

pub use cert::{Certificate, CertificateOptions, PkiError, Result};
pub use cluster::{CertificateOrchestrator, Platform};
pub use config::ClusterConfig;
