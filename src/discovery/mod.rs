// src/discovery/mod.rs
mod discover;

pub use discover::{
    analyze_certificate, discover_certificates, expiration_status, validate_certificate_chain,
    CertificateInfo, ExpirationStatus,
};
