// src/cert/mod.rs
pub mod ca;
mod csr;
mod entity;
pub mod error;
pub mod key;
pub mod options;
pub mod pem;
mod signer;
pub mod store;
pub mod template;

pub use ca::new_ca;
pub use entity::Certificate;
pub use error::{ErrorKind, PkiError, Result};
pub use options::{AltNames, CertificateOptions, ExtKeyUsage, UsedAs};
