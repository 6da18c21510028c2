// src/cert/ca.rs
use super::entity::Certificate;
use super::error::Result;
use super::options::{CertificateOptions, UsedAs};
use std::path::Path;

impl Certificate {
    /// Turns the entity into a self-signed CA: a key is generated when none is
    /// attached and `used_as` is forced to `Ca`.
    pub fn generate_ca(&mut self) -> Result<&mut Self> {
        self.attach_key()?;
        self.options_mut().used_as = UsedAs::Ca;

        let key = self.require_key()?;
        let template = self.options().generate_template(key)?;
        let certificate = template.build_certificate(key, None, key)?;

        self.set_certificate(certificate);
        Ok(self)
    }
}

/// Default options plus [`Certificate::generate_ca`].
pub fn new_ca(common_name: &str, certs_dir: &Path) -> Result<Certificate> {
    let options = CertificateOptions::new(common_name).with_certs_dir(certs_dir);
    let mut ca = Certificate::new(common_name, options);
    ca.generate_ca()?;
    Ok(ca)
}
