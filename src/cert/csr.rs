// src/cert/csr.rs
use super::entity::Certificate;
use super::error::Result;

impl Certificate {
    /// Builds a signing request from the options and signs it with the
    /// entity's own key, which must already be attached.
    pub fn generate_csr(&mut self) -> Result<&mut Self> {
        let key = self.require_key()?;
        let template = self.options().generate_csr_template()?;
        let csr = template.build_request(key)?;

        self.set_csr(csr);
        Ok(self)
    }
}
