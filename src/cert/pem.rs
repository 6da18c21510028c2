// src/cert/pem.rs
use super::error::{PkiError, Result};
use ::pem::Pem;

pub const RSA_PRIVATE_KEY: &str = "RSA PRIVATE KEY";
pub const CERTIFICATE: &str = "CERTIFICATE";

/// Decodes the first PEM block in `data` and checks its type label. Framing,
/// base64 and label errors are all `Parse`, before openssl sees the bytes.
pub fn parse_block(data: &[u8], tag: &str) -> Result<Pem> {
    let block = ::pem::parse(data)
        .map_err(|e| PkiError::Parse(format!("failed to parse PEM: {}", e)))?;
    if block.tag() != tag {
        return Err(PkiError::Parse(format!(
            "unexpected PEM block type {:?}, expected {:?}",
            block.tag(),
            tag
        )));
    }
    if block.contents().is_empty() {
        return Err(PkiError::Parse(format!("empty {} block", tag)));
    }
    Ok(block)
}

/// `Proc-Type: 4,ENCRYPTED`
pub fn is_encrypted(block: &Pem) -> bool {
    block
        .headers()
        .get("Proc-Type")
        .map(|value| value.contains("ENCRYPTED"))
        .unwrap_or(false)
}
