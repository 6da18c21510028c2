// src/cert/key.rs
use super::error::{PkiError, Result};
use super::pem::{is_encrypted, parse_block, RSA_PRIVATE_KEY};
use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::rsa::Rsa;
use openssl::symm::Cipher;

pub const DEFAULT_KEY_BITS: u32 = 4096;
pub const MIN_KEY_BITS: u32 = 1024;

pub fn generate_private_key(bits: u32) -> Result<PKey<Private>> {
    if bits < MIN_KEY_BITS {
        return Err(PkiError::KeyGeneration(format!(
            "RSA key size {} is below the minimum of {} bits",
            bits, MIN_KEY_BITS
        )));
    }

    let rsa = Rsa::generate(bits)
        .map_err(|e| PkiError::KeyGeneration(format!("failed to generate {}-bit RSA key: {}", bits, e)))?;
    PKey::from_rsa(rsa).map_err(|e| PkiError::KeyGeneration(e.to_string()))
}

/// Encodes the key as a PKCS#1 `RSA PRIVATE KEY` block. A non-empty
/// passphrase encrypts the block with DES-EDE3-CBC.
pub fn private_key_to_pem(key: &PKeyRef<Private>, passphrase: &str) -> Result<Vec<u8>> {
    let rsa = key
        .rsa()
        .map_err(|e| PkiError::Format(format!("private key is not an RSA key: {}", e)))?;

    let pem = if passphrase.is_empty() {
        rsa.private_key_to_pem()?
    } else {
        rsa.private_key_to_pem_passphrase(Cipher::des_ede3_cbc(), passphrase.as_bytes())?
    };
    Ok(pem)
}

pub fn private_key_from_pem(pem: &[u8], passphrase: &str) -> Result<PKey<Private>> {
    let block = parse_block(pem, RSA_PRIVATE_KEY)?;

    let rsa = if is_encrypted(&block) {
        if passphrase.is_empty() {
            return Err(PkiError::Decryption(
                "private key is encrypted and no passphrase was given".to_string(),
            ));
        }
        Rsa::private_key_from_pem_passphrase(pem, passphrase.as_bytes()).map_err(|e| {
            PkiError::Decryption(format!("failed to decrypt private key: {}", e))
        })?
    } else {
        Rsa::private_key_from_der(block.contents())
            .map_err(|e| PkiError::Format(format!("invalid RSA private key: {}", e)))?
    };

    if !rsa.check_key().unwrap_or(false) {
        return Err(PkiError::Format("inconsistent RSA private key".to_string()));
    }
    Ok(PKey::from_rsa(rsa)?)
}
