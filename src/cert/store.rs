// src/cert/store.rs
use super::entity::Certificate;
use super::error::{PkiError, Result};
use super::key::private_key_from_pem;
use super::pem::{parse_block, CERTIFICATE};
use openssl::x509::X509;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Writes `contents` to `path` readable by the owner only. Parent directories
/// must already exist.
pub fn write_private_file(path: &Path, contents: &[u8]) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(contents)?;

    // Pre-existing files keep their mode on open.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => PkiError::NotFound(path.to_path_buf()),
        _ => PkiError::Io(e),
    })
}

pub fn certificate_from_pem(pem: &[u8]) -> Result<X509> {
    parse_block(pem, CERTIFICATE)?;
    X509::from_pem(pem).map_err(|e| PkiError::Parse(format!("invalid certificate: {}", e)))
}

impl Certificate {
    pub fn write_key_file(&mut self, path: &Path) -> Result<&mut Self> {
        let pem = self.key_to_pem()?;
        write_private_file(path, &pem)?;
        Ok(self)
    }

    pub fn write_cert_file(&mut self, path: &Path) -> Result<&mut Self> {
        let pem = self.certificate_to_pem()?;
        write_private_file(path, &pem)?;
        Ok(self)
    }

    /// Loads the private key, decrypting it with the configured passphrase.
    /// The entity keeps its previous key on any failure.
    pub fn read_key_file(&mut self, path: &Path) -> Result<&mut Self> {
        let pem = read_file(path)?;
        let key = private_key_from_pem(&pem, &self.options().passphrase)?;
        self.set_private_key(key);
        Ok(self)
    }

    pub fn read_cert_file(&mut self, path: &Path) -> Result<&mut Self> {
        let pem = read_file(path)?;
        let certificate = certificate_from_pem(&pem)?;
        self.set_certificate(certificate);
        Ok(self)
    }

    /// Writes key and certificate to the configured (or default) paths.
    pub fn persist(&mut self) -> Result<&mut Self> {
        let key_path = self.options().key_path();
        let cert_path = self.options().cert_path();
        self.write_key_file(&key_path)?.write_cert_file(&cert_path)
    }

    /// Loads key and certificate from the configured (or default) paths.
    pub fn load(&mut self) -> Result<&mut Self> {
        let key_path = self.options().key_path();
        let cert_path = self.options().cert_path();
        self.read_key_file(&key_path)?.read_cert_file(&cert_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::CertificateOptions;
    use tempfile::TempDir;

    fn ca_in(dir: &Path, passphrase: &str) -> Certificate {
        let mut options = CertificateOptions::new("kubernetes-ca").with_certs_dir(dir);
        options.bits = 2048;
        options.passphrase = passphrase.to_string();
        let mut ca = Certificate::new("root_ca", options);
        ca.generate_ca().unwrap();
        ca
    }

    #[test]
    fn persist_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let mut ca = ca_in(dir.path(), "");
        ca.persist().unwrap();

        let key_path = dir.path().join("kubernetes-ca.key");
        let cert_path = dir.path().join("kubernetes-ca.crt");
        assert!(key_path.exists());
        assert!(cert_path.exists());

        let mut loaded = Certificate::new("root_ca", ca.options().clone());
        loaded.load().unwrap();
        assert_eq!(
            loaded.certificate_to_pem().unwrap(),
            ca.certificate_to_pem().unwrap()
        );
        assert_eq!(fs::read(&key_path).unwrap(), loaded.key_to_pem().unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let cert_path = dir.path().join("kubernetes-ca.crt");
        fs::write(&cert_path, b"stale").unwrap();
        fs::set_permissions(&cert_path, fs::Permissions::from_mode(0o644)).unwrap();

        ca_in(dir.path(), "").persist().unwrap();
        for name in ["kubernetes-ca.key", "kubernetes-ca.crt"] {
            let mode = fs::metadata(dir.path().join(name)).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600, "{}", name);
        }
    }

    #[test]
    fn missing_files_are_not_found() {
        let dir = TempDir::new().unwrap();
        let mut cert = Certificate::new(
            "admin",
            CertificateOptions::new("admin").with_certs_dir(dir.path()),
        );
        let err = cert.load().unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let mut ca = ca_in(&dir.path().join("absent"), "");
        let err = ca.persist().unwrap_err();
        assert!(matches!(err, PkiError::Io(_)));
    }

    #[test]
    fn wrong_passphrase_leaves_key_unset() {
        let dir = TempDir::new().unwrap();
        let mut ca = ca_in(dir.path(), "correct horse");
        ca.persist().unwrap();

        let mut options = ca.options().clone();
        options.passphrase = "battery staple".to_string();
        let mut loaded = Certificate::new("root_ca", options);
        let err = loaded.load().unwrap_err();
        assert!(matches!(err, PkiError::Decryption(_)));
        assert!(loaded.private_key().is_none());
        assert!(loaded.certificate().is_none());
    }

    #[test]
    fn key_file_is_not_a_certificate() {
        let dir = TempDir::new().unwrap();
        let mut ca = ca_in(dir.path(), "");
        ca.persist().unwrap();

        let mut cert = Certificate::new("root_ca", ca.options().clone());
        let err = cert
            .read_cert_file(&dir.path().join("kubernetes-ca.key"))
            .unwrap_err();
        assert!(matches!(err, PkiError::Parse(_)));
    }
}
