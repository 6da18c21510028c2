// src/cert/template.rs
use super::error::{PkiError, Result};
use super::options::{CertificateOptions, ExtKeyUsage, UsedAs};
use chrono::{DateTime, Duration, TimeZone, Utc};
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::pkey::{HasPublic, PKeyRef, Private};
use openssl::stack::Stack;
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAlternativeName,
    SubjectKeyIdentifier,
};
use openssl::x509::{X509Builder, X509Extension, X509Name, X509Ref, X509Req, X509};
use std::net::IpAddr;
use x509_parser::prelude::{FromDer, ParsedExtension, X509Certificate};

const X509_VERSION_3: i32 = 2;
const SERIAL_BITS: i32 = 128;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyUsageFlags {
    pub digital_signature: bool,
    pub key_encipherment: bool,
    pub data_encipherment: bool,
    pub key_agreement: bool,
    pub cert_sign: bool,
    pub crl_sign: bool,
}

impl KeyUsageFlags {
    pub fn ca() -> Self {
        Self {
            cert_sign: true,
            crl_sign: true,
            ..Self::default()
        }
    }

    pub fn end_entity() -> Self {
        Self {
            digital_signature: true,
            key_encipherment: true,
            data_encipherment: true,
            key_agreement: true,
            ..Self::default()
        }
    }

    fn build(&self) -> Result<X509Extension> {
        let mut usage = KeyUsage::new();
        usage.critical();
        if self.digital_signature {
            usage.digital_signature();
        }
        if self.key_encipherment {
            usage.key_encipherment();
        }
        if self.data_encipherment {
            usage.data_encipherment();
        }
        if self.key_agreement {
            usage.key_agreement();
        }
        if self.cert_sign {
            usage.key_cert_sign();
        }
        if self.crl_sign {
            usage.crl_sign();
        }
        Ok(usage.build()?)
    }
}

/// Everything needed to mint an X.509 v3 certificate, independent of who
/// signs it.
pub struct Template {
    pub subject: X509Name,
    pub serial: BigNum,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
    pub uris: Vec<String>,
    pub key_usage: KeyUsageFlags,
    pub ext_key_usage: Vec<ExtKeyUsage>,
    pub is_ca: bool,
    pub max_path_len_zero: bool,
    pub basic_constraints_valid: bool,
    /// Identifier of the key the template was generated for.
    pub subject_key_id: Vec<u8>,
}

pub struct CsrTemplate {
    pub subject: X509Name,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
    pub uris: Vec<String>,
}

/// SHA-1 over the DER-encoded PKCS#1 RSA public key.
pub fn subject_key_id<T: HasPublic>(key: &PKeyRef<T>) -> Result<Vec<u8>> {
    let rsa = key
        .rsa()
        .map_err(|e| PkiError::Format(format!("public key is not an RSA key: {}", e)))?;
    let der = rsa.public_key_to_der_pkcs1()?;
    Ok(openssl::sha::sha1(&der).to_vec())
}

pub fn random_serial() -> Result<BigNum> {
    let mut serial = BigNum::new()?;
    serial.rand(SERIAL_BITS, MsbOption::MAYBE_ZERO, false)?;
    Ok(serial)
}

pub fn asn1_to_datetime(time: &Asn1TimeRef) -> Result<DateTime<Utc>> {
    let epoch = Asn1Time::from_unix(0)?;
    let diff = epoch.diff(time)?;
    let seconds = i64::from(diff.days) * 86_400 + i64::from(diff.secs);
    Utc.timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| PkiError::Format("certificate time out of range".to_string()))
}

/// Reads the basicConstraints CA flag of a certificate.
pub fn is_ca_certificate(cert: &X509Ref) -> Result<bool> {
    let der = cert.to_der()?;
    let (_remainder, parsed) = X509Certificate::from_der(&der)
        .map_err(|e| PkiError::Format(format!("invalid certificate DER: {}", e)))?;

    Ok(parsed
        .extensions()
        .iter()
        .find_map(|ext| match ext.parsed_extension() {
            ParsedExtension::BasicConstraints(bc) => Some(bc.ca),
            _ => None,
        })
        .unwrap_or(false))
}

fn alt_names_extension(
    dns_names: &[String],
    ip_addresses: &[IpAddr],
    uris: &[String],
    context: &openssl::x509::X509v3Context,
) -> Result<X509Extension> {
    let mut san = SubjectAlternativeName::new();
    for name in dns_names {
        san.dns(name);
    }
    for ip in ip_addresses {
        san.ip(&ip.to_string());
    }
    for uri in uris {
        san.uri(uri);
    }
    Ok(san.build(context)?)
}

impl CertificateOptions {
    pub fn generate_template<T: HasPublic>(&self, public_key: &PKeyRef<T>) -> Result<Template> {
        self.validate()?;

        let not_before = Utc::now();
        let not_after = not_before + Duration::days(i64::from(self.duration_days));
        let is_ca = self.used_as == UsedAs::Ca;

        Ok(Template {
            subject: self.generate_subject()?,
            serial: random_serial()?,
            not_before,
            not_after,
            dns_names: self.dns_names.clone(),
            ip_addresses: self.ip_addresses.clone(),
            uris: self.uris.clone(),
            key_usage: if is_ca {
                KeyUsageFlags::ca()
            } else {
                KeyUsageFlags::end_entity()
            },
            ext_key_usage: self.effective_ext_key_usage(),
            is_ca,
            max_path_len_zero: is_ca,
            basic_constraints_valid: is_ca,
            subject_key_id: subject_key_id(public_key)?,
        })
    }

    pub fn generate_csr_template(&self) -> Result<CsrTemplate> {
        self.validate()?;

        Ok(CsrTemplate {
            subject: self.generate_subject()?,
            dns_names: self.dns_names.clone(),
            ip_addresses: self.ip_addresses.clone(),
            uris: self.uris.clone(),
        })
    }
}

impl Template {
    fn has_alt_names(&self) -> bool {
        !self.dns_names.is_empty() || !self.ip_addresses.is_empty() || !self.uris.is_empty()
    }

    /// Builds and signs the certificate. `issuer` is `None` for a self-signed
    /// certificate, in which case the issuer name is the template subject.
    pub fn build_certificate<T: HasPublic>(
        &self,
        public_key: &PKeyRef<T>,
        issuer: Option<&X509Ref>,
        signing_key: &PKeyRef<Private>,
    ) -> Result<X509> {
        if subject_key_id(public_key)? != self.subject_key_id {
            return Err(PkiError::Precondition(
                "template was generated for a different public key".to_string(),
            ));
        }

        let mut builder = X509Builder::new()?;
        builder.set_version(X509_VERSION_3)?;
        let serial = self.serial.to_asn1_integer()?;
        builder.set_serial_number(&serial)?;
        builder.set_subject_name(&self.subject)?;
        match issuer {
            Some(ca) => builder.set_issuer_name(ca.subject_name())?,
            None => builder.set_issuer_name(&self.subject)?,
        }
        builder.set_pubkey(public_key)?;
        let not_before = Asn1Time::from_unix(self.not_before.timestamp())?;
        builder.set_not_before(&not_before)?;
        let not_after = Asn1Time::from_unix(self.not_after.timestamp())?;
        builder.set_not_after(&not_after)?;

        if self.basic_constraints_valid {
            let mut constraints = BasicConstraints::new();
            constraints.critical();
            if self.is_ca {
                constraints.ca();
                if self.max_path_len_zero {
                    constraints.pathlen(0);
                }
            }
            builder.append_extension(constraints.build()?)?;
        }

        builder.append_extension(self.key_usage.build()?)?;

        if !self.ext_key_usage.is_empty() {
            let mut usage = ExtendedKeyUsage::new();
            for ext in &self.ext_key_usage {
                match ext {
                    ExtKeyUsage::ServerAuth => usage.server_auth(),
                    ExtKeyUsage::ClientAuth => usage.client_auth(),
                };
            }
            builder.append_extension(usage.build()?)?;
        }

        let key_id = SubjectKeyIdentifier::new().build(&builder.x509v3_context(issuer, None))?;
        builder.append_extension(key_id)?;

        if let Some(ca) = issuer {
            let authority = AuthorityKeyIdentifier::new()
                .keyid(false)
                .build(&builder.x509v3_context(Some(ca), None))?;
            builder.append_extension(authority)?;
        }

        if self.has_alt_names() {
            let san = alt_names_extension(
                &self.dns_names,
                &self.ip_addresses,
                &self.uris,
                &builder.x509v3_context(issuer, None),
            )?;
            builder.append_extension(san)?;
        }

        builder.sign(signing_key, MessageDigest::sha256())?;
        Ok(builder.build())
    }
}

impl CsrTemplate {
    pub fn build_request(&self, key: &PKeyRef<Private>) -> Result<X509Req> {
        let mut builder = X509Req::builder()?;
        builder.set_version(0)?;
        builder.set_subject_name(&self.subject)?;
        builder.set_pubkey(key)?;

        if !self.dns_names.is_empty() || !self.ip_addresses.is_empty() || !self.uris.is_empty() {
            let san = alt_names_extension(
                &self.dns_names,
                &self.ip_addresses,
                &self.uris,
                &builder.x509v3_context(None),
            )?;
            let mut extensions = Stack::new()?;
            extensions.push(san)?;
            builder.add_extensions(&extensions)?;
        }

        builder.sign(key, MessageDigest::sha256())?;
        Ok(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::key::generate_private_key;

    #[test]
    fn template_requires_common_name() {
        let key = generate_private_key(2048).unwrap();
        let result = CertificateOptions::default().generate_template(&key);
        assert!(matches!(result, Err(PkiError::Validation(_))));
    }

    #[test]
    fn ca_template_flags() {
        let key = generate_private_key(2048).unwrap();
        let mut options = CertificateOptions::new("kubernetes-ca");
        options.used_as = UsedAs::Ca;
        let template = options.generate_template(&key).unwrap();

        assert!(template.is_ca);
        assert!(template.max_path_len_zero);
        assert!(template.basic_constraints_valid);
        assert_eq!(template.key_usage, KeyUsageFlags::ca());
        assert!(template.ext_key_usage.is_empty());
    }

    #[test]
    fn server_template_defaults() {
        let key = generate_private_key(2048).unwrap();
        let mut options = CertificateOptions::new("kube-apiserver");
        options.duration_days = 30;
        let template = options.generate_template(&key).unwrap();

        assert!(!template.is_ca);
        assert!(!template.basic_constraints_valid);
        assert_eq!(template.key_usage, KeyUsageFlags::end_entity());
        assert_eq!(template.ext_key_usage, vec![ExtKeyUsage::ServerAuth]);
        assert_eq!(template.not_after - template.not_before, Duration::days(30));
        assert!(template.serial.num_bits() <= SERIAL_BITS);
    }

    #[test]
    fn subject_key_id_is_sha1_of_pkcs1_public_key() {
        let key = generate_private_key(2048).unwrap();
        let der = key.rsa().unwrap().public_key_to_der_pkcs1().unwrap();
        let id = subject_key_id(&key).unwrap();
        assert_eq!(id.len(), 20);
        assert_eq!(id, openssl::sha::sha1(&der).to_vec());
    }

    #[test]
    fn built_certificate_carries_the_template_key_id() {
        let key = generate_private_key(2048).unwrap();
        let mut options = CertificateOptions::new("front-proxy-ca");
        options.used_as = UsedAs::Ca;
        let template = options.generate_template(&key).unwrap();

        let cert = template.build_certificate(&key, None, &key).unwrap();
        assert_eq!(
            cert.subject_key_id().unwrap().as_slice(),
            template.subject_key_id.as_slice()
        );

        let other = generate_private_key(2048).unwrap();
        let result = template.build_certificate(&other, None, &key);
        assert!(matches!(result, Err(PkiError::Precondition(_))));
    }

    #[test]
    fn converts_asn1_time() {
        let time = Asn1Time::from_unix(1_700_000_000).unwrap();
        assert_eq!(asn1_to_datetime(&time).unwrap().timestamp(), 1_700_000_000);
    }
}
