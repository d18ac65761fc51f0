use base64::{engine::general_purpose::STANDARD, Engine as _};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use sha2::Sha256;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignerError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid private key: {0}")]
    InvalidKey(String),
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),
    #[error("signing failed: {0}")]
    Signing(String),
}

/// RSA PKCS#1 v1.5 / SHA-256 signer plus the certificate sent alongside
/// every request. Loaded once at startup.
#[derive(Clone)]
pub struct RequestSigner {
    key: SigningKey<Sha256>,
    certificate_header: String,
}

impl RequestSigner {
    /// Accepts a PKCS#8 or PKCS#1 private key and a PEM `CERTIFICATE` block.
    pub fn from_pem(key_pem: &str, certificate_pem: &str) -> Result<Self, SignerError> {
        let key = RsaPrivateKey::from_pkcs8_pem(key_pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(key_pem))
            .map_err(|e| SignerError::InvalidKey(e.to_string()))?;

        let certificate = pem::parse(certificate_pem)
            .map_err(|e| SignerError::InvalidCertificate(e.to_string()))?;
        if certificate.tag() != "CERTIFICATE" {
            return Err(SignerError::InvalidCertificate(format!(
                "expected a CERTIFICATE block, found {}",
                certificate.tag()
            )));
        }

        Ok(Self {
            key: SigningKey::<Sha256>::new(key),
            certificate_header: STANDARD.encode(certificate.contents()),
        })
    }

    pub fn from_files(key_path: &Path, certificate_path: &Path) -> Result<Self, SignerError> {
        let read = |path: &Path| {
            std::fs::read_to_string(path).map_err(|source| SignerError::Io {
                path: path.to_path_buf(),
                source,
            })
        };
        Self::from_pem(&read(key_path)?, &read(certificate_path)?)
    }

    /// Raw signature over `SHA-256(body)`.
    pub fn sign(&self, body: &[u8]) -> Result<Vec<u8>, SignerError> {
        let signature = self
            .key
            .try_sign(body)
            .map_err(|e| SignerError::Signing(e.to_string()))?;
        Ok(signature.to_vec())
    }

    /// Value of the `X-Signature` header.
    pub fn signature_header(&self, body: &[u8]) -> Result<String, SignerError> {
        Ok(STANDARD.encode(self.sign(body)?))
    }

    /// Value of the `X-Certificate` header: base64 of the DER certificate.
    pub fn certificate_header(&self) -> &str {
        &self.certificate_header
    }
}

impl fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSigner")
            .field("key", &"***")
            .field("certificate_header", &self.certificate_header)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use rsa::pkcs8::{EncodePrivateKey, LineEnding};
    use rsa::RsaPrivateKey;

    /// Fresh key pair and a dummy certificate block.
    pub fn key_and_certificate() -> (RsaPrivateKey, String, String) {
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let key_pem = key.to_pkcs8_pem(LineEnding::LF).unwrap().to_string();
        let cert_pem = pem::encode(&pem::Pem::new("CERTIFICATE", vec![0x30, 0x03, 0x02, 0x01, 0x01]));
        (key, key_pem, cert_pem)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::key_and_certificate;
    use super::*;
    use rsa::pkcs1v15::{Signature, VerifyingKey};
    use rsa::signature::Verifier;

    #[test]
    fn test_signature_verifies_with_public_key() {
        let (key, key_pem, cert_pem) = key_and_certificate();
        let signer = RequestSigner::from_pem(&key_pem, &cert_pem).unwrap();
        let body = br#"{"gtin_data":[{"gtin":"04602380040001","count":2}],"inn":"7707083893"}"#;

        let raw = signer.sign(body).unwrap();
        let verifying = VerifyingKey::<Sha256>::new(key.to_public_key());
        let signature = Signature::try_from(raw.as_slice()).unwrap();

        assert!(verifying.verify(body, &signature).is_ok());
        assert!(verifying.verify(b"tampered", &signature).is_err());
    }

    #[test]
    fn test_headers_are_base64() {
        let (_, key_pem, cert_pem) = key_and_certificate();
        let signer = RequestSigner::from_pem(&key_pem, &cert_pem).unwrap();

        assert_eq!(signer.certificate_header(), STANDARD.encode([0x30, 0x03, 0x02, 0x01, 0x01]));
        let header = signer.signature_header(b"body").unwrap();
        assert_eq!(STANDARD.decode(header).unwrap().len(), 128);
    }

    #[test]
    fn test_rejects_wrong_pem_blocks() {
        let (_, key_pem, cert_pem) = key_and_certificate();

        assert!(matches!(
            RequestSigner::from_pem("not a key", &cert_pem),
            Err(SignerError::InvalidKey(_))
        ));
        assert!(matches!(
            RequestSigner::from_pem(&key_pem, &key_pem),
            Err(SignerError::InvalidCertificate(_))
        ));
    }

    #[test]
    fn test_from_files_reports_missing_path() {
        let err = RequestSigner::from_files(Path::new("/nonexistent/key.pem"), Path::new("/nonexistent/cert.pem"))
            .unwrap_err();
        assert!(matches!(err, SignerError::Io { .. }));
    }
}
