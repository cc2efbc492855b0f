//! Random token provisioner
//!
//! Mints opaque random tokens from the OS CSPRNG.
//!
//! ```yaml
//! - name: webhook-token
//!   type: random
//!   rotation_period: 7d
//!   params:
//!     length: 48          # bytes of entropy (characters for alphanumeric)
//!     encoding: hex       # base64 (default), hex or alphanumeric
//! ```

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng, RngCore};
use zeroize::Zeroizing;

use super::{ProvisionError, SecretProvisioner};
use crate::config::SecretSpec;
use crate::secrets::{SecretPayload, SecretVersion};

pub const RANDOM_TYPE: &str = "random";

const DEFAULT_LENGTH: u64 = 32;
const MAX_LENGTH: u64 = 4096;

/// How generated bytes are rendered into the stored payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenEncoding {
    /// URL-safe base64 without padding
    Base64,
    /// Lowercase hex
    Hex,
    /// `[A-Za-z0-9]` characters drawn directly
    Alphanumeric,
}

impl TokenEncoding {
    fn parse(value: &str) -> Result<Self, ProvisionError> {
        match value {
            "base64" => Ok(Self::Base64),
            "hex" => Ok(Self::Hex),
            "alphanumeric" => Ok(Self::Alphanumeric),
            other => Err(ProvisionError::invalid_params(format!(
                "unknown encoding '{}', expected base64, hex or alphanumeric",
                other
            ))),
        }
    }
}

/// Provisioner for secrets of type `random`.
#[derive(Debug, Clone)]
pub struct RandomProvisioner {
    deletion: bool,
}

impl Default for RandomProvisioner {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomProvisioner {
    /// Random tokens are stateless outside the store, so their old versions
    /// may be destroyed.
    pub fn new() -> Self {
        Self { deletion: true }
    }

    pub fn without_deletion() -> Self {
        Self { deletion: false }
    }

    fn params(spec: &SecretSpec) -> Result<(usize, TokenEncoding), ProvisionError> {
        let length = match spec.params.get("length") {
            None => DEFAULT_LENGTH,
            Some(value) => value.as_u64().ok_or_else(|| {
                ProvisionError::invalid_params(format!("length must be a positive integer, got {}", value))
            })?,
        };
        if !(1..=MAX_LENGTH).contains(&length) {
            return Err(ProvisionError::invalid_params(format!(
                "length must be between 1 and {}, got {}",
                MAX_LENGTH, length
            )));
        }

        let encoding = match spec.params.get("encoding") {
            None => TokenEncoding::Base64,
            Some(value) => TokenEncoding::parse(value.as_str().ok_or_else(|| {
                ProvisionError::invalid_params(format!("encoding must be a string, got {}", value))
            })?)?,
        };

        Ok((length as usize, encoding))
    }
}

#[async_trait]
impl SecretProvisioner for RandomProvisioner {
    fn secret_type(&self) -> &str {
        RANDOM_TYPE
    }

    async fn generate(
        &self,
        spec: &SecretSpec,
        _existing: &[SecretVersion],
    ) -> Result<SecretPayload, ProvisionError> {
        let (length, encoding) = Self::params(spec)?;

        let token = match encoding {
            TokenEncoding::Alphanumeric => {
                OsRng.sample_iter(&Alphanumeric).take(length).map(char::from).collect::<String>()
            }
            TokenEncoding::Base64 | TokenEncoding::Hex => {
                let mut bytes = Zeroizing::new(vec![0u8; length]);
                OsRng.try_fill_bytes(&mut bytes).map_err(|e| {
                    ProvisionError::generation(format!("OS random source failed: {}", e))
                })?;
                if encoding == TokenEncoding::Hex {
                    hex::encode(bytes.as_slice())
                } else {
                    URL_SAFE_NO_PAD.encode(bytes.as_slice())
                }
            }
        };

        Ok(SecretPayload::from(token))
    }

    fn supports_deletion(&self) -> bool {
        self.deletion
    }
}
