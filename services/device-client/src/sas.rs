//! Shared access signature tokens.
//!
//! A token proves knowledge of a key for one resource until an expiry time:
//! `SharedAccessSignature sr={resource}&sig={signature}&se={expiry}[&skn={key name}]`
//! where the signature is `base64(hmac_sha256(key, "{resource}\n{expiry}"))`
//! and `resource` is URL encoded.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use url::form_urlencoded;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_PREFIX: &str = "SharedAccessSignature ";

#[derive(Debug, Error)]
pub enum SasError {
    #[error("invalid signing key: {0}")]
    InvalidKey(String),
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("token expired at {0}")]
    Expired(i64),
    #[error("token was issued for '{0}'")]
    WrongResource(String),
    #[error("signature mismatch")]
    SignatureMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SasToken {
    pub resource: String,
    pub signature: String,
    pub expiry: i64,
    pub key_name: Option<String>,
}

/// Builds a token for `resource` signed with the base64 `key`.
pub fn generate_sas_token(
    resource: &str,
    key: &str,
    key_name: Option<&str>,
    expiry: i64,
) -> Result<String, SasError> {
    let encoded_resource = encode(resource);
    let signature = sign(key, &string_to_sign(&encoded_resource, expiry))?;
    let mut token = format!(
        "{TOKEN_PREFIX}sr={encoded_resource}&sig={}&se={expiry}",
        encode(&signature)
    );
    if let Some(name) = key_name {
        token.push_str(&format!("&skn={}", encode(name)));
    }
    Ok(token)
}

impl SasToken {
    pub fn parse(token: &str) -> Result<Self, SasError> {
        let body = token
            .strip_prefix(TOKEN_PREFIX)
            .ok_or_else(|| SasError::Malformed("missing SharedAccessSignature prefix".into()))?;

        let mut resource = None;
        let mut signature = None;
        let mut expiry = None;
        let mut key_name = None;

        if let Some(pair) = body.split('&').find(|pair| !pair.contains('=')) {
            return Err(SasError::Malformed(format!("'{pair}' is not a name=value pair")));
        }

        for (name, value) in form_urlencoded::parse(body.as_bytes()) {
            let value = value.into_owned();
            match name.as_ref() {
                "sr" => resource = Some(value),
                "sig" => signature = Some(value),
                "se" => {
                    expiry = Some(
                        value
                            .parse::<i64>()
                            .map_err(|_| SasError::Malformed(format!("bad expiry '{value}'")))?,
                    )
                }
                "skn" => key_name = Some(value),
                _ => {}
            }
        }

        Ok(Self {
            resource: resource.ok_or_else(|| SasError::Malformed("missing sr".into()))?,
            signature: signature.ok_or_else(|| SasError::Malformed("missing sig".into()))?,
            expiry: expiry.ok_or_else(|| SasError::Malformed("missing se".into()))?,
            key_name,
        })
    }

    /// Checks expiry, that the token covers `resource` (exactly or as a
    /// prefix) and that it was signed with `key`.
    pub fn verify(&self, key: &str, resource: &str, now: i64) -> Result<(), SasError> {
        if self.expiry <= now {
            return Err(SasError::Expired(self.expiry));
        }
        if !resource.starts_with(&self.resource) {
            return Err(SasError::WrongResource(self.resource.clone()));
        }

        let encoded_resource = encode(&self.resource);
        let decoded = STANDARD
            .decode(&self.signature)
            .map_err(|err| SasError::Malformed(err.to_string()))?;
        let mut mac = keyed_mac(key)?;
        mac.update(string_to_sign(&encoded_resource, self.expiry).as_bytes());
        mac.verify_slice(&decoded)
            .map_err(|_| SasError::SignatureMismatch)
    }
}

fn encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn string_to_sign(encoded_resource: &str, expiry: i64) -> String {
    format!("{encoded_resource}\n{expiry}")
}

fn sign(key: &str, data: &str) -> Result<String, SasError> {
    let mut mac = keyed_mac(key)?;
    mac.update(data.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

fn keyed_mac(key: &str) -> Result<HmacSha256, SasError> {
    if key.trim().is_empty() {
        return Err(SasError::InvalidKey("key cannot be empty".into()));
    }
    let decoded = STANDARD
        .decode(key)
        .map_err(|err| SasError::InvalidKey(err.to_string()))?;
    HmacSha256::new_from_slice(&decoded).map_err(|err| SasError::InvalidKey(err.to_string()))
}
