use base64::{URL_SAFE_NO_PAD, encode_config};
use jwt_simple::prelude::ES256KeyPair;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};

use crate::config;
use crate::types::push::VapidConfig;

#[derive(Debug, Clone)]
pub struct VapidCredentials {
    pub private_key: String,
    pub public_key: String,
}

#[derive(Debug, Clone)]
pub enum VapidConfigStatus {
    Missing,
    Incomplete,
    Ready(VapidConfig),
}

fn present(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Signing keys are read from configuration on every use; nothing is cached
/// process-wide.
pub fn load_vapid_config(config: &config::AppConfig) -> VapidConfigStatus {
    let private_key = present(&config.vapid_private_key);
    let public_key = present(&config.vapid_public_key);
    let subject = present(&config.vapid_subject);

    match (private_key, public_key, subject) {
        (Some(private_key), Some(public_key), Some(subject)) => {
            VapidConfigStatus::Ready(VapidConfig {
                private_key: private_key.to_string(),
                public_key: public_key.to_string(),
                subject: subject.to_string(),
            })
        }
        (None, None, None) => VapidConfigStatus::Missing,
        _ => VapidConfigStatus::Incomplete,
    }
}

pub fn generate_vapid_credentials() -> Result<VapidCredentials, web_push::WebPushError> {
    let mut rng = OsRng;
    generate_vapid_credentials_with_rng(&mut rng)
}

pub(crate) fn generate_vapid_credentials_with_rng<R: RngCore + CryptoRng>(
    rng: &mut R,
) -> Result<VapidCredentials, web_push::WebPushError> {
    let key_pair = random_es256_keypair(rng);
    let private_key = encode_config(key_pair.to_bytes(), URL_SAFE_NO_PAD);
    let public_key =
        web_push::VapidSignatureBuilder::from_base64_no_sub(&private_key, URL_SAFE_NO_PAD)?
            .get_public_key();

    Ok(VapidCredentials {
        private_key,
        public_key: encode_config(public_key, URL_SAFE_NO_PAD),
    })
}

// Not every 32-byte string is a valid P-256 scalar.
fn random_es256_keypair<R: RngCore + CryptoRng>(rng: &mut R) -> ES256KeyPair {
    let mut key_bytes = [0u8; 32];
    loop {
        rng.fill_bytes(&mut key_bytes);
        if let Ok(key_pair) = ES256KeyPair::from_bytes(&key_bytes) {
            return key_pair;
        }
    }
}
