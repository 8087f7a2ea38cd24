use crate::{config::NetworkMode, errors::CaError};
use aes_gcm::{
    aead::{Aead as _, KeyInit as _},
    Aes256Gcm, Nonce,
};
use argon2::{
    password_hash::{PasswordHasher as _, SaltString},
    Algorithm, Argon2, Params, Version,
};
use base64::Engine as _;
use eyre::Context as _;
use hkdf::Hkdf;
use rand::Rng as _;
use secrecy::{ExposeSecret as _, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

pub const KDF_ARGON2ID: &str = "argon2id";

/// The encrypted half of a keystore file. Everything needed to re-derive the key except the
/// password is stored alongside the ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeystoreBlob {
    pub v: u8,
    pub kdf: String,
    pub salt_b64: String,
    pub nonce_b64: String,
    pub ct_b64: String,
}

pub fn fill_random(buf: &mut [u8]) {
    let mut rng = rand::rng();
    rng.fill_bytes(buf);
}

pub fn random_salt16() -> [u8; 16] {
    let mut s = [0_u8; 16];
    fill_random(&mut s);
    s
}

fn b64() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::STANDARD
}

pub fn derive_password_key(
    password: &SecretString,
    salt16: &[u8; 16],
) -> eyre::Result<Zeroizing<[u8; 32]>> {
    // Frozen Argon2id parameters (argon2 0.5 defaults) so existing keystores keep opening
    // across dependency updates.
    let params =
        Params::new(19 * 1024, 2, 1, Some(32)).map_err(|e| eyre::eyre!("argon2 params: {e}"))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let salt = SaltString::encode_b64(salt16).map_err(|e| eyre::eyre!("encode salt: {e}"))?;

    let hash = argon2
        .hash_password(password.expose_secret().as_bytes(), &salt)
        .map_err(|e| eyre::eyre!("argon2 hash: {e}"))?;
    let bytes = hash
        .hash
        .ok_or_else(|| eyre::eyre!("argon2 missing hash"))?;
    let Some(prefix) = bytes.as_bytes().get(..32) else {
        eyre::bail!("argon2 hash too short");
    };
    let mut out = Zeroizing::new([0_u8; 32]);
    out.copy_from_slice(prefix);
    Ok(out)
}

/// Bind the password key to one network so a mainnet blob never opens as testnet.
pub fn derive_network_subkey(
    base_key: &[u8; 32],
    network: NetworkMode,
) -> eyre::Result<Zeroizing<[u8; 32]>> {
    let hk = Hkdf::<Sha256>::new(None, base_key);
    let info = format!("cawallet:{}:keystore", network.as_str());
    let mut out = Zeroizing::new([0_u8; 32]);
    hk.expand(info.as_bytes(), out.as_mut())
        .map_err(|e| eyre::eyre!("hkdf expand: {e}"))?;
    Ok(out)
}

pub fn encrypt_aes_gcm(key32: &[u8; 32], plaintext: &[u8]) -> eyre::Result<(String, String)> {
    let cipher = Aes256Gcm::new_from_slice(key32).context("aes init")?;
    let mut nonce = [0_u8; 12];
    fill_random(&mut nonce);
    let ct = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| eyre::eyre!("aes encrypt: {e}"))?;
    Ok((b64().encode(nonce), b64().encode(ct)))
}

pub fn decrypt_aes_gcm(
    key32: &[u8; 32],
    nonce_b64: &str,
    ct_b64: &str,
) -> Result<Zeroizing<Vec<u8>>, CaError> {
    let cipher = Aes256Gcm::new_from_slice(key32).map_err(|_e| CaError::DecryptionFailed)?;
    let nonce = b64()
        .decode(nonce_b64)
        .map_err(|_e| CaError::DecryptionFailed)?;
    if nonce.len() != 12 {
        return Err(CaError::DecryptionFailed);
    }
    let ct = b64().decode(ct_b64).map_err(|_e| CaError::DecryptionFailed)?;
    let pt = cipher
        .decrypt(Nonce::from_slice(&nonce), ct.as_ref())
        .map_err(|_e| CaError::DecryptionFailed)?;
    Ok(Zeroizing::new(pt))
}

pub fn seal(
    password: &SecretString,
    network: NetworkMode,
    plaintext: &[u8],
) -> eyre::Result<KeystoreBlob> {
    let salt = random_salt16();
    let base = derive_password_key(password, &salt)?;
    let key = derive_network_subkey(&base, network)?;
    let (nonce_b64, ct_b64) = encrypt_aes_gcm(&key, plaintext)?;
    Ok(KeystoreBlob {
        v: 1,
        kdf: KDF_ARGON2ID.to_owned(),
        salt_b64: b64().encode(salt),
        nonce_b64,
        ct_b64,
    })
}

/// Any failure to open (wrong password, tampered or truncated blob) is
/// [`CaError::DecryptionFailed`].
pub fn open(
    password: &SecretString,
    network: NetworkMode,
    blob: &KeystoreBlob,
) -> eyre::Result<Zeroizing<Vec<u8>>> {
    if blob.v != 1 || blob.kdf != KDF_ARGON2ID {
        return Err(CaError::DecryptionFailed).wrap_err(format!(
            "unsupported keystore blob v={} kdf={}",
            blob.v, blob.kdf
        ));
    }
    let salt_bytes = b64()
        .decode(&blob.salt_b64)
        .map_err(|_e| CaError::DecryptionFailed)?;
    let salt: [u8; 16] = salt_bytes
        .as_slice()
        .try_into()
        .map_err(|_e| CaError::DecryptionFailed)?;
    let base = derive_password_key(password, &salt)?;
    let key = derive_network_subkey(&base, network)?;
    Ok(decrypt_aes_gcm(&key, &blob.nonce_b64, &blob.ct_b64)?)
}
