use crate::errors::CaError;
use sha2::{Digest as _, Sha256};

/// Length of a raw address hash.
pub const ADDRESS_LEN: usize = 32;

/// Strip the `ELF_` prefix and `_<chain>` suffix of the display form `ELF_<addr>_<chain>`.
pub fn normalize_address(s: &str) -> &str {
    let s = s.trim();
    let s = s.strip_prefix("ELF_").unwrap_or(s);
    match s.split_once('_') {
        Some((addr, _chain)) => addr,
        None => s,
    }
}

/// Base58check-decode an address (display form accepted) into its 32 raw bytes.
pub fn decode_address(s: &str) -> Result<Vec<u8>, CaError> {
    let bare = normalize_address(s);
    let bytes = bs58::decode(bare)
        .with_check(None)
        .into_vec()
        .map_err(|e| CaError::InvalidAddress(format!("{s}: {e}")))?;
    if bytes.len() != ADDRESS_LEN {
        return Err(CaError::InvalidAddress(format!(
            "{s}: expected {ADDRESS_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

pub fn encode_address(raw: &[u8]) -> String {
    bs58::encode(raw).with_check().into_string()
}

/// Address of an uncompressed SEC1 public key: base58check(sha256(sha256(pubkey))).
pub fn address_from_public_key(uncompressed: &[u8]) -> String {
    let once = Sha256::digest(uncompressed);
    let twice = Sha256::digest(once);
    encode_address(&twice)
}
