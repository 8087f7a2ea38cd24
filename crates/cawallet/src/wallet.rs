use crate::{chain::address::address_from_public_key, errors::CaError};
use eyre::Context as _;
use k256::{ecdsa::SigningKey, elliptic_curve::sec1::ToEncodedPoint as _};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize as _, Zeroizing};

/// Manager key derivation path (coin type 1616).
pub const DERIVATION_PATH: &str = "m/44'/1616'/0'/0/0";

/// A manager key and the address it controls. Never prints its secrets.
#[derive(Clone)]
pub struct WalletIdentity {
    address: String,
    signing_key: SigningKey,
    mnemonic: Option<Zeroizing<String>>,
}

impl std::fmt::Debug for WalletIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletIdentity")
            .field("address", &self.address)
            .field("has_mnemonic", &self.mnemonic.is_some())
            .finish_non_exhaustive()
    }
}

impl WalletIdentity {
    fn from_signing_key(signing_key: SigningKey, mnemonic: Option<Zeroizing<String>>) -> Self {
        let point = signing_key.verifying_key().as_affine().to_encoded_point(false);
        Self {
            address: address_from_public_key(point.as_bytes()),
            signing_key,
            mnemonic,
        }
    }

    /// From a 32-byte hex private key (`0x` prefix tolerated).
    pub fn from_private_key_hex(hex_key: &str) -> Result<Self, CaError> {
        let trimmed = hex_key.trim();
        let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = Zeroizing::new(
            hex::decode(trimmed)
                .map_err(|e| CaError::InvalidArgument(format!("private key is not hex: {e}")))?,
        );
        if bytes.len() != 32 {
            return Err(CaError::InvalidArgument(format!(
                "private key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let sk = SigningKey::from_slice(&bytes)
            .map_err(|e| CaError::InvalidArgument(format!("invalid private key: {e}")))?;
        Ok(Self::from_signing_key(sk, None))
    }

    /// BIP-39 phrase -> BIP-32 child at [`DERIVATION_PATH`].
    pub fn from_mnemonic(phrase: &str) -> eyre::Result<Self> {
        let mnemonic = bip39::Mnemonic::parse_in_normalized(bip39::Language::English, phrase)
            .map_err(|e| CaError::InvalidArgument(format!("invalid mnemonic: {e}")))?;
        Self::derive(&mnemonic)
    }

    /// Fresh 12-word mnemonic and its derived key.
    pub fn generate() -> eyre::Result<Self> {
        let mut entropy = [0_u8; 16];
        crate::keystore::crypto::fill_random(&mut entropy);
        let mnemonic = bip39::Mnemonic::from_entropy_in(bip39::Language::English, &entropy)
            .context("mnemonic from entropy")?;
        entropy.zeroize();
        Self::derive(&mnemonic)
    }

    fn derive(mnemonic: &bip39::Mnemonic) -> eyre::Result<Self> {
        let secp = bitcoin::secp256k1::Secp256k1::new();
        let mut seed = mnemonic.to_seed_normalized("");
        let xpriv = bitcoin::bip32::Xpriv::new_master(bitcoin::Network::Bitcoin, &seed)
            .context("master xpriv")?;
        seed.zeroize();
        let path: bitcoin::bip32::DerivationPath =
            DERIVATION_PATH.parse().context("parse derivation path")?;
        let child = xpriv.derive_priv(&secp, &path).context("derive child")?;
        let secret = Zeroizing::new(child.private_key.secret_bytes());
        let sk = SigningKey::from_slice(secret.as_slice()).context("derived key")?;
        let phrase = Zeroizing::new(mnemonic.to_string());
        Ok(Self::from_signing_key(sk, Some(phrase)))
    }

    /// The fixed identity used to sign read-only calls: private key scalar `1`.
    pub fn view_identity() -> Result<Self, CaError> {
        let mut one = [0_u8; 32];
        if let Some(last) = one.last_mut() {
            *last = 1;
        }
        let sk = SigningKey::from_slice(&one)
            .map_err(|e| CaError::InvalidArgument(format!("view key: {e}")))?;
        Ok(Self::from_signing_key(sk, None))
    }

    #[must_use]
    pub fn with_mnemonic(mut self, phrase: Zeroizing<String>) -> Self {
        self.mnemonic = Some(phrase);
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub const fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn private_key_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.signing_key.to_bytes()))
    }

    pub fn mnemonic(&self) -> Option<&str> {
        self.mnemonic.as_deref().map(String::as_str)
    }

    pub fn public_key_hex(&self) -> String {
        let point = self
            .signing_key
            .verifying_key()
            .as_affine()
            .to_encoded_point(false);
        hex::encode(point.as_bytes())
    }
}

/// A contract account: the on-chain wallet the manager key acts for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaHandle {
    pub ca_hash: String,
    pub ca_address: String,
    pub origin_chain_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_key_round_trips_through_hex() -> eyre::Result<()> {
        let w = WalletIdentity::generate()?;
        let again = WalletIdentity::from_private_key_hex(&w.private_key_hex())?;
        assert_eq!(w.address(), again.address());
        assert!(w.mnemonic().is_some());
        assert!(again.mnemonic().is_none());
        Ok(())
    }

    #[test]
    fn mnemonic_derivation_is_deterministic() -> eyre::Result<()> {
        let phrase = "abandon abandon abandon abandon abandon abandon abandon abandon abandon \
                      abandon abandon about";
        let a = WalletIdentity::from_mnemonic(phrase)?;
        let b = WalletIdentity::from_mnemonic(phrase)?;
        assert_eq!(a.address(), b.address());
        assert_eq!(a.mnemonic(), Some(phrase));
        Ok(())
    }

    #[test]
    fn view_identity_is_stable_and_decodable() -> eyre::Result<()> {
        let a = WalletIdentity::view_identity()?;
        let b = WalletIdentity::view_identity()?;
        assert_eq!(a.address(), b.address());
        crate::chain::address::decode_address(a.address())?;
        assert!(a.public_key_hex().starts_with("04"));
        Ok(())
    }

    #[test]
    fn bad_private_keys_are_invalid_arguments() {
        assert!(matches!(
            WalletIdentity::from_private_key_hex("zz"),
            Err(CaError::InvalidArgument(_))
        ));
        assert!(matches!(
            WalletIdentity::from_private_key_hex("abcd"),
            Err(CaError::InvalidArgument(_))
        ));
        assert!(WalletIdentity::from_private_key_hex(&"00".repeat(32)).is_err());
    }

    #[test]
    fn debug_hides_secrets() -> eyre::Result<()> {
        let w = WalletIdentity::generate()?;
        let dbg = format!("{w:?}");
        assert!(!dbg.contains(w.private_key_hex().as_str()));
        Ok(())
    }
}
