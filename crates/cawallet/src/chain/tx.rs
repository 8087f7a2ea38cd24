use super::{address::decode_address, ChainStatus};
use crate::{errors::CaError, wallet::WalletIdentity};
use eyre::Context as _;
use prost::Message as _;
use sha2::{Digest as _, Sha256};

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct Address {
    #[prost(bytes = "vec", tag = "1")]
    pub value: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct Hash {
    #[prost(bytes = "vec", tag = "1")]
    pub value: Vec<u8>,
}

/// The chain's transaction envelope. Field 10000 carries the signature, so the id (and the
/// signed digest) is computed over the message with that field empty.
#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct Transaction {
    #[prost(message, optional, tag = "1")]
    pub from: Option<Address>,
    #[prost(message, optional, tag = "2")]
    pub to: Option<Address>,
    #[prost(int64, tag = "3")]
    pub ref_block_number: i64,
    #[prost(bytes = "vec", tag = "4")]
    pub ref_block_prefix: Vec<u8>,
    #[prost(string, tag = "5")]
    pub method_name: String,
    #[prost(bytes = "vec", tag = "6")]
    pub params: Vec<u8>,
    #[prost(bytes = "vec", tag = "10000")]
    pub signature: Vec<u8>,
}

impl Transaction {
    /// Unsigned call from `from` to contract `to`, stamped with the current best block.
    pub fn build(
        from: &str,
        to: &str,
        method_name: &str,
        params: Vec<u8>,
        status: &ChainStatus,
    ) -> eyre::Result<Self> {
        let hash = hex::decode(status.best_chain_hash.trim_start_matches("0x"))
            .context("decode best chain hash")?;
        let prefix = hash
            .get(..4)
            .ok_or_else(|| eyre::eyre!("best chain hash too short"))?
            .to_vec();
        Ok(Self {
            from: Some(Address {
                value: decode_address(from)?,
            }),
            to: Some(Address {
                value: decode_address(to)?,
            }),
            ref_block_number: status.best_chain_height,
            ref_block_prefix: prefix,
            method_name: method_name.to_owned(),
            params,
            signature: Vec::new(),
        })
    }

    fn unsigned_digest(&self) -> [u8; 32] {
        let mut unsigned = self.clone();
        unsigned.signature.clear();
        Sha256::digest(unsigned.encode_to_vec()).into()
    }

    /// Hex transaction id. Stable across signing.
    pub fn id(&self) -> String {
        hex::encode(self.unsigned_digest())
    }

    /// Recoverable secp256k1 signature over the unsigned digest: `r || s || v`.
    pub fn sign(&mut self, signer: &WalletIdentity) -> Result<(), CaError> {
        let digest = self.unsigned_digest();
        let (sig, recid) = signer
            .signing_key()
            .sign_prehash_recoverable(&digest)
            .map_err(|e| CaError::InvalidArgument(format!("sign transaction: {e}")))?;
        let mut out = sig.to_bytes().to_vec();
        out.push(recid.to_byte());
        self.signature = out;
        Ok(())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.encode_to_vec())
    }
}
