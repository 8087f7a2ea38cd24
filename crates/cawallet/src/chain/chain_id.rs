//! Canonical chain identifier encoding.
//!
//! An identifier such as `AELF` is the base58 form of the low three little-endian bytes of a
//! 32-bit integer. Cross-chain protocol fields carry the integer.

use crate::errors::CaError;

pub fn chain_id_to_number(id: &str) -> Result<i32, CaError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(CaError::InvalidChainId("empty chain id".to_owned()));
    }
    let bytes = bs58::decode(id)
        .into_vec()
        .map_err(|e| CaError::InvalidChainId(format!("{id}: {e}")))?;
    if bytes.len() > 4 {
        return Err(CaError::InvalidChainId(format!(
            "{id}: decodes to {} bytes",
            bytes.len()
        )));
    }
    let mut le = [0_u8; 4];
    for (dst, src) in le.iter_mut().zip(bytes.iter()) {
        *dst = *src;
    }
    Ok(i32::from_le_bytes(le))
}

pub fn chain_id_from_number(n: i32) -> String {
    let le = n.to_le_bytes();
    bs58::encode(le.get(..3).unwrap_or(&le)).into_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_identifiers_map_to_canonical_numbers() -> eyre::Result<()> {
        assert_eq!(chain_id_to_number("AELF")?, 9_992_731);
        assert_eq!(chain_id_to_number("tDVV")?, 1_866_392);
        assert_eq!(chain_id_to_number("tDVW")?, 1_931_928);
        Ok(())
    }

    #[test]
    fn identifiers_round_trip() -> eyre::Result<()> {
        for id in ["AELF", "tDVV", "tDVW", "tDVX"] {
            let n = chain_id_to_number(id)?;
            assert_eq!(chain_id_from_number(n), id, "round trip of {id}");
        }
        Ok(())
    }

    #[test]
    fn distinct_identifiers_yield_distinct_numbers() -> eyre::Result<()> {
        let nums = ["AELF", "tDVV", "tDVW", "tDVX"]
            .iter()
            .map(|id| chain_id_to_number(id))
            .collect::<Result<std::collections::BTreeSet<_>, _>>()?;
        assert_eq!(nums.len(), 4);
        Ok(())
    }

    #[test]
    fn malformed_identifiers_are_rejected() {
        assert!(chain_id_to_number("").is_err());
        assert!(chain_id_to_number("0OIl").is_err());
        assert!(chain_id_to_number("AELFAELF").is_err());
    }
}
