//! Identifier and hash helpers

use crate::error::ValidationError;
use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique id then encode using bech32 with the given hrp, e.g. `snap_`, `bk_`
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Checks that `hash` is a lowercase hex sha256 digest, as produced by `sha256::digest`.
pub fn check_sha256_hex(hash: &str) -> Result<(), ValidationError> {
    let lowercase = hash.chars().all(|c| !c.is_ascii_uppercase());
    match hex::decode(hash) {
        Ok(bytes) if bytes.len() == 32 && lowercase => Ok(()),
        _ => Err(ValidationError::InvalidHash(hash.into())),
    }
}

/// The first `len` characters of a hex digest, used in composite keys.
pub fn hash_prefix(hash: &str, len: usize) -> &str {
    &hash[..len.min(hash.len())]
}
