//! SHA-1 digest primitive
//!
//! TPM 1.2 PC Client PCRs only carry a SHA-1 bank, so this is the single
//! hash every measurement goes through.

use sha1::{Digest, Sha1};

use crate::consts::SHA1_DIGEST_SIZE;

/// SHA-1 over a byte range
pub fn sha1(data: &[u8]) -> [u8; SHA1_DIGEST_SIZE] {
    let mut hasher = Sha1::new();
    hasher.update(data);

    let mut out = [0u8; SHA1_DIGEST_SIZE];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// PCR extend as the TPM computes it: `SHA1(old || digest)`
pub fn extend(pcr: &[u8; SHA1_DIGEST_SIZE], digest: &[u8; SHA1_DIGEST_SIZE]) -> [u8; SHA1_DIGEST_SIZE] {
    let mut hasher = Sha1::new();
    hasher.update(pcr);
    hasher.update(digest);

    let mut out = [0u8; SHA1_DIGEST_SIZE];
    out.copy_from_slice(&hasher.finalize());
    out
}
