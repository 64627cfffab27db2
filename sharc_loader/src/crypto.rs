// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use log::debug;
use p256::ecdsa::{signature::hazmat::PrehashVerifier, Signature, VerifyingKey};
use sha2::{Digest as _, Sha224, Sha256};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum HashAlgorithm {
    Sha224,
    Sha256,
}

impl HashAlgorithm {
    pub fn digest_len(self) -> usize {
        match self {
            HashAlgorithm::Sha224 => 28,
            HashAlgorithm::Sha256 => 32,
        }
    }
}

/// A digest of up to 256 bits.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ImageDigest {
    bytes: [u8; 32],
    len: usize,
}

impl ImageDigest {
    fn new(digest: &[u8]) -> ImageDigest {
        let mut bytes = [0u8; 32];
        bytes[..digest.len()].copy_from_slice(digest);
        ImageDigest {
            bytes,
            len: digest.len(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

pub trait ImageHasher {
    fn update(&mut self, data: &[u8]);
    fn finish(self) -> ImageDigest;
}

/// The primitives image verification is built on.
pub trait Crypto {
    type Hasher: ImageHasher;

    fn hash_start(&self, alg: HashAlgorithm) -> Self::Hasher;

    /// Checks a raw `r || s` signature over `digest` against an uncompressed
    /// P-256 point `x || y`. A key that is not a valid point verifies
    /// nothing.
    fn ecdsa_p256_verify(&self, public_key: &[u8; 64], digest: &[u8], signature: &[u8; 64])
        -> bool;
}

#[derive(Debug, Default)]
pub struct RustCrypto;

pub enum RustCryptoHasher {
    Sha224(Sha224),
    Sha256(Sha256),
}

impl ImageHasher for RustCryptoHasher {
    fn update(&mut self, data: &[u8]) {
        match self {
            RustCryptoHasher::Sha224(h) => h.update(data),
            RustCryptoHasher::Sha256(h) => h.update(data),
        }
    }

    fn finish(self) -> ImageDigest {
        match self {
            RustCryptoHasher::Sha224(h) => ImageDigest::new(&h.finalize()),
            RustCryptoHasher::Sha256(h) => ImageDigest::new(&h.finalize()),
        }
    }
}

impl Crypto for RustCrypto {
    type Hasher = RustCryptoHasher;

    fn hash_start(&self, alg: HashAlgorithm) -> RustCryptoHasher {
        match alg {
            HashAlgorithm::Sha224 => RustCryptoHasher::Sha224(Sha224::new()),
            HashAlgorithm::Sha256 => RustCryptoHasher::Sha256(Sha256::new()),
        }
    }

    fn ecdsa_p256_verify(
        &self,
        public_key: &[u8; 64],
        digest: &[u8],
        signature: &[u8; 64],
    ) -> bool {
        let mut sec1 = [0u8; 65];
        sec1[0] = 0x04;
        sec1[1..].copy_from_slice(public_key);

        let key = match VerifyingKey::from_sec1_bytes(&sec1) {
            Ok(key) => key,
            Err(e) => {
                debug!("public key is not a P-256 point: {e}");
                return false;
            }
        };
        let sig = match Signature::from_slice(signature) {
            Ok(sig) => sig,
            Err(e) => {
                debug!("malformed signature: {e}");
                return false;
            }
        };
        key.verify_prehash(digest, &sig).is_ok()
    }
}
