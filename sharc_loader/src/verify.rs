// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::crypto::{Crypto, HashAlgorithm, ImageHasher};
use crate::otp::{self, KeyStore};
use crate::Error;
use hex::ToHex as _;
use log::{debug, trace, warn};
use num_traits::FromPrimitive;
use packed_struct::prelude::*;
use sharc_areas::{
    OtpId, SecureHeader, SecureHeaderType, ATTR_ECDSA_TYPE, IMAGE_KEY_SLOTS,
    SECURE_HEADER_ATTRIBUTES, SECURE_HEADER_LEN,
};

/// An image whose secure header has passed the structural checks.
#[derive(Debug)]
pub struct SignedImage<'a> {
    pub header: SecureHeader,
    /// The attribute table, exactly as it appears in the image
    pub attributes: &'a [u8],
    /// The LDR stream following the header
    pub payload: &'a [u8],
}

/// Checks that `image` starts with a signed-image secure header whose
/// declared length accounts for exactly the rest of the buffer.
pub fn check_secure_header(image: &[u8]) -> Result<SignedImage<'_>, Error> {
    let expected = SecureHeader::packed_bytes_size(None)?;
    if expected != SECURE_HEADER_LEN {
        return Err(Error::HeaderLayout(expected));
    }

    let raw: &[u8; SECURE_HEADER_LEN] = image
        .get(..SECURE_HEADER_LEN)
        .and_then(|raw| raw.try_into().ok())
        .ok_or(Error::TruncatedSecureHeader(image.len()))?;
    let header = SecureHeader::unpack(raw)?;

    match SecureHeaderType::from_u32(header.header_type) {
        Some(SecureHeaderType::Signed) => (),
        Some(t) => {
            warn!("{t:?} images are not supported");
            return Err(Error::UnsupportedHeaderType(t));
        }
        None => return Err(Error::UnknownHeaderType(header.header_type)),
    }

    if u64::from(header.length) + SECURE_HEADER_LEN as u64 != image.len() as u64 {
        return Err(Error::PayloadLength {
            declared: header.length,
            header: SECURE_HEADER_LEN,
            buffer: image.len(),
        });
    }

    Ok(SignedImage {
        attributes: &image[SECURE_HEADER_ATTRIBUTES],
        payload: &image[SECURE_HEADER_LEN..],
        header,
    })
}

/// Picks the digest from the ECDSA type attribute. Empty slots (id 0) and
/// attributes we don't know are passed over.
pub fn hash_algorithm(header: &SecureHeader) -> Result<HashAlgorithm, Error> {
    for attr in header.attributes() {
        if attr.id == 0 {
            continue;
        }
        trace!("attribute {:#010x} = {:#x}", attr.id, attr.value);
        if attr.id == ATTR_ECDSA_TYPE {
            return match attr.value {
                224 => Ok(HashAlgorithm::Sha224),
                256 => Ok(HashAlgorithm::Sha256),
                v => Err(Error::UnsupportedDigestSize(v)),
            };
        }
    }
    Err(Error::MissingHashAttribute)
}

/// Verifies signed images against the keys held in OTP.
pub struct ImageVerifier<C, K> {
    crypto: C,
    keys: K,
}

impl<C: Crypto, K: KeyStore> ImageVerifier<C, K> {
    pub fn new(crypto: C, keys: K) -> Self {
        ImageVerifier { crypto, keys }
    }

    pub fn keys(&self) -> &K {
        &self.keys
    }

    pub fn keys_mut(&mut self) -> &mut K {
        &mut self.keys
    }

    /// Full check of a signed image: header structure, digest, signature.
    pub fn verify(&self, image: &[u8]) -> Result<(), Error> {
        let signed = check_secure_header(image)?;
        self.verify_signed(&signed)
    }

    pub fn verify_signed(&self, image: &SignedImage<'_>) -> Result<(), Error> {
        let alg = hash_algorithm(&image.header)?;

        let mut hasher = self.crypto.hash_start(alg);
        hasher.update(image.attributes);
        hasher.update(image.payload);
        let digest = hasher.finish();

        let expected = &image.header.hash[..alg.digest_len()];
        if digest.as_bytes() != expected {
            debug!(
                "{alg:?} digest {} does not match header {}",
                digest.as_bytes().encode_hex::<String>(),
                expected.encode_hex::<String>()
            );
            return Err(Error::DigestMismatch);
        }
        trace!("{alg:?} digest ok");

        let signature = image.header.signature();
        let mut result = Err(Error::KeyUnavailable(IMAGE_KEY_SLOTS[0]));
        for id in IMAGE_KEY_SLOTS {
            result = self.check_signature(id, digest.as_bytes(), &signature);
            match &result {
                Ok(()) => {
                    debug!("image signed by {id:?}");
                    break;
                }
                Err(e) => debug!("{id:?}: {e}"),
            }
        }
        result
    }

    fn check_signature(
        &self,
        id: OtpId,
        digest: &[u8],
        signature: &[u8; 64],
    ) -> Result<(), Error> {
        let key = otp::read_public_key(&self.keys, id)?;
        if self.crypto.ecdsa_p256_verify(&key, digest, signature) {
            Ok(())
        } else {
            Err(Error::BadSignature(id))
        }
    }
}
