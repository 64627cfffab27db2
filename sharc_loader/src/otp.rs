// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::Error;
use log::debug;
use sharc_areas::{OtpId, OTP_PUBLIC_KEY_LEN};

/// Read access to the one-time-programmable key store.
pub trait KeyStore {
    fn is_written(&self, id: OtpId) -> Result<bool, Error>;

    /// Whether the field has been invalidated. Says nothing about whether it
    /// was ever written.
    fn is_valid(&self, id: OtpId) -> Result<bool, Error>;

    /// Reads the field into `buf`, returning the field's length.
    fn read(&self, id: OtpId, buf: &mut [u8]) -> Result<usize, Error>;
}

/// Fetches an image verification key, which must be written, not
/// invalidated, and exactly one P-256 point long.
pub fn read_public_key<K: KeyStore + ?Sized>(
    keys: &K,
    id: OtpId,
) -> Result<[u8; OTP_PUBLIC_KEY_LEN], Error> {
    if !keys.is_written(id)? {
        debug!("{id:?} has not been written");
        return Err(Error::KeyUnavailable(id));
    }
    if !keys.is_valid(id)? {
        debug!("{id:?} has been invalidated");
        return Err(Error::KeyUnavailable(id));
    }

    let mut key = [0u8; OTP_PUBLIC_KEY_LEN];
    let len = keys.read(id, &mut key)?;
    if len != OTP_PUBLIC_KEY_LEN {
        return Err(Error::KeyLength {
            id,
            len,
            expected: OTP_PUBLIC_KEY_LEN,
        });
    }
    Ok(key)
}
