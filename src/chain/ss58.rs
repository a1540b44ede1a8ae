//! SS58 address encoding.
//!
//! `base58(prefix ++ account ++ checksum)`, where the checksum is the first
//! two bytes of `blake2b-512("SS58PRE" ++ prefix ++ account)`. Prefixes below
//! 64 take one byte, prefixes up to 16383 take two.

use blake2::{Blake2b512, Digest};
use thiserror::Error;

const CHECKSUM_PREAMBLE: &[u8] = b"SS58PRE";
const CHECKSUM_LEN: usize = 2;
const ACCOUNT_LEN: usize = 32;

/// Largest encodable address prefix.
pub const MAX_PREFIX: u16 = 0x3fff;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Ss58Error {
    #[error("invalid base58 encoding")]
    Base58,

    #[error("invalid address length")]
    Length,

    #[error("invalid address prefix")]
    Prefix,

    #[error("invalid address checksum")]
    Checksum,

    #[error("address prefix {found} does not match network prefix {expected}")]
    WrongNetwork { expected: u16, found: u16 },
}

fn checksum(payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let mut hasher = Blake2b512::new();
    hasher.update(CHECKSUM_PREAMBLE);
    hasher.update(payload);
    let digest = hasher.finalize();
    [digest[0], digest[1]]
}

/// Decode an address into its prefix and 32-byte account id.
pub fn decode(address: &str) -> Result<(u16, [u8; ACCOUNT_LEN]), Ss58Error> {
    let data = bs58::decode(address).into_vec().map_err(|_| Ss58Error::Base58)?;
    if data.len() < 2 {
        return Err(Ss58Error::Length);
    }

    let (prefix_len, prefix) = match data[0] {
        0..=63 => (1, data[0] as u16),
        64..=127 => {
            let lower = (data[0] << 2) | (data[1] >> 6);
            let upper = data[1] & 0b0011_1111;
            (2, lower as u16 | ((upper as u16) << 8))
        }
        _ => return Err(Ss58Error::Prefix),
    };

    if data.len() != prefix_len + ACCOUNT_LEN + CHECKSUM_LEN {
        return Err(Ss58Error::Length);
    }

    let (payload, sum) = data.split_at(data.len() - CHECKSUM_LEN);
    if checksum(payload) != sum {
        return Err(Ss58Error::Checksum);
    }

    let mut account = [0u8; ACCOUNT_LEN];
    account.copy_from_slice(&payload[prefix_len..]);
    Ok((prefix, account))
}

/// Encode `account` under `prefix`. Prefixes above [`MAX_PREFIX`] are masked.
pub fn encode(prefix: u16, account: &[u8; ACCOUNT_LEN]) -> String {
    let ident = prefix & MAX_PREFIX;
    let mut data = match ident {
        0..=63 => vec![ident as u8],
        _ => {
            let first = ((ident & 0b0000_0000_1111_1100) as u8) >> 2;
            let second = ((ident >> 8) as u8) | (((ident & 0b0000_0000_0000_0011) as u8) << 6);
            vec![first | 0b0100_0000, second]
        }
    };
    data.extend_from_slice(account);
    let sum = checksum(&data);
    data.extend_from_slice(&sum);
    bs58::encode(data).into_string()
}

/// Check that `address` is well formed and belongs to the network `prefix`.
pub fn check(address: &str, prefix: u16) -> Result<[u8; ACCOUNT_LEN], Ss58Error> {
    let (found, account) = decode(address)?;
    if found != prefix {
        return Err(Ss58Error::WrongNetwork {
            expected: prefix,
            found,
        });
    }
    Ok(account)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Public key of the `//Alice` development account.
    const ALICE_KEY: [u8; 32] = [
        0xd4, 0x35, 0x93, 0xc7, 0x15, 0xfd, 0xd3, 0x1c, 0x61, 0x14, 0x1a, 0xbd, 0x04, 0xa9, 0x9f,
        0xd6, 0x82, 0x2c, 0x85, 0x58, 0x85, 0x4c, 0xcd, 0xe3, 0x9a, 0x56, 0x84, 0xe7, 0xa5, 0x6d,
        0xa2, 0x7d,
    ];
    const ALICE_GENERIC: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";

    #[test]
    fn test_known_address() {
        assert_eq!(encode(42, &ALICE_KEY), ALICE_GENERIC);
        assert_eq!(decode(ALICE_GENERIC), Ok((42, ALICE_KEY)));
    }

    #[test]
    fn test_two_byte_prefix() {
        let address = encode(1284, &ALICE_KEY);
        assert_eq!(decode(&address), Ok((1284, ALICE_KEY)));
        assert_ne!(address, encode(1285, &ALICE_KEY));
    }

    #[test]
    fn test_check_prefix() {
        assert_eq!(check(ALICE_GENERIC, 42), Ok(ALICE_KEY));
        assert_eq!(
            check(ALICE_GENERIC, 0),
            Err(Ss58Error::WrongNetwork {
                expected: 0,
                found: 42
            })
        );

        let polkadot = encode(0, &ALICE_KEY);
        assert!(polkadot.starts_with('1'));
        assert_eq!(check(&polkadot, 0), Ok(ALICE_KEY));
    }

    #[test]
    fn test_rejects_malformed() {
        assert_eq!(decode("0x1234"), Err(Ss58Error::Base58));
        let short = bs58::encode([42u8, 1, 2, 3]).into_string();
        assert_eq!(decode(&short), Err(Ss58Error::Length));

        // Flip the last character to break the checksum.
        let mut corrupted = ALICE_GENERIC.to_string();
        corrupted.pop();
        corrupted.push('R');
        assert_eq!(decode(&corrupted), Err(Ss58Error::Checksum));
    }
}
