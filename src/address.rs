//! CKB Address Codec
//!
//! Decodes the owner credential embedded in a remote URL into its lock
//! script. Accepts the current full (bech32m) format plus the deprecated
//! short and full-legacy formats still seen in the wild.

use bech32::{Bech32m, Hrp};

use crate::config::Network;
use crate::error::{HelperError, HelperResult};
use crate::types::{HashType, Script};

const FORMAT_FULL: u8 = 0x00;
const FORMAT_SHORT: u8 = 0x01;
const FORMAT_FULL_DATA: u8 = 0x02;
const FORMAT_FULL_TYPE: u8 = 0x04;

const SHORT_INDEX_SECP: u8 = 0x00;

fn invalid(addr: &str, why: &str) -> HelperError {
    HelperError::InvalidAddress(format!("{}: {}", addr, why))
}

/// Decode a CKB address into its lock script.
///
/// The network prefix is accepted for both mainnet (`ckb`) and testnet/dev
/// (`ckt`); cross-checking it against the configured network is the caller's
/// concern.
pub fn decode_address(addr: &str) -> HelperResult<Script> {
    let (hrp, payload) =
        bech32::decode(addr).map_err(|e| invalid(addr, &e.to_string()))?;
    match hrp.to_lowercase().as_str() {
        "ckb" | "ckt" => {}
        other => return Err(invalid(addr, &format!("unknown prefix {}", other))),
    }
    let (format, rest) = payload
        .split_first()
        .ok_or_else(|| invalid(addr, "empty payload"))?;
    match *format {
        FORMAT_FULL => {
            if rest.len() < 33 {
                return Err(invalid(addr, "full address payload too short"));
            }
            let mut code_hash = [0u8; 32];
            code_hash.copy_from_slice(&rest[..32]);
            Ok(Script {
                code_hash,
                hash_type: HashType::from_byte(rest[32])
                    .map_err(|e| invalid(addr, &e.to_string()))?,
                args: rest[33..].to_vec(),
            })
        }
        FORMAT_SHORT => {
            let (index, args) = rest
                .split_first()
                .ok_or_else(|| invalid(addr, "short address payload too short"))?;
            if *index != SHORT_INDEX_SECP {
                return Err(invalid(addr, "only secp256k1 short addresses are supported"));
            }
            if args.len() != 20 {
                return Err(invalid(addr, "short address args must be 20 bytes"));
            }
            Ok(Script::secp256k1_lock(args.to_vec()))
        }
        FORMAT_FULL_DATA | FORMAT_FULL_TYPE => {
            if rest.len() < 32 {
                return Err(invalid(addr, "legacy full address payload too short"));
            }
            let mut code_hash = [0u8; 32];
            code_hash.copy_from_slice(&rest[..32]);
            let hash_type = if *format == FORMAT_FULL_DATA {
                HashType::Data
            } else {
                HashType::Type
            };
            Ok(Script {
                code_hash,
                hash_type,
                args: rest[32..].to_vec(),
            })
        }
        other => Err(invalid(addr, &format!("unknown address format 0x{:02x}", other))),
    }
}

/// Encode a lock script as a full-format (bech32m) CKB address
pub fn encode_address(script: &Script, network: Network) -> HelperResult<String> {
    let hrp = match network {
        Network::Mainnet => "ckb",
        Network::Testnet | Network::Dev => "ckt",
    };
    let hrp = Hrp::parse(hrp).map_err(|e| HelperError::InvalidAddress(e.to_string()))?;
    let mut payload = vec![FORMAT_FULL];
    payload.extend_from_slice(&script.code_hash);
    payload.push(script.hash_type.as_byte());
    payload.extend_from_slice(&script.args);
    bech32::encode::<Bech32m>(hrp, &payload)
        .map_err(|e| HelperError::InvalidAddress(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bech32::Bech32;
    use crate::types::SECP256K1_BLAKE160_CODE_HASH;

    #[test]
    fn test_full_address_round_trip() {
        let script = Script::secp256k1_lock(vec![0x42; 20]);
        let addr = encode_address(&script, Network::Testnet).unwrap();
        assert!(addr.starts_with("ckt1"));
        assert_eq!(decode_address(&addr).unwrap(), script);

        let mainnet = encode_address(&script, Network::Mainnet).unwrap();
        assert!(mainnet.starts_with("ckb1"));
        assert_eq!(decode_address(&mainnet).unwrap(), script);
    }

    #[test]
    fn test_short_address_decoding() {
        let args = vec![0x11; 20];
        let mut payload = vec![FORMAT_SHORT, SHORT_INDEX_SECP];
        payload.extend_from_slice(&args);
        let addr =
            bech32::encode::<Bech32>(Hrp::parse("ckb").unwrap(), &payload).unwrap();

        let script = decode_address(&addr).unwrap();
        assert_eq!(script.code_hash, SECP256K1_BLAKE160_CODE_HASH);
        assert_eq!(script.hash_type, HashType::Type);
        assert_eq!(script.args, args);
    }

    #[test]
    fn test_rejects_foreign_prefix() {
        let script = Script::secp256k1_lock(vec![0x42; 20]);
        let addr = encode_address(&script, Network::Mainnet).unwrap();
        let foreign = addr.replacen("ckb", "btc", 1);
        // Changing the prefix breaks the checksum before the prefix check
        // even fires; either way it must not decode.
        assert!(decode_address(&foreign).is_err());
    }

    #[test]
    fn test_rejects_unknown_format_byte() {
        let mut payload = vec![0x03];
        payload.extend_from_slice(&[0u8; 32]);
        let addr =
            bech32::encode::<Bech32m>(Hrp::parse("ckb").unwrap(), &payload).unwrap();
        assert!(decode_address(&addr).is_err());
    }

    #[test]
    fn test_rejects_truncated_payload() {
        let addr =
            bech32::encode::<Bech32m>(Hrp::parse("ckb").unwrap(), &[FORMAT_FULL, 1, 2])
                .unwrap();
        assert!(decode_address(&addr).is_err());
    }
}
