//! Core Ledger Types
//!
//! Binary forms of the CKB structures the helper works with. JSON wire forms
//! live in [`crate::rpc`]; molecule serialization lives in [`crate::codec`].

use crate::error::{HelperError, HelperResult};
use std::fmt;

/// Code hash of the type-id system script ("TYPE_ID" right-aligned in 32 bytes)
pub const TYPE_ID_CODE_HASH: [u8; 32] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x54, 0x59, 0x50, 0x45, 0x5f,
    0x49, 0x44,
];

/// Code hash of the secp256k1-blake160 sighash-all lock (same on every network)
pub const SECP256K1_BLAKE160_CODE_HASH: [u8; 32] = [
    0x9b, 0xd7, 0xe0, 0x6f, 0x3e, 0xcf, 0x4b, 0xe0, 0xf2, 0xfc, 0xd2, 0x18, 0x8b, 0x23, 0xf1,
    0xb9, 0xfc, 0xc8, 0x8e, 0x5d, 0x4b, 0x65, 0xa8, 0x63, 0x7b, 0x17, 0x72, 0x3b, 0xbd, 0xa3,
    0xcc, 0xe8,
];

/// Capacity reserved for the repository cell, in shannons (146 CKB)
pub const SLOT_CAPACITY: u64 = 146 * 100_000_000;

/// Minimum capacity of a plain change cell, in shannons (61 CKB)
pub const MIN_CELL_CAPACITY: u64 = 61 * 100_000_000;

/// Length of a recoverable secp256k1 signature
pub const SIGNATURE_LEN: usize = 65;

/// Encode bytes as a 0x-prefixed hex string
pub fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Decode a 0x-prefixed (or bare) hex string
pub fn decode_hex(s: &str) -> HelperResult<Vec<u8>> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    Ok(hex::decode(stripped)?)
}

/// Decode a 0x-prefixed hex string into a 32-byte hash
pub fn decode_hex32(s: &str) -> HelperResult<[u8; 32]> {
    let bytes = decode_hex(s)?;
    bytes
        .try_into()
        .map_err(|_| HelperError::Codec(format!("expected 32 bytes of hex, got {}", s)))
}

/// Decode a 0x-prefixed hex quantity (CKB JSON Uint32/Uint64)
pub fn decode_hex_u64(s: &str) -> HelperResult<u64> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(stripped, 16)
        .map_err(|e| HelperError::Codec(format!("invalid hex quantity {}: {}", s, e)))
}

/// Encode a u64 as a 0x-prefixed hex quantity
pub fn encode_hex_u64(v: u64) -> String {
    format!("0x{:x}", v)
}

/// Tip pointer: a 20-byte git commit id stored in the repository cell's data
/// field. The all-zero value marks a freshly created, still-empty repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pointer(pub [u8; 20]);

impl Pointer {
    /// The sentinel pointer of an empty repository
    pub const EMPTY: Pointer = Pointer([0u8; 20]);

    /// Whether this is the empty sentinel
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Parse from the raw cell data field
    pub fn from_slice(bytes: &[u8]) -> HelperResult<Self> {
        let arr: [u8; 20] = bytes.try_into().map_err(|_| {
            HelperError::Codec(format!("pointer must be 20 bytes, got {}", bytes.len()))
        })?;
        Ok(Pointer(arr))
    }

    /// Parse from a hex commit id as printed by `git rev-parse`
    pub fn from_hex(s: &str) -> HelperResult<Self> {
        Self::from_slice(&decode_hex(s.trim())?)
    }

    /// Bare hex form, as git expects in `list` replies
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Script hash type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashType {
    Data,
    Type,
    Data1,
    Data2,
}

impl HashType {
    /// Molecule byte form
    pub fn as_byte(&self) -> u8 {
        match self {
            HashType::Data => 0,
            HashType::Type => 1,
            HashType::Data1 => 2,
            HashType::Data2 => 4,
        }
    }

    pub fn from_byte(b: u8) -> HelperResult<Self> {
        match b {
            0 => Ok(HashType::Data),
            1 => Ok(HashType::Type),
            2 => Ok(HashType::Data1),
            4 => Ok(HashType::Data2),
            _ => Err(HelperError::Codec(format!("unknown hash type byte {}", b))),
        }
    }

    /// JSON wire form
    pub fn as_str(&self) -> &'static str {
        match self {
            HashType::Data => "data",
            HashType::Type => "type",
            HashType::Data1 => "data1",
            HashType::Data2 => "data2",
        }
    }

    pub fn parse(s: &str) -> HelperResult<Self> {
        match s {
            "data" => Ok(HashType::Data),
            "type" => Ok(HashType::Type),
            "data1" => Ok(HashType::Data1),
            "data2" => Ok(HashType::Data2),
            _ => Err(HelperError::Codec(format!("unknown hash type {}", s))),
        }
    }
}

/// CKB script
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Script {
    pub code_hash: [u8; 32],
    pub hash_type: HashType,
    pub args: Vec<u8>,
}

impl Script {
    /// The type-id script binding a repository cell to its slot id
    pub fn type_id(slot_id: [u8; 32]) -> Self {
        Script {
            code_hash: TYPE_ID_CODE_HASH,
            hash_type: HashType::Type,
            args: slot_id.to_vec(),
        }
    }

    /// A secp256k1-blake160 lock for the given 20-byte public key hash
    pub fn secp256k1_lock(args: Vec<u8>) -> Self {
        Script {
            code_hash: SECP256K1_BLAKE160_CODE_HASH,
            hash_type: HashType::Type,
            args,
        }
    }
}

/// Reference to a transaction output
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutPoint {
    pub tx_hash: [u8; 32],
    pub index: u32,
}

/// Transaction input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellInput {
    pub since: u64,
    pub previous_output: OutPoint,
}

impl CellInput {
    /// An input consuming the given out-point with no since constraint
    pub fn new(previous_output: OutPoint) -> Self {
        CellInput {
            since: 0,
            previous_output,
        }
    }
}

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellOutput {
    pub capacity: u64,
    pub lock: Script,
    pub type_script: Option<Script>,
}

/// Cell dependency type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepType {
    Code,
    DepGroup,
}

impl DepType {
    pub fn as_byte(&self) -> u8 {
        match self {
            DepType::Code => 0,
            DepType::DepGroup => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DepType::Code => "code",
            DepType::DepGroup => "dep_group",
        }
    }

    pub fn parse(s: &str) -> HelperResult<Self> {
        match s {
            "code" => Ok(DepType::Code),
            "dep_group" => Ok(DepType::DepGroup),
            _ => Err(HelperError::Codec(format!("unknown dep type {}", s))),
        }
    }
}

/// Cell dependency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellDep {
    pub out_point: OutPoint,
    pub dep_type: DepType,
}

/// A complete transaction, in binary form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: u32,
    pub cell_deps: Vec<CellDep>,
    pub header_deps: Vec<[u8; 32]>,
    pub inputs: Vec<CellInput>,
    pub outputs: Vec<CellOutput>,
    pub outputs_data: Vec<Vec<u8>>,
    pub witnesses: Vec<Vec<u8>>,
}

/// Witness arguments: the three optional byte fields of a CKB witness.
///
/// `lock` carries the unlock proof (signature); `input_type` carries the git
/// bundle on repository updates. The two are composed side by side, never
/// overwriting each other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WitnessArgs {
    pub lock: Option<Vec<u8>>,
    pub input_type: Option<Vec<u8>>,
    pub output_type: Option<Vec<u8>>,
}

/// A live (unspent) cell as reported by the indexer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveCell {
    pub out_point: OutPoint,
    pub output: CellOutput,
    pub data: Vec<u8>,
}
