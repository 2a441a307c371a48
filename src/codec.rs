//! Molecule Serialization and CKB Hashing
//!
//! Hand-encoded subset of the molecule wire format, covering exactly the
//! structures this helper hashes or submits: `Script`, `CellOutput`,
//! `CellInput`, `CellDep`, `Bytes`, `WitnessArgs` and `RawTransaction`.
//!
//! Molecule layout rules used here:
//!
//! - fixvec: item count (u32 LE) followed by the fixed-size items
//! - dynvec/table: full size (u32 LE), one u32 LE offset per member, members
//! - option: absent encodes to zero bytes, present to the item itself

use blake2b_ref::{Blake2b, Blake2bBuilder};

use crate::error::{HelperError, HelperResult};
use crate::types::{
    CellDep, CellInput, CellOutput, OutPoint, Script, Transaction, WitnessArgs, SIGNATURE_LEN,
};

/// Personalization of every CKB hash
const CKB_HASH_PERSONALIZATION: &[u8] = b"ckb-default-hash";

/// Streaming ckb-blake2b-256 hasher: unkeyed blake2b with a 32-byte digest
/// and the `ckb-default-hash` personalization
pub struct CkbHasher(Blake2b);

impl CkbHasher {
    pub fn new() -> Self {
        CkbHasher(
            Blake2bBuilder::new(32)
                .personal(CKB_HASH_PERSONALIZATION)
                .build(),
        )
    }

    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.0.update(data);
        self
    }

    pub fn finalize(self) -> [u8; 32] {
        let mut out = [0u8; 32];
        self.0.finalize(&mut out);
        out
    }
}

impl Default for CkbHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot ckb-blake2b-256
pub fn ckb_hash(data: &[u8]) -> [u8; 32] {
    let mut h = CkbHasher::new();
    h.update(data);
    h.finalize()
}

fn mol_fixvec(items: &[Vec<u8>]) -> Vec<u8> {
    let mut out = (items.len() as u32).to_le_bytes().to_vec();
    for item in items {
        out.extend_from_slice(item);
    }
    out
}

fn mol_dynvec(members: &[Vec<u8>]) -> Vec<u8> {
    let header_len = 4 + 4 * members.len();
    let full_size = header_len + members.iter().map(Vec::len).sum::<usize>();
    let mut out = (full_size as u32).to_le_bytes().to_vec();
    let mut offset = header_len;
    for member in members {
        out.extend_from_slice(&(offset as u32).to_le_bytes());
        offset += member.len();
    }
    for member in members {
        out.extend_from_slice(member);
    }
    out
}

// Tables share the dynvec layout with a fixed member count.
fn mol_table(fields: &[Vec<u8>]) -> Vec<u8> {
    mol_dynvec(fields)
}

/// Molecule `Bytes` (fixvec of bytes)
pub fn encode_bytes(data: &[u8]) -> Vec<u8> {
    let mut out = (data.len() as u32).to_le_bytes().to_vec();
    out.extend_from_slice(data);
    out
}

fn encode_bytes_opt(data: Option<&[u8]>) -> Vec<u8> {
    match data {
        Some(d) => encode_bytes(d),
        None => Vec::new(),
    }
}

/// Molecule `OutPoint` (36-byte struct)
pub fn encode_out_point(op: &OutPoint) -> Vec<u8> {
    let mut out = op.tx_hash.to_vec();
    out.extend_from_slice(&op.index.to_le_bytes());
    out
}

/// Molecule `CellInput` (44-byte struct)
pub fn encode_cell_input(input: &CellInput) -> Vec<u8> {
    let mut out = input.since.to_le_bytes().to_vec();
    out.extend_from_slice(&encode_out_point(&input.previous_output));
    out
}

/// Molecule `CellDep` (37-byte struct)
pub fn encode_cell_dep(dep: &CellDep) -> Vec<u8> {
    let mut out = encode_out_point(&dep.out_point);
    out.push(dep.dep_type.as_byte());
    out
}

/// Molecule `Script` (table of code_hash, hash_type, args)
pub fn encode_script(script: &Script) -> Vec<u8> {
    mol_table(&[
        script.code_hash.to_vec(),
        vec![script.hash_type.as_byte()],
        encode_bytes(&script.args),
    ])
}

fn encode_script_opt(script: Option<&Script>) -> Vec<u8> {
    match script {
        Some(s) => encode_script(s),
        None => Vec::new(),
    }
}

/// Molecule `CellOutput` (table of capacity, lock, type)
pub fn encode_cell_output(output: &CellOutput) -> Vec<u8> {
    mol_table(&[
        output.capacity.to_le_bytes().to_vec(),
        encode_script(&output.lock),
        encode_script_opt(output.type_script.as_ref()),
    ])
}

/// Molecule `RawTransaction`: the hashed portion of a transaction (witnesses
/// excluded)
pub fn encode_raw_transaction(tx: &Transaction) -> Vec<u8> {
    let cell_deps: Vec<Vec<u8>> = tx.cell_deps.iter().map(encode_cell_dep).collect();
    let header_deps: Vec<Vec<u8>> = tx.header_deps.iter().map(|h| h.to_vec()).collect();
    let inputs: Vec<Vec<u8>> = tx.inputs.iter().map(encode_cell_input).collect();
    let outputs: Vec<Vec<u8>> = tx.outputs.iter().map(encode_cell_output).collect();
    let outputs_data: Vec<Vec<u8>> = tx.outputs_data.iter().map(|d| encode_bytes(d)).collect();
    mol_table(&[
        tx.version.to_le_bytes().to_vec(),
        mol_fixvec(&cell_deps),
        mol_fixvec(&header_deps),
        mol_fixvec(&inputs),
        mol_dynvec(&outputs),
        mol_dynvec(&outputs_data),
    ])
}

/// Transaction hash: ckb-blake2b-256 of the molecule `RawTransaction`
pub fn tx_hash(tx: &Transaction) -> [u8; 32] {
    ckb_hash(&encode_raw_transaction(tx))
}

/// Molecule `WitnessArgs` (table of three optional byte fields)
pub fn encode_witness_args(args: &WitnessArgs) -> Vec<u8> {
    mol_table(&[
        encode_bytes_opt(args.lock.as_deref()),
        encode_bytes_opt(args.input_type.as_deref()),
        encode_bytes_opt(args.output_type.as_deref()),
    ])
}

fn read_u32(bytes: &[u8], at: usize) -> HelperResult<u32> {
    let end = at
        .checked_add(4)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| HelperError::Codec("witness truncated".to_string()))?;
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[at..end]);
    Ok(u32::from_le_bytes(buf))
}

fn decode_bytes_opt(field: &[u8]) -> HelperResult<Option<Vec<u8>>> {
    if field.is_empty() {
        return Ok(None);
    }
    let len = read_u32(field, 0)? as usize;
    if field.len() != 4 + len {
        return Err(HelperError::Codec(format!(
            "bytes field length mismatch: header says {}, payload is {}",
            len,
            field.len() - 4
        )));
    }
    Ok(Some(field[4..].to_vec()))
}

/// Parse a molecule `WitnessArgs` from a raw witness
pub fn decode_witness_args(witness: &[u8]) -> HelperResult<WitnessArgs> {
    let full_size = read_u32(witness, 0)? as usize;
    if full_size != witness.len() {
        return Err(HelperError::Codec(format!(
            "witness size mismatch: header says {}, got {}",
            full_size,
            witness.len()
        )));
    }
    let first_offset = read_u32(witness, 4)? as usize;
    if first_offset != 16 {
        return Err(HelperError::Codec(format!(
            "witness is not a three-field table (first offset {})",
            first_offset
        )));
    }
    let offsets = [
        first_offset,
        read_u32(witness, 8)? as usize,
        read_u32(witness, 12)? as usize,
        full_size,
    ];
    let mut fields = [None, None, None];
    for i in 0..3 {
        let (start, end) = (offsets[i], offsets[i + 1]);
        if start > end || end > witness.len() {
            return Err(HelperError::Codec("witness offsets out of order".to_string()));
        }
        fields[i] = decode_bytes_opt(&witness[start..end])?;
    }
    let [lock, input_type, output_type] = fields;
    Ok(WitnessArgs {
        lock,
        input_type,
        output_type,
    })
}

/// Derive a type-id: ckb-blake2b-256 over the molecule-serialized first input
/// of the creating transaction plus the target output index.
///
/// The input reference can be consumed at most once in the life of the
/// ledger, so no other transaction can ever derive the same id.
pub fn type_id(first_input: &CellInput, output_index: u64) -> [u8; 32] {
    let mut h = CkbHasher::new();
    h.update(&encode_cell_input(first_input));
    h.update(&output_index.to_le_bytes());
    h.finalize()
}

/// Compute the sighash-all message for a transaction whose inputs all share
/// one lock script (this helper never builds any other shape).
///
/// Witness 0 must already carry its zero-filled signature placeholder; the
/// message covers the tx hash, then each witness in the group prefixed with
/// its length as u64 LE.
pub fn signing_message(tx: &Transaction) -> HelperResult<[u8; 32]> {
    if tx.inputs.is_empty() {
        return Err(HelperError::TransactionBuild(
            "cannot sign a transaction without inputs".to_string(),
        ));
    }
    let first = tx
        .witnesses
        .first()
        .ok_or_else(|| HelperError::TransactionBuild("missing witness 0".to_string()))?;
    let args = decode_witness_args(first)?;
    match &args.lock {
        Some(lock) if lock.len() == SIGNATURE_LEN => {}
        _ => {
            return Err(HelperError::TransactionBuild(
                "witness 0 lock field must hold the 65-byte signature placeholder".to_string(),
            ))
        }
    }

    let mut h = CkbHasher::new();
    h.update(&tx_hash(tx));
    h.update(&(first.len() as u64).to_le_bytes());
    h.update(first);
    let empty = Vec::new();
    for i in 1..tx.inputs.len() {
        let witness = tx.witnesses.get(i).unwrap_or(&empty);
        h.update(&(witness.len() as u64).to_le_bytes());
        h.update(witness);
    }
    Ok(h.finalize())
}

/// Replace the lock field of an encoded witness with the actual signature,
/// leaving the other fields (notably the attached bundle) untouched.
pub fn seal_witness(witness: &[u8], signature: &[u8; SIGNATURE_LEN]) -> HelperResult<Vec<u8>> {
    let mut args = decode_witness_args(witness)?;
    args.lock = Some(signature.to_vec());
    Ok(encode_witness_args(&args))
}
