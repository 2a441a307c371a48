//! History Walker
//!
//! Reconstructs repository history by walking the transaction chain backward
//! from the current repository cell. No index of past states exists anywhere;
//! the only way back is the consumed-input reference each update transaction
//! records.
//!
//! Every update transaction keeps the repository cell at input 0 / output 0
//! (an assembler invariant), so each hop reads output 0's pointer and witness
//! 0's bundle, then follows input 0 to the predecessor.

use std::sync::Arc;
use tracing::debug;

use crate::codec::decode_witness_args;
use crate::error::{HelperError, HelperResult};
use crate::rpc::LedgerRpc;
use crate::types::{encode_hex, LiveCell, Pointer};

/// Walks the update chain of a repository cell
pub struct HistoryWalker {
    rpc: Arc<dyn LedgerRpc>,
}

impl HistoryWalker {
    pub fn new(rpc: Arc<dyn LedgerRpc>) -> Self {
        Self { rpc }
    }

    /// Collect the bundles between the current cell and `checkpoint`, in
    /// oldest-first application order.
    ///
    /// Termination, checked in order at every transaction:
    /// 1. pointer == EMPTY: the creation transaction; nothing to report.
    /// 2. pointer == checkpoint: the caller already has state up to here.
    /// Otherwise the bundle is collected and the walk follows input 0 to the
    /// predecessor. An unreachable predecessor is `BrokenChain`, a provider
    /// failure rather than a normal end of history.
    ///
    /// The walk is stateless: repeated calls against an unchanged chain
    /// return identical results.
    pub async fn walk(
        &self,
        current: &LiveCell,
        checkpoint: Pointer,
    ) -> HelperResult<Vec<Vec<u8>>> {
        let mut bundles: Vec<Vec<u8>> = Vec::new();
        let mut tx_hash = current.out_point.tx_hash;

        loop {
            let tx = self.rpc.get_transaction(&tx_hash).await?.ok_or_else(|| {
                HelperError::BrokenChain(format!(
                    "transaction {} is unavailable",
                    encode_hex(&tx_hash)
                ))
            })?;

            let data = tx.outputs_data.first().ok_or_else(|| {
                HelperError::BrokenChain(format!(
                    "transaction {} has no repository output",
                    encode_hex(&tx_hash)
                ))
            })?;
            let pointer = Pointer::from_slice(data).map_err(|_| {
                HelperError::BrokenChain(format!(
                    "transaction {} has malformed pointer data ({} bytes)",
                    encode_hex(&tx_hash),
                    data.len()
                ))
            })?;

            if pointer.is_empty() {
                debug!("reached creation transaction {}", encode_hex(&tx_hash));
                break;
            }
            if pointer == checkpoint {
                debug!("reached checkpoint {} at {}", checkpoint, encode_hex(&tx_hash));
                break;
            }

            let witness = tx.witnesses.first().ok_or_else(|| {
                HelperError::BrokenChain(format!(
                    "update transaction {} has no witness",
                    encode_hex(&tx_hash)
                ))
            })?;
            let bundle = decode_witness_args(witness)?.input_type.ok_or_else(|| {
                HelperError::BrokenChain(format!(
                    "update transaction {} carries no bundle",
                    encode_hex(&tx_hash)
                ))
            })?;
            bundles.push(bundle);

            let predecessor = tx.inputs.first().ok_or_else(|| {
                HelperError::BrokenChain(format!(
                    "update transaction {} has no inputs",
                    encode_hex(&tx_hash)
                ))
            })?;
            tx_hash = predecessor.previous_output.tx_hash;
        }

        // Collected newest-first; callers apply oldest-first.
        bundles.reverse();
        Ok(bundles)
    }
}
