//! Update Assembly
//!
//! Builds and submits the transaction that advances a repository to a new
//! tip. The repository cell is always input 0 and output 0, and the bundle
//! always rides in witness 0's `input_type` field; the walker depends on this
//! layout when it reads the chain back.
//!
//! Consuming the live cell is the whole concurrency story: two writers racing
//! from the same tip both reference the same out-point, the ledger admits one
//! transaction and rejects the other as a double spend, and the loser
//! surfaces here as [`HelperError::Conflict`]. No retry happens at this
//! layer.

use std::sync::Arc;
use tracing::{debug, info};

use crate::codec::{encode_witness_args, seal_witness, signing_message};
use crate::config::HelperConfig;
use crate::error::{HelperError, HelperResult};
use crate::funding::FundingSource;
use crate::locator::{RemoteUrl, RepoLocator};
use crate::rpc::LedgerRpc;
use crate::signer::Signer;
use crate::tx::TxBuilder;
use crate::types::{
    encode_hex, CellOutput, Pointer, WitnessArgs, MIN_CELL_CAPACITY, SIGNATURE_LEN,
};

/// Assembles and submits repository update transactions
pub struct UpdateAssembler {
    rpc: Arc<dyn LedgerRpc>,
    signer: Arc<dyn Signer>,
    config: HelperConfig,
}

impl UpdateAssembler {
    pub fn new(rpc: Arc<dyn LedgerRpc>, signer: Arc<dyn Signer>, config: HelperConfig) -> Self {
        Self {
            rpc,
            signer,
            config,
        }
    }

    /// Advance the repository at `url` to `new_pointer`, recording `bundle`
    /// as the history fragment for this step.
    ///
    /// Returns the hash of the admitted transaction. A competing update that
    /// consumed the cell first surfaces as [`HelperError::Conflict`].
    pub async fn advance(
        &self,
        url: &RemoteUrl,
        new_pointer: Pointer,
        bundle: &[u8],
    ) -> HelperResult<[u8; 32]> {
        if new_pointer.is_empty() {
            return Err(HelperError::TransactionBuild(
                "cannot advance a repository to the empty pointer".to_string(),
            ));
        }

        let locator = RepoLocator::new(self.rpc.clone());
        let current = locator.find(url).await?;
        debug!(
            "advancing slot {} from {} to {}",
            encode_hex(&url.slot_id),
            encode_hex(&current.data),
            new_pointer
        );

        let fee = self.config.fee_shannons;
        let mut builder = TxBuilder::new();
        builder.cell_dep(self.config.lock_dep()?);

        // The successor cell keeps the capacity, lock and type of its
        // predecessor; only the data changes.
        let successor = CellOutput {
            capacity: current.output.capacity,
            lock: current.output.lock.clone(),
            type_script: current.output.type_script.clone(),
        };
        let slot_out_point = current.out_point.clone();
        let witness = encode_witness_args(&WitnessArgs {
            lock: Some(vec![0u8; SIGNATURE_LEN]),
            input_type: Some(bundle.to_vec()),
            output_type: None,
        });
        builder.input(current, witness)?;
        builder.output(successor, new_pointer.0.to_vec());

        // Fee comes out of the owner's plain cells; the repository cell's
        // own capacity never shrinks.
        let funding = FundingSource::new(self.rpc.clone(), url.owner_lock.clone());
        let exclude = [slot_out_point];
        let (cells, total) = match funding.collect(fee + MIN_CELL_CAPACITY, &exclude).await {
            Ok(found) => found,
            Err(HelperError::InsufficientFunds { .. }) => funding.collect(fee, &exclude).await?,
            Err(e) => return Err(e),
        };
        for cell in cells {
            builder.input(cell, Vec::new())?;
        }
        let change = total - fee;
        if change >= MIN_CELL_CAPACITY {
            builder.output(
                CellOutput {
                    capacity: change,
                    lock: url.owner_lock.clone(),
                    type_script: None,
                },
                Vec::new(),
            );
        }

        let mut tx = builder.build(fee)?;
        let message = signing_message(&tx)?;
        let signature = self
            .signer
            .sign_recoverable(&url.address, &message)
            .await?;
        tx.witnesses[0] = seal_witness(&tx.witnesses[0], &signature)?;

        let tx_hash = self.rpc.send_transaction(&tx).await?;
        info!(
            "advanced slot {} to {} in transaction {}",
            encode_hex(&url.slot_id),
            new_pointer,
            encode_hex(&tx_hash)
        );
        Ok(tx_hash)
    }
}
