//! Repository Creation
//!
//! Mints the repository cell. The slot id is hashed from the creation
//! transaction's own first input plus the output index, so funding cells must
//! be chosen before the id can exist.

use std::sync::Arc;
use tracing::info;

use crate::address::decode_address;
use crate::codec::{encode_witness_args, seal_witness, signing_message, type_id};
use crate::config::HelperConfig;
use crate::error::{HelperError, HelperResult};
use crate::funding::FundingSource;
use crate::locator::RemoteUrl;
use crate::rpc::LedgerRpc;
use crate::signer::Signer;
use crate::tx::TxBuilder;
use crate::types::{
    encode_hex, CellInput, CellOutput, Pointer, Script, WitnessArgs, MIN_CELL_CAPACITY,
    SIGNATURE_LEN, SLOT_CAPACITY,
};

/// Allocates new repository cells
pub struct RepoCreator {
    rpc: Arc<dyn LedgerRpc>,
    signer: Arc<dyn Signer>,
    config: HelperConfig,
}

impl RepoCreator {
    pub fn new(rpc: Arc<dyn LedgerRpc>, signer: Arc<dyn Signer>, config: HelperConfig) -> Self {
        Self {
            rpc,
            signer,
            config,
        }
    }

    /// Create an empty repository owned by `address` and return its remote
    /// URL.
    ///
    /// Reserves the slot's standing capacity plus the transaction fee from
    /// the owner's plain cells; [`HelperError::InsufficientFunds`] if they
    /// cannot cover it.
    pub async fn allocate(&self, address: &str) -> HelperResult<RemoteUrl> {
        let owner_lock = decode_address(address)?;
        let fee = self.config.fee_shannons;
        let required = SLOT_CAPACITY + fee;

        let funding = FundingSource::new(self.rpc.clone(), owner_lock.clone());
        // Prefer room for a proper change cell; fall back to donating the
        // remainder when the owner's cells are close to the minimum.
        let (cells, total) = match funding.collect(required + MIN_CELL_CAPACITY, &[]).await {
            Ok(found) => found,
            Err(HelperError::InsufficientFunds { .. }) => funding.collect(required, &[]).await?,
            Err(e) => return Err(e),
        };

        let first_input = CellInput::new(cells[0].out_point.clone());
        let slot_id = type_id(&first_input, 0);

        let mut builder = TxBuilder::new();
        builder.cell_dep(self.config.lock_dep()?);
        let mut placeholder = Some(encode_witness_args(&WitnessArgs {
            lock: Some(vec![0u8; SIGNATURE_LEN]),
            ..Default::default()
        }));
        for cell in cells {
            builder.input(cell, placeholder.take().unwrap_or_default())?;
        }

        builder.output(
            CellOutput {
                capacity: SLOT_CAPACITY,
                lock: owner_lock.clone(),
                type_script: Some(Script::type_id(slot_id)),
            },
            Pointer::EMPTY.0.to_vec(),
        );
        let change = total - required;
        if change >= MIN_CELL_CAPACITY {
            builder.output(
                CellOutput {
                    capacity: change,
                    lock: owner_lock,
                    type_script: None,
                },
                Vec::new(),
            );
        }

        let mut tx = builder.build(fee)?;
        let message = signing_message(&tx)?;
        let signature = self.signer.sign_recoverable(address, &message).await?;
        tx.witnesses[0] = seal_witness(&tx.witnesses[0], &signature)?;

        let tx_hash = self.rpc.send_transaction(&tx).await?;
        info!(
            "created repository slot {} in transaction {}",
            encode_hex(&slot_id),
            encode_hex(&tx_hash)
        );

        RemoteUrl::new(address, slot_id)
    }
}
