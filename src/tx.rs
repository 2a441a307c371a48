//! Transaction Builder
//!
//! A plain value type assembled through explicit, validated steps. The
//! creator and assembler both drive it the same way: cell deps, then inputs
//! with their witnesses, then outputs, then `build` which checks the capacity
//! balance and freezes the transaction.

use crate::error::{HelperError, HelperResult};
use crate::types::{CellDep, CellInput, CellOutput, LiveCell, Transaction};

/// Step-wise transaction builder
#[derive(Debug, Default, Clone)]
pub struct TxBuilder {
    cell_deps: Vec<CellDep>,
    inputs: Vec<LiveCell>,
    witnesses: Vec<Vec<u8>>,
    outputs: Vec<CellOutput>,
    outputs_data: Vec<Vec<u8>>,
}

impl TxBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cell dependency; duplicates are collapsed
    pub fn cell_dep(&mut self, dep: CellDep) -> &mut Self {
        if !self.cell_deps.contains(&dep) {
            self.cell_deps.push(dep);
        }
        self
    }

    /// Consume a live cell, supplying the raw witness that will authorize it.
    /// Re-adding an out-point already consumed by this builder is an error.
    pub fn input(&mut self, cell: LiveCell, witness: Vec<u8>) -> HelperResult<&mut Self> {
        if self
            .inputs
            .iter()
            .any(|existing| existing.out_point == cell.out_point)
        {
            return Err(HelperError::TransactionBuild(format!(
                "input {:?} added twice",
                cell.out_point
            )));
        }
        self.inputs.push(cell);
        self.witnesses.push(witness);
        Ok(self)
    }

    /// Produce an output with its data field
    pub fn output(&mut self, output: CellOutput, data: Vec<u8>) -> &mut Self {
        self.outputs.push(output);
        self.outputs_data.push(data);
        self
    }

    /// Total capacity of the consumed inputs
    pub fn input_capacity(&self) -> u64 {
        self.inputs.iter().map(|cell| cell.output.capacity).sum()
    }

    /// Total capacity of the produced outputs
    pub fn output_capacity(&self) -> u64 {
        self.outputs.iter().map(|output| output.capacity).sum()
    }

    /// Validate the balance and freeze the transaction.
    ///
    /// Inputs must cover outputs plus `fee`; the difference above `fee` is
    /// the builder caller's business (it either became a change output
    /// already or is deliberately donated to the miner).
    pub fn build(self, fee: u64) -> HelperResult<Transaction> {
        if self.inputs.is_empty() {
            return Err(HelperError::TransactionBuild(
                "transaction has no inputs".to_string(),
            ));
        }
        if self.outputs.is_empty() {
            return Err(HelperError::TransactionBuild(
                "transaction has no outputs".to_string(),
            ));
        }
        let required = self
            .output_capacity()
            .checked_add(fee)
            .ok_or_else(|| HelperError::TransactionBuild("capacity overflow".to_string()))?;
        let available = self.input_capacity();
        if available < required {
            return Err(HelperError::InsufficientFunds {
                required,
                available,
            });
        }

        Ok(Transaction {
            version: 0,
            cell_deps: self.cell_deps,
            header_deps: Vec::new(),
            inputs: self
                .inputs
                .into_iter()
                .map(|cell| CellInput::new(cell.out_point))
                .collect(),
            outputs: self.outputs,
            outputs_data: self.outputs_data,
            witnesses: self.witnesses,
        })
    }
}
