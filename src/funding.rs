//! Capacity Funding
//!
//! Greedy collection of the owner's plain live cells to cover capacity and
//! fees. This is the lock-filtered counterpart of the locator's type-filtered
//! query; the uniqueness invariant does not apply here, only "enough".

use std::sync::Arc;

use crate::error::{HelperError, HelperResult};
use crate::rpc::{LedgerRpc, SearchKey};
use crate::types::{LiveCell, OutPoint, Script};

/// Collects spendable capacity from the owner's cells
pub struct FundingSource {
    rpc: Arc<dyn LedgerRpc>,
    lock: Script,
}

impl FundingSource {
    pub fn new(rpc: Arc<dyn LedgerRpc>, lock: Script) -> Self {
        Self { rpc, lock }
    }

    /// Collect plain cells until their capacity reaches `required` shannons.
    ///
    /// Only cells without a type script and without data qualify; anything
    /// else may carry meaning some other protocol depends on. Cells in
    /// `exclude` are skipped (the repository cell itself shares the owner's
    /// lock). Exhausting the owner's cells first is `InsufficientFunds`.
    pub async fn collect(
        &self,
        required: u64,
        exclude: &[OutPoint],
    ) -> HelperResult<(Vec<LiveCell>, u64)> {
        let search = SearchKey::Lock(self.lock.clone());
        let mut collected: Vec<LiveCell> = Vec::new();
        let mut total: u64 = 0;
        let mut cursor: Option<String> = None;

        loop {
            let page = self.rpc.get_cells(&search, cursor.as_deref()).await?;
            if page.cells.is_empty() {
                break;
            }
            for cell in page.cells {
                if cell.output.type_script.is_some() || !cell.data.is_empty() {
                    continue;
                }
                if exclude.contains(&cell.out_point) {
                    continue;
                }
                total += cell.output.capacity;
                collected.push(cell);
                if total >= required {
                    return Ok((collected, total));
                }
            }
            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Err(HelperError::InsufficientFunds {
            required,
            available: total,
        })
    }
}
