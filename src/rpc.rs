//! CKB RPC Client
//!
//! JSON-RPC transport to a CKB node and its indexer. The [`LedgerRpc`] trait
//! is the seam the core components talk through; [`CkbRpcClient`] is the
//! reqwest-backed implementation, and tests substitute an in-memory ledger.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::CkbRpcConfig;
use crate::error::{HelperError, HelperResult};
use crate::types::{
    decode_hex, decode_hex32, decode_hex_u64, encode_hex, encode_hex_u64, CellDep, CellInput,
    CellOutput, DepType, HashType, LiveCell, OutPoint, Script, Transaction,
};

/// Cells fetched per indexer page
const PAGE_SIZE: u64 = 0x200;

/// Indexer query filter: exactly one dimension, never both.
///
/// The indexer accepts either a lock or a type script per query; encoding the
/// choice as an enum makes mixing them unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchKey {
    Lock(Script),
    Type(Script),
}

impl SearchKey {
    fn script(&self) -> &Script {
        match self {
            SearchKey::Lock(s) | SearchKey::Type(s) => s,
        }
    }

    fn script_type(&self) -> &'static str {
        match self {
            SearchKey::Lock(_) => "lock",
            SearchKey::Type(_) => "type",
        }
    }
}

/// One page of live cells, with the continuation cursor if the provider may
/// have more
#[derive(Debug, Clone)]
pub struct CellPage {
    pub cells: Vec<LiveCell>,
    pub cursor: Option<String>,
}

/// Ledger transport used by the locator, walker, creator and assembler
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Fetch one page of live cells matching the filter
    async fn get_cells(&self, search: &SearchKey, cursor: Option<&str>)
        -> HelperResult<CellPage>;

    /// Look up a committed transaction; `None` if the node does not know it
    async fn get_transaction(&self, tx_hash: &[u8; 32]) -> HelperResult<Option<Transaction>>;

    /// Submit a transaction. A double-spend of one of its inputs surfaces as
    /// [`HelperError::Conflict`]; any other rejection as
    /// [`HelperError::SubmissionRejected`].
    async fn send_transaction(&self, tx: &Transaction) -> HelperResult<[u8; 32]>;
}

/// JSON-RPC request
#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

/// JSON-RPC response
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
    #[allow(dead_code)]
    id: u64,
}

/// JSON-RPC error
#[derive(Debug, Deserialize)]
struct RpcError {
    code: i32,
    message: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonScript {
    code_hash: String,
    hash_type: String,
    args: String,
}

impl JsonScript {
    fn from_script(script: &Script) -> Self {
        JsonScript {
            code_hash: encode_hex(&script.code_hash),
            hash_type: script.hash_type.as_str().to_string(),
            args: encode_hex(&script.args),
        }
    }

    fn to_script(&self) -> HelperResult<Script> {
        Ok(Script {
            code_hash: decode_hex32(&self.code_hash)?,
            hash_type: HashType::parse(&self.hash_type)?,
            args: decode_hex(&self.args)?,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonOutPoint {
    tx_hash: String,
    index: String,
}

impl JsonOutPoint {
    fn from_out_point(op: &OutPoint) -> Self {
        JsonOutPoint {
            tx_hash: encode_hex(&op.tx_hash),
            index: encode_hex_u64(op.index as u64),
        }
    }

    fn to_out_point(&self) -> HelperResult<OutPoint> {
        Ok(OutPoint {
            tx_hash: decode_hex32(&self.tx_hash)?,
            index: decode_hex_u64(&self.index)? as u32,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonCellDep {
    out_point: JsonOutPoint,
    dep_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonInput {
    since: String,
    previous_output: JsonOutPoint,
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonOutput {
    capacity: String,
    lock: JsonScript,
    #[serde(rename = "type")]
    type_: Option<JsonScript>,
}

impl JsonOutput {
    fn from_output(output: &CellOutput) -> Self {
        JsonOutput {
            capacity: encode_hex_u64(output.capacity),
            lock: JsonScript::from_script(&output.lock),
            type_: output.type_script.as_ref().map(JsonScript::from_script),
        }
    }

    fn to_output(&self) -> HelperResult<CellOutput> {
        Ok(CellOutput {
            capacity: decode_hex_u64(&self.capacity)?,
            lock: self.lock.to_script()?,
            type_script: self.type_.as_ref().map(JsonScript::to_script).transpose()?,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonTransaction {
    version: String,
    cell_deps: Vec<JsonCellDep>,
    header_deps: Vec<String>,
    inputs: Vec<JsonInput>,
    outputs: Vec<JsonOutput>,
    outputs_data: Vec<String>,
    witnesses: Vec<String>,
}

impl JsonTransaction {
    fn from_transaction(tx: &Transaction) -> Self {
        JsonTransaction {
            version: encode_hex_u64(tx.version as u64),
            cell_deps: tx
                .cell_deps
                .iter()
                .map(|dep| JsonCellDep {
                    out_point: JsonOutPoint::from_out_point(&dep.out_point),
                    dep_type: dep.dep_type.as_str().to_string(),
                })
                .collect(),
            header_deps: tx.header_deps.iter().map(|h| encode_hex(h)).collect(),
            inputs: tx
                .inputs
                .iter()
                .map(|input| JsonInput {
                    since: encode_hex_u64(input.since),
                    previous_output: JsonOutPoint::from_out_point(&input.previous_output),
                })
                .collect(),
            outputs: tx.outputs.iter().map(JsonOutput::from_output).collect(),
            outputs_data: tx.outputs_data.iter().map(|d| encode_hex(d)).collect(),
            witnesses: tx.witnesses.iter().map(|w| encode_hex(w)).collect(),
        }
    }

    fn to_transaction(&self) -> HelperResult<Transaction> {
        Ok(Transaction {
            version: decode_hex_u64(&self.version)? as u32,
            cell_deps: self
                .cell_deps
                .iter()
                .map(|dep| {
                    Ok(CellDep {
                        out_point: dep.out_point.to_out_point()?,
                        dep_type: DepType::parse(&dep.dep_type)?,
                    })
                })
                .collect::<HelperResult<Vec<_>>>()?,
            header_deps: self
                .header_deps
                .iter()
                .map(|h| decode_hex32(h))
                .collect::<HelperResult<Vec<_>>>()?,
            inputs: self
                .inputs
                .iter()
                .map(|input| {
                    Ok(CellInput {
                        since: decode_hex_u64(&input.since)?,
                        previous_output: input.previous_output.to_out_point()?,
                    })
                })
                .collect::<HelperResult<Vec<_>>>()?,
            outputs: self
                .outputs
                .iter()
                .map(JsonOutput::to_output)
                .collect::<HelperResult<Vec<_>>>()?,
            outputs_data: self
                .outputs_data
                .iter()
                .map(|d| decode_hex(d))
                .collect::<HelperResult<Vec<_>>>()?,
            witnesses: self
                .witnesses
                .iter()
                .map(|w| decode_hex(w))
                .collect::<HelperResult<Vec<_>>>()?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct IndexerCell {
    out_point: JsonOutPoint,
    output: JsonOutput,
    #[serde(default)]
    output_data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IndexerPage {
    objects: Vec<IndexerCell>,
    last_cursor: String,
}

#[derive(Debug, Deserialize)]
struct TxRecord {
    transaction: JsonTransaction,
}

/// reqwest-backed CKB JSON-RPC client
pub struct CkbRpcClient {
    client: Client,
    config: CkbRpcConfig,
    request_id: std::sync::atomic::AtomicU64,
}

impl CkbRpcClient {
    /// Create a new client
    pub fn new(config: CkbRpcConfig) -> HelperResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| HelperError::RpcConnection(e.to_string()))?;
        Ok(Self {
            client,
            config,
            request_id: std::sync::atomic::AtomicU64::new(0),
        })
    }

    /// Make an RPC call against the given endpoint
    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        method: &str,
        params: serde_json::Value,
    ) -> HelperResult<T> {
        let id = self
            .request_id
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        let request = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        debug!("CKB RPC call: {} id={}", method, id);

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| HelperError::RpcConnection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HelperError::RpcRequest(format!("HTTP {} - {}", status, body)));
        }

        let rpc_response: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| HelperError::RpcRequest(e.to_string()))?;

        if let Some(error) = rpc_response.error {
            return Err(HelperError::RpcResponse {
                code: error.code,
                message: error.message,
            });
        }

        rpc_response
            .result
            .ok_or_else(|| HelperError::RpcRequest("empty response".to_string()))
    }

    /// Test connection to the node
    pub async fn ping(&self) -> HelperResult<()> {
        let _: String = self
            .call(&self.config.node_url, "get_tip_block_number", serde_json::json!([]))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerRpc for CkbRpcClient {
    async fn get_cells(
        &self,
        search: &SearchKey,
        cursor: Option<&str>,
    ) -> HelperResult<CellPage> {
        let search_key = serde_json::json!({
            "script": serde_json::to_value(JsonScript::from_script(search.script()))?,
            "script_type": search.script_type(),
        });
        let params = serde_json::json!([
            search_key,
            "asc",
            encode_hex_u64(PAGE_SIZE),
            cursor,
        ]);

        let page: IndexerPage = self
            .call(&self.config.indexer_url, "get_cells", params)
            .await?;

        let mut cells = Vec::with_capacity(page.objects.len());
        for object in page.objects {
            cells.push(LiveCell {
                out_point: object.out_point.to_out_point()?,
                output: object.output.to_output()?,
                data: decode_hex(object.output_data.as_deref().unwrap_or("0x"))?,
            });
        }
        let cursor = if cells.is_empty() {
            None
        } else {
            Some(page.last_cursor)
        };
        Ok(CellPage { cells, cursor })
    }

    async fn get_transaction(&self, tx_hash: &[u8; 32]) -> HelperResult<Option<Transaction>> {
        let record: Option<TxRecord> = self
            .call(
                &self.config.node_url,
                "get_transaction",
                serde_json::json!([encode_hex(tx_hash)]),
            )
            .await?;
        record.map(|r| r.transaction.to_transaction()).transpose()
    }

    async fn send_transaction(&self, tx: &Transaction) -> HelperResult<[u8; 32]> {
        let params = serde_json::json!([
            serde_json::to_value(JsonTransaction::from_transaction(tx))?,
            "passthrough",
        ]);
        let hash: String = self
            .call(&self.config.node_url, "send_transaction", params)
            .await
            .map_err(classify_rejection)?;
        decode_hex32(&hash)
    }
}

/// Map a node-side submission error onto the helper taxonomy.
///
/// A failed input resolution means some input was spent or never existed;
/// for this helper's transactions that is the double-spend race on the
/// repository cell, so it surfaces as `Conflict`.
fn classify_rejection(err: HelperError) -> HelperError {
    match err {
        HelperError::RpcResponse { code, message } => {
            if code == -301 || message.contains("Resolve") || message.contains("Dead") {
                HelperError::Conflict(message)
            } else {
                HelperError::SubmissionRejected(message)
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_key_single_dimension() {
        let script = Script::secp256k1_lock(vec![0u8; 20]);
        assert_eq!(SearchKey::Lock(script.clone()).script_type(), "lock");
        assert_eq!(SearchKey::Type(script).script_type(), "type");
    }

    #[test]
    fn test_json_transaction_round_trip() {
        let tx = Transaction {
            version: 0,
            cell_deps: vec![CellDep {
                out_point: OutPoint {
                    tx_hash: [0x71; 32],
                    index: 0,
                },
                dep_type: DepType::DepGroup,
            }],
            header_deps: Vec::new(),
            inputs: vec![CellInput::new(OutPoint {
                tx_hash: [0x12; 32],
                index: 1,
            })],
            outputs: vec![CellOutput {
                capacity: 146 * 100_000_000,
                lock: Script::secp256k1_lock(vec![0x34; 20]),
                type_script: Some(Script::type_id([0x56; 32])),
            }],
            outputs_data: vec![vec![0u8; 20]],
            witnesses: vec![vec![0xab; 4]],
        };
        let json = JsonTransaction::from_transaction(&tx);
        assert_eq!(json.to_transaction().unwrap(), tx);
    }

    #[test]
    fn test_rejection_classification() {
        let conflict = classify_rejection(HelperError::RpcResponse {
            code: -301,
            message: "TransactionFailedToResolve: Resolve(Dead(OutPoint(...)))".to_string(),
        });
        assert!(matches!(conflict, HelperError::Conflict(_)));

        let rejected = classify_rejection(HelperError::RpcResponse {
            code: -1107,
            message: "PoolRejectedTransactionByMinFeeRate".to_string(),
        });
        assert!(matches!(rejected, HelperError::SubmissionRejected(_)));

        let passthrough = classify_rejection(HelperError::RpcConnection("down".to_string()));
        assert!(matches!(passthrough, HelperError::RpcConnection(_)));
    }
}
