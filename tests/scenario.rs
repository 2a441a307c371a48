//! End-to-end scenarios against an in-memory ledger.
//!
//! The mock ledger keeps real live/spent cell sets and admits transactions
//! the way the chain does: an input that was already consumed is a conflict,
//! an unknown input is a plain rejection. Transaction hashes come from the
//! production codec, so the walker traverses exactly the hashes the
//! assembler created.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use git_remote_ckb::address::encode_address;
use git_remote_ckb::codec::{encode_witness_args, tx_hash};
use git_remote_ckb::rpc::CellPage;
use git_remote_ckb::types::{
    CellOutput, OutPoint, Transaction, WitnessArgs, MIN_CELL_CAPACITY, SIGNATURE_LEN,
    SLOT_CAPACITY,
};
use git_remote_ckb::{
    Dispatcher, GitCollaborator, HelperConfig, HelperError, HelperResult, HistoryWalker,
    LedgerRpc, LiveCell, Network, Pointer, RemoteUrl, RepoCreator, RepoLocator, Script, SearchKey,
    Signer, TxBuilder, UpdateAssembler,
};

struct LedgerState {
    live: Vec<LiveCell>,
    spent: Vec<OutPoint>,
    txs: HashMap<[u8; 32], Transaction>,
}

/// In-memory ledger with double-spend admission
struct MockLedger {
    state: Mutex<LedgerState>,
}

impl MockLedger {
    fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState {
                live: Vec::new(),
                spent: Vec::new(),
                txs: HashMap::new(),
            }),
        }
    }

    /// Seed a live cell outside the admission rules, as a genesis would
    fn seed(&self, seed: u8, output: CellOutput, data: Vec<u8>) -> LiveCell {
        let cell = LiveCell {
            out_point: OutPoint {
                tx_hash: [seed; 32],
                index: 0,
            },
            output,
            data,
        };
        self.state.lock().unwrap().live.push(cell.clone());
        cell
    }

    fn seed_plain(&self, seed: u8, lock: &Script, capacity: u64) -> LiveCell {
        self.seed(
            seed,
            CellOutput {
                capacity,
                lock: lock.clone(),
                type_script: None,
            },
            Vec::new(),
        )
    }

    fn live_plain_capacity(&self, lock: &Script) -> u64 {
        self.state
            .lock()
            .unwrap()
            .live
            .iter()
            .filter(|c| &c.output.lock == lock && c.output.type_script.is_none())
            .map(|c| c.output.capacity)
            .sum()
    }
}

#[async_trait]
impl LedgerRpc for MockLedger {
    async fn get_cells(
        &self,
        search: &SearchKey,
        _cursor: Option<&str>,
    ) -> HelperResult<CellPage> {
        let state = self.state.lock().unwrap();
        let cells = state
            .live
            .iter()
            .filter(|cell| match search {
                SearchKey::Lock(lock) => &cell.output.lock == lock,
                SearchKey::Type(type_script) => {
                    cell.output.type_script.as_ref() == Some(type_script)
                }
            })
            .cloned()
            .collect();
        Ok(CellPage {
            cells,
            cursor: None,
        })
    }

    async fn get_transaction(&self, hash: &[u8; 32]) -> HelperResult<Option<Transaction>> {
        Ok(self.state.lock().unwrap().txs.get(hash).cloned())
    }

    async fn send_transaction(&self, tx: &Transaction) -> HelperResult<[u8; 32]> {
        let mut state = self.state.lock().unwrap();
        for input in &tx.inputs {
            let out_point = &input.previous_output;
            if state.spent.contains(out_point) {
                return Err(HelperError::Conflict(format!(
                    "input {:?} already consumed",
                    out_point
                )));
            }
            if !state.live.iter().any(|c| &c.out_point == out_point) {
                return Err(HelperError::SubmissionRejected(format!(
                    "unknown input {:?}",
                    out_point
                )));
            }
        }

        let hash = tx_hash(tx);
        for input in &tx.inputs {
            let out_point = input.previous_output.clone();
            state.live.retain(|c| c.out_point != out_point);
            state.spent.push(out_point);
        }
        for (index, output) in tx.outputs.iter().enumerate() {
            state.live.push(LiveCell {
                out_point: OutPoint {
                    tx_hash: hash,
                    index: index as u32,
                },
                output: output.clone(),
                data: tx.outputs_data[index].clone(),
            });
        }
        state.txs.insert(hash, tx.clone());
        Ok(hash)
    }
}

/// Signer producing a fixed recoverable-signature-shaped blob
struct MockSigner;

#[async_trait]
impl Signer for MockSigner {
    async fn sign_recoverable(
        &self,
        _owner: &str,
        _message: &[u8; 32],
    ) -> HelperResult<[u8; SIGNATURE_LEN]> {
        Ok([0xab; SIGNATURE_LEN])
    }
}

#[derive(Default)]
struct GitState {
    tip: Option<Pointer>,
    known: Vec<Pointer>,
    bundle: Vec<u8>,
    applied: Vec<Vec<u8>>,
}

/// Scripted local-repository double
#[derive(Clone, Default)]
struct MockGit {
    state: Arc<Mutex<GitState>>,
}

impl GitCollaborator for MockGit {
    fn local_tip(&self, _reference: &str) -> HelperResult<Option<Pointer>> {
        Ok(self.state.lock().unwrap().tip)
    }

    fn has_commit(&self, pointer: &Pointer) -> HelperResult<bool> {
        Ok(self.state.lock().unwrap().known.contains(pointer))
    }

    fn is_ancestor(&self, ancestor: &Pointer, _reference: &str) -> HelperResult<bool> {
        Ok(self.state.lock().unwrap().known.contains(ancestor))
    }

    fn apply_bundle(&self, bundle: &[u8]) -> HelperResult<()> {
        self.state.lock().unwrap().applied.push(bundle.to_vec());
        Ok(())
    }

    fn bundle_since(
        &self,
        _base: Option<&Pointer>,
        _reference: &str,
    ) -> HelperResult<(Vec<u8>, Pointer)> {
        let state = self.state.lock().unwrap();
        let tip = state
            .tip
            .ok_or_else(|| HelperError::Git("no local branch".to_string()))?;
        Ok((state.bundle.clone(), tip))
    }
}

struct Harness {
    ledger: Arc<MockLedger>,
    rpc: Arc<dyn LedgerRpc>,
    config: HelperConfig,
    owner_lock: Script,
    address: String,
}

impl Harness {
    fn new() -> Self {
        let ledger = Arc::new(MockLedger::new());
        let rpc: Arc<dyn LedgerRpc> = ledger.clone();
        let config = HelperConfig::testnet();
        let owner_lock = Script::secp256k1_lock(vec![0x42; 20]);
        let address = encode_address(&owner_lock, Network::Testnet).unwrap();
        Self {
            ledger,
            rpc,
            config,
            owner_lock,
            address,
        }
    }

    fn fund_owner(&self, seed: u8, capacity: u64) -> LiveCell {
        self.ledger.seed_plain(seed, &self.owner_lock, capacity)
    }

    fn creator(&self) -> RepoCreator {
        RepoCreator::new(self.rpc.clone(), Arc::new(MockSigner), self.config.clone())
    }

    fn assembler(&self) -> UpdateAssembler {
        UpdateAssembler::new(self.rpc.clone(), Arc::new(MockSigner), self.config.clone())
    }

    fn locator(&self) -> RepoLocator {
        RepoLocator::new(self.rpc.clone())
    }

    fn walker(&self) -> HistoryWalker {
        HistoryWalker::new(self.rpc.clone())
    }

    fn dispatcher(&self, url: RemoteUrl, git: MockGit) -> Dispatcher {
        Dispatcher::new(
            self.config.clone(),
            url,
            self.rpc.clone(),
            Arc::new(MockSigner),
            Box::new(git),
        )
    }
}

const P1: Pointer = Pointer([0x11; 20]);
const P2: Pointer = Pointer([0x22; 20]);

#[tokio::test]
async fn test_create_push_fetch_cycle() {
    let h = Harness::new();
    h.fund_owner(1, 500 * 100_000_000);

    let url = h.creator().allocate(&h.address).await.unwrap();
    assert_eq!(url.address, h.address);

    // A fresh repository is empty: no bundles, tip is the zero pointer.
    let cell = h.locator().find(&url).await.unwrap();
    assert_eq!(cell.data, Pointer::EMPTY.0.to_vec());
    assert!(h
        .walker()
        .walk(&cell, Pointer::EMPTY)
        .await
        .unwrap()
        .is_empty());

    // First push.
    h.assembler().advance(&url, P1, b"F1").await.unwrap();
    let cell = h.locator().find(&url).await.unwrap();
    assert_eq!(cell.data, P1.0.to_vec());
    assert_eq!(
        h.walker().walk(&cell, Pointer::EMPTY).await.unwrap(),
        vec![b"F1".to_vec()]
    );

    // Second push; a full walk sees both fragments oldest-first, a walk
    // from the previous checkpoint sees only the new one.
    h.assembler().advance(&url, P2, b"F2").await.unwrap();
    let cell = h.locator().find(&url).await.unwrap();
    assert_eq!(cell.data, P2.0.to_vec());
    assert_eq!(
        h.walker().walk(&cell, Pointer::EMPTY).await.unwrap(),
        vec![b"F1".to_vec(), b"F2".to_vec()]
    );
    assert_eq!(
        h.walker().walk(&cell, P1).await.unwrap(),
        vec![b"F2".to_vec()]
    );
}

#[tokio::test]
async fn test_slot_capacity_is_preserved_and_fees_come_from_owner() {
    let h = Harness::new();
    let initial = 500 * 100_000_000;
    h.fund_owner(1, initial);
    let fee = h.config.fee_shannons;

    let url = h.creator().allocate(&h.address).await.unwrap();
    let after_create = h.ledger.live_plain_capacity(&h.owner_lock);
    assert_eq!(after_create, initial - SLOT_CAPACITY - fee);

    h.assembler().advance(&url, P1, b"F1").await.unwrap();
    let cell = h.locator().find(&url).await.unwrap();
    assert_eq!(cell.output.capacity, SLOT_CAPACITY);
    assert_eq!(
        h.ledger.live_plain_capacity(&h.owner_lock),
        after_create - fee
    );
}

#[tokio::test]
async fn test_insufficient_funds_reported_before_submission() {
    let h = Harness::new();
    // Not even enough for the slot itself.
    h.fund_owner(1, SLOT_CAPACITY / 2);

    let result = h.creator().allocate(&h.address).await;
    assert!(matches!(
        result,
        Err(HelperError::InsufficientFunds { .. })
    ));
    // Nothing was consumed by the failed attempt.
    assert_eq!(
        h.ledger.live_plain_capacity(&h.owner_lock),
        SLOT_CAPACITY / 2
    );
}

#[tokio::test]
async fn test_concurrent_update_loses_as_conflict() {
    let h = Harness::new();
    h.fund_owner(1, 500 * 100_000_000);
    let fee_cell = h.fund_owner(2, MIN_CELL_CAPACITY + 10_000_000);

    let url = h.creator().allocate(&h.address).await.unwrap();
    let stale = h.locator().find(&url).await.unwrap();

    // Writer A advances normally.
    h.assembler().advance(&url, P1, b"F1").await.unwrap();

    // Writer B built against the same cell before A won; its submission
    // references a consumed out-point.
    let successor = CellOutput {
        capacity: stale.output.capacity,
        lock: stale.output.lock.clone(),
        type_script: stale.output.type_script.clone(),
    };
    let mut builder = TxBuilder::new();
    builder.cell_dep(h.config.lock_dep().unwrap());
    builder
        .input(
            stale,
            encode_witness_args(&WitnessArgs {
                lock: Some(vec![0u8; SIGNATURE_LEN]),
                input_type: Some(b"F1-competing".to_vec()),
                output_type: None,
            }),
        )
        .unwrap();
    builder.output(successor, P2.0.to_vec());
    builder.input(fee_cell, Vec::new()).unwrap();
    let tx = builder.build(h.config.fee_shannons).unwrap();

    let result = h.rpc.send_transaction(&tx).await;
    assert!(matches!(result, Err(HelperError::Conflict(_))));

    // The winner's state is untouched by the losing attempt.
    let cell = h.locator().find(&url).await.unwrap();
    assert_eq!(cell.data, P1.0.to_vec());
}

#[tokio::test]
async fn test_locator_uniqueness_trichotomy() {
    let h = Harness::new();
    h.fund_owner(1, 500 * 100_000_000);

    let url = h.creator().allocate(&h.address).await.unwrap();

    // Exactly one: found.
    assert!(h.locator().find(&url).await.is_ok());

    // Zero: a different slot id finds nothing, and `tip` maps that to None.
    let missing = git_remote_ckb::RemoteUrl::new(&h.address, [0xee; 32]).unwrap();
    assert!(matches!(
        h.locator().find(&missing).await,
        Err(HelperError::RepositoryNotFound(_))
    ));
    assert_eq!(h.locator().tip(&missing).await.unwrap(), None);

    // More than one: an interloper cell sharing the type script is
    // corruption, not a candidate to pick from.
    h.ledger.seed(
        0x99,
        CellOutput {
            capacity: SLOT_CAPACITY,
            lock: h.owner_lock.clone(),
            type_script: Some(url.type_script()),
        },
        P2.0.to_vec(),
    );
    assert!(matches!(
        h.locator().find(&url).await,
        Err(HelperError::Corrupted(_))
    ));
}

#[tokio::test]
async fn test_walk_is_deterministic_across_calls() {
    let h = Harness::new();
    h.fund_owner(1, 500 * 100_000_000);

    let url = h.creator().allocate(&h.address).await.unwrap();
    h.assembler().advance(&url, P1, b"F1").await.unwrap();
    h.assembler().advance(&url, P2, b"F2").await.unwrap();

    let cell = h.locator().find(&url).await.unwrap();
    let first = h.walker().walk(&cell, Pointer::EMPTY).await.unwrap();
    let second = h.walker().walk(&cell, Pointer::EMPTY).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
}

#[tokio::test]
async fn test_dispatcher_capabilities_and_empty_list() {
    let h = Harness::new();
    h.fund_owner(1, 500 * 100_000_000);
    let url = h.creator().allocate(&h.address).await.unwrap();

    let mut dispatcher = h.dispatcher(url, MockGit::default());
    let mut out = Vec::new();
    dispatcher
        .run("capabilities\nlist\n".as_bytes(), &mut out)
        .await
        .unwrap();

    // Capability block, then an empty ref listing for a fresh repository.
    assert_eq!(out, b"fetch\npush\n\n\n");
}

#[tokio::test]
async fn test_dispatcher_push_session_is_silent() {
    let h = Harness::new();
    h.fund_owner(1, 500 * 100_000_000);
    let url = h.creator().allocate(&h.address).await.unwrap();

    let git = MockGit::default();
    {
        let mut state = git.state.lock().unwrap();
        state.tip = Some(P1);
        state.bundle = b"B1".to_vec();
    }

    let mut dispatcher = h.dispatcher(url.clone(), git);
    let mut out = Vec::new();
    dispatcher
        .run(
            "list for-push\npush refs/heads/master:refs/heads/master\n\n".as_bytes(),
            &mut out,
        )
        .await
        .unwrap();

    // Empty listing, nothing for the successful push, one blank line closing
    // the batch.
    assert_eq!(out, b"\n\n");
    assert_eq!(h.locator().tip(&url).await.unwrap(), Some(P1));
}

#[tokio::test]
async fn test_dispatcher_fetch_session_lists_tip_and_applies_bundles() {
    let h = Harness::new();
    h.fund_owner(1, 500 * 100_000_000);
    let url = h.creator().allocate(&h.address).await.unwrap();
    h.assembler().advance(&url, P1, b"B1").await.unwrap();

    // A fresh clone: no local branch yet.
    let git = MockGit::default();
    let mut dispatcher = h.dispatcher(url, git.clone());
    let mut out = Vec::new();
    let script = format!("list\nfetch {} refs/heads/master\n\n", P1);
    dispatcher.run(script.as_bytes(), &mut out).await.unwrap();

    let expected = format!("{} refs/heads/master\n@refs/heads/master HEAD\n\n\n", P1);
    assert_eq!(String::from_utf8(out).unwrap(), expected);
    assert_eq!(git.state.lock().unwrap().applied, vec![b"B1".to_vec()]);
}

#[tokio::test]
async fn test_dispatcher_rejects_non_fast_forward_unless_forced() {
    let h = Harness::new();
    h.fund_owner(1, 500 * 100_000_000);
    let url = h.creator().allocate(&h.address).await.unwrap();
    h.assembler().advance(&url, P1, b"B1").await.unwrap();

    // Local history diverged: the remote tip is not an ancestor of P2.
    let git = MockGit::default();
    {
        let mut state = git.state.lock().unwrap();
        state.tip = Some(P2);
        state.bundle = b"B2".to_vec();
    }

    let mut dispatcher = h.dispatcher(url.clone(), git.clone());
    let mut out = Vec::new();
    let result = dispatcher
        .run(
            "push refs/heads/master:refs/heads/master\n".as_bytes(),
            &mut out,
        )
        .await;
    assert!(matches!(result, Err(HelperError::SubmissionRejected(_))));
    assert_eq!(h.locator().tip(&url).await.unwrap(), Some(P1));

    // The force marker overrides the ancestry check.
    let mut dispatcher = h.dispatcher(url.clone(), git);
    let mut out = Vec::new();
    dispatcher
        .run(
            "push +refs/heads/master:refs/heads/master\n".as_bytes(),
            &mut out,
        )
        .await
        .unwrap();
    assert!(out.is_empty());
    assert_eq!(h.locator().tip(&url).await.unwrap(), Some(P2));
}

#[tokio::test]
async fn test_dispatcher_rejects_untracked_ref() {
    let h = Harness::new();
    h.fund_owner(1, 500 * 100_000_000);
    let url = h.creator().allocate(&h.address).await.unwrap();

    let mut dispatcher = h.dispatcher(url, MockGit::default());
    let mut out = Vec::new();
    let result = dispatcher
        .run("fetch 1234abcd refs/heads/develop\n".as_bytes(), &mut out)
        .await;
    assert!(matches!(result, Err(HelperError::UnsupportedRef(_))));
}

/// Transport that fails before any cell can be served
struct DownTransport;

#[async_trait]
impl LedgerRpc for DownTransport {
    async fn get_cells(
        &self,
        _search: &SearchKey,
        _cursor: Option<&str>,
    ) -> HelperResult<CellPage> {
        Err(HelperError::RpcConnection("connection refused".to_string()))
    }

    async fn get_transaction(&self, _tx_hash: &[u8; 32]) -> HelperResult<Option<Transaction>> {
        unimplemented!()
    }

    async fn send_transaction(&self, _tx: &Transaction) -> HelperResult<[u8; 32]> {
        unimplemented!()
    }
}

#[tokio::test]
async fn test_transport_failure_during_funding_propagates() {
    let h = Harness::new();
    let creator = RepoCreator::new(
        Arc::new(DownTransport),
        Arc::new(MockSigner),
        h.config.clone(),
    );

    // A dead node must not be mistaken for an underfunded owner.
    let result = creator.allocate(&h.address).await;
    assert!(matches!(result, Err(HelperError::RpcConnection(_))));
}

#[tokio::test]
async fn test_advance_rejects_empty_pointer() {
    let h = Harness::new();
    h.fund_owner(1, 500 * 100_000_000);
    let url = h.creator().allocate(&h.address).await.unwrap();

    let result = h.assembler().advance(&url, Pointer::EMPTY, b"F1").await;
    assert!(matches!(result, Err(HelperError::TransactionBuild(_))));
}
