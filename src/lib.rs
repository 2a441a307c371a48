//! Git Remote Helper for the Nervos CKB Ledger
//!
//! This crate lets git treat a public append-only ledger as remote storage.
//! One live cell on the chain (the repository slot) holds the current tip of
//! `refs/heads/master`; every push consumes that cell and produces a
//! successor carrying the new tip, with the pushed commits attached as a git
//! bundle in the transaction witness. History is never stored anywhere else:
//! a clone walks the consumed-input chain backward and replays the bundles.
//!
//! # Architecture
//!
//! - **Protocol Dispatcher**: speaks the remote-helper line protocol to git
//! - **Repo Locator**: resolves `ckb://address@type_id` URLs to the live cell
//! - **History Walker**: reconstructs bundles from the backward tx chain
//! - **Update Assembler**: builds, signs and submits advance transactions
//! - **Repo Creator**: mints a fresh repository slot with a type-id script
//! - **Codec**: molecule serialization, hashing and sighash messages
//!
//! Concurrency control is the ledger's own double-spend rule: of two pushes
//! racing from the same tip, exactly one transaction is admitted and the
//! other fails with a conflict.
//!
//! # Wire Layout
//!
//! ```text
//! | Piece          | Where                        | Content               |
//! |----------------|------------------------------|-----------------------|
//! | Tip pointer    | repository cell data         | 20-byte commit hash   |
//! | History bundle | witness 0, input_type field  | git bundle bytes      |
//! | Slot identity  | type-id script args          | 32-byte unique id     |
//! ```
//!
//! A pointer of twenty zero bytes marks an empty repository.

pub mod address;
pub mod assembler;
pub mod codec;
pub mod config;
pub mod creator;
pub mod error;
pub mod funding;
pub mod git;
pub mod locator;
pub mod protocol;
pub mod rpc;
pub mod signer;
pub mod tx;
pub mod types;
pub mod walker;

pub use assembler::UpdateAssembler;
pub use config::{CkbRpcConfig, HelperConfig, Network};
pub use creator::RepoCreator;
pub use error::{HelperError, HelperResult};
pub use git::{GitCli, GitCollaborator};
pub use locator::{RemoteUrl, RepoLocator};
pub use protocol::{Command, Dispatcher, Mode, TRACKED_REF};
pub use rpc::{CkbRpcClient, LedgerRpc, SearchKey};
pub use signer::{CkbCliSigner, Signer};
pub use tx::TxBuilder;
pub use types::{LiveCell, Pointer, Script};
pub use walker::HistoryWalker;
