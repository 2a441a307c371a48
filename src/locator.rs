//! Repository Slot Locator
//!
//! Parses `ckb://address@type_id` remote URLs and finds the single live cell
//! holding a repository's current state. The locator pages through the
//! indexer with a continuation cursor, accumulating every candidate before it
//! judges the uniqueness invariant: zero candidates is a missing repository,
//! more than one means something external has interfered with the slot.

use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::address::decode_address;
use crate::error::{HelperError, HelperResult};
use crate::rpc::{LedgerRpc, SearchKey};
use crate::types::{decode_hex32, encode_hex, LiveCell, Pointer, Script};

/// Parsed remote URL: the owner credential plus the repository's slot id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUrl {
    /// Owner's CKB address, exactly as it appeared in the URL
    pub address: String,
    /// Lock script decoded from the address
    pub owner_lock: Script,
    /// 32-byte type-id binding the repository to its cell
    pub slot_id: [u8; 32],
}

impl RemoteUrl {
    /// Parse a `ckb://address@type_id` locator string
    pub fn parse(raw: &str) -> HelperResult<Self> {
        let rest = raw
            .strip_prefix("ckb://")
            .ok_or_else(|| HelperError::InvalidUrl(format!("{}: expected ckb:// scheme", raw)))?;
        let (address, slot_hex) = rest.split_once('@').ok_or_else(|| {
            HelperError::InvalidUrl(format!("{}: expected address@type_id", raw))
        })?;
        let slot_id = decode_hex32(slot_hex).map_err(|_| {
            HelperError::InvalidUrl(format!("{}: type_id must be 32 bytes of hex", raw))
        })?;
        Ok(RemoteUrl {
            address: address.to_string(),
            owner_lock: decode_address(address)?,
            slot_id,
        })
    }

    /// Assemble a URL for a freshly allocated repository
    pub fn new(address: &str, slot_id: [u8; 32]) -> HelperResult<Self> {
        Ok(RemoteUrl {
            address: address.to_string(),
            owner_lock: decode_address(address)?,
            slot_id,
        })
    }

    /// The type-id script identifying the repository cell
    pub fn type_script(&self) -> Script {
        Script::type_id(self.slot_id)
    }
}

impl fmt::Display for RemoteUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ckb://{}@{}", self.address, encode_hex(&self.slot_id))
    }
}

/// Finds the current repository cell
pub struct RepoLocator {
    rpc: Arc<dyn LedgerRpc>,
}

impl RepoLocator {
    pub fn new(rpc: Arc<dyn LedgerRpc>) -> Self {
        Self { rpc }
    }

    /// Locate the unique live repository cell.
    ///
    /// Every indexer page is consumed before the candidate count is judged;
    /// a short-circuit on the first hit could mask a duplicate on a later
    /// page.
    pub async fn find(&self, url: &RemoteUrl) -> HelperResult<LiveCell> {
        let search = SearchKey::Type(url.type_script());
        let mut candidates: Vec<LiveCell> = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self.rpc.get_cells(&search, cursor.as_deref()).await?;
            if page.cells.is_empty() {
                break;
            }
            candidates.extend(page.cells);
            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        debug!(
            "located {} candidate cell(s) for slot {}",
            candidates.len(),
            encode_hex(&url.slot_id)
        );

        let mut candidates = candidates.into_iter();
        match (candidates.next(), candidates.next()) {
            (None, _) => Err(HelperError::RepositoryNotFound(url.to_string())),
            (Some(cell), None) => Ok(cell),
            (Some(_), Some(_)) => Err(HelperError::Corrupted(format!(
                "multiple live cells share slot {}",
                encode_hex(&url.slot_id)
            ))),
        }
    }

    /// Current tip pointer, or `None` when the repository does not exist yet.
    /// Used by `list`, which must not treat a missing repository as fatal.
    pub async fn tip(&self, url: &RemoteUrl) -> HelperResult<Option<Pointer>> {
        match self.find(url).await {
            Ok(cell) => Ok(Some(Pointer::from_slice(&cell.data)?)),
            Err(HelperError::RepositoryNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
