//! Local Git Operations
//!
//! The helper never parses git object data itself. Everything it needs from
//! the local repository goes through this seam: tip lookups, ancestry
//! checks, and bundle creation/application. The real implementation shells
//! out to the `git` binary that invoked us; tests substitute their own
//! [`GitCollaborator`].

use std::process::{Command, Output};

use tracing::debug;

use crate::error::{HelperError, HelperResult};
use crate::types::Pointer;

/// Operations against the local git repository
pub trait GitCollaborator: Send + Sync {
    /// Commit the given ref currently points at, if the ref exists
    fn local_tip(&self, reference: &str) -> HelperResult<Option<Pointer>>;

    /// Whether the commit behind `pointer` exists locally
    fn has_commit(&self, pointer: &Pointer) -> HelperResult<bool>;

    /// Whether `ancestor` is an ancestor of (or equal to) the ref's tip
    fn is_ancestor(&self, ancestor: &Pointer, reference: &str) -> HelperResult<bool>;

    /// Unbundle a history fragment into the local repository
    fn apply_bundle(&self, bundle: &[u8]) -> HelperResult<()>;

    /// Bundle the ref's history since `base` (the full history when `base`
    /// is absent) and return it with the tip it leads to
    fn bundle_since(
        &self,
        base: Option<&Pointer>,
        reference: &str,
    ) -> HelperResult<(Vec<u8>, Pointer)>;
}

/// [`GitCollaborator`] backed by the `git` binary
///
/// Runs in the working directory git gave us; `GIT_DIR` from the environment
/// is inherited, so the commands land in the right repository.
pub struct GitCli;

impl GitCli {
    pub fn new() -> Self {
        Self
    }

    fn run(&self, args: &[&str]) -> HelperResult<Output> {
        debug!("git {}", args.join(" "));
        Command::new("git")
            .args(args)
            .output()
            .map_err(|e| HelperError::Git(format!("failed to run git: {}", e)))
    }

    fn run_checked(&self, args: &[&str]) -> HelperResult<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            return Err(HelperError::Git(format!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output)
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCollaborator for GitCli {
    fn local_tip(&self, reference: &str) -> HelperResult<Option<Pointer>> {
        let output = self.run(&["rev-parse", "--verify", "--quiet", reference])?;
        if !output.status.success() {
            return Ok(None);
        }
        let hex = String::from_utf8_lossy(&output.stdout);
        Ok(Some(Pointer::from_hex(&hex)?))
    }

    fn has_commit(&self, pointer: &Pointer) -> HelperResult<bool> {
        let spec = format!("{}^{{commit}}", pointer);
        let output = self.run(&["cat-file", "-e", &spec])?;
        Ok(output.status.success())
    }

    fn is_ancestor(&self, ancestor: &Pointer, reference: &str) -> HelperResult<bool> {
        let hex = ancestor.to_hex();
        let output = self.run(&["merge-base", "--is-ancestor", &hex, reference])?;
        Ok(output.status.success())
    }

    fn apply_bundle(&self, bundle: &[u8]) -> HelperResult<()> {
        let file = tempfile::NamedTempFile::new()?;
        std::fs::write(file.path(), bundle)?;
        let path = file.path().to_string_lossy().to_string();
        self.run_checked(&["bundle", "unbundle", &path])?;
        Ok(())
    }

    fn bundle_since(
        &self,
        base: Option<&Pointer>,
        reference: &str,
    ) -> HelperResult<(Vec<u8>, Pointer)> {
        let file = tempfile::NamedTempFile::new()?;
        let path = file.path().to_string_lossy().to_string();
        match base {
            Some(base) => {
                let range = format!("{}..{}", base, reference);
                self.run_checked(&["bundle", "create", &path, &range])?;
            }
            None => {
                self.run_checked(&["bundle", "create", &path, "--all", reference])?;
            }
        }
        let bundle = std::fs::read(file.path())?;
        let tip = self.local_tip(reference)?.ok_or_else(|| {
            HelperError::Git(format!("{} disappeared while bundling", reference))
        })?;
        Ok((bundle, tip))
    }
}
