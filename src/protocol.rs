//! Remote Helper Protocol
//!
//! Line-oriented dispatcher for the commands git feeds a remote helper over
//! stdin. Commands are parsed into values first and executed second, and the
//! batch state is an explicit [`Mode`] with a pure transition function, so
//! the blank-line rules (terminate a fetch/push batch, ignore otherwise) can
//! be tested without any I/O.
//!
//! Only `refs/heads/master` is served. Success replies follow the helper
//! convention: fetch and push say nothing, errors abort the whole process.

use std::io::{BufRead, Write};
use std::sync::Arc;

use tracing::{debug, info};

use crate::assembler::UpdateAssembler;
use crate::config::HelperConfig;
use crate::error::{HelperError, HelperResult};
use crate::git::GitCollaborator;
use crate::locator::{RemoteUrl, RepoLocator};
use crate::rpc::LedgerRpc;
use crate::signer::Signer;
use crate::types::Pointer;
use crate::walker::HistoryWalker;

/// The single branch a repository slot tracks
pub const TRACKED_REF: &str = "refs/heads/master";

/// Parsed remote-helper command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Capabilities,
    List,
    Fetch { object: String, name: String },
    Push { src: String, dst: String, force: bool },
    Blank,
}

impl Command {
    /// Parse one input line. Unknown verbs are [`HelperError::MalformedCommand`].
    pub fn parse(line: &str) -> HelperResult<Command> {
        let line = line.trim_end();
        if line.is_empty() {
            return Ok(Command::Blank);
        }
        let mut parts = line.split(' ');
        let malformed = || HelperError::MalformedCommand(line.to_string());
        match parts.next() {
            Some("capabilities") => Ok(Command::Capabilities),
            // "list" and "list for-push" are answered identically.
            Some("list") => Ok(Command::List),
            Some("fetch") => {
                let object = parts.next().ok_or_else(malformed)?.to_string();
                let name = parts.next().ok_or_else(malformed)?.to_string();
                Ok(Command::Fetch { object, name })
            }
            Some("push") => {
                let refspec = parts.next().ok_or_else(malformed)?;
                let (force, refspec) = match refspec.strip_prefix('+') {
                    Some(rest) => (true, rest),
                    None => (false, refspec),
                };
                let (src, dst) = refspec.split_once(':').ok_or_else(malformed)?;
                Ok(Command::Push {
                    src: src.to_string(),
                    dst: dst.to_string(),
                    force,
                })
            }
            _ => Err(malformed()),
        }
    }
}

/// Batch state of the command stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Fetching,
    Pushing,
}

impl Mode {
    /// Next mode after handling `command`. Pure; the dispatcher applies it
    /// after every command.
    pub fn transition(self, command: &Command) -> Mode {
        match command {
            Command::Fetch { .. } => Mode::Fetching,
            Command::Push { .. } => Mode::Pushing,
            Command::Blank => Mode::Idle,
            Command::Capabilities | Command::List => self,
        }
    }
}

/// Drives one remote-helper session
pub struct Dispatcher {
    url: RemoteUrl,
    locator: RepoLocator,
    walker: HistoryWalker,
    assembler: UpdateAssembler,
    git: Box<dyn GitCollaborator>,
    mode: Mode,
}

impl Dispatcher {
    pub fn new(
        config: HelperConfig,
        url: RemoteUrl,
        rpc: Arc<dyn LedgerRpc>,
        signer: Arc<dyn Signer>,
        git: Box<dyn GitCollaborator>,
    ) -> Self {
        Self {
            url,
            locator: RepoLocator::new(rpc.clone()),
            walker: HistoryWalker::new(rpc.clone()),
            assembler: UpdateAssembler::new(rpc, signer, config),
            git,
            mode: Mode::Idle,
        }
    }

    /// Read commands until EOF, writing replies to `out`. Any error aborts
    /// the session; git treats a dead helper as a failed remote operation.
    pub async fn run<R: BufRead, W: Write>(&mut self, input: R, mut out: W) -> HelperResult<()> {
        for line in input.lines() {
            let line = line?;
            let command = Command::parse(&line)?;
            self.execute(&command, &mut out).await?;
        }
        Ok(())
    }

    async fn execute(&mut self, command: &Command, out: &mut impl Write) -> HelperResult<()> {
        debug!("command {:?} in mode {:?}", command, self.mode);
        match command {
            Command::Capabilities => {
                writeln!(out, "fetch")?;
                writeln!(out, "push")?;
                writeln!(out)?;
            }
            Command::List => {
                if let Some(pointer) = self.locator.tip(&self.url).await? {
                    if !pointer.is_empty() {
                        writeln!(out, "{} {}", pointer, TRACKED_REF)?;
                        writeln!(out, "@{} HEAD", TRACKED_REF)?;
                    }
                }
                writeln!(out)?;
            }
            Command::Fetch { name, .. } => self.fetch(name).await?,
            Command::Push { src, dst, force } => self.push(src, dst, *force).await?,
            Command::Blank => {
                // A blank line terminates a fetch or push batch and wants a
                // blank reply; outside a batch it is ignored.
                if self.mode != Mode::Idle {
                    writeln!(out)?;
                }
            }
        }
        self.mode = self.mode.transition(command);
        out.flush()?;
        Ok(())
    }

    async fn fetch(&mut self, name: &str) -> HelperResult<()> {
        if name != TRACKED_REF {
            return Err(HelperError::UnsupportedRef(name.to_string()));
        }
        let cell = self.locator.find(&self.url).await?;
        let checkpoint = self
            .git
            .local_tip(TRACKED_REF)?
            .unwrap_or(Pointer::EMPTY);
        let bundles = self.walker.walk(&cell, checkpoint).await?;
        info!("fetching {} bundle(s)", bundles.len());
        for bundle in bundles {
            self.git.apply_bundle(&bundle)?;
        }
        Ok(())
    }

    async fn push(&mut self, src: &str, dst: &str, force: bool) -> HelperResult<()> {
        if src != TRACKED_REF || dst != TRACKED_REF {
            return Err(HelperError::UnsupportedRef(format!("{}:{}", src, dst)));
        }
        if self.git.local_tip(TRACKED_REF)?.is_none() {
            debug!("no local {} to push", TRACKED_REF);
            return Ok(());
        }

        let remote_tip = self
            .locator
            .tip(&self.url)
            .await?
            .filter(|pointer| !pointer.is_empty());

        // The bundle is diffed against the ledger's current tip when that
        // commit exists locally; otherwise it carries the full history.
        let base = match &remote_tip {
            Some(pointer) if self.git.has_commit(pointer)? => Some(*pointer),
            _ => None,
        };

        if !force {
            if let Some(pointer) = &remote_tip {
                let fast_forward =
                    self.git.has_commit(pointer)? && self.git.is_ancestor(pointer, TRACKED_REF)?;
                if !fast_forward {
                    return Err(HelperError::SubmissionRejected(format!(
                        "non-fast-forward: remote tip {} is not an ancestor of local {}",
                        pointer, TRACKED_REF
                    )));
                }
            }
        }

        let (bundle, tip) = self.git.bundle_since(base.as_ref(), TRACKED_REF)?;
        if Some(tip) == remote_tip {
            debug!("remote already at {}", tip);
            return Ok(());
        }
        self.assembler.advance(&self.url, tip, &bundle).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(Command::parse("capabilities").unwrap(), Command::Capabilities);
        assert_eq!(Command::parse("list").unwrap(), Command::List);
        assert_eq!(Command::parse("list for-push").unwrap(), Command::List);
        assert_eq!(Command::parse("").unwrap(), Command::Blank);
        assert_eq!(Command::parse("\n").unwrap(), Command::Blank);
    }

    #[test]
    fn test_parse_fetch_and_push() {
        assert_eq!(
            Command::parse("fetch 1234abcd refs/heads/master").unwrap(),
            Command::Fetch {
                object: "1234abcd".to_string(),
                name: "refs/heads/master".to_string(),
            }
        );
        assert_eq!(
            Command::parse("push refs/heads/master:refs/heads/master").unwrap(),
            Command::Push {
                src: "refs/heads/master".to_string(),
                dst: "refs/heads/master".to_string(),
                force: false,
            }
        );
        assert_eq!(
            Command::parse("push +refs/heads/master:refs/heads/master").unwrap(),
            Command::Push {
                src: "refs/heads/master".to_string(),
                dst: "refs/heads/master".to_string(),
                force: true,
            }
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["connect git-upload-pack", "fetch", "push", "push refs/heads/master"] {
            assert!(
                matches!(Command::parse(bad), Err(HelperError::MalformedCommand(_))),
                "{:?} should be malformed",
                bad
            );
        }
    }

    #[test]
    fn test_mode_transitions() {
        let fetch = Command::Fetch {
            object: String::new(),
            name: String::new(),
        };
        let push = Command::Push {
            src: String::new(),
            dst: String::new(),
            force: false,
        };

        assert_eq!(Mode::Idle.transition(&fetch), Mode::Fetching);
        assert_eq!(Mode::Fetching.transition(&fetch), Mode::Fetching);
        assert_eq!(Mode::Fetching.transition(&Command::Blank), Mode::Idle);
        assert_eq!(Mode::Idle.transition(&push), Mode::Pushing);
        assert_eq!(Mode::Pushing.transition(&Command::Blank), Mode::Idle);
        // Stream-shaped commands leave the batch state alone.
        assert_eq!(Mode::Pushing.transition(&Command::List), Mode::Pushing);
        assert_eq!(Mode::Idle.transition(&Command::Capabilities), Mode::Idle);
    }
}
