//! Sincronização de checkouts locais via libgit2.
//!
//! O [`GitOracle`] clona o repositório na primeira execução e faz
//! fast-forward da branch atual nas seguintes. O fingerprint é o id do
//! commit em HEAD. Um checkout inutilizável é apagado e clonado de novo,
//! de modo que o motor nunca precisa raciocinar sobre clones parciais.

use std::path::Path;

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{Oid, Repository};
use tracing::{debug, info, warn};

use super::{Change, FingerprintOracle, SyncOutcome};
use crate::error::FetchError;
use crate::state_machine::Job;

/// Oráculo de fingerprint baseado em git. Sem estado; o trabalho bloqueante
/// roda em `spawn_blocking`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitOracle;

impl FingerprintOracle for GitOracle {
    async fn sync(&self, job: &Job) -> SyncOutcome {
        let url = job.url.clone();
        let dir = job.content_dir.clone();
        match tokio::task::spawn_blocking(move || sync_checkout(&url, &dir)).await {
            Ok(Ok((head, change))) => SyncOutcome::Synced {
                fingerprint: head.map(|oid| oid.to_string()),
                change,
            },
            Ok(Err(e)) => SyncOutcome::Failed(e),
            Err(join) => SyncOutcome::Failed(FetchError::Aborted(join.to_string())),
        }
    }
}

// Falhas ao atualizar um checkout existente.
enum PullError {
    // Rede ou remoto: o checkout local continua válido.
    Network(git2::Error),
    // O checkout local não serve mais e deve ser reclonado.
    Unusable(git2::Error),
}

/// Atualiza (ou cria) o checkout em `dir`, retornando o novo HEAD e se ele mudou.
fn sync_checkout(url: &str, dir: &Path) -> Result<(Option<Oid>, Change), FetchError> {
    let mut previous = None;

    if dir.exists() {
        match Repository::open(dir) {
            Ok(repo) => {
                previous = head_oid(&repo);
                match pull(&repo) {
                    Ok(head) => {
                        let change = if previous == Some(head) {
                            Change::Unchanged
                        } else {
                            Change::Changed
                        };
                        debug!(url, head = %head, ?change, "checkout updated");
                        return Ok((Some(head), change));
                    }
                    Err(PullError::Network(e)) => return Err(FetchError::Fetch(e)),
                    Err(PullError::Unusable(e)) => {
                        warn!(path = %dir.display(), error = %e, "checkout unusable, re-cloning");
                    }
                }
            }
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "checkout cannot be opened, re-cloning");
            }
        }

        std::fs::remove_dir_all(dir).map_err(|source| FetchError::Prepare {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    clone_fresh(url, dir, previous)
}

/// Faz fetch da branch atual em `origin` e avança HEAD por fast-forward.
fn pull(repo: &Repository) -> Result<Oid, PullError> {
    use PullError::Unusable;

    if repo.head_detached().map_err(Unusable)? {
        return Err(Unusable(git2::Error::from_str("HEAD is detached")));
    }
    let head = repo.head().map_err(Unusable)?;
    let refname = head
        .name()
        .ok_or_else(|| Unusable(git2::Error::from_str("HEAD name is not valid UTF-8")))?
        .to_string();
    let branch = head
        .shorthand()
        .ok_or_else(|| Unusable(git2::Error::from_str("branch name is not valid UTF-8")))?
        .to_string();
    let current = head
        .target()
        .ok_or_else(|| Unusable(git2::Error::from_str("HEAD has no target")))?;

    let mut remote = repo.find_remote("origin").map_err(Unusable)?;
    remote
        .fetch(&[branch.as_str()], None, None)
        .map_err(PullError::Network)?;

    let fetch_head = repo.find_reference("FETCH_HEAD").map_err(Unusable)?;
    let incoming = repo
        .reference_to_annotated_commit(&fetch_head)
        .map_err(Unusable)?;
    let (analysis, _) = repo.merge_analysis(&[&incoming]).map_err(Unusable)?;

    if analysis.is_up_to_date() {
        return Ok(current);
    }
    if !analysis.is_fast_forward() {
        return Err(Unusable(git2::Error::from_str(
            "local history diverged from origin",
        )));
    }

    let mut reference = repo.find_reference(&refname).map_err(Unusable)?;
    reference
        .set_target(incoming.id(), "gistcrawl: fast-forward")
        .map_err(Unusable)?;
    repo.set_head(&refname).map_err(Unusable)?;
    repo.checkout_head(Some(CheckoutBuilder::default().force()))
        .map_err(Unusable)?;

    info!(branch = %branch, from = %current, to = %incoming.id(), "fast-forwarded checkout");
    Ok(incoming.id())
}

/// Clona `url` em `dir`. Um clone que falha não deixa diretório parcial.
fn clone_fresh(
    url: &str,
    dir: &Path,
    previous: Option<Oid>,
) -> Result<(Option<Oid>, Change), FetchError> {
    if let Some(parent) = dir.parent() {
        std::fs::create_dir_all(parent).map_err(|source| FetchError::Prepare {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    info!(url, path = %dir.display(), "cloning repository");
    let repo = match RepoBuilder::new().clone(url, dir) {
        Ok(repo) => repo,
        Err(source) => {
            if dir.exists()
                && let Err(e) = std::fs::remove_dir_all(dir)
            {
                warn!(path = %dir.display(), error = %e, "could not remove partial clone");
            }
            return Err(FetchError::Clone {
                url: url.to_string(),
                source,
            });
        }
    };

    let head = head_oid(&repo);
    let change = match (previous, head) {
        (Some(old), Some(new)) if old == new => Change::Unchanged,
        // Repositório vazio: sem commit não há como comparar.
        (_, None) => Change::Unknown,
        _ => Change::Changed,
    };
    Ok((head, change))
}

fn head_oid(repo: &Repository) -> Option<Oid> {
    repo.head().ok().and_then(|head| head.target())
}
