//! ID resolver module
//!
//! Resolves build id prefixes to full ids by listing builds on the server,
//! so users can type a short, unambiguous prefix instead of a full UUID.

use anyhow::{Context, Result, anyhow};
use playpub_client::PublisherClient;
use uuid::Uuid;

use crate::types::BuildRef;

/// Resolve a build reference to a full id
///
/// Full ids are returned as-is without a request.
pub async fn resolve_build_id(client: &PublisherClient, reference: &BuildRef) -> Result<Uuid> {
    if let BuildRef::Id(id) = reference {
        return Ok(*id);
    }

    let builds = client
        .list_builds()
        .await
        .context("Failed to fetch builds for ID resolution")?;

    pick(reference, builds.iter().map(|b| b.id))
}

/// The single id among `ids` matching `reference`
fn pick(reference: &BuildRef, ids: impl IntoIterator<Item = Uuid>) -> Result<Uuid> {
    let matches: Vec<Uuid> = ids.into_iter().filter(|id| reference.matches(*id)).collect();

    match matches.as_slice() {
        [] => Err(anyhow!("No build found with ID starting with '{}'", reference)),
        [id] => Ok(*id),
        _ => {
            let ids: Vec<String> = matches.iter().map(Uuid::to_string).collect();
            Err(anyhow!(
                "Ambiguous prefix '{}' matches multiple builds: {}",
                reference,
                ids.join(", ")
            ))
        }
    }
}
