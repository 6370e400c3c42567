use std::fmt::Display;
use std::future::Future;

use super::{DataKind, Provenance, Served, SourcesUnavailable};

/// What a single source produced for one read.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceOutcome<T> {
    Found(T),
    Empty,
    Failed(String),
}

impl<T> SourceOutcome<T> {
    pub fn from_option<E: Display>(result: Result<Option<T>, E>) -> Self {
        match result {
            Ok(Some(value)) => SourceOutcome::Found(value),
            Ok(None) => SourceOutcome::Empty,
            Err(e) => SourceOutcome::Failed(e.to_string()),
        }
    }

    pub fn from_value<E: Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => SourceOutcome::Found(value),
            Err(e) => SourceOutcome::Failed(e.to_string()),
        }
    }
}

impl<T> SourceOutcome<Vec<T>> {
    pub fn from_items<E: Display>(result: Result<Vec<T>, E>) -> Self {
        match result {
            Ok(items) if items.is_empty() => SourceOutcome::Empty,
            Ok(items) => SourceOutcome::Found(items),
            Err(e) => SourceOutcome::Failed(e.to_string()),
        }
    }
}

/// Serves from `cached` when it has data, otherwise from `live`. `live` is
/// only polled after a cache miss.
pub async fn first_available<T, C, CFut, L, LFut>(
    kind: DataKind,
    cached: C,
    live: L,
) -> Result<Served<T>, SourcesUnavailable>
where
    C: FnOnce() -> CFut,
    CFut: Future<Output = SourceOutcome<T>>,
    L: FnOnce() -> LFut,
    LFut: Future<Output = SourceOutcome<T>>,
{
    let database = match cached().await {
        SourceOutcome::Found(data) => {
            return Ok(Served {
                data,
                source: Provenance::Cache,
            })
        }
        SourceOutcome::Empty => {
            tracing::debug!("No cached {}, querying registry", kind);
            "no cached data".to_string()
        }
        SourceOutcome::Failed(reason) => {
            tracing::warn!("Database read for {} failed, falling back to registry: {}", kind, reason);
            reason
        }
    };

    let npm = match live().await {
        SourceOutcome::Found(data) => {
            return Ok(Served {
                data,
                source: Provenance::Registry,
            })
        }
        SourceOutcome::Empty => "registry returned no data".to_string(),
        SourceOutcome::Failed(reason) => reason,
    };

    tracing::error!("Both sources failed for {}: database: {}; npm: {}", kind, database, npm);
    Err(SourcesUnavailable { kind, database, npm })
}
