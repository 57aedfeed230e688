use serde::Serialize;
use std::time::Duration;

use crate::error::ApiError;
use crate::logic::context::RequestContext;
use crate::logic::pagination::{self, PageToken};
use crate::model::{LogParams, VersionInfo};
use crate::store::{LogStore, RemoteFetcher, StoreError};

/// Remote name that stands for the default registry
pub const DEFAULT_REGISTRY_REMOTE: &str = "registry";

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Which history answered a log request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HistorySource {
    Local,
    Remote,
}

#[derive(Debug)]
pub struct Resolution {
    pub items: Vec<VersionInfo>,
    pub page: PageToken,
    pub source: HistorySource,
}

/// States of a log lookup
#[derive(Debug)]
pub enum Stage {
    LocalAttempt,
    /// Fall back to `remote`; empty means the default registry
    RemoteFallback { remote: String },
    Resolved(Resolution),
    Failed(ApiError),
}

/// Answers "what is the version history of this dataset", preferring local
/// history and falling back to a remote while keeping pagination coherent.
pub struct LogResolver<'a, S> {
    instance: &'a S,
    ctx: &'a RequestContext,
    default_remote: &'a str,
    fetch_timeout: Duration,
}

impl<'a, S: LogStore + RemoteFetcher> LogResolver<'a, S> {
    pub fn new(instance: &'a S, ctx: &'a RequestContext) -> Self {
        Self {
            instance,
            ctx,
            default_remote: DEFAULT_REGISTRY_REMOTE,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_default_remote(mut self, default_remote: &'a str) -> Self {
        self.default_remote = default_remote;
        self
    }

    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    pub async fn resolve(&self, params: &LogParams) -> Result<Resolution, ApiError> {
        check_source_flags(params)?;

        let mut stage = if params.pull {
            Stage::RemoteFallback {
                remote: fallback_remote(params.remote.as_deref(), self.default_remote),
            }
        } else {
            Stage::LocalAttempt
        };

        loop {
            stage = match stage {
                Stage::LocalAttempt => match self
                    .ctx
                    .run(self.instance.log(&params.reference, &params.list))
                    .await
                {
                    Ok(result) => after_local(result, params, self.default_remote),
                    Err(err) => Stage::Failed(err),
                },
                Stage::RemoteFallback { remote } => self.fetch_remote(params, &remote).await,
                Stage::Resolved(resolution) => return Ok(resolution),
                Stage::Failed(err) => return Err(err),
            };
        }
    }

    async fn fetch_remote(&self, params: &LogParams, remote: &str) -> Stage {
        let reference = params.reference.alias();
        log::info!(
            "fetching history of {} from {}",
            reference,
            if remote.is_empty() { "the default registry" } else { remote }
        );

        let fetch = tokio::time::timeout(
            self.fetch_timeout,
            self.instance.fetch(&params.reference, remote),
        );
        let items = match self.ctx.run(fetch).await {
            Err(err) => return Stage::Failed(err),
            Ok(Err(_elapsed)) => {
                log::warn!("fetching history of {} timed out", reference);
                return Stage::Failed(ApiError::Upstream(format!(
                    "fetching history of {} timed out",
                    reference
                )));
            }
            Ok(Ok(Err(err))) => return Stage::Failed(fetch_failure(err, &reference)),
            Ok(Ok(Ok(items))) => items,
        };

        // Remote pagination is never trusted; window the full list here
        let (limit, offset) = pagination::clamp_window(params.list.limit, params.list.offset);
        Stage::Resolved(Resolution {
            items: pagination::reslice(items, limit, offset),
            page: pagination::page(limit, offset),
            source: HistorySource::Remote,
        })
    }
}

/// `local` forces local history, so naming a remote or asking to pull
/// alongside it is contradictory.
pub fn check_source_flags(params: &LogParams) -> Result<(), ApiError> {
    if params.local && (params.remote.is_some() || params.pull) {
        return Err(ApiError::BadRequest(
            "cannot combine \"local\" with \"remote\" or \"pull\"".to_string(),
        ));
    }
    Ok(())
}

/// Remote to fall back to; the default registry is addressed by `""`
pub fn fallback_remote(requested: Option<&str>, default_remote: &str) -> String {
    let remote = requested.map(str::trim).filter(|r| !r.is_empty()).unwrap_or(default_remote);
    if remote == DEFAULT_REGISTRY_REMOTE {
        String::new()
    } else {
        remote.to_string()
    }
}

/// Transition out of `LocalAttempt`
pub fn after_local(
    result: Result<Vec<VersionInfo>, StoreError>,
    params: &LogParams,
    default_remote: &str,
) -> Stage {
    match result {
        Ok(items) => Stage::Resolved(Resolution {
            items,
            page: params.list.page(),
            source: HistorySource::Local,
        }),
        Err(StoreError::NoHistory(_)) => {
            Stage::Failed(ApiError::NoHistory(params.reference.alias()))
        }
        // Absent while local history was demanded. This is really an access
        // problem, but clients depend on the server-error classification.
        Err(StoreError::NotFound(_)) if params.local => {
            Stage::Failed(ApiError::LocalUnavailable(params.reference.alias()))
        }
        Err(StoreError::NotFound(_)) => Stage::RemoteFallback {
            remote: fallback_remote(params.remote.as_deref(), default_remote),
        },
        Err(err) => Stage::Failed(err.into()),
    }
}

fn fetch_failure(err: StoreError, reference: &str) -> ApiError {
    match err {
        StoreError::NotFound(_) => ApiError::NotFound(reference.to_string()),
        StoreError::NoHistory(_) => ApiError::NoHistory(reference.to_string()),
        StoreError::Invalid(message) | StoreError::Upstream(message) => {
            log::warn!("fetching history of {} failed: {}", reference, message);
            ApiError::Upstream(message)
        }
        StoreError::Internal(err) => {
            log::error!("fetching history of {} failed: {:#}", reference, err);
            ApiError::Upstream(format!("could not fetch history of {}", reference))
        }
    }
}
