use crate::model::{
    DatasetRef, Format, ImageData, ListParams, ProfileImage, SaveRequest, VersionInfo,
};

/// Failures reported by the backend collaborators
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Dataset or version is absent
    #[error("{0} not found")]
    NotFound(String),
    /// Dataset exists but has no recorded versions
    #[error("{0} has no history")]
    NoHistory(String),
    /// The request is well-formed but the backend cannot serve it
    #[error("{0}")]
    Invalid(String),
    /// A remote or registry call failed
    #[error("{0}")]
    Upstream(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Version history recorded on this node
#[async_trait::async_trait]
pub trait LogStore: Send + Sync {
    /// History of `reference`, newest first, already windowed by `params`
    async fn log(&self, reference: &DatasetRef, params: &ListParams) -> StoreResult<Vec<VersionInfo>>;
}

/// Version history held by a remote; `""` names the default registry
#[async_trait::async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Full, unpaginated history of `reference` on `remote`
    async fn fetch(&self, reference: &DatasetRef, remote: &str) -> StoreResult<Vec<VersionInfo>>;
}

#[async_trait::async_trait]
pub trait SqlEngine: Send + Sync {
    async fn exec(&self, query: &str, format: Format) -> StoreResult<Vec<u8>>;
}

#[async_trait::async_trait]
pub trait DatasetStore: Send + Sync {
    /// Render a dataset, or the component named by its selector
    async fn get(&self, reference: &DatasetRef, format: Format) -> StoreResult<Vec<u8>>;
    /// Latest version of each matching dataset, windowed by `params`
    async fn list(&self, params: &ListParams) -> StoreResult<Vec<VersionInfo>>;
    async fn save(&self, reference: &DatasetRef, request: SaveRequest) -> StoreResult<VersionInfo>;
}

#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, reference: &DatasetRef, remote: &str) -> StoreResult<VersionInfo>;
    async fn unpublish(&self, reference: &DatasetRef, remote: &str) -> StoreResult<VersionInfo>;
}

#[async_trait::async_trait]
pub trait ProfileStore: Send + Sync {
    async fn image(
        &self,
        kind: ProfileImage,
        peername: Option<&str>,
        id: Option<&str>,
    ) -> StoreResult<ImageData>;
}

/// Everything the request layer needs from the domain instance
pub trait Instance:
    LogStore + RemoteFetcher + SqlEngine + DatasetStore + Publisher + ProfileStore + 'static
{
}

impl<T> Instance for T where
    T: LogStore + RemoteFetcher + SqlEngine + DatasetStore + Publisher + ProfileStore + 'static
{
}
