use std::time::Duration;

use crate::api::dispatch::{Command, CommandRegistry, Metadata};
use crate::config::ServerSettings;
use crate::error::ApiError;
use crate::logic::{LogResolver, RequestContext, Resolution};
use crate::model::{ListParams, LogParams, SqlParams, VersionInfo};
use crate::store::{DatasetStore, Instance, LogStore, RemoteFetcher, SqlEngine};

pub const SQL_EXEC: &str = "sql.exec";
pub const DATASET_LIST: &str = "dataset.list";
pub const DATASET_LOG: &str = "dataset.log";

/// Run a query against the instance's SQL engine
pub struct SqlExec;

#[async_trait::async_trait]
impl<S> Command<S> for SqlExec
where
    S: SqlEngine + 'static,
{
    type Params = SqlParams;
    type Output = Vec<u8>;

    fn name(&self) -> &'static str {
        SQL_EXEC
    }

    async fn run(
        &self,
        ctx: &RequestContext,
        instance: &S,
        params: SqlParams,
    ) -> Result<(Vec<u8>, Metadata), ApiError> {
        let format = params.output_format;
        let output = ctx.run(instance.exec(&params.query, format)).await??;
        Ok((output, Metadata::with_content_type(format.content_type())))
    }
}

/// Latest version of every dataset matching the list filters
pub struct ListDatasets;

#[async_trait::async_trait]
impl<S> Command<S> for ListDatasets
where
    S: DatasetStore + 'static,
{
    type Params = ListParams;
    type Output = Vec<VersionInfo>;

    fn name(&self) -> &'static str {
        DATASET_LIST
    }

    async fn run(
        &self,
        ctx: &RequestContext,
        instance: &S,
        params: ListParams,
    ) -> Result<(Vec<VersionInfo>, Metadata), ApiError> {
        let items = ctx.run(instance.list(&params)).await??;
        Ok((items, Metadata::with_page(params.page())))
    }
}

/// Version history with remote fallback
pub struct LogHistory {
    pub default_remote: String,
    pub fetch_timeout: Duration,
}

#[async_trait::async_trait]
impl<S> Command<S> for LogHistory
where
    S: LogStore + RemoteFetcher + 'static,
{
    type Params = LogParams;
    type Output = Resolution;

    fn name(&self) -> &'static str {
        DATASET_LOG
    }

    async fn run(
        &self,
        ctx: &RequestContext,
        instance: &S,
        params: LogParams,
    ) -> Result<(Resolution, Metadata), ApiError> {
        let resolution = LogResolver::new(instance, ctx)
            .with_default_remote(&self.default_remote)
            .with_fetch_timeout(self.fetch_timeout)
            .resolve(&params)
            .await?;
        let page = resolution
            .page
            .clone()
            .with_order_by(params.list.order_by.clone());
        Ok((resolution, Metadata::with_page(page)))
    }
}

/// Registry holding every command the HTTP layer dispatches
pub fn default_registry<I: Instance>(settings: &ServerSettings) -> CommandRegistry<I> {
    CommandRegistry::new()
        .register(SqlExec)
        .register(ListDatasets)
        .register(LogHistory {
            default_remote: settings.default_remote.clone(),
            fetch_timeout: settings.fetch_timeout,
        })
}
