use itertools::Itertools;
use std::any::{type_name, Any};
use std::collections::HashMap;

use crate::error::ApiError;
use crate::logic::{PageToken, RequestContext};

/// A value crossing the registry boundary
pub type Erased = Box<dyn Any + Send>;

/// Side information a command reports next to its result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub content_type: Option<&'static str>,
    pub page: Option<PageToken>,
}

impl Metadata {
    pub fn with_content_type(content_type: &'static str) -> Self {
        Self {
            content_type: Some(content_type),
            page: None,
        }
    }

    pub fn with_page(page: PageToken) -> Self {
        Self {
            content_type: None,
            page: Some(page),
        }
    }
}

/// A named operation with statically typed parameters and output
#[async_trait::async_trait]
pub trait Command<S>: Send + Sync + 'static
where
    S: Send + Sync + 'static,
{
    type Params: Send + 'static;
    type Output: Send + 'static;

    fn name(&self) -> &'static str;

    async fn run(
        &self,
        ctx: &RequestContext,
        instance: &S,
        params: Self::Params,
    ) -> Result<(Self::Output, Metadata), ApiError>;
}

#[async_trait::async_trait]
trait ErasedCommand<S>: Send + Sync {
    async fn call(
        &self,
        ctx: &RequestContext,
        instance: &S,
        params: Erased,
    ) -> Result<(Erased, Metadata), ApiError>;
}

#[async_trait::async_trait]
impl<S, C> ErasedCommand<S> for C
where
    S: Send + Sync + 'static,
    C: Command<S>,
{
    async fn call(
        &self,
        ctx: &RequestContext,
        instance: &S,
        params: Erased,
    ) -> Result<(Erased, Metadata), ApiError> {
        let params = params
            .downcast::<C::Params>()
            .map_err(|_| ApiError::DispatchType {
                command: self.name().to_string(),
                expected: type_name::<C::Params>(),
            })?;
        let (output, metadata) = self.run(ctx, instance, *params).await?;
        Ok((Box::new(output), metadata))
    }
}

/// Commands by name. Types are only erased inside the registry; callers go
/// through [`CommandRegistry::call`] with concrete types.
pub struct CommandRegistry<S> {
    commands: HashMap<&'static str, Box<dyn ErasedCommand<S>>>,
}

impl<S> Default for CommandRegistry<S> {
    fn default() -> Self {
        Self {
            commands: HashMap::new(),
        }
    }
}

impl<S: Send + Sync + 'static> CommandRegistry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a command; a later registration under the same name replaces it
    pub fn register<C: Command<S>>(mut self, command: C) -> Self {
        let name = command.name();
        if self.commands.insert(name, Box::new(command)).is_some() {
            log::warn!("command {} registered twice, keeping the last one", name);
        }
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.commands.keys().copied().sorted().collect()
    }

    /// Run a command on type-erased parameters
    pub async fn dispatch(
        &self,
        ctx: &RequestContext,
        instance: &S,
        name: &str,
        params: Erased,
    ) -> Result<(Erased, Metadata), ApiError> {
        let command = self
            .commands
            .get(name)
            .ok_or_else(|| ApiError::UnknownCommand(name.to_string()))?;
        log::debug!("dispatching {}", name);
        command.call(ctx, instance, params).await
    }

    /// Run a command and recover its concrete output type
    pub async fn call<P, R>(
        &self,
        ctx: &RequestContext,
        instance: &S,
        name: &str,
        params: P,
    ) -> Result<(R, Metadata), ApiError>
    where
        P: Send + 'static,
        R: 'static,
    {
        let (output, metadata) = self.dispatch(ctx, instance, name, Box::new(params)).await?;
        let output = output.downcast::<R>().map_err(|_| ApiError::DispatchType {
            command: name.to_string(),
            expected: type_name::<R>(),
        })?;
        Ok((*output, metadata))
    }
}
