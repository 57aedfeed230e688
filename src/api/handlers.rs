use axum::{
    extract::State,
    http::{header, Method, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::api::binding::Bound;
use crate::api::commands::{self, DATASET_LIST, DATASET_LOG, SQL_EXEC};
use crate::api::dispatch::CommandRegistry;
use crate::api::extractors::WriteAccess;
use crate::config::ServerSettings;
use crate::error::ApiError;
use crate::logic::log_resolver::fallback_remote;
use crate::logic::{PageToken, RequestContext, Resolution};
use crate::model::{
    Format, GetParams, ListParams, LogParams, OwnerContext, ProfileImage, ProfileImageParams,
    PublishParams, SaveParams, SqlParams, VersionInfo,
};
use crate::store::Instance;

/// Shared router state: the domain instance plus settings fixed at startup
pub struct AppState<I> {
    pub instance: Arc<I>,
    pub settings: Arc<ServerSettings>,
    pub commands: Arc<CommandRegistry<I>>,
    /// Canceled on server shutdown; every request context derives from it
    pub shutdown: CancellationToken,
}

impl<I> Clone for AppState<I> {
    fn clone(&self) -> Self {
        Self {
            instance: Arc::clone(&self.instance),
            settings: Arc::clone(&self.settings),
            commands: Arc::clone(&self.commands),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<I: Instance> AppState<I> {
    pub fn new(instance: I, settings: ServerSettings) -> Self {
        let commands = commands::default_registry(&settings);
        log::debug!("registered commands: {}", commands.names().join(", "));
        Self {
            instance: Arc::new(instance),
            settings: Arc::new(settings),
            commands: Arc::new(commands),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}

#[derive(Debug, Serialize)]
pub struct Meta {
    pub code: u16,
}

/// Pagination block of a list response, built from a page token
#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: usize,
    pub page_size: usize,
    pub limit: usize,
    pub offset: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_url: Option<String>,
}

impl Pagination {
    /// `returned` is the number of items in this window; a short window has
    /// no successor.
    pub fn new(base: &str, page: &PageToken, returned: usize) -> Self {
        Self {
            page: page.page,
            page_size: page.page_size,
            limit: page.limit,
            offset: page.offset,
            next_url: (returned >= page.limit)
                .then(|| format!("{}?{}", base, page.next().query_string())),
            prev_url: page
                .prev()
                .map(|prev| format!("{}?{}", base, prev.query_string())),
        }
    }
}

/// Body of every JSON success response
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub meta: Meta,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self::with_status(StatusCode::OK, data)
    }

    pub fn with_status(status: StatusCode, data: T) -> Self {
        Self {
            meta: Meta {
                code: status.as_u16(),
            },
            data,
            pagination: None,
        }
    }

    pub fn paginated(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }
}

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub api_version: String,
    pub read_only: bool,
    pub timestamp: String,
}

pub async fn health_check<I: Instance>(State(state): State<AppState<I>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        api_version: state.settings.api_version.clone(),
        read_only: state.settings.read_only,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// GET /history/{username}/{name}[@{path}] - version history, local first
pub async fn history<I: Instance>(
    State(state): State<AppState<I>>,
    ctx: RequestContext,
    Bound(params): Bound<LogParams>,
) -> Result<Json<Envelope<Vec<VersionInfo>>>, ApiError> {
    log::debug!("history params: {:?}", params);
    let base = format!("/history/{}", params.reference.alias());

    let (resolution, metadata) = state
        .commands
        .call::<LogParams, Resolution>(&ctx, &state.instance, DATASET_LOG, params)
        .await?;
    log::debug!(
        "history of {} answered from {:?} history",
        base,
        resolution.source
    );

    let page = metadata.page.unwrap_or(resolution.page);
    let pagination = Pagination::new(&base, &page, resolution.items.len());
    Ok(Json(Envelope::ok(resolution.items).paginated(pagination)))
}

/// GET|POST /sql - run a query, JSON results are enveloped, CSV is sent raw
pub async fn sql<I: Instance>(
    _write: WriteAccess,
    State(state): State<AppState<I>>,
    ctx: RequestContext,
    Bound(params): Bound<SqlParams>,
) -> Result<Response, ApiError> {
    log::debug!("sql params: {:?}", params);
    let format = params.output_format;

    let (output, metadata) = state
        .commands
        .call::<SqlParams, Vec<u8>>(&ctx, &state.instance, SQL_EXEC, params)
        .await?;

    match format {
        Format::Json => Ok(Json(Envelope::ok(parse_json(&output)?)).into_response()),
        _ => Ok(raw_response(
            metadata.content_type.unwrap_or(format.content_type()),
            None,
            output,
        )),
    }
}

/// GET /get/{username}/{name}[@{path}][/{selector}[.{ext}]]
pub async fn get_dataset<I: Instance>(
    State(state): State<AppState<I>>,
    ctx: RequestContext,
    Bound(params): Bound<GetParams>,
) -> Result<Response, ApiError> {
    log::debug!("get params: {:?}", params);
    let GetParams { reference, format } = params;

    let output = ctx.run(state.instance.get(&reference, format)).await??;

    match format {
        Format::Json => Ok(Json(Envelope::ok(parse_json(&output)?)).into_response()),
        Format::Csv => Ok(raw_response(format.content_type(), None, output)),
        Format::Zip => {
            let disposition = format!("attachment; filename=\"{}.zip\"", reference.name);
            Ok(raw_response(format.content_type(), Some(disposition), output))
        }
    }
}

/// GET /list - latest version of each dataset
pub async fn list_datasets<I: Instance>(
    State(state): State<AppState<I>>,
    ctx: RequestContext,
    Bound(params): Bound<ListParams>,
) -> Result<Json<Envelope<Vec<VersionInfo>>>, ApiError> {
    log::debug!("list params: {:?}", params);

    let (items, metadata) = state
        .commands
        .call::<ListParams, Vec<VersionInfo>>(&ctx, &state.instance, DATASET_LIST, params)
        .await?;

    let envelope = match metadata.page {
        Some(page) => {
            let pagination = Pagination::new("/list", &page, items.len());
            Envelope::ok(items).paginated(pagination)
        }
        None => Envelope::ok(items),
    };
    Ok(Json(envelope))
}

/// POST /publish/{username}/{name}
pub async fn publish<I: Instance>(
    _write: WriteAccess,
    State(state): State<AppState<I>>,
    ctx: RequestContext,
    Bound(params): Bound<PublishParams>,
) -> Result<Json<Envelope<VersionInfo>>, ApiError> {
    let remote = fallback_remote(params.remote.as_deref(), &state.settings.default_remote);
    log::info!("publishing {} to {:?}", params.reference, remote);

    let info = ctx
        .run(state.instance.publish(&params.reference, &remote))
        .await??;
    Ok(Json(Envelope::ok(info)))
}

/// DELETE /publish/{username}/{name}
pub async fn unpublish<I: Instance>(
    _write: WriteAccess,
    State(state): State<AppState<I>>,
    ctx: RequestContext,
    Bound(params): Bound<PublishParams>,
) -> Result<Json<Envelope<VersionInfo>>, ApiError> {
    let remote = fallback_remote(params.remote.as_deref(), &state.settings.default_remote);
    log::info!("unpublishing {} from {:?}", params.reference, remote);

    let info = ctx
        .run(state.instance.unpublish(&params.reference, &remote))
        .await??;
    Ok(Json(Envelope::ok(info)))
}

/// POST /save/{username}/{name} - multipart form or JSON body
pub async fn save<I: Instance>(
    _write: WriteAccess,
    State(state): State<AppState<I>>,
    ctx: RequestContext,
    Bound(params): Bound<SaveParams>,
) -> Result<(StatusCode, Json<Envelope<VersionInfo>>), ApiError> {
    let (reference, request) = params.into_request();
    log::info!(
        "saving {} ({} body bytes)",
        reference,
        request.body.as_ref().map_or(0, |body| body.bytes.len())
    );

    let info = ctx.run(state.instance.save(&reference, request)).await??;
    Ok((
        StatusCode::CREATED,
        Json(Envelope::with_status(StatusCode::CREATED, info)),
    ))
}

/// GET /profile/photo
pub async fn profile_photo<I: Instance>(
    State(state): State<AppState<I>>,
    ctx: RequestContext,
    owner: OwnerContext,
    Bound(params): Bound<ProfileImageParams>,
) -> Result<Response, ApiError> {
    profile_image(&state, &ctx, owner, params, ProfileImage::Photo).await
}

/// GET /profile/poster
pub async fn profile_poster<I: Instance>(
    State(state): State<AppState<I>>,
    ctx: RequestContext,
    owner: OwnerContext,
    Bound(params): Bound<ProfileImageParams>,
) -> Result<Response, ApiError> {
    profile_image(&state, &ctx, owner, params, ProfileImage::Poster).await
}

async fn profile_image<I: Instance>(
    state: &AppState<I>,
    ctx: &RequestContext,
    owner: OwnerContext,
    params: ProfileImageParams,
    kind: ProfileImage,
) -> Result<Response, ApiError> {
    // Without a target the caller means their own profile
    let (peername, id) = match (params.peername, params.id) {
        (None, None) => (owner.peername, owner.profile_id),
        target => target,
    };
    if peername.is_none() && id.is_none() {
        return Err(ApiError::BadRequest(
            "either peername or id is required".to_string(),
        ));
    }

    let image = ctx
        .run(
            state
                .instance
                .image(kind, peername.as_deref(), id.as_deref()),
        )
        .await??;
    Ok(([(header::CONTENT_TYPE, image.content_type)], image.bytes).into_response())
}

/// Fallback for paths no route matches
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::UnknownRoute(uri.path().to_string())
}

/// Fallback for methods a known path does not serve
pub async fn method_not_found(method: Method, uri: Uri) -> ApiError {
    ApiError::UnknownRoute(format!("{} {}", method, uri.path()))
}

fn parse_json(bytes: &[u8]) -> Result<Value, ApiError> {
    serde_json::from_slice(bytes)
        .map_err(|err| ApiError::Internal(anyhow::anyhow!("instance returned invalid JSON: {}", err)))
}

fn raw_response(content_type: &str, disposition: Option<String>, bytes: Vec<u8>) -> Response {
    let mut response = ([(header::CONTENT_TYPE, content_type.to_string())], bytes).into_response();
    if let Some(disposition) = disposition.and_then(|d| header::HeaderValue::from_str(&d).ok()) {
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, disposition);
    }
    response
}
