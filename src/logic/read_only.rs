use crate::error::ApiError;

/// Whether a route may change state on the serving node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    Read,
    Mutating,
}

/// Route roots closed in read-only mode. `/sql` is listed because queries
/// run arbitrary work against the instance.
const GATED_ROUTES: &[&str] = &["/sql", "/publish", "/save"];

/// First path segment of a route pattern or request path: `/publish/*reference` -> `/publish`
pub fn route_root(route: &str) -> &str {
    let trimmed = route.strip_prefix('/').unwrap_or(route);
    match trimmed.find('/') {
        Some(end) => &route[..end + (route.len() - trimmed.len())],
        None => route,
    }
}

pub fn classify(route: &str) -> RouteAccess {
    if GATED_ROUTES.contains(&route_root(route)) {
        RouteAccess::Mutating
    } else {
        RouteAccess::Read
    }
}

/// Reject a mutating route when the service runs read-only
pub fn check(read_only: bool, route: &str) -> Result<(), ApiError> {
    if read_only && classify(route) == RouteAccess::Mutating {
        let route = route_root(route).to_string();
        log::warn!("blocked {} in read-only mode", route);
        return Err(ApiError::Forbidden { route });
    }
    Ok(())
}
