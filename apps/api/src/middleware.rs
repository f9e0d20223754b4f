use axum::extract::{Query, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use flightline_core::{AppError, ClientIdentity};

use crate::dto::SocketAuthQuery;
use crate::error::ApiResult;
use crate::state::AppState;

/// Resolves the caller identity of a socket upgrade.
///
/// Without a configured access token every caller is anonymous; with one, the
/// `token` query parameter must match it.
pub async fn identify_socket_client(
    State(state): State<AppState>,
    Query(query): Query<SocketAuthQuery>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let identity = resolve_identity(state.socket_access_token.as_deref(), query.token.as_deref())?;

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

fn resolve_identity(
    expected: Option<&str>,
    presented: Option<&str>,
) -> Result<ClientIdentity, AppError> {
    match (expected, presented) {
        (None, _) => Ok(ClientIdentity::anonymous()),
        (Some(expected), Some(presented)) if presented == expected => {
            Ok(ClientIdentity::authenticated("socket-token"))
        }
        (Some(_), Some(_)) => Err(AppError::Unauthorized("invalid socket access token".to_owned())),
        (Some(_), None) => Err(AppError::Unauthorized(
            "socket access token required".to_owned(),
        )),
    }
}
