use crate::error::AppError;
use crate::executor::GridExecutor;
use crate::gate::Caller;
use crate::model::{DeleteRequest, ErrorResponse, GridRequest, GridResult, UpdateRequest, WriteCapabilities, WriteResponse};
use crate::registry::{ProcedureRegistration, RedbRegistry};
use crate::{info, warn};
use axum::extract::{FromRequest, FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::Router;
use serde::Deserialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;
use utoipa_swagger_ui::SwaggerUi;

pub const ROLES_HEADER: &str = "x-user-roles";
pub const SESSION_HEADER: &str = "x-session-id";

// Create our own JSON extractor by wrapping `axum::Json`. This makes it easy to override the
// rejection and provide our own which formats errors to match our application.
#[derive(FromRequest, Deserialize)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

impl<T> IntoResponse for AppJson<T>
where
    axum::Json<T>: IntoResponse,
{
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let err = self.normalize();
        (err.status_code(), AppJson(ErrorResponse::from(&err))).into_response()
    }
}

/// Caller identity as forwarded by the authentication layer in front of the service.
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| parts.headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim).filter(|v| !v.is_empty());
        Ok(Caller {
            roles: header(ROLES_HEADER).map(Caller::parse_roles).unwrap_or_default(),
            session_id: header(SESSION_HEADER).map(str::to_string),
        })
    }
}

#[derive(Clone)]
pub struct RequestState {
    pub executor: Arc<GridExecutor>,
    pub registry: Arc<RedbRegistry>,
    pub admin_role: String,
}

impl RequestState {
    fn require_admin(&self, caller: &Caller) -> Result<(), AppError> {
        if caller.roles.contains(&self.admin_role) {
            Ok(())
        } else {
            warn!("Denied registry administration to roles {:?}", caller.roles);
            Err(AppError::unauthorized("registry administration requires the admin role"))
        }
    }
}

#[derive(OpenApi)]
#[openapi(info(title = "gridgate", license(name = "MIT")))]
pub struct ApiDoc;

#[utoipa::path(
    post,
    path = "/grid/read",
    request_body = GridRequest,
    params(
        ("x-user-roles" = Option<String>, Header, description = "Comma separated caller roles"),
        ("x-session-id" = Option<String>, Header, description = "Client session the pagination mode is kept for")
    ),
    responses(
        (status = OK, body = GridResult),
        (status = BAD_REQUEST, body = ErrorResponse),
        (status = UNAUTHORIZED, body = ErrorResponse),
        (status = NOT_FOUND, body = ErrorResponse),
        (status = GATEWAY_TIMEOUT, body = ErrorResponse)
    ),
    tag = "Grid"
)]
#[axum::debug_handler]
pub async fn read_grid(
    State(state): State<RequestState>,
    caller: Caller,
    AppJson(request): AppJson<GridRequest>,
) -> Result<AppJson<GridResult>, AppError> {
    Ok(AppJson(state.executor.read(&caller, request).await?))
}

#[utoipa::path(
    post,
    path = "/grid/update",
    request_body = UpdateRequest,
    params(("x-user-roles" = Option<String>, Header, description = "Comma separated caller roles")),
    responses(
        (status = OK, body = WriteResponse),
        (status = BAD_REQUEST, body = ErrorResponse),
        (status = UNAUTHORIZED, body = ErrorResponse),
        (status = NOT_FOUND, body = ErrorResponse),
        (status = CONFLICT, body = ErrorResponse),
        (status = UNPROCESSABLE_ENTITY, body = ErrorResponse)
    ),
    tag = "Grid"
)]
#[axum::debug_handler]
pub async fn update_row(
    State(state): State<RequestState>,
    caller: Caller,
    AppJson(request): AppJson<UpdateRequest>,
) -> Result<AppJson<WriteResponse>, AppError> {
    Ok(AppJson(state.executor.update(&caller, request).await?))
}

#[utoipa::path(
    post,
    path = "/grid/delete",
    request_body = DeleteRequest,
    params(("x-user-roles" = Option<String>, Header, description = "Comma separated caller roles")),
    responses(
        (status = OK, body = WriteResponse),
        (status = BAD_REQUEST, body = ErrorResponse),
        (status = UNAUTHORIZED, body = ErrorResponse),
        (status = NOT_FOUND, body = ErrorResponse)
    ),
    tag = "Grid"
)]
#[axum::debug_handler]
pub async fn delete_row(
    State(state): State<RequestState>,
    caller: Caller,
    AppJson(request): AppJson<DeleteRequest>,
) -> Result<AppJson<WriteResponse>, AppError> {
    Ok(AppJson(state.executor.delete(&caller, request).await?))
}

#[utoipa::path(
    get,
    path = "/grid/capabilities/{procedure}",
    params(
        ("procedure" = String, Path, description = "Grid read procedure name"),
        ("x-user-roles" = Option<String>, Header, description = "Comma separated caller roles")
    ),
    responses(
        (status = OK, body = WriteCapabilities),
        (status = UNAUTHORIZED, body = ErrorResponse),
        (status = NOT_FOUND, body = ErrorResponse)
    ),
    tag = "Grid"
)]
#[axum::debug_handler]
pub async fn write_capabilities(
    State(state): State<RequestState>,
    caller: Caller,
    Path(procedure): Path<String>,
) -> Result<AppJson<WriteCapabilities>, AppError> {
    Ok(AppJson(state.executor.capabilities(&caller, &procedure)?))
}

#[utoipa::path(
    delete,
    path = "/grid/session",
    params(("x-session-id" = String, Header, description = "Client session to forget")),
    responses((status = OK, body = WriteResponse)),
    tag = "Grid"
)]
#[axum::debug_handler]
pub async fn forget_session(State(state): State<RequestState>, caller: Caller) -> Result<AppJson<WriteResponse>, AppError> {
    let session = caller.session_id.ok_or_else(|| AppError::validation("x-session-id header is required"))?;
    let forgotten = state.executor.paging().forget(&session).map_err(AppError::normalize)?;
    Ok(AppJson(WriteResponse::ok(format!("session {} reset", session), forgotten as u64)))
}

#[utoipa::path(
    post,
    path = "/admin/registry",
    request_body = ProcedureRegistration,
    params(("x-user-roles" = Option<String>, Header, description = "Comma separated caller roles")),
    responses((status = OK, body = WriteResponse), (status = UNAUTHORIZED, body = ErrorResponse)),
    tag = "Admin"
)]
#[axum::debug_handler]
pub async fn upsert_registration(
    State(state): State<RequestState>,
    caller: Caller,
    AppJson(registration): AppJson<ProcedureRegistration>,
) -> Result<AppJson<WriteResponse>, AppError> {
    state.require_admin(&caller)?;
    let registry = state.registry.clone();
    let name = registration.name.clone();
    tokio::task::spawn_blocking(move || registry.upsert(&registration)).await??;
    state.executor.registry().invalidate(&name)?;
    Ok(AppJson(WriteResponse::done(format!("procedure {} registered", name))))
}

#[utoipa::path(
    delete,
    path = "/admin/registry/{procedure}",
    params(
        ("procedure" = String, Path, description = "Procedure name to unregister"),
        ("x-user-roles" = Option<String>, Header, description = "Comma separated caller roles")
    ),
    responses((status = OK, body = WriteResponse), (status = UNAUTHORIZED, body = ErrorResponse), (status = NOT_FOUND, body = ErrorResponse)),
    tag = "Admin"
)]
#[axum::debug_handler]
pub async fn remove_registration(
    State(state): State<RequestState>,
    caller: Caller,
    Path(procedure): Path<String>,
) -> Result<AppJson<WriteResponse>, AppError> {
    state.require_admin(&caller)?;
    let registry = state.registry.clone();
    let name = procedure.clone();
    let removed = tokio::task::spawn_blocking(move || registry.remove(&name)).await??;
    state.executor.registry().invalidate(&procedure)?;
    if !removed {
        return Err(AppError::not_found(format!("procedure {} is not registered", procedure)));
    }
    info!("Unregistered procedure {}", procedure);
    Ok(AppJson(WriteResponse::done(format!("procedure {} removed", procedure))))
}

#[utoipa::path(
    post,
    path = "/admin/registry/invalidate",
    params(("x-user-roles" = Option<String>, Header, description = "Comma separated caller roles")),
    responses((status = OK, body = WriteResponse), (status = UNAUTHORIZED, body = ErrorResponse)),
    tag = "Admin"
)]
#[axum::debug_handler]
pub async fn invalidate_registry(State(state): State<RequestState>, caller: Caller) -> Result<AppJson<WriteResponse>, AppError> {
    state.require_admin(&caller)?;
    state.executor.registry().invalidate_all()?;
    Ok(AppJson(WriteResponse::done("registry cache cleared")))
}

pub fn build_router(state: RequestState, cors: Option<CorsLayer>) -> Router<()> {
    let (router, openapi) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .routes(routes!(read_grid))
        .routes(routes!(update_row))
        .routes(routes!(delete_row))
        .routes(routes!(write_capabilities))
        .routes(routes!(forget_session))
        .routes(routes!(upsert_registration))
        .routes(routes!(remove_registration))
        .routes(routes!(invalidate_registry))
        .split_for_parts();

    let merged = router
        .merge(SwaggerUi::new("/swagger-ui").url("/apidoc/openapi.json", openapi))
        .with_state(state);
    if let Some(cors_layer) = cors {
        merged.layer(cors_layer)
    } else {
        merged
    }
}

pub async fn serve(
    state: RequestState,
    socket_addr: SocketAddr,
    cors: Option<CorsLayer>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), AppError> {
    let router: Router<()> = build_router(state, cors);
    let tcp = TcpListener::bind(socket_addr).await?;
    info!("Serving grid procedures on {}", socket_addr);

    let mut shutdown = shutdown.clone();
    axum::serve(tcp, router)
        .with_graceful_shutdown(async move {
            if shutdown.changed().await.is_ok() {
                info!("Shutting down server...");
            }
        })
        .await?;
    Ok(())
}
