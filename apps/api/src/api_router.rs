use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{handlers, middleware};

pub fn build_router(app_state: AppState) -> Router {
    let socket_routes = Router::new()
        .route("/socket/", get(handlers::socket::socket_handler))
        .route_layer(from_fn_with_state(
            app_state.clone(),
            middleware::identify_socket_client,
        ));

    Router::new()
        .route("/health", get(handlers::health::health_handler))
        .merge(socket_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
