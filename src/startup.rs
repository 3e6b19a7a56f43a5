use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::{handlers, middleware as app_middleware, AppState};

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true);

    // /api/v1/user_roles* — system-scope grants, plus the routes
    // shared with every resource type (get_my_roles/get_members/get_logs
    // disambiguate scope via query parameters, not path).
    let user_roles_routes = Router::new()
        .route(
            "/",
            get(handlers::shared::get_members)
                .post(handlers::system::assign_user_role)
                .delete(handlers::system::delete_user_role),
        )
        .route(
            "/owner",
            post(handlers::system::assign_owner).put(handlers::system::transfer_owner),
        )
        .route("/batch", post(handlers::system::assign_user_roles_batch))
        .route("/me", get(handlers::shared::get_my_roles))
        .route("/logs", get(handlers::shared::get_history));

    // /api/v1/user_roles/resources* — resource-scope grants, condition
    // disambiguated by resource_type in the body/query.
    let resource_grant_routes = Router::new()
        .route(
            "/",
            post(handlers::resource::assign_user_role).delete(handlers::resource::delete_user_role),
        )
        .route(
            "/owner",
            post(handlers::resource::assign_owner).put(handlers::resource::transfer_owner),
        )
        .route("/batch", post(handlers::resource::assign_user_roles_batch));

    // /api/v1/resources* — resource lifecycle operations.
    let resources_routes = Router::new()
        .route("/delete", put(handlers::resource::soft_delete_resource))
        .route("/dashboards", post(handlers::resource::get_dashboard_resource));

    let api_v1 = Router::new()
        .nest("/user_roles/resources", resource_grant_routes)
        .nest("/user_roles", user_roles_routes)
        .nest("/resources", resources_routes)
        .route("/permissions/check", post(handlers::shared::check_permission));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/healthz", get(handlers::healthz))
        .route("/metrics", get(handlers::metrics_handler))
        .nest("/api/v1", api_v1)
        .layer(middleware::from_fn_with_state(state.clone(), app_middleware::enforce))
        .layer(middleware::from_fn(app_middleware::metrics_middleware))
        .layer(middleware::from_fn(app_middleware::request_id_middleware))
        .layer(cors)
        .with_state(state)
}
