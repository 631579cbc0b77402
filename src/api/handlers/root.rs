//! Home route. There is no landing page to serve; the service only confirms
//! it is reachable.

use axum::response::IntoResponse;

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service banner")
    ),
    tag = "root"
)]
pub async fn root() -> impl IntoResponse {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
}
