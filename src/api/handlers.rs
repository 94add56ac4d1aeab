use axum::{extract::Path, http::StatusCode, response::IntoResponse};

const MAX_ITEM_ID: u32 = 100;

pub async fn index() -> &'static str {
    "prom-logger demo"
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn get_item(Path(id): Path<u32>) -> Result<String, (StatusCode, String)> {
    if id == 0 || id > MAX_ITEM_ID {
        return Err((StatusCode::NOT_FOUND, format!("item {} not found", id)));
    }
    Ok(format!("item {}", id))
}

pub async fn fail() -> impl IntoResponse {
    tracing::warn!("demo failure route hit");
    (StatusCode::INTERNAL_SERVER_ERROR, "simulated failure")
}

pub async fn crash() -> &'static str {
    panic!("simulated handler panic")
}
