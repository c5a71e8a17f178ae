use crate::api::error::{wants_json, AppError};
use crate::AppState;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
};
use tokio_util::io::ReaderStream;

#[utoipa::path(
    get,
    path = "/{prefix}/{collection}/{signature}/{action}",
    params(
        ("collection" = String, Path, description = "Collection name"),
        ("signature" = String, Path, description = "Asset signature"),
        ("action" = String, Path, description = "Derivative action, e.g. master or resize")
    ),
    responses(
        (status = 200, description = "Derivative bytes with the cached mimetype"),
        (status = 400, description = "Unknown action or invalid parameters"),
        (status = 404, description = "Unknown collection, signature or derivative"),
        (status = 415, description = "Source type cannot be transformed")
    )
)]
pub async fn serve_media(
    State(state): State<AppState>,
    Path((collection, signature, action)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Response {
    respond(&state, &collection, &signature, &action, "", &headers).await
}

pub async fn serve_media_with_params(
    State(state): State<AppState>,
    Path((collection, signature, action, paramstr)): Path<(String, String, String, String)>,
    headers: HeaderMap,
) -> Response {
    respond(&state, &collection, &signature, &action, &paramstr, &headers).await
}

async fn respond(
    state: &AppState,
    collection: &str,
    signature: &str,
    action: &str,
    paramstr: &str,
    headers: &HeaderMap,
) -> Response {
    let params: Vec<&str> = paramstr.split('/').filter(|p| !p.is_empty()).collect();

    match state
        .pipeline
        .serve(collection, signature, action, &params)
        .await
    {
        Ok(reply) => {
            let stream = ReaderStream::new(reply.body);
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, reply.mimetype)
                .header(header::CONTENT_LENGTH, reply.size)
                .body(Body::from_stream(stream))
                .unwrap_or_else(|e| {
                    AppError::Internal(format!("cannot build response: {e}")).render(true)
                })
        }
        Err(err) => AppError::from(err).render(wants_json(headers)),
    }
}
