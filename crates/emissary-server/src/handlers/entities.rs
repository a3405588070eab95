//! Entity handlers: the HTTP face of the cache worker.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use emissary_bus::DeliveryOptions;
use emissary_cache::{ADD_TO_CACHE, GET_FROM_CACHE, KEY_HEADER, MAX_HEADER, RETRIEVE_FROM_CACHE};
use emissary_core::entity_from_value;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::error::AppError;
use crate::state::AppState;

/// Request header bounding the number of entities returned by `GET /api`.
pub const LIMIT_ENTITIES_HEADER: &str = "limit-entities";

/// POST /api
///
/// Sends the JSON object in the body to the cache worker. Replies `200 OK`
/// once the entity is transformed and stored.
#[instrument(skip_all)]
pub async fn add_entity(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, &'static str), AppError> {
    let value: Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("invalid JSON body: {e}")))?;
    let entity = entity_from_value(value)?;

    state
        .bus()
        .request(
            ADD_TO_CACHE,
            Value::Object(entity),
            DeliveryOptions::new().timeout(state.call_timeout()),
        )
        .await?;

    Ok((StatusCode::OK, "OK"))
}

/// GET /api
///
/// Returns the cached entities, oldest first. `Limit-Entities` bounds the
/// count. Only the cache worker on this node is asked.
#[instrument(skip_all)]
pub async fn list_entities(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let mut options = DeliveryOptions::new()
        .local_only(true)
        .timeout(state.call_timeout());

    if let Some(limit) = headers.get(LIMIT_ENTITIES_HEADER) {
        let limit = limit
            .to_str()
            .map_err(|_| AppError::BadRequest("invalid Limit-Entities header".to_string()))?;
        debug!(limit = %limit, "Limiting entities");
        options = options.header(MAX_HEADER, limit.trim());
    }

    let reply = state
        .bus()
        .request(RETRIEVE_FROM_CACHE, json!({}), options)
        .await?;

    Ok(Json(reply.into_body()))
}

/// GET /api/{key}
#[instrument(skip_all)]
pub async fn get_entity(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Value>, AppError> {
    let key: u64 = key
        .parse()
        .map_err(|_| AppError::BadRequest(format!("invalid entity key '{key}'")))?;

    let reply = state
        .bus()
        .request(
            GET_FROM_CACHE,
            json!({}),
            DeliveryOptions::new()
                .header(KEY_HEADER, key.to_string())
                .timeout(state.call_timeout()),
        )
        .await?;

    Ok(Json(reply.into_body()))
}
