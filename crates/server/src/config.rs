use api_types::{
    config::{ConfigEntry, ConfigSave},
    envelope::Envelope,
};
use axum::{Extension, Json, extract::State};
use axum_extra::extract::WithRejection;
use engine::ConfigKey;

use crate::{ServerError, server::ServerState, user};

fn entries(raw: Vec<(ConfigKey, String)>) -> Vec<ConfigEntry> {
    raw.into_iter()
        .map(|(key, value)| ConfigEntry {
            key: key.as_str().to_string(),
            value,
        })
        .collect()
}

pub async fn get(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
) -> Result<Json<Envelope<Vec<ConfigEntry>>>, ServerError> {
    let raw = state.engine.config_entries(&user.username).await?;
    Ok(Json(Envelope::ok(entries(raw))))
}

/// Stores the given keys and answers with the full set after the write.
pub async fn save(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<ConfigSave>, ServerError>,
) -> Result<Json<Envelope<Vec<ConfigEntry>>>, ServerError> {
    let parsed = payload
        .entries
        .into_iter()
        .map(|entry| Ok((ConfigKey::try_from(entry.key.as_str())?, entry.value)))
        .collect::<Result<Vec<_>, ServerError>>()?;
    state.engine.save_config(&user.username, parsed).await?;
    let raw = state.engine.config_entries(&user.username).await?;
    Ok(Json(Envelope::ok(entries(raw))))
}

/// Seeds the caller's default categories and accounts. Safe to repeat.
pub async fn bootstrap(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
) -> Result<Json<Envelope<bool>>, ServerError> {
    state.engine.bootstrap_user(&user.username).await?;
    Ok(Json(Envelope::ok(true)))
}
