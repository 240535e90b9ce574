use api_types::{
    category::{
        CategoriesReordered, CategoryDelete, CategoryDeleted, CategoryList, CategoryNew,
        CategoryReorder, CategoryScope as ApiScope, CategoryUpdate,
    },
    envelope::Envelope,
};
use axum::{Extension, Json, extract::State};
use axum_extra::extract::WithRejection;
use engine::{Category, CategoryCmd, CategoryRemoval, CategoryScope};

use crate::{ServerError, server::ServerState, user};

fn map_scope(scope: ApiScope) -> CategoryScope {
    match scope {
        ApiScope::Expense => CategoryScope::Expense,
        ApiScope::Income => CategoryScope::Income,
        ApiScope::Both => CategoryScope::Both,
    }
}

fn command(
    name: String,
    scope: ApiScope,
    emoji: Option<String>,
    color: Option<String>,
    active: Option<bool>,
) -> CategoryCmd {
    let mut cmd = CategoryCmd::new(name, map_scope(scope));
    cmd.emoji = emoji;
    cmd.color = color;
    cmd.active = active;
    cmd
}

pub async fn list(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<CategoryList>, ServerError>,
) -> Result<Json<Envelope<Vec<Category>>>, ServerError> {
    let categories = state
        .engine
        .list_categories(&user.username, payload.include_inactive)
        .await?;
    Ok(Json(Envelope::ok(categories)))
}

pub async fn create(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<CategoryNew>, ServerError>,
) -> Result<Json<Envelope<Category>>, ServerError> {
    let cmd = command(
        payload.name,
        payload.scope,
        payload.emoji,
        payload.color,
        payload.active,
    );
    let category = state.engine.create_category(&user.username, cmd).await?;
    Ok(Json(Envelope::ok(category)))
}

pub async fn update(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<CategoryUpdate>, ServerError>,
) -> Result<Json<Envelope<Category>>, ServerError> {
    let cmd = command(
        payload.name,
        payload.scope,
        payload.emoji,
        payload.color,
        payload.active,
    );
    let category = state
        .engine
        .update_category(&user.username, payload.id, cmd)
        .await?;
    Ok(Json(Envelope::ok(category)))
}

pub async fn delete(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<CategoryDelete>, ServerError>,
) -> Result<Json<Envelope<CategoryDeleted>>, ServerError> {
    let removal = state
        .engine
        .delete_category(&user.username, payload.id)
        .await?;
    Ok(Json(Envelope::ok(CategoryDeleted {
        removed: removal == CategoryRemoval::Removed,
        code: removal.code().map(str::to_string),
    })))
}

pub async fn reorder(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<CategoryReorder>, ServerError>,
) -> Result<Json<Envelope<CategoriesReordered>>, ServerError> {
    let orders: Vec<_> = payload
        .orders
        .into_iter()
        .map(|entry| (entry.id, entry.order))
        .collect();
    let updated = state
        .engine
        .reorder_categories(&user.username, &orders)
        .await?;
    Ok(Json(Envelope::ok(CategoriesReordered { updated })))
}
