use axum::{extract::State, Json};
use murmur_types::SeedResponse;

use crate::{
    api::ApiResult,
    db::repositories::AccountRepository,
    seed::SeedPipeline,
    state::AppState,
};

/// POST /api/seed - Insert the sample accounts
pub async fn seed_data(State(state): State<AppState>) -> ApiResult<Json<SeedResponse>> {
    let db = state.db.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        SeedPipeline::new(AccountRepository::new(db)).run_samples()
    })
    .await??;

    Ok(Json(SeedResponse::seeded(outcome.into_accounts())))
}
