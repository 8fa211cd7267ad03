use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{extractors::CurrentUser, repo_types::Role},
    error::{AppError, AppResult},
    extract::AppPath,
    response::Success,
    state::AppState,
    tours::{
        dto::{GuideStatus, NearbyTour, WithinParams},
        geo::{self, GeoPoint},
        repo_types::Tour,
    },
    visibility::{Pipeline, Stage},
};

const TOP_RATED_LIMIT: usize = 5;

pub fn tour_routes() -> Router<AppState> {
    Router::new()
        .route("/tours", get(list_tours))
        .route("/tours/all", get(list_all_tours))
        .route("/tours/top-rated", get(top_rated))
        .route(
            "/tours/tours-within/:distance/center/:latlng/unit/:unit",
            get(tours_within),
        )
        .route("/tours/:id", get(get_tour))
        .route("/tours/:id/guides/me", get(guide_status))
}

#[instrument(skip(state))]
pub async fn list_tours(State(state): State<AppState>) -> AppResult<Json<Success<Vec<Tour>>>> {
    let tours = state.tours.list().await?;
    Ok(Json(Success::list(tours)))
}

#[instrument(skip(state, current))]
pub async fn list_all_tours(
    State(state): State<AppState>,
    current: CurrentUser,
) -> AppResult<Json<Success<Vec<Tour>>>> {
    let user = current.restrict_to(&[Role::Admin, Role::LeadGuide])?;
    let tours = state.tours.list_including_private().await?;
    info!(user_id = %user.id, results = tours.len(), "unfiltered tour listing");
    Ok(Json(Success::list(tours)))
}

#[instrument(skip(state))]
pub async fn get_tour(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<Success<Tour>>> {
    let tour = state
        .tours
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("no tour found with that id".into()))?;
    Ok(Json(Success::data(tour)))
}

#[instrument(skip(state))]
pub async fn top_rated(State(state): State<AppState>) -> AppResult<Json<Success<Vec<Tour>>>> {
    let pipeline = Pipeline::new()
        .stage(Stage::sorted_by(|a: &Tour, b: &Tour| {
            b.ratings_average
                .total_cmp(&a.ratings_average)
                .then(a.price.total_cmp(&b.price))
        }))
        .stage(Stage::Limit(TOP_RATED_LIMIT));
    let tours = state.tours.aggregate(pipeline).await?;
    Ok(Json(Success::list(tours)))
}

#[instrument(skip(state))]
pub async fn tours_within(
    State(state): State<AppState>,
    AppPath(params): AppPath<WithinParams>,
) -> AppResult<Json<Success<Vec<NearbyTour>>>> {
    let center = GeoPoint::parse(&params.latlng)?;
    if !params.distance.is_finite() || params.distance < 0.0 {
        warn!(distance = params.distance, "bad distance");
        return Err(AppError::validation("distance must be a non-negative number"));
    }

    let [near, nearest_first] = geo::within(center, params.distance, params.unit);
    let pipeline = Pipeline::new().stage(near).stage(nearest_first);
    let tours = state
        .tours
        .aggregate(pipeline)
        .await?
        .into_iter()
        .map(|tour| NearbyTour {
            distance: center.distance_to(geo::start_of(&tour), params.unit),
            tour,
        })
        .collect();
    Ok(Json(Success::list(tours)))
}

#[instrument(skip(state, current))]
pub async fn guide_status(
    State(state): State<AppState>,
    current: CurrentUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<Success<GuideStatus>>> {
    current.restrict_to(&[Role::Guide, Role::LeadGuide])?;
    let tour = state
        .tours
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("no tour found with that id".into()))?;
    Ok(Json(Success::data(GuideStatus {
        tour_id: tour.id,
        guiding: current.is_guide_of(&tour.guide_ids),
    })))
}
