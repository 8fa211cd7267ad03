use serde::{Deserialize, Serialize};

use crate::tours::{geo::Unit, repo_types::Tour};

#[derive(Debug, Deserialize)]
pub struct WithinParams {
    pub distance: f64,
    pub latlng: String,
    pub unit: Unit,
}

#[derive(Debug, Serialize)]
pub struct NearbyTour {
    #[serde(flatten)]
    pub tour: Tour,
    pub distance: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuideStatus {
    pub tour_id: uuid::Uuid,
    pub guiding: bool,
}
