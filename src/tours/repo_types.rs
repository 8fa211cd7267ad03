use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::visibility::Scoped;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "tour_difficulty", rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Difficult,
}

/// Tour record. Only the columns the access rules and read pipelines use.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Tour {
    pub id: Uuid,
    pub name: String,
    pub difficulty: Difficulty,
    pub price: f64,
    pub ratings_average: f64,
    #[serde(skip_serializing)]
    pub secret: bool,
    pub start_lat: f64,
    pub start_lng: f64,
    pub guide_ids: Vec<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Scoped for Tour {
    const VISIBLE_SQL: &'static str = "NOT secret";

    fn is_visible(&self) -> bool {
        !self.secret
    }
}

#[cfg(test)]
impl crate::testing::Keyed for Tour {
    fn key(&self) -> Uuid {
        self.id
    }
}
