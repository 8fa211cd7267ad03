use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::tours::repo_types::Tour;
use crate::visibility::{RecordSource, Visibility};

const TOUR_COLUMNS: &str = "id, name, difficulty, price, ratings_average, secret, \
     start_lat, start_lng, guide_ids, created_at";

#[derive(Clone)]
pub struct PgTourSource {
    db: PgPool,
}

impl PgTourSource {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RecordSource<Tour> for PgTourSource {
    async fn fetch_by_id(&self, id: Uuid, visibility: Visibility) -> anyhow::Result<Option<Tour>> {
        let sql = format!(
            "SELECT {TOUR_COLUMNS} FROM tours WHERE id = $1 AND {}",
            visibility.sql::<Tour>()
        );
        let tour = sqlx::query_as::<_, Tour>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(tour)
    }

    async fn fetch_all(&self, visibility: Visibility) -> anyhow::Result<Vec<Tour>> {
        let sql = format!(
            "SELECT {TOUR_COLUMNS} FROM tours WHERE {} ORDER BY created_at DESC",
            visibility.sql::<Tour>()
        );
        let tours = sqlx::query_as::<_, Tour>(&sql).fetch_all(&self.db).await?;
        Ok(tours)
    }
}
