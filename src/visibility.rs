//! Read-side scoping for records that can be hidden from default queries.
//!
//! Every default read goes through [`VisibleReads`], which only ever asks the
//! underlying [`RecordSource`] for visible rows. The unfiltered view is a
//! separate, explicitly named operation.

use std::{cmp::Ordering, sync::Arc};

use async_trait::async_trait;
use uuid::Uuid;

/// Which rows a read may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Only rows for which [`Scoped::is_visible`] holds.
    Visible,
    /// Every row, including secret or deactivated ones.
    IncludingHidden,
}

impl Visibility {
    /// SQL predicate to AND into a `WHERE` clause for `T`.
    pub fn sql<T: Scoped>(self) -> &'static str {
        match self {
            Visibility::Visible => T::VISIBLE_SQL,
            Visibility::IncludingHidden => "TRUE",
        }
    }

    pub fn admits<T: Scoped>(self, record: &T) -> bool {
        match self {
            Visibility::Visible => record.is_visible(),
            Visibility::IncludingHidden => true,
        }
    }
}

/// A record type carrying a private/inactive flag.
pub trait Scoped {
    /// Predicate selecting visible rows, in terms of the record's own columns.
    const VISIBLE_SQL: &'static str;

    fn is_visible(&self) -> bool;
}

/// Raw storage for a scoped record type. Implementations must honour the
/// `visibility` argument; they are never handed out to handlers directly.
#[async_trait]
pub trait RecordSource<T>: Send + Sync {
    async fn fetch_by_id(&self, id: Uuid, visibility: Visibility) -> anyhow::Result<Option<T>>;
    async fn fetch_all(&self, visibility: Visibility) -> anyhow::Result<Vec<T>>;
}

type Predicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;
type Comparator<T> = Box<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// One step of an aggregation-style read.
pub enum Stage<T> {
    /// Drop records that are not visible.
    OnlyVisible,
    Match(Predicate<T>),
    Sort(Comparator<T>),
    Limit(usize),
}

impl<T> Stage<T> {
    pub fn matching(f: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Stage::Match(Box::new(f))
    }

    pub fn sorted_by(f: impl Fn(&T, &T) -> Ordering + Send + Sync + 'static) -> Self {
        Stage::Sort(Box::new(f))
    }
}

impl<T> std::fmt::Debug for Stage<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::OnlyVisible => f.write_str("OnlyVisible"),
            Stage::Match(_) => f.write_str("Match"),
            Stage::Sort(_) => f.write_str("Sort"),
            Stage::Limit(n) => write!(f, "Limit({n})"),
        }
    }
}

/// An ordered list of stages evaluated over an in-memory row set.
pub struct Pipeline<T> {
    stages: Vec<Stage<T>>,
}

impl<T> Default for Pipeline<T> {
    fn default() -> Self {
        Self { stages: Vec::new() }
    }
}

impl<T: Scoped> Pipeline<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, stage: Stage<T>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stages(&self) -> &[Stage<T>] {
        &self.stages
    }

    /// Puts the visibility match in front of every other stage.
    fn scoped(mut self) -> Self {
        self.stages.insert(0, Stage::OnlyVisible);
        self
    }

    pub fn run(&self, mut rows: Vec<T>) -> Vec<T> {
        for stage in &self.stages {
            match stage {
                Stage::OnlyVisible => rows.retain(|r| r.is_visible()),
                Stage::Match(pred) => rows.retain(|r| pred(r)),
                Stage::Sort(cmp) => rows.sort_by(|a, b| cmp(a, b)),
                Stage::Limit(n) => rows.truncate(*n),
            }
        }
        rows
    }
}

/// The only read surface handlers get for a scoped record type.
pub struct VisibleReads<T> {
    source: Arc<dyn RecordSource<T>>,
}

impl<T> Clone for VisibleReads<T> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
        }
    }
}

impl<T: Scoped + Send + 'static> VisibleReads<T> {
    pub fn new(source: Arc<dyn RecordSource<T>>) -> Self {
        Self { source }
    }

    pub async fn get_by_id(&self, id: Uuid) -> anyhow::Result<Option<T>> {
        self.source.fetch_by_id(id, Visibility::Visible).await
    }

    pub async fn list(&self) -> anyhow::Result<Vec<T>> {
        self.source.fetch_all(Visibility::Visible).await
    }

    /// Unfiltered listing for administrative callers.
    pub async fn list_including_private(&self) -> anyhow::Result<Vec<T>> {
        self.source.fetch_all(Visibility::IncludingHidden).await
    }

    /// Runs `pipeline` with the visibility match injected as its first stage.
    /// Rows are already fetched filtered; the stage keeps the guarantee for
    /// sources that cannot push the predicate down.
    pub async fn aggregate(&self, pipeline: Pipeline<T>) -> anyhow::Result<Vec<T>> {
        let rows = self.source.fetch_all(Visibility::Visible).await?;
        Ok(pipeline.scoped().run(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemorySource;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: Uuid,
        name: &'static str,
        secret: bool,
        rank: u32,
    }

    impl Scoped for Item {
        const VISIBLE_SQL: &'static str = "NOT secret";

        fn is_visible(&self) -> bool {
            !self.secret
        }
    }

    impl crate::testing::Keyed for Item {
        fn key(&self) -> Uuid {
            self.id
        }
    }

    fn item(name: &'static str, secret: bool, rank: u32) -> Item {
        Item {
            id: Uuid::new_v4(),
            name,
            secret,
            rank,
        }
    }

    fn reads(items: Vec<Item>) -> VisibleReads<Item> {
        VisibleReads::new(Arc::new(MemorySource::new(items)))
    }

    fn names(items: &[Item]) -> Vec<&'static str> {
        items.iter().map(|i| i.name).collect()
    }

    #[tokio::test]
    async fn default_list_hides_secret_records() {
        let reads = reads(vec![item("A", false, 1), item("B", true, 2)]);
        assert_eq!(names(&reads.list().await.unwrap()), vec!["A"]);

        let mut all = names(&reads.list_including_private().await.unwrap());
        all.sort();
        assert_eq!(all, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn get_by_id_does_not_reveal_secret_record() {
        let secret = item("B", true, 2);
        let id = secret.id;
        let reads = reads(vec![secret]);
        assert!(reads.get_by_id(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn aggregate_filters_before_sort_and_limit() {
        let reads = reads(vec![
            item("low", false, 1),
            item("hidden-top", true, 100),
            item("mid", false, 5),
        ]);
        let pipeline = Pipeline::new()
            .stage(Stage::sorted_by(|a: &Item, b: &Item| b.rank.cmp(&a.rank)))
            .stage(Stage::Limit(1));
        let top = reads.aggregate(pipeline).await.unwrap();
        assert_eq!(names(&top), vec!["mid"]);
    }

    /// Hands back every row whatever it is asked for, and remembers what
    /// it was asked for.
    struct UnfilteredSource {
        rows: Vec<Item>,
        asked: std::sync::Mutex<Vec<Visibility>>,
    }

    #[async_trait]
    impl RecordSource<Item> for UnfilteredSource {
        async fn fetch_by_id(&self, id: Uuid, visibility: Visibility) -> anyhow::Result<Option<Item>> {
            self.asked.lock().unwrap().push(visibility);
            Ok(self.rows.iter().find(|i| i.id == id).cloned())
        }

        async fn fetch_all(&self, visibility: Visibility) -> anyhow::Result<Vec<Item>> {
            self.asked.lock().unwrap().push(visibility);
            Ok(self.rows.clone())
        }
    }

    #[tokio::test]
    async fn aggregate_reads_filtered_and_still_applies_stage() {
        let source = Arc::new(UnfilteredSource {
            rows: vec![item("A", false, 1), item("B", true, 2)],
            asked: std::sync::Mutex::new(Vec::new()),
        });
        let reads: VisibleReads<Item> = VisibleReads::new(source.clone());
        let rows = reads.aggregate(Pipeline::new()).await.unwrap();
        assert_eq!(names(&rows), vec!["A"]);
        assert_eq!(*source.asked.lock().unwrap(), vec![Visibility::Visible]);
    }

    #[test]
    fn scoped_pipeline_starts_with_visibility_stage() {
        let pipeline: Pipeline<Item> = Pipeline::new()
            .stage(Stage::matching(|i: &Item| i.rank > 0))
            .scoped();
        assert!(matches!(pipeline.stages()[0], Stage::OnlyVisible));
        assert_eq!(pipeline.stages().len(), 2);
    }

    #[test]
    fn visibility_sql_bypass_is_explicit() {
        assert_eq!(Visibility::Visible.sql::<Item>(), "NOT secret");
        assert_eq!(Visibility::IncludingHidden.sql::<Item>(), "TRUE");
    }
}
