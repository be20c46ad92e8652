//! # In-Memory Process Store
//!
//! Records live in an arena of slots addressed through a `Uuid -> slot` index.
//! Freed slots are recycled through a free list so long-running servers do
//! not grow the arena without bound.

use crate::errors::IngestionError;
use crate::providers::db::storage::ProcessStore;
use crate::types::{
    IngestionProcess, IngestionStats, IngestionStatus, PageRequest, ProcessFilter, SortField,
    SortOrder,
};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Arena {
    slots: Vec<Option<IngestionProcess>>,
    index: HashMap<Uuid, usize>,
    free: Vec<usize>,
}

impl Arena {
    fn get(&self, id: &Uuid) -> Option<&IngestionProcess> {
        self.index
            .get(id)
            .and_then(|&slot| self.slots.get(slot))
            .and_then(Option::as_ref)
    }

    fn live(&self) -> impl Iterator<Item = &IngestionProcess> {
        self.slots.iter().flatten()
    }
}

/// A process store held entirely in memory.
///
/// Cloning shares the same underlying arena.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    arena: Arc<RwLock<Arena>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.arena.read().await.index.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn compare(a: &IngestionProcess, b: &IngestionProcess, field: SortField) -> Ordering {
    match field {
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        SortField::StartedAt => a.started_at.cmp(&b.started_at),
        SortField::CompletedAt => a.completed_at.cmp(&b.completed_at),
        SortField::Status => a.status.as_str().cmp(b.status.as_str()),
        SortField::Kind => a.kind.as_str().cmp(b.kind.as_str()),
        SortField::TotalItems => a.total_items.cmp(&b.total_items),
    }
}

#[async_trait]
impl ProcessStore for MemoryStore {
    fn name(&self) -> &str {
        "Memory"
    }

    async fn insert(&self, process: &IngestionProcess) -> Result<(), IngestionError> {
        let mut arena = self.arena.write().await;
        if arena.index.contains_key(&process.id) {
            return Err(IngestionError::Storage(format!(
                "duplicate process id {}",
                process.id
            )));
        }
        let slot = match arena.free.pop() {
            Some(slot) => {
                arena.slots[slot] = Some(process.clone());
                slot
            }
            None => {
                arena.slots.push(Some(process.clone()));
                arena.slots.len() - 1
            }
        };
        arena.index.insert(process.id, slot);
        debug!(id = %process.id, slot, "Inserted process into memory store.");
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<IngestionProcess>, IngestionError> {
        Ok(self.arena.read().await.get(&id).cloned())
    }

    async fn save(&self, process: &IngestionProcess) -> Result<(), IngestionError> {
        let mut arena = self.arena.write().await;
        let slot = *arena.index.get(&process.id).ok_or(IngestionError::NotFound)?;
        arena.slots[slot] = Some(process.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, IngestionError> {
        let mut arena = self.arena.write().await;
        match arena.index.remove(&id) {
            Some(slot) => {
                arena.slots[slot] = None;
                arena.free.push(slot);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn query(
        &self,
        owner: Option<&str>,
        filter: &ProcessFilter,
        page: &PageRequest,
    ) -> Result<(Vec<IngestionProcess>, u64), IngestionError> {
        let arena = self.arena.read().await;
        let mut matches: Vec<&IngestionProcess> = arena
            .live()
            .filter(|p| owner.is_none_or(|o| p.initiated_by == o))
            .filter(|p| filter.matches(p))
            .collect();

        matches.sort_by(|a, b| {
            let ord = compare(a, b, page.sort_by);
            let ord = match page.sort_order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            };
            ord.then_with(|| a.id.cmp(&b.id))
        });

        let total = matches.len() as u64;
        let data = matches
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .cloned()
            .collect();
        Ok((data, total))
    }

    async fn stats(&self, owner: Option<&str>) -> Result<IngestionStats, IngestionError> {
        let arena = self.arena.read().await;
        let mut stats = IngestionStats::default();
        let mut duration_sum = 0.0;
        let mut duration_count = 0u64;

        for p in arena
            .live()
            .filter(|p| owner.is_none_or(|o| p.initiated_by == o))
        {
            stats.record_status(p.status, 1);
            *stats.by_type.entry(p.kind).or_insert(0) += 1;

            if p.status == IngestionStatus::Completed {
                if let (Some(started), Some(completed)) = (p.started_at, p.completed_at) {
                    duration_sum += (completed - started).num_milliseconds() as f64 / 1000.0;
                    duration_count += 1;
                }
            }
        }

        if duration_count > 0 {
            stats.average_duration = duration_sum / duration_count as f64;
        }
        Ok(stats)
    }

    async fn ping(&self) -> Result<(), IngestionError> {
        let _ = self.arena.read().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IngestionType, NewIngestion};
    use chrono::{Duration, Utc};

    fn process(owner: &str, kind: IngestionType) -> IngestionProcess {
        IngestionProcess::new(NewIngestion::new(kind), owner)
    }

    #[tokio::test]
    async fn deleted_slots_are_reused() {
        let store = MemoryStore::new();
        let a = process("u1", IngestionType::ApiSync);
        let b = process("u1", IngestionType::ApiSync);
        store.insert(&a).await.unwrap();
        store.insert(&b).await.unwrap();

        assert!(store.delete(a.id).await.unwrap());
        assert!(!store.delete(a.id).await.unwrap());
        assert!(store.get(a.id).await.unwrap().is_none());

        let c = process("u2", IngestionType::BatchImport);
        store.insert(&c).await.unwrap();
        let arena = store.arena.read().await;
        assert_eq!(arena.slots.len(), 2, "freed slot should be recycled");
        assert_eq!(arena.index[&c.id], 0);
    }

    #[tokio::test]
    async fn save_of_missing_record_is_not_found() {
        let store = MemoryStore::new();
        let p = process("u1", IngestionType::ApiSync);
        assert_eq!(store.save(&p).await, Err(IngestionError::NotFound));
    }

    #[tokio::test]
    async fn query_filters_by_owner_and_pages() {
        let store = MemoryStore::new();
        for i in 0..5 {
            let mut p = process("u1", IngestionType::DocumentUpload);
            p.total_items = i;
            store.insert(&p).await.unwrap();
        }
        store
            .insert(&process("u2", IngestionType::DocumentUpload))
            .await
            .unwrap();

        let page = PageRequest::new(2, 2).sorted(SortField::TotalItems, SortOrder::Asc);
        let (data, total) = store
            .query(Some("u1"), &ProcessFilter::default(), &page)
            .await
            .unwrap();
        assert_eq!(total, 5);
        assert_eq!(
            data.iter().map(|p| p.total_items).collect::<Vec<_>>(),
            vec![2, 3]
        );

        let (_, all) = store
            .query(None, &ProcessFilter::default(), &PageRequest::default())
            .await
            .unwrap();
        assert_eq!(all, 6);
    }

    #[tokio::test]
    async fn stats_average_only_completed_with_both_timestamps() {
        let store = MemoryStore::new();
        let now = Utc::now();

        let mut done = process("u1", IngestionType::ApiSync);
        done.status = IngestionStatus::Completed;
        done.started_at = Some(now - Duration::seconds(4));
        done.completed_at = Some(now);
        store.insert(&done).await.unwrap();

        let mut failed = process("u1", IngestionType::BatchImport);
        failed.status = IngestionStatus::Failed;
        failed.started_at = Some(now - Duration::seconds(100));
        failed.completed_at = Some(now);
        store.insert(&failed).await.unwrap();

        store
            .insert(&process("u2", IngestionType::ApiSync))
            .await
            .unwrap();

        let mine = store.stats(Some("u1")).await.unwrap();
        assert_eq!(mine.total, 2);
        assert_eq!((mine.completed, mine.failed, mine.pending), (1, 1, 0));
        assert_eq!(mine.by_type[&IngestionType::ApiSync], 1);
        assert!((mine.average_duration - 4.0).abs() < 1e-6);

        let all = store.stats(None).await.unwrap();
        assert_eq!(all.total, 3);
        assert_eq!(all.pending, 1);
    }
}
