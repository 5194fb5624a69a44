use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;

use super::types::*;
use super::StoreError;

struct ItemEntry {
    context: ContextRecord,
    state: ItemState,
    history: ItemHistory,
}

/// Process-wide keyed store of item contexts.
///
/// The map lock is held only to find or insert an entry; each item has its
/// own mutex so two items never contend.
#[derive(Default)]
pub struct ContextStore {
    items: RwLock<HashMap<String, Arc<Mutex<ItemEntry>>>>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new item. Ids are never reused.
    pub fn create(&self, item_id: &str, initial_data: ContextData) -> Result<String, StoreError> {
        let mut items = self.items.write().map_err(|_| StoreError::LockPoisoned)?;
        if items.contains_key(item_id) {
            return Err(StoreError::AlreadyExists(item_id.to_string()));
        }

        let now = Utc::now();
        let entry = ItemEntry {
            context: ContextRecord {
                item_id: item_id.to_string(),
                data: initial_data,
                created_at: now,
                updated_at: now,
            },
            state: ItemState {
                stage: STAGE_CREATED.to_string(),
                status: "initiated".to_string(),
                current_stage: STAGE_CREATED.to_string(),
                updated_at: now,
            },
            history: ItemHistory::default(),
        };
        items.insert(item_id.to_string(), Arc::new(Mutex::new(entry)));

        tracing::debug!(item_id, "Context created");
        Ok(item_id.to_string())
    }

    fn entry(&self, item_id: &str) -> Result<Option<Arc<Mutex<ItemEntry>>>, StoreError> {
        let items = self.items.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(items.get(item_id).cloned())
    }

    /// Run `f` against the item's entry. `None` for an unknown id.
    fn with_entry<T>(
        &self,
        item_id: &str,
        f: impl FnOnce(&mut ItemEntry) -> T,
    ) -> Result<Option<T>, StoreError> {
        let Some(entry) = self.entry(item_id)? else {
            return Ok(None);
        };
        let mut guard = entry.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(Some(f(&mut guard)))
    }

    /// Update the pipeline stage, status line and owning stage.
    pub fn set_state(
        &self,
        item_id: &str,
        stage: &str,
        status: &str,
        current_stage: &str,
    ) -> Result<bool, StoreError> {
        let updated = self.with_entry(item_id, |entry| {
            entry.state = ItemState {
                stage: stage.to_string(),
                status: status.to_string(),
                current_stage: current_stage.to_string(),
                updated_at: Utc::now(),
            };
        })?;
        if updated.is_none() {
            tracing::warn!(item_id, stage, "set_state on unknown item ignored");
        }
        Ok(updated.is_some())
    }

    /// Merge `context_delta` into the item's payload (last write wins per key)
    /// and append a handoff record.
    pub fn handoff(
        &self,
        item_id: &str,
        from_stage: &str,
        to_stage: &str,
        context_delta: ContextData,
    ) -> Result<HandoffOutcome, StoreError> {
        let outcome = self.with_entry(item_id, |entry| {
            let now = Utc::now();
            for (key, value) in &context_delta {
                entry.context.data.insert(key.clone(), value.clone());
            }
            entry.context.updated_at = now;
            entry.state.current_stage = to_stage.to_string();
            entry.state.updated_at = now;
            entry.history.handoffs.push(HandoffRecord {
                timestamp: now,
                from_stage: from_stage.to_string(),
                to_stage: to_stage.to_string(),
                context_delta,
            });

            HandoffOutcome {
                context: entry.context.clone(),
                state: entry.state.clone(),
                history: entry.history.clone(),
            }
        })?;

        let outcome = outcome.ok_or_else(|| StoreError::NotFound(item_id.to_string()))?;
        tracing::debug!(
            item_id,
            from_stage,
            to_stage,
            handoffs = outcome.history.handoffs.len(),
            "Context handed off"
        );
        Ok(outcome)
    }

    /// Append a stage verdict. `false` for an unknown id.
    pub fn add_decision(
        &self,
        item_id: &str,
        stage: &str,
        decision: &str,
        rationale: &str,
    ) -> Result<bool, StoreError> {
        let added = self.with_entry(item_id, |entry| {
            entry.history.decisions.push(Decision {
                timestamp: Utc::now(),
                stage: stage.to_string(),
                decision: decision.to_string(),
                rationale: rationale.to_string(),
            });
        })?;
        if added.is_none() {
            tracing::warn!(item_id, stage, "Decision for unknown item dropped");
        }
        Ok(added.is_some())
    }

    /// Append a flag. `false` for an unknown id.
    pub fn add_flag(
        &self,
        item_id: &str,
        kind: &str,
        description: &str,
        severity: Severity,
    ) -> Result<bool, StoreError> {
        let added = self.with_entry(item_id, |entry| {
            entry.history.flags.push(Flag {
                timestamp: Utc::now(),
                kind: kind.to_string(),
                description: description.to_string(),
                severity,
                resolved: false,
            });
        })?;
        if added.is_none() {
            tracing::warn!(item_id, kind, "Flag for unknown item dropped");
        }
        Ok(added.is_some())
    }

    /// Decision, flag and handoff logs. Empty for an unknown id.
    pub fn get_history(&self, item_id: &str) -> Result<ItemHistory, StoreError> {
        Ok(self
            .with_entry(item_id, |entry| entry.history.clone())?
            .unwrap_or_default())
    }

    pub fn get_state(&self, item_id: &str) -> Result<Option<ItemState>, StoreError> {
        self.with_entry(item_id, |entry| entry.state.clone())
    }

    pub fn get_context(&self, item_id: &str) -> Result<Option<ContextRecord>, StoreError> {
        self.with_entry(item_id, |entry| entry.context.clone())
    }

    /// All item ids, oldest first.
    pub fn item_ids(&self) -> Result<Vec<String>, StoreError> {
        let entries: Vec<(String, Arc<Mutex<ItemEntry>>)> = {
            let items = self.items.read().map_err(|_| StoreError::LockPoisoned)?;
            items.iter().map(|(k, v)| (k.clone(), Arc::clone(v))).collect()
        };

        let mut dated = Vec::with_capacity(entries.len());
        for (id, entry) in entries {
            let created_at = entry
                .lock()
                .map_err(|_| StoreError::LockPoisoned)?
                .context
                .created_at;
            dated.push((created_at, id));
        }
        dated.sort();
        Ok(dated.into_iter().map(|(_, id)| id).collect())
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.items.read().map_err(|_| StoreError::LockPoisoned)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: serde_json::Value) -> ContextData {
        value.as_object().cloned().unwrap()
    }

    fn store_with(id: &str) -> ContextStore {
        let store = ContextStore::new();
        store
            .create(id, data(json!({"applicant_name": "Acme"})))
            .unwrap();
        store
    }

    #[test]
    fn create_initializes_state_and_context() {
        let store = store_with("PA-1");
        let state = store.get_state("PA-1").unwrap().unwrap();
        assert_eq!(state.stage, STAGE_CREATED);
        assert_eq!(state.status, "initiated");

        let context = store.get_context("PA-1").unwrap().unwrap();
        assert_eq!(context.item_id, "PA-1");
        assert_eq!(context.data["applicant_name"], "Acme");
        assert!(store.get_history("PA-1").unwrap().is_empty());
    }

    #[test]
    fn create_twice_is_rejected() {
        let store = store_with("PA-1");
        let err = store.create("PA-1", ContextData::new()).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(id) if id == "PA-1"));
        // Original payload untouched
        assert_eq!(store.get_context("PA-1").unwrap().unwrap().data["applicant_name"], "Acme");
    }

    #[test]
    fn unknown_ids_read_as_empty() {
        let store = ContextStore::new();
        assert!(store.get_state("nope").unwrap().is_none());
        assert!(store.get_context("nope").unwrap().is_none());
        assert!(store.get_history("nope").unwrap().is_empty());
    }

    #[test]
    fn unknown_ids_return_false_for_writes() {
        let store = ContextStore::new();
        assert!(!store.add_decision("nope", "intake", "COMPLETE", "").unwrap());
        assert!(!store.add_flag("nope", "technical", "x", Severity::Medium).unwrap());
        assert!(!store.set_state("nope", "review", "running", "review").unwrap());
    }

    #[test]
    fn handoff_on_unknown_id_is_not_found() {
        let store = ContextStore::new();
        let err = store
            .handoff("nope", "intake", "review", ContextData::new())
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn handoff_merges_last_write_wins() {
        let store = store_with("PA-1");
        store
            .handoff("PA-1", "intake", "review", data(json!({"intake_complete": true, "notes": "a"})))
            .unwrap();
        let outcome = store
            .handoff("PA-1", "review", "compliance", data(json!({"notes": "b"})))
            .unwrap();

        assert_eq!(outcome.context.data["applicant_name"], "Acme");
        assert_eq!(outcome.context.data["intake_complete"], true);
        assert_eq!(outcome.context.data["notes"], "b");
        assert_eq!(outcome.state.current_stage, "compliance");
    }

    #[test]
    fn handoff_records_are_ordered() {
        let store = store_with("PA-1");
        let pairs = [("intake", "review"), ("review", "compliance"), ("compliance", "decision")];
        for (from, to) in pairs {
            store.handoff("PA-1", from, to, ContextData::new()).unwrap();
        }

        let history = store.get_history("PA-1").unwrap();
        assert_eq!(history.handoffs.len(), pairs.len());
        for (record, (from, to)) in history.handoffs.iter().zip(pairs) {
            assert_eq!(record.from_stage, from);
            assert_eq!(record.to_stage, to);
        }
        assert!(history
            .handoffs
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn decisions_and_flags_append() {
        let store = store_with("PA-1");
        assert!(store.add_decision("PA-1", "intake", "COMPLETE", "all present").unwrap());
        assert!(store.add_decision("PA-1", "review", "REVIEWED", "ok").unwrap());
        assert!(store
            .add_flag("PA-1", "technical", "Technical concerns identified", Severity::Medium)
            .unwrap());

        let history = store.get_history("PA-1").unwrap();
        let stages: Vec<_> = history.decisions.iter().map(|d| d.stage.as_str()).collect();
        assert_eq!(stages, vec!["intake", "review"]);
        assert_eq!(history.flags.len(), 1);
        assert!(!history.flags[0].resolved);
    }

    #[test]
    fn set_state_updates_labels() {
        let store = store_with("PA-1");
        assert!(store.set_state("PA-1", STAGE_STOPPED, "INCOMPLETE", "intake").unwrap());
        let state = store.get_state("PA-1").unwrap().unwrap();
        assert_eq!(state.stage, STAGE_STOPPED);
        assert_eq!(state.status, "INCOMPLETE");
        assert_eq!(state.current_stage, "intake");
    }

    fn backdate(store: &ContextStore, id: &str, at: chrono::DateTime<Utc>) {
        let items = store.items.read().unwrap();
        items[id].lock().unwrap().context.created_at = at;
    }

    #[test]
    fn item_ids_in_creation_order() {
        let store = ContextStore::new();
        assert!(store.is_empty().unwrap());
        for id in ["c", "a", "b"] {
            store.create(id, ContextData::new()).unwrap();
        }
        let base = Utc::now();
        backdate(&store, "c", base - chrono::Duration::seconds(3));
        backdate(&store, "a", base - chrono::Duration::seconds(2));
        backdate(&store, "b", base - chrono::Duration::seconds(1));

        assert_eq!(store.len().unwrap(), 3);
        assert_eq!(store.item_ids().unwrap(), vec!["c", "a", "b"]);
    }

    #[test]
    fn item_ids_with_equal_timestamps_sort_by_id() {
        let store = ContextStore::new();
        for id in ["PA-2", "PA-10", "PA-1"] {
            store.create(id, ContextData::new()).unwrap();
        }
        let at = Utc::now();
        for id in ["PA-2", "PA-10", "PA-1"] {
            backdate(&store, id, at);
        }
        assert_eq!(store.item_ids().unwrap(), vec!["PA-1", "PA-10", "PA-2"]);
    }

    #[test]
    fn concurrent_items_do_not_interfere() {
        let store = Arc::new(ContextStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let id = format!("item-{i}");
                    store.create(&id, ContextData::new()).unwrap();
                    for n in 0..10 {
                        store.add_decision(&id, "stage", &n.to_string(), "").unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len().unwrap(), 8);
        for i in 0..8 {
            let history = store.get_history(&format!("item-{i}")).unwrap();
            let order: Vec<_> = history.decisions.iter().map(|d| d.decision.clone()).collect();
            let expected: Vec<_> = (0..10).map(|n| n.to_string()).collect();
            assert_eq!(order, expected);
        }
    }
}
