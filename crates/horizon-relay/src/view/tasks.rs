//! Pending item changes of a view.
//!
//! Item sources report changes from arbitrary threads. Between two flushes
//! the changes are collected here, at most one task per item, and the flush
//! drains them in arrival order.

use std::collections::HashMap;

use super::handler::ViewItem;
use super::property::PropertyIdSet;

/// Net effect of the changes to one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Add,
    Remove,
    Update,
}

/// A pending change to one item.
#[derive(Debug, Clone)]
pub struct ItemTask<T> {
    pub kind: TaskKind,
    pub item: T,
    /// Changed properties; only meaningful for updates.
    pub changed: PropertyIdSet,
    /// An addition that follows a removal of the same key; the old item
    /// must be dropped before the new one is added.
    pub replaces: bool,
}

/// A drained batch of tasks.
#[derive(Debug)]
pub struct TaskBatch<T> {
    /// Tasks in the order their items were first reported.
    pub tasks: Vec<ItemTask<T>>,
    /// Union of the changed properties of all surviving updates.
    pub updated_properties: PropertyIdSet,
}

/// Coalescing task queue.
///
/// Later tasks for the same item merge into the earlier one:
///
/// | queued  | incoming | result                      |
/// |---------|----------|-----------------------------|
/// | add     | update   | add, properties unioned     |
/// | update  | update   | update, properties unioned  |
/// | remove  | update   | remove                      |
/// | any     | remove   | remove                      |
/// | remove  | add      | add, replacing the old item |
/// | update  | add      | update                      |
#[derive(Debug)]
pub struct ItemTasks<T: ViewItem> {
    order: Vec<T::Key>,
    tasks: HashMap<T::Key, ItemTask<T>>,
}

impl<T: ViewItem> Default for ItemTasks<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ViewItem> ItemTasks<T> {
    /// An empty queue.
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            tasks: HashMap::new(),
        }
    }

    /// Queue an addition.
    pub fn add_item(&mut self, item: T) {
        self.push(item, TaskKind::Add, PropertyIdSet::new());
    }

    /// Queue a removal.
    pub fn remove_item(&mut self, item: T) {
        self.push(item, TaskKind::Remove, PropertyIdSet::new());
    }

    /// Queue a property change.
    pub fn update_item(&mut self, item: T, changed: PropertyIdSet) {
        self.push(item, TaskKind::Update, changed);
    }

    fn push(&mut self, item: T, kind: TaskKind, changed: PropertyIdSet) {
        let key = item.key();
        let Some(existing) = self.tasks.get_mut(&key) else {
            self.order.push(key.clone());
            self.tasks.insert(
                key,
                ItemTask {
                    kind,
                    item,
                    changed,
                    replaces: false,
                },
            );
            return;
        };

        match (existing.kind, kind) {
            (_, TaskKind::Remove) => {
                existing.kind = TaskKind::Remove;
                existing.changed.clear();
                existing.replaces = false;
            }
            (TaskKind::Remove, TaskKind::Update) => {}
            (TaskKind::Remove, TaskKind::Add) => {
                existing.kind = TaskKind::Add;
                existing.changed.clear();
                existing.replaces = true;
            }
            // An update means the item was already known; a late add
            // must not hide the changed properties.
            (_, TaskKind::Add | TaskKind::Update) => {
                existing.changed.extend(changed);
            }
        }
        existing.item = item;
    }

    /// Number of items with pending tasks.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.order.clear();
        self.tasks.clear();
    }

    /// Drain the queue.
    pub fn take(&mut self) -> TaskBatch<T> {
        let mut tasks = Vec::with_capacity(self.order.len());
        let mut updated_properties = PropertyIdSet::new();
        for key in self.order.drain(..) {
            if let Some(task) = self.tasks.remove(&key) {
                if task.kind == TaskKind::Update {
                    updated_properties.extend(task.changed.iter().copied());
                }
                tasks.push(task);
            }
        }
        self.tasks.clear();

        TaskBatch {
            tasks,
            updated_properties,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::handler::test_support::*;
    use crate::view::property::to_property_set;

    fn kinds(batch: &TaskBatch<EntryPtr>) -> Vec<(u32, TaskKind)> {
        batch.tasks.iter().map(|t| (t.item.id, t.kind)).collect()
    }

    #[test]
    fn test_add_then_update_stays_add() {
        let mut tasks = ItemTasks::new();
        let a = entry(1, "a", 0.0);
        tasks.add_item(a.clone());
        tasks.update_item(a, to_property_set(&[PROP_SIZE]));
        assert_eq!(tasks.len(), 1);

        let batch = tasks.take();
        assert_eq!(kinds(&batch), vec![(1, TaskKind::Add)]);
        assert_eq!(batch.tasks[0].changed, to_property_set(&[PROP_SIZE]));
        assert!(batch.updated_properties.is_empty());
        assert!(tasks.is_empty());
    }

    #[test]
    fn test_updates_union_properties() {
        let mut tasks = ItemTasks::new();
        let a = entry(1, "a", 0.0);
        tasks.update_item(a.clone(), to_property_set(&[PROP_SIZE]));
        tasks.update_item(a, to_property_set(&[PROP_NAME]));

        let batch = tasks.take();
        assert_eq!(kinds(&batch), vec![(1, TaskKind::Update)]);
        assert_eq!(
            batch.updated_properties,
            to_property_set(&[PROP_NAME, PROP_SIZE])
        );
    }

    #[test]
    fn test_remove_wins() {
        let mut tasks = ItemTasks::new();
        let a = entry(1, "a", 0.0);
        let b = entry(2, "b", 0.0);
        tasks.add_item(a.clone());
        tasks.remove_item(a.clone());
        tasks.update_item(b.clone(), to_property_set(&[PROP_SIZE]));
        tasks.remove_item(b.clone());
        tasks.update_item(b, to_property_set(&[PROP_SIZE]));

        let batch = tasks.take();
        assert_eq!(
            kinds(&batch),
            vec![(1, TaskKind::Remove), (2, TaskKind::Remove)]
        );
        assert!(batch.updated_properties.is_empty());
    }

    #[test]
    fn test_remove_then_add_is_add() {
        let mut tasks = ItemTasks::new();
        let a = entry(1, "a", 0.0);
        tasks.remove_item(a.clone());
        tasks.add_item(a);

        let batch = tasks.take();
        assert_eq!(kinds(&batch), vec![(1, TaskKind::Add)]);
        assert!(batch.tasks[0].replaces);
    }

    #[test]
    fn test_update_then_add_stays_update() {
        let mut tasks = ItemTasks::new();
        let a = entry(1, "a", 0.0);
        tasks.update_item(a.clone(), to_property_set(&[PROP_SIZE]));
        tasks.add_item(a);

        let batch = tasks.take();
        assert_eq!(kinds(&batch), vec![(1, TaskKind::Update)]);
        assert!(!batch.tasks[0].replaces);
        assert_eq!(batch.updated_properties, to_property_set(&[PROP_SIZE]));
    }

    #[test]
    fn test_order_of_first_arrival() {
        let mut tasks = ItemTasks::new();
        let a = entry(1, "a", 0.0);
        let b = entry(2, "b", 0.0);
        let c = entry(3, "c", 0.0);
        tasks.add_item(b.clone());
        tasks.add_item(a.clone());
        tasks.add_item(c);
        tasks.update_item(b, PropertyIdSet::new());
        tasks.remove_item(a);

        assert_eq!(
            kinds(&tasks.take()),
            vec![(2, TaskKind::Add), (1, TaskKind::Remove), (3, TaskKind::Add)]
        );
    }
}
