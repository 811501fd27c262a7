//! Ordering engine for lists and todos.
//!
//! Every structural change (append, remove, reorder) ends with a
//! normalization pass that sorts by `order` and renumbers `0..n-1`, so the
//! result is dense and duplicate-free even when the input carried gaps or
//! collisions from an externally loaded snapshot.
//!
//! Favorite grouping is a presentation concern only: [`favorites_first`]
//! never touches stored `order` values.

/// An entity that occupies a slot in an ordered collection.
pub trait Ordered {
    fn id(&self) -> &str;
    fn order(&self) -> u32;
    /// Used by the ordering engine only; callers go through the
    /// collection-level operations below.
    fn set_order(&mut self, order: u32);
    fn is_favorite(&self) -> bool;
}

/// Sorts by `order` (stable) and reassigns `0..n-1`.
pub fn normalize<T: Ordered>(items: &mut [T]) {
    items.sort_by_key(|item| item.order());
    for (index, item) in items.iter_mut().enumerate() {
        item.set_order(index as u32);
    }
}

/// Appends an item at the end of the collection.
pub fn append<T: Ordered>(items: &mut Vec<T>, mut item: T) {
    item.set_order(items.len() as u32);
    items.push(item);
    normalize(items);
}

/// Removes an item by id and closes the gap it leaves.
pub fn remove<T: Ordered>(items: &mut Vec<T>, id: &str) -> Option<T> {
    let position = items.iter().position(|item| item.id() == id)?;
    let removed = items.remove(position);
    normalize(items);
    Some(removed)
}

/// Removes every item matching the predicate, then renumbers.
pub fn remove_where<T: Ordered>(items: &mut Vec<T>, predicate: impl Fn(&T) -> bool) -> usize {
    let before = items.len();
    items.retain(|item| !predicate(item));
    normalize(items);
    before - items.len()
}

/// Moves `moved_id` to `target` (clamped to the collection bounds).
///
/// Items strictly between the old and new slot shift by one toward the
/// vacated slot, then the whole collection is renumbered. Returns `false`
/// if the id is unknown.
pub fn reorder<T: Ordered>(items: &mut Vec<T>, moved_id: &str, target: usize) -> bool {
    let Some(position) = items.iter().position(|item| item.id() == moved_id) else {
        return false;
    };

    let last = items.len().saturating_sub(1);
    let new_order = target.min(last) as u32;
    let mut moved = items.remove(position);
    let old_order = moved.order();

    if new_order > old_order {
        for item in items.iter_mut() {
            let order = item.order();
            if order > old_order && order <= new_order {
                item.set_order(order - 1);
            }
        }
    } else if new_order < old_order {
        for item in items.iter_mut() {
            let order = item.order();
            if order >= new_order && order < old_order {
                item.set_order(order + 1);
            }
        }
    }

    moved.set_order(new_order);
    let insert_at = (new_order as usize).min(items.len());
    items.insert(insert_at, moved);
    normalize(items);
    true
}

/// True if the `order` values are exactly `{0, .., n-1}`.
pub fn is_dense<T: Ordered>(items: &[T]) -> bool {
    let mut orders: Vec<u32> = items.iter().map(|item| item.order()).collect();
    orders.sort_unstable();
    orders.iter().enumerate().all(|(index, &order)| order == index as u32)
}

/// Presentation order: favorites first, then by `order` within each group.
pub fn favorites_first<T: Ordered>(items: &[T]) -> Vec<&T> {
    let mut view: Vec<&T> = items.iter().collect();
    view.sort_by_key(|item| (!item.is_favorite(), item.order()));
    view
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: String,
        order: u32,
        favorite: bool,
    }

    impl Ordered for Item {
        fn id(&self) -> &str {
            &self.id
        }
        fn order(&self) -> u32 {
            self.order
        }
        fn set_order(&mut self, order: u32) {
            self.order = order;
        }
        fn is_favorite(&self) -> bool {
            self.favorite
        }
    }

    fn items(n: u32) -> Vec<Item> {
        (0..n)
            .map(|i| Item {
                id: format!("T{}", i),
                order: i,
                favorite: false,
            })
            .collect()
    }

    fn ids(items: &[Item]) -> Vec<&str> {
        let mut sorted: Vec<&Item> = items.iter().collect();
        sorted.sort_by_key(|i| i.order);
        sorted.iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn test_reorder_up() {
        let mut todos = items(4);
        assert!(reorder(&mut todos, "T3", 1));
        assert_eq!(ids(&todos), vec!["T0", "T3", "T1", "T2"]);
        assert!(is_dense(&todos));
        let orders: Vec<u32> = todos.iter().map(|t| t.order).collect();
        assert_eq!(orders, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_reorder_down() {
        let mut todos = items(4);
        assert!(reorder(&mut todos, "T0", 2));
        assert_eq!(ids(&todos), vec!["T1", "T2", "T0", "T3"]);
        assert!(is_dense(&todos));
    }

    #[test]
    fn test_reorder_to_same_position_is_identity() {
        let mut todos = items(5);
        let before = todos.clone();
        assert!(reorder(&mut todos, "T2", 2));
        assert_eq!(todos, before);
    }

    #[test]
    fn test_reorder_clamps_target() {
        let mut todos = items(3);
        assert!(reorder(&mut todos, "T0", 99));
        assert_eq!(ids(&todos), vec!["T1", "T2", "T0"]);
    }

    #[test]
    fn test_reorder_unknown_id() {
        let mut todos = items(3);
        assert!(!reorder(&mut todos, "nope", 0));
        assert_eq!(todos, items(3));
    }

    #[test]
    fn test_reorder_repairs_corrupted_orders() {
        let mut todos = vec![
            Item { id: "a".into(), order: 5, favorite: false },
            Item { id: "b".into(), order: 5, favorite: false },
            Item { id: "c".into(), order: 9, favorite: false },
        ];
        assert!(reorder(&mut todos, "c", 0));
        assert!(is_dense(&todos));
        assert_eq!(ids(&todos)[0], "c");
    }

    #[test]
    fn test_append_and_remove_stay_dense() {
        let mut todos = items(3);
        append(
            &mut todos,
            Item { id: "new".into(), order: 42, favorite: false },
        );
        assert_eq!(todos.last().unwrap().order, 3);

        let removed = remove(&mut todos, "T1").unwrap();
        assert_eq!(removed.id, "T1");
        assert!(is_dense(&todos));
        assert_eq!(ids(&todos), vec!["T0", "T2", "new"]);
        assert!(remove(&mut todos, "T1").is_none());
    }

    #[test]
    fn test_density_after_mixed_operations() {
        let mut todos = items(6);
        reorder(&mut todos, "T5", 0);
        remove(&mut todos, "T2");
        append(&mut todos, Item { id: "x".into(), order: 0, favorite: false });
        reorder(&mut todos, "T0", 4);
        remove_where(&mut todos, |t| t.id == "T4");
        reorder(&mut todos, "x", 0);
        assert!(is_dense(&todos));
        assert_eq!(todos.len(), 5);
    }

    #[test]
    fn test_favorites_first_leaves_order_alone() {
        let mut todos = items(2);
        todos[1].favorite = true;
        let view = favorites_first(&todos);
        assert_eq!(view[0].id, "T1");
        assert_eq!(view[1].id, "T0");
        assert_eq!(todos[0].order, 0);
        assert_eq!(todos[1].order, 1);
    }
}
