//! Seed reconciliation and no-op detection.

use crate::models::List;

/// What to do on the first successful connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedAction {
    KeepEmpty,
    PushLocal,
    AdoptRemote,
}

/// Remote wins whenever it has data; local is pushed only into an empty
/// remote.
pub fn seed_action(local_has_data: bool, remote_has_data: bool) -> SeedAction {
    match (local_has_data, remote_has_data) {
        (false, false) => SeedAction::KeepEmpty,
        (true, false) => SeedAction::PushLocal,
        (_, true) => SeedAction::AdoptRemote,
    }
}

/// Compares the serialized forms of two collections.
pub fn is_same_snapshot(current: &[List], incoming: &[List]) -> bool {
    match (serde_json::to_value(current), serde_json::to_value(incoming)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_table() {
        assert_eq!(seed_action(false, false), SeedAction::KeepEmpty);
        assert_eq!(seed_action(true, false), SeedAction::PushLocal);
        assert_eq!(seed_action(false, true), SeedAction::AdoptRemote);
        assert_eq!(seed_action(true, true), SeedAction::AdoptRemote);
    }

    #[test]
    fn test_same_snapshot() {
        let list = List::new("A", 0).unwrap();
        let copy = list.clone();
        assert!(is_same_snapshot(&[list.clone()], &[copy]));
        assert!(is_same_snapshot(&[], &[]));

        let mut renamed = list.clone();
        renamed.rename("B").unwrap();
        assert!(!is_same_snapshot(&[list], &[renamed]));
    }
}
