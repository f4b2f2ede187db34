use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide id counters shared by the accept loop and every relay task.
///
/// Ids start at 1 and are never reused.
#[derive(Debug, Default)]
pub struct Counters {
    match_id: AtomicU64,
    connection_id: AtomicU64,
}

impl Counters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_match_id(&self) -> u64 {
        self.match_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn next_connection_id(&self) -> u64 {
        self.connection_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Last match id handed out, 0 if none.
    #[must_use]
    pub fn match_id(&self) -> u64 {
        self.match_id.load(Ordering::Relaxed)
    }

    /// Last connection id handed out, 0 if none.
    #[must_use]
    pub fn connection_id(&self) -> u64 {
        self.connection_id.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::HashSet, sync::Arc};

    #[test]
    fn ids_start_at_one() {
        let counters = Counters::new();
        assert_eq!(counters.connection_id(), 0);
        assert_eq!(counters.next_connection_id(), 1);
        assert_eq!(counters.next_connection_id(), 2);
        assert_eq!(counters.next_match_id(), 1);
        assert_eq!(counters.connection_id(), 2);
    }

    #[test]
    fn concurrent_increments_are_unique() {
        let counters = Arc::new(Counters::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counters = counters.clone();
                std::thread::spawn(move || {
                    (0..1000)
                        .map(|_| counters.next_match_id())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate match id {id}");
            }
        }

        assert_eq!(seen.len(), 8000);
        assert_eq!(counters.match_id(), 8000);
        assert!((1..=8000).all(|id| seen.contains(&id)));
    }
}
