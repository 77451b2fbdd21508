use std::hash::{BuildHasher, RandomState};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const STRIPES: usize = 64;

/// Serializes read-modify-write sequences per user.
///
/// Users hash onto a fixed set of stripes, so unrelated users may share a
/// stripe but one user never maps to two. Guards protect no data; a
/// poisoned stripe is still usable.
#[derive(Clone)]
pub(crate) struct WriteLocks {
    hasher: RandomState,
    stripes: Arc<[Mutex<()>]>,
}

pub(crate) struct WriteGuard<'a> {
    _guards: Vec<MutexGuard<'a, ()>>,
}

impl WriteLocks {
    pub(crate) fn new() -> WriteLocks {
        WriteLocks {
            hasher: RandomState::new(),
            stripes: (0..STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    fn stripe(&self, user: &str) -> usize {
        (self.hasher.hash_one(user) % STRIPES as u64) as usize
    }

    fn acquire(&self, index: usize) -> MutexGuard<'_, ()> {
        self.stripes[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Holds `user`'s stripe until the guard drops.
    pub(crate) fn user(&self, user: &str) -> WriteGuard<'_> {
        WriteGuard {
            _guards: vec![self.acquire(self.stripe(user))],
        }
    }

    /// Holds the stripes of both users, taken in index order.
    pub(crate) fn pair(&self, a: &str, b: &str) -> WriteGuard<'_> {
        let (first, second) = {
            let (a, b) = (self.stripe(a), self.stripe(b));
            (a.min(b), a.max(b))
        };
        let mut guards = vec![self.acquire(first)];
        if second != first {
            guards.push(self.acquire(second));
        }
        WriteGuard { _guards: guards }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use super::WriteLocks;

    #[test]
    fn pair_order_does_not_deadlock() {
        let locks = WriteLocks::new();
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = [("ana", "ben"), ("ben", "ana")]
            .into_iter()
            .map(|(a, b)| {
                let locks = locks.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..1000 {
                        let _guard = locks.pair(a, b);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn same_user_pair_takes_one_stripe() {
        let locks = WriteLocks::new();
        let _guard = locks.pair("ana", "ana");
        assert!(locks.stripes[locks.stripe("ana")].try_lock().is_err());
    }
}
