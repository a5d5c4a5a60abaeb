use std::{cmp::Reverse, collections::BinaryHeap};

use parking_lot::Mutex;

use crate::{DispatchErr, Result};

/// A dense index in `[0, capacity)` identifying one producer's slot.
pub type ClientId = usize;

#[derive(Debug)]
struct RegistryState {
    next: ClientId,
    released: BinaryHeap<Reverse<ClientId>>,
    ready: usize,
}

/// Hands out client ids in arrival order under a single lock.
///
/// Released ids are handed out again before fresh ones, lowest first, so an id is never
/// shared by two live clients.
#[derive(Debug)]
pub struct ClientRegistry {
    capacity: usize,
    track_ready: bool,
    state: Mutex<RegistryState>,
}

impl ClientRegistry {
    /// Creates a new `ClientRegistry` that counts its registrations as ready clients.
    ///
    /// # Arguments
    /// * `capacity` - The amount of ids to hand out, the batch size.
    ///
    /// # Returns
    /// A new `ClientRegistry` instance.
    pub fn new(capacity: usize) -> Self {
        Self::with_tracking(capacity, true)
    }

    /// Creates a new `ClientRegistry` for connectionless producers, which are never counted
    /// as ready.
    pub fn untracked(capacity: usize) -> Self {
        Self::with_tracking(capacity, false)
    }

    fn with_tracking(capacity: usize, track_ready: bool) -> Self {
        Self {
            capacity,
            track_ready,
            state: Mutex::new(RegistryState {
                next: 0,
                released: BinaryHeap::new(),
                ready: 0,
            }),
        }
    }

    /// Assigns the next unused id.
    ///
    /// # Returns
    /// The assigned id or `CapacityExceeded` if `capacity` clients are registered already.
    pub fn register(&self) -> Result<ClientId> {
        let mut state = self.state.lock();

        let id = match state.released.pop() {
            Some(Reverse(id)) => id,
            None if state.next < self.capacity => {
                state.next += 1;
                state.next - 1
            }
            None => {
                return Err(DispatchErr::CapacityExceeded {
                    capacity: self.capacity,
                });
            }
        };

        if self.track_ready {
            state.ready += 1;
        }

        Ok(id)
    }

    /// Returns `id` so a later registration may take it.
    ///
    /// # Returns
    /// `UnknownClient` if `id` is not currently registered.
    pub fn release(&self, id: ClientId) -> Result<()> {
        let mut state = self.state.lock();

        let live = id < state.next && !state.released.iter().any(|&Reverse(r)| r == id);
        if !live {
            return Err(DispatchErr::UnknownClient {
                client: id,
                capacity: self.capacity,
            });
        }

        state.released.push(Reverse(id));
        if self.track_ready {
            state.ready -= 1;
        }

        Ok(())
    }

    /// The amount of currently connected clients.
    pub fn ready(&self) -> usize {
        self.state.lock().ready
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn ids_in_arrival_order() -> Result<()> {
        let registry = ClientRegistry::new(3);

        assert_eq!(registry.register()?, 0);
        assert_eq!(registry.register()?, 1);
        assert_eq!(registry.register()?, 2);
        assert!(matches!(
            registry.register(),
            Err(DispatchErr::CapacityExceeded { capacity: 3 })
        ));
        assert_eq!(registry.ready(), 3);
        Ok(())
    }

    #[test]
    fn released_ids_are_reused_lowest_first() -> Result<()> {
        let registry = ClientRegistry::new(4);
        for _ in 0..4 {
            registry.register()?;
        }

        registry.release(2)?;
        registry.release(0)?;
        assert_eq!(registry.ready(), 2);

        assert_eq!(registry.register()?, 0);
        assert_eq!(registry.register()?, 2);
        assert!(registry.register().is_err());
        Ok(())
    }

    #[test]
    fn releasing_a_free_id_fails() -> Result<()> {
        let registry = ClientRegistry::new(2);
        registry.register()?;

        assert!(matches!(
            registry.release(1),
            Err(DispatchErr::UnknownClient { client: 1, .. })
        ));

        registry.release(0)?;
        assert!(registry.release(0).is_err());
        Ok(())
    }

    #[test]
    fn untracked_registrations_are_not_ready() -> Result<()> {
        let registry = ClientRegistry::untracked(2);

        registry.register()?;
        registry.register()?;
        assert_eq!(registry.ready(), 0);

        registry.release(1)?;
        assert_eq!(registry.register()?, 1);
        Ok(())
    }

    #[test]
    fn concurrent_registrations_are_unique() {
        let registry = Arc::new(ClientRegistry::new(64));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    (0..8)
                        .filter_map(|_| registry.register().ok())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids: Vec<_> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();
        ids.sort_unstable();

        assert_eq!(ids, (0..64).collect::<Vec<_>>());
        assert_eq!(registry.ready(), 64);
    }
}
