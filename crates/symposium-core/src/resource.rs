//! Binary shared resources and the ring that connects them.
//!
//! Each [`Resource`] is a one-permit semaphore: holding the permit is
//! holding the resource. Acquisition is bounded by a deadline and races
//! the run's cancellation token, so a waiting agent never outlives either
//! its own die timeout or the run.
//!
//! The resource also records who holds it. That bookkeeping does not
//! provide the exclusion (the permit does); it exists so tests and the
//! coordinator can check that exclusion actually held.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use symposium_types::{AgentId, ResourceId};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Sentinel stored in [`Resource::holder`] when nobody holds the resource.
const NO_HOLDER: usize = usize::MAX;

/// Result of [`Resource::try_acquire`].
#[derive(Debug)]
pub enum Acquisition {
    /// The caller now holds the resource exclusively.
    Acquired(ResourceGuard),
    /// The deadline elapsed before the resource became free.
    TimedOut,
    /// The run was cancelled while waiting.
    Cancelled,
}

/// A binary mutual-exclusion resource shared by two adjacent agents.
#[derive(Debug)]
pub struct Resource {
    /// Position in the ring.
    id: ResourceId,

    /// Single permit representing availability.
    permit: Arc<Semaphore>,

    /// Index of the agent currently holding the resource, or [`NO_HOLDER`].
    holder: AtomicUsize,

    /// Successful acquisitions over the resource's lifetime.
    acquisitions: AtomicU64,

    /// Acquisitions that found another holder still registered.
    overlaps: AtomicU64,
}

impl Resource {
    /// Create an available resource.
    pub fn new(id: ResourceId) -> Self {
        Self {
            id,
            permit: Arc::new(Semaphore::new(1)),
            holder: AtomicUsize::new(NO_HOLDER),
            acquisitions: AtomicU64::new(0),
            overlaps: AtomicU64::new(0),
        }
    }

    /// Return the resource's ring position.
    pub const fn id(&self) -> ResourceId {
        self.id
    }

    /// Wait up to `deadline` for the resource.
    ///
    /// A zero deadline never suspends: the resource is taken if it is free
    /// right now, otherwise the call returns [`Acquisition::TimedOut`].
    /// Cancellation wins over a simultaneously available permit.
    pub async fn try_acquire(
        self: &Arc<Self>,
        holder: AgentId,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Acquisition {
        if cancel.is_cancelled() {
            return Acquisition::Cancelled;
        }

        if deadline.is_zero() {
            return match Arc::clone(&self.permit).try_acquire_owned() {
                Ok(permit) => Acquisition::Acquired(self.grant(holder, permit)),
                Err(_) => Acquisition::TimedOut,
            };
        }

        let wait = tokio::time::timeout(deadline, Arc::clone(&self.permit).acquire_owned());
        tokio::select! {
            biased;
            () = cancel.cancelled() => Acquisition::Cancelled,
            result = wait => match result {
                Ok(Ok(permit)) => Acquisition::Acquired(self.grant(holder, permit)),
                // The semaphore is never closed while the ring is alive.
                Ok(Err(_closed)) => Acquisition::Cancelled,
                Err(_elapsed) => Acquisition::TimedOut,
            },
        }
    }

    /// Agent currently holding the resource, if any.
    pub fn holder(&self) -> Option<AgentId> {
        match self.holder.load(Ordering::Acquire) {
            NO_HOLDER => None,
            index => Some(AgentId::new(index)),
        }
    }

    /// Whether the permit is currently free.
    pub fn is_available(&self) -> bool {
        self.permit.available_permits() == 1
    }

    /// Successful acquisitions so far.
    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::Acquire)
    }

    /// Acquisitions that observed a previous holder still registered.
    ///
    /// Always 0 unless mutual exclusion was broken.
    pub fn overlaps(&self) -> u64 {
        self.overlaps.load(Ordering::Acquire)
    }

    /// Register `holder` and wrap the permit in a guard.
    fn grant(self: &Arc<Self>, holder: AgentId, permit: OwnedSemaphorePermit) -> ResourceGuard {
        let previous = self.holder.swap(holder.index(), Ordering::AcqRel);
        if previous != NO_HOLDER {
            self.overlaps.fetch_add(1, Ordering::AcqRel);
            warn!(
                resource = %self.id,
                holder = %holder,
                previous_holder = previous,
                "resource granted while another holder was registered"
            );
        }
        self.acquisitions.fetch_add(1, Ordering::AcqRel);
        ResourceGuard {
            resource: Arc::clone(self),
            holder,
            _permit: permit,
        }
    }
}

/// Exclusive hold on a [`Resource`].
///
/// Dropping the guard releases the resource and wakes at most one waiter.
#[derive(Debug)]
pub struct ResourceGuard {
    /// The held resource.
    resource: Arc<Resource>,

    /// The agent holding it.
    holder: AgentId,

    /// Returned to the semaphore after `Drop::drop` clears the holder.
    _permit: OwnedSemaphorePermit,
}

impl ResourceGuard {
    /// The held resource's ring position.
    pub fn resource_id(&self) -> ResourceId {
        self.resource.id()
    }

    /// The agent holding the resource.
    pub const fn holder(&self) -> AgentId {
        self.holder
    }

    /// Release the resource now.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        // Clear before the permit field is dropped so the next holder never
        // sees us registered.
        let _ = self.resource.holder.compare_exchange(
            self.holder.index(),
            NO_HOLDER,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

// ---------------------------------------------------------------------------
// Ring
// ---------------------------------------------------------------------------

/// The two resources an agent needs, in acquisition order.
#[derive(Debug, Clone)]
pub struct ResourcePair {
    /// Requested first: the lower-numbered of the two.
    pub first: Arc<Resource>,

    /// Requested second, or `None` when both ends of the agent are the same
    /// resource (a ring of one).
    pub second: Option<Arc<Resource>>,
}

/// N resources arranged in a ring.
///
/// Agent `i` sits between resource `i` (its left) and resource
/// `(i + 1) mod N` (its right), so every resource is shared by exactly two
/// neighbouring agents.
#[derive(Debug, Clone)]
pub struct ResourcePool {
    /// Resources indexed by ring position.
    resources: Vec<Arc<Resource>>,
}

impl ResourcePool {
    /// Build a ring of `size` available resources.
    pub fn ring(size: usize) -> Self {
        Self {
            resources: (0..size)
                .map(|i| Arc::new(Resource::new(ResourceId::new(i))))
                .collect(),
        }
    }

    /// Number of resources in the ring.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the ring is empty.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Look up a resource by ring position.
    pub fn get(&self, id: ResourceId) -> Option<&Arc<Resource>> {
        self.resources.get(id.index())
    }

    /// Iterate over every resource in ring order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Resource>> {
        self.resources.iter()
    }

    /// The agent's `(left, right)` resource ids: `i` and `(i + 1) mod N`.
    ///
    /// Returns `None` if the agent is not in the ring.
    pub fn neighbours(&self, agent: AgentId) -> Option<(ResourceId, ResourceId)> {
        let n = self.resources.len();
        if agent.index() >= n {
            return None;
        }
        let right = agent.index().checked_add(1)?.checked_rem(n)?;
        Some((ResourceId::new(agent.index()), ResourceId::new(right)))
    }

    /// The agent's resources in acquisition order: lower id first.
    ///
    /// Both agents sharing a resource agree on where it falls in that
    /// order, so no cycle of waiters can form. In a ring of one, left and
    /// right are the same resource and the pair collapses to it.
    pub fn ordered_pair_for(&self, agent: AgentId) -> Option<ResourcePair> {
        let (left, right) = self.neighbours(agent)?;
        let (low, high) = if left <= right {
            (left, right)
        } else {
            (right, left)
        };
        let first = Arc::clone(self.get(low)?);
        let second = if low == high {
            None
        } else {
            Some(Arc::clone(self.get(high)?))
        };
        Some(ResourcePair { first, second })
    }

    /// Total overlap violations across the ring.
    pub fn total_overlaps(&self) -> u64 {
        self.resources
            .iter()
            .map(|r| r.overlaps())
            .fold(0, u64::saturating_add)
    }

    /// Whether every resource is free with no registered holder.
    pub fn all_released(&self) -> bool {
        self.resources
            .iter()
            .all(|r| r.is_available() && r.holder().is_none())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn acquired(result: Acquisition) -> ResourceGuard {
        match result {
            Acquisition::Acquired(guard) => guard,
            other => panic!("expected acquisition, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_and_release() {
        let resource = Arc::new(Resource::new(ResourceId::new(0)));
        let cancel = CancellationToken::new();

        let guard = acquired(
            resource
                .try_acquire(AgentId::new(1), Duration::from_millis(10), &cancel)
                .await,
        );
        assert_eq!(guard.holder(), AgentId::new(1));
        assert_eq!(guard.resource_id(), ResourceId::new(0));
        assert_eq!(resource.holder(), Some(AgentId::new(1)));
        assert!(!resource.is_available());

        guard.release();
        assert_eq!(resource.holder(), None);
        assert!(resource.is_available());
        assert_eq!(resource.acquisitions(), 1);
        assert_eq!(resource.overlaps(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_deadline_fails_immediately_when_held() {
        let resource = Arc::new(Resource::new(ResourceId::new(0)));
        let cancel = CancellationToken::new();
        let _guard = acquired(
            resource
                .try_acquire(AgentId::new(0), Duration::ZERO, &cancel)
                .await,
        );

        let start = tokio::time::Instant::now();
        let result = resource
            .try_acquire(AgentId::new(1), Duration::ZERO, &cancel)
            .await;
        assert!(matches!(result, Acquisition::TimedOut));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_deadline() {
        let resource = Arc::new(Resource::new(ResourceId::new(0)));
        let cancel = CancellationToken::new();
        let _guard = acquired(
            resource
                .try_acquire(AgentId::new(0), Duration::from_millis(5), &cancel)
                .await,
        );

        let start = tokio::time::Instant::now();
        let result = resource
            .try_acquire(AgentId::new(1), Duration::from_millis(300), &cancel)
            .await;
        assert!(matches!(result, Acquisition::TimedOut));
        assert_eq!(start.elapsed(), Duration::from_millis(300));
        assert_eq!(resource.holder(), Some(AgentId::new(0)));
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_gets_resource_after_release() {
        let resource = Arc::new(Resource::new(ResourceId::new(2)));
        let cancel = CancellationToken::new();
        let guard = acquired(
            resource
                .try_acquire(AgentId::new(1), Duration::from_millis(5), &cancel)
                .await,
        );

        let waiter = {
            let resource = Arc::clone(&resource);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                resource
                    .try_acquire(AgentId::new(2), Duration::from_millis(1000), &cancel)
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        guard.release();

        let second = acquired(waiter.await.unwrap());
        assert_eq!(resource.holder(), Some(AgentId::new(2)));
        drop(second);
        assert_eq!(resource.acquisitions(), 2);
        assert_eq!(resource.overlaps(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_wakes_waiter() {
        let resource = Arc::new(Resource::new(ResourceId::new(0)));
        let cancel = CancellationToken::new();
        let _guard = acquired(
            resource
                .try_acquire(AgentId::new(0), Duration::from_millis(5), &cancel)
                .await,
        );

        let waiter = {
            let resource = Arc::clone(&resource);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let start = tokio::time::Instant::now();
                let result = resource
                    .try_acquire(AgentId::new(1), Duration::from_secs(60), &cancel)
                    .await;
                (result, start.elapsed())
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        let (result, waited) = waiter.await.unwrap();
        assert!(matches!(result, Acquisition::Cancelled));
        assert!(waited < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn already_cancelled_never_acquires() {
        let resource = Arc::new(Resource::new(ResourceId::new(0)));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = resource
            .try_acquire(AgentId::new(0), Duration::from_millis(5), &cancel)
            .await;
        assert!(matches!(result, Acquisition::Cancelled));
        assert!(resource.is_available());
    }

    #[test]
    fn ring_neighbours_wrap() {
        let pool = ResourcePool::ring(5);
        assert_eq!(pool.len(), 5);
        assert_eq!(
            pool.neighbours(AgentId::new(0)),
            Some((ResourceId::new(0), ResourceId::new(1)))
        );
        assert_eq!(
            pool.neighbours(AgentId::new(4)),
            Some((ResourceId::new(4), ResourceId::new(0)))
        );
        assert_eq!(pool.neighbours(AgentId::new(5)), None);
    }

    #[test]
    fn ordered_pair_puts_lower_id_first() {
        let pool = ResourcePool::ring(5);

        let pair = pool.ordered_pair_for(AgentId::new(2)).unwrap();
        assert_eq!(pair.first.id(), ResourceId::new(2));
        assert_eq!(pair.second.unwrap().id(), ResourceId::new(3));

        // The last agent wraps around: its right (0) is requested first.
        let pair = pool.ordered_pair_for(AgentId::new(4)).unwrap();
        assert_eq!(pair.first.id(), ResourceId::new(0));
        assert_eq!(pair.second.unwrap().id(), ResourceId::new(4));
    }

    #[test]
    fn ring_of_one_collapses_pair() {
        let pool = ResourcePool::ring(1);
        let pair = pool.ordered_pair_for(AgentId::new(0)).unwrap();
        assert_eq!(pair.first.id(), ResourceId::new(0));
        assert!(pair.second.is_none());
    }

    #[test]
    fn ring_of_two_shares_both_resources() {
        let pool = ResourcePool::ring(2);
        let a = pool.ordered_pair_for(AgentId::new(0)).unwrap();
        let b = pool.ordered_pair_for(AgentId::new(1)).unwrap();
        assert_eq!(a.first.id(), b.first.id());
        assert_eq!(a.second.unwrap().id(), b.second.unwrap().id());
    }

    #[test]
    fn fresh_ring_is_released() {
        let pool = ResourcePool::ring(3);
        assert!(pool.all_released());
        assert_eq!(pool.total_overlaps(), 0);
        assert!(!pool.is_empty());
        assert_eq!(pool.iter().count(), 3);
    }
}
