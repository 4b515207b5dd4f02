//! # IDs
//! Process-unique typed identifiers, implemented by `LazID<T>`, namespaced by the
//! marker type `T`. Equal numeric values under different markers are unrelated ids.
//!
//! Use the `Default` impl for a single id, or [`LazID::many`] to reserve a batch
//! up front. Only uniqueness is guaranteed, never ordering.

// Next free id per namespace. Read-mostly: a namespace's entry is created on its
// first allocation, every allocation after that is one atomic increment.
static ID_SERVER: parking_lot::RwLock<
    std::collections::BTreeMap<std::any::TypeId, std::sync::atomic::AtomicU64>,
> = parking_lot::const_rwlock(std::collections::BTreeMap::new());

/// Id guaranteed unique within this execution of the program. Never recycled,
/// and meaningless across processes.
pub struct LazID<T: std::any::Any> {
    id: std::num::NonZeroU64,
    // Namespace marker. No T is ever stored.
    _phantom: std::marker::PhantomData<T>,
}
impl<T: std::any::Any> Clone for LazID<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T: std::any::Any> Copy for LazID<T> {}
impl<T: std::any::Any> std::cmp::PartialEq<LazID<T>> for LazID<T> {
    fn eq(&self, other: &LazID<T>) -> bool {
        // Namespaces agree at compile time, only the value is left to check.
        self.id == other.id
    }
}
impl<T: std::any::Any> std::cmp::Eq for LazID<T> {}

// Safety - only the u64 is stored. Without these, a !Send or !Sync marker type
// would leak its bounds into the id through the PhantomData.
unsafe impl<T: std::any::Any> Send for LazID<T> {}
unsafe impl<T: std::any::Any> Sync for LazID<T> {}

impl<T: std::any::Any> std::hash::Hash for LazID<T> {
    /// Hashes include the `TypeId` of the namespace, whose representation is
    /// unstable between compilations. Never persist or compare hashes across
    /// executions.
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::any::TypeId::of::<T>().hash(state);
        self.id.hash(state);
    }
}

impl<T: std::any::Any> LazID<T> {
    /// Raw numeric value. Only unique within the `T` namespace!
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id.get()
    }
    /// Reserve `count` ids in a single claim. Much cheaper than repeated
    /// `Default` for bulk insertions, and never allocates memory.
    ///
    /// Ids are claimed eagerly - dropping the iterator early does not return
    /// the unused ones. Exhausting a namespace (all `u64::MAX - 1` values)
    /// terminates the program, so it is on the caller to keep `count` sane.
    pub fn many(count: usize) -> impl ExactSizeIterator<Item = Self> {
        // Zero is fine, handled like any other count.
        // usize always fits in 64 bits on supported targets.
        let count_u64 = count as u64;

        // Id zero is the niche, live ids start at one.
        let start_id = {
            let read = ID_SERVER.upgradable_read();
            let ty = std::any::TypeId::of::<T>();
            if let Some(next) = read.get(&ty) {
                // Order doesn't matter, only uniqueness.
                next.fetch_add(count_u64, std::sync::atomic::Ordering::Relaxed)
            } else {
                // First allocation in this namespace - take exclusive access.
                // Happens a handful of times per run, so the hot path above
                // stays read-only.
                let mut write = parking_lot::RwLockUpgradableReadGuard::upgrade(read);
                write.insert(ty, (count_u64.wrapping_add(1)).into());
                1
            }
        };

        // The counter wrapped. Uniqueness can no longer be promised, and that
        // poisons every map keyed by these ids - no thread may continue.
        #[allow(clippy::manual_assert)]
        if start_id.wrapping_add(count_u64) <= count_u64 {
            // Abort in builds; panic under test so exhaustion is testable.
            #[cfg(not(test))]
            {
                log::error!("{} id namespace exhausted", std::any::type_name::<T>());
                log::logger().flush();
                std::process::abort();
            }
            #[cfg(test)]
            {
                panic!("{} id namespace exhausted", std::any::type_name::<T>())
            }
        }

        // usize indices for ExactSizeIterator - the absolute id values would
        // overflow a 32-bit usize.
        (0..count).map(move |idx| {
            let id = idx as u64 + start_id;
            Self {
                // unwrap ok - zero is unreachable, the wrap guard above ran.
                id: std::num::NonZeroU64::new(id).unwrap(),
                _phantom: std::marker::PhantomData,
            }
        })
    }
}
impl<T: std::any::Any> Default for LazID<T> {
    fn default() -> Self {
        // unwrap ok - the iterator yields exactly one id.
        Self::many(1).next().unwrap()
    }
}
impl<T: std::any::Any> std::fmt::Display for LazID<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // unwrap ok - rsplit yields at least one fragment, even for "".
        write!(
            f,
            "{}#{}",
            std::any::type_name::<T>().rsplit("::").next().unwrap(),
            self.id
        )
    }
}

impl<T: std::any::Any> std::fmt::Debug for LazID<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <LazID<T> as std::fmt::Display>::fmt(self, f)
    }
}
#[cfg(test)]
mod test {
    use super::LazID;
    // All tests run in one process and share the id server, so every test owns
    // a private namespace type. Concrete numeric values asserted here are an
    // implementation detail, not a stable guarantee.

    #[test]
    fn zero_count() {
        struct Namespace;
        type TestID = LazID<Namespace>;

        // Empty reservations must not consume anything.
        let _ = TestID::many(0);
        let _ = TestID::many(0);
        let _ = TestID::many(0);

        let id = TestID::default();
        assert_eq!(id.id(), 1);
    }
    #[test]
    fn bulk_unique() {
        struct Namespace;
        type TestID = LazID<Namespace>;

        let mut ids: Vec<_> = TestID::many(2048).collect();

        ids.sort_unstable_by_key(TestID::id);
        let length_before = ids.len();
        ids.dedup();
        assert_eq!(length_before, ids.len(), "duplicate ids in one reservation");
    }
    // Only meaningful where u64::MAX fits in a usize.
    #[cfg(target_pointer_width = "64")]
    #[test]
    fn near_exhaustion() {
        struct Namespace;
        type TestID = LazID<Namespace>;

        // Claiming every representable id is legal. One more is not, see below.
        let _ = TestID::many(0);
        // Minus one: NonZeroU64 has one fewer value.
        let _ = TestID::many((u64::MAX - 1) as usize);
        let _ = TestID::many(0);
    }
    #[cfg(target_pointer_width = "64")]
    #[test]
    #[should_panic(expected = "exhausted")]
    fn exhaustion_panics() {
        struct Namespace;
        type TestID = LazID<Namespace>;

        // Does not panic on its own, covered by [near_exhaustion].
        let _ = TestID::many((u64::MAX - 1) as usize);
        // This one steps over the edge.
        let _ = TestID::many(1);
    }
}
