use std::collections::BTreeMap;
use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{Sig, SigKey};

/// Latest value per signal key.
///
/// The cache deduplicates: adding a sig fully equal to the cached one changes
/// nothing and reports `false`, which lets senders skip retransmitting
/// unchanged state.  All methods take `&self`; the map is guarded by a lock
/// private to each instance.
#[derive(Default)]
pub struct SigCache {
    sigs: RwLock<BTreeMap<SigKey, Sig>>,
}

impl SigCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `sig` unless an identical sig is already cached.  Returns
    /// whether the cache changed.
    pub fn add(&self, sig: Sig) -> bool {
        let mut sigs = self.sigs.write();
        let key = sig.key();
        if sigs.get(&key) == Some(&sig) {
            return false;
        }
        sigs.insert(key, sig);
        true
    }

    /// Adds every sig, returning how many changed the cache.
    pub fn add_all(&self, sigs: impl IntoIterator<Item = Sig>) -> usize {
        sigs.into_iter().filter(|sig| self.add(sig.clone())).count()
    }

    /// Keeps sigs that carry a value and forgets the key of those that do not.
    pub fn add_high_remove_low(&self, sig: Sig) -> bool {
        if sig.has_value() {
            self.add(sig)
        } else {
            self.remove(&sig.key()).is_some()
        }
    }

    /// Like [`add_high_remove_low`](Self::add_high_remove_low) but only the
    /// presence of a value is kept: the stored copy is cleared.
    pub fn add_high_clear_remove_low(&self, sig: Sig) -> bool {
        if sig.has_value() {
            self.add(sig.cleared())
        } else {
            self.remove(&sig.key()).is_some()
        }
    }

    pub fn remove(&self, key: &SigKey) -> Option<Sig> {
        self.sigs.write().remove(key)
    }

    pub fn get(&self, key: &SigKey) -> Option<Sig> {
        self.sigs.read().get(key).cloned()
    }

    pub fn contains_key(&self, key: &SigKey) -> bool {
        self.sigs.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.sigs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sigs.read().is_empty()
    }

    pub fn clear(&self) {
        self.sigs.write().clear();
    }

    /// Every cached sig in key order.
    pub fn snapshot(&self) -> Vec<Sig> {
        self.sigs.read().values().cloned().collect()
    }

    /// Cached sigs for which [`Sig::has_value`] holds.
    pub fn with_values(&self) -> Vec<Sig> {
        self.sigs
            .read()
            .values()
            .filter(|sig| sig.has_value())
            .cloned()
            .collect()
    }
}

impl Clone for SigCache {
    fn clone(&self) -> Self {
        Self {
            sigs: RwLock::new(self.sigs.read().clone()),
        }
    }
}

impl PartialEq for SigCache {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other) || self.snapshot() == other.snapshot()
    }
}

impl Eq for SigCache {}

impl fmt::Debug for SigCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.snapshot()).finish()
    }
}

impl FromIterator<Sig> for SigCache {
    fn from_iter<I: IntoIterator<Item = Sig>>(iter: I) -> Self {
        let cache = Self::new();
        cache.add_all(iter);
        cache
    }
}

impl Serialize for SigCache {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.snapshot().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SigCache {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Vec::<Sig>::deserialize(deserializer)?.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SigValue;

    #[test]
    fn adding_identical_sig_is_a_no_op() {
        let cache = SigCache::new();
        assert!(cache.add(Sig::analog(1, 10)));
        let before = cache.snapshot();
        assert!(!cache.add(Sig::analog(1, 10)));
        assert_eq!(cache.snapshot(), before);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn new_value_replaces_old_entry() {
        let cache = SigCache::new();
        cache.add(Sig::analog(1, 10));
        assert!(cache.add(Sig::analog(1, 11)));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&Sig::analog(1, 0).key()), Some(Sig::analog(1, 11)));
    }

    #[test]
    fn smart_object_and_name_are_part_of_the_key() {
        let cache = SigCache::new();
        cache.add(Sig::digital(1, true));
        cache.add(Sig::digital(1, true).with_smart_object(5));
        cache.add(Sig::named("Power", SigValue::Digital(true)));
        cache.add(Sig::analog(1, 1));
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn add_high_remove_low_tracks_latest_value() {
        let cache = SigCache::new();
        let steps = [
            Sig::digital(3, true),
            Sig::digital(3, false),
            Sig::digital(3, true),
            Sig::digital(3, true),
            Sig::digital(3, false),
            Sig::digital(3, false),
        ];
        for sig in steps {
            cache.add_high_remove_low(sig.clone());
            assert_eq!(cache.contains_key(&sig.key()), sig.has_value());
        }
        assert!(cache.is_empty());
    }

    #[test]
    fn add_high_clear_remove_low_stores_presence_only() {
        let cache = SigCache::new();
        assert!(cache.add_high_clear_remove_low(Sig::analog(2, 500)));
        let stored = cache.get(&Sig::analog(2, 0).key()).unwrap();
        assert_eq!(stored, Sig::analog(2, 0));
        // A different magnitude is still only "present".
        assert!(!cache.add_high_clear_remove_low(Sig::analog(2, 600)));
        assert!(cache.add_high_clear_remove_low(Sig::analog(2, 0)));
        assert!(cache.is_empty());
    }

    #[test]
    fn with_values_filters_low_sigs() {
        let cache: SigCache = [
            Sig::digital(1, true),
            Sig::digital(2, false),
            Sig::serial(1, None::<String>),
            Sig::serial(2, Some("x")),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            cache.with_values(),
            vec![Sig::digital(1, true), Sig::serial(2, Some("x"))]
        );
    }

    #[test]
    fn serialises_as_sig_array() {
        let cache: SigCache = [Sig::analog(2, 7), Sig::digital(1, true)].into_iter().collect();
        let json = serde_json::to_string(&cache).unwrap();
        assert_eq!(json, r#"[{"t":0,"n":1,"v":true},{"t":1,"n":2,"v":7}]"#);
        let back: SigCache = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cache);
    }
}
