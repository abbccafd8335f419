use indexmap::map::IndexMap;
use std::hash::Hash;

/// Group `(key, value)` pairs into an `IndexMap`, keeping the order in which keys first appear.
pub fn group_ordered<I, K, V>(iter: I) -> IndexMap<K, Vec<V>>
where
    I: IntoIterator<Item = (K, V)>,
    K: Hash + Eq,
{
    let mut groups: IndexMap<K, Vec<V>> = IndexMap::new();
    for (key, val) in iter {
        groups.entry(key).or_default().push(val);
    }
    groups
}
