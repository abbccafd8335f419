use indexmap::IndexMap;
use std::array;

/// Key part that stands in for "any value" at a tier.
pub const COMMON: &str = "COMMON";

/// A tuple-keyed map where each key position may hold a wildcard.
///
/// Lookups try every combination of exact and wildcard key parts, with earlier positions being
/// more significant. For a two-part key `[arch, name]` the order is:
///
/// ```text
/// [arch,   name]
/// [arch,   COMMON]
/// [COMMON, name]
/// [COMMON, COMMON]
/// ```
///
/// # Example
///
/// ```
/// use firmplan_util::TieredMap;
/// let mut map = TieredMap::new();
/// map.insert(["COMMON", "gEfiFooGuid"], "common");
/// map.insert(["X64", "gEfiFooGuid"], "x64");
/// assert_eq!(map.resolve(["X64", "gEfiFooGuid"]), Some(&"x64"));
/// assert_eq!(map.resolve(["IA32", "gEfiFooGuid"]), Some(&"common"));
/// assert_eq!(map.resolve(["IA32", "gEfiBarGuid"]), None);
/// ```
#[derive(Debug, Clone)]
pub struct TieredMap<V, const N: usize> {
    entries: IndexMap<[String; N], V>,
    wildcard: &'static str,
}

impl<V, const N: usize> Default for TieredMap<V, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, const N: usize> TieredMap<V, N> {
    pub fn new() -> Self {
        Self::with_wildcard(COMMON)
    }

    pub fn with_wildcard(wildcard: &'static str) -> Self {
        TieredMap {
            entries: IndexMap::new(),
            wildcard,
        }
    }

    /// Later insertions for the same key replace the earlier value but keep its position.
    pub fn insert(&mut self, key: [&str; N], value: V) -> Option<V> {
        self.entries.insert(key.map(String::from), value)
    }

    /// Most specific value for `key`.
    pub fn resolve(&self, key: [&str; N]) -> Option<&V> {
        self.tiers(key)
            .into_iter()
            .find_map(|candidate| self.entries.get(&candidate))
    }

    /// Every value matching `key`, most specific first.
    pub fn resolve_all(&self, key: [&str; N]) -> Vec<&V> {
        self.tiers(key)
            .into_iter()
            .filter_map(|candidate| self.entries.get(&candidate))
            .collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = &[String; N]> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[String; N], &V)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn tiers(&self, key: [&str; N]) -> Vec<[String; N]> {
        let mut ret = Vec::with_capacity(1 << N);
        for mask in 0..(1usize << N) {
            let wild = |i: usize| mask & (1 << (N - 1 - i)) != 0;

            // A part that already is the wildcard is covered by the exact tier
            if (0..N).any(|i| wild(i) && key[i] == self.wildcard) {
                continue;
            }

            ret.push(array::from_fn(|i| {
                if wild(i) {
                    self.wildcard.to_string()
                } else {
                    key[i].to_string()
                }
            }));
        }
        ret
    }
}
