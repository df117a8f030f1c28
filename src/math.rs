/// Hash set used for deduplicating held-out tests.
pub type Set<S> = fxhash::FxHashSet<S>;
/// Hash map used by the [`crate::fold::Overlay`] journal, keyed by node.
pub type Map<K, V> = fxhash::FxHashMap<K, V>;

/// A one-to-one association, used to number the settled nodes of a hypothesis with the
/// indices of the exported states.
pub type Bijection<L, R> = bimap::BiBTreeMap<L, R>;
