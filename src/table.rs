use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::hash::Hash;

/// 线程安全的 id → 值 映射，各个负载均衡策略用它做存在性判断和 O(1) 查找
///
/// `get`/`len`/`for_each` 不需要策略自身的锁，可以和其他线程的增删并发执行。
#[derive(Debug)]
pub struct InstanceTable<K, V>
where
    K: Eq + Hash,
{
    inner: DashMap<K, V>,
}

impl<K, V> InstanceTable<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.get(key).map(|v| v.value().clone())
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.contains_key(key)
    }

    /// 不存在时插入并返回 true；已存在时保持原值不变，返回 false
    pub fn insert_if_absent(&self, key: K, value: V) -> bool {
        match self.inner.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
        }
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.remove(key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// 遍历当前的所有条目，回调返回 false 时提前结束
    ///
    /// 先拷贝出一份快照再回调：不持有分片锁，回调里可以再调用增删；
    /// 同一次遍历中每个 key 最多出现一次。
    pub fn for_each<F>(&self, mut visit: F)
    where
        F: FnMut(&K, &V) -> bool,
    {
        let snapshot: Vec<(K, V)> = self
            .inner
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        for (k, v) in &snapshot {
            if !visit(k, v) {
                break;
            }
        }
    }
}

impl<K, V> Default for InstanceTable<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_if_absent_keeps_first_value() {
        let table = InstanceTable::new();
        assert!(table.insert_if_absent("a", 1));
        assert!(!table.insert_if_absent("a", 2));
        assert_eq!(table.get(&"a"), Some(1));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_remove() {
        let table = InstanceTable::new();
        table.insert_if_absent("a", 1);
        assert_eq!(table.remove(&"a"), Some(1));
        assert_eq!(table.remove(&"a"), None);
        assert!(table.is_empty());
    }

    #[test]
    fn test_for_each_short_circuit() {
        let table = InstanceTable::new();
        for i in 0..10 {
            table.insert_if_absent(i, i * 10);
        }

        let mut visited = 0;
        table.for_each(|_, _| {
            visited += 1;
            visited < 3
        });
        assert_eq!(visited, 3);
    }

    #[test]
    fn test_for_each_allows_reentrant_mutation() {
        let table = InstanceTable::new();
        for i in 0..4 {
            table.insert_if_absent(i, i);
        }

        // 回调里删除不会死锁
        table.for_each(|k, _| {
            table.remove(k);
            true
        });
        assert!(table.is_empty());
    }
}
