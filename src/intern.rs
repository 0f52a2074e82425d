//! Chained hash map from byte content to an interned handle.
//!
//! The bucket count is fixed at construction; chains simply get longer as the
//! symbol universe grows.

/// 64-bit ELF-style rolling hash.
pub fn elf_hash64(bytes: &[u8]) -> u64 {
    let mut h: u64 = 0;
    for &b in bytes {
        h = (h << 4).wrapping_add(u64::from(b));
        let g = h & 0xF000_0000_0000_0000;
        if g != 0 {
            h ^= g >> 56;
        }
        h &= !g;
    }
    h
}

struct Entry<V> {
    key: Box<[u8]>,
    value: V,
}

pub struct InternTable<V> {
    buckets: Vec<Vec<Entry<V>>>,
    len: usize,
}

impl<V: Copy> InternTable<V> {
    pub fn new(bucket_count: usize) -> Self {
        let bucket_count = bucket_count.max(1);
        let mut buckets = Vec::with_capacity(bucket_count);
        buckets.resize_with(bucket_count, Vec::new);
        InternTable { buckets, len: 0 }
    }

    #[inline]
    fn bucket_of(&self, key: &[u8]) -> usize {
        (elf_hash64(key) % self.buckets.len() as u64) as usize
    }

    pub fn get(&self, key: &[u8]) -> Option<V> {
        self.buckets[self.bucket_of(key)]
            .iter()
            .find(|entry| &*entry.key == key)
            .map(|entry| entry.value)
    }

    /// Bind `key` to `value`, overwriting an existing binding for the same
    /// content rather than adding a duplicate.
    pub fn set(&mut self, key: &[u8], value: V) {
        let bucket = self.bucket_of(key);
        let chain = &mut self.buckets[bucket];
        if let Some(entry) = chain.iter_mut().find(|entry| &*entry.key == key) {
            entry.value = value;
            return;
        }
        chain.push(Entry {
            key: key.into(),
            value,
        });
        self.len += 1;
    }

    /// Number of distinct keys.
    pub fn count(&self) -> usize {
        self.len
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elf_hash_known_values() {
        assert_eq!(elf_hash64(b""), 0);
        assert_eq!(elf_hash64(b"a"), 0x61);
        assert_eq!(elf_hash64(b"ab"), (0x61 << 4) + 0x62);
    }

    #[test]
    fn test_elf_hash_folds_high_nibble() {
        let long = [0xFFu8; 64];
        assert_eq!(elf_hash64(&long) & 0xF000_0000_0000_0000, 0);
    }

    #[test]
    fn test_set_then_get() {
        let mut table = InternTable::new(7);
        assert_eq!(table.bucket_count(), 7);
        table.set(b"car", 1u32);
        table.set(b"cdr", 2);
        assert_eq!(table.get(b"car"), Some(1));
        assert_eq!(table.get(b"cdr"), Some(2));
        assert_eq!(table.get(b"cadr"), None);
        assert_eq!(table.count(), 2);
    }

    #[test]
    fn test_set_overwrites_existing_key() {
        let mut table = InternTable::new(3);
        table.set(b"x", 1u32);
        table.set(b"x", 9);
        assert_eq!(table.get(b"x"), Some(9));
        assert_eq!(table.count(), 1);
    }

    #[test]
    fn test_prefix_keys_are_distinct() {
        let mut table = InternTable::new(1);
        table.set(b"ab", 1u32);
        table.set(b"abc", 2);
        assert_eq!(table.get(b"ab"), Some(1));
        assert_eq!(table.get(b"abc"), Some(2));
        assert_eq!(table.get(b"a"), None);
    }
}
