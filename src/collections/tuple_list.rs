//! Append-only list of `(u64, u64, u64)` triples

/// Append-only sequence of triples with a single writer.
#[derive(Debug, Default, Clone)]
pub struct ThreeLongList {
    items: Vec<[u64; 3]>,
}

impl ThreeLongList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ThreeLongList {
            items: Vec::with_capacity(capacity),
        }
    }

    pub fn add(&mut self, a: u64, b: u64, c: u64) {
        self.items.push([a, b, c]);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<(u64, u64, u64)> {
        self.items.get(index).map(|&[a, b, c]| (a, b, c))
    }

    /// Visit every triple in insertion order
    pub fn for_each<F: FnMut(u64, u64, u64)>(&self, mut visitor: F) {
        for &[a, b, c] in &self.items {
            visitor(a, b, c);
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order() {
        let mut list = ThreeLongList::new();
        assert!(list.is_empty());
        for i in 0..5 {
            list.add(i, i * 10, i * 100);
        }
        assert_eq!(list.len(), 5);
        assert_eq!(list.get(3), Some((3, 30, 300)));
        assert_eq!(list.get(5), None);

        let mut seen = Vec::new();
        list.for_each(|a, b, c| seen.push(a + b + c));
        assert_eq!(seen, vec![0, 111, 222, 333, 444]);

        list.clear();
        assert!(list.is_empty());
    }
}
