//! Slab-backed doubly linked list used as the cache's replacement list.
//!
//! Index-based links instead of pointers; free slots are recycled through a
//! free list. The head is the least recently used end, the tail the most
//! recently unprotected one.

/// Index into the slab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SlabIdx(u32);

struct SlabNode<T> {
    value: T,
    prev: Option<SlabIdx>,
    next: Option<SlabIdx>,
}

pub(crate) struct LruList<T> {
    slots: Vec<Option<SlabNode<T>>>,
    free_indices: Vec<u32>,
    head: Option<SlabIdx>,
    tail: Option<SlabIdx>,
    len: usize,
}

impl<T> LruList<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_indices: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append a value at the MRU end. Returns the slab index.
    pub(crate) fn push_back(&mut self, value: T) -> SlabIdx {
        let idx = self.alloc_slot(value);
        let old_tail = self.tail;
        if let Some(node) = self.node_mut(idx) {
            node.prev = old_tail;
        }
        match old_tail {
            Some(t) => {
                if let Some(node) = self.node_mut(t) {
                    node.next = Some(idx);
                }
            }
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
        self.len += 1;
        idx
    }

    /// Unlink a node by index and return its value. `None` for a vacant slot.
    pub(crate) fn remove(&mut self, idx: SlabIdx) -> Option<T> {
        let node = self.slots.get_mut(idx.0 as usize)?.take()?;

        match node.prev {
            Some(p) => {
                if let Some(prev) = self.node_mut(p) {
                    prev.next = node.next;
                }
            }
            None => self.head = node.next,
        }
        match node.next {
            Some(n) => {
                if let Some(next) = self.node_mut(n) {
                    next.prev = node.prev;
                }
            }
            None => self.tail = node.prev,
        }

        self.free_indices.push(idx.0);
        self.len -= 1;
        Some(node.value)
    }

    /// Get a reference to a value by slab index.
    pub(crate) fn get(&self, idx: SlabIdx) -> Option<&T> {
        self.slots.get(idx.0 as usize)?.as_ref().map(|n| &n.value)
    }

    /// Get a mutable reference to a value by slab index.
    pub(crate) fn get_mut(&mut self, idx: SlabIdx) -> Option<&mut T> {
        self.node_mut(idx).map(|n| &mut n.value)
    }

    /// Least recently used node.
    pub(crate) fn head(&self) -> Option<SlabIdx> {
        self.head
    }

    /// Successor of `idx` towards the MRU end.
    pub(crate) fn next(&self, idx: SlabIdx) -> Option<SlabIdx> {
        self.slots.get(idx.0 as usize)?.as_ref()?.next
    }

    /// Iterate from LRU to MRU, yielding `(SlabIdx, &T)`.
    pub(crate) fn iter(&self) -> LruIter<'_, T> {
        LruIter {
            list: self,
            current: self.head,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.free_indices.clear();
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    fn alloc_slot(&mut self, value: T) -> SlabIdx {
        let node = SlabNode {
            value,
            prev: None,
            next: None,
        };
        if let Some(free) = self.free_indices.pop() {
            self.slots[free as usize] = Some(node);
            SlabIdx(free)
        } else {
            let raw = self.slots.len() as u32;
            self.slots.push(Some(node));
            SlabIdx(raw)
        }
    }

    #[inline]
    fn node_mut(&mut self, idx: SlabIdx) -> Option<&mut SlabNode<T>> {
        self.slots.get_mut(idx.0 as usize)?.as_mut()
    }
}

impl<T> Default for LruList<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) struct LruIter<'a, T> {
    list: &'a LruList<T>,
    current: Option<SlabIdx>,
}

impl<'a, T> Iterator for LruIter<'a, T> {
    type Item = (SlabIdx, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.current?;
        let node = self.list.slots.get(idx.0 as usize)?.as_ref()?;
        self.current = node.next;
        Some((idx, &node.value))
    }
}
