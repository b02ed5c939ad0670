//! Cyclic singly-linked rotation of tasks.
//!
//! Nodes live in a `Vec` in insertion order and point at their successor
//! by index. Every `push` splices the new node between the tail and the
//! head, so the ring is closed after each insertion.

#[derive(Debug)]
struct Node<T> {
    value: T,
    next: usize,
}

#[derive(Debug)]
pub(crate) struct Ring<T> {
    nodes: Vec<Node<T>>,
    /// Last inserted node. Its `next` is the head.
    tail: Option<usize>,
}

impl<T> Ring<T> {
    pub(crate) fn new() -> Self {
        Ring {
            nodes: Vec::new(),
            tail: None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Insert before the head, i.e. after the current tail. O(1).
    pub(crate) fn push(&mut self, value: T) -> usize {
        let index = self.nodes.len();
        let next = match self.tail {
            Some(tail) => {
                let head = self.nodes[tail].next;
                self.nodes[tail].next = index;
                head
            }
            None => index,
        };
        self.nodes.push(Node { value, next });
        self.tail = Some(index);
        index
    }

    pub(crate) fn head(&self) -> Option<usize> {
        self.tail.map(|tail| self.nodes[tail].next)
    }

    pub(crate) fn tail(&self) -> Option<usize> {
        self.tail
    }

    pub(crate) fn next(&self, index: usize) -> usize {
        self.nodes[index].next
    }

    pub(crate) fn get(&self, index: usize) -> Option<&T> {
        self.nodes.get(index).map(|node| &node.value)
    }

    /// First node after `cursor` (wrapping around to `cursor` itself last)
    /// whose value satisfies `pred`.
    pub(crate) fn find_after<F>(&self, cursor: usize, pred: F) -> Option<usize>
    where
        F: Fn(&T) -> bool,
    {
        let mut index = self.next(cursor);
        loop {
            if pred(&self.nodes[index].value) {
                return Some(index);
            }
            if index == cursor {
                return None;
            }
            index = self.next(index);
        }
    }

    /// Indices visited by following `next` from `start`, one full turn.
    pub(crate) fn walk_from(&self, start: usize) -> impl Iterator<Item = usize> + '_ {
        let mut index = start;
        (0..self.len()).map(move |_| {
            let current = index;
            index = self.next(index);
            current
        })
    }
}
