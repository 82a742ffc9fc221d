//! Index-linked intrusive lists.
//!
//! Every arena keeps a [`LinkTable`] parallel to its slots. A [`List`] only
//! stores head, tail and length; the prev/next indices live in the table, so
//! an object can belong to at most one list of a given arena at a time and
//! every relink is O(1).

use alloc::vec::Vec;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Links {
    prev: Option<u16>,
    next: Option<u16>,
}

/// Link storage for one arena, indexed by slot.
#[derive(Debug)]
pub(crate) struct LinkTable {
    links: Vec<Links>,
}

impl LinkTable {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        let mut links = Vec::with_capacity(capacity);
        links.resize(capacity, Links::default());
        Self { links }
    }

    pub(crate) fn next(&self, index: u16) -> Option<u16> {
        self.links[index as usize].next
    }

    fn get_mut(&mut self, index: u16) -> &mut Links {
        &mut self.links[index as usize]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct List {
    head: Option<u16>,
    tail: Option<u16>,
    len: usize,
}

impl List {
    pub(crate) const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub(crate) fn head(&self) -> Option<u16> {
        self.head
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn push_back(&mut self, table: &mut LinkTable, index: u16) {
        self.insert_before(table, None, index);
    }

    /// Insert `index` in front of `before`, or at the tail when `before` is `None`.
    pub(crate) fn insert_before(&mut self, table: &mut LinkTable, before: Option<u16>, index: u16) {
        let prev = match before {
            Some(before) => table.links[before as usize].prev,
            None => self.tail,
        };

        *table.get_mut(index) = Links { prev, next: before };

        match prev {
            Some(prev) => table.get_mut(prev).next = Some(index),
            None => self.head = Some(index),
        }
        match before {
            Some(before) => table.get_mut(before).prev = Some(index),
            None => self.tail = Some(index),
        }
        self.len += 1;
    }

    /// Unlink `index`. The caller guarantees it is a member of this list.
    pub(crate) fn remove(&mut self, table: &mut LinkTable, index: u16) {
        let Links { prev, next } = *table.get_mut(index);

        match prev {
            Some(prev) => table.get_mut(prev).next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => table.get_mut(next).prev = prev,
            None => self.tail = prev,
        }

        *table.get_mut(index) = Links::default();
        self.len -= 1;
    }

    pub(crate) fn pop_front(&mut self, table: &mut LinkTable) -> Option<u16> {
        let head = self.head?;
        self.remove(table, head);
        Some(head)
    }

    pub(crate) fn iter<'a>(&self, table: &'a LinkTable) -> Iter<'a> {
        Iter {
            table,
            cursor: self.head,
        }
    }
}

pub(crate) struct Iter<'a> {
    table: &'a LinkTable,
    cursor: Option<u16>,
}

impl Iterator for Iter<'_> {
    type Item = u16;

    fn next(&mut self) -> Option<u16> {
        let current = self.cursor?;
        self.cursor = self.table.next(current);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(list: &List, table: &LinkTable) -> Vec<u16> {
        list.iter(table).collect()
    }

    #[test]
    fn push_and_remove_keep_order() {
        let mut table = LinkTable::with_capacity(4);
        let mut list = List::new();
        list.push_back(&mut table, 0);
        list.push_back(&mut table, 1);
        list.insert_before(&mut table, list.head(), 2);
        assert_eq!(collect(&list, &table), [2, 0, 1]);

        list.remove(&mut table, 0);
        assert_eq!(collect(&list, &table), [2, 1]);
        assert_eq!(table.next(2), Some(1));

        list.remove(&mut table, 2);
        list.remove(&mut table, 1);
        assert!(list.is_empty());
        assert_eq!(list.head(), None);
        assert_eq!(list.tail, None);
    }

    #[test]
    fn insert_before_and_pop() {
        let mut table = LinkTable::with_capacity(4);
        let mut list = List::new();
        list.push_back(&mut table, 0);
        list.push_back(&mut table, 1);
        list.insert_before(&mut table, Some(1), 3);
        assert_eq!(collect(&list, &table), [0, 3, 1]);

        assert_eq!(list.pop_front(&mut table), Some(0));
        list.push_back(&mut table, 0);
        assert_eq!(collect(&list, &table), [3, 1, 0]);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn two_lists_share_one_table() {
        let mut table = LinkTable::with_capacity(4);
        let mut odd = List::new();
        let mut even = List::new();
        for index in 0..4 {
            if index % 2 == 0 {
                even.push_back(&mut table, index);
            } else {
                odd.push_back(&mut table, index);
            }
        }
        assert_eq!(collect(&even, &table), [0, 2]);
        assert_eq!(collect(&odd, &table), [1, 3]);
    }
}
