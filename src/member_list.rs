// Derived from code in LLVM, which is:
// Part of the LLVM Project, under the Apache License v2.0 with LLVM Exceptions.
// See https://llvm.org/LICENSE.txt for license information.
// SPDX-License-Identifier: Apache-2.0 WITH LLVM-exception

//! The ordered member sequence.
//!
//! Member order is semantic: it is the on-disk order of the next write.
//! The list is an arena of slots threaded into a doubly-linked chain, so
//! `erase` and `splice` are O(1) and handles to *other* members stay valid
//! across them. Handles carry a generation and detect staleness instead of
//! dangling.

use crate::error::{Error, Result};
use crate::member::ArchiveMember;

/// A stable handle to one member of a [`MemberList`]. Remains valid across
/// insertion, erasure and splicing of other members; using it after the
/// member itself was erased (or spliced into another archive) reports
/// [`Error::StaleHandle`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MemberId {
    index: u32,
    generation: u32,
}

#[derive(Debug)]
struct Entry {
    member: ArchiveMember,
    prev: Option<u32>,
    next: Option<u32>,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

#[derive(Debug, Default)]
pub struct MemberList {
    slots: Vec<Slot>,
    free: Vec<u32>,
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
}

impl MemberList {
    pub fn new() -> Self {
        MemberList::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn slot(&self, id: MemberId) -> Result<u32> {
        match self.slots.get(id.index as usize) {
            Some(slot) if slot.generation == id.generation && slot.entry.is_some() => Ok(id.index),
            _ => Err(Error::StaleHandle),
        }
    }

    fn entry(&self, index: u32) -> &Entry {
        self.slots[index as usize]
            .entry
            .as_ref()
            .expect("linked slot must be occupied")
    }

    fn entry_mut(&mut self, index: u32) -> &mut Entry {
        self.slots[index as usize]
            .entry
            .as_mut()
            .expect("linked slot must be occupied")
    }

    pub fn contains(&self, id: MemberId) -> bool {
        self.slot(id).is_ok()
    }

    pub fn get(&self, id: MemberId) -> Result<&ArchiveMember> {
        let index = self.slot(id)?;
        Ok(&self.entry(index).member)
    }

    pub fn get_mut(&mut self, id: MemberId) -> Result<&mut ArchiveMember> {
        let index = self.slot(id)?;
        Ok(&mut self.entry_mut(index).member)
    }

    pub fn front(&self) -> Option<MemberId> {
        self.head.map(|index| self.id_of(index))
    }

    pub fn back(&self) -> Option<MemberId> {
        self.tail.map(|index| self.id_of(index))
    }

    fn id_of(&self, index: u32) -> MemberId {
        MemberId {
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    fn alloc(&mut self, entry: Entry) -> u32 {
        if let Some(index) = self.free.pop() {
            self.slots[index as usize].entry = Some(entry);
            index
        } else {
            self.slots.push(Slot {
                generation: 0,
                entry: Some(entry),
            });
            (self.slots.len() - 1) as u32
        }
    }

    /// Links the occupied slot `index` into the chain just before
    /// `before` (`None` = end of list).
    fn link_before(&mut self, index: u32, before: Option<u32>) {
        let prev = match before {
            Some(b) => self.entry(b).prev,
            None => self.tail,
        };
        {
            let entry = self.entry_mut(index);
            entry.prev = prev;
            entry.next = before;
        }
        match prev {
            Some(p) => self.entry_mut(p).next = Some(index),
            None => self.head = Some(index),
        }
        match before {
            Some(b) => self.entry_mut(b).prev = Some(index),
            None => self.tail = Some(index),
        }
        self.len += 1;
    }

    /// Unlinks slot `index` from the chain, leaving its entry in place.
    fn unlink(&mut self, index: u32) {
        let (prev, next) = {
            let entry = self.entry(index);
            (entry.prev, entry.next)
        };
        match prev {
            Some(p) => self.entry_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.entry_mut(n).prev = prev,
            None => self.tail = prev,
        }
        self.len -= 1;
    }

    pub fn push_back(&mut self, member: ArchiveMember) -> MemberId {
        let index = self.alloc(Entry {
            member,
            prev: None,
            next: None,
        });
        self.link_before(index, None);
        self.id_of(index)
    }

    /// Inserts `member` just before `before`; `None` appends at the end.
    pub fn insert_before(
        &mut self,
        before: Option<MemberId>,
        member: ArchiveMember,
    ) -> Result<MemberId> {
        let before = match before {
            Some(id) => Some(self.slot(id)?),
            None => None,
        };
        let index = self.alloc(Entry {
            member,
            prev: None,
            next: None,
        });
        self.link_before(index, before);
        Ok(self.id_of(index))
    }

    /// Removes the member and returns it. The handle (and only this
    /// handle) becomes stale.
    pub fn erase(&mut self, id: MemberId) -> Result<ArchiveMember> {
        let index = self.slot(id)?;
        self.unlink(index);
        let slot = &mut self.slots[index as usize];
        slot.generation = slot.generation.wrapping_add(1);
        let entry = slot.entry.take().expect("checked occupied");
        self.free.push(index);
        Ok(entry.member)
    }

    /// Moves `src` (a member of this list) to just before `before`
    /// without copying it; `None` moves it to the end. `src` stays valid.
    pub fn splice_before(&mut self, before: Option<MemberId>, src: MemberId) -> Result<()> {
        let src_index = self.slot(src)?;
        let before = match before {
            Some(id) => Some(self.slot(id)?),
            None => None,
        };
        if before == Some(src_index) {
            return Ok(());
        }
        self.unlink(src_index);
        self.link_before(src_index, before);
        Ok(())
    }

    /// Moves `src` out of `other` to just before `before` in this list,
    /// transferring ownership. The member gets a fresh handle in this
    /// list; the old handle becomes stale.
    pub fn splice_from(
        &mut self,
        before: Option<MemberId>,
        other: &mut MemberList,
        src: MemberId,
    ) -> Result<MemberId> {
        let member = other.erase(src)?;
        self.insert_before(before, member)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    /// Forward/reverse traversal in list order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            front: self.head,
            back: self.tail,
            remaining: self.len,
        }
    }
}

impl<'a> IntoIterator for &'a MemberList {
    type Item = (MemberId, &'a ArchiveMember);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

pub struct Iter<'a> {
    list: &'a MemberList,
    front: Option<u32>,
    back: Option<u32>,
    remaining: usize,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (MemberId, &'a ArchiveMember);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let index = self.front?;
        let entry = self.list.entry(index);
        self.front = entry.next;
        self.remaining -= 1;
        Some((self.list.id_of(index), &entry.member))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl DoubleEndedIterator for Iter<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let index = self.back?;
        let entry = self.list.entry(index);
        self.back = entry.prev;
        self.remaining -= 1;
        Some((self.list.id_of(index), &entry.member))
    }
}

impl ExactSizeIterator for Iter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::PayloadSource;
    use pretty_assertions::assert_eq;

    fn member(name: &str) -> ArchiveMember {
        ArchiveMember {
            path: name.to_string(),
            uid: 0,
            gid: 0,
            mode: 0o644,
            mtime: 0,
            size: 0,
            flags: 0,
            source: PayloadSource::Owned(Vec::new()),
        }
    }

    fn names(list: &MemberList) -> Vec<String> {
        list.iter().map(|(_, m)| m.path.clone()).collect()
    }

    #[test]
    fn push_and_iterate_both_ways() {
        let mut list = MemberList::new();
        for n in ["a", "b", "c"] {
            list.push_back(member(n));
        }
        assert_eq!(names(&list), ["a", "b", "c"]);
        let rev: Vec<_> = list.iter().rev().map(|(_, m)| m.path.clone()).collect();
        assert_eq!(rev, ["c", "b", "a"]);
        assert_eq!(list.iter().len(), 3);
    }

    #[test]
    fn insert_before_preserves_other_order() {
        let mut list = MemberList::new();
        list.push_back(member("a"));
        let b = list.push_back(member("b"));
        list.push_back(member("c"));

        list.insert_before(Some(b), member("x")).unwrap();
        assert_eq!(names(&list), ["a", "x", "b", "c"]);

        list.insert_before(None, member("y")).unwrap();
        assert_eq!(names(&list), ["a", "x", "b", "c", "y"]);
    }

    #[test]
    fn erase_keeps_other_handles_valid() {
        let mut list = MemberList::new();
        let a = list.push_back(member("a"));
        let b = list.push_back(member("b"));
        let c = list.push_back(member("c"));

        let erased = list.erase(b).unwrap();
        assert_eq!(erased.path, "b");
        assert_eq!(names(&list), ["a", "c"]);

        // Handles to a and c still resolve to their unchanged content.
        assert_eq!(list.get(a).unwrap().path, "a");
        assert_eq!(list.get(c).unwrap().path, "c");
        // The erased handle is stale, even after the slot is reused.
        assert!(matches!(list.get(b), Err(Error::StaleHandle)));
        let d = list.push_back(member("d"));
        assert!(matches!(list.get(b), Err(Error::StaleHandle)));
        assert_eq!(list.get(d).unwrap().path, "d");
    }

    #[test]
    fn splice_within_list() {
        let mut list = MemberList::new();
        let a = list.push_back(member("a"));
        list.push_back(member("b"));
        let c = list.push_back(member("c"));

        list.splice_before(Some(a), c).unwrap();
        assert_eq!(names(&list), ["c", "a", "b"]);
        // The spliced handle survives the move.
        assert_eq!(list.get(c).unwrap().path, "c");

        list.splice_before(None, c).unwrap();
        assert_eq!(names(&list), ["a", "b", "c"]);
    }

    #[test]
    fn splice_across_lists_transfers_ownership() {
        let mut src = MemberList::new();
        let mut dst = MemberList::new();
        let s = src.push_back(member("s"));
        src.push_back(member("t"));
        let d = dst.push_back(member("d"));

        let moved = dst.splice_from(Some(d), &mut src, s).unwrap();
        assert_eq!(names(&src), ["t"]);
        assert_eq!(names(&dst), ["s", "d"]);
        assert_eq!(dst.get(moved).unwrap().path, "s");
        assert!(matches!(src.get(s), Err(Error::StaleHandle)));
    }

    #[test]
    fn splice_to_own_position_is_a_no_op() {
        let mut list = MemberList::new();
        let a = list.push_back(member("a"));
        let b = list.push_back(member("b"));
        list.splice_before(Some(b), a).unwrap();
        assert_eq!(names(&list), ["a", "b"]);
        list.splice_before(Some(a), a).unwrap();
        assert_eq!(names(&list), ["a", "b"]);
    }
}
