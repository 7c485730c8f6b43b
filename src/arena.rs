//! Parse-memory arenas.
//!
//! Compiler data has one uniform lifetime: the compile pass. Every AST
//! node, argument list, and folded constant lives in a bump arena and is
//! dropped en masse when the pass ends; there is no per-node free.
//!
//! The arena is built from page blocks of roughly 64 KiB, each a
//! `bumpalo::Bump`. `checkpoint` seals the active block and records the
//! block count, so everything allocated afterwards lands in blocks that
//! `rollback` can free outright. Speculative parses that fail discard
//! their whole allocation tail this way; block granularity costs one
//! empty page per live checkpoint, which a failed speculation gets back.

use bumpalo::Bump;
use std::cell::RefCell;

/// Page-block size. A single oversized allocation may still grow its
/// block past this; the block is then simply full.
const BLOCK_SIZE: usize = 64 * 1024;

/// Saved arena state. Only blocks present when the checkpoint was taken
/// survive a rollback to it.
#[derive(Debug, Clone, Copy)]
pub struct ArenaCheckpoint {
    blocks: usize,
}

/// A typed page-block arena. `alloc` takes `&self`, so any number of
/// live references can coexist while the parse builds its tree; the
/// destructive operations (`rollback`, `reset`) take `&mut self`, so the
/// borrow checker proves no reference into the freed tail survives.
pub struct Arena<T> {
    blocks: RefCell<Vec<Bump>>,
    _marker: std::marker::PhantomData<T>,
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Arena {
            blocks: RefCell::new(vec![Bump::with_capacity(BLOCK_SIZE)]),
            _marker: std::marker::PhantomData,
        }
    }

    fn ensure_room(blocks: &mut Vec<Bump>) {
        let full = match blocks.last() {
            Some(block) => block.allocated_bytes() >= BLOCK_SIZE,
            None => true,
        };
        if full {
            blocks.push(Bump::with_capacity(BLOCK_SIZE));
        }
    }

    pub fn alloc(&self, value: T) -> &T {
        let mut blocks = self.blocks.borrow_mut();
        Self::ensure_room(&mut blocks);
        let idx = blocks.len() - 1;
        let slot = blocks[idx].alloc(value);
        // SAFETY: the value lives in a heap chunk owned by its block;
        // chunks stay put when the block list grows. Blocks are freed
        // only by `rollback`/`reset`, which demand exclusive access, or
        // by `rollback_unchecked`, whose contract forbids live
        // references past the checkpoint.
        unsafe { &*(slot as *const T) }
    }

    pub fn alloc_slice<I>(&self, items: I) -> &[T]
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: ExactSizeIterator,
    {
        let mut blocks = self.blocks.borrow_mut();
        Self::ensure_room(&mut blocks);
        let idx = blocks.len() - 1;
        let slot = blocks[idx].alloc_slice_fill_iter(items);
        // SAFETY: as for `alloc`.
        unsafe { &*(slot as *const [T]) }
    }

    /// Capture the current arena state. The active block is sealed, so a
    /// later `rollback` to this state frees every allocation made in
    /// between.
    pub fn checkpoint(&self) -> ArenaCheckpoint {
        let mut blocks = self.blocks.borrow_mut();
        // an untouched block can serve as the first post-checkpoint block
        // itself; anything else gets sealed behind a fresh one
        let reuse_last = blocks
            .last()
            .map(|b| b.allocated_bytes() == 0)
            .unwrap_or(false);
        if !reuse_last {
            blocks.push(Bump::with_capacity(BLOCK_SIZE));
        }
        ArenaCheckpoint {
            blocks: blocks.len() - 1,
        }
    }

    /// Free every block appended since `state` was captured. Exclusive
    /// access guarantees no reference into the freed tail is still live.
    pub fn rollback(&mut self, state: ArenaCheckpoint) {
        Self::truncate_blocks(self.blocks.get_mut(), state);
    }

    /// `rollback` for use while shared references to the arena exist,
    /// as in a speculative parse that still holds its committed tree.
    ///
    /// # Safety
    ///
    /// Every reference returned by `alloc`/`alloc_slice` after `state`
    /// was captured must have been discarded; their storage is freed.
    pub unsafe fn rollback_unchecked(&self, state: ArenaCheckpoint) {
        Self::truncate_blocks(&mut self.blocks.borrow_mut(), state);
    }

    fn truncate_blocks(blocks: &mut Vec<Bump>, state: ArenaCheckpoint) {
        blocks.truncate(state.blocks);
        if blocks.is_empty() {
            blocks.push(Bump::with_capacity(BLOCK_SIZE));
        }
    }

    /// Drop everything except one fresh block.
    pub fn reset(&mut self) {
        let blocks = self.blocks.get_mut();
        blocks.truncate(1);
        if blocks.is_empty() {
            blocks.push(Bump::with_capacity(BLOCK_SIZE));
        }
        blocks[0].reset();
    }

    /// Bytes handed out so far, across all blocks.
    pub fn allocated_bytes(&self) -> usize {
        self.blocks
            .borrow()
            .iter()
            .map(|b| b.allocated_bytes())
            .sum()
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Stand-in for an AST node: payload plus an arena-internal link.
    struct Node<'a> {
        id: u32,
        prev: Option<&'a Node<'a>>,
    }

    #[test]
    fn nodes_can_link_to_earlier_nodes() {
        let arena: Arena<Node> = Arena::new();
        let first = arena.alloc(Node { id: 1, prev: None });
        let second = arena.alloc(Node {
            id: 2,
            prev: Some(first),
        });
        assert_eq!(second.prev.map(|n| n.id), Some(1));
    }

    #[test]
    fn references_survive_block_growth() {
        // enough u64s to spill well past one 64 KiB block
        let arena: Arena<u64> = Arena::new();
        let refs: Vec<&u64> = (0..20_000u64).map(|i| arena.alloc(i)).collect();
        assert!(arena.allocated_bytes() > BLOCK_SIZE);
        for (i, r) in refs.iter().enumerate() {
            assert_eq!(**r, i as u64);
        }
    }

    #[test]
    fn alloc_slice_round_trips() {
        let arena: Arena<u16> = Arena::new();
        let slice = arena.alloc_slice(vec![3, 5, 8]);
        assert_eq!(slice, &[3, 5, 8]);
        let empty = arena.alloc_slice(Vec::new());
        assert!(empty.is_empty());
    }

    #[test]
    fn rollback_reclaims_everything_after_the_checkpoint() {
        let mut arena: Arena<u64> = Arena::new();
        for i in 0..100 {
            arena.alloc(i);
        }
        let before = arena.allocated_bytes();
        let state = arena.checkpoint();
        for i in 0..20_000u64 {
            arena.alloc(i);
        }
        assert!(arena.allocated_bytes() > before);
        arena.rollback(state);
        assert_eq!(arena.allocated_bytes(), before);
    }

    #[test]
    fn arena_remains_usable_after_rollback() {
        let mut arena: Arena<u32> = Arena::new();
        arena.alloc(1);
        let state = arena.checkpoint();
        arena.alloc(2);
        arena.rollback(state);
        let kept = arena.alloc(3);
        assert_eq!(*kept, 3);
    }

    #[test]
    fn checkpoints_nest_lifo() {
        let mut arena: Arena<u64> = Arena::new();
        arena.alloc(0);
        let outer_bytes = arena.allocated_bytes();
        let outer = arena.checkpoint();
        for i in 0..10_000u64 {
            arena.alloc(i);
        }
        let inner_bytes = arena.allocated_bytes();
        let inner = arena.checkpoint();
        for i in 0..10_000u64 {
            arena.alloc(i);
        }
        arena.rollback(inner);
        assert_eq!(arena.allocated_bytes(), inner_bytes);
        arena.rollback(outer);
        assert_eq!(arena.allocated_bytes(), outer_bytes);
    }

    #[test]
    fn checkpoint_on_fresh_arena_rolls_back_to_empty() {
        let mut arena: Arena<u32> = Arena::new();
        let state = arena.checkpoint();
        for i in 0..100 {
            arena.alloc(i);
        }
        arena.rollback(state);
        assert_eq!(arena.allocated_bytes(), 0);
    }

    #[test]
    fn aliased_rollback_keeps_earlier_references_valid() {
        // the speculative-parse pattern: the committed tree stays live
        // while the abandoned tail is reclaimed
        let arena: Arena<u32> = Arena::new();
        let committed = arena.alloc(7);
        let state = arena.checkpoint();
        arena.alloc(8);
        unsafe { arena.rollback_unchecked(state) };
        assert_eq!(*committed, 7);
        let after = arena.alloc(9);
        assert_eq!(*after, 9);
    }

    #[test]
    fn reset_drops_to_one_empty_block() {
        let mut arena: Arena<u64> = Arena::new();
        for i in 0..20_000u64 {
            arena.alloc(i);
        }
        arena.reset();
        assert_eq!(arena.allocated_bytes(), 0);
        assert_eq!(*arena.alloc(1), 1);
    }
}
