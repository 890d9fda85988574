// memory.rs - The prefix-sharing memory tree addressed by TNum values.
//
// Three roots, one per head trit. Each node owns up to three children keyed
// by trit; descending into a child whose key equals the node's head reuses
// the parent's cell, since appending a head trit never changes the value
// being addressed.

use std::cell::RefCell;
use std::rc::Rc;

use crate::tnum::{MemPtrCache, TNum};

/// A single addressable memory location: an optional value, plus a cached
/// forward link to the cell one address higher (populated lazily as the
/// hot increment/advance loop discovers it).
pub struct MemCell {
    pub val: RefCell<Option<TNum>>,
    pub next: RefCell<Option<Rc<MemCell>>>,
}

impl MemCell {
    fn empty() -> Rc<MemCell> {
        Rc::new(MemCell {
            val: RefCell::new(None),
            next: RefCell::new(None),
        })
    }
}

struct Node {
    cell: Rc<MemCell>,
    children: [RefCell<Option<Rc<Node>>>; 3],
}

impl Node {
    fn new(cell: Rc<MemCell>) -> Rc<Node> {
        Rc::new(Node {
            cell,
            children: [RefCell::new(None), RefCell::new(None), RefCell::new(None)],
        })
    }
}

/// The three-rooted trie mapping distinct `TNum` values to unique cells.
pub struct Memory {
    roots: [Rc<Node>; 3],
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl Memory {
    pub fn new() -> Memory {
        Memory {
            roots: [
                Node::new(MemCell::empty()),
                Node::new(MemCell::empty()),
                Node::new(MemCell::empty()),
            ],
        }
    }

    /// Resolves (and caches into `n.memptr`) the cell addressed by `n`.
    /// A no-op tree walk if the cache is already fresh.
    pub fn resolve(&self, n: &mut TNum) -> Rc<MemCell> {
        if let MemPtrCache::Cell(cell) = n.memptr() {
            return cell.clone();
        }
        let mut cur = self.roots[n.head().to_u8() as usize].clone();
        let mut last_match = cur.cell.clone();
        for i in 0..n.width() {
            let trit = n.tail_trit(i);
            let existing = cur.children[trit.to_u8() as usize].borrow().clone();
            let next_node = match existing {
                Some(child) => {
                    last_match = child.cell.clone();
                    child
                }
                None => {
                    let cell = if trit == n.head() {
                        last_match.clone()
                    } else {
                        MemCell::empty()
                    };
                    let node = Node::new(cell.clone());
                    *cur.children[trit.to_u8() as usize].borrow_mut() = Some(node.clone());
                    last_match = cell;
                    node
                }
            };
            cur = next_node;
        }
        n.set_memptr(last_match.clone());
        last_match
    }

    /// Advances `n` by one (`n.increment()`), re-resolves its cell, and -
    /// if `prev_cell` (the cell addressed by `n` before the increment)
    /// doesn't already have a forward link - records the newly found cell
    /// as that link. Mirrors the reference implementation's hot-loop
    /// `increment; update_memptr; if (!prev->next) prev->next = ...`.
    pub fn advance(&self, prev_cell: &Rc<MemCell>, n: &mut TNum) -> Rc<MemCell> {
        n.increment();
        let new_cell = self.resolve(n);
        if prev_cell.next.borrow().is_none() {
            *prev_cell.next.borrow_mut() = Some(new_cell.clone());
        }
        new_cell
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_values_of_differing_width_share_a_cell() {
        let memory = Memory::new();
        let mut a = TNum::from_u32(5);
        let a_cell = memory.resolve(&mut a);

        // Same value, padded with an extra head (0) trit at the top: padding
        // with head trits never changes the represented value.
        let mut b = TNum::from_u32(5);
        b.pad_to(b.width() as u64 + 3);
        let b_cell = memory.resolve(&mut b);
        assert!(Rc::ptr_eq(&a_cell, &b_cell));
    }

    #[test]
    fn distinct_values_get_distinct_cells() {
        let memory = Memory::new();
        let mut a = TNum::from_u32(5);
        let mut b = TNum::from_u32(6);
        let a_cell = memory.resolve(&mut a);
        let b_cell = memory.resolve(&mut b);
        assert!(!Rc::ptr_eq(&a_cell, &b_cell));
    }

    #[test]
    fn advance_links_consecutive_addresses() {
        let memory = Memory::new();
        let mut cursor = TNum::from_u32(0);
        let mut cell = memory.resolve(&mut cursor);
        for expected in 1u32..20 {
            let prev = cell.clone();
            cell = memory.advance(&prev, &mut cursor);
            let mut direct = TNum::from_u32(expected);
            let direct_cell = memory.resolve(&mut direct);
            assert!(Rc::ptr_eq(&cell, &direct_cell));
            assert!(prev.next.borrow().as_ref().map(|c| Rc::ptr_eq(c, &cell)).unwrap_or(false));
        }
    }
}
