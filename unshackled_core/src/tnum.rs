// tnum.rs - The arbitrary-width trinary number at the heart of the machine.
//
// A TNum is an infinite-to-the-left stream of trits, all but finitely many
// equal to `head`. The explicit part is `tail`, ordered least-significant
// first. `memptr` and `unicode` are caches of derived facts (the owning
// memory cell, the Unicode codepoint) that invalidate on any operation that
// changes the represented value.

use std::rc::Rc;

use crate::error::Error;
use crate::memory::MemCell;
use crate::trit::{opr, Trit};

const UNICODE_LIMIT: u32 = 0x110000;

/// The 94-entry xlat2 substitution table, keyed by `(unicode - 33) % 94`.
const XLAT2_TABLE: &[u8; 94] =
    b"5z]&gqtyfr$(we4{WP)H-Zn,[%\\3dL+Q;>U!pJS72FhOA1C\
      B6v^=I_0/8|jsb9m<.TVac`uY*MK'X~xDl}REokN:#?G\"i@";

/// Cache of the memory cell addressed by a given `TNum`.
///
/// `NotComputed` stands in for the reference implementation's null-pointer
/// sentinel; keeping it as its own variant (rather than an `Option` wrapped
/// around a sometimes-dangling pointer) makes "stale" a type-level fact.
#[derive(Clone)]
pub enum MemPtrCache {
    NotComputed,
    Cell(Rc<MemCell>),
}

impl MemPtrCache {
    pub fn cell(&self) -> Option<&Rc<MemCell>> {
        match self {
            MemPtrCache::NotComputed => None,
            MemPtrCache::Cell(c) => Some(c),
        }
    }
}

/// Cache of the Unicode projection of a `TNum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnicodeCache {
    NotComputed,
    NotCodepoint,
    Codepoint(u32),
}

impl UnicodeCache {
    /// The raw signed value the reference implementation would compare
    /// against instruction codes: a codepoint's value, or -1.
    pub fn as_signed(self) -> i64 {
        match self {
            UnicodeCache::Codepoint(u) => u as i64,
            _ => -1,
        }
    }
}

/// An arbitrary-width base-3 value with an infinite, constant prefix.
#[derive(Clone)]
pub struct TNum {
    head: Trit,
    tail: Vec<Trit>,
    memptr: MemPtrCache,
    unicode: UnicodeCache,
}

impl TNum {
    /// Builds the `TNum` for a non-negative integer: `head = 0`, base-3
    /// digits of `s` least-significant first.
    pub fn from_u32(s: u32) -> TNum {
        let mut tail = Vec::new();
        let mut v = s;
        loop {
            tail.push(Trit::from_u8((v % 3) as u8).unwrap());
            v /= 3;
            if v == 0 {
                break;
            }
        }
        let unicode = if s < UNICODE_LIMIT {
            UnicodeCache::Codepoint(s)
        } else {
            UnicodeCache::NotCodepoint
        };
        TNum {
            head: Trit::T0,
            tail,
            memptr: MemPtrCache::NotComputed,
            unicode,
        }
    }

    /// The newline sentinel `TNum{head=2, tail=[1]}` (value `...2221`).
    pub fn newline() -> TNum {
        TNum {
            head: Trit::T2,
            tail: vec![Trit::T1],
            memptr: MemPtrCache::NotComputed,
            unicode: UnicodeCache::NotCodepoint,
        }
    }

    /// The EOF sentinel `TNum{head=2, tail=[2]}` (value `...2222` = -1).
    pub fn eof() -> TNum {
        TNum {
            head: Trit::T2,
            tail: vec![Trit::T2],
            memptr: MemPtrCache::NotComputed,
            unicode: UnicodeCache::NotCodepoint,
        }
    }

    pub fn head(&self) -> Trit {
        self.head
    }

    pub fn width(&self) -> usize {
        self.tail.len()
    }

    pub fn tail_trit(&self, i: usize) -> Trit {
        self.tail[i]
    }

    pub fn memptr(&self) -> &MemPtrCache {
        &self.memptr
    }

    pub(crate) fn set_memptr(&mut self, cell: Rc<MemCell>) {
        self.memptr = MemPtrCache::Cell(cell);
    }

    pub(crate) fn invalidate_memptr(&mut self) {
        self.memptr = MemPtrCache::NotComputed;
    }

    /// Replaces the contents of `self` with a copy of `other` (`copy_number`
    /// in the reference implementation). The old tail is simply dropped.
    pub fn assign(&mut self, other: &TNum) {
        self.head = other.head;
        self.tail.clear();
        self.tail.extend_from_slice(&other.tail);
        self.memptr = other.memptr.clone();
        self.unicode = other.unicode;
    }

    /// Real width: the greatest `i+1` such that `tail[i] != head`, or 0.
    pub fn real_width(&self) -> u64 {
        let mut real = 0u64;
        for (i, &t) in self.tail.iter().enumerate() {
            if t != self.head {
                real = (i + 1) as u64;
            }
        }
        real
    }

    /// Refreshes and returns the Unicode cache.
    pub fn unicode(&mut self) -> UnicodeCache {
        if let UnicodeCache::NotComputed = self.unicode {
            self.unicode = self.compute_unicode();
        }
        self.unicode
    }

    /// Reads the Unicode cache without recomputing a stale one; only valid
    /// to call right after `unicode()` refreshed it.
    pub fn unicode_cached(&self) -> UnicodeCache {
        self.unicode
    }

    fn compute_unicode(&self) -> UnicodeCache {
        if self.head != Trit::T0 {
            return UnicodeCache::NotCodepoint;
        }
        let mut value: u64 = 0;
        let mut factor: u64 = 1;
        for &t in &self.tail {
            value += factor * t.to_u8() as u64;
            if value >= UNICODE_LIMIT as u64 {
                return UnicodeCache::NotCodepoint;
            }
            factor *= 3;
        }
        UnicodeCache::Codepoint(value as u32)
    }

    /// True iff `self` encodes the newline sentinel `...22221`.
    pub fn is_newline(&self) -> bool {
        if self.head != Trit::T2 {
            return false;
        }
        let (last, rest) = match self.tail.split_last() {
            Some(x) => x,
            None => return false,
        };
        *last == Trit::T1 && rest.iter().all(|&t| t == Trit::T2)
    }

    /// `self <- self + 1`.
    pub fn increment(&mut self) {
        match self.unicode {
            UnicodeCache::Codepoint(u) if u + 1 < UNICODE_LIMIT => {
                self.unicode = UnicodeCache::Codepoint(u + 1);
            }
            _ => self.unicode = UnicodeCache::NotComputed,
        }
        if let MemPtrCache::Cell(cell) = &self.memptr {
            let next = cell.next.borrow().clone();
            self.memptr = match next {
                Some(n) => MemPtrCache::Cell(n),
                None => MemPtrCache::NotComputed,
            };
        }
        for t in self.tail.iter_mut() {
            let (sum, carried) = t.inc();
            *t = sum;
            if !carried {
                return;
            }
        }
        if self.head == Trit::T2 {
            self.head = Trit::T0;
            return;
        }
        let new_high = Trit::from_u8(self.head.to_u8() + 1).unwrap();
        self.tail.push(new_high);
    }

    /// Pads the tail with trailing head trits until it reaches `width`.
    /// Value-preserving: an appended head trit never changes the number.
    pub(crate) fn pad_to(&mut self, width: u64) {
        while (self.tail.len() as u64) < width {
            self.tail.push(self.head);
        }
    }

    /// Rotates right by padding the tail with head trits up to `width`,
    /// then cyclically shifting the whole (now possibly wider) tail by one
    /// position: the old least-significant trit reappears as the new most
    /// significant one. Width never shrinks; the shift covers the full
    /// current tail, not just the `width`-sized window, once the number is
    /// already wider than `width`.
    pub fn rotate_right(&mut self, width: u64) {
        self.pad_to(width);
        self.tail.rotate_left(1);
        self.invalidate_memptr();
        self.unicode = UnicodeCache::NotComputed;
    }

    /// The crazy-op: combines `a` and `d` trit-wise in place, including the
    /// head, extending the narrower operand with its own head trit.
    pub fn crazy_op(a: &mut TNum, d: &mut TNum) {
        let len = a.tail.len().max(d.tail.len()) as u64;
        a.pad_to(len);
        d.pad_to(len);
        for i in 0..len as usize {
            let r = opr(a.tail[i], d.tail[i]);
            a.tail[i] = r;
            d.tail[i] = r;
        }
        let hr = opr(a.head, d.head);
        a.head = hr;
        d.head = hr;
        a.invalidate_memptr();
        d.invalidate_memptr();
        a.unicode = UnicodeCache::NotComputed;
        d.unicode = UnicodeCache::NotComputed;
    }

    /// Applies the fixed substitution cipher in place. Requires the current
    /// Unicode projection to lie in `[33, 127)`; discards the tail, to be
    /// rebuilt lazily by `repair_after_xlat2`.
    pub fn xlat2(&mut self) -> Result<(), Error> {
        let u = self.unicode();
        let code = match u {
            UnicodeCache::Codepoint(c) if (33..127).contains(&c) => c,
            _ => return Err(Error::Xlat2OutOfRange),
        };
        let mapped = XLAT2_TABLE[((code - 33) % 94) as usize] as u32;
        self.unicode = UnicodeCache::Codepoint(mapped);
        self.tail.clear();
        self.invalidate_memptr();
        Ok(())
    }

    /// Rebuilds the tail from the Unicode cache after `xlat2` discarded it.
    /// A no-op if the tail is already present.
    pub fn repair_after_xlat2(&mut self) {
        if !self.tail.is_empty() {
            return;
        }
        let symbol = match self.unicode {
            UnicodeCache::Codepoint(c) => c,
            _ => return,
        };
        self.head = Trit::T0;
        let mut v = symbol;
        loop {
            self.tail.push(Trit::from_u8((v % 3) as u8).unwrap());
            v /= 3;
            if v == 0 {
                break;
            }
        }
        self.invalidate_memptr();
    }

    /// `self mod m` for `2 <= m <= 29524`, per the spec's fixed-head-term
    /// formula; valid for any tail width.
    pub fn modulo(&self, m: u32) -> u32 {
        let m = m as u64;
        let mut result = (29524u64 % m) * (self.head.to_u8() as u64);
        result %= m;
        let mut position: u64 = 1;
        for &t in &self.tail {
            let term = t.to_u8() as u64 + (m - self.head.to_u8() as u64);
            result = (result + position * term) % m;
            position = (position * 3) % m;
        }
        result as u32
    }
}
