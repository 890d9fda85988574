// loader.rs - Consumes program bytes, populates memory at addresses
// 0, 1, 2, ..., and derives the six "initial values" used for unmapped
// reads. Pure in-memory transformation: opening the program file or
// reading stdin to completion is the CLI front end's job.

use std::rc::Rc;

use crate::error::Error;
use crate::memory::{MemCell, Memory};
use crate::tnum::TNum;

/// `(v + pos) mod 94` values that correspond to the eight valid opcodes.
const VALID_INSTRUCTIONS: [u32; 8] = [4, 5, 23, 39, 40, 62, 68, 81];

fn is_valid_instruction(code: u32) -> bool {
    VALID_INSTRUCTIONS.contains(&code)
}

fn is_skipped_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\r' | b'\n')
}

/// Loads `bytes` into `memory` at addresses `0, 1, 2, ...` and returns the
/// six initial values used for unmapped reads (`initial_values[addr % 6]`).
pub fn load(bytes: &[u8], memory: &Memory) -> Result<[TNum; 6], Error> {
    let mut init = TNum::from_u32(0);
    let mut cell = memory.resolve(&mut init);
    let mut pos: u32 = 0;
    let mut prev: Option<Rc<MemCell>> = None;
    let mut prevprev: Option<Rc<MemCell>> = None;

    for &byte in bytes {
        if is_skipped_whitespace(byte) {
            continue;
        }
        let in_range = (33..127).contains(&(byte as u32));
        let code = (byte as u32 + pos) % 94;
        if !in_range || !is_valid_instruction(code) {
            return Err(Error::InvalidByte { pos });
        }
        *cell.val.borrow_mut() = Some(TNum::from_u32(byte as u32));
        prevprev = prev.replace(cell.clone());
        cell = memory.advance(prev.as_ref().unwrap(), &mut init);
        pos = (pos + 1) % 564;
    }

    let mut prevprev = prevprev.ok_or(Error::TooFewBytes)?;
    let mut prev = prev.ok_or(Error::TooFewBytes)?;

    let mut initial_values: [Option<TNum>; 6] = Default::default();
    for step in (pos % 6)..18 {
        let mut m1 = prev.val.borrow().clone().unwrap();
        let mut m2 = prevprev.val.borrow().clone().unwrap();
        TNum::crazy_op(&mut m1, &mut m2);
        if step >= 12 {
            initial_values[(step - 12) as usize] = Some(m2);
        }
        *cell.val.borrow_mut() = Some(m1);
        prevprev = prev.clone();
        prev = cell.clone();
        cell = memory.advance(&prev, &mut init);
    }

    Ok(initial_values.map(|v| {
        v.expect("the seeding loop always covers steps 12..18 regardless of the starting pos")
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    // 'Q' (81) at position 0 decodes to hlt (81); 'C' (67) at position 1
    // decodes to nop (68). Two bytes, two positions, both accepted - the
    // smallest program the loader can seed initial values from.
    const MIN_VALID_PROGRAM: &[u8] = b"QC";

    #[test]
    fn too_few_bytes_is_fatal() {
        let memory = Memory::new();
        let err = load(b"", &memory);
        assert!(matches!(err, Err(Error::TooFewBytes)));
        let memory = Memory::new();
        let err = load(b"Q", &memory); // one accepted byte only
        assert!(matches!(err, Err(Error::TooFewBytes)));
    }

    #[test]
    fn invalid_byte_is_rejected() {
        let memory = Memory::new();
        // position 0: (val + 0) % 94 must not be in the accepted set.
        // 'A' = 65; 65 % 94 = 65, not in {4,5,23,39,40,62,68,81}.
        let err = load(b"A", &memory);
        assert!(matches!(err, Err(Error::InvalidByte { pos: 0 })));
    }

    #[test]
    fn byte_producing_instruction_42_at_position_zero_is_rejected() {
        let memory = Memory::new();
        // '*' = 42; (42 + 0) % 94 = 42, not one of the eight valid codes.
        let err = load(b"*", &memory);
        assert!(matches!(err, Err(Error::InvalidByte { pos: 0 })));
    }

    #[test]
    fn whitespace_is_skipped_without_advancing_position() {
        let memory = Memory::new();
        let with_ws = load(b" \tQ\nC", &memory);
        let memory2 = Memory::new();
        let without_ws = load(MIN_VALID_PROGRAM, &memory2);
        assert!(with_ws.is_ok());
        assert!(without_ws.is_ok());
    }

    #[test]
    fn loading_populates_six_distinct_initial_values_slots() {
        let memory = Memory::new();
        let values = load(MIN_VALID_PROGRAM, &memory).expect("minimal valid program");
        assert_eq!(values.len(), 6);
    }
}
