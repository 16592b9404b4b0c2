//! ARM64 relocation relaxation (spec.md §4.I): rewrites the indirect
//! `adrp Xn, :got:sym` / `ldr Xn, [Xn, :got_lo12:sym]` pair that
//! [`crate::codegen_arm64`] emits for every external reference into a
//! direct `adrp`/`add` pair once the symbol's final address is known.
//! There is no GOT section in a firmware binary produced by this
//! compiler, so the indirection the subset's ARM64 backend starts with
//! would dereference a table entry that was never written; relaxation
//! is what makes the call sites actually correct.

use alloc::string::String;

use crate::codegen_arm64::Relocation;
use crate::symbol::SymbolRegistry;

#[derive(Debug)]
pub struct RelaxError(pub String);

const ADRP_OPC_MASK: u32 = 0x9F00_0000;
const ADRP_OPC: u32 = 0x9000_0000;

/// Rewrites every relocation site in `code` in place. `base_address` is
/// the address `code[0]` will occupy once loaded, matching how `adrp`
/// computes its own instruction address at runtime.
pub fn relax(
    code: &mut [u8],
    base_address: u64,
    relocations: &[Relocation],
    registry: &SymbolRegistry,
) -> Result<(), RelaxError> {
    for reloc in relocations {
        let sym_addr = registry
            .lookup(&reloc.symbol)
            .ok_or_else(|| RelaxError(alloc::format!("undefined reference to '{}'", reloc.symbol)))?;
        relax_one(code, base_address, reloc.instr_offset, sym_addr)?;
    }
    Ok(())
}

fn relax_one(code: &mut [u8], base_address: u64, instr_offset: usize, sym_addr: u64) -> Result<(), RelaxError> {
    let adrp_word = read_word(code, instr_offset);
    if adrp_word & ADRP_OPC_MASK != ADRP_OPC {
        return Err(RelaxError(String::from("relocation site is not an adrp instruction")));
    }
    let rd = adrp_word & 0x1F;

    let ldr_word = read_word(code, instr_offset + 4);
    let rn = (ldr_word >> 5) & 0x1F;
    let rt = ldr_word & 0x1F;

    let instr_addr = base_address + instr_offset as u64;
    let page_delta = (sym_addr as i64 >> 12) - (instr_addr as i64 >> 12);
    if !(-(1 << 20)..(1 << 20)).contains(&page_delta) {
        return Err(RelaxError(alloc::format!(
            "adrp page delta {page_delta} out of 21-bit signed range"
        )));
    }
    let immlo = (page_delta & 0x3) as u32;
    let immhi = ((page_delta >> 2) & 0x7FFFF) as u32;
    let new_adrp = (1u32 << 31) | (immlo << 29) | (0b10000 << 24) | (immhi << 5) | rd;
    write_word(code, instr_offset, new_adrp);

    let low12 = (sym_addr & 0xFFF) as u32;
    let new_add = 0x9100_0000 | (low12 << 10) | (rn << 5) | rt;
    write_word(code, instr_offset + 4, new_add);

    Ok(())
}

fn read_word(code: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(code[offset..offset + 4].try_into().unwrap())
}

fn write_word(code: &mut [u8], offset: usize, word: u32) {
    code[offset..offset + 4].copy_from_slice(&word.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;
    use alloc::vec::Vec;

    fn adrp_placeholder(rd: u32) -> u32 {
        0x9000_0000 | rd
    }
    fn ldr_got_placeholder(rd: u32, rn: u32) -> u32 {
        0xF940_0000 | (rn << 5) | rd
    }

    fn site(rd: u32) -> Vec<u8> {
        let mut code = Vec::new();
        code.extend_from_slice(&adrp_placeholder(rd).to_le_bytes());
        code.extend_from_slice(&ldr_got_placeholder(rd, rd).to_le_bytes());
        code
    }

    #[test]
    fn rewrites_forward_reference_within_range() {
        let mut code = site(8);
        let mut registry = SymbolRegistry::new();
        registry.register("target", 0x1_0000_1000);
        let relocs = [Relocation { instr_offset: 0, symbol: String::from("target") }];
        relax(&mut code, 0x1_0000_0000, &relocs, &registry).unwrap();

        let adrp = read_word(&code, 0);
        assert_eq!(adrp & ADRP_OPC_MASK, ADRP_OPC);
        assert_eq!(adrp & 0x1F, 8); // Rd preserved

        let add = read_word(&code, 4);
        assert_eq!(add & 0xFFC0_0000, 0x9100_0000); // ADD (immediate) opcode
        let imm12 = (add >> 10) & 0xFFF;
        assert_eq!(imm12, 0); // low 12 bits of 0x1_0000_1000 are zero
    }

    #[test]
    fn preserves_low12_bits_from_symbol_address() {
        let mut code = site(8);
        let mut registry = SymbolRegistry::new();
        registry.register("target", 0x2000_0ABC);
        let relocs = [Relocation { instr_offset: 0, symbol: String::from("target") }];
        relax(&mut code, 0x2000_0000, &relocs, &registry).unwrap();

        let add = read_word(&code, 4);
        let imm12 = (add >> 10) & 0xFFF;
        assert_eq!(imm12, 0x0ABC);
    }

    #[test]
    fn preserves_destination_and_source_registers() {
        let mut code = site(9);
        let mut registry = SymbolRegistry::new();
        registry.register("target", 0x4000_0000);
        let relocs = [Relocation { instr_offset: 0, symbol: String::from("target") }];
        relax(&mut code, 0x1000_0000, &relocs, &registry).unwrap();

        let adrp = read_word(&code, 0);
        assert_eq!(adrp & 0x1F, 9);
        let add = read_word(&code, 4);
        assert_eq!(add & 0x1F, 9); // Rt
        assert_eq!((add >> 5) & 0x1F, 9); // Rn
    }

    #[test]
    fn rejects_out_of_range_page_delta() {
        let mut code = site(8);
        let mut registry = SymbolRegistry::new();
        // 2^12 pages beyond the 2^20-page signed range.
        registry.register("target", (1u64 << 44));
        let relocs = [Relocation { instr_offset: 0, symbol: String::from("target") }];
        let err = relax(&mut code, 0, &relocs, &registry);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_unresolved_symbol() {
        let mut code = site(8);
        let registry = SymbolRegistry::new();
        let relocs = [Relocation { instr_offset: 0, symbol: String::from("missing") }];
        assert!(relax(&mut code, 0, &relocs, &registry).is_err());
    }
}
