//! ARM64 code generator (spec.md §4.H, §4.I). Deliberately emits every
//! external reference as the indirect two-instruction sequence
//! `adrp Xn, :got:sym` / `ldr Xn, [Xn, :got_lo12:sym]` even though this
//! compiler never builds a real GOT section — [`crate::relax`] rewrites
//! the pair to a direct `adrp`/`add` once the symbol's final address is
//! known, which is the only consumer of the relocation list this module
//! produces.

use alloc::string::String;
use alloc::vec::Vec;

use crate::ast::*;
use crate::symbol::SymbolRegistry;

pub struct CodegenError(pub String);

/// One indirect-call site awaiting relaxation: `instr_offset` is the byte
/// offset of the `adrp` instruction, with its paired `ldr` immediately
/// following at `instr_offset + 4`.
#[derive(Debug, Clone)]
pub struct Relocation {
    pub instr_offset: usize,
    pub symbol: String,
}

const X0: u32 = 0;
const X1: u32 = 1;
const X8: u32 = 8;
const X9: u32 = 9;
const FP: u32 = 29;
const LR: u32 = 30;
const SP: u32 = 31;

fn movz(rd: u32, imm16: u16) -> u32 {
    0xD280_0000 | ((imm16 as u32) << 5) | rd
}
fn movk(rd: u32, imm16: u16, shift: u32) -> u32 {
    0xF280_0000 | ((shift / 16) << 21) | ((imm16 as u32) << 5) | rd
}
fn add_imm(rd: u32, rn: u32, imm12: u32) -> u32 {
    0x9100_0000 | ((imm12 & 0xFFF) << 10) | (rn << 5) | rd
}
fn sub_imm(rd: u32, rn: u32, imm12: u32) -> u32 {
    0xD100_0000 | ((imm12 & 0xFFF) << 10) | (rn << 5) | rd
}
fn add_reg(rd: u32, rn: u32, rm: u32) -> u32 {
    0x8B00_0000 | (rm << 16) | (rn << 5) | rd
}
fn sub_reg(rd: u32, rn: u32, rm: u32) -> u32 {
    0xCB00_0000 | (rm << 16) | (rn << 5) | rd
}
fn mul(rd: u32, rn: u32, rm: u32) -> u32 {
    0x9B00_7C00 | (rm << 16) | (rn << 5) | rd
}
fn sdiv(rd: u32, rn: u32, rm: u32) -> u32 {
    0x9AC0_0C00 | (rm << 16) | (rn << 5) | rd
}
fn msub(rd: u32, rn: u32, rm: u32, ra: u32) -> u32 {
    0x9B00_8000 | (rm << 16) | (ra << 10) | (rn << 5) | rd
}
fn cmp(rn: u32, rm: u32) -> u32 {
    0xEB00_001F | (rm << 16) | (rn << 5)
}
fn cset(rd: u32, cond_inverted: u32) -> u32 {
    0x9A9F_07E0 | (cond_inverted << 12) | rd
}
fn stur(rt: u32, rn: u32, imm9: i32) -> u32 {
    0xF800_0000 | (((imm9 & 0x1FF) as u32) << 12) | (rn << 5) | rt
}
fn ldur(rt: u32, rn: u32, imm9: i32) -> u32 {
    0xF840_0000 | (((imm9 & 0x1FF) as u32) << 12) | (rn << 5) | rt
}
fn stp_pre(rt1: u32, rt2: u32, rn: u32, imm7: i32) -> u32 {
    0xA980_0000 | (((imm7 / 8) & 0x7F) as u32) << 15 | (rt2 << 10) | (rn << 5) | rt1
}
fn ldp_post(rt1: u32, rt2: u32, rn: u32, imm7: i32) -> u32 {
    0xA8C0_0000 | (((imm7 / 8) & 0x7F) as u32) << 15 | (rt2 << 10) | (rn << 5) | rt1
}
fn mov_reg(rd: u32, rn: u32) -> u32 {
    add_imm(rd, rn, 0)
}
fn blr(rn: u32) -> u32 {
    0xD63F_0000 | (rn << 5)
}
fn ret() -> u32 {
    0xD65F_03C0
}
fn adrp_placeholder(rd: u32) -> u32 {
    // op=1, immlo=0, 10000, immhi=0, Rd — filled in by the relaxer.
    0x9000_0000 | rd
}
fn ldr_got_placeholder(rd: u32, rn: u32) -> u32 {
    0xF940_0000 | (rn << 5) | rd
}
fn b_cond_placeholder(cond: u32) -> u32 {
    0x5400_0000 | cond
}
fn b_placeholder() -> u32 {
    0x1400_0000
}

struct Locals {
    offsets: alloc::collections::BTreeMap<String, i32>,
    next_offset: i32,
}

impl Locals {
    fn new() -> Self {
        Self {
            offsets: alloc::collections::BTreeMap::new(),
            next_offset: 0,
        }
    }
    fn declare(&mut self, name: &str) -> i32 {
        self.next_offset -= 8;
        self.offsets.insert(String::from(name), self.next_offset);
        self.next_offset
    }
    fn offset(&self, name: &str) -> Option<i32> {
        self.offsets.get(name).copied()
    }
}

fn count_locals(block: &Block, count: &mut usize) {
    for stmt in &block.stmts {
        match stmt {
            Stmt::VarDecl { .. } => *count += 1,
            Stmt::If { then_branch, else_branch, .. } => {
                count_locals(then_branch, count);
                if let Some(b) = else_branch {
                    count_locals(b, count);
                }
            }
            Stmt::While { body, .. } => count_locals(body, count),
            Stmt::For { body, init, .. } => {
                if let Some(s) = init {
                    if matches!(s.as_ref(), Stmt::VarDecl { .. }) {
                        *count += 1;
                    }
                }
                count_locals(body, count);
            }
            Stmt::Block(b) => count_locals(b, count),
            Stmt::Return(_) | Stmt::ExprStmt(_) => {}
        }
    }
}

pub struct Arm64Codegen<'a> {
    registry: &'a SymbolRegistry,
    code: Vec<u8>,
    relocations: Vec<Relocation>,
    current_frame_size: i32,
}

impl<'a> Arm64Codegen<'a> {
    pub fn new(registry: &'a SymbolRegistry) -> Self {
        Self {
            registry,
            code: Vec::new(),
            relocations: Vec::new(),
            current_frame_size: 0,
        }
    }

    pub fn into_parts(self) -> (Vec<u8>, Vec<Relocation>) {
        (self.code, self.relocations)
    }

    fn emit(&mut self, word: u32) {
        self.code.extend_from_slice(&word.to_le_bytes());
    }

    pub fn emit_function(&mut self, func: &FunctionDecl) -> Result<usize, CodegenError> {
        let entry = self.code.len();
        let mut locals = Locals::new();
        let mut local_count = 0usize;
        count_locals(&func.body, &mut local_count);
        let frame_size = (((func.params.len() + local_count) * 8 + 15) & !15) as i32;
        self.current_frame_size = frame_size;

        self.emit(stp_pre(FP, LR, SP, -16));
        self.emit(mov_reg(FP, SP));
        if frame_size > 0 {
            self.emit(sub_imm(SP, SP, frame_size as u32));
        }

        const ARG_REGS: [u32; 4] = [0, 1, 2, 3];
        for (i, param) in func.params.iter().enumerate() {
            let disp = locals.declare(&param.name);
            if let Some(&reg) = ARG_REGS.get(i) {
                self.emit(stur(reg, FP, disp));
            }
        }

        self.emit_block(&func.body, &mut locals)?;
        self.emit_epilogue(frame_size);
        Ok(entry)
    }

    fn emit_epilogue(&mut self, frame_size: i32) {
        if frame_size > 0 {
            self.emit(add_imm(SP, SP, frame_size as u32));
        }
        self.emit(ldp_post(FP, LR, SP, 16));
        self.emit(ret());
    }

    fn emit_block(&mut self, block: &Block, locals: &mut Locals) -> Result<(), CodegenError> {
        for stmt in &block.stmts {
            self.emit_stmt(stmt, locals)?;
        }
        Ok(())
    }

    fn emit_stmt(&mut self, stmt: &Stmt, locals: &mut Locals) -> Result<(), CodegenError> {
        match stmt {
            Stmt::Return(expr) => {
                if let Some(e) = expr {
                    self.emit_expr(e, locals)?;
                } else {
                    self.emit_imm64(X0, 0);
                }
                self.emit_epilogue(self.current_frame_size);
            }
            Stmt::ExprStmt(e) => {
                self.emit_expr(e, locals)?;
            }
            Stmt::VarDecl { name, init, .. } => {
                let disp = locals.declare(name);
                if let Some(e) = init {
                    self.emit_expr(e, locals)?;
                } else {
                    self.emit_imm64(X0, 0);
                }
                self.emit(stur(X0, FP, disp));
            }
            Stmt::If { cond, then_branch, else_branch } => {
                self.emit_expr(cond, locals)?;
                self.emit_imm64_reg(X1, 0);
                self.emit(cmp(X0, X1));
                let jz = self.emit_b_cond_placeholder(0);
                self.emit_block(then_branch, locals)?;
                if let Some(else_block) = else_branch {
                    let jmp = self.emit_b_placeholder();
                    self.patch_b_cond(jz);
                    self.emit_block(else_block, locals)?;
                    self.patch_b(jmp);
                } else {
                    self.patch_b_cond(jz);
                }
            }
            Stmt::While { cond, body } => {
                let loop_start = self.code.len();
                self.emit_expr(cond, locals)?;
                self.emit_imm64_reg(X1, 0);
                self.emit(cmp(X0, X1));
                let exit = self.emit_b_cond_placeholder(0);
                self.emit_block(body, locals)?;
                self.emit_b_back(loop_start);
                self.patch_b_cond(exit);
            }
            Stmt::For { init, cond, step, body } => {
                if let Some(s) = init {
                    self.emit_stmt(s, locals)?;
                }
                let loop_start = self.code.len();
                let exit = if let Some(c) = cond {
                    self.emit_expr(c, locals)?;
                    self.emit_imm64_reg(X1, 0);
                    self.emit(cmp(X0, X1));
                    Some(self.emit_b_cond_placeholder(0))
                } else {
                    None
                };
                self.emit_block(body, locals)?;
                if let Some(s) = step {
                    self.emit_expr(s, locals)?;
                }
                self.emit_b_back(loop_start);
                if let Some(fixup) = exit {
                    self.patch_b_cond(fixup);
                }
            }
            Stmt::Block(b) => self.emit_block(b, locals)?,
        }
        Ok(())
    }

    fn emit_expr(&mut self, expr: &Expr, locals: &mut Locals) -> Result<(), CodegenError> {
        match expr {
            Expr::IntLiteral(v) => self.emit_imm64(X0, *v as u64),
            Expr::CharLiteral(c) => self.emit_imm64(X0, *c as u64),
            Expr::StringLiteral(_) => {
                return Err(CodegenError(String::from(
                    "string literals require a preceding data-placement pass",
                )));
            }
            Expr::Ident(name) => {
                let disp = locals
                    .offset(name)
                    .ok_or_else(|| CodegenError(alloc::format!("undeclared identifier '{name}'")))?;
                self.emit(ldur(X0, FP, disp));
            }
            Expr::Assign { name, value } => {
                self.emit_expr(value, locals)?;
                let disp = locals
                    .offset(name)
                    .ok_or_else(|| CodegenError(alloc::format!("undeclared identifier '{name}'")))?;
                self.emit(stur(X0, FP, disp));
            }
            Expr::Unary { op, operand } => {
                self.emit_expr(operand, locals)?;
                match op {
                    UnaryOp::Neg => {
                        self.emit_imm64_reg(X1, 0);
                        self.emit(sub_reg(X0, X1, X0));
                    }
                    UnaryOp::Not => {
                        self.emit_imm64_reg(X1, 0);
                        self.emit(cmp(X0, X1));
                        self.emit(cset(X0, 1)); // invert(EQ) = NE
                    }
                    UnaryOp::AddrOf | UnaryOp::Deref => {
                        return Err(CodegenError(String::from(
                            "pointer address-of/dereference is not supported by this codegen",
                        )));
                    }
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                self.emit_expr(lhs, locals)?;
                self.emit(stur(X0, SP, -16));
                self.emit(sub_imm(SP, SP, 16));
                self.emit_expr(rhs, locals)?;
                self.emit(mov_reg(X1, X0));
                self.emit(ldur(X0, SP, 0));
                self.emit(add_imm(SP, SP, 16));
                self.emit_binop(*op);
            }
            Expr::Call { callee, args } => {
                const ARG_REGS: [u32; 4] = [0, 1, 2, 3];
                for (i, arg) in args.iter().enumerate() {
                    self.emit_expr(arg, locals)?;
                    if let Some(&reg) = ARG_REGS.get(i) {
                        if reg != X0 {
                            self.emit(mov_reg(reg, X0));
                        }
                    }
                }
                // Only resolve in advance to reject unknown externals
                // early; the actual address is threaded through relax.
                self.registry
                    .lookup(callee)
                    .ok_or_else(|| CodegenError(alloc::format!("undefined reference to '{callee}'")))?;
                let reloc_offset = self.code.len();
                self.emit(adrp_placeholder(X8));
                self.emit(ldr_got_placeholder(X8, X8));
                self.relocations.push(Relocation {
                    instr_offset: reloc_offset,
                    symbol: String::from(callee.as_str()),
                });
                self.emit(blr(X8));
            }
        }
        Ok(())
    }

    fn emit_binop(&mut self, op: BinOp) {
        match op {
            BinOp::Add => self.emit(add_reg(X0, X0, X1)),
            BinOp::Sub => self.emit(sub_reg(X0, X0, X1)),
            BinOp::Mul => self.emit(mul(X0, X0, X1)),
            BinOp::Div => self.emit(sdiv(X0, X0, X1)),
            BinOp::Mod => {
                self.emit(sdiv(X9, X0, X1));
                self.emit(msub(X0, X9, X1, X0));
            }
            // cset takes invert(cond); see emit_setcc doc comment.
            BinOp::Eq => self.emit_setcc(1),    // invert(EQ) = NE
            BinOp::NotEq => self.emit_setcc(0), // invert(NE) = EQ
            BinOp::Lt => self.emit_setcc(10),   // invert(LT) = GE
            BinOp::GtEq => self.emit_setcc(11), // invert(GE) = LT
            BinOp::Gt => self.emit_setcc(13),   // invert(GT) = LE
            BinOp::LtEq => self.emit_setcc(12), // invert(LE) = GT
            BinOp::And => {
                self.emit_truthy(X0);
                self.emit_truthy(X1);
                self.emit(0x8A01_0000 | (X1 << 16) | (X0 << 5) | X0); // and x0, x0, x1
            }
            BinOp::Or => {
                self.emit_truthy(X0);
                self.emit_truthy(X1);
                self.emit(0xAA01_0000 | (X1 << 16) | (X0 << 5) | X0); // orr x0, x0, x1
            }
        }
    }

    fn emit_truthy(&mut self, reg: u32) {
        self.emit_imm64_reg(X9, 0);
        self.emit(cmp(reg, X9));
        self.emit(cset(reg, 0)); // invert(NE) = EQ
    }

    /// `cset` takes the *inverted* condition (it is built on `CSINC ...,
    /// invert(cond)`); callers pass the already-inverted code.
    fn emit_setcc(&mut self, inverted_cond: u32) {
        self.emit(cmp(X0, X1));
        self.emit(cset(X0, inverted_cond));
    }

    fn emit_imm64(&mut self, rd: u32, imm: u64) {
        self.emit(movz(rd, (imm & 0xFFFF) as u16));
        if imm >> 16 != 0 {
            self.emit(movk(rd, ((imm >> 16) & 0xFFFF) as u16, 16));
        }
        if imm >> 32 != 0 {
            self.emit(movk(rd, ((imm >> 32) & 0xFFFF) as u16, 32));
        }
        if imm >> 48 != 0 {
            self.emit(movk(rd, ((imm >> 48) & 0xFFFF) as u16, 48));
        }
    }

    fn emit_imm64_reg(&mut self, rd: u32, imm: u64) {
        self.emit_imm64(rd, imm);
    }

    fn emit_b_cond_placeholder(&mut self, cond: u32) -> usize {
        let at = self.code.len();
        self.emit(b_cond_placeholder(cond));
        at
    }

    fn emit_b_placeholder(&mut self) -> usize {
        let at = self.code.len();
        self.emit(b_placeholder());
        at
    }

    fn patch_b_cond(&mut self, at: usize) {
        let imm19 = ((self.code.len() - at) / 4) as u32;
        let word = u32::from_le_bytes(self.code[at..at + 4].try_into().unwrap());
        let cond = word & 0xF;
        let patched = 0x5400_0000 | ((imm19 & 0x7FFFF) << 5) | cond;
        self.code[at..at + 4].copy_from_slice(&patched.to_le_bytes());
    }

    fn patch_b(&mut self, at: usize) {
        let imm26 = ((self.code.len() - at) / 4) as u32;
        let patched = 0x1400_0000 | (imm26 & 0x3FF_FFFF);
        self.code[at..at + 4].copy_from_slice(&patched.to_le_bytes());
    }

    fn emit_b_back(&mut self, target: usize) {
        let at = self.code.len();
        let delta_words = (target as i64 - at as i64) / 4;
        let imm26 = (delta_words as u32) & 0x3FF_FFFF;
        self.emit(0x1400_0000 | imm26);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::token::Lexer;

    #[test]
    fn emits_frame_setup_and_indirect_call_site() {
        let tokens = Lexer::new("int main(void) { exit(1); return 0; }").tokenize();
        let program = Parser::new(tokens).parse_program().unwrap();
        let mut registry = SymbolRegistry::new();
        registry.register("exit", 0x1_0000_0000);
        let mut gen = Arm64Codegen::new(&registry);
        gen.emit_function(&program.functions[0]).unwrap();
        let (code, relocs) = gen.into_parts();
        assert_eq!(relocs.len(), 1);
        assert_eq!(relocs[0].symbol, "exit");
        // stp x29,x30,[sp,#-16]!
        let first = u32::from_le_bytes(code[0..4].try_into().unwrap());
        assert_eq!(first & 0xFFC0_0000, 0xA980_0000 & 0xFFC0_0000);
    }

    #[test]
    fn rejects_undefined_external() {
        let tokens = Lexer::new("int main(void) { undefined_fn(); return 0; }").tokenize();
        let program = Parser::new(tokens).parse_program().unwrap();
        let registry = SymbolRegistry::new();
        let mut gen = Arm64Codegen::new(&registry);
        assert!(gen.emit_function(&program.functions[0]).is_err());
    }
}
