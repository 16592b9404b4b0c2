//! AST for the bundled C subset (spec.md §4.H).

use alloc::string::String;
use alloc::vec::Vec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeSpec {
    Int,
    Char,
    Void,
    /// Any number of `*` applied to a base type; the subset never
    /// distinguishes pointee types at codegen time (everything is a
    /// machine word), so only the pointer depth is tracked.
    Pointer(u8),
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: TypeSpec,
}

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: TypeSpec,
    pub body: Block,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Return(Option<Expr>),
    ExprStmt(Expr),
    VarDecl { name: String, ty: TypeSpec, init: Option<Expr> },
    If { cond: Expr, then_branch: Block, else_branch: Option<Block> },
    While { cond: Expr, body: Block },
    For { init: Option<alloc::boxed::Box<Stmt>>, cond: Option<Expr>, step: Option<Expr>, body: Block },
    Block(Block),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    AddrOf,
    Deref,
}

#[derive(Debug, Clone)]
pub enum Expr {
    IntLiteral(i64),
    StringLiteral(String),
    CharLiteral(u8),
    Ident(String),
    Assign { name: String, value: alloc::boxed::Box<Expr> },
    Binary { op: BinOp, lhs: alloc::boxed::Box<Expr>, rhs: alloc::boxed::Box<Expr> },
    Unary { op: UnaryOp, operand: alloc::boxed::Box<Expr> },
    Call { callee: String, args: Vec<Expr> },
}

#[derive(Debug, Clone)]
pub struct Program {
    pub functions: Vec<FunctionDecl>,
}
