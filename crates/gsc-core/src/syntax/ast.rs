//! Abstract syntax tree for GSC scripts.

use crate::source::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A node with source location information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }

    pub fn dummy(node: T) -> Self {
        Self {
            node,
            span: Span::default(),
        }
    }
}

impl<T> std::ops::Deref for Spanned<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.node
    }
}

/// A parsed script file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct File {
    /// `#include` targets, normalized to `/` separators and lowercase.
    pub includes: Vec<Spanned<String>>,
    /// The last `#using_animtree` directive, if any.
    pub animtree: Option<Spanned<String>>,
    pub functions: Vec<FunctionDecl>,
}

/// A script function definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    pub name_span: Span,
    pub params: Vec<Spanned<String>>,
    pub body: Vec<Spanned<Stmt>>,
    pub span: Span,
}

/// Statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Block(Vec<Spanned<Stmt>>),
    If {
        condition: Spanned<Expr>,
        then_branch: Box<Spanned<Stmt>>,
        else_branch: Option<Box<Spanned<Stmt>>>,
    },
    While {
        condition: Spanned<Expr>,
        body: Box<Spanned<Stmt>>,
    },
    For {
        init: Option<Box<Spanned<Stmt>>>,
        condition: Option<Spanned<Expr>>,
        step: Option<Box<Spanned<Stmt>>>,
        body: Box<Spanned<Stmt>>,
    },
    Foreach {
        variable: Spanned<String>,
        collection: Spanned<Expr>,
        body: Box<Spanned<Stmt>>,
    },
    Return(Option<Spanned<Expr>>),
    Wait(Spanned<Expr>),
    WaitTillFrameEnd,
    Break,
    Continue,
    /// `object waittill(event, vars...)`
    WaitTill {
        object: Spanned<Expr>,
        event: Spanned<Expr>,
        variables: Vec<Spanned<String>>,
    },
    /// `object notify(event, args...)`
    Notify {
        object: Spanned<Expr>,
        event: Spanned<Expr>,
        args: Vec<Spanned<Expr>>,
    },
    /// `object endon(event)`
    EndOn {
        object: Spanned<Expr>,
        event: Spanned<Expr>,
    },
    Assign {
        target: Spanned<Expr>,
        op: AssignOp,
        value: Spanned<Expr>,
    },
    IncDec {
        target: Spanned<Expr>,
        increment: bool,
    },
    Expr(Spanned<Expr>),
    Empty,
}

/// Assignment operators. Compound forms carry their binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    Assign,
    Compound(BinaryOp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Or,
    And,
    BitOr,
    BitXor,
    BitAnd,
    Eq,
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::BitAnd => "&",
            BinaryOp::Eq => "==",
            BinaryOp::Neq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Lte => "<=",
            BinaryOp::Gte => ">=",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Int(i64),
    Float(f32),
    String(String),
    /// Localized string reference `&"KEY"`.
    IString(String),
    Undefined,
    Bool(bool),
    Level,
    SelfRef,
    Game,
    Anim,
    EmptyArray,
    Vector(Box<[Spanned<Expr>; 3]>),
    Ident(String),
    /// `::name` or `path::name`.
    FunctionRef {
        path: Option<String>,
        name: String,
    },
    /// `base.field`
    Field(Box<Spanned<Expr>>, String),
    /// `base[index]`
    Index(Box<Spanned<Expr>>, Box<Spanned<Expr>>),
    Call(Box<Call>),
    Unary(UnaryOp, Box<Spanned<Expr>>),
    Binary(Box<Spanned<Expr>>, BinaryOp, Box<Spanned<Expr>>),
    Ternary {
        condition: Box<Spanned<Expr>>,
        then_expr: Box<Spanned<Expr>>,
        else_expr: Box<Spanned<Expr>>,
    },
}

impl Expr {
    pub fn is_call(&self) -> bool {
        matches!(self, Expr::Call(_))
    }
}

/// A function call in any of its forms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    /// The `self` object for method calls (`obj f()`).
    pub object: Option<Spanned<Expr>>,
    /// Called with `thread`.
    pub thread: bool,
    pub callee: Callee,
    pub args: Vec<Spanned<Expr>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Callee {
    /// A function in this script, or an engine builtin.
    Local(String),
    /// `path::name`
    Far { path: String, name: String },
    /// `[[expr]]`
    Pointer(Box<Spanned<Expr>>),
}
