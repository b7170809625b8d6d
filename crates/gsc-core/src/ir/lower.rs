//! AST to IR lowering.
//!
//! Lowering also performs the semantic checks: duplicate functions and
//! parameters, loop control outside loops, invalid assignment targets,
//! reads of unassigned locals, slot and argument limits, and calls to
//! functions that are neither in the script nor engine builtins. Errors are
//! collected and lowering continues so one compile reports all of them.

use std::collections::{HashMap, HashSet};

use crate::diagnostic::{Diagnostic, Diagnostics};
use crate::known::{is_builtin_function, is_builtin_method};
use crate::source::Span;
use crate::syntax::ast::{
    self, AssignOp, BinaryOp, Call, Callee, Expr, Spanned, Stmt, UnaryOp,
};

use super::local_scope::LocalScope;
use super::{Instruction, IrFunction, IrModule, LabelId, Opcode, Operand};

/// Argument counts are encoded as a single byte.
pub const MAX_ARGS: usize = u8::MAX as usize;

/// Lower a parsed script into IR.
///
/// The module is returned even when errors were reported; callers must
/// check `has_errors()` before using it.
pub fn lower_file(name: &str, file: &ast::File) -> (IrModule, Diagnostics) {
    let mut diagnostics = Diagnostics::new();

    // Phase 1: collect script function names
    let mut declared: HashMap<String, Span> = HashMap::new();
    for function in &file.functions {
        if declared.contains_key(&function.name) {
            diagnostics.error(
                function.name_span,
                format!("function '{}' is already defined", function.name),
            );
        } else {
            declared.insert(function.name.clone(), function.name_span);
        }
    }

    // Phase 2: lower bodies, first definition wins
    let mut lowered = HashSet::new();
    let mut functions = Vec::new();
    for function in &file.functions {
        if !lowered.insert(function.name.as_str()) {
            continue;
        }
        let lowering = FunctionLowering::new(&declared, &mut diagnostics);
        functions.push(lowering.lower(function));
    }

    let module = IrModule {
        name: name.to_string(),
        includes: file.includes.iter().map(|i| i.node.clone()).collect(),
        animtree: file.animtree.as_ref().map(|a| a.node.clone()),
        functions,
    };
    (module, diagnostics)
}

#[derive(Debug, Clone, Copy)]
struct LoopTargets {
    break_label: LabelId,
    continue_label: LabelId,
}

/// Lowering state for one function body.
struct FunctionLowering<'a> {
    script_functions: &'a HashMap<String, Span>,
    diagnostics: &'a mut Diagnostics,
    locals: LocalScope,
    instructions: Vec<Instruction>,
    labels: Vec<Option<usize>>,
    loops: Vec<LoopTargets>,
    /// Counter for compiler-generated foreach locals.
    hidden_locals: u32,
}

impl<'a> FunctionLowering<'a> {
    fn new(script_functions: &'a HashMap<String, Span>, diagnostics: &'a mut Diagnostics) -> Self {
        Self {
            script_functions,
            diagnostics,
            locals: LocalScope::new(),
            instructions: Vec::new(),
            labels: Vec::new(),
            loops: Vec::new(),
            hidden_locals: 0,
        }
    }

    fn lower(mut self, function: &ast::FunctionDecl) -> IrFunction {
        let mut seen = HashSet::new();
        for param in &function.params {
            if !seen.insert(param.node.as_str()) {
                self.error(param.span, format!("duplicate parameter '{}'", param.node));
                continue;
            }
            self.define_local(&param.node, param.span);
        }
        let params = self.locals.len() as u8;

        // Prologue, patched once the local count is known
        self.op(Opcode::CreateLocalVariables);
        for stmt in &function.body {
            self.lower_stmt(stmt);
        }
        self.op(Opcode::End);

        let total = self.locals.len() as u8;
        self.instructions[0] = Instruction::new(
            Opcode::CreateLocalVariables,
            vec![Operand::U8(params), Operand::U8(total)],
        );

        IrFunction {
            name: function.name.clone(),
            params,
            locals: self.locals.names(),
            instructions: self.instructions,
            labels: self.labels,
        }
    }

    // ---------------------------------------------------------------------
    // Emission helpers
    // ---------------------------------------------------------------------

    fn emit(&mut self, opcode: Opcode, operands: Vec<Operand>) {
        self.instructions.push(Instruction::new(opcode, operands));
    }

    fn op(&mut self, opcode: Opcode) {
        self.emit(opcode, Vec::new());
    }

    fn new_label(&mut self) -> LabelId {
        let label = LabelId(self.labels.len() as u32);
        self.labels.push(None);
        label
    }

    fn bind(&mut self, label: LabelId) {
        self.labels[label.0 as usize] = Some(self.instructions.len());
    }

    fn jump(&mut self, opcode: Opcode, label: LabelId) {
        self.emit(opcode, vec![Operand::Label(label)]);
    }

    fn call_builtin(&mut self, name: &str, argc: u8) {
        self.emit(
            Opcode::CallBuiltin,
            vec![Operand::Str(name.to_string()), Operand::U8(argc)],
        );
    }

    fn error(&mut self, span: Span, message: impl Into<String>) {
        self.diagnostics.error(span, message);
    }

    fn define_local(&mut self, name: &str, span: Span) -> u8 {
        match self.locals.define(name) {
            Ok(slot) => slot,
            Err(e) => {
                self.error(span, e.to_string());
                0
            }
        }
    }

    // ---------------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------------

    fn lower_stmt(&mut self, stmt: &Spanned<Stmt>) {
        match &stmt.node {
            Stmt::Block(body) => {
                for inner in body {
                    self.lower_stmt(inner);
                }
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let else_label = self.new_label();
                self.lower_expr(condition);
                self.jump(Opcode::JumpOnFalse, else_label);
                self.lower_stmt(then_branch);
                match else_branch {
                    Some(else_branch) => {
                        let end = self.new_label();
                        self.jump(Opcode::Jump, end);
                        self.bind(else_label);
                        self.lower_stmt(else_branch);
                        self.bind(end);
                    }
                    None => self.bind(else_label),
                }
            }
            Stmt::While { condition, body } => {
                let start = self.new_label();
                let end = self.new_label();
                self.bind(start);
                if !is_always_true(condition) {
                    self.lower_expr(condition);
                    self.jump(Opcode::JumpOnFalse, end);
                }
                self.lower_loop_body(
                    body,
                    LoopTargets {
                        break_label: end,
                        continue_label: start,
                    },
                );
                self.jump(Opcode::Jump, start);
                self.bind(end);
            }
            Stmt::For {
                init,
                condition,
                step,
                body,
            } => {
                if let Some(init) = init {
                    self.lower_stmt(init);
                }
                let start = self.new_label();
                let next = self.new_label();
                let end = self.new_label();
                self.bind(start);
                if let Some(condition) = condition.as_ref().filter(|c| !is_always_true(c)) {
                    self.lower_expr(condition);
                    self.jump(Opcode::JumpOnFalse, end);
                }
                self.lower_loop_body(
                    body,
                    LoopTargets {
                        break_label: end,
                        continue_label: next,
                    },
                );
                self.bind(next);
                if let Some(step) = step {
                    self.lower_stmt(step);
                }
                self.jump(Opcode::Jump, start);
                self.bind(end);
            }
            Stmt::Foreach {
                variable,
                collection,
                body,
            } => self.lower_foreach(variable, collection, body),
            Stmt::Return(value) => match value {
                Some(value) => {
                    self.lower_expr(value);
                    self.op(Opcode::Return);
                }
                None => self.op(Opcode::End),
            },
            Stmt::Wait(duration) => {
                self.lower_expr(duration);
                self.op(Opcode::Wait);
            }
            Stmt::WaitTillFrameEnd => self.op(Opcode::WaitTillFrameEnd),
            Stmt::Break => match self.loops.last().copied() {
                Some(targets) => self.jump(Opcode::Jump, targets.break_label),
                None => self.error(stmt.span, "'break' outside of a loop"),
            },
            Stmt::Continue => match self.loops.last().copied() {
                Some(targets) => self.jump(Opcode::Jump, targets.continue_label),
                None => self.error(stmt.span, "'continue' outside of a loop"),
            },
            Stmt::WaitTill {
                object,
                event,
                variables,
            } => {
                self.lower_expr(event);
                self.lower_expr(object);
                self.op(Opcode::WaitTill);
                for variable in variables {
                    let slot = self.define_local(&variable.node, variable.span);
                    self.emit(Opcode::SafeSetWaittillVariable, vec![Operand::U8(slot)]);
                }
                self.op(Opcode::ClearParams);
            }
            Stmt::Notify {
                object,
                event,
                args,
            } => {
                if args.len() > MAX_ARGS {
                    self.error(stmt.span, format!("too many notify arguments (limit is {MAX_ARGS})"));
                }
                self.op(Opcode::PreScriptCall);
                for arg in args.iter().rev() {
                    self.lower_expr(arg);
                }
                self.lower_expr(event);
                self.lower_expr(object);
                self.op(Opcode::Notify);
            }
            Stmt::EndOn { object, event } => {
                self.lower_expr(event);
                self.lower_expr(object);
                self.op(Opcode::EndOn);
            }
            Stmt::Assign { target, op, value } => match op {
                AssignOp::Assign => {
                    self.lower_expr(value);
                    self.lower_ref(target, true);
                    self.op(Opcode::SetVariable);
                }
                AssignOp::Compound(binary) => {
                    self.lower_expr(target);
                    self.lower_expr(value);
                    match binary_opcode(*binary) {
                        Some(opcode) => self.op(opcode),
                        None => self.error(stmt.span, format!("'{binary}=' is not an assignment operator")),
                    }
                    self.lower_ref(target, false);
                    self.op(Opcode::SetVariable);
                }
            },
            Stmt::IncDec { target, increment } => {
                self.lower_ref(target, false);
                self.op(if *increment { Opcode::Inc } else { Opcode::Dec });
            }
            Stmt::Expr(expr) => match &expr.node {
                Expr::Call(call) => {
                    self.lower_call(call, expr.span);
                    self.op(Opcode::DecTop);
                }
                _ => self.error(expr.span, "expression statement must be a call"),
            },
            Stmt::Empty => {}
        }
    }

    fn lower_loop_body(&mut self, body: &Spanned<Stmt>, targets: LoopTargets) {
        self.loops.push(targets);
        self.lower_stmt(body);
        self.loops.pop();
    }

    /// `foreach (v in arr)` walks the array keys with the engine's
    /// `getfirstarraykey`/`getnextarraykey` builtins.
    fn lower_foreach(&mut self, variable: &Spanned<String>, collection: &Spanned<Expr>, body: &Spanned<Stmt>) {
        let n = self.hidden_locals;
        self.hidden_locals += 1;
        // `$` cannot appear in identifiers, so these never collide
        let array = self.define_local(&format!("$array{n}"), collection.span);
        let key = self.define_local(&format!("$key{n}"), collection.span);

        self.lower_expr(collection);
        self.emit(Opcode::EvalLocalRef, vec![Operand::U8(array)]);
        self.op(Opcode::SetVariable);
        self.emit(Opcode::EvalLocal, vec![Operand::U8(array)]);
        self.call_builtin("getfirstarraykey", 1);
        self.emit(Opcode::EvalLocalRef, vec![Operand::U8(key)]);
        self.op(Opcode::SetVariable);

        let start = self.new_label();
        let next = self.new_label();
        let end = self.new_label();
        self.bind(start);
        self.emit(Opcode::EvalLocal, vec![Operand::U8(key)]);
        self.call_builtin("isdefined", 1);
        self.jump(Opcode::JumpOnFalse, end);

        self.emit(Opcode::EvalLocal, vec![Operand::U8(key)]);
        self.emit(Opcode::EvalLocal, vec![Operand::U8(array)]);
        self.op(Opcode::EvalArray);
        let slot = self.define_local(&variable.node, variable.span);
        self.emit(Opcode::EvalLocalRef, vec![Operand::U8(slot)]);
        self.op(Opcode::SetVariable);

        self.lower_loop_body(
            body,
            LoopTargets {
                break_label: end,
                continue_label: next,
            },
        );

        self.bind(next);
        self.emit(Opcode::EvalLocal, vec![Operand::U8(key)]);
        self.emit(Opcode::EvalLocal, vec![Operand::U8(array)]);
        self.call_builtin("getnextarraykey", 2);
        self.emit(Opcode::EvalLocalRef, vec![Operand::U8(key)]);
        self.op(Opcode::SetVariable);
        self.jump(Opcode::Jump, start);
        self.bind(end);
    }

    /// Push a reference to an assignable location.
    ///
    /// With `defining`, a bare identifier creates its local.
    fn lower_ref(&mut self, target: &Spanned<Expr>, defining: bool) {
        match &target.node {
            Expr::Ident(name) => {
                let slot = if defining {
                    Some(self.define_local(name, target.span))
                } else {
                    self.locals.lookup(name)
                };
                match slot {
                    Some(slot) => self.emit(Opcode::EvalLocalRef, vec![Operand::U8(slot)]),
                    None => self.error(target.span, format!("'{name}' is used before being assigned")),
                }
            }
            Expr::Field(_, field) if field == "size" => {
                self.error(target.span, "'size' cannot be assigned");
            }
            Expr::Field(object, field) => {
                self.lower_expr(object);
                self.emit(Opcode::EvalFieldRef, vec![Operand::Str(field.clone())]);
            }
            Expr::Index(base, index) => {
                self.lower_expr(index);
                self.lower_ref(base, defining);
                self.op(Opcode::EvalArrayRef);
            }
            _ => self.error(target.span, "invalid assignment target"),
        }
    }

    // ---------------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------------

    fn lower_expr(&mut self, expr: &Spanned<Expr>) {
        match &expr.node {
            Expr::Int(value) => self.lower_int(*value, expr.span),
            Expr::Float(value) => self.emit(Opcode::GetFloat, vec![Operand::F32(*value)]),
            Expr::String(s) => self.emit(Opcode::GetString, vec![Operand::Str(s.clone())]),
            Expr::IString(s) => self.emit(Opcode::GetIString, vec![Operand::Str(s.clone())]),
            Expr::Undefined => self.op(Opcode::GetUndefined),
            Expr::Bool(true) => self.emit(Opcode::GetByte, vec![Operand::U8(1)]),
            Expr::Bool(false) => self.op(Opcode::GetZero),
            Expr::Level => self.op(Opcode::GetLevel),
            Expr::SelfRef => self.op(Opcode::GetSelf),
            Expr::Game => self.op(Opcode::GetGame),
            Expr::Anim => self.op(Opcode::GetAnim),
            Expr::EmptyArray => self.op(Opcode::GetEmptyArray),
            Expr::Vector(components) => {
                for component in components.iter() {
                    self.lower_expr(component);
                }
                self.op(Opcode::GetVector);
            }
            Expr::Ident(name) => match self.locals.lookup(name) {
                Some(slot) => self.emit(Opcode::EvalLocal, vec![Operand::U8(slot)]),
                None => self.error(expr.span, format!("'{name}' is used before being assigned")),
            },
            Expr::FunctionRef { path: None, name } => {
                if self.script_functions.contains_key(name) {
                    self.emit(Opcode::GetLocalFunction, vec![Operand::Str(name.clone())]);
                } else {
                    self.error(expr.span, format!("unknown function '::{name}'"));
                }
            }
            Expr::FunctionRef {
                path: Some(path),
                name,
            } => self.emit(
                Opcode::GetFarFunction,
                vec![Operand::Str(path.clone()), Operand::Str(name.clone())],
            ),
            Expr::Field(object, field) => {
                self.lower_expr(object);
                if field == "size" {
                    self.op(Opcode::EvalSize);
                } else {
                    self.emit(Opcode::EvalField, vec![Operand::Str(field.clone())]);
                }
            }
            Expr::Index(base, index) => {
                self.lower_expr(index);
                self.lower_expr(base);
                self.op(Opcode::EvalArray);
            }
            Expr::Call(call) => self.lower_call(call, expr.span),
            Expr::Unary(UnaryOp::Neg, operand) => match &operand.node {
                Expr::Int(value) => self.lower_int(-*value, expr.span),
                Expr::Float(value) => self.emit(Opcode::GetFloat, vec![Operand::F32(-*value)]),
                _ => {
                    self.op(Opcode::GetZero);
                    self.lower_expr(operand);
                    self.op(Opcode::Minus);
                }
            },
            Expr::Unary(UnaryOp::Not, operand) => {
                self.lower_expr(operand);
                self.op(Opcode::BoolNot);
            }
            Expr::Unary(UnaryOp::BitNot, operand) => {
                self.lower_expr(operand);
                self.op(Opcode::BoolComplement);
            }
            Expr::Binary(lhs, op @ (BinaryOp::And | BinaryOp::Or), rhs) => {
                let end = self.new_label();
                self.lower_expr(lhs);
                let jump = if *op == BinaryOp::And {
                    Opcode::JumpOnFalseExpr
                } else {
                    Opcode::JumpOnTrueExpr
                };
                self.jump(jump, end);
                self.lower_expr(rhs);
                self.bind(end);
            }
            Expr::Binary(lhs, op, rhs) => {
                self.lower_expr(lhs);
                self.lower_expr(rhs);
                if let Some(opcode) = binary_opcode(*op) {
                    self.op(opcode);
                }
            }
            Expr::Ternary {
                condition,
                then_expr,
                else_expr,
            } => {
                let else_label = self.new_label();
                let end = self.new_label();
                self.lower_expr(condition);
                self.jump(Opcode::JumpOnFalse, else_label);
                self.lower_expr(then_expr);
                self.jump(Opcode::Jump, end);
                self.bind(else_label);
                self.lower_expr(else_expr);
                self.bind(end);
            }
        }
    }

    /// Pick the narrowest constant encoding for an integer.
    fn lower_int(&mut self, value: i64, span: Span) {
        match value {
            0 => self.op(Opcode::GetZero),
            1..=255 => self.emit(Opcode::GetByte, vec![Operand::U8(value as u8)]),
            -255..=-1 => self.emit(Opcode::GetNegByte, vec![Operand::U8((-value) as u8)]),
            256..=65535 => self.emit(Opcode::GetUnsignedShort, vec![Operand::U16(value as u16)]),
            -65535..=-256 => {
                self.emit(Opcode::GetNegUnsignedShort, vec![Operand::U16((-value) as u16)])
            }
            _ => match i32::try_from(value) {
                Ok(v) => self.emit(Opcode::GetInteger, vec![Operand::I32(v)]),
                Err(_) => self.error(span, format!("integer literal {value} does not fit in 32 bits")),
            },
        }
    }

    fn lower_call(&mut self, call: &Call, span: Span) {
        if call.args.len() > MAX_ARGS {
            self.error(span, format!("too many arguments (limit is {MAX_ARGS})"));
            return;
        }
        let argc = call.args.len() as u8;
        let method = call.object.is_some();

        match &call.callee {
            Callee::Local(name) if self.script_functions.contains_key(name) => {
                let opcode = match (call.thread, method) {
                    (false, false) => Opcode::ScriptLocalCall,
                    (false, true) => Opcode::ScriptLocalMethodCall,
                    (true, false) => Opcode::ScriptLocalThreadCall,
                    (true, true) => Opcode::ScriptLocalMethodThreadCall,
                };
                let mut operands = vec![Operand::Str(name.clone())];
                if call.thread {
                    operands.push(Operand::U8(argc));
                }
                self.lower_script_call(call, None, opcode, operands);
            }
            Callee::Local(name) => {
                let known = if method {
                    is_builtin_method(name)
                } else {
                    is_builtin_function(name)
                };
                if !known {
                    self.diagnostics.push(
                        Diagnostic::error(format!("unknown function '{name}'"))
                            .with_span(span)
                            .with_note("functions from other scripts are called as path::name"),
                    );
                    return;
                }
                if call.thread {
                    self.error(span, format!("builtin '{name}' cannot be called with 'thread'"));
                    return;
                }
                for arg in call.args.iter().rev() {
                    self.lower_expr(arg);
                }
                if let Some(object) = &call.object {
                    self.lower_expr(object);
                }
                let opcode = if method {
                    Opcode::CallBuiltinMethod
                } else {
                    Opcode::CallBuiltin
                };
                self.emit(opcode, vec![Operand::Str(name.clone()), Operand::U8(argc)]);
            }
            Callee::Far { path, name } => {
                let opcode = match (call.thread, method) {
                    (false, false) => Opcode::ScriptFarCall,
                    (false, true) => Opcode::ScriptFarMethodCall,
                    (true, false) => Opcode::ScriptFarThreadCall,
                    (true, true) => Opcode::ScriptFarMethodThreadCall,
                };
                let mut operands = vec![Operand::Str(path.clone()), Operand::Str(name.clone())];
                if call.thread {
                    operands.push(Operand::U8(argc));
                }
                self.lower_script_call(call, None, opcode, operands);
            }
            Callee::Pointer(target) => {
                let opcode = match (call.thread, method) {
                    (false, false) => Opcode::ScriptPointerCall,
                    (false, true) => Opcode::ScriptPointerMethodCall,
                    (true, false) => Opcode::ScriptPointerThreadCall,
                    (true, true) => Opcode::ScriptPointerMethodThreadCall,
                };
                let operands = if call.thread {
                    vec![Operand::U8(argc)]
                } else {
                    Vec::new()
                };
                self.lower_script_call(call, Some(target), opcode, operands);
            }
        }
    }

    /// Arguments go on in reverse, then the object, then the pointer.
    /// Non-thread calls are preceded by a `PreScriptCall` marker.
    fn lower_script_call(
        &mut self,
        call: &Call,
        pointer: Option<&Spanned<Expr>>,
        opcode: Opcode,
        operands: Vec<Operand>,
    ) {
        if !call.thread {
            self.op(Opcode::PreScriptCall);
        }
        for arg in call.args.iter().rev() {
            self.lower_expr(arg);
        }
        if let Some(object) = &call.object {
            self.lower_expr(object);
        }
        if let Some(pointer) = pointer {
            self.lower_expr(pointer);
        }
        self.emit(opcode, operands);
    }
}

fn is_always_true(expr: &Spanned<Expr>) -> bool {
    matches!(expr.node, Expr::Int(v) if v != 0) || matches!(expr.node, Expr::Bool(true))
}

/// Opcode for a non-short-circuit binary operator.
fn binary_opcode(op: BinaryOp) -> Option<Opcode> {
    Some(match op {
        BinaryOp::Or | BinaryOp::And => return None,
        BinaryOp::BitOr => Opcode::BitOr,
        BinaryOp::BitXor => Opcode::BitExOr,
        BinaryOp::BitAnd => Opcode::BitAnd,
        BinaryOp::Eq => Opcode::Equality,
        BinaryOp::Neq => Opcode::Inequality,
        BinaryOp::Lt => Opcode::LessThan,
        BinaryOp::Gt => Opcode::GreaterThan,
        BinaryOp::Lte => Opcode::LessEqual,
        BinaryOp::Gte => Opcode::GreaterEqual,
        BinaryOp::Shl => Opcode::ShiftLeft,
        BinaryOp::Shr => Opcode::ShiftRight,
        BinaryOp::Add => Opcode::Plus,
        BinaryOp::Sub => Opcode::Minus,
        BinaryOp::Mul => Opcode::Multiply,
        BinaryOp::Div => Opcode::Divide,
        BinaryOp::Mod => Opcode::Modulus,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse;

    fn lower(source: &str) -> (IrModule, Diagnostics) {
        let file = parse(source).unwrap_or_else(|e| panic!("parse failed: {e}"));
        lower_file("test/script", &file)
    }

    fn lower_ok(source: &str) -> IrModule {
        let (module, diagnostics) = lower(source);
        assert!(!diagnostics.has_errors(), "unexpected errors:\n{diagnostics}");
        module
    }

    fn errors(source: &str) -> String {
        let (_, diagnostics) = lower(source);
        assert!(diagnostics.has_errors(), "expected errors for {source}");
        diagnostics.to_string()
    }

    fn opcodes(function: &IrFunction) -> Vec<Opcode> {
        function.instructions.iter().map(|i| i.opcode).collect()
    }

    #[test]
    fn test_lower_simple_function() {
        let module = lower_ok("main() { x = 1; wait x; }");
        let main = module.function("main").unwrap();
        assert_eq!(
            opcodes(main),
            [
                Opcode::CreateLocalVariables,
                Opcode::GetByte,
                Opcode::EvalLocalRef,
                Opcode::SetVariable,
                Opcode::EvalLocal,
                Opcode::Wait,
                Opcode::End,
            ]
        );
        assert_eq!(main.instructions[0].operands, [Operand::U8(0), Operand::U8(1)]);
        assert_eq!(main.locals, ["x"]);
    }

    #[test]
    fn test_integer_encoding() {
        let module = lower_ok(
            "f() { a = 0; a = 200; a = -200; a = 1000; a = -1000; a = 100000; a = -100000; }",
        );
        let constants: Vec<(Opcode, Vec<Operand>)> = module.functions[0]
            .instructions
            .iter()
            .filter(|i| i.opcode.mnemonic().starts_with("Get"))
            .map(|i| (i.opcode, i.operands.clone()))
            .collect();
        assert_eq!(
            constants,
            [
                (Opcode::GetZero, vec![]),
                (Opcode::GetByte, vec![Operand::U8(200)]),
                (Opcode::GetNegByte, vec![Operand::U8(200)]),
                (Opcode::GetUnsignedShort, vec![Operand::U16(1000)]),
                (Opcode::GetNegUnsignedShort, vec![Operand::U16(1000)]),
                (Opcode::GetInteger, vec![Operand::I32(100000)]),
                (Opcode::GetInteger, vec![Operand::I32(-100000)]),
            ]
        );
        assert!(errors("f() { a = 5000000000; }").contains("does not fit"));
    }

    #[test]
    fn test_call_forms() {
        let module = lower_ok(
            r#"
            helper(a) { return a; }
            main()
            {
                helper(1);
                self thread helper(2);
                isdefined(level.x);
                self setorigin((0, 0, 0));
                maps\mp\_utility::waitforever();
                [[ ::helper ]](3);
            }
            "#,
        );
        let ops = opcodes(module.function("main").unwrap());
        let calls: Vec<Opcode> = ops
            .iter()
            .copied()
            .filter(|op| {
                matches!(
                    op,
                    Opcode::ScriptLocalCall
                        | Opcode::ScriptLocalMethodThreadCall
                        | Opcode::CallBuiltin
                        | Opcode::CallBuiltinMethod
                        | Opcode::ScriptFarCall
                        | Opcode::ScriptPointerCall
                )
            })
            .collect();
        assert_eq!(
            calls,
            [
                Opcode::ScriptLocalCall,
                Opcode::ScriptLocalMethodThreadCall,
                Opcode::CallBuiltin,
                Opcode::CallBuiltinMethod,
                Opcode::ScriptFarCall,
                Opcode::ScriptPointerCall,
            ]
        );
        // Only non-thread script calls get a marker
        assert_eq!(ops.iter().filter(|op| **op == Opcode::PreScriptCall).count(), 3);
        assert_eq!(ops.iter().filter(|op| **op == Opcode::DecTop).count(), 6);

        let thread_call = module.function("main").unwrap().instructions.iter()
            .find(|i| i.opcode == Opcode::ScriptLocalMethodThreadCall)
            .unwrap();
        assert_eq!(thread_call.operands, [Operand::Str("helper".into()), Operand::U8(1)]);
    }

    #[test]
    fn test_short_circuit_and_labels() {
        let module = lower_ok("f(a, b) { if (a && b || !a) { wait 1; } else { wait 2; } }");
        let function = &module.functions[0];
        let ops = opcodes(function);
        assert!(ops.contains(&Opcode::JumpOnFalseExpr));
        assert!(ops.contains(&Opcode::JumpOnTrueExpr));
        assert!(function.labels.iter().all(Option::is_some));
    }

    #[test]
    fn test_infinite_loops_skip_condition() {
        let module = lower_ok("f() { while (1) { wait 1; } for (;;) { break; } }");
        let ops = opcodes(&module.functions[0]);
        assert!(!ops.contains(&Opcode::JumpOnFalse));
        assert_eq!(ops.iter().filter(|op| **op == Opcode::Jump).count(), 3);
    }

    #[test]
    fn test_foreach_and_waittill_define_locals() {
        let module = lower_ok(
            r#"f()
            {
                foreach (player in level.players)
                    player.score = 0;
                self waittill("damage", amount);
                wait amount;
            }"#,
        );
        let function = &module.functions[0];
        assert_eq!(function.locals, ["$array0", "$key0", "player", "amount"]);
        let ops = opcodes(function);
        assert!(ops.contains(&Opcode::SafeSetWaittillVariable));
        assert!(ops.contains(&Opcode::ClearParams));
    }

    #[test]
    fn test_semantic_errors() {
        assert!(errors("f() {} f() {}").contains("already defined"));
        assert!(errors("f(a, a) {}").contains("duplicate parameter"));
        assert!(errors("f() { break; }").contains("'break' outside of a loop"));
        assert!(errors("f() { continue; }").contains("'continue' outside of a loop"));
        assert!(errors("f() { wait x; }").contains("used before being assigned"));
        assert!(errors("f() { x = x + 1; }").contains("used before being assigned"));
        assert!(errors("f() { x++; }").contains("used before being assigned"));
        assert!(errors("f() { nothere(); }").contains("unknown function 'nothere'"));
        assert!(errors("f() { thread isdefined(1); }").contains("cannot be called with 'thread'"));
        assert!(errors("f() { 1 + 2; }").contains("must be a call"));
        assert!(errors("f() { g() = 1; } g() {}").contains("invalid assignment target"));
        assert!(errors("f() { level.size = 1; }").contains("'size' cannot be assigned"));
        assert!(errors("f() { x = ::missing; }").contains("unknown function '::missing'"));
    }

    #[test]
    fn test_too_many_locals() {
        let body: String = (0..256).map(|i| format!("v{i} = {i};")).collect();
        assert!(errors(&format!("f() {{ {body} }}")).contains("too many local variables"));

        let body: String = (0..255).map(|i| format!("v{i} = {i};")).collect();
        let module = lower_ok(&format!("f() {{ {body} }}"));
        assert_eq!(module.functions[0].instructions[0].operands[1], Operand::U8(255));
    }

    #[test]
    fn test_module_metadata() {
        let module = lower_ok("#include maps\\mp\\_utility;\n#using_animtree(\"mp\");\nmain() {}");
        assert_eq!(module.name, "test/script");
        assert_eq!(module.includes, ["maps/mp/_utility"]);
        assert_eq!(module.animtree.as_deref(), Some("mp"));
    }
}
