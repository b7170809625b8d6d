//! Parser implementation for GSC scripts.

use super::ast::{
    AssignOp, BinaryOp, Call, Callee, Expr, File, FunctionDecl, Spanned, Stmt, UnaryOp,
};
use crate::source::Span;
use pest::iterators::Pair;
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest::Parser;
use pest_derive::Parser;
use std::sync::LazyLock;

#[derive(Parser)]
#[grammar = "syntax/grammar.pest"]
struct GscParser;

/// Pratt parser for expression precedence.
static PRATT_PARSER: LazyLock<PrattParser<Rule>> = LazyLock::new(|| {
    PrattParser::new()
        // Lowest precedence
        .op(Op::infix(Rule::or, Assoc::Left))
        .op(Op::infix(Rule::and, Assoc::Left))
        .op(Op::infix(Rule::bitor, Assoc::Left))
        .op(Op::infix(Rule::bitxor, Assoc::Left))
        .op(Op::infix(Rule::bitand, Assoc::Left))
        .op(Op::infix(Rule::eq, Assoc::Left) | Op::infix(Rule::neq, Assoc::Left))
        .op(Op::infix(Rule::lt, Assoc::Left)
            | Op::infix(Rule::gt, Assoc::Left)
            | Op::infix(Rule::lte, Assoc::Left)
            | Op::infix(Rule::gte, Assoc::Left))
        .op(Op::infix(Rule::shl, Assoc::Left) | Op::infix(Rule::shr, Assoc::Left))
        .op(Op::infix(Rule::add, Assoc::Left) | Op::infix(Rule::sub, Assoc::Left))
        .op(Op::infix(Rule::mul, Assoc::Left)
            | Op::infix(Rule::div, Assoc::Left)
            | Op::infix(Rule::modulo, Assoc::Left))
        .op(Op::prefix(Rule::neg) | Op::prefix(Rule::not) | Op::prefix(Rule::bitnot))
        // Highest precedence
        .op(Op::postfix(Rule::member) | Op::postfix(Rule::index) | Op::postfix(Rule::method_call))
});

/// Parse error with source location.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("syntax error: {message} at line {line}, column {column}")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
        span: Option<Span>,
    },

    #[error("unexpected rule: expected {expected}, found {found}")]
    UnexpectedRule {
        expected: String,
        found: String,
        span: Option<Span>,
    },

    #[error("missing required element: {0}")]
    Missing(String),

    #[error("invalid number literal `{text}`")]
    InvalidNumber { text: String, span: Span },
}

impl ParseError {
    pub fn span(&self) -> Option<Span> {
        match self {
            ParseError::Syntax { span, .. } => *span,
            ParseError::UnexpectedRule { span, .. } => *span,
            ParseError::Missing(_) => None,
            ParseError::InvalidNumber { span, .. } => Some(*span),
        }
    }
}

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        let (line, column) = match err.line_col {
            pest::error::LineColLocation::Pos((l, c)) => (l, c),
            pest::error::LineColLocation::Span((l, c), _) => (l, c),
        };
        let offset = match err.location {
            pest::error::InputLocation::Pos(pos) => pos,
            pest::error::InputLocation::Span((start, _)) => start,
        };
        ParseError::Syntax {
            message: err.variant.message().to_string(),
            line,
            column,
            span: Some(Span::new(offset, offset + 1)),
        }
    }
}

/// Parse a script into a [`File`] AST.
pub fn parse(source: &str) -> Result<File, ParseError> {
    let mut pairs = GscParser::parse(Rule::file, source)?;
    let file_pair = pairs.next().ok_or(ParseError::Missing("file".into()))?;
    let mut file = File::default();

    for inner in file_pair.into_inner() {
        match inner.as_rule() {
            Rule::include_directive => {
                let path = next(&mut inner.into_inner(), "include path")?;
                file.includes
                    .push(Spanned::new(normalize_path(path.as_str()), span(&path)));
            }
            Rule::using_animtree => {
                let name = next(&mut inner.into_inner(), "animtree name")?;
                file.animtree = Some(Spanned::new(unquote(name.as_str()), span(&name)));
            }
            Rule::function_def => file.functions.push(parse_function(inner)?),
            Rule::EOI => {}
            _ => return Err(unexpected("top-level item", &inner)),
        }
    }

    Ok(file)
}

fn span(pair: &Pair<Rule>) -> Span {
    let pest_span = pair.as_span();
    Span::new(pest_span.start(), pest_span.end())
}

fn unexpected(expected: &str, pair: &Pair<Rule>) -> ParseError {
    ParseError::UnexpectedRule {
        expected: expected.into(),
        found: format!("{:?}", pair.as_rule()),
        span: Some(span(pair)),
    }
}

fn next<'i>(
    pairs: &mut impl Iterator<Item = Pair<'i, Rule>>,
    what: &str,
) -> Result<Pair<'i, Rule>, ParseError> {
    pairs.next().ok_or_else(|| ParseError::Missing(what.into()))
}

fn is_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_if
            | Rule::kw_else
            | Rule::kw_while
            | Rule::kw_for
            | Rule::kw_foreach
            | Rule::kw_in
            | Rule::kw_return
            | Rule::kw_wait
            | Rule::kw_waittillframeend
            | Rule::kw_waittill
            | Rule::kw_notify
            | Rule::kw_endon
            | Rule::kw_break
            | Rule::kw_continue
    )
}

/// Inner pairs with keyword tokens filtered out.
fn children<'i>(pair: Pair<'i, Rule>) -> impl Iterator<Item = Pair<'i, Rule>> {
    pair.into_inner().filter(|p| !is_keyword(p.as_rule()))
}

/// Identifiers are case-insensitive; everything is stored lowercase.
fn ident_text(pair: &Pair<Rule>) -> String {
    pair.as_str().to_ascii_lowercase()
}

/// Script paths accept `\` or `/` separators and are stored as lowercase `/`-paths.
pub(crate) fn normalize_path(path: &str) -> String {
    path.replace('\\', "/").to_ascii_lowercase()
}

fn unquote(literal: &str) -> String {
    let body = literal
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(literal);
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn parse_function(pair: Pair<Rule>) -> Result<FunctionDecl, ParseError> {
    let fn_span = span(&pair);
    let mut inner = pair.into_inner();
    let name = next(&mut inner, "function name")?;
    let params = next(&mut inner, "parameter list")?;
    let body = next(&mut inner, "function body")?;

    Ok(FunctionDecl {
        name: ident_text(&name),
        name_span: span(&name),
        params: params
            .into_inner()
            .map(|p| Spanned::new(ident_text(&p), span(&p)))
            .collect(),
        body: parse_block(body)?,
        span: fn_span,
    })
}

fn parse_block(pair: Pair<Rule>) -> Result<Vec<Spanned<Stmt>>, ParseError> {
    pair.into_inner().map(parse_stmt).collect()
}

fn parse_stmt(pair: Pair<Rule>) -> Result<Spanned<Stmt>, ParseError> {
    let stmt_span = span(&pair);
    let stmt = match pair.as_rule() {
        Rule::block => Stmt::Block(parse_block(pair)?),
        Rule::if_stmt => {
            let mut inner = children(pair);
            let condition = parse_expr(next(&mut inner, "if condition")?)?;
            let then_branch = Box::new(parse_stmt(next(&mut inner, "if body")?)?);
            let else_branch = inner.next().map(parse_stmt).transpose()?.map(Box::new);
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            }
        }
        Rule::while_stmt => {
            let mut inner = children(pair);
            let condition = parse_expr(next(&mut inner, "while condition")?)?;
            let body = Box::new(parse_stmt(next(&mut inner, "while body")?)?);
            Stmt::While { condition, body }
        }
        Rule::for_stmt => {
            let mut inner = children(pair);
            let init = parse_for_clause(next(&mut inner, "for initializer")?)?;
            let condition = next(&mut inner, "for condition")?
                .into_inner()
                .next()
                .map(parse_expr)
                .transpose()?;
            let step = parse_for_clause(next(&mut inner, "for step")?)?;
            let body = Box::new(parse_stmt(next(&mut inner, "for body")?)?);
            Stmt::For {
                init,
                condition,
                step,
                body,
            }
        }
        Rule::foreach_stmt => {
            let mut inner = children(pair);
            let variable = next(&mut inner, "foreach variable")?;
            let collection = parse_expr(next(&mut inner, "foreach collection")?)?;
            let body = Box::new(parse_stmt(next(&mut inner, "foreach body")?)?);
            Stmt::Foreach {
                variable: Spanned::new(ident_text(&variable), span(&variable)),
                collection,
                body,
            }
        }
        Rule::return_stmt => Stmt::Return(children(pair).next().map(parse_expr).transpose()?),
        Rule::wait_stmt => Stmt::Wait(parse_expr(next(&mut children(pair), "wait duration")?)?),
        Rule::waittillframeend_stmt => Stmt::WaitTillFrameEnd,
        Rule::break_stmt => Stmt::Break,
        Rule::continue_stmt => Stmt::Continue,
        Rule::empty_stmt => Stmt::Empty,
        Rule::waittill_stmt => {
            let mut inner = children(pair);
            let object = parse_expr(next(&mut inner, "waittill object")?)?;
            let event = parse_expr(next(&mut inner, "waittill event")?)?;
            let variables = inner.map(|p| Spanned::new(ident_text(&p), span(&p))).collect();
            Stmt::WaitTill {
                object,
                event,
                variables,
            }
        }
        Rule::notify_stmt => {
            let mut inner = children(pair);
            let object = parse_expr(next(&mut inner, "notify object")?)?;
            let event = parse_expr(next(&mut inner, "notify event")?)?;
            let args = inner.map(parse_expr).collect::<Result<_, _>>()?;
            Stmt::Notify {
                object,
                event,
                args,
            }
        }
        Rule::endon_stmt => {
            let mut inner = children(pair);
            let object = parse_expr(next(&mut inner, "endon object")?)?;
            let event = parse_expr(next(&mut inner, "endon event")?)?;
            Stmt::EndOn { object, event }
        }
        Rule::expr_stmt => parse_simple(next(&mut pair.into_inner(), "statement")?)?,
        _ => return Err(unexpected("statement", &pair)),
    };
    Ok(Spanned::new(stmt, stmt_span))
}

fn parse_for_clause(pair: Pair<Rule>) -> Result<Option<Box<Spanned<Stmt>>>, ParseError> {
    pair.into_inner()
        .next()
        .map(|simple| {
            let simple_span = span(&simple);
            parse_simple(simple).map(|stmt| Box::new(Spanned::new(stmt, simple_span)))
        })
        .transpose()
}

/// Assignment, increment/decrement, or bare expression.
fn parse_simple(pair: Pair<Rule>) -> Result<Stmt, ParseError> {
    match pair.as_rule() {
        Rule::assign_expr => {
            let mut inner = pair.into_inner();
            let target = parse_expr(next(&mut inner, "assignment target")?)?;
            let op_pair = next(&mut inner, "assignment operator")?;
            let op = match op_pair.as_str() {
                "=" => AssignOp::Assign,
                "+=" => AssignOp::Compound(BinaryOp::Add),
                "-=" => AssignOp::Compound(BinaryOp::Sub),
                "*=" => AssignOp::Compound(BinaryOp::Mul),
                "/=" => AssignOp::Compound(BinaryOp::Div),
                "%=" => AssignOp::Compound(BinaryOp::Mod),
                "|=" => AssignOp::Compound(BinaryOp::BitOr),
                "&=" => AssignOp::Compound(BinaryOp::BitAnd),
                "^=" => AssignOp::Compound(BinaryOp::BitXor),
                "<<=" => AssignOp::Compound(BinaryOp::Shl),
                ">>=" => AssignOp::Compound(BinaryOp::Shr),
                _ => return Err(unexpected("assignment operator", &op_pair)),
            };
            let value = parse_expr(next(&mut inner, "assigned value")?)?;
            Ok(Stmt::Assign { target, op, value })
        }
        Rule::incdec_expr => {
            let mut inner = pair.into_inner();
            let target = parse_expr(next(&mut inner, "increment target")?)?;
            let op = next(&mut inner, "increment operator")?;
            Ok(Stmt::IncDec {
                target,
                increment: op.as_str() == "++",
            })
        }
        Rule::expr => Ok(Stmt::Expr(parse_expr(pair)?)),
        _ => Err(unexpected("statement", &pair)),
    }
}

fn parse_expr(pair: Pair<Rule>) -> Result<Spanned<Expr>, ParseError> {
    let full_span = span(&pair);

    let mut pairs: Vec<Pair<Rule>> = pair.into_inner().collect();
    let ternary_suffix = match pairs.last() {
        Some(last) if last.as_rule() == Rule::ternary_suffix => pairs.pop(),
        _ => None,
    };

    let expr = PRATT_PARSER
        .map_primary(parse_primary)
        .map_prefix(|op, rhs| {
            let rhs = rhs?;
            let unary = match op.as_rule() {
                Rule::neg => UnaryOp::Neg,
                Rule::not => UnaryOp::Not,
                Rule::bitnot => UnaryOp::BitNot,
                _ => return Err(unexpected("prefix operator", &op)),
            };
            let combined = span(&op).merge(rhs.span);
            Ok(Spanned::new(Expr::Unary(unary, Box::new(rhs)), combined))
        })
        .map_postfix(|lhs, op| {
            let lhs = lhs?;
            let combined = lhs.span.merge(span(&op));
            let expr = match op.as_rule() {
                Rule::member => {
                    let field = next(&mut op.into_inner(), "field name")?;
                    Expr::Field(Box::new(lhs), ident_text(&field))
                }
                Rule::index => {
                    let index = parse_expr(next(&mut op.into_inner(), "index expression")?)?;
                    Expr::Index(Box::new(lhs), Box::new(index))
                }
                Rule::method_call => Expr::Call(Box::new(parse_call(op, Some(lhs))?)),
                _ => return Err(unexpected("postfix operator", &op)),
            };
            Ok(Spanned::new(expr, combined))
        })
        .map_infix(|lhs, op, rhs| {
            let lhs = lhs?;
            let rhs = rhs?;
            let binary = match op.as_rule() {
                Rule::or => BinaryOp::Or,
                Rule::and => BinaryOp::And,
                Rule::bitor => BinaryOp::BitOr,
                Rule::bitxor => BinaryOp::BitXor,
                Rule::bitand => BinaryOp::BitAnd,
                Rule::eq => BinaryOp::Eq,
                Rule::neq => BinaryOp::Neq,
                Rule::lt => BinaryOp::Lt,
                Rule::gt => BinaryOp::Gt,
                Rule::lte => BinaryOp::Lte,
                Rule::gte => BinaryOp::Gte,
                Rule::shl => BinaryOp::Shl,
                Rule::shr => BinaryOp::Shr,
                Rule::add => BinaryOp::Add,
                Rule::sub => BinaryOp::Sub,
                Rule::mul => BinaryOp::Mul,
                Rule::div => BinaryOp::Div,
                Rule::modulo => BinaryOp::Mod,
                _ => return Err(unexpected("infix operator", &op)),
            };
            let combined = lhs.span.merge(rhs.span);
            Ok(Spanned::new(
                Expr::Binary(Box::new(lhs), binary, Box::new(rhs)),
                combined,
            ))
        })
        .parse(pairs.into_iter())?;

    let Some(suffix) = ternary_suffix else {
        return Ok(expr);
    };
    let mut inner = suffix.into_inner();
    let then_expr = parse_expr(next(&mut inner, "then expression")?)?;
    let else_expr = parse_expr(next(&mut inner, "else expression")?)?;
    Ok(Spanned::new(
        Expr::Ternary {
            condition: Box::new(expr),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        },
        full_span,
    ))
}

fn parse_call(pair: Pair<Rule>, object: Option<Spanned<Expr>>) -> Result<Call, ParseError> {
    let mut thread = false;
    let mut callee = None;
    let mut args = Vec::new();

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::kw_thread => thread = true,
            Rule::local_callee => callee = Some(Callee::Local(ident_text(&inner))),
            Rule::far_callee => {
                let mut parts = inner.into_inner();
                let path = next(&mut parts, "script path")?;
                let name = next(&mut parts, "function name")?;
                callee = Some(Callee::Far {
                    path: normalize_path(path.as_str()),
                    name: ident_text(&name),
                });
            }
            Rule::pointer_callee => {
                let target = parse_expr(next(&mut inner.into_inner(), "function pointer")?)?;
                callee = Some(Callee::Pointer(Box::new(target)));
            }
            Rule::call_args => {
                for arg in inner.into_inner() {
                    args.push(parse_expr(arg)?);
                }
            }
            _ => return Err(unexpected("call", &inner)),
        }
    }

    Ok(Call {
        object,
        thread,
        callee: callee.ok_or(ParseError::Missing("callee".into()))?,
        args,
    })
}

fn parse_primary(pair: Pair<Rule>) -> Result<Spanned<Expr>, ParseError> {
    let primary_span = span(&pair);
    let expr = match pair.as_rule() {
        Rule::func_call => Expr::Call(Box::new(parse_call(pair, None)?)),
        Rule::func_ref => {
            let parts: Vec<Pair<Rule>> = pair.into_inner().collect();
            match parts.as_slice() {
                [name] => Expr::FunctionRef {
                    path: None,
                    name: ident_text(name),
                },
                [path, name] => Expr::FunctionRef {
                    path: Some(normalize_path(path.as_str())),
                    name: ident_text(name),
                },
                _ => return Err(ParseError::Missing("function reference name".into())),
            }
        }
        Rule::paren_or_vector => {
            let mut inner = pair.into_inner();
            let first = parse_expr(next(&mut inner, "expression")?)?;
            match (inner.next(), inner.next()) {
                (Some(y), Some(z)) => Expr::Vector(Box::new([first, parse_expr(y)?, parse_expr(z)?])),
                _ => first.node,
            }
        }
        Rule::empty_array => Expr::EmptyArray,
        Rule::number => parse_number(&pair)?,
        Rule::string => Expr::String(unquote(pair.as_str())),
        Rule::istring => {
            let literal = next(&mut pair.into_inner(), "localized string")?;
            Expr::IString(unquote(literal.as_str()))
        }
        Rule::undefined_lit => Expr::Undefined,
        Rule::true_lit => Expr::Bool(true),
        Rule::false_lit => Expr::Bool(false),
        Rule::level_lit => Expr::Level,
        Rule::self_lit => Expr::SelfRef,
        Rule::game_lit => Expr::Game,
        Rule::anim_lit => Expr::Anim,
        Rule::ident => Expr::Ident(ident_text(&pair)),
        _ => return Err(unexpected("expression", &pair)),
    };
    Ok(Spanned::new(expr, primary_span))
}

fn parse_number(pair: &Pair<Rule>) -> Result<Expr, ParseError> {
    let text = pair.as_str();
    let invalid = || ParseError::InvalidNumber {
        text: text.to_string(),
        span: span(pair),
    };
    if text.contains('.') {
        text.parse::<f32>().map(Expr::Float).map_err(|_| invalid())
    } else {
        text.parse::<i64>().map(Expr::Int).map_err(|_| invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(source: &str) -> Vec<Spanned<Stmt>> {
        let file = parse(source).unwrap_or_else(|e| panic!("parse failed: {e}"));
        file.functions.into_iter().next().expect("one function").body
    }

    fn single_expr(source: &str) -> Expr {
        match &body(&format!("f() {{ {source}; }}"))[0].node {
            Stmt::Expr(expr) => expr.node.clone(),
            Stmt::Assign { value, .. } => value.node.clone(),
            other => panic!("unexpected statement {other:?}"),
        }
    }

    #[test]
    fn test_parse_empty_file() {
        let file = parse("").unwrap();
        assert!(file.functions.is_empty());
        let file = parse("// just a comment\n/# dev block #/\n").unwrap();
        assert!(file.functions.is_empty());
    }

    #[test]
    fn test_parse_directives_and_functions() {
        let source = r#"
            #include maps\mp\_utility;
            #include common_scripts/utility;
            #using_animtree("multiplayer");

            main()
            {
            }

            Init(a, B)
            {
                wait 0.05;
            }
        "#;
        let file = parse(source).unwrap();
        let includes: Vec<&str> = file.includes.iter().map(|i| i.node.as_str()).collect();
        assert_eq!(includes, ["maps/mp/_utility", "common_scripts/utility"]);
        assert_eq!(file.animtree.as_deref().map(String::as_str), Some("multiplayer"));
        assert_eq!(file.functions.len(), 2);
        assert_eq!(file.functions[1].name, "init");
        let params: Vec<&str> = file.functions[1].params.iter().map(|p| p.node.as_str()).collect();
        assert_eq!(params, ["a", "b"]);
    }

    #[test]
    fn test_parse_precedence() {
        let expr = single_expr("x = 1 + 2 * 3");
        let Expr::Binary(lhs, BinaryOp::Add, rhs) = expr else {
            panic!("expected addition, got {expr:?}");
        };
        assert_eq!(lhs.node, Expr::Int(1));
        assert!(matches!(rhs.node, Expr::Binary(_, BinaryOp::Mul, _)));

        let expr = single_expr("x = a || b && c");
        assert!(matches!(expr, Expr::Binary(_, BinaryOp::Or, _)));

        let expr = single_expr("x = a == b & c");
        assert!(matches!(expr, Expr::Binary(_, BinaryOp::BitAnd, _)));
    }

    #[test]
    fn test_parse_unary_binds_looser_than_member() {
        let expr = single_expr("x = -self.health");
        let Expr::Unary(UnaryOp::Neg, operand) = expr else {
            panic!("expected negation");
        };
        assert!(matches!(operand.node, Expr::Field(_, ref f) if f == "health"));
    }

    #[test]
    fn test_parse_ternary() {
        let expr = single_expr("x = a > 1 ? \"big\" : \"small\"");
        let Expr::Ternary { condition, then_expr, .. } = expr else {
            panic!("expected ternary");
        };
        assert!(matches!(condition.node, Expr::Binary(_, BinaryOp::Gt, _)));
        assert_eq!(then_expr.node, Expr::String("big".into()));
    }

    #[test]
    fn test_parse_call_forms() {
        let Expr::Call(call) = single_expr("self thread maps\\mp\\_utility::foo(1, 2)") else {
            panic!("expected call");
        };
        assert!(call.thread);
        assert_eq!(call.object.as_ref().map(|o| &o.node), Some(&Expr::SelfRef));
        assert_eq!(
            call.callee,
            Callee::Far {
                path: "maps/mp/_utility".into(),
                name: "foo".into()
            }
        );
        assert_eq!(call.args.len(), 2);

        let Expr::Call(call) = single_expr("[[ level.callback ]](\"x\")") else {
            panic!("expected pointer call");
        };
        assert!(matches!(call.callee, Callee::Pointer(_)));
        assert!(call.object.is_none());

        let Expr::Call(call) = single_expr("thread Watch()") else {
            panic!("expected thread call");
        };
        assert!(call.thread);
        assert_eq!(call.callee, Callee::Local("watch".into()));
    }

    #[test]
    fn test_parse_function_refs_and_literals() {
        assert_eq!(
            single_expr("x = ::onPlayerConnect"),
            Expr::FunctionRef {
                path: None,
                name: "onplayerconnect".into()
            }
        );
        assert_eq!(
            single_expr("x = maps\\mp\\_load::main"),
            Expr::FunctionRef {
                path: Some("maps/mp/_load".into()),
                name: "main".into()
            }
        );
        assert_eq!(single_expr("x = &\"MP_HELLO\""), Expr::IString("MP_HELLO".into()));
        assert_eq!(single_expr("x = \"a\\\"b\\n\""), Expr::String("a\"b\n".into()));
        assert_eq!(single_expr("x = 0.5"), Expr::Float(0.5));
        assert_eq!(single_expr("x = []"), Expr::EmptyArray);
        assert!(matches!(single_expr("x = (1, 2, 3)"), Expr::Vector(_)));
        assert_eq!(single_expr("x = (7)"), Expr::Int(7));
    }

    #[test]
    fn test_parse_deeply_nested_parens() {
        let depth = 64;
        let source = format!("x = {}1{}", "(".repeat(depth), ")".repeat(depth));
        assert_eq!(single_expr(&source), Expr::Int(1));

        let source = format!("x = {}(1, 2, 3){}", "(".repeat(depth), ")".repeat(depth));
        assert!(matches!(single_expr(&source), Expr::Vector(_)));
    }

    #[test]
    fn test_parse_statements() {
        let stmts = body(
            r#"f() {
                for (;;) { break; }
                for (i = 0; i < 3; i++) continue;
                foreach (p in level.players) p.score += 1;
                self waittill("damage", amount, attacker);
                level notify("go", 1);
                self endon("death");
                if (x) y = 1; else y = 2;
                while (1) waittillframeend;
                return;
            }"#,
        );
        assert!(matches!(
            &stmts[0].node,
            Stmt::For { init: None, condition: None, step: None, .. }
        ));
        assert!(matches!(
            &stmts[1].node,
            Stmt::For { init: Some(_), condition: Some(_), step: Some(_), .. }
        ));
        assert!(matches!(&stmts[2].node, Stmt::Foreach { variable, .. } if variable.node == "p"));
        let Stmt::WaitTill { variables, .. } = &stmts[3].node else {
            panic!("expected waittill");
        };
        assert_eq!(variables.len(), 2);
        assert!(matches!(&stmts[4].node, Stmt::Notify { args, .. } if args.len() == 1));
        assert!(matches!(&stmts[5].node, Stmt::EndOn { .. }));
        assert!(matches!(&stmts[6].node, Stmt::If { else_branch: Some(_), .. }));
        assert!(matches!(&stmts[7].node, Stmt::While { .. }));
        assert!(matches!(&stmts[8].node, Stmt::Return(None)));
    }

    #[test]
    fn test_parse_assignment_operators() {
        let stmts = body("f() { a <<= 1; b ^= 2; c--; }");
        assert!(matches!(
            &stmts[0].node,
            Stmt::Assign { op: AssignOp::Compound(BinaryOp::Shl), .. }
        ));
        assert!(matches!(
            &stmts[1].node,
            Stmt::Assign { op: AssignOp::Compound(BinaryOp::BitXor), .. }
        ));
        assert!(matches!(&stmts[2].node, Stmt::IncDec { increment: false, .. }));
    }

    #[test]
    fn test_parse_error_location() {
        let err = parse("main()\n{\n  x = ;\n}\n").unwrap_err();
        match err {
            ParseError::Syntax { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(parse("main() { wait = 1; }").is_err());
        assert!(parse("main() {").is_err());
    }

    #[test]
    fn test_parse_keyword_prefixed_identifiers() {
        let stmts = body("f() { threads = 1; waiter = iffy; }");
        assert_eq!(stmts.len(), 2);
    }
}
