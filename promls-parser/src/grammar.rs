use std::time::Duration;

use crate::ast::{
    AggregateExpr, AggregateOp, AtModifier, BinModifiers, BinaryExpr, BinaryOp, Call, Expr,
    Grouping, LabelMatcher, MatchCardinality, MatchOp, MatrixSelector, NumberLiteral, Offset,
    ParenExpr, Span, StringLiteral, SubqueryExpr, UnaryExpr, UnaryOp, VectorMatching,
    VectorSelector,
};
use crate::duration::parse_duration;

/// Modifiers that may follow a primary expression, in source order.
#[derive(Debug)]
enum Suffix {
    Range(Duration),
    Subquery(Duration, Option<Duration>),
    Offset(Offset),
    At(AtModifier),
}

peg::parser! {
    pub(crate) grammar promql() for str {
        pub(crate) rule query() -> Expr
            = _ e:expr() _ { e }

        // Binary operators from lowest to highest precedence. Unary operators bind tighter
        // than `*` but looser than `^`, so both live below the climbing table.
        rule expr() -> Expr = precedence! {
            x:(@) _ p:position!() keyword("or") q:position!() _ m:bin_modifiers() y:@ {
                binary(BinaryOp::Or, Span::new(p, q), x, y, m)
            }
            --
            x:(@) _ p:position!() keyword("and") q:position!() _ m:bin_modifiers() y:@ {
                binary(BinaryOp::And, Span::new(p, q), x, y, m)
            }
            x:(@) _ p:position!() keyword("unless") q:position!() _ m:bin_modifiers() y:@ {
                binary(BinaryOp::Unless, Span::new(p, q), x, y, m)
            }
            --
            x:(@) _ p:position!() op:comparison_op() q:position!() _ m:bin_modifiers() y:@ {
                binary(op, Span::new(p, q), x, y, m)
            }
            --
            x:(@) _ p:position!() "+" q:position!() _ m:bin_modifiers() y:@ {
                binary(BinaryOp::Add, Span::new(p, q), x, y, m)
            }
            x:(@) _ p:position!() "-" q:position!() _ m:bin_modifiers() y:@ {
                binary(BinaryOp::Sub, Span::new(p, q), x, y, m)
            }
            --
            x:(@) _ p:position!() "*" q:position!() _ m:bin_modifiers() y:@ {
                binary(BinaryOp::Mul, Span::new(p, q), x, y, m)
            }
            x:(@) _ p:position!() "/" q:position!() _ m:bin_modifiers() y:@ {
                binary(BinaryOp::Div, Span::new(p, q), x, y, m)
            }
            x:(@) _ p:position!() "%" q:position!() _ m:bin_modifiers() y:@ {
                binary(BinaryOp::Mod, Span::new(p, q), x, y, m)
            }
            x:(@) _ p:position!() keyword("atan2") q:position!() _ m:bin_modifiers() y:@ {
                binary(BinaryOp::Atan2, Span::new(p, q), x, y, m)
            }
            --
            u:unary() { u }
        }

        rule unary() -> Expr
            = s:position!() op:$("-" / "+") _ e:unary() { unary(s, op, e) }
            / power()

        // `^` is right associative and its right hand side may carry a sign: `2 ^ -1`.
        rule power() -> Expr
            = x:postfix() rhs:(_ p:position!() "^" q:position!() _ m:bin_modifiers() y:unary() {
                (Span::new(p, q), m, y)
            })? {
                match rhs {
                    Some((op_span, m, y)) => binary(BinaryOp::Pow, op_span, x, y, m),
                    None => x,
                }
            }

        rule postfix() -> Expr
            = e:primary() suffixes:(_ s:suffix() end:position!() { (s, end) })* {?
                apply_suffixes(e, suffixes)
            }

        rule suffix() -> Suffix
            = "[" _ range:duration() _ "]" { Suffix::Range(range) }
            / "[" _ range:duration() _ ":" _ step:duration()? _ "]" { Suffix::Subquery(range, step) }
            / keyword("offset") _ neg:("-" _)? duration:duration() {
                Suffix::Offset(Offset { duration, negative: neg.is_some() })
            }
            / "@" _ at:at_value() { Suffix::At(at) }

        rule at_value() -> AtModifier
            = keyword("start") _ "(" _ ")" { AtModifier::Start }
            / keyword("end") _ "(" _ ")" { AtModifier::End }
            / neg:"-"? n:number() { AtModifier::Timestamp(if neg.is_some() { -n } else { n }) }

        rule primary() -> Expr
            = paren()
            / number_literal()
            / string_literal()
            / aggregate()
            / call()
            / vector_selector()

        rule paren() -> Expr
            = s:position!() "(" _ e:expr() _ ")" end:position!() {
                Expr::ParenExpr(ParenExpr { expr: Box::new(e), span: Span::new(s, end) })
            }

        rule aggregate() -> Expr
            = s:position!() op:aggregate_op() op_end:position!() _ g:grouping() _ args:call_args() end:position!() {?
                aggregate(op, Span::new(s, op_end), args.0, Some(g), Span::new(s, end))
            }
            / s:position!() op:aggregate_op() op_end:position!() _ args:call_args() g:(_ g:grouping() { g })? end:position!() {?
                aggregate(op, Span::new(s, op_end), args.0, g, Span::new(s, end))
            }

        rule aggregate_op() -> AggregateOp
            = name:$(ident()) {?
                AggregateOp::from_name(&name.to_ascii_lowercase()).ok_or("aggregation operator")
            }

        rule grouping() -> Grouping
            = without:(keyword("by") { false } / keyword("without") { true }) _ labels:label_list() {
                Grouping { without, labels }
            }

        rule call() -> Expr
            = s:position!() name:$(ident()) name_end:position!() _ args:call_args() {
                let (args, args_span) = args;
                Expr::Call(Call {
                    func: name.to_string(),
                    name_span: Span::new(s, name_end),
                    args,
                    args_span,
                    span: Span::new(s, args_span.end),
                })
            }

        rule call_args() -> (Vec<Expr>, Span)
            = s:position!() "(" _ args:(expr() ** (_ "," _)) _ ")" end:position!() {
                (args, Span::new(s, end))
            }

        rule vector_selector() -> Expr
            = s:position!() name:$(metric_ident()) name_end:position!() ms:(_ m:label_matchers() { m })? end:position!() {
                selector(Some((name, Span::new(s, name_end))), ms, Span::new(s, end))
            }
            / s:position!() ms:label_matchers() end:position!() {
                selector(None, Some(ms), Span::new(s, end))
            }

        rule label_matchers() -> (Vec<LabelMatcher>, Span)
            = s:position!() "{" _ ms:(label_matcher() ** (_ "," _)) _ ","? _ "}" end:position!() {
                (ms, Span::new(s, end))
            }

        rule label_matcher() -> LabelMatcher
            = s:position!() name:$(ident()) name_end:position!() _ op:match_op() _ vs:position!() value:string() end:position!() {
                LabelMatcher {
                    name: name.to_string(),
                    name_span: Span::new(s, name_end),
                    op,
                    value,
                    value_span: Span::new(vs, end),
                    span: Span::new(s, end),
                }
            }

        rule match_op() -> MatchOp
            = "=~" { MatchOp::Regex }
            / "!~" { MatchOp::NotRegex }
            / "!=" { MatchOp::NotEqual }
            / "=" { MatchOp::Equal }

        rule bin_modifiers() -> BinModifiers
            = b:(keyword("bool") _)? m:(m:vector_matching() _ { m })? {
                BinModifiers { return_bool: b.is_some(), matching: m }
            }

        rule vector_matching() -> VectorMatching
            = on:(keyword("on") { true } / keyword("ignoring") { false }) _ labels:label_list()
              group:(_ g:group_modifier() { g })? {
                let (card, include) = group.unwrap_or((MatchCardinality::OneToOne, Vec::new()));
                VectorMatching { on, labels, card, include }
            }

        rule group_modifier() -> (MatchCardinality, Vec<String>)
            = card:(keyword("group_left") { MatchCardinality::ManyToOne }
                / keyword("group_right") { MatchCardinality::OneToMany })
              include:(_ l:label_list() { l })? {
                (card, include.unwrap_or_default())
            }

        rule label_list() -> Vec<String>
            = "(" _ labels:(label_name() ** (_ "," _)) _ ","? _ ")" { labels }

        rule label_name() -> String
            = n:$(ident()) { n.to_string() }

        rule comparison_op() -> BinaryOp
            = op:$("==" / "!=" / "<=" / ">=" / "<" / ">") {?
                BinaryOp::from_comparison(op).ok_or("comparison operator")
            }

        rule number_literal() -> Expr
            = s:position!() value:number() end:position!() {
                Expr::NumberLiteral(NumberLiteral { value, span: Span::new(s, end) })
            }

        rule number() -> f64
            = quiet!{
                "0" ['x' | 'X'] h:$(['0'..='9' | 'a'..='f' | 'A'..='F']+) !ident_char() {?
                    u64::from_str_radix(h, 16).map(|v| v as f64).map_err(|_| "hexadecimal number")
                }
                / n:$((['0'..='9']+ ("." ['0'..='9']*)? / "." ['0'..='9']+) (['e' | 'E'] ['+' | '-']? ['0'..='9']+)?) !ident_char() {?
                    n.parse::<f64>().map_err(|_| "number")
                }
                / ['i' | 'I'] ['n' | 'N'] ['f' | 'F'] !ident_char() { f64::INFINITY }
                / ['n' | 'N'] ['a' | 'A'] ['n' | 'N'] !ident_char() { f64::NAN }
            }
            / expected!("number")

        rule string_literal() -> Expr
            = s:position!() value:string() end:position!() {
                Expr::StringLiteral(StringLiteral { value, span: Span::new(s, end) })
            }

        rule string() -> String
            = quiet!{
                "\"" cs:dq_char()* "\"" { cs.into_iter().collect() }
                / "'" cs:sq_char()* "'" { cs.into_iter().collect() }
                / "`" raw:$([^ '`']*) "`" { raw.to_string() }
            }
            / expected!("string")

        rule dq_char() -> char
            = "\\" c:escape() { c }
            / [^ '"' | '\\' | '\n']

        rule sq_char() -> char
            = "\\" c:escape() { c }
            / [^ '\'' | '\\' | '\n']

        rule escape() -> char
            = "n" { '\n' }
            / "t" { '\t' }
            / "r" { '\r' }
            / "a" { '\u{07}' }
            / "b" { '\u{08}' }
            / "f" { '\u{0C}' }
            / "v" { '\u{0B}' }
            / "\\" { '\\' }
            / "\"" { '"' }
            / "'" { '\'' }
            / "u" h:$(['0'..='9' | 'a'..='f' | 'A'..='F']*<4,4>) {?
                u32::from_str_radix(h, 16).ok().and_then(char::from_u32).ok_or("unicode escape")
            }

        rule duration() -> Duration
            = quiet!{
                d:$((['0'..='9']+ ("ms" / ['s' | 'm' | 'h' | 'd' | 'w' | 'y']))+) {?
                    parse_duration(d).map_err(|_| "duration")
                }
            }
            / expected!("duration")

        rule ident() = ['a'..='z' | 'A'..='Z' | '_'] ['a'..='z' | 'A'..='Z' | '0'..='9' | '_']*

        rule metric_ident()
            = !reserved() ['a'..='z' | 'A'..='Z' | '_' | ':'] ['a'..='z' | 'A'..='Z' | '0'..='9' | '_' | ':']*

        rule ident_char() = ['a'..='z' | 'A'..='Z' | '0'..='9' | '_' | ':']

        rule reserved()
            = keyword("and") / keyword("or") / keyword("unless") / keyword("atan2")
            / keyword("by") / keyword("without") / keyword("on") / keyword("ignoring")
            / keyword("group_left") / keyword("group_right") / keyword("bool") / keyword("offset")

        // Keywords are case insensitive and must not run into an identifier.
        rule keyword(kw: &'static str)
            = input:quiet!{ $([_]*<{kw.len()}>) } !ident_char() {?
                if input.eq_ignore_ascii_case(kw) { Ok(()) } else { Err(kw) }
            }

        rule _() = quiet!{ ([' ' | '\t' | '\n' | '\r'] / "#" [^ '\n']*)* }
    }
}

fn binary(op: BinaryOp, op_span: Span, lhs: Expr, rhs: Expr, modifiers: BinModifiers) -> Expr {
    let span = Span::new(lhs.span().start, rhs.span().end);
    Expr::BinaryExpr(BinaryExpr {
        op,
        op_span,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
        modifiers,
        span,
    })
}

/// Signs in front of number literals are folded into the literal.
fn unary(start: usize, op: &str, expr: Expr) -> Expr {
    let span = Span::new(start, expr.span().end);
    let op = if op == "-" { UnaryOp::Neg } else { UnaryOp::Pos };
    match expr {
        Expr::NumberLiteral(number) => Expr::NumberLiteral(NumberLiteral {
            value: match op {
                UnaryOp::Neg => -number.value,
                UnaryOp::Pos => number.value,
            },
            span,
        }),
        other @ (Expr::StringLiteral(_)
        | Expr::VectorSelector(_)
        | Expr::MatrixSelector(_)
        | Expr::Call(_)
        | Expr::BinaryExpr(_)
        | Expr::AggregateExpr(_)
        | Expr::ParenExpr(_)
        | Expr::SubqueryExpr(_)
        | Expr::UnaryExpr(_)) => Expr::UnaryExpr(UnaryExpr {
            op,
            expr: Box::new(other),
            span,
        }),
    }
}

fn selector(
    name: Option<(&str, Span)>,
    matchers: Option<(Vec<LabelMatcher>, Span)>,
    span: Span,
) -> Expr {
    let (matchers, matchers_span) = match matchers {
        Some((matchers, matchers_span)) => (matchers, Some(matchers_span)),
        None => (Vec::new(), None),
    };
    Expr::VectorSelector(VectorSelector {
        name: name.map(|(name, _)| name.to_string()),
        name_span: name.map(|(_, span)| span),
        matchers,
        matchers_span,
        offset: None,
        at: None,
        span,
    })
}

fn aggregate(
    op: AggregateOp,
    op_span: Span,
    args: Vec<Expr>,
    grouping: Option<Grouping>,
    span: Span,
) -> Result<Expr, &'static str> {
    let mut args = args.into_iter();
    let (param, expr) = match (args.next(), args.next(), args.next()) {
        (Some(expr), None, None) => (None, expr),
        (Some(param), Some(expr), None) => (Some(Box::new(param)), expr),
        (None, _, _) => return Err("aggregation argument"),
        (Some(_), Some(_), Some(_)) | (Some(_), None, Some(_)) => {
            return Err("at most two aggregation arguments");
        }
    };
    Ok(Expr::AggregateExpr(AggregateExpr {
        op,
        op_span,
        expr: Box::new(expr),
        param,
        grouping,
        span,
    }))
}

fn apply_suffixes(expr: Expr, suffixes: Vec<(Suffix, usize)>) -> Result<Expr, &'static str> {
    suffixes
        .into_iter()
        .try_fold(expr, |expr, (suffix, end)| apply_suffix(expr, suffix, end))
}

#[allow(clippy::wildcard_enum_match_arm)]
fn apply_suffix(mut expr: Expr, suffix: Suffix, end: usize) -> Result<Expr, &'static str> {
    let start = expr.span().start;
    match suffix {
        Suffix::Range(range) => match expr {
            Expr::VectorSelector(vs) if vs.offset.is_none() && vs.at.is_none() => {
                Ok(Expr::MatrixSelector(MatrixSelector {
                    vector: Box::new(Expr::VectorSelector(vs)),
                    range,
                    span: Span::new(start, end),
                }))
            }
            _ => Err("vector selector without modifiers before range"),
        },
        Suffix::Subquery(range, step) => Ok(Expr::SubqueryExpr(SubqueryExpr {
            expr: Box::new(expr),
            range,
            step,
            offset: None,
            at: None,
            span: Span::new(start, end),
        })),
        Suffix::Offset(offset) => {
            let slot = match &mut expr {
                Expr::VectorSelector(vs) => &mut vs.offset,
                Expr::MatrixSelector(ms) => match ms.vector.as_mut() {
                    Expr::VectorSelector(vs) => &mut vs.offset,
                    _ => return Err("selector or subquery before offset"),
                },
                Expr::SubqueryExpr(sq) => &mut sq.offset,
                _ => return Err("selector or subquery before offset"),
            };
            if slot.is_some() {
                return Err("a single offset modifier");
            }
            *slot = Some(offset);
            expr.set_span_end(end);
            Ok(expr)
        }
        Suffix::At(at) => {
            let slot = match &mut expr {
                Expr::VectorSelector(vs) => &mut vs.at,
                Expr::MatrixSelector(ms) => match ms.vector.as_mut() {
                    Expr::VectorSelector(vs) => &mut vs.at,
                    _ => return Err("selector or subquery before @"),
                },
                Expr::SubqueryExpr(sq) => &mut sq.at,
                _ => return Err("selector or subquery before @"),
            };
            if slot.is_some() {
                return Err("a single @ modifier");
            }
            *slot = Some(at);
            expr.set_span_end(end);
            Ok(expr)
        }
    }
}
