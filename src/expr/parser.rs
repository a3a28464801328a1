//! A `nom`-based parser for the property expression language, a safe
//! subset of Python expression syntax.
use super::ast::{BinaryOp, CompareOp, Expr, UnaryOp};
use super::error::ExprError;
use super::value::Value;
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{char, multispace0, satisfy},
    combinator::{map, not, opt, recognize, value, verify},
    error::{Error, ErrorKind},
    multi::{many0, many1, separated_list0},
    sequence::{delimited, pair, preceded, terminated},
};

const KEYWORDS: &[&str] = &[
    "and", "or", "not", "in", "is", "if", "else", "None", "True", "False", "lambda", "for",
];

// --- Main Public Parser ---

pub fn parse_expression(input: &str) -> Result<Expr, ExprError> {
    match expression_list(input) {
        Ok((rest, expr)) if rest.trim().is_empty() => Ok(expr),
        Ok((rest, _)) => Err(ExprError::Syntax {
            expr: input.to_string(),
            message: format!("unexpected input at '{}'", rest.trim()),
        }),
        Err(e) => Err(ExprError::Syntax {
            expr: input.to_string(),
            message: e.to_string(),
        }),
    }
}

// --- Combinators & Helpers ---

fn ws<'a, F, O, E>(inner: F) -> impl Parser<&'a str, Output = O, Error = E>
where
    F: Parser<&'a str, Output = O, Error = E>,
    E: nom::error::ParseError<&'a str>,
{
    delimited(multispace0, inner, multispace0)
}

fn sym<'a>(token: &'static str) -> impl Parser<&'a str, Output = &'a str, Error = Error<&'a str>> {
    ws(tag(token))
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn keyword<'a>(word: &'static str) -> impl Parser<&'a str, Output = &'a str, Error = Error<&'a str>> {
    ws(terminated(tag(word), not(satisfy(is_ident_char))))
}

fn fail<T>(input: &str, kind: ErrorKind) -> IResult<&str, T> {
    Err(nom::Err::Error(Error::new(input, kind)))
}

fn boxed(expr: Expr) -> Box<Expr> {
    Box::new(expr)
}

// --- Expression Parsers (in order of precedence) ---

/// Comma-separated expressions; more than one, or a trailing comma, makes
/// a tuple.
fn expression_list(input: &str) -> IResult<&str, Expr> {
    let (input, first) = expression(input)?;
    let (input, rest) = many0(preceded(sym(","), expression)).parse(input)?;
    let (input, trailing) = opt(sym(",")).parse(input)?;
    if rest.is_empty() && trailing.is_none() {
        return Ok((input, first));
    }
    let mut items = vec![first];
    items.extend(rest);
    Ok((input, Expr::Tuple(items)))
}

fn expression(input: &str) -> IResult<&str, Expr> {
    let (input, body) = or_test(input)?;
    let (input, branch) = opt(pair(
        preceded(keyword("if"), or_test),
        preceded(keyword("else"), expression),
    ))
    .parse(input)?;
    let expr = match branch {
        Some((test, orelse)) => Expr::Conditional {
            test: boxed(test),
            body: boxed(body),
            orelse: boxed(orelse),
        },
        None => body,
    };
    Ok((input, expr))
}

fn or_test(input: &str) -> IResult<&str, Expr> {
    let (input, first) = and_test(input)?;
    let (input, rest) = many0(preceded(keyword("or"), and_test)).parse(input)?;
    let expr = rest
        .into_iter()
        .fold(first, |left, right| Expr::Or(boxed(left), boxed(right)));
    Ok((input, expr))
}

fn and_test(input: &str) -> IResult<&str, Expr> {
    let (input, first) = not_test(input)?;
    let (input, rest) = many0(preceded(keyword("and"), not_test)).parse(input)?;
    let expr = rest
        .into_iter()
        .fold(first, |left, right| Expr::And(boxed(left), boxed(right)));
    Ok((input, expr))
}

fn not_test(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(keyword("not"), not_test), |operand| Expr::Unary {
            op: UnaryOp::Not,
            operand: boxed(operand),
        }),
        comparison,
    ))
    .parse(input)
}

fn compare_op(input: &str) -> IResult<&str, CompareOp> {
    alt((
        value(CompareOp::Eq, sym("==")),
        value(CompareOp::Ne, sym("!=")),
        value(CompareOp::Ne, sym("<>")),
        value(CompareOp::Le, sym("<=")),
        value(CompareOp::Ge, sym(">=")),
        value(CompareOp::Lt, sym("<")),
        value(CompareOp::Gt, sym(">")),
        value(CompareOp::NotIn, pair(keyword("not"), keyword("in"))),
        value(CompareOp::In, keyword("in")),
        value(CompareOp::IsNot, pair(keyword("is"), keyword("not"))),
        value(CompareOp::Is, keyword("is")),
    ))
    .parse(input)
}

fn comparison(input: &str) -> IResult<&str, Expr> {
    let (input, left) = arith_expr(input)?;
    let (input, rest) = many0(pair(compare_op, arith_expr)).parse(input)?;
    if rest.is_empty() {
        return Ok((input, left));
    }
    Ok((
        input,
        Expr::Compare {
            left: boxed(left),
            rest,
        },
    ))
}

fn fold_binary(first: Expr, rest: Vec<(BinaryOp, Expr)>) -> Expr {
    rest.into_iter().fold(first, |left, (op, right)| Expr::Binary {
        left: boxed(left),
        op,
        right: boxed(right),
    })
}

fn additive_op(input: &str) -> IResult<&str, BinaryOp> {
    alt((
        value(BinaryOp::Add, sym("+")),
        value(BinaryOp::Sub, sym("-")),
    ))
    .parse(input)
}

fn multiplicative_op(input: &str) -> IResult<&str, BinaryOp> {
    alt((
        value(BinaryOp::FloorDiv, sym("//")),
        value(BinaryOp::Div, sym("/")),
        value(BinaryOp::Mul, ws(terminated(char('*'), not(char('*'))))),
        value(BinaryOp::Mod, sym("%")),
    ))
    .parse(input)
}

fn arith_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = term(input)?;
    let (input, rest) = many0(pair(additive_op, term)).parse(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn term(input: &str) -> IResult<&str, Expr> {
    let (input, first) = factor(input)?;
    let (input, rest) = many0(pair(multiplicative_op, factor)).parse(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn factor(input: &str) -> IResult<&str, Expr> {
    alt((
        map(pair(sym("-"), factor), |(_, operand)| Expr::Unary {
            op: UnaryOp::Neg,
            operand: boxed(operand),
        }),
        map(pair(sym("+"), factor), |(_, operand)| Expr::Unary {
            op: UnaryOp::Pos,
            operand: boxed(operand),
        }),
        power,
    ))
    .parse(input)
}

/// `**` binds tighter than a unary minus on its left and is
/// right-associative.
fn power(input: &str) -> IResult<&str, Expr> {
    let (input, base) = postfix(input)?;
    let (input, exponent) = opt(preceded(sym("**"), factor)).parse(input)?;
    let expr = match exponent {
        Some(exponent) => Expr::Binary {
            left: boxed(base),
            op: BinaryOp::Pow,
            right: boxed(exponent),
        },
        None => base,
    };
    Ok((input, expr))
}

// --- Postfix trailers ---

enum Trailer {
    Attribute(String),
    Call(Vec<Expr>, Vec<(String, Expr)>),
    Index(Expr),
    Slice(Option<Expr>, Option<Expr>, Option<Expr>),
}

fn postfix(input: &str) -> IResult<&str, Expr> {
    let (input, atom) = atom(input)?;
    let (input, trailers) = many0(trailer).parse(input)?;
    let expr = trailers.into_iter().fold(atom, |value, trailer| match trailer {
        Trailer::Attribute(attr) => Expr::Attribute {
            value: boxed(value),
            attr,
        },
        Trailer::Call(args, kwargs) => Expr::Call {
            func: boxed(value),
            args,
            kwargs,
        },
        Trailer::Index(index) => Expr::Subscript {
            value: boxed(value),
            index: boxed(index),
        },
        Trailer::Slice(lower, upper, step) => Expr::Slice {
            value: boxed(value),
            lower: lower.map(boxed),
            upper: upper.map(boxed),
            step: step.map(boxed),
        },
    });
    Ok((input, expr))
}

fn trailer(input: &str) -> IResult<&str, Trailer> {
    alt((
        map(preceded(sym("."), identifier), |name| {
            Trailer::Attribute(name.to_string())
        }),
        map(delimited(sym("("), arguments, sym(")")), |(args, kwargs)| {
            Trailer::Call(args, kwargs)
        }),
        delimited(sym("["), subscript, sym("]")),
    ))
    .parse(input)
}

enum Argument {
    Positional(Expr),
    Keyword(String, Expr),
}

fn argument(input: &str) -> IResult<&str, Argument> {
    alt((
        map(
            pair(
                ws(identifier),
                preceded(ws(terminated(char('='), not(char('=')))), expression),
            ),
            |(name, expr)| Argument::Keyword(name.to_string(), expr),
        ),
        map(expression, Argument::Positional),
    ))
    .parse(input)
}

#[allow(clippy::type_complexity)]
fn arguments(input: &str) -> IResult<&str, (Vec<Expr>, Vec<(String, Expr)>)> {
    let (input, items) = terminated(separated_list0(sym(","), argument), opt(sym(","))).parse(input)?;
    let mut args = Vec::new();
    let mut kwargs = Vec::new();
    for item in items {
        match item {
            Argument::Positional(expr) if kwargs.is_empty() => args.push(expr),
            Argument::Positional(_) => return fail(input, ErrorKind::Verify),
            Argument::Keyword(name, expr) => kwargs.push((name, expr)),
        }
    }
    Ok((input, (args, kwargs)))
}

fn subscript(input: &str) -> IResult<&str, Trailer> {
    let (input, lower) = opt(expression).parse(input)?;
    let (input, colon) = opt(sym(":")).parse(input)?;
    if colon.is_none() {
        return match lower {
            Some(index) => Ok((input, Trailer::Index(index))),
            None => fail(input, ErrorKind::Verify),
        };
    }
    let (input, upper) = opt(expression).parse(input)?;
    let (input, step) = opt(preceded(sym(":"), opt(expression))).parse(input)?;
    Ok((input, Trailer::Slice(lower, upper, step.flatten())))
}

// --- Atoms ---

fn atom(input: &str) -> IResult<&str, Expr> {
    ws(alt((
        number,
        strings,
        value(Expr::Literal(Value::None), keyword("None")),
        value(Expr::Literal(Value::Bool(true)), keyword("True")),
        value(Expr::Literal(Value::Bool(false)), keyword("False")),
        map(identifier, |name| Expr::Name(name.to_string())),
        parenthesized,
        list_display,
        dict_display,
    )))
    .parse(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    verify(
        recognize(pair(
            satisfy(|c: char| c.is_alphabetic() || c == '_'),
            take_while(is_ident_char),
        )),
        |name: &str| !KEYWORDS.contains(&name),
    )
    .parse(input)
}

fn parenthesized(input: &str) -> IResult<&str, Expr> {
    let (input, _) = sym("(").parse(input)?;
    if let Ok((input, _)) = sym(")").parse(input) {
        return Ok((input, Expr::Tuple(Vec::new())));
    }
    let (input, expr) = expression_list(input)?;
    let (input, _) = sym(")").parse(input)?;
    Ok((input, expr))
}

fn list_display(input: &str) -> IResult<&str, Expr> {
    map(
        delimited(
            sym("["),
            terminated(separated_list0(sym(","), expression), opt(sym(","))),
            sym("]"),
        ),
        Expr::List,
    )
    .parse(input)
}

fn dict_display(input: &str) -> IResult<&str, Expr> {
    map(
        delimited(
            sym("{"),
            terminated(
                separated_list0(sym(","), pair(expression, preceded(sym(":"), expression))),
                opt(sym(",")),
            ),
            sym("}"),
        ),
        Expr::Dict,
    )
    .parse(input)
}

/// Integer, float or hex literal. Integers that overflow `i64` become
/// floats.
fn number(input: &str) -> IResult<&str, Expr> {
    let bytes = input.as_bytes();
    if bytes.len() > 2 && bytes[0] == b'0' && matches!(bytes[1], b'x' | b'X') {
        let digits = input[2..]
            .find(|c: char| !c.is_ascii_hexdigit())
            .unwrap_or(input.len() - 2);
        if digits == 0 {
            return fail(input, ErrorKind::HexDigit);
        }
        let text = &input[2..2 + digits];
        return match i64::from_str_radix(text, 16) {
            Ok(n) => Ok((&input[2 + digits..], Expr::Literal(Value::Int(n)))),
            Err(_) => fail(input, ErrorKind::HexDigit),
        };
    }
    let scan_digits = |mut pos: usize| {
        while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'_') {
            pos += 1;
        }
        pos
    };
    let int_end = scan_digits(0);
    let mut end = int_end;
    let mut is_float = false;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_end = scan_digits(end + 1);
        if int_end > 0 || frac_end > end + 1 {
            is_float = true;
            end = frac_end;
        }
    }
    if end == 0 || (int_end == 0 && !is_float) {
        return fail(input, ErrorKind::Digit);
    }
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut pos = end + 1;
        if pos < bytes.len() && matches!(bytes[pos], b'+' | b'-') {
            pos += 1;
        }
        let exp_end = scan_digits(pos);
        if exp_end > pos {
            is_float = true;
            end = exp_end;
        }
    }
    if end < bytes.len() && (bytes[end] as char).is_alphabetic() && !matches!(bytes[end], b'e' | b'E') {
        return fail(input, ErrorKind::Digit);
    }
    let text: String = input[..end].chars().filter(|c| *c != '_').collect();
    let literal = if is_float {
        match text.parse::<f64>() {
            Ok(f) => Value::Float(f),
            Err(_) => return fail(input, ErrorKind::Float),
        }
    } else {
        match text.parse::<i64>() {
            Ok(n) => Value::Int(n),
            Err(_) => match text.parse::<f64>() {
                Ok(f) => Value::Float(f),
                Err(_) => return fail(input, ErrorKind::Digit),
            },
        }
    };
    Ok((&input[end..], Expr::Literal(literal)))
}

/// Adjacent string literals concatenate, as in `'a' "b"`.
fn strings(input: &str) -> IResult<&str, Expr> {
    let (input, parts) = many1(terminated(string_token, multispace0)).parse(input)?;
    let all_bytes = parts.iter().all(|(is_bytes, _)| *is_bytes);
    let text: String = parts.into_iter().map(|(_, s)| s).collect();
    let literal = if all_bytes {
        Value::Bytes(text.chars().map(|c| c as u32 as u8).collect())
    } else {
        Value::Str(text)
    };
    Ok((input, Expr::Literal(literal)))
}

fn string_token(input: &str) -> IResult<&str, (bool, String)> {
    let prefix_len = input
        .chars()
        .take(2)
        .take_while(|c| matches!(c, 'u' | 'U' | 'r' | 'R' | 'b' | 'B'))
        .count();
    let prefix = input[..prefix_len].to_ascii_lowercase();
    let body = &input[prefix_len..];
    let quote = match body.chars().next() {
        Some(q @ ('\'' | '"')) => q,
        _ => return fail(input, ErrorKind::Char),
    };
    let raw = prefix.contains('r');
    let is_bytes = prefix.contains('b');
    let triple: String = std::iter::repeat_n(quote, 3).collect();
    let (delimiter, mut rest) = if body.starts_with(&triple) {
        (triple.as_str(), &body[3..])
    } else {
        (&body[..1], &body[1..])
    };

    let mut out = String::new();
    loop {
        if rest.starts_with(delimiter) {
            return Ok((&rest[delimiter.len()..], (is_bytes, out)));
        }
        let mut chars = rest.chars();
        let Some(ch) = chars.next() else {
            return fail(input, ErrorKind::Char);
        };
        if ch == '\n' && delimiter.len() == 1 {
            return fail(input, ErrorKind::Char);
        }
        if ch != '\\' {
            out.push(ch);
            rest = chars.as_str();
            continue;
        }
        let Some(escaped) = chars.next() else {
            return fail(input, ErrorKind::Char);
        };
        let after = chars.as_str();
        if raw {
            out.push('\\');
            out.push(escaped);
            rest = after;
            continue;
        }
        rest = after;
        match escaped {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            'a' => out.push('\u{7}'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '\\' | '\'' | '"' => out.push(escaped),
            '\n' => {}
            'x' | 'u' | 'U' => {
                let width = match escaped {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let code = after
                    .get(..width)
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .and_then(char::from_u32);
                match code {
                    Some(c) => {
                        out.push(c);
                        rest = &after[width..];
                    }
                    None => return fail(input, ErrorKind::HexDigit),
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(value: Value) -> Expr {
        Expr::Literal(value)
    }

    fn name(n: &str) -> Expr {
        Expr::Name(n.to_string())
    }

    #[test]
    fn parses_numbers() {
        assert_eq!(parse_expression("42").unwrap(), lit(Value::Int(42)));
        assert_eq!(parse_expression("1_000").unwrap(), lit(Value::Int(1000)));
        assert_eq!(parse_expression("2.5").unwrap(), lit(Value::Float(2.5)));
        assert_eq!(parse_expression(".5").unwrap(), lit(Value::Float(0.5)));
        assert_eq!(parse_expression("1e3").unwrap(), lit(Value::Float(1000.0)));
        assert_eq!(parse_expression("0xff").unwrap(), lit(Value::Int(255)));
    }

    #[test]
    fn parses_string_forms() {
        assert_eq!(parse_expression("'a' \"b\"").unwrap(), lit(Value::from("ab")));
        assert_eq!(parse_expression("u'x\\ty'").unwrap(), lit(Value::from("x\ty")));
        assert_eq!(parse_expression("r'x\\ty'").unwrap(), lit(Value::from("x\\ty")));
        assert_eq!(
            parse_expression("'''two\nlines'''").unwrap(),
            lit(Value::from("two\nlines"))
        );
        assert_eq!(parse_expression("b'ab'").unwrap(), lit(Value::Bytes(b"ab".to_vec())));
        assert!(parse_expression("'open").is_err());
    }

    #[test]
    fn respects_operator_precedence() {
        let expr = parse_expression("1 + 2 * 3").unwrap();
        assert_eq!(
            expr,
            Expr::Binary {
                left: boxed(lit(Value::Int(1))),
                op: BinaryOp::Add,
                right: boxed(Expr::Binary {
                    left: boxed(lit(Value::Int(2))),
                    op: BinaryOp::Mul,
                    right: boxed(lit(Value::Int(3))),
                }),
            }
        );
        let expr = parse_expression("-2 ** 2").unwrap();
        assert!(matches!(expr, Expr::Unary { op: UnaryOp::Neg, .. }));
    }

    #[test]
    fn keywords_need_word_boundaries() {
        assert_eq!(parse_expression("notes").unwrap(), name("notes"));
        assert_eq!(parse_expression("island").unwrap(), name("island"));
        assert!(matches!(
            parse_expression("not x").unwrap(),
            Expr::Unary { op: UnaryOp::Not, .. }
        ));
        let expr = parse_expression("a not in b").unwrap();
        match expr {
            Expr::Compare { rest, .. } => assert_eq!(rest[0].0, CompareOp::NotIn),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_postfix_chains() {
        let expr = parse_expression("self.Record['name'].upper()").unwrap();
        match expr {
            Expr::Call { func, args, .. } => {
                assert!(args.is_empty());
                assert!(matches!(*func, Expr::Attribute { ref attr, .. } if attr == "upper"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            parse_expression("x[1:]").unwrap(),
            Expr::Slice { lower: Some(_), upper: None, step: None, .. }
        ));
        let call = parse_expression("datetime.date(2024, month=3, day=1)").unwrap();
        match call {
            Expr::Call { args, kwargs, .. } => {
                assert_eq!(args.len(), 1);
                assert_eq!(kwargs.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn tuples_lists_and_dicts() {
        assert_eq!(
            parse_expression("(1, 2)").unwrap(),
            Expr::Tuple(vec![lit(Value::Int(1)), lit(Value::Int(2))])
        );
        assert_eq!(parse_expression("(1,)").unwrap(), Expr::Tuple(vec![lit(Value::Int(1))]));
        assert_eq!(parse_expression("()").unwrap(), Expr::Tuple(vec![]));
        assert_eq!(parse_expression("(1)").unwrap(), lit(Value::Int(1)));
        assert_eq!(parse_expression("[]").unwrap(), Expr::List(vec![]));
        assert!(matches!(
            parse_expression("{'a': 1, 'b': [2, 3],}").unwrap(),
            Expr::Dict(items) if items.len() == 2
        ));
    }

    #[test]
    fn conditional_expression() {
        assert!(matches!(
            parse_expression("'a' if x > 1 else 'b'").unwrap(),
            Expr::Conditional { .. }
        ));
    }

    #[test]
    fn rejects_trailing_garbage() {
        let err = parse_expression("1 + ").unwrap_err();
        assert!(matches!(err, ExprError::Syntax { .. }));
        assert!(parse_expression("a b").is_err());
        assert!(parse_expression("f(a=1, 2)").is_err());
    }
}
