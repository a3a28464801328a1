//! `%`-interpolation and `str.format` for expression strings.

use super::error::{ExprError, check_result_len};
use super::value::{Value, format_float};
use std::collections::BTreeMap;

#[derive(Debug, Default, Clone)]
struct Spec {
    left: bool,
    zero: bool,
    plus: bool,
    space: bool,
    alternate: bool,
    width: Option<usize>,
    precision: Option<usize>,
}

enum Args<'a> {
    Positional(Vec<&'a Value>),
    Mapping(&'a BTreeMap<String, Value>),
}

/// `template % args`. A tuple supplies positional arguments, a dict
/// supplies `%(name)s` lookups, anything else is the single argument.
pub fn percent_format(template: &str, args: &Value) -> Result<String, ExprError> {
    let args = match args {
        Value::Tuple(items) => Args::Positional(items.iter().collect()),
        Value::Dict(map) if template.contains("%(") => Args::Mapping(map),
        other => Args::Positional(vec![other]),
    };
    let mut next_arg = 0usize;
    let mut out = String::with_capacity(template.len() + 16);
    let mut chars = template.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        let mut key: Option<String> = None;
        if chars.peek() == Some(&'(') {
            chars.next();
            let mut depth = 1;
            let mut name = String::new();
            for c in chars.by_ref() {
                match c {
                    '(' => depth += 1,
                    ')' => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    _ => {}
                }
                name.push(c);
            }
            if depth != 0 {
                return Err(ExprError::value_error("incomplete format key"));
            }
            key = Some(name);
        }

        let mut spec = Spec::default();
        while let Some(&c) = chars.peek() {
            match c {
                '-' => spec.left = true,
                '0' => spec.zero = true,
                '+' => spec.plus = true,
                ' ' => spec.space = true,
                '#' => spec.alternate = true,
                _ => break,
            }
            chars.next();
        }
        if chars.peek() == Some(&'*') {
            chars.next();
            let width = take_positional(&args, &mut next_arg)?;
            spec.width = Some(star_value(width, &mut spec)?);
        } else {
            spec.width = read_number(&mut chars);
        }
        if chars.peek() == Some(&'.') {
            chars.next();
            if chars.peek() == Some(&'*') {
                chars.next();
                let precision = take_positional(&args, &mut next_arg)?;
                spec.precision = Some(precision.as_i64().unwrap_or(0).max(0) as usize);
            } else {
                spec.precision = Some(read_number(&mut chars).unwrap_or(0));
            }
        }
        check_result_len(Some(spec.width.unwrap_or(0)), "format width")?;
        check_result_len(Some(spec.precision.unwrap_or(0)), "format precision")?;
        while matches!(chars.peek(), Some('h' | 'l' | 'L')) {
            chars.next();
        }
        let Some(conversion) = chars.next() else {
            return Err(ExprError::value_error("incomplete format"));
        };
        if conversion == '%' {
            out.push('%');
            continue;
        }
        let value = match (&key, &args) {
            (Some(name), Args::Mapping(map)) => map
                .get(name)
                .ok_or_else(|| ExprError::Key(format!("'{name}'")))?,
            (Some(_), Args::Positional(_)) => {
                return Err(ExprError::type_error("format requires a mapping"));
            }
            (None, _) => take_positional(&args, &mut next_arg)?,
        };
        out.push_str(&convert(conversion, value, &spec)?);
    }

    if let Args::Positional(items) = &args {
        let single_mapping = items.len() == 1 && matches!(items[0], Value::Dict(_));
        if next_arg < items.len() && !single_mapping {
            return Err(ExprError::type_error(
                "not all arguments converted during string formatting",
            ));
        }
    }
    Ok(out)
}

fn take_positional<'a>(args: &Args<'a>, next: &mut usize) -> Result<&'a Value, ExprError> {
    match args {
        Args::Positional(items) => {
            let value = items
                .get(*next)
                .copied()
                .ok_or_else(|| ExprError::type_error("not enough arguments for format string"))?;
            *next += 1;
            Ok(value)
        }
        Args::Mapping(_) => Err(ExprError::type_error("format requires a mapping")),
    }
}

fn star_value(value: &Value, spec: &mut Spec) -> Result<usize, ExprError> {
    let width = value
        .as_i64()
        .ok_or_else(|| ExprError::type_error("* wants int"))?;
    if width < 0 {
        spec.left = true;
    }
    Ok(width.unsigned_abs() as usize)
}

fn read_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<usize> {
    let mut digits = String::new();
    while let Some(&c) = chars.peek() {
        if !c.is_ascii_digit() {
            break;
        }
        digits.push(c);
        chars.next();
    }
    digits.parse().ok()
}

fn convert(conversion: char, value: &Value, spec: &Spec) -> Result<String, ExprError> {
    let body = match conversion {
        's' | 'r' | 'a' => {
            let text = if conversion == 's' {
                value.to_string()
            } else {
                value.repr()
            };
            let text = match spec.precision {
                Some(p) => text.chars().take(p).collect(),
                None => text,
            };
            return Ok(pad(&text, spec.width, spec.left, ' ', false));
        }
        'd' | 'i' | 'u' => {
            let n = integer_arg(value, conversion)?;
            signed(n < 0, n.unsigned_abs().to_string(), spec)
        }
        'x' | 'X' | 'o' => {
            let n = integer_arg(value, conversion)?;
            let magnitude = n.unsigned_abs();
            let digits = match conversion {
                'x' => format!("{magnitude:x}"),
                'X' => format!("{magnitude:X}"),
                _ => format!("{magnitude:o}"),
            };
            let digits = if spec.alternate {
                let prefix = match conversion {
                    'x' => "0x",
                    'X' => "0X",
                    _ => "0o",
                };
                format!("{prefix}{digits}")
            } else {
                digits
            };
            signed(n < 0, digits, spec)
        }
        'f' | 'F' | 'e' | 'E' | 'g' | 'G' => {
            let precision = spec.precision.unwrap_or(6);
            if let (Value::Decimal(d), 'f' | 'F') = (value, conversion) {
                let rounded = d.round_dp(precision as u32);
                let text = rounded.abs().to_string();
                signed(rounded.is_negative() && !rounded.is_zero(), text, spec)
            } else {
                let f = value.as_f64().ok_or_else(|| {
                    ExprError::type_error(format!(
                        "must be real number, not {}",
                        value.type_name()
                    ))
                })?;
                let text = float_body(f.abs(), conversion, precision, spec.alternate);
                signed(f.is_sign_negative() && f != 0.0, text, spec)
            }
        }
        'c' => {
            let text = match value {
                Value::Str(s) if s.chars().count() == 1 => s.clone(),
                other => {
                    let code = other
                        .as_i64()
                        .and_then(|n| u32::try_from(n).ok())
                        .and_then(char::from_u32)
                        .ok_or_else(|| ExprError::type_error("%c requires int or char"))?;
                    code.to_string()
                }
            };
            return Ok(pad(&text, spec.width, spec.left, ' ', false));
        }
        other => {
            return Err(ExprError::value_error(format!(
                "unsupported format character '{other}'"
            )));
        }
    };
    Ok(body)
}

fn integer_arg(value: &Value, conversion: char) -> Result<i64, ExprError> {
    match value {
        Value::Bool(b) => Ok(*b as i64),
        Value::Int(i) => Ok(*i),
        Value::Float(f) if f.is_finite() => Ok(f.trunc() as i64),
        Value::Decimal(d) => i64::try_from(d.trunc())
            .map_err(|_| ExprError::value_error("integer out of range")),
        other => Err(ExprError::type_error(format!(
            "%{conversion} format: a number is required, not {}",
            other.type_name()
        ))),
    }
}

fn signed(negative: bool, digits: String, spec: &Spec) -> String {
    let sign = if negative {
        "-"
    } else if spec.plus {
        "+"
    } else if spec.space {
        " "
    } else {
        ""
    };
    let zero_pad = spec.zero && !spec.left;
    if zero_pad {
        let width = spec.width.unwrap_or(0).saturating_sub(sign.len());
        return format!("{sign}{}", pad(&digits, Some(width), false, '0', true));
    }
    pad(&format!("{sign}{digits}"), spec.width, spec.left, ' ', false)
}

fn pad(text: &str, width: Option<usize>, left: bool, fill: char, numeric: bool) -> String {
    let len = text.chars().count();
    let Some(width) = width.filter(|w| *w > len) else {
        return text.to_string();
    };
    let filler: String = std::iter::repeat_n(fill, width - len).collect();
    if numeric {
        if let Some(rest) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0o")) {
            return format!("{}{filler}{rest}", &text[..2]);
        }
    }
    if left {
        format!("{text}{filler}")
    } else {
        format!("{filler}{text}")
    }
}

fn exponent_form(value: f64, precision: usize, upper: bool) -> String {
    let text = format!("{value:.precision$e}");
    let (mantissa, exp) = text.split_once('e').unwrap_or((&text, "0"));
    let (sign, digits) = match exp.strip_prefix('-') {
        Some(d) => ('-', d),
        None => ('+', exp),
    };
    let e = if upper { 'E' } else { 'e' };
    format!("{mantissa}{e}{sign}{digits:0>2}")
}

fn strip_fraction_zeros(text: &str) -> String {
    if !text.contains('.') {
        return text.to_string();
    }
    let (mantissa, exp) = match text.find(['e', 'E']) {
        Some(pos) => (&text[..pos], &text[pos..]),
        None => (text, ""),
    };
    let trimmed = mantissa.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed}{exp}")
}

/// Digits of a non-negative float for the `f`, `e` and `g` conversions.
fn float_body(value: f64, conversion: char, precision: usize, alternate: bool) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return "inf".to_string();
    }
    match conversion {
        'f' | 'F' => format!("{value:.precision$}"),
        'e' | 'E' => exponent_form(value, precision, conversion == 'E'),
        _ => {
            let p = precision.max(1);
            let scientific = format!("{value:.prec$e}", prec = p - 1);
            let exp: i32 = scientific
                .split_once('e')
                .and_then(|(_, e)| e.parse().ok())
                .unwrap_or(0);
            let text = if exp >= -4 && exp < p as i32 {
                let decimals = (p as i32 - 1 - exp).max(0) as usize;
                format!("{value:.decimals$}")
            } else {
                exponent_form(value, p - 1, conversion == 'G')
            };
            if alternate {
                text
            } else {
                strip_fraction_zeros(&text)
            }
        }
    }
}

/// Applies a `format()` mini-language spec such as `>10`, `,.2f` or `05d`.
pub fn format_spec(value: &Value, spec_text: &str) -> Result<String, ExprError> {
    if spec_text.is_empty() {
        return Ok(value.to_string());
    }
    let chars: Vec<char> = spec_text.chars().collect();
    let mut pos = 0;
    let mut fill = ' ';
    let mut align: Option<char> = None;
    if chars.len() >= 2 && matches!(chars[1], '<' | '>' | '^' | '=') {
        fill = chars[0];
        align = Some(chars[1]);
        pos = 2;
    } else if matches!(chars.first(), Some('<' | '>' | '^' | '=')) {
        align = Some(chars[0]);
        pos = 1;
    }
    let mut sign = '-';
    if let Some(c @ ('+' | '-' | ' ')) = chars.get(pos) {
        sign = *c;
        pos += 1;
    }
    let mut alternate = false;
    if chars.get(pos) == Some(&'#') {
        alternate = true;
        pos += 1;
    }
    if chars.get(pos) == Some(&'0') && align.is_none() {
        fill = '0';
        align = Some('=');
        pos += 1;
    }
    let mut width = String::new();
    while let Some(c) = chars.get(pos).filter(|c| c.is_ascii_digit()) {
        width.push(*c);
        pos += 1;
    }
    let mut grouping = false;
    if matches!(chars.get(pos), Some(',' | '_')) {
        grouping = true;
        pos += 1;
    }
    let mut precision: Option<usize> = None;
    if chars.get(pos) == Some(&'.') {
        pos += 1;
        let mut digits = String::new();
        while let Some(c) = chars.get(pos).filter(|c| c.is_ascii_digit()) {
            digits.push(*c);
            pos += 1;
        }
        precision = digits.parse().ok();
    }
    check_result_len(Some(precision.unwrap_or(0)), "format precision")?;
    let kind = chars.get(pos).copied();
    if pos + usize::from(kind.is_some()) != chars.len() {
        return Err(ExprError::value_error(format!(
            "invalid format specifier '{spec_text}'"
        )));
    }

    let (negative, mut body) = match (kind, value) {
        (Some('s') | None, Value::Str(s)) => {
            let text = match precision {
                Some(p) => s.chars().take(p).collect(),
                None => s.clone(),
            };
            (false, text)
        }
        (None, v) if !v.is_number() => (false, v.to_string()),
        (Some('d') | Some('n'), v) | (None, v @ (Value::Int(_) | Value::Bool(_))) => {
            let n = integer_arg(v, 'd')?;
            (n < 0, n.unsigned_abs().to_string())
        }
        (Some('x' | 'X' | 'o' | 'b'), v) => {
            let n = integer_arg(v, 'x')?;
            let m = n.unsigned_abs();
            let (digits, prefix) = match kind {
                Some('x') => (format!("{m:x}"), "0x"),
                Some('X') => (format!("{m:X}"), "0X"),
                Some('o') => (format!("{m:o}"), "0o"),
                _ => (format!("{m:b}"), "0b"),
            };
            let digits = if alternate {
                format!("{prefix}{digits}")
            } else {
                digits
            };
            (n < 0, digits)
        }
        (Some('%'), v) => {
            let f = v
                .as_f64()
                .ok_or_else(|| ExprError::type_error("'%' format requires a number"))?;
            let p = precision.unwrap_or(6);
            (f < 0.0, format!("{:.p$}%", (f * 100.0).abs()))
        }
        (Some(c @ ('f' | 'F' | 'e' | 'E' | 'g' | 'G')), v) => {
            if let (Value::Decimal(d), 'f' | 'F') = (v, c) {
                let rounded = d.round_dp(precision.unwrap_or(6) as u32);
                (rounded.is_negative() && !rounded.is_zero(), rounded.abs().to_string())
            } else {
                let f = v
                    .as_f64()
                    .ok_or_else(|| ExprError::type_error("format requires a number"))?;
                (
                    f.is_sign_negative() && f != 0.0,
                    float_body(f.abs(), c, precision.unwrap_or(6), alternate),
                )
            }
        }
        (None, v) => {
            let text = match (v, precision) {
                (Value::Float(f), Some(p)) => float_body(f.abs(), 'g', p, false),
                (Value::Float(f), None) => format_float(f.abs()),
                (Value::Decimal(d), Some(p)) => d.abs().round_dp(p as u32).to_string(),
                (Value::Decimal(d), None) => d.abs().to_string(),
                (other, _) => other.to_string(),
            };
            let negative = v.as_f64().is_some_and(|f| f < 0.0);
            (negative, text)
        }
        (Some(other), _) => {
            return Err(ExprError::value_error(format!(
                "unknown format code '{other}' for {}",
                value.type_name()
            )));
        }
    };

    if grouping {
        body = group_thousands(&body);
    }
    let sign_text = match (negative, sign) {
        (true, _) => "-",
        (false, '+') => "+",
        (false, ' ') => " ",
        _ => "",
    };
    let width = check_result_len(Some(width.parse().unwrap_or(0)), "format width")?;
    let numeric = value.is_number() && !matches!(kind, Some('s'));
    let align = align.unwrap_or(if numeric { '>' } else { '<' });
    let content_len = sign_text.chars().count() + body.chars().count();
    if content_len >= width {
        return Ok(format!("{sign_text}{body}"));
    }
    let filler = width - content_len;
    let fills = |n: usize| std::iter::repeat_n(fill, n).collect::<String>();
    Ok(match align {
        '<' => format!("{sign_text}{body}{}", fills(filler)),
        '^' => format!(
            "{}{sign_text}{body}{}",
            fills(filler / 2),
            fills(filler - filler / 2)
        ),
        '=' => format!("{sign_text}{}{body}", fills(filler)),
        _ => format!("{}{sign_text}{body}", fills(filler)),
    })
}

fn group_thousands(body: &str) -> String {
    let digits_end = body
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(body.len());
    let (int_part, rest) = body.split_at(digits_end);
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (index, ch) in int_part.chars().enumerate() {
        if index > 0 && (int_part.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{grouped}{rest}")
}

/// `str.format`: `{}`, `{0}`, `{name}`, each with an optional `:spec`;
/// `{{` and `}}` are literal braces.
pub fn brace_format(
    template: &str,
    args: &[Value],
    kwargs: &BTreeMap<String, Value>,
) -> Result<String, ExprError> {
    let mut out = String::with_capacity(template.len() + 16);
    let mut auto_index = 0usize;
    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return Err(ExprError::value_error("single '}' encountered in format string")),
            '{' => {
                let mut field = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    field.push(c);
                }
                if !closed {
                    return Err(ExprError::value_error("expected '}' before end of string"));
                }
                let (name, spec) = field.split_once(':').unwrap_or((&field, ""));
                let (name, conversion) = match name.split_once('!') {
                    Some((n, c)) => (n, Some(c)),
                    None => (name, None),
                };
                let value = if name.is_empty() {
                    let v = args.get(auto_index).ok_or(ExprError::Index)?;
                    auto_index += 1;
                    v
                } else if let Ok(index) = name.parse::<usize>() {
                    args.get(index).ok_or(ExprError::Index)?
                } else {
                    kwargs
                        .get(name)
                        .ok_or_else(|| ExprError::Key(format!("'{name}'")))?
                };
                let value = match conversion {
                    Some("r") => Value::Str(value.repr()),
                    Some("s") => Value::Str(value.to_string()),
                    _ => value.clone(),
                };
                out.push_str(&format_spec(&value, spec)?);
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::decimal::Decimal;

    fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(items)
    }

    #[test]
    fn percent_basic_conversions() {
        let args = tuple(vec![Value::Int(2), Value::Int(3)]);
        assert_eq!(percent_format("Page %s of %s", &args).unwrap(), "Page 2 of 3");
        assert_eq!(percent_format("%5.2f|", &Value::Float(3.14159)).unwrap(), " 3.14|");
        assert_eq!(percent_format("%-5d|", &Value::Int(42)).unwrap(), "42   |");
        assert_eq!(percent_format("%05d", &Value::Int(-42)).unwrap(), "-0042");
        assert_eq!(percent_format("%+d", &Value::Int(7)).unwrap(), "+7");
        assert_eq!(percent_format("%x %#o", &tuple(vec![Value::Int(255), Value::Int(8)])).unwrap(), "ff 0o10");
        assert_eq!(percent_format("%r", &Value::from("a")).unwrap(), "'a'");
        assert_eq!(percent_format("100%%", &tuple(vec![])).unwrap(), "100%");
        assert_eq!(percent_format("%.3s", &Value::from("abcdef")).unwrap(), "abc");
        assert_eq!(percent_format("%c", &Value::Int(65)).unwrap(), "A");
    }

    #[test]
    fn percent_float_styles() {
        assert_eq!(percent_format("%e", &Value::Float(12345.678)).unwrap(), "1.234568e+04");
        assert_eq!(percent_format("%g", &Value::Float(0.0001)).unwrap(), "0.0001");
        assert_eq!(percent_format("%g", &Value::Float(1234567.0)).unwrap(), "1.23457e+06");
        assert_eq!(percent_format("%g", &Value::Float(2.5)).unwrap(), "2.5");
        assert_eq!(percent_format("%.2f", &Value::Float(-0.001)).unwrap(), "-0.00");
    }

    #[test]
    fn percent_decimal_is_exact() {
        let d = Decimal::parse("1.005").expect("decimal");
        assert_eq!(percent_format("%.2f", &Value::Decimal(d)).unwrap(), "1.00");
        let d = Decimal::parse("2.675").expect("decimal");
        assert_eq!(percent_format("%.2f", &Value::Decimal(d)).unwrap(), "2.68");
    }

    #[test]
    fn percent_mapping_keys() {
        let mut map = BTreeMap::new();
        map.insert("name".to_string(), Value::from("Ann"));
        map.insert("n".to_string(), Value::Int(3));
        let text = percent_format("%(name)s has %(n)d", &Value::Dict(map)).unwrap();
        assert_eq!(text, "Ann has 3");
    }

    #[test]
    fn percent_argument_count_errors() {
        assert!(percent_format("%s %s", &Value::Int(1)).is_err());
        assert!(percent_format("%s", &tuple(vec![Value::Int(1), Value::Int(2)])).is_err());
        assert!(percent_format("%d", &Value::from("x")).is_err());
    }

    #[test]
    fn format_spec_mini_language() {
        assert_eq!(format_spec(&Value::Int(1234567), ",").unwrap(), "1,234,567");
        assert_eq!(format_spec(&Value::Float(1234.5), ",.2f").unwrap(), "1,234.50");
        assert_eq!(format_spec(&Value::from("ab"), ">5").unwrap(), "   ab");
        assert_eq!(format_spec(&Value::from("ab"), "*^6").unwrap(), "**ab**");
        assert_eq!(format_spec(&Value::Int(-5), "05d").unwrap(), "-0005");
        assert_eq!(format_spec(&Value::Float(0.25), ".0%").unwrap(), "25%");
        assert_eq!(format_spec(&Value::Int(7), "").unwrap(), "7");
        assert!(format_spec(&Value::Int(7), "q").is_err());
    }

    #[test]
    fn brace_format_fields() {
        let mut kwargs = BTreeMap::new();
        kwargs.insert("who".to_string(), Value::from("Bo"));
        let text = brace_format(
            "{} + {1} = {0:>3} {who!r} {{x}}",
            &[Value::Int(1), Value::Int(2)],
            &kwargs,
        )
        .unwrap();
        assert_eq!(text, "1 + 2 =   1 'Bo' {x}");
        assert!(brace_format("{5}", &[], &BTreeMap::new()).is_err());
    }
}
