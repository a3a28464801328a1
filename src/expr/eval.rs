//! Tree-walking interpreter for compiled expressions.
//!
//! Name lookup order: `self`, then the caller's [`Scope`] (variables, then
//! record fields), then the whitelisted modules. Builtin functions win in
//! call position so a record field named `sum` cannot hide `sum()`.

use super::ast::{BinaryOp, CompareOp, Expr, UnaryOp};
use super::decimal::Decimal;
use super::error::{ExprError, check_result_len};
use super::format::{brace_format, format_spec, percent_format};
use super::parser::parse_expression;
use super::value::{Namespace, Value};
use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::rc::Rc;

type EvalResult = Result<Value, ExprError>;

/// Supplies the names an expression can see.
pub trait Scope {
    /// Attributes of `self`: `PageNumber`, `Record`, `Variables`, ...
    fn report_attr(&self, name: &str) -> Option<Value>;
    /// A bare name.
    fn name(&self, name: &str) -> Option<Value>;
}

/// A scope with no names; only literals, builtins and modules resolve.
#[derive(Debug, Default, Clone, Copy)]
pub struct LiteralScope;

impl Scope for LiteralScope {
    fn report_attr(&self, _name: &str) -> Option<Value> {
        None
    }

    fn name(&self, _name: &str) -> Option<Value> {
        None
    }
}

impl Scope for BTreeMap<String, Value> {
    fn report_attr(&self, _name: &str) -> Option<Value> {
        None
    }

    fn name(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

/// Compiles expression sources once and evaluates them against a scope.
#[derive(Debug, Default)]
pub struct Evaluator {
    cache: RefCell<HashMap<String, Result<Rc<Expr>, ExprError>>>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compile(&self, source: &str) -> Result<Rc<Expr>, ExprError> {
        if let Some(cached) = self.cache.borrow().get(source) {
            return cached.clone();
        }
        let compiled = parse_expression(source).map(Rc::new);
        self.cache
            .borrow_mut()
            .insert(source.to_string(), compiled.clone());
        compiled
    }

    pub fn eval(&self, source: &str, scope: &dyn Scope) -> EvalResult {
        let expr = self.compile(source)?;
        self.eval_expr(&expr, scope)
    }

    pub fn eval_expr(&self, expr: &Expr, scope: &dyn Scope) -> EvalResult {
        Interpreter { scope }.eval(expr)
    }

    pub fn cached_sources(&self) -> usize {
        self.cache.borrow().len()
    }
}

const BUILTINS: &[&str] = &[
    "str", "int", "float", "bool", "len", "abs", "round", "min", "max", "sum", "repr", "list",
    "tuple", "sorted", "reversed", "range", "format", "any", "all", "chr", "ord",
];

struct Args {
    positional: Vec<Value>,
    keywords: Vec<(String, Value)>,
}

impl Args {
    fn bind<const N: usize>(
        self,
        func: &str,
        params: [&str; N],
        required: usize,
    ) -> Result<[Option<Value>; N], ExprError> {
        if self.positional.len() > N {
            return Err(ExprError::type_error(format!(
                "{func}() takes at most {N} arguments ({} given)",
                self.positional.len()
            )));
        }
        let mut slots: [Option<Value>; N] = std::array::from_fn(|_| None);
        for (slot, value) in slots.iter_mut().zip(self.positional) {
            *slot = Some(value);
        }
        for (key, value) in self.keywords {
            let Some(index) = params.iter().position(|p| *p == key) else {
                return Err(ExprError::type_error(format!(
                    "{func}() got an unexpected keyword argument '{key}'"
                )));
            };
            if slots[index].is_some() {
                return Err(ExprError::type_error(format!(
                    "{func}() got multiple values for argument '{key}'"
                )));
            }
            slots[index] = Some(value);
        }
        if let Some(missing) = (0..required).find(|i| slots[*i].is_none()) {
            return Err(ExprError::type_error(format!(
                "{func}() missing required argument '{}'",
                params[missing]
            )));
        }
        Ok(slots)
    }

    fn positional_only(self, func: &str) -> Result<Vec<Value>, ExprError> {
        if let Some((key, _)) = self.keywords.first() {
            return Err(ExprError::type_error(format!(
                "{func}() got an unexpected keyword argument '{key}'"
            )));
        }
        Ok(self.positional)
    }
}

struct Interpreter<'a> {
    scope: &'a dyn Scope,
}

impl Interpreter<'_> {
    fn eval(&self, expr: &Expr) -> EvalResult {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Name(name) => self.lookup(name),
            Expr::Attribute { value, attr } => {
                let owner = self.eval(value)?;
                self.attribute(&owner, attr)
            }
            Expr::Subscript { value, index } => {
                let container = self.eval(value)?;
                let index = self.eval(index)?;
                subscript(&container, &index)
            }
            Expr::Slice {
                value,
                lower,
                upper,
                step,
            } => {
                let container = self.eval(value)?;
                let bound = |part: &Option<Box<Expr>>| -> Result<Option<i64>, ExprError> {
                    match part {
                        None => Ok(None),
                        Some(expr) => match self.eval(expr)? {
                            Value::None => Ok(None),
                            other => other.as_i64().map(Some).ok_or_else(|| {
                                ExprError::type_error("slice indices must be integers or None")
                            }),
                        },
                    }
                };
                slice(&container, bound(lower)?, bound(upper)?, bound(step)?)
            }
            Expr::Call { func, args, kwargs } => {
                let args = Args {
                    positional: args.iter().map(|a| self.eval(a)).collect::<Result<_, _>>()?,
                    keywords: kwargs
                        .iter()
                        .map(|(k, v)| Ok((k.clone(), self.eval(v)?)))
                        .collect::<Result<_, ExprError>>()?,
                };
                self.call(func, args)
            }
            Expr::Unary { op, operand } => unary(*op, self.eval(operand)?),
            Expr::Binary { left, op, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, &left, &right)
            }
            Expr::And(left, right) => {
                let left = self.eval(left)?;
                if !left.is_truthy() {
                    return Ok(left);
                }
                self.eval(right)
            }
            Expr::Or(left, right) => {
                let left = self.eval(left)?;
                if left.is_truthy() {
                    return Ok(left);
                }
                self.eval(right)
            }
            Expr::Compare { left, rest } => {
                let mut current = self.eval(left)?;
                for (op, expr) in rest {
                    let next = self.eval(expr)?;
                    if !compare(*op, &current, &next)? {
                        return Ok(Value::Bool(false));
                    }
                    current = next;
                }
                Ok(Value::Bool(true))
            }
            Expr::Conditional { test, body, orelse } => {
                if self.eval(test)?.is_truthy() {
                    self.eval(body)
                } else {
                    self.eval(orelse)
                }
            }
            Expr::Tuple(items) => Ok(Value::Tuple(self.eval_all(items)?)),
            Expr::List(items) => Ok(Value::List(self.eval_all(items)?)),
            Expr::Dict(items) => {
                let mut map = BTreeMap::new();
                for (key, value) in items {
                    let key = match self.eval(key)? {
                        Value::Str(s) => s,
                        other => other.to_string(),
                    };
                    map.insert(key, self.eval(value)?);
                }
                Ok(Value::Dict(map))
            }
        }
    }

    fn eval_all(&self, items: &[Expr]) -> Result<Vec<Value>, ExprError> {
        items.iter().map(|item| self.eval(item)).collect()
    }

    fn lookup(&self, name: &str) -> EvalResult {
        if name == "self" {
            return Ok(Value::Namespace(Namespace::Report));
        }
        if let Some(value) = self.scope.name(name) {
            return Ok(value);
        }
        match name {
            "math" => Ok(Value::Namespace(Namespace::Math)),
            "datetime" => Ok(Value::Namespace(Namespace::Datetime)),
            "decimal" => Ok(Value::Namespace(Namespace::DecimalModule)),
            "Decimal" => Ok(Value::Namespace(Namespace::DecimalType)),
            "Variables" => self
                .scope
                .report_attr("Variables")
                .ok_or_else(|| ExprError::Name(name.to_string())),
            _ => Err(ExprError::Name(name.to_string())),
        }
    }

    fn attribute(&self, owner: &Value, attr: &str) -> EvalResult {
        let missing = || ExprError::Attribute {
            owner: owner.type_name().to_string(),
            attr: attr.to_string(),
        };
        match owner {
            Value::Namespace(Namespace::Report) => {
                self.scope.report_attr(attr).ok_or_else(missing)
            }
            Value::Namespace(ns) => {
                if let Some(member) = namespace_member(*ns, attr) {
                    return Ok(Value::Namespace(member));
                }
                match (ns, attr) {
                    (Namespace::Math, "pi") => Ok(Value::Float(std::f64::consts::PI)),
                    (Namespace::Math, "e") => Ok(Value::Float(std::f64::consts::E)),
                    (Namespace::Math, "tau") => Ok(Value::Float(std::f64::consts::TAU)),
                    (Namespace::Math, "inf") => Ok(Value::Float(f64::INFINITY)),
                    (Namespace::Math, "nan") => Ok(Value::Float(f64::NAN)),
                    _ => Err(missing()),
                }
            }
            Value::Dict(map) => map.get(attr).cloned().ok_or_else(missing),
            Value::Date(d) => match attr {
                "year" => Ok(Value::Int(d.year() as i64)),
                "month" => Ok(Value::Int(d.month() as i64)),
                "day" => Ok(Value::Int(d.day() as i64)),
                _ => Err(missing()),
            },
            Value::DateTime(dt) => match attr {
                "year" => Ok(Value::Int(dt.year() as i64)),
                "month" => Ok(Value::Int(dt.month() as i64)),
                "day" => Ok(Value::Int(dt.day() as i64)),
                "hour" => Ok(Value::Int(dt.hour() as i64)),
                "minute" => Ok(Value::Int(dt.minute() as i64)),
                "second" => Ok(Value::Int(dt.second() as i64)),
                "microsecond" => Ok(Value::Int((dt.nanosecond() / 1000) as i64)),
                _ => Err(missing()),
            },
            Value::Time(t) => match attr {
                "hour" => Ok(Value::Int(t.hour() as i64)),
                "minute" => Ok(Value::Int(t.minute() as i64)),
                "second" => Ok(Value::Int(t.second() as i64)),
                "microsecond" => Ok(Value::Int((t.nanosecond() / 1000) as i64)),
                _ => Err(missing()),
            },
            Value::TimeDelta(d) => {
                let (days, seconds, micros) = timedelta_parts(d);
                match attr {
                    "days" => Ok(Value::Int(days)),
                    "seconds" => Ok(Value::Int(seconds)),
                    "microseconds" => Ok(Value::Int(micros)),
                    _ => Err(missing()),
                }
            }
            _ => Err(missing()),
        }
    }

    fn call(&self, func: &Expr, args: Args) -> EvalResult {
        match func {
            Expr::Name(name) if BUILTINS.contains(&name.as_str()) => builtin(name, args),
            Expr::Attribute { value, attr } => {
                let receiver = self.eval(value)?;
                if let Value::Namespace(ns) = receiver {
                    if let Some(member) = namespace_member(ns, attr) {
                        return construct(member, args);
                    }
                    return namespace_call(ns, attr, args);
                }
                method(&receiver, attr, args)
            }
            other => match self.eval(other)? {
                Value::Namespace(ns) => construct(ns, args),
                value => Err(ExprError::type_error(format!(
                    "'{}' object is not callable",
                    value.type_name()
                ))),
            },
        }
    }
}

fn namespace_member(ns: Namespace, attr: &str) -> Option<Namespace> {
    match (ns, attr) {
        (Namespace::Datetime, "date") => Some(Namespace::DateType),
        (Namespace::Datetime, "datetime") => Some(Namespace::DateTimeType),
        (Namespace::Datetime, "time") => Some(Namespace::TimeType),
        (Namespace::Datetime, "timedelta") => Some(Namespace::TimeDeltaType),
        (Namespace::DecimalModule, "Decimal") => Some(Namespace::DecimalType),
        _ => None,
    }
}

fn int_arg(value: &Value, what: &str) -> Result<i64, ExprError> {
    value.as_i64().ok_or_else(|| {
        ExprError::type_error(format!(
            "{what} must be an integer, not {}",
            value.type_name()
        ))
    })
}

fn float_arg(value: &Value, what: &str) -> Result<f64, ExprError> {
    value.as_f64().ok_or_else(|| {
        ExprError::type_error(format!("{what} must be a real number, not {}", value.type_name()))
    })
}

fn str_arg<'v>(value: &'v Value, what: &str) -> Result<&'v str, ExprError> {
    value.as_str().ok_or_else(|| {
        ExprError::type_error(format!("{what} must be str, not {}", value.type_name()))
    })
}

fn float_to_int(value: f64) -> Result<i64, ExprError> {
    if !value.is_finite() {
        return Err(ExprError::value_error(format!(
            "cannot convert float {} to integer",
            Value::Float(value)
        )));
    }
    if value < i64::MIN as f64 || value >= i64::MAX as f64 {
        return Err(ExprError::value_error("integer out of range"));
    }
    Ok(value as i64)
}

fn iterate(value: &Value) -> Result<Vec<Value>, ExprError> {
    match value {
        Value::List(items) | Value::Tuple(items) => Ok(items.clone()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        Value::Bytes(b) => Ok(b.iter().map(|byte| Value::Int(*byte as i64)).collect()),
        Value::Dict(map) => Ok(map.keys().map(|k| Value::Str(k.clone())).collect()),
        other => Err(ExprError::type_error(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}

fn extremum(func: &str, args: Args, want: Ordering) -> EvalResult {
    let mut positional = args.positional;
    let mut default = None;
    for (key, value) in args.keywords {
        match key.as_str() {
            "default" => default = Some(value),
            _ => {
                return Err(ExprError::type_error(format!(
                    "{func}() got an unexpected keyword argument '{key}'"
                )));
            }
        }
    }
    let items = match positional.len() {
        0 => {
            return Err(ExprError::type_error(format!(
                "{func} expected at least 1 argument, got 0"
            )));
        }
        1 => iterate(&positional.remove(0))?,
        _ => positional,
    };
    let mut iter = items.into_iter();
    let Some(mut best) = iter.next() else {
        return default
            .ok_or_else(|| ExprError::value_error(format!("{func}() arg is an empty sequence")));
    };
    let symbol = if want == Ordering::Less { "<" } else { ">" };
    for item in iter {
        if order(&item, &best, symbol)? == Some(want) {
            best = item;
        }
    }
    Ok(best)
}

fn sort_values(items: &mut [Value]) -> Result<(), ExprError> {
    let mut failure = None;
    items.sort_by(|a, b| match order(a, b, "<") {
        Ok(ordering) => ordering.unwrap_or(Ordering::Equal),
        Err(err) => {
            failure.get_or_insert(err);
            Ordering::Equal
        }
    });
    failure.map_or(Ok(()), Err)
}

fn parse_int(text: &str, base: u32) -> Result<i64, ExprError> {
    let invalid =
        || ExprError::value_error(format!("invalid literal for int() with base {base}: '{text}'"));
    let cleaned: String = text.trim().chars().filter(|c| *c != '_').collect();
    let (negative, digits) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.strip_prefix('+').unwrap_or(&cleaned)),
    };
    let digits = match base {
        16 => digits.trim_start_matches("0x").trim_start_matches("0X"),
        8 => digits.trim_start_matches("0o").trim_start_matches("0O"),
        2 => digits.trim_start_matches("0b").trim_start_matches("0B"),
        _ => digits,
    };
    let magnitude = i64::from_str_radix(digits, base).map_err(|_| invalid())?;
    Ok(if negative { -magnitude } else { magnitude })
}

fn round_float(value: f64, digits: i64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    if digits >= 0 {
        let places = digits.min(20) as usize;
        return format!("{value:.places$}").parse().unwrap_or(value);
    }
    let factor = 10f64.powi((-digits).min(308) as i32);
    (value / factor).round_ties_even() * factor
}

fn builtin(name: &str, args: Args) -> EvalResult {
    match name {
        "str" => {
            let [value] = args.bind(name, ["object"], 0)?;
            Ok(Value::Str(value.map(|v| v.to_string()).unwrap_or_default()))
        }
        "repr" => {
            let [value] = args.bind(name, ["object"], 1)?;
            Ok(Value::Str(value.unwrap_or(Value::None).repr()))
        }
        "int" => {
            let [value, base] = args.bind(name, ["x", "base"], 0)?;
            let base = match &base {
                Some(b) => int_arg(b, "base")?,
                None => 10,
            };
            if !(2..=36).contains(&base) {
                return Err(ExprError::value_error("int() base must be >= 2 and <= 36"));
            }
            let base = base as u32;
            match value.unwrap_or(Value::Int(0)) {
                Value::Bool(b) => Ok(Value::Int(b as i64)),
                Value::Int(i) => Ok(Value::Int(i)),
                Value::Float(f) => Ok(Value::Int(float_to_int(f.trunc())?)),
                Value::Decimal(d) => i64::try_from(d.trunc())
                    .map(Value::Int)
                    .map_err(|_| ExprError::value_error("integer out of range")),
                Value::Str(s) => parse_int(&s, base).map(Value::Int),
                other => Err(ExprError::type_error(format!(
                    "int() argument must be a string or a number, not '{}'",
                    other.type_name()
                ))),
            }
        }
        "float" => {
            let [value] = args.bind(name, ["x"], 0)?;
            match value.unwrap_or(Value::Float(0.0)) {
                Value::Str(s) => {
                    let text = s.trim().to_ascii_lowercase();
                    let parsed = match text.trim_start_matches(['+', '-']) {
                        "inf" | "infinity" | "nan" => text.parse::<f64>().ok(),
                        _ => text.replace('_', "").parse::<f64>().ok(),
                    };
                    parsed.map(Value::Float).ok_or_else(|| {
                        ExprError::value_error(format!(
                            "could not convert string to float: '{s}'"
                        ))
                    })
                }
                other => float_arg(&other, "float() argument").map(Value::Float),
            }
        }
        "bool" => {
            let [value] = args.bind(name, ["x"], 0)?;
            Ok(Value::Bool(value.is_some_and(|v| v.is_truthy())))
        }
        "len" => {
            let [value] = args.bind(name, ["obj"], 1)?;
            let len = match value.unwrap_or(Value::None) {
                Value::Str(s) => s.chars().count(),
                Value::Bytes(b) => b.len(),
                Value::List(items) | Value::Tuple(items) => items.len(),
                Value::Dict(map) => map.len(),
                other => {
                    return Err(ExprError::type_error(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    )));
                }
            };
            Ok(Value::Int(len as i64))
        }
        "abs" => {
            let [value] = args.bind(name, ["x"], 1)?;
            match value.unwrap_or(Value::None) {
                Value::Bool(b) => Ok(Value::Int(b as i64)),
                Value::Int(i) => Ok(i
                    .checked_abs()
                    .map(Value::Int)
                    .unwrap_or(Value::Float((i as f64).abs()))),
                Value::Float(f) => Ok(Value::Float(f.abs())),
                Value::Decimal(d) => Ok(Value::Decimal(d.abs())),
                Value::TimeDelta(d) => Ok(Value::TimeDelta(d.abs())),
                other => Err(ExprError::type_error(format!(
                    "bad operand type for abs(): '{}'",
                    other.type_name()
                ))),
            }
        }
        "round" => {
            let [value, digits] = args.bind(name, ["number", "ndigits"], 1)?;
            let digits = match digits {
                None | Some(Value::None) => None,
                Some(d) => Some(int_arg(&d, "ndigits")?),
            };
            match (value.unwrap_or(Value::None), digits) {
                (Value::Float(f), None) => Ok(Value::Int(float_to_int(f.round_ties_even())?)),
                (Value::Float(f), Some(n)) => Ok(Value::Float(round_float(f, n))),
                (Value::Int(i), None) | (Value::Int(i), Some(0..)) => Ok(Value::Int(i)),
                (Value::Int(i), Some(n)) => {
                    let factor = 10f64.powi((-n).min(18) as i32);
                    let scaled = (i as f64 / factor).round_ties_even() * factor;
                    Ok(Value::Int(float_to_int(scaled)?))
                }
                (Value::Bool(b), _) => Ok(Value::Int(b as i64)),
                (Value::Decimal(d), None) => i64::try_from(d.round_dp(0).trunc())
                    .map(Value::Int)
                    .map_err(|_| ExprError::value_error("integer out of range")),
                (Value::Decimal(d), Some(n)) if n >= 0 => {
                    Ok(Value::Decimal(d.round_dp(n.min(28) as u32)))
                }
                (Value::Decimal(d), Some(n)) => Ok(Value::Float(round_float(d.to_f64(), n))),
                (other, _) => Err(ExprError::type_error(format!(
                    "type {} doesn't define __round__ method",
                    other.type_name()
                ))),
            }
        }
        "min" => extremum(name, args, Ordering::Less),
        "max" => extremum(name, args, Ordering::Greater),
        "sum" => {
            let [iterable, start] = args.bind(name, ["iterable", "start"], 1)?;
            let iterable = iterable.unwrap_or(Value::None);
            if iterable.is_number() {
                return Ok(iterable);
            }
            let mut total = start.unwrap_or(Value::Int(0));
            for item in iterate(&iterable)? {
                if item.is_none() {
                    continue;
                }
                total = binary(BinaryOp::Add, &total, &item)?;
            }
            Ok(total)
        }
        "list" | "tuple" => {
            let [value] = args.bind(name, ["iterable"], 0)?;
            let items = match value {
                Some(v) => iterate(&v)?,
                None => Vec::new(),
            };
            Ok(if name == "list" {
                Value::List(items)
            } else {
                Value::Tuple(items)
            })
        }
        "sorted" => {
            let [value, reverse] = args.bind(name, ["iterable", "reverse"], 1)?;
            let mut items = iterate(&value.unwrap_or(Value::None))?;
            sort_values(&mut items)?;
            if reverse.is_some_and(|r| r.is_truthy()) {
                items.reverse();
            }
            Ok(Value::List(items))
        }
        "reversed" => {
            let [value] = args.bind(name, ["sequence"], 1)?;
            let mut items = iterate(&value.unwrap_or(Value::None))?;
            items.reverse();
            Ok(Value::List(items))
        }
        "range" => {
            let positional = args.positional_only(name)?;
            let ints = positional
                .iter()
                .map(|v| int_arg(v, "range() argument"))
                .collect::<Result<Vec<_>, _>>()?;
            let (start, stop, step) = match ints.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step] => (*start, *stop, *step),
                _ => return Err(ExprError::type_error("range expected 1 to 3 arguments")),
            };
            if step == 0 {
                return Err(ExprError::value_error("range() arg 3 must not be zero"));
            }
            let span = if step > 0 {
                stop.saturating_sub(start)
            } else {
                start.saturating_sub(stop)
            };
            let count = (span.max(0) as u64).div_ceil(step.unsigned_abs());
            if count > 1_000_000 {
                return Err(ExprError::value_error("range() too large"));
            }
            Ok(Value::List(
                (0..count as i64).map(|i| Value::Int(start + i * step)).collect(),
            ))
        }
        "format" => {
            let [value, spec] = args.bind(name, ["value", "format_spec"], 1)?;
            let spec = spec.unwrap_or(Value::Str(String::new()));
            format_spec(&value.unwrap_or(Value::None), str_arg(&spec, "format_spec")?)
                .map(Value::Str)
        }
        "any" | "all" => {
            let [value] = args.bind(name, ["iterable"], 1)?;
            let items = iterate(&value.unwrap_or(Value::None))?;
            Ok(Value::Bool(if name == "any" {
                items.iter().any(Value::is_truthy)
            } else {
                items.iter().all(Value::is_truthy)
            }))
        }
        "chr" => {
            let [value] = args.bind(name, ["i"], 1)?;
            let code = int_arg(&value.unwrap_or(Value::None), "chr() argument")?;
            u32::try_from(code)
                .ok()
                .and_then(char::from_u32)
                .map(|c| Value::Str(c.to_string()))
                .ok_or_else(|| ExprError::value_error("chr() arg not in range"))
        }
        "ord" => {
            let [value] = args.bind(name, ["c"], 1)?;
            let value = value.unwrap_or(Value::None);
            let text = str_arg(&value, "ord() argument")?;
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Value::Int(c as i64)),
                _ => Err(ExprError::type_error(
                    "ord() expected a character of length 1",
                )),
            }
        }
        other => Err(ExprError::Name(other.to_string())),
    }
}

fn construct(ty: Namespace, args: Args) -> EvalResult {
    match ty {
        Namespace::DateType => {
            let [y, m, d] = args.bind("date", ["year", "month", "day"], 3)?;
            let (y, m, d) = (
                int_arg(&y.unwrap_or(Value::None), "year")?,
                int_arg(&m.unwrap_or(Value::None), "month")?,
                int_arg(&d.unwrap_or(Value::None), "day")?,
            );
            make_date(y, m, d).map(Value::Date)
        }
        Namespace::DateTimeType => {
            let parts = args.bind(
                "datetime",
                ["year", "month", "day", "hour", "minute", "second", "microsecond"],
                3,
            )?;
            let mut ints = [0i64; 7];
            for (slot, part) in ints.iter_mut().zip(parts) {
                if let Some(value) = part {
                    *slot = int_arg(&value, "datetime argument")?;
                }
            }
            let date = make_date(ints[0], ints[1], ints[2])?;
            let time = make_time(ints[3], ints[4], ints[5], ints[6])?;
            Ok(Value::DateTime(date.and_time(time)))
        }
        Namespace::TimeType => {
            let parts = args.bind("time", ["hour", "minute", "second", "microsecond"], 0)?;
            let mut ints = [0i64; 4];
            for (slot, part) in ints.iter_mut().zip(parts) {
                if let Some(value) = part {
                    *slot = int_arg(&value, "time argument")?;
                }
            }
            make_time(ints[0], ints[1], ints[2], ints[3]).map(Value::Time)
        }
        Namespace::TimeDeltaType => {
            const UNITS: [(&str, f64); 7] = [
                ("days", 86_400_000_000.0),
                ("seconds", 1_000_000.0),
                ("microseconds", 1.0),
                ("milliseconds", 1_000.0),
                ("minutes", 60_000_000.0),
                ("hours", 3_600_000_000.0),
                ("weeks", 604_800_000_000.0),
            ];
            let parts = args.bind("timedelta", UNITS.map(|(name, _)| name), 0)?;
            let mut micros = 0.0;
            for (part, (unit, scale)) in parts.into_iter().zip(UNITS) {
                if let Some(value) = part {
                    micros += float_arg(&value, unit)? * scale;
                }
            }
            Ok(Value::TimeDelta(TimeDelta::microseconds(float_to_int(
                micros.round_ties_even(),
            )?)))
        }
        Namespace::DecimalType => {
            let [value] = args.bind("Decimal", ["value"], 0)?;
            let decimal = match value.unwrap_or(Value::Int(0)) {
                Value::Bool(b) => Some(Decimal::from_i64(b as i64)),
                Value::Int(i) => Some(Decimal::from_i64(i)),
                Value::Float(f) => Decimal::from_f64(f),
                Value::Decimal(d) => Some(d),
                Value::Str(s) => Decimal::parse(&s.replace('_', "")),
                other => {
                    return Err(ExprError::type_error(format!(
                        "conversion from {} to Decimal is not supported",
                        other.type_name()
                    )));
                }
            };
            decimal
                .map(Value::Decimal)
                .ok_or_else(|| ExprError::value_error("invalid literal for Decimal"))
        }
        other => Err(ExprError::type_error(format!(
            "'{}' module is not callable",
            other.name()
        ))),
    }
}

fn make_date(year: i64, month: i64, day: i64) -> Result<NaiveDate, ExprError> {
    i32::try_from(year)
        .ok()
        .zip(u32::try_from(month).ok())
        .zip(u32::try_from(day).ok())
        .and_then(|((y, m), d)| NaiveDate::from_ymd_opt(y, m, d))
        .ok_or_else(|| ExprError::value_error("day is out of range for month"))
}

fn make_time(hour: i64, minute: i64, second: i64, micro: i64) -> Result<NaiveTime, ExprError> {
    let part = |v: i64| u32::try_from(v).ok();
    let time = match (part(hour), part(minute), part(second), part(micro)) {
        (Some(h), Some(m), Some(s), Some(us)) => NaiveTime::from_hms_micro_opt(h, m, s, us),
        _ => None,
    };
    time.ok_or_else(|| ExprError::value_error("time component out of range"))
}

fn namespace_call(ns: Namespace, name: &str, args: Args) -> EvalResult {
    match ns {
        Namespace::Math => math_call(name, args),
        Namespace::DateType if name == "today" => {
            args.bind::<0>("today", [], 0)?;
            Ok(Value::Date(Local::now().date_naive()))
        }
        Namespace::DateTimeType if name == "now" || name == "today" => {
            args.bind::<0>(name, [], 0)?;
            Ok(Value::DateTime(Local::now().naive_local()))
        }
        Namespace::DateTimeType if name == "strptime" => {
            let [text, fmt] = args.bind(name, ["date_string", "format"], 2)?;
            let (text, fmt) = (text.unwrap_or(Value::None), fmt.unwrap_or(Value::None));
            let (text, fmt) = (str_arg(&text, "date_string")?, str_arg(&fmt, "format")?);
            NaiveDateTime::parse_from_str(text, fmt)
                .or_else(|_| {
                    NaiveDate::parse_from_str(text, fmt).map(|d| d.and_time(NaiveTime::MIN))
                })
                .map(Value::DateTime)
                .map_err(|_| {
                    ExprError::value_error(format!(
                        "time data '{text}' does not match format '{fmt}'"
                    ))
                })
        }
        Namespace::DateType if name == "fromisoformat" => {
            let [text] = args.bind(name, ["date_string"], 1)?;
            let text = text.unwrap_or(Value::None);
            NaiveDate::parse_from_str(str_arg(&text, "date_string")?, "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|_| ExprError::value_error("Invalid isoformat string"))
        }
        other => Err(ExprError::Attribute {
            owner: other.name().to_string(),
            attr: name.to_string(),
        }),
    }
}

fn math_call(name: &str, args: Args) -> EvalResult {
    let values = args.positional_only(name)?;
    let floats = values
        .iter()
        .map(|v| float_arg(v, "math argument"))
        .collect::<Result<Vec<_>, _>>()?;
    let domain = || ExprError::value_error("math domain error");
    let unary = |f: fn(f64) -> f64| -> EvalResult {
        match floats.as_slice() {
            [x] => Ok(Value::Float(f(*x))),
            _ => Err(ExprError::type_error(format!(
                "math.{name}() takes exactly one argument ({} given)",
                floats.len()
            ))),
        }
    };
    let binary_args = || -> Result<(f64, f64), ExprError> {
        match floats.as_slice() {
            [a, b] => Ok((*a, *b)),
            _ => Err(ExprError::type_error(format!(
                "math.{name}() expected 2 arguments, got {}",
                floats.len()
            ))),
        }
    };
    match name {
        "sqrt" => match floats.as_slice() {
            [x] if *x < 0.0 => Err(domain()),
            _ => unary(f64::sqrt),
        },
        "floor" | "ceil" | "trunc" => {
            if let [value @ (Value::Int(_) | Value::Bool(_))] = values.as_slice() {
                return Ok(Value::Int(int_arg(value, name)?));
            }
            let op: fn(f64) -> f64 = match name {
                "floor" => f64::floor,
                "ceil" => f64::ceil,
                _ => f64::trunc,
            };
            match unary(op)? {
                Value::Float(f) => float_to_int(f).map(Value::Int),
                other => Ok(other),
            }
        }
        "fabs" => unary(f64::abs),
        "exp" => unary(f64::exp),
        "sin" => unary(f64::sin),
        "cos" => unary(f64::cos),
        "tan" => unary(f64::tan),
        "asin" => unary(f64::asin),
        "acos" => unary(f64::acos),
        "atan" => unary(f64::atan),
        "degrees" => unary(f64::to_degrees),
        "radians" => unary(f64::to_radians),
        "log10" | "log2" => match floats.as_slice() {
            [x] if *x <= 0.0 => Err(domain()),
            _ => unary(if name == "log10" { f64::log10 } else { f64::log2 }),
        },
        "log" => match floats.as_slice() {
            [x] if *x > 0.0 => Ok(Value::Float(x.ln())),
            [x, base] if *x > 0.0 && *base > 0.0 && *base != 1.0 => {
                Ok(Value::Float(x.ln() / base.ln()))
            }
            [_] | [_, _] => Err(domain()),
            _ => Err(ExprError::type_error("log expected 1 or 2 arguments")),
        },
        "pow" => {
            let (a, b) = binary_args()?;
            Ok(Value::Float(a.powf(b)))
        }
        "atan2" => {
            let (y, x) = binary_args()?;
            Ok(Value::Float(y.atan2(x)))
        }
        "hypot" => {
            let (a, b) = binary_args()?;
            Ok(Value::Float(a.hypot(b)))
        }
        "fmod" => {
            let (a, b) = binary_args()?;
            if b == 0.0 {
                return Err(domain());
            }
            Ok(Value::Float(a % b))
        }
        "copysign" => {
            let (a, b) = binary_args()?;
            Ok(Value::Float(a.copysign(b)))
        }
        "isnan" | "isinf" => match floats.as_slice() {
            [x] => Ok(Value::Bool(if name == "isnan" {
                x.is_nan()
            } else {
                x.is_infinite()
            })),
            _ => Err(ExprError::type_error(format!("math.{name}() takes one argument"))),
        },
        other => Err(ExprError::Attribute {
            owner: "math".to_string(),
            attr: other.to_string(),
        }),
    }
}

fn method(receiver: &Value, name: &str, args: Args) -> EvalResult {
    match receiver {
        Value::Str(s) => str_method(s, name, args),
        Value::List(items) | Value::Tuple(items) => {
            let positional = args.positional_only(name)?;
            match (name, positional.as_slice()) {
                ("count", [needle]) => Ok(Value::Int(
                    items.iter().filter(|item| values_equal(item, needle)).count() as i64,
                )),
                ("index", [needle]) => items
                    .iter()
                    .position(|item| values_equal(item, needle))
                    .map(|i| Value::Int(i as i64))
                    .ok_or_else(|| ExprError::value_error(format!("{} is not in list", needle.repr()))),
                _ => Err(no_attribute(receiver, name)),
            }
        }
        Value::Dict(map) => match name {
            "get" => {
                let [key, default] = args.bind(name, ["key", "default"], 1)?;
                let key = key.unwrap_or(Value::None);
                let found = match &key {
                    Value::Str(k) => map.get(k).cloned(),
                    other => map.get(&other.to_string()).cloned(),
                };
                Ok(found.or(default).unwrap_or(Value::None))
            }
            "keys" => Ok(Value::List(map.keys().map(|k| Value::Str(k.clone())).collect())),
            "values" => Ok(Value::List(map.values().cloned().collect())),
            "items" => Ok(Value::List(
                map.iter()
                    .map(|(k, v)| Value::Tuple(vec![Value::Str(k.clone()), v.clone()]))
                    .collect(),
            )),
            _ => Err(no_attribute(receiver, name)),
        },
        Value::Date(_) | Value::DateTime(_) | Value::Time(_) => date_method(receiver, name, args),
        Value::TimeDelta(d) if name == "total_seconds" => {
            args.bind::<0>(name, [], 0)?;
            Ok(Value::Float(
                d.num_microseconds()
                    .map(|us| us as f64 / 1e6)
                    .unwrap_or(d.num_seconds() as f64),
            ))
        }
        Value::Decimal(d) if name == "quantize" => {
            let [exp] = args.bind(name, ["exp"], 1)?;
            match exp {
                Some(Value::Decimal(exp)) => Ok(Value::Decimal(d.round_dp(exp.scale()))),
                _ => Err(ExprError::type_error("quantize() requires a Decimal")),
            }
        }
        Value::Float(f) if name == "is_integer" => Ok(Value::Bool(f.fract() == 0.0)),
        _ => Err(no_attribute(receiver, name)),
    }
}

fn no_attribute(receiver: &Value, name: &str) -> ExprError {
    ExprError::Attribute {
        owner: receiver.type_name().to_string(),
        attr: name.to_string(),
    }
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;
    for ch in s.chars() {
        if ch.is_alphabetic() {
            if in_word {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(ch);
            in_word = false;
        }
    }
    out
}

fn justify(s: &str, width: i64, fill: char, how: char) -> String {
    let len = s.chars().count() as i64;
    if width <= len {
        return s.to_string();
    }
    let margin = width - len;
    let left = match how {
        'l' => 0,
        'r' => margin,
        _ => margin / 2 + (margin & width & 1),
    };
    let fills = |n: i64| std::iter::repeat_n(fill, n as usize).collect::<String>();
    format!("{}{s}{}", fills(left), fills(margin - left))
}

fn str_method(s: &str, name: &str, args: Args) -> EvalResult {
    let text = |v: String| Ok(Value::Str(v));
    match name {
        "upper" => text(s.to_uppercase()),
        "lower" => text(s.to_lowercase()),
        "strip" | "lstrip" | "rstrip" => {
            let [chars] = args.bind(name, ["chars"], 0)?;
            let set: Option<Vec<char>> = match chars {
                Some(Value::Str(c)) => Some(c.chars().collect()),
                _ => None,
            };
            let matches = |c: char| match &set {
                Some(set) => set.contains(&c),
                None => c.is_whitespace(),
            };
            text(match name {
                "strip" => s.trim_matches(matches),
                "lstrip" => s.trim_start_matches(matches),
                _ => s.trim_end_matches(matches),
            }
            .to_string())
        }
        "title" => text(title_case(s)),
        "capitalize" => {
            let mut chars = s.chars();
            text(match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
                None => String::new(),
            })
        }
        "swapcase" => text(
            s.chars()
                .map(|c| {
                    if c.is_uppercase() {
                        c.to_lowercase().collect::<String>()
                    } else {
                        c.to_uppercase().collect()
                    }
                })
                .collect(),
        ),
        "replace" => {
            let [old, new, count] = args.bind(name, ["old", "new", "count"], 2)?;
            let (old, new) = (old.unwrap_or(Value::None), new.unwrap_or(Value::None));
            let (old, new) = (str_arg(&old, "old")?, str_arg(&new, "new")?);
            match count.map(|c| int_arg(&c, "count")).transpose()? {
                Some(n) if n >= 0 => text(s.replacen(old, new, n as usize)),
                _ => text(s.replace(old, new)),
            }
        }
        "startswith" | "endswith" => {
            let [affix] = args.bind(name, ["prefix"], 1)?;
            let candidates = match affix.unwrap_or(Value::None) {
                Value::Tuple(items) => items,
                other => vec![other],
            };
            for candidate in &candidates {
                let candidate = str_arg(candidate, name)?;
                let hit = if name == "startswith" {
                    s.starts_with(candidate)
                } else {
                    s.ends_with(candidate)
                };
                if hit {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        "split" | "rsplit" => {
            let [sep, maxsplit] = args.bind(name, ["sep", "maxsplit"], 0)?;
            let limit = match maxsplit {
                Some(v) => int_arg(&v, "maxsplit")?,
                None => -1,
            };
            let parts: Vec<String> = match sep {
                None | Some(Value::None) => {
                    let words: Vec<&str> = s.split_whitespace().collect();
                    if limit < 0 || words.len() as i64 <= limit {
                        words.iter().map(|w| w.to_string()).collect()
                    } else {
                        let mut rest = s.trim_start();
                        let mut out = Vec::new();
                        for _ in 0..limit {
                            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
                            out.push(rest[..end].to_string());
                            rest = rest[end..].trim_start();
                        }
                        out.push(rest.to_string());
                        out
                    }
                }
                Some(sep) => {
                    let sep = str_arg(&sep, "sep")?;
                    if sep.is_empty() {
                        return Err(ExprError::value_error("empty separator"));
                    }
                    match (limit, name) {
                        (l, _) if l < 0 => s.split(sep).map(str::to_string).collect(),
                        (l, "rsplit") => {
                            let mut out: Vec<String> =
                                s.rsplitn(l as usize + 1, sep).map(str::to_string).collect();
                            out.reverse();
                            out
                        }
                        (l, _) => s.splitn(l as usize + 1, sep).map(str::to_string).collect(),
                    }
                }
            };
            Ok(Value::List(parts.into_iter().map(Value::Str).collect()))
        }
        "splitlines" => Ok(Value::List(
            s.lines().map(|line| Value::Str(line.to_string())).collect(),
        )),
        "join" => {
            let [items] = args.bind(name, ["iterable"], 1)?;
            let items = iterate(&items.unwrap_or(Value::None))?;
            let parts = items
                .iter()
                .map(|item| str_arg(item, "sequence item").map(str::to_string))
                .collect::<Result<Vec<_>, _>>()?;
            text(parts.join(s))
        }
        "zfill" => {
            let [width] = args.bind(name, ["width"], 1)?;
            let width = int_arg(&width.unwrap_or(Value::None), "width")?;
            let len = s.chars().count() as i64;
            if width <= len {
                return text(s.to_string());
            }
            let pad = check_result_len(usize::try_from(width - len).ok(), "zfill width")?;
            let zeros = "0".repeat(pad);
            text(match s.chars().next() {
                Some(sign @ ('+' | '-')) => format!("{sign}{zeros}{}", &s[1..]),
                _ => format!("{zeros}{s}"),
            })
        }
        "ljust" | "rjust" | "center" => {
            let [width, fill] = args.bind(name, ["width", "fillchar"], 1)?;
            let width = int_arg(&width.unwrap_or(Value::None), "width")?;
            let fill = match fill {
                Some(Value::Str(f)) if f.chars().count() == 1 => f.chars().next().unwrap_or(' '),
                Some(_) => {
                    return Err(ExprError::type_error(
                        "The fill character must be exactly one character long",
                    ));
                }
                None => ' ',
            };
            check_result_len(usize::try_from(width.max(0)).ok(), "width")?;
            let how = match name {
                "ljust" => 'l',
                "rjust" => 'r',
                _ => 'c',
            };
            text(justify(s, width, fill, how))
        }
        "find" | "rfind" | "index" | "count" => {
            let [needle] = args.bind(name, ["sub"], 1)?;
            let needle = needle.unwrap_or(Value::None);
            let needle = str_arg(&needle, "substring")?;
            let char_index = |byte: usize| s[..byte].chars().count() as i64;
            match name {
                "count" => Ok(Value::Int(if needle.is_empty() {
                    s.chars().count() as i64 + 1
                } else {
                    s.matches(needle).count() as i64
                })),
                "rfind" => Ok(Value::Int(s.rfind(needle).map_or(-1, char_index))),
                "index" => s
                    .find(needle)
                    .map(|b| Value::Int(char_index(b)))
                    .ok_or_else(|| ExprError::value_error("substring not found")),
                _ => Ok(Value::Int(s.find(needle).map_or(-1, char_index))),
            }
        }
        "format" => {
            let kwargs: BTreeMap<String, Value> = args.keywords.into_iter().collect();
            brace_format(s, &args.positional, &kwargs).map(Value::Str)
        }
        "isdigit" => Ok(Value::Bool(!s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))),
        "isalpha" => Ok(Value::Bool(!s.is_empty() && s.chars().all(char::is_alphabetic))),
        "isalnum" => Ok(Value::Bool(!s.is_empty() && s.chars().all(char::is_alphanumeric))),
        "isspace" => Ok(Value::Bool(!s.is_empty() && s.chars().all(char::is_whitespace))),
        "isupper" => Ok(Value::Bool(
            s.chars().any(char::is_alphabetic) && !s.chars().any(char::is_lowercase),
        )),
        "islower" => Ok(Value::Bool(
            s.chars().any(char::is_alphabetic) && !s.chars().any(char::is_uppercase),
        )),
        "encode" => Ok(Value::Bytes(s.as_bytes().to_vec())),
        _ => Err(ExprError::Attribute {
            owner: "str".to_string(),
            attr: name.to_string(),
        }),
    }
}

fn date_method(receiver: &Value, name: &str, args: Args) -> EvalResult {
    let date = match receiver {
        Value::Date(d) => Some(*d),
        Value::DateTime(dt) => Some(dt.date()),
        _ => None,
    };
    match name {
        "strftime" => {
            let [fmt] = args.bind(name, ["format"], 1)?;
            let fmt = fmt.unwrap_or(Value::None);
            let fmt = str_arg(&fmt, "format")?;
            let mut out = String::new();
            let written = match receiver {
                Value::Date(d) => write!(out, "{}", d.format(fmt)),
                Value::DateTime(dt) => write!(out, "{}", dt.format(fmt)),
                Value::Time(t) => write!(out, "{}", t.format(fmt)),
                _ => Ok(()),
            };
            written.map_err(|_| ExprError::value_error(format!("invalid format string '{fmt}'")))?;
            Ok(Value::Str(out))
        }
        "isoformat" => {
            args.bind::<0>(name, [], 0)?;
            Ok(Value::Str(match receiver {
                Value::DateTime(dt) => dt.format("%Y-%m-%dT%H:%M:%S").to_string(),
                Value::Time(t) => t.format("%H:%M:%S").to_string(),
                other => other.to_string(),
            }))
        }
        "weekday" | "isoweekday" => {
            args.bind::<0>(name, [], 0)?;
            let date = date.ok_or_else(|| no_attribute(receiver, name))?;
            let monday_based = date.weekday().num_days_from_monday() as i64;
            Ok(Value::Int(if name == "weekday" {
                monday_based
            } else {
                monday_based + 1
            }))
        }
        "date" => match receiver {
            Value::DateTime(dt) => Ok(Value::Date(dt.date())),
            _ => Err(no_attribute(receiver, name)),
        },
        "time" => match receiver {
            Value::DateTime(dt) => Ok(Value::Time(dt.time())),
            _ => Err(no_attribute(receiver, name)),
        },
        "toordinal" => {
            let date = date.ok_or_else(|| no_attribute(receiver, name))?;
            Ok(Value::Int(date.num_days_from_ce() as i64))
        }
        _ => Err(no_attribute(receiver, name)),
    }
}

fn subscript(container: &Value, index: &Value) -> EvalResult {
    let position = |len: usize| -> Result<usize, ExprError> {
        let i = index.as_i64().ok_or_else(|| {
            ExprError::type_error(format!(
                "{} indices must be integers, not {}",
                container.type_name(),
                index.type_name()
            ))
        })?;
        let resolved = if i < 0 { i + len as i64 } else { i };
        if resolved < 0 || resolved >= len as i64 {
            return Err(ExprError::Index);
        }
        Ok(resolved as usize)
    };
    match container {
        Value::List(items) | Value::Tuple(items) => Ok(items[position(items.len())?].clone()),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::Str(chars[position(chars.len())?].to_string()))
        }
        Value::Bytes(b) => Ok(Value::Int(b[position(b.len())?] as i64)),
        Value::Dict(map) => {
            let key = match index {
                Value::Str(k) => k.clone(),
                other => other.to_string(),
            };
            map.get(&key)
                .cloned()
                .ok_or_else(|| ExprError::Key(index.repr()))
        }
        other => Err(ExprError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn slice_positions(len: usize, lower: Option<i64>, upper: Option<i64>, step: Option<i64>) -> Result<Vec<usize>, ExprError> {
    let len = len as i64;
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(ExprError::value_error("slice step cannot be zero"));
    }
    let clamp = |value: i64, low: i64, high: i64| {
        let value = if value < 0 { value + len } else { value };
        value.clamp(low, high)
    };
    let mut out = Vec::new();
    if step > 0 {
        let start = lower.map_or(0, |v| clamp(v, 0, len));
        let stop = upper.map_or(len, |v| clamp(v, 0, len));
        let mut i = start;
        while i < stop {
            out.push(i as usize);
            i += step;
        }
    } else {
        let start = lower.map_or(len - 1, |v| clamp(v, -1, len - 1));
        let stop = upper.map_or(-1, |v| clamp(v, -1, len - 1));
        let mut i = start;
        while i > stop {
            out.push(i as usize);
            i += step;
        }
    }
    Ok(out)
}

fn slice(container: &Value, lower: Option<i64>, upper: Option<i64>, step: Option<i64>) -> EvalResult {
    match container {
        Value::List(items) | Value::Tuple(items) => {
            let picked: Vec<Value> = slice_positions(items.len(), lower, upper, step)?
                .into_iter()
                .map(|i| items[i].clone())
                .collect();
            Ok(match container {
                Value::List(_) => Value::List(picked),
                _ => Value::Tuple(picked),
            })
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::Str(
                slice_positions(chars.len(), lower, upper, step)?
                    .into_iter()
                    .map(|i| chars[i])
                    .collect(),
            ))
        }
        Value::Bytes(b) => Ok(Value::Bytes(
            slice_positions(b.len(), lower, upper, step)?
                .into_iter()
                .map(|i| b[i])
                .collect(),
        )),
        other => Err(ExprError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn unary(op: UnaryOp, operand: Value) -> EvalResult {
    match (op, operand) {
        (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
        (UnaryOp::Neg, Value::Bool(b)) => Ok(Value::Int(-(b as i64))),
        (UnaryOp::Neg, Value::Int(i)) => Ok(i
            .checked_neg()
            .map(Value::Int)
            .unwrap_or(Value::Float(-(i as f64)))),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Neg, Value::Decimal(d)) => Ok(Value::Decimal(d.neg())),
        (UnaryOp::Neg, Value::TimeDelta(d)) => Ok(Value::TimeDelta(-d)),
        (UnaryOp::Pos, Value::Bool(b)) => Ok(Value::Int(b as i64)),
        (UnaryOp::Pos, value) if value.is_number() || matches!(value, Value::TimeDelta(_)) => {
            Ok(value)
        }
        (op, value) => Err(ExprError::type_error(format!(
            "bad operand type for unary {}: '{}'",
            if op == UnaryOp::Neg { "-" } else { "+" },
            value.type_name()
        ))),
    }
}

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
    Dec(Decimal),
}

fn number(value: &Value) -> Option<Num> {
    match value {
        Value::Bool(b) => Some(Num::Int(*b as i64)),
        Value::Int(i) => Some(Num::Int(*i)),
        Value::Float(f) => Some(Num::Float(*f)),
        Value::Decimal(d) => Some(Num::Dec(*d)),
        _ => None,
    }
}

impl Num {
    fn to_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
            Num::Dec(d) => d.to_f64(),
        }
    }

    fn to_decimal(self) -> Option<Decimal> {
        match self {
            Num::Int(i) => Some(Decimal::from_i64(i)),
            Num::Dec(d) => Some(d),
            Num::Float(_) => None,
        }
    }
}

fn int_arith(op: BinaryOp, a: i64, b: i64) -> EvalResult {
    let float = || float_arith(op, a as f64, b as f64);
    let checked = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div => return float(),
        BinaryOp::FloorDiv => {
            if b == 0 {
                return Err(ExprError::ZeroDivision);
            }
            a.checked_div(b).map(|q| {
                if (a % b != 0) && ((a < 0) != (b < 0)) {
                    q - 1
                } else {
                    q
                }
            })
        }
        BinaryOp::Mod => {
            if b == 0 {
                return Err(ExprError::ZeroDivision);
            }
            let r = a.checked_rem(b).unwrap_or(0);
            Some(if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r })
        }
        BinaryOp::Pow => {
            if b < 0 {
                return float();
            }
            u32::try_from(b).ok().and_then(|exp| a.checked_pow(exp))
        }
    };
    match checked {
        Some(value) => Ok(Value::Int(value)),
        None => float(),
    }
}

fn float_arith(op: BinaryOp, a: f64, b: f64) -> EvalResult {
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(ExprError::ZeroDivision);
            }
            a / b
        }
        BinaryOp::FloorDiv => {
            if b == 0.0 {
                return Err(ExprError::ZeroDivision);
            }
            (a / b).floor()
        }
        BinaryOp::Mod => {
            if b == 0.0 {
                return Err(ExprError::ZeroDivision);
            }
            let r = a % b;
            if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
                r + b
            } else {
                r
            }
        }
        BinaryOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(ExprError::ZeroDivision);
            }
            if a < 0.0 && b.fract() != 0.0 {
                return Err(ExprError::value_error("negative number cannot be raised to a fractional power"));
            }
            a.powf(b)
        }
    };
    Ok(Value::Float(result))
}

fn numeric(op: BinaryOp, a: Num, b: Num) -> EvalResult {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => int_arith(op, x, y),
        (Num::Float(_), _) | (_, Num::Float(_)) => float_arith(op, a.to_f64(), b.to_f64()),
        _ => {
            let (Some(x), Some(y)) = (a.to_decimal(), b.to_decimal()) else {
                return float_arith(op, a.to_f64(), b.to_f64());
            };
            let exact = match op {
                BinaryOp::Add => x.checked_add(&y),
                BinaryOp::Sub => x.checked_sub(&y),
                BinaryOp::Mul => x.checked_mul(&y),
                _ => None,
            };
            match exact {
                Some(d) => Ok(Value::Decimal(d)),
                None => float_arith(op, a.to_f64(), b.to_f64()),
            }
        }
    }
}

fn micros(d: &TimeDelta) -> Result<i64, ExprError> {
    d.num_microseconds()
        .ok_or_else(|| ExprError::value_error("timedelta out of range"))
}

fn timedelta_parts(d: &TimeDelta) -> (i64, i64, i64) {
    const DAY: i64 = 86_400_000_000;
    let total = d.num_microseconds().unwrap_or(d.num_seconds().saturating_mul(1_000_000));
    let days = total.div_euclid(DAY);
    let rest = total.rem_euclid(DAY);
    (days, rest / 1_000_000, rest % 1_000_000)
}

fn date_shift(date: NaiveDate, delta: &TimeDelta, forward: bool) -> EvalResult {
    let (days, _, _) = timedelta_parts(delta);
    let shift = TimeDelta::days(if forward { days } else { -days });
    date.checked_add_signed(shift)
        .map(Value::Date)
        .ok_or_else(|| ExprError::value_error("date value out of range"))
}

fn datetime_shift(dt: NaiveDateTime, delta: &TimeDelta, forward: bool) -> EvalResult {
    let shifted = if forward {
        dt.checked_add_signed(*delta)
    } else {
        dt.checked_sub_signed(*delta)
    };
    shifted
        .map(Value::DateTime)
        .ok_or_else(|| ExprError::value_error("date value out of range"))
}

fn repeat_sequence(value: &Value, count: i64) -> Option<EvalResult> {
    let n = count.max(0) as usize;
    let total = |len: usize| check_result_len(len.checked_mul(n), "repeated sequence");
    Some(match value {
        Value::Str(s) => total(s.len()).map(|_| Value::Str(s.repeat(n))),
        Value::List(items) => {
            total(items.len()).map(|len| Value::List(items.iter().cycle().take(len).cloned().collect()))
        }
        Value::Tuple(items) => {
            total(items.len()).map(|len| Value::Tuple(items.iter().cycle().take(len).cloned().collect()))
        }
        _ => return None,
    })
}

fn unsupported(op: BinaryOp, left: &Value, right: &Value) -> ExprError {
    ExprError::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        left.type_name(),
        right.type_name()
    ))
}

pub(crate) fn binary(op: BinaryOp, left: &Value, right: &Value) -> EvalResult {
    if let (Some(a), Some(b)) = (number(left), number(right)) {
        return numeric(op, a, b);
    }
    match (op, left, right) {
        (BinaryOp::Mod, Value::Str(template), args) => percent_format(template, args).map(Value::Str),
        (BinaryOp::Add, Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
        (BinaryOp::Add, Value::List(a), Value::List(b)) => {
            Ok(Value::List(a.iter().chain(b).cloned().collect()))
        }
        (BinaryOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
            Ok(Value::Tuple(a.iter().chain(b).cloned().collect()))
        }
        (BinaryOp::Add, Value::Bytes(a), Value::Bytes(b)) => {
            Ok(Value::Bytes(a.iter().chain(b).copied().collect()))
        }
        (BinaryOp::Mul, seq, Value::Int(n)) | (BinaryOp::Mul, Value::Int(n), seq)
            if matches!(seq, Value::Str(_) | Value::List(_) | Value::Tuple(_)) =>
        {
            repeat_sequence(seq, *n).unwrap_or_else(|| Err(unsupported(op, left, right)))
        }
        (BinaryOp::Add, Value::Date(d), Value::TimeDelta(td))
        | (BinaryOp::Add, Value::TimeDelta(td), Value::Date(d)) => date_shift(*d, td, true),
        (BinaryOp::Sub, Value::Date(d), Value::TimeDelta(td)) => date_shift(*d, td, false),
        (BinaryOp::Add, Value::DateTime(dt), Value::TimeDelta(td))
        | (BinaryOp::Add, Value::TimeDelta(td), Value::DateTime(dt)) => datetime_shift(*dt, td, true),
        (BinaryOp::Sub, Value::DateTime(dt), Value::TimeDelta(td)) => datetime_shift(*dt, td, false),
        (BinaryOp::Sub, Value::Date(a), Value::Date(b)) => {
            Ok(Value::TimeDelta(a.signed_duration_since(*b)))
        }
        (BinaryOp::Sub, Value::DateTime(a), Value::DateTime(b)) => {
            Ok(Value::TimeDelta(a.signed_duration_since(*b)))
        }
        (BinaryOp::Add | BinaryOp::Sub, Value::TimeDelta(a), Value::TimeDelta(b)) => {
            let sum = if op == BinaryOp::Add {
                a.checked_add(b)
            } else {
                a.checked_sub(b)
            };
            sum.map(Value::TimeDelta)
                .ok_or_else(|| ExprError::value_error("timedelta out of range"))
        }
        (BinaryOp::Mul, Value::TimeDelta(td), factor) | (BinaryOp::Mul, factor, Value::TimeDelta(td))
            if factor.is_number() =>
        {
            let scaled = micros(td)? as f64 * factor.as_f64().unwrap_or(0.0);
            Ok(Value::TimeDelta(TimeDelta::microseconds(float_to_int(scaled.round_ties_even())?)))
        }
        (BinaryOp::Div | BinaryOp::FloorDiv, Value::TimeDelta(a), Value::TimeDelta(b)) => {
            let (a, b) = (micros(a)?, micros(b)?);
            if b == 0 {
                return Err(ExprError::ZeroDivision);
            }
            int_arith(op, a, b)
        }
        (BinaryOp::Div | BinaryOp::FloorDiv, Value::TimeDelta(td), divisor) if divisor.is_number() => {
            let d = divisor.as_f64().unwrap_or(0.0);
            if d == 0.0 {
                return Err(ExprError::ZeroDivision);
            }
            let q = micros(td)? as f64 / d;
            let q = if op == BinaryOp::FloorDiv { q.floor() } else { q.round_ties_even() };
            Ok(Value::TimeDelta(TimeDelta::microseconds(float_to_int(q)?)))
        }
        _ => Err(unsupported(op, left, right)),
    }
}

pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    if let (Some(a), Some(b)) = (number(left), number(right)) {
        return match (a, b) {
            (Num::Int(x), Num::Int(y)) => x == y,
            (Num::Float(_), _) | (_, Num::Float(_)) => a.to_f64() == b.to_f64(),
            _ => a.to_decimal() == b.to_decimal(),
        };
    }
    match (left, right) {
        (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Dict(a), Value::Dict(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b)
                    .all(|((ka, va), (kb, vb))| ka == kb && values_equal(va, vb))
        }
        _ => left == right,
    }
}

/// Python ordering. `Ok(None)` means unordered (a NaN was involved).
pub(crate) fn order(left: &Value, right: &Value, symbol: &str) -> Result<Option<Ordering>, ExprError> {
    if let (Some(a), Some(b)) = (number(left), number(right)) {
        return Ok(match (a, b) {
            (Num::Int(x), Num::Int(y)) => Some(x.cmp(&y)),
            (Num::Float(_), _) | (_, Num::Float(_)) => a.to_f64().partial_cmp(&b.to_f64()),
            _ => a.to_decimal().zip(b.to_decimal()).map(|(x, y)| x.cmp(&y)),
        });
    }
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
        (Value::Bytes(a), Value::Bytes(b)) => Ok(Some(a.cmp(b))),
        (Value::Date(a), Value::Date(b)) => Ok(Some(a.cmp(b))),
        (Value::DateTime(a), Value::DateTime(b)) => Ok(Some(a.cmp(b))),
        (Value::Time(a), Value::Time(b)) => Ok(Some(a.cmp(b))),
        (Value::TimeDelta(a), Value::TimeDelta(b)) => Ok(Some(a.cmp(b))),
        (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
            for (x, y) in a.iter().zip(b) {
                if !values_equal(x, y) {
                    return order(x, y, symbol);
                }
            }
            Ok(Some(a.len().cmp(&b.len())))
        }
        _ => Err(ExprError::type_error(format!(
            "'{symbol}' not supported between instances of '{}' and '{}'",
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn contains(container: &Value, item: &Value) -> Result<bool, ExprError> {
    match container {
        Value::Str(haystack) => {
            let needle = item.as_str().ok_or_else(|| {
                ExprError::type_error(format!(
                    "'in <string>' requires string as left operand, not {}",
                    item.type_name()
                ))
            })?;
            Ok(haystack.contains(needle))
        }
        Value::List(items) | Value::Tuple(items) => {
            Ok(items.iter().any(|candidate| values_equal(candidate, item)))
        }
        Value::Dict(map) => Ok(match item {
            Value::Str(key) => map.contains_key(key),
            _ => false,
        }),
        other => Err(ExprError::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, ExprError> {
    let ordered = |symbol: &str, accept: fn(Ordering) -> bool| {
        order(left, right, symbol).map(|o| o.is_some_and(accept))
    };
    match op {
        CompareOp::Eq => Ok(values_equal(left, right)),
        CompareOp::Ne => Ok(!values_equal(left, right)),
        CompareOp::Lt => ordered("<", Ordering::is_lt),
        CompareOp::Le => ordered("<=", Ordering::is_le),
        CompareOp::Gt => ordered(">", Ordering::is_gt),
        CompareOp::Ge => ordered(">=", Ordering::is_ge),
        CompareOp::In => contains(right, left),
        CompareOp::NotIn => contains(right, left).map(|found| !found),
        CompareOp::Is => Ok(same_object(left, right)),
        CompareOp::IsNot => Ok(!same_object(left, right)),
    }
}

fn same_object(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::None, Value::None) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Namespace(a), Value::Namespace(b)) => a == b,
        _ => std::mem::discriminant(left) == std::mem::discriminant(right) && left == right,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestScope {
        fields: BTreeMap<String, Value>,
        page: i64,
    }

    impl Scope for TestScope {
        fn report_attr(&self, name: &str) -> Option<Value> {
            match name {
                "PageNumber" => Some(Value::Int(self.page)),
                "Record" => Some(Value::Dict(self.fields.clone())),
                "Variables" => Some(Value::Dict(BTreeMap::from([(
                    "total".to_string(),
                    Value::Int(99),
                )]))),
                _ => None,
            }
        }

        fn name(&self, name: &str) -> Option<Value> {
            self.fields.get(name).cloned()
        }
    }

    fn scope() -> TestScope {
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), Value::from("ada lovelace"));
        fields.insert("amt".to_string(), Value::Int(20));
        fields.insert("price".to_string(), Value::Decimal(Decimal::new(1995, 2)));
        fields.insert(
            "born".to_string(),
            Value::Date(NaiveDate::from_ymd_opt(1815, 12, 10).expect("date")),
        );
        fields.insert("missing".to_string(), Value::None);
        TestScope { fields, page: 3 }
    }

    fn eval(source: &str) -> Value {
        Evaluator::new()
            .eval(source, &scope())
            .unwrap_or_else(|err| panic!("{source}: {err}"))
    }

    fn eval_err(source: &str) -> ExprError {
        Evaluator::new()
            .eval(source, &scope())
            .expect_err(source)
    }

    #[test]
    fn arithmetic_follows_python_rules() {
        assert_eq!(eval("1 + 2 * 3"), Value::Int(7));
        assert_eq!(eval("7 / 2"), Value::Float(3.5));
        assert_eq!(eval("-7 // 2"), Value::Int(-4));
        assert_eq!(eval("-7 % 3"), Value::Int(2));
        assert_eq!(eval("2 ** 10"), Value::Int(1024));
        assert_eq!(eval("2 ** -1"), Value::Float(0.5));
        assert_eq!(eval("-2 ** 2"), Value::Int(-4));
        assert_eq!(eval("True + 1"), Value::Int(2));
        assert_eq!(eval("9223372036854775807 + 1"), Value::Float(9223372036854775808.0));
        assert_eq!(eval_err("1 / 0"), ExprError::ZeroDivision);
        assert_eq!(eval_err("1 % 0"), ExprError::ZeroDivision);
    }

    #[test]
    fn decimal_arithmetic_stays_exact() {
        assert_eq!(eval("str(price * 3)"), Value::from("59.85"));
        assert_eq!(eval("str(Decimal('0.1') + Decimal('0.2'))"), Value::from("0.3"));
        assert_eq!(eval("Decimal('1.5') + 0.25"), Value::Float(1.75));
        assert_eq!(eval("decimal.Decimal('1.50') == 1.5"), Value::Bool(true));
        assert_eq!(eval("str(Decimal('2.675').quantize(Decimal('0.01')))"), Value::from("2.68"));
    }

    #[test]
    fn names_resolve_through_scope_and_self() {
        assert_eq!(eval("self.PageNumber + 1"), Value::Int(4));
        assert_eq!(eval("self.Record['amt']"), Value::Int(20));
        assert_eq!(eval("self.Record.amt"), Value::Int(20));
        assert_eq!(eval("Variables['total']"), Value::Int(99));
        assert_eq!(eval("amt if missing is None else 0"), Value::Int(20));
        assert_eq!(eval_err("nope"), ExprError::Name("nope".to_string()));
        assert!(matches!(eval_err("self.Nope"), ExprError::Attribute { .. }));
    }

    #[test]
    fn percent_formatting_uses_page_counters() {
        assert_eq!(
            eval("'Page %s of %s' % (self.PageNumber, 5)"),
            Value::from("Page 3 of 5")
        );
        assert_eq!(eval("'%-6s|%6.2f' % ('ab', 3.14159)"), Value::from("ab    |  3.14"));
    }

    #[test]
    fn string_methods() {
        assert_eq!(eval("name.title()"), Value::from("Ada Lovelace"));
        assert_eq!(eval("name.upper().split()[1]"), Value::from("LOVELACE"));
        assert_eq!(eval("'-'.join(['a', 'b'])"), Value::from("a-b"));
        assert_eq!(eval("'7'.zfill(3)"), Value::from("007"));
        assert_eq!(eval("'a'.center(4, '*')"), Value::from("*a**"));
        assert_eq!(eval("'  x '.strip()"), Value::from("x"));
        assert_eq!(eval("'{:>5}|{name}'.format(1, name='z')"), Value::from("    1|z"));
        assert_eq!(eval("name[:3]"), Value::from("ada"));
        assert_eq!(eval("name[::-1][0]"), Value::from("e"));
        assert_eq!(eval("'love' in name"), Value::Bool(true));
        assert_eq!(eval("name.find('love')"), Value::Int(4));
    }

    #[test]
    fn builtins() {
        assert_eq!(eval("len(name)"), Value::Int(12));
        assert_eq!(eval("round(2.5)"), Value::Int(2));
        assert_eq!(eval("round(3.5)"), Value::Int(4));
        assert_eq!(eval("round(2.675, 2)"), Value::Float(2.67));
        assert_eq!(eval("max(3, 9, 4)"), Value::Int(9));
        assert_eq!(eval("min([4, 2.5])"), Value::Float(2.5));
        assert_eq!(eval("sum([1, 2, 3])"), Value::Int(6));
        assert_eq!(eval("sum(amt)"), Value::Int(20));
        assert_eq!(eval("int('42') + int(3.9)"), Value::Int(45));
        assert_eq!(eval("float('2.5')"), Value::Float(2.5));
        assert_eq!(eval("sorted([3, 1, 2], reverse=True)"), Value::List(vec![
            Value::Int(3),
            Value::Int(2),
            Value::Int(1)
        ]));
        assert_eq!(eval("range(1, 7, 2)"), Value::List(vec![
            Value::Int(1),
            Value::Int(3),
            Value::Int(5)
        ]));
        assert_eq!(eval("repr('x')"), Value::from("'x'"));
        assert_eq!(eval("str(None)"), Value::from("None"));
        assert!(matches!(eval_err("int('x')"), ExprError::Value(_)));
        assert!(matches!(eval_err("max([])"), ExprError::Value(_)));
    }

    #[test]
    fn comparisons_chain_and_reject_mixed_ordering() {
        assert_eq!(eval("1 < amt <= 20"), Value::Bool(true));
        assert_eq!(eval("1 < amt < 5"), Value::Bool(false));
        assert_eq!(eval("1 == 1.0"), Value::Bool(true));
        assert_eq!(eval("'a' != 'b'"), Value::Bool(true));
        assert_eq!(eval("(1, 2) < (1, 3)"), Value::Bool(true));
        assert!(matches!(eval_err("1 < 'a'"), ExprError::Type(_)));
        assert_eq!(eval("3 not in [1, 2]"), Value::Bool(true));
    }

    #[test]
    fn boolean_operators_return_operands() {
        assert_eq!(eval("missing or 'n/a'"), Value::from("n/a"));
        assert_eq!(eval("amt and 'yes'"), Value::from("yes"));
        assert_eq!(eval("not missing"), Value::Bool(true));
    }

    #[test]
    fn dates_and_math() {
        assert_eq!(eval("born.year"), Value::Int(1815));
        assert_eq!(eval("born.strftime('%d/%m/%Y')"), Value::from("10/12/1815"));
        assert_eq!(
            eval("datetime.date(2024, 3, 1) - datetime.timedelta(days=1)"),
            Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).expect("date"))
        );
        assert_eq!(
            eval("(datetime.date(2024, 3, 1) - datetime.date(2024, 1, 1)).days"),
            Value::Int(60)
        );
        assert_eq!(eval("datetime.datetime(2024, 1, 2, 3, 4).hour"), Value::Int(3));
        assert_eq!(eval("math.floor(2.7) + math.ceil(0.1)"), Value::Int(3));
        assert_eq!(eval("math.sqrt(16)"), Value::Float(4.0));
        assert!(matches!(eval_err("math.sqrt(-1)"), ExprError::Value(_)));
        assert!(matches!(eval_err("datetime.date(2024, 2, 30)"), ExprError::Value(_)));
        assert_eq!(eval("born.weekday()"), Value::Int(6));
    }

    #[test]
    fn containers() {
        assert_eq!(eval("[1, 2][-1]"), Value::Int(2));
        assert_eq!(eval("{'a': 1}.get('b', 5)"), Value::Int(5));
        assert_eq!(eval("{'a': 1}['a']"), Value::Int(1));
        assert_eq!(eval_err("[1][3]"), ExprError::Index);
        assert!(matches!(eval_err("{'a': 1}['z']"), ExprError::Key(_)));
        assert_eq!(eval("[1, 2, 1].count(1)"), Value::Int(2));
        assert_eq!(eval("(1,) + (2,)"), Value::Tuple(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(eval("'ab' * 2"), Value::from("abab"));
    }

    #[test]
    fn compiled_expressions_are_cached() {
        let evaluator = Evaluator::new();
        let scope = scope();
        for _ in 0..3 {
            evaluator.eval("amt + 1", &scope).expect("eval");
        }
        assert!(evaluator.eval("amt +", &scope).is_err());
        assert!(evaluator.eval("amt +", &scope).is_err());
        assert_eq!(evaluator.cached_sources(), 2);
    }

    #[test]
    fn oversized_results_are_value_errors() {
        assert!(matches!(eval_err("'x' * 10000000000"), ExprError::Value(_)));
        assert!(matches!(eval_err("[0] * 10 ** 12"), ExprError::Value(_)));
        assert!(matches!(eval_err("'a'.ljust(10 ** 12)"), ExprError::Value(_)));
        assert!(matches!(eval_err("'7'.zfill(10 ** 12)"), ExprError::Value(_)));
        assert!(matches!(eval_err("'%100000000000s' % 'a'"), ExprError::Value(_)));
        assert!(matches!(eval_err("'{:100000000000}'.format('a')"), ExprError::Value(_)));
        assert_eq!(eval("'ab' * 3"), Value::from("ababab"));
        assert_eq!(eval("'ab' * -1"), Value::from(""));
    }

    #[test]
    fn literal_scope_and_map_scope() {
        let evaluator = Evaluator::new();
        assert_eq!(
            evaluator.eval("[1, 'two']", &LiteralScope).expect("eval"),
            Value::List(vec![Value::Int(1), Value::from("two")])
        );
        let map = BTreeMap::from([("x".to_string(), Value::Int(2))]);
        assert_eq!(evaluator.eval("x * 2", &map).expect("eval"), Value::Int(4));
    }
}
