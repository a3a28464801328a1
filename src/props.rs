//! Property lookup with fallback.
//!
//! A property `P` of a node resolves through, in order: the node's own `P`,
//! its `P_def` shadow, the report `Defaults` entry for `P`, the `Defaults`
//! entry for `P_def`, and finally the schema default. A source that fails to
//! evaluate falls through to the next one.

use crate::expr::{Evaluator, ExprError, LiteralScope, Scope, Value};
use crate::model::{NodeId, ReportForm};
use crate::types::{Color, Pt};
use crate::units;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropOrigin {
    Literal,
    Shadow,
    Defaults,
    DefaultsShadow,
    Schema,
}

/// Every source that could supply `name` for `node`, best first.
pub fn source_chain(form: &ReportForm, node: NodeId, name: &str) -> Vec<(PropOrigin, String)> {
    let shadow = format!("{name}_def");
    let mut chain = Vec::with_capacity(5);
    if let Some(source) = form.attribute(node, name) {
        chain.push((PropOrigin::Literal, source.to_string()));
    }
    if let Some(source) = form.attribute(node, &shadow) {
        chain.push((PropOrigin::Shadow, source.to_string()));
    }
    if let Some(defaults) = form.defaults() {
        if let Some(source) = form.attribute(defaults, name) {
            chain.push((PropOrigin::Defaults, source.to_string()));
        }
        if let Some(source) = form.attribute(defaults, &shadow) {
            chain.push((PropOrigin::DefaultsShadow, source.to_string()));
        }
    }
    if let Some(def) = form.object_type(node).prop(name) {
        chain.push((PropOrigin::Schema, def.default.to_string()));
    }
    chain
}

/// The unevaluated source a property would use.
pub fn raw_source(form: &ReportForm, node: NodeId, name: &str) -> Option<String> {
    source_chain(form, node, name)
        .into_iter()
        .next()
        .map(|(_, source)| source)
}

/// Schema default of a property as a value.
pub fn schema_default(form: &ReportForm, node: NodeId, name: &str, evaluator: &Evaluator) -> Value {
    match form.object_type(node).prop(name) {
        Some(def) => evaluator
            .eval(def.default, &LiteralScope)
            .unwrap_or_else(|_| Value::Str(def.default.to_string())),
        None => Value::None,
    }
}

pub fn value_to_length(value: &Value) -> Option<Pt> {
    match value {
        Value::Str(text) => units::parse_length(text),
        Value::None => None,
        other => other.as_f64().map(Pt::from_f64),
    }
}

pub fn value_to_color(value: &Value) -> Option<Color> {
    match value {
        Value::Str(text) => units::parse_color(text),
        Value::Tuple(items) | Value::List(items) => {
            let components = items
                .iter()
                .map(Value::as_f64)
                .collect::<Option<Vec<f64>>>()?;
            units::color_from_components(&components)
        }
        _ => None,
    }
}

/// Evaluates properties of one form against one scope.
pub struct PropReader<'a> {
    form: &'a ReportForm,
    evaluator: &'a Evaluator,
    scope: &'a dyn Scope,
}

impl<'a> PropReader<'a> {
    pub fn new(form: &'a ReportForm, evaluator: &'a Evaluator, scope: &'a dyn Scope) -> Self {
        Self {
            form,
            evaluator,
            scope,
        }
    }

    pub fn form(&self) -> &'a ReportForm {
        self.form
    }

    pub fn evaluate(&self, source: &str) -> Result<Value, ExprError> {
        self.evaluator.eval(source, self.scope)
    }

    /// The property value, never failing: unusable sources fall through the
    /// chain down to the schema default.
    pub fn value(&self, node: NodeId, name: &str) -> Value {
        for (origin, source) in source_chain(self.form, node, name) {
            if origin == PropOrigin::Schema {
                break;
            }
            match self.evaluate(&source) {
                Ok(value) => return value,
                Err(err) => log::debug!(
                    "{}.{name} = {source:?} failed: {err}",
                    self.form.label(node)
                ),
            }
        }
        schema_default(self.form, node, name, self.evaluator)
    }

    /// The first available source, evaluated, with its error handed back.
    pub fn try_value(&self, node: NodeId, name: &str) -> Result<Value, ExprError> {
        match source_chain(self.form, node, name).into_iter().next() {
            Some((_, source)) => self.evaluate(&source),
            None => Ok(Value::None),
        }
    }

    pub fn is_set(&self, node: NodeId, name: &str) -> bool {
        source_chain(self.form, node, name)
            .iter()
            .any(|(origin, _)| *origin != PropOrigin::Schema)
    }

    /// `None` when the property evaluates to `None` (or to no length).
    pub fn length(&self, node: NodeId, name: &str) -> Option<Pt> {
        value_to_length(&self.value(node, name))
    }

    pub fn length_or(&self, node: NodeId, name: &str, fallback: Pt) -> Pt {
        self.length(node, name).unwrap_or(fallback)
    }

    pub fn number(&self, node: NodeId, name: &str) -> Option<f64> {
        match self.value(node, name) {
            Value::Str(text) => text.trim().parse().ok(),
            other => other.as_f64(),
        }
    }

    pub fn int(&self, node: NodeId, name: &str) -> Option<i64> {
        self.number(node, name).map(|n| n.trunc() as i64)
    }

    pub fn flag(&self, node: NodeId, name: &str) -> bool {
        self.value(node, name).is_truthy()
    }

    pub fn color(&self, node: NodeId, name: &str) -> Option<Color> {
        value_to_color(&self.value(node, name))
    }

    pub fn text(&self, node: NodeId, name: &str) -> Option<String> {
        match self.value(node, name) {
            Value::None => None,
            other => Some(other.to_string()),
        }
    }

    /// A keyword-like property, lowercased; empty when unset.
    pub fn choice(&self, node: NodeId, name: &str) -> String {
        self.text(node, name)
            .map(|t| t.trim().to_ascii_lowercase())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ObjectType;
    use std::collections::BTreeMap;

    fn form_with_string() -> (ReportForm, NodeId) {
        let mut form = ReportForm::new();
        let detail = form.band(ObjectType::Detail).expect("detail");
        let string = form.add_object(detail, ObjectType::String);
        (form, string)
    }

    #[test]
    fn chain_order_is_literal_shadow_defaults_schema() {
        let (mut form, string) = form_with_string();
        let defaults = form.defaults().expect("defaults");
        form.set_prop(defaults, "FontSize_def", "11");
        form.set_prop(defaults, "FontSize", "12");
        form.set_prop(string, "FontSize_def", "13");
        form.set_prop(string, "FontSize", "14");
        let origins: Vec<PropOrigin> = source_chain(&form, string, "FontSize")
            .into_iter()
            .map(|(origin, _)| origin)
            .collect();
        assert_eq!(
            origins,
            vec![
                PropOrigin::Literal,
                PropOrigin::Shadow,
                PropOrigin::Defaults,
                PropOrigin::DefaultsShadow,
                PropOrigin::Schema
            ]
        );
        assert_eq!(raw_source(&form, string, "FontSize").as_deref(), Some("14"));
    }

    #[test]
    fn failures_fall_through_to_the_next_source() {
        let (mut form, string) = form_with_string();
        let defaults = form.defaults().expect("defaults");
        form.set_prop(string, "FontSize", "undefined_name + 1");
        form.set_prop(defaults, "FontSize", "9");
        let evaluator = Evaluator::new();
        let scope: BTreeMap<String, Value> = BTreeMap::new();
        let props = PropReader::new(&form, &evaluator, &scope);
        assert_eq!(props.value(string, "FontSize"), Value::Int(9));
        assert!(matches!(
            props.try_value(string, "FontSize"),
            Err(ExprError::Name(_))
        ));

        form.remove_prop(defaults, "FontSize");
        let props = PropReader::new(&form, &evaluator, &scope);
        assert_eq!(props.value(string, "FontSize"), Value::Int(10));
        assert_eq!(props.length(string, "FontSize"), Some(Pt::from_i32(10)));
    }

    #[test]
    fn typed_accessors() {
        let (mut form, string) = form_with_string();
        form.set_prop(string, "x", "'1 in'");
        form.set_prop(string, "FontColor", "(255, 0, 0)");
        form.set_prop(string, "Align", "'Center'");
        form.set_prop(string, "Show", "amt > 5");
        let evaluator = Evaluator::new();
        let scope = BTreeMap::from([("amt".to_string(), Value::Int(10))]);
        let props = PropReader::new(&form, &evaluator, &scope);
        assert_eq!(props.length(string, "x"), Some(Pt::from_i32(72)));
        assert_eq!(props.color(string, "FontColor"), Some(Color::rgb(1.0, 0.0, 0.0)));
        assert_eq!(props.choice(string, "Align"), "center");
        assert!(props.flag(string, "Show"));
        assert_eq!(props.length(string, "Height"), None);
        assert!(props.is_set(string, "x"));
        assert!(!props.is_set(string, "y"));
        assert_eq!(props.value(string, "NoSuchProp"), Value::None);
    }
}
