//! Report forms on disk: rfxml documents and `.py` form modules.
//!
//! In rfxml every property is a child element whose text is the raw
//! expression source. Object collections sit in `Objects`, `Groups` and
//! `Variables` container elements; test cursor rows are `record` elements
//! carrying their fields as XML attributes.

use crate::error::{ReportError, Result};
use crate::expr::{Evaluator, LiteralScope, Value};
use crate::model::{NodeId, ReportForm};
use crate::schema::ObjectType;
use std::collections::BTreeMap;
use std::path::Path;

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="utf-8" standalone="no"?>"#;
const META_ATTRIBUTES: [&str; 4] = ["Title", "Subject", "Author", "Keywords"];

fn escape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

fn escape_attr(raw: &str) -> String {
    escape_text(raw).replace('"', "&quot;")
}

/// Child node types a parent holds directly (not through a container).
fn holds_directly(parent: ObjectType, child: ObjectType) -> bool {
    match parent {
        ObjectType::Report => {
            matches!(
                child,
                ObjectType::Page | ObjectType::Defaults | ObjectType::TestCursor
            ) || ObjectType::REPORT_BANDS.contains(&child)
        }
        ObjectType::Group => matches!(child, ObjectType::GroupHeader | ObjectType::GroupFooter),
        _ => false,
    }
}

fn element_text(element: roxmltree::Node<'_, '_>) -> String {
    element
        .descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect()
}

/// Parses an rfxml document.
pub fn from_xml(xml: &str) -> Result<ReportForm> {
    let doc = roxmltree::Document::parse(xml)
        .map_err(|err| ReportError::FormLoad(format!("malformed XML: {err}")))?;
    let root = doc.root_element();
    if ObjectType::from_name(root.tag_name().name()) != Some(ObjectType::Report) {
        return Err(ReportError::FormLoad(format!(
            "expected a top-level <report> element, found <{}>",
            root.tag_name().name()
        )));
    }
    let mut form = ReportForm::bare();
    let report = form.root();
    read_children(&mut form, report, root);
    form.ensure_defaults();
    Ok(form)
}

fn read_children(form: &mut ReportForm, id: NodeId, element: roxmltree::Node<'_, '_>) {
    let parent_type = form.object_type(id);
    for child in element.children().filter(|n| n.is_element()) {
        let tag = child.tag_name().name();
        match tag {
            "Objects" | "Groups" | "Variables" => read_container(form, id, tag, child),
            _ => match ObjectType::from_name(tag).filter(|ty| holds_directly(parent_type, *ty)) {
                Some(ObjectType::TestCursor) => read_test_cursor(form, child),
                Some(ty) => {
                    let node = form.add_node(id, ty);
                    read_children(form, node, child);
                }
                None => form.set_prop(id, tag, &element_text(child)),
            },
        }
    }
}

fn read_container(form: &mut ReportForm, id: NodeId, container: &str, element: roxmltree::Node<'_, '_>) {
    for item in element.children().filter(|n| n.is_element()) {
        let tag = item.tag_name().name();
        let accepted = ObjectType::from_name(tag).filter(|ty| match container {
            "Groups" => *ty == ObjectType::Group,
            "Variables" => *ty == ObjectType::Variable,
            _ => ty.is_drawable() || *ty == ObjectType::Paragraph,
        });
        match accepted {
            Some(ty) => {
                let node = form.add_node(id, ty);
                read_children(form, node, item);
            }
            None => log::warn!("skipping unknown <{tag}> inside <{container}>"),
        }
    }
}

fn read_test_cursor(form: &mut ReportForm, element: roxmltree::Node<'_, '_>) {
    let rows = element
        .children()
        .filter(|n| n.is_element())
        .map(|record| {
            record
                .attributes()
                .map(|attr| (attr.name().to_string(), attr.value().to_string()))
                .collect::<BTreeMap<_, _>>()
        })
        .collect();
    form.set_test_cursor(rows);
}

/// Writes a form as rfxml. The element order is fixed, so output is stable
/// across load/save cycles.
pub fn to_xml(form: &ReportForm) -> String {
    let mut out = String::with_capacity(4096);
    out.push_str(XML_HEADER);
    out.push_str("\n\n");
    write_node(&mut out, form, form.root(), 0);
    out
}

fn ordered_attributes(form: &ReportForm, id: NodeId) -> Vec<(&str, &str)> {
    let attributes = &form.node(id).attributes;
    let mut ordered: Vec<(&str, &str)> = Vec::with_capacity(attributes.len());
    if form.object_type(id) == ObjectType::Report {
        for meta in META_ATTRIBUTES {
            if let Some((k, v)) = attributes.get_key_value(meta) {
                ordered.push((k, v));
            }
        }
    }
    for (k, v) in attributes {
        if !ordered.iter().any(|(seen, _)| *seen == k.as_str()) {
            ordered.push((k, v));
        }
    }
    ordered
}

enum Part {
    Node(NodeId),
    Container(&'static str, Vec<NodeId>),
}

fn child_parts(form: &ReportForm, id: NodeId) -> Vec<Part> {
    let mut parts = Vec::new();
    match form.object_type(id) {
        ObjectType::Report => {
            let report = form.root();
            for single in [ObjectType::Defaults, ObjectType::Page] {
                parts.extend(form.child_of_type(report, single).map(Part::Node));
            }
            let variables = form.variables();
            if !variables.is_empty() {
                parts.push(Part::Container("Variables", variables));
            }
            let groups = form.groups();
            if !groups.is_empty() {
                parts.push(Part::Container("Groups", groups));
            }
            for band in ObjectType::REPORT_BANDS {
                parts.extend(form.band(band).map(Part::Node));
            }
            parts.extend(form.child_of_type(report, ObjectType::TestCursor).map(Part::Node));
        }
        ObjectType::Group => {
            parts.extend(form.group_header(id).map(Part::Node));
            parts.extend(form.group_footer(id).map(Part::Node));
        }
        _ => {
            let objects = form.objects(id);
            if !objects.is_empty() {
                parts.push(Part::Container("Objects", objects));
            }
        }
    }
    parts
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push('\t');
    }
}

fn write_node(out: &mut String, form: &ReportForm, id: NodeId, depth: usize) {
    let ty = form.object_type(id);
    let tag = ty.element_name();
    if ty == ObjectType::TestCursor {
        write_test_cursor(out, form, id, depth);
        return;
    }
    let attributes = ordered_attributes(form, id);
    let parts = child_parts(form, id);
    indent(out, depth);
    if attributes.is_empty() && parts.is_empty() {
        out.push_str(&format!("<{tag}/>\n"));
        return;
    }
    out.push_str(&format!("<{tag}>\n"));
    for (name, source) in attributes {
        indent(out, depth + 1);
        out.push_str(&format!("<{name}>{}</{name}>\n", escape_text(source)));
    }
    for part in parts {
        match part {
            Part::Node(child) => write_node(out, form, child, depth + 1),
            Part::Container(name, children) => {
                indent(out, depth + 1);
                out.push_str(&format!("<{name}>\n"));
                for child in children {
                    write_node(out, form, child, depth + 2);
                }
                indent(out, depth + 1);
                out.push_str(&format!("</{name}>\n"));
            }
        }
    }
    indent(out, depth);
    out.push_str(&format!("</{tag}>\n"));
}

fn write_test_cursor(out: &mut String, form: &ReportForm, id: NodeId, depth: usize) {
    let records = form.children_of_type(id, ObjectType::TestRecord);
    indent(out, depth);
    if records.is_empty() {
        out.push_str("<testcursor/>\n");
        return;
    }
    out.push_str("<testcursor>\n");
    for record in records {
        indent(out, depth + 1);
        out.push_str("<record");
        for (field, literal) in &form.node(record).attributes {
            out.push_str(&format!(" {field}=\"{}\"", escape_attr(literal)));
        }
        out.push_str("/>\n");
    }
    indent(out, depth);
    out.push_str("</testcursor>\n");
}

/// Loads a form file: `.py` modules by their `report` binding, anything
/// else as rfxml.
pub fn load_form_file(path: &Path) -> Result<ReportForm> {
    let text = std::fs::read_to_string(path).map_err(|err| {
        ReportError::FormLoad(format!("cannot read {}: {err}", path.display()))
    })?;
    let is_module = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("py"));
    if is_module {
        from_py_module(&text)
    } else {
        from_xml(&text)
    }
}

/// Removes `#` comments that are not inside string literals.
fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut quote: Option<char> = None;
    let mut chars = source.chars().peekable();
    while let Some(ch) = chars.next() {
        match (quote, ch) {
            (Some(_), '\\') => {
                out.push(ch);
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            (Some(q), c) if c == q => {
                quote = None;
                out.push(c);
            }
            (None, '\'' | '"') => {
                quote = Some(ch);
                out.push(ch);
            }
            (None, '#') => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Byte length of the bracketed literal at the start of `text`.
fn literal_extent(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (index, ch) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' => quote = Some(ch),
            '{' | '[' | '(' => depth += 1,
            '}' | ']' | ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(index + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Loads a `.py` form module. The module must bind `report` to a literal
/// dict; the dict is evaluated with no names in scope, so nothing but
/// literals can run.
pub fn from_py_module(source: &str) -> Result<ReportForm> {
    let cleaned = strip_comments(source);
    let mut offset = 0;
    let mut literal_start = None;
    for line in cleaned.split_inclusive('\n') {
        if let Some(rest) = line.strip_prefix("report") {
            let trimmed = rest.trim_start();
            if trimmed.starts_with('=') && !trimmed.starts_with("==") {
                let eq = line.len() - trimmed.len();
                literal_start = Some(offset + eq + 1);
                break;
            }
        }
        offset += line.len();
    }
    let start = literal_start.ok_or_else(|| {
        ReportError::FormLoad("form module has no top-level 'report' binding".to_string())
    })?;
    let body = cleaned[start..].trim_start();
    let extent = literal_extent(body).ok_or_else(|| {
        ReportError::FormLoad("the 'report' binding is not a complete literal".to_string())
    })?;
    let value = Evaluator::new()
        .eval(&body[..extent], &LiteralScope)
        .map_err(|err| ReportError::FormLoad(format!("cannot evaluate 'report': {err}")))?;
    let Value::Dict(map) = value else {
        return Err(ReportError::FormLoad(
            "the 'report' binding must be a dict".to_string(),
        ));
    };
    let mut form = ReportForm::bare();
    let root = form.root();
    read_dict(&mut form, root, &map)?;
    form.ensure_defaults();
    Ok(form)
}

fn attribute_source(value: &Value) -> String {
    match value {
        Value::Str(s) => s.clone(),
        other => other.repr(),
    }
}

fn typed_dict<'v>(value: &'v Value, key: &str) -> Result<&'v BTreeMap<String, Value>> {
    match value {
        Value::Dict(map) => Ok(map),
        other => Err(ReportError::FormLoad(format!(
            "'{key}' must hold a dict, not {}",
            other.type_name()
        ))),
    }
}

fn read_dict(form: &mut ReportForm, id: NodeId, map: &BTreeMap<String, Value>) -> Result<()> {
    let parent_type = form.object_type(id);
    for (key, value) in map {
        match (key.as_str(), value) {
            ("type", _) => {}
            ("Objects" | "Groups" | "Variables", Value::List(items) | Value::Tuple(items)) => {
                for item in items {
                    let item = typed_dict(item, key)?;
                    let ty = match key.as_str() {
                        "Groups" => ObjectType::Group,
                        "Variables" => ObjectType::Variable,
                        _ => item
                            .get("type")
                            .and_then(Value::as_str)
                            .and_then(ObjectType::from_name)
                            .filter(|ty| ty.is_drawable() || *ty == ObjectType::Paragraph)
                            .ok_or_else(|| {
                                ReportError::FormLoad(
                                    "every entry of 'Objects' needs a drawable 'type'".to_string(),
                                )
                            })?,
                    };
                    let node = form.add_node(id, ty);
                    read_dict(form, node, item)?;
                }
            }
            ("TestCursor", Value::List(rows) | Value::Tuple(rows)) => {
                let rows = rows
                    .iter()
                    .map(|row| {
                        typed_dict(row, key).map(|fields| {
                            fields
                                .iter()
                                .map(|(field, literal)| (field.clone(), literal.repr()))
                                .collect::<BTreeMap<_, _>>()
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                form.set_test_cursor(rows);
            }
            (_, Value::Dict(child)) => {
                match ObjectType::from_name(key).filter(|ty| holds_directly(parent_type, *ty)) {
                    Some(ty) => {
                        let node = form.add_node(id, ty);
                        read_dict(form, node, child)?;
                    }
                    None => form.set_prop(id, key, &value.repr()),
                }
            }
            _ => form.set_prop(id, key, &attribute_source(value)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_form() -> ReportForm {
        let mut form = ReportForm::new();
        let root = form.root();
        form.set_prop(root, "Title", "\"Sales & <Returns>\"");
        form.set_prop(root, "ColumnCount", "2");
        form.set_prop(root, "Author", "'Ann'");
        let defaults = form.defaults().expect("defaults");
        form.set_prop(defaults, "FontName", "'Times-Roman'");
        let group = form.add_group("self.Record['region']");
        let footer = form.group_footer(group).expect("footer");
        form.set_prop(footer, "PrintAtBottom", "True");
        let total = form.add_object(footer, ObjectType::String);
        form.set_prop(total, "expr", "sum(amt_group)");
        form.add_variable("amt_group", "amt_group + self.Record['amt']");
        let detail = form.band(ObjectType::Detail).expect("detail");
        let frameset = form.add_object(detail, ObjectType::Frameset);
        let para = form.add_object(frameset, ObjectType::Paragraph);
        form.set_prop(para, "expr", "'a < b'");
        form.set_test_cursor(vec![BTreeMap::from([
            ("amt".to_string(), "10".to_string()),
            ("region".to_string(), "\"N\"".to_string()),
        ])]);
        form
    }

    #[test]
    fn xml_round_trip_is_stable() {
        let form = sample_form();
        let xml = to_xml(&form);
        let reloaded = from_xml(&xml).expect("reload");
        assert_eq!(to_xml(&reloaded), xml);
        let again = from_xml(&to_xml(&reloaded)).expect("second reload");
        assert_eq!(again.memento(), reloaded.memento());
    }

    #[test]
    fn xml_layout_follows_fixed_order() {
        let xml = to_xml(&sample_form());
        assert!(xml.starts_with(XML_HEADER));
        let pos = |needle: &str| xml.find(needle).unwrap_or_else(|| panic!("{needle} missing"));
        assert!(pos("<Title>") < pos("<Author>"));
        assert!(pos("<Author>") < pos("<ColumnCount>"));
        assert!(pos("<ColumnCount>") < pos("<defaults>"));
        assert!(pos("<defaults>") < pos("<page/>"));
        assert!(pos("<page/>") < pos("<Variables>"));
        assert!(pos("<Variables>") < pos("<Groups>"));
        assert!(pos("<Groups>") < pos("<pageBackground/>"));
        assert!(pos("<pageHeader/>") < pos("<detail>"));
        assert!(pos("<pageForeground/>") < pos("<testcursor>"));
        assert!(xml.contains("<Title>\"Sales &amp; &lt;Returns&gt;\"</Title>"));
        assert!(xml.contains("<record amt=\"10\" region=\"&quot;N&quot;\"/>"));
    }

    #[test]
    fn unknown_elements_become_attributes() {
        let xml = r#"<?xml version="1.0"?>
<report>
	<Flavor>"vanilla"</Flavor>
	<detail>
		<Objects>
			<string>
				<expr>amt</expr>
				<Tooltip>'hi'</Tooltip>
			</string>
			<Gizmo/>
		</Objects>
	</detail>
</report>"#;
        let form = from_xml(xml).expect("parse");
        assert_eq!(form.attribute(form.root(), "Flavor"), Some("\"vanilla\""));
        let detail = form.band(ObjectType::Detail).expect("detail");
        let objects = form.objects(detail);
        assert_eq!(objects.len(), 1);
        assert_eq!(form.object_type(objects[0]), ObjectType::String);
        assert_eq!(form.attribute(objects[0], "Tooltip"), Some("'hi'"));
        assert!(form.page().is_some());
    }

    #[test]
    fn load_errors() {
        assert!(matches!(from_xml("<report>"), Err(ReportError::FormLoad(_))));
        assert!(matches!(
            from_xml("<form></form>"),
            Err(ReportError::FormLoad(_))
        ));
        assert!(matches!(
            from_py_module("x = 1"),
            Err(ReportError::FormLoad(_))
        ));
        assert!(matches!(
            from_py_module("report = [1, 2]"),
            Err(ReportError::FormLoad(_))
        ));
    }

    #[test]
    fn py_module_builds_the_same_tree() {
        let module = r#"
# Generated form module
import datetime

report = {
    "type": "Report",
    "Title": '"Sales"',   # shown in the PDF info
    "ColumnCount": 2,
    "Page": {"MarginLeft": "'1 in'"},
    "Detail": {
        "Height": "'.25 in'",
        "Objects": [
            {"type": "String", "expr": "self.Record['amt']", "x": "'1 in'"},
        ],
    },
    "Groups": [
        {"expr": "self.Record['region']", "GroupFooter": {"PrintAtBottom": "True"}},
    ],
    "Variables": [{"Name": '"total"', "expr": "total + 1"}],
    "TestCursor": [{"region": "N", "amt": 10}],
}
"#;
        let form = from_py_module(module).expect("module");
        let root = form.root();
        assert_eq!(form.attribute(root, "Title"), Some("\"Sales\""));
        assert_eq!(form.attribute(root, "ColumnCount"), Some("2"));
        let page = form.page().expect("page");
        assert_eq!(form.attribute(page, "MarginLeft"), Some("'1 in'"));
        let detail = form.band(ObjectType::Detail).expect("detail");
        assert_eq!(form.objects(detail).len(), 1);
        let group = form.groups()[0];
        let footer = form.group_footer(group).expect("footer");
        assert_eq!(form.attribute(footer, "PrintAtBottom"), Some("True"));
        assert!(form.group_header(group).is_some());
        let rows = form.test_cursor().expect("cursor");
        assert_eq!(rows[0].get("region").map(String::as_str), Some("'N'"));
        assert_eq!(rows[0].get("amt").map(String::as_str), Some("10"));

        let reloaded = from_xml(&to_xml(&form)).expect("xml");
        assert_eq!(to_xml(&reloaded), to_xml(&form));
    }

    #[test]
    fn form_files_dispatch_on_extension() {
        let dir = std::env::temp_dir();
        let stamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let xml_path = dir.join(format!("reportwriter_form_{}_{stamp}.rfxml", std::process::id()));
        let py_path = xml_path.with_extension("py");
        std::fs::write(&xml_path, to_xml(&sample_form())).expect("write xml");
        std::fs::write(&py_path, "report = {'Title': '\"X\"'}\n").expect("write py");
        let from_file = load_form_file(&xml_path).expect("xml form");
        assert_eq!(to_xml(&from_file), to_xml(&sample_form()));
        let module = load_form_file(&py_path).expect("py form");
        assert_eq!(module.attribute(module.root(), "Title"), Some("\"X\""));
        assert!(load_form_file(&dir.join("reportwriter_missing.rfxml")).is_err());
        let _ = std::fs::remove_file(xml_path);
        let _ = std::fs::remove_file(py_path);
    }
}
