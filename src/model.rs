//! The report form: an arena of typed nodes whose attributes hold
//! expression sources.

use crate::schema::ObjectType;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub object_type: ObjectType,
    /// Property name to expression source. Keys the schema does not declare
    /// are kept verbatim.
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
}

impl Node {
    fn new(object_type: ObjectType, parent: Option<NodeId>) -> Self {
        Self {
            object_type,
            attributes: BTreeMap::new(),
            children: Vec::new(),
            parent,
        }
    }
}

/// Structural snapshot of a form, independent of arena layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memento {
    pub object_type: ObjectType,
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<Memento>,
}

#[derive(Debug, Clone)]
pub struct ReportForm {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Default for ReportForm {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportForm {
    /// A complete, empty report: page, defaults and every standard band.
    pub fn new() -> Self {
        let mut form = Self::bare();
        form.ensure_defaults();
        form
    }

    /// Only the report node; the loader fills in the rest.
    pub(crate) fn bare() -> Self {
        Self {
            nodes: vec![Node::new(ObjectType::Report, None)],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn object_type(&self, id: NodeId) -> ObjectType {
        self.nodes[id.0].object_type
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn add_node(&mut self, parent: NodeId, object_type: ObjectType) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(object_type, Some(parent)));
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn child_of_type(&self, parent: NodeId, object_type: ObjectType) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|child| self.object_type(*child) == object_type)
    }

    pub fn children_of_type(&self, parent: NodeId, object_type: ObjectType) -> Vec<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .filter(|child| self.object_type(*child) == object_type)
            .collect()
    }

    fn ensure_child(&mut self, parent: NodeId, object_type: ObjectType) -> NodeId {
        match self.child_of_type(parent, object_type) {
            Some(id) => id,
            None => self.add_node(parent, object_type),
        }
    }

    /// Adds every required child that is missing: page, defaults, the
    /// report bands, and each group's header and footer.
    pub fn ensure_defaults(&mut self) {
        let root = self.root;
        self.ensure_child(root, ObjectType::Page);
        self.ensure_child(root, ObjectType::Defaults);
        for band in ObjectType::REPORT_BANDS {
            self.ensure_child(root, band);
        }
        for group in self.groups() {
            self.ensure_child(group, ObjectType::GroupHeader);
            self.ensure_child(group, ObjectType::GroupFooter);
        }
    }

    pub fn page(&self) -> Option<NodeId> {
        self.child_of_type(self.root, ObjectType::Page)
    }

    pub fn defaults(&self) -> Option<NodeId> {
        self.child_of_type(self.root, ObjectType::Defaults)
    }

    /// A report-level band.
    pub fn band(&self, object_type: ObjectType) -> Option<NodeId> {
        self.child_of_type(self.root, object_type)
    }

    pub fn groups(&self) -> Vec<NodeId> {
        self.children_of_type(self.root, ObjectType::Group)
    }

    pub fn variables(&self) -> Vec<NodeId> {
        self.children_of_type(self.root, ObjectType::Variable)
    }

    pub fn group_header(&self, group: NodeId) -> Option<NodeId> {
        self.child_of_type(group, ObjectType::GroupHeader)
    }

    pub fn group_footer(&self, group: NodeId) -> Option<NodeId> {
        self.child_of_type(group, ObjectType::GroupFooter)
    }

    /// The group a group band belongs to.
    pub fn owning_group(&self, band: NodeId) -> Option<NodeId> {
        self.parent(band)
            .filter(|parent| self.object_type(*parent) == ObjectType::Group)
    }

    /// Drawable children of a band (or paragraphs of a frameset), in
    /// construction order.
    pub fn objects(&self, parent: NodeId) -> Vec<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .filter(|child| {
                let ty = self.object_type(*child);
                ty.is_drawable() || ty == ObjectType::Paragraph
            })
            .collect()
    }

    pub fn add_group(&mut self, expr: &str) -> NodeId {
        let group = self.add_node(self.root, ObjectType::Group);
        self.set_prop(group, "expr", expr);
        self.add_node(group, ObjectType::GroupHeader);
        self.add_node(group, ObjectType::GroupFooter);
        group
    }

    pub fn add_variable(&mut self, name: &str, expr: &str) -> NodeId {
        let variable = self.add_node(self.root, ObjectType::Variable);
        self.set_prop(variable, "Name", &format!("{name:?}"));
        self.set_prop(variable, "expr", expr);
        variable
    }

    pub fn add_object(&mut self, band: NodeId, object_type: ObjectType) -> NodeId {
        self.add_node(band, object_type)
    }

    pub fn set_prop(&mut self, id: NodeId, name: &str, source: &str) {
        self.nodes[id.0]
            .attributes
            .insert(name.to_string(), source.to_string());
    }

    pub fn remove_prop(&mut self, id: NodeId, name: &str) -> Option<String> {
        self.nodes[id.0].attributes.remove(name)
    }

    /// The literal attribute source, without any fallback.
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.nodes[id.0].attributes.get(name).map(String::as_str)
    }

    /// Rows of the embedded test cursor, field to literal source.
    pub fn test_cursor(&self) -> Option<Vec<BTreeMap<String, String>>> {
        let cursor = self.child_of_type(self.root, ObjectType::TestCursor)?;
        Some(
            self.children_of_type(cursor, ObjectType::TestRecord)
                .into_iter()
                .map(|record| self.node(record).attributes.clone())
                .collect(),
        )
    }

    pub fn set_test_cursor(&mut self, rows: Vec<BTreeMap<String, String>>) {
        let root = self.root;
        let cursor = self.ensure_child(root, ObjectType::TestCursor);
        let old = std::mem::take(&mut self.nodes[cursor.0].children);
        for record in old {
            self.nodes[record.0].parent = None;
        }
        for row in rows {
            let record = self.add_node(cursor, ObjectType::TestRecord);
            self.nodes[record.0].attributes = row;
        }
    }

    /// Short name for logs and band outlines, e.g. `GroupHeader[region]`.
    pub fn label(&self, id: NodeId) -> String {
        let ty = self.object_type(id);
        match self.owning_group(id) {
            Some(group) => {
                let expr = self.attribute(group, "expr").unwrap_or("None");
                format!("{}[{}]", ty.type_name(), expr.trim_matches(|c| c == '"' || c == '\''))
            }
            None => ty.type_name().to_string(),
        }
    }

    pub fn memento(&self) -> Memento {
        self.memento_of(self.root)
    }

    fn memento_of(&self, id: NodeId) -> Memento {
        let node = self.node(id);
        Memento {
            object_type: node.object_type,
            attributes: node.attributes.clone(),
            children: node.children.iter().map(|c| self.memento_of(*c)).collect(),
        }
    }

    pub fn is_changed_since(&self, memento: &Memento) -> bool {
        self.memento() != *memento
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_form_has_required_children() {
        let form = ReportForm::new();
        assert!(form.page().is_some());
        assert!(form.defaults().is_some());
        for band in ObjectType::REPORT_BANDS {
            let id = form.band(band).expect("band");
            assert_eq!(form.parent(id), Some(form.root()));
        }
        assert!(form.groups().is_empty());
        assert!(form.test_cursor().is_none());
    }

    #[test]
    fn groups_own_header_and_footer() {
        let mut form = ReportForm::new();
        let group = form.add_group("self.Record['region']");
        let header = form.group_header(group).expect("header");
        let footer = form.group_footer(group).expect("footer");
        assert_eq!(form.owning_group(header), Some(group));
        assert_eq!(form.owning_group(footer), Some(group));
        assert_eq!(form.label(footer), "GroupFooter[self.Record['region']]");
        assert_eq!(form.owning_group(form.band(ObjectType::Detail).expect("detail")), None);
    }

    #[test]
    fn objects_keep_construction_order() {
        let mut form = ReportForm::new();
        let detail = form.band(ObjectType::Detail).expect("detail");
        let a = form.add_object(detail, ObjectType::String);
        let b = form.add_object(detail, ObjectType::Line);
        form.set_prop(a, "expr", "amt");
        assert_eq!(form.objects(detail), vec![a, b]);
        assert_eq!(form.attribute(a, "expr"), Some("amt"));
        assert_eq!(form.attribute(b, "expr"), None);
    }

    #[test]
    fn memento_detects_edits() {
        let mut form = ReportForm::new();
        let snapshot = form.memento();
        assert!(!form.is_changed_since(&snapshot));
        let root = form.root();
        form.set_prop(root, "Title", "'Sales'");
        assert!(form.is_changed_since(&snapshot));
        form.remove_prop(root, "Title");
        assert!(!form.is_changed_since(&snapshot));
    }

    #[test]
    fn test_cursor_replaces_rows() {
        let mut form = ReportForm::new();
        let row = BTreeMap::from([("amt".to_string(), "10".to_string())]);
        form.set_test_cursor(vec![row.clone(), row.clone()]);
        form.set_test_cursor(vec![row.clone()]);
        assert_eq!(form.test_cursor(), Some(vec![row]));
    }

    #[test]
    fn variables_store_quoted_names() {
        let mut form = ReportForm::new();
        let var = form.add_variable("amt_group", "amt_group + amt");
        assert_eq!(form.attribute(var, "Name"), Some("\"amt_group\""));
        assert_eq!(form.variables(), vec![var]);
    }
}
