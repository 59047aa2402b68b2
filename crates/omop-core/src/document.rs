//! Read access to a parsed source document.
//!
//! The engine never walks XML itself; it asks an implementation of
//! [`DocumentQuery`] to evaluate the path expressions found in the parse
//! configurations. Nodes are opaque handles valid for the lifetime of the
//! document they came from.

/// Opaque handle to one element of a parsed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

/// The attribute name that selects an element's concatenated text content
/// instead of a named attribute.
pub const TEXT_ATTRIBUTE: &str = "#text";

pub trait DocumentQuery {
    /// All elements matching a row-scope path, evaluated from the document
    /// root. An invalid or non-matching path yields an empty list.
    fn roots(&self, path: &str) -> Vec<NodeId>;

    /// All elements matching a relative path under `scope`.
    fn select(&self, scope: NodeId, path: &str) -> Vec<NodeId>;

    /// A named attribute of an element, or `None` when absent.
    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    /// The element's text content, concatenated across its descendants in
    /// document order. `None` when the element carries no text at all.
    fn text(&self, node: NodeId) -> Option<String>;
}

/// Reads either a named attribute or, for [`TEXT_ATTRIBUTE`], the text
/// content of a node.
pub fn read_attribute(doc: &dyn DocumentQuery, node: NodeId, name: &str) -> Option<String> {
    if name == TEXT_ATTRIBUTE {
        doc.text(node)
    } else {
        doc.attribute(node, name)
    }
}
