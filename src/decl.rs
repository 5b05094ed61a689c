//! Raw declaration records, as handed over by the header extractor.
//!
//! The extractor emits positional tuples:
//!
//! ```text
//! [name, kind_and_bases_or_return, [attrs], [items], original_return_type?, doc?]
//! ```
//!
//! A document is either a bare array of those, or an object carrying the
//! namespaces the extractor saw alongside the declarations.

use serde::Deserialize;
use std::fmt;

/// Where a declaration came from: input file and position within it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub file: String,
    pub index: usize,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.file, self.index)
    }
}

/// One entry of a declaration's item list: an argument, a class field, or an
/// enumerator (`["const cv.Flag.A", "0", [], []]`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "WireItem")]
pub struct DeclItem {
    pub ty: String,
    pub name: String,
    /// Empty string on the wire means "no default".
    pub default: Option<String>,
    pub attrs: Vec<String>,
}

#[derive(Deserialize)]
struct WireItem(
    String,
    #[serde(default)] Option<String>,
    // A default expression for arguments; enumerators put a list here.
    #[serde(default)] Option<serde_json::Value>,
    #[serde(default)] Option<Vec<String>>,
);

impl From<WireItem> for DeclItem {
    fn from(w: WireItem) -> Self {
        DeclItem {
            ty: w.0,
            name: w.1.unwrap_or_default(),
            default: w
                .2
                .as_ref()
                .and_then(|v| v.as_str())
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            attrs: w.3.unwrap_or_default(),
        }
    }
}

/// One raw declaration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "WireDecl")]
pub struct Decl {
    /// `class cv.Foo`, `enum class cv.Flag`, `const cv.X`, or a function name.
    pub name: String,
    /// Bases for classes (`": cv::Bar"`), return type for functions, value for
    /// constants.
    pub kind_and_bases: String,
    pub attrs: Vec<String>,
    pub items: Vec<DeclItem>,
    pub return_type: Option<String>,
    pub doc: String,
    /// Filled in by [`parse_document`]; not part of the wire format.
    #[serde(skip)]
    pub origin: Origin,
}

#[derive(Deserialize)]
struct WireDecl(
    String,
    #[serde(default)] Option<String>,
    #[serde(default)] Option<Vec<String>>,
    #[serde(default)] Option<Vec<DeclItem>>,
    #[serde(default)] Option<String>,
    #[serde(default)] Option<String>,
);

impl From<WireDecl> for Decl {
    fn from(w: WireDecl) -> Self {
        Decl {
            name: w.0,
            kind_and_bases: w.1.unwrap_or_default(),
            attrs: w.2.unwrap_or_default(),
            items: w.3.unwrap_or_default(),
            return_type: w.4.filter(|r| !r.is_empty()),
            doc: w.5.unwrap_or_default(),
            origin: Origin::default(),
        }
    }
}

impl Default for Origin {
    fn default() -> Self {
        Origin {
            file: "<input>".to_string(),
            index: 0,
        }
    }
}

/// Everything the extractor produced for one generation run.
#[derive(Debug, Default, Clone)]
pub struct DeclSet {
    /// Namespaces the extractor reported explicitly (dotted form).
    pub namespaces: Vec<String>,
    pub decls: Vec<Decl>,
}

impl DeclSet {
    pub fn extend(&mut self, other: DeclSet) {
        self.namespaces.extend(other.namespaces);
        self.decls.extend(other.decls);
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Document {
    Bare(Vec<Decl>),
    Full {
        #[serde(default)]
        namespaces: Vec<String>,
        decls: Vec<Decl>,
    },
}

/// Parse one JSON document, tagging every declaration with its origin.
pub fn parse_document(src: &str, file: &str) -> serde_json::Result<DeclSet> {
    let (namespaces, mut decls) = match serde_json::from_str::<Document>(src)? {
        Document::Bare(decls) => (Vec::new(), decls),
        Document::Full { namespaces, decls } => (namespaces, decls),
    };
    for (index, decl) in decls.iter_mut().enumerate() {
        decl.origin = Origin {
            file: file.to_string(),
            index,
        };
    }
    Ok(DeclSet { namespaces, decls })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_array_of_decls() {
        let src = r#"[
            ["cv.add", "int", [], [["int", "a", "", []], ["int", "c", "0", []]], "int", "Adds."]
        ]"#;
        let set = parse_document(src, "core.json").unwrap();
        assert!(set.namespaces.is_empty());
        let decl = &set.decls[0];
        assert_eq!(decl.name, "cv.add");
        assert_eq!(decl.return_type.as_deref(), Some("int"));
        assert_eq!(decl.items[0].default, None);
        assert_eq!(decl.items[1].default.as_deref(), Some("0"));
        assert_eq!(decl.origin.to_string(), "core.json#0");
    }

    #[test]
    fn object_with_namespaces() {
        let src = r#"{
            "namespaces": ["cv", "cv.aruco"],
            "decls": [["class cv.Foo", ": cv::Bar", [], []], ["cv.bar"]]
        }"#;
        let set = parse_document(src, "x.json").unwrap();
        assert_eq!(set.namespaces, vec!["cv", "cv.aruco"]);
        assert_eq!(set.decls.len(), 2);
        assert_eq!(set.decls[1].kind_and_bases, "");
        assert_eq!(set.decls[1].origin.index, 1);
    }

    #[test]
    fn enumerator_items_parse() {
        let src = r#"[["enum cv.Params.Mode", "", [], [
            ["const cv.Params.Mode.FAST", "1", [], []],
            ["const cv.Params.Mode.SLOW", "2", [], []]
        ]]]"#;
        let set = parse_document(src, "e.json").unwrap();
        let items = &set.decls[0].items;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].ty, "const cv.Params.Mode.FAST");
        assert_eq!(items[0].name, "1");
        assert_eq!(items[0].default, None);
        assert!(items[1].attrs.is_empty());
    }

    #[test]
    fn null_fields_are_tolerated() {
        let src = r#"[["cv.f", null, null, [["int", "a", null, null]], null, null]]"#;
        let set = parse_document(src, "n.json").unwrap();
        assert_eq!(set.decls[0].items[0].attrs, Vec::<String>::new());
        assert_eq!(set.decls[0].return_type, None);
    }
}
