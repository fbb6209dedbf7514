//! Java syntax validation with tree-sitter
//!
//! A generated test is usually a bare method, sometimes a whole class. A
//! snippet that declares no type is checked inside a synthetic class body so
//! that a lone `@Test` method is accepted.

use std::cell::RefCell;
use std::fmt;

use tracing::{debug, error};
use tree_sitter::{Node, Parser, Tree};

/// Name of the synthetic class wrapped around member snippets
const WRAPPER_CLASS: &str = "GeneratedTestHolder";

/// Longest source excerpt quoted in an error description
const MAX_EXCERPT_CHARS: usize = 40;

const NO_METHOD: &str = "expected a test method declaration";

const TYPE_DECLARATIONS: &[&str] = &[
    "class_declaration",
    "interface_declaration",
    "enum_declaration",
    "record_declaration",
];

thread_local! {
    static JAVA_PARSER: RefCell<Result<Parser, String>> = RefCell::new({
        let mut p = Parser::new();
        match p.set_language(&tree_sitter_java::LANGUAGE.into()) {
            Ok(()) => Ok(p),
            Err(e) => {
                error!(error = %e, "Java grammar rejected by tree-sitter");
                Err(e.to_string())
            }
        }
    });
}

/// A syntax error with a 1-based position relative to the snippet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub description: String,
    pub line: usize,
    pub column: usize,
}

impl SyntaxError {
    /// Human-readable position, e.g. `line 3, column 14`
    pub fn position(&self) -> String {
        format!("line {}, column {}", self.line, self.column)
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.description, self.position())
    }
}

/// What kind of snippet passed the check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactShape {
    /// A full compilation unit declaring a type
    CompilationUnit,
    /// Class members (methods, fields) without an enclosing type
    Members,
}

/// A syntactically valid snippet and what can be spliced into a test class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckedSource {
    pub shape: ArtifactShape,
    /// Text that belongs inside a test class body
    pub insertable: String,
    /// Names of the declared methods, in source order
    pub methods: Vec<String>,
}

fn parse(content: &str) -> Result<Tree, SyntaxError> {
    JAVA_PARSER.with(|cell| parse_with(&mut cell.borrow_mut(), content))
}

fn parse_with(parser: &mut Result<Parser, String>, content: &str) -> Result<Tree, SyntaxError> {
    match parser {
        Ok(parser) => parser.parse(content, None).ok_or_else(|| at_start("the Java parser produced no syntax tree")),
        Err(reason) => Err(at_start(&format!("the Java grammar is unavailable: {}", reason))),
    }
}

/// Check `source` for Java syntax errors
pub fn check_java(source: &str) -> Result<CheckedSource, SyntaxError> {
    debug!(len = source.len(), "check_java: called");
    let tree = parse(source)?;
    let root = tree.root_node();

    let mut cursor = root.walk();
    let type_decl = root
        .named_children(&mut cursor)
        .find(|n| TYPE_DECLARATIONS.contains(&n.kind()));

    if let Some(decl) = type_decl {
        debug!(kind = decl.kind(), "check_java: compilation unit");
        if root.has_error() {
            return Err(describe(first_error(root).unwrap_or(root), source.as_bytes(), 0, source));
        }
        let body = decl.child_by_field_name("body");
        let insertable = body
            .map(|b| inner_text(b, source.as_bytes()))
            .unwrap_or_default();
        let methods = body.map(|b| method_names(b, source.as_bytes())).unwrap_or_default();
        if methods.is_empty() {
            debug!("check_java: class declares no method");
            return Err(at_start(NO_METHOD));
        }
        return Ok(CheckedSource {
            shape: ArtifactShape::CompilationUnit,
            insertable,
            methods,
        });
    }

    debug!("check_java: no type declaration, checking as class members");
    let (header_lines, members) = split_header(source);
    if header_lines > 0 {
        debug!(header_lines, "check_java: dropped leading import/package lines");
    }
    let wrapped = format!("class {} {{\n{}\n}}\n", WRAPPER_CLASS, members);
    let tree = parse(&wrapped)?;
    let root = tree.root_node();
    if root.has_error() {
        return Err(describe(first_error(root).unwrap_or(root), wrapped.as_bytes(), 1, source));
    }

    let mut cursor = root.walk();
    let methods = root
        .named_children(&mut cursor)
        .find(|n| n.kind() == "class_declaration")
        .and_then(|decl| decl.child_by_field_name("body"))
        .map(|body| method_names(body, wrapped.as_bytes()))
        .unwrap_or_default();

    if methods.is_empty() {
        debug!("check_java: snippet declares no method");
        return Err(at_start(NO_METHOD));
    }

    Ok(CheckedSource {
        shape: ArtifactShape::Members,
        insertable: members.trim().to_string(),
        methods,
    })
}

fn at_start(description: &str) -> SyntaxError {
    SyntaxError {
        description: description.to_string(),
        line: 1,
        column: 1,
    }
}

/// Blank out leading `import`/`package` lines so member snippets can be wrapped
///
/// Line count is preserved, keeping error positions relative to `source`.
/// Returns the number of blanked lines and the remaining text.
fn split_header(source: &str) -> (usize, String) {
    let mut blanked = 0;
    let mut in_header = true;
    let lines: Vec<&str> = source
        .lines()
        .map(|line| {
            let trimmed = line.trim();
            if in_header && (trimmed.starts_with("import ") || trimmed.starts_with("package ")) {
                blanked += 1;
                return "";
            }
            if !(trimmed.is_empty() || trimmed.starts_with("//")) {
                in_header = false;
            }
            line
        })
        .collect();
    (blanked, lines.join("\n"))
}

/// First ERROR or MISSING node in document order
fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(found) = first_error(child) {
            return Some(found);
        }
    }
    None
}

/// Turn an error node into a description and a position inside the snippet
///
/// `line_offset` is the number of wrapper lines prepended to the snippet.
fn describe(node: Node<'_>, text: &[u8], line_offset: usize, snippet: &str) -> SyntaxError {
    let description = if node.is_missing() {
        format!("missing `{}`", node.kind())
    } else {
        let excerpt: String = node
            .utf8_text(text)
            .unwrap_or("")
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("")
            .chars()
            .take(MAX_EXCERPT_CHARS)
            .collect();
        if excerpt.is_empty() {
            "unexpected end of input".to_string()
        } else {
            format!("unexpected `{}`", excerpt)
        }
    };

    let point = node.start_position();
    let last_line = snippet.lines().count().max(1);
    let line = (point.row + 1).saturating_sub(line_offset).clamp(1, last_line);
    let column = if point.row < line_offset { 1 } else { point.column + 1 };

    SyntaxError {
        description,
        line,
        column,
    }
}

/// Text between the braces of a body node
fn inner_text(body: Node<'_>, text: &[u8]) -> String {
    let start = body.start_byte() + 1;
    let end = body.end_byte().saturating_sub(1).max(start);
    String::from_utf8_lossy(&text[start..end]).trim().to_string()
}

fn method_names(body: Node<'_>, text: &[u8]) -> Vec<String> {
    let mut cursor = body.walk();
    body.named_children(&mut cursor)
        .filter(|n| n.kind() == "method_declaration")
        .filter_map(|n| n.child_by_field_name("name"))
        .filter_map(|name| name.utf8_text(text).ok())
        .map(str::to_string)
        .collect()
}
