use anyhow::Result;
use std::path::Path;
use tracing::debug;
use tree_sitter::{Node, Parser};

use super::{ClassIntrospection, ClassStructure, IntrospectRequest, Introspector};

/// Reads class structure straight from the `.java` files this run decompiled.
#[derive(Debug, Clone, Default)]
pub struct SourceIntrospector;

impl Introspector for SourceIntrospector {
    fn name(&self) -> &'static str {
        "source"
    }

    fn introspect(&self, request: &IntrospectRequest) -> Result<Vec<ClassIntrospection>> {
        let mut results = Vec::new();

        for source in &request.sources {
            if !source.path.is_file() {
                debug!(path = %source.path.display(), "no decompiled source");
                continue;
            }
            match inspect_file(&source.path) {
                Ok(structure) if request.matches(&structure.qualified_name()) => {
                    results.push(ClassIntrospection::loaded(structure));
                }
                Ok(_) => {}
                Err(message) if request.matches(&source.class_name) => {
                    results.push(ClassIntrospection::failed(source.class_name.clone(), message));
                }
                Err(message) => {
                    debug!(path = %source.path.display(), %message, "skipping unparsable source");
                }
            }
        }

        results.sort_by(|a, b| a.class_name.cmp(&b.class_name));
        Ok(results)
    }
}

fn inspect_file(path: &Path) -> std::result::Result<ClassStructure, String> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    parse_class_structure(&source)
        .ok_or_else(|| format!("no type declaration found in {}", path.display()))
}

/// Parses one compilation unit and describes its first top-level type.
pub fn parse_class_structure(source: &str) -> Option<ClassStructure> {
    if source.trim().is_empty() {
        return None;
    }

    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_java::LANGUAGE.into())
        .ok()?;
    let tree = parser.parse(source, None)?;
    let bytes = source.as_bytes();

    let mut structure = ClassStructure::default();
    let mut declaration = None;

    let root = tree.root_node();
    let mut cursor = root.walk();
    for item in root.named_children(&mut cursor) {
        match item.kind() {
            "package_declaration" => {
                let mut inner = item.walk();
                if let Some(name) = item
                    .named_children(&mut inner)
                    .find(|n| matches!(n.kind(), "scoped_identifier" | "identifier"))
                {
                    structure.package = text(&name, bytes).to_string();
                }
            }
            "import_declaration" => structure.imports.extend(import_path(&item, bytes)),
            "class_declaration"
            | "interface_declaration"
            | "enum_declaration"
            | "record_declaration"
            | "annotation_type_declaration"
                if declaration.is_none() =>
            {
                declaration = Some(item);
            }
            _ => {}
        }
    }

    let declaration = declaration?;
    structure.name = text(&declaration.child_by_field_name("name")?, bytes).to_string();
    structure.class_declaration = header(&declaration, bytes);

    let mut cursor = declaration.walk();
    for child in declaration.children(&mut cursor) {
        if child.kind() != "modifiers" {
            continue;
        }
        let mut inner = child.walk();
        structure.annotations.extend(
            child
                .named_children(&mut inner)
                .filter(|m| matches!(m.kind(), "marker_annotation" | "annotation"))
                .map(|m| single_line(text(&m, bytes))),
        );
    }

    // Record components are the record's fields.
    if let Some(components) = declaration.child_by_field_name("parameters") {
        let mut cursor = components.walk();
        structure.fields.extend(
            components
                .named_children(&mut cursor)
                .filter(|c| c.kind() == "formal_parameter")
                .map(|c| single_line(text(&c, bytes))),
        );
    }

    if let Some(body) = declaration.child_by_field_name("body") {
        collect_members(&body, bytes, &mut structure);
    }
    Some(structure)
}

/// `import a.b.C;` -> `a.b.C`, keeping `static ` and `.*`.
fn import_path(node: &Node, source: &[u8]) -> Option<String> {
    let mut is_static = false;
    let mut path = String::new();

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "static" => is_static = true,
            "scoped_identifier" | "identifier" => path = text(&child, source).to_string(),
            "asterisk" => path.push_str(".*"),
            _ => {}
        }
    }

    match (path.is_empty(), is_static) {
        (true, _) => None,
        (false, true) => Some(format!("static {path}")),
        (false, false) => Some(path),
    }
}

/// Members declared directly in a type body. Nested types are not descended into.
fn collect_members(body: &Node, source: &[u8], structure: &mut ClassStructure) {
    let mut cursor = body.walk();
    for member in body.named_children(&mut cursor) {
        match member.kind() {
            "field_declaration" | "constant_declaration" | "enum_constant" => {
                structure.fields.push(single_line(text(&member, source)));
            }
            "method_declaration"
            | "constructor_declaration"
            | "compact_constructor_declaration"
            | "annotation_type_element_declaration" => {
                structure.methods.push(header(&member, source));
            }
            "enum_body_declarations" => collect_members(&member, source, structure),
            _ => {}
        }
    }
}

/// Source text of a declaration up to its body, on one line.
fn header(node: &Node, source: &[u8]) -> String {
    let body = node.child_by_field_name("body").map(|b| b.id());
    let mut out = String::new();

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if Some(child.id()) == body {
            break;
        }
        if child.kind() == ";" {
            continue;
        }
        let attached = matches!(
            child.kind(),
            "formal_parameters" | "type_parameters" | "type_arguments"
        );
        if !out.is_empty() && !attached {
            out.push(' ');
        }
        out.push_str(text(&child, source));
    }

    single_line(&out)
}

fn text<'a>(node: &Node, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

fn single_line(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
