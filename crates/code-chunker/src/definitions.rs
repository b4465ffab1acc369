//! Per-language tables of "definition" node kinds and identifier heuristics.

use crate::block::ContainerType;
use crate::language::Language;
use tree_sitter::Node;

const RUST_DEFINITIONS: &[&str] = &[
    "function_item",
    "function_signature_item",
    "struct_item",
    "enum_item",
    "union_item",
    "trait_item",
    "impl_item",
    "mod_item",
    "macro_definition",
    "const_item",
    "static_item",
    "type_item",
];

const PYTHON_DEFINITIONS: &[&str] = &[
    "function_definition",
    "class_definition",
    "decorated_definition",
];

const JAVASCRIPT_DEFINITIONS: &[&str] = &[
    "function_declaration",
    "generator_function_declaration",
    "class_declaration",
    "method_definition",
    "field_definition",
    "variable_declarator",
    "pair",
];

const TYPESCRIPT_DEFINITIONS: &[&str] = &[
    "function_declaration",
    "generator_function_declaration",
    "function_signature",
    "class_declaration",
    "abstract_class_declaration",
    "method_definition",
    "abstract_method_signature",
    "public_field_definition",
    "interface_declaration",
    "type_alias_declaration",
    "enum_declaration",
    "internal_module",
    "module",
    "variable_declarator",
    "pair",
];

/// Values that make a `variable_declarator` worth indexing on its own
const DECLARATOR_VALUES: &[&str] = &[
    "arrow_function",
    "function_expression",
    "function",
    "generator_function",
    "class",
    "object",
];

const IDENTIFIER_KINDS: &[&str] = &[
    "identifier",
    "type_identifier",
    "property_identifier",
    "field_identifier",
    "constant",
];

fn definition_kinds(language: Language) -> &'static [&'static str] {
    match language {
        Language::Rust => RUST_DEFINITIONS,
        Language::Python => PYTHON_DEFINITIONS,
        Language::JavaScript => JAVASCRIPT_DEFINITIONS,
        Language::TypeScript | Language::Tsx => TYPESCRIPT_DEFINITIONS,
        _ => &[],
    }
}

pub(crate) fn is_definition(language: Language, node: Node<'_>) -> bool {
    let kind = node.kind();
    if !definition_kinds(language).contains(&kind) {
        return false;
    }
    match kind {
        "variable_declarator" => node
            .child_by_field_name("value")
            .is_some_and(|value| DECLARATOR_VALUES.contains(&value.kind())),
        // TypeScript `module` also names the program root of some grammars
        "module" => node.parent().is_some(),
        _ => true,
    }
}

/// Collect definition nodes in document order without recursion.
pub(crate) fn collect_definitions<'t>(language: Language, root: Node<'t>) -> Vec<Node<'t>> {
    let mut found = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if is_definition(language, node) {
            found.push(node);
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'t>> = node.named_children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    found
}

/// Normalized container type of a node kind, if it can enclose other definitions.
pub(crate) fn container_type(node: Node<'_>) -> Option<ContainerType> {
    let ty = match node.kind() {
        "class_declaration"
        | "class"
        | "abstract_class_declaration"
        | "class_definition"
        | "struct_item"
        | "enum_item"
        | "union_item"
        | "impl_item"
        | "enum_declaration" => ContainerType::Class,
        "interface_declaration" | "trait_item" => ContainerType::Interface,
        "internal_module" | "module" if node.parent().is_some() => ContainerType::Namespace,
        "mod_item" => ContainerType::Module,
        "method_definition" => ContainerType::Method,
        "function_definition" | "function_item" => {
            if enclosing_container_is_class(node) {
                ContainerType::Method
            } else {
                ContainerType::Function
            }
        }
        "function_declaration"
        | "generator_function_declaration"
        | "arrow_function"
        | "function_expression"
        | "function"
        | "generator_function" => ContainerType::Function,
        "object" => ContainerType::Object,
        "pair" | "public_field_definition" | "field_definition" => ContainerType::Property,
        _ => return None,
    };
    Some(ty)
}

fn enclosing_container_is_class(node: Node<'_>) -> bool {
    let mut current = node.parent();
    while let Some(ancestor) = current {
        match ancestor.kind() {
            "class_definition" | "impl_item" | "trait_item" => return true,
            "function_definition" | "function_item" | "module" | "source_file" | "mod_item" => {
                return false
            }
            _ => current = ancestor.parent(),
        }
    }
    false
}

/// Best-effort name for a node: a `name` field, a named child, or a structural
/// heuristic for key/value entries and anonymous values bound to a name.
pub(crate) fn node_identifier(node: Node<'_>, source: &[u8]) -> Option<String> {
    match node.kind() {
        "impl_item" => {
            let ty = field_text(node, "type", source)?;
            Some(match field_text(node, "trait", source) {
                Some(tr) => format!("{tr} for {ty}"),
                None => ty,
            })
        }
        "pair" => field_text(node, "key", source).map(|key| unquote(&key)),
        "variable_declarator" => field_text(node, "name", source),
        "lexical_declaration" | "variable_declaration" => {
            let mut cursor = node.walk();
            let declarator = node
                .named_children(&mut cursor)
                .find(|child| child.kind() == "variable_declarator")?;
            field_text(declarator, "name", source)
        }
        "decorated_definition" => node
            .child_by_field_name("definition")
            .and_then(|def| node_identifier(def, source)),
        "export_statement" => node
            .child_by_field_name("declaration")
            .and_then(|decl| node_identifier(decl, source)),
        "object" | "arrow_function" | "function_expression" | "function" | "generator_function"
        | "class" => field_text(node, "name", source).or_else(|| bound_name(node, source)),
        _ => field_text(node, "name", source).or_else(|| first_identifier_child(node, source)),
    }
}

/// Name an anonymous value gets from the slot it is assigned to.
fn bound_name(node: Node<'_>, source: &[u8]) -> Option<String> {
    let parent = node.parent()?;
    match parent.kind() {
        "pair" => field_text(parent, "key", source).map(|key| unquote(&key)),
        "variable_declarator" | "public_field_definition" | "field_definition" => {
            field_text(parent, "name", source)
                .or_else(|| field_text(parent, "property", source))
        }
        "assignment_expression" => field_text(parent, "left", source),
        _ => None,
    }
}

fn first_identifier_child(node: Node<'_>, source: &[u8]) -> Option<String> {
    let mut cursor = node.walk();
    let ident = node
        .named_children(&mut cursor)
        .find(|child| IDENTIFIER_KINDS.contains(&child.kind()))?;
    text_of(ident, source)
}

fn field_text(node: Node<'_>, field: &str, source: &[u8]) -> Option<String> {
    node.child_by_field_name(field)
        .and_then(|child| text_of(child, source))
}

fn text_of(node: Node<'_>, source: &[u8]) -> Option<String> {
    let text = node.utf8_text(source).ok()?.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn unquote(key: &str) -> String {
    key.trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .to_string()
}
