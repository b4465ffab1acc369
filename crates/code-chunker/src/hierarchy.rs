use crate::block::{ContainerType, ParentContainer};
use crate::definitions::{container_type, node_identifier};
use tree_sitter::Node;

/// Walk ancestors of `node` and keep the named containers, outermost first.
pub(crate) fn parent_chain(node: Node<'_>, source: &[u8]) -> Vec<ParentContainer> {
    let mut chain: Vec<ParentContainer> = Vec::new();
    let mut current = node.parent();
    while let Some(ancestor) = current {
        current = ancestor.parent();
        let Some(container_type) = container_type(ancestor) else {
            continue;
        };
        let Some(identifier) = node_identifier(ancestor, source) else {
            continue;
        };
        // `{ key: { ... } }` yields the same name for the pair and its object
        if chain.last().is_some_and(|inner| inner.identifier == identifier) {
            continue;
        }
        chain.push(ParentContainer {
            identifier,
            container_type,
        });
    }
    chain.reverse();
    chain
}

/// Human-readable path such as `class Repo > method load`, or `None` when
/// nothing along the way has a name.
pub(crate) fn hierarchy_display(
    chain: &[ParentContainer],
    self_type: Option<ContainerType>,
    block_type: &str,
    identifier: Option<&str>,
) -> Option<String> {
    let mut parts: Vec<String> = chain
        .iter()
        .map(|parent| format!("{} {}", parent.container_type.as_str(), parent.identifier))
        .collect();
    if let Some(identifier) = identifier {
        let label = self_type.map_or(block_type, |t| t.as_str());
        parts.push(format!("{label} {identifier}"));
    }
    (!parts.is_empty()).then(|| parts.join(" > "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn display_joins_chain_and_self() {
        let chain = vec![ParentContainer {
            identifier: "Repo".into(),
            container_type: ContainerType::Class,
        }];
        assert_eq!(
            hierarchy_display(&chain, Some(ContainerType::Method), "function_definition", Some("load")),
            Some("class Repo > method load".to_string())
        );
    }

    #[test]
    fn display_uses_block_type_for_non_containers() {
        assert_eq!(
            hierarchy_display(&[], None, "const_item", Some("LIMIT")),
            Some("const_item LIMIT".to_string())
        );
    }

    #[test]
    fn display_is_none_without_identifiers() {
        assert_eq!(hierarchy_display(&[], None, "fallback_chunk", None), None);
    }
}
