use super::{NodeId, NodeKind, NodeRef};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Child,
    Descendant,
    Attribute,
    SelfAxis,
    DescendantOrSelf,
    FollowingSibling,
    Following,
    Namespace,
    Parent,
    Ancestor,
    PrecedingSibling,
    Preceding,
    AncestorOrSelf,
}

impl Axis {
    pub const ALL: [Axis; 13] = [
        Axis::Child,
        Axis::Descendant,
        Axis::Attribute,
        Axis::SelfAxis,
        Axis::DescendantOrSelf,
        Axis::FollowingSibling,
        Axis::Following,
        Axis::Namespace,
        Axis::Parent,
        Axis::Ancestor,
        Axis::PrecedingSibling,
        Axis::Preceding,
        Axis::AncestorOrSelf,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Axis::Child => "child",
            Axis::Descendant => "descendant",
            Axis::Attribute => "attribute",
            Axis::SelfAxis => "self",
            Axis::DescendantOrSelf => "descendant-or-self",
            Axis::FollowingSibling => "following-sibling",
            Axis::Following => "following",
            Axis::Namespace => "namespace",
            Axis::Parent => "parent",
            Axis::Ancestor => "ancestor",
            Axis::PrecedingSibling => "preceding-sibling",
            Axis::Preceding => "preceding",
            Axis::AncestorOrSelf => "ancestor-or-self",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.name() == name)
    }

    /// Reverse axes yield nodes in reverse document order.
    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            Axis::Parent | Axis::Ancestor | Axis::AncestorOrSelf | Axis::Preceding | Axis::PrecedingSibling
        )
    }

    /// The node kind a name test on this axis selects.
    pub fn principal_kind(self) -> NodeKind {
        match self {
            Axis::Attribute => NodeKind::Attribute,
            Axis::Namespace => NodeKind::Namespace,
            _ => NodeKind::Element,
        }
    }
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

enum AxisState<'a> {
    Done,
    Once(NodeRef<'a>),
    Forward { base: NodeRef<'a>, ids: std::slice::Iter<'a, NodeId> },
    Backward { base: NodeRef<'a>, ids: std::slice::Iter<'a, NodeId> },
    Ancestors { next: Option<NodeRef<'a>> },
    Descendants {
        base: NodeRef<'a>,
        pending_self: bool,
        stack: Vec<std::slice::Iter<'a, NodeId>>,
        // content targets already expanded; only schema trees share content
        expanded: Option<HashSet<NodeId>>,
    },
    Following { base: NodeRef<'a>, next: usize, end: usize },
    Preceding { base: NodeRef<'a>, next: usize, start: usize, ancestors: Vec<NodeId> },
}

/// Lazy traversal of one axis from a context node.
pub struct AxisIter<'a> {
    state: AxisState<'a>,
}

fn sibling_slice<'a>(node: NodeRef<'a>) -> Option<(&'a [NodeId], usize)> {
    if matches!(node.kind(), NodeKind::Attribute | NodeKind::Namespace) {
        return None;
    }
    let parent = node.parent()?;
    let siblings = parent.content_node().children.as_slice();
    let index = siblings.iter().position(|id| *id == node.id)?;
    Some((siblings, index))
}

impl<'a> AxisIter<'a> {
    pub fn new(node: NodeRef<'a>, axis: Axis) -> Self {
        let state = match axis {
            Axis::SelfAxis => AxisState::Once(node),
            Axis::Parent => node.parent().map_or(AxisState::Done, AxisState::Once),
            Axis::Child => AxisState::Forward { base: node, ids: node.content_node().children.iter() },
            Axis::Attribute => {
                AxisState::Forward { base: node, ids: node.content_node().attributes.iter() }
            }
            Axis::Namespace => AxisState::Forward { base: node, ids: node.data().namespaces.iter() },
            Axis::Ancestor => AxisState::Ancestors { next: node.parent() },
            Axis::AncestorOrSelf => AxisState::Ancestors { next: Some(node) },
            Axis::Descendant | Axis::DescendantOrSelf => {
                let expanded = node.tree.schema.is_some().then(|| {
                    let mut set = HashSet::new();
                    set.insert(node.content_target().unwrap_or(node.id));
                    set
                });
                AxisState::Descendants {
                    base: node,
                    pending_self: axis == Axis::DescendantOrSelf,
                    stack: vec![node.content_node().children.iter()],
                    expanded,
                }
            }
            Axis::FollowingSibling => match sibling_slice(node) {
                Some((siblings, index)) => {
                    AxisState::Forward { base: node, ids: siblings[index + 1..].iter() }
                }
                None => AxisState::Done,
            },
            Axis::PrecedingSibling => match sibling_slice(node) {
                Some((siblings, index)) => AxisState::Backward { base: node, ids: siblings[..index].iter() },
                None => AxisState::Done,
            },
            Axis::Following => AxisState::Following {
                base: node,
                next: node.subtree_end() + 1,
                end: node.root().subtree_end(),
            },
            Axis::Preceding => {
                let mut ancestors = Vec::new();
                let mut current = node.parent();
                while let Some(p) = current {
                    ancestors.push(p.id);
                    current = p.parent();
                }
                AxisState::Preceding {
                    base: node,
                    next: node.id.0,
                    start: node.root().id.0,
                    ancestors,
                }
            }
        };
        Self { state }
    }
}

impl<'a> Iterator for AxisIter<'a> {
    type Item = NodeRef<'a>;

    fn next(&mut self) -> Option<NodeRef<'a>> {
        match &mut self.state {
            AxisState::Done => None,
            AxisState::Once(node) => {
                let node = *node;
                self.state = AxisState::Done;
                Some(node)
            }
            AxisState::Forward { base, ids } => ids.next().map(|id| base.at(*id)),
            AxisState::Backward { base, ids } => ids.next_back().map(|id| base.at(*id)),
            AxisState::Ancestors { next } => {
                let node = (*next)?;
                *next = node.parent();
                Some(node)
            }
            AxisState::Descendants { base, pending_self, stack, expanded } => {
                if *pending_self {
                    *pending_self = false;
                    return Some(*base);
                }
                loop {
                    let top = stack.last_mut()?;
                    let Some(id) = top.next() else {
                        stack.pop();
                        continue;
                    };
                    let node = base.at(*id);
                    let descend = match expanded {
                        Some(set) => set.insert(node.content_target().unwrap_or(node.id)),
                        None => true,
                    };
                    if descend {
                        stack.push(node.content_node().children.iter());
                    }
                    return Some(node);
                }
            }
            AxisState::Following { base, next, end } => {
                while *next <= *end {
                    let node = base.at(NodeId(*next));
                    *next += 1;
                    if !matches!(node.kind(), NodeKind::Attribute | NodeKind::Namespace) {
                        return Some(node);
                    }
                }
                None
            }
            AxisState::Preceding { base, next, start, ancestors } => {
                while *next > *start {
                    *next -= 1;
                    let id = NodeId(*next);
                    let node = base.at(id);
                    if matches!(node.kind(), NodeKind::Attribute | NodeKind::Namespace)
                        || ancestors.contains(&id)
                    {
                        continue;
                    }
                    return Some(node);
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_names_round_trip() {
        for axis in Axis::ALL {
            assert_eq!(Axis::from_name(axis.name()), Some(axis));
        }
        assert_eq!(Axis::from_name("sideways"), None);
        assert!(Axis::PrecedingSibling.is_reverse());
        assert!(!Axis::FollowingSibling.is_reverse());
        assert_eq!(Axis::Attribute.principal_kind(), NodeKind::Attribute);
    }
}
