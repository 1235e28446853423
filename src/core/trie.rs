//! Path trie used by the router.
//!
//! Nodes live in an arena owned by [`PathTrie`]; parent links are plain indices so walking
//! back to the root never needs shared ownership. Each node consumes exactly one path
//! segment, which makes a node's depth equal to the index of the segment it matched.
//!
//! Lookup rules:
//! * a literal segment matches a static child exactly;
//! * any other non-empty segment falls through to the node's single dynamic child;
//! * a static match is taken first and committed to. Lookup never backtracks into the
//!   dynamic sibling when a deeper segment fails to match.
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use http::Method;

use crate::{
    core::{
        error::{KernelError, KernelResult},
        route::Route,
    },
    utils::url::decode_segment,
};

/// Prefix marking a path segment as a captured parameter (`/dogs/:id`).
pub const PARAMETER_MARKER: char = ':';

/// Index of a node inside the trie arena.
pub type NodeId = usize;

const ROOT: NodeId = 0;

/// Route parameters captured during lookup, keyed by parameter name.
pub type RouteParameters = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Root,
    Static(String),
    /// Matches any non-empty segment and captures it under this name.
    Dynamic(String),
}

#[derive(Debug)]
pub struct PathNode {
    segment: Segment,
    parent: Option<NodeId>,
    static_children: BTreeMap<String, NodeId>,
    dynamic_child: Option<NodeId>,
    methods: HashMap<Method, MethodNode>,
}

impl PathNode {
    fn new(segment: Segment, parent: Option<NodeId>) -> Self {
        Self {
            segment,
            parent,
            static_children: BTreeMap::new(),
            dynamic_child: None,
            methods: HashMap::new(),
        }
    }

    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }
}

/// Binding of one HTTP method at a path node.
#[derive(Debug, Clone)]
pub struct MethodNode {
    method: Method,
    parent: NodeId,
    route: Arc<Route>,
}

impl MethodNode {
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The path node this method hangs off.
    pub fn parent(&self) -> NodeId {
        self.parent
    }

    pub fn route(&self) -> &Arc<Route> {
        &self.route
    }
}

/// Strict prefix tree over `/`-delimited path segments.
#[derive(Debug)]
pub struct PathTrie {
    nodes: Vec<PathNode>,
}

impl Default for PathTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl PathTrie {
    pub fn new() -> Self {
        Self {
            nodes: vec![PathNode::new(Segment::Root, None)],
        }
    }

    pub fn node(&self, id: NodeId) -> Option<&PathNode> {
        self.nodes.get(id)
    }

    /// Number of path nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when only the root exists.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Number of bound `(path, method)` pairs.
    pub fn route_count(&self) -> usize {
        self.nodes.iter().map(|node| node.methods.len()).sum()
    }

    /// Bind `route` to `method` at the path described by `segments`.
    ///
    /// Re-binding an existing `(path, method)` pair replaces the previous route, which is
    /// returned so the caller can report the overwrite.
    pub fn add(
        &mut self,
        segments: &[&str],
        method: Method,
        route: Arc<Route>,
    ) -> KernelResult<Option<Arc<Route>>> {
        let mut current = ROOT;
        for segment in segments {
            current = match segment.strip_prefix(PARAMETER_MARKER) {
                Some(name) => self.dynamic_child(current, name)?,
                None => self.static_child(current, segment),
            };
        }

        let previous = self.nodes[current].methods.insert(
            method.clone(),
            MethodNode {
                method,
                parent: current,
                route,
            },
        );

        Ok(previous.map(|method_node| method_node.route))
    }

    fn static_child(&mut self, parent: NodeId, literal: &str) -> NodeId {
        if let Some(&child) = self.nodes[parent].static_children.get(literal) {
            return child;
        }

        let child = self.push(Segment::Static(literal.to_string()), parent);
        self.nodes[parent]
            .static_children
            .insert(literal.to_string(), child);
        child
    }

    fn dynamic_child(&mut self, parent: NodeId, name: &str) -> KernelResult<NodeId> {
        if name.is_empty() {
            return Err(KernelError::RouteConflict(format!(
                "parameter segment '{PARAMETER_MARKER}' has no name"
            )));
        }

        if let Some(child) = self.nodes[parent].dynamic_child {
            return match &self.nodes[child].segment {
                Segment::Dynamic(existing) if existing == name => Ok(child),
                Segment::Dynamic(existing) => Err(KernelError::RouteConflict(format!(
                    "parameter '{PARAMETER_MARKER}{name}' collides with '{PARAMETER_MARKER}{existing}' at the same position"
                ))),
                _ => Ok(child),
            };
        }

        let child = self.push(Segment::Dynamic(name.to_string()), parent);
        self.nodes[parent].dynamic_child = Some(child);
        Ok(child)
    }

    fn push(&mut self, segment: Segment, parent: NodeId) -> NodeId {
        self.nodes.push(PathNode::new(segment, Some(parent)));
        self.nodes.len() - 1
    }

    /// Resolve `segments` to the method node bound for `method`, if any.
    pub fn find(&self, segments: &[&str], method: &Method) -> Option<&MethodNode> {
        let mut current = ROOT;
        for segment in segments {
            let node = &self.nodes[current];
            current = match node.static_children.get(*segment) {
                Some(&child) => child,
                None => node.dynamic_child?,
            };
        }

        self.nodes[current].methods.get(method)
    }

    /// Pair each dynamic ancestor of `method_node` with the segment it consumed.
    ///
    /// `segments` must be the same slice that produced `method_node` through [`find`](Self::find).
    pub fn route_parameters(&self, method_node: &MethodNode, segments: &[&str]) -> RouteParameters {
        let mut captured = Vec::new();
        let mut depth = segments.len();
        let mut current = Some(method_node.parent);

        while let Some(id) = current {
            let node = &self.nodes[id];
            if node.parent.is_none() {
                break;
            }

            depth = depth.saturating_sub(1);
            if let (Segment::Dynamic(name), Some(value)) = (&node.segment, segments.get(depth)) {
                captured.push((name.clone(), decode_segment(value)));
            }
            current = node.parent;
        }

        // Collected leaf-to-root; insert root-to-leaf.
        captured.into_iter().rev().collect()
    }
}
