//! Prefix tree that routes added/removed events to interested listeners.
//!
//! Most listeners only care about names under one path, and deciding
//! whether an event really interests them is expensive. Each node holds the
//! listeners interested in every name that reaches it, plus children keyed
//! by a prefix relative to the node. Sibling prefixes never share a first
//! character, so at most one child can match a given name and dispatch
//! costs one lookup per node on the matched path.
//!
//! Locking is per node: `listeners` and `children` each have their own
//! mutex. Structural changes hold the parent's `children` lock across the
//! read-split-write so dispatch never sees a half-split node. Locks are
//! only ever nested parent before child.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::listener::{same_listener, ListenerRef};

struct Child {
    prefix: String,
    node: Arc<Node>,
}

#[derive(Default)]
struct Node {
    listeners: Mutex<Vec<ListenerRef>>,
    /// Keyed by the first character of `Child::prefix`.
    children: Mutex<HashMap<char, Child>>,
}

/// How an existing child prefix overlaps a new one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Overlap {
    /// No leading characters in common.
    Disjoint,
    /// The existing prefix is a prefix of (or equal to) the new one.
    Covers,
    /// Both share this many leading bytes, and the existing prefix is longer.
    Shared(usize),
}

fn overlap(existing: &str, prefix: &str) -> Overlap {
    let shared: usize = existing
        .chars()
        .zip(prefix.chars())
        .take_while(|(a, b)| a == b)
        .map(|(a, _)| a.len_utf8())
        .sum();
    if shared == existing.len() {
        Overlap::Covers
    } else if shared == 0 {
        Overlap::Disjoint
    } else {
        Overlap::Shared(shared)
    }
}

impl Node {
    fn with_listener(listener: ListenerRef) -> Self {
        Self {
            listeners: Mutex::new(vec![listener]),
            children: Mutex::default(),
        }
    }

    fn add_listener(&self, listener: ListenerRef, prefix: &str) {
        let Some(first) = prefix.chars().next() else {
            self.listeners.lock().push(listener);
            return;
        };

        let mut children = self.children.lock();
        let found = children
            .get(&first)
            .map(|child| (overlap(&child.prefix, prefix), child.prefix.len()));

        match found {
            Some((Overlap::Covers, len)) => {
                let node = Arc::clone(&children[&first].node);
                node.add_listener(listener, &prefix[len..]);
            }
            Some((Overlap::Shared(n), _)) => {
                let Some(old) = children.remove(&first) else {
                    return;
                };
                debug!(shared = &prefix[..n], existing = %old.prefix, new = prefix, "splitting prefix node");
                let branch = Node::split(old, n, listener, &prefix[n..]);
                children.insert(
                    first,
                    Child {
                        prefix: prefix[..n].to_string(),
                        node: Arc::new(branch),
                    },
                );
            }
            Some((Overlap::Disjoint, _)) | None => {
                children.insert(
                    first,
                    Child {
                        prefix: prefix.to_string(),
                        node: Arc::new(Node::with_listener(listener)),
                    },
                );
            }
        }
    }

    /// Build the decision node placed at the shared `n`-byte prefix: the old
    /// child moves below it keyed by its own remainder, and the new listener
    /// goes either on the decision node itself or on a fresh child.
    fn split(old: Child, n: usize, listener: ListenerRef, rest: &str) -> Node {
        let branch = Node::default();
        {
            let mut children = branch.children.lock();
            let old_rest = old.prefix[n..].to_string();
            if let Some(c) = old_rest.chars().next() {
                children.insert(
                    c,
                    Child {
                        prefix: old_rest,
                        node: old.node,
                    },
                );
            }
            match rest.chars().next() {
                Some(c) => {
                    children.insert(
                        c,
                        Child {
                            prefix: rest.to_string(),
                            node: Arc::new(Node::with_listener(listener)),
                        },
                    );
                }
                None => branch.listeners.lock().push(listener),
            }
        }
        branch
    }

    fn matching_child(&self, full_name: &str, offset: usize) -> Option<(Arc<Node>, usize)> {
        let rest = full_name.get(offset..)?;
        let first = rest.chars().next()?;
        let children = self.children.lock();
        let child = children.get(&first)?;
        if !rest.starts_with(child.prefix.as_str()) {
            return None;
        }
        let matched = (Arc::clone(&child.node), child.prefix.len());
        Some(matched)
    }

    fn listeners_snapshot(&self) -> Vec<ListenerRef> {
        self.listeners.lock().clone()
    }

    fn children_snapshot(&self) -> Vec<(String, Arc<Node>)> {
        self.children
            .lock()
            .values()
            .map(|c| (c.prefix.clone(), Arc::clone(&c.node)))
            .collect()
    }

    fn remove_listener(&self, listener: &ListenerRef) -> usize {
        let removed = {
            let mut listeners = self.listeners.lock();
            let before = listeners.len();
            listeners.retain(|l| !same_listener(l, listener));
            before - listeners.len()
        };
        removed
            + self
                .children_snapshot()
                .iter()
                .map(|(_, node)| node.remove_listener(listener))
                .sum::<usize>()
    }

    fn snapshot(&self) -> HierarchySnapshot {
        let mut children: Vec<(String, HierarchySnapshot)> = self
            .children_snapshot()
            .into_iter()
            .map(|(prefix, node)| (prefix, node.snapshot()))
            .collect();
        children.sort_by(|a, b| a.0.cmp(&b.0));
        HierarchySnapshot {
            listeners: self.listeners.lock().len(),
            children,
        }
    }
}

/// Read-only structural view of a hierarchy, for diagnostics and tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HierarchySnapshot {
    pub listeners: usize,
    /// Child prefixes (relative to this node) in sorted order.
    pub children: Vec<(String, HierarchySnapshot)>,
}

impl HierarchySnapshot {
    pub fn child(&self, prefix: &str) -> Option<&HierarchySnapshot> {
        self.children
            .iter()
            .find(|(p, _)| p == prefix)
            .map(|(_, node)| node)
    }

    pub fn node_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(|(_, c)| c.node_count())
            .sum::<usize>()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            + self
                .children
                .iter()
                .map(|(_, c)| c.listener_count())
                .sum::<usize>()
    }

    /// True when no node has two children starting with the same character.
    pub fn first_chars_distinct(&self) -> bool {
        let mut firsts: Vec<Option<char>> = self
            .children
            .iter()
            .map(|(p, _)| p.chars().next())
            .collect();
        let len = firsts.len();
        firsts.sort();
        firsts.dedup();
        firsts.len() == len
            && firsts.iter().all(Option::is_some)
            && self.children.iter().all(|(_, c)| c.first_chars_distinct())
    }

    fn render(&self, indent: &str, out: &mut String) {
        if self.listeners > 0 {
            out.push_str(&format!("{indent}# listeners: {}\n", self.listeners));
        }
        for (prefix, child) in &self.children {
            out.push_str(&format!("{indent}'{prefix}'\n"));
            child.render(&format!("{indent}    "), out);
        }
    }
}

impl std::fmt::Display for HierarchySnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut out = String::new();
        self.render("    ", &mut out);
        f.write_str(&out)
    }
}

/// Root of the event routing tree.
#[derive(Default)]
pub struct PrefixHierarchy {
    root: Arc<Node>,
}

impl PrefixHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for every name that starts with `prefix`. An
    /// empty prefix matches every name.
    pub fn add_listener(&self, listener: ListenerRef, prefix: &str) {
        self.root.add_listener(listener, prefix);
    }

    /// Remove every registration of `listener`, wherever it was added.
    /// Nodes left empty stay in the tree. Returns the number removed.
    pub fn remove_listener(&self, listener: &ListenerRef) -> usize {
        self.root.remove_listener(listener)
    }

    pub fn dispatch_added(&self, name: &str) {
        self.dispatch(true, name);
    }

    pub fn dispatch_removed(&self, name: &str) {
        self.dispatch(false, name);
    }

    pub fn dispatch_added_batch(&self, names: &[String]) {
        self.dispatch_batch(true, names);
    }

    pub fn dispatch_removed_batch(&self, names: &[String]) {
        self.dispatch_batch(false, names);
    }

    fn dispatch(&self, added: bool, full_name: &str) {
        let mut node = Arc::clone(&self.root);
        let mut offset = 0;
        loop {
            for listener in node.listeners_snapshot() {
                if added {
                    listener.data_added(full_name);
                } else {
                    listener.data_removed(full_name);
                }
            }
            match node.matching_child(full_name, offset) {
                Some((child, len)) => {
                    node = child;
                    offset += len;
                }
                None => break,
            }
        }
    }

    /// Deliver each listener's share of `names` in one batch call.
    fn dispatch_batch(&self, added: bool, names: &[String]) {
        let mut groups: Vec<(ListenerRef, Vec<String>)> = Vec::new();
        for name in names {
            for listener in self.matching_listeners(name) {
                match groups.iter_mut().find(|(l, _)| same_listener(l, &listener)) {
                    Some((_, batch)) => batch.push(name.clone()),
                    None => groups.push((listener, vec![name.clone()])),
                }
            }
        }
        for (listener, batch) in groups {
            if added {
                listener.data_added_batch(&batch);
            } else {
                listener.data_removed_batch(&batch);
            }
        }
    }

    /// Every registration whose prefix is a prefix of `full_name`, in
    /// dispatch order. A listener registered twice on the path appears twice.
    pub fn matching_listeners(&self, full_name: &str) -> Vec<ListenerRef> {
        let mut out = Vec::new();
        let mut node = Arc::clone(&self.root);
        let mut offset = 0;
        loop {
            out.extend(node.listeners_snapshot());
            match node.matching_child(full_name, offset) {
                Some((child, len)) => {
                    node = child;
                    offset += len;
                }
                None => return out,
            }
        }
    }

    pub fn snapshot(&self) -> HierarchySnapshot {
        self.root.snapshot()
    }

    pub fn node_count(&self) -> usize {
        self.snapshot().node_count()
    }

    pub fn listener_count(&self) -> usize {
        self.snapshot().listener_count()
    }

    /// Log the tree structure at debug level.
    pub fn debug_dump(&self) {
        debug!(tree = %self.snapshot(), "prefix hierarchy dump");
    }
}
