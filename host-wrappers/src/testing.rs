//! In-memory host for exercising wrapper trees without a real application.
//!
//! Objects ("nodes") live in the fake; every `create_child` / `item` call
//! mints a fresh [`HandleId`] pointing at a node, the way an automation
//! server hands out a new reference per property access. Each minted
//! handle carries its own release counter, and any call made through a
//! released handle is recorded as a misuse.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};

use crate::errors::{HostFault, HostResult};
use crate::handle::{HandleId, HostModel};
use crate::value::HostValue;

/// Index of an object inside a [`FakeHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// The host operation a scripted fault applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOp {
    CreateChild,
    Release,
    GetProperty,
    SetProperty,
    InvokeMethod,
    Count,
    Item,
}

/// A call that must never happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Misuse {
    /// A handle was released more than once.
    DoubleRelease(HandleId),
    /// A call other than `release` went through a released handle.
    UseAfterRelease(HandleId, HostOp),
    /// The handle was never minted by this host.
    UnknownHandle(HandleId, HostOp),
}

#[derive(Debug, Default)]
struct Node {
    kind: String,
    properties: BTreeMap<String, HostValue>,
    children: BTreeMap<String, NodeId>,
    constructors: BTreeMap<String, String>,
    elements: Vec<NodeId>,
}

#[derive(Debug)]
struct HandleRecord {
    node: NodeId,
    releases: u32,
}

#[derive(Debug)]
struct ScriptedFault {
    op: HostOp,
    name: Option<String>,
    fault: HostFault,
}

#[derive(Debug, Default)]
struct Inner {
    nodes: Vec<Node>,
    handles: BTreeMap<HandleId, HandleRecord>,
    next_handle: u64,
    faults: VecDeque<ScriptedFault>,
    misuse: Vec<Misuse>,
    calls: Vec<(HostOp, HandleId, String)>,
}

/// A scriptable in-memory [`HostModel`].
#[derive(Debug, Default)]
pub struct FakeHost {
    inner: RefCell<Inner>,
}

#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn member_not_found(name: &str) -> HostFault {
    HostFault::new(0x8002_0003_u32 as i32, format!("no member '{name}'"))
}

#[allow(clippy::cast_possible_wrap)]
fn bad_index(index: usize) -> HostFault {
    HostFault::new(0x8002_000B_u32 as i32, format!("index {index} out of range"))
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an object of `kind` and returns its node.
    pub fn add_node(&self, kind: &str) -> NodeId {
        let mut inner = self.inner.borrow_mut();
        inner.nodes.push(Node {
            kind: kind.to_string(),
            ..Node::default()
        });
        NodeId(inner.nodes.len() - 1)
    }

    pub fn set(&self, node: NodeId, name: &str, value: impl Into<HostValue>) {
        self.inner.borrow_mut().nodes[node.0]
            .properties
            .insert(name.to_string(), value.into());
    }

    /// Current value of a property, as the host sees it.
    pub fn property(&self, node: NodeId, name: &str) -> Option<HostValue> {
        self.inner.borrow().nodes[node.0].properties.get(name).cloned()
    }

    /// Makes `child` reachable from `parent` through the object property `name`.
    pub fn link(&self, parent: NodeId, name: &str, child: NodeId) {
        self.inner.borrow_mut().nodes[parent.0]
            .children
            .insert(name.to_string(), child);
    }

    /// Appends `element` to the collection `collection`.
    pub fn push_element(&self, collection: NodeId, element: NodeId) {
        self.inner.borrow_mut().nodes[collection.0].elements.push(element);
    }

    /// Makes `create_child(collection, name)` build a new `kind` node and
    /// append it to the collection, like `Documents.Add`.
    pub fn constructor(&self, collection: NodeId, name: &str, kind: &str) {
        self.inner.borrow_mut().nodes[collection.0]
            .constructors
            .insert(name.to_string(), kind.to_string());
    }

    /// Mints a handle for `node`, as the host does for its root object.
    pub fn open(&self, node: NodeId) -> HandleId {
        Self::mint(&mut self.inner.borrow_mut(), node)
    }

    /// Fails the next matching call once. `name` of `None` matches any name.
    pub fn fail_next(&self, op: HostOp, name: Option<&str>, fault: HostFault) {
        self.inner.borrow_mut().faults.push_back(ScriptedFault {
            op,
            name: name.map(str::to_string),
            fault,
        });
    }

    /// Release count of one handle; `0` for unknown handles.
    pub fn release_count(&self, handle: HandleId) -> u32 {
        self.inner
            .borrow()
            .handles
            .get(&handle)
            .map_or(0, |record| record.releases)
    }

    /// Every handle minted for `node`, in minting order.
    pub fn handles_for(&self, node: NodeId) -> Vec<HandleId> {
        self.inner
            .borrow()
            .handles
            .iter()
            .filter(|(_, record)| record.node == node)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Every minted handle, in minting order.
    pub fn minted(&self) -> Vec<HandleId> {
        self.inner.borrow().handles.keys().copied().collect()
    }

    /// Minted handles not yet released.
    pub fn live_handles(&self) -> Vec<HandleId> {
        self.inner
            .borrow()
            .handles
            .iter()
            .filter(|(_, record)| record.releases == 0)
            .map(|(id, _)| *id)
            .collect()
    }

    /// The node a handle points at.
    pub fn node_of(&self, handle: HandleId) -> Option<NodeId> {
        self.inner.borrow().handles.get(&handle).map(|r| r.node)
    }

    pub fn kind_of(&self, node: NodeId) -> String {
        self.inner.borrow().nodes[node.0].kind.clone()
    }

    pub fn misuse(&self) -> Vec<Misuse> {
        self.inner.borrow().misuse.clone()
    }

    /// Number of calls of `op` made so far, releases included.
    pub fn calls(&self, op: HostOp) -> usize {
        self.inner
            .borrow()
            .calls
            .iter()
            .filter(|(recorded, _, _)| *recorded == op)
            .count()
    }

    /// Names passed to `invoke_method`, in call order.
    pub fn invoked_methods(&self) -> Vec<String> {
        self.inner
            .borrow()
            .calls
            .iter()
            .filter(|(op, _, _)| *op == HostOp::InvokeMethod)
            .map(|(_, _, name)| name.clone())
            .collect()
    }

    fn mint(inner: &mut Inner, node: NodeId) -> HandleId {
        inner.next_handle += 1;
        let id = HandleId(inner.next_handle);
        inner.handles.insert(id, HandleRecord { node, releases: 0 });
        id
    }

    /// Records the call, applies scripted faults, and resolves the handle.
    fn enter(&self, op: HostOp, handle: HandleId, name: &str) -> HostResult<NodeId> {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        inner.calls.push((op, handle, name.to_string()));

        let node = match inner.handles.get(&handle) {
            None => {
                inner.misuse.push(Misuse::UnknownHandle(handle, op));
                return Err(HostFault::disconnected());
            }
            Some(record) if record.releases > 0 => {
                inner.misuse.push(Misuse::UseAfterRelease(handle, op));
                return Err(HostFault::disconnected());
            }
            Some(record) => record.node,
        };

        let scripted = inner.faults.iter().position(|scripted| {
            scripted.op == op && scripted.name.as_deref().is_none_or(|n| n == name)
        });
        if let Some(position) = scripted
            && let Some(scripted) = inner.faults.remove(position)
        {
            return Err(scripted.fault);
        }
        Ok(node)
    }
}

impl HostModel for FakeHost {
    fn create_child(
        &self,
        parent: HandleId,
        kind: &str,
        _args: &[HostValue],
    ) -> HostResult<HandleId> {
        let node = self.enter(HostOp::CreateChild, parent, kind)?;
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        if let Some(child) = inner.nodes[node.0].children.get(kind).copied() {
            return Ok(Self::mint(inner, child));
        }
        if let Some(child_kind) = inner.nodes[node.0].constructors.get(kind).cloned() {
            inner.nodes.push(Node {
                kind: child_kind,
                ..Node::default()
            });
            let child = NodeId(inner.nodes.len() - 1);
            inner.nodes[node.0].elements.push(child);
            return Ok(Self::mint(inner, child));
        }
        Err(member_not_found(kind))
    }

    fn release(&self, handle: HandleId) -> HostResult<()> {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        inner.calls.push((HostOp::Release, handle, String::new()));
        let Some(record) = inner.handles.get_mut(&handle) else {
            inner.misuse.push(Misuse::UnknownHandle(handle, HostOp::Release));
            return Ok(());
        };
        record.releases += 1;
        if record.releases > 1 {
            inner.misuse.push(Misuse::DoubleRelease(handle));
        }

        let scripted = inner
            .faults
            .iter()
            .position(|scripted| scripted.op == HostOp::Release);
        if let Some(position) = scripted
            && let Some(scripted) = inner.faults.remove(position)
        {
            return Err(scripted.fault);
        }
        Ok(())
    }

    fn get_property(&self, handle: HandleId, name: &str) -> HostResult<HostValue> {
        let node = self.enter(HostOp::GetProperty, handle, name)?;
        self.inner.borrow().nodes[node.0]
            .properties
            .get(name)
            .cloned()
            .ok_or_else(|| member_not_found(name))
    }

    fn set_property(&self, handle: HandleId, name: &str, value: HostValue) -> HostResult<()> {
        let node = self.enter(HostOp::SetProperty, handle, name)?;
        self.inner.borrow_mut().nodes[node.0]
            .properties
            .insert(name.to_string(), value);
        Ok(())
    }

    fn invoke_method(
        &self,
        handle: HandleId,
        name: &str,
        _args: &[HostValue],
    ) -> HostResult<HostValue> {
        self.enter(HostOp::InvokeMethod, handle, name)?;
        Ok(HostValue::Empty)
    }

    fn count(&self, handle: HandleId) -> HostResult<usize> {
        let node = self.enter(HostOp::Count, handle, "Count")?;
        Ok(self.inner.borrow().nodes[node.0].elements.len())
    }

    fn item(&self, handle: HandleId, index: usize) -> HostResult<HandleId> {
        let node = self.enter(HostOp::Item, handle, "Item")?;
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        let element = index
            .checked_sub(1)
            .and_then(|position| inner.nodes[node.0].elements.get(position).copied())
            .ok_or_else(|| bad_index(index))?;
        Ok(Self::mint(inner, element))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_handles_are_distinct_per_access() {
        let host = FakeHost::new();
        let root = host.add_node("Range");
        let font = host.add_node("Font");
        host.link(root, "Font", font);
        let root_handle = host.open(root);

        let first = host.create_child(root_handle, "Font", &[]).unwrap();
        let second = host.create_child(root_handle, "Font", &[]).unwrap();
        assert_ne!(first, second);
        assert_eq!(host.handles_for(font), vec![first, second]);
    }

    #[test]
    fn release_twice_is_recorded_as_misuse() {
        let host = FakeHost::new();
        let node = host.add_node("Font");
        let handle = host.open(node);
        host.release(handle).unwrap();
        host.release(handle).unwrap();
        assert_eq!(host.release_count(handle), 2);
        assert_eq!(host.misuse(), vec![Misuse::DoubleRelease(handle)]);
    }

    #[test]
    fn use_after_release_is_recorded() {
        let host = FakeHost::new();
        let node = host.add_node("Font");
        host.set(node, "Name", "Arial");
        let handle = host.open(node);
        host.release(handle).unwrap();
        assert!(host.get_property(handle, "Name").is_err());
        assert_eq!(
            host.misuse(),
            vec![Misuse::UseAfterRelease(handle, HostOp::GetProperty)]
        );
    }

    #[test]
    fn scripted_fault_fires_once_for_matching_name() {
        let host = FakeHost::new();
        let node = host.add_node("Font");
        host.set(node, "Name", "Arial");
        host.set(node, "Size", 11.0);
        let handle = host.open(node);
        host.fail_next(HostOp::GetProperty, Some("Name"), HostFault::new(-7, "busy"));

        assert_eq!(host.get_property(handle, "Size").unwrap(), HostValue::Float(11.0));
        assert_eq!(host.get_property(handle, "Name").unwrap_err().code, -7);
        assert_eq!(
            host.get_property(handle, "Name").unwrap(),
            HostValue::from("Arial")
        );
    }

    #[test]
    fn items_are_one_based() {
        let host = FakeHost::new();
        let list = host.add_node("Borders");
        let edges: Vec<_> = (0..2).map(|_| host.add_node("Border")).collect();
        for edge in &edges {
            host.push_element(list, *edge);
        }
        let handle = host.open(list);

        assert_eq!(host.count(handle).unwrap(), 2);
        assert!(host.item(handle, 0).is_err());
        let first = host.item(handle, 1).unwrap();
        assert_eq!(host.node_of(first), Some(edges[0]));
        assert!(host.item(handle, 3).is_err());
    }

    #[test]
    fn constructor_appends_new_element() {
        let host = FakeHost::new();
        let docs = host.add_node("Documents");
        host.constructor(docs, "Add", "Document");
        let handle = host.open(docs);

        let created = host.create_child(handle, "Add", &[]).unwrap();
        let node = host.node_of(created).unwrap();
        assert_eq!(host.kind_of(node), "Document");
        assert_eq!(host.count(handle).unwrap(), 1);
    }
}
