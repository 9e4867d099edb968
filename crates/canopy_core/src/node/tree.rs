use super::data::{Capabilities, Node, Primitive};
use super::id::NodeId;
use crate::error::{CoreError, CoreResult};
use crate::invalidation::{Invalidation, InvalidationSource};
use crate::telemetry::Telemetry;
use crate::thread::{MisusePolicy, ThreadGuard, ThreadRole};

/// One arena slot. The generation outlives the node so stale ids fail.
#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// The scene graph.
///
/// An arena of [`Node`]s addressed by generational [`NodeId`]s. Parents own
/// their children; the parent link is a plain id cleared synchronously on
/// detach. A container root always exists.
///
/// # Thread Safety
///
/// Owned by the update thread. Every `&mut self` entry point checks the
/// [`ThreadGuard`]; see [`Self::bind_to_current_thread`].
#[derive(Debug)]
pub struct SceneTree {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    live: usize,
    root: NodeId,
    pub(crate) guard: ThreadGuard,
    pub(crate) policy: MisusePolicy,
    pub(crate) telemetry: Telemetry,
}

impl SceneTree {
    /// A tree holding only the root container, owned by the calling thread.
    #[must_use]
    pub fn new() -> Self {
        let mut tree = Self {
            slots: Vec::with_capacity(256),
            free_list: Vec::new(),
            live: 0,
            root: NodeId::NULL,
            guard: ThreadGuard::current(ThreadRole::Update),
            policy: MisusePolicy::default(),
            telemetry: Telemetry::disabled(),
        };
        tree.root = tree.allocate(Node::new(Capabilities::HAS_CHILDREN));
        tree
    }

    /// Sets the misuse policy.
    #[must_use]
    pub fn with_policy(mut self, policy: MisusePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Attaches a telemetry handle.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Makes the calling thread the owner. Call once after moving the tree
    /// onto the update thread.
    pub fn bind_to_current_thread(&mut self) {
        self.guard.rebind();
        let current = std::thread::current();
        tracing::debug!(thread = ?current.name(), "scene tree bound");
    }

    /// The thread guard, for registering the draw thread.
    pub fn guard_mut(&mut self) -> &mut ThreadGuard {
        &mut self.guard
    }

    /// Current misuse policy.
    #[must_use]
    pub fn policy(&self) -> MisusePolicy {
        self.policy
    }

    /// The root container.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of live nodes, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Always false; the root exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// True when `id` refers to a live node.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_ok()
    }

    /// Read access to a node.
    ///
    /// # Errors
    ///
    /// [`CoreError::StaleNode`] for removed or unknown ids.
    pub fn node(&self, id: NodeId) -> CoreResult<&Node> {
        self.slots
            .get(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.node.as_ref())
            .ok_or(CoreError::StaleNode(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> CoreResult<&mut Node> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.node.as_mut())
            .ok_or(CoreError::StaleNode(id))
    }

    /// Parent of `id`.
    ///
    /// # Errors
    ///
    /// [`CoreError::StaleNode`].
    pub fn parent(&self, id: NodeId) -> CoreResult<Option<NodeId>> {
        self.node(id).map(Node::parent)
    }

    /// Children of `id` in draw order.
    ///
    /// # Errors
    ///
    /// [`CoreError::StaleNode`].
    pub fn children(&self, id: NodeId) -> CoreResult<&[NodeId]> {
        self.node(id).map(Node::children)
    }

    /// Pre-order walk starting at `start`.
    #[must_use]
    pub fn depth_first(&self, start: NodeId) -> DepthFirst<'_> {
        let stack = if self.contains(start) { vec![start] } else { Vec::new() };
        DepthFirst { tree: self, stack }
    }

    /// Reports misuse under the current policy, after a thread check.
    pub(crate) fn entry(&self) -> CoreResult<()> {
        self.guard.check().map_err(|e| self.policy.report(e))
    }

    /// Like [`Self::node`] but routes staleness through the misuse policy.
    pub(crate) fn checked(&self, id: NodeId) -> CoreResult<&Node> {
        self.node(id).map_err(|e| self.policy.report(e))
    }

    fn allocate(&mut self, node: Node) -> NodeId {
        self.live += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            NodeId::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeId::new(index, 0)
        }
    }

    fn free(&mut self, id: NodeId) {
        if let Some(slot) = self.slots.get_mut(id.index() as usize) {
            if slot.generation == id.generation() && slot.node.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free_list.push(id.index());
                self.live -= 1;
            }
        }
    }

    /// Creates a detached node.
    ///
    /// # Errors
    ///
    /// [`CoreError::WrongThread`].
    pub fn create_node(&mut self, capabilities: Capabilities) -> CoreResult<NodeId> {
        self.entry()?;
        Ok(self.allocate(Node::new(capabilities)))
    }

    /// Creates a detached container.
    ///
    /// # Errors
    ///
    /// [`CoreError::WrongThread`].
    pub fn create_container(&mut self) -> CoreResult<NodeId> {
        self.create_node(Capabilities::HAS_CHILDREN)
    }

    /// Creates a detached leaf drawing `primitive`.
    ///
    /// # Errors
    ///
    /// [`CoreError::WrongThread`].
    pub fn create_leaf(&mut self, primitive: Primitive) -> CoreResult<NodeId> {
        self.entry()?;
        let mut node = Node::new(Capabilities::EMITS_PRIMITIVE);
        node.primitive = primitive;
        Ok(self.allocate(node))
    }

    /// Appends `child` to `parent`.
    ///
    /// # Errors
    ///
    /// [`CoreError::AlreadyAttached`], [`CoreError::WouldCreateCycle`],
    /// [`CoreError::NotAContainer`], [`CoreError::StaleNode`],
    /// [`CoreError::RootImmutable`]. The tree is untouched on error.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) -> CoreResult<()> {
        self.link(parent, child, None)
    }

    /// Inserts `child` at `index` among `parent`'s children.
    ///
    /// # Errors
    ///
    /// As [`Self::attach`], plus [`CoreError::ChildIndexOutOfRange`].
    pub fn insert_child_at(&mut self, parent: NodeId, index: usize, child: NodeId) -> CoreResult<()> {
        self.link(parent, child, Some(index))
    }

    fn link(&mut self, parent: NodeId, child: NodeId, index: Option<usize>) -> CoreResult<()> {
        self.entry()?;
        if let Err(error) = self.check_link(parent, child, index) {
            return Err(self.policy.report(error));
        }

        let container = self.node_mut(parent)?;
        match index {
            Some(index) => container.children.insert(index, child),
            None => container.children.push(child),
        }
        self.node_mut(child)?.parent = Some(parent);
        tracing::trace!(%parent, %child, "attached");

        self.invalidate_inner(
            child,
            Invalidation::INHERITED | Invalidation::DRAW_SIZE,
            InvalidationSource::PARENT,
        );
        self.invalidate_from_child(parent, Invalidation::REQUIRED_PARENT_SIZE_TO_FIT, child);
        self.invalidate_child_cells(parent, Invalidation::ALL, child);
        Ok(())
    }

    fn check_link(&self, parent: NodeId, child: NodeId, index: Option<usize>) -> CoreResult<()> {
        let container = self.node(parent)?;
        let node = self.node(child)?;
        if child == self.root {
            return Err(CoreError::RootImmutable);
        }
        if let Some(existing) = node.parent {
            return Err(CoreError::AlreadyAttached {
                child,
                parent: existing,
            });
        }
        if !container.capabilities.contains(Capabilities::HAS_CHILDREN) {
            return Err(CoreError::NotAContainer(parent));
        }
        if let Some(index) = index {
            let len = container.children.len();
            if index > len {
                return Err(CoreError::ChildIndexOutOfRange { index, len });
            }
        }
        let mut ancestor = Some(parent);
        while let Some(current) = ancestor {
            if current == child {
                return Err(CoreError::WouldCreateCycle { parent, child });
            }
            ancestor = self.node(current)?.parent;
        }
        Ok(())
    }

    /// Detaches `child` from its parent. A detached node is left alone.
    ///
    /// The parent link is cleared before any invalidation runs, so nothing
    /// propagates to the old parent through the child.
    ///
    /// # Errors
    ///
    /// [`CoreError::StaleNode`], [`CoreError::RootImmutable`].
    pub fn detach(&mut self, child: NodeId) -> CoreResult<()> {
        self.entry()?;
        if child == self.root {
            return Err(self.policy.report(CoreError::RootImmutable));
        }
        let Some(parent) = self.checked(child)?.parent else {
            return Ok(());
        };

        self.node_mut(child)?.parent = None;
        self.node_mut(parent)?.children.retain(|&c| c != child);
        tracing::trace!(%parent, %child, "detached");

        self.invalidate_from_child(parent, Invalidation::REQUIRED_PARENT_SIZE_TO_FIT, child);
        self.invalidate_child_cells(parent, Invalidation::ALL, child);
        self.invalidate_inner(
            child,
            Invalidation::INHERITED | Invalidation::DRAW_SIZE,
            InvalidationSource::PARENT,
        );
        Ok(())
    }

    /// Detaches and destroys `id` with its whole subtree. Returns the number
    /// of nodes freed. Handles into the subtree become stale.
    ///
    /// # Errors
    ///
    /// [`CoreError::StaleNode`], [`CoreError::RootImmutable`].
    pub fn remove(&mut self, id: NodeId) -> CoreResult<usize> {
        self.detach(id)?;
        let doomed: Vec<NodeId> = self.depth_first(id).collect();
        for node in &doomed {
            self.free(*node);
        }
        tracing::debug!(node = %id, freed = doomed.len(), "removed subtree");
        Ok(doomed.len())
    }
}

impl Default for SceneTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Pre-order iterator over a subtree.
pub struct DepthFirst<'a> {
    tree: &'a SceneTree,
    stack: Vec<NodeId>,
}

impl Iterator for DepthFirst<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        if let Ok(node) = self.tree.node(id) {
            // Reverse so the first child pops first.
            self.stack.extend(node.children.iter().rev().copied());
        }
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> SceneTree {
        SceneTree::new().with_policy(MisusePolicy::Reject)
    }

    #[test]
    fn test_root_exists() {
        let tree = tree();
        assert_eq!(tree.len(), 1);
        assert!(tree.contains(tree.root()));
        assert_eq!(tree.parent(tree.root()), Ok(None));
    }

    #[test]
    fn test_attach_and_order() {
        let mut tree = tree();
        let root = tree.root();
        let a = tree.create_container().unwrap();
        let b = tree.create_container().unwrap();
        let c = tree.create_container().unwrap();

        tree.attach(root, a).unwrap();
        tree.attach(root, c).unwrap();
        tree.insert_child_at(root, 1, b).unwrap();

        assert_eq!(tree.children(root).unwrap(), &[a, b, c]);
        assert_eq!(tree.parent(b), Ok(Some(root)));
    }

    #[test]
    fn test_attach_rejects_second_parent() {
        let mut tree = tree();
        let root = tree.root();
        let a = tree.create_container().unwrap();
        let b = tree.create_container().unwrap();
        tree.attach(root, a).unwrap();
        tree.attach(root, b).unwrap();

        assert_eq!(
            tree.attach(b, a),
            Err(CoreError::AlreadyAttached {
                child: a,
                parent: root
            })
        );
        assert_eq!(tree.children(b).unwrap(), &[] as &[NodeId]);
    }

    #[test]
    fn test_attach_rejects_cycle() {
        let mut tree = tree();
        let a = tree.create_container().unwrap();
        let b = tree.create_container().unwrap();
        tree.attach(a, b).unwrap();

        assert_eq!(
            tree.attach(b, a),
            Err(CoreError::WouldCreateCycle { parent: b, child: a })
        );
        assert_eq!(
            tree.attach(a, a),
            Err(CoreError::WouldCreateCycle { parent: a, child: a })
        );
    }

    #[test]
    fn test_attach_rejects_leaf_parent() {
        let mut tree = tree();
        let leaf = tree.create_leaf(Primitive::solid_quad()).unwrap();
        let other = tree.create_container().unwrap();
        assert_eq!(tree.attach(leaf, other), Err(CoreError::NotAContainer(leaf)));
    }

    #[test]
    fn test_insert_out_of_range() {
        let mut tree = tree();
        let root = tree.root();
        let a = tree.create_container().unwrap();
        assert_eq!(
            tree.insert_child_at(root, 3, a),
            Err(CoreError::ChildIndexOutOfRange { index: 3, len: 0 })
        );
    }

    #[test]
    fn test_detach_clears_parent() {
        let mut tree = tree();
        let root = tree.root();
        let a = tree.create_container().unwrap();
        tree.attach(root, a).unwrap();
        tree.detach(a).unwrap();

        assert_eq!(tree.parent(a), Ok(None));
        assert!(tree.children(root).unwrap().is_empty());
        // Detaching again is a no-op.
        assert!(tree.detach(a).is_ok());
        // And it can be re-attached.
        assert!(tree.attach(root, a).is_ok());
    }

    #[test]
    fn test_remove_frees_subtree_and_stales_ids() {
        let mut tree = tree();
        let root = tree.root();
        let a = tree.create_container().unwrap();
        let b = tree.create_container().unwrap();
        tree.attach(root, a).unwrap();
        tree.attach(a, b).unwrap();

        assert_eq!(tree.remove(a), Ok(2));
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.node(b).err(), Some(CoreError::StaleNode(b)));

        // The most recently freed slot is reused with a bumped generation.
        let reused = tree.create_container().unwrap();
        assert_eq!(reused.index(), b.index());
        assert_eq!(reused.generation(), b.generation() + 1);
        assert!(tree.node(b).is_err());
    }

    #[test]
    fn test_root_is_immutable() {
        let mut tree = tree();
        let root = tree.root();
        assert_eq!(tree.remove(root), Err(CoreError::RootImmutable));
        let a = tree.create_container().unwrap();
        assert_eq!(tree.attach(a, root), Err(CoreError::RootImmutable));
    }

    #[test]
    fn test_depth_first_order() {
        let mut tree = tree();
        let root = tree.root();
        let a = tree.create_container().unwrap();
        let a1 = tree.create_container().unwrap();
        let b = tree.create_container().unwrap();
        tree.attach(root, a).unwrap();
        tree.attach(a, a1).unwrap();
        tree.attach(root, b).unwrap();

        let order: Vec<_> = tree.depth_first(root).collect();
        assert_eq!(order, vec![root, a, a1, b]);
    }

    #[test]
    fn test_wrong_thread_is_rejected() {
        let tree = tree();
        let mut tree = std::thread::spawn(move || tree).join().unwrap();
        // Still owned by this thread.
        assert!(tree.create_container().is_ok());

        let handle = std::thread::spawn(move || {
            let result = tree.create_container();
            (tree, result)
        });
        let (mut tree, result) = handle.join().unwrap();
        assert!(matches!(result, Err(CoreError::WrongThread { .. })));

        let handle = std::thread::spawn(move || {
            tree.bind_to_current_thread();
            tree.create_container().map(|_| ())
        });
        assert!(handle.join().unwrap().is_ok());
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "scene graph misuse")]
    fn test_default_policy_panics_in_debug() {
        let mut tree = SceneTree::new();
        let root = tree.root();
        let a = tree.create_container().unwrap();
        tree.attach(root, a).unwrap();
        let _ = tree.attach(root, a);
    }
}
