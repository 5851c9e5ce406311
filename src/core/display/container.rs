//=========================================================================
// Container
//=========================================================================
//
// Display node handle: owns child nodes, holds a position, supports
// reparenting and recursive destruction.
//
// Handles are cheap clones sharing one node; parent links are weak so
// the display tree never forms a strong reference cycle. A scene owns
// its root container exclusively and destroys it on teardown.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::cell::RefCell;
use std::rc::{Rc, Weak};

//=== Container ===========================================================

struct Node {
    children: Vec<Container>,
    parent: Weak<RefCell<Node>>,
    position: (f32, f32),
    destroyed: bool,
}

/// Handle to a display node. Clones share the node.
#[derive(Clone)]
pub struct Container {
    inner: Rc<RefCell<Node>>,
}

impl Container {
    /// Creates a detached node at the origin.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Node {
                children: Vec::new(),
                parent: Weak::new(),
                position: (0.0, 0.0),
                destroyed: false,
            })),
        }
    }

    /// True if both handles refer to the same node.
    pub fn same_node(&self, other: &Container) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    //--- Tree Operations --------------------------------------------------

    /// Appends `child`, detaching it from any previous parent first.
    pub fn add_child(&self, child: &Container) {
        child.detach();
        child.inner.borrow_mut().parent = Rc::downgrade(&self.inner);
        self.inner.borrow_mut().children.push(child.clone());
    }

    /// Removes `child` if present. Returns true if it was a child.
    pub fn remove_child(&self, child: &Container) -> bool {
        let mut node = self.inner.borrow_mut();
        let before = node.children.len();
        node.children.retain(|c| !c.same_node(child));
        let removed = node.children.len() != before;
        drop(node);
        if removed {
            child.inner.borrow_mut().parent = Weak::new();
        }
        removed
    }

    /// Reparents this node under `parent`.
    pub fn set_parent(&self, parent: &Container) {
        parent.add_child(self);
    }

    /// Detaches this node from its parent, if any.
    pub fn detach(&self) {
        let parent = self.inner.borrow().parent.upgrade();
        if let Some(parent) = parent {
            Container { inner: parent }.remove_child(self);
        }
    }

    /// Snapshot of the child handles.
    pub fn children(&self) -> Vec<Container> {
        self.inner.borrow().children.clone()
    }

    /// Number of direct children.
    pub fn child_count(&self) -> usize {
        self.inner.borrow().children.len()
    }

    /// Removes and returns all children, clearing their parent links.
    pub fn take_children(&self) -> Vec<Container> {
        let children = std::mem::take(&mut self.inner.borrow_mut().children);
        for child in &children {
            child.inner.borrow_mut().parent = Weak::new();
        }
        children
    }

    //--- Position ---------------------------------------------------------

    pub fn set_position(&self, x: f32, y: f32) {
        self.inner.borrow_mut().position = (x, y);
    }

    pub fn position(&self) -> (f32, f32) {
        self.inner.borrow().position
    }

    //--- Teardown ---------------------------------------------------------

    /// Destroys the node: detaches it, drops its children (recursively
    /// destroying them when `recursive`), and marks it dead.
    pub fn destroy(&self, recursive: bool) {
        self.detach();
        let children = std::mem::take(&mut self.inner.borrow_mut().children);
        for child in &children {
            child.inner.borrow_mut().parent = Weak::new();
            if recursive {
                child.destroy(true);
            }
        }
        self.inner.borrow_mut().destroyed = true;
    }

    /// True once the node has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.inner.borrow().destroyed
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let node = self.inner.borrow();
        f.debug_struct("Container")
            .field("children", &node.children.len())
            .field("position", &node.position)
            .field("destroyed", &node.destroyed)
            .finish()
    }
}

//=========================================================================
// Tests
//=========================================================================
