//! Input devices.
//!
//! The runtime polls; it never subscribes. At the start of every frame it
//! drains newly pressed keys and pointer clicks, and handler code may ask
//! whether a key is currently held.

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::rc::Rc;

/// A point in stage coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StagePoint {
    pub x: f64,
    pub y: f64,
}

/// Keyboard state.
pub trait Keyboard {
    /// Whether the key is held right now.
    fn key_is_pressed(&self, keyname: &str) -> bool;

    /// Keys that went down since the last call, oldest first.
    fn drain_new_keydowns(&mut self) -> Vec<String>;
}

/// Pointer (mouse or touch) state.
pub trait Pointer {
    /// Clicks since the last call, oldest first.
    fn drain_clicks(&mut self) -> Vec<StagePoint>;
}

#[derive(Debug, Default)]
struct KeyboardState {
    held: BTreeSet<String>,
    new_downs: VecDeque<String>,
}

/// Keyboard driven by the host calling [`VirtualKeyboard::press`] and
/// [`VirtualKeyboard::release`]. Clones share state, so the host can keep
/// one while the project owns another.
#[derive(Clone, Debug, Default)]
pub struct VirtualKeyboard {
    state: Rc<RefCell<KeyboardState>>,
}

impl VirtualKeyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&self, keyname: &str) {
        let mut state = self.state.borrow_mut();
        if state.held.insert(keyname.to_string()) {
            state.new_downs.push_back(keyname.to_string());
        }
    }

    pub fn release(&self, keyname: &str) {
        self.state.borrow_mut().held.remove(keyname);
    }
}

impl Keyboard for VirtualKeyboard {
    fn key_is_pressed(&self, keyname: &str) -> bool {
        self.state.borrow().held.contains(keyname)
    }

    fn drain_new_keydowns(&mut self) -> Vec<String> {
        self.state.borrow_mut().new_downs.drain(..).collect()
    }
}

/// Pointer driven by the host calling [`VirtualPointer::click`].
#[derive(Clone, Debug, Default)]
pub struct VirtualPointer {
    clicks: Rc<RefCell<VecDeque<StagePoint>>>,
}

impl VirtualPointer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn click(&self, x: f64, y: f64) {
        self.clicks.borrow_mut().push_back(StagePoint { x, y });
    }
}

impl Pointer for VirtualPointer {
    fn drain_clicks(&mut self) -> Vec<StagePoint> {
        self.clicks.borrow_mut().drain(..).collect()
    }
}
