//! Rendering instructions and watcher snapshots.
//!
//! Both are recomputed from the live state every time they are asked for;
//! nothing here is cached between frames.

use crate::instance::InstanceId;

/// One thing for the renderer to draw, in back-to-front order.
#[derive(Clone, Debug, PartialEq)]
pub enum RenderInstruction {
    /// Draw an image with its top-left corner at (`x`, `y`).
    Image {
        x: f64,
        y: f64,
        scale: f64,
        /// Clockwise degrees from upright.
        rotation: f64,
        locator: String,
        instance: InstanceId,
    },
    /// Draw a speech bubble whose tip is at (`tip_x`, `tip_y`).
    SpeechBubble {
        tip_x: f64,
        tip_y: f64,
        content: String,
        instance: InstanceId,
    },
}

impl RenderInstruction {
    /// Instance the instruction draws.
    pub fn instance(&self) -> InstanceId {
        match self {
            RenderInstruction::Image { instance, .. }
            | RenderInstruction::SpeechBubble { instance, .. } => *instance,
        }
    }
}

/// Where on the stage a watcher sits. Each edge is optional, but a
/// watcher cannot be pinned to both top and bottom, or to both left and
/// right.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct WatcherPosition {
    pub top: Option<f64>,
    pub left: Option<f64>,
    pub bottom: Option<f64>,
    pub right: Option<f64>,
}

impl WatcherPosition {
    /// Check the edges are consistent.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.top.is_some() && self.bottom.is_some() {
            return Err("cannot give both \"top\" and \"bottom\" args");
        }
        if self.left.is_some() && self.right.is_some() {
            return Err("cannot give both \"left\" and \"right\" args");
        }
        Ok(())
    }
}

/// Current display of one attribute watcher.
#[derive(Clone, Debug, PartialEq)]
pub struct WatcherSnapshot {
    pub instance: InstanceId,
    pub attribute: String,
    pub label: String,
    /// Rendered value, or `None` if the attribute is not set.
    pub value: Option<String>,
    pub position: WatcherPosition,
}
