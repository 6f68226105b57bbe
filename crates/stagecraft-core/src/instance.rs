//! Live actor instances.
//!
//! Coordinates are stage coordinates: the origin is the centre of the stage,
//! x grows to the right and y grows upwards.

use rhai::{Dynamic, Map, Variant};
use std::fmt;

use crate::actor::{ActorId, Costume};
use crate::assets::AssetHandle;

/// Identity of one live instance, unique within a project.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub(crate) u64);

impl InstanceId {
    /// Raw numeric value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Visual state of an instance.
#[derive(Clone, Debug, PartialEq)]
pub struct Appearance {
    /// Stage x of the costume centre.
    pub x: f64,
    /// Stage y of the costume centre.
    pub y: f64,
    /// Scale factor (1.0 = natural size).
    pub size: f64,
    /// Heading in degrees; 90 points right.
    pub direction: f64,
    /// Whether the instance is drawn.
    pub shown: bool,
    /// Index into the actor's costumes (or backdrops).
    pub costume: usize,
}

impl Default for Appearance {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            size: 1.0,
            direction: 90.0,
            shown: true,
            costume: 0,
        }
    }
}

/// Axis-aligned box in stage coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl BoundingBox {
    /// Whether the two boxes share any area.
    pub fn overlaps(&self, other: &BoundingBox) -> bool {
        self.x_min < other.x_max
            && other.x_min < self.x_max
            && self.y_min < other.y_max
            && other.y_min < self.y_max
    }

    /// Whether the point lies inside or on the edge.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        (self.x_min..=self.x_max).contains(&x) && (self.y_min..=self.y_max).contains(&y)
    }
}

/// One live object of an actor.
#[derive(Clone, Debug)]
pub struct ActorInstance {
    id: InstanceId,
    actor: ActorId,
    parent: Option<InstanceId>,
    /// User attribute state.
    pub attributes: Map,
    /// Visual state.
    pub appearance: Appearance,
    /// Text of the current speech bubble.
    pub speech: Option<String>,
}

impl ActorInstance {
    pub(crate) fn new(id: InstanceId, actor: ActorId) -> Self {
        Self {
            id,
            actor,
            parent: None,
            attributes: Map::new(),
            appearance: Appearance::default(),
            speech: None,
        }
    }

    /// Deep copy of `self` under a new identity, remembering `self` as parent.
    pub(crate) fn clone_as(&self, id: InstanceId) -> Self {
        Self {
            id,
            actor: self.actor,
            parent: Some(self.id),
            attributes: self.attributes.clone(),
            appearance: self.appearance.clone(),
            speech: self.speech.clone(),
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn actor(&self) -> ActorId {
        self.actor
    }

    /// The instance this one was cloned from, if it is a clone.
    pub fn parent(&self) -> Option<InstanceId> {
        self.parent
    }

    pub fn is_clone(&self) -> bool {
        self.parent.is_some()
    }

    // === Attributes ===

    /// Raw attribute value.
    pub fn get(&self, name: &str) -> Option<&Dynamic> {
        self.attributes.get(name)
    }

    /// Attribute value cast to `T`, if present and of that type.
    pub fn get_as<T: Variant + Clone>(&self, name: &str) -> Option<T> {
        self.attributes.get(name)?.clone().try_cast::<T>()
    }

    /// Set an attribute. Integers should be `i64` and reals `f64` so that
    /// scripts see them as numbers.
    pub fn set<T: Variant + Clone>(&mut self, name: &str, value: T) {
        self.attributes.insert(name.into(), Dynamic::from(value));
    }

    /// Set an attribute from an already-dynamic value.
    pub fn set_dynamic(&mut self, name: &str, value: Dynamic) {
        self.attributes.insert(name.into(), value);
    }

    // === Position ===

    pub fn go_to_xy(&mut self, x: f64, y: f64) {
        self.appearance.x = x;
        self.appearance.y = y;
    }

    pub fn set_x(&mut self, x: f64) {
        self.appearance.x = x;
    }

    pub fn set_y(&mut self, y: f64) {
        self.appearance.y = y;
    }

    pub fn change_x(&mut self, dx: f64) {
        self.appearance.x += dx;
    }

    pub fn change_y(&mut self, dy: f64) {
        self.appearance.y += dy;
    }

    pub fn x(&self) -> f64 {
        self.appearance.x
    }

    pub fn y(&self) -> f64 {
        self.appearance.y
    }

    // === Looks ===

    pub fn set_size(&mut self, size: f64) {
        self.appearance.size = size;
    }

    pub fn show(&mut self) {
        self.appearance.shown = true;
    }

    pub fn hide(&mut self) {
        self.appearance.shown = false;
    }

    /// Turn clockwise.
    pub fn turn_degrees(&mut self, degrees: f64) {
        self.point_in_direction(self.appearance.direction + degrees);
    }

    /// Point in a direction, normalised into (-180, 180].
    pub fn point_in_direction(&mut self, degrees: f64) {
        let mut d = degrees % 360.0;
        if d > 180.0 {
            d -= 360.0;
        } else if d <= -180.0 {
            d += 360.0;
        }
        self.appearance.direction = d;
    }

    /// Stage box of the current costume, if its image size is known.
    pub fn bounding_box(&self, costume: &Costume, image: &AssetHandle) -> BoundingBox {
        let size = self.appearance.size;
        let x_min = self.appearance.x - costume.centre_x * size;
        let y_max = self.appearance.y + costume.centre_y * size;
        BoundingBox {
            x_min,
            x_max: x_min + image.width * size,
            y_min: y_max - image.height * size,
            y_max,
        }
    }
}
