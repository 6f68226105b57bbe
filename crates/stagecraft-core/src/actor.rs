//! Actor classes and actor kinds.
//!
//! An [`ActorClass`] is the registration table for one user-defined sprite
//! or stage: its costumes, sounds, constructor and handlers. Registering it
//! with a [`Project`](crate::Project) turns it into an [`ActorKind`], which
//! additionally tracks the live instances.

use std::fmt;
use std::future::Future;
use std::rc::Rc;

use crate::context::ThreadContext;
use crate::error::RegistrationError;
use crate::handler::{handler, EventHandler, EventHandlerGroup, HandlerFn};
use crate::instance::{ActorInstance, InstanceId};
use crate::trigger::Trigger;

/// Index of an actor within its project.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub(crate) usize);

/// Sprite or stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActorKindTag {
    Sprite,
    Stage,
}

impl fmt::Display for ActorKindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActorKindTag::Sprite => f.write_str("Sprite"),
            ActorKindTag::Stage => f.write_str("Stage"),
        }
    }
}

/// A costume (or, on the stage, a backdrop).
#[derive(Clone, Debug, PartialEq)]
pub struct Costume {
    /// Name used by `switch_costume`.
    pub name: String,
    /// Where the image lives.
    pub locator: String,
    /// Offset of the rotation centre from the image's left edge.
    pub centre_x: f64,
    /// Offset of the rotation centre from the image's top edge.
    pub centre_y: f64,
}

impl Costume {
    pub fn new(
        name: impl Into<String>,
        locator: impl Into<String>,
        centre_x: f64,
        centre_y: f64,
    ) -> Self {
        Self {
            name: name.into(),
            locator: locator.into(),
            centre_x,
            centre_y,
        }
    }
}

/// A sound an actor can play.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sound {
    pub name: String,
    pub locator: String,
}

/// Constructor run on instance 0 at registration.
pub type InitFn = Rc<dyn Fn(&mut ActorInstance) -> anyhow::Result<()>>;

struct HandlerDecl {
    trigger: Result<Trigger, RegistrationError>,
    handler: EventHandler,
}

/// Builder for a user-defined actor class.
pub struct ActorClass {
    name: String,
    kind: ActorKindTag,
    costumes: Vec<Costume>,
    sounds: Vec<Sound>,
    init: Option<InitFn>,
    handlers: Vec<HandlerDecl>,
}

impl ActorClass {
    /// Start describing a sprite class.
    pub fn sprite(name: impl Into<String>) -> Self {
        Self::new(name.into(), ActorKindTag::Sprite)
    }

    /// Start describing a stage class.
    pub fn stage(name: impl Into<String>) -> Self {
        Self::new(name.into(), ActorKindTag::Stage)
    }

    fn new(name: String, kind: ActorKindTag) -> Self {
        Self {
            name,
            kind,
            costumes: Vec::new(),
            sounds: Vec::new(),
            init: None,
            handlers: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ActorKindTag {
        self.kind
    }

    /// Add a costume.
    pub fn costume(
        mut self,
        name: impl Into<String>,
        locator: impl Into<String>,
        centre_x: f64,
        centre_y: f64,
    ) -> Self {
        self.costumes
            .push(Costume::new(name, locator, centre_x, centre_y));
        self
    }

    /// Add a backdrop (stage spelling of [`ActorClass::costume`]).
    pub fn backdrop(self, name: impl Into<String>, locator: impl Into<String>) -> Self {
        self.costume(name, locator, 0.0, 0.0)
    }

    /// Add a sound.
    pub fn sound(mut self, name: impl Into<String>, locator: impl Into<String>) -> Self {
        self.sounds.push(Sound {
            name: name.into(),
            locator: locator.into(),
        });
        self
    }

    /// Set the zero-argument constructor run on instance 0.
    pub fn init<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ActorInstance) -> anyhow::Result<()> + 'static,
    {
        self.init = Some(Rc::new(f));
        self
    }

    /// Bind an already-built handler to a trigger.
    pub fn on(mut self, trigger: Trigger, label: impl Into<String>, body: HandlerFn) -> Self {
        self.handlers.push(HandlerDecl {
            trigger: Ok(trigger),
            handler: EventHandler::new(label, body),
        });
        self
    }

    /// Bind a handler through an `(event_type, argument)` descriptor.
    ///
    /// A bad descriptor is reported when the class is registered.
    pub fn when(
        mut self,
        event_type: &str,
        arg: &str,
        label: impl Into<String>,
        body: HandlerFn,
    ) -> Self {
        self.handlers.push(HandlerDecl {
            trigger: Trigger::from_descriptor(event_type, arg),
            handler: EventHandler::new(label, body),
        });
        self
    }

    pub fn when_green_flag_clicked<F, Fut>(self, label: &str, f: F) -> Self
    where
        F: Fn(ThreadContext) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        self.on(Trigger::GreenFlag, label, handler(f))
    }

    pub fn when_i_receive<F, Fut>(self, message: &str, label: &str, f: F) -> Self
    where
        F: Fn(ThreadContext) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        self.on(Trigger::Message(message.to_string()), label, handler(f))
    }

    pub fn when_i_start_as_a_clone<F, Fut>(self, label: &str, f: F) -> Self
    where
        F: Fn(ThreadContext) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        self.on(Trigger::StartAsClone, label, handler(f))
    }

    pub fn when_key_pressed<F, Fut>(self, key: &str, label: &str, f: F) -> Self
    where
        F: Fn(ThreadContext) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        self.when("key", key, label, handler(f))
    }

    pub fn when_this_sprite_clicked<F, Fut>(self, label: &str, f: F) -> Self
    where
        F: Fn(ThreadContext) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        self.on(Trigger::ThisSpriteClicked, label, handler(f))
    }

    pub fn when_stage_clicked<F, Fut>(self, label: &str, f: F) -> Self
    where
        F: Fn(ThreadContext) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        self.on(Trigger::StageClicked, label, handler(f))
    }

    /// Validate the handler table and build the kind plus its instance 0.
    pub(crate) fn build(
        self,
        id: ActorId,
        instance_0: InstanceId,
    ) -> Result<(ActorKind, ActorInstance), RegistrationError> {
        let mut groups: Vec<EventHandlerGroup> = Vec::new();
        for decl in self.handlers {
            let trigger = decl.trigger?;
            if !trigger.allowed_on(self.kind) {
                return Err(RegistrationError::TriggerNotAllowed {
                    event_type: trigger.event_type().to_string(),
                    kind: self.kind.to_string(),
                });
            }
            match groups.iter_mut().find(|g| *g.trigger() == trigger) {
                Some(group) => group.push(decl.handler),
                None => {
                    let mut group = EventHandlerGroup::new(trigger);
                    group.push(decl.handler);
                    groups.push(group);
                }
            }
        }

        let mut instance = ActorInstance::new(instance_0, id);
        if let Some(init) = &self.init {
            init(&mut instance).map_err(|e| RegistrationError::Constructor {
                class_name: self.name.clone(),
                reason: e.to_string(),
            })?;
        }

        let kind = ActorKind {
            id,
            class_name: self.name,
            kind: self.kind,
            groups,
            costumes: self.costumes,
            sounds: self.sounds,
            instance_0,
            instances: vec![instance_0],
        };
        Ok((kind, instance))
    }
}

/// A registered actor and its live instances.
#[derive(Clone, Debug)]
pub struct ActorKind {
    id: ActorId,
    class_name: String,
    kind: ActorKindTag,
    groups: Vec<EventHandlerGroup>,
    costumes: Vec<Costume>,
    sounds: Vec<Sound>,
    instance_0: InstanceId,
    /// Live instances in drawing order. Clones go behind their parent, so
    /// the original is not necessarily first.
    pub(crate) instances: Vec<InstanceId>,
}

impl ActorKind {
    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn kind(&self) -> ActorKindTag {
        self.kind
    }

    pub fn is_sprite(&self) -> bool {
        self.kind == ActorKindTag::Sprite
    }

    /// Live instances in drawing order (back to front).
    pub fn instances(&self) -> &[InstanceId] {
        &self.instances
    }

    /// The original instance.
    pub fn instance_0(&self) -> InstanceId {
        self.instance_0
    }

    /// Handler groups in first-use order.
    pub fn handler_groups(&self) -> &[EventHandlerGroup] {
        &self.groups
    }

    /// The group responding to `trigger`, if any.
    pub fn handlers_for(&self, trigger: &Trigger) -> Option<&EventHandlerGroup> {
        self.groups.iter().find(|g| g.trigger() == trigger)
    }

    pub fn costumes(&self) -> &[Costume] {
        &self.costumes
    }

    pub fn costume_index(&self, name: &str) -> Option<usize> {
        self.costumes.iter().position(|c| c.name == name)
    }

    pub fn sounds(&self) -> &[Sound] {
        &self.sounds
    }

    pub fn sound(&self, name: &str) -> Option<&Sound> {
        self.sounds.iter().find(|s| s.name == name)
    }
}
