//! Shared mutable project state.
//!
//! The [`World`] is everything a syscall can touch: actors and their
//! instances, live thread groups, queued spawns and the side tables for
//! watchers, questions, sound gains and loaded assets. Threads are not in
//! here; the [`Project`](crate::Project) owns those, so a thread body can
//! borrow the world while the scheduler holds the thread.

use rhai::Dynamic;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;

use crate::actor::{ActorId, ActorKind, ActorKindTag};
use crate::assets::{AssetHandle, AssetKind};
use crate::config::RuntimeConfig;
use crate::error::{Error, ErrorContext, ErrorReport, InstanceLabel, SyscallError};
use crate::handler::EventHandler;
use crate::input::{Keyboard, Pointer, StagePoint, VirtualKeyboard, VirtualPointer};
use crate::instance::{ActorInstance, BoundingBox, InstanceId};
use crate::render::{RenderInstruction, WatcherPosition, WatcherSnapshot};
use crate::sound::{GainTable, MixBus, SilentMixBus};
use crate::thread::{GroupId, QuestionId, ThreadId};
use crate::trigger::Trigger;

/// Cheap handle to the shared world.
#[derive(Clone)]
pub(crate) struct SharedWorld {
    world: Rc<RefCell<World>>,
}

impl SharedWorld {
    pub fn new(world: World) -> Self {
        Self {
            world: Rc::new(RefCell::new(world)),
        }
    }

    /// Read the world with a closure.
    ///
    /// The closure must not resume a thread or call back into a syscall.
    pub fn with_world<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&World) -> R,
    {
        f(&self.world.borrow())
    }

    /// Modify the world with a closure.
    pub fn with_world_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut World) -> R,
    {
        f(&mut self.world.borrow_mut())
    }
}

/// Threads spawned together by one trigger.
#[derive(Debug)]
pub(crate) struct ThreadGroup {
    pub label: String,
    /// Members not yet finished.
    pub live: usize,
}

/// A thread to create once the current resumption returns.
pub(crate) struct SpawnRequest {
    pub group: GroupId,
    pub actor: ActorId,
    pub instance: InstanceId,
    pub handler: EventHandler,
}

/// A question waiting for its answer.
#[derive(Debug, Clone)]
pub(crate) struct Question {
    pub id: QuestionId,
    pub thread: ThreadId,
    pub instance: InstanceId,
    pub prompt: Option<String>,
}

/// An attribute shown on the stage.
#[derive(Debug, Clone)]
pub(crate) struct Watcher {
    pub instance: InstanceId,
    pub attribute: String,
    pub label: String,
    pub position: WatcherPosition,
}

/// What to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloneSource {
    /// The original instance of the named class.
    Class(String),
    /// A particular instance.
    Instance(InstanceId),
}

/// Result of asking for an instance to be deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Deletion {
    Deleted,
    /// Instance 0 (or the stage) is never deleted.
    Original,
    /// Already gone; repeated requests are harmless.
    AlreadyGone,
}

/// Everything syscalls share.
pub(crate) struct World {
    pub config: RuntimeConfig,
    pub actors: Vec<ActorKind>,
    pub instances: HashMap<InstanceId, ActorInstance>,
    pub groups: BTreeMap<GroupId, ThreadGroup>,
    pub spawns: Vec<SpawnRequest>,
    /// Instances deleted since the scheduler last purged their threads.
    pub deleted: Vec<InstanceId>,
    pub stop_requested: bool,
    pub watchers: Vec<Watcher>,
    pub questions: VecDeque<Question>,
    pub assets: HashMap<(AssetKind, String), AssetHandle>,
    pub gains: GainTable,
    pub mix_bus: Box<dyn MixBus>,
    pub keyboard: Box<dyn Keyboard>,
    pub pointer: Box<dyn Pointer>,
    pub errors: Vec<ErrorReport>,
    pub import_loop_iterations: u64,
    next_instance: u64,
    next_group: u64,
    next_question: u64,
}

impl World {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            actors: Vec::new(),
            instances: HashMap::new(),
            groups: BTreeMap::new(),
            spawns: Vec::new(),
            deleted: Vec::new(),
            stop_requested: false,
            watchers: Vec::new(),
            questions: VecDeque::new(),
            assets: HashMap::new(),
            gains: GainTable::default(),
            mix_bus: Box::new(SilentMixBus::default()),
            keyboard: Box::new(VirtualKeyboard::new()),
            pointer: Box::new(VirtualPointer::new()),
            errors: Vec::new(),
            import_loop_iterations: 0,
            next_instance: 0,
            next_group: 0,
            next_question: 0,
        }
    }

    pub fn allocate_instance_id(&mut self) -> InstanceId {
        self.next_instance += 1;
        InstanceId(self.next_instance)
    }

    pub fn allocate_question_id(&mut self) -> QuestionId {
        self.next_question += 1;
        QuestionId(self.next_question)
    }

    pub fn actor(&self, id: ActorId) -> &ActorKind {
        &self.actors[id.0]
    }

    pub fn actor_by_class_name(&self, class_name: &str) -> Option<&ActorKind> {
        self.actors.iter().find(|a| a.class_name() == class_name)
    }

    pub fn stage(&self) -> Option<&ActorKind> {
        self.actors.iter().find(|a| a.kind() == ActorKindTag::Stage)
    }

    /// Instance plus the actor it belongs to.
    pub fn instance_and_actor(
        &self,
        id: InstanceId,
    ) -> Result<(&ActorInstance, &ActorKind), SyscallError> {
        let instance = self
            .instances
            .get(&id)
            .ok_or_else(|| SyscallError::InstanceGone(InstanceLabel(id.to_string())))?;
        Ok((instance, self.actor(instance.actor())))
    }

    pub fn instance_mut(&mut self, id: InstanceId) -> Result<&mut ActorInstance, SyscallError> {
        self.instances
            .get_mut(&id)
            .ok_or_else(|| SyscallError::InstanceGone(InstanceLabel(id.to_string())))
    }

    /// "Class#id", or "#id" once the instance is gone.
    pub fn instance_label(&self, id: InstanceId) -> InstanceLabel {
        match self.instances.get(&id) {
            Some(instance) => InstanceLabel(format!(
                "{}{}",
                self.actor(instance.actor()).class_name(),
                id
            )),
            None => InstanceLabel(id.to_string()),
        }
    }

    /// Mix bus used by an instance.
    pub fn bus_id(&self, id: InstanceId) -> String {
        match self.instances.get(&id) {
            Some(instance) => format!(
                "{}-{}",
                self.actor(instance.actor()).class_name(),
                id.as_u64()
            ),
            None => format!("gone-{}", id.as_u64()),
        }
    }

    /// Queue one thread per (handler, current instance) for every actor
    /// responding to `trigger`, all in one new group.
    ///
    /// Returns `None` when nothing responds; no group is created then.
    pub fn dispatch(&mut self, trigger: &Trigger) -> Option<GroupId> {
        let mut requests = Vec::new();
        for actor in &self.actors {
            let Some(group) = actor.handlers_for(trigger) else {
                continue;
            };
            for handler in group.handlers() {
                for &instance in actor.instances() {
                    requests.push((actor.id(), instance, handler.clone()));
                }
            }
        }
        self.queue_group(trigger.to_string(), requests)
    }

    /// Like [`World::dispatch`], but only for one instance.
    pub fn dispatch_to_instance(
        &mut self,
        trigger: &Trigger,
        instance: InstanceId,
    ) -> Option<GroupId> {
        let actor_id = self.instances.get(&instance)?.actor();
        let requests: Vec<_> = match self.actor(actor_id).handlers_for(trigger) {
            Some(group) => group
                .handlers()
                .iter()
                .map(|h| (actor_id, instance, h.clone()))
                .collect(),
            None => Vec::new(),
        };
        self.queue_group(format!("{} on {}", trigger, instance), requests)
    }

    fn queue_group(
        &mut self,
        label: String,
        requests: Vec<(ActorId, InstanceId, EventHandler)>,
    ) -> Option<GroupId> {
        if requests.is_empty() {
            log::trace!("[SCHED] nothing responds to {}", label);
            return None;
        }
        self.next_group += 1;
        let group = GroupId(self.next_group);
        log::debug!(
            "[SCHED] {} for \"{}\" with {} thread(s)",
            group,
            label,
            requests.len()
        );
        self.groups.insert(
            group,
            ThreadGroup {
                label,
                live: requests.len(),
            },
        );
        self.spawns
            .extend(requests.into_iter().map(|(actor, instance, handler)| SpawnRequest {
                group,
                actor,
                instance,
                handler,
            }));
        Some(group)
    }

    /// Note that a member of `group` has finished or been aborted.
    pub fn leave_group(&mut self, group: GroupId) {
        let Some(entry) = self.groups.get_mut(&group) else {
            return;
        };
        entry.live = entry.live.saturating_sub(1);
        if entry.live == 0 {
            log::trace!("[SCHED] {} (\"{}\") done", group, entry.label);
            self.groups.remove(&group);
        }
    }

    /// Resolve a clone source to an instance of a registered sprite.
    fn resolve_clone_source(&self, source: &CloneSource) -> Result<InstanceId, SyscallError> {
        match source {
            CloneSource::Class(name) => {
                let actor = self
                    .actor_by_class_name(name)
                    .ok_or_else(|| SyscallError::CloneTarget(name.clone()))?;
                if !actor.is_sprite() {
                    return Err(SyscallError::CloneTarget(name.clone()));
                }
                Ok(actor.instance_0())
            }
            CloneSource::Instance(id) => {
                let (_, actor) = self
                    .instance_and_actor(*id)
                    .map_err(|_| SyscallError::CloneTarget(id.to_string()))?;
                if !actor.is_sprite() {
                    return Err(SyscallError::CloneTarget(actor.class_name().to_string()));
                }
                Ok(*id)
            }
        }
    }

    /// Copy an instance, place the copy just behind it, and queue the
    /// copy's start-as-clone handlers.
    pub fn create_clone(&mut self, source: &CloneSource) -> Result<InstanceId, SyscallError> {
        let parent_id = self.resolve_clone_source(source)?;
        let clone_id = self.allocate_instance_id();
        let parent = &self.instances[&parent_id];
        let actor_id = parent.actor();
        let clone = parent.clone_as(clone_id);

        let actor = &mut self.actors[actor_id.0];
        let position = actor
            .instances
            .iter()
            .position(|&i| i == parent_id)
            .unwrap_or(actor.instances.len());
        actor.instances.insert(position, clone_id);
        self.instances.insert(clone_id, clone);

        log::debug!(
            "[CLONE] {}{} cloned from {}",
            self.actor(actor_id).class_name(),
            clone_id,
            parent_id
        );
        self.dispatch_to_instance(&Trigger::StartAsClone, clone_id);
        Ok(clone_id)
    }

    /// Remove a clone. Its threads are aborted by the scheduler once the
    /// current resumption returns.
    pub fn delete_instance(&mut self, id: InstanceId) -> Deletion {
        let Some(instance) = self.instances.get(&id) else {
            return Deletion::AlreadyGone;
        };
        if !instance.is_clone() {
            return Deletion::Original;
        }
        let bus = self.bus_id(id);
        let actor = &mut self.actors[instance.actor().0];
        actor.instances.retain(|&i| i != id);
        self.instances.remove(&id);
        self.watchers.retain(|w| w.instance != id);
        self.gains.remove(&bus);
        self.deleted.push(id);
        log::debug!("[CLONE] {} deleted", id);
        Deletion::Deleted
    }

    /// Remove every clone of every sprite.
    pub fn remove_all_clones(&mut self) -> usize {
        let clones: Vec<InstanceId> = self
            .instances
            .values()
            .filter(|i| i.is_clone())
            .map(|i| i.id())
            .collect();
        for &id in &clones {
            self.delete_instance(id);
        }
        clones.len()
    }

    /// Forget every group, queued spawn and question, and silence sound.
    pub fn reset_activity(&mut self) {
        self.groups.clear();
        self.spawns.clear();
        self.questions.clear();
        self.stop_requested = false;
        self.mix_bus.stop_all_performances();
    }

    pub fn report(&mut self, context: ErrorContext, message: String) {
        self.errors.push(ErrorReport { context, message });
    }

    /// Count one top-level loop iteration.
    pub fn note_import_loop_iteration(&mut self) -> Result<(), Error> {
        self.import_loop_iterations += 1;
        let max = self.config.max_import_loop_iterations;
        if self.import_loop_iterations > max {
            return Err(Error::RunawayLoop {
                iterations: self.import_loop_iterations,
                max,
            });
        }
        Ok(())
    }

    fn image(&self, locator: &str) -> Option<&AssetHandle> {
        self.assets.get(&(AssetKind::Image, locator.to_string()))
    }

    /// Bounding box of a sprite instance whose costume image has loaded.
    pub fn bounding_box(&self, id: InstanceId) -> Option<BoundingBox> {
        let (instance, actor) = self.instance_and_actor(id).ok()?;
        if !actor.is_sprite() {
            return None;
        }
        let costume = actor.costumes().get(instance.appearance.costume)?;
        let image = self.image(&costume.locator)?;
        Some(instance.bounding_box(costume, image))
    }

    /// Whether `id` overlaps any shown instance of `class_name`.
    pub fn touching(&self, id: InstanceId, class_name: &str) -> Result<bool, SyscallError> {
        let target = self
            .actor_by_class_name(class_name)
            .ok_or_else(|| SyscallError::UnknownClass(class_name.to_string()))?;
        if !target.is_sprite() {
            return Err(SyscallError::SpriteOnly("touching"));
        }
        let Some(own) = self.shown_bounding_box(id) else {
            return Ok(false);
        };
        Ok(target
            .instances()
            .iter()
            .filter(|&&other| other != id)
            .filter_map(|&other| self.shown_bounding_box(other))
            .any(|other| own.overlaps(&other)))
    }

    fn shown_bounding_box(&self, id: InstanceId) -> Option<BoundingBox> {
        let shown = self.instances.get(&id)?.appearance.shown;
        shown.then(|| self.bounding_box(id)).flatten()
    }

    /// Actors in drawing order: stage first, then sprites as registered.
    fn actors_back_to_front(&self) -> impl Iterator<Item = &ActorKind> {
        self.actors
            .iter()
            .filter(|a| !a.is_sprite())
            .chain(self.actors.iter().filter(|a| a.is_sprite()))
    }

    /// Top-most shown sprite instance under a point.
    pub fn sprite_at(&self, point: StagePoint) -> Option<InstanceId> {
        let sprites: Vec<&ActorKind> = self.actors.iter().filter(|a| a.is_sprite()).collect();
        sprites.iter().rev().find_map(|actor| {
            actor.instances().iter().rev().copied().find(|&id| {
                self.shown_bounding_box(id)
                    .is_some_and(|bbox| bbox.contains(point.x, point.y))
            })
        })
    }

    pub fn rendering_instructions(&self) -> Vec<RenderInstruction> {
        let mut images = Vec::new();
        let mut bubbles = Vec::new();
        let stage = &self.config.stage;

        for actor in self.actors_back_to_front() {
            for &id in actor.instances() {
                let Some(instance) = self.instances.get(&id) else {
                    continue;
                };
                let look = &instance.appearance;
                if !look.shown {
                    continue;
                }
                let Some(costume) = actor.costumes().get(look.costume) else {
                    continue;
                };
                if !actor.is_sprite() {
                    images.push(RenderInstruction::Image {
                        x: -stage.half_width(),
                        y: stage.half_height(),
                        scale: 1.0,
                        rotation: 0.0,
                        locator: costume.locator.clone(),
                        instance: id,
                    });
                    continue;
                }
                images.push(RenderInstruction::Image {
                    x: look.x - costume.centre_x * look.size,
                    y: look.y + costume.centre_y * look.size,
                    scale: look.size,
                    rotation: look.direction - 90.0,
                    locator: costume.locator.clone(),
                    instance: id,
                });
                if let Some(content) = &instance.speech {
                    let (tip_x, tip_y) = match self.bounding_box(id) {
                        Some(bbox) => ((bbox.x_min + bbox.x_max) / 2.0, bbox.y_max),
                        None => (look.x, look.y),
                    };
                    bubbles.push(RenderInstruction::SpeechBubble {
                        tip_x,
                        tip_y,
                        content: content.clone(),
                        instance: id,
                    });
                }
            }
        }
        images.extend(bubbles);
        images
    }

    pub fn watcher_snapshots(&self) -> Vec<WatcherSnapshot> {
        self.watchers
            .iter()
            .map(|w| WatcherSnapshot {
                instance: w.instance,
                attribute: w.attribute.clone(),
                label: w.label.clone(),
                value: self
                    .instances
                    .get(&w.instance)
                    .and_then(|i| i.get(&w.attribute))
                    .map(Dynamic::to_string),
                position: w.position,
            })
            .collect()
    }
}
