//! The syscall surface seen by handler code.
//!
//! Every thread gets its own [`ThreadContext`], naming the project it runs
//! in, the thread itself and the instance it runs for. There is no ambient
//! "current project": everything goes through the context, so independent
//! projects can coexist in one process.
//!
//! Plain methods take effect at once and never pause the thread. The
//! `async` ones may pause it; await them.

use rhai::{Dynamic, Variant};
use std::cell::RefCell;
use std::rc::Rc;

use crate::error::SyscallError;
use crate::instance::{ActorInstance, BoundingBox, InstanceId};
use crate::keys::validate_key_name;
use crate::render::WatcherPosition;
use crate::thread::{Suspend, Suspension, ThreadId, ThreadIo};
use crate::trigger::Trigger;
use crate::world::{CloneSource, Deletion, SharedWorld, Watcher, World};

type SyscallResult<T> = Result<T, SyscallError>;

/// Handle a running thread uses to act on its project.
#[derive(Clone)]
pub struct ThreadContext {
    world: SharedWorld,
    thread: ThreadId,
    instance: InstanceId,
    io: Rc<RefCell<ThreadIo>>,
}

impl ThreadContext {
    pub(crate) fn new(
        world: SharedWorld,
        thread: ThreadId,
        instance: InstanceId,
        io: Rc<RefCell<ThreadIo>>,
    ) -> Self {
        Self {
            world,
            thread,
            instance,
            io,
        }
    }

    fn suspend(&self, request: Suspension) -> Suspend {
        Suspend::new(request, self.io.clone())
    }

    fn carry_on(&self) -> Suspend {
        Suspend::ready(Ok(Dynamic::UNIT), self.io.clone())
    }

    fn with_self<R>(&self, f: impl FnOnce(&ActorInstance) -> R) -> SyscallResult<R> {
        self.world.with_world(|w| {
            let (instance, _) = w.instance_and_actor(self.instance)?;
            Ok(f(instance))
        })
    }

    fn with_self_mut<R>(&self, f: impl FnOnce(&mut ActorInstance) -> R) -> SyscallResult<R> {
        self.world
            .with_world_mut(|w| w.instance_mut(self.instance).map(f))
    }

    fn with_sprite_mut<R>(
        &self,
        syscall: &'static str,
        f: impl FnOnce(&mut ActorInstance) -> R,
    ) -> SyscallResult<R> {
        self.world.with_world_mut(|w| {
            let (_, actor) = w.instance_and_actor(self.instance)?;
            if !actor.is_sprite() {
                return Err(SyscallError::SpriteOnly(syscall));
            }
            w.instance_mut(self.instance).map(f)
        })
    }

    // Identity

    pub fn thread_id(&self) -> ThreadId {
        self.thread
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance
    }

    /// Class name of the instance this thread runs for.
    pub fn class_name(&self) -> SyscallResult<String> {
        self.world.with_world(|w| {
            let (_, actor) = w.instance_and_actor(self.instance)?;
            Ok(actor.class_name().to_string())
        })
    }

    pub fn is_clone(&self) -> SyscallResult<bool> {
        self.with_self(|i| i.is_clone())
    }

    /// Live instances of a class, in drawing order.
    pub fn registered_instances(&self, class_name: &str) -> SyscallResult<Vec<InstanceId>> {
        self.world.with_world(|w| {
            w.actor_by_class_name(class_name)
                .map(|a| a.instances().to_vec())
                .ok_or_else(|| SyscallError::UnknownClass(class_name.to_string()))
        })
    }

    // Attributes

    /// Read an attribute.
    pub fn get(&self, name: &str) -> SyscallResult<Dynamic> {
        self.world.with_world(|w| {
            let (instance, actor) = w.instance_and_actor(self.instance)?;
            instance
                .get(name)
                .cloned()
                .ok_or_else(|| SyscallError::NoSuchAttribute {
                    class_name: actor.class_name().to_string(),
                    name: name.to_string(),
                })
        })
    }

    /// Read an attribute as a concrete type.
    pub fn get_as<T: Variant + Clone>(&self, name: &str) -> SyscallResult<T> {
        let value = self.get(name)?;
        let type_name = value.type_name();
        value.try_cast::<T>().ok_or_else(|| {
            SyscallError::invalid(
                "get",
                format!("attribute \"{}\" holds a value of type {}", name, type_name),
            )
        })
    }

    pub fn set<T: Variant + Clone>(&self, name: &str, value: T) -> SyscallResult<()> {
        self.with_self_mut(|i| i.set(name, value))
    }

    pub fn set_dynamic(&self, name: &str, value: Dynamic) -> SyscallResult<()> {
        self.with_self_mut(|i| i.set_dynamic(name, value))
    }

    // Motion and looks

    pub fn x(&self) -> SyscallResult<f64> {
        self.with_self(|i| i.x())
    }

    pub fn y(&self) -> SyscallResult<f64> {
        self.with_self(|i| i.y())
    }

    pub fn go_to_xy(&self, x: f64, y: f64) -> SyscallResult<()> {
        self.with_sprite_mut("go_to_xy", |i| i.go_to_xy(x, y))
    }

    pub fn set_x(&self, x: f64) -> SyscallResult<()> {
        self.with_sprite_mut("set_x", |i| i.set_x(x))
    }

    pub fn set_y(&self, y: f64) -> SyscallResult<()> {
        self.with_sprite_mut("set_y", |i| i.set_y(y))
    }

    pub fn change_x(&self, dx: f64) -> SyscallResult<()> {
        self.with_sprite_mut("change_x", |i| i.change_x(dx))
    }

    pub fn change_y(&self, dy: f64) -> SyscallResult<()> {
        self.with_sprite_mut("change_y", |i| i.change_y(dy))
    }

    pub fn set_size(&self, size: f64) -> SyscallResult<()> {
        if !size.is_finite() || size < 0.0 {
            return Err(SyscallError::invalid("set_size", "size must be non-negative"));
        }
        self.with_sprite_mut("set_size", |i| i.set_size(size))
    }

    pub fn show(&self) -> SyscallResult<()> {
        self.with_sprite_mut("show", |i| i.show())
    }

    pub fn hide(&self) -> SyscallResult<()> {
        self.with_sprite_mut("hide", |i| i.hide())
    }

    pub fn turn_degrees(&self, degrees: f64) -> SyscallResult<()> {
        self.with_sprite_mut("turn_degrees", |i| i.turn_degrees(degrees))
    }

    pub fn point_in_direction(&self, degrees: f64) -> SyscallResult<()> {
        self.with_sprite_mut("point_in_direction", |i| i.point_in_direction(degrees))
    }

    pub fn direction(&self) -> SyscallResult<f64> {
        self.with_self(|i| i.appearance.direction)
    }

    fn switch_appearance(&self, what: &'static str, name: &str) -> SyscallResult<()> {
        self.world.with_world_mut(|w| {
            let (_, actor) = w.instance_and_actor(self.instance)?;
            let index = actor
                .costume_index(name)
                .ok_or_else(|| SyscallError::UnknownAppearance {
                    what,
                    name: name.to_string(),
                    class_name: actor.class_name().to_string(),
                })?;
            w.instance_mut(self.instance)?.appearance.costume = index;
            Ok(())
        })
    }

    /// Wear the named costume.
    pub fn switch_costume(&self, name: &str) -> SyscallResult<()> {
        if !self.world.with_world(|w| is_sprite(w, self.instance)) {
            return Err(SyscallError::SpriteOnly("switch_costume"));
        }
        self.switch_appearance("costume", name)
    }

    /// Show the named backdrop. Only the stage has backdrops.
    pub fn switch_backdrop(&self, name: &str) -> SyscallResult<()> {
        if self.world.with_world(|w| is_sprite(w, self.instance)) {
            return Err(SyscallError::invalid(
                "switch_backdrop",
                "only the Stage has backdrops",
            ));
        }
        self.switch_appearance("backdrop", name)
    }

    /// Name of the current costume or backdrop.
    pub fn appearance_name(&self) -> SyscallResult<Option<String>> {
        self.world.with_world(|w| {
            let (instance, actor) = w.instance_and_actor(self.instance)?;
            Ok(actor
                .costumes()
                .get(instance.appearance.costume)
                .map(|c| c.name.clone()))
        })
    }

    pub fn say(&self, content: &str) -> SyscallResult<()> {
        let content = content.to_string();
        self.with_sprite_mut("say", move |i| i.speech = Some(content))
    }

    pub fn say_nothing(&self) -> SyscallResult<()> {
        self.with_sprite_mut("say_nothing", |i| i.speech = None)
    }

    /// Bounding box, once the costume image has loaded.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.world.with_world(|w| w.bounding_box(self.instance))
    }

    /// Whether this instance overlaps any shown instance of `class_name`.
    pub fn touching(&self, class_name: &str) -> SyscallResult<bool> {
        self.world.with_world(|w| w.touching(self.instance, class_name))
    }

    // Messages and timing

    /// Send a message; its handlers start on the next frame.
    pub fn broadcast(&self, message: &str) {
        self.world
            .with_world_mut(|w| w.dispatch(&Trigger::Message(message.to_string())));
    }

    /// Send a message and pause until every thread it started has finished.
    pub async fn broadcast_and_wait(&self, message: &str) -> SyscallResult<()> {
        let group = self
            .world
            .with_world_mut(|w| w.dispatch(&Trigger::Message(message.to_string())));
        let request = match group {
            Some(group) => Suspension::AwaitGroup(group),
            None => Suspension::NextFrame,
        };
        self.suspend(request).await.map(drop)
    }

    /// Let the rest of the frame run.
    ///
    /// Inside a fast loop (see
    /// [`push_loop_iterations_per_frame`](Self::push_loop_iterations_per_frame))
    /// only some calls actually pause.
    pub async fn yield_until_next_frame(&self) -> SyscallResult<()> {
        let pause = self.io.borrow_mut().loop_rate.should_yield();
        let suspend = if pause {
            self.suspend(Suspension::NextFrame)
        } else {
            self.carry_on()
        };
        suspend.await.map(drop)
    }

    /// Pause for at least `seconds` of frame time.
    pub async fn wait_seconds(&self, seconds: f64) -> SyscallResult<()> {
        if !seconds.is_finite() {
            return Err(SyscallError::invalid(
                "wait_seconds",
                "duration must be a finite number",
            ));
        }
        self.suspend(Suspension::Timer(seconds.max(0.0)))
            .await
            .map(drop)
    }

    pub fn push_loop_iterations_per_frame(&self, iterations: u32) {
        self.io.borrow_mut().loop_rate.push(iterations);
    }

    pub fn pop_loop_iterations_per_frame(&self) {
        if !self.io.borrow_mut().loop_rate.pop() {
            log::warn!("[SCHED] {} popped its last loop rate; ignored", self.thread);
        }
    }

    // Clones

    /// Clone an instance, or a class's original. The clone's start-as-clone
    /// handlers run from the next frame on.
    pub fn create_clone_of(&self, source: CloneSource) -> SyscallResult<InstanceId> {
        self.world.with_world_mut(|w| w.create_clone(&source))
    }

    pub fn create_clone_of_self(&self) -> SyscallResult<InstanceId> {
        self.create_clone_of(CloneSource::Instance(self.instance))
    }

    /// Remove this instance if it is a clone, ending every thread running
    /// for it, this one included. On an original this does nothing and the
    /// thread carries on.
    pub async fn delete_this_clone(&self) -> SyscallResult<()> {
        let outcome = self
            .world
            .with_world_mut(|w| w.delete_instance(self.instance));
        let suspend = match outcome {
            Deletion::Original => {
                log::debug!("[CLONE] {} is an original; not deleted", self.instance);
                self.carry_on()
            }
            Deletion::Deleted | Deletion::AlreadyGone => self.suspend(Suspension::Terminate),
        };
        suspend.await.map(drop)
    }

    /// Stop everything: all threads end, clones go, sounds stop.
    pub async fn stop_all(&self) -> SyscallResult<()> {
        self.world.with_world_mut(|w| w.stop_requested = true);
        self.suspend(Suspension::Terminate).await.map(drop)
    }

    // Input

    pub fn key_pressed(&self, keyname: &str) -> SyscallResult<bool> {
        validate_key_name(keyname)?;
        Ok(self
            .world
            .with_world(|w| w.keyboard.key_is_pressed(keyname)))
    }

    /// Ask the user something and pause until the host delivers the answer.
    pub async fn ask_and_wait(&self, prompt: Option<&str>) -> SyscallResult<String> {
        let question = self.world.with_world_mut(|w| {
            let id = w.allocate_question_id();
            w.questions.push_back(crate::world::Question {
                id,
                thread: self.thread,
                instance: self.instance,
                prompt: prompt.map(str::to_string),
            });
            id
        });
        let answer = self.suspend(Suspension::AwaitAnswer(question)).await?;
        answer
            .into_string()
            .map_err(|t| SyscallError::invalid("ask_and_wait", format!("answer was a {}", t)))
    }

    // Watchers

    /// Show an attribute of this instance on the stage.
    pub fn show_variable(
        &self,
        attribute: &str,
        label: Option<&str>,
        position: WatcherPosition,
    ) -> SyscallResult<()> {
        position
            .validate()
            .map_err(|reason| SyscallError::invalid("show_variable", reason))?;
        let watcher = Watcher {
            instance: self.instance,
            attribute: attribute.to_string(),
            label: label.unwrap_or(attribute).to_string(),
            position,
        };
        self.world.with_world_mut(|w| {
            match w
                .watchers
                .iter_mut()
                .find(|x| x.instance == self.instance && x.attribute == attribute)
            {
                Some(existing) => *existing = watcher,
                None => w.watchers.push(watcher),
            }
        });
        Ok(())
    }

    pub fn hide_variable(&self, attribute: &str) {
        self.world.with_world_mut(|w| {
            w.watchers
                .retain(|x| !(x.instance == self.instance && x.attribute == attribute))
        });
    }

    // Sound

    fn play(&self, name: &str) -> SyscallResult<crate::sound::PerformanceId> {
        self.world.with_world_mut(|w| {
            let (_, actor) = w.instance_and_actor(self.instance)?;
            let sound = actor.sound(name).ok_or_else(|| SyscallError::UnknownSound {
                name: name.to_string(),
                class_name: actor.class_name().to_string(),
            })?;
            let locator = sound.locator.clone();
            let bus = w.bus_id(self.instance);
            Ok(w.mix_bus.play(&bus, &locator))
        })
    }

    /// Start a sound and carry on.
    pub fn start_sound(&self, name: &str) -> SyscallResult<()> {
        self.play(name).map(drop)
    }

    /// Play a sound and pause until it ends.
    pub async fn play_sound_until_done(&self, name: &str) -> SyscallResult<()> {
        let performance = self.play(name)?;
        self.suspend(Suspension::AwaitPerformance(performance))
            .await
            .map(drop)
    }

    /// Set this instance's volume; values outside [0, 1] are clamped.
    pub fn set_sound_volume(&self, gain: f64) -> f64 {
        self.world.with_world_mut(|w| {
            let bus = w.bus_id(self.instance);
            let stored = w.gains.set(&bus, gain);
            w.mix_bus.set_gain(&bus, stored);
            stored
        })
    }

    pub fn sound_volume(&self) -> f64 {
        self.world
            .with_world(|w| w.gains.get(&w.bus_id(self.instance)))
    }

    pub fn stop_all_sounds(&self) {
        self.world
            .with_world_mut(|w| w.mix_bus.stop_all_performances());
    }
}

fn is_sprite(world: &World, instance: InstanceId) -> bool {
    world
        .instance_and_actor(instance)
        .map(|(_, actor)| actor.is_sprite())
        .unwrap_or(false)
}
