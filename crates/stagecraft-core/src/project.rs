//! The project: actor registration and the frame loop.
//!
//! A [`Project`] owns every thread. Each call to [`Project::one_frame`]
//! makes one deterministic pass over a snapshot of the live threads, in
//! creation order, resuming each thread whose wait is over at most once.
//! Syscall side effects land immediately; threads they start are only
//! created after the resumption that asked for them, and are not part of
//! the snapshot, so they first run on the following frame.

use rhai::Dynamic;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::rc::Rc;

use crate::actor::{ActorClass, ActorId, ActorKind, ActorKindTag};
use crate::assets::{AssetKind, AssetLoader, PendingAsset};
use crate::config::RuntimeConfig;
use crate::context::ThreadContext;
use crate::error::{Error, ErrorContext, ErrorReport, RegistrationError, Result, SyscallError};
use crate::input::{Keyboard, Pointer};
use crate::instance::{ActorInstance, InstanceId};
use crate::render::{RenderInstruction, WatcherSnapshot};
use crate::sound::{MixBus, PerformanceStatus};
use crate::thread::{
    QuestionId, Resumption, Suspension, Thread, ThreadId, ThreadInfo, ThreadIo, ThreadState,
};
use crate::trigger::Trigger;
use crate::world::{SharedWorld, World};

/// Timer comparisons tolerate this much rounding.
const EPSILON: f64 = 1e-6;

/// How a thread left the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ThreadEnd {
    Finished,
    Failed,
    /// Its instance went away, or it deleted itself.
    Aborted,
}

impl fmt::Display for ThreadEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadEnd::Finished => f.write_str("finished"),
            ThreadEnd::Failed => f.write_str("failed"),
            ThreadEnd::Aborted => f.write_str("aborted"),
        }
    }
}

enum Readiness {
    Gone,
    Orphaned,
    Waiting,
    Due,
}

/// A question waiting for the host to answer it.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionPrompt {
    pub id: QuestionId,
    /// Instance that asked.
    pub instance: InstanceId,
    pub prompt: Option<String>,
}

/// A set of registered actors and the threads running for them.
pub struct Project {
    world: SharedWorld,
    threads: BTreeMap<ThreadId, Thread>,
    next_thread: u64,
    pending_assets: Vec<PendingAsset>,
    frame: u64,
}

impl Default for Project {
    fn default() -> Self {
        Self::with_checked_config(RuntimeConfig::default())
    }
}

impl Project {
    /// Create an empty project. Fails if `config` does not validate.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_checked_config(config))
    }

    fn with_checked_config(config: RuntimeConfig) -> Self {
        Self {
            world: SharedWorld::new(World::new(config)),
            threads: BTreeMap::new(),
            next_thread: 0,
            pending_assets: Vec::new(),
            frame: 0,
        }
    }

    pub(crate) fn shared_world(&self) -> SharedWorld {
        self.world.clone()
    }

    pub fn config(&self) -> RuntimeConfig {
        self.world.with_world(|w| w.config.clone())
    }

    /// Frames run so far.
    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    pub fn set_keyboard(&mut self, keyboard: Box<dyn Keyboard>) {
        self.world.with_world_mut(|w| w.keyboard = keyboard);
    }

    pub fn set_pointer(&mut self, pointer: Box<dyn Pointer>) {
        self.world.with_world_mut(|w| w.pointer = pointer);
    }

    pub fn set_mix_bus(&mut self, mix_bus: Box<dyn MixBus>) {
        self.world.with_world_mut(|w| w.mix_bus = mix_bus);
    }

    // Registration

    pub fn register_sprite_class(&mut self, class: ActorClass) -> Result<ActorId> {
        self.register(class, ActorKindTag::Sprite)
    }

    pub fn register_stage_class(&mut self, class: ActorClass) -> Result<ActorId> {
        self.register(class, ActorKindTag::Stage)
    }

    fn register(&mut self, class: ActorClass, expected: ActorKindTag) -> Result<ActorId> {
        let result = self.world.with_world_mut(|w| {
            if class.kind() != expected {
                return Err(RegistrationError::WrongKind {
                    class_name: class.name().to_string(),
                    declared: class.kind().to_string(),
                    expected: expected.to_string(),
                });
            }
            if w.actor_by_class_name(class.name()).is_some() {
                return Err(RegistrationError::DuplicateClassName(
                    class.name().to_string(),
                ));
            }
            if expected == ActorKindTag::Stage {
                if let Some(stage) = w.stage() {
                    return Err(RegistrationError::SecondStage(
                        stage.class_name().to_string(),
                    ));
                }
            }
            let id = ActorId(w.actors.len());
            let instance_0 = w.allocate_instance_id();
            let (kind, instance) = class.build(id, instance_0)?;
            log::info!(
                "[SCHED] registered {} \"{}\" with {} handler group(s)",
                kind.kind(),
                kind.class_name(),
                kind.handler_groups().len()
            );
            w.actors.push(kind);
            w.instances.insert(instance_0, instance);
            Ok(id)
        });
        Ok(result?)
    }

    // Queries

    /// A copy of the named actor as it stands now.
    pub fn actor_by_class_name(&self, class_name: &str) -> Result<ActorKind> {
        self.world.with_world(|w| {
            w.actor_by_class_name(class_name)
                .cloned()
                .ok_or_else(|| Error::UnknownActor(class_name.to_string()))
        })
    }

    pub fn instance_0_by_class_name(&self, class_name: &str) -> Result<InstanceId> {
        Ok(self.actor_by_class_name(class_name)?.instance_0())
    }

    /// A copy of one instance's state.
    pub fn instance(&self, id: InstanceId) -> Option<ActorInstance> {
        self.world.with_world(|w| w.instances.get(&id).cloned())
    }

    /// Copies of every live instance of a class, in drawing order.
    pub fn instances_of(&self, class_name: &str) -> Result<Vec<ActorInstance>> {
        self.world.with_world(|w| {
            let actor = w
                .actor_by_class_name(class_name)
                .ok_or_else(|| Error::UnknownActor(class_name.to_string()))?;
            Ok(actor
                .instances()
                .iter()
                .filter_map(|id| w.instances.get(id).cloned())
                .collect())
        })
    }

    /// Debug snapshot of every live thread, in run order.
    pub fn threads_info(&self) -> Vec<ThreadInfo> {
        self.world.with_world(|w| {
            self.threads
                .values()
                .map(|t| ThreadInfo {
                    thread: t.id,
                    group: t.group,
                    class_name: w.actor(t.actor).class_name().to_string(),
                    instance: t.instance,
                    handler: t.label.clone(),
                    state: t.state.clone(),
                })
                .collect()
        })
    }

    pub fn n_threads(&self) -> usize {
        self.threads.len()
    }

    pub fn n_thread_groups(&self) -> usize {
        self.world.with_world(|w| w.groups.len())
    }

    /// What to draw, back to front.
    pub fn rendering_instructions(&self) -> Vec<RenderInstruction> {
        self.world.with_world(|w| w.rendering_instructions())
    }

    pub fn attribute_watchers(&self) -> Vec<WatcherSnapshot> {
        self.world.with_world(|w| w.watcher_snapshots())
    }

    /// Gain of an instance's mix bus.
    pub fn sound_volume(&self, instance: InstanceId) -> f64 {
        self.world.with_world(|w| w.gains.get(&w.bus_id(instance)))
    }

    /// Errors reported since the last call, oldest first.
    pub fn take_errors(&mut self) -> Vec<ErrorReport> {
        self.world.with_world_mut(|w| std::mem::take(&mut w.errors))
    }

    // Import-time guard

    pub fn set_max_import_loop_iterations(&mut self, max: u64) {
        self.world
            .with_world_mut(|w| w.config.max_import_loop_iterations = max);
    }

    /// Count one iteration of a loop run outside any thread.
    pub fn note_import_loop_iteration(&mut self) -> Result<()> {
        self.world.with_world_mut(|w| w.note_import_loop_iteration())
    }

    // Events

    /// Start every handler for `message`. Nothing runs until the next frame.
    pub fn do_broadcast(&mut self, message: &str) {
        log::debug!("[SCHED] broadcast \"{}\"", message);
        self.world
            .with_world_mut(|w| w.dispatch(&Trigger::Message(message.to_string())));
        self.materialize_spawns();
    }

    pub fn on_green_flag_clicked(&mut self) {
        log::info!("[SCHED] green flag");
        self.stop_everything();
        self.world.with_world_mut(|w| w.dispatch(&Trigger::GreenFlag));
        self.materialize_spawns();
    }

    pub fn on_red_stop_clicked(&mut self) {
        log::info!("[SCHED] red stop");
        self.stop_everything();
    }

    /// The question currently on screen, if any.
    pub fn current_question(&self) -> Option<QuestionPrompt> {
        self.world.with_world(|w| {
            w.questions.front().map(|q| QuestionPrompt {
                id: q.id,
                instance: q.instance,
                prompt: q.prompt.clone(),
            })
        })
    }

    /// Answer the current question. Its asker resumes on the next frame.
    pub fn deliver_answer(&mut self, answer: &str) -> Result<()> {
        let question = self
            .world
            .with_world_mut(|w| w.questions.pop_front())
            .ok_or(Error::NoPendingQuestion)?;
        match self.threads.get_mut(&question.thread) {
            Some(thread) => {
                thread.io.borrow_mut().resume = Some(Ok(Dynamic::from(answer.to_string())));
                thread.state = ThreadState::Runnable;
            }
            None => log::warn!(
                "[SCHED] answer for {} arrived after its thread ended",
                question.thread
            ),
        }
        Ok(())
    }

    // Assets

    /// Ask `loader` for every declared costume, backdrop and sound.
    pub fn load_assets(&mut self, loader: &dyn AssetLoader) -> usize {
        let wanted: Vec<(AssetKind, String)> = self.world.with_world(|w| {
            let mut seen = HashSet::new();
            w.actors
                .iter()
                .flat_map(|a| {
                    a.costumes()
                        .iter()
                        .map(|c| (AssetKind::Image, c.locator.clone()))
                        .chain(a.sounds().iter().map(|s| (AssetKind::Sound, s.locator.clone())))
                })
                .filter(|key| !w.assets.contains_key(key) && seen.insert(key.clone()))
                .collect()
        });
        log::debug!("[ASSET] requesting {} asset(s)", wanted.len());
        for (kind, locator) in &wanted {
            self.pending_assets.push(loader.load(*kind, locator));
        }
        self.poll_assets()
    }

    /// Collect finished loads; returns how many are still outstanding.
    pub fn poll_assets(&mut self) -> usize {
        let pending = std::mem::take(&mut self.pending_assets);
        for asset in pending {
            match asset.try_take() {
                None => self.pending_assets.push(asset),
                Some(Ok(handle)) => {
                    log::trace!("[ASSET] loaded {} \"{}\"", asset.kind(), asset.locator());
                    self.world.with_world_mut(|w| {
                        w.assets
                            .insert((asset.kind(), asset.locator().to_string()), handle)
                    });
                }
                Some(Err(e)) => {
                    log::error!("[ASSET] {}", e);
                    self.world
                        .with_world_mut(|w| w.report(ErrorContext::AssetLoad, e.to_string()));
                }
            }
        }
        self.pending_assets.len()
    }

    // Frame loop

    /// Run one frame.
    pub fn one_frame(&mut self) {
        self.frame += 1;
        log::trace!("[SCHED] frame {} with {} thread(s)", self.frame, self.threads.len());
        self.poll_assets();
        self.launch_input_handlers();

        let frame_seconds = self.world.with_world(|w| w.config.frame_seconds());
        let snapshot: Vec<ThreadId> = self.threads.keys().copied().collect();
        for id in snapshot {
            match self.readiness(id, frame_seconds) {
                Readiness::Gone | Readiness::Waiting => {}
                Readiness::Orphaned => self.end_thread(id, ThreadEnd::Aborted),
                Readiness::Due => self.step(id),
            }
        }
    }

    /// Start key and click handlers for input since the last frame. They
    /// run in this frame.
    fn launch_input_handlers(&mut self) {
        self.world.with_world_mut(|w| {
            for key in w.keyboard.drain_new_keydowns() {
                w.dispatch(&Trigger::KeyPressed(key));
            }
            for click in w.pointer.drain_clicks() {
                match w.sprite_at(click) {
                    Some(instance) => w.dispatch_to_instance(&Trigger::ThisSpriteClicked, instance),
                    None => w.dispatch(&Trigger::StageClicked),
                };
            }
        });
        self.materialize_spawns();
    }

    fn readiness(&mut self, id: ThreadId, frame_seconds: f64) -> Readiness {
        let Some(thread) = self.threads.get_mut(&id) else {
            return Readiness::Gone;
        };
        self.world.with_world(|w| {
            if !w.instances.contains_key(&thread.instance) {
                return Readiness::Orphaned;
            }
            let due = match &mut thread.state {
                ThreadState::Runnable | ThreadState::AwaitingFrame => true,
                ThreadState::AwaitingTimer { remaining } => {
                    *remaining -= frame_seconds;
                    *remaining <= EPSILON
                }
                ThreadState::AwaitingGroup(group) => !w.groups.contains_key(group),
                ThreadState::AwaitingAnswer(_) => false,
                ThreadState::AwaitingPerformance(performance) => {
                    match w.mix_bus.status(*performance) {
                        PerformanceStatus::Playing => false,
                        PerformanceStatus::Finished => true,
                        PerformanceStatus::Failed(reason) => {
                            thread.io.borrow_mut().resume = Some(Err(SyscallError::invalid(
                                "play_sound_until_done",
                                reason,
                            )));
                            true
                        }
                    }
                }
            };
            if due {
                Readiness::Due
            } else {
                Readiness::Waiting
            }
        })
    }

    /// Resume one thread and apply what it asked for.
    fn step(&mut self, id: ThreadId) {
        let Some(thread) = self.threads.get_mut(&id) else {
            return;
        };
        thread.state = ThreadState::Runnable;
        match thread.resume() {
            Resumption::Finished => self.end_thread(id, ThreadEnd::Finished),
            Resumption::Failed(error) => {
                self.report_failure(id, &error);
                self.end_thread(id, ThreadEnd::Failed);
            }
            Resumption::Suspended(request) => {
                let request = request.unwrap_or_else(|| {
                    log::debug!("[SCHED] {} awaited a foreign future", id);
                    Suspension::NextFrame
                });
                match ThreadState::from_suspension(request) {
                    Some(state) => {
                        log::trace!("[SCHED] {} now {}", id, state);
                        thread.state = state;
                    }
                    None => self.end_thread(id, ThreadEnd::Aborted),
                }
            }
        }
        self.apply_side_effects();
    }

    fn report_failure(&self, id: ThreadId, error: &anyhow::Error) {
        let Some(thread) = self.threads.get(&id) else {
            return;
        };
        self.world.with_world_mut(|w| {
            let instance = w.instance_label(thread.instance);
            let class_name = w.actor(thread.actor).class_name().to_string();
            log::error!(
                "[SCHED] {} ({}.{}) failed: {:#}",
                id,
                instance,
                thread.label,
                error
            );
            w.report(
                ErrorContext::Thread {
                    class_name,
                    instance: instance.0,
                    handler: thread.label.clone(),
                },
                format!("{:#}", error),
            );
        });
    }

    fn end_thread(&mut self, id: ThreadId, how: ThreadEnd) {
        let Some(thread) = self.threads.remove(&id) else {
            return;
        };
        log::debug!("[SCHED] {} ({}) {}", id, thread.label, how);
        self.world.with_world_mut(|w| {
            w.leave_group(thread.group);
            w.questions.retain(|q| q.thread != id);
        });
    }

    fn apply_side_effects(&mut self) {
        if self.world.with_world(|w| w.stop_requested) {
            log::info!("[SCHED] stop_all");
            self.stop_everything();
            return;
        }
        let deleted = self
            .world
            .with_world_mut(|w| std::mem::take(&mut w.deleted));
        if !deleted.is_empty() {
            let doomed: Vec<ThreadId> = self
                .threads
                .values()
                .filter(|t| deleted.contains(&t.instance))
                .map(|t| t.id)
                .collect();
            for id in doomed {
                self.end_thread(id, ThreadEnd::Aborted);
            }
        }
        self.materialize_spawns();
    }

    /// End every thread, delete every clone and clear all groups.
    fn stop_everything(&mut self) {
        let threads = std::mem::take(&mut self.threads);
        let n_clones = self.world.with_world_mut(|w| {
            let n = w.remove_all_clones();
            w.deleted.clear();
            w.reset_activity();
            n
        });
        log::debug!(
            "[SCHED] stopped {} thread(s), removed {} clone(s)",
            threads.len(),
            n_clones
        );
        drop(threads);
    }

    /// Create threads for queued spawn requests.
    fn materialize_spawns(&mut self) {
        loop {
            let (requests, default_rate) = self.world.with_world_mut(|w| {
                (
                    std::mem::take(&mut w.spawns),
                    w.config.default_loop_iterations_per_frame,
                )
            });
            if requests.is_empty() {
                return;
            }
            for request in requests {
                let alive = self
                    .world
                    .with_world(|w| w.instances.contains_key(&request.instance));
                if !alive {
                    self.world.with_world_mut(|w| w.leave_group(request.group));
                    continue;
                }
                self.next_thread += 1;
                let id = ThreadId(self.next_thread);
                let io = Rc::new(RefCell::new(ThreadIo::new(default_rate)));
                let cx = ThreadContext::new(self.world.clone(), id, request.instance, io.clone());
                let body = request.handler.launch(cx);
                log::debug!(
                    "[SCHED] {} in {} runs {} for {}",
                    id,
                    request.group,
                    request.handler.label(),
                    request.instance
                );
                let thread = Thread::new(
                    id,
                    request.group,
                    request.actor,
                    request.instance,
                    request.handler.label().to_string(),
                    io,
                    body,
                );
                self.threads.insert(id, thread);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::InMemoryLoader;
    use crate::input::{VirtualKeyboard, VirtualPointer};
    use crate::render::WatcherPosition;
    use crate::sound::PerformanceId;
    use crate::world::CloneSource;
    use std::cell::Cell;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn sorted_ints(project: &Project, class_name: &str, attribute: &str) -> Vec<i64> {
        let mut values: Vec<i64> = project
            .instances_of(class_name)
            .unwrap()
            .iter()
            .map(|i| i.get_as::<i64>(attribute).unwrap())
            .collect();
        values.sort();
        values
    }

    fn flag(project: &Project, class_name: &str, attribute: &str) -> bool {
        let id = project.instance_0_by_class_name(class_name).unwrap();
        project
            .instance(id)
            .and_then(|i| i.get_as::<bool>(attribute))
            .unwrap_or(false)
    }

    fn broom() -> ActorClass {
        ActorClass::sprite("Broom")
            .init(|inst| {
                inst.set("copied_id", 1_i64);
                Ok(())
            })
            .when_i_receive("clone-self", "clone_self", |cx| async move {
                cx.create_clone_of_self()?;
                Ok(())
            })
            .when_i_start_as_a_clone("update_id", |cx| async move {
                let id = cx.get_as::<i64>("copied_id")? + 1;
                cx.set("copied_id", id)?;
                if id < 5 {
                    cx.create_clone_of_self()?;
                }
                Ok(())
            })
            .when_i_receive("destroy-broom-clones", "destroy", |cx| async move {
                cx.delete_this_clone().await?;
                Ok(())
            })
    }

    fn broom_project() -> Project {
        let mut project = Project::default();
        project.register_sprite_class(broom()).unwrap();
        project
    }

    #[test]
    fn test_chain_clone_reaches_fixed_point() {
        init_logger();
        let mut project = broom_project();

        project.do_broadcast("clone-self");
        assert_eq!(sorted_ints(&project, "Broom", "copied_id"), vec![1]);

        let expected: [&[i64]; 5] = [
            &[1, 1],
            &[1, 2, 2],
            &[1, 2, 3, 3],
            &[1, 2, 3, 4, 4],
            &[1, 2, 3, 4, 5],
        ];
        for ids in expected {
            project.one_frame();
            assert_eq!(sorted_ints(&project, "Broom", "copied_id"), ids);
        }
        assert_eq!(project.n_thread_groups(), 0);
        assert_eq!(project.n_threads(), 0);

        for _ in 0..10 {
            project.one_frame();
            assert_eq!(sorted_ints(&project, "Broom", "copied_id"), vec![1, 2, 3, 4, 5]);
        }
    }

    #[test]
    fn test_delete_clones_after_chain_clone() {
        let mut project = broom_project();
        project.do_broadcast("clone-self");
        for _ in 0..10 {
            project.one_frame();
        }
        assert_eq!(sorted_ints(&project, "Broom", "copied_id"), vec![1, 2, 3, 4, 5]);

        project.do_broadcast("destroy-broom-clones");
        project.one_frame();
        assert_eq!(sorted_ints(&project, "Broom", "copied_id"), vec![1]);
        assert!(project.take_errors().is_empty());
    }

    #[test]
    fn test_clone_by_instance() {
        init_logger();
        let next_generated = Rc::new(Cell::new(100_i64));
        let take_id = {
            let next = next_generated.clone();
            move || {
                let id = next.get();
                next.set(id + 1);
                id
            }
        };
        let take_in_init = take_id.clone();
        let alien = ActorClass::sprite("Alien")
            .init(move |inst| {
                inst.set("copied_id", 42_i64);
                inst.set("generated_id", take_in_init());
                Ok(())
            })
            .when_i_receive("clone-self", "clone_self", |cx| async move {
                cx.create_clone_of(CloneSource::Instance(cx.instance_id()))?;
                Ok(())
            })
            .when_i_start_as_a_clone("update_ids", move |cx| {
                let take_id = take_id.clone();
                async move {
                    let copied = cx.get_as::<i64>("copied_id")?;
                    cx.set("copied_id", copied + 1)?;
                    cx.set("generated_id", take_id())?;
                    Ok(())
                }
            });
        let mut project = Project::default();
        project.register_sprite_class(alien).unwrap();

        let check = |project: &Project, copied: &[i64], generated: &[i64]| {
            assert_eq!(sorted_ints(project, "Alien", "copied_id"), copied);
            assert_eq!(sorted_ints(project, "Alien", "generated_id"), generated);
        };

        project.do_broadcast("clone-self");
        check(&project, &[42], &[100]);
        project.one_frame();
        check(&project, &[42, 42], &[100, 100]);
        project.one_frame();
        check(&project, &[42, 43], &[100, 101]);

        project.do_broadcast("clone-self");
        check(&project, &[42, 43], &[100, 101]);
        project.one_frame();
        check(&project, &[42, 42, 43, 43], &[100, 100, 101, 101]);
        project.one_frame();
        check(&project, &[42, 43, 43, 44], &[100, 101, 102, 103]);
    }

    #[test]
    fn test_instance_0_stays_original_after_cloning() {
        init_logger();
        let ball = ActorClass::sprite("Ball")
            .when_i_receive("split", "split", |cx| async move {
                cx.create_clone_of_self()?;
                Ok(())
            })
            .when_i_receive("spawn", "spawn", |cx| async move {
                cx.create_clone_of(CloneSource::Class("Ball".into()))?;
                Ok(())
            });
        let mut project = Project::default();
        project.register_sprite_class(ball).unwrap();
        let original = project.instance_0_by_class_name("Ball").unwrap();

        project.do_broadcast("split");
        project.one_frame();
        assert_eq!(project.instance_0_by_class_name("Ball").unwrap(), original);
        assert!(!project.instance(original).unwrap().is_clone());

        project.do_broadcast("spawn");
        project.one_frame();
        let clones: Vec<ActorInstance> = project
            .instances_of("Ball")
            .unwrap()
            .into_iter()
            .filter(|i| i.is_clone())
            .collect();
        // "spawn" ran on the original and the first clone; both cloned the original.
        assert_eq!(clones.len(), 3);
        assert_eq!(
            clones.iter().filter(|c| c.parent() == Some(original)).count(),
            3
        );
        assert_eq!(project.instance_0_by_class_name("Ball").unwrap(), original);
    }

    fn n_attr(project: &Project, class_name: &str, attribute: &str) -> i64 {
        let id = project.instance_0_by_class_name(class_name).unwrap();
        project.instance(id).unwrap().get_as::<i64>(attribute).unwrap()
    }

    #[test]
    fn test_unregister_clone_stops_pings() {
        init_logger();
        let beacon = ActorClass::sprite("Beacon")
            .init(|inst| {
                inst.set("n_clone_reqs", 0_i64);
                Ok(())
            })
            .when_i_receive("create-clone", "create_clone", |cx| async move {
                cx.create_clone_of_self()?;
                let n = cx.get_as::<i64>("n_clone_reqs")?;
                cx.set("n_clone_reqs", n + 1)?;
                Ok(())
            })
            .when_i_start_as_a_clone("ping_forever", |cx| async move {
                loop {
                    cx.broadcast_and_wait("ping").await?;
                    cx.yield_until_next_frame().await?;
                }
            })
            .when_i_receive("destroy-clones", "destroy", |cx| async move {
                cx.delete_this_clone().await?;
                Ok(())
            });
        let counter = ActorClass::sprite("Counter")
            .init(|inst| {
                inst.set("n_pings", 0_i64);
                Ok(())
            })
            .when_i_receive("ping", "count_ping", |cx| async move {
                let n = cx.get_as::<i64>("n_pings")?;
                cx.set("n_pings", n + 1)?;
                Ok(())
            });

        let mut project = Project::default();
        project.register_sprite_class(beacon).unwrap();
        project.register_sprite_class(counter).unwrap();

        project.do_broadcast("create-clone");
        for expected_pings in [0, 0, 1, 1, 1, 2, 2, 2] {
            project.one_frame();
            assert_eq!(n_attr(&project, "Beacon", "n_clone_reqs"), 1);
            assert_eq!(n_attr(&project, "Counter", "n_pings"), expected_pings);
        }

        project.do_broadcast("destroy-clones");
        for _ in 0..10 {
            project.one_frame();
        }
        let steady = n_attr(&project, "Counter", "n_pings");
        for _ in 0..10 {
            project.one_frame();
            assert_eq!(n_attr(&project, "Counter", "n_pings"), steady);
        }
        assert_eq!(project.actor_by_class_name("Beacon").unwrap().instances().len(), 1);
    }

    #[test]
    fn test_broadcast_and_wait_waits_for_nested_chains() {
        init_logger();
        let events = Rc::new(RefCell::new(Vec::<String>::new()));
        let recorder = |events: &Rc<RefCell<Vec<String>>>| {
            let events = events.clone();
            move |what: &str| events.borrow_mut().push(what.to_string())
        };

        let caller_log = recorder(&events);
        let caller = ActorClass::sprite("Caller").when_green_flag_clicked("go", move |cx| {
            let note = caller_log.clone();
            async move {
                note("caller start");
                cx.broadcast_and_wait("outer").await?;
                note("caller done");
                Ok(())
            }
        });
        let outer_log = recorder(&events);
        let outer = ActorClass::sprite("Outer").when_i_receive("outer", "relay", move |cx| {
            let note = outer_log.clone();
            async move {
                cx.yield_until_next_frame().await?;
                cx.broadcast_and_wait("inner").await?;
                note("outer done");
                Ok(())
            }
        });
        let inner_log = recorder(&events);
        let inner = ActorClass::sprite("Inner").when_i_receive("inner", "slow", move |cx| {
            let note = inner_log.clone();
            async move {
                cx.wait_seconds(0.1).await?;
                note("inner done");
                Ok(())
            }
        });

        let mut project = Project::default();
        for class in [caller, outer, inner] {
            project.register_sprite_class(class).unwrap();
        }
        project.on_green_flag_clicked();
        for _ in 0..30 {
            project.one_frame();
        }
        assert_eq!(
            *events.borrow(),
            vec!["caller start", "inner done", "outer done", "caller done"]
        );
        assert_eq!(project.n_thread_groups(), 0);
    }

    #[test]
    fn test_broadcast_without_receivers_resumes_next_frame() {
        let lonely = ActorClass::sprite("Lonely").when_green_flag_clicked("go", |cx| async move {
            cx.broadcast_and_wait("nobody-listens").await?;
            cx.set("done", true)?;
            Ok(())
        });
        let mut project = Project::default();
        project.register_sprite_class(lonely).unwrap();
        project.on_green_flag_clicked();
        project.one_frame();
        assert!(!flag(&project, "Lonely", "done"));
        project.one_frame();
        assert!(flag(&project, "Lonely", "done"));
    }

    #[test]
    fn test_stops_reduce_to_originals() {
        init_logger();
        type Stop = fn(&mut Project);
        let stops: [Stop; 2] = [Project::on_red_stop_clicked, Project::on_green_flag_clicked];
        for stop in stops {
            let mut project = broom_project();
            project.do_broadcast("clone-self");
            for _ in 0..3 {
                project.one_frame();
            }
            assert!(project.n_threads() > 0);
            stop(&mut project);
            assert_eq!(project.actor_by_class_name("Broom").unwrap().instances().len(), 1);
            assert_eq!(project.n_threads(), 0);
            assert_eq!(project.n_thread_groups(), 0);
        }
    }

    #[test]
    fn test_stop_all_from_thread() {
        let stopper = ActorClass::sprite("Stopper")
            .when_green_flag_clicked("spin", |cx| async move {
                loop {
                    cx.yield_until_next_frame().await?;
                }
            })
            .when_i_receive("halt", "halt", |cx| async move {
                cx.create_clone_of_self()?;
                cx.stop_all().await?;
                cx.set("after_stop", true)?;
                Ok(())
            });
        let mut project = Project::default();
        project.register_sprite_class(stopper).unwrap();
        project.on_green_flag_clicked();
        project.one_frame();
        project.do_broadcast("halt");
        project.one_frame();

        assert_eq!(project.n_threads(), 0);
        assert_eq!(project.n_thread_groups(), 0);
        assert_eq!(project.actor_by_class_name("Stopper").unwrap().instances().len(), 1);
        assert!(!flag(&project, "Stopper", "after_stop"));
    }

    #[test]
    fn test_green_flag_starts_handlers_next_frame() {
        let counter = ActorClass::sprite("Counter").when_green_flag_clicked("count", |cx| async move {
            cx.set("ran", true)?;
            Ok(())
        });
        let mut project = Project::default();
        project.register_sprite_class(counter).unwrap();
        project.on_green_flag_clicked();
        assert_eq!(project.threads_info().len(), 1);
        assert!(!flag(&project, "Counter", "ran"));
        project.one_frame();
        assert!(flag(&project, "Counter", "ran"));
    }

    #[test]
    fn test_clone_z_order() {
        let ball = ActorClass::sprite("Ball")
            .costume("ball", "ball.png", 5.0, 5.0)
            .when_i_receive("split", "split", |cx| async move {
                if !cx.is_clone()? {
                    let first = cx.create_clone_of_self()?;
                    cx.create_clone_of(CloneSource::Instance(first))?;
                }
                Ok(())
            });
        let mut project = Project::default();
        project.register_sprite_class(ball).unwrap();
        let original = project.instance_0_by_class_name("Ball").unwrap();
        project.do_broadcast("split");
        project.one_frame();

        let order: Vec<InstanceId> = project
            .rendering_instructions()
            .iter()
            .map(|r| r.instance())
            .collect();
        let instances = project.actor_by_class_name("Ball").unwrap().instances().to_vec();
        assert_eq!(order, instances);
        assert_eq!(instances.len(), 3);
        assert_eq!(instances[2], original);
        let first = project.instance(instances[1]).unwrap();
        let second = project.instance(instances[0]).unwrap();
        assert_eq!(first.parent(), Some(original));
        assert_eq!(second.parent(), Some(first.id()));
    }

    #[test]
    fn test_position_sequence_across_frames() {
        let walker = ActorClass::sprite("Walker").when_green_flag_clicked("walk", |cx| async move {
            cx.go_to_xy(10.0, 20.0)?;
            cx.yield_until_next_frame().await?;
            cx.set_x(100.0)?;
            cx.yield_until_next_frame().await?;
            cx.set_y(-40.0)?;
            cx.yield_until_next_frame().await?;
            cx.change_x(10.0)?;
            cx.yield_until_next_frame().await?;
            cx.change_y(-30.0)?;
            Ok(())
        });
        let mut project = Project::default();
        project.register_sprite_class(walker).unwrap();
        let id = project.instance_0_by_class_name("Walker").unwrap();
        project.on_green_flag_clicked();

        for expected in [(10.0, 20.0), (100.0, 20.0), (100.0, -40.0), (110.0, -40.0), (110.0, -70.0)] {
            project.one_frame();
            let walker = project.instance(id).unwrap();
            assert_eq!((walker.x(), walker.y()), expected);
        }
    }

    #[test]
    fn test_deleting_original_is_noop() {
        let solo = ActorClass::sprite("Solo").when_green_flag_clicked("try_delete", |cx| async move {
            cx.delete_this_clone().await?;
            cx.set("carried_on", true)?;
            Ok(())
        });
        let mut project = Project::default();
        project.register_sprite_class(solo).unwrap();
        project.on_green_flag_clicked();
        project.one_frame();
        assert!(flag(&project, "Solo", "carried_on"));
        assert_eq!(project.actor_by_class_name("Solo").unwrap().instances().len(), 1);
        assert!(project.take_errors().is_empty());
    }

    #[test]
    fn test_double_delete_in_one_frame() {
        let twin = ActorClass::sprite("Twin")
            .when_i_receive("spawn", "spawn", |cx| async move {
                cx.create_clone_of_self()?;
                Ok(())
            })
            .when_i_receive("vanish", "vanish_a", |cx| async move {
                cx.delete_this_clone().await?;
                Ok(())
            })
            .when_i_receive("vanish", "vanish_b", |cx| async move {
                cx.delete_this_clone().await?;
                Ok(())
            });
        let mut project = Project::default();
        project.register_sprite_class(twin).unwrap();
        project.do_broadcast("spawn");
        project.one_frame();
        assert_eq!(project.actor_by_class_name("Twin").unwrap().instances().len(), 2);

        project.do_broadcast("vanish");
        project.one_frame();
        assert_eq!(project.actor_by_class_name("Twin").unwrap().instances().len(), 1);
        assert!(project.take_errors().is_empty());
        assert_eq!(project.n_thread_groups(), 0);
    }

    #[test]
    fn test_ask_and_answer() {
        init_logger();
        let asker = ActorClass::sprite("Asker").when_green_flag_clicked("ask", |cx| async move {
            let name = cx.ask_and_wait(Some("What is your name?")).await?;
            cx.set("name", name)?;
            Ok(())
        });
        let mut project = Project::default();
        project.register_sprite_class(asker).unwrap();
        project.on_green_flag_clicked();
        assert!(project.current_question().is_none());

        for _ in 0..3 {
            project.one_frame();
        }
        let question = project.current_question().unwrap();
        assert_eq!(question.prompt.as_deref(), Some("What is your name?"));
        assert_eq!(
            project.threads_info()[0].state,
            ThreadState::AwaitingAnswer(question.id)
        );

        project.deliver_answer("Ada").unwrap();
        assert!(project.current_question().is_none());
        project.one_frame();
        let id = project.instance_0_by_class_name("Asker").unwrap();
        assert_eq!(
            project.instance(id).unwrap().get_as::<String>("name"),
            Some("Ada".to_string())
        );
        assert!(matches!(
            project.deliver_answer("again"),
            Err(Error::NoPendingQuestion)
        ));
    }

    #[test]
    fn test_questions_are_queued() {
        let quiz = ActorClass::sprite("Quiz")
            .when_green_flag_clicked("first", |cx| async move {
                let a = cx.ask_and_wait(Some("one")).await?;
                cx.set("first", a)?;
                Ok(())
            })
            .when_green_flag_clicked("second", |cx| async move {
                let a = cx.ask_and_wait(None).await?;
                cx.set("second", a)?;
                Ok(())
            });
        let mut project = Project::default();
        project.register_sprite_class(quiz).unwrap();
        project.on_green_flag_clicked();
        project.one_frame();

        assert_eq!(project.current_question().unwrap().prompt.as_deref(), Some("one"));
        project.deliver_answer("1").unwrap();
        assert_eq!(project.current_question().unwrap().prompt, None);
        project.deliver_answer("2").unwrap();
        project.one_frame();

        let quiz = project.instances_of("Quiz").unwrap().remove(0);
        assert_eq!(quiz.get_as::<String>("first").as_deref(), Some("1"));
        assert_eq!(quiz.get_as::<String>("second").as_deref(), Some("2"));
    }

    #[test]
    fn test_new_rejects_bad_config() {
        for frame_rate in [0.0, -5.0, f64::NAN] {
            let config = RuntimeConfig {
                frame_rate,
                ..RuntimeConfig::default()
            };
            assert!(matches!(Project::new(config), Err(Error::Config(_))));
        }
    }

    #[test]
    fn test_wait_seconds_counts_frame_time() {
        let config = RuntimeConfig {
            frame_rate: 10.0,
            ..RuntimeConfig::default()
        };
        let sleeper = ActorClass::sprite("Sleeper").when_green_flag_clicked("nap", |cx| async move {
            cx.wait_seconds(0.5).await?;
            cx.set("awake", true)?;
            Ok(())
        });
        let mut project = Project::new(config).unwrap();
        project.register_sprite_class(sleeper).unwrap();
        project.on_green_flag_clicked();
        for _ in 0..5 {
            project.one_frame();
            assert!(!flag(&project, "Sleeper", "awake"));
        }
        project.one_frame();
        assert!(flag(&project, "Sleeper", "awake"));
    }

    #[test]
    fn test_very_long_wait_shows_in_threads_info() {
        let sleeper = ActorClass::sprite("Sleeper").when_green_flag_clicked("hibernate", |cx| async move {
            cx.wait_seconds(1e20).await?;
            Ok(())
        });
        let mut project = Project::default();
        project.register_sprite_class(sleeper).unwrap();
        project.on_green_flag_clicked();
        project.one_frame();
        let info = project.threads_info();
        assert_eq!(info.len(), 1);
        assert!(info[0].state.to_string().starts_with("waiting"));
        assert!(info[0].to_string().contains("hibernate"));
    }

    #[test]
    fn test_failing_thread_is_isolated() {
        init_logger();
        let fragile = ActorClass::sprite("Fragile")
            .costume("plain", "plain.png", 0.0, 0.0)
            .when_green_flag_clicked("bad_costume", |cx| async move {
                cx.switch_costume("sparkly")?;
                cx.set("unreachable", true)?;
                Ok(())
            })
            .when_green_flag_clicked("fine", |cx| async move {
                cx.set("fine", true)?;
                Ok(())
            });
        let mut project = Project::default();
        project.register_sprite_class(fragile).unwrap();
        project.on_green_flag_clicked();
        project.one_frame();

        assert!(flag(&project, "Fragile", "fine"));
        assert!(!flag(&project, "Fragile", "unreachable"));
        let errors = project.take_errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("could not find costume \"sparkly\""));
        match &errors[0].context {
            ErrorContext::Thread { handler, class_name, .. } => {
                assert_eq!(handler, "bad_costume");
                assert_eq!(class_name, "Fragile");
            }
            other => panic!("unexpected context {:?}", other),
        }
        assert!(project.take_errors().is_empty());
    }

    #[test]
    fn test_clone_of_stage_is_reported() {
        let stage = ActorClass::stage("Backdrop");
        let cloner = ActorClass::sprite("Cloner").when_green_flag_clicked("clone_stage", |cx| async move {
            cx.create_clone_of(CloneSource::Class("Backdrop".into()))?;
            Ok(())
        });
        let mut project = Project::default();
        project.register_stage_class(stage).unwrap();
        project.register_sprite_class(cloner).unwrap();
        project.on_green_flag_clicked();
        project.one_frame();
        let errors = project.take_errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("must be a registered Sprite"));
    }

    #[test]
    fn test_registration_errors() {
        let mut project = Project::default();
        project.register_stage_class(ActorClass::stage("Stage")).unwrap();
        assert!(matches!(
            project.register_stage_class(ActorClass::stage("Other")),
            Err(Error::Registration(RegistrationError::SecondStage(_)))
        ));
        project.register_sprite_class(ActorClass::sprite("Cat")).unwrap();
        assert!(matches!(
            project.register_sprite_class(ActorClass::sprite("Cat")),
            Err(Error::Registration(RegistrationError::DuplicateClassName(_)))
        ));
        assert!(matches!(
            project.register_sprite_class(ActorClass::stage("Dog")),
            Err(Error::Registration(RegistrationError::WrongKind { .. }))
        ));
        assert!(matches!(
            project.actor_by_class_name("Dog"),
            Err(Error::UnknownActor(_))
        ));
    }

    #[test]
    fn test_key_and_click_triggers() {
        init_logger();
        let keyboard = VirtualKeyboard::new();
        let pointer = VirtualPointer::new();
        let ball = ActorClass::sprite("Ball")
            .costume("ball", "ball.png", 10.0, 10.0)
            .when_key_pressed("a", "on_a", |cx| async move {
                cx.set("saw_a", true)?;
                cx.set("up_held", cx.key_pressed("ArrowUp")?)?;
                Ok(())
            })
            .when_this_sprite_clicked("clicked", |cx| async move {
                cx.set("clicked", true)?;
                Ok(())
            })
            .when_key_pressed("b", "bad_key", |cx| async move {
                cx.key_pressed("arrow-up")?;
                Ok(())
            });
        let stage = ActorClass::stage("Stage").when_stage_clicked("stage_clicked", |cx| async move {
            cx.set("clicked", true)?;
            Ok(())
        });

        let mut project = Project::default();
        project.register_stage_class(stage).unwrap();
        project.register_sprite_class(ball).unwrap();
        project.set_keyboard(Box::new(keyboard.clone()));
        project.set_pointer(Box::new(pointer.clone()));
        assert_eq!(
            project.load_assets(&InMemoryLoader::new().with_image("ball.png", 20.0, 20.0)),
            0
        );

        keyboard.press("ArrowUp");
        keyboard.press("a");
        project.one_frame();
        assert!(flag(&project, "Ball", "saw_a"));
        assert!(flag(&project, "Ball", "up_held"));

        pointer.click(5.0, -5.0);
        project.one_frame();
        assert!(flag(&project, "Ball", "clicked"));
        assert!(!flag(&project, "Stage", "clicked"));

        pointer.click(100.0, 100.0);
        project.one_frame();
        assert!(flag(&project, "Stage", "clicked"));

        keyboard.press("b");
        project.one_frame();
        let errors = project.take_errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("ArrowUp"));
    }

    #[test]
    fn test_touching() {
        let sprite = |name: &str, x: f64| {
            ActorClass::sprite(name)
                .costume("box", "box.png", 10.0, 10.0)
                .init(move |inst| {
                    inst.go_to_xy(x, 0.0);
                    Ok(())
                })
        };
        let scout = sprite("Scout", 0.0).when_green_flag_clicked("look", |cx| async move {
            cx.set("near", cx.touching("Near")?)?;
            cx.set("far", cx.touching("Far")?)?;
            Ok(())
        });
        let mut project = Project::default();
        project.register_sprite_class(scout).unwrap();
        project.register_sprite_class(sprite("Near", 15.0)).unwrap();
        project.register_sprite_class(sprite("Far", 50.0)).unwrap();
        project.load_assets(&InMemoryLoader::new().with_image("box.png", 20.0, 20.0));
        project.on_green_flag_clicked();
        project.one_frame();
        assert!(flag(&project, "Scout", "near"));
        assert!(!flag(&project, "Scout", "far"));
    }

    #[test]
    fn test_watchers() {
        let scorer = ActorClass::sprite("Scorer")
            .when_green_flag_clicked("show", |cx| async move {
                cx.set("score", 3_i64)?;
                let position = WatcherPosition {
                    top: Some(10.0),
                    left: Some(5.0),
                    ..Default::default()
                };
                cx.show_variable("score", Some("Score"), position)?;
                cx.yield_until_next_frame().await?;
                cx.hide_variable("score");
                Ok(())
            })
            .when_i_receive("bad", "bad_position", |cx| async move {
                let position = WatcherPosition {
                    left: Some(1.0),
                    right: Some(1.0),
                    ..Default::default()
                };
                cx.show_variable("score", None, position)?;
                Ok(())
            });
        let mut project = Project::default();
        project.register_sprite_class(scorer).unwrap();
        project.on_green_flag_clicked();
        project.one_frame();

        let watchers = project.attribute_watchers();
        assert_eq!(watchers.len(), 1);
        assert_eq!(watchers[0].label, "Score");
        assert_eq!(watchers[0].value.as_deref(), Some("3"));
        assert_eq!(watchers[0].position.top, Some(10.0));

        project.one_frame();
        assert!(project.attribute_watchers().is_empty());

        project.do_broadcast("bad");
        project.one_frame();
        let errors = project.take_errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("\"left\" and \"right\""));
    }

    #[derive(Default)]
    struct BusLog {
        played: Vec<(String, String)>,
        gains: Vec<(String, f64)>,
        finished: bool,
        stops: usize,
    }

    #[derive(Clone, Default)]
    struct RecordingBus(Rc<RefCell<BusLog>>);

    impl MixBus for RecordingBus {
        fn play(&mut self, bus: &str, locator: &str) -> PerformanceId {
            let mut log = self.0.borrow_mut();
            log.played.push((bus.to_string(), locator.to_string()));
            PerformanceId(log.played.len() as u64)
        }

        fn status(&self, _performance: PerformanceId) -> PerformanceStatus {
            if self.0.borrow().finished {
                PerformanceStatus::Finished
            } else {
                PerformanceStatus::Playing
            }
        }

        fn set_gain(&mut self, bus: &str, gain: f64) {
            self.0.borrow_mut().gains.push((bus.to_string(), gain));
        }

        fn stop_all_performances(&mut self) {
            self.0.borrow_mut().stops += 1;
        }
    }

    #[test]
    fn test_sound() {
        init_logger();
        let bus = RecordingBus::default();
        let band = ActorClass::sprite("Band")
            .sound("trumpet", "trumpet.mp3")
            .when_green_flag_clicked("play", |cx| async move {
                cx.set_sound_volume(2.0);
                cx.play_sound_until_done("trumpet").await?;
                cx.set("done", true)?;
                cx.start_sound("violin")?;
                Ok(())
            });
        let mut project = Project::default();
        project.register_sprite_class(band).unwrap();
        project.set_mix_bus(Box::new(bus.clone()));
        let band_id = project.instance_0_by_class_name("Band").unwrap();
        let bus_id = format!("Band-{}", band_id.as_u64());

        project.on_green_flag_clicked();
        project.one_frame();
        project.one_frame();
        assert!(!flag(&project, "Band", "done"));
        assert_eq!(project.sound_volume(band_id), 1.0);
        assert_eq!(bus.0.borrow().played, vec![(bus_id.clone(), "trumpet.mp3".to_string())]);
        assert_eq!(bus.0.borrow().gains, vec![(bus_id, 1.0)]);

        bus.0.borrow_mut().finished = true;
        project.one_frame();
        assert!(flag(&project, "Band", "done"));
        let errors = project.take_errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("could not find sound \"violin\""));

        let stops_before = bus.0.borrow().stops;
        project.on_red_stop_clicked();
        assert_eq!(bus.0.borrow().stops, stops_before + 1);
    }

    #[test]
    fn test_loop_rate_control() {
        let racer = ActorClass::sprite("Racer").when_green_flag_clicked("race", |cx| async move {
            cx.set("laps", 0_i64)?;
            cx.push_loop_iterations_per_frame(3);
            for lap in 1..=6_i64 {
                cx.set("laps", lap)?;
                cx.yield_until_next_frame().await?;
            }
            cx.pop_loop_iterations_per_frame();
            cx.pop_loop_iterations_per_frame();
            Ok(())
        });
        let mut project = Project::default();
        project.register_sprite_class(racer).unwrap();
        project.on_green_flag_clicked();
        project.one_frame();
        assert_eq!(n_attr(&project, "Racer", "laps"), 3);
        project.one_frame();
        assert_eq!(n_attr(&project, "Racer", "laps"), 6);
    }

    #[test]
    fn test_asset_failures_reported_once() {
        let ghost = ActorClass::sprite("Ghost")
            .costume("boo", "boo.png", 0.0, 0.0)
            .sound("wail", "wail.mp3");
        let mut project = Project::default();
        project.register_sprite_class(ghost).unwrap();
        project.load_assets(&InMemoryLoader::new().with_image("boo.png", 8.0, 8.0));
        let errors = project.take_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].context, ErrorContext::AssetLoad);
        assert!(errors[0].message.contains("wail.mp3"));

        project.one_frame();
        assert!(project.take_errors().is_empty());
    }

    #[test]
    fn test_speech_bubble_follows_image() {
        let talker = ActorClass::sprite("Talker")
            .costume("face", "face.png", 10.0, 10.0)
            .when_green_flag_clicked("talk", |cx| async move {
                cx.say("hello")?;
                Ok(())
            });
        let mut project = Project::default();
        project.register_sprite_class(talker).unwrap();
        project.load_assets(&InMemoryLoader::new().with_image("face.png", 20.0, 20.0));
        project.on_green_flag_clicked();
        project.one_frame();

        let instructions = project.rendering_instructions();
        assert_eq!(instructions.len(), 2);
        assert!(matches!(instructions[0], RenderInstruction::Image { .. }));
        match &instructions[1] {
            RenderInstruction::SpeechBubble { content, tip_y, .. } => {
                assert_eq!(content, "hello");
                assert_eq!(*tip_y, 10.0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_threads_info_describes_waits() {
        let waiter = ActorClass::sprite("Waiter").when_green_flag_clicked("wait", |cx| async move {
            cx.wait_seconds(2.0).await?;
            Ok(())
        });
        let mut project = Project::default();
        project.register_sprite_class(waiter).unwrap();
        project.on_green_flag_clicked();
        project.one_frame();
        let info = project.threads_info();
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].class_name, "Waiter");
        assert_eq!(info[0].handler, "wait");
        assert!(matches!(info[0].state, ThreadState::AwaitingTimer { .. }));
        assert!(info[0].to_string().contains("Waiter"));
    }

    #[test]
    fn test_projects_are_independent() {
        let mut a = broom_project();
        let b = broom_project();
        a.do_broadcast("clone-self");
        a.one_frame();
        assert_eq!(a.actor_by_class_name("Broom").unwrap().instances().len(), 2);
        assert_eq!(b.actor_by_class_name("Broom").unwrap().instances().len(), 1);
    }

    #[test]
    fn test_import_loop_guard() {
        let mut project = Project::default();
        project.set_max_import_loop_iterations(2);
        project.note_import_loop_iteration().unwrap();
        project.note_import_loop_iteration().unwrap();
        assert!(matches!(
            project.note_import_loop_iteration(),
            Err(Error::RunawayLoop { .. })
        ));
    }
}
