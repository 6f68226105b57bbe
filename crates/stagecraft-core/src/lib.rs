//! Stagecraft Core - a cooperative actor runtime for block-style programs.
//!
//! This crate runs Scratch-like projects: sprites and a stage, each with
//! handlers that react to the green flag, broadcasts, clones, key presses
//! and clicks. Every handler runs as a cooperative thread, and the host
//! advances the whole project one frame at a time.
//!
//! - **Actors** - [`ActorClass`] registration tables, [`ActorKind`] and
//!   their [`ActorInstance`]s (originals and clones)
//! - **Threads** - handler computations that pause on [`Suspension`]s
//! - **Syscalls** - [`ThreadContext`], the only way a handler touches its
//!   project
//! - **Scheduler** - [`Project`] and its frame loop
//! - **Rendering** - [`RenderInstruction`] lists and watcher snapshots
//! - **API** - a Rhai front end for writing projects as scripts
//!
//! # Architecture
//!
//! There is no global state. A [`Project`] owns its threads plus a shared
//! world (instances, thread groups, spawn requests, watchers, questions);
//! each thread's [`ThreadContext`] holds a handle to that world. Syscalls
//! that pause record what they wait for and return control to the
//! scheduler, which decides when the thread runs again.
//!
//! ```ignore
//! let mut project = Project::new(RuntimeConfig::default())?;
//! project.register_sprite_class(
//!     ActorClass::sprite("Ball").when_green_flag_clicked("go", |cx| async move {
//!         cx.change_x(10.0)?;
//!         cx.yield_until_next_frame().await?;
//!         cx.change_x(10.0)?;
//!         Ok(())
//!     }),
//! )?;
//! project.on_green_flag_clicked();
//! project.one_frame();
//! ```

pub mod actor;
pub mod api;
pub mod assets;
pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod input;
pub mod instance;
pub mod keys;
pub mod project;
pub mod render;
pub mod sound;
pub mod thread;
pub mod trigger;
mod world;

pub use actor::{ActorClass, ActorId, ActorKind, ActorKindTag, Costume, Sound};
pub use api::{create_engine, load_project};
pub use assets::{AssetHandle, AssetKind, AssetLoader, InMemoryLoader, PendingAsset};
pub use config::{RuntimeConfig, StageSettings};
pub use context::ThreadContext;
pub use error::{
    AssetError, Error, ErrorContext, ErrorReport, RegistrationError, Result, SyscallError,
};
pub use handler::{handler, EventHandler, EventHandlerGroup, HandlerFn};
pub use input::{Keyboard, Pointer, StagePoint, VirtualKeyboard, VirtualPointer};
pub use instance::{ActorInstance, Appearance, BoundingBox, InstanceId};
pub use project::{Project, QuestionPrompt};
pub use render::{RenderInstruction, WatcherPosition, WatcherSnapshot};
pub use sound::{MixBus, PerformanceId, PerformanceStatus, SilentMixBus};
pub use thread::{GroupId, QuestionId, Suspension, ThreadId, ThreadInfo, ThreadState};
pub use trigger::Trigger;
pub use world::CloneSource;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projects_are_independent() {
        let mut a = Project::default();
        let b = Project::default();
        a.register_sprite_class(ActorClass::sprite("Ball")).unwrap();
        assert!(a.actor_by_class_name("Ball").is_ok());
        assert!(matches!(
            b.actor_by_class_name("Ball"),
            Err(Error::UnknownActor(_))
        ));
    }
}
