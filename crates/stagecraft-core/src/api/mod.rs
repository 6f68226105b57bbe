//! Rhai scripting front end.
//!
//! A project script declares its actor classes at the top level and defines
//! their handlers as plain functions. [`load_project`] runs the top level
//! once, registers what it declared, and hands back a ready [`Project`].
//!
//! # Usage
//!
//! ```ignore
//! let mut project = load_project(source, RuntimeConfig::default())?;
//! project.on_green_flag_clicked();
//! loop {
//!     project.one_frame();
//! }
//! ```
//!
//! Inside a handler, `this` is the instance the thread runs for. Handlers
//! pause by returning a directive such as `next_frame("again")` or
//! `wait_seconds(0.5, "after")`; see [`directive`].

pub mod declare;
pub mod directive;
pub mod instance;

use rhai::{Dynamic, Engine, EvalAltResult, INT};
use std::cell::RefCell;
use std::rc::Rc;

use crate::actor::ActorKindTag;
use crate::config::{RuntimeConfig, DEFAULT_MAX_SCRIPT_OPERATIONS};
use crate::error::{Error, Result};
use crate::project::Project;
use crate::world::SharedWorld;
use declare::ActorDecl;
use directive::{Directive, ScriptRunner};

/// What the top level of a script has declared so far.
#[derive(Default)]
struct LoadState {
    /// Present only while the top level runs.
    world: Option<SharedWorld>,
    declared: Vec<ActorDecl>,
    failure: Option<Error>,
}

type SharedLoadState = Rc<RefCell<LoadState>>;

/// Create a Rhai engine with the Stagecraft API registered.
pub fn create_engine() -> Engine {
    let mut engine = Engine::new();

    engine.set_max_expr_depths(4096, 4096);
    engine.set_max_call_levels(4096);
    engine.set_max_operations(DEFAULT_MAX_SCRIPT_OPERATIONS);

    engine.on_print(|text| {
        log::info!("[SCRIPT] {}", text);
    });

    engine.on_debug(|text, source, pos| {
        let loc = match (source, pos) {
            (Some(src), pos) if !pos.is_none() => format!(" ({}:{})", src, pos),
            (Some(src), _) => format!(" ({})", src),
            (None, pos) if !pos.is_none() => format!(" ({})", pos),
            _ => String::new(),
        };
        log::debug!("[SCRIPT]{} {}", loc, text);
    });

    declare::register(&mut engine);
    directive::register(&mut engine);
    instance::register(&mut engine);

    engine
}

fn register_loading(engine: &mut Engine, state: SharedLoadState) {
    let s = state.clone();
    engine.register_fn("register", move |decl: ActorDecl| -> std::result::Result<(), Box<EvalAltResult>> {
        let mut s = s.borrow_mut();
        if s.world.is_none() {
            return Err("register() can only be used at the top level of the script".into());
        }
        log::debug!("[SCRIPT] declared {} \"{}\"", decl.kind(), decl.name());
        s.declared.push(decl);
        Ok(())
    });

    let s = state.clone();
    engine.register_fn("set_max_import_loop_iterations", move |max: INT| {
        if let Some(world) = &s.borrow().world {
            world.with_world_mut(|w| w.config.max_import_loop_iterations = max.max(0) as u64);
        }
    });

    // At the top level this only counts loop iterations; inside a handler
    // it is the same as next_frame().
    let s = state;
    engine.register_fn("yield_until_next_frame", move || -> std::result::Result<Dynamic, Box<EvalAltResult>> {
        let mut s = s.borrow_mut();
        let counted = match &s.world {
            Some(world) => world.with_world_mut(|w| w.note_import_loop_iteration()),
            None => return Ok(Dynamic::from(Directive::next_frame())),
        };
        match counted {
            Ok(()) => Ok(Dynamic::UNIT),
            Err(e) => {
                let message = e.to_string();
                s.failure = Some(e);
                Err(message.into())
            }
        }
    });
}

/// Run a project script and register every actor class it declares.
pub fn load_project(source: &str, config: RuntimeConfig) -> Result<Project> {
    let max_operations = config.max_script_operations;
    let mut project = Project::new(config)?;
    let state = Rc::new(RefCell::new(LoadState {
        world: Some(project.shared_world()),
        ..Default::default()
    }));

    let mut engine = create_engine();
    engine.set_max_operations(max_operations);
    register_loading(&mut engine, state.clone());

    let ast = engine
        .compile(source)
        .map_err(|e| Error::Script(e.to_string()))?;
    let outcome = engine.run_ast(&ast);

    let (declared, failure) = {
        let mut s = state.borrow_mut();
        s.world = None;
        (std::mem::take(&mut s.declared), s.failure.take())
    };
    if let Some(err) = failure {
        return Err(err);
    }
    outcome.map_err(|e| Error::Script(e.to_string()))?;

    let runner = Rc::new(ScriptRunner::new(Rc::new(engine), Rc::new(ast)));
    for decl in declared {
        let kind = decl.kind();
        let class = decl.into_class(&runner)?;
        match kind {
            ActorKindTag::Sprite => project.register_sprite_class(class)?,
            ActorKindTag::Stage => project.register_stage_class(class)?,
        };
    }
    log::info!("[SCRIPT] project loaded");
    Ok(project)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistrationError;
    use crate::thread::ThreadState;

    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn x_of(project: &Project, class_name: &str) -> f64 {
        let id = project.instance_0_by_class_name(class_name).unwrap();
        project.instance(id).unwrap().x()
    }

    #[test]
    fn test_handler_moves_over_frames() {
        init_logs();
        let mut project = load_project(
            r#"
            fn start() {
                this.change_x(10);
                next_frame("again")
            }
            fn again() {
                this.change_x(10);
            }
            register(sprite("Ball").go_to_xy(5, 0).when("green-flag", "start"));
            "#,
            RuntimeConfig::default(),
        )
        .unwrap();

        assert_eq!(x_of(&project, "Ball"), 5.0);
        project.on_green_flag_clicked();
        project.one_frame();
        assert_eq!(x_of(&project, "Ball"), 15.0);
        project.one_frame();
        assert_eq!(x_of(&project, "Ball"), 25.0);
        assert_eq!(project.n_threads(), 0);
    }

    #[test]
    fn test_clone_copies_attributes() {
        init_logs();
        let mut project = load_project(
            r#"
            fn clone_self() {
                this.create_clone_of_self();
            }
            fn bump() {
                this.set("copied_id", this["copied_id"] + 1);
            }
            register(
                sprite("Alien")
                    .set("copied_id", 42)
                    .when("message", "clone-self", "clone_self")
                    .when("clone", "bump")
            );
            "#,
            RuntimeConfig::default(),
        )
        .unwrap();

        project.do_broadcast("clone-self");
        project.one_frame();
        project.one_frame();

        let aliens = project.instances_of("Alien").unwrap();
        assert_eq!(aliens.len(), 2);
        let (clones, originals): (Vec<_>, Vec<_>) = aliens.iter().partition(|a| a.is_clone());
        assert_eq!(originals[0].get_as::<INT>("copied_id"), Some(42));
        assert_eq!(clones[0].get_as::<INT>("copied_id"), Some(43));
    }

    #[test]
    fn test_answer_reaches_continuation() {
        init_logs();
        let mut project = load_project(
            r#"
            fn ask() {
                ask_and_wait("What is your name?", "got")
            }
            fn got(answer) {
                this.set("name", answer);
            }
            register(sprite("Cat").when("green-flag", "ask"));
            "#,
            RuntimeConfig::default(),
        )
        .unwrap();

        project.on_green_flag_clicked();
        project.one_frame();
        let question = project.current_question().unwrap();
        assert_eq!(question.prompt.as_deref(), Some("What is your name?"));
        assert!(matches!(
            project.threads_info()[0].state,
            ThreadState::AwaitingAnswer(_)
        ));

        project.deliver_answer("Ben").unwrap();
        project.one_frame();
        let cat = project.instances_of("Cat").unwrap().remove(0);
        assert_eq!(cat.get("name").map(|v| v.to_string()), Some("Ben".to_string()));
        assert_eq!(project.n_threads(), 0);
    }

    #[test]
    fn test_runaway_top_level_loop() {
        init_logs();
        let result = load_project(
            r#"
            set_max_import_loop_iterations(5);
            loop {
                yield_until_next_frame();
            }
            "#,
            RuntimeConfig::default(),
        );
        assert!(matches!(
            result,
            Err(Error::RunawayLoop {
                iterations: 6,
                max: 5
            })
        ));
    }

    #[test]
    fn test_unknown_event_type() {
        init_logs();
        let result = load_project(
            r#"
            fn start() {}
            register(sprite("A").when("jump", "start"));
            "#,
            RuntimeConfig::default(),
        );
        assert!(matches!(
            result,
            Err(Error::Registration(RegistrationError::UnknownEventType(ref e))) if e == "jump"
        ));
    }

    #[test]
    fn test_unknown_handler_function() {
        init_logs();
        let result = load_project(
            r#"register(sprite("A").when("green-flag", "missing"));"#,
            RuntimeConfig::default(),
        );
        assert!(matches!(
            result,
            Err(Error::Registration(RegistrationError::UnknownHandler { ref function, .. }))
                if function == "missing"
        ));
    }

    #[test]
    fn test_script_errors() {
        init_logs();
        assert!(matches!(
            load_project("fn (", RuntimeConfig::default()),
            Err(Error::Script(_))
        ));
        assert!(matches!(
            load_project(r#"throw "nope";"#, RuntimeConfig::default()),
            Err(Error::Script(_))
        ));
    }

    #[test]
    fn test_failing_handler_is_reported() {
        init_logs();
        let mut project = load_project(
            r#"
            fn start() {
                this.switch_costume("missing");
            }
            register(sprite("A").costume("a", "a.png").when("green-flag", "start"));
            "#,
            RuntimeConfig::default(),
        )
        .unwrap();

        project.on_green_flag_clicked();
        project.one_frame();
        let errors = project.take_errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("could not find costume \"missing\""));
        assert_eq!(project.n_threads(), 0);
    }

    #[test]
    fn test_register_inside_handler_fails() {
        init_logs();
        let mut project = load_project(
            r#"
            fn start() {
                register(sprite("Late"));
            }
            register(stage("Stage").when("green-flag", "start"));
            "#,
            RuntimeConfig::default(),
        )
        .unwrap();

        project.on_green_flag_clicked();
        project.one_frame();
        let errors = project.take_errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("top level"));
        assert!(project.actor_by_class_name("Late").is_err());
    }

    #[test]
    fn test_busy_handler_fails_without_hanging() {
        init_logs();
        let config = RuntimeConfig {
            max_script_operations: 10_000,
            ..RuntimeConfig::default()
        };
        let mut project = load_project(
            r#"
            fn spin() {
                loop {
                    this.change_x(1);
                    yield_until_next_frame();
                }
            }
            register(sprite("Ball").when("green-flag", "spin"));
            "#,
            config,
        )
        .unwrap();

        project.on_green_flag_clicked();
        project.one_frame();
        let errors = project.take_errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.to_lowercase().contains("operations"));
        assert_eq!(project.n_threads(), 0);
        assert!(x_of(&project, "Ball") > 0.0);
    }

    #[test]
    fn test_discarded_directive_is_reported() {
        init_logs();
        let mut project = load_project(
            r#"
            fn start() {
                next_frame();
                this.change_x(10);
            }
            register(sprite("Ball").when("green-flag", "start"));
            "#,
            RuntimeConfig::default(),
        )
        .unwrap();

        project.on_green_flag_clicked();
        project.one_frame();
        let errors = project.take_errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("when returned"));
        assert_eq!(project.n_threads(), 0);
    }
}
