//! `this` inside a scripted handler.

use rhai::{Array, Dynamic, Engine, EvalAltResult, ImmutableString, Map, INT};

use super::directive::number;
use crate::context::ThreadContext;
use crate::error::SyscallError;
use crate::render::WatcherPosition;
use crate::world::CloneSource;

type RhaiResult<T> = Result<T, Box<EvalAltResult>>;

fn fail(e: SyscallError) -> Box<EvalAltResult> {
    e.to_string().into()
}

/// The instance a scripted thread runs for.
#[derive(Clone)]
pub struct ScriptInstance {
    cx: ThreadContext,
}

impl ScriptInstance {
    pub(crate) fn new(cx: ThreadContext) -> Self {
        Self { cx }
    }

    pub fn get(&mut self, name: &str) -> RhaiResult<Dynamic> {
        self.cx.get(name).map_err(fail)
    }

    pub fn set(&mut self, name: &str, value: Dynamic) -> RhaiResult<()> {
        self.cx.set_dynamic(name, value).map_err(fail)
    }

    pub fn instance_id(&mut self) -> INT {
        self.cx.instance_id().as_u64() as INT
    }

    pub fn is_clone(&mut self) -> RhaiResult<bool> {
        self.cx.is_clone().map_err(fail)
    }

    pub fn class_name(&mut self) -> RhaiResult<String> {
        self.cx.class_name().map_err(fail)
    }

    pub fn x(&mut self) -> RhaiResult<f64> {
        self.cx.x().map_err(fail)
    }

    pub fn y(&mut self) -> RhaiResult<f64> {
        self.cx.y().map_err(fail)
    }

    pub fn go_to_xy(&mut self, x: Dynamic, y: Dynamic) -> RhaiResult<()> {
        let (x, y) = (number(&x, "x")?, number(&y, "y")?);
        self.cx.go_to_xy(x, y).map_err(fail)
    }

    pub fn set_x(&mut self, x: Dynamic) -> RhaiResult<()> {
        let x = number(&x, "x")?;
        self.cx.set_x(x).map_err(fail)
    }

    pub fn set_y(&mut self, y: Dynamic) -> RhaiResult<()> {
        let y = number(&y, "y")?;
        self.cx.set_y(y).map_err(fail)
    }

    pub fn change_x(&mut self, dx: Dynamic) -> RhaiResult<()> {
        let dx = number(&dx, "dx")?;
        self.cx.change_x(dx).map_err(fail)
    }

    pub fn change_y(&mut self, dy: Dynamic) -> RhaiResult<()> {
        let dy = number(&dy, "dy")?;
        self.cx.change_y(dy).map_err(fail)
    }

    pub fn set_size(&mut self, size: Dynamic) -> RhaiResult<()> {
        let size = number(&size, "size")?;
        self.cx.set_size(size).map_err(fail)
    }

    pub fn show(&mut self) -> RhaiResult<()> {
        self.cx.show().map_err(fail)
    }

    pub fn hide(&mut self) -> RhaiResult<()> {
        self.cx.hide().map_err(fail)
    }

    pub fn turn_degrees(&mut self, degrees: Dynamic) -> RhaiResult<()> {
        let degrees = number(&degrees, "degrees")?;
        self.cx.turn_degrees(degrees).map_err(fail)
    }

    pub fn point_in_direction(&mut self, degrees: Dynamic) -> RhaiResult<()> {
        let degrees = number(&degrees, "degrees")?;
        self.cx.point_in_direction(degrees).map_err(fail)
    }

    pub fn direction(&mut self) -> RhaiResult<f64> {
        self.cx.direction().map_err(fail)
    }

    pub fn switch_costume(&mut self, name: &str) -> RhaiResult<()> {
        self.cx.switch_costume(name).map_err(fail)
    }

    pub fn switch_backdrop(&mut self, name: &str) -> RhaiResult<()> {
        self.cx.switch_backdrop(name).map_err(fail)
    }

    pub fn say(&mut self, content: Dynamic) -> RhaiResult<()> {
        self.cx.say(&content.to_string()).map_err(fail)
    }

    pub fn say_nothing(&mut self) -> RhaiResult<()> {
        self.cx.say_nothing().map_err(fail)
    }

    pub fn broadcast(&mut self, message: &str) {
        self.cx.broadcast(message);
    }

    pub fn create_clone_of_self(&mut self) -> RhaiResult<INT> {
        self.cx
            .create_clone_of_self()
            .map(|id| id.as_u64() as INT)
            .map_err(fail)
    }

    pub fn create_clone_of(&mut self, class_name: &str) -> RhaiResult<INT> {
        self.cx
            .create_clone_of(CloneSource::Class(class_name.to_string()))
            .map(|id| id.as_u64() as INT)
            .map_err(fail)
    }

    pub fn registered_instances(&mut self, class_name: &str) -> RhaiResult<Array> {
        let ids = self.cx.registered_instances(class_name).map_err(fail)?;
        Ok(ids
            .into_iter()
            .map(|id| Dynamic::from(id.as_u64() as INT))
            .collect())
    }

    pub fn touching(&mut self, class_name: &str) -> RhaiResult<bool> {
        self.cx.touching(class_name).map_err(fail)
    }

    pub fn key_pressed(&mut self, keyname: &str) -> RhaiResult<bool> {
        self.cx.key_pressed(keyname).map_err(fail)
    }

    pub fn show_variable(&mut self, attribute: &str) -> RhaiResult<()> {
        self.cx
            .show_variable(attribute, None, WatcherPosition::default())
            .map_err(fail)
    }

    pub fn show_variable_labelled(&mut self, attribute: &str, label: &str) -> RhaiResult<()> {
        self.cx
            .show_variable(attribute, Some(label), WatcherPosition::default())
            .map_err(fail)
    }

    /// `position` is a map with any of `top`, `left`, `bottom`, `right`.
    pub fn show_variable_at(&mut self, attribute: &str, label: &str, position: Map) -> RhaiResult<()> {
        let position = watcher_position(&position)?;
        self.cx
            .show_variable(attribute, Some(label), position)
            .map_err(fail)
    }

    pub fn hide_variable(&mut self, attribute: &str) {
        self.cx.hide_variable(attribute);
    }

    pub fn start_sound(&mut self, name: &str) -> RhaiResult<()> {
        self.cx.start_sound(name).map_err(fail)
    }

    pub fn set_sound_volume(&mut self, gain: Dynamic) -> RhaiResult<f64> {
        let gain = number(&gain, "volume")?;
        Ok(self.cx.set_sound_volume(gain))
    }

    pub fn sound_volume(&mut self) -> f64 {
        self.cx.sound_volume()
    }

    pub fn stop_all_sounds(&mut self) {
        self.cx.stop_all_sounds();
    }

    pub fn push_loop_iterations_per_frame(&mut self, iterations: INT) -> RhaiResult<()> {
        let iterations = u32::try_from(iterations)
            .map_err(|_| format!("loop iterations must be 0 or more, not {}", iterations))?;
        self.cx.push_loop_iterations_per_frame(iterations);
        Ok(())
    }

    pub fn pop_loop_iterations_per_frame(&mut self) {
        self.cx.pop_loop_iterations_per_frame();
    }
}

fn watcher_position(map: &Map) -> RhaiResult<WatcherPosition> {
    let mut position = WatcherPosition::default();
    for (key, value) in map {
        let value = Some(number(value, key.as_str())?);
        match key.as_str() {
            "top" => position.top = value,
            "left" => position.left = value,
            "bottom" => position.bottom = value,
            "right" => position.right = value,
            other => return Err(format!("unknown watcher position \"{}\"", other).into()),
        }
    }
    Ok(position)
}

pub fn register(engine: &mut Engine) {
    engine.register_type_with_name::<ScriptInstance>("Instance");

    engine.register_fn("get", ScriptInstance::get);
    engine.register_fn("set", ScriptInstance::set);
    engine.register_indexer_get(|this: &mut ScriptInstance, name: ImmutableString| {
        this.get(&name)
    });
    engine.register_indexer_set(
        |this: &mut ScriptInstance, name: ImmutableString, value: Dynamic| this.set(&name, value),
    );
    engine.register_fn("instance_id", ScriptInstance::instance_id);
    engine.register_fn("is_clone", ScriptInstance::is_clone);
    engine.register_fn("class_name", ScriptInstance::class_name);

    engine.register_fn("x", ScriptInstance::x);
    engine.register_fn("y", ScriptInstance::y);
    engine.register_fn("go_to_xy", ScriptInstance::go_to_xy);
    engine.register_fn("set_x", ScriptInstance::set_x);
    engine.register_fn("set_y", ScriptInstance::set_y);
    engine.register_fn("change_x", ScriptInstance::change_x);
    engine.register_fn("change_y", ScriptInstance::change_y);
    engine.register_fn("set_size", ScriptInstance::set_size);
    engine.register_fn("show", ScriptInstance::show);
    engine.register_fn("hide", ScriptInstance::hide);
    engine.register_fn("turn_degrees", ScriptInstance::turn_degrees);
    engine.register_fn("point_in_direction", ScriptInstance::point_in_direction);
    engine.register_fn("direction", ScriptInstance::direction);

    engine.register_fn("switch_costume", ScriptInstance::switch_costume);
    engine.register_fn("switch_backdrop", ScriptInstance::switch_backdrop);
    engine.register_fn("say", ScriptInstance::say);
    engine.register_fn("say_nothing", ScriptInstance::say_nothing);

    engine.register_fn("broadcast", ScriptInstance::broadcast);
    engine.register_fn("create_clone_of_self", ScriptInstance::create_clone_of_self);
    engine.register_fn("create_clone_of", ScriptInstance::create_clone_of);
    engine.register_fn("registered_instances", ScriptInstance::registered_instances);
    engine.register_fn("touching", ScriptInstance::touching);
    engine.register_fn("key_pressed", ScriptInstance::key_pressed);

    engine.register_fn("show_variable", ScriptInstance::show_variable);
    engine.register_fn("show_variable", ScriptInstance::show_variable_labelled);
    engine.register_fn("show_variable", ScriptInstance::show_variable_at);
    engine.register_fn("hide_variable", ScriptInstance::hide_variable);

    engine.register_fn("start_sound", ScriptInstance::start_sound);
    engine.register_fn("set_sound_volume", ScriptInstance::set_sound_volume);
    engine.register_fn("sound_volume", ScriptInstance::sound_volume);
    engine.register_fn("stop_all_sounds", ScriptInstance::stop_all_sounds);

    engine.register_fn(
        "push_loop_iterations_per_frame",
        ScriptInstance::push_loop_iterations_per_frame,
    );
    engine.register_fn(
        "pop_loop_iterations_per_frame",
        ScriptInstance::pop_loop_iterations_per_frame,
    );
}
