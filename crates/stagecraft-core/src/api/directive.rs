//! Pausing from Rhai.
//!
//! A Rhai function cannot be suspended part-way through, so scripted
//! handlers pause by returning a [`Directive`]: "wait for X, then call
//! function F". The runner performs the wait through the thread's context
//! and then calls F with `this` bound to the same instance, repeating until
//! a function returns anything other than a directive.

use rhai::{CallFnOptions, Dynamic, Engine, EvalAltResult, FnPtr, Scope, AST};
use std::cell::Cell;
use std::rc::Rc;

use super::instance::ScriptInstance;
use crate::context::ThreadContext;

type RhaiResult<T> = Result<T, Box<EvalAltResult>>;

thread_local! {
    /// Directives built during the current script call.
    static ISSUED: Cell<usize> = const { Cell::new(0) };
}

#[derive(Debug, Clone, PartialEq)]
enum Action {
    NextFrame,
    WaitSeconds(f64),
    BroadcastAndWait(String),
    AskAndWait(Option<String>),
    PlaySoundUntilDone(String),
    DeleteThisClone,
    StopAll,
}

/// A request to pause, returned by a scripted handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    action: Action,
    /// Function to call once the wait is over.
    then: Option<String>,
}

impl Directive {
    fn new(action: Action, then: &Dynamic) -> RhaiResult<Self> {
        ISSUED.with(|n| n.set(n.get() + 1));
        Ok(Self {
            action,
            then: continuation(then)?,
        })
    }

    fn last(action: Action) -> Self {
        ISSUED.with(|n| n.set(n.get() + 1));
        Self { action, then: None }
    }

    pub(crate) fn next_frame() -> Self {
        Self::last(Action::NextFrame)
    }

    /// Pause for the directive, then say which function to call next and
    /// with what arguments.
    async fn perform(self, cx: &ThreadContext) -> anyhow::Result<Option<(String, Vec<Dynamic>)>> {
        let mut args = Vec::new();
        match self.action {
            Action::NextFrame => cx.yield_until_next_frame().await?,
            Action::WaitSeconds(seconds) => cx.wait_seconds(seconds).await?,
            Action::BroadcastAndWait(message) => cx.broadcast_and_wait(&message).await?,
            Action::AskAndWait(prompt) => {
                let answer = cx.ask_and_wait(prompt.as_deref()).await?;
                args.push(Dynamic::from(answer));
            }
            Action::PlaySoundUntilDone(name) => cx.play_sound_until_done(&name).await?,
            Action::DeleteThisClone => cx.delete_this_clone().await?,
            Action::StopAll => {
                cx.stop_all().await?;
                return Ok(None);
            }
        }
        Ok(self.then.map(|function| (function, args)))
    }
}

/// Continuation argument: a function name, a function pointer, or `()`.
pub(crate) fn continuation(value: &Dynamic) -> RhaiResult<Option<String>> {
    if value.is_unit() {
        return Ok(None);
    }
    if let Some(ptr) = value.clone().try_cast::<FnPtr>() {
        return Ok(Some(ptr.fn_name().to_string()));
    }
    match value.clone().into_string() {
        Ok(name) => Ok(Some(name)),
        Err(type_name) => {
            Err(format!("continuation must be a function name, not {}", type_name).into())
        }
    }
}

pub(crate) fn number(value: &Dynamic, what: &str) -> RhaiResult<f64> {
    if let Ok(f) = value.as_float() {
        return Ok(f);
    }
    if let Ok(i) = value.as_int() {
        return Ok(i as f64);
    }
    Err(format!("{} must be a number, not {}", what, value.type_name()).into())
}

fn prompt(value: &Dynamic) -> RhaiResult<Option<String>> {
    if value.is_unit() {
        return Ok(None);
    }
    value
        .clone()
        .into_string()
        .map(Some)
        .map_err(|_| "ask_and_wait(): prompt must be a string or ()".into())
}

/// Compiled script plus the engine that runs it.
pub(crate) struct ScriptRunner {
    engine: Rc<Engine>,
    ast: Rc<AST>,
}

impl ScriptRunner {
    pub fn new(engine: Rc<Engine>, ast: Rc<AST>) -> Self {
        Self { engine, ast }
    }

    /// Whether the script defines `name` taking no arguments.
    pub fn has_function(&self, name: &str) -> bool {
        self.ast
            .iter_functions()
            .any(|f| f.name == name && f.params.is_empty())
    }

    /// Call a script function with `this` bound to the running instance.
    /// Also returns how many directives the call built.
    fn call(
        &self,
        cx: &ThreadContext,
        function: &str,
        args: Vec<Dynamic>,
    ) -> anyhow::Result<(Dynamic, usize)> {
        let mut this = Dynamic::from(ScriptInstance::new(cx.clone()));
        let options = CallFnOptions::new()
            .eval_ast(false)
            .rewind_scope(true)
            .bind_this_ptr(&mut this);
        let mut scope = Scope::new();
        ISSUED.with(|n| n.set(0));
        let returned = self
            .engine
            .call_fn_with_options::<Dynamic>(options, &mut scope, &self.ast, function, args)
            .map_err(|e| anyhow::anyhow!("in {}(): {}", function, e))?;
        Ok((returned, ISSUED.with(|n| n.replace(0))))
    }
}

/// Body of a thread running a scripted handler.
pub(crate) async fn run(runner: Rc<ScriptRunner>, cx: ThreadContext, entry: String) -> anyhow::Result<()> {
    let mut next = Some((entry, Vec::new()));
    while let Some((function, args)) = next {
        log::trace!("[SCRIPT] {} calls {}()", cx.thread_id(), function);
        let (returned, issued) = runner.call(&cx, &function, args)?;
        next = match returned.try_cast::<Directive>() {
            Some(directive) => directive.perform(&cx).await?,
            None if issued > 0 => anyhow::bail!(
                "in {}(): a pausing call only takes effect when returned, e.g. `return next_frame(\"f\")`",
                function
            ),
            None => None,
        };
    }
    Ok(())
}

pub fn register(engine: &mut Engine) {
    engine.register_type_with_name::<Directive>("Directive");

    engine.register_fn("next_frame", Directive::next_frame);
    engine.register_fn("next_frame", |then: Dynamic| {
        Directive::new(Action::NextFrame, &then)
    });

    engine.register_fn("wait_seconds", |seconds: Dynamic| {
        Ok::<_, Box<EvalAltResult>>(Directive::last(Action::WaitSeconds(number(
            &seconds, "seconds",
        )?)))
    });
    engine.register_fn("wait_seconds", |seconds: Dynamic, then: Dynamic| {
        Directive::new(Action::WaitSeconds(number(&seconds, "seconds")?), &then)
    });

    engine.register_fn("broadcast_and_wait", |message: &str| {
        Directive::last(Action::BroadcastAndWait(message.to_string()))
    });
    engine.register_fn("broadcast_and_wait", |message: &str, then: Dynamic| {
        Directive::new(Action::BroadcastAndWait(message.to_string()), &then)
    });

    engine.register_fn("ask_and_wait", |question: Dynamic, then: Dynamic| {
        Directive::new(Action::AskAndWait(prompt(&question)?), &then)
    });

    engine.register_fn("play_sound_until_done", |name: &str| {
        Directive::last(Action::PlaySoundUntilDone(name.to_string()))
    });
    engine.register_fn("play_sound_until_done", |name: &str, then: Dynamic| {
        Directive::new(Action::PlaySoundUntilDone(name.to_string()), &then)
    });

    engine.register_fn("delete_this_clone", || Directive::last(Action::DeleteThisClone));
    engine.register_fn("delete_this_clone", |then: Dynamic| {
        Directive::new(Action::DeleteThisClone, &then)
    });

    engine.register_fn("stop_all", || Directive::last(Action::StopAll));
}
