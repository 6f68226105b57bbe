//! Event handlers and handler groups.

use futures::future::{FutureExt, LocalBoxFuture};
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use crate::context::ThreadContext;
use crate::trigger::Trigger;

/// The running body of one thread.
pub type ScriptFuture = LocalBoxFuture<'static, anyhow::Result<()>>;

/// A user-defined method: given the context of a fresh thread, produce the
/// computation that thread will run.
pub type HandlerFn = Rc<dyn Fn(ThreadContext) -> ScriptFuture>;

/// Wrap an async closure as a [`HandlerFn`].
///
/// ```ignore
/// let body = handler(|cx| async move {
///     cx.change_x(10.0)?;
///     Ok(())
/// });
/// ```
pub fn handler<F, Fut>(f: F) -> HandlerFn
where
    F: Fn(ThreadContext) -> Fut + 'static,
    Fut: Future<Output = anyhow::Result<()>> + 'static,
{
    Rc::new(move |cx| f(cx).boxed_local())
}

/// One method bound to one trigger.
#[derive(Clone)]
pub struct EventHandler {
    label: String,
    body: HandlerFn,
}

impl EventHandler {
    /// Create a handler; `label` names the method in debug output.
    pub fn new(label: impl Into<String>, body: HandlerFn) -> Self {
        Self {
            label: label.into(),
            body,
        }
    }

    /// Name of the method.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Build the computation for a new thread. Nothing runs until the
    /// scheduler first resumes it.
    pub(crate) fn launch(&self, cx: ThreadContext) -> ScriptFuture {
        (self.body)(cx)
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandler")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// All of one actor's handlers for a single trigger, in declaration order.
#[derive(Clone, Debug)]
pub struct EventHandlerGroup {
    trigger: Trigger,
    handlers: Vec<EventHandler>,
}

impl EventHandlerGroup {
    /// Create an empty group for `trigger`.
    pub fn new(trigger: Trigger) -> Self {
        Self {
            trigger,
            handlers: Vec::new(),
        }
    }

    /// The trigger every handler in the group responds to.
    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    /// Append a handler.
    pub fn push(&mut self, handler: EventHandler) {
        self.handlers.push(handler);
    }

    /// Handlers in declaration order.
    pub fn handlers(&self) -> &[EventHandler] {
        &self.handlers
    }

    /// Number of handlers.
    pub fn n_handlers(&self) -> usize {
        self.handlers.len()
    }
}
