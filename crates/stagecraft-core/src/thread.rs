//! Threads and the suspension protocol.
//!
//! A thread's body is a future. Whenever the body reaches a syscall that has
//! to pause, it awaits a [`Suspend`], which files a [`Suspension`] request
//! with the thread and returns `Pending`. The scheduler polls each thread at
//! most once per frame, reads back the request, and decides from the
//! resulting [`ThreadState`] when to poll again. The second poll of the
//! `Suspend` yields whatever result the scheduler left for it.

use futures::task::noop_waker_ref;
use rhai::Dynamic;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::Duration;

use crate::actor::ActorId;
use crate::error::SyscallError;
use crate::handler::ScriptFuture;
use crate::instance::InstanceId;
use crate::sound::PerformanceId;

/// Identity of a thread; also its position in the run order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub(crate) u64);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread {}", self.0)
    }
}

/// Identity of a thread group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub(crate) u64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group {}", self.0)
    }
}

/// Identity of an asked question.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QuestionId(pub(crate) u64);

/// Why a thread paused.
#[derive(Clone, Debug, PartialEq)]
pub enum Suspension {
    /// Until the next frame.
    NextFrame,
    /// Until this many seconds of frame time have passed.
    Timer(f64),
    /// Until every thread of the group has finished.
    AwaitGroup(GroupId),
    /// Until the host delivers an answer.
    AwaitAnswer(QuestionId),
    /// Until a sound finishes.
    AwaitPerformance(PerformanceId),
    /// Never; the thread is to be discarded.
    Terminate,
}

/// Scheduling state of a live thread.
#[derive(Clone, Debug, PartialEq)]
pub enum ThreadState {
    /// Resumes on the next pass.
    Runnable,
    /// Resumes on the next pass.
    AwaitingFrame,
    /// Resumes once `remaining` drops to zero.
    AwaitingTimer { remaining: f64 },
    /// Resumes once the group has no members left.
    AwaitingGroup(GroupId),
    /// Resumes only after an answer is delivered.
    AwaitingAnswer(QuestionId),
    /// Resumes once the sound stops.
    AwaitingPerformance(PerformanceId),
}

impl ThreadState {
    pub(crate) fn from_suspension(suspension: Suspension) -> Option<Self> {
        match suspension {
            Suspension::NextFrame => Some(ThreadState::AwaitingFrame),
            Suspension::Timer(secs) => Some(ThreadState::AwaitingTimer { remaining: secs }),
            Suspension::AwaitGroup(group) => Some(ThreadState::AwaitingGroup(group)),
            Suspension::AwaitAnswer(q) => Some(ThreadState::AwaitingAnswer(q)),
            Suspension::AwaitPerformance(p) => Some(ThreadState::AwaitingPerformance(p)),
            Suspension::Terminate => None,
        }
    }
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadState::Runnable => f.write_str("runnable"),
            ThreadState::AwaitingFrame => f.write_str("waiting for next frame"),
            ThreadState::AwaitingTimer { remaining } => {
                match Duration::try_from_secs_f64(remaining.max(0.0)) {
                    Ok(left) => write!(f, "waiting {}", humantime::format_duration(left)),
                    Err(_) => write!(f, "waiting {:.0}s", remaining),
                }
            }
            ThreadState::AwaitingGroup(group) => write!(f, "waiting for {}", group),
            ThreadState::AwaitingAnswer(q) => write!(f, "waiting for answer {}", q.0),
            ThreadState::AwaitingPerformance(p) => write!(f, "waiting for {}", p),
        }
    }
}

/// One level of loop-rate control.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct LoopRate {
    per_frame: u32,
    done: u32,
}

/// Stack of loop-rate settings.
///
/// A loop calls [`LoopRateStack::should_yield`] once per iteration; it
/// answers `true` every `per_frame` calls. `per_frame == 0` never yields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct LoopRateStack {
    stack: Vec<LoopRate>,
}

impl LoopRateStack {
    pub fn new(default_per_frame: u32) -> Self {
        Self {
            stack: vec![LoopRate {
                per_frame: default_per_frame,
                done: 0,
            }],
        }
    }

    pub fn push(&mut self, per_frame: u32) {
        self.stack.push(LoopRate { per_frame, done: 0 });
    }

    /// Pop back to the enclosing setting; the bottom entry stays.
    pub fn pop(&mut self) -> bool {
        if self.stack.len() > 1 {
            self.stack.pop();
            true
        } else {
            false
        }
    }

    pub fn should_yield(&mut self) -> bool {
        let Some(top) = self.stack.last_mut() else {
            return true;
        };
        if top.per_frame == 0 {
            return false;
        }
        top.done += 1;
        if top.done >= top.per_frame {
            top.done = 0;
            true
        } else {
            false
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

/// Per-thread mailbox between a running body and the scheduler.
#[derive(Debug)]
pub(crate) struct ThreadIo {
    /// Filled by a `Suspend` when it pauses.
    pub pending: Option<Suspension>,
    /// Filled by the scheduler before resuming a paused `Suspend`.
    pub resume: Option<Result<Dynamic, SyscallError>>,
    pub loop_rate: LoopRateStack,
}

impl ThreadIo {
    pub fn new(default_per_frame: u32) -> Self {
        Self {
            pending: None,
            resume: None,
            loop_rate: LoopRateStack::new(default_per_frame),
        }
    }
}

/// Future that pauses its thread once.
#[must_use = "a suspension does nothing unless awaited"]
pub struct Suspend {
    request: Option<Suspension>,
    io: Rc<RefCell<ThreadIo>>,
}

impl Suspend {
    pub(crate) fn new(request: Suspension, io: Rc<RefCell<ThreadIo>>) -> Self {
        Self {
            request: Some(request),
            io,
        }
    }

    /// A `Suspend` that completes at once with `result`.
    pub(crate) fn ready(result: Result<Dynamic, SyscallError>, io: Rc<RefCell<ThreadIo>>) -> Self {
        io.borrow_mut().resume = Some(result);
        Self { request: None, io }
    }
}

impl Future for Suspend {
    type Output = Result<Dynamic, SyscallError>;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(request) = self.request.take() {
            self.io.borrow_mut().pending = Some(request);
            return Poll::Pending;
        }
        let result = self.io.borrow_mut().resume.take();
        Poll::Ready(result.unwrap_or(Ok(Dynamic::UNIT)))
    }
}

/// What happened when a thread was resumed.
pub(crate) enum Resumption {
    /// The body ran to completion.
    Finished,
    /// The body returned an error.
    Failed(anyhow::Error),
    /// The body paused; `None` means it awaited something other than a
    /// syscall, which is treated as waiting for the next frame.
    Suspended(Option<Suspension>),
}

/// A live thread.
pub(crate) struct Thread {
    pub id: ThreadId,
    pub group: GroupId,
    pub actor: ActorId,
    pub instance: InstanceId,
    pub label: String,
    pub state: ThreadState,
    pub io: Rc<RefCell<ThreadIo>>,
    body: Option<ScriptFuture>,
}

impl Thread {
    pub fn new(
        id: ThreadId,
        group: GroupId,
        actor: ActorId,
        instance: InstanceId,
        label: String,
        io: Rc<RefCell<ThreadIo>>,
        body: ScriptFuture,
    ) -> Self {
        Self {
            id,
            group,
            actor,
            instance,
            label,
            state: ThreadState::Runnable,
            io,
            body: Some(body),
        }
    }

    /// Run the body until it finishes or pauses.
    ///
    /// The caller must not hold a borrow of the project state: the body
    /// reaches it through its context.
    pub fn resume(&mut self) -> Resumption {
        let Some(mut body) = self.body.take() else {
            return Resumption::Finished;
        };
        let mut cx = Context::from_waker(noop_waker_ref());
        match body.as_mut().poll(&mut cx) {
            Poll::Ready(Ok(())) => Resumption::Finished,
            Poll::Ready(Err(e)) => Resumption::Failed(e),
            Poll::Pending => {
                self.body = Some(body);
                Resumption::Suspended(self.io.borrow_mut().pending.take())
            }
        }
    }
}

/// Debug snapshot of one live thread.
#[derive(Clone, Debug, PartialEq)]
pub struct ThreadInfo {
    pub thread: ThreadId,
    pub group: GroupId,
    pub class_name: String,
    pub instance: InstanceId,
    pub handler: String,
    pub state: ThreadState,
}

impl fmt::Display for ThreadInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) {}{}.{}: {}",
            self.thread, self.group, self.class_name, self.instance, self.handler, self.state
        )
    }
}
