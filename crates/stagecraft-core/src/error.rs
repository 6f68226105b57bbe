//! Error types for the Stagecraft runtime.
//!
//! Errors come in two flavours. [`Error`] is fatal to the operation that
//! produced it (building a project, loading a script) and is returned to
//! the caller. [`SyscallError`] is raised inside a single running thread;
//! the scheduler logs it, aborts that thread, and carries on with the rest
//! of the frame.

use std::fmt;

use thiserror::Error;

use crate::assets::AssetKind;

/// Result type alias for fatal runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal errors surfaced to whoever drives the project.
#[derive(Debug, Error)]
pub enum Error {
    /// Registering an actor class failed.
    #[error("registration error: {0}")]
    Registration(#[from] RegistrationError),

    /// No registered actor has the given class name.
    #[error("no actor with class name \"{0}\"")]
    UnknownActor(String),

    /// A loop outside any thread ran for too many iterations.
    #[error(
        "your program has tried to execute {iterations} loop iterations, which exceeds \
         the maximum allowed of {max}, so it seems likely that you have an infinite loop \
         outside an event handler somewhere; if you have a long-running but finite loop, \
         call set_max_import_loop_iterations() to increase the limit"
    )]
    RunawayLoop { iterations: u64, max: u64 },

    /// No thread is waiting for an answer.
    #[error("no question is waiting for an answer")]
    NoPendingQuestion,

    /// Configuration could not be read.
    #[error("configuration error: {0}")]
    Config(String),

    /// Script failed to compile or its top level failed to run.
    #[error("script error: {0}")]
    Script(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Problems found while building the handler table of an actor class.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// Two actors were registered under the same class name.
    #[error("duplicate actor class name \"{0}\"")]
    DuplicateClassName(String),

    /// A trigger descriptor names an event type nobody knows about.
    #[error("unknown event-type \"{0}\"")]
    UnknownEventType(String),

    /// A trigger descriptor is missing its argument or has a bad one.
    #[error("bad argument for event-type \"{event_type}\": {reason}")]
    BadTriggerArgument { event_type: String, reason: String },

    /// The trigger cannot apply to this kind of actor.
    #[error("event-type \"{event_type}\" cannot be used on a {kind}")]
    TriggerNotAllowed { event_type: String, kind: String },

    /// A project may hold at most one stage.
    #[error("a stage is already registered (\"{0}\")")]
    SecondStage(String),

    /// A sprite class handed to the stage registration, or vice versa.
    #[error("class \"{class_name}\" is a {declared}, not a {expected}")]
    WrongKind {
        class_name: String,
        declared: String,
        expected: String,
    },

    /// A handler names a script function that does not exist.
    #[error("class \"{class_name}\" has no function \"{function}\"")]
    UnknownHandler { class_name: String, function: String },

    /// The class constructor refused to build instance 0.
    #[error("constructor for \"{class_name}\" failed: {reason}")]
    Constructor { class_name: String, reason: String },
}

/// Errors raised inside a running thread.
///
/// These are user-facing: the message is what the person writing the
/// project sees in their error list.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyscallError {
    /// A key name is not one the keyboard knows.
    #[error("keyname must be a valid key; {hint}")]
    InvalidKeyName { keyname: String, hint: String },

    /// Empty key name.
    #[error("keyname must not be an empty string")]
    EmptyKeyName,

    /// create_clone_of() given something that is not a registered sprite.
    #[error("in create_clone_of({0}), the target must be a registered Sprite")]
    CloneTarget(String),

    /// A class name did not resolve to a registered actor.
    #[error("class \"{0}\" is not registered")]
    UnknownClass(String),

    /// Costume or backdrop name not declared on the actor.
    #[error("could not find {what} \"{name}\" in class \"{class_name}\"")]
    UnknownAppearance {
        what: &'static str,
        name: String,
        class_name: String,
    },

    /// Sound name not declared on the actor.
    #[error("could not find sound \"{name}\" in class \"{class_name}\"")]
    UnknownSound { name: String, class_name: String },

    /// Attribute read before it was ever set.
    #[error("instance of \"{class_name}\" has no attribute \"{name}\"")]
    NoSuchAttribute { class_name: String, name: String },

    /// An argument was out of range or inconsistent.
    #[error("{syscall}(): {reason}")]
    InvalidArgument {
        syscall: &'static str,
        reason: String,
    },

    /// The operation only makes sense on a sprite.
    #[error("{0}() can only be used by a Sprite")]
    SpriteOnly(&'static str),

    /// The instance this thread runs for has gone.
    #[error("instance {0} no longer exists")]
    InstanceGone(InstanceLabel),
}

impl SyscallError {
    /// Shorthand for [`SyscallError::InvalidArgument`].
    pub fn invalid(syscall: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            syscall,
            reason: reason.into(),
        }
    }
}

/// Printable reference to an instance, used in error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceLabel(pub String);

impl fmt::Display for InstanceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A rejected asset load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssetError {
    /// The loader has nothing at the locator.
    #[error("could not load {kind} \"{locator}\"")]
    NotFound { kind: AssetKind, locator: String },

    /// The loader went away before answering.
    #[error("loader dropped the request for {kind} \"{locator}\"")]
    Abandoned { kind: AssetKind, locator: String },
}

/// One entry in the project's error sink.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    /// Where the error came from.
    pub context: ErrorContext,
    /// Human readable message.
    pub message: String,
}

/// Origin of an [`ErrorReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorContext {
    /// A thread raised and was aborted.
    Thread {
        class_name: String,
        instance: String,
        handler: String,
    },
    /// An asset failed to load.
    AssetLoad,
}
