//! Event triggers.
//!
//! A [`Trigger`] is the thing a handler responds to. Triggers are written
//! as `(event_type, argument)` descriptors when declared from a script, for
//! example `("message", "clone-self")` or `("key", "ArrowUp")`.

use std::fmt;

use crate::actor::ActorKindTag;
use crate::error::RegistrationError;
use crate::keys::validate_key_name;

/// Something that launches handler threads.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Trigger {
    /// The green flag was clicked.
    GreenFlag,
    /// A broadcast of this message was sent.
    Message(String),
    /// A new clone has just been made (runs on the clone).
    StartAsClone,
    /// A key went down.
    KeyPressed(String),
    /// The pointer clicked this sprite.
    ThisSpriteClicked,
    /// The pointer clicked the stage.
    StageClicked,
}

impl Trigger {
    /// Parse an `(event_type, argument)` descriptor.
    pub fn from_descriptor(event_type: &str, arg: &str) -> Result<Self, RegistrationError> {
        let needs_arg = |what: &str| -> Result<(), RegistrationError> {
            if arg.is_empty() {
                Err(RegistrationError::BadTriggerArgument {
                    event_type: event_type.to_string(),
                    reason: format!("{what} must be given"),
                })
            } else {
                Ok(())
            }
        };

        match event_type {
            "green-flag" => Ok(Trigger::GreenFlag),
            "message" => {
                needs_arg("a message")?;
                Ok(Trigger::Message(arg.to_string()))
            }
            "clone" => Ok(Trigger::StartAsClone),
            "key" => {
                validate_key_name(arg).map_err(|e| RegistrationError::BadTriggerArgument {
                    event_type: event_type.to_string(),
                    reason: e.to_string(),
                })?;
                Ok(Trigger::KeyPressed(arg.to_string()))
            }
            "click" => Ok(Trigger::ThisSpriteClicked),
            "stage-click" => Ok(Trigger::StageClicked),
            other => Err(RegistrationError::UnknownEventType(other.to_string())),
        }
    }

    /// The event-type half of the descriptor.
    pub fn event_type(&self) -> &'static str {
        match self {
            Trigger::GreenFlag => "green-flag",
            Trigger::Message(_) => "message",
            Trigger::StartAsClone => "clone",
            Trigger::KeyPressed(_) => "key",
            Trigger::ThisSpriteClicked => "click",
            Trigger::StageClicked => "stage-click",
        }
    }

    /// Whether an actor of this kind may carry a handler for the trigger.
    pub fn allowed_on(&self, kind: ActorKindTag) -> bool {
        match self {
            Trigger::StartAsClone | Trigger::ThisSpriteClicked => kind == ActorKindTag::Sprite,
            Trigger::StageClicked => kind == ActorKindTag::Stage,
            _ => true,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Message(msg) => write!(f, "message \"{}\"", msg),
            Trigger::KeyPressed(key) => write!(f, "key \"{}\"", key),
            other => f.write_str(other.event_type()),
        }
    }
}
