//! Declaring actor classes from a script.
//!
//! ```rhai
//! register(
//!     sprite("Ball")
//!         .costume("ball", "ball.png", 10, 10)
//!         .set("speed", 3)
//!         .when("green-flag", "start")
//! );
//! ```

use rhai::{Dynamic, Engine, EvalAltResult};
use std::rc::Rc;

use super::directive::{self, continuation, number, ScriptRunner};
use crate::actor::{ActorClass, ActorKindTag, Costume, Sound};
use crate::error::RegistrationError;
use crate::handler::handler;

type RhaiResult<T> = Result<T, Box<EvalAltResult>>;

#[derive(Debug, Clone)]
struct HandlerDecl {
    event_type: String,
    arg: String,
    function: String,
}

/// An actor class under construction in a script.
#[derive(Debug, Clone)]
pub struct ActorDecl {
    name: String,
    kind: ActorKindTag,
    costumes: Vec<Costume>,
    sounds: Vec<Sound>,
    attributes: Vec<(String, Dynamic)>,
    position: Option<(f64, f64)>,
    size: Option<f64>,
    hidden: bool,
    handlers: Vec<HandlerDecl>,
}

impl ActorDecl {
    pub fn sprite(name: &str) -> Self {
        Self::new(name, ActorKindTag::Sprite)
    }

    pub fn stage(name: &str) -> Self {
        Self::new(name, ActorKindTag::Stage)
    }

    fn new(name: &str, kind: ActorKindTag) -> Self {
        Self {
            name: name.to_string(),
            kind,
            costumes: Vec::new(),
            sounds: Vec::new(),
            attributes: Vec::new(),
            position: None,
            size: None,
            hidden: false,
            handlers: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ActorKindTag {
        self.kind
    }

    pub fn costume(&mut self, name: &str, locator: &str) -> Self {
        self.costumes.push(Costume::new(name, locator, 0.0, 0.0));
        self.clone()
    }

    pub fn costume_centred(
        &mut self,
        name: &str,
        locator: &str,
        centre_x: Dynamic,
        centre_y: Dynamic,
    ) -> RhaiResult<Self> {
        let centre_x = number(&centre_x, "centre x")?;
        let centre_y = number(&centre_y, "centre y")?;
        self.costumes
            .push(Costume::new(name, locator, centre_x, centre_y));
        Ok(self.clone())
    }

    pub fn sound(&mut self, name: &str, locator: &str) -> Self {
        self.sounds.push(Sound {
            name: name.to_string(),
            locator: locator.to_string(),
        });
        self.clone()
    }

    pub fn set(&mut self, attribute: &str, value: Dynamic) -> Self {
        self.attributes.retain(|(name, _)| name != attribute);
        self.attributes.push((attribute.to_string(), value));
        self.clone()
    }

    pub fn go_to_xy(&mut self, x: Dynamic, y: Dynamic) -> RhaiResult<Self> {
        self.position = Some((number(&x, "x")?, number(&y, "y")?));
        Ok(self.clone())
    }

    pub fn set_size(&mut self, size: Dynamic) -> RhaiResult<Self> {
        let size = number(&size, "size")?;
        if !size.is_finite() || size < 0.0 {
            return Err(format!("size must be a non-negative number, not {}", size).into());
        }
        self.size = Some(size);
        Ok(self.clone())
    }

    pub fn hide(&mut self) -> Self {
        self.hidden = true;
        self.clone()
    }

    pub fn when(&mut self, event_type: &str, function: Dynamic) -> RhaiResult<Self> {
        self.when_with(event_type, "", function)
    }

    pub fn when_with(&mut self, event_type: &str, arg: &str, function: Dynamic) -> RhaiResult<Self> {
        let function = continuation(&function)?
            .ok_or_else(|| format!("handler for \"{}\" must name a function", event_type))?;
        self.handlers.push(HandlerDecl {
            event_type: event_type.to_string(),
            arg: arg.to_string(),
            function,
        });
        Ok(self.clone())
    }

    /// Turn the declaration into a registrable class whose handlers call
    /// into the compiled script.
    pub(crate) fn into_class(
        self,
        runner: &Rc<ScriptRunner>,
    ) -> Result<ActorClass, RegistrationError> {
        for decl in &self.handlers {
            if !runner.has_function(&decl.function) {
                return Err(RegistrationError::UnknownHandler {
                    class_name: self.name,
                    function: decl.function.clone(),
                });
            }
        }

        let mut class = match self.kind {
            ActorKindTag::Sprite => ActorClass::sprite(&self.name),
            ActorKindTag::Stage => ActorClass::stage(&self.name),
        };
        for costume in self.costumes {
            class = class.costume(
                costume.name,
                costume.locator,
                costume.centre_x,
                costume.centre_y,
            );
        }
        for sound in self.sounds {
            class = class.sound(sound.name, sound.locator);
        }

        let attributes = self.attributes;
        let position = self.position;
        let size = self.size;
        let hidden = self.hidden;
        class = class.init(move |instance| {
            for (name, value) in &attributes {
                instance.set_dynamic(name, value.clone());
            }
            if let Some((x, y)) = position {
                instance.go_to_xy(x, y);
            }
            if let Some(size) = size {
                instance.set_size(size);
            }
            if hidden {
                instance.hide();
            }
            Ok(())
        });

        for decl in self.handlers {
            let runner = runner.clone();
            let function = decl.function.clone();
            let body = handler(move |cx| directive::run(runner.clone(), cx, function.clone()));
            class = class.when(&decl.event_type, &decl.arg, decl.function, body);
        }
        Ok(class)
    }
}

pub fn register(engine: &mut Engine) {
    engine.register_type_with_name::<ActorDecl>("ActorDecl");

    engine.register_fn("sprite", ActorDecl::sprite);
    engine.register_fn("stage", ActorDecl::stage);
    engine.register_fn("costume", ActorDecl::costume);
    engine.register_fn("costume", ActorDecl::costume_centred);
    engine.register_fn("backdrop", ActorDecl::costume);
    engine.register_fn("sound", ActorDecl::sound);
    engine.register_fn("set", ActorDecl::set);
    engine.register_fn("go_to_xy", ActorDecl::go_to_xy);
    engine.register_fn("set_size", ActorDecl::set_size);
    engine.register_fn("hide", ActorDecl::hide);
    engine.register_fn("when", ActorDecl::when);
    engine.register_fn("when", ActorDecl::when_with);
    engine.register_get("name", |decl: &mut ActorDecl| decl.name.clone());
}
