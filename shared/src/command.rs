//! Command model
//!
//! A command is one JSON object from a controller. Keys `X`, `Y`, `Z`, `R`
//! carry signed speeds; `T`, `L`, `S`, `C` are flags for takeoff, land, stop
//! and camera toggle. Every key present in a message is applied, always in
//! the order X, Y, Z, R, T, L, S, C.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A decoded controller message
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Command {
    /// Right (+) / left (-)
    pub x: Option<f64>,
    /// Forward (+) / backward (-)
    pub y: Option<f64>,
    /// Up (+) / down (-)
    pub z: Option<f64>,
    /// Clockwise (+) / counter-clockwise (-)
    pub r: Option<f64>,
    pub takeoff: bool,
    pub land: bool,
    pub stop: bool,
    pub camera: bool,
}

impl Command {
    /// Decode a command from any JSON value.
    ///
    /// Non-object values carry no instructions and decode to an empty command.
    /// Speed keys only count when they hold a number. Flag keys follow
    /// JavaScript truthiness so that `1`, `"yes"` and `true` all set a flag.
    pub fn from_json(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::default();
        };

        let number = |field: CommandField| obj.get(field.key()).and_then(Value::as_f64);
        let flag = |field: CommandField| obj.get(field.key()).is_some_and(is_truthy);

        Self {
            x: number(CommandField::X),
            y: number(CommandField::Y),
            z: number(CommandField::Z),
            r: number(CommandField::R),
            takeoff: flag(CommandField::Takeoff),
            land: flag(CommandField::Land),
            stop: flag(CommandField::Stop),
            camera: flag(CommandField::Camera),
        }
    }

    /// True when no recognized key is set
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// A recognized command key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandField {
    X,
    Y,
    Z,
    R,
    Takeoff,
    Land,
    Stop,
    Camera,
}

impl CommandField {
    /// All fields in application order
    pub const ORDER: [CommandField; 8] = [
        CommandField::X,
        CommandField::Y,
        CommandField::Z,
        CommandField::R,
        CommandField::Takeoff,
        CommandField::Land,
        CommandField::Stop,
        CommandField::Camera,
    ];

    /// JSON key for this field
    pub fn key(self) -> &'static str {
        match self {
            CommandField::X => "X",
            CommandField::Y => "Y",
            CommandField::Z => "Z",
            CommandField::R => "R",
            CommandField::Takeoff => "T",
            CommandField::Land => "L",
            CommandField::Stop => "S",
            CommandField::Camera => "C",
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// The set of fields a relay honors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSet(u8);

impl FieldSet {
    /// Every recognized field
    pub const ALL: FieldSet = FieldSet(0xff);

    /// Build a set from a list of fields
    pub fn of(fields: &[CommandField]) -> Self {
        FieldSet(fields.iter().fold(0, |bits, f| bits | f.bit()))
    }

    pub fn contains(self, field: CommandField) -> bool {
        self.0 & field.bit() != 0
    }

    /// Fields in the set, in application order
    pub fn fields(self) -> impl Iterator<Item = CommandField> {
        CommandField::ORDER
            .into_iter()
            .filter(move |f| self.contains(*f))
    }
}

impl Default for FieldSet {
    fn default() -> Self {
        FieldSet::ALL
    }
}

/// One call on the drone client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "value", rename_all = "snake_case")]
pub enum DroneAction {
    Right(f64),
    Left(f64),
    Front(f64),
    Back(f64),
    Up(f64),
    Down(f64),
    Clockwise(f64),
    CounterClockwise(f64),
    Takeoff,
    Land,
    Stop,
    Config { key: String, value: String },
}

impl fmt::Display for DroneAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DroneAction::Right(s) => write!(f, "fly right at speed {}", s),
            DroneAction::Left(s) => write!(f, "fly left at speed {}", s),
            DroneAction::Front(s) => write!(f, "fly forward at speed {}", s),
            DroneAction::Back(s) => write!(f, "fly backward at speed {}", s),
            DroneAction::Up(s) => write!(f, "fly up at speed {}", s),
            DroneAction::Down(s) => write!(f, "fly down at speed {}", s),
            DroneAction::Clockwise(s) => write!(f, "turn clockwise at speed {}", s),
            DroneAction::CounterClockwise(s) => {
                write!(f, "turn counter-clockwise at speed {}", s)
            }
            DroneAction::Takeoff => write!(f, "takeoff"),
            DroneAction::Land => write!(f, "land"),
            DroneAction::Stop => write!(f, "stop"),
            DroneAction::Config { key, value } => write!(f, "config {} = {}", key, value),
        }
    }
}

/// A step produced by [`plan`]
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedAction {
    /// Issue this call directly
    Drone(DroneAction),
    /// Flip the camera channel, then configure the drone with the new id
    ToggleCamera,
}

/// Translate a command into drone calls, in X, Y, Z, R, T, L, S, C order.
///
/// Zero speeds produce nothing. Fields outside `fields` are ignored.
pub fn plan(command: &Command, fields: FieldSet) -> Vec<PlannedAction> {
    let mut steps = Vec::new();

    for field in fields.fields() {
        let step = match field {
            CommandField::X => signed(command.x, DroneAction::Right, DroneAction::Left),
            CommandField::Y => signed(command.y, DroneAction::Front, DroneAction::Back),
            CommandField::Z => signed(command.z, DroneAction::Up, DroneAction::Down),
            CommandField::R => signed(
                command.r,
                DroneAction::Clockwise,
                DroneAction::CounterClockwise,
            ),
            CommandField::Takeoff => command.takeoff.then_some(DroneAction::Takeoff),
            CommandField::Land => command.land.then_some(DroneAction::Land),
            CommandField::Stop => command.stop.then_some(DroneAction::Stop),
            CommandField::Camera => {
                if command.camera {
                    steps.push(PlannedAction::ToggleCamera);
                }
                None
            }
        };

        if let Some(action) = step {
            steps.push(PlannedAction::Drone(action));
        }
    }

    steps
}

fn signed(
    value: Option<f64>,
    positive: fn(f64) -> DroneAction,
    negative: fn(f64) -> DroneAction,
) -> Option<DroneAction> {
    match value {
        Some(v) if v > 0.0 => Some(positive(v)),
        Some(v) if v < 0.0 => Some(negative(v.abs())),
        _ => None,
    }
}
