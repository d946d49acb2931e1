//! Data connector descriptors.

use super::name::ComponentName;
use serde::Serialize;
use std::fmt;

/// Direction of a connector relative to its component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

/// One declared data connector: a typed input or output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Connector {
    name: String,
    direction: Direction,
    optional: bool,
}

impl Connector {
    pub fn input(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: Direction::Input,
            optional: false,
        }
    }

    pub fn output(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: Direction::Output,
            optional: false,
        }
    }

    /// Marks the connector as allowed to stay unmatched.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Builds a connector from the one-letter descriptor announced by
    /// components: `i`/`o` for required, `I`/`O` for optional.
    pub fn from_descriptor(name: impl Into<String>, descr: char) -> Option<Self> {
        let conn = match descr {
            'i' => Self::input(name),
            'o' => Self::output(name),
            'I' => Self::input(name).optional(),
            'O' => Self::output(name).optional(),
            _ => return None,
        };
        Some(conn)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_input(&self) -> bool {
        self.direction == Direction::Input
    }

    pub fn is_output(&self) -> bool {
        self.direction == Direction::Output
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }
}

impl fmt::Display for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let descr = match (self.direction, self.optional) {
            (Direction::Input, false) => 'i',
            (Direction::Input, true) => 'I',
            (Direction::Output, false) => 'o',
            (Direction::Output, true) => 'O',
        };
        match self.direction {
            Direction::Input => write!(f, "->{}({})", descr, self.name),
            Direction::Output => write!(f, "{}->({})", descr, self.name),
        }
    }
}

/// A resolved outbound link handed to a component's `connect` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connection {
    #[serde(rename = "type")]
    pub conn_type: String,
    #[serde(rename = "compName")]
    pub comp_name: String,
    #[serde(rename = "compNum")]
    pub comp_num: u32,
    pub host: String,
    pub port: u16,
}

impl Connection {
    pub fn new(conn_type: &str, target: &ComponentName, host: &str, port: u16) -> Self {
        Self {
            conn_type: conn_type.to_string(),
            comp_name: target.name().to_string(),
            comp_num: target.num(),
            host: host.to_string(),
            port,
        }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = ComponentName::new(self.comp_name.clone(), self.comp_num);
        write!(f, "{}:{}@{}:{}", self.conn_type, target, self.host, self.port)
    }
}
