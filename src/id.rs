//! Polymorphic element identifier.
//!
//! A wire id is either an integer or an opaque string (§9 of the design
//! notes). Ordering and arithmetic are only defined within a single
//! variant; mixing kinds in one stream is a configuration error that the
//! driver's `IdAllocator` catches at the boundary.

use std::fmt;

use languageserver_types::NumberOrString;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Number(u64),
    String(String),
}

impl Id {
    pub fn is_number(&self) -> bool {
        matches!(self, Id::Number(_))
    }

    pub fn as_number(&self) -> Option<u64> {
        match self {
            Id::Number(n) => Some(*n),
            Id::String(_) => None,
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Number(n) => write!(f, "{}", n),
            Id::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<u64> for Id {
    fn from(n: u64) -> Self {
        Id::Number(n)
    }
}

impl From<NumberOrString> for Id {
    fn from(v: NumberOrString) -> Self {
        match v {
            NumberOrString::Number(n) => Id::Number(n as u64),
            NumberOrString::String(s) => Id::String(s),
        }
    }
}

impl From<Id> for NumberOrString {
    fn from(id: Id) -> Self {
        match id {
            Id::Number(n) => NumberOrString::Number(n as u64),
            Id::String(s) => NumberOrString::String(s),
        }
    }
}

/// Tracks whether the stream in play is integer- or string-keyed, and
/// mints fresh ids for the linker's deferred attach queue.
///
/// The mode is pinned by the first id observed; a later id of the other
/// kind is a fatal `ConfigError` per the design notes ("mixing across
/// variants within one stream is a fatal error").
#[derive(Debug, Default)]
pub struct IdAllocator {
    mode: Option<IdMode>,
    max_seen: u64,
    fresh_counter: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdMode {
    Numeric,
    Opaque,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observes an id from the source stream, pinning the mode on first
    /// use. Returns `Err` if the id's kind contradicts the pinned mode.
    pub fn observe(&mut self, id: &Id) -> Result<(), String> {
        let kind = match id {
            Id::Number(_) => IdMode::Numeric,
            Id::String(_) => IdMode::Opaque,
        };
        match self.mode {
            None => self.mode = Some(kind),
            Some(m) if m == kind => {}
            Some(_) => {
                return Err(format!(
                    "id `{}` does not match the id mode established by earlier elements",
                    id
                ))
            }
        }
        if let Id::Number(n) = id {
            self.max_seen = self.max_seen.max(*n);
        }
        Ok(())
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.mode, Some(IdMode::Numeric))
    }

    /// Mints ids for the linker's deferred batch. Under numeric mode these
    /// are a dense run starting at `max_source_id + 1`; under opaque mode
    /// they are fresh strings guaranteed not to collide with source ids
    /// (the source never emits this prefix).
    pub fn mint(&mut self) -> Result<Id, String> {
        match self.mode {
            Some(IdMode::Numeric) => {
                let next = self
                    .max_seen
                    .checked_add(1 + self.fresh_counter)
                    .ok_or_else(|| "id space exhausted while renumbering attach queue".to_string())?;
                self.fresh_counter += 1;
                Ok(Id::Number(next))
            }
            Some(IdMode::Opaque) | None => {
                self.fresh_counter += 1;
                Ok(Id::String(format!("$generated{}", self.fresh_counter)))
            }
        }
    }
}
