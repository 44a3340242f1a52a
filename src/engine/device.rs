use std::fmt;
use regex::Regex;
use serde::{Serialize, Deserialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub index:       usize,
    pub id:          Option<u32>,
    pub name:        String,
    pub description: String,
}

impl Device {
    /// Engines report devices as `"<id>_<description>"`; anything else is
    /// taken as a bare name.
    pub fn parse(index: usize, name: &str) -> Self {
        let split = name.split_once('_').and_then(|(id, rest)| {
            Some((id.parse().ok()?, rest))
        });

        let (id, description) = match split {
            Some((id, rest)) => (Some(id), rest),
            None             => (None, name),
        };

        Self {
            index:       index,
            id:          id,
            name:        name.to_owned(),
            description: description.to_owned(),
        }
    }

    pub fn display(&self) -> &str {
        match self.description.as_str() {
            ""   => &self.name,
            desc => desc,
        }
    }
}

/// First device whose name or description matches `pattern`.
pub fn find<'a>(devices: &'a [Device], pattern: &Regex) -> Option<&'a Device> {
    devices.iter().find(|d| {
        pattern.is_match(&d.name) || pattern.is_match(&d.description)
    })
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.index, self.display())
    }
}
