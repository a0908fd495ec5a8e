//! Key scripts: a compact notation for feeding input actions from the
//! command line.
//!
//! ```text
//! 0-9      digit            n / p    next / previous page (moves the catch cursor)
//! < / >    sub-page         N / P    TOP-assisted next / previous
//! r g y b  colour keys      s        select (start / confirm catching)
//! z        zoom             e        enlarge
//! h        reveal           space    separator
//! ```

use teletext::{Action, ColourKey};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Unknown key {key:?} at position {position}")]
pub struct UnknownKey {
    pub key: char,
    pub position: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Action(Action),
    TopStep { forward: bool },
}

pub fn parse_keys(script: &str) -> Result<Vec<Key>, UnknownKey> {
    script
        .chars()
        .enumerate()
        .filter(|(_, c)| !c.is_whitespace() && *c != ',')
        .map(|(position, c)| {
            let action = match c {
                '0'..='9' => Action::Digit(c as u8 - b'0'),
                'n' => Action::Up,
                'p' => Action::Down,
                '<' => Action::Left,
                '>' => Action::Right,
                'r' => Action::Colour(ColourKey::Red),
                'g' => Action::Colour(ColourKey::Green),
                'y' => Action::Colour(ColourKey::Yellow),
                'b' => Action::Colour(ColourKey::Blue),
                's' => Action::Select,
                'z' => Action::ZoomToggle,
                'e' => Action::SizeToggle,
                'h' => Action::Hint,
                'N' => return Ok(Key::TopStep { forward: true }),
                'P' => return Ok(Key::TopStep { forward: false }),
                key => return Err(UnknownKey { key, position }),
            };
            Ok(Key::Action(action))
        })
        .collect()
}
