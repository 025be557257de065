//! Move-address text as spoken by UCI engines (`e2e4`, `e7e8q`).
//!
//! The engine never sends anything else, so a string that does not parse is a
//! protocol violation rather than user error.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotationError {
    #[error("malformed move address: {0:?}")]
    MalformedAddress(String),
    #[error("malformed square: {0:?}")]
    MalformedSquare(String),
    #[error("unknown promotion piece: {0:?}")]
    UnknownPromotion(char),
}

/// A board square, file `a..=h` and rank `1..=8`, stored zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Square {
    file: u8,
    rank: u8,
}

impl Square {
    #[must_use]
    pub const fn new(file: u8, rank: u8) -> Option<Self> {
        if file < 8 && rank < 8 {
            Some(Self { file, rank })
        } else {
            None
        }
    }

    #[must_use]
    pub const fn file(self) -> u8 {
        self.file
    }

    #[must_use]
    pub const fn rank(self) -> u8 {
        self.rank
    }

    const fn from_bytes(file: u8, rank: u8) -> Option<Self> {
        if matches!(file, b'a'..=b'h') && matches!(rank, b'1'..=b'8') {
            Some(Self {
                file: file - b'a',
                rank: rank - b'1',
            })
        } else {
            None
        }
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            char::from(b'a' + self.file),
            char::from(b'1' + self.rank)
        )
    }
}

impl FromStr for Square {
    type Err = NotationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.as_bytes() {
            [file, rank] => Self::from_bytes(*file, *rank),
            _ => None,
        }
        .ok_or_else(|| NotationError::MalformedSquare(s.to_string()))
    }
}

impl Serialize for Square {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Square {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PromotionPiece {
    #[serde(rename = "q")]
    Queen,
    #[serde(rename = "r")]
    Rook,
    #[serde(rename = "b")]
    Bishop,
    #[serde(rename = "n")]
    Knight,
}

impl PromotionPiece {
    #[must_use]
    pub const fn as_char(self) -> char {
        match self {
            Self::Queen => 'q',
            Self::Rook => 'r',
            Self::Bishop => 'b',
            Self::Knight => 'n',
        }
    }

    /// # Errors
    ///
    /// Anything but `q`, `r`, `b` or `n`.
    pub fn from_char(c: char) -> Result<Self, NotationError> {
        match c {
            'q' => Ok(Self::Queen),
            'r' => Ok(Self::Rook),
            'b' => Ok(Self::Bishop),
            'n' => Ok(Self::Knight),
            other => Err(NotationError::UnknownPromotion(other)),
        }
    }
}

/// Structured form of an address: origin, destination, optional promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MoveDescriptor {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<PromotionPiece>,
}

impl MoveDescriptor {
    #[must_use]
    pub const fn new(from: Square, to: Square, promotion: Option<PromotionPiece>) -> Self {
        Self {
            from,
            to,
            promotion,
        }
    }
}

/// Returns true for exactly `[a-h][1-8][a-h][1-8][qrbn]?`.
#[must_use]
pub fn is_well_formed(text: &str) -> bool {
    decode(text).is_ok()
}

/// Parses an address such as `e2e4` or `a7a8q`.
///
/// # Errors
///
/// Returns [`NotationError::MalformedAddress`] for anything that is not 4 or 5
/// ASCII characters in the address pattern.
pub fn decode(text: &str) -> Result<MoveDescriptor, NotationError> {
    let malformed = || NotationError::MalformedAddress(text.to_string());
    let (squares, promotion) = match text.as_bytes() {
        [a, b, c, d] => ([*a, *b, *c, *d], None),
        [a, b, c, d, p] => {
            let piece = PromotionPiece::from_char(char::from(*p)).map_err(|_| malformed())?;
            ([*a, *b, *c, *d], Some(piece))
        }
        _ => return Err(malformed()),
    };
    let [ff, fr, tf, tr] = squares;
    let from = Square::from_bytes(ff, fr).ok_or_else(malformed)?;
    let to = Square::from_bytes(tf, tr).ok_or_else(malformed)?;
    Ok(MoveDescriptor::new(from, to, promotion))
}

#[must_use]
pub fn encode(from: Square, to: Square, promotion: Option<PromotionPiece>) -> String {
    let mut text = format!("{from}{to}");
    if let Some(piece) = promotion {
        text.push(piece.as_char());
    }
    text
}

impl fmt::Display for MoveDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode(self.from, self.to, self.promotion))
    }
}

impl FromStr for MoveDescriptor {
    type Err = NotationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s)
    }
}

impl Serialize for MoveDescriptor {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MoveDescriptor {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        decode(&text).map_err(serde::de::Error::custom)
    }
}
