use std::{fmt, str::FromStr};

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::{Error, Time};

/// Position of an item in a creation-time-descending listing
///
/// Clients must treat the string form as opaque and pass it back verbatim.
#[derive(Clone, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cursor {
    created_at: Time,
    id: Uuid,
}

impl Cursor {
    pub fn new(created_at: Time, id: Uuid) -> Cursor {
        Cursor { created_at, id }
    }

    pub fn created_at(&self) -> Time {
        self.created_at
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}",
            self.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            self.id
        )
    }
}

impl FromStr for Cursor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Cursor, Error> {
        let invalid = || Error::InvalidCursor(String::from(s));
        let (date, id) = s.rsplit_once('_').ok_or_else(invalid)?;
        let created_at = DateTime::parse_from_rfc3339(date)
            .map_err(|_| invalid())?
            .with_timezone(&Utc);
        let id = Uuid::try_parse(id).map_err(|_| invalid())?;
        Ok(Cursor { created_at, id })
    }
}

impl TryFrom<String> for Cursor {
    type Error = Error;

    fn try_from(s: String) -> Result<Cursor, Error> {
        Cursor::from_str(&s)
    }
}

impl From<Cursor> for String {
    fn from(c: Cursor) -> String {
        c.to_string()
    }
}

/// Anything that can be listed with the cursor pagination protocol
pub trait Paginated {
    fn position(&self) -> Cursor;
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,

    /// Position to resume from, `None` on the last page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
}

impl<T: Paginated> Page<T> {
    /// Builds a page out of `items` (newest first) and the oldest item of the whole listing
    ///
    /// There is a further page iff the oldest item is not the last one of this page.
    pub fn new(items: Vec<T>, oldest: Option<&T>) -> Page<T> {
        let cursor = match (oldest, items.last()) {
            (Some(oldest), Some(last)) => {
                let last = last.position();
                (oldest.position().id() != last.id()).then_some(last)
            }
            _ => None,
        };
        Page { items, cursor }
    }
}
