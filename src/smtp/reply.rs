//! Server reply parsing.
//!
//! An SMTP reply is one or more lines carrying the same 3-digit code; a
//! dash after the code marks a continuation line (`250-STARTTLS`), a space
//! marks the last one.

use std::fmt;
use std::io;

#[derive(Debug, Clone)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    /// Positive completion (2xx).
    pub fn is_positive(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// Positive intermediate (3xx), the class `DATA` answers with.
    pub fn is_intermediate(&self) -> bool {
        (300..400).contains(&self.code)
    }

    pub fn is_error(&self) -> bool {
        self.code >= 400
    }

    pub fn text(&self) -> String {
        self.lines.join(" ")
    }

    /// Parse the raw accumulated reply lines. A reply with no parsable code
    /// is indistinguishable from a broken connection.
    pub fn parse(raw: &str) -> io::Result<Self> {
        let mut code = None;
        let mut lines = Vec::new();

        for line in raw.lines() {
            if line.len() < 3 {
                continue;
            }
            let parsed: u16 = line[..3].parse().map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("garbled reply line: {line:?}"),
                )
            })?;
            if code.is_none() {
                code = Some(parsed);
            }
            lines.push(line.get(4..).unwrap_or("").to_owned());
        }

        match code {
            Some(code) => Ok(Reply { code, lines }),
            None => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "empty reply from server",
            )),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.text())
    }
}
