use std::collections::VecDeque;
use std::io::{self, BufRead};

/// Outcome of reading one value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scan<T> {
    Value(T),
    /// The token was not what was asked for; the rest of its line is dropped
    Malformed,
    /// Input is exhausted
    End,
}

/// Whitespace-delimited token reader in the spirit of `scanf`.
///
/// Tokens may be spread over several lines or share one line, so
/// `1 0 1 Merlin Archie` on a single line answers five prompts. Tokens are
/// raw bytes; nothing but whitespace is special.
pub struct TokenReader<R> {
    reader: R,
    pending: VecDeque<Vec<u8>>,
}

/// `isspace` in the C locale, vertical tab included
fn is_space(byte: &u8) -> bool {
    byte.is_ascii_whitespace() || *byte == 0x0b
}

impl<R: BufRead> TokenReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: VecDeque::new(),
        }
    }

    /// Next token, `None` once input runs dry
    pub fn word(&mut self) -> io::Result<Option<Vec<u8>>> {
        while self.pending.is_empty() {
            let mut line = Vec::new();
            if self.reader.read_until(b'\n', &mut line)? == 0 {
                return Ok(None);
            }
            self.pending.extend(
                line.split(is_space)
                    .filter(|token| !token.is_empty())
                    .map(<[u8]>::to_vec),
            );
        }
        Ok(self.pending.pop_front())
    }

    /// Next token as a decimal integer
    pub fn int(&mut self) -> io::Result<Scan<i64>> {
        let Some(token) = self.word()? else {
            return Ok(Scan::End);
        };

        match std::str::from_utf8(&token).ok().and_then(|t| t.parse::<i64>().ok()) {
            Some(value) => Ok(Scan::Value(value)),
            None => {
                self.pending.clear();
                Ok(Scan::Malformed)
            }
        }
    }
}
