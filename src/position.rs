use std::fmt::{Display, Formatter};

/// The line and column of a byte offset within a document.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// Resolve a byte offset into a line/column pair by scanning for line breaks.
    ///
    /// Only used for error reporting, so a linear scan is fine even though the
    /// scanner itself never needs line information on the hot path.
    pub fn resolve(bytes: &[u8], offset: usize) -> Self {
        let offset = offset.min(bytes.len());
        let mut line = 1usize;
        let mut last_break = None;
        for (index, byte) in bytes[..offset].iter().enumerate() {
            if *byte == b'\n' {
                line += 1;
                last_break = Some(index);
            }
        }
        let column = match last_break {
            Some(break_at) => offset - break_at,
            None => offset + 1,
        };
        Position::new(line, column)
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_line_first_column() {
        let p = Position::resolve(b"hello", 0);
        assert_eq!(p, Position::new(1, 1));
    }

    #[test]
    fn after_newline_resets_column() {
        let p = Position::resolve(b"ab\ncd", 4);
        assert_eq!(p, Position::new(2, 2));
    }
}
