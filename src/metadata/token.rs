use std::fmt;

use crate::metadata::tables::TableId;

/// A metadata token representing a reference to a metadata table entry.
///
/// Tokens in .NET metadata consist of a 32-bit value where:
/// - The high byte (bits 24-31) indicates the table type
/// - The low 24 bits (bits 0-23) indicate the 1-based row index within that table
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub u32);

impl Token {
    /// Creates a new token from a raw 32-bit value
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Creates a token for a 1-based row in the given table.
    #[must_use]
    pub fn from_table_row(table: TableId, row: u32) -> Self {
        debug_assert!(row <= 0x00FF_FFFF, "row index exceeds 24-bit token space");
        Token((u32::from(table as u8) << 24) | (row & 0x00FF_FFFF))
    }

    /// Creates a user-string token (`0x70` tag) for an offset into the #US heap.
    #[must_use]
    pub fn user_string(offset: u32) -> Self {
        Token(0x7000_0000 | (offset & 0x00FF_FFFF))
    }

    /// Returns the raw token value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Extracts the table type from the token (high byte)
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Extracts the row index from the token (low 24 bits)
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns true if this is a null token (value 0)
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_table_row() {
        let token = Token::from_table_row(TableId::MethodDef, 42);
        assert_eq!(token.value(), 0x0600_002A);
        assert_eq!(token.table(), 0x06);
        assert_eq!(token.row(), 42);
    }

    #[test]
    fn test_user_string_token() {
        let token = Token::user_string(0x1234);
        assert_eq!(token.value(), 0x7000_1234);
    }

    #[test]
    fn test_null_token() {
        assert!(Token::new(0).is_null());
        assert!(!Token::from_table_row(TableId::TypeDef, 1).is_null());
    }
}
