//! Customer session tokens.

use std::str::FromStr;

use uuid::Uuid;

use crate::error::TypesError;

/// Opaque identifier issued to a customer session when its connection is
/// accepted.
///
/// Restaurants echo it back with every estimate so the broker can route the
/// answer to the customer that placed the order. The text form is a
/// hyphenated UUID and never contains `:`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(Uuid);

impl Token {
    /// Generate a fresh random token.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for Token {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for Token {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| TypesError::InvalidToken(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_unique() {
        let a = Token::new();
        let b = Token::new();
        assert_ne!(a, b);
    }

    #[test]
    fn display_is_hyphenated_uuid() {
        let s = Token::new().to_string();
        assert_eq!(s.len(), 36);
        assert!(!s.contains(':'));
    }

    #[test]
    fn parse_display_form() {
        let token = Token::new();
        let parsed: Token = token.to_string().parse().unwrap();
        assert_eq!(parsed, token);
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = "USER_1712345".parse::<Token>().unwrap_err();
        assert_eq!(err, TypesError::InvalidToken("USER_1712345".to_string()));
    }
}
