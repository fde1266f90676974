use super::{parse_error, Parser};
use crate::error::SceneError;
use crate::scene::usda::token::Token;

/// Token stream operations
impl<'a> Parser<'a> {
    /// Fetches the next token, failing at end of input or on unlexable text
    pub(super) fn fetch_next(&mut self) -> Result<Token<'a>, SceneError> {
        let Some((token, span)) = self.iter.next() else {
            return Err(parse_error(self.line(), "unexpected end of file"));
        };
        self.last_offset = span.start;
        token.map_err(|()| parse_error(self.line(), format!("unexpected `{}`", &self.source[span])))
    }

    /// Peeks at the next token; lexing errors read as `None` until fetched
    pub(super) fn peek_next(&mut self) -> Option<&Token<'a>> {
        self.iter.peek().and_then(|(token, _)| token.as_ref().ok())
    }

    pub(super) fn at_end(&mut self) -> bool {
        self.iter.peek().is_none()
    }

    fn advance(&mut self) {
        if let Some((_, span)) = self.iter.next() {
            self.last_offset = span.start;
        }
    }

    pub(super) fn is_next(&mut self, expected: &Token<'a>) -> bool {
        self.peek_next() == Some(expected)
    }

    /// Consumes the next token if it equals `expected`
    pub(super) fn eat(&mut self, expected: &Token<'a>) -> bool {
        if self.is_next(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(super) fn eat_pun(&mut self, value: char) -> bool {
        self.eat(&Token::Punctuation(value))
    }

    pub(super) fn ensure_pun(&mut self, value: char) -> Result<(), SceneError> {
        let line = self.next_line();
        if self.eat_pun(value) {
            Ok(())
        } else {
            Err(parse_error(line, format!("expected `{}`", value)))
        }
    }

    /// Fetches a plain or namespaced identifier
    pub(super) fn fetch_identifier(&mut self) -> Result<&'a str, SceneError> {
        match self.fetch_next()? {
            Token::Identifier(name) | Token::NamespacedIdentifier(name) => Ok(name),
            other => Err(parse_error(self.line(), format!("expected identifier, found {:?}", other))),
        }
    }

    pub(super) fn fetch_str(&mut self) -> Result<String, SceneError> {
        match self.fetch_next()? {
            Token::String(text) => Ok(text),
            other => Err(parse_error(self.line(), format!("expected string, found {:?}", other))),
        }
    }

    /// Skips a list-op prefix such as `prepend` before metadata or a relationship
    pub(super) fn skip_list_op(&mut self) {
        while matches!(
            self.peek_next(),
            Some(Token::Prepend | Token::Append | Token::Add | Token::Delete | Token::Reorder)
        ) {
            self.advance();
        }
    }
}
