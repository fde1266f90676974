//! USDA text reader
//!
//! Understands the subset of the text format this crate writes plus the
//! common shapes produced by other tools: typed attributes, time samples,
//! connections, relationships, customData and layer metadata. Variant sets
//! and composition arcs other than sublayers are rejected.

mod hierarchy;
mod token_ops;
mod value;

use std::iter::Peekable;
use std::path::Path;

use logos::{Logos, SpannedIter};

use super::token::Token;
use crate::error::SceneError;
use crate::scene::memory::MemoryStage;

fn parse_error(line: usize, message: impl Into<String>) -> SceneError {
    SceneError::Parse {
        line,
        message: message.into(),
    }
}

/// Parser turning the token stream into stage edits
struct Parser<'a> {
    iter: Peekable<SpannedIter<'a, Token<'a>>>,
    source: &'a str,
    line_starts: Vec<usize>,
    last_offset: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            iter: Token::lexer(source).spanned().peekable(),
            source,
            line_starts,
            last_offset: 0,
        }
    }

    fn line_of(&self, offset: usize) -> usize {
        self.line_starts.partition_point(|&start| start <= offset)
    }

    /// Line of the most recently consumed token
    fn line(&self) -> usize {
        self.line_of(self.last_offset)
    }

    /// Line of the token about to be consumed
    fn next_line(&mut self) -> usize {
        let offset = match self.iter.peek() {
            Some((_, span)) => span.start,
            None => self.last_offset,
        };
        self.line_of(offset)
    }
}

/// Parses USDA text into a stage whose identifier is `identifier`
pub fn parse_stage(text: &str, identifier: &Path) -> Result<MemoryStage, SceneError> {
    if !text.trim_start().starts_with("#usda") {
        return Err(parse_error(1, "missing `#usda` header"));
    }
    let mut stage = MemoryStage::new(identifier);
    Parser::new(text).read_layer(&mut stage)?;
    Ok(stage)
}
