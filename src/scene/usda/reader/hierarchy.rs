use super::value::{to_value, Literal};
use super::{parse_error, Parser};
use crate::error::SceneError;
use crate::scene::memory::MemoryStage;
use crate::scene::usda::token::Token;
use crate::scene::{child_path, Stage, TimeCode};

fn path_targets(literal: Literal) -> Vec<String> {
    match literal {
        Literal::Path(path) => vec![path],
        Literal::List(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Literal::Path(path) => Some(path),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

impl<'a> Parser<'a> {
    /// `( key = value ... )` after the opening parenthesis
    fn read_metadata(&mut self) -> Result<Vec<(String, Literal)>, SceneError> {
        let mut entries = Vec::new();
        while !self.eat_pun(')') {
            self.skip_list_op();
            let key = self.fetch_identifier()?.to_string();
            self.ensure_pun('=')?;
            entries.push((key, self.read_literal()?));
            let _ = self.eat_pun(';');
        }
        Ok(entries)
    }

    pub(super) fn read_layer(&mut self, stage: &mut MemoryStage) -> Result<(), SceneError> {
        if self.eat_pun('(') {
            for (key, value) in self.read_metadata()? {
                let metadata = &mut stage.metadata;
                match (key.as_str(), value) {
                    ("defaultPrim", Literal::Str(s)) => metadata.default_prim = Some(s),
                    ("doc", Literal::Str(s)) => metadata.doc = Some(s),
                    ("upAxis", Literal::Str(s)) => metadata.up_axis = Some(s),
                    ("metersPerUnit", Literal::Number(n)) => metadata.meters_per_unit = Some(n),
                    ("startTimeCode", Literal::Number(n)) => metadata.start_time_code = Some(n),
                    ("endTimeCode", Literal::Number(n)) => metadata.end_time_code = Some(n),
                    ("framesPerSecond", Literal::Number(n)) => metadata.frames_per_second = Some(n),
                    ("timeCodesPerSecond", Literal::Number(n)) => metadata.time_codes_per_second = Some(n),
                    ("subLayers", Literal::List(items)) => {
                        metadata.sublayers = items
                            .into_iter()
                            .filter_map(|item| match item {
                                Literal::Asset(s) => Some(s),
                                _ => None,
                            })
                            .collect();
                    }
                    _ => log::debug!("ignoring layer metadata `{}`", key),
                }
            }
        }
        while !self.at_end() {
            self.read_prim(stage, "/")?;
        }
        Ok(())
    }

    fn read_prim(&mut self, stage: &mut MemoryStage, parent: &str) -> Result<(), SceneError> {
        let line = self.next_line();
        match self.fetch_next()? {
            Token::Def | Token::Over | Token::Class => {}
            other => return Err(parse_error(line, format!("expected prim specifier, found {:?}", other))),
        }
        let type_name = match self.peek_next() {
            Some(Token::Identifier(_) | Token::NamespacedIdentifier(_)) => self.fetch_identifier()?.to_string(),
            _ => String::new(),
        };
        let name = self.fetch_str()?;
        let path = child_path(parent, &name);
        stage
            .define_prim(&path, &type_name)
            .map_err(|e| parse_error(line, e.to_string()))?;

        if self.eat_pun('(') {
            for (key, value) in self.read_metadata()? {
                if let ("customData", Literal::Dict(entries)) = (key.as_str(), value) {
                    for (k, v) in entries {
                        if let Literal::Str(v) | Literal::Ident(v) = v {
                            stage.set_prim_metadata(&path, &k, &v)?;
                        }
                    }
                }
            }
        }

        self.ensure_pun('{')?;
        while !self.eat_pun('}') {
            match self.peek_next().cloned() {
                Some(Token::Def | Token::Over | Token::Class) => self.read_prim(stage, &path)?,
                Some(Token::VariantSet) => {
                    return Err(parse_error(self.next_line(), "variant sets are not supported"));
                }
                Some(_) => self.read_property(stage, &path)?,
                None if self.at_end() => return Err(parse_error(self.line(), "unterminated prim")),
                // Unlexable text; fetching reports it
                None => {
                    self.fetch_next()?;
                }
            }
        }
        Ok(())
    }

    /// Attribute or relationship, after any `custom`/`uniform`/list-op qualifiers
    fn read_property(&mut self, stage: &mut MemoryStage, prim: &str) -> Result<(), SceneError> {
        self.skip_list_op();
        while matches!(self.peek_next(), Some(Token::Custom | Token::Uniform | Token::Varying)) {
            self.fetch_next()?;
        }
        if self.eat(&Token::Rel) {
            self.read_relationship(stage, prim)
        } else {
            self.read_attribute(stage, prim)
        }
    }

    fn read_relationship(&mut self, stage: &mut MemoryStage, prim: &str) -> Result<(), SceneError> {
        let name = self.fetch_identifier()?;
        let targets = if self.eat_pun('=') {
            path_targets(self.read_literal()?)
        } else {
            Vec::new()
        };
        if self.eat_pun('(') {
            self.read_metadata()?;
        }
        stage.set_relationship_targets(prim, name, &targets)
    }

    fn read_attribute(&mut self, stage: &mut MemoryStage, prim: &str) -> Result<(), SceneError> {
        let line = self.next_line();
        let mut type_name = self.fetch_identifier()?.to_string();
        if self.eat_pun('[') {
            self.ensure_pun(']')?;
            type_name.push_str("[]");
        }
        let full_name = self.fetch_identifier()?;

        if let Some(name) = full_name.strip_suffix(".connect") {
            self.ensure_pun('=')?;
            if let Some(source) = path_targets(self.read_literal()?).into_iter().next() {
                stage.set_connection(prim, name, &type_name, &source)?;
            }
            return Ok(());
        }

        if let Some(name) = full_name.strip_suffix(".timeSamples") {
            self.ensure_pun('=')?;
            self.ensure_pun('{')?;
            stage.declare_attribute(prim, name, &type_name)?;
            while !self.eat_pun('}') {
                let time = match self.read_literal()? {
                    Literal::Number(time) => time,
                    other => return Err(parse_error(self.line(), format!("expected time, found {:?}", other))),
                };
                self.ensure_pun(':')?;
                let sample_line = self.next_line();
                let literal = self.read_literal()?;
                if literal != Literal::None {
                    let value = to_value(&type_name, &literal, sample_line)?;
                    stage.set_attribute(prim, name, value, TimeCode::At(time))?;
                }
                let _ = self.eat_pun(',');
            }
            return Ok(());
        }

        stage.declare_attribute(prim, full_name, &type_name)?;
        if self.eat_pun('=') {
            let literal = self.read_literal()?;
            if literal != Literal::None {
                let value = to_value(&type_name, &literal, line)?;
                stage.set_attribute(prim, full_name, value, TimeCode::Default)?;
            }
        }
        if self.eat_pun('(') {
            for (key, value) in self.read_metadata()? {
                if let Literal::Str(v) | Literal::Ident(v) = value {
                    stage.set_attribute_metadata(prim, full_name, &key, &v)?;
                }
            }
        }
        Ok(())
    }
}
