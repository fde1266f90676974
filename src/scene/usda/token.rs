//! Lexical tokens of the USDA text format

use logos::{Lexer, Logos};

fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn trim(slice: &str, quote: usize) -> &str {
    &slice[quote..slice.len() - quote]
}

fn quoted<'a>(lex: &mut Lexer<'a, Token<'a>>) -> String {
    unescape(trim(lex.slice(), 1))
}

fn triple_quoted<'a>(lex: &mut Lexer<'a, Token<'a>>) -> String {
    trim(lex.slice(), 3).to_string()
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"([ \t\r\n\f]+|#[^\n]*)")]
pub enum Token<'a> {
    #[token("def")]
    Def,
    #[token("over")]
    Over,
    #[token("class")]
    Class,
    #[token("rel")]
    Rel,
    #[token("custom")]
    Custom,
    #[token("uniform")]
    Uniform,
    #[token("varying")]
    Varying,
    #[token("prepend")]
    Prepend,
    #[token("append")]
    Append,
    #[token("add")]
    Add,
    #[token("delete")]
    Delete,
    #[token("reorder")]
    Reorder,
    #[token("variantSet")]
    VariantSet,
    #[token("None")]
    None,

    #[regex(r"[()\[\]{}=,;:]", |lex| lex.slice().chars().next())]
    Punctuation(char),

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice())]
    Identifier(&'a str),

    /// `inputs:diffuseColor`, `outputs:surface.connect` and the like
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*([:.][A-Za-z_][A-Za-z0-9_]*)+", |lex| lex.slice())]
    NamespacedIdentifier(&'a str),

    #[regex(r"[-+]?([0-9]+\.?[0-9]*|\.[0-9]+)([eE][-+]?[0-9]+)?", |lex| lex.slice())]
    Number(&'a str),

    #[regex(r#""([^"\\\n]|\\.)*""#, quoted)]
    #[regex(r#"'([^'\\\n]|\\.)*'"#, quoted)]
    #[regex(r#""""([^"]|"[^"]|""[^"])*""""#, triple_quoted)]
    String(String),

    #[regex(r"@[^@\n]*@", |lex| trim(lex.slice(), 1))]
    #[regex(r"@@@([^@]|@[^@]|@@[^@])*@@@", |lex| trim(lex.slice(), 3))]
    AssetRef(&'a str),

    #[regex(r"<[^<>\n]*>", |lex| trim(lex.slice(), 1))]
    PathRef(&'a str),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<Token<'_>> {
        Token::lexer(text).map(|t| t.unwrap()).collect()
    }

    #[test]
    fn test_keywords_and_names() {
        assert_eq!(
            tokens("def Mesh \"Ground\" { uniform token info:id }"),
            vec![
                Token::Def,
                Token::Identifier("Mesh"),
                Token::String("Ground".into()),
                Token::Punctuation('{'),
                Token::Uniform,
                Token::Identifier("token"),
                Token::NamespacedIdentifier("info:id"),
                Token::Punctuation('}'),
            ]
        );
        assert_eq!(tokens("define"), vec![Token::Identifier("define")]);
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            tokens("@tex.png@ </World/Mat.outputs:surface> -1.5e-3 'it\\'s' \"\"\"two\nlines\"\"\""),
            vec![
                Token::AssetRef("tex.png"),
                Token::PathRef("/World/Mat.outputs:surface"),
                Token::Number("-1.5e-3"),
                Token::String("it's".into()),
                Token::String("two\nlines".into()),
            ]
        );
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(
            tokens("#usda 1.0\n# note\n0: 1"),
            vec![Token::Number("0"), Token::Punctuation(':'), Token::Number("1")]
        );
    }

    #[test]
    fn test_unknown_character_is_error() {
        assert!(Token::lexer("float x = $").any(|t| t.is_err()));
    }
}
