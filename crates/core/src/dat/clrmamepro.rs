//! Plain-text clrmamepro catalogs:
//!
//! ```text
//! clrmamepro ( name "System" version 2024 )
//! game ( name "Title (USA)" rom ( name "Title (USA).bin" size 1024 crc 0123abcd ) )
//! ```

use super::{ParseWarning, RawCatalog, RawRom};
use crate::domain::CatalogHeader;
use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Open,
    Close,
    Word(String),
    Quoted(String),
}

/// Tokenize as far as possible; a lexing error ends the stream early.
fn tokenize(text: &str) -> (Vec<Token>, Option<String>) {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '\\' => {
                            if let Some((_, escaped)) = chars.next() {
                                value.push(escaped);
                            }
                        }
                        '"' => {
                            closed = true;
                            break;
                        }
                        c => value.push(c),
                    }
                }
                if !closed {
                    return (tokens, Some(format!("unterminated string at byte {offset}")));
                }
                tokens.push(Token::Quoted(value));
            }
            _ => {
                let mut word = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_whitespace() || c == '(' || c == ')' {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }

    (tokens, None)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Atom(String),
    Block(Vec<(String, Value)>),
}

/// Deepest `( ... )` nesting accepted. Real catalogs use three levels.
const MAX_DEPTH: usize = 64;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    /// Parse `key value` pairs up to the matching `)`. The opening `(` is already consumed.
    fn block(&mut self, depth: usize) -> Result<Vec<(String, Value)>, String> {
        if depth > MAX_DEPTH {
            return Err("nesting too deep".to_string());
        }
        let mut pairs = Vec::new();
        loop {
            match self.next() {
                Some(Token::Close) => return Ok(pairs),
                Some(Token::Word(key)) => {
                    let value = match self.peek() {
                        Some(Token::Open) => {
                            self.pos += 1;
                            Value::Block(self.block(depth + 1)?)
                        }
                        Some(Token::Word(_)) | Some(Token::Quoted(_)) => match self.next() {
                            Some(Token::Word(v)) | Some(Token::Quoted(v)) => Value::Atom(v),
                            _ => Value::Atom(String::new()),
                        },
                        Some(Token::Close) => Value::Atom(String::new()),
                        None => return Err("unbalanced parentheses".to_string()),
                    };
                    pairs.push((key.to_ascii_lowercase(), value));
                }
                Some(Token::Quoted(_)) => {}
                Some(Token::Open) => {
                    self.block(depth + 1)?;
                }
                None => return Err("unbalanced parentheses".to_string()),
            }
        }
    }

    /// Next top-level `name ( ... )` item, skipping stray tokens.
    fn top_level(&mut self) -> Option<Result<(String, Vec<(String, Value)>), String>> {
        loop {
            match self.next()? {
                Token::Word(name) => {
                    if self.peek() == Some(&Token::Open) {
                        self.pos += 1;
                        return Some(self.block(1).map(|b| (name.to_ascii_lowercase(), b)));
                    }
                }
                Token::Open => {
                    if let Err(err) = self.block(1) {
                        return Some(Err(err));
                    }
                }
                Token::Close | Token::Quoted(_) => {}
            }
        }
    }
}

fn atom<'a>(pairs: &'a [(String, Value)], key: &str) -> Option<&'a str> {
    pairs.iter().find_map(|(k, v)| match v {
        Value::Atom(s) if k == key => Some(s.as_str()),
        _ => None,
    })
}

fn header_from(pairs: &[(String, Value)]) -> CatalogHeader {
    let get = |key: &str| atom(pairs, key).unwrap_or_default().trim().to_string();
    CatalogHeader {
        name: get("name"),
        description: get("description"),
        version: get("version"),
        author: get("author"),
        homepage: get("homepage"),
    }
}

pub fn parse(text: &str) -> Result<RawCatalog, ParseError> {
    let (tokens, lex_error) = tokenize(text);
    let mut parser = Parser { tokens, pos: 0 };
    let mut catalog = RawCatalog::default();
    let mut failure = lex_error;

    while let Some(item) = parser.top_level() {
        let (name, pairs) = match item {
            Ok(item) => item,
            Err(err) => {
                failure = Some(err);
                break;
            }
        };

        match name.as_str() {
            "clrmamepro" => catalog.header = header_from(&pairs),
            "game" | "machine" | "resource" => {
                catalog.games_seen += 1;
                let game_name = atom(&pairs, "name").unwrap_or_default().trim().to_string();
                let region = atom(&pairs, "region").map(str::to_string);
                let languages = atom(&pairs, "languages").map(str::to_string);

                for (key, value) in &pairs {
                    if key != "rom" && key != "disk" {
                        continue;
                    }
                    match value {
                        Value::Block(rom) => {
                            let get = |k: &str| atom(rom, k).map(str::to_string);
                            catalog.roms.push(RawRom {
                                game_name: game_name.clone(),
                                game_region: region.clone(),
                                game_languages: languages.clone(),
                                name: get("name"),
                                size: get("size"),
                                crc: get("crc"),
                                md5: get("md5"),
                                sha1: get("sha1"),
                                sha256: get("sha256"),
                                status: get("status").or_else(|| get("flags")),
                            });
                        }
                        Value::Atom(v) => catalog.warnings.push(ParseWarning::MalformedEntry {
                            game: game_name.clone(),
                            rom: v.clone(),
                            reason: format!("`{key}` is not a block"),
                        }),
                    }
                }
            }
            _ => {}
        }
    }

    if let Some(reason) = failure {
        if catalog.roms.is_empty() {
            return Err(ParseError::Malformed(reason));
        }
        catalog.warnings.push(ParseWarning::Truncated {
            reason,
            entries_read: catalog.roms.len(),
        });
    }

    if catalog.games_seen == 0 {
        return Err(ParseError::Malformed(
            "no clrmamepro game blocks found".to_string(),
        ));
    }
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_game_and_rom() {
        let text = r#"clrmamepro (
	name "Nintendo - Super Nintendo Entertainment System"
	description "Nintendo - SNES"
	version 20240101
)

game (
	name "F-Zero (USA)"
	description "F-Zero (USA)"
	region "USA"
	rom ( name "F-Zero (USA).sfc" size 524288 crc aa0e31de md5 5f4bd1e2a4e1c8e8e0c1c3b5e5f0d0e1 sha1 bc0b6e9a37b6b1d5e5fd6b5e9b0a6e8c5a7a5a0c )
)
"#;
        let raw = parse(text).unwrap();
        assert_eq!(raw.header.name, "Nintendo - Super Nintendo Entertainment System");
        assert_eq!(raw.header.version, "20240101");
        assert_eq!(raw.roms.len(), 1);
        let rom = &raw.roms[0];
        assert_eq!(rom.game_name, "F-Zero (USA)");
        assert_eq!(rom.game_region.as_deref(), Some("USA"));
        assert_eq!(rom.size.as_deref(), Some("524288"));
        assert_eq!(rom.crc.as_deref(), Some("aa0e31de"));
    }

    #[test]
    fn test_escaped_quotes_and_parens_in_names() {
        let text = r#"game ( name "Say \"Hi\" (Japan)" rom ( name "hi (1).bin" size 1 crc 00000001 ) )"#;
        let raw = parse(text).unwrap();
        assert_eq!(raw.roms[0].game_name, "Say \"Hi\" (Japan)");
        assert_eq!(raw.roms[0].name.as_deref(), Some("hi (1).bin"));
    }

    #[test]
    fn test_disk_blocks_and_multiple_roms() {
        let text = r#"game (
	name "Disc Game (Europe)"
	rom ( name "track01.bin" size 100 crc 00000001 )
	rom ( name "track02.bin" size 200 crc 00000002 )
	disk ( name "disc" sha1 0123456789abcdef0123456789abcdef01234567 )
)"#;
        let raw = parse(text).unwrap();
        assert_eq!(raw.roms.len(), 3);
        assert!(raw.roms[2].size.is_none());
        assert!(raw.roms[2].sha1.is_some());
    }

    #[test]
    fn test_rom_without_block_is_warning() {
        let text = r#"game ( name "X" rom "oops" rom ( name "x.bin" size 1 crc 00000001 ) )"#;
        let raw = parse(text).unwrap();
        assert_eq!(raw.roms.len(), 1);
        assert!(matches!(raw.warnings[0], ParseWarning::MalformedEntry { .. }));
    }

    #[test]
    fn test_unbalanced_tail_is_truncation() {
        let text = r#"game ( name "A" rom ( name "a.bin" size 1 crc 00000001 ) )
game ( name "B" rom ( name "b.bin" size 1 crc 00000002 )"#;
        let raw = parse(text).unwrap();
        assert_eq!(raw.roms.len(), 1);
        assert!(matches!(raw.warnings.last(), Some(ParseWarning::Truncated { .. })));
    }

    #[test]
    fn test_deep_nesting_is_truncation_not_overflow() {
        let mut text = String::from(r#"game ( name "A" rom ( name "a.bin" size 1 crc 00000001 ) )
game ( name "B" "#);
        text.push_str(&"x ( ".repeat(200_000));
        let raw = parse(&text).unwrap();
        assert_eq!(raw.roms.len(), 1);
        let Some(ParseWarning::Truncated { reason, .. }) = raw.warnings.last() else {
            panic!("expected truncation warning");
        };
        assert_eq!(reason, "nesting too deep");
    }

    #[test]
    fn test_deep_nesting_alone_is_malformed() {
        let text = "game ( ".repeat(1_000);
        assert!(matches!(parse(&text), Err(ParseError::Malformed(_))));
    }

    #[test]
    fn test_no_blocks_is_malformed() {
        assert!(matches!(parse("just some words"), Err(ParseError::Malformed(_))));
        assert!(matches!(parse("game ( name \"A\""), Err(ParseError::Malformed(_))));
    }
}
