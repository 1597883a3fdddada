//! Schema rewriter
//!
//! Translates schema namespaces in query text so one logical query can run
//! against both systems. This is a bounded text transform over identifier
//! chains, not SQL parsing:
//!
//! - in table position (after `FROM`, `JOIN`, `INTO`, `UPDATE`, `TABLE`, or
//!   a comma in a `FROM` list) `schema.table` and `database.schema.table`
//!   have the segment before the last one looked up in the mapping
//! - elsewhere only fully qualified columns (`schema.table.column`) are
//!   rewritten; `alias.column` never is
//! - a bare identifier directly after `FROM`, `JOIN`, `INTO`, `UPDATE`,
//!   `SCHEMA` or `USE` is looked up as a schema
//!
//! Only whole segments match, case-insensitively. Everything else, including
//! string literals and comments, is copied through verbatim.

use recon_core::domain::mapping::{SchemaMapping, SystemId};

const BARE_SCHEMA_KEYWORDS: [&str; 6] = ["FROM", "JOIN", "INTO", "UPDATE", "SCHEMA", "USE"];

const TABLE_KEYWORDS: [&str; 5] = ["FROM", "JOIN", "INTO", "UPDATE", "TABLE"];

/// Keywords closing a comma-separated `FROM` list
const FROM_LIST_END: [&str; 17] = [
    "WHERE", "ON", "USING", "GROUP", "ORDER", "HAVING", "LIMIT", "UNION", "EXCEPT", "INTERSECT", "SET",
    "VALUES", "SELECT", "AND", "OR", "WINDOW", "RETURNING",
];

/// Rewrites `query` for `system` using `mapping`
///
/// Queries for systems that do not require translation, and any query when
/// the mapping is empty, are returned unchanged.
pub fn rewrite(query: &str, mapping: &SchemaMapping, system: SystemId) -> String {
    rewrite_from(query, mapping, system, false)
}

/// Rewrites a bare table reference (`schema.table`, `database.schema.table`)
pub fn rewrite_table(table: &str, mapping: &SchemaMapping, system: SystemId) -> String {
    rewrite_from(table, mapping, system, true)
}

fn rewrite_from(query: &str, mapping: &SchemaMapping, system: SystemId, starts_at_table: bool) -> String {
    if !system.requires_translation() || mapping.is_empty() {
        return query.to_string();
    }

    let keys = mapping.keys_longest_first();
    let tokens = tokenize(query);

    let mut out = String::with_capacity(query.len());
    let mut copied = 0;
    let mut prev_word: Option<String> = None;
    let mut table_position = starts_at_table;
    let mut in_from_list = false;
    let mut i = 0;

    while i < tokens.len() {
        match tokens[i].kind {
            Kind::Ident { .. } => {
                let mut chain = vec![i];
                let mut j = i + 1;
                while j + 1 < tokens.len()
                    && tokens[j].kind == Kind::Dot
                    && matches!(tokens[j + 1].kind, Kind::Ident { .. })
                {
                    chain.push(j + 1);
                    j += 2;
                }

                let schema_segment = match chain.len() {
                    1 => prev_word
                        .as_deref()
                        .filter(|w| BARE_SCHEMA_KEYWORDS.contains(w))
                        .map(|_| chain[0]),
                    n if table_position => Some(chain[n - 2]),
                    2 => None,
                    n => Some(chain[n - 3]),
                };

                if let Some(idx) = schema_segment {
                    let token = &tokens[idx];
                    if let Some(replacement) = lookup(&keys, mapping, token.name(query)) {
                        out.push_str(&query[copied..token.start]);
                        match token.kind {
                            Kind::Ident { quote: Some((open, close)) } => {
                                out.push(open);
                                out.push_str(replacement);
                                out.push(close);
                            }
                            _ => out.push_str(replacement),
                        }
                        copied = token.end;
                    }
                }

                prev_word = (chain.len() == 1)
                    .then(|| tokens[chain[0]].name(query).to_ascii_uppercase());
                let word = prev_word.as_deref().unwrap_or_default();
                table_position = TABLE_KEYWORDS.contains(&word);
                if word == "FROM" {
                    in_from_list = true;
                } else if FROM_LIST_END.contains(&word) {
                    in_from_list = false;
                }
                i = j;
            }
            Kind::Trivia => i += 1,
            _ => {
                let text = &query[tokens[i].start..tokens[i].end];
                table_position = in_from_list && text == ",";
                if matches!(text, "(" | ")" | ";") {
                    in_from_list = false;
                }
                prev_word = None;
                i += 1;
            }
        }
    }

    out.push_str(&query[copied..]);
    out
}

fn lookup<'m>(keys: &[&str], mapping: &'m SchemaMapping, segment: &str) -> Option<&'m str> {
    keys.iter()
        .find(|key| key.eq_ignore_ascii_case(segment))
        .and_then(|key| mapping.get(key))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Ident { quote: Option<(char, char)> },
    Dot,
    Literal,
    Trivia,
    Other,
}

#[derive(Debug, Clone, Copy)]
struct Token {
    kind: Kind,
    start: usize,
    end: usize,
}

impl Token {
    /// Identifier text without its quotes
    fn name<'q>(&self, query: &'q str) -> &'q str {
        match self.kind {
            Kind::Ident { quote: Some((open, close)) } => {
                &query[self.start + open.len_utf8()..self.end - close.len_utf8()]
            }
            _ => &query[self.start..self.end],
        }
    }
}

fn tokenize(query: &str) -> Vec<Token> {
    let bytes: Vec<(usize, char)> = query.char_indices().collect();
    let end_of = |pos: usize| bytes.get(pos).map(|(b, _)| *b).unwrap_or(query.len());
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let (start, c) = bytes[pos];
        let next = bytes.get(pos + 1).map(|(_, c)| *c);

        let (kind, consumed) = if c.is_whitespace() {
            let n = count_while(&bytes[pos..], |c| c.is_whitespace());
            (Kind::Trivia, n)
        } else if c == '-' && next == Some('-') {
            let n = count_while(&bytes[pos..], |c| c != '\n');
            (Kind::Trivia, n)
        } else if c == '/' && next == Some('*') {
            let n = block_comment_len(&bytes[pos..]);
            (Kind::Trivia, n)
        } else if c == '\'' {
            (Kind::Literal, delimited_len(&bytes[pos..], '\''))
        } else if c == '"' {
            let n = delimited_len(&bytes[pos..], '"');
            (Kind::Ident { quote: Some(('"', '"')) }, n)
        } else if c == '[' {
            let n = delimited_len(&bytes[pos..], ']');
            (Kind::Ident { quote: Some(('[', ']')) }, n)
        } else if c == '.' {
            (Kind::Dot, 1)
        } else if c.is_alphabetic() || c == '_' {
            let n = count_while(&bytes[pos..], |c| c.is_alphanumeric() || c == '_' || c == '$');
            (Kind::Ident { quote: None }, n)
        } else if c.is_ascii_digit() {
            let n = count_while(&bytes[pos..], |c| c.is_alphanumeric() || c == '.');
            (Kind::Other, n)
        } else {
            (Kind::Other, 1)
        };

        // an unterminated quoted identifier is plain text, not an identifier
        let kind = match kind {
            Kind::Ident { quote: Some((_, close)) }
                if consumed < 2 || bytes[pos + consumed - 1].1 != close =>
            {
                Kind::Other
            }
            k => k,
        };

        tokens.push(Token {
            kind,
            start,
            end: end_of(pos + consumed),
        });
        pos += consumed;
    }

    tokens
}

fn count_while(chars: &[(usize, char)], pred: impl Fn(char) -> bool) -> usize {
    chars.iter().take_while(|(_, c)| pred(*c)).count().max(1)
}

/// Length of a token opened by `chars[0]` and closed by `close`, doubled closers escaping
fn delimited_len(chars: &[(usize, char)], close: char) -> usize {
    let mut i = 1;
    while i < chars.len() {
        if chars[i].1 == close {
            if chars.get(i + 1).map(|(_, c)| *c) == Some(close) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

fn block_comment_len(chars: &[(usize, char)]) -> usize {
    let mut i = 2;
    while i + 1 < chars.len() {
        if chars[i].1 == '*' && chars[i + 1].1 == '/' {
            return i + 2;
        }
        i += 1;
    }
    chars.len()
}
