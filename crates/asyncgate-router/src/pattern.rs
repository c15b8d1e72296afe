use serde_json::Value;

use asyncgate_pipeline::JsonMap;

/// Key for the unmatched trailing part of a request path.
pub const REMAINDER_PARAM: &str = "0";

/// One piece of a pattern segment.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Param(String),
}

/// A mount pattern such as `/smartylighting/:streetlightId/dim` or
/// `/user.:userId.signedup`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    normalized: String,
    segments: Vec<Vec<Piece>>,
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Split a segment into literal and `:name` pieces.
///
/// A name runs until the first character outside `[A-Za-z0-9_]`. A `:` not
/// followed by a name character is literal.
fn parse_segment(segment: &str) -> Vec<Piece> {
    let mut pieces = Vec::new();
    let mut literal = String::new();
    let mut rest = segment;

    while let Some(c) = rest.chars().next() {
        let after = &rest[c.len_utf8()..];
        if c == ':' {
            let name_len = after.find(|ch: char| !is_name_char(ch)).unwrap_or(after.len());
            if name_len > 0 {
                if !literal.is_empty() {
                    pieces.push(Piece::Literal(std::mem::take(&mut literal)));
                }
                pieces.push(Piece::Param(after[..name_len].to_string()));
                rest = &after[name_len..];
                continue;
            }
        }
        literal.push(c);
        rest = after;
    }

    if !literal.is_empty() {
        pieces.push(Piece::Literal(literal));
    }
    pieces
}

/// Match one request segment against its pieces, capturing into `params`.
///
/// Parameters are lazy: each takes the shortest non-empty run that lets the
/// rest of the segment match.
fn match_pieces(pieces: &[Piece], input: &str, params: &mut JsonMap) -> bool {
    let Some((first, rest)) = pieces.split_first() else {
        return input.is_empty();
    };

    match first {
        Piece::Literal(expected) => match input.strip_prefix(expected.as_str()) {
            Some(remaining) => match_pieces(rest, remaining, params),
            None => false,
        },
        Piece::Param(name) => {
            let ends = input
                .char_indices()
                .map(|(i, _)| i)
                .skip(1)
                .chain(std::iter::once(input.len()));
            for end in ends.filter(|&end| end > 0) {
                if match_pieces(rest, &input[end..], params) {
                    params.insert(name.clone(), Value::String(percent_decode(&input[..end])));
                    return true;
                }
            }
            false
        }
    }
}

impl RoutePattern {
    /// Parse a pattern. A leading slash is implied and empty segments are ignored.
    pub fn parse(pattern: &str) -> Self {
        let raw: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
        Self {
            normalized: format!("/{}", raw.join("/")),
            segments: raw.into_iter().map(parse_segment).collect(),
        }
    }

    /// The pattern with its implied leading slash.
    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().flatten().filter_map(|piece| match piece {
            Piece::Param(name) => Some(name.as_str()),
            Piece::Literal(_) => None,
        })
    }

    /// Match a request path by prefix, returning the captured parameters.
    ///
    /// Captures are percent-decoded. Any remaining segments are joined under
    /// [`REMAINDER_PARAM`].
    pub fn matches(&self, path: &str) -> Option<JsonMap> {
        let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if path_segments.len() < self.segments.len() {
            return None;
        }

        let mut params = JsonMap::new();
        for (pieces, actual) in self.segments.iter().zip(&path_segments) {
            if !match_pieces(pieces, actual, &mut params) {
                return None;
            }
        }

        let remainder = &path_segments[self.segments.len()..];
        if !remainder.is_empty() {
            params.insert(
                REMAINDER_PARAM.to_string(),
                Value::String(percent_decode(&remainder.join("/"))),
            );
        }

        Some(params)
    }
}

impl std::fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.normalized)
    }
}

/// Decode `%XX` escapes. Malformed escapes are kept verbatim.
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|h| u8::from_str_radix(h, 16).ok());
            if let Some(byte) = hex {
                decoded.push(byte);
                i += 3;
                continue;
            }
        }
        decoded.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&decoded).into_owned()
}
