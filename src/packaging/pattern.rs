//! Archive Path Patterns
//!
//! Packaging rules select archive paths via glob-style patterns. This module
//! implements the pattern language. Patterns are compiled once when rules
//! are loaded, so malformed patterns are refused before any resolution
//! starts, and are then matched against archive paths segment by segment.
//!
//! A pattern is a sequence of segments separated by `/`, matched against the
//! `/`-separated segments of an archive path. A leading `/` is ignored on
//! both sides. The following wildcards are supported:
//!
//!  * `*` within a segment matches any sequence of characters, including
//!    the empty sequence, but never crosses a segment boundary.
//!  * `?` matches exactly one character.
//!  * `{a,b,c}` matches exactly one of the literal alternatives.
//!  * A segment consisting of `**` matches zero or more whole segments and
//!    can be placed anywhere in the pattern.
//!  * A final segment consisting of `*` matches one or more whole segments.
//!    Hence, `META-INF/*` matches everything below `META-INF/`, but not
//!    `META-INF` itself.

/// Pattern Errors
///
/// This is the exhaustive list of reasons a pattern is refused at compile
/// time. Each error carries the offending pattern verbatim.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum PatternError {
    /// The pattern is empty, or consists of a single `/`.
    #[error("empty pattern")]
    Empty,
    /// The pattern contains an empty segment (`a//b` or a trailing `/`).
    #[error("pattern '{0}' contains an empty segment")]
    EmptySegment(String),
    /// The pattern contains a `.` or `..` segment.
    #[error("pattern '{0}' contains a relative segment")]
    RelativeSegment(String),
    /// The pattern contains a backslash. Archive paths use `/` exclusively.
    #[error("pattern '{0}' contains a backslash")]
    Backslash(String),
    /// A brace is opened but not closed, or closed but not opened.
    #[error("pattern '{0}' contains unbalanced braces")]
    UnbalancedBrace(String),
    /// A brace is opened within an alternation.
    #[error("pattern '{0}' contains nested braces")]
    NestedBrace(String),
    /// `**` is combined with other characters in a single segment.
    #[error("pattern '{0}' combines '**' with other characters in a segment")]
    Recursive(String),
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Token {
    Literal(char),
    Any,
    Star,
    Alternation(Vec<Vec<char>>),
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Segment {
    // `**` anywhere in the pattern
    Recursive,
    // `*` as final segment
    Tail,
    Glob(Vec<Token>),
}

/// Pattern Specificity
///
/// Orders patterns from general to specific. A pattern without segment
/// wildcards (`**`, or a trailing `*`) is more specific than one with. Ties
/// are broken by the number of segments without any wildcard, then by the
/// number of literal characters.
///
/// Greater values are more specific.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct Specificity {
    bounded: bool,
    literal_segments: usize,
    literal_chars: usize,
}

/// Compiled Pattern
///
/// A validated pattern, ready for matching. The source string is retained
/// for reporting. Two patterns are equal if their sources are equal.
#[derive(Clone, Debug)]
pub struct Pattern {
    source: String,
    segments: Vec<Segment>,
}

impl Pattern {
    // Compile a single segment
    //
    // Turn a segment without `/` into its token sequence. Alternatives
    // in braces are taken literally, wildcards inside of them have no
    // special meaning.
    fn compile_segment(source: &str, segment: &str) -> Result<Vec<Token>, PatternError> {
        let mut tokens = Vec::new();
        let mut chars = segment.chars();

        while let Some(c) = chars.next() {
            match c {
                '*' => tokens.push(Token::Star),
                '?' => tokens.push(Token::Any),
                '}' => return Err(PatternError::UnbalancedBrace(source.to_string())),
                '{' => {
                    let mut alternatives = Vec::new();
                    let mut current = Vec::new();
                    let mut closed = false;

                    for c in chars.by_ref() {
                        match c {
                            '{' => return Err(PatternError::NestedBrace(source.to_string())),
                            '}' => {
                                closed = true;
                                break;
                            },
                            ',' => alternatives.push(std::mem::take(&mut current)),
                            v => current.push(v),
                        }
                    }

                    if !closed {
                        return Err(PatternError::UnbalancedBrace(source.to_string()));
                    }

                    alternatives.push(current);
                    tokens.push(Token::Alternation(alternatives));
                },
                v => tokens.push(Token::Literal(v)),
            }
        }

        Ok(tokens)
    }

    /// Compile pattern
    ///
    /// Validate the pattern and compile it for matching. See the module
    /// documentation for the supported syntax.
    pub fn new(source: &str) -> Result<Self, PatternError> {
        if source.contains('\\') {
            return Err(PatternError::Backslash(source.to_string()));
        }

        let body = source.strip_prefix('/').unwrap_or(source);
        if body.is_empty() {
            return Err(PatternError::Empty);
        }

        let parts: Vec<&str> = body.split('/').collect();
        let mut segments = Vec::with_capacity(parts.len());

        for (i, part) in parts.iter().enumerate() {
            let segment = match *part {
                "" => return Err(PatternError::EmptySegment(source.to_string())),
                "." | ".." => return Err(PatternError::RelativeSegment(source.to_string())),
                "**" => Segment::Recursive,
                "*" if i + 1 == parts.len() => Segment::Tail,
                v if v.contains("**") => return Err(PatternError::Recursive(source.to_string())),
                v => Segment::Glob(Self::compile_segment(source, v)?),
            };
            segments.push(segment);
        }

        Ok(
            Self {
                source: source.to_string(),
                segments: segments,
            }
        )
    }

    /// Return the pattern as written in the configuration.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Compute specificity
    ///
    /// Return the specificity of this pattern. Used to order rules, so the
    /// most specific matching rule takes precedence.
    pub fn specificity(&self) -> Specificity {
        let mut v = Specificity {
            bounded: true,
            literal_segments: 0,
            literal_chars: 0,
        };

        for segment in self.segments.iter() {
            match segment {
                Segment::Recursive | Segment::Tail => v.bounded = false,
                Segment::Glob(tokens) => {
                    let literal = tokens.iter()
                        .filter(|t| matches!(t, Token::Literal(_)))
                        .count();
                    if literal == tokens.len() {
                        v.literal_segments += 1;
                    }
                    v.literal_chars += literal;
                },
            }
        }

        v
    }

    // Match a segment against its tokens
    //
    // Tokens are processed back to front. `next[j]` holds whether the tokens
    // following the current one match `s[j..]`. Each token is visited once
    // per position, so stars never cause repeated backtracking.
    fn match_tokens(tokens: &[Token], s: &[char]) -> bool {
        let n = s.len();
        let mut next = vec![false; n + 1];
        next[n] = true;

        for token in tokens.iter().rev() {
            let mut cur = vec![false; n + 1];
            for j in (0..=n).rev() {
                cur[j] = match token {
                    Token::Literal(c) => j < n && s[j] == *c && next[j + 1],
                    Token::Any => j < n && next[j + 1],
                    Token::Star => next[j] || (j < n && cur[j + 1]),
                    Token::Alternation(alternatives) => alternatives.iter().any(
                        |a| s[j..].starts_with(a) && next[j + a.len()]
                    ),
                };
            }
            next = cur;
        }

        next[0]
    }

    // Match path segments against pattern segments
    //
    // Same scheme as `match_tokens()`, one level up: `**` takes the role of
    // `*`, and a glob segment consumes exactly one path segment.
    fn match_segments(pattern: &[Segment], path: &[&str]) -> bool {
        let n = path.len();
        let mut next = vec![false; n + 1];
        next[n] = true;

        for segment in pattern.iter().rev() {
            let mut cur = vec![false; n + 1];
            for j in (0..=n).rev() {
                cur[j] = match segment {
                    Segment::Recursive => next[j] || (j < n && cur[j + 1]),
                    Segment::Tail => j < n,
                    Segment::Glob(tokens) => j < n && next[j + 1] && {
                        let chars: Vec<char> = path[j].chars().collect();
                        Self::match_tokens(tokens, &chars)
                    },
                };
            }
            next = cur;
        }

        next[0]
    }

    /// Match archive path
    ///
    /// Check whether the given archive path is matched by this pattern. The
    /// path is split at `/`, a leading `/` is ignored. The empty path never
    /// matches.
    pub fn matches(&self, path: &str) -> bool {
        let path = path.strip_prefix('/').unwrap_or(path);
        if path.is_empty() {
            return false;
        }

        let segments: Vec<&str> = path.split('/').collect();
        Self::match_segments(&self.segments, &segments)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Pattern {
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for Pattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Pattern {
        Pattern::new(s).unwrap()
    }

    // Verify literal patterns
    //
    // Patterns without wildcards match exactly their own path, with an
    // optional leading slash on either side.
    #[test]
    fn pattern_literal() {
        let v = p("lib/arm64-v8a/libtensorflowlite_jni.so");

        assert!(v.matches("lib/arm64-v8a/libtensorflowlite_jni.so"));
        assert!(v.matches("/lib/arm64-v8a/libtensorflowlite_jni.so"));
        assert!(!v.matches("lib/x86/libtensorflowlite_jni.so"));
        assert!(!v.matches("lib/arm64-v8a/libtensorflowlite_jni.so.1"));
        assert!(!v.matches("lib/arm64-v8a"));

        assert!(p("/META-INF/LICENSE").matches("META-INF/LICENSE"));
    }

    // Verify in-segment wildcards
    //
    // `*` and `?` must stay within their segment.
    #[test]
    fn pattern_segment_wildcards() {
        let v = p("lib/*/libfoo.so");
        assert!(v.matches("lib/x86/libfoo.so"));
        assert!(v.matches("lib/arm64-v8a/libfoo.so"));
        assert!(!v.matches("lib/libfoo.so"));
        assert!(!v.matches("lib/a/b/libfoo.so"));

        let v = p("META-INF/*.kotlin_module");
        assert!(v.matches("META-INF/core.kotlin_module"));
        assert!(v.matches("META-INF/.kotlin_module"));
        assert!(!v.matches("META-INF/sub/core.kotlin_module"));

        let v = p("lib/x86?64/*.so");
        assert!(v.matches("lib/x86_64/libfoo.so"));
        assert!(!v.matches("lib/x86/libfoo.so"));
    }

    // Verify trailing segment wildcards
    //
    // A final `*` segment swallows any non-empty remainder of the path.
    #[test]
    fn pattern_tail() {
        let v = p("META-INF/*");

        assert!(v.matches("META-INF/LICENSE"));
        assert!(v.matches("META-INF/services/javax.annotation.processing.Processor"));
        assert!(!v.matches("META-INF"));
        assert!(!v.matches("res/META-INF/LICENSE"));
    }

    // Verify recursive segment wildcards
    //
    // `**` matches zero or more segments, also in the middle of a pattern.
    #[test]
    fn pattern_recursive() {
        let v = p("**/*.so");
        assert!(v.matches("libfoo.so"));
        assert!(v.matches("lib/x86/libfoo.so"));
        assert!(!v.matches("lib/x86/libfoo.so.txt"));

        let v = p("META-INF/**/LICENSE*");
        assert!(v.matches("META-INF/LICENSE"));
        assert!(v.matches("META-INF/a/b/LICENSE.txt"));
        assert!(!v.matches("META-INF/a/NOTICE"));

        let v = p("assets/**");
        assert!(v.matches("assets"));
        assert!(v.matches("assets/model.tflite"));
        assert!(!v.matches("res/assets"));
    }

    // Verify matching cost of repeated wildcards
    //
    // Many stars in one segment, or many `**` segments, must not make
    // matching long names or deep paths explode.
    #[test]
    fn pattern_many_wildcards() {
        let v = p("*a*a*a*a*a*a*a*a*b");
        let name = "a".repeat(400);
        let deep = vec!["a"; 200].join("/");

        let start = std::time::Instant::now();
        assert!(!v.matches(&name));
        assert!(v.matches(&format!("{}b", name)));
        assert!(!p("**/**/**/**/**/**/b").matches(&deep));
        assert!(p("**/**/**/**/**/**/a").matches(&deep));
        assert!(start.elapsed() < std::time::Duration::from_secs(1));

        assert!(p("*a*?b").matches("xaab"));
        assert!(!p("*a*?b").matches("ab"));
        assert!(p("lib{,64}*.so").matches("lib64foo.so"));
        assert!(p("lib{,64}*.so").matches("lib.so"));
    }

    // Verify alternations
    //
    // Alternatives are literal and exactly one of them has to match.
    #[test]
    fn pattern_alternation() {
        let v = p("/META-INF/{AL2.0,LGPL2.1}");
        assert!(v.matches("META-INF/AL2.0"));
        assert!(v.matches("META-INF/LGPL2.1"));
        assert!(!v.matches("META-INF/AL2.0LGPL2.1"));
        assert!(!v.matches("META-INF/MIT"));

        let v = p("lib/{x86,x86_64}/*.so");
        assert!(v.matches("lib/x86/libfoo.so"));
        assert!(v.matches("lib/x86_64/libfoo.so"));
        assert!(!v.matches("lib/arm64-v8a/libfoo.so"));

        let v = p("a/{*}");
        assert!(v.matches("a/*"));
        assert!(!v.matches("a/b"));
    }

    // Verify pattern validation
    //
    // Malformed patterns must be refused at compile time, never at match
    // time.
    #[test]
    fn pattern_invalid() {
        assert_eq!(Pattern::new(""), Err(PatternError::Empty));
        assert_eq!(Pattern::new("/"), Err(PatternError::Empty));
        assert!(matches!(Pattern::new("a//b"), Err(PatternError::EmptySegment(_))));
        assert!(matches!(Pattern::new("a/"), Err(PatternError::EmptySegment(_))));
        assert!(matches!(Pattern::new("a/../b"), Err(PatternError::RelativeSegment(_))));
        assert!(matches!(Pattern::new("./a"), Err(PatternError::RelativeSegment(_))));
        assert!(matches!(Pattern::new("lib\\x86"), Err(PatternError::Backslash(_))));
        assert!(matches!(Pattern::new("a/{b,c"), Err(PatternError::UnbalancedBrace(_))));
        assert!(matches!(Pattern::new("a/b}"), Err(PatternError::UnbalancedBrace(_))));
        assert!(matches!(Pattern::new("a/{b,{c}}"), Err(PatternError::NestedBrace(_))));
        assert!(matches!(Pattern::new("a/**.so"), Err(PatternError::Recursive(_))));

        assert_eq!(
            Pattern::new("a//b").unwrap_err().to_string(),
            "pattern 'a//b' contains an empty segment",
        );
    }

    // Verify specificity ordering
    //
    // Architecture-qualified literal paths must outrank wildcards, and
    // segment wildcards must rank below everything bounded.
    #[test]
    fn pattern_specificity() {
        let literal = p("lib/arm64-v8a/libx.so").specificity();
        let star = p("lib/*/libx.so").specificity();
        let ext = p("lib/arm64-v8a/*.so").specificity();
        let recursive = p("lib/**").specificity();
        let tail = p("META-INF/*").specificity();

        assert!(literal > star);
        assert!(literal > ext);
        assert!(ext > star);
        assert!(star > recursive);
        assert!(star > tail);
        assert!(p("META-INF/LICENSE").specificity() > tail);
        assert_eq!(literal, p("/lib/arm64-v8a/liby.so").specificity());
    }
}
