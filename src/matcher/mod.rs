//! Hole templates
//!
//! A line rule's regex carries exactly two capture groups. Group 1 is the
//! prefix, group 2 the suffix, and the bytes strictly between them are the
//! *hole*: the only span a fix may rewrite. All multi-group regex handling
//! lives here so callers only ever see `(prefix, value, suffix)`.

use crate::types::{ConfigError, LockError};
use regex::bytes::{Regex, RegexBuilder};
use std::ops::Range;

/// How many match sites an ambiguity error lists
const MAX_REPORTED_LINES: usize = 5;

/// Compiled two-group pattern
#[derive(Debug, Clone)]
pub struct HoleTemplate {
    regex: Regex,
}

/// One located hole inside file content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hole<'a> {
    pub prefix: &'a [u8],
    pub value: &'a [u8],
    pub suffix: &'a [u8],

    /// Byte range of the hole in the content
    pub span: Range<usize>,

    /// 1-based line where the hole starts
    pub line: usize,
}

impl Hole<'_> {
    /// Current value as text (lossy for non UTF-8 bytes)
    pub fn value_lossy(&self) -> String {
        String::from_utf8_lossy(self.value).into_owned()
    }
}

/// Result of rendering a lock value into content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rewrite {
    /// The hole already holds the value
    Unchanged { line: usize },

    /// New content with only the hole replaced
    Changed {
        content: Vec<u8>,
        previous: String,
        line: usize,
    },
}

impl HoleTemplate {
    /// Compile a pattern, requiring exactly two capture groups
    ///
    /// `.` matches line breaks and `^`/`$` match at line boundaries, so a hole
    /// may span several lines. Rules that target one line should bound the
    /// hole with a negated class (`[^"]*`) or a lazy repetition.
    pub fn compile(pattern: &str) -> Result<Self, ConfigError> {
        let regex = RegexBuilder::new(pattern)
            .dot_matches_new_line(true)
            .multi_line(true)
            .build()
            .map_err(|e| ConfigError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;

        // captures_len counts the implicit whole-match group
        let found = regex.captures_len() - 1;
        if found != 2 {
            return Err(ConfigError::CaptureGroups {
                pattern: pattern.to_string(),
                found,
            });
        }

        Ok(Self { regex })
    }

    /// The pattern as written in the specification
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Find the single hole in `content`
    ///
    /// # Errors
    /// * `PatternNotFound` - no match
    /// * `AmbiguousMatch` - more than one match
    /// * `UnboundedHole` - a group did not participate or the groups overlap
    pub fn locate<'a>(&self, content: &'a [u8]) -> Result<Hole<'a>, LockError> {
        let mut matches = self.regex.captures_iter(content);

        let first = matches.next().ok_or_else(|| LockError::PatternNotFound {
            pattern: self.as_str().to_string(),
        })?;

        let mut count = 1;
        let mut lines = vec![match_line(content, &first)];
        for caps in matches {
            count += 1;
            if lines.len() < MAX_REPORTED_LINES {
                lines.push(match_line(content, &caps));
            }
        }
        if count > 1 {
            return Err(LockError::AmbiguousMatch {
                pattern: self.as_str().to_string(),
                count,
                lines,
            });
        }

        let (Some(prefix), Some(suffix)) = (first.get(1), first.get(2)) else {
            return Err(self.unbounded());
        };
        if prefix.end() > suffix.start() {
            return Err(self.unbounded());
        }

        let span = prefix.end()..suffix.start();
        Ok(Hole {
            prefix: prefix.as_bytes(),
            value: &content[span.clone()],
            suffix: suffix.as_bytes(),
            line: line_at(content, span.start),
            span,
        })
    }

    /// Read the current hole value
    pub fn read<'a>(&self, content: &'a [u8]) -> Result<&'a [u8], LockError> {
        self.locate(content).map(|hole| hole.value)
    }

    /// Replace the hole with `value`, leaving every other byte untouched
    ///
    /// The rewritten content is matched again before it is returned; a value
    /// that would change what the pattern matches is refused so that a second
    /// fix can never find new work.
    pub fn render(&self, content: &[u8], value: &str, key: &str) -> Result<Rewrite, LockError> {
        let hole = self.locate(content)?;
        if hole.value == value.as_bytes() {
            return Ok(Rewrite::Unchanged { line: hole.line });
        }

        let mut rewritten = Vec::with_capacity(content.len() - hole.span.len() + value.len());
        rewritten.extend_from_slice(&content[..hole.span.start]);
        rewritten.extend_from_slice(value.as_bytes());
        rewritten.extend_from_slice(&content[hole.span.end..]);

        let converges = self
            .read(&rewritten)
            .is_ok_and(|read_back| read_back == value.as_bytes());
        if !converges {
            return Err(LockError::NonConvergent {
                pattern: self.as_str().to_string(),
                key: key.to_string(),
            });
        }

        Ok(Rewrite::Changed {
            previous: hole.value_lossy(),
            line: hole.line,
            content: rewritten,
        })
    }

    fn unbounded(&self) -> LockError {
        LockError::UnboundedHole {
            pattern: self.as_str().to_string(),
        }
    }
}

fn match_line(content: &[u8], caps: &regex::bytes::Captures<'_>) -> usize {
    line_at(content, caps.get(0).map_or(0, |m| m.start()))
}

fn line_at(content: &[u8], offset: usize) -> usize {
    content[..offset].iter().filter(|&&b| b == b'\n').count() + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHANNEL: &str = r#"(channel = ")[^"]*(")"#;

    fn template(pattern: &str) -> HoleTemplate {
        HoleTemplate::compile(pattern).expect("compile template")
    }

    #[test]
    fn test_compile_rejects_wrong_group_count() {
        let one = HoleTemplate::compile(r"(version = )\S+");
        assert!(matches!(one, Err(ConfigError::CaptureGroups { found: 1, .. })));

        let three = HoleTemplate::compile(r"(a)(b)(c)");
        assert!(matches!(three, Err(ConfigError::CaptureGroups { found: 3, .. })));
    }

    #[test]
    fn test_compile_non_capturing_groups_do_not_count() {
        let t = template(r#"(?:\s*)(ver = ")(?:[0-9.]+)(")"#);
        assert_eq!(t.read(b"ver = \"1.0\"").expect("read"), b"1.0");
    }

    #[test]
    fn test_compile_rejects_bad_regex() {
        let result = HoleTemplate::compile(r"(unclosed");
        assert!(matches!(result, Err(ConfigError::InvalidPattern { .. })));
    }

    #[test]
    fn test_locate_extracts_prefix_value_suffix() {
        let content = b"[toolchain]\nchannel = \"1.70.0\"\ncomponents = [\"rustfmt\"]\n";
        let hole = template(CHANNEL).locate(content).expect("locate");

        assert_eq!(hole.prefix, b"channel = \"");
        assert_eq!(hole.value, b"1.70.0");
        assert_eq!(hole.suffix, b"\"");
        assert_eq!(hole.line, 2);
        assert_eq!(&content[hole.span.clone()], b"1.70.0");
    }

    #[test]
    fn test_render_rewrites_only_the_hole() {
        let content = b"[toolchain]\nchannel  =  \"1.70.0\"  # pinned\r\nprofile = \"minimal\"\r\n";
        let t = template(r#"(channel  =  ")[^"]*(")"#);

        let rewrite = t.render(content, "1.72.1", "RUST_VERSION").expect("render");
        let Rewrite::Changed {
            content: new_content,
            previous,
            line,
        } = rewrite
        else {
            panic!("expected a change");
        };

        assert_eq!(previous, "1.70.0");
        assert_eq!(line, 2);
        assert_eq!(
            new_content,
            b"[toolchain]\nchannel  =  \"1.72.1\"  # pinned\r\nprofile = \"minimal\"\r\n".to_vec()
        );
    }

    #[test]
    fn test_render_unchanged_when_value_matches() {
        let content = b"channel = \"1.72.1\"\n";
        let rewrite = template(CHANNEL)
            .render(content, "1.72.1", "RUST_VERSION")
            .expect("render");
        assert_eq!(rewrite, Rewrite::Unchanged { line: 1 });
    }

    #[test]
    fn test_render_is_idempotent() {
        let t = template(CHANNEL);
        let content = b"channel = \"1.70.0\"\n";

        let Rewrite::Changed { content: once, .. } =
            t.render(content, "1.72.1", "K").expect("first render")
        else {
            panic!("expected a change");
        };
        let second = t.render(&once, "1.72.1", "K").expect("second render");
        assert_eq!(second, Rewrite::Unchanged { line: 1 });
    }

    #[test]
    fn test_multiline_hole() {
        let content = b"# header\nBEGIN\nold line 1\nold line 2\nEND\n# footer\n";
        let t = template(r"(BEGIN\n).*?(END\n)");

        assert_eq!(t.read(content).expect("read"), b"old line 1\nold line 2\n");

        let Rewrite::Changed {
            content: new_content,
            line,
            ..
        } = t
            .render(content, "new line\n", "BLOCK")
            .expect("render multi-line")
        else {
            panic!("expected a change");
        };
        assert_eq!(line, 3);
        assert_eq!(
            new_content,
            b"# header\nBEGIN\nnew line\nEND\n# footer\n".to_vec()
        );
    }

    #[test]
    fn test_dot_spans_lines() {
        let t = template(r"(<<)..(>>)");
        assert_eq!(t.read(b"<<a\n>>").expect("read"), b"a\n");
    }

    #[test]
    fn test_line_anchors() {
        let content = b"x = 1\nversion = 2\nmin_version = 3\n";
        let t = template(r"^(version = )\d+($)");
        let hole = t.locate(content).expect("locate anchored");
        assert_eq!(hole.value, b"2");
        assert_eq!(hole.line, 2);
    }

    #[test]
    fn test_not_found() {
        let result = template(CHANNEL).locate(b"profile = \"minimal\"\n");
        assert!(matches!(result, Err(LockError::PatternNotFound { .. })));
    }

    #[test]
    fn test_ambiguous_reports_lines() {
        let content = b"typegraph = \"0.1.0\"\nother = 1\ntypegraph = \"0.1.0\"\n";
        let result = template(r#"(typegraph = ")[^"]*(")"#).locate(content);

        match result {
            Err(LockError::AmbiguousMatch { count, lines, .. }) => {
                assert_eq!(count, 2);
                assert_eq!(lines, vec![1, 3]);
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }
    }

    #[test]
    fn test_optional_group_not_participating_is_unbounded() {
        let result = template(r"(a)?x(b)").locate(b"xb");
        assert!(matches!(result, Err(LockError::UnboundedHole { .. })));
    }

    #[test]
    fn test_nested_groups_are_unbounded() {
        // group 2 sits inside group 1, so there is no hole between them
        let result = template(r"(a(b)c)").locate(b"abc");
        assert!(matches!(result, Err(LockError::UnboundedHole { .. })));
    }

    #[test]
    fn test_non_convergent_value_refused() {
        let t = template(r"(port: )\d+(\n)");
        let result = t.render(b"port: 80\n", "eighty", "PORT");
        assert!(matches!(result, Err(LockError::NonConvergent { .. })));
    }

    #[test]
    fn test_bytes_outside_hole_need_not_be_utf8() {
        let mut content = vec![0xff, 0xfe, b'\n'];
        content.extend_from_slice(b"v = \"1\"\n");
        let t = template(r#"(v = ")[^"]*(")"#);

        let Rewrite::Changed {
            content: new_content,
            ..
        } = t.render(&content, "2", "V").expect("render")
        else {
            panic!("expected a change");
        };
        assert_eq!(&new_content[..3], &[0xff, 0xfe, b'\n']);
        assert!(new_content.ends_with(b"v = \"2\"\n"));
    }

    #[test]
    fn test_empty_hole() {
        let t = template(r#"(tag = ")[^"]*(")"#);
        let hole = t.locate(b"tag = \"\"").expect("locate");
        assert!(hole.value.is_empty());
        assert_eq!(hole.value_lossy(), "");
    }
}
