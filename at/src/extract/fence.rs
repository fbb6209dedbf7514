//! Fenced code blocks in Markdown model output

use std::ops::Range;

use pulldown_cmark::{CodeBlockKind, Event, Parser, Tag, TagEnd};
use tracing::debug;

/// A closed fenced block (backticks or tildes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FencedBlock {
    /// Info string after the opening fence (e.g. `java`)
    pub info: String,
    /// Text between the fences, without the final newline
    pub body: String,
}

impl FencedBlock {
    /// Language tag: the first word of the info string
    pub fn language(&self) -> &str {
        self.info.split_whitespace().next().unwrap_or("")
    }
}

/// Collect every closed fenced block in `text`, in order
///
/// CommonMark runs an unclosed fence to the end of the document; such a block
/// is dropped here since the reply was cut off.
pub fn fenced_blocks(text: &str) -> Vec<FencedBlock> {
    let mut blocks = Vec::new();
    let mut open: Option<(String, String, Range<usize>)> = None;

    for (event, range) in Parser::new(text).into_offset_iter() {
        match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => {
                open = Some((info.trim().to_string(), String::new(), range));
            }
            Event::Text(content) => {
                if let Some((_, body, _)) = open.as_mut() {
                    body.push_str(&content);
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                let Some((info, body, range)) = open.take() else {
                    continue;
                };
                if !is_closed(&text[range]) {
                    debug!(%info, "fenced_blocks: unterminated fence dropped");
                    continue;
                }
                let body = body.strip_suffix('\n').unwrap_or(&body).to_string();
                blocks.push(FencedBlock { info, body });
            }
            _ => {}
        }
    }

    blocks
}

/// Whether the last line of a fenced block's source is a matching closing fence
fn is_closed(source: &str) -> bool {
    let mut lines = source.trim_end().lines();
    let Some(opening) = lines.next().map(str::trim_start) else {
        return false;
    };
    let Some(fence_char) = opening.chars().next() else {
        return false;
    };
    let width = opening.chars().take_while(|c| *c == fence_char).count();

    lines.last().map(str::trim).is_some_and(|closing| {
        closing.chars().count() >= width && closing.chars().all(|c| c == fence_char)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_block() {
        let text = "Here you go:\n```java\n@Test\npublic void t() {}\n```\nDone.";
        let blocks = fenced_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].language(), "java");
        assert_eq!(blocks[0].body, "@Test\npublic void t() {}");
    }

    #[test]
    fn test_multiple_blocks_and_untagged() {
        let text = "```java\nA\n```\n\ntext\n\n```\nB\n```\n\n``` Java title=\"x\"\nC\n```";
        let blocks = fenced_blocks(text);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[1].language(), "");
        assert_eq!(blocks[2].language(), "Java");
        assert_eq!(blocks[2].body, "C");
    }

    #[test]
    fn test_tilde_fence() {
        let text = "~~~java\n@Test\npublic void t() {}\n~~~";
        let blocks = fenced_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].language(), "java");
        assert_eq!(blocks[0].body, "@Test\npublic void t() {}");
    }

    #[test]
    fn test_longer_fence_keeps_inner_backticks() {
        let text = "````java\n@Test\npublic void t() {\n    String s = \"x\";\n```\n}\n````";
        let blocks = fenced_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].body, "@Test\npublic void t() {\n    String s = \"x\";\n```\n}");
    }

    #[test]
    fn test_unterminated_block_ignored() {
        assert!(fenced_blocks("```java\nclass A {}\n").is_empty());
        assert!(fenced_blocks("````java\nclass A {}\n```\n").is_empty());
    }

    #[test]
    fn test_indented_fences() {
        let text = "  ```java\n  int x = 1;\n  ```";
        let blocks = fenced_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].body, "int x = 1;");
    }

    #[test]
    fn test_no_blocks() {
        assert!(fenced_blocks("just prose, no code").is_empty());
    }
}
