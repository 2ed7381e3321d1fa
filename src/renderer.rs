// SPDX-License-Identifier: GPL-3.0-only

//! Markdown rendering for parsed ChatGPT conversations.
//!
//! This module transforms a [`Conversation`] into a readable Markdown
//! document. The output format is designed to be clean and readable while
//! preserving the essential conversation structure.
//!
//! # Output Format
//!
//! The rendered Markdown includes:
//! - A top-level `# ChatGPT Conversation` heading
//! - A `## User` / `## Assistant` / ... section per message
//! - Fenced blocks for code and canvas artifacts, bold-summary blocks for
//!   model thoughts, raw JSON fences for anything unrecognized
//! - Inline citation markers turned into `#ref{n}` anchor links
//! - A trailing `## References` section when any citation resolved
//!
//! # Example
//!
//! ```
//! use cg2md::parser::parse_conversation;
//! use cg2md::renderer::{render_conversation, RenderOptions};
//!
//! let conversation = parse_conversation(
//!     r#"[{"role": "user", "content": "Hello!"}]"#,
//! ).unwrap();
//!
//! let markdown = render_conversation(&conversation, &RenderOptions::default());
//!
//! assert!(markdown.contains("# ChatGPT Conversation"));
//! assert!(markdown.contains("Hello!"));
//! ```

use crate::citations::{ReferenceRegistry, resolve_citations};
use crate::parser::{CanvasKind, Content, Conversation, Message};
use chrono::DateTime;
use serde_json::Value;
use std::fmt::Write;

/// Configuration options for Markdown rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Whether to include reasoning ("thoughts") messages in the output.
    pub show_thoughts: bool,

    /// Whether to include message timestamps, when the export carries them.
    pub show_timestamps: bool,

    /// Number of heading levels to shift (0-5).
    ///
    /// A value of 0 produces H1/H2 headings (default).
    /// A value of 1 produces H2/H3 headings, useful for embedding.
    pub heading_offset: u8,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            show_thoughts: true,
            show_timestamps: false,
            heading_offset: 0,
        }
    }
}

/// Returns a markdown heading prefix with the given level and offset.
///
/// The heading level is clamped to a maximum of 6 (H6).
fn heading(level: u8, offset: u8) -> String {
    let actual = (level + offset).min(6);
    "#".repeat(actual as usize)
}

/// Renders a parsed conversation as Markdown.
///
/// This is the main entry point for rendering. Messages are rendered in
/// order, citation markers are resolved against a run-scoped
/// [`ReferenceRegistry`], and a References section is appended when any
/// citation resolved. Messages whose rendered content is empty produce no
/// section at all.
#[must_use]
pub fn render_conversation(conversation: &Conversation, opts: &RenderOptions) -> String {
    let mut registry = ReferenceRegistry::new();
    let mut out = String::new();
    writeln!(
        out,
        "{} ChatGPT Conversation\n",
        heading(1, opts.heading_offset)
    )
    .unwrap();

    for message in &conversation.messages {
        if !opts.show_thoughts && matches!(message.content, Content::Thoughts(_)) {
            continue;
        }
        render_message(&mut out, message, opts, &mut registry);
    }

    if !registry.is_empty() {
        render_references(&mut out, &registry, opts);
    }

    out
}

fn render_message(
    out: &mut String,
    message: &Message,
    opts: &RenderOptions,
    registry: &mut ReferenceRegistry,
) {
    let body = render_content(&message.content);
    // Citation substitution is a post-pass over the whole fragment, so
    // markers are found even when rendering assembled them from parts.
    let body = resolve_citations(&body, message, registry);
    if body.trim().is_empty() {
        return;
    }

    writeln!(
        out,
        "{} {}\n",
        heading(2, opts.heading_offset),
        message.role.heading()
    )
    .unwrap();

    if opts.show_timestamps
        && let Some(timestamp) = message.create_time.and_then(format_create_time)
    {
        writeln!(out, "*{timestamp}*\n").unwrap();
    }

    writeln!(out, "{}\n", body.trim_end()).unwrap();
}

/// Renders one classified content value to a Markdown fragment, with no
/// surrounding section header.
fn render_content(content: &Content) -> String {
    match content {
        Content::Text(text) => text.clone(),
        Content::Parts(parts) => {
            let rendered: Vec<String> = parts
                .iter()
                .map(render_part)
                .filter(|part| !part.trim().is_empty())
                .collect();
            rendered.join("\n\n")
        }
        Content::Code { language, text } => fenced(language.as_deref(), text),
        Content::Thoughts(thoughts) => {
            let rendered: Vec<String> = thoughts
                .iter()
                .filter(|thought| !thought.content.trim().is_empty())
                .map(|thought| {
                    match thought.summary.as_deref().filter(|s| !s.trim().is_empty()) {
                        Some(summary) => format!("**{summary}**\n{}", thought.content),
                        None => thought.content.clone(),
                    }
                })
                .collect();
            rendered.join("\n\n")
        }
        Content::Canvas { kind, title, text } => match kind {
            CanvasKind::Code { language } => {
                let mut block = String::new();
                if let Some(title) = title {
                    writeln!(block, "**{title}**\n").unwrap();
                }
                block.push_str(&fenced(language.as_deref(), text));
                block
            }
            CanvasKind::Document => match title {
                Some(title) => format!("**{title}**\n\n{text}"),
                None => text.clone(),
            },
        },
        Content::Raw(value) => json_block(value),
    }
}

fn render_part(part: &Value) -> String {
    match part {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => json_block(other),
    }
}

fn fenced(language: Option<&str>, text: &str) -> String {
    format!(
        "```{}\n{}\n```",
        language.unwrap_or_default(),
        text.trim_end()
    )
}

/// Pretty-prints an arbitrary JSON value as a fenced block so no content
/// is silently dropped.
fn json_block(value: &Value) -> String {
    let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    format!("```json\n{pretty}\n```")
}

fn render_references(out: &mut String, registry: &ReferenceRegistry, opts: &RenderOptions) {
    writeln!(out, "{} References\n", heading(2, opts.heading_offset)).unwrap();

    for (index, meta) in registry.iter() {
        writeln!(out, "<a id=\"ref{index}\"></a>").unwrap();

        let title = meta
            .title
            .as_deref()
            .or(meta.url.as_deref())
            .unwrap_or("Untitled");
        write!(out, "{} {index}. {title}", heading(3, opts.heading_offset)).unwrap();
        if let Some(attribution) = &meta.attribution {
            write!(out, " - {attribution}").unwrap();
        }
        out.push_str("\n\n");

        if let Some(url) = &meta.url {
            writeln!(out, "[{url}]({url})\n").unwrap();
        }
        if let Some(snippet) = &meta.snippet {
            writeln!(out, "*{}*\n", truncate_snippet(snippet)).unwrap();
        }
    }
}

/// Keeps reference snippets readable: anything past 200 characters is cut
/// with an ellipsis.
fn truncate_snippet(snippet: &str) -> String {
    const MAX_CHARS: usize = 200;
    if snippet.chars().count() <= MAX_CHARS {
        return snippet.to_owned();
    }
    let mut cut: String = snippet.chars().take(MAX_CHARS).collect();
    cut.push_str("...");
    cut
}

#[allow(clippy::cast_possible_truncation)]
fn format_create_time(epoch_seconds: f64) -> Option<String> {
    let seconds = epoch_seconds.trunc() as i64;
    DateTime::from_timestamp(seconds, 0).map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{CitationMeta, ExportFormat, Role, Thought, parse_conversation};
    use serde_json::json;

    fn make_message(role: Role, content: Content) -> Message {
        Message {
            role,
            content,
            create_time: None,
            citations: Vec::new(),
            reference_markers: Vec::new(),
        }
    }

    fn make_conversation(messages: Vec<Message>) -> Conversation {
        Conversation {
            format: ExportFormat::MessageList,
            messages,
        }
    }

    fn default_opts() -> RenderOptions {
        RenderOptions::default()
    }

    #[test]
    fn renders_basic_structure() {
        let conversation = make_conversation(vec![
            make_message(Role::User, Content::Text("Hello".into())),
            make_message(Role::Assistant, Content::Text("Hi there".into())),
        ]);
        let output = render_conversation(&conversation, &default_opts());

        assert!(output.starts_with("# ChatGPT Conversation\n\n"));
        assert!(output.contains("## User\n\nHello\n"));
        assert!(output.contains("## Assistant\n\nHi there\n"));
        assert!(!output.contains("## References"));
    }

    #[test]
    fn skips_empty_messages_entirely() {
        let conversation = make_conversation(vec![
            make_message(Role::System, Content::Text("   ".into())),
            make_message(Role::User, Content::Text("real".into())),
        ]);
        let output = render_conversation(&conversation, &default_opts());

        assert!(!output.contains("## System"));
        assert!(output.contains("## User"));
    }

    #[test]
    fn conversation_of_empty_messages_is_title_only() {
        let conversation = make_conversation(vec![make_message(
            Role::User,
            Content::Text(String::new()),
        )]);
        let output = render_conversation(&conversation, &default_opts());

        assert_eq!(output, "# ChatGPT Conversation\n\n");
    }

    #[test]
    fn renders_code_with_language() {
        let conversation = make_conversation(vec![make_message(
            Role::Assistant,
            Content::Code {
                language: Some("python".into()),
                text: "print('hi')".into(),
            },
        )]);
        let output = render_conversation(&conversation, &default_opts());

        assert!(output.contains("```python\nprint('hi')\n```"));
    }

    #[test]
    fn renders_code_without_language() {
        let conversation = make_conversation(vec![make_message(
            Role::Assistant,
            Content::Code {
                language: None,
                text: "plain".into(),
            },
        )]);
        let output = render_conversation(&conversation, &default_opts());

        assert!(output.contains("```\nplain\n```"));
    }

    #[test]
    fn renders_parts_joined_by_blank_line() {
        let conversation = make_conversation(vec![make_message(
            Role::Assistant,
            Content::Parts(vec![json!("one"), json!("two")]),
        )]);
        let output = render_conversation(&conversation, &default_opts());

        assert!(output.contains("one\n\ntwo"));
    }

    #[test]
    fn renders_object_parts_as_json_blocks() {
        let conversation = make_conversation(vec![make_message(
            Role::Assistant,
            Content::Parts(vec![json!("text"), json!({"asset_pointer": "file://x"})]),
        )]);
        let output = render_conversation(&conversation, &default_opts());

        assert!(output.contains("text\n\n```json"));
        assert!(output.contains("asset_pointer"));
    }

    #[test]
    fn renders_thoughts_with_bold_summaries() {
        let conversation = make_conversation(vec![make_message(
            Role::Assistant,
            Content::Thoughts(vec![
                Thought {
                    summary: Some("Plan".into()),
                    content: "Break it down.".into(),
                },
                Thought {
                    summary: None,
                    content: "Then solve.".into(),
                },
            ]),
        )]);
        let output = render_conversation(&conversation, &default_opts());

        assert!(output.contains("**Plan**\nBreak it down.\n\nThen solve."));
    }

    #[test]
    fn hides_thoughts_when_disabled() {
        let conversation = make_conversation(vec![
            make_message(
                Role::Assistant,
                Content::Thoughts(vec![Thought {
                    summary: None,
                    content: "hidden reasoning".into(),
                }]),
            ),
            make_message(Role::Assistant, Content::Text("answer".into())),
        ]);
        let opts = RenderOptions {
            show_thoughts: false,
            ..Default::default()
        };
        let output = render_conversation(&conversation, &opts);

        assert!(!output.contains("hidden reasoning"));
        assert!(output.contains("answer"));
    }

    #[test]
    fn renders_code_canvas_with_title_and_fence() {
        let conversation = make_conversation(vec![make_message(
            Role::Assistant,
            Content::Canvas {
                kind: CanvasKind::Code {
                    language: Some("rust".into()),
                },
                title: Some("main.rs".into()),
                text: "fn main() {}".into(),
            },
        )]);
        let output = render_conversation(&conversation, &default_opts());

        assert!(output.contains("**main.rs**\n\n```rust\nfn main() {}\n```"));
    }

    #[test]
    fn renders_document_canvas_with_bold_title() {
        let conversation = make_conversation(vec![make_message(
            Role::Assistant,
            Content::Canvas {
                kind: CanvasKind::Document,
                title: Some("Notes".into()),
                text: "Prose body.".into(),
            },
        )]);
        let output = render_conversation(&conversation, &default_opts());

        assert!(output.contains("**Notes**\n\nProse body."));
        assert!(!output.contains("```"));
    }

    #[test]
    fn renders_raw_content_as_json_fence() {
        let conversation = make_conversation(vec![make_message(
            Role::Tool,
            Content::Raw(json!({"result": [1, 2]})),
        )]);
        let output = render_conversation(&conversation, &default_opts());

        assert!(output.contains("## Tool"));
        assert!(output.contains("```json"));
        assert!(output.contains("\"result\""));
    }

    #[test]
    fn renders_timestamp_when_enabled() {
        let mut message = make_message(Role::User, Content::Text("hi".into()));
        message.create_time = Some(1_733_356_800.0); // 2024-12-05 00:00:00 UTC
        let conversation = make_conversation(vec![message]);

        let opts = RenderOptions {
            show_timestamps: true,
            ..Default::default()
        };
        let output = render_conversation(&conversation, &opts);

        assert!(output.contains("*2024-12-05 00:00 UTC*"));
    }

    #[test]
    fn hides_timestamp_by_default() {
        let mut message = make_message(Role::User, Content::Text("hi".into()));
        message.create_time = Some(1_733_356_800.0);
        let conversation = make_conversation(vec![message]);

        let output = render_conversation(&conversation, &default_opts());

        assert!(!output.contains("2024-12-05"));
    }

    #[test]
    fn heading_offset_shifts_all_headings() {
        let conversation = make_conversation(vec![make_message(
            Role::User,
            Content::Text("hi".into()),
        )]);
        let opts = RenderOptions {
            heading_offset: 1,
            ..Default::default()
        };
        let output = render_conversation(&conversation, &opts);

        assert!(output.starts_with("## ChatGPT Conversation"));
        assert!(output.contains("### User"));
    }

    #[test]
    fn renders_references_section() {
        let mut message = make_message(
            Role::Assistant,
            Content::Text("AI is a field of study【1†L15-L23】.".into()),
        );
        message.citations = vec![CitationMeta {
            title: Some("Introduction to AI".into()),
            url: Some("https://example.com/ai".into()),
            snippet: Some("AI is intelligence demonstrated by machines.".into()),
            attribution: None,
        }];
        let conversation = make_conversation(vec![message]);

        let output = render_conversation(&conversation, &default_opts());

        assert!(output.contains("AI is a field of study[【1†L15-L23】](#ref1)."));
        assert!(output.contains("## References"));
        assert!(output.contains("<a id=\"ref1\"></a>"));
        assert!(output.contains("### 1. Introduction to AI"));
        assert!(output.contains("[https://example.com/ai](https://example.com/ai)"));
        assert!(output.contains("*AI is intelligence demonstrated by machines.*"));
    }

    #[test]
    fn reference_without_title_uses_url_as_heading() {
        let mut message = make_message(Role::Assistant, Content::Text("fact【1】".into()));
        message.citations = vec![CitationMeta {
            url: Some("https://example.com".into()),
            ..CitationMeta::default()
        }];
        let conversation = make_conversation(vec![message]);

        let output = render_conversation(&conversation, &default_opts());

        assert!(output.contains("### 1. https://example.com"));
    }

    #[test]
    fn reference_attribution_follows_title() {
        let mut message = make_message(Role::Assistant, Content::Text("fact【1】".into()));
        message.citations = vec![CitationMeta {
            title: Some("Paper".into()),
            url: Some("https://example.com".into()),
            attribution: Some("example.com".into()),
            ..CitationMeta::default()
        }];
        let conversation = make_conversation(vec![message]);

        let output = render_conversation(&conversation, &default_opts());

        assert!(output.contains("### 1. Paper - example.com"));
    }

    #[test]
    fn shared_reference_appears_once() {
        let cite = CitationMeta {
            title: Some("Shared".into()),
            url: Some("https://same".into()),
            ..CitationMeta::default()
        };
        let mut first = make_message(Role::Assistant, Content::Text("a【1】".into()));
        first.citations = vec![cite.clone()];
        let mut second = make_message(Role::Assistant, Content::Text("b【1】".into()));
        second.citations = vec![cite];
        let conversation = make_conversation(vec![first, second]);

        let output = render_conversation(&conversation, &default_opts());

        assert_eq!(output.matches("<a id=\"ref1\"></a>").count(), 1);
        assert_eq!(output.matches("(#ref1)").count(), 2);
        assert!(!output.contains("ref2"));
    }

    #[test]
    fn truncates_long_snippets() {
        let mut message = make_message(Role::Assistant, Content::Text("fact【1】".into()));
        message.citations = vec![CitationMeta {
            title: Some("Long".into()),
            url: Some("https://long".into()),
            snippet: Some("x".repeat(300)),
            ..CitationMeta::default()
        }];
        let conversation = make_conversation(vec![message]);

        let output = render_conversation(&conversation, &default_opts());

        assert!(output.contains(&format!("*{}...*", "x".repeat(200))));
        assert!(!output.contains(&"x".repeat(201)));
    }

    #[test]
    fn end_to_end_two_message_conversation() {
        let conversation = parse_conversation(
            r#"[{"role":"user","content":"Hello"},{"role":"assistant","content":"Hi there"}]"#,
        )
        .unwrap();
        let output = render_conversation(&conversation, &default_opts());

        let user_pos = output.find("## User").unwrap();
        let hello_pos = output.find("Hello").unwrap();
        let assistant_pos = output.find("## Assistant").unwrap();
        let hi_pos = output.find("Hi there").unwrap();

        assert!(user_pos < hello_pos && hello_pos < assistant_pos && assistant_pos < hi_pos);
        assert!(!output.contains("## References"));
    }
}
