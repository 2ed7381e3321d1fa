// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for cg2md parsing and rendering.

use cg2md::{parser, renderer};
use std::fs;

fn render(json: &str) -> String {
    let conversation = parser::parse_conversation(json).expect("parse failed");
    renderer::render_conversation(&conversation, &renderer::RenderOptions::default())
}

/// Strips the title line so outputs from different shapes can be compared.
fn sections(markdown: &str) -> &str {
    markdown
        .split_once("\n\n")
        .map_or(markdown, |(_, rest)| rest)
}

/// The same two-message conversation must render identically from all
/// three supported top-level shapes.
#[test]
fn all_formats_render_the_same_sections() {
    let list = r#"[
        {"role": "user", "content": "Hello"},
        {"role": "assistant", "content": "Hi there"}
    ]"#;

    let messages_object = r#"{
        "messages": [
            {"role": "user", "content": "Hello"},
            {"role": "assistant", "content": "Hi there"}
        ]
    }"#;

    let mapping = r#"{
        "mapping": {
            "root": {"parent": null, "children": ["m1"], "message": null},
            "m1": {
                "parent": "root", "children": ["m2"],
                "message": {
                    "author": {"role": "user"},
                    "content": {"content_type": "text", "parts": ["Hello"]}
                }
            },
            "m2": {
                "parent": "m1", "children": [],
                "message": {
                    "author": {"role": "assistant"},
                    "content": {"content_type": "text", "parts": ["Hi there"]}
                }
            }
        }
    }"#;

    let from_list = render(list);
    let from_object = render(messages_object);
    let from_mapping = render(mapping);

    assert_eq!(sections(&from_list), sections(&from_object));
    assert_eq!(sections(&from_list), sections(&from_mapping));
    assert!(from_list.contains("## User"));
    assert!(from_list.contains("## Assistant"));
}

#[test]
fn hello_conversation_end_to_end() {
    let output =
        render(r#"[{"role":"user","content":"Hello"},{"role":"assistant","content":"Hi there"}]"#);

    assert!(output.contains("## User\n\nHello\n"));
    assert!(output.contains("## Assistant\n\nHi there\n"));
    assert!(!output.contains("References"));
}

#[test]
fn citation_end_to_end() {
    let json = r#"[{
        "role": "assistant",
        "content": "AI is a field of study【1†L15-L23】.",
        "metadata": {
            "citations": [{
                "metadata": {"title": "Introduction to AI", "url": "https://example.com/ai"}
            }]
        }
    }]"#;

    let output = render(json);

    assert!(output.contains("AI is a field of study[【1†L15-L23】](#ref1)."));
    assert!(output.contains("## References"));
    assert!(output.contains("<a id=\"ref1\"></a>"));
    assert!(output.contains("1. Introduction to AI"));
    assert!(output.contains("[https://example.com/ai](https://example.com/ai)"));
}

#[test]
fn out_of_range_marker_survives_verbatim() {
    let json = r#"[{
        "role": "assistant",
        "content": "claim【5†L1-L9】 here",
        "metadata": {
            "citations": [
                {"metadata": {"title": "A", "url": "https://a"}},
                {"metadata": {"title": "B", "url": "https://b"}}
            ]
        }
    }]"#;

    let output = render(json);

    assert!(output.contains("claim【5†L1-L9】 here"));
    assert!(!output.contains("#ref"));
    assert!(!output.contains("## References"));
}

#[test]
fn shared_citation_across_messages_gets_one_reference() {
    let json = r#"[
        {
            "role": "assistant",
            "content": "first【1】",
            "metadata": {"citations": [{"metadata": {"title": "Same", "url": "https://same"}}]}
        },
        {
            "role": "assistant",
            "content": "second【1】",
            "metadata": {"citations": [{"metadata": {"title": "Same", "url": "https://same"}}]}
        }
    ]"#;

    let output = render(json);

    assert!(output.contains("first[【1】](#ref1)"));
    assert!(output.contains("second[【1】](#ref1)"));
    assert_eq!(output.matches("<a id=\"ref1\"></a>").count(), 1);
    assert!(!output.contains("ref2"));
}

#[test]
fn empty_conversation_renders_title_only() {
    let output =
        render(r#"[{"role": "user", "content": ""}, {"role": "system", "content": "   "}]"#);

    assert_eq!(output, "# ChatGPT Conversation\n\n");
}

#[test]
fn canvas_conversation_end_to_end() {
    let json = r#"[
        {"role": "user", "content": "Write fibonacci"},
        {"type": "canvas", "canvas": {
            "name": "fib.py",
            "type": "code/python",
            "content": "def fib(n):\n    return n"
        }}
    ]"#;

    let output = render(json);

    assert!(output.contains("**fib.py**"));
    assert!(output.contains("```python\ndef fib(n):\n    return n\n```"));
}

#[test]
fn malformed_message_does_not_poison_conversation() {
    let json = r#"[
        {"role": "user", "content": "fine"},
        {"unexpected": {"deeply": ["nested", 1]}},
        {"role": "assistant", "content": "also fine"}
    ]"#;

    let output = render(json);

    assert!(output.contains("fine"));
    assert!(output.contains("also fine"));
    // The junk entry is preserved as a JSON dump, not dropped.
    assert!(output.contains("```json"));
    assert!(output.contains("\"unexpected\""));
}

#[test]
fn unsupported_format_is_a_hard_error() {
    let result = parser::parse_conversation(r#"{"just": "an object"}"#);
    assert!(matches!(
        result,
        Err(parser::ParseError::UnsupportedFormat { .. })
    ));
}

/// Round-trips an export through the filesystem the way the CLI does.
#[test]
fn converts_export_written_to_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input_path = dir.path().join("conversation.json");
    fs::write(
        &input_path,
        r#"{"messages": [{"role": "user", "content": "from disk"}]}"#,
    )
    .expect("write input");

    let json = fs::read_to_string(&input_path).expect("read input");
    let markdown = render(&json);

    let output_path = dir.path().join("conversation.md");
    fs::write(&output_path, &markdown).expect("write output");

    let roundtrip = fs::read_to_string(&output_path).expect("read output");
    assert!(roundtrip.contains("## User"));
    assert!(roundtrip.contains("from disk"));
}
