// SPDX-License-Identifier: GPL-3.0-only

//! JSON parsing for ChatGPT conversation exports.
//!
//! This module handles the three JSON shapes ChatGPT produces when exporting
//! a conversation, and normalizes all of them into one ordered sequence of
//! [`Message`] values.
//!
//! # Format Overview
//!
//! An export is one of:
//! - a plain list of message objects,
//! - an object with a `messages` array,
//! - an object with a `mapping` key holding a tree of nodes linked by
//!   `children` ids (the conversations.json archive format). An archive may
//!   also wrap such an object in a top-level list.
//!
//! Message content arrives in several shapes (plain strings, `parts` arrays,
//! code, model thoughts, canvas documents) and is classified once into the
//! closed [`Content`] set so that rendering never has to probe fields again.
//!
//! # Example
//!
//! ```
//! use cg2md::parser::parse_conversation;
//!
//! let json = r#"{
//!     "messages": [
//!         {"role": "user", "content": "Hello"}
//!     ]
//! }"#;
//!
//! let conversation = parse_conversation(json).unwrap();
//! assert_eq!(conversation.messages.len(), 1);
//! ```

use serde::Deserialize;
use serde_json::{Map, Value};
use snafu::prelude::*;
use std::collections::{HashMap, HashSet};

/// Error type for parsing failures.
///
/// These are the only fatal errors in a conversion: an individual malformed
/// message never aborts the run, it degrades to a raw JSON dump instead.
#[derive(Debug, Snafu)]
pub enum ParseError {
    /// The input is not valid JSON.
    #[snafu(display("failed to parse JSON: {source}"))]
    Json {
        /// The underlying JSON parsing error.
        source: serde_json::Error,
    },

    /// The JSON parses but matches none of the known export shapes.
    #[snafu(display("unsupported conversation format: {shape}"))]
    UnsupportedFormat {
        /// Description of the top-level shape that was encountered.
        shape: String,
    },
}

/// The top-level shape of an export, in detection priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// A plain list of message objects (or a single bare message object).
    MessageList,
    /// An object with a `messages` array.
    MessagesObject,
    /// An object with a tree-shaped `mapping` structure.
    Mapping,
}

impl ExportFormat {
    /// Short human-readable name, used for diagnostics.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::MessageList => "message list",
            Self::MessagesObject => "messages object",
            Self::Mapping => "mapping tree",
        }
    }
}

/// The author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The human participant.
    User,
    /// The model.
    Assistant,
    /// System prompts.
    System,
    /// Tool output fed back into the conversation.
    Tool,
    /// Any role string not recognized above, or a missing role.
    Unknown,
}

impl Role {
    fn from_name(name: &str) -> Self {
        match name {
            "user" => Self::User,
            "assistant" => Self::Assistant,
            "system" => Self::System,
            "tool" => Self::Tool,
            _ => Self::Unknown,
        }
    }

    /// Capitalized form used for section headings.
    #[must_use]
    pub const fn heading(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
            Self::System => "System",
            Self::Tool => "Tool",
            Self::Unknown => "Unknown",
        }
    }
}

/// One entry in a `thoughts` content block.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Thought {
    /// Optional one-line summary preceding the thought text.
    #[serde(default)]
    pub summary: Option<String>,

    /// The thought text itself.
    #[serde(default, alias = "text")]
    pub content: String,
}

/// Whether a canvas holds code or prose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanvasKind {
    /// A code canvas, with the language taken from its `code/<lang>` type.
    Code {
        /// Language tag for the fenced block, if the type carried one.
        language: Option<String>,
    },
    /// A prose document canvas.
    Document,
}

/// A message's content, classified once during parsing.
///
/// The variant is determined by shape-sniffing the raw JSON value; rendering
/// dispatches on this closed set instead of re-probing fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    /// A plain string, emitted verbatim.
    Text(String),
    /// A `parts` array; string parts are emitted verbatim, object parts
    /// fall back to a raw JSON dump.
    Parts(Vec<Value>),
    /// A code block with an optional language tag.
    Code {
        /// Language tag for the fence, if known.
        language: Option<String>,
        /// The code itself.
        text: String,
    },
    /// A sequence of model thoughts.
    Thoughts(Vec<Thought>),
    /// A canvas document or code artifact.
    Canvas {
        /// Code or prose.
        kind: CanvasKind,
        /// Canvas name, when present.
        title: Option<String>,
        /// The canvas body.
        text: String,
    },
    /// Anything unrecognized, preserved as pretty-printed JSON so no
    /// content is silently dropped.
    Raw(Value),
}

impl Content {
    /// Returns `true` if rendering this content would produce nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::Parts(parts) => parts.iter().all(|part| match part {
                Value::String(text) => text.trim().is_empty(),
                Value::Null => true,
                _ => false,
            }),
            Self::Code { text, .. } => text.trim().is_empty(),
            Self::Thoughts(thoughts) => thoughts
                .iter()
                .all(|thought| thought.content.trim().is_empty()),
            Self::Canvas { title, text, .. } => title.is_none() && text.trim().is_empty(),
            Self::Raw(value) => value.is_null(),
        }
    }

    /// Short name of the classified variant, used for diagnostics.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Parts(_) => "parts",
            Self::Code { .. } => "code",
            Self::Thoughts(_) => "thoughts",
            Self::Canvas { .. } => "canvas",
            Self::Raw(_) => "raw",
        }
    }
}

/// Citation metadata attached to a message.
///
/// Sourced from whichever of the known metadata locations is populated:
/// a direct `citations` array, `content_references` items, or
/// `search_result_groups` entries. At least one of `title` or `url` is
/// always present.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CitationMeta {
    /// Source title.
    pub title: Option<String>,
    /// Source URL.
    pub url: Option<String>,
    /// Short excerpt or description of the source.
    pub snippet: Option<String>,
    /// Attribution line (typically the site name).
    pub attribution: Option<String>,
}

/// One normalized conversation message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Who authored the message.
    pub role: Role,
    /// The classified content.
    pub content: Content,
    /// Creation time as epoch seconds, when the export carries one.
    pub create_time: Option<f64>,
    /// Citation metadata in given order; bracket-marker ordinals index
    /// into this list.
    pub citations: Vec<CitationMeta>,
    /// Reference-style markers: literal `matched_text` strings paired with
    /// the metadata they resolve to.
    pub reference_markers: Vec<(String, CitationMeta)>,
}

/// A fully parsed conversation: the detected shape plus the ordered
/// message sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    /// Which top-level shape the export used.
    pub format: ExportFormat,
    /// Messages in conversation order.
    pub messages: Vec<Message>,
}

/// Parses a JSON string into a [`Conversation`].
///
/// This is the main entry point for parsing. The top-level shape is
/// detected per [`detect_format`], tree-shaped exports are flattened, and
/// every message's content is classified into the [`Content`] set.
///
/// # Errors
///
/// Returns [`ParseError::Json`] if the input is not valid JSON, or
/// [`ParseError::UnsupportedFormat`] if it matches none of the known
/// export shapes.
pub fn parse_conversation(json_str: &str) -> Result<Conversation, ParseError> {
    let value: Value = serde_json::from_str(json_str).context(JsonSnafu)?;
    let format = detect_format(&value)?;

    let messages = match format {
        ExportFormat::Mapping => mapping_table(&value).map(flatten_mapping).unwrap_or_default(),
        ExportFormat::MessagesObject => value
            .get("messages")
            .and_then(Value::as_array)
            .map(|items| collect_messages(items.iter()))
            .unwrap_or_default(),
        ExportFormat::MessageList => match value.as_array() {
            Some(items) => collect_messages(items.iter()),
            // A bare message object is treated as a one-element list.
            None => collect_messages(std::iter::once(&value)),
        },
    };

    Ok(Conversation { format, messages })
}

/// Classifies the top-level shape of a parsed export.
///
/// Rules, in priority order: a sequence is a message list (unless its first
/// element wraps a `mapping`, the archive format), an object with a
/// `messages` array is a messages object, an object with a `mapping` object
/// is a mapping tree, and a bare `role`/`content` object is a one-message
/// list. Anything else is rejected.
///
/// # Errors
///
/// Returns [`ParseError::UnsupportedFormat`] naming the observed top-level
/// shape when none of the rules match.
pub fn detect_format(value: &Value) -> Result<ExportFormat, ParseError> {
    match value {
        Value::Array(items) => {
            let wraps_mapping = items
                .first()
                .is_some_and(|first| first.get("mapping").is_some_and(Value::is_object));
            if wraps_mapping {
                Ok(ExportFormat::Mapping)
            } else {
                Ok(ExportFormat::MessageList)
            }
        }
        Value::Object(map) => {
            if map.get("messages").is_some_and(Value::is_array) {
                Ok(ExportFormat::MessagesObject)
            } else if map.get("mapping").is_some_and(Value::is_object) {
                Ok(ExportFormat::Mapping)
            } else if map.contains_key("role") && map.contains_key("content") {
                Ok(ExportFormat::MessageList)
            } else {
                UnsupportedFormatSnafu {
                    shape: describe_shape(value),
                }
                .fail()
            }
        }
        other => UnsupportedFormatSnafu {
            shape: describe_shape(other),
        }
        .fail(),
    }
}

fn describe_shape(value: &Value) -> String {
    match value {
        Value::Null => "null".to_owned(),
        Value::Bool(_) => "boolean".to_owned(),
        Value::Number(_) => "number".to_owned(),
        Value::String(_) => "string".to_owned(),
        Value::Array(_) => "array".to_owned(),
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            format!("object with keys [{}]", keys.join(", "))
        }
    }
}

/// Locates the `mapping` table, whether the export is the object form or
/// the archive form that wraps it in a list.
fn mapping_table(value: &Value) -> Option<&Map<String, Value>> {
    value
        .get("mapping")
        .and_then(Value::as_object)
        .or_else(|| value.as_array()?.first()?.get("mapping")?.as_object())
}

fn collect_messages<'a>(items: impl Iterator<Item = &'a Value>) -> Vec<Message> {
    items
        .map(normalize_message)
        .filter(|message| !message.content.is_empty())
        .collect()
}

/// Flattens a tree-shaped `mapping` structure into conversation order.
///
/// Traversal starts at the root node (see root rules on the module) and
/// follows `children` links depth-first in their given order. Nodes without
/// a message, with empty content, or marked visually hidden are skipped
/// without error; revisited nodes terminate their branch so a cyclic
/// mapping cannot loop.
#[must_use]
pub fn flatten_mapping(mapping: &Map<String, Value>) -> Vec<Message> {
    let Some(root) = find_root(mapping) else {
        return Vec::new();
    };

    let mut messages = Vec::new();
    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack = vec![root];

    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        let Some(node) = mapping.get(id) else {
            continue;
        };

        if let Some(raw) = node.get("message").filter(|m| m.is_object())
            && !is_hidden(raw)
        {
            let message = normalize_message(raw);
            if !message.content.is_empty() {
                messages.push(message);
            }
        }

        let children: Vec<&str> = child_ids(node).collect();
        for child in children.into_iter().rev() {
            stack.push(child);
        }
    }

    messages
}

/// Picks the traversal root: a node whose `parent` is absent or null, or,
/// if none is marked, a node never referenced as a child. Ties break on
/// fewest inbound references, then lowest node id.
fn find_root(mapping: &Map<String, Value>) -> Option<&str> {
    let mut inbound: HashMap<&str, usize> = mapping.keys().map(|id| (id.as_str(), 0)).collect();
    for node in mapping.values() {
        for child in child_ids(node) {
            if let Some(count) = inbound.get_mut(child) {
                *count += 1;
            }
        }
    }

    let marked: Vec<&str> = mapping
        .iter()
        .filter(|(_, node)| node.get("parent").is_none_or(Value::is_null))
        .map(|(id, _)| id.as_str())
        .collect();

    let candidates = if marked.is_empty() {
        mapping
            .keys()
            .map(String::as_str)
            .filter(|id| inbound.get(*id).copied().unwrap_or(0) == 0)
            .collect::<Vec<&str>>()
    } else {
        marked
    };

    if candidates.is_empty() {
        // Fully cyclic mapping: fall back to the fewest inbound references.
        return mapping
            .keys()
            .map(String::as_str)
            .min_by_key(|id| (inbound.get(*id).copied().unwrap_or(0), *id));
    }

    candidates
        .into_iter()
        .min_by_key(|id| (inbound.get(*id).copied().unwrap_or(0), *id))
}

fn child_ids(node: &Value) -> impl Iterator<Item = &str> {
    node.get("children")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
}

/// Root placeholders and system prompts are exported with this flag set;
/// they carry no conversation content.
fn is_hidden(message: &Value) -> bool {
    message
        .get("metadata")
        .and_then(|m| m.get("is_visually_hidden_from_conversation"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Normalizes one raw message value into a [`Message`], best-effort.
///
/// Missing or unrecognized fields never fail: the role falls back to
/// [`Role::Unknown`] and unclassifiable content is preserved as
/// [`Content::Raw`] so one malformed message cannot poison the rest of
/// the conversation.
#[must_use]
pub fn normalize_message(value: &Value) -> Message {
    if !value.is_object() {
        return Message {
            role: Role::Unknown,
            content: Content::Raw(value.clone()),
            create_time: None,
            citations: Vec::new(),
            reference_markers: Vec::new(),
        };
    }

    let role_name = get_str(value, &["role"]).or_else(|| get_str(value, &["author", "role"]));

    let mut content = if get_str(value, &["type"]) == Some("canvas")
        && let Some(canvas) = value.get("canvas").and_then(Value::as_object)
    {
        canvas_content(canvas)
    } else {
        match value.get("content") {
            Some(raw) if !raw.is_null() => classify_content(raw),
            // An object with a role but no content is a placeholder; one
            // with neither is junk worth preserving.
            _ if role_name.is_some() => Content::Text(String::new()),
            _ => Content::Raw(value.clone()),
        }
    };

    let role = role_name.map_or_else(
        || {
            if matches!(content, Content::Canvas { .. }) {
                Role::Assistant
            } else {
                Role::Unknown
            }
        },
        Role::from_name,
    );

    // Canvas tool calls arrive as JSON strings inside assistant messages.
    if role == Role::Assistant {
        content = promote_embedded_canvas(content);
    }

    let (citations, reference_markers) = value
        .get("metadata")
        .map_or_else(|| (Vec::new(), Vec::new()), collect_citations);

    let create_time = value.get("create_time").and_then(Value::as_f64);

    Message {
        role,
        content,
        create_time,
        citations,
        reference_markers,
    }
}

/// Classifies one raw content value into the [`Content`] set.
///
/// Shape-sniffing rules, first match wins: plain string, `content_type`
/// of `code` / `thoughts` / `reasoning_recap` / `canvas`, a `parts`
/// array, a canvas payload (`name`/`type`/`content` triple), and finally
/// the raw JSON fallback.
#[must_use]
pub fn classify_content(value: &Value) -> Content {
    let Some(map) = value.as_object() else {
        return match value {
            Value::String(text) => Content::Text(text.clone()),
            other => Content::Raw(other.clone()),
        };
    };

    match map.get("content_type").and_then(Value::as_str) {
        Some("code") => Content::Code {
            language: get_string(value, &["language"])
                .filter(|lang| !lang.is_empty() && lang != "unknown"),
            text: get_string(value, &["text"])
                .or_else(|| get_string(value, &["content"]))
                .unwrap_or_default(),
        },
        Some("thoughts") => {
            let thoughts: Vec<Thought> = map
                .get("thoughts")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(|raw| serde_json::from_value(raw.clone()).ok())
                .collect();
            if thoughts.is_empty() {
                Content::Raw(value.clone())
            } else {
                Content::Thoughts(thoughts)
            }
        }
        Some("reasoning_recap") => match get_string(value, &["content"]) {
            Some(text) if !text.trim().is_empty() => Content::Text(text),
            _ => Content::Raw(value.clone()),
        },
        Some("canvas") => canvas_content(map),
        _ => {
            if let Some(parts) = map.get("parts").and_then(Value::as_array) {
                Content::Parts(parts.clone())
            } else if is_canvas_payload(map) {
                canvas_content(map)
            } else {
                Content::Raw(value.clone())
            }
        }
    }
}

/// A canvas payload matches the `canmore.create_textdoc` shape: a string
/// `content`, a string `type`, and a `name` (or `title`).
fn is_canvas_payload(map: &Map<String, Value>) -> bool {
    map.get("content").is_some_and(Value::is_string)
        && map.get("type").is_some_and(Value::is_string)
        && (map.contains_key("name") || map.contains_key("title"))
}

fn canvas_content(map: &Map<String, Value>) -> Content {
    let title = map
        .get("name")
        .or_else(|| map.get("title"))
        .and_then(Value::as_str)
        .filter(|name| !name.trim().is_empty())
        .map(str::to_owned);

    let text = map
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();

    let kind = match map.get("type").and_then(Value::as_str) {
        Some("code") => CanvasKind::Code { language: None },
        Some(ctype) => ctype
            .strip_prefix("code/")
            .map_or(CanvasKind::Document, |lang| CanvasKind::Code {
                language: (!lang.is_empty()).then(|| lang.to_owned()),
            }),
        None => CanvasKind::Document,
    };

    Content::Canvas { kind, title, text }
}

/// Re-classifies assistant text that is actually a serialized canvas call:
/// either a full `create_textdoc` payload or an update carrying a
/// `replacement`. Anything that does not parse stays plain text.
fn promote_embedded_canvas(content: Content) -> Content {
    let Content::Text(text) = &content else {
        return content;
    };
    let trimmed = text.trim();
    if !(trimmed.starts_with('{') && trimmed.ends_with('}')) {
        return content;
    }
    let Ok(embedded) = serde_json::from_str::<Value>(trimmed) else {
        return content;
    };

    if let Some(map) = embedded.as_object()
        && is_canvas_payload(map)
    {
        return canvas_content(map);
    }

    let replacement = embedded
        .get("updates")
        .and_then(Value::as_array)
        .and_then(|updates| updates.first())
        .and_then(|update| update.get("replacement"));

    match replacement {
        Some(Value::String(text)) => Content::Text(text.clone()),
        Some(other) => {
            if let (Some(code), Some(language)) =
                (get_str(other, &["code"]), get_str(other, &["language"]))
            {
                Content::Code {
                    language: Some(language.to_owned()),
                    text: code.to_owned(),
                }
            } else {
                Content::Raw(other.clone())
            }
        }
        None => content,
    }
}

/// Collects citation metadata from a message's `metadata` value.
///
/// Returns the ordered metadata list that bracket-marker ordinals index
/// into, plus the reference-style markers (`matched_text` → metadata).
/// The ordered list comes from the first populated location: the direct
/// `citations` array, then `content_references` items, then
/// `search_result_groups` entries.
fn collect_citations(metadata: &Value) -> (Vec<CitationMeta>, Vec<(String, CitationMeta)>) {
    let direct: Vec<CitationMeta> = metadata
        .get("citations")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(citation_from)
        .collect();

    let mut markers = Vec::new();
    let mut reference_items = Vec::new();
    for reference in metadata
        .get("content_references")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        // Footnote blocks duplicate the per-claim references.
        if get_str(reference, &["type"]) == Some("sources_footnote") {
            continue;
        }
        let items: Vec<CitationMeta> = reference
            .get("items")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(citation_from)
            .collect();
        if let Some(matched) = get_str(reference, &["matched_text"])
            && !matched.is_empty()
            && let Some(first) = items.first()
        {
            markers.push((matched.to_owned(), first.clone()));
        }
        reference_items.extend(items);
    }

    let group_entries: Vec<CitationMeta> = metadata
        .get("search_result_groups")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|group| group.get("entries"))
        .filter_map(Value::as_array)
        .flatten()
        .filter_map(citation_from)
        .collect();

    let ordered = if !direct.is_empty() {
        direct
    } else if !reference_items.is_empty() {
        reference_items
    } else {
        group_entries
    };

    (ordered, markers)
}

/// Extracts one [`CitationMeta`] from a citation entry. Direct `citations`
/// entries nest their fields under a `metadata` key; reference items and
/// search entries carry them directly. Entries with neither a title nor a
/// url are dropped.
fn citation_from(value: &Value) -> Option<CitationMeta> {
    let source = value
        .get("metadata")
        .filter(|m| m.is_object())
        .unwrap_or(value);
    let field = |name: &str| get_string(source, &[name]).filter(|text| !text.trim().is_empty());

    let meta = CitationMeta {
        title: field("title"),
        url: field("url"),
        snippet: field("snippet").or_else(|| field("text")),
        attribution: field("attribution"),
    };

    (meta.title.is_some() || meta.url.is_some()).then_some(meta)
}

/// Navigates a JSON path and returns the string value at the end.
fn get_str<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut current = value;
    for key in path {
        current = current.get(*key)?;
    }
    current.as_str()
}

/// Like [`get_str`] but returns an owned `String`.
fn get_string(value: &Value, path: &[&str]) -> Option<String> {
    get_str(value, path).map(str::to_owned)
}
