// SPDX-License-Identifier: GPL-3.0-only

//! Convert ChatGPT conversation exports to Markdown.
//!
//! This crate provides parsing and rendering functionality for transforming
//! the JSON shapes produced by ChatGPT's conversation export into readable
//! Markdown documents.
//!
//! # Overview
//!
//! ChatGPT exports conversations in several JSON shapes: a plain list of
//! messages, an object with a `messages` array, or a tree-shaped `mapping`
//! structure. This crate:
//!
//! 1. Detects which shape was given and flattens it into an ordered
//!    message sequence
//! 2. Classifies each message's content (text, code, thoughts, canvas
//!    documents) into a closed set of variants
//! 3. Resolves inline citation markers into links and collects a
//!    deduplicated References section
//! 4. Renders the whole conversation as a single Markdown document
//!
//! # Example
//!
//! ```
//! use cg2md::{parser, renderer};
//!
//! let json = r#"[
//!     {"role": "user", "content": "Hello"},
//!     {"role": "assistant", "content": "Hi there"}
//! ]"#;
//!
//! let conversation = parser::parse_conversation(json).unwrap();
//! let opts = renderer::RenderOptions::default();
//! let markdown = renderer::render_conversation(&conversation, &opts);
//!
//! assert!(markdown.contains("## User"));
//! assert!(markdown.contains("Hi there"));
//! ```
//!
//! # Modules
//!
//! - [`parser`]: format detection, mapping flattening, and content
//!   classification
//! - [`citations`]: citation marker resolution and the reference registry
//! - [`renderer`]: Markdown generation with configurable output options

#![deny(missing_docs)]

pub mod citations;
pub mod parser;
pub mod renderer;
