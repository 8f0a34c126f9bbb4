mod config;
mod highlight;

use std::{sync::Arc, time::Instant};

use comrak::{
    Arena, format_html,
    nodes::{AstNode, NodeHtmlBlock, NodeValue},
    parse_document,
};
use metrics::{counter, histogram};
use once_cell::sync::Lazy;
use syntect::{html::ClassStyle, parsing::SyntaxSet};
use tracing::warn;

use crate::application::render::types::{
    DocumentStats, RenderError, RenderOutput, RenderProfile, RenderRequest, RenderService,
};

use config::{build_sanitizer, options_for};

const WORDS_PER_MINUTE: u32 = 200;
const METRIC_RENDER_TOTAL: &str = "marksmith_render_total";
const METRIC_RENDER_MS: &str = "marksmith_render_ms";

/// Comrak-based rendering pipeline with Syntect highlighting and Ammonia sanitisation.
pub struct ComrakRenderService {
    preview_options: comrak::Options<'static>,
    export_options: comrak::Options<'static>,
    syntax_set: SyntaxSet,
    class_style: ClassStyle,
    sanitizer: ammonia::Builder<'static>,
}

impl ComrakRenderService {
    fn new() -> Self {
        Self {
            preview_options: options_for(RenderProfile::Preview),
            export_options: options_for(RenderProfile::Export),
            syntax_set: SyntaxSet::load_defaults_newlines(),
            class_style: ClassStyle::SpacedPrefixed { prefix: "syntax-" },
            sanitizer: build_sanitizer(),
        }
    }

    fn options(&self, profile: RenderProfile) -> &comrak::Options<'static> {
        match profile {
            RenderProfile::Preview => &self.preview_options,
            RenderProfile::Export => &self.export_options,
        }
    }
}

static RENDER_SERVICE: Lazy<Arc<ComrakRenderService>> =
    Lazy::new(|| Arc::new(ComrakRenderService::new()));

/// Access the shared render service instance, initialised on first use.
pub fn render_service() -> Arc<ComrakRenderService> {
    Arc::clone(&RENDER_SERVICE)
}

impl Default for ComrakRenderService {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderService for ComrakRenderService {
    fn render(&self, request: &RenderRequest) -> Result<RenderOutput, RenderError> {
        let started_at = Instant::now();
        let options = self.options(request.profile);
        let arena = Arena::new();
        let root = parse_document(&arena, &request.markdown, options);

        let words = count_words(root);
        let code_blocks = highlight_stage(root, &self.syntax_set, &self.class_style);
        let rendered_html = render_html_stage(root, options)?;
        let html = self.sanitizer.clean(&rendered_html).to_string();

        let profile = request.profile.as_str();
        counter!(METRIC_RENDER_TOTAL, "profile" => profile).increment(1);
        histogram!(METRIC_RENDER_MS, "profile" => profile)
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        Ok(RenderOutput {
            html,
            stats: build_stats(&request.markdown, words, code_blocks),
        })
    }
}

/// Replace fenced code blocks with pre-highlighted HTML, returning how many were rewritten.
fn highlight_stage<'a>(
    root: &'a AstNode<'a>,
    syntax_set: &SyntaxSet,
    class_style: &ClassStyle,
) -> u32 {
    let mut count = 0u32;
    for node in root.descendants() {
        let Some((language, literal)) = extract_code_block(node) else {
            continue;
        };
        let language_ref = language.as_deref();
        let html = highlight::highlight_code(language_ref, &literal, syntax_set, class_style)
            .unwrap_or_else(|err| {
                warn!(
                    target = "application::render",
                    error = %err,
                    "Syntax highlighting failed; falling back to plain code block"
                );
                highlight::plain_code_block(language_ref, &literal)
            });

        let mut data = node.data.borrow_mut();
        data.value = NodeValue::HtmlBlock(NodeHtmlBlock {
            block_type: 0,
            literal: html,
        });
        count = count.saturating_add(1);
    }
    count
}

fn render_html_stage<'a>(
    root: &'a AstNode<'a>,
    options: &comrak::Options<'static>,
) -> Result<String, RenderError> {
    let mut html = String::new();
    format_html(root, options, &mut html).map_err(|err| RenderError::Markdown {
        message: err.to_string(),
    })?;
    Ok(html)
}

fn extract_code_block(node: &AstNode<'_>) -> Option<(Option<String>, String)> {
    let data = node.data.borrow();
    if let NodeValue::CodeBlock(block) = &data.value {
        let language = block
            .info
            .split_whitespace()
            .next()
            .map(|token| token.to_string());
        Some((language, block.literal.clone()))
    } else {
        None
    }
}

fn count_words<'a>(root: &'a AstNode<'a>) -> u32 {
    let mut words = 0usize;
    for node in root.descendants() {
        let data = node.data.borrow();
        match &data.value {
            NodeValue::Text(text) => words += text.split_whitespace().count(),
            NodeValue::Code(code) => words += code.literal.split_whitespace().count(),
            NodeValue::CodeBlock(block) => words += block.literal.split_whitespace().count(),
            _ => {}
        }
    }
    u32::try_from(words).unwrap_or(u32::MAX)
}

fn build_stats(markdown: &str, words: u32, code_blocks: u32) -> DocumentStats {
    let characters = u32::try_from(markdown.chars().count()).unwrap_or(u32::MAX);
    let lines = u32::try_from(markdown.lines().count()).unwrap_or(u32::MAX);
    let reading_time_minutes = if words == 0 {
        0
    } else {
        words.div_ceil(WORDS_PER_MINUTE)
    };

    DocumentStats {
        words,
        characters,
        lines,
        reading_time_minutes,
        code_blocks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(markdown: &str, profile: RenderProfile) -> RenderOutput {
        ComrakRenderService::default()
            .render(&RenderRequest::new(markdown).with_profile(profile))
            .expect("render succeeds")
    }

    #[test]
    fn renders_gfm_tables_and_strikethrough() {
        let output = render(
            "| a | b |\n|---|---|\n| 1 | 2 |\n\n~~gone~~",
            RenderProfile::Export,
        );
        assert!(output.html.contains("<table>"));
        assert!(output.html.contains("<del>gone</del>"));
    }

    #[test]
    fn raw_html_is_sanitised() {
        let output = render(
            "hello <script>alert(1)</script><img src=x onerror=alert(1)>",
            RenderProfile::Export,
        );
        assert!(!output.html.contains("<script"));
        assert!(!output.html.contains("onerror"));
    }

    #[test]
    fn code_blocks_are_highlighted_and_counted() {
        let output = render("```rust\nlet x = 1;\n```\n", RenderProfile::Export);
        assert!(output.html.contains("syntax-highlight"));
        assert_eq!(output.stats.code_blocks, 1);
    }

    #[test]
    fn preview_profile_keeps_source_positions() {
        let preview = render("# Title\n\nBody", RenderProfile::Preview);
        let export = render("# Title\n\nBody", RenderProfile::Export);
        assert!(preview.html.contains("data-sourcepos"));
        assert!(!export.html.contains("data-sourcepos"));
    }

    #[test]
    fn stats_count_words_and_reading_time() {
        let output = render("one two three\n\nfour *five*", RenderProfile::Export);
        assert_eq!(output.stats.words, 5);
        assert_eq!(output.stats.lines, 3);
        assert_eq!(output.stats.reading_time_minutes, 1);
    }

    #[test]
    fn empty_document_has_zero_reading_time() {
        let output = render("", RenderProfile::Export);
        assert_eq!(output.stats, DocumentStats::default());
        assert!(output.html.is_empty());
    }

    #[test]
    fn rendering_is_deterministic() {
        let first = render("- [x] done\n- [ ] todo", RenderProfile::Preview);
        let second = render("- [x] done\n- [ ] todo", RenderProfile::Preview);
        assert_eq!(first, second);
    }
}
