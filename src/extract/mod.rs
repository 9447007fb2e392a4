//! Turns one line of free text (Chinese, English or mixed) into a [`GenerationRequest`].
//!
//! Extraction runs as an ordered sequence of stages over a shrinking remainder: provider
//! tag, size, style, count, seed, quality, negative prompt, then cleanup. Each stage strips
//! what it matched before the next one runs, so the order is part of the contract: a size
//! phrase removed in stage two can no longer be read as a style in stage three.

mod tables;

use std::ops::Range;
use std::panic::AssertUnwindSafe;

use regex::{Captures, Regex};
use serde::Serialize;
use tracing::{debug, error};

use crate::config::ExtractorConfig;
use crate::providers::ProviderKind;
use crate::types::{GenerationRequest, ImageSize, Quality};

use tables::{
    canonical_style, count_regexes, explicit_size_regex, negative_regex, provider_alias,
    provider_tag_regex, provider_use_en_regex, provider_use_zh_regex, punctuation_regex,
    quality_patterns, seed_regex, size_presets, style_keyword_en_regex, style_keyword_patterns,
    style_phrase_regexes, trigger_regex, whitespace_regex,
};

const MIN_COUNT: u32 = 1;
const MAX_COUNT: u32 = 10;
const MIN_SIDE: u32 = 256;
const MAX_SIDE: u32 = 2048;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Extraction {
    pub request: GenerationRequest,
    /// The untouched input line.
    pub raw: String,
}

impl Extraction {
    pub fn prompt(&self) -> &str {
        &self.request.prompt
    }

    pub fn negative_prompt(&self) -> Option<&str> {
        self.request.negative_prompt.as_deref()
    }

    pub fn provider(&self) -> Option<&str> {
        self.request.provider.as_deref()
    }
}

/// Stateless apart from the negative trigger keywords (tried in the given order) and the
/// provider used when the text names none.
#[derive(Debug, Clone)]
pub struct ParameterExtractor {
    negative_keywords: Vec<(String, Regex)>,
    default_provider: Option<String>,
}

impl Default for ParameterExtractor {
    fn default() -> Self {
        Self::new(&ExtractorConfig::default())
    }
}

impl ParameterExtractor {
    pub fn new(config: &ExtractorConfig) -> Self {
        let mut extractor = Self::with_negative_keywords(&config.negative_keywords);
        extractor.default_provider = config
            .default_provider
            .as_deref()
            .map(|name| {
                provider_alias(name)
                    .map(|kind| kind.name().to_string())
                    .unwrap_or_else(|| name.trim().to_string())
            })
            .filter(|name| !name.is_empty());
        extractor
    }

    pub fn with_negative_keywords<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let negative_keywords = keywords
            .into_iter()
            .filter_map(|keyword| {
                let keyword = keyword.as_ref().trim().to_string();
                negative_regex(&keyword).map(|regex| (keyword, regex))
            })
            .collect();
        Self {
            negative_keywords,
            default_provider: None,
        }
    }

    pub fn with_default_provider(mut self, provider: impl Into<String>) -> Self {
        self.default_provider = Some(provider.into());
        self
    }

    /// Never fails. If a stage misbehaves the whole line becomes the prompt and every
    /// other field keeps its default.
    pub fn extract(&self, text: &str) -> Extraction {
        match std::panic::catch_unwind(AssertUnwindSafe(|| self.run(text))) {
            Ok(extraction) => extraction,
            Err(_) => {
                error!("parameter extraction failed, using the raw text as prompt");
                let mut request = GenerationRequest::new(text.trim());
                request.provider = self.default_provider.clone();
                Extraction {
                    request,
                    raw: text.to_string(),
                }
            }
        }
    }

    fn run(&self, text: &str) -> Extraction {
        let mut rest = Remainder::new(text);
        let mut request = GenerationRequest::new(String::new());

        request.provider = match drain(&mut rest, extract_provider) {
            Some(kind) => {
                debug!(stage = "provider", provider = kind.name(), "extracted");
                Some(kind.name().to_string())
            }
            None => self.default_provider.clone(),
        };
        if let Some(size) = drain(&mut rest, extract_size) {
            debug!(stage = "size", %size, "extracted");
            request.size = Some(size);
        }
        if let Some(style) = extract_style(&mut rest) {
            debug!(stage = "style", style = %style, "extracted");
            request.style = Some(style);
        }
        if let Some(count) = drain(&mut rest, extract_count) {
            debug!(stage = "count", count, "extracted");
            request.count = count;
        }
        if let Some(seed) = drain(&mut rest, extract_seed) {
            debug!(stage = "seed", seed, "extracted");
            request.seed = Some(seed);
        }
        if let Some(quality) = drain(&mut rest, extract_quality) {
            debug!(stage = "quality", %quality, "extracted");
            request.quality = Some(quality);
        }
        if let Some(negative) = self.extract_negative(&mut rest) {
            debug!(stage = "negative", negative = %negative, "extracted");
            request.negative_prompt = Some(negative);
        }

        let prompt = rest.cleaned();
        request.prompt = if prompt.is_empty() {
            text.trim().to_string()
        } else {
            prompt
        };

        Extraction {
            request,
            raw: text.to_string(),
        }
    }

    /// Only the first keyword (in configured order) with a non-empty capture is used, and
    /// only its first span is removed.
    fn extract_negative(&self, rest: &mut Remainder) -> Option<String> {
        for (keyword, regex) in &self.negative_keywords {
            let hit = bounded(regex, rest.as_str()).find_map(|caps| {
                let captured = caps.get(1)?.as_str().trim();
                if captured.is_empty() {
                    return None;
                }
                Some((caps.get(0)?.range(), captured.to_string()))
            });
            if let Some((range, negative)) = hit {
                debug!(keyword = %keyword, "negative trigger matched");
                rest.cut(range);
                return Some(negative);
            }
        }
        None
    }

    /// Advisory checks on an extraction; the request is still usable when this is non-empty.
    pub fn validate(extraction: &Extraction) -> Vec<String> {
        let request = &extraction.request;
        let mut errors = Vec::new();

        if request.prompt.trim().chars().count() < 2 {
            errors.push("prompt is empty or too short".to_string());
        }
        if let Some(size) = request.size {
            if size.width < MIN_SIDE || size.height < MIN_SIDE {
                errors.push(format!("image size must be at least {MIN_SIDE}x{MIN_SIDE}"));
            }
            if size.width > MAX_SIDE || size.height > MAX_SIDE {
                errors.push(format!("image size must be at most {MAX_SIDE}x{MAX_SIDE}"));
            }
        }
        if !(MIN_COUNT..=MAX_COUNT).contains(&request.count) {
            errors.push(format!("image count must be between {MIN_COUNT} and {MAX_COUNT}"));
        }
        if request.seed.is_some_and(|seed| seed > u64::from(u32::MAX)) {
            errors.push(format!("seed must be between 0 and {}", u32::MAX));
        }
        errors
    }

    /// Canonical provider names the alias table resolves to.
    pub fn supported_providers() -> Vec<&'static str> {
        ProviderKind::ALL.iter().map(ProviderKind::name).collect()
    }

    pub fn supported_styles() -> Vec<&'static str> {
        tables::STYLE_KEYWORDS
            .iter()
            .map(|(keyword, _)| *keyword)
            .collect()
    }
}

struct Remainder {
    text: String,
}

impl Remainder {
    fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }

    fn as_str(&self) -> &str {
        &self.text
    }

    /// Replaces the span with a space so the words around it stay apart.
    fn cut(&mut self, range: Range<usize>) {
        self.text.replace_range(range, " ");
    }

    fn cleaned(mut self) -> String {
        let triggers = bounded(trigger_regex(), &self.text)
            .filter_map(|caps| caps.get(0).map(|m| m.range()))
            .collect::<Vec<_>>();
        for range in triggers.into_iter().rev() {
            self.cut(range);
        }
        let text = punctuation_regex().replace_all(&self.text, " ");
        whitespace_regex().replace_all(&text, " ").trim().to_string()
    }
}

/// Matches whose ASCII alphanumeric edges sit on a word boundary, so `hd` does not fire
/// inside `hdmi`. Non-ASCII edges always pass since Chinese text has no spaces.
fn bounded<'r, 't>(regex: &'r Regex, text: &'t str) -> impl Iterator<Item = Captures<'t>> + 'r
where
    't: 'r,
{
    regex.captures_iter(text).filter(move |caps| {
        caps.get(0)
            .is_some_and(|m| on_ascii_word_boundary(text, m.range()))
    })
}

fn on_ascii_word_boundary(text: &str, range: Range<usize>) -> bool {
    let matched = &text[range.clone()];
    let is_word = |c: char| c.is_ascii_alphanumeric();
    let open_ok = !matched.chars().next().is_some_and(is_word)
        || !text[..range.start].chars().next_back().is_some_and(is_word);
    let close_ok = !matched.chars().next_back().is_some_and(is_word)
        || !text[range.end..].chars().next().is_some_and(is_word);
    open_ok && close_ok
}

/// Runs a stage until it stops matching and keeps the first value. Later hits are
/// duplicates that would otherwise resurface on a second extraction; they are only
/// stripped. Every hit cuts at least two bytes and puts back one, so this ends.
fn drain<T>(rest: &mut Remainder, stage: fn(&mut Remainder) -> Option<T>) -> Option<T> {
    let first = stage(rest)?;
    while stage(rest).is_some() {}
    Some(first)
}

fn extract_provider(rest: &mut Remainder) -> Option<ProviderKind> {
    let tagged = bounded(provider_tag_regex(), rest.as_str())
        .find_map(|caps| Some((caps.get(0)?.range(), provider_alias(&caps[1])?)));
    if let Some((range, kind)) = tagged {
        rest.cut(range);
        return Some(kind);
    }

    // "用通义生成…" / "using openai to draw…": only the "using NAME" part is stripped.
    for regex in [provider_use_zh_regex(), provider_use_en_regex()] {
        let phrased = bounded(regex, rest.as_str())
            .find_map(|caps| Some((caps.get(1)?.range(), provider_alias(&caps[2])?)));
        if let Some((range, kind)) = phrased {
            rest.cut(range);
            return Some(kind);
        }
    }
    None
}

fn extract_size(rest: &mut Remainder) -> Option<ImageSize> {
    let explicit = bounded(explicit_size_regex(), rest.as_str()).find_map(|caps| {
        let width = caps[1].parse().ok()?;
        let height = caps[2].parse().ok()?;
        Some((caps.get(0)?.range(), ImageSize::new(width, height)))
    });
    if let Some((range, size)) = explicit {
        rest.cut(range);
        return Some(size);
    }

    for (regex, size) in size_presets() {
        let hit = bounded(regex, rest.as_str()).find_map(|caps| caps.get(0).map(|m| m.range()));
        if let Some(range) = hit {
            rest.cut(range);
            return Some(*size);
        }
    }
    None
}

fn extract_style(rest: &mut Remainder) -> Option<String> {
    // A keyword carrying an explicit 风格/样式 marker beats bare keywords; otherwise the
    // table order decides.
    let patterns = style_keyword_patterns();
    let marked = patterns.iter().find_map(|(regex, keyword, style)| {
        bounded(regex, rest.as_str())
            .filter_map(|caps| caps.get(0).map(|m| m.range()))
            .find(|range| range.len() > keyword.len())
            .map(|range| (range, *style))
    });
    let bare = || {
        patterns.iter().find_map(|(regex, _, style)| {
            bounded(regex, rest.as_str())
                .find_map(|caps| caps.get(0).map(|m| m.range()))
                .map(|range| (range, *style))
        })
    };
    if let Some((range, style)) = marked.or_else(bare) {
        rest.cut(range);
        return Some(style.to_string());
    }

    let english = bounded(style_keyword_en_regex(), rest.as_str()).find_map(|caps| {
        let token = caps.get(1).or_else(|| caps.get(2))?.as_str();
        Some((caps.get(0)?.range(), canonical_style(token)?))
    });
    if let Some((range, style)) = english {
        rest.cut(range);
        return Some(style.to_string());
    }

    for regex in style_phrase_regexes() {
        let phrased = bounded(regex, rest.as_str()).find_map(|caps| {
            let token = caps.get(1)?.as_str().trim();
            if token.is_empty() {
                return None;
            }
            let style = canonical_style(token)
                .map(str::to_string)
                .unwrap_or_else(|| token.to_string());
            Some((caps.get(0)?.range(), style))
        });
        if let Some((range, style)) = phrased {
            rest.cut(range);
            return Some(style);
        }
    }
    None
}

fn extract_count(rest: &mut Remainder) -> Option<u32> {
    for regex in count_regexes() {
        let hit = bounded(regex, rest.as_str()).find_map(|caps| {
            // Digits too long for u64 are still "a lot" and clamp to the maximum.
            let count = caps[1].parse::<u64>().unwrap_or(u64::MAX);
            let count = count.clamp(u64::from(MIN_COUNT), u64::from(MAX_COUNT)) as u32;
            Some((caps.get(0)?.range(), count))
        });
        if let Some((range, count)) = hit {
            rest.cut(range);
            return Some(count);
        }
    }
    None
}

fn extract_seed(rest: &mut Remainder) -> Option<u64> {
    let hit = bounded(seed_regex(), rest.as_str())
        .find_map(|caps| Some((caps.get(0)?.range(), caps[1].parse::<u64>().ok()?)));
    let (range, seed) = hit?;
    rest.cut(range);
    Some(seed)
}

fn extract_quality(rest: &mut Remainder) -> Option<Quality> {
    for (regex, quality) in quality_patterns() {
        let hit = bounded(regex, rest.as_str()).find_map(|caps| caps.get(0).map(|m| m.range()));
        if let Some(range) = hit {
            rest.cut(range);
            return Some(*quality);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> ParameterExtractor {
        ParameterExtractor::default()
    }

    #[test]
    fn english_tag_size_and_negative() {
        let extraction = ParameterExtractor::with_negative_keywords(["avoid"])
            .extract("@volcano draw a cat 1024x1024 avoid background");
        assert_eq!(extraction.provider(), Some("volcengine"));
        assert_eq!(extraction.request.size, Some(ImageSize::new(1024, 1024)));
        assert_eq!(extraction.prompt(), "a cat");
        assert_eq!(extraction.negative_prompt(), Some("background"));
        assert_eq!(extraction.raw, "@volcano draw a cat 1024x1024 avoid background");
    }

    #[test]
    fn four_k_preset_leaves_subject_alone() {
        let extraction = extractor().extract("draw a landscape 4k");
        assert_eq!(extraction.request.size, Some(ImageSize::new(2048, 2048)));
        assert_eq!(extraction.prompt(), "a landscape");
        assert_eq!(extraction.request.style, None);
    }

    #[test]
    fn chinese_line_with_every_stage() {
        let extraction = extractor()
            .extract("@通义 画一只可爱的猫，赛博朋克风格，横版，3张，seed:42，高质量，不要文字");
        let request = &extraction.request;
        assert_eq!(extraction.provider(), Some("tongyi"));
        assert_eq!(request.size, Some(ImageSize::new(1792, 1024)));
        assert_eq!(request.style.as_deref(), Some("cyberpunk"));
        assert_eq!(request.count, 3);
        assert_eq!(request.seed, Some(42));
        assert_eq!(request.quality, Some(Quality::High));
        assert_eq!(extraction.negative_prompt(), Some("文字"));
        assert_eq!(extraction.prompt(), "一只可爱的猫");
    }

    #[test]
    fn provider_phrases_in_both_languages() {
        let extraction = extractor().extract("用智谱生成一只狗");
        assert_eq!(extraction.provider(), Some("zhipu"));
        assert_eq!(extraction.prompt(), "一只狗");

        let extraction = extractor().extract("using OpenAI to draw a red fox");
        assert_eq!(extraction.provider(), Some("openai"));
        assert_eq!(extraction.prompt(), "a red fox");
    }

    #[test]
    fn unknown_tag_is_left_in_prompt() {
        let extraction = extractor().extract("@midjourney a castle");
        assert_eq!(extraction.provider(), None);
        assert_eq!(extraction.prompt(), "@midjourney a castle");
    }

    #[test]
    fn default_provider_applies_only_without_tag() {
        let extractor = ParameterExtractor::default().with_default_provider("tongyi");
        assert_eq!(extractor.extract("a castle").provider(), Some("tongyi"));
        assert_eq!(extractor.extract("@grok a castle").provider(), Some("grok"));
    }

    #[test]
    fn count_is_clamped() {
        assert_eq!(extractor().extract("画50张猫").request.count, 10);
        assert_eq!(extractor().extract("draw 0 cats").request.count, 1);
        assert_eq!(extractor().extract("generate 4 images of cats").request.count, 4);
        assert_eq!(extractor().extract("a cat").request.count, 1);
    }

    #[test]
    fn custom_style_from_phrase() {
        let extraction = extractor().extract("a harbor at dusk in ghibli style");
        assert_eq!(extraction.request.style.as_deref(), Some("ghibli"));
        assert_eq!(extraction.prompt(), "a harbor at dusk");

        let extraction = extractor().extract("a harbor in a cute style");
        assert_eq!(extraction.request.style.as_deref(), Some("cute"));
    }

    #[test]
    fn ascii_keywords_need_word_boundaries() {
        let extraction = extractor().extract("an hdmi cable on a desk");
        assert_eq!(extraction.request.size, None);
        assert_eq!(extraction.prompt(), "an hdmi cable on a desk");
    }

    #[test]
    fn first_negative_keyword_wins() {
        let extraction = ParameterExtractor::with_negative_keywords(["without", "avoid"])
            .extract("a street, avoid cars, without people");
        assert_eq!(extraction.negative_prompt(), Some("people"));
        assert_eq!(extraction.prompt(), "a street avoid cars");
    }

    #[test]
    fn empty_remainder_falls_back_to_raw_text() {
        let extraction = extractor().extract("  画一张  ");
        assert_eq!(extraction.prompt(), "画一张");
    }

    #[test]
    fn cleaned_prompt_is_a_fixed_point() {
        let extractor = extractor();
        for (line, prompt) in [
            ("@openai draw a lighthouse on a cliff 1792x1024 seed=7", "a lighthouse on a cliff"),
            ("512 4k x512 a cat", "a cat"),
            ("画3张小猫 5张", "小猫"),
            ("a fox seed=1, seed 2", "a fox"),
            ("@grok @openai a castle", "a castle"),
            ("a lake, avoid boats", "a lake"),
            ("an anime girl", "an anime girl"),
            ("draw a sketch of a cat", "a sketch of a cat"),
        ] {
            let first = extractor.extract(line);
            assert_eq!(first.prompt(), prompt, "{line}");

            let second = extractor.extract(first.prompt());
            assert_eq!(second.prompt(), first.prompt(), "{line}");
            assert_eq!(second.request.size, None, "{line}");
            assert_eq!(second.request.seed, None, "{line}");
            assert_eq!(second.request.style, None, "{line}");
            assert_eq!(second.request.quality, None, "{line}");
            assert_eq!(second.request.provider, None, "{line}");
            assert_eq!(second.request.count, 1, "{line}");
            assert_eq!(second.negative_prompt(), None, "{line}");
        }
    }

    #[test]
    fn duplicate_parameters_keep_the_first_value() {
        let extraction = extractor().extract("512 4k x512 a cat");
        assert_eq!(extraction.request.size, Some(ImageSize::new(2048, 2048)));

        let extraction = extractor().extract("画3张小猫 5张");
        assert_eq!(extraction.request.count, 3);

        let extraction = extractor().extract("@grok @openai a castle");
        assert_eq!(extraction.provider(), Some("grok"));
    }

    #[test]
    fn subject_nouns_are_not_styles() {
        let extraction = extractor().extract("an anime girl");
        assert_eq!(extraction.request.style, None);
        assert_eq!(extraction.prompt(), "an anime girl");

        let extraction = extractor().extract("a girl in anime style");
        assert_eq!(extraction.request.style.as_deref(), Some("anime"));
        assert_eq!(extraction.prompt(), "a girl");

        let extraction = extractor().extract("a harbor, oil painting style");
        assert_eq!(extraction.request.style.as_deref(), Some("oil_painting"));
        assert_eq!(extraction.prompt(), "a harbor");
    }

    #[test]
    fn validation_is_advisory() {
        let mut extraction = extractor().extract("a 100x100 cat seed 99999999999");
        assert_eq!(extraction.request.size, Some(ImageSize::new(100, 100)));
        let errors = ParameterExtractor::validate(&extraction);
        assert!(errors.iter().any(|e| e.contains("at least 256x256")), "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("seed")), "{errors:?}");

        extraction.request.prompt = "x".to_string();
        assert!(
            ParameterExtractor::validate(&extraction)
                .iter()
                .any(|e| e.contains("too short"))
        );
    }

    #[test]
    fn supported_lists() {
        assert!(ParameterExtractor::supported_providers().contains(&"volcengine"));
        assert!(ParameterExtractor::supported_styles().contains(&"水彩"));
    }
}
