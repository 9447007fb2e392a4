//! Keyword tables and compiled patterns for the extraction stages.

use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};

use crate::providers::ProviderKind;
use crate::types::{ImageSize, Quality};

const PROVIDER_ALIASES: &[(&str, ProviderKind)] = &[
    ("阿里", ProviderKind::Tongyi),
    ("通义", ProviderKind::Tongyi),
    ("万相", ProviderKind::Tongyi),
    ("tongyi", ProviderKind::Tongyi),
    ("wanx", ProviderKind::Tongyi),
    ("火山", ProviderKind::Volcengine),
    ("volcengine", ProviderKind::Volcengine),
    ("volcano", ProviderKind::Volcengine),
    ("百度", ProviderKind::Qianfan),
    ("千帆", ProviderKind::Qianfan),
    ("qianfan", ProviderKind::Qianfan),
    ("baidu", ProviderKind::Qianfan),
    ("讯飞", ProviderKind::Xunfei),
    ("星火", ProviderKind::Xunfei),
    ("xunfei", ProviderKind::Xunfei),
    ("spark", ProviderKind::Xunfei),
    ("ppio", ProviderKind::Ppio),
    ("智谱", ProviderKind::Zhipu),
    ("zhipu", ProviderKind::Zhipu),
    ("chatglm", ProviderKind::Zhipu),
    ("cogview", ProviderKind::Zhipu),
    ("openai", ProviderKind::OpenAi),
    ("dall-e", ProviderKind::OpenAi),
    ("dalle", ProviderKind::OpenAi),
    ("gemini", ProviderKind::Gemini),
    ("google", ProviderKind::Gemini),
    ("imagen", ProviderKind::Gemini),
    ("grok", ProviderKind::Grok),
    ("x.ai", ProviderKind::Grok),
    ("xai", ProviderKind::Grok),
];

pub(crate) fn provider_alias(token: &str) -> Option<ProviderKind> {
    let token = token
        .trim_end_matches(|c: char| c.is_ascii_punctuation() && c != '-')
        .to_lowercase();
    PROVIDER_ALIASES
        .iter()
        .find(|(alias, _)| *alias == token)
        .map(|(_, kind)| *kind)
}

pub(crate) const STYLE_KEYWORDS: &[(&str, &str)] = &[
    ("写实", "realistic"),
    ("卡通", "cartoon"),
    ("动漫", "anime"),
    ("油画", "oil_painting"),
    ("水彩", "watercolor"),
    ("素描", "sketch"),
    ("黑白", "black_white"),
    ("赛博朋克", "cyberpunk"),
    ("蒸汽朋克", "steampunk"),
    ("简约", "minimalist"),
    ("抽象", "abstract"),
    ("科幻", "sci_fi"),
    ("奇幻", "fantasy"),
    ("恐怖", "horror"),
    ("可爱", "cute"),
    ("清新", "fresh"),
    ("暗黑", "dark"),
    ("明亮", "bright"),
    ("梦幻", "dreamy"),
    ("复古", "vintage"),
    ("现代", "modern"),
    ("古典", "classical"),
];

// Only terms that are unlikely to be part of the subject are matched bare.
const ENGLISH_STYLE_KEYWORDS: &[(&str, &str)] = &[
    ("photorealistic", "realistic"),
    ("realistic", "realistic"),
    ("black and white", "black_white"),
    ("cyberpunk", "cyberpunk"),
    ("steampunk", "steampunk"),
    ("minimalist", "minimalist"),
    ("sci-fi", "sci_fi"),
    ("vintage", "vintage"),
];

// Nouns that are often the subject itself ("an anime girl", "a sketch of a cat"); they
// only count as a style when followed by "style".
const ENGLISH_FRAMED_STYLE_KEYWORDS: &[(&str, &str)] = &[
    ("cartoon", "cartoon"),
    ("anime", "anime"),
    ("oil painting", "oil_painting"),
    ("watercolor", "watercolor"),
    ("sketch", "sketch"),
];

// Accepted only when captured by a generic "X style" phrase.
const ENGLISH_STYLE_WORDS: &[(&str, &str)] = &[
    ("abstract", "abstract"),
    ("fantasy", "fantasy"),
    ("horror", "horror"),
    ("cute", "cute"),
    ("fresh", "fresh"),
    ("dark", "dark"),
    ("bright", "bright"),
    ("dreamy", "dreamy"),
    ("modern", "modern"),
    ("classical", "classical"),
];

/// Canonical style for a captured token, if the token names a known style.
pub(crate) fn canonical_style(token: &str) -> Option<&'static str> {
    let lowered = token.trim().to_lowercase();
    STYLE_KEYWORDS
        .iter()
        .chain(ENGLISH_STYLE_KEYWORDS)
        .chain(ENGLISH_FRAMED_STYLE_KEYWORDS)
        .chain(ENGLISH_STYLE_WORDS)
        .find(|(keyword, _)| *keyword == lowered)
        .map(|(_, style)| *style)
}

fn build(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .expect("extractor pattern is valid")
}

fn alternation<'a>(keywords: impl Iterator<Item = &'a str>) -> String {
    let mut keywords = keywords.collect::<Vec<_>>();
    // Longest first so overlapping keywords resolve to the more specific one.
    keywords.sort_by_key(|keyword| std::cmp::Reverse(keyword.chars().count()));
    keywords
        .into_iter()
        .map(|keyword| regex::escape(keyword).replace(' ', r"\s+"))
        .collect::<Vec<_>>()
        .join("|")
}

pub(crate) fn provider_tag_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| build(r"@([^\s@，,。]+)"))
}

pub(crate) fn provider_use_zh_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| build(r"((?:使用|用)([^\s，,。]+?))(?:生成|画|绘制)"))
}

pub(crate) fn provider_use_en_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        build(r"((?:using|with|via)\s+([\w.\-]+)(?:\s+to)?)\s+(?:generate|draw)")
    })
}

pub(crate) fn explicit_size_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| build(r"(\d{2,5})\s*[x×*]\s*(\d{2,5})"))
}

/// Named sizes in the order they are tried.
pub(crate) fn size_presets() -> &'static [(Regex, ImageSize)] {
    static PRESETS: OnceLock<Vec<(Regex, ImageSize)>> = OnceLock::new();
    PRESETS.get_or_init(|| {
        [
            (r"4k", ImageSize::new(2048, 2048)),
            (r"正方形|方形", ImageSize::new(1024, 1024)),
            (r"横版|横图", ImageSize::new(1792, 1024)),
            (r"竖版|竖图", ImageSize::new(1024, 1792)),
            (r"超宽|ultra-?wide", ImageSize::new(1792, 1024)),
            (r"高清|hd", ImageSize::new(1024, 1024)),
            (r"小图", ImageSize::new(512, 512)),
            (r"中图", ImageSize::new(768, 768)),
            (r"超大", ImageSize::new(1536, 1536)),
            (r"大图", ImageSize::new(1024, 1024)),
            (
                r"square\s+(?:format|size|orientation|mode)",
                ImageSize::new(1024, 1024),
            ),
            (
                r"(?:landscape|horizontal)\s+(?:format|size|orientation|mode)",
                ImageSize::new(1792, 1024),
            ),
            (
                r"(?:portrait|vertical)\s+(?:format|size|orientation|mode)",
                ImageSize::new(1024, 1792),
            ),
            (
                r"small\s+(?:size|image|picture)",
                ImageSize::new(512, 512),
            ),
            (
                r"medium\s+(?:size|image|picture)",
                ImageSize::new(768, 768),
            ),
            (
                r"(?:xlarge|extra\s+large)\s+(?:size|image|picture)",
                ImageSize::new(1536, 1536),
            ),
            (
                r"large\s+(?:size|image|picture)",
                ImageSize::new(1024, 1024),
            ),
        ]
        .into_iter()
        .map(|(pattern, size)| (build(pattern), size))
        .collect()
    })
}

/// One pattern per Chinese style keyword, in table order, each allowing a trailing
/// 风格/样式/风 marker.
pub(crate) fn style_keyword_patterns() -> &'static [(Regex, &'static str, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        STYLE_KEYWORDS
            .iter()
            .map(|&(keyword, style)| {
                let pattern = format!("{}(?:风格|样式|风)?", regex::escape(keyword));
                (build(&pattern), keyword, style)
            })
            .collect()
    })
}

pub(crate) fn style_keyword_en_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        let framed =
            alternation(ENGLISH_FRAMED_STYLE_KEYWORDS.iter().map(|(keyword, _)| *keyword));
        let bare = alternation(ENGLISH_STYLE_KEYWORDS.iter().map(|(keyword, _)| *keyword));
        build(&format!(
            r"(?:in\s+(?:an?\s+)?)?(?:({framed})\s+style|({bare})(?:\s+style)?)"
        ))
    })
}

/// Free-form style phrases, tried in order after the keyword tables miss.
pub(crate) fn style_phrase_regexes() -> &'static [Regex] {
    static REGEXES: OnceLock<Vec<Regex>> = OnceLock::new();
    REGEXES.get_or_init(|| {
        [
            r"(?:风格|样式)\s*(?:[:：]|是|为)\s*([^\s，,。]+)",
            r"([^\s，,。]+)(?:风格|样式)",
            r"(?:做成|制作成|设计成)\s*([^\s，,。]+)",
            r"in\s+the\s+style\s+of\s+([^，,。.;；!?]+)",
            r"(?:styled\s+as|made\s+into)\s+(?:an?\s+)?([\w\-]+)",
            r"in\s+(?:an?\s+)?([\w\-]+)\s+style",
            r"([\w\-]+)\s+style",
        ]
        .into_iter()
        .map(build)
        .collect()
    })
}

/// Count patterns in the order they are tried.
pub(crate) fn count_regexes() -> &'static [Regex] {
    static REGEXES: OnceLock<Vec<Regex>> = OnceLock::new();
    REGEXES.get_or_init(|| {
        [
            r"(\d+)\s*(?:张|个|幅)",
            r"(?:生成|画)\s*(\d+)",
            r"(\d+)\s*(?:pics?|pictures?|images?)(?:\s+of)?",
            r"(?:draw|generate)\s+(\d+)",
        ]
        .into_iter()
        .map(build)
        .collect()
    })
}

pub(crate) fn seed_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| build(r"(?:随机)?(?:seed|种子)\s*[:=：]?\s*(\d+)"))
}

/// Quality phrases in the order they are tried.
pub(crate) fn quality_patterns() -> &'static [(Regex, Quality)] {
    static PATTERNS: OnceLock<Vec<(Regex, Quality)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            ("最高质量", Quality::Highest),
            (r"(?:best|highest|top)\s+quality", Quality::Highest),
            ("标准质量", Quality::Standard),
            (r"standard\s+quality", Quality::Standard),
            ("高质量", Quality::High),
            (r"(?:high\s+quality|hq)", Quality::High),
            ("快速", Quality::Fast),
            ("精细", Quality::Detailed),
            ("粗糙", Quality::Rough),
        ]
        .into_iter()
        .map(|(pattern, quality)| (build(pattern), quality))
        .collect()
    })
}

/// Capture pattern for one negative trigger keyword: the keyword followed by everything
/// up to the next punctuation mark.
pub(crate) fn negative_regex(keyword: &str) -> Option<Regex> {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return None;
    }
    let pattern = format!(r"{}\s*([^，,。；;.!?！？]+)", regex::escape(keyword));
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .ok()
}

pub(crate) fn trigger_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        let chinese = alternation(
            [
                "画一张", "画一个", "画个", "画张", "画画", "绘画", "生图", "生成", "制作",
                "创建", "画",
            ]
            .into_iter(),
        );
        build(&format!(
            r"{chinese}|(?:please\s+)?(?:draw|generate|create)(?:\s+me)?|img"
        ))
    })
}

pub(crate) fn punctuation_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| build(r"[，,。；;！!？?、]+"))
}

pub(crate) fn whitespace_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| build(r"\s+"))
}
