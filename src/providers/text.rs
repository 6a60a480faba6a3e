//! 生成文本的清洗与解析：去掉模型的自我陈述、截断摘要、规范化标签、解析 SEO

use std::collections::HashSet;

use serde::Deserialize;

use crate::model::SeoMetadata;

pub const DEFAULT_TAGS: [&str; 3] = ["Global Affairs", "Analysis", "Current Events"];
pub const MAX_TAGS: usize = 5;
pub const MIN_TAGS: usize = 3;
pub const SEO_DESCRIPTION_CHARS: usize = 155;

const META_PREFIXES: &[&str] = &[
    "as an ai",
    "as a language model",
    "as an artificial intelligence",
    "i am an ai",
    "i'm an ai",
    "here is",
    "here's",
    "sure,",
    "sure!",
    "certainly",
    "below is",
    "i have written",
    "i've written",
    "note:",
];

/// 去掉以模型自我陈述开头的句子 / 行（"As an AI…", "Here is the article…"）
pub fn scrub_meta(text: &str) -> String {
    text.lines()
        .map(strip_meta_sentences)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// 逐句去掉行首的自我陈述；整行都是时返回空串
fn strip_meta_sentences(line: &str) -> &str {
    let mut rest = line.trim();
    while is_meta(rest) {
        match first_sentence_end(rest) {
            Some(end) => rest = rest[end..].trim_start(),
            None => return "",
        }
    }
    rest
}

fn is_meta(line: &str) -> bool {
    let lower = line.trim().trim_start_matches(['*', '#', ' ']).to_lowercase();
    META_PREFIXES.iter().any(|p| lower.starts_with(p))
}

fn first_sentence_end(text: &str) -> Option<usize> {
    text.char_indices()
        .find(|&(i, c)| {
            matches!(c, '.' | '!' | '?')
                && text[i + c.len_utf8()..]
                    .chars()
                    .next()
                    .map_or(true, char::is_whitespace)
        })
        .map(|(i, c)| i + c.len_utf8())
}

/// 取前 n 句
pub fn first_sentences(text: &str, n: usize) -> String {
    let mut rest = text.trim();
    let mut out = String::new();
    for _ in 0..n {
        match first_sentence_end(rest) {
            Some(end) => {
                out.push_str(&rest[..end]);
                out.push(' ');
                rest = rest[end..].trim_start();
            }
            None => {
                out.push_str(rest);
                rest = "";
                break;
            }
        }
        if rest.is_empty() {
            break;
        }
    }
    out.trim().to_string()
}

/// 去重（大小写不敏感）、去空、去 `#`，至多 5 个
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|t| t.as_ref().trim().trim_start_matches('#').trim().trim_matches('"').to_string())
        .filter(|t| !t.is_empty() && t.len() <= 60)
        .filter(|t| seen.insert(t.to_lowercase()))
        .take(MAX_TAGS)
        .collect()
}

pub fn default_tags() -> Vec<String> {
    DEFAULT_TAGS.iter().map(|s| s.to_string()).collect()
}

/// 不足 MIN_TAGS 个时依次从 fallback 补齐（去重，至多 MAX_TAGS）
pub fn pad_tags<I, S>(tags: Vec<String>, fallback: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    if tags.len() >= MIN_TAGS {
        return tags;
    }
    normalize_tags(tags.into_iter().chain(fallback.into_iter().map(|s| s.as_ref().to_string())))
}

/// 解析标签生成的输出：JSON 数组，或逗号 / 换行分隔的列表；不足 3 个时用默认标签补齐
pub fn parse_tags(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    let candidates: Vec<String> = match serde_json::from_str::<Vec<String>>(raw) {
        Ok(list) => list,
        Err(_) => raw
            .split([',', '\n', ';'])
            .map(|s| {
                s.trim()
                    .trim_start_matches(|c: char| c.is_ascii_digit() || matches!(c, '.' | ')' | '-' | '*'))
                    .to_string()
            })
            .filter(|s| !is_meta(s) && !s.ends_with(':'))
            .collect(),
    };
    pad_tags(normalize_tags(candidates), DEFAULT_TAGS)
}

#[derive(Deserialize)]
struct SeoJson {
    title: String,
    description: String,
}

/// 解析 SEO 输出：JSON `{title, description}` 或 `Title:` / `Description:` 行
pub fn parse_seo(raw: &str) -> Option<SeoMetadata> {
    let trimmed = raw.trim();
    let json_slice = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(s), Some(e)) if s < e => &trimmed[s..=e],
        _ => trimmed,
    };
    if let Ok(seo) = serde_json::from_str::<SeoJson>(json_slice) {
        return seo_if_valid(seo.title, seo.description);
    }

    let mut title = None;
    let mut description = None;
    for line in trimmed.lines() {
        let line = line.replace("**", "");
        let Some((key, value)) = line.split_once(':') else { continue };
        match key.trim().to_lowercase().as_str() {
            "title" | "seo title" | "meta title" => title = Some(value.trim().to_string()),
            "description" | "meta description" => description = Some(value.trim().to_string()),
            _ => {}
        }
    }
    seo_if_valid(title?, description?)
}

fn seo_if_valid(title: String, description: String) -> Option<SeoMetadata> {
    let title = title.trim().trim_matches('"').to_string();
    let description = truncate_chars(description.trim().trim_matches('"'), SEO_DESCRIPTION_CHARS);
    if title.is_empty() || description.is_empty() {
        None
    } else {
        Some(SeoMetadata { title, description })
    }
}

/// 由 Story 推导的默认 SEO
pub fn default_seo(topic: &str, context: &str) -> SeoMetadata {
    SeoMetadata {
        title: topic.trim().to_string(),
        description: truncate_chars(context.trim(), SEO_DESCRIPTION_CHARS),
    }
}

/// 按字符（而非字节）截断
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
