//! 研究输出的兜底解析
//!
//! 模型（尤其是开启搜索工具、无法强制 JSON 的后端）返回的文本格式不稳定。按顺序尝试：
//! 1. 直接 JSON 解析
//! 2. 正则提取 JSON 块（```json ... ``` 或最外层花括号）
//! 3. 编号列表启发式（`1. 标题 - 简述`）
//! 4. `Topic: ... / Context: ...` 键值行
//!
//! 每个策略返回 `Option<Vec<Story>>`，只有得到非空且合法的结果才算命中；结果截断为 3 条。

use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::model::Story;
use crate::providers::MAX_STORIES;

/// 单个解析策略
pub type ParseStrategy = fn(&str) -> Option<Vec<Story>>;

/// 按优先级排列的策略表
pub const STRATEGIES: &[(&str, ParseStrategy)] = &[
    ("direct_json", parse_direct_json),
    ("json_block", parse_json_block),
    ("numbered_list", parse_numbered_list),
    ("key_value", parse_key_value),
];

/// 解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResearchParse {
    Stories(Vec<Story>),
    /// 后端以合法结构明确表示没有新闻（`{"stories": []}`）
    NoneFound,
    Unparseable,
}

/// 依次尝试全部策略
pub fn parse_research_output(raw: &str) -> ResearchParse {
    for (name, strategy) in STRATEGIES {
        if let Some(stories) = strategy(raw) {
            tracing::debug!(strategy = name, count = stories.len(), "research output parsed");
            return ResearchParse::Stories(stories);
        }
    }
    if reports_none_found(raw) {
        ResearchParse::NoneFound
    } else {
        ResearchParse::Unparseable
    }
}

pub fn parse_direct_json(raw: &str) -> Option<Vec<Story>> {
    let value: Value = serde_json::from_str(raw.trim()).ok()?;
    non_empty(json_stories(&value)?.1)
}

pub fn parse_json_block(raw: &str) -> Option<Vec<Story>> {
    json_candidates(raw)
        .into_iter()
        .filter_map(|c| serde_json::from_str::<Value>(c).ok())
        .find_map(|v| non_empty(json_stories(&v)?.1))
}

pub fn parse_numbered_list(raw: &str) -> Option<Vec<Story>> {
    static ITEM: OnceLock<Regex> = OnceLock::new();
    let item = ITEM.get_or_init(|| Regex::new(r"^\s*\d{1,2}[.)]\s+(.+)$").expect("valid regex"));

    let mut stories = Vec::new();
    let mut current: Option<(String, Vec<String>)> = None;
    for line in raw.lines() {
        if let Some(cap) = item.captures(line) {
            if let Some(done) = current.take() {
                stories.push(done);
            }
            let header = clean(&cap[1]);
            let (topic, inline) = split_header(&header);
            current = Some((topic, inline.into_iter().collect()));
        } else if let Some((_, body)) = current.as_mut() {
            let text = clean(line);
            if !text.is_empty() {
                body.push(strip_label(&text).to_string());
            }
        }
    }
    if let Some(done) = current.take() {
        stories.push(done);
    }

    let stories = stories
        .into_iter()
        .map(|(topic, body)| Story::new(topic, body.join(" ")))
        .collect();
    non_empty(stories)
}

pub fn parse_key_value(raw: &str) -> Option<Vec<Story>> {
    static KV: OnceLock<Regex> = OnceLock::new();
    let kv = KV.get_or_init(|| {
        Regex::new(r"(?i)^\s*[-*]?\s*\**(topic|headline|title|context|summary|description)\**\s*[:：]\s*(.+)$")
            .expect("valid regex")
    });

    let mut stories = Vec::new();
    let mut topic: Option<String> = None;
    for line in raw.lines() {
        let Some(cap) = kv.captures(line) else { continue };
        let value = clean(&cap[2]);
        match cap[1].to_lowercase().as_str() {
            "topic" | "headline" | "title" => topic = Some(value),
            _ => {
                if let Some(t) = topic.take() {
                    stories.push(Story::new(t, value));
                }
            }
        }
    }
    non_empty(stories)
}

/// 把模型输出解析为结构体：先整体解析，再尝试代码块与最外层花括号
pub fn parse_json_object<T: DeserializeOwned>(raw: &str) -> Option<T> {
    serde_json::from_str(raw.trim())
        .ok()
        .or_else(|| json_candidates(raw).into_iter().find_map(|c| serde_json::from_str(c).ok()))
}

/// JSON 中是否带着空的 stories 数组
fn reports_none_found(raw: &str) -> bool {
    let direct = serde_json::from_str::<Value>(raw.trim()).ok();
    direct
        .into_iter()
        .chain(
            json_candidates(raw)
                .into_iter()
                .filter_map(|c| serde_json::from_str::<Value>(c).ok()),
        )
        .any(|v| matches!(json_stories(&v), Some((0, _))))
}

/// 从 JSON 值中取 stories：`{"stories": [...]}` 或顶层数组；返回 (原始条数, 合法条目)
fn json_stories(value: &Value) -> Option<(usize, Vec<Story>)> {
    let items = match value {
        Value::Object(map) => map.get("stories")?.as_array()?,
        Value::Array(items) => items,
        _ => return None,
    };
    let stories = items.iter().filter_map(story_from_json).collect();
    Some((items.len(), stories))
}

fn story_from_json(item: &Value) -> Option<Story> {
    let field = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| item.get(*k).and_then(Value::as_str))
            .map(clean)
    };
    let topic = field(&["topic", "headline", "title"])?;
    let context = field(&["context", "summary", "description"])?;
    Some(Story::new(topic, context))
}

/// 可能包含 JSON 的片段：代码块优先，其次最外层 {...} / [...]
fn json_candidates(raw: &str) -> Vec<&str> {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("valid regex")
    });

    let mut out: Vec<&str> = fence
        .captures_iter(raw)
        .filter_map(|c| c.get(1).map(|m| m.as_str().trim()))
        .collect();
    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (raw.find(open), raw.rfind(close)) {
            if start < end {
                out.push(&raw[start..=end]);
            }
        }
    }
    out
}

fn non_empty(stories: Vec<Story>) -> Option<Vec<Story>> {
    let valid: Vec<Story> = stories
        .into_iter()
        .filter(Story::is_valid)
        .take(MAX_STORIES)
        .collect();
    if valid.is_empty() {
        None
    } else {
        Some(valid)
    }
}

/// 去掉 markdown 强调、标题符号与首尾引号
fn clean(s: &str) -> String {
    s.replace("**", "")
        .replace("__", "")
        .trim()
        .trim_start_matches('#')
        .trim()
        .trim_matches('"')
        .trim()
        .to_string()
}

/// "标题 - 简述" / "标题: 简述" 拆分；没有分隔符时整行为标题
fn split_header(header: &str) -> (String, Option<String>) {
    for sep in [" - ", " — ", ": "] {
        if let Some((topic, rest)) = header.split_once(sep) {
            let rest = rest.trim();
            if !topic.trim().is_empty() && !rest.is_empty() {
                return (topic.trim().to_string(), Some(rest.to_string()));
            }
        }
    }
    (header.trim_end_matches(':').trim().to_string(), None)
}

/// 去掉续行里的 "Context:" 一类前缀
fn strip_label(line: &str) -> &str {
    let trimmed = line.trim_start_matches(['-', '*', ' ']);
    for label in ["Context:", "Summary:", "Description:"] {
        if let Some(rest) = trimmed.strip_prefix(label) {
            return rest.trim();
        }
    }
    trimmed
}
