//! 模型输出的 JSON 结构与其 Schema（schemars 自动生成）
//!
//! Schema 拼入 prompt，减少 LLM 输出格式错误；同一组结构也用作反序列化目标。

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

/// 单条研究结果
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StoryDraft {
    /// 新闻的标题或主题
    pub topic: String,
    /// 基于搜索结果的事件简述
    pub context: String,
}

/// 研究输出：`{"stories": [...]}`；没有可报道的新闻时返回空数组并置 `none_found: true`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResearchDraft {
    pub stories: Vec<StoryDraft>,
    #[serde(default)]
    pub none_found: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SectionDraft {
    /// 小节标题
    pub heading: String,
    /// 该小节的分析正文
    pub content: String,
}

/// 撰写输出
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ArticleDraft {
    /// 吸引眼球、利于 SEO 的标题
    pub title: String,
    /// 两句话的执行摘要
    pub summary: String,
    /// 3-4 个分析小节
    pub sections: Vec<SectionDraft>,
    /// 3-5 个 SEO 关键词
    #[serde(default)]
    pub tags: Vec<String>,
}

/// 综述输出
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisDraft {
    pub title: String,
    /// 把整批文章当作一个整体的综合论述
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// 3-5 个跨文章主题
    pub themes: Vec<String>,
    /// 2-4 个悖论或张力
    pub paradoxes: Vec<String>,
    /// 3-5 个前瞻性影响
    pub future_implications: Vec<String>,
}

fn pretty<T: JsonSchema>() -> String {
    let schema = schema_for!(T);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

pub fn research_schema_json() -> String {
    pretty::<ResearchDraft>()
}

pub fn article_schema_json() -> String {
    pretty::<ArticleDraft>()
}

pub fn synthesis_schema_json() -> String {
    pretty::<SynthesisDraft>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schemas_name_required_fields() {
        let research = research_schema_json();
        assert!(research.contains("stories"));
        assert!(research.contains("topic"));

        let article = article_schema_json();
        assert!(article.contains("sections"));
        assert!(article.contains("heading"));

        let synthesis = synthesis_schema_json();
        assert!(synthesis.contains("futureImplications"));
    }
}
