//! Analysis prompt construction.
//!
//! The instruction text is fixed; the three product fields are interpolated
//! as-is, without escaping, in the order name, category, keywords.

use crate::AnalysisRequest;

/// Section headers the model is asked to cover, in order.
pub const ANALYSIS_SECTIONS: [&str; 5] = [
    "Целевая аудитория",
    "Основные преимущества",
    "Возможные недостатки",
    "Рекомендации по улучшению",
    "Потенциальные риски",
];

/// Render the analysis instruction for a product.
pub fn build_prompt(req: &AnalysisRequest) -> String {
    let mut prompt = format!(
        "Проанализируй товар со следующими характеристиками:\n\
         Название: {}\n\
         Категория: {}\n\
         Ключевые слова: {}\n\
         \n\
         Сделай анализ по следующим аспектам:",
        req.name, req.category, req.keywords
    );
    for (idx, section) in ANALYSIS_SECTIONS.iter().enumerate() {
        prompt.push('\n');
        prompt.push_str(&format!("{}. {}", idx + 1, section));
    }
    prompt
}
