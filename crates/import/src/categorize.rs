use tracing::debug;

use tally_core::CategoryRegistry;

use crate::util::{normalize, similarity};

pub const DEFAULT_FUZZY_THRESHOLD: f32 = 0.8;

/// Maps a free-text transaction description to exactly one category name.
///
/// Exact stage: substring containment over every keyword; among all hits the
/// longest keyword wins, so `"uber eats"` beats `"uber"` no matter which
/// category registered first. Ties fall back to registry order, then keyword
/// order. Fuzzy stage: best similarity between a keyword and same-arity word
/// windows of the description, gated by a threshold. No hit → `"Other"`.
pub struct CategoryMatcher {
    registry: CategoryRegistry,
    /// `(normalized keyword, category index)` in registry order.
    keywords: Vec<(String, usize)>,
    fuzzy_threshold: f32,
}

impl CategoryMatcher {
    pub fn new(registry: CategoryRegistry) -> Self {
        Self::with_threshold(registry, DEFAULT_FUZZY_THRESHOLD)
    }

    pub fn with_threshold(registry: CategoryRegistry, fuzzy_threshold: f32) -> Self {
        let keywords = registry
            .iter()
            .enumerate()
            .flat_map(|(idx, cat)| {
                cat.keywords
                    .iter()
                    .map(move |kw| (normalize(kw), idx))
                    .filter(|(kw, _)| !kw.is_empty())
            })
            .collect();
        Self { registry, keywords, fuzzy_threshold }
    }

    pub fn registry(&self) -> &CategoryRegistry {
        &self.registry
    }

    pub fn icon_for(&self, category: &str) -> &str {
        self.registry.icon_for(category)
    }

    /// Deterministic: identical description and registry always yield the
    /// same category.
    pub fn categorize(&self, description: &str) -> &str {
        let text = normalize(description);
        if text.is_empty() {
            return "Other";
        }

        // Exact containment, longest keyword wins.
        let mut best: Option<(usize, usize)> = None; // (category idx, keyword chars)
        for (kw, cat_idx) in &self.keywords {
            if text.contains(kw.as_str()) {
                let len = kw.chars().count();
                if best.map_or(true, |(_, best_len)| len > best_len) {
                    best = Some((*cat_idx, len));
                }
            }
        }
        if let Some((cat_idx, _)) = best {
            let name = self.category_name(cat_idx);
            debug!(description, category = name, "exact keyword match");
            return name;
        }

        // Fuzzy fallback over word windows; strictly-greater comparison keeps
        // registry order on score ties.
        let words: Vec<&str> = text.split(' ').collect();
        let mut best: Option<(usize, f32)> = None;
        for (kw, cat_idx) in &self.keywords {
            let score = window_similarity(&words, kw);
            if score >= self.fuzzy_threshold
                && best.map_or(true, |(_, best_score)| score > best_score)
            {
                best = Some((*cat_idx, score));
            }
        }
        match best {
            Some((cat_idx, score)) => {
                let name = self.category_name(cat_idx);
                debug!(description, category = name, score, "fuzzy keyword match");
                name
            }
            None => "Other",
        }
    }

    fn category_name(&self, idx: usize) -> &str {
        self.registry
            .iter()
            .nth(idx)
            .map(|c| c.name.as_str())
            .unwrap_or("Other")
    }
}

/// Best similarity between `keyword` and every window of `words` with the
/// same word count as the keyword.
fn window_similarity(words: &[&str], keyword: &str) -> f32 {
    let arity = keyword.split(' ').count();
    if words.is_empty() || arity == 0 {
        return 0.0;
    }
    if words.len() <= arity {
        return similarity(&words.join(" "), keyword);
    }
    words
        .windows(arity)
        .map(|w| similarity(&w.join(" "), keyword))
        .fold(0.0, f32::max)
}
