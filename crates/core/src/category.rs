use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CategoryError {
    #[error("failed to parse category registry: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("category registry is empty")]
    Empty,
}

/// One spending category: name, keyword list for description matching, and a
/// display icon. Keyword lists may overlap across categories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub icon: String,
}

/// Ordered category list. Order is significant: it is the final tie-break for
/// the matcher.
#[derive(Debug, Clone)]
pub struct CategoryRegistry {
    categories: Vec<Category>,
}

#[derive(Deserialize)]
struct RegistryFile {
    categories: Vec<Category>,
}

impl CategoryRegistry {
    pub fn new(categories: Vec<Category>) -> Self {
        Self { categories }
    }

    /// Load from a TOML document of `[[categories]]` tables.
    pub fn from_toml(content: &str) -> Result<Self, CategoryError> {
        let file: RegistryFile = toml::from_str(content)?;
        if file.categories.is_empty() {
            return Err(CategoryError::Empty);
        }
        Ok(Self::new(file.categories))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.categories
            .iter()
            .any(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Display icon for a category, `📦` when unknown.
    pub fn icon_for(&self, name: &str) -> &str {
        self.categories
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .map(|c| c.icon.as_str())
            .filter(|i| !i.is_empty())
            .unwrap_or("📦")
    }
}

impl Default for CategoryRegistry {
    /// The stock household registry. `Other` is last and catches everything
    /// the matcher cannot place.
    fn default() -> Self {
        fn cat(name: &str, keywords: &[&str], icon: &str) -> Category {
            Category {
                name: name.to_string(),
                keywords: keywords.iter().map(|k| k.to_string()).collect(),
                icon: icon.to_string(),
            }
        }
        Self::new(vec![
            cat("Groceries", &["supermarket", "grocery", "whole foods", "trader joe"], "🛒"),
            cat("Dining", &["restaurant", "doordash", "uber eats", "chipotle", "starbucks"], "🍽️"),
            cat("Transport", &["gas", "uber", "lyft", "parking", "toll"], "🚗"),
            cat("Shopping", &["amazon", "target", "walmart", "costco"], "🛍️"),
            cat("Entertainment", &["netflix", "spotify", "movies", "hulu", "disney"], "🎬"),
            cat("Health", &["pharmacy", "doctor", "gym", "hospital", "dental"], "🏥"),
            cat("Utilities", &["electric", "water", "internet", "phone", "gas bill"], "💡"),
            cat("Housing", &["rent", "mortgage", "maintenance", "hoa"], "🏠"),
            cat("Subscriptions", &["software", "apps", "memberships", "cloud"], "📱"),
            cat("Travel", &["hotel", "airline", "airbnb", "flight", "booking"], "✈️"),
            cat("Education", &["courses", "books", "tuition", "udemy"], "📚"),
            cat("Personal", &["salon", "clothing", "gifts", "haircut"], "💅"),
            cat("Insurance", &["auto insurance", "health insurance", "life insurance"], "🛡️"),
            cat("Other", &["uncategorized"], "📦"),
        ])
    }
}
