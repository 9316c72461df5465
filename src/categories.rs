// 🏷️ Category Resolver - ACT_ECON code → directory category
// Greedy longest-prefix match over the economic-activity taxonomy: a mapped
// 6-digit code wins over its 4-digit group, which wins over the 2-digit
// industry sector. Unmapped codes resolve to a zero-confidence empty result.

use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Shortest code prefix the resolver will fall back to.
const MIN_PREFIX_LEN: usize = 2;

// ============================================================================
// MAPPING DEFINITION
// ============================================================================

/// One classification mapping: an ACT_ECON code (or code prefix) → category.
///
/// Several mappings may share a prefix; the highest-confidence one wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryMapping {
    /// Code or code prefix ("6211", "62", …)
    pub code: String,

    /// Directory category id (slug form)
    pub category: String,

    /// Optional sub-category id
    #[serde(default)]
    pub sub_category: Option<String>,

    /// Confidence score (0.0 - 1.0); broad sector prefixes carry less
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    0.5
}

// ============================================================================
// RESOLUTION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryMatch {
    pub category: Option<String>,
    pub sub_category: Option<String>,
    pub confidence: f64,
    /// Which prefix actually matched ("452012" exact vs "45" fallback)
    pub matched_prefix: Option<String>,
}

impl Default for CategoryMatch {
    fn default() -> Self {
        CategoryMatch {
            category: None,
            sub_category: None,
            confidence: 0.0,
            matched_prefix: None,
        }
    }
}

// ============================================================================
// RESOLVER
// ============================================================================

#[derive(Debug)]
pub struct CategoryResolver {
    /// prefix → mappings, each list sorted by descending confidence
    by_prefix: HashMap<String, Vec<CategoryMapping>>,
}

impl CategoryResolver {
    /// Resolver backed by the built-in mapping table.
    pub fn new() -> Self {
        Self::from_mappings(builtin_mappings())
    }

    /// Load mappings from a JSON file (array of CategoryMapping objects).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read category mappings: {:?}", path.as_ref()))?;

        let mappings: Vec<CategoryMapping> =
            serde_json::from_str(&content).context("Failed to parse category mappings JSON")?;

        Ok(Self::from_mappings(mappings))
    }

    /// Build the prefix index from a list of mappings.
    pub fn from_mappings(mappings: Vec<CategoryMapping>) -> Self {
        let mut by_prefix: HashMap<String, Vec<CategoryMapping>> = HashMap::new();

        for mapping in mappings {
            by_prefix
                .entry(mapping.code.trim().to_string())
                .or_default()
                .push(mapping);
        }

        // Highest confidence first within each prefix
        for entries in by_prefix.values_mut() {
            entries.sort_by(|a, b| {
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        CategoryResolver { by_prefix }
    }

    /// Resolve a classification code to its best category match.
    ///
    /// Tries the full code, then truncates one character from the right and
    /// retries, down to a 2-character minimum. First (most specific) hit
    /// wins. An absent or unmapped code returns the zero-confidence default.
    pub fn resolve(&self, code: Option<&str>) -> CategoryMatch {
        let code = match code {
            Some(c) if !c.trim().is_empty() => c.trim().to_string(),
            _ => return CategoryMatch::default(),
        };

        let mut prefix = code.as_str();
        while prefix.chars().count() >= MIN_PREFIX_LEN {
            if let Some(entries) = self.by_prefix.get(prefix) {
                // Sorted at build time: first entry is the best
                let best = &entries[0];
                return CategoryMatch {
                    category: Some(best.category.clone()),
                    sub_category: best.sub_category.clone(),
                    confidence: best.confidence,
                    matched_prefix: Some(prefix.to_string()),
                };
            }
            // Drop the last character, not the last byte: a shifted CSV
            // column can leave accented text in the code field.
            match prefix.char_indices().next_back() {
                Some((cut, _)) => prefix = &prefix[..cut],
                None => break,
            }
        }

        CategoryMatch::default()
    }

    /// Number of distinct prefixes loaded.
    pub fn prefix_count(&self) -> usize {
        self.by_prefix.len()
    }
}

impl Default for CategoryResolver {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// BUILT-IN MAPPING TABLE
// ============================================================================

/// Built-in ACT_ECON → category table.
///
/// Two-digit sector prefixes carry 0.5 confidence (broad fallback); four- and
/// six-digit codes carry 0.8-0.95 (specific activities the directory has a
/// dedicated category for).
fn builtin_mappings() -> Vec<CategoryMapping> {
    fn m(code: &str, category: &str, sub: Option<&str>, confidence: f64) -> CategoryMapping {
        CategoryMapping {
            code: code.to_string(),
            category: category.to_string(),
            sub_category: sub.map(str::to_string),
            confidence,
        }
    }

    vec![
        // ── 2-digit sectors (broad fallback) ────────────────────────────
        m("01", "agriculture", None, 0.5),
        m("02", "agriculture", Some("services-agricoles"), 0.5),
        m("03", "peche-foresterie", None, 0.5),
        m("06", "mines-carrieres", None, 0.5),
        m("10", "alimentation", Some("transformation"), 0.5),
        m("15", "manufacturier", None, 0.5),
        m("25", "manufacturier", Some("bois-meubles"), 0.5),
        m("28", "manufacturier", Some("imprimerie"), 0.5),
        m("40", "construction", None, 0.5),
        m("42", "construction", Some("entrepreneurs-specialises"), 0.5),
        m("45", "alimentation", Some("commerce"), 0.5),
        m("50", "commerce-de-gros", None, 0.5),
        m("54", "alimentation", Some("epiceries"), 0.5),
        m("56", "commerce-de-detail", Some("vetements"), 0.5),
        m("58", "restaurants", None, 0.5),
        m("60", "commerce-de-detail", None, 0.5),
        m("61", "services-financiers", None, 0.5),
        m("62", "sante", None, 0.5),
        m("65", "commerce-de-detail", Some("specialise"), 0.5),
        m("75", "transport", None, 0.5),
        m("77", "services-professionnels", None, 0.5),
        m("85", "enseignement", None, 0.5),
        m("86", "sante", Some("services-sociaux"), 0.5),
        m("91", "hebergement", None, 0.5),
        m("92", "restaurants", Some("restauration"), 0.5),
        m("96", "divertissement", None, 0.5),
        m("97", "services-personnels", None, 0.5),
        m("99", "services-divers", None, 0.5),
        // ── 4-digit groups ──────────────────────────────────────────────
        m("4011", "construction", Some("residentiel"), 0.85),
        m("4021", "construction", Some("commercial"), 0.85),
        m("4213", "construction", Some("electriciens"), 0.9),
        m("4231", "construction", Some("plomberie-chauffage"), 0.9),
        m("4520", "alimentation", Some("depanneurs"), 0.9),
        m("5411", "alimentation", Some("epiceries"), 0.9),
        m("5431", "alimentation", Some("fruits-legumes"), 0.85),
        m("5812", "restaurants", Some("restaurants"), 0.9),
        m("5813", "restaurants", Some("bars"), 0.9),
        m("6121", "services-financiers", Some("credit"), 0.8),
        m("6211", "sante", Some("cliniques-medicales"), 0.9),
        m("6213", "sante", Some("dentistes"), 0.9),
        m("7512", "transport", Some("camionnage"), 0.85),
        m("7759", "services-professionnels", Some("comptabilite"), 0.85),
        m("9111", "hebergement", Some("hotels"), 0.9),
        m("9211", "restaurants", Some("restauration-rapide"), 0.85),
        m("9741", "services-personnels", Some("coiffure"), 0.9),
        // ── 6-digit activities ──────────────────────────────────────────
        m("452012", "alimentation", Some("depanneurs-essence"), 0.95),
        m("581204", "restaurants", Some("cafes"), 0.95),
        m("621304", "sante", Some("orthodontistes"), 0.95),
    ]
}

// ============================================================================
// TESTS
// ============================================================================
