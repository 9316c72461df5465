// 🔗 Slug Generator & Unique Slug Resolver
// Deterministic name → URL-slug transform with diacritic stripping, plus a
// resolver that guarantees uniqueness against the persisted set:
// base slug → city-suffixed → numeric suffix → random fallback.

use rusqlite::Connection;
use std::collections::HashSet;

use crate::db::{self, DbError};

/// Upper bound on numeric-suffix probes before falling back to a random
/// suffix. The suffix space is infinite, but pathological collision
/// clustering must not stall an import run.
pub const MAX_SLUG_ATTEMPTS: u32 = 50;

// ============================================================================
// BASE SLUG GENERATION
// ============================================================================

/// Strip diacritics from the French/Latin-1 range. Ligatures expand to
/// their two-letter form ("Cœur" → "coeur").
///
/// REQ names are French; a full transliteration table is not needed.
fn fold_diacritic(c: char) -> Option<&'static str> {
    Some(match c {
        'à' | 'â' | 'ä' | 'á' | 'ã' => "a",
        'è' | 'é' | 'ê' | 'ë' => "e",
        'î' | 'ï' | 'í' => "i",
        'ô' | 'ö' | 'ó' | 'õ' => "o",
        'ù' | 'û' | 'ü' | 'ú' => "u",
        'ç' => "c",
        'ñ' => "n",
        'ý' | 'ÿ' => "y",
        'æ' => "ae",
        'œ' => "oe",
        _ => return None,
    })
}

/// Generate a base slug from free text.
///
/// Lowercase, diacritics stripped, every run of non-alphanumeric characters
/// collapsed to a single hyphen, leading/trailing hyphens trimmed.
///
/// ```
/// use annuaire_quebec::slug::slugify;
/// assert_eq!(slugify("Dépanneur Laval"), "depanneur-laval");
/// assert_eq!(slugify("Café Olé & Cie."), "cafe-ole-cie");
/// ```
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut last_was_hyphen = true; // suppress leading hyphen

    for c in text.to_lowercase().chars() {
        if let Some(folded) = fold_diacritic(c) {
            slug.push_str(folded);
            last_was_hyphen = false;
        } else if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }

    // Trim trailing hyphen
    while slug.ends_with('-') {
        slug.pop();
    }

    slug
}

// ============================================================================
// UNIQUE SLUG RESOLVER
// ============================================================================

/// Candidate chain for a (name, city) pair:
/// base → base-city → base-city-2, base-city-3, … → base-<random>.
///
/// When there is no city to fall back on, numeric suffixes apply directly to
/// the base, starting at -2.
fn candidate(base: &str, city_slug: &str, attempt: u32) -> String {
    if attempt == 0 {
        return base.to_string();
    }

    if city_slug.is_empty() {
        // No city to disambiguate with: go straight to -2, -3, …
        return format!("{}-{}", base, attempt + 1);
    }

    if attempt == 1 {
        return format!("{}-{}", base, city_slug);
    }

    // attempt 2 → "-2", attempt 3 → "-3", …
    format!("{}-{}-{}", base, city_slug, attempt)
}

/// Random fallback: a short uuid fragment keeps the slug readable while
/// making another collision vanishingly unlikely.
fn random_candidate(base: &str) -> String {
    let frag = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", base, &frag[..8])
}

/// Resolve a slug guaranteed unused among persisted records at call time.
///
/// The check-then-insert is not atomic; the slug column carries a UNIQUE
/// index and insert-time violations are treated as duplicates by the batch
/// upserter, so a lost race degrades to a skipped row, never corruption.
pub fn resolve_unique_slug(
    conn: &Connection,
    name: &str,
    city: Option<&str>,
) -> Result<String, DbError> {
    let base = nonempty_base(name);
    let city_slug = city.map(slugify).unwrap_or_default();

    for attempt in 0..MAX_SLUG_ATTEMPTS {
        let slug = candidate(&base, &city_slug, attempt);
        if slug.is_empty() {
            continue;
        }
        if !db::slug_exists(conn, &slug)? {
            return Ok(slug);
        }
    }

    Ok(random_candidate(&base))
}

/// Resolve a slug against an in-memory set instead of the database.
///
/// The batch upserter uses this for rows colliding *within* one in-flight
/// batch — those are not persisted yet, so the per-row query cannot see them.
pub fn resolve_against_set(taken: &HashSet<String>, slug: &str, city: Option<&str>) -> String {
    if !taken.contains(slug) {
        return slug.to_string();
    }

    // The incoming slug was resolved against storage and may already end in
    // the city suffix; appending it again would double it. Go numeric then.
    let mut city_slug = city.map(slugify).unwrap_or_default();
    if !city_slug.is_empty()
        && (slug == city_slug || slug.ends_with(&format!("-{}", city_slug)))
    {
        city_slug.clear();
    }

    for attempt in 1..MAX_SLUG_ATTEMPTS {
        let next = candidate(slug, &city_slug, attempt);
        if !next.is_empty() && !taken.contains(&next) {
            return next;
        }
    }

    random_candidate(slug)
}

/// A base slug must never be empty: a name of pure punctuation would
/// otherwise produce "" and collide with everything.
fn nonempty_base(name: &str) -> String {
    let base = slugify(name);
    if base.is_empty() {
        "entreprise".to_string()
    } else {
        base
    }
}

// ============================================================================
// TESTS
// ============================================================================
