// 📋 CSV Row Normalizer - REQ establishment row → BusinessRecord candidate
// Applies the business filters in order (missing NEQ, inactive status,
// numbered shell companies), extracts city and postal code from the address
// lines, and consults the region table and category resolver.
// The slug is resolved later, against live storage, by the pipeline.

use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

use crate::categories::CategoryResolver;
use crate::db::BusinessRecord;
use crate::regions;

// ============================================================================
// RAW GOVERNMENT ROW
// ============================================================================

/// One row of the REQ establishment CSV, government column names as-is.
///
/// Every field is optional at parse time; the filtering rules decide what is
/// mandatory. The extract the government publishes is uppercase throughout.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEtablissement {
    #[serde(rename = "NEQ", default)]
    pub neq: Option<String>,

    #[serde(rename = "NO_SUF_ETAB", default)]
    pub no_suf_etab: Option<String>,

    #[serde(rename = "NOM_ETAB", default)]
    pub nom_etab: Option<String>,

    #[serde(rename = "LIGN1_ADR", default)]
    pub lign1_adr: Option<String>,

    #[serde(rename = "LIGN2_ADR", default)]
    pub lign2_adr: Option<String>,

    #[serde(rename = "LIGN3_ADR", default)]
    pub lign3_adr: Option<String>,

    #[serde(rename = "LIGN4_ADR", default)]
    pub lign4_adr: Option<String>,

    #[serde(rename = "COD_POSTAL", default)]
    pub cod_postal: Option<String>,

    #[serde(rename = "COD_ACT_ECON", default)]
    pub cod_act_econ: Option<String>,

    #[serde(rename = "DESC_ACT_ECON", default)]
    pub desc_act_econ: Option<String>,

    #[serde(rename = "IND_ETAB_PRINC", default)]
    pub ind_etab_princ: Option<String>,

    #[serde(rename = "STAT_IMMAT", default)]
    pub stat_immat: Option<String>,
}

// ============================================================================
// NORMALIZATION OUTCOME
// ============================================================================

/// Why a row was excluded. Skips are counted, never reported as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No NEQ — the row cannot be deduplicated, mandatory key
    MissingNeq,
    /// Registration status marks the enterprise as struck off
    Inactive,
    /// Generic numbered shell company ("9123-4567 QUÉBEC INC.")
    ShellCompany,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::MissingNeq => "missing NEQ",
            SkipReason::Inactive => "inactive status",
            SkipReason::ShellCompany => "numbered shell company",
        }
    }
}

#[derive(Debug)]
pub enum NormalizeOutcome {
    /// A candidate record, slug not yet resolved
    Record(Box<BusinessRecord>),
    Skip(SkipReason),
}

// ============================================================================
// REGEX PATTERNS (compiled once)
// ============================================================================

/// "9123-4567 QUÉBEC INC." — numbered placeholder companies
fn shell_9_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^9\d{3}-\d{4}\s+QUÉBEC\s+INC").unwrap())
}

/// "3102-4566 ... (QUÉBEC|CANADA) INC." second documented numbered form
fn shell_3_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^3\d+\s+(QUÉBEC|CANADA)\s+INC").unwrap())
}

/// Canadian postal code: letter-digit-letter [space] digit-letter-digit
fn postal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z]\d[A-Za-z]\s?\d[A-Za-z]\d").unwrap())
}

/// City line: everything before a trailing "(Québec)" / "(QC)" / " QC"
fn city_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(.*?)[\s,]*(?:\((?:QUÉBEC|QC)\)|\bQC)\s*[A-Za-z0-9\s]*$").unwrap()
    })
}

// ============================================================================
// FIELD EXTRACTION
// ============================================================================

/// Extract the city from a combined address line.
///
/// Primary path: regex capture of what precedes the "(Québec)"/"(QC)"/" QC"
/// suffix. Fallback: strip the suffix substring directly — some rows carry
/// malformed parentheses the pattern misses.
pub fn extract_city(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Some(caps) = city_re().captures(line) {
        let city = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        if !city.is_empty() {
            return Some(city.to_string());
        }
    }

    // Fallback: substring strip
    let mut city = line.to_string();
    for suffix in ["(Québec)", "(QUÉBEC)", "(québec)", "(QC)", "(qc)"] {
        if let Some(pos) = city.find(suffix) {
            city.truncate(pos);
            break;
        }
    }
    let city = city.trim().trim_end_matches(',').trim();
    if city.is_empty() {
        None
    } else {
        Some(city.to_string())
    }
}

/// Scan candidate fields in priority order for a Canadian postal code.
/// First match wins.
pub fn extract_postal_code(candidates: &[Option<&str>]) -> Option<String> {
    for field in candidates.iter().flatten() {
        if let Some(m) = postal_re().find(field) {
            let raw: String = m
                .as_str()
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect::<String>()
                .to_uppercase();
            // Normalize to "A1A 1A1"
            return Some(format!("{} {}", &raw[..3], &raw[3..]));
        }
    }
    None
}

fn is_shell_company(name: &str) -> bool {
    shell_9_re().is_match(name) || shell_3_re().is_match(name)
}

fn is_inactive(status: &str) -> bool {
    // The reference extract only ships active establishments, but multi-status
    // dumps mark struck-off registrations with "RADIÉE".
    status.to_uppercase().contains("RADIÉE")
}

fn clean(field: &Option<String>) -> Option<String> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// ============================================================================
// NORMALIZER
// ============================================================================

/// Normalize one raw REQ row into a BusinessRecord candidate.
///
/// Filtering rules, in order:
/// 1. Skip if NEQ is absent (mandatory dedup key).
/// 2. Skip if the registration status marks the enterprise inactive.
/// 3. Skip numbered shell-company names (no informational value).
///
/// Then extract city/postal code from the address lines, resolve region/MRC
/// (miss is non-fatal, fields stay null) and the directory category.
pub fn normalize(raw: &RawEtablissement, categories: &CategoryResolver) -> NormalizeOutcome {
    // Rule 1: mandatory key
    let neq = match clean(&raw.neq) {
        Some(neq) => neq,
        None => return NormalizeOutcome::Skip(SkipReason::MissingNeq),
    };

    // Rule 2: inactive registration
    if let Some(status) = clean(&raw.stat_immat) {
        if is_inactive(&status) {
            return NormalizeOutcome::Skip(SkipReason::Inactive);
        }
    }

    // Rule 3: numbered shell companies
    let name = clean(&raw.nom_etab).unwrap_or_default();
    if is_shell_company(&name) {
        return NormalizeOutcome::Skip(SkipReason::ShellCompany);
    }

    // Establishment suffix defaults to "1" (principal) when absent
    let etab_suffix = clean(&raw.no_suf_etab).unwrap_or_else(|| "1".to_string());

    let mut record = BusinessRecord::new(neq, etab_suffix, name);
    record.address = clean(&raw.lign1_adr);

    // City: first address line that yields one
    record.city = [&raw.lign2_adr, &raw.lign3_adr, &raw.lign4_adr]
        .into_iter()
        .flat_map(|line| line.as_deref())
        .find_map(extract_city);

    // Postal code: dedicated column first, then the later address lines
    record.postal_code = extract_postal_code(&[
        raw.cod_postal.as_deref(),
        raw.lign3_adr.as_deref(),
        raw.lign2_adr.as_deref(),
    ]);

    // Region/MRC: lookup miss leaves both null, counted by the driver
    if let Some(city) = record.city.as_deref() {
        if let Some(loc) = regions::lookup_city(city) {
            record.region = Some(loc.region.to_string());
            record.mrc = Some(loc.mrc.to_string());
        }
    }

    record.act_econ_code = clean(&raw.cod_act_econ);
    record.act_econ_desc = clean(&raw.desc_act_econ);
    record.is_principal = matches!(clean(&raw.ind_etab_princ).as_deref(), Some("O") | Some("o"));

    let category = categories.resolve(record.act_econ_code.as_deref());
    record.category = category.category;
    record.sub_category = category.sub_category;
    record.category_confidence = category.confidence;

    NormalizeOutcome::Record(Box::new(record))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(neq: &str, name: &str, lign2: &str) -> RawEtablissement {
        RawEtablissement {
            neq: Some(neq.to_string()),
            no_suf_etab: Some("1".to_string()),
            nom_etab: Some(name.to_string()),
            lign2_adr: Some(lign2.to_string()),
            stat_immat: Some("IMMATRICULÉE".to_string()),
            ..Default::default()
        }
    }

    fn expect_record(outcome: NormalizeOutcome) -> BusinessRecord {
        match outcome {
            NormalizeOutcome::Record(r) => *r,
            NormalizeOutcome::Skip(reason) => panic!("unexpected skip: {}", reason.as_str()),
        }
    }

    #[test]
    fn test_example_row_depanneur_laval() {
        let mut row = raw("1234567890", "Dépanneur Laval", "Laval (Québec)");
        row.cod_act_econ = Some("4520".to_string());

        let record = expect_record(normalize(&row, &CategoryResolver::new()));
        assert_eq!(record.neq, "1234567890");
        assert_eq!(record.city.as_deref(), Some("Laval"));
        assert_eq!(record.region.as_deref(), Some("Laval"));
        assert_eq!(record.category.as_deref(), Some("alimentation"));
        assert!(record.slug.is_empty(), "slug is resolved later, against storage");
    }

    #[test]
    fn test_missing_neq_is_skipped() {
        let mut row = raw("x", "Entreprise", "Laval (Québec)");
        row.neq = None;
        let outcome = normalize(&row, &CategoryResolver::new());
        assert!(matches!(outcome, NormalizeOutcome::Skip(SkipReason::MissingNeq)));

        row.neq = Some("   ".to_string());
        let outcome = normalize(&row, &CategoryResolver::new());
        assert!(matches!(outcome, NormalizeOutcome::Skip(SkipReason::MissingNeq)));
    }

    #[test]
    fn test_inactive_status_is_skipped() {
        let mut row = raw("1234567890", "Entreprise Fermée", "Laval (Québec)");
        row.stat_immat = Some("IMMATRICULÉE RADIÉE".to_string());
        let outcome = normalize(&row, &CategoryResolver::new());
        assert!(matches!(outcome, NormalizeOutcome::Skip(SkipReason::Inactive)));

        row.stat_immat = Some("Radiée d'office".to_string());
        let outcome = normalize(&row, &CategoryResolver::new());
        assert!(matches!(outcome, NormalizeOutcome::Skip(SkipReason::Inactive)));
    }

    #[test]
    fn test_shell_company_patterns_are_skipped() {
        for name in [
            "9123-4567 QUÉBEC INC.",
            "9000-0001 québec inc.",
            "3102456789 QUÉBEC INC.",
            "31024567 CANADA INC.",
        ] {
            let row = raw("1234567890", name, "Montréal (Québec)");
            let outcome = normalize(&row, &CategoryResolver::new());
            assert!(
                matches!(outcome, NormalizeOutcome::Skip(SkipReason::ShellCompany)),
                "{} should be filtered",
                name
            );
        }

        // A name that merely contains digits is not a shell company
        let row = raw("1234567890", "Taxi 9000 Inc.", "Montréal (Québec)");
        assert!(matches!(
            normalize(&row, &CategoryResolver::new()),
            NormalizeOutcome::Record(_)
        ));
    }

    #[test]
    fn test_city_extraction_variants() {
        assert_eq!(extract_city("Laval (Québec)").as_deref(), Some("Laval"));
        assert_eq!(extract_city("MONTRÉAL (QUÉBEC)").as_deref(), Some("MONTRÉAL"));
        assert_eq!(extract_city("Gatineau (QC)").as_deref(), Some("Gatineau"));
        assert_eq!(extract_city("Sherbrooke QC").as_deref(), Some("Sherbrooke"));
        assert_eq!(
            extract_city("Trois-Rivières (Québec) G9A 5H7").as_deref(),
            Some("Trois-Rivières")
        );
        assert_eq!(extract_city("").as_deref(), None);
    }

    #[test]
    fn test_city_extraction_fallback_on_malformed_line() {
        // Unbalanced parenthesis defeats the pattern; substring strip still works
        assert_eq!(extract_city("Québec (Québec").as_deref(), Some("Québec (Québec"));
        assert_eq!(extract_city("Lévis, (Québec)").as_deref(), Some("Lévis"));
    }

    #[test]
    fn test_postal_code_priority_order() {
        let postal = extract_postal_code(&[
            Some("H7N 2K9"),
            Some("G1A 1A1"),
            None,
        ]);
        assert_eq!(postal.as_deref(), Some("H7N 2K9"));

        // Found inside a combined line, normalized to canonical spacing
        let postal = extract_postal_code(&[None, Some("LAVAL (QUÉBEC) h7n2k9"), None]);
        assert_eq!(postal.as_deref(), Some("H7N 2K9"));

        assert_eq!(extract_postal_code(&[None, None, None]), None);
        assert_eq!(extract_postal_code(&[Some("no code here")]), None);
    }

    #[test]
    fn test_unmapped_city_leaves_region_null() {
        let row = raw("1234567890", "Magasin Général", "Saint-Elzéar-de-Bonaventure (Québec)");
        let record = expect_record(normalize(&row, &CategoryResolver::new()));
        assert_eq!(record.city.as_deref(), Some("Saint-Elzéar-de-Bonaventure"));
        assert!(record.region.is_none());
        assert!(record.mrc.is_none());
    }

    #[test]
    fn test_principal_establishment_flag() {
        let mut row = raw("1234567890", "Bureau Chef", "Montréal (Québec)");
        row.ind_etab_princ = Some("O".to_string());
        let record = expect_record(normalize(&row, &CategoryResolver::new()));
        assert!(record.is_principal);

        row.ind_etab_princ = Some("N".to_string());
        let record = expect_record(normalize(&row, &CategoryResolver::new()));
        assert!(!record.is_principal);
    }

    #[test]
    fn test_missing_suffix_defaults_to_one() {
        let mut row = raw("1234567890", "Entreprise", "Montréal (Québec)");
        row.no_suf_etab = None;
        let record = expect_record(normalize(&row, &CategoryResolver::new()));
        assert_eq!(record.etab_suffix, "1");
    }
}
