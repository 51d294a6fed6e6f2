//! German energy policy corpus
//!
//! Documents come from `*.txt` / `*.md` files in the configured directory,
//! followed by a built-in baseline set that is always present.

use crate::models::{DocumentSource, PolicyDocument};
use parking_lot::RwLock;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

const MIN_TERM_LEN: usize = 3;

const BASELINE_DOCUMENTS: &[(&str, &str)] = &[
    (
        "eeg_2023",
        "German Renewable Energy Act (EEG 2023):
- Feed-in tariffs for solar installations under 10 kWp: €0.082/kWh
- No VAT (Mehrwertsteuer) on residential solar installations since January 2023
- Simplified registration process for installations under 30 kWp
- Net metering allowed for self-consumption optimization
- Annual compensation adjustments based on market conditions",
    ),
    (
        "kfw_270",
        "KfW Funding Program 270 (Renewable Energy Standard):
- Low-interest loans up to €50,000 per installation
- Financing up to 100% of eligible costs
- Interest rates starting from 5.03% effective annual rate
- Repayment terms up to 30 years with up to 3 grace years
- Additional grants available for energy storage systems",
    ),
    (
        "regional_incentives",
        "Regional Incentives (2024-2025):
- Bavaria: additional subsidies up to €3,200 for battery storage
- Baden-Württemberg: solar roof programs with up to €1,500 support
- North Rhine-Westphalia: progres.nrw program with installation grants
- Berlin: SolarPLUS program with up to €15,000 for installations with storage
- Schleswig-Holstein: Klimaschutz-Förderung with bonus payments",
    ),
    (
        "technology_guide",
        "Solar Panel Technology Guide:
- Monocrystalline panels: 20-22% efficiency, higher cost, better performance in low light
- Polycrystalline panels: 15-17% efficiency, lower cost, good value for money
- Thin-film panels: 10-12% efficiency, lowest cost, flexible installation options
- Bifacial panels: up to 30% more energy yield, suitable for ground-mount systems
- Perovskite tandem cells: emerging technology with 30%+ efficiency potential",
    ),
    (
        "installation_requirements",
        "German Installation Requirements:
- Building permits required for systems over 30 kWp
- Structural assessment mandatory for roof-mounted systems
- Grid connection approval from the local grid operator (Netzbetreiber)
- Mandatory insurance coverage for systems over 10 kWp
- Annual safety inspections for commercial installations
- Electrical installation by a certified Elektrofachkraft required",
    ),
    (
        "financing_options",
        "Financing Options in Germany:
- KfW 270: standard renewable energy loan, up to €50,000
- Regional programs: Bavaria, NRW and Baden-Württemberg offer additional grants
- Solar leasing: no upfront costs, 10-20 year contracts
- Power purchase agreements (PPA): long-term electricity contracts
- Self-financing: tax benefits through accelerated depreciation
- Community solar: shared ownership models gaining popularity",
    ),
    (
        "weather_performance",
        "Weather and Performance Data:
- Germany average: 1,000-1,200 kWh/kWp annually
- North Germany: 950-1,100 kWh/kWp (lower solar irradiance)
- South Germany: 1,100-1,300 kWh/kWp (higher solar irradiance)
- Seasonal variation: 60% of annual production in April-September
- Performance degradation: 0.5-0.8% per year typical
- Weather insurance available for production guarantees",
    ),
];

fn term_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[\p{L}\p{N}]+").ok()).as_ref()
}

/// Distinct lower-cased word tokens of at least three characters
pub fn terms(text: &str) -> HashSet<String> {
    let tokens: Vec<&str> = match term_pattern() {
        Some(pattern) => pattern.find_iter(text).map(|m| m.as_str()).collect(),
        None => text.split(|c: char| !c.is_alphanumeric()).collect(),
    };
    tokens
        .into_iter()
        .map(str::to_lowercase)
        .filter(|t| t.chars().count() >= MIN_TERM_LEN)
        .collect()
}

pub struct PolicyManager {
    docs_path: PathBuf,
    cache: RwLock<Option<Arc<Vec<PolicyDocument>>>>,
}

impl PolicyManager {
    pub fn new(docs_path: impl AsRef<Path>) -> Self {
        Self {
            docs_path: docs_path.as_ref().to_path_buf(),
            cache: RwLock::new(None),
        }
    }

    /// All documents, loaded on first use
    pub fn get_all_documents(&self) -> Arc<Vec<PolicyDocument>> {
        if let Some(docs) = self.cache.read().as_ref() {
            return Arc::clone(docs);
        }

        let mut cache = self.cache.write();
        if let Some(docs) = cache.as_ref() {
            return Arc::clone(docs);
        }

        let mut documents = self.load_from_files();
        let file_count = documents.len();
        documents.extend(baseline_documents());
        tracing::info!(
            file_documents = file_count,
            total_documents = documents.len(),
            path = %self.docs_path.display(),
            "Policy documents loaded"
        );

        let docs = Arc::new(documents);
        *cache = Some(Arc::clone(&docs));
        docs
    }

    pub fn document_count(&self) -> usize {
        self.get_all_documents().len()
    }

    /// Drop the cache; the next read reloads from disk
    pub fn refresh(&self) {
        *self.cache.write() = None;
        tracing::info!("Policy document cache cleared");
    }

    /// Rank documents by the number of distinct query terms they contain
    ///
    /// Ties keep corpus order. When nothing matches, the first `k` documents
    /// are returned.
    pub fn keyword_search(&self, query: &str, k: usize) -> Vec<PolicyDocument> {
        let documents = self.get_all_documents();
        let query_terms = terms(query);

        let mut scored: Vec<(usize, usize)> = documents
            .iter()
            .enumerate()
            .filter_map(|(idx, doc)| {
                let doc_terms = terms(&doc.text);
                let overlap = query_terms.iter().filter(|t| doc_terms.contains(*t)).count();
                (overlap > 0).then_some((idx, overlap))
            })
            .collect();

        if scored.is_empty() {
            crate::rag_debug!(query_terms = query_terms.len(), "No keyword matches, using leading documents");
            return documents.iter().take(k).cloned().collect();
        }

        // stable sort keeps corpus order on ties
        scored.sort_by(|a, b| b.1.cmp(&a.1));
        scored
            .into_iter()
            .take(k)
            .map(|(idx, _)| documents[idx].clone())
            .collect()
    }

    pub fn policy_summary(&self) -> BTreeMap<&'static str, &'static str> {
        BTreeMap::from([
            ("feed_in_tariff", "€0.082/kWh for systems under 10 kWp"),
            ("vat_rate", "0% VAT on residential solar installations since 2023"),
            ("kfw_financing", "Low-interest loans up to €50,000"),
            ("net_metering", "Allowed for self-consumption optimization"),
            ("simplified_approval", "Streamlined process for systems under 30 kWp"),
            ("regional_incentives", "Additional grants available in most German states"),
            ("insurance_requirement", "Mandatory for systems over 10 kWp"),
        ])
    }

    fn load_from_files(&self) -> Vec<PolicyDocument> {
        let entries = match std::fs::read_dir(&self.docs_path) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::info!(
                    path = %self.docs_path.display(),
                    error = %e,
                    "Policy documents directory not readable, using baseline only"
                );
                return Vec::new();
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && matches!(
                        path.extension().and_then(|e| e.to_str()),
                        Some("txt") | Some("md")
                    )
            })
            .collect();
        paths.sort();

        paths
            .into_iter()
            .filter_map(|path| match std::fs::read_to_string(&path) {
                Ok(content) if !content.trim().is_empty() => {
                    let id = path
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.display().to_string());
                    tracing::debug!(document = %id, "Loaded policy document");
                    Some(PolicyDocument {
                        id,
                        source: DocumentSource::File(path),
                        text: content.trim().to_string(),
                    })
                }
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to read policy document");
                    None
                }
            })
            .collect()
    }
}

fn baseline_documents() -> impl Iterator<Item = PolicyDocument> {
    BASELINE_DOCUMENTS.iter().map(|(id, text)| PolicyDocument {
        id: id.to_string(),
        source: DocumentSource::Baseline(id.to_string()),
        text: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_baseline_only_when_directory_missing() {
        let manager = PolicyManager::new("/nonexistent/policy/dir");
        let docs = manager.get_all_documents();
        assert_eq!(docs.len(), BASELINE_DOCUMENTS.len());
        assert_eq!(docs[0].id, "eeg_2023");
    }

    #[test]
    fn test_files_come_first_sorted_by_name() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b_notes.md"), "Battery storage notes").unwrap();
        std::fs::write(dir.path().join("a_rules.txt"), "Grid rules").unwrap();
        std::fs::write(dir.path().join("ignored.pdf"), "binary").unwrap();
        std::fs::write(dir.path().join("empty.txt"), "   ").unwrap();

        let manager = PolicyManager::new(dir.path());
        let docs = manager.get_all_documents();
        assert_eq!(docs.len(), BASELINE_DOCUMENTS.len() + 2);
        assert_eq!(docs[0].id, "a_rules");
        assert_eq!(docs[1].id, "b_notes");
    }

    #[test]
    fn test_refresh_picks_up_new_files() {
        let dir = TempDir::new().unwrap();
        let manager = PolicyManager::new(dir.path());
        assert_eq!(manager.document_count(), BASELINE_DOCUMENTS.len());

        std::fs::write(dir.path().join("new.md"), "New tariff rules").unwrap();
        assert_eq!(manager.document_count(), BASELINE_DOCUMENTS.len());
        manager.refresh();
        assert_eq!(manager.document_count(), BASELINE_DOCUMENTS.len() + 1);
    }

    #[test]
    fn test_keyword_search_ranks_by_overlap() {
        let manager = PolicyManager::new("/nonexistent/policy/dir");
        let results = manager.keyword_search("KfW loan financing grace years", 2);
        assert_eq!(results[0].id, "kfw_270");
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_keyword_search_without_matches_returns_leading_documents() {
        let manager = PolicyManager::new("/nonexistent/policy/dir");
        let results = manager.keyword_search("zz qq", 3);
        let ids: Vec<&str> = results.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["eeg_2023", "kfw_270", "regional_incentives"]);
    }

    #[test]
    fn test_terms_ignore_short_tokens() {
        let t = terms("A PV on the roof, EEG 2023");
        assert!(t.contains("roof"));
        assert!(t.contains("eeg"));
        assert!(t.contains("2023"));
        assert!(!t.contains("pv"));
        assert!(!t.contains("on"));
    }
}
