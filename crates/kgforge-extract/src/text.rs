//! Pattern-based extraction from plain text.
//!
//! Entities come from per-type regular-expression families plus a keyword
//! frequency pass that turns repeated words into concepts. Relations come from
//! phrase templates matched per sentence, and from sentence co-occurrence.
//! Every entity records the pattern, span and surrounding context it was found
//! with; every relation records its pattern and sentence.

use kgforge_model::{Entity, EntityType, Relation, RelationType};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, HashSet};

use crate::dedup::deduplicate_entities;
use crate::schema::SchemaDescription;
use crate::whitelist::RelationWhitelist;
use crate::{EntityExtractor, ExtractError, ExtractionContext, RelationExtractor, Result};

pub const SOURCE_TEXT: &str = "text_extraction";
pub const SOURCE_KEYWORD: &str = "keyword_extraction";
pub const SOURCE_PATTERN: &str = "text_pattern_matching";
pub const SOURCE_COOCCURRENCE: &str = "cooccurrence";

const SENTENCE_EVIDENCE_CHARS: usize = 200;

// ============================================================================
// Configuration
// ============================================================================

/// One entity recognition pattern. `group` selects the capture holding the
/// name; 0 takes the whole match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityPattern {
    pub name: String,
    pub entity_type: EntityType,
    pub pattern: String,
    #[serde(default)]
    pub group: usize,
}

impl EntityPattern {
    pub fn new(name: &str, entity_type: EntityType, pattern: &str) -> Self {
        Self {
            name: name.to_string(),
            entity_type,
            pattern: pattern.to_string(),
            group: 0,
        }
    }

    pub fn capturing(mut self, group: usize) -> Self {
        self.group = group;
        self
    }
}

/// One relation phrase template. Capture 1 is the head, capture 2 the tail,
/// unless `reversed` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationPattern {
    pub relation_type: RelationType,
    pub pattern: String,
    #[serde(default)]
    pub reversed: bool,
}

impl RelationPattern {
    fn new(relation_type: RelationType, pattern: &str) -> Self {
        Self {
            relation_type,
            pattern: pattern.to_string(),
            reversed: false,
        }
    }

    fn reversed(mut self) -> Self {
        self.reversed = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextExtractorConfig {
    pub entity_patterns: Vec<EntityPattern>,
    pub relation_patterns: Vec<RelationPattern>,
    pub stopwords: Vec<String>,
    pub confidence_threshold: f64,
    pub keyword_min_length: usize,
    pub keyword_min_frequency: usize,
    pub max_keywords: usize,
    pub keyword_confidence: f64,
    pub pattern_relation_confidence: f64,
    pub cooccurrence_confidence: f64,
    /// Characters of context kept on each side of an entity match.
    pub context_window: usize,
    pub max_document_bytes: usize,
    pub whitelist: RelationWhitelist,
}

impl Default for TextExtractorConfig {
    fn default() -> Self {
        Self {
            entity_patterns: default_entity_patterns(),
            relation_patterns: default_relation_patterns(),
            stopwords: [
                "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with",
                "by",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            confidence_threshold: 0.5,
            keyword_min_length: 3,
            keyword_min_frequency: 2,
            max_keywords: 10,
            keyword_confidence: 0.6,
            pattern_relation_confidence: 0.7,
            cooccurrence_confidence: 0.5,
            context_window: 50,
            max_document_bytes: 4 * 1024 * 1024,
            whitelist: RelationWhitelist::default(),
        }
    }
}

/// Built-in entity families. Person names need two capitalised words and
/// places need a type suffix or a leading `in`/`at`/`from`, so a lone proper
/// noun such as a sentence-initial "Paris" is not matched; it surfaces only
/// through the keyword pass when it repeats. Add an [`EntityPattern`] to
/// [`TextExtractorConfig::entity_patterns`] to catch single capitalised words.
pub fn default_entity_patterns() -> Vec<EntityPattern> {
    use EntityType::*;
    vec![
        EntityPattern::new("person_honorific", Person, r"\b(?:Mr|Mrs|Ms|Dr|Prof)\.? [A-Z][a-z]+\b"),
        EntityPattern::new("person_full_name", Person, r"\b[A-Z][a-z]+ [A-Z][a-z]+\b"),
        EntityPattern::new(
            "organization_suffix",
            Organization,
            r"\b[A-Z][A-Za-z&]*(?: [A-Z][A-Za-z&]*)* (?:Inc|Corp|Ltd|LLC|Company|Organization)\b",
        ),
        EntityPattern::new("organization_acronym", Organization, r"\b[A-Z]{2,}(?: [A-Z]{2,})*\b"),
        EntityPattern::new(
            "location_suffix",
            Location,
            r"\b[A-Z][a-z]+ (?:City|State|Country|Province|District)\b",
        ),
        EntityPattern::new("location_preposition", Location, r"\b(?:in|at|from) ([A-Z][a-z]+)\b")
            .capturing(1),
        EntityPattern::new(
            "concept_suffix",
            Concept,
            r"\b[a-z]+ (?:concept|theory|principle|method|approach)\b",
        ),
    ]
}

pub fn default_relation_patterns() -> Vec<RelationPattern> {
    use RelationType::*;
    vec![
        RelationPattern::new(BelongsTo, r"(?i)(.+?) (?:belongs to|is part of|works for) (.+)"),
        RelationPattern::new(BelongsTo, r"(?i)(.+?) of (.+)"),
        RelationPattern::new(Contains, r"(?i)(.+?) (?:contains|includes|has) (.+)"),
        RelationPattern::new(Contains, r"(?i)(.+?) with (.+)"),
        RelationPattern::new(SimilarTo, r"(?i)(.+?) (?:is similar to|resembles|is like) (.+)"),
        RelationPattern::new(SimilarTo, r"(?i)(.+?) and (.+?) are similar"),
        RelationPattern::new(RelatedTo, r"(?i)(.+?) (?:is related to|relates to|associated with) (.+)"),
        RelationPattern::new(RelatedTo, r"(?i)(.+?) and (.+?) are related"),
        RelationPattern::new(Describes, r"(?i)(.+?) (?:describes|explains|defines) (.+)"),
        RelationPattern::new(Describes, r"(?i)(.+?) is described by (.+)").reversed(),
    ]
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| ExtractError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

fn check_document(text: &str, limit: usize) -> Result<()> {
    if text.trim().is_empty() {
        return Err(ExtractError::EmptyDocument);
    }
    if text.len() > limit {
        return Err(ExtractError::DocumentTooLarge {
            len: text.len(),
            limit,
        });
    }
    Ok(())
}

fn split_sentences(text: &str) -> Vec<&str> {
    text.split(|c| matches!(c, '.' | '!' | '?'))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// `window` characters either side of `start..end`, on char boundaries.
fn context_snippet(text: &str, start: usize, end: usize, window: usize) -> String {
    let from = text[..start]
        .char_indices()
        .rev()
        .take(window)
        .last()
        .map_or(start, |(i, _)| i);
    let to = text[end..]
        .char_indices()
        .nth(window)
        .map_or(text.len(), |(i, _)| end + i);
    text[from..to].to_string()
}

// ============================================================================
// Entities
// ============================================================================

struct CompiledEntityPattern {
    spec: EntityPattern,
    regex: Regex,
}

pub struct TextEntityExtractor {
    config: TextExtractorConfig,
    patterns: Vec<CompiledEntityPattern>,
    word: Regex,
    stopwords: HashSet<String>,
}

impl TextEntityExtractor {
    pub fn new(config: TextExtractorConfig) -> Result<Self> {
        let patterns = config
            .entity_patterns
            .iter()
            .map(|spec| {
                Ok(CompiledEntityPattern {
                    spec: spec.clone(),
                    regex: compile(&spec.pattern)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let word = compile(&format!(r"\b[a-zA-Z]{{{},}}\b", config.keyword_min_length.max(1)))?;
        let stopwords = config.stopwords.iter().map(|s| s.to_lowercase()).collect();
        Ok(Self {
            config,
            patterns,
            word,
            stopwords,
        })
    }

    pub fn config(&self) -> &TextExtractorConfig {
        &self.config
    }

    /// Heuristic score in `[0, 1]`: longer and capitalised names score
    /// higher, stopwords are penalised.
    pub fn name_confidence(&self, name: &str) -> f64 {
        let mut confidence: f64 = 0.5;
        let len = name.chars().count();
        if len > 1 {
            confidence += 0.1;
        }
        if len > 3 {
            confidence += 0.1;
        }
        if name.chars().next().is_some_and(char::is_uppercase) {
            confidence += 0.1;
        }
        if self.stopwords.contains(&name.to_lowercase()) {
            confidence -= 0.3;
        }
        confidence.clamp(0.0, 1.0)
    }

    fn pattern_entities(&self, text: &str) -> Vec<Entity> {
        let mut entities = Vec::new();
        for compiled in &self.patterns {
            for caps in compiled.regex.captures_iter(text) {
                let Some(m) = caps.get(compiled.spec.group) else {
                    continue;
                };
                let name = m.as_str().trim();
                if name.chars().count() < 2 {
                    continue;
                }
                let confidence = self.name_confidence(name);
                if confidence < self.config.confidence_threshold {
                    continue;
                }
                entities.push(
                    Entity::new(name, compiled.spec.entity_type)
                        .with_confidence(confidence)
                        .with_source(SOURCE_TEXT)
                        .with_property("pattern", compiled.spec.name.as_str())
                        .with_property("position", json!([m.start(), m.end()]))
                        .with_property(
                            "context",
                            context_snippet(text, m.start(), m.end(), self.config.context_window),
                        ),
                );
            }
        }
        entities
    }

    /// Words repeated at least `keyword_min_frequency` times, in first-seen
    /// order, capped at `max_keywords`.
    pub fn keywords(&self, text: &str) -> Vec<(String, usize)> {
        let mut order: Vec<String> = Vec::new();
        let mut counts: HashMap<String, usize> = HashMap::new();
        for m in self.word.find_iter(text) {
            let word = m.as_str().to_lowercase();
            if self.stopwords.contains(&word) {
                continue;
            }
            let count = counts.entry(word.clone()).or_insert(0);
            if *count == 0 {
                order.push(word);
            }
            *count += 1;
        }
        order
            .into_iter()
            .filter_map(|w| {
                let n = counts.get(&w).copied().unwrap_or(0);
                (n >= self.config.keyword_min_frequency).then_some((w, n))
            })
            .take(self.config.max_keywords)
            .collect()
    }

    fn keyword_entities(&self, text: &str) -> Vec<Entity> {
        self.keywords(text)
            .into_iter()
            .map(|(word, frequency)| {
                Entity::new(word, EntityType::Concept)
                    .with_confidence(self.config.keyword_confidence)
                    .with_source(SOURCE_KEYWORD)
                    .with_property("pattern", "keyword_frequency")
                    .with_property("frequency", frequency)
            })
            .collect()
    }
}

impl EntityExtractor for TextEntityExtractor {
    fn extract_from_text(&self, text: &str, context: Option<&ExtractionContext>) -> Result<Vec<Entity>> {
        check_document(text, self.config.max_document_bytes)?;

        let mut entities = self.pattern_entities(text);
        entities.extend(self.keyword_entities(text));

        let mut entities = deduplicate_entities(entities).entities;
        if let Some(document_id) = context.and_then(|c| c.document_id.as_deref()) {
            for entity in &mut entities {
                entity
                    .properties
                    .insert("document_id".into(), json!(document_id));
            }
        }
        tracing::debug!(entities = entities.len(), "text entity extraction finished");
        Ok(entities)
    }

    fn extract_from_database(&self, _schema: &SchemaDescription) -> Result<Vec<Entity>> {
        Ok(Vec::new())
    }
}

// ============================================================================
// Relations
// ============================================================================

struct CompiledRelationPattern {
    spec: RelationPattern,
    regex: Regex,
}

pub struct TextRelationExtractor {
    config: TextExtractorConfig,
    patterns: Vec<CompiledRelationPattern>,
}

impl TextRelationExtractor {
    pub fn new(config: TextExtractorConfig) -> Result<Self> {
        let patterns = config
            .relation_patterns
            .iter()
            .map(|spec| {
                Ok(CompiledRelationPattern {
                    spec: spec.clone(),
                    regex: compile(&spec.pattern)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { config, patterns })
    }

    /// Exact name, then containment either way, then alias.
    fn find_entity<'a>(name: &str, entities: &'a [Entity]) -> Option<&'a Entity> {
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            return None;
        }
        if let Some(exact) = entities.iter().find(|e| e.normalized_name() == name) {
            return Some(exact);
        }
        let fuzzy = entities.iter().find(|e| {
            let entity_name = e.normalized_name();
            !entity_name.is_empty() && (name.contains(&entity_name) || entity_name.contains(&name))
        });
        fuzzy.or_else(|| {
            entities.iter().find(|e| {
                e.aliases.iter().any(|a| {
                    let alias = a.to_lowercase();
                    name == alias || alias.contains(&name)
                })
            })
        })
    }

    fn pattern_relations(&self, text: &str, entities: &[Entity]) -> Vec<Relation> {
        let mut relations = Vec::new();
        for sentence in split_sentences(text) {
            for compiled in &self.patterns {
                for caps in compiled.regex.captures_iter(sentence) {
                    let (Some(first), Some(second)) = (caps.get(1), caps.get(2)) else {
                        continue;
                    };
                    let (head_text, tail_text) = if compiled.spec.reversed {
                        (second.as_str(), first.as_str())
                    } else {
                        (first.as_str(), second.as_str())
                    };
                    let (Some(head), Some(tail)) = (
                        Self::find_entity(head_text, entities),
                        Self::find_entity(tail_text, entities),
                    ) else {
                        continue;
                    };
                    relations.push(
                        Relation::between(head, tail, compiled.spec.relation_type)
                            .with_confidence(self.config.pattern_relation_confidence)
                            .with_source(SOURCE_PATTERN)
                            .with_property("pattern", compiled.spec.pattern.as_str())
                            .with_property("sentence", truncate_chars(sentence, SENTENCE_EVIDENCE_CHARS)),
                    );
                }
            }
        }
        relations
    }

    /// `related_to` between every pair of entities named in the same sentence.
    pub fn cooccurrence_relations(&self, text: &str, entities: &[Entity]) -> Vec<Relation> {
        let mut relations = Vec::new();
        for sentence in split_sentences(text) {
            let lowered = sentence.to_lowercase();
            let present: Vec<&Entity> = entities
                .iter()
                .filter(|e| {
                    let name = e.normalized_name();
                    (!name.is_empty() && lowered.contains(&name))
                        || e.aliases
                            .iter()
                            .any(|a| !a.trim().is_empty() && lowered.contains(&a.to_lowercase()))
                })
                .collect();

            for (i, first) in present.iter().enumerate() {
                for second in &present[i + 1..] {
                    relations.push(
                        Relation::between(first, second, RelationType::RelatedTo)
                            .with_confidence(self.config.cooccurrence_confidence)
                            .with_source(SOURCE_COOCCURRENCE)
                            .with_property("sentence", truncate_chars(&lowered, SENTENCE_EVIDENCE_CHARS)),
                    );
                }
            }
        }
        relations
    }

    /// Valid endpoints, confidence at or above the threshold, and a
    /// whitelisted typed triple.
    pub fn validate_relation(&self, relation: &Relation, types: &HashMap<&str, EntityType>) -> bool {
        if !relation.is_valid() || relation.confidence < self.config.confidence_threshold {
            return false;
        }
        match (types.get(relation.head_id.as_str()), types.get(relation.tail_id.as_str())) {
            (Some(&head), Some(&tail)) => self.config.whitelist.allows(head, tail, relation.relation_type),
            _ => false,
        }
    }
}

impl RelationExtractor for TextRelationExtractor {
    fn extract_from_text(&self, text: &str, entities: &[Entity]) -> Result<Vec<Relation>> {
        check_document(text, self.config.max_document_bytes)?;

        let types: HashMap<&str, EntityType> =
            entities.iter().map(|e| (e.id.as_str(), e.entity_type)).collect();

        let mut candidates = self.pattern_relations(text, entities);
        candidates.extend(self.cooccurrence_relations(text, entities));
        let total = candidates.len();

        let mut seen = HashSet::new();
        let relations: Vec<Relation> = candidates
            .into_iter()
            .filter(|r| self.validate_relation(r, &types))
            .filter(|r| seen.insert((r.head_id.clone(), r.tail_id.clone(), r.relation_type)))
            .collect();
        tracing::debug!(
            candidates = total,
            accepted = relations.len(),
            "text relation extraction finished"
        );
        Ok(relations)
    }

    fn extract_from_database(
        &self,
        _schema: &SchemaDescription,
        _entities: &[Entity],
    ) -> Result<Vec<Relation>> {
        Ok(Vec::new())
    }
}
