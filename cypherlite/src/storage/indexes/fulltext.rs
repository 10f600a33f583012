// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Fulltext index with TF-IDF scoring
//!
//! Documents are tokenized into lowercase alphanumeric terms. Postings keep
//! term positions so that quoted phrases can be matched. Query syntax:
//!
//! - `graph database`: either term (default operator is OR)
//! - `graph AND database`, `graph OR database`, `NOT legacy`
//! - `+required -excluded`
//! - `"exact phrase"`
//! - parentheses for grouping

use super::IndexError;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Split text into lowercase terms
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Parsed fulltext query
#[derive(Debug, Clone, PartialEq)]
pub enum FulltextQuery {
    Term(String),
    Phrase(Vec<String>),
    And(Vec<FulltextQuery>),
    Or(Vec<FulltextQuery>),
    Not(Box<FulltextQuery>),
    /// `+clause`: every match must satisfy it
    Must(Box<FulltextQuery>),
}

impl FulltextQuery {
    /// Parse query text. Empty queries are rejected.
    pub fn parse(input: &str) -> Result<Self, IndexError> {
        let tokens = lex_query(input)?;
        if tokens.is_empty() {
            return Err(IndexError::query("empty fulltext query"));
        }
        let mut parser = QueryParser { tokens, pos: 0 };
        let query = parser.parse_or()?;
        if parser.pos < parser.tokens.len() {
            return Err(IndexError::query(format!(
                "unexpected '{:?}' in fulltext query",
                parser.tokens[parser.pos]
            )));
        }
        Ok(query)
    }

    /// Whether the query uses boolean or phrase syntax
    pub fn is_structured(&self) -> bool {
        !matches!(self, FulltextQuery::Term(_))
            && !matches!(self, FulltextQuery::Or(items) if items.iter().all(|q| matches!(q, FulltextQuery::Term(_))))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum QueryToken {
    Word(String),
    Phrase(Vec<String>),
    And,
    Or,
    Not,
    Required,
    Excluded,
    Open,
    Close,
}

fn lex_query(input: &str) -> Result<Vec<QueryToken>, IndexError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '"' => {
                chars.next();
                let mut phrase = String::new();
                let mut closed = false;
                for ch in chars.by_ref() {
                    if ch == '"' {
                        closed = true;
                        break;
                    }
                    phrase.push(ch);
                }
                if !closed {
                    return Err(IndexError::query("unterminated phrase in fulltext query"));
                }
                let terms = tokenize(&phrase);
                if !terms.is_empty() {
                    tokens.push(QueryToken::Phrase(terms));
                }
            }
            '(' => {
                chars.next();
                tokens.push(QueryToken::Open);
            }
            ')' => {
                chars.next();
                tokens.push(QueryToken::Close);
            }
            '+' => {
                chars.next();
                tokens.push(QueryToken::Required);
            }
            '-' => {
                chars.next();
                tokens.push(QueryToken::Excluded);
            }
            _ => {
                let mut word = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_whitespace() || matches!(ch, '"' | '(' | ')') {
                        break;
                    }
                    word.push(ch);
                    chars.next();
                }
                match word.as_str() {
                    "AND" | "&&" => tokens.push(QueryToken::And),
                    "OR" | "||" => tokens.push(QueryToken::Or),
                    "NOT" | "!" => tokens.push(QueryToken::Not),
                    _ => {
                        let terms = tokenize(&word);
                        match terms.len() {
                            0 => {}
                            1 => tokens.extend(terms.into_iter().map(QueryToken::Word)),
                            _ => tokens.push(QueryToken::Phrase(terms)),
                        }
                    }
                }
            }
        }
    }
    Ok(tokens)
}

struct QueryParser {
    tokens: Vec<QueryToken>,
    pos: usize,
}

impl QueryParser {
    fn peek(&self) -> Option<&QueryToken> {
        self.tokens.get(self.pos)
    }

    // or := and (OR? and)*   -- adjacency means OR
    fn parse_or(&mut self) -> Result<FulltextQuery, IndexError> {
        let mut items = vec![self.parse_and()?];
        loop {
            match self.peek() {
                Some(QueryToken::Or) => {
                    self.pos += 1;
                    items.push(self.parse_and()?);
                }
                Some(QueryToken::Close) | None => break,
                Some(_) => items.push(self.parse_and()?),
            }
        }
        Ok(collapse(items, FulltextQuery::Or))
    }

    fn parse_and(&mut self) -> Result<FulltextQuery, IndexError> {
        let mut items = vec![self.parse_unary()?];
        while let Some(QueryToken::And) = self.peek() {
            self.pos += 1;
            items.push(self.parse_unary()?);
        }
        Ok(collapse(items, FulltextQuery::And))
    }

    fn parse_unary(&mut self) -> Result<FulltextQuery, IndexError> {
        match self.peek().cloned() {
            Some(QueryToken::Not) | Some(QueryToken::Excluded) => {
                self.pos += 1;
                Ok(FulltextQuery::Not(Box::new(self.parse_unary()?)))
            }
            Some(QueryToken::Required) => {
                self.pos += 1;
                Ok(FulltextQuery::Must(Box::new(self.parse_unary()?)))
            }
            Some(QueryToken::Open) => {
                self.pos += 1;
                let inner = self.parse_or()?;
                match self.peek() {
                    Some(QueryToken::Close) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    _ => Err(IndexError::query("missing ')' in fulltext query")),
                }
            }
            Some(QueryToken::Word(word)) => {
                self.pos += 1;
                Ok(FulltextQuery::Term(word))
            }
            Some(QueryToken::Phrase(terms)) => {
                self.pos += 1;
                Ok(FulltextQuery::Phrase(terms))
            }
            Some(other) => Err(IndexError::query(format!(
                "unexpected '{:?}' in fulltext query",
                other
            ))),
            None => Err(IndexError::query("unexpected end of fulltext query")),
        }
    }
}

fn collapse(mut items: Vec<FulltextQuery>, make: fn(Vec<FulltextQuery>) -> FulltextQuery) -> FulltextQuery {
    if items.len() == 1 {
        items.remove(0)
    } else {
        make(items)
    }
}

/// Term postings with positions, keyed by document id
#[derive(Debug, Clone, Default)]
pub struct FulltextIndex {
    postings: HashMap<String, BTreeMap<String, Vec<u32>>>,
    doc_terms: HashMap<String, Vec<String>>,
}

impl FulltextIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.doc_terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_terms.is_empty()
    }

    pub fn contains(&self, doc_id: &str) -> bool {
        self.doc_terms.contains_key(doc_id)
    }

    /// Index (or re-index) a document. Empty text removes it.
    pub fn index_document(&mut self, doc_id: &str, text: &str) {
        self.remove_document(doc_id);
        let terms = tokenize(text);
        if terms.is_empty() {
            return;
        }
        for (position, term) in terms.iter().enumerate() {
            self.postings
                .entry(term.clone())
                .or_default()
                .entry(doc_id.to_string())
                .or_default()
                .push(position as u32);
        }
        self.doc_terms.insert(doc_id.to_string(), terms);
    }

    pub fn remove_document(&mut self, doc_id: &str) {
        let terms = match self.doc_terms.remove(doc_id) {
            Some(terms) => terms,
            None => return,
        };
        let unique: HashSet<String> = terms.into_iter().collect();
        for term in unique {
            if let Some(docs) = self.postings.get_mut(&term) {
                docs.remove(doc_id);
                if docs.is_empty() {
                    self.postings.remove(&term);
                }
            }
        }
    }

    fn idf(&self, term: &str) -> f64 {
        let df = self.postings.get(term).map(|d| d.len()).unwrap_or(0);
        if df == 0 {
            return 0.0;
        }
        (1.0 + self.doc_terms.len() as f64 / df as f64).ln()
    }

    fn term_scores(&self, term: &str) -> HashMap<String, f64> {
        let idf = self.idf(term);
        self.postings
            .get(term)
            .map(|docs| {
                docs.iter()
                    .map(|(doc, positions)| {
                        let tf = 1.0 + (positions.len() as f64).ln();
                        (doc.clone(), tf * idf)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn phrase_scores(&self, terms: &[String]) -> HashMap<String, f64> {
        let first = match terms.first() {
            Some(first) => first,
            None => return HashMap::new(),
        };
        let candidates = match self.postings.get(first) {
            Some(docs) => docs,
            None => return HashMap::new(),
        };

        let mut matches = HashMap::new();
        for (doc, starts) in candidates {
            let mut count = 0usize;
            for &start in starts {
                let all_follow = terms.iter().enumerate().skip(1).all(|(offset, term)| {
                    self.postings
                        .get(term)
                        .and_then(|docs| docs.get(doc))
                        .map(|positions| positions.binary_search(&(start + offset as u32)).is_ok())
                        .unwrap_or(false)
                });
                if all_follow {
                    count += 1;
                }
            }
            if count > 0 {
                let weight: f64 = terms.iter().map(|t| self.idf(t)).sum();
                matches.insert(doc.clone(), (1.0 + (count as f64).ln()) * weight);
            }
        }
        matches
    }

    fn evaluate(&self, query: &FulltextQuery) -> HashMap<String, f64> {
        match query {
            FulltextQuery::Term(term) => self.term_scores(term),
            FulltextQuery::Phrase(terms) => self.phrase_scores(terms),
            FulltextQuery::Or(items) => {
                let (positive, negative) = split_negations(items);
                let (required, optional): (Vec<&FulltextQuery>, Vec<&FulltextQuery>) = positive
                    .into_iter()
                    .partition(|q| matches!(q, FulltextQuery::Must(_)));

                let mut scores = if required.is_empty() {
                    let mut union: HashMap<String, f64> = HashMap::new();
                    for item in &optional {
                        for (doc, score) in self.evaluate(item) {
                            *union.entry(doc).or_insert(0.0) += score;
                        }
                    }
                    union
                } else {
                    let mut scores = self.intersect(&required);
                    for item in &optional {
                        for (doc, score) in self.evaluate(item) {
                            if let Some(total) = scores.get_mut(&doc) {
                                *total += score;
                            }
                        }
                    }
                    scores
                };
                self.exclude(&mut scores, &negative);
                scores
            }
            FulltextQuery::And(items) => {
                let (positive, negative) = split_negations(items);
                let mut scores = self.intersect(&positive);
                self.exclude(&mut scores, &negative);
                scores
            }
            FulltextQuery::Must(inner) => self.evaluate(inner),
            // A bare negation has nothing positive to select from
            FulltextQuery::Not(_) => HashMap::new(),
        }
    }

    fn intersect(&self, items: &[&FulltextQuery]) -> HashMap<String, f64> {
        let mut scores: Option<HashMap<String, f64>> = None;
        for item in items {
            let next = self.evaluate(item);
            scores = Some(match scores {
                None => next,
                Some(current) => current
                    .into_iter()
                    .filter_map(|(doc, score)| next.get(&doc).map(|s| (doc, score + s)))
                    .collect(),
            });
        }
        scores.unwrap_or_default()
    }

    fn exclude(&self, scores: &mut HashMap<String, f64>, negative: &[&FulltextQuery]) {
        for item in negative {
            for doc in self.evaluate(item).keys() {
                scores.remove(doc);
            }
        }
    }

    /// Run a parsed query, best matches first
    pub fn search_query(&self, query: &FulltextQuery, limit: usize) -> Vec<(String, f64)> {
        let mut hits: Vec<(String, f64)> = self.evaluate(query).into_iter().collect();
        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        hits.truncate(limit);
        hits
    }

    /// Parse and run query text
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<(String, f64)>, IndexError> {
        let parsed = FulltextQuery::parse(query)?;
        Ok(self.search_query(&parsed, limit))
    }
}

fn split_negations(items: &[FulltextQuery]) -> (Vec<&FulltextQuery>, Vec<&FulltextQuery>) {
    let mut positive = Vec::new();
    let mut negative = Vec::new();
    for item in items {
        match item {
            FulltextQuery::Not(inner) => negative.push(inner.as_ref()),
            other => positive.push(other),
        }
    }
    (positive, negative)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> FulltextIndex {
        let mut index = FulltextIndex::new();
        index.index_document("d1", "The quick brown fox jumps over the lazy dog");
        index.index_document("d2", "A graph database stores nodes and relationships");
        index.index_document("d3", "Graph algorithms: shortest path over a database of nodes");
        index.index_document("d4", "Brown bears are not foxes");
        index
    }

    fn ids(hits: Vec<(String, f64)>) -> Vec<String> {
        let mut ids: Vec<String> = hits.into_iter().map(|(id, _)| id).collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_default_operator_is_or() {
        let index = sample_index();
        let hits = index.search("fox database", 10).unwrap();
        assert_eq!(ids(hits), vec!["d1", "d2", "d3"]);
    }

    #[test]
    fn test_boolean_operators() {
        let index = sample_index();
        assert_eq!(
            ids(index.search("graph AND path", 10).unwrap()),
            vec!["d3"]
        );
        assert_eq!(
            ids(index.search("graph NOT algorithms", 10).unwrap()),
            vec!["d2"]
        );
        assert_eq!(
            ids(index.search("+brown -fox", 10).unwrap()),
            vec!["d4"]
        );
        assert_eq!(
            ids(index.search("+graph nodes fox", 10).unwrap()),
            vec!["d2", "d3"]
        );
    }

    #[test]
    fn test_phrase_query_requires_adjacency() {
        let index = sample_index();
        assert_eq!(ids(index.search("\"brown fox\"", 10).unwrap()), vec!["d1"]);
        assert!(index.search("\"fox brown\"", 10).unwrap().is_empty());
    }

    #[test]
    fn test_rarer_terms_score_higher() {
        let mut index = FulltextIndex::new();
        index.index_document("common", "graph graph");
        index.index_document("rare", "graph hnsw");
        index.index_document("other", "graph");
        let hits = index.search("graph hnsw", 10).unwrap();
        assert_eq!(hits[0].0, "rare");
    }

    #[test]
    fn test_reindex_and_remove() {
        let mut index = sample_index();
        index.index_document("d1", "completely different text");
        assert!(index.search("fox", 10).unwrap().is_empty());
        index.remove_document("d1");
        assert!(index.search("different", 10).unwrap().is_empty());
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_malformed_queries() {
        assert!(FulltextQuery::parse("").is_err());
        assert!(FulltextQuery::parse("\"open phrase").is_err());
        assert!(FulltextQuery::parse("(graph").is_err());
    }
}
