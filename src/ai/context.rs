//! Batch context building
//!
//! Decides, per target document, which other documents the interpretation
//! engine sees and what digest of earlier results accompanies them. Never
//! calls an engine; the digest is assembled from already computed records.

use serde::{Deserialize, Serialize};

use crate::error::TakeoffError;
use crate::takeoff::model::{DocumentAnalysis, DocumentInput};

/// How documents in a batch are cross-referenced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextMode {
    /// Every other batch document is attached as reference material
    #[default]
    FullCrossReference,
    /// Fixed context documents plus a digest of earlier relevant results
    Sequential,
}

impl ContextMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "full" | "full_cross_reference" | "cross_reference" => Some(Self::FullCrossReference),
            "sequential" => Some(Self::Sequential),
            _ => None,
        }
    }
}

/// Everything the engine receives for one target document
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextPackage<'a> {
    pub primary_document: &'a DocumentInput,
    pub reference_documents: Vec<&'a DocumentInput>,
    pub context_digest: String,
}

impl<'a> ContextPackage<'a> {
    /// Presentation order: references first, the target last
    pub fn ordered_documents(&self) -> Vec<&'a DocumentInput> {
        let mut ordered = self.reference_documents.clone();
        ordered.push(self.primary_document);
        ordered
    }

    pub fn reference_names(&self) -> Vec<&'a str> {
        self.reference_documents.iter().map(|d| d.name.as_str()).collect()
    }
}

/// Builds [`ContextPackage`]s for one batch
#[derive(Debug, Clone, Copy)]
pub struct BatchContextBuilder<'a> {
    batch: &'a [DocumentInput],
    context_documents: &'a [DocumentInput],
    mode: ContextMode,
    context_enabled: bool,
}

impl<'a> BatchContextBuilder<'a> {
    pub fn new(batch: &'a [DocumentInput], mode: ContextMode) -> Self {
        Self {
            batch,
            context_documents: &[],
            mode,
            context_enabled: true,
        }
    }

    /// Fixed context-only documents and the digest switch (sequential mode)
    pub fn with_context(mut self, context_documents: &'a [DocumentInput], context_enabled: bool) -> Self {
        self.context_documents = context_documents;
        self.context_enabled = context_enabled;
        self
    }

    pub fn mode(&self) -> ContextMode {
        self.mode
    }

    /// Package for the document at `index`.
    ///
    /// `prior` is the result list accumulated so far; only relevant records
    /// feed the digest. Full cross-reference mode ignores it.
    pub fn build(
        &self,
        index: usize,
        prior: &[DocumentAnalysis],
    ) -> Result<ContextPackage<'a>, TakeoffError> {
        let primary_document = self.batch.get(index).ok_or(TakeoffError::IndexOutOfRange {
            index,
            len: self.batch.len(),
        })?;

        let package = match self.mode {
            ContextMode::FullCrossReference => ContextPackage {
                primary_document,
                reference_documents: self
                    .batch
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != index)
                    .map(|(_, d)| d)
                    .collect(),
                context_digest: String::new(),
            },
            ContextMode::Sequential => ContextPackage {
                primary_document,
                reference_documents: self.context_documents.iter().collect(),
                context_digest: if self.context_enabled {
                    build_context_digest(prior)
                } else {
                    String::new()
                },
            },
        };

        Ok(package)
    }
}

/// Summarize earlier relevant results: name, kind, scale and material names.
/// Empty when there is nothing relevant yet.
pub fn build_context_digest(prior: &[DocumentAnalysis]) -> String {
    let relevant: Vec<&DocumentAnalysis> = prior.iter().filter(|d| d.is_relevant).collect();
    if relevant.is_empty() {
        return String::new();
    }

    let mut digest = format!(
        "Previously analyzed documents in this batch ({} relevant):\n",
        relevant.len()
    );

    for (n, analysis) in relevant.iter().enumerate() {
        let names: Vec<&str> = analysis
            .materials
            .iter()
            .filter_map(|m| m.name.as_deref())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .collect();

        let scale = if analysis.scale.trim().is_empty() {
            "unknown"
        } else {
            analysis.scale.trim()
        };

        digest.push_str(&format!(
            "{}. {} | kind: {} | scale: {} | materials: {}\n",
            n + 1,
            analysis.document_name,
            analysis.document_kind,
            scale,
            if names.is_empty() {
                "none".to_string()
            } else {
                names.join(", ")
            }
        ));
    }

    digest
}
