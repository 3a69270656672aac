//! Queryable result store for one analyzed unit.
//!
//! Results are recorded per source span while the driver walks the unit,
//! then frozen into a start-sorted vector with a running maximum of end
//! offsets so point and range queries stay logarithmic.

use std::collections::HashMap;

use lilt_core::Span;
use lilt_resolve::Declaration;
use lilt_types::{Confidence, Type};
use serde::{Deserialize, Serialize};

/// Everything the engine knows about one expression or reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeLookupResult {
    pub ty: Type,
    /// The type that declared the resolved member, when there is one.
    pub declaring_type: Option<Type>,
    pub declaration: Option<Declaration>,
    pub confidence: Confidence,
}

impl TypeLookupResult {
    #[must_use]
    pub fn unknown() -> Self {
        TypeLookupResult {
            ty: Type::Unknown,
            declaring_type: None,
            declaration: None,
            confidence: Confidence::Unknown,
        }
    }
}

/// Accumulates results while a pass runs. A span may be visited more than
/// once (e.g. an assignment target read back); a later write wins only if it
/// is at least as confident as what it replaces.
#[derive(Debug, Default)]
pub(crate) struct IndexBuilder {
    results: HashMap<Span, TypeLookupResult>,
    references: HashMap<Declaration, Vec<(Span, Confidence)>>,
}

impl IndexBuilder {
    pub(crate) fn record(&mut self, span: Span, result: TypeLookupResult) {
        if span.is_empty() {
            return;
        }
        if let Some(decl) = &result.declaration {
            self.references
                .entry(decl.clone())
                .or_default()
                .push((span, result.confidence));
        }
        match self.results.get(&span) {
            Some(existing) if result.confidence < existing.confidence => {}
            _ => {
                self.results.insert(span, result);
            }
        }
    }

    pub(crate) fn finish(self) -> ResultIndex {
        let mut entries: Vec<(Span, TypeLookupResult)> = self.results.into_iter().collect();
        entries.sort_by_key(|(span, _)| (span.start, span.end));

        let mut max_end = Vec::with_capacity(entries.len());
        let mut running = 0usize;
        for (span, _) in &entries {
            running = running.max(span.end);
            max_end.push(running);
        }

        let mut references = self.references;
        for spans in references.values_mut() {
            spans.sort_by_key(|(span, _)| (span.start, span.end));
            spans.dedup();
        }

        ResultIndex {
            entries,
            max_end,
            references,
        }
    }
}

/// Immutable, span-indexed view of an analysis pass's results.
#[derive(Debug, Default)]
pub struct ResultIndex {
    entries: Vec<(Span, TypeLookupResult)>,
    /// `max_end[i]` is the largest end offset among `entries[..=i]`, the
    /// early-out bound for backward scans in point queries.
    max_end: Vec<usize>,
    references: HashMap<Declaration, Vec<(Span, Confidence)>>,
}

impl ResultIndex {
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The result recorded for exactly this span.
    #[must_use]
    pub fn exact(&self, span: Span) -> Option<&TypeLookupResult> {
        let idx = self
            .entries
            .binary_search_by_key(&(span.start, span.end), |(s, _)| (s.start, s.end))
            .ok()?;
        Some(&self.entries[idx].1)
    }

    /// The innermost result whose span contains `offset`.
    #[must_use]
    pub fn at(&self, offset: usize) -> Option<(Span, &TypeLookupResult)> {
        let upper = self
            .entries
            .partition_point(|(span, _)| span.start <= offset);
        let mut best: Option<(Span, &TypeLookupResult)> = None;
        for i in (0..upper).rev() {
            if self.max_end[i] <= offset {
                break;
            }
            let (span, result) = &self.entries[i];
            if span.contains(offset) {
                let narrower = best
                    .as_ref()
                    .map(|(b, _)| span.len() < b.len())
                    .unwrap_or(true);
                if narrower {
                    best = Some((*span, result));
                }
            }
        }
        best
    }

    /// All results whose spans lie entirely within `range`, in span order.
    pub fn in_range(&self, range: Span) -> impl Iterator<Item = (Span, &TypeLookupResult)> {
        let lower = self
            .entries
            .partition_point(|(span, _)| span.start < range.start);
        let upper = self
            .entries
            .partition_point(|(span, _)| span.start < range.end);
        self.entries[lower..upper]
            .iter()
            .filter(move |(span, _)| span.end <= range.end)
            .map(|(span, result)| (*span, result))
    }

    /// Reference spans resolved to `decl`, with the confidence each
    /// resolution carried.
    #[must_use]
    pub fn references(&self, decl: &Declaration) -> &[(Span, Confidence)] {
        self.references
            .get(decl)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Reference spans resolved to `decl` with full confidence.
    pub fn exact_references<'a>(
        &'a self,
        decl: &Declaration,
    ) -> impl Iterator<Item = Span> + 'a {
        self.references(decl)
            .iter()
            .filter(|(_, confidence)| *confidence == Confidence::Exact)
            .map(|(span, _)| *span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn result(conf: Confidence) -> TypeLookupResult {
        TypeLookupResult {
            ty: Type::Unknown,
            declaring_type: None,
            declaration: None,
            confidence: conf,
        }
    }

    #[test]
    fn point_query_returns_innermost_span() {
        let mut builder = IndexBuilder::default();
        builder.record(Span::new(0, 100), result(Confidence::Exact));
        builder.record(Span::new(10, 40), result(Confidence::Inferred));
        builder.record(Span::new(12, 18), result(Confidence::Exact));
        builder.record(Span::new(50, 60), result(Confidence::Exact));
        let index = builder.finish();

        let (span, _) = index.at(15).unwrap();
        assert_eq!(span, Span::new(12, 18));
        let (span, _) = index.at(45).unwrap();
        assert_eq!(span, Span::new(0, 100));
        assert!(index.at(200).is_none());
    }

    #[test]
    fn lower_confidence_rewrite_does_not_clobber() {
        let mut builder = IndexBuilder::default();
        let span = Span::new(5, 9);
        builder.record(span, result(Confidence::Exact));
        builder.record(span, result(Confidence::Unknown));
        let index = builder.finish();

        assert_eq!(index.exact(span).unwrap().confidence, Confidence::Exact);
    }

    #[test]
    fn equal_confidence_rewrite_wins() {
        let mut builder = IndexBuilder::default();
        let span = Span::new(5, 9);
        let mut first = result(Confidence::Inferred);
        first.ty = Type::Primitive(lilt_types::Primitive::Int);
        builder.record(span, first);
        let mut second = result(Confidence::Inferred);
        second.ty = Type::Primitive(lilt_types::Primitive::Long);
        builder.record(span, second);
        let index = builder.finish();

        assert_eq!(
            index.exact(span).unwrap().ty,
            Type::Primitive(lilt_types::Primitive::Long)
        );
    }

    #[test]
    fn range_query_returns_fully_contained_spans() {
        let mut builder = IndexBuilder::default();
        builder.record(Span::new(0, 5), result(Confidence::Exact));
        builder.record(Span::new(10, 20), result(Confidence::Exact));
        builder.record(Span::new(18, 35), result(Confidence::Exact));
        let index = builder.finish();

        let hits: Vec<Span> = index.in_range(Span::new(4, 25)).map(|(s, _)| s).collect();
        assert_eq!(hits, vec![Span::new(10, 20)]);

        assert_eq!(index.in_range(Span::new(40, 50)).count(), 0);
    }
}
