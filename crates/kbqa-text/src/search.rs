use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::Value;
use tantivy::TantivyDocument;
use tracing::debug;

use kbqa_core::traits::{KeywordIndex, KeywordMatch};

use crate::index::TantivyKeywordIndex;

impl KeywordIndex for TantivyKeywordIndex {
	/// Top-`k` units by BM25, best first. Query syntax errors are tolerated:
	/// the lenient parser keeps whatever terms it could read.
	fn search(&self, query: &str, k: usize) -> anyhow::Result<Vec<KeywordMatch>> {
		if k == 0 { return Ok(Vec::new()); }
		let searcher = self.reader.searcher();
		let qp = QueryParser::for_index(&self.index, vec![self.text_field]);
		let (q, errors) = qp.parse_query_lenient(query);
		if !errors.is_empty() { debug!(errors = errors.len(), "lenient keyword query parse"); }
		let top_docs = searcher.search(&q, &TopDocs::with_limit(k))?;
		let mut hits = Vec::with_capacity(top_docs.len());
		for (_score, addr) in top_docs {
			let doc: TantivyDocument = searcher.doc(addr)?;
			let ord = doc.get_first(self.ord_field).and_then(|v| v.as_u64())
				.ok_or_else(|| anyhow::anyhow!("indexed document without ord"))?;
			let unit = usize::try_from(ord).ok().and_then(|i| self.corpus.units().get(i))
				.ok_or_else(|| anyhow::anyhow!("ord {} outside corpus", ord))?;
			hits.push(KeywordMatch { metadata: unit.unit_ref(), text: unit.text.clone() });
		}
		Ok(hits)
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;
	use kbqa_core::corpus::Corpus;
	use kbqa_core::types::CorpusUnit;
	use super::*;

	fn unit(i: usize, text: &str) -> CorpusUnit {
		CorpusUnit { source: "manual.md".into(), block_idx: i, section_path: "S".into(), text: text.into() }
	}

	#[test]
	fn zero_k_is_empty() {
		let idx = TantivyKeywordIndex::build(Arc::new(Corpus::from_units(vec![unit(0, "descale")]))).expect("build");
		assert!(idx.search("descale", 0).expect("search").is_empty());
	}

	#[test]
	fn malformed_query_does_not_fail() {
		let idx = TantivyKeywordIndex::build(Arc::new(Corpus::from_units(vec![unit(0, "grinder setting")]))).expect("build");
		let hits = idx.search("grinder AND (", 5).expect("lenient");
		assert_eq!(hits.len(), 1);
	}
}
