use anyhow::Result;
use std::sync::Arc;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy};
use tantivy::schema::Field;
use tracing::debug;

use kbqa_core::corpus::Corpus;

use crate::tantivy_utils::{build_schema, register_tokenizer};

pub struct TantivyKeywordIndex {
	pub(crate) index: Index,
	pub(crate) reader: IndexReader,
	pub(crate) ord_field: Field,
	pub(crate) text_field: Field,
	pub(crate) corpus: Arc<Corpus>,
}

impl TantivyKeywordIndex {
	/// Index every non-empty unit of `corpus` into an in-memory index.
	pub fn build(corpus: Arc<Corpus>) -> Result<Self> {
		let schema = build_schema();
		let index = Index::create_in_ram(schema.clone());
		register_tokenizer(&index);
		let ord_field = schema.get_field("ord")?;
		let text_field = schema.get_field("text")?;

		let mut index_writer: IndexWriter = index.writer(50_000_000)?;
		let mut indexed = 0usize;
		for (ord, unit) in corpus.units().iter().enumerate() {
			if unit.text.trim().is_empty() { continue; }
			index_writer.add_document(doc!(
				ord_field => ord as u64,
				text_field => unit.text.clone(),
			))?;
			indexed += 1;
		}
		index_writer.commit()?;

		let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
		debug!(indexed, total = corpus.len(), "keyword index built");
		Ok(Self { index, reader, ord_field, text_field, corpus })
	}

	pub fn corpus(&self) -> &Corpus { &self.corpus }
}
