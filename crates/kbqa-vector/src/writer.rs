use anyhow::{anyhow, Result};
use arrow_array::{FixedSizeListArray, Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use indicatif::{ProgressBar, ProgressStyle};
use lancedb::Table;
use std::sync::Arc;
use tracing::info;

use kbqa_core::types::CorpusUnit;

use crate::schema::build_arrow_schema;

/// Appends corpus units and their embeddings to a collection in batches.
pub struct LanceCorpusWriter { table: Table, dim: i32, batch_size: usize }

impl LanceCorpusWriter {
	pub fn new(table: Table, dim: usize) -> Result<Self> {
		let dim = i32::try_from(dim).map_err(|_| anyhow!("embedding dim {} too large", dim))?;
		Ok(Self { table, dim, batch_size: 1000 })
	}

	pub fn with_batch_size(mut self, batch_size: usize) -> Self { self.batch_size = batch_size.max(1); self }

	pub async fn write(&self, units: &[CorpusUnit], embeddings: &[Vec<f32>]) -> Result<usize> {
		if units.is_empty() { return Ok(0); }
		if units.len() != embeddings.len() { return Err(anyhow!("{} units but {} embeddings", units.len(), embeddings.len())); }
		let pb = ProgressBar::new(units.len() as u64);
		pb.set_style(ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} units ({percent}%)")?.progress_chars("#>-"));
		let mut written = 0usize;
		for (unit_batch, emb_batch) in units.chunks(self.batch_size).zip(embeddings.chunks(self.batch_size)) {
			let batch = self.to_record_batch(unit_batch, emb_batch)?;
			let schema = batch.schema();
			let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
			self.table.add(reader).execute().await?;
			written += unit_batch.len();
			pb.set_position(written as u64);
		}
		pb.finish_and_clear();
		info!(written, "vector collection updated");
		Ok(written)
	}

	fn to_record_batch(&self, units: &[CorpusUnit], embeddings: &[Vec<f32>]) -> Result<RecordBatch> {
		let mut ids = Vec::new(); let mut sources = Vec::new(); let mut block_idxs = Vec::new(); let mut sections = Vec::new(); let mut texts = Vec::new(); let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::new();
		for (unit, emb) in units.iter().zip(embeddings) {
			if emb.len() != self.dim as usize { return Err(anyhow!("embedding for {} has {} dims, expected {}", unit.chunk_id(), emb.len(), self.dim)); }
			ids.push(unit.chunk_id()); sources.push(unit.source.clone()); block_idxs.push(i64::try_from(unit.block_idx)?); sections.push(unit.section_path.clone()); texts.push(unit.text.clone()); vectors.push(Some(emb.iter().map(|&x| Some(x)).collect()));
		}
		let record_batch = RecordBatch::try_new(build_arrow_schema(self.dim), vec![
			Arc::new(StringArray::from(ids)),
			Arc::new(StringArray::from(sources)),
			Arc::new(Int64Array::from(block_idxs)),
			Arc::new(StringArray::from(sections)),
			Arc::new(StringArray::from(texts)),
			Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors.into_iter(), self.dim)),
		])?;
		Ok(record_batch)
	}
}
