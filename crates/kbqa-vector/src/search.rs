use anyhow::{anyhow, Result};
use arrow_array::{Array, Float32Array, Int64Array, RecordBatch, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::Table;

use kbqa_core::traits::{VectorIndex, VectorMatch};
use kbqa_core::types::UnitRef;

/// Nearest-neighbour queries against one LanceDB collection.
pub struct LanceVectorIndex { table: Table }

impl LanceVectorIndex {
	pub fn new(table: Table) -> Self { Self { table } }
}

#[async_trait]
impl VectorIndex for LanceVectorIndex {
	async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<VectorMatch>> {
		if k == 0 { return Ok(Vec::new()); }
		let mut stream = self.table.vector_search(embedding.to_vec())?.limit(k).execute().await?;
		let mut matches = Vec::with_capacity(k);
		while let Some(batch) = stream.try_next().await? {
			read_batch(&batch, &mut matches)?;
		}
		// Batches may arrive out of order across fragments.
		matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
		matches.truncate(k);
		Ok(matches)
	}
}

fn read_batch(batch: &RecordBatch, out: &mut Vec<VectorMatch>) -> Result<()> {
	let ids = string_col(batch, "id")?;
	let sources = string_col(batch, "source")?;
	let sections = string_col(batch, "section_path")?;
	let texts = string_col(batch, "text")?;
	let block_idxs = batch.column_by_name("block_idx").and_then(|c| c.as_any().downcast_ref::<Int64Array>()).ok_or_else(|| anyhow!("column 'block_idx' missing"))?;
	let distances = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>()).ok_or_else(|| anyhow!("column '_distance' missing"))?;
	for i in 0..batch.num_rows() {
		let block_idx = usize::try_from(block_idxs.value(i)).map_err(|_| anyhow!("negative block_idx in row {}", i))?;
		out.push(VectorMatch {
			id: ids.value(i).to_string(),
			metadata: UnitRef { source: sources.value(i).to_string(), block_idx, section_path: sections.value(i).to_string() },
			distance: if distances.is_null(i) { f32::MAX } else { distances.value(i) },
			text: texts.value(i).to_string(),
		});
	}
	Ok(())
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
	batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<StringArray>()).ok_or_else(|| anyhow!("column '{}' missing", name))
}
