//! In-memory tensors and seeded mini-batch iteration.

use candle_core::{Device, Tensor};
use cfgwatch_core::{CfgWatchError, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::training::preprocess::PreparedCorpus;

/// The three feature views and the label index of every sample, as tensors.
pub struct TrainingDataset {
    pub text: Tensor,
    pub structure: Tensor,
    pub diff: Tensor,
    /// `[N]` u32 label indices.
    pub labels: Tensor,
    len: usize,
}

impl TrainingDataset {
    /// Stack the prepared feature rows into `[N, dim]` tensors.
    pub fn from_prepared(prepared: &PreparedCorpus, device: &Device) -> Result<Self> {
        let labels: Vec<u32> = prepared
            .label_indices()?
            .into_iter()
            .map(|i| i as u32)
            .collect();
        let len = labels.len();
        Ok(Self {
            text: rows_tensor(&prepared.text_vectors, prepared.text_dim(), device)?,
            structure: rows_tensor(&prepared.structs, prepared.struct_dim, device)?,
            diff: rows_tensor(&prepared.diffs, prepared.diff_dim, device)?,
            labels: Tensor::from_vec(labels, len, device).map_err(|e| {
                CfgWatchError::Model(format!("Failed to create labels tensor: {e}"))
            })?,
            len,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn label_vec(&self) -> Result<Vec<u32>> {
        self.labels
            .to_vec1()
            .map_err(|e| CfgWatchError::Model(format!("labels to vec: {e}")))
    }
}

fn rows_tensor(rows: &[Vec<f32>], cols: usize, device: &Device) -> Result<Tensor> {
    let mut flat = Vec::with_capacity(rows.len() * cols);
    for (i, row) in rows.iter().enumerate() {
        if row.len() != cols {
            return Err(CfgWatchError::Features(format!(
                "row {i} has {} columns, expected {cols}",
                row.len()
            )));
        }
        flat.extend_from_slice(row);
    }
    Tensor::from_vec(flat, (rows.len(), cols), device)
        .map_err(|e| CfgWatchError::Model(format!("Failed to create feature tensor: {e}")))
}

/// One mini-batch: the three views and their labels.
pub struct Batch {
    pub text: Tensor,
    pub structure: Tensor,
    pub diff: Tensor,
    pub labels: Tensor,
}

/// Mini-batch iterator over a [`TrainingDataset`]. Reshuffles indices each epoch.
pub struct BatchIterator<'a> {
    dataset: &'a TrainingDataset,
    indices: Vec<usize>,
    batch_size: usize,
    pos: usize,
}

impl<'a> BatchIterator<'a> {
    pub fn new(dataset: &'a TrainingDataset, batch_size: usize) -> Self {
        Self {
            dataset,
            indices: (0..dataset.len()).collect(),
            batch_size: batch_size.max(1),
            pos: 0,
        }
    }

    /// Reshuffle for a new epoch using a seeded RNG derived from base seed + epoch.
    pub fn reshuffle(&mut self, seed: u64, epoch: usize) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(epoch as u64));
        self.indices.shuffle(&mut rng);
        self.pos = 0;
    }

    /// Returns the next mini-batch, or `None` once the epoch is exhausted.
    /// The last batch may be short.
    pub fn next_batch(&mut self) -> Result<Option<Batch>> {
        let n = self.indices.len();
        if self.pos >= n {
            return Ok(None);
        }

        let end = (self.pos + self.batch_size).min(n);
        let batch_idx: Vec<u32> = self.indices[self.pos..end]
            .iter()
            .map(|&i| i as u32)
            .collect();
        self.pos = end;

        let select = |t: &Tensor, idx: &Tensor| {
            t.index_select(idx, 0)
                .map_err(|e| CfgWatchError::Model(format!("Failed to select batch rows: {e}")))
        };
        let device = self.dataset.labels.device().clone();
        let idx = Tensor::new(batch_idx.as_slice(), &device)
            .map_err(|e| CfgWatchError::Model(format!("Failed to create index tensor: {e}")))?;

        Ok(Some(Batch {
            text: select(&self.dataset.text, &idx)?,
            structure: select(&self.dataset.structure, &idx)?,
            diff: select(&self.dataset.diff, &idx)?,
            labels: select(&self.dataset.labels, &idx)?,
        }))
    }

    /// Sample order of the current epoch.
    pub fn order(&self) -> &[usize] {
        &self.indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::preprocess::preprocess;
    use cfgwatch_core::{Corpus, FieldMap};
    use serde_json::json;

    fn prepared(n: usize) -> PreparedCorpus {
        let samples: Vec<_> = (0..n)
            .map(|i| {
                json!({
                    "metadata": {"object_type": if i % 2 == 0 { "address" } else { "policy" }},
                    "data": {
                        "before": {},
                        "after": {"name": format!("obj{i}"), "status": "enable"}
                    },
                    "changes": [{"field": "name"}]
                })
            })
            .collect();
        let corpus: Corpus = serde_json::from_value(json!({ "samples": samples })).unwrap();
        preprocess(&corpus, &FieldMap::default(), "fortigate", 2000).unwrap()
    }

    #[test]
    fn test_dataset_shapes() {
        let p = prepared(5);
        let ds = TrainingDataset::from_prepared(&p, &Device::Cpu).unwrap();
        assert_eq!(ds.len(), 5);
        assert_eq!(ds.text.dims(), &[5, p.text_dim()]);
        assert_eq!(ds.structure.dims(), &[5, 2]);
        assert_eq!(ds.diff.dims(), &[5, 200]);
        assert_eq!(ds.label_vec().unwrap(), vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn test_batches_cover_every_sample_once() {
        let p = prepared(10);
        let ds = TrainingDataset::from_prepared(&p, &Device::Cpu).unwrap();
        let mut iter = BatchIterator::new(&ds, 4);
        iter.reshuffle(42, 0);

        let mut sizes = Vec::new();
        while let Some(batch) = iter.next_batch().unwrap() {
            assert_eq!(batch.text.dim(0).unwrap(), batch.labels.dim(0).unwrap());
            sizes.push(batch.labels.dim(0).unwrap());
        }
        assert_eq!(sizes, vec![4, 4, 2]);

        let mut seen = iter.order().to_vec();
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_reshuffle_is_seeded() {
        let p = prepared(12);
        let ds = TrainingDataset::from_prepared(&p, &Device::Cpu).unwrap();
        let mut a = BatchIterator::new(&ds, 4);
        let mut b = BatchIterator::new(&ds, 4);
        for epoch in 0..3 {
            a.reshuffle(42, epoch);
            b.reshuffle(42, epoch);
            assert_eq!(a.order(), b.order());
        }

        let mut c = BatchIterator::new(&ds, 4);
        c.reshuffle(7, 0);
        let mut d = BatchIterator::new(&ds, 4);
        d.reshuffle(42, 0);
        assert_ne!(c.order(), d.order());
    }
}
