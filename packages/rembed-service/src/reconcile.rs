//! Dimension reconciliation.
//!
//! A run counts every stored embedding whose width differs from the target, then repairs them
//! in fixed-size batches read one keyset page at a time. Each batch is cleared in one statement
//! before any provider call, so a record whose repair fails is left without an embedding rather
//! than with a wrong one.

use std::{
	collections::BTreeMap,
	sync::{
		Arc,
		atomic::{AtomicBool, Ordering},
	},
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
	CircuitBreaker, EmbeddingRecord, Error, MemoryStore, Result, convert, embedder::Embedder,
};

#[derive(Debug, Clone)]
pub struct ReconcileSettings {
	pub target_dim: u32,
	pub outdated_dims: Vec<u32>,
	pub batch_size: usize,
	pub discovery_sample_limit: u32,
	pub pad_indivisible: bool,
}
impl ReconcileSettings {
	pub fn from_config(cfg: &rembed_config::Config) -> Self {
		Self {
			target_dim: cfg.embeddings.target_dim,
			outdated_dims: cfg.embeddings.outdated_dims.clone(),
			batch_size: usize::try_from(cfg.reconcile.batch_size).unwrap_or(usize::MAX).max(1),
			discovery_sample_limit: cfg.reconcile.discovery_sample_limit,
			pad_indivisible: cfg.reconcile.pad_indivisible,
		}
	}
}

/// Outcome counters for one run. Every run, finished or not, is balanced; see
/// [`RunReport::is_balanced`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
	pub discovered: u64,
	pub cleared: u64,
	pub processed: u64,
	pub succeeded_by_regeneration: u64,
	pub succeeded_by_conversion: u64,
	pub failed: u64,
	pub skipped_no_text: u64,
	/// Discovered records no finished batch reached, because the run was cancelled or aborted.
	pub unprocessed: u64,
	pub batches_completed: u64,
	pub by_dimension: BTreeMap<u32, u64>,
	/// Discovery fell back to a bounded client-side sample.
	pub sampled: bool,
	pub cancelled: bool,
}
impl RunReport {
	pub fn is_balanced(&self) -> bool {
		self.processed
			== self.succeeded_by_regeneration + self.succeeded_by_conversion + self.failed
			&& self.discovered == self.processed + self.skipped_no_text + self.unprocessed
	}

	/// Adds the counters of one finished batch.
	fn absorb(&mut self, batch: &RunReport) {
		self.cleared += batch.cleared;
		self.processed += batch.processed;
		self.succeeded_by_regeneration += batch.succeeded_by_regeneration;
		self.succeeded_by_conversion += batch.succeeded_by_conversion;
		self.failed += batch.failed;
		self.skipped_no_text += batch.skipped_no_text;
		self.batches_completed += 1;
	}

	/// Rows that started mismatching after discovery counted them raise `discovered`.
	fn settle(&mut self) {
		let reached = self.processed + self.skipped_no_text;

		self.discovered = self.discovered.max(reached);
		self.unprocessed = self.discovered - reached;
	}
}

/// A run that stopped early. `report` covers only the batches that finished before the failure.
#[derive(Debug, thiserror::Error)]
#[error("Reconciliation aborted after {} batches: {source}", report.batches_completed)]
pub struct RunFailure {
	pub report: RunReport,
	#[source]
	pub source: Error,
}

/// Cooperative stop signal, checked before each batch.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);
impl CancelFlag {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn cancel(&self) {
		self.0.store(true, Ordering::SeqCst);
	}

	pub fn is_cancelled(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}
}

/// What a run will touch. Counts come from the store; only a sampled discovery holds records.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
	pub by_dimension: BTreeMap<u32, u64>,
	pub sampled: bool,
	sample: Vec<EmbeddingRecord>,
}
impl Discovery {
	pub fn discovered(&self) -> u64 {
		self.by_dimension.values().sum()
	}
}

enum Repair {
	Regenerated,
	Converted,
	Failed,
}

pub struct Reconciler {
	store: Arc<dyn MemoryStore>,
	embedder: Arc<Embedder>,
	search_breaker: Arc<CircuitBreaker>,
	write_breaker: Arc<CircuitBreaker>,
	settings: ReconcileSettings,
}
impl Reconciler {
	pub fn new(
		store: Arc<dyn MemoryStore>,
		embedder: Arc<Embedder>,
		search_breaker: Arc<CircuitBreaker>,
		write_breaker: Arc<CircuitBreaker>,
		settings: ReconcileSettings,
	) -> Self {
		Self { store, embedder, search_breaker, write_breaker, settings }
	}

	pub fn settings(&self) -> &ReconcileSettings {
		&self.settings
	}

	/// Counts records to repair. Servers without `vector_dims` get a bounded sample filtered
	/// here instead.
	pub async fn discover(&self) -> Result<Discovery> {
		let target_dim = self.settings.target_dim;
		let only_dims = self.settings.outdated_dims.as_slice();
		let result =
			self.search_breaker.call(|| self.store.count_mismatched(target_dim, only_dims)).await;
		let discovery = match result {
			Ok(by_dimension) => Discovery { by_dimension, sampled: false, sample: Vec::new() },
			Err(Error::Unsupported { message }) => {
				let limit = self.settings.discovery_sample_limit;

				tracing::warn!(
					error = %message,
					limit,
					"Store cannot compute vector widths. Falling back to a bounded sample."
				);

				let sample =
					self.search_breaker.call(|| self.store.sample_embeddings(limit)).await?;
				let sample: Vec<EmbeddingRecord> = sample
					.into_iter()
					.filter(|record| {
						let dim = record.dimension();

						dim != target_dim && (only_dims.is_empty() || only_dims.contains(&dim))
					})
					.collect();
				let mut by_dimension = BTreeMap::new();

				for record in &sample {
					*by_dimension.entry(record.dimension()).or_insert(0) += 1;
				}

				Discovery { by_dimension, sampled: true, sample }
			},
			Err(err) => return Err(err),
		};

		tracing::info!(
			discovered = discovery.discovered(),
			sampled = discovery.sampled,
			by_dimension = ?discovery.by_dimension,
			target_dim,
			"Discovery finished."
		);

		Ok(discovery)
	}

	pub async fn run(&self, cancel: &CancelFlag) -> Result<RunReport, RunFailure> {
		let discovery = self
			.discover()
			.await
			.map_err(|source| RunFailure { report: RunReport::default(), source })?;
		let mut report = RunReport {
			discovered: discovery.discovered(),
			by_dimension: discovery.by_dimension.clone(),
			sampled: discovery.sampled,
			..RunReport::default()
		};
		let outcome = if discovery.sampled {
			self.run_sample(&discovery.sample, cancel, &mut report).await
		} else {
			self.run_paged(cancel, &mut report).await
		};

		report.settle();

		if let Err(source) = outcome {
			tracing::error!(
				error = %source,
				batches_completed = report.batches_completed,
				unprocessed = report.unprocessed,
				"Store unreachable. Aborting reconciliation."
			);

			return Err(RunFailure { report, source });
		}

		tracing::info!(
			discovered = report.discovered,
			cleared = report.cleared,
			regenerated = report.succeeded_by_regeneration,
			converted = report.succeeded_by_conversion,
			failed = report.failed,
			skipped_no_text = report.skipped_no_text,
			unprocessed = report.unprocessed,
			batches_completed = report.batches_completed,
			"Reconciliation finished."
		);

		Ok(report)
	}

	async fn run_sample(
		&self,
		records: &[EmbeddingRecord],
		cancel: &CancelFlag,
		report: &mut RunReport,
	) -> Result<()> {
		for (index, batch) in records.chunks(self.settings.batch_size).enumerate() {
			if stop_requested(cancel, report) {
				break;
			}

			self.run_batch(index, batch, report).await?;
		}

		Ok(())
	}

	/// Walks mismatched records one keyset page per batch, so at most one batch of vectors is
	/// held at a time.
	async fn run_paged(&self, cancel: &CancelFlag, report: &mut RunReport) -> Result<()> {
		let target_dim = self.settings.target_dim;
		let only_dims = self.settings.outdated_dims.as_slice();
		let limit = u32::try_from(self.settings.batch_size).unwrap_or(u32::MAX);
		let mut after = None;
		let mut index = 0;

		loop {
			if stop_requested(cancel, report) {
				break;
			}

			let page = self
				.search_breaker
				.call(|| self.store.find_mismatched(target_dim, only_dims, after, limit))
				.await?;
			let Some(last) = page.last() else {
				break;
			};

			after = Some(last.id);

			self.run_batch(index, &page, report).await?;

			index += 1;
		}

		Ok(())
	}

	/// Counts into a batch-local report that joins `report` only once the batch finishes. Only
	/// store connectivity failures escape; everything else is counted.
	async fn run_batch(
		&self,
		index: usize,
		batch: &[EmbeddingRecord],
		report: &mut RunReport,
	) -> Result<()> {
		let ids: Vec<Uuid> = batch.iter().map(|record| record.id).collect();
		let mut delta = RunReport::default();

		match self.write_breaker.call(|| self.store.clear_embeddings(&ids)).await {
			Ok(cleared) => delta.cleared = cleared,
			Err(err) if err.is_store_connectivity() => return Err(err),
			Err(err) => {
				tracing::warn!(
					error = %err,
					batch = index,
					size = batch.len(),
					"Pre-clear failed. Counting the batch as failed."
				);

				delta.processed = batch.len() as u64;
				delta.failed = batch.len() as u64;

				report.absorb(&delta);

				return Ok(());
			},
		}

		for record in batch {
			let Some(text) = record.content.extract_text() else {
				delta.skipped_no_text += 1;

				continue;
			};

			match self.repair(record, &text).await? {
				Repair::Regenerated => delta.succeeded_by_regeneration += 1,
				Repair::Converted => delta.succeeded_by_conversion += 1,
				Repair::Failed => delta.failed += 1,
			}

			delta.processed += 1;
		}

		report.absorb(&delta);

		tracing::debug!(batch = index, size = batch.len(), "Batch reconciled.");

		Ok(())
	}

	async fn repair(&self, record: &EmbeddingRecord, text: &str) -> Result<Repair> {
		let target_dim = self.settings.target_dim as usize;

		if !self.embedder.is_disabled() {
			match self.embedder.embed(text).await {
				Ok(vector) if vector.len() == target_dim => {
					return self.write(record.id, &vector, Repair::Regenerated).await;
				},
				Ok(vector) => {
					tracing::debug!(
						memory_id = %record.id,
						returned_dim = vector.len(),
						target_dim,
						"Provider returned the wrong width. Trying conversion."
					);
				},
				Err(err) => {
					tracing::debug!(
						memory_id = %record.id,
						error = %err,
						"Regeneration failed. Trying conversion."
					);
				},
			}
		}

		let Some(converted) =
			convert::convert_dimension(&record.embedding, target_dim, self.settings.pad_indivisible)
		else {
			tracing::warn!(
				memory_id = %record.id,
				original_dim = record.embedding.len(),
				target_dim,
				"No conversion applies. Leaving the embedding cleared."
			);

			return Ok(Repair::Failed);
		};

		self.write(record.id, &converted, Repair::Converted).await
	}

	async fn write(&self, id: Uuid, embedding: &[f32], on_success: Repair) -> Result<Repair> {
		match self.write_breaker.call(|| self.store.update_embedding(id, embedding)).await {
			Ok(()) => Ok(on_success),
			Err(err) if err.is_store_connectivity() => Err(err),
			Err(err) => {
				tracing::warn!(memory_id = %id, error = %err, "Embedding write failed.");

				Ok(Repair::Failed)
			},
		}
	}
}

fn stop_requested(cancel: &CancelFlag, report: &mut RunReport) -> bool {
	if !cancel.is_cancelled() {
		return false;
	}

	report.cancelled = true;

	tracing::warn!(batches_completed = report.batches_completed, "Reconciliation cancelled.");

	true
}
