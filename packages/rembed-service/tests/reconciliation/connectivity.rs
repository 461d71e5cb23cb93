use rembed_service::{CancelFlag, Error};

use super::{harness, test_config};

#[tokio::test]
async fn connectivity_loss_ends_the_run_with_a_partial_report() {
	let h = harness(test_config(1536), |_| Ok(vec![0.4; 1536]));

	h.store.insert_many(250, 384);
	h.store.lose_connection_after_clears(2);

	let failure = h
		.service
		.reconciler()
		.run(&CancelFlag::new())
		.await
		.expect_err("A lost store must abort the run.");
	let report = &failure.report;

	assert!(matches!(failure.source, Error::StoreConnectivity { .. }));
	assert_eq!(report.discovered, 250);
	assert_eq!(report.batches_completed, 2);
	assert_eq!(report.cleared, 100);
	assert_eq!(report.processed, 100);
	assert_eq!(report.succeeded_by_regeneration, 100);
	assert_eq!(report.failed, 0);
	assert_eq!(report.unprocessed, 150);
	assert!(report.is_balanced());
	assert!(!report.cancelled);
}

#[tokio::test]
async fn connectivity_loss_during_a_write_keeps_only_finished_batches() {
	let h = harness(test_config(1536), |_| Ok(vec![0.4; 1536]));

	h.store.insert_many(250, 384);
	// The 110th write lands in the third batch.
	h.store.lose_connection_after_updates(109);

	let failure = h
		.service
		.reconciler()
		.run(&CancelFlag::new())
		.await
		.expect_err("A lost store must abort the run.");
	let report = &failure.report;

	assert!(matches!(failure.source, Error::StoreConnectivity { .. }));
	assert_eq!(h.provider.calls(), 110);
	assert_eq!(report.discovered, 250);
	assert_eq!(report.batches_completed, 2);
	assert_eq!(report.cleared, 100);
	assert_eq!(report.processed, 100);
	assert_eq!(report.succeeded_by_regeneration, 100);
	assert_eq!(report.failed, 0);
	assert_eq!(report.unprocessed, 150);
	assert!(report.is_balanced());
}

#[tokio::test]
async fn unreachable_store_fails_discovery() {
	let h = harness(test_config(1536), |_| Ok(vec![0.4; 1536]));

	h.store.offline.store(true, std::sync::atomic::Ordering::SeqCst);

	let failure = h
		.service
		.reconciler()
		.run(&CancelFlag::new())
		.await
		.expect_err("Discovery needs the store.");

	assert!(matches!(failure.source, Error::StoreConnectivity { .. }));
	assert_eq!(failure.report.discovered, 0);
	assert_eq!(h.provider.calls(), 0);
}
