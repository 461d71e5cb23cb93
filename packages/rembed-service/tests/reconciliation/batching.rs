use rembed_service::{CancelFlag, RunReport};

use super::{Event, harness, seeded, test_config};

#[tokio::test]
async fn batches_are_cleared_before_any_regeneration() {
	let h = harness(test_config(1536), |_| Ok(vec![0.25; 1536]));
	let ids = h.store.insert_many(120, 384);
	let report = h
		.service
		.reconciler()
		.run(&CancelFlag::new())
		.await
		.expect("Reconciliation should finish.");

	assert_eq!(report.discovered, 120);
	assert_eq!(report.cleared, 120);
	assert_eq!(report.batches_completed, 3);
	assert_eq!(report.succeeded_by_regeneration, 120);
	assert_eq!(report.by_dimension.get(&384), Some(&120));
	assert!(report.is_balanced());

	let events = h.journal.events();
	let clears: Vec<(usize, usize)> = events
		.iter()
		.enumerate()
		.filter_map(|(at, event)| match event {
			Event::Clear(ids) => Some((at, ids.len())),
			_ => None,
		})
		.collect();

	// One clear, then an embed and an update per record.
	assert_eq!(clears, vec![(0, 50), (101, 50), (202, 20)]);

	let windows = events.split(|event| matches!(event, Event::Clear(_))).skip(1);

	for (batch, window) in windows.enumerate() {
		let embeds = window.iter().filter(|event| matches!(event, Event::Embed(_))).count();

		assert_eq!(embeds, [50, 50, 20][batch]);
	}

	for id in ids {
		assert_eq!(h.store.embedding(id).map(|vec| vec.len()), Some(1536));
	}
}

#[tokio::test]
async fn vectors_are_read_one_batch_at_a_time() {
	let h = harness(test_config(1536), |_| Ok(vec![0.25; 1536]));

	h.store.insert_many(70, 384);
	h.store.insert_many(50, 768);

	let report = h
		.service
		.reconciler()
		.run(&CancelFlag::new())
		.await
		.expect("Reconciliation should finish.");

	assert_eq!(report.discovered, 120);
	assert_eq!(report.by_dimension.get(&384), Some(&70));
	assert_eq!(report.by_dimension.get(&768), Some(&50));
	assert_eq!(report.batches_completed, 3);
	// The closing empty page ends the walk.
	assert_eq!(h.store.page_sizes(), vec![50, 50, 20, 0]);
	assert!(report.is_balanced());
}

#[tokio::test]
async fn second_run_discovers_nothing() {
	let h = harness(test_config(1536), |_| Ok(vec![0.5; 1536]));

	h.store.insert_many(30, 768);

	let reconciler = h.service.reconciler();
	let first = reconciler.run(&CancelFlag::new()).await.expect("First run should finish.");
	let second = reconciler.run(&CancelFlag::new()).await.expect("Second run should finish.");

	assert_eq!(first.discovered, 30);
	assert_eq!(second, RunReport::default());
}

#[tokio::test]
async fn already_aligned_records_are_left_alone() {
	let h = harness(test_config(1536), |_| Ok(vec![0.5; 1536]));
	let aligned =
		h.store.insert(serde_json::json!({ "text": "already fine" }), Some(seeded(1536, 1)));

	h.store.insert(serde_json::json!({ "text": "no vector yet" }), None);

	let report = h
		.service
		.reconciler()
		.run(&CancelFlag::new())
		.await
		.expect("Reconciliation should finish.");

	assert_eq!(report.discovered, 0);
	assert_eq!(h.provider.calls(), 0);
	assert_eq!(h.store.embedding(aligned), Some(seeded(1536, 1)));
}

#[tokio::test]
async fn cancellation_stops_between_batches() {
	let cancel = CancelFlag::new();
	let trigger = cancel.clone();
	let calls = std::sync::atomic::AtomicUsize::new(0);
	let h = harness(test_config(1536), move |_| {
		// Cancel while the second batch is still running.
		if calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 60 {
			trigger.cancel();
		}

		Ok(vec![0.5; 1536])
	});

	h.store.insert_many(120, 384);

	let report = h.service.reconciler().run(&cancel).await.expect("Cancelled runs still report.");

	assert!(report.cancelled);
	assert_eq!(report.batches_completed, 2);
	assert_eq!(report.processed, 100);
	assert_eq!(report.cleared, 100);
	assert_eq!(report.discovered, 120);
	assert_eq!(report.unprocessed, 20);
	assert_eq!(h.store.page_sizes(), vec![50, 50]);
	assert!(report.is_balanced());
}
