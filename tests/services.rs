mod common;

use std::cell::Cell;
use std::time::Duration;

use altscribe::pipeline::PipelineOptions;
use altscribe::services::{restart_store, run_interruptible, RunEnd};
use altscribe::RowStore;

use common::*;

fn alt(store: &RowStore, id: usize) -> &str {
    store.row(id).and_then(|r| r.alt_text.as_deref()).unwrap_or("")
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_saves_rows_resolved_since_last_flush() {
    let dir = temp_dir();
    let a = "https://site.test/a.jpg";
    let b = "https://site.test/b.jpg";
    let path = write_table(
        dir.path(),
        "site.csv",
        &[
            ("https://site.test/one", a),
            ("https://site.test/two", a),
            ("https://site.test/one", b),
        ],
    );

    let fakes = Fakes::new(
        FakeScraper::default(),
        FakeFetcher::default(),
        RecordingVision::stalling_from(1),
    );
    let mut pipeline = fakes.pipeline().with_options(PipelineOptions {
        batch_capacity: 1,
        ..Default::default()
    });
    let mut store = RowStore::load(&path).unwrap();

    let end = run_interruptible(&mut pipeline, &mut store, tokio::time::sleep(Duration::from_secs(60)))
        .await
        .unwrap();

    let RunEnd::Interrupted(summary) = end else {
        panic!("expected an interrupted run, got {:?}", end);
    };
    assert_eq!(summary.total, 3);
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.last_row, Some(1));
    assert_eq!(fakes.vision.calls(), vec![vec![a.to_string()], vec![b.to_string()]]);

    // The duplicate on row 1 was resolved after the last flush saved
    let saved = RowStore::load(&path).unwrap();
    assert_eq!(alt(&saved, 0), alt_for(a));
    assert_eq!(alt(&saved, 1), alt_for(a));
    assert_eq!(alt(&saved, 2), "");
}

#[tokio::test]
async fn test_run_without_interrupt_finishes() {
    let dir = temp_dir();
    let path = write_table(dir.path(), "site.csv", &[("https://site.test/", "https://site.test/a.jpg")]);

    let fakes = Fakes::default();
    let mut pipeline = fakes.pipeline();
    let mut store = RowStore::load(&path).unwrap();

    let end = run_interruptible(&mut pipeline, &mut store, std::future::pending())
        .await
        .unwrap();

    assert!(matches!(end, RunEnd::Finished(summary) if summary.processed == 1));
}

#[test]
fn test_restart_without_existing_text_does_not_ask() {
    let dir = temp_dir();
    let path = write_table(dir.path(), "site.csv", &[("https://site.test/", "https://site.test/a.jpg")]);
    let mut store = RowStore::load(&path).unwrap();

    let cleared = restart_store(&mut store, |_| panic!("nothing to delete")).unwrap();
    assert_eq!(cleared, Some(0));
}

#[test]
fn test_restart_asks_with_existing_count() {
    let dir = temp_dir();
    let path = dir.path().join("site.csv");
    let content = "Source,Destination,ALT text\n\
                   https://site.test/,https://site.test/a.jpg,A red barn\n\
                   https://site.test/,https://site.test/b.jpg,\n";
    std::fs::write(&path, content).unwrap();

    let asked = Cell::new(None);
    let mut store = RowStore::load(&path).unwrap();
    let declined = restart_store(&mut store, |existing| {
        asked.set(Some(existing));
        Ok(false)
    })
    .unwrap();
    assert_eq!(declined, None);
    assert_eq!(asked.get(), Some(1));
    assert_eq!(alt(&store, 0), "A red barn");
    assert_eq!(std::fs::read_to_string(&path).unwrap(), content);

    let cleared = restart_store(&mut store, |_| Ok(true)).unwrap();
    assert_eq!(cleared, Some(1));
    assert_eq!(RowStore::load(&path).unwrap().processed_count(), 0);
}
