mod common;

use std::sync::Arc;

use altscribe::config::Settings;
use altscribe::watch::{JobStatus, WatchOptions, WatchService};

use common::*;

fn service(dir: &std::path::Path, fakes: &Fakes, cleanup: bool) -> WatchService {
    let options = WatchOptions {
        watch_dir: dir.join("watched"),
        output_dir: dir.join("output"),
        cleanup,
    };
    std::fs::create_dir_all(&options.watch_dir).unwrap();
    WatchService::new(
        options,
        Settings::with_data_dir(dir.to_path_buf()),
        Arc::new(FakeFactory(fakes.collaborators())),
    )
}

#[tokio::test]
async fn test_existing_tables_processed_in_order() {
    let dir = temp_dir();
    let fakes = Fakes::default();
    let watch = service(dir.path(), &fakes, false);
    let watched = dir.path().join("watched");

    write_table(&watched, "b-site.csv", &[("https://b.test/", "https://b.test/one.jpg")]);
    write_table(&watched, "a-site.csv", &[("https://a.test/", "https://a.test/one.jpg")]);

    assert_eq!(watch.enqueue_existing().await.unwrap(), 2);
    assert_eq!(watch.enqueue_existing().await.unwrap(), 0);
    assert_eq!(watch.drain().await, 2);

    assert_eq!(
        fakes.vision.calls(),
        vec![
            vec!["https://a.test/one.jpg".to_string()],
            vec!["https://b.test/one.jpg".to_string()],
        ]
    );

    let output = dir.path().join("output");
    for name in [
        "a-site-original-updated.csv",
        "a-site-simplified.csv",
        "a-site-filenames-only.csv",
        "b-site-simplified.csv",
    ] {
        assert!(output.join(name).exists(), "missing {}", name);
    }
    let simplified = std::fs::read_to_string(output.join("a-site-simplified.csv")).unwrap();
    assert!(simplified.contains("https://a.test/one.jpg,Alt text for one.jpg"));

    let jobs = watch.queue().jobs().await;
    assert!(jobs.iter().all(|job| job.status == JobStatus::Completed));
    assert_eq!(jobs[0].outputs.len(), 3);
    assert!(watched.join("a-site.csv").exists());
}

#[tokio::test]
async fn test_sidecar_restart_and_cleanup() {
    let dir = temp_dir();
    let fakes = Fakes::default();
    let watch = service(dir.path(), &fakes, true);
    let watched = dir.path().join("watched");

    let input = watched.join("site.csv");
    std::fs::write(
        &input,
        "Source,Destination,ALT text\nhttps://s.test/,https://s.test/old.jpg,Stale text\n",
    )
    .unwrap();
    std::fs::write(watched.join("site.yaml"), "restart: true\n").unwrap();

    watch.enqueue_existing().await.unwrap();
    watch.drain().await;

    assert_eq!(fakes.vision.images_sent(), 1);
    assert!(!input.exists());
    assert!(!watched.join("site.yaml").exists());

    let updated = std::fs::read_to_string(dir.path().join("output/site-original-updated.csv")).unwrap();
    assert!(updated.contains("Alt text for old.jpg"));
    assert!(!updated.contains("Stale text"));
}

#[tokio::test]
async fn test_bad_table_fails_job_and_queue_continues() {
    let dir = temp_dir();
    let fakes = Fakes::default();
    let watch = service(dir.path(), &fakes, true);
    let watched = dir.path().join("watched");

    std::fs::write(watched.join("a-bad.csv"), "Page,Image\nx,y\n").unwrap();
    write_table(&watched, "b-good.csv", &[("https://g.test/", "https://g.test/pic.jpg")]);

    watch.enqueue_existing().await.unwrap();
    assert_eq!(watch.drain().await, 2);

    let jobs = watch.queue().jobs().await;
    assert_eq!(jobs[0].status, JobStatus::Failed);
    assert!(jobs[0].error.as_deref().unwrap_or("").contains("Destination"));
    assert_eq!(jobs[1].status, JobStatus::Completed);
    // Failed inputs are left in place
    assert!(watched.join("a-bad.csv").exists());
    assert!(!watched.join("b-good.csv").exists());
}
