use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use stitch::io::TokioFileReader;
use stitch::{Descriptor, FileNotifier, Node, RootPhase, TreeSnapshot};

use crate::integration::support::{live, live_with, ScriptedReader, Site, SlowNotifier};

type Seen = Arc<Mutex<Vec<(u64, Option<PathBuf>)>>>;

fn recorder() -> (
    Seen,
    impl Fn(Arc<TreeSnapshot>, Option<Arc<Node>>) + Send + Sync + 'static,
) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback = move |snapshot: Arc<TreeSnapshot>, changed: Option<Arc<Node>>| {
        sink.lock()
            .push((snapshot.generation(), changed.and_then(|n| n.path.clone())));
    };
    (seen, callback)
}

/// m -> {x, y}, x -> z, y -> z
fn shared_leaf_site() -> Site {
    let site = Site::new();
    site.markup("m.html", &["markup x.html", "markup y.html"])
        .markup("x.html", &["text z.txt"])
        .markup("y.html", &["text z.txt"])
        .write("z.txt", "z");
    site
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn touching_shared_leaf_rebuilds_once_with_one_os_watch() {
    let site = shared_leaf_site();
    let live = live(&site, Arc::new(TokioFileReader));
    let root = Descriptor::named("m.html", "markup");
    let (seen, callback) = recorder();

    live.controller.watch(root.clone(), callback).unwrap();
    live.controller.settle().await;
    assert_eq!(live.notifier.watch_count(), 4);
    assert_eq!(live.registry.listener_ids(&site.path("z.txt")).len(), 1);

    site.write("z.txt", "zz");
    assert!(live.notifier.touch(&site.path("z.txt")));
    live.controller.settle().await;

    let seen = seen.lock().clone();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1].1, Some(site.path("z.txt")));
    assert!(seen[1].0 > seen[0].0);

    assert!(live.notifier.is_watching(&site.path("z.txt")));
    assert_eq!(live.notifier.watch_count(), 4);
    assert_eq!(live.registry.listener_ids(&site.path("z.txt")).len(), 1);
    assert_eq!(live.controller.phase(&root), RootPhase::Idle);

    let snapshot = live.controller.snapshot(&root).unwrap();
    assert_eq!(snapshot.root().children[0].children[0].text(), Some("zz"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unwatched_root_gets_no_callback_but_shared_file_stays_watched() {
    let site = Site::new();
    site.markup("one.html", &["text shared.txt"])
        .markup("two.html", &["text shared.txt"])
        .write("shared.txt", "s");
    let live = live(&site, Arc::new(TokioFileReader));
    let one = Descriptor::named("one.html", "markup");
    let two = Descriptor::named("two.html", "markup");
    let (one_seen, one_callback) = recorder();
    let (two_seen, two_callback) = recorder();

    let one_id = live.controller.watch(one.clone(), one_callback).unwrap();
    live.controller.watch(two.clone(), two_callback).unwrap();
    live.controller.settle().await;
    assert_eq!(live.registry.listener_ids(&site.path("shared.txt")).len(), 2);

    assert!(live.controller.unwatch(&one, one_id));
    assert!(!live.notifier.is_watching(&site.path("one.html")));
    assert!(live.notifier.is_watching(&site.path("shared.txt")));

    live.notifier.touch(&site.path("shared.txt"));
    live.controller.settle().await;

    assert_eq!(one_seen.lock().len(), 1);
    assert_eq!(two_seen.lock().len(), 2);
    assert!(live.controller.snapshot(&one).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unwatch_during_first_resolution_discards_result() {
    let site = shared_leaf_site();
    let reader = ScriptedReader::new();
    let gate = reader.gate(&site.path("m.html"));
    let live = live(&site, reader.clone());
    let root = Descriptor::named("m.html", "markup");
    let (seen, callback) = recorder();

    let id = live.controller.watch(root.clone(), callback).unwrap();
    reader.wait_for_read(&site.path("m.html")).await;
    assert_eq!(live.controller.phase(&root), RootPhase::Resolving);

    assert!(live.controller.unwatch(&root, id));
    gate.add_permits(1);
    live.controller.settle().await;

    assert!(seen.lock().is_empty());
    assert_eq!(live.notifier.watch_count(), 0);
    assert!(live.registry.watched_paths().is_empty());
    assert!(live.controller.snapshot(&root).is_none());
    assert_eq!(live.controller.phase(&root), RootPhase::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropped_dependency_loses_its_watch() {
    let site = Site::new();
    site.markup("page.html", &["text old.txt"])
        .write("old.txt", "o")
        .write("new.txt", "n");
    let live = live(&site, Arc::new(TokioFileReader));
    let root = Descriptor::named("page.html", "markup");
    let (seen, callback) = recorder();

    live.controller.watch(root.clone(), callback).unwrap();
    live.controller.settle().await;
    assert!(live.notifier.is_watching(&site.path("old.txt")));

    site.markup("page.html", &["text new.txt"]);
    live.notifier.touch(&site.path("page.html"));
    live.controller.settle().await;

    assert_eq!(seen.lock().len(), 2);
    assert!(!live.notifier.is_watching(&site.path("old.txt")));
    assert!(live.notifier.is_watching(&site.path("new.txt")));
    assert_eq!(
        live.registry.watched_paths(),
        vec![site.path("new.txt"), site.path("page.html")]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_file_is_watched_and_creation_rebuilds() {
    let site = Site::new();
    site.markup("page.html", &["text later.txt"]);
    let live = live(&site, Arc::new(TokioFileReader));
    let root = Descriptor::named("page.html", "markup");
    let (seen, callback) = recorder();

    live.controller.watch(root.clone(), callback).unwrap();
    live.controller.settle().await;
    let first = live.controller.snapshot(&root).unwrap();
    assert_eq!(first.errors().len(), 1);
    assert!(live.notifier.is_watching(&site.path("later.txt")));

    site.write("later.txt", "here now");
    live.notifier.touch(&site.path("later.txt"));
    live.controller.settle().await;

    assert_eq!(seen.lock().len(), 2);
    let second = live.controller.snapshot(&root).unwrap();
    assert!(second.errors().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn overlapping_rebuilds_leave_one_listener_per_path() {
    let site = Site::new();
    site.markup("page.html", &["text old.txt"])
        .write("old.txt", "o")
        .write("new.txt", "n");
    let slow_path = site.path("new.txt");
    let live = live_with(&site, Arc::new(TokioFileReader), move |notifier| {
        Arc::new(SlowNotifier::new(
            notifier,
            slow_path,
            Duration::from_millis(300),
        )) as Arc<dyn FileNotifier>
    });
    let root = Descriptor::named("page.html", "markup");
    let (seen, callback) = recorder();

    let id = live.controller.watch(root.clone(), callback).unwrap();
    live.controller.settle().await;

    // The second change lands while the first rebuild is still installing new.txt.
    site.markup("page.html", &["text new.txt"]);
    live.notifier.touch(&site.path("page.html"));
    tokio::time::sleep(Duration::from_millis(100)).await;
    live.notifier.touch(&site.path("page.html"));
    live.controller.settle().await;

    assert_eq!(live.registry.listener_ids(&site.path("page.html")).len(), 1);
    assert_eq!(live.registry.listener_ids(&site.path("new.txt")).len(), 1);
    assert!(!live.registry.is_watched(&site.path("old.txt")));

    let before = seen.lock().len();
    live.notifier.touch(&site.path("page.html"));
    live.controller.settle().await;
    assert_eq!(seen.lock().len(), before + 1);

    assert!(live.controller.unwatch(&root, id));
    assert!(live.registry.watched_paths().is_empty());
    assert_eq!(live.notifier.watch_count(), 0);
}
