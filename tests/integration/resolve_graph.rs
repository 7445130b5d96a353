use std::sync::Arc;

use stitch::io::TokioFileReader;
use stitch::tree::VisitedSet;
use stitch::{Descriptor, NodeError};

use crate::integration::support::{resolver, ScriptedReader, Site};

#[tokio::test]
async fn cycle_is_marked_on_the_revisiting_node_only() {
    // a -> b -> {a, c}
    let site = Site::new();
    site.markup("a.html", &["markup b.html"])
        .markup("b.html", &["markup a.html", "text c.txt"])
        .write("c.txt", "leaf");

    let root = resolver(&site, Arc::new(TokioFileReader))
        .resolve_root(&Descriptor::named("a.html", "markup"))
        .await;

    assert!(root.is_ok());
    let b = &root.children[0];
    assert!(b.is_ok());
    assert_eq!(b.children.len(), 2);

    let revisit = &b.children[0];
    assert_eq!(
        revisit.error,
        Some(NodeError::CyclicDependency {
            path: site.path("a.html")
        })
    );
    assert!(revisit.children.is_empty());
    assert_eq!(b.children[1].text(), Some("leaf"));
}

#[tokio::test]
async fn self_reference_is_a_cycle() {
    let site = Site::new();
    site.markup("loop.html", &["markup loop.html"]);

    let root = resolver(&site, Arc::new(TokioFileReader))
        .resolve_root(&Descriptor::named("loop.html", "markup"))
        .await;

    assert!(root.is_ok());
    assert!(root.children[0].error.as_ref().unwrap().is_cycle());
}

#[tokio::test]
async fn shared_file_in_sibling_branches_is_not_a_cycle() {
    let site = Site::new();
    site.markup("r.html", &["markup a.html", "markup b.html"])
        .markup("a.html", &["text l.txt"])
        .markup("b.html", &["text l.txt"])
        .write("l.txt", "l");

    let root = resolver(&site, Arc::new(TokioFileReader))
        .resolve_root(&Descriptor::named("r.html", "markup"))
        .await;

    for branch in &root.children {
        assert!(branch.children[0].is_ok(), "{:?}", branch.children[0].error);
    }
}

#[tokio::test]
async fn node_errors_do_not_stop_siblings() {
    let site = Site::new();
    site.markup(
        "page.html",
        &[
            "video intro.mp4",
            "text absent.txt",
            "markup broken.html",
            "style site.css",
        ],
    )
    .write("intro.mp4", "binary")
    .write("broken.html", "@require only-one-part\n")
    .write("site.css", "body {}");

    let reader = ScriptedReader::new();
    let root = resolver(&site, reader.clone())
        .resolve_root(&Descriptor::named("page.html", "markup"))
        .await;

    let [video, absent, broken, style] = &root.children[..] else {
        panic!("expected four children, got {}", root.children.len());
    };
    assert_eq!(
        video.error,
        Some(NodeError::UnhandledType {
            kind: "video".to_string()
        })
    );
    assert_eq!(reader.reads(&site.path("intro.mp4")), 0);
    assert!(matches!(absent.error, Some(NodeError::ReadFailure { .. })));
    assert!(matches!(
        broken.error,
        Some(NodeError::HandlerException { .. })
    ));
    assert!(broken.children.is_empty());
    assert!(style.is_ok());
    assert!(root.is_ok());
}

#[tokio::test]
async fn transient_read_failure_is_retried() {
    let site = Site::new();
    site.write("note.txt", "contents");
    let reader = ScriptedReader::new();
    reader.fail_next(&site.path("note.txt"), 1);

    let node = resolver(&site, reader.clone())
        .resolve_root(&Descriptor::named("note.txt", "text"))
        .await;

    assert!(node.is_ok());
    assert_eq!(node.payload_as::<String>().map(String::as_str), Some("contents"));
    assert_eq!(reader.reads(&site.path("note.txt")), 2);
}

#[tokio::test]
async fn permanent_read_failure_records_error_and_no_children() {
    let site = Site::new();
    site.markup("page.html", &["text child.txt"]).write("child.txt", "c");
    let reader = ScriptedReader::new();
    reader.fail_next(&site.path("page.html"), 2);

    let node = resolver(&site, reader.clone())
        .resolve_root(&Descriptor::named("page.html", "markup"))
        .await;

    match &node.error {
        Some(NodeError::ReadFailure { path, attempts, .. }) => {
            assert_eq!(path, &site.path("page.html"));
            assert_eq!(*attempts, 2);
        }
        other => panic!("expected a read failure, got {:?}", other),
    }
    assert!(node.children.is_empty());
    assert_eq!(reader.reads(&site.path("page.html")), 2);
    assert_eq!(reader.reads(&site.path("child.txt")), 0);
}

#[tokio::test]
async fn children_resolve_against_their_parent_directory() {
    let site = Site::new();
    site.markup("pages/index.html", &["script lib/app.js"])
        .markup("pages/lib/app.js", &["text ../../shared/banner.txt"])
        .write("shared/banner.txt", "hi");

    let root = resolver(&site, Arc::new(TokioFileReader))
        .resolve_root(&Descriptor::named("pages/index.html", "markup"))
        .await;

    let app = &root.children[0];
    assert_eq!(app.path.as_deref(), Some(site.path("pages/lib/app.js").as_path()));
    let banner = &app.children[0];
    assert_eq!(banner.path.as_deref(), Some(site.path("shared/banner.txt").as_path()));
    assert_eq!(banner.text(), Some("hi"));
}

#[tokio::test]
async fn inline_root_resolves_children_without_reading_itself() {
    let site = Site::new();
    site.write("part.txt", "part");

    let inline = Descriptor::inline("snippet", "markup", "@require text part.txt\n");
    let root = resolver(&site, Arc::new(TokioFileReader))
        .resolve(&inline, &VisitedSet::new())
        .await;

    assert!(root.is_root);
    assert!(root.path.is_none());
    assert!(root.content_hash.is_some());
    assert_eq!(root.children[0].text(), Some("part"));
    assert!(!root.children[0].is_root);
}
