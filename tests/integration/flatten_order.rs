use proptest::prelude::*;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use stitch::io::TokioFileReader;
use stitch::{DedupPolicy, Descriptor, Flattener};

use crate::integration::support::{builder, file_names, Site};

fn diamond() -> Site {
    let site = Site::new();
    site.markup("r.html", &["markup a.html", "markup b.html"])
        .markup("a.html", &["text l.txt"])
        .markup("b.html", &["text l.txt"])
        .write("l.txt", "l");
    site
}

#[tokio::test]
async fn diamond_leaf_is_emitted_per_path_by_default() {
    let site = diamond();
    let snapshot = builder(&site, Arc::new(TokioFileReader))
        .resolve_root(&Descriptor::named("r.html", "markup"))
        .await;

    let order = stitch::flatten(&snapshot);
    assert_eq!(
        file_names(&order),
        vec!["l.txt", "a.html", "l.txt", "b.html", "r.html"]
    );
}

#[tokio::test]
async fn diamond_leaf_is_emitted_once_before_first_dependent() {
    let site = diamond();
    let snapshot = builder(&site, Arc::new(TokioFileReader))
        .resolve_root(&Descriptor::named("r.html", "markup"))
        .await;

    let order = Flattener::new(DedupPolicy::Once).flatten(&snapshot);
    assert_eq!(file_names(&order), vec!["l.txt", "a.html", "b.html", "r.html"]);
}

#[tokio::test]
async fn emitted_set_carries_across_roots() {
    let site = Site::new();
    site.markup("one.html", &["style base.css"])
        .markup("two.html", &["style base.css", "text extra.txt"])
        .write("base.css", "*{}")
        .write("extra.txt", "x");

    let builder = builder(&site, Arc::new(TokioFileReader));
    let snapshots = builder
        .build(&[
            Descriptor::named("one.html", "markup"),
            Descriptor::named("two.html", "markup"),
        ])
        .await;

    let mut flattener = Flattener::new(DedupPolicy::Once);
    let first = flattener.flatten(&snapshots[0]);
    let second = flattener.flatten(&snapshots[1]);
    assert_eq!(file_names(&first), vec!["base.css", "one.html"]);
    assert_eq!(file_names(&second), vec!["extra.txt", "two.html"]);
}

/// Edges only point from a lower index to a higher one, so the graph is acyclic.
fn dag() -> impl Strategy<Value = (usize, Vec<bool>)> {
    (1usize..7).prop_flat_map(|n| (Just(n), proptest::collection::vec(any::<bool>(), n * n)))
}

fn write_dag(site: &Site, n: usize, edges: &[bool]) {
    for i in 0..n {
        let deps: Vec<String> = (i + 1..n)
            .filter(|j| edges[i * n + j])
            .map(|j| format!("markup n{}.html", j))
            .collect();
        let deps: Vec<&str> = deps.iter().map(String::as_str).collect();
        site.markup(&format!("n{}.html", i), &deps);
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 48,
        ..ProptestConfig::default()
    })]

    #[test]
    fn flatten_places_every_node_after_its_dependencies((n, edges) in dag(), once in any::<bool>()) {
        let site = Site::new();
        write_dag(&site, n, &edges);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let snapshot = runtime.block_on(
            builder(&site, Arc::new(TokioFileReader))
                .resolve_root(&Descriptor::named("n0.html", "markup")),
        );
        prop_assert!(snapshot.errors().is_empty());

        let policy = if once { DedupPolicy::Once } else { DedupPolicy::PerPath };
        let order = Flattener::new(policy).flatten(&snapshot);

        prop_assert_eq!(order.last().map(|n| n.path.clone()), Some(Some(site.path("n0.html"))));
        let mut first_seen: HashMap<PathBuf, usize> = HashMap::new();
        for (index, node) in order.iter().enumerate() {
            for child in &node.children {
                let child_path = child.path.clone().unwrap();
                let seen = first_seen.get(&child_path).copied();
                prop_assert!(
                    seen.map_or(false, |at| at < index),
                    "{} emitted before its dependency {}",
                    node.label(),
                    child.label()
                );
            }
            first_seen.entry(node.path.clone().unwrap()).or_insert(index);
        }
    }
}
