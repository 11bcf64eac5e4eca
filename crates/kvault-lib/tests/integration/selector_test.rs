use std::collections::BTreeSet;
use std::path::PathBuf;

use kvault_lib::{select, Manifest, PathSet, SelectionError};
use proptest::prelude::*;

use crate::common::Fixture;

fn set(paths: &[&PathBuf]) -> PathSet {
    paths.iter().map(|p| (*p).clone()).collect()
}

#[test]
fn test_include_then_exclude() {
    let fx = Fixture::new();
    let a = fx.write("notes/a.md", "a");
    let b = fx.write("notes/b.md", "b");
    fx.write("notes/c.txt", "c");

    let manifest = fx.manifest("src/notes/*.md\n!src/notes/b.md\n");
    assert_eq!(select(&manifest).unwrap(), set(&[&a]));
    assert!(b.exists());
}

#[test]
fn test_later_inclusion_readds_excluded_path() {
    let fx = Fixture::new();
    let a = fx.write("a.txt", "a");
    let b = fx.write("b.txt", "b");

    // Exclusions only remove what earlier lines added.
    let manifest = fx.manifest("!src/a.txt\nsrc/*.txt\n");
    assert_eq!(select(&manifest).unwrap(), set(&[&a, &b]));

    let manifest = fx.manifest("src/*.txt\n!src/a.txt\nsrc/a.txt\n");
    assert_eq!(select(&manifest).unwrap(), set(&[&a, &b]));
}

#[test]
fn test_directory_expands_to_leaves() {
    let fx = Fixture::new();
    let one = fx.write("photos/2023/one.jpg", "1");
    let two = fx.write("photos/2024/jan/two.jpg", "2");
    let three = fx.write("photos/three.jpg", "3");

    let manifest = fx.manifest("src/photos\n");
    let selected = select(&manifest).unwrap();
    assert_eq!(selected, set(&[&one, &two, &three]));
    assert!(selected.iter().all(|p| p.is_file()));

    // Excluding a directory removes everything beneath it.
    let manifest = fx.manifest("src/photos\n!src/photos/2024\n");
    assert_eq!(select(&manifest).unwrap(), set(&[&one, &three]));
}

#[test]
fn test_star_does_not_cross_directories() {
    let fx = Fixture::new();
    let top = fx.write("top.log", "t");
    fx.write("nested/deep.log", "d");

    let manifest = fx.manifest("src/*.log\n");
    assert_eq!(select(&manifest).unwrap(), set(&[&top]));
}

#[test]
fn test_absolute_patterns_ignore_manifest_dir() {
    let fx = Fixture::new();
    let a = fx.write("abs/a.txt", "a");

    let line = format!("{}/src/abs/*.txt\n", fx.root().display());
    let manifest = fx.manifest(&line);
    assert_eq!(select(&manifest).unwrap(), set(&[&a]));
}

#[test]
fn test_missing_matches_are_not_errors() {
    let fx = Fixture::new();
    let a = fx.write("a.txt", "a");

    let manifest = fx.manifest("src/a.txt\nsrc/nothing/*.txt\nsrc/missing.txt\n!src/gone\n");
    assert_eq!(select(&manifest).unwrap(), set(&[&a]));
}

#[test]
fn test_duplicates_collapse() {
    let fx = Fixture::new();
    let a = fx.write("a.txt", "a");

    let manifest = fx.manifest("src/a.txt\nsrc/*.txt\nsrc\n");
    assert_eq!(select(&manifest).unwrap(), set(&[&a]));
}

#[test]
fn test_invalid_line_is_fatal() {
    let fx = Fixture::new();
    fx.write("a.txt", "a");

    let manifest = fx.manifest("src/a.txt\n!\n");
    assert!(matches!(
        select(&manifest),
        Err(SelectionError::EmptyPattern { line: 2 })
    ));
}

const NAMES: [&str; 4] = ["a", "b", "c", "d"];

/// One manifest line: include or exclude, and a file name or a glob over all of them.
fn line_strategy() -> impl Strategy<Value = (bool, Option<usize>)> {
    (any::<bool>(), proptest::option::of(0..NAMES.len()))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_lines_apply_in_order(lines in proptest::collection::vec(line_strategy(), 0..8)) {
        let fx = Fixture::new();
        let files: Vec<PathBuf> = NAMES.iter().map(|n| fx.write(&format!("{}.dat", n), n)).collect();

        let mut text = String::new();
        let mut model = BTreeSet::new();
        for (include, target) in &lines {
            let pattern = match target {
                Some(i) => format!("src/{}.dat", NAMES[*i]),
                None => "src/*.dat".to_string(),
            };
            let targets: Vec<&PathBuf> = match target {
                Some(i) => vec![&files[*i]],
                None => files.iter().collect(),
            };
            if *include {
                text.push_str(&pattern);
                model.extend(targets.into_iter().cloned());
            } else {
                text.push('!');
                text.push_str(&pattern);
                for t in targets {
                    model.remove(t);
                }
            }
            text.push('\n');
        }

        let manifest = Manifest::load(fx.manifest(&text)).unwrap();
        prop_assert_eq!(manifest.resolve().unwrap(), model);
    }
}
