mod common;

use common::synthetic_grid::{all_foreground, parse_classification};
use ridge_vision::core_modules::block_grid::{BlockGrid, Point};
use ridge_vision::core_modules::damage_area::DamageArea;
use ridge_vision::core_modules::neighborhood_classifier::{Classification, ClassificationMap};
use ridge_vision::core_modules::region_extractor::{Label, region_extractor};
use std::collections::HashSet;

/// Inner square `[lo, hi]^2` wrapped in a one block border ring.
fn ringed_cluster(cols: u32, rows: u32, clusters: &[(u32, u32)]) -> ClassificationMap {
    BlockGrid::from_fn(cols, rows, |p| {
        for &(lo, hi) in clusters {
            let inner = (lo..=hi).contains(&p.x) && (2..=4).contains(&p.y);
            let ring = (lo - 1..=hi + 1).contains(&p.x) && (1..=5).contains(&p.y);
            if inner {
                return Classification::InnerBlock;
            }
            if ring {
                return Classification::BorderBlock;
            }
        }
        Classification::Ordinary
    })
}

/// True when `points` form one 8-connected set.
fn is_eight_connected(points: &[Point]) -> bool {
    let Some(&start) = points.first() else {
        return true;
    };
    let members: HashSet<Point> = points.iter().copied().collect();
    let mut seen = HashSet::from([start]);
    let mut stack = vec![start];
    while let Some(p) = stack.pop() {
        for dx in -1i64..=1 {
            for dy in -1i64..=1 {
                let (x, y) = (p.x as i64 + dx, p.y as i64 + dy);
                if x < 0 || y < 0 {
                    continue;
                }
                let n = Point::new(x as u32, y as u32);
                if members.contains(&n) && seen.insert(n) {
                    stack.push(n);
                }
            }
        }
    }
    seen.len() == members.len()
}

fn assert_partition(areas: &[DamageArea], labels: &BlockGrid<Label>) {
    let mut claimed = HashSet::new();
    for area in areas {
        for p in area.points() {
            assert!(claimed.insert(*p), "block {p:?} is in two areas");
            assert_eq!(labels[*p], Label::Area(area.id));
        }
    }
    for p in labels.points() {
        let owned = matches!(labels[p], Label::Area(_));
        assert_eq!(owned, claimed.contains(&p), "label/area mismatch at {p:?}");
        assert!(matches!(labels[p], Label::Area(_) | Label::Unassigned));
    }
}

#[test]
fn centered_cluster_with_ring_becomes_one_area() {
    let map = BlockGrid::from_fn(10, 10, |p| {
        let inner = (4..=6).contains(&p.x) && (4..=6).contains(&p.y);
        let ring = (3..=7).contains(&p.x) && (3..=7).contains(&p.y);
        if inner {
            Classification::InnerBlock
        } else if ring {
            Classification::BorderBlock
        } else {
            Classification::Ordinary
        }
    });
    let mask = all_foreground(10, 10);

    let extraction = region_extractor::extract_areas(&map, &mask).unwrap();
    assert_eq!(extraction.areas.len(), 1);
    let area = &extraction.areas[0];
    assert_eq!(area.id, 1);
    // 9 seeds, then the whole 16 block ring in a single pass.
    assert!(area.points()[..9].iter().all(|p| (4..=6).contains(&p.x) && (4..=6).contains(&p.y)));
    assert_eq!(area.point_count(), 25);
    assert_eq!(extraction.growth_passes, 1);
    assert_eq!((area.width(), area.height()), (4, 4));
    assert_partition(&extraction.areas, &extraction.labels);
}

#[test]
fn disjoint_clusters_never_merge() {
    let map = ringed_cluster(16, 8, &[(2, 4), (10, 12)]);
    let mask = all_foreground(16, 8);

    let extraction = region_extractor::extract_areas(&map, &mask).unwrap();
    assert_eq!(extraction.areas.len(), 2);
    for area in &extraction.areas {
        assert_eq!(area.point_count(), 25);
        assert!(is_eight_connected(area.points()));
    }
    // Ids follow column-major scan order.
    assert!(extraction.areas[0].points().iter().all(|p| p.x <= 5));
    assert!(extraction.areas[1].points().iter().all(|p| p.x >= 9));
    assert_eq!(extraction.growth_passes, 1);
    assert_partition(&extraction.areas, &extraction.labels);
}

#[test]
fn long_fringe_is_absorbed_pass_by_pass() {
    let map = parse_classification(&[
        "..........", //
        ".###++++..", //
        ".###......", //
        ".###......", //
        "..........",
    ]);
    let mask = all_foreground(10, 5);

    let extraction = region_extractor::extract_areas(&map, &mask).unwrap();
    assert_eq!(extraction.areas.len(), 1);
    assert_eq!(extraction.areas[0].point_count(), 13);
    assert_eq!(extraction.growth_passes, 4);
    // Bounded by the grid diagonal.
    assert!(extraction.growth_passes <= 10);
    assert!(is_eight_connected(extraction.areas[0].points()));
}

#[test]
fn pruning_is_idempotent_on_mixed_input() {
    let map = parse_classification(&[
        "++.....+++", //
        "++..#+..+.", //
        "....++....", //
        "+.........", //
        "+...##+.++",
    ]);
    let mask = all_foreground(10, 5);
    let mut labels = region_extractor::label_classification(&map, &mask);

    let removed = region_extractor::prune_orphans(&mut labels, &mask);
    // Top-left square, top-right hook, left column and right pair are orphans.
    assert_eq!(removed, 4 + 4 + 2 + 2);

    let after_first = labels.clone();
    assert_eq!(region_extractor::prune_orphans(&mut labels, &mask), 0);
    assert_eq!(labels, after_first);
    assert_eq!(region_extractor::count_low_damage(&labels, &mask), 4);
}

#[test]
fn extraction_is_deterministic() {
    let map = parse_classification(&[
        "#+#+#", //
        "+++++", //
        "#+.+#",
    ]);
    let mask = all_foreground(5, 3);

    let first = region_extractor::extract_areas(&map, &mask).unwrap();
    let second = region_extractor::extract_areas(&map, &mask).unwrap();
    assert_eq!(first.areas, second.areas);
    assert_eq!(first.labels, second.labels);
    assert_partition(&first.areas, &first.labels);
}
