//! Property-based checks for the pure transform and classification layers.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use tiltwatch::alert_log::group_alerts;
use tiltwatch::classify::{Severity, classify};
use tiltwatch::config::ThresholdProfile;
use tiltwatch::registry::{Node, NodeRegistry};
use tiltwatch::series::{AVG_WINDOW, TOP_K, chunk_means, delta_series, top_k};
use tiltwatch::{AlertLogEntry, Sample};

fn profile_strategy() -> impl Strategy<Value = ThresholdProfile> {
    (0.0f64..10.0, 0.0f64..10.0, 0.0f64..10.0).prop_map(|(a, b, c)| {
        let mut breakpoints = [a, b, c];
        breakpoints.sort_by(|x, y| x.partial_cmp(y).unwrap());
        ThresholdProfile::new(breakpoints[0], breakpoints[1], breakpoints[2]).unwrap()
    })
}

fn samples_strategy(max_len: usize) -> impl Strategy<Value = Vec<Sample>> {
    prop::collection::vec(-100.0f64..100.0, 0..max_len).prop_map(|values| {
        values
            .into_iter()
            .enumerate()
            .map(|(i, axis_x)| Sample {
                door_num: 1,
                timestamp: Utc.timestamp_opt(1_700_000_000 + i as i64 * 10, 0).unwrap(),
                axis_x,
                axis_y: 0.0,
            })
            .collect()
    })
}

fn entries_strategy() -> impl Strategy<Value = Vec<AlertLogEntry>> {
    prop::collection::vec((1u32..8, 0i64..100_000), 0..40).prop_map(|raw| {
        raw.into_iter()
            .map(|(door_num, offset)| AlertLogEntry {
                timestamp: Utc.timestamp_opt(1_700_000_000 + offset, 0).unwrap(),
                door_num,
                metric: "axis_x".to_string(),
                value: 0.7,
                threshold: 0.6,
                severity: Severity::Danger,
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn classification_is_monotonic_in_magnitude(
        profile in profile_strategy(),
        a in -20.0f64..20.0,
        b in -20.0f64..20.0,
    ) {
        let (smaller, larger) = if a.abs() <= b.abs() { (a, b) } else { (b, a) };
        prop_assert!(classify(smaller, &profile) <= classify(larger, &profile));
    }

    #[test]
    fn breakpoints_belong_to_their_own_band(profile in profile_strategy()) {
        // a reading exactly on a breakpoint classifies as that band
        prop_assert!(classify(profile.caution(), &profile) >= Severity::Caution);
        prop_assert!(classify(profile.warning(), &profile) >= Severity::Warning);
        prop_assert_eq!(classify(profile.danger(), &profile), Severity::Danger);
    }

    #[test]
    fn sign_never_affects_classification(
        profile in profile_strategy(),
        value in -20.0f64..20.0,
    ) {
        prop_assert_eq!(classify(value, &profile), classify(-value, &profile));
    }

    #[test]
    fn deltas_telescope_to_the_overall_change(samples in samples_strategy(64)) {
        let deltas = delta_series(&samples);
        match samples.len() {
            0 | 1 => prop_assert!(deltas.is_empty()),
            n => {
                prop_assert_eq!(deltas.len(), n - 1);
                let total: f64 = deltas.iter().map(|p| p.value).sum();
                let expected = samples[n - 1].axis_x - samples[0].axis_x;
                prop_assert!((total - expected).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn chunk_means_cover_every_sample_once(samples in samples_strategy(64)) {
        let means = chunk_means(&samples);
        prop_assert_eq!(means.len(), samples.len().div_ceil(AVG_WINDOW));

        // weighted by chunk size, the means reconstruct the plain sum
        let mut weighted = 0.0;
        for (i, point) in means.iter().enumerate() {
            let size = AVG_WINDOW.min(samples.len() - i * AVG_WINDOW);
            weighted += point.value * size as f64;
        }
        let plain: f64 = samples.iter().map(|s| s.axis_x).sum();
        prop_assert!((weighted - plain).abs() < 1e-6);
    }

    #[test]
    fn top_k_picks_the_most_tilted_online_nodes(
        tilts in prop::collection::vec((-5.0f64..5.0, prop::bool::ANY), 0..20),
    ) {
        let mut registry = NodeRegistry::new();
        let nodes = tilts
            .iter()
            .enumerate()
            .map(|(i, &(axis_x, online))| Node {
                door_num: i as u32 + 1,
                axis_x,
                axis_y: 0.0,
                position: String::new(),
                gateway_id: None,
                online,
                recording: online,
                last_updated_at: None,
            })
            .collect();
        registry.load_baseline(nodes, vec![]);

        let picked = top_k(&registry);
        prop_assert!(picked.len() <= TOP_K);

        let tilt_of = |door: u32| tilts[door as usize - 1].0.abs();
        for door in &picked {
            prop_assert!(tilts[*door as usize - 1].1, "offline node {door} picked");
        }
        let floor = picked.iter().map(|&d| tilt_of(d)).fold(f64::INFINITY, f64::min);
        for (i, &(axis_x, online)) in tilts.iter().enumerate() {
            let door = i as u32 + 1;
            if online && !picked.contains(&door) {
                prop_assert!(axis_x.abs() <= floor);
            }
        }
    }

    #[test]
    fn grouping_preserves_entries_and_their_order(entries in entries_strategy()) {
        let groups = group_alerts(entries.clone());

        // adjacent groups always belong to different nodes
        for pair in groups.windows(2) {
            prop_assert_ne!(pair[0].door_num, pair[1].door_num);
        }

        // concatenating the groups restores the newest-first entry order
        let mut expected = entries;
        expected.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let flattened: Vec<AlertLogEntry> = groups
            .into_iter()
            .flat_map(|g| g.entries)
            .collect();
        prop_assert_eq!(flattened, expected);
    }
}
