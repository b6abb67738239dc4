//! Destination chain wave planning.
//!
//! Pure function over a list of destination configs: computes the
//! execution plan once, at deploy time, with no I/O. `waitForPrevious`
//! destinations act as barriers; everything else in a wave runs
//! concurrently.

use serde::{Deserialize, Serialize};

use crate::domain_types::MetaDataId;

/// The subset of a destination's configuration the chain planner needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestinationPlanInput {
    pub metadata_id: MetaDataId,
    pub wait_for_previous: bool,
    pub skip_on_upstream_error: bool,
}

/// A maximal subsequence of destinations that run concurrently once the
/// prior wave has fully settled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Wave {
    pub members: Vec<MetaDataId>,
}

/// Computes the wave plan for an ordered destination list.
///
/// A destination with `wait_for_previous = true` starts a new wave
/// (unless it's first); everything else joins the current wave.
#[must_use]
pub fn plan(destinations: &[DestinationPlanInput]) -> Vec<Wave> {
    let mut waves: Vec<Wave> = Vec::new();
    for dest in destinations {
        let starts_new_wave = dest.wait_for_previous || waves.is_empty();
        if starts_new_wave {
            waves.push(Wave {
                members: vec![dest.metadata_id],
            });
        } else {
            waves
                .last_mut()
                .expect("waves is non-empty once the first destination is planned")
                .members
                .push(dest.metadata_id);
        }
    }
    waves
}

/// Whether a destination configured with `skip_on_upstream_error` should
/// be skipped, given the terminal statuses seen so far for destinations
/// in *earlier* waves only — intra-wave errors never affect siblings.
#[must_use]
pub fn should_skip(
    skip_on_upstream_error: bool,
    earlier_wave_errors: impl IntoIterator<Item = bool>,
) -> bool {
    skip_on_upstream_error && earlier_wave_errors.into_iter().any(|errored| errored)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dest(id: i32, wait: bool) -> DestinationPlanInput {
        DestinationPlanInput {
            metadata_id: MetaDataId::try_new(id).unwrap(),
            wait_for_previous: wait,
            skip_on_upstream_error: false,
        }
    }

    #[test]
    fn no_barriers_produce_a_single_wave() {
        let destinations = vec![dest(1, false), dest(2, false), dest(3, false)];
        let waves = plan(&destinations);
        assert_eq!(waves.len(), 1);
        assert_eq!(waves[0].members.len(), 3);
    }

    #[test]
    fn wait_for_previous_splits_into_serial_segments() {
        // D1, D2(wait=true), D3 -> wave[D1], wave[D2], wave[D3]
        let destinations = vec![dest(1, false), dest(2, true), dest(3, false)];
        let waves = plan(&destinations);
        assert_eq!(waves.len(), 3);
        assert_eq!(waves[0].members, vec![MetaDataId::try_new(1).unwrap()]);
        assert_eq!(waves[1].members, vec![MetaDataId::try_new(2).unwrap()]);
        assert_eq!(waves[2].members, vec![MetaDataId::try_new(3).unwrap()]);
    }

    #[test]
    fn a_leading_wait_for_previous_does_not_create_an_empty_wave() {
        let destinations = vec![dest(1, true), dest(2, false)];
        let waves = plan(&destinations);
        assert_eq!(waves.len(), 1);
        assert_eq!(waves[0].members.len(), 2);
    }

    #[test]
    fn skip_triggers_only_on_earlier_wave_errors() {
        assert!(should_skip(true, vec![false, true]));
        assert!(!should_skip(true, vec![false, false]));
        assert!(!should_skip(false, vec![true]));
    }
}
