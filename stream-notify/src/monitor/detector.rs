//! Offline to live transition rule.

use super::status::{LiveDetails, StreamObservation};

/// Outcome of comparing the stored flag with a fresh observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Flag to persist.
    pub new_status: bool,
    /// Set only when the entity just went live.
    pub went_live: Option<LiveDetails>,
}

/// Compare the previous live flag with an observation.
///
/// Only `false -> Live` produces an event. `Unknown` keeps the previous flag,
/// so a failed query can neither start nor end a session.
pub fn detect(previous: bool, observation: StreamObservation) -> Transition {
    match (previous, observation) {
        (false, StreamObservation::Live(details)) => Transition {
            new_status: true,
            went_live: Some(details),
        },
        (true, StreamObservation::Live(_)) => Transition {
            new_status: true,
            went_live: None,
        },
        (_, StreamObservation::Offline) => Transition {
            new_status: false,
            went_live: None,
        },
        (previous, StreamObservation::Unknown) => Transition {
            new_status: previous,
            went_live: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live() -> StreamObservation {
        StreamObservation::Live(LiveDetails {
            title: "t".into(),
            category: Some("Chess".into()),
            thumbnail_url: "u".into(),
        })
    }

    #[test]
    fn test_transition_table() {
        let started = detect(false, live());
        assert!(started.new_status);
        assert!(started.went_live.is_some());

        assert_eq!(
            detect(true, live()),
            Transition { new_status: true, went_live: None }
        );
        assert_eq!(
            detect(true, StreamObservation::Offline),
            Transition { new_status: false, went_live: None }
        );
        assert_eq!(
            detect(false, StreamObservation::Offline),
            Transition { new_status: false, went_live: None }
        );
        for previous in [true, false] {
            assert_eq!(
                detect(previous, StreamObservation::Unknown),
                Transition { new_status: previous, went_live: None }
            );
        }
    }

    /// Folding any observation sequence through `detect` yields one event per
    /// offline to live edge of the known observations.
    #[test]
    fn test_events_match_rising_edges() {
        use StreamObservation::{Offline, Unknown};

        let sequences: Vec<Vec<StreamObservation>> = vec![
            vec![live(), live(), live()],
            vec![live(), Unknown, live()],
            vec![live(), Offline, live()],
            vec![Unknown, Unknown, live(), Unknown, Offline, Unknown, live()],
            vec![Offline, Offline, Unknown],
        ];
        let expected = [1, 1, 2, 2, 0];

        for (sequence, expected) in sequences.into_iter().zip(expected) {
            let mut status = false;
            let mut events = 0;
            for observation in sequence {
                let transition = detect(status, observation);
                if transition.went_live.is_some() {
                    events += 1;
                }
                status = transition.new_status;
            }
            assert_eq!(events, expected);
        }
    }
}
