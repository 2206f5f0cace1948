//! Transition table
//!
//! `transition` is a pure function of (phase, input, facts): it decides the
//! next phase, the lifecycle events to emit and the effects to run, and
//! never touches I/O. [`Machine`] layers the retry budget on top.

use super::phase::{CredentialProgress, Facts, Fault, Input, Phase};
use super::retry::RetryPolicy;
use crate::events::LifecycleEvent;
use crate::facts::AccessPointMode;
use crate::presentation::Cue;

/// Side effect requested by a transition, executed by the runtime in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Open the mode subscription for a new attempt
    Subscribe,
    /// Release the subscription and every attempt-scoped worker
    Unsubscribe,
    /// Ask the platform for the access point, then seed the mode snapshot
    RequestAccessPoint { retry: bool },
    /// Arm the portal fallback delay when the platform cannot report visits
    AwaitPortal,
    /// Poll connectivity and arm the join timeout
    WatchConnectivity,
    StopConnectivityWatch,
    Present(Cue),
}

/// Outcome of one input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: Phase,
    pub facts: Facts,
    pub events: Vec<LifecycleEvent>,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn stay(phase: Phase, facts: Facts) -> Self {
        Self {
            next: phase,
            facts,
            events: Vec::new(),
            effects: Vec::new(),
        }
    }

    fn to(
        next: Phase,
        facts: Facts,
        events: Vec<LifecycleEvent>,
        effects: Vec<Effect>,
    ) -> Self {
        Self {
            next,
            facts,
            events,
            effects,
        }
    }

    /// True when nothing observable happened
    pub fn is_noop(&self) -> bool {
        self.events.is_empty() && self.effects.is_empty()
    }

    /// True when a failed attempt was restarted
    pub fn is_restart(&self) -> bool {
        self.next == Phase::ActivatingAccessPoint
            && self
                .events
                .iter()
                .any(|e| matches!(e, LifecycleEvent::SetupFailed { .. }))
    }
}

/// What the current run is still allowed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Retry budget left for a failed attempt
    pub may_retry: bool,
    /// The join is bounded by a timeout; only then does a negative
    /// connectivity report fail it
    pub join_timeout: bool,
}

/// Every attempt starts from unknown facts
fn start() -> Transition {
    Transition::to(
        Phase::ActivatingAccessPoint,
        Facts::default(),
        vec![LifecycleEvent::SetupStarted],
        vec![
            Effect::Subscribe,
            Effect::RequestAccessPoint { retry: false },
        ],
    )
}

/// Join failed: restart the flow, or give up once retries are spent
fn fail(reason: &str, may_retry: bool) -> Transition {
    let failed = LifecycleEvent::SetupFailed {
        reason: reason.to_string(),
    };
    if may_retry {
        Transition::to(
            Phase::ActivatingAccessPoint,
            Facts::default(),
            vec![failed, LifecycleEvent::SetupStarted],
            vec![
                Effect::StopConnectivityWatch,
                Effect::Unsubscribe,
                Effect::Present(Cue::Failure),
                Effect::Subscribe,
                Effect::RequestAccessPoint { retry: true },
            ],
        )
    } else {
        Transition::to(
            Phase::Idle,
            Facts::default(),
            vec![failed, LifecycleEvent::SetupEnded],
            vec![
                Effect::StopConnectivityWatch,
                Effect::Unsubscribe,
                Effect::Present(Cue::Failure),
            ],
        )
    }
}

fn connected(facts: Facts) -> Transition {
    Transition::to(
        Phase::Connected,
        facts,
        vec![LifecycleEvent::SetupConnected, LifecycleEvent::SetupEnded],
        vec![
            Effect::StopConnectivityWatch,
            Effect::Unsubscribe,
            Effect::Present(Cue::Success),
        ],
    )
}

fn fault(fault: &Fault) -> Transition {
    let teardown = vec![Effect::StopConnectivityWatch, Effect::Unsubscribe];
    match fault {
        // Nothing to retry without hardware
        Fault::DeviceNotFound(msg) => Transition::to(
            Phase::Idle,
            Facts::default(),
            vec![LifecycleEvent::SetupError { error: msg.clone() }],
            teardown,
        ),
        Fault::Transport(msg) => {
            let mut effects = teardown;
            effects.push(Effect::Present(Cue::Clear));
            Transition::to(
                Phase::Idle,
                Facts::default(),
                vec![
                    LifecycleEvent::SetupError { error: msg.clone() },
                    LifecycleEvent::SetupEnded,
                ],
                effects,
            )
        }
    }
}

fn mode_changed(phase: Phase, facts: Facts, mode: AccessPointMode, may_retry: bool) -> Transition {
    // Keyed on change, not value: a repeated mode never re-enters a phase
    if facts.mode == Some(mode) {
        return Transition::stay(phase, facts);
    }
    let facts = Facts {
        mode: Some(mode),
        ..facts
    };

    match phase {
        Phase::ActivatingAccessPoint if mode.is_access_point() => Transition::to(
            Phase::AwaitingCredentials(CredentialProgress::default()),
            facts,
            vec![LifecycleEvent::HotspotActivated],
            vec![Effect::Present(Cue::JoinAccessPoint), Effect::AwaitPortal],
        ),
        Phase::AwaitingCredentials(_) if !mode.is_access_point() => Transition::to(
            Phase::ConnectingToNetwork,
            facts,
            vec![LifecycleEvent::HotspotDeactivated],
            vec![Effect::Present(Cue::Connecting), Effect::WatchConnectivity],
        ),
        Phase::ConnectingToNetwork if mode.is_access_point() => {
            fail("access point came back while joining the network", may_retry)
        }
        _ => Transition::stay(phase, facts),
    }
}

/// Decide what `input` does in `phase` given the last-known `facts`
pub fn transition(phase: Phase, input: &Input, facts: Facts, limits: Limits) -> Transition {
    let may_retry = limits.may_retry;
    match (phase, input) {
        (_, Input::Cancel) => {
            let mut effects = Vec::new();
            let mut events = Vec::new();
            if phase.is_active() {
                events.push(LifecycleEvent::SetupEnded);
                effects.extend([Effect::StopConnectivityWatch, Effect::Unsubscribe]);
            }
            if phase != Phase::Idle {
                effects.push(Effect::Present(Cue::Clear));
            }
            Transition::to(Phase::Idle, Facts::default(), events, effects)
        }

        // A finished run is at rest: the next request starts over
        (Phase::Idle | Phase::Connected, Input::Start | Input::NetworkNotDetected) => start(),

        (_, Input::ModeChanged(mode)) => mode_changed(phase, facts, *mode, may_retry),

        (Phase::AwaitingCredentials(progress), Input::PortalViewed) if !progress.portal_viewed => {
            Transition::to(
                Phase::AwaitingCredentials(CredentialProgress {
                    portal_viewed: true,
                    ..progress
                }),
                facts,
                vec![LifecycleEvent::HotspotConnected],
                vec![Effect::Present(Cue::SignIn)],
            )
        }

        (Phase::AwaitingCredentials(progress), Input::NetworkSelected)
            if !progress.network_selected =>
        {
            Transition::to(
                Phase::AwaitingCredentials(CredentialProgress {
                    network_selected: true,
                    ..progress
                }),
                facts,
                vec![LifecycleEvent::NetworkSelected],
                Vec::new(),
            )
        }

        (
            Phase::ConnectingToNetwork,
            Input::ConnectivityPolled(true) | Input::ConnectivityChanged(true),
        ) => connected(Facts {
            reachable: Some(true),
            ..facts
        }),

        (Phase::ConnectingToNetwork, Input::ConnectivityChanged(false) | Input::NetworkNotDetected)
            if limits.join_timeout =>
        {
            fail("network reported unreachable after joining", may_retry)
        }

        (Phase::ConnectingToNetwork, Input::ConnectTimeout) => {
            fail("timed out waiting for the network", may_retry)
        }

        (_, Input::ConnectivityPolled(reachable) | Input::ConnectivityChanged(reachable)) => {
            Transition::stay(
                phase,
                Facts {
                    reachable: Some(*reachable),
                    ..facts
                },
            )
        }

        (p, Input::Fault(f)) if p.is_active() => fault(f),

        // Not valid in this phase: ignored, never queued
        _ => Transition::stay(phase, facts),
    }
}

/// The state machine: current phase, facts and retry budget
#[derive(Debug, Clone)]
pub struct Machine {
    phase: Phase,
    facts: Facts,
    retries: u32,
    policy: RetryPolicy,
    join_timeout: bool,
}

impl Machine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            phase: Phase::Idle,
            facts: Facts::default(),
            retries: 0,
            policy,
            join_timeout: true,
        }
    }

    /// Whether joining is bounded by a timeout
    pub fn with_join_timeout(mut self, bounded: bool) -> Self {
        self.join_timeout = bounded;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn facts(&self) -> Facts {
        self.facts
    }

    /// Retries used in the current provisioning run
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Apply one input and return what should happen
    pub fn apply(&mut self, input: &Input) -> Transition {
        let limits = Limits {
            may_retry: self.policy.allows(self.retries),
            join_timeout: self.join_timeout,
        };
        let step = transition(self.phase, input, self.facts, limits);

        if step.is_restart() {
            self.retries += 1;
        } else if !self.phase.is_active() && step.next == Phase::ActivatingAccessPoint {
            self.retries = 0;
        }

        self.phase = step.next;
        self.facts = step.facts;
        step
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AccessPointMode::{AccessPoint, Infrastructure};

    fn names(step: &Transition) -> Vec<&'static str> {
        step.events.iter().map(|e| e.name()).collect()
    }

    fn machine_awaiting() -> Machine {
        let mut m = Machine::default();
        m.apply(&Input::Start);
        m.apply(&Input::ModeChanged(AccessPoint));
        m
    }

    fn machine_connecting() -> Machine {
        let mut m = machine_awaiting();
        m.apply(&Input::ModeChanged(Infrastructure));
        m
    }

    #[test]
    fn test_start_from_idle() {
        let mut m = Machine::default();
        let step = m.apply(&Input::Start);
        assert_eq!(names(&step), ["setup-started"]);
        assert_eq!(m.phase(), Phase::ActivatingAccessPoint);
        assert_eq!(
            step.effects,
            [Effect::Subscribe, Effect::RequestAccessPoint { retry: false }]
        );
    }

    #[test]
    fn test_start_outside_idle_is_noop() {
        let mut m = machine_awaiting();
        let before = m.phase();
        let step = m.apply(&Input::Start);
        assert!(step.is_noop());
        assert_eq!(m.phase(), before);
    }

    #[test]
    fn test_hotspot_activated() {
        let mut m = Machine::default();
        m.apply(&Input::Start);
        let step = m.apply(&Input::ModeChanged(AccessPoint));
        assert_eq!(names(&step), ["hotspot-activated"]);
        assert!(matches!(m.phase(), Phase::AwaitingCredentials(_)));
        assert_eq!(
            step.effects,
            [Effect::Present(Cue::JoinAccessPoint), Effect::AwaitPortal]
        );
    }

    #[test]
    fn test_non_ap_mode_while_activating_is_recorded_only() {
        let mut m = Machine::default();
        m.apply(&Input::Start);
        let step = m.apply(&Input::ModeChanged(Infrastructure));
        assert!(step.is_noop());
        assert_eq!(m.phase(), Phase::ActivatingAccessPoint);
        assert_eq!(m.facts().mode, Some(Infrastructure));
    }

    #[test]
    fn test_duplicate_mode_never_transitions() {
        let mut m = machine_awaiting();
        let step = m.apply(&Input::ModeChanged(AccessPoint));
        assert!(step.is_noop());

        let mut m = machine_connecting();
        assert!(m.apply(&Input::ModeChanged(Infrastructure)).is_noop());
        assert_eq!(m.phase(), Phase::ConnectingToNetwork);
    }

    #[test]
    fn test_portal_viewed_once() {
        let mut m = machine_awaiting();
        let step = m.apply(&Input::PortalViewed);
        assert_eq!(names(&step), ["hotspot-connected"]);
        assert_eq!(step.effects, [Effect::Present(Cue::SignIn)]);

        assert!(m.apply(&Input::PortalViewed).is_noop());
    }

    #[test]
    fn test_network_selected_once() {
        let mut m = machine_awaiting();
        assert_eq!(names(&m.apply(&Input::NetworkSelected)), ["network-selected"]);
        assert!(m.apply(&Input::NetworkSelected).is_noop());
        assert!(matches!(
            m.phase(),
            Phase::AwaitingCredentials(CredentialProgress {
                network_selected: true,
                ..
            })
        ));
    }

    #[test]
    fn test_hotspot_deactivated() {
        let mut m = machine_awaiting();
        let step = m.apply(&Input::ModeChanged(Infrastructure));
        assert_eq!(names(&step), ["hotspot-deactivated"]);
        assert_eq!(m.phase(), Phase::ConnectingToNetwork);
        assert_eq!(
            step.effects,
            [Effect::Present(Cue::Connecting), Effect::WatchConnectivity]
        );
    }

    #[test]
    fn test_connected() {
        let mut m = machine_connecting();
        let step = m.apply(&Input::ConnectivityPolled(true));
        assert_eq!(names(&step), ["setup-connected", "setup-ended"]);
        assert_eq!(m.phase(), Phase::Connected);
        let successes = step
            .effects
            .iter()
            .filter(|e| **e == Effect::Present(Cue::Success))
            .count();
        assert_eq!(successes, 1);
        assert!(step.effects.contains(&Effect::Unsubscribe));
    }

    #[test]
    fn test_negative_poll_is_not_a_failure() {
        let mut m = machine_connecting();
        let step = m.apply(&Input::ConnectivityPolled(false));
        assert!(step.is_noop());
        assert_eq!(m.phase(), Phase::ConnectingToNetwork);
        assert_eq!(m.facts().reachable, Some(false));
    }

    #[test]
    fn test_access_point_returns_restarts_flow() {
        let mut m = machine_connecting();
        let step = m.apply(&Input::ModeChanged(AccessPoint));
        assert_eq!(names(&step), ["setup-failed", "setup-started"]);
        assert_eq!(m.phase(), Phase::ActivatingAccessPoint);
        assert_eq!(m.retries(), 1);
        assert_eq!(m.facts(), Facts::default());
        assert!(step
            .effects
            .contains(&Effect::RequestAccessPoint { retry: true }));
    }

    #[test]
    fn test_timeout_and_explicit_failure_restart() {
        let mut m = machine_connecting();
        assert_eq!(
            names(&m.apply(&Input::ConnectTimeout)),
            ["setup-failed", "setup-started"]
        );

        let mut m = machine_connecting();
        assert_eq!(
            names(&m.apply(&Input::NetworkNotDetected)),
            ["setup-failed", "setup-started"]
        );
    }

    #[test]
    fn test_timeout_outside_connecting_is_ignored() {
        let mut m = machine_awaiting();
        assert!(m.apply(&Input::ConnectTimeout).is_noop());
    }

    #[test]
    fn test_retry_cap_ends_setup() {
        let mut m = Machine::new(RetryPolicy {
            max_retries: Some(1),
            ..RetryPolicy::immediate()
        });
        m.apply(&Input::Start);
        m.apply(&Input::ModeChanged(AccessPoint));
        m.apply(&Input::ModeChanged(Infrastructure));
        assert_eq!(
            names(&m.apply(&Input::ConnectTimeout)),
            ["setup-failed", "setup-started"]
        );

        m.apply(&Input::ModeChanged(AccessPoint));
        m.apply(&Input::ModeChanged(Infrastructure));
        let step = m.apply(&Input::ConnectTimeout);
        assert_eq!(names(&step), ["setup-failed", "setup-ended"]);
        assert_eq!(m.phase(), Phase::Idle);
        assert!(!step
            .effects
            .iter()
            .any(|e| matches!(e, Effect::RequestAccessPoint { .. })));

        // A fresh start gets a fresh budget
        m.apply(&Input::Start);
        assert_eq!(m.retries(), 0);
    }

    #[test]
    fn test_device_not_found_ends_without_retry() {
        let mut m = Machine::default();
        m.apply(&Input::Start);
        let step = m.apply(&Input::Fault(Fault::DeviceNotFound(
            "No Wi-Fi device found".to_string(),
        )));
        assert_eq!(names(&step), ["setup-error"]);
        assert_eq!(m.phase(), Phase::Idle);
        assert!(!step
            .effects
            .iter()
            .any(|e| matches!(e, Effect::RequestAccessPoint { .. })));
    }

    #[test]
    fn test_transport_fault_reports_error_then_ended() {
        let mut m = machine_awaiting();
        let step = m.apply(&Input::Fault(Fault::Transport("bus closed".to_string())));
        assert_eq!(names(&step), ["setup-error", "setup-ended"]);
        assert_eq!(m.phase(), Phase::Idle);
    }

    #[test]
    fn test_fault_in_idle_is_ignored() {
        let mut m = Machine::default();
        assert!(m
            .apply(&Input::Fault(Fault::Transport("late".to_string())))
            .is_noop());
    }

    #[test]
    fn test_cancel_from_any_phase() {
        let mut m = machine_connecting();
        let step = m.apply(&Input::Cancel);
        assert_eq!(names(&step), ["setup-ended"]);
        assert!(step.effects.contains(&Effect::Unsubscribe));
        assert_eq!(m.phase(), Phase::Idle);

        let mut idle = Machine::default();
        assert!(idle.apply(&Input::Cancel).is_noop());
        assert_eq!(idle.phase(), Phase::Idle);
    }

    #[test]
    fn test_connected_rests_until_next_request() {
        let mut m = machine_connecting();
        m.apply(&Input::ConnectivityChanged(true));
        assert!(m.apply(&Input::ModeChanged(AccessPoint)).is_noop());
        assert!(m.apply(&Input::ConnectivityChanged(false)).is_noop());
        assert!(m.apply(&Input::ConnectTimeout).is_noop());
        assert_eq!(m.phase(), Phase::Connected);

        let step = m.apply(&Input::Cancel);
        assert!(step.events.is_empty());
        assert_eq!(m.phase(), Phase::Idle);
    }

    #[test]
    fn test_network_lost_after_success_starts_again() {
        let mut m = machine_connecting();
        m.apply(&Input::ConnectivityPolled(true));
        assert_eq!(m.phase(), Phase::Connected);

        let step = m.apply(&Input::NetworkNotDetected);
        assert_eq!(names(&step), ["setup-started"]);
        assert_eq!(m.phase(), Phase::ActivatingAccessPoint);
        assert_eq!(m.retries(), 0);
        assert_eq!(m.facts(), Facts::default());
    }

    #[test]
    fn test_negative_report_without_timeout_is_recorded_only() {
        let mut m = Machine::default().with_join_timeout(false);
        m.apply(&Input::Start);
        m.apply(&Input::ModeChanged(AccessPoint));
        m.apply(&Input::ModeChanged(Infrastructure));

        assert!(m.apply(&Input::ConnectivityChanged(false)).is_noop());
        assert!(m.apply(&Input::NetworkNotDetected).is_noop());
        assert_eq!(m.phase(), Phase::ConnectingToNetwork);
        assert_eq!(m.facts().reachable, Some(false));

        // The access point coming back still fails the join
        let step = m.apply(&Input::ModeChanged(AccessPoint));
        assert_eq!(names(&step), ["setup-failed", "setup-started"]);
    }

    #[test]
    fn test_network_not_detected_starts_from_idle() {
        let mut m = Machine::default();
        assert_eq!(names(&m.apply(&Input::NetworkNotDetected)), ["setup-started"]);
    }

    #[test]
    fn test_full_attempt_emits_each_event_once() {
        let mut m = Machine::default();
        let mut seen = Vec::new();
        for input in [
            Input::Start,
            Input::ModeChanged(AccessPoint),
            Input::ModeChanged(AccessPoint),
            Input::PortalViewed,
            Input::PortalViewed,
            Input::NetworkSelected,
            Input::ModeChanged(Infrastructure),
            Input::ConnectivityPolled(false),
            Input::ConnectivityPolled(true),
            Input::ConnectivityPolled(true),
        ] {
            seen.extend(names(&m.apply(&input)));
        }
        assert_eq!(
            seen,
            [
                "setup-started",
                "hotspot-activated",
                "hotspot-connected",
                "network-selected",
                "hotspot-deactivated",
                "setup-connected",
                "setup-ended",
            ]
        );
    }
}
