// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2019, CEP authors.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use this file except
// in compliance with the License.  You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software distributed under the
// License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either
// express or implied.  See the License for the specific language governing permissions and
// limitations under the License.
// ------------------------------------------------------------------------------------------------

//! Defines the automaton runtime: the compiled states, the live match branches, and the per-event
//! processing step that advances every branch, emits completed matches, and expires windowed
//! branches into timeouts.
//!
//! Processing one event is a two-phase affair.  The first phase evaluates every condition the
//! event could touch (the decision graph of each live branch) without changing anything, so a
//! failing user condition aborts the event with no visible effect.  The second phase applies the
//! collected decisions: it writes the buffer, splits branches, culls the dead, and extracts
//! matches.  Nothing in the second phase can fail.

use std::rc::Rc;

use smallbitvec::SmallBitVec;
use smallvec::SmallVec;
use tracing::trace;

use crate::buffer::EntryId;
use crate::buffer::PatternMatch;
use crate::buffer::SharedBuffer;
use crate::condition::Condition;
use crate::dewey::DeweyNumber;
use crate::error::ConditionError;
use crate::error::MatchError;
use crate::event::EventWrapper;
use crate::event::Timestamp;

/// Identifies a state of the compiled automaton.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct StateId(pub(crate) usize);

/// What role a state plays in the automaton.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum StateKind {
    /// The entry of the chain.  The branch sitting here is persistent: it re-arms itself after
    /// every event so that each eligible event can open a fresh match.
    Start,
    Normal,
    /// Reaching this state completes a match.
    Final,
    /// Reaching this state kills the branch.  Strict stages route their failures here.
    Stop,
}

/// How a transition treats the current event.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EdgeAction {
    /// Consume the event, appending it to the match under the source state's stage name.
    Take,
    /// Skip the event without consuming it.
    Ignore,
    /// Move on without an event at all.  Models optionality and quantifier exits.
    Proceed,
}

pub(crate) struct Transition<V> {
    pub(crate) action: EdgeAction,
    pub(crate) target: StateId,
    pub(crate) condition: Rc<dyn Condition<V>>,
}

impl<V> Clone for Transition<V> {
    fn clone(&self) -> Transition<V> {
        Transition {
            action: self.action,
            target: self.target,
            condition: self.condition.clone(),
        }
    }
}

pub(crate) struct NfaState<V> {
    pub(crate) name: Rc<str>,
    pub(crate) kind: StateKind,
    pub(crate) transitions: SmallVec<[Transition<V>; 4]>,
}

/// One live branch of the automaton interpretation: where it sits, the buffer entry it last
/// wrote, the version of its lineage, and when its match started.
#[derive(Debug)]
struct Computation {
    state: StateId,
    previous: Option<EntryId>,
    version: DeweyNumber,
    start_timestamp: Option<Timestamp>,
    /// Tie-breaker between branches that otherwise look identical.
    seq: u64,
}

/// Everything one processing step produced.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Output<V> {
    /// Completed matches, in a deterministic order: branch age first, then edge order.
    pub matches: Vec<PatternMatch<V>>,
    /// Partial matches that ran out of window during this step, stamped with the current
    /// timestamp (not their deadline).  Only populated when the automaton was compiled with
    /// timeout handling.
    pub timeouts: Vec<(PatternMatch<V>, Timestamp)>,
}

impl<V> Output<V> {
    fn new() -> Output<V> {
        Output {
            matches: Vec::new(),
            timeouts: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty() && self.timeouts.is_empty()
    }
}

/// An applicable Take or Ignore edge discovered while building a branch's decision graph.  For
/// takes, also records whether the take can already reach a final state through Proceed edges.
struct EdgeDecision {
    action: EdgeAction,
    source: StateId,
    target: StateId,
    reaches_final: bool,
}

struct Decisions {
    edges: Vec<EdgeDecision>,
    takes: usize,
    ignores: usize,
}

const DEFAULT_BRANCH_LIMIT: usize = 10_000;

/// A compiled pattern together with its runtime state.  Single-threaded and not reentrant:
/// deliver events one at a time, in non-decreasing timestamp order.
pub struct Nfa<V> {
    pub(crate) states: Vec<NfaState<V>>,
    pub(crate) start: StateId,
    window: Option<Timestamp>,
    handle_timeouts: bool,
    branch_limit: usize,
    computations: Vec<Computation>,
    buffer: SharedBuffer<V>,
    last_timestamp: Option<Timestamp>,
    arrivals: u64,
    next_seq: u64,
}

impl<V> Nfa<V> {
    pub(crate) fn new(
        states: Vec<NfaState<V>>,
        start: StateId,
        window: Option<Timestamp>,
        handle_timeouts: bool,
    ) -> Nfa<V> {
        let mut nfa = Nfa {
            states,
            start,
            window,
            handle_timeouts,
            branch_limit: DEFAULT_BRANCH_LIMIT,
            computations: Vec::new(),
            buffer: SharedBuffer::new(),
            last_timestamp: None,
            arrivals: 0,
            next_seq: 0,
        };
        let version = DeweyNumber::new(1);
        nfa.arm_start(version);
        nfa
    }

    /// Caps the number of live branches.  Skip-till-any continuity and quantifier combinatorics
    /// can make the branch count explode; when a single event would push it past the limit, the
    /// event is rejected with [`MatchError::BranchOverflow`] instead of silently dropping
    /// matches.
    ///
    /// [`MatchError::BranchOverflow`]: ../error/enum.MatchError.html#variant.BranchOverflow
    pub fn with_branch_limit(mut self, limit: usize) -> Nfa<V> {
        self.branch_limit = limit;
        self
    }

    /// Returns whether the automaton holds no partial matches: only the persistent start branch
    /// remains, and the buffer stores nothing.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
            && self.computations.iter().all(|computation| {
                self.kind(computation.state) == StateKind::Start && computation.previous.is_none()
            })
    }

    fn kind(&self, state: StateId) -> StateKind {
        self.states[state.0].kind
    }

    fn same_stage(&self, a: StateId, b: StateId) -> bool {
        self.states[a.0].name == self.states[b.0].name
    }

    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn arm_start(&mut self, version: DeweyNumber) {
        let seq = self.next_seq();
        self.computations.push(Computation {
            state: self.start,
            previous: None,
            version,
            start_timestamp: None,
            seq,
        });
    }

    fn expired(&self, computation: &Computation, now: Timestamp) -> bool {
        match (self.window, computation.start_timestamp) {
            (Some(window), Some(start)) => now - start >= window,
            _ => false,
        }
    }
}

impl<V> Nfa<V>
where
    V: Clone,
{
    /// Advances the automaton by one event.  When `event` is `None`, instead performs a pure
    /// maintenance tick that only expires windowed branches.
    ///
    /// Returns the matches completed and the partial matches timed out by this step.  Events must
    /// arrive in non-decreasing timestamp order; a regressing timestamp is rejected and leaves
    /// the automaton untouched, as does a failing user condition.
    pub fn process(
        &mut self,
        event: Option<V>,
        timestamp: Timestamp,
    ) -> Result<Output<V>, MatchError> {
        if let Some(last) = self.last_timestamp {
            if timestamp < last {
                return Err(MatchError::TimeRegression { timestamp, last });
            }
        }
        let output = match event {
            Some(value) => self.advance(value, timestamp)?,
            None => self.sweep(timestamp),
        };
        self.last_timestamp = Some(timestamp);
        Ok(output)
    }

    fn advance(&mut self, value: V, timestamp: Timestamp) -> Result<Output<V>, MatchError> {
        trace!(
            branches = self.computations.len(),
            timestamp,
            "processing event"
        );

        // Phase one: evaluate every condition this event could touch, mutating nothing.  An
        // expired branch gets no plan; it is swept below.
        let mut plans = Vec::with_capacity(self.computations.len());
        for computation in &self.computations {
            if self.expired(computation, timestamp) {
                plans.push(None);
                continue;
            }
            plans.push(Some(self.decision_graph(computation.state, &value)?));
        }

        let mut projected = 0;
        for (computation, plan) in self.computations.iter().zip(&plans) {
            if let Some(decisions) = plan {
                let is_start = self.kind(computation.state) == StateKind::Start;
                projected += decisions
                    .edges
                    .iter()
                    .filter(|edge| !(is_start && edge.action == EdgeAction::Ignore))
                    .count();
                if is_start {
                    projected += 1;
                }
            }
        }
        if projected > self.branch_limit {
            return Err(MatchError::BranchOverflow {
                count: projected,
                limit: self.branch_limit,
            });
        }

        // Phase two: apply the decisions.  Nothing below can fail.
        self.arrivals += 1;
        let arrival = self.arrivals;
        let wrapper = EventWrapper::new(value, timestamp);
        let mut output = Output::new();
        let generation = std::mem::replace(&mut self.computations, Vec::new());
        for (computation, plan) in generation.into_iter().zip(plans) {
            match plan {
                None => self.expire(computation, timestamp, &mut output),
                Some(decisions) => {
                    self.apply(computation, decisions, &wrapper, arrival, &mut output)
                }
            }
        }
        if let Some(window) = self.window {
            self.buffer.prune(timestamp - window);
        }
        Ok(output)
    }

    /// The maintenance tick: expires windowed branches against `now` and sweeps the buffer, but
    /// injects and advances nothing.
    fn sweep(&mut self, now: Timestamp) -> Output<V> {
        let mut output = Output::new();
        let window = match self.window {
            Some(window) => window,
            None => return output,
        };
        let retained = {
            let mut retained = SmallBitVec::from_elem(self.computations.len(), true);
            for (idx, computation) in self.computations.iter().enumerate() {
                if self.expired(computation, now) {
                    retained.set(idx, false);
                }
            }
            retained
        };
        let generation = std::mem::replace(&mut self.computations, Vec::new());
        for (idx, computation) in generation.into_iter().enumerate() {
            if retained[idx] {
                self.computations.push(computation);
            } else {
                self.expire(computation, now, &mut output);
            }
        }
        self.buffer.prune(now - window);
        output
    }

    fn expire(&mut self, computation: Computation, now: Timestamp, output: &mut Output<V>) {
        if let Some(entry) = computation.previous {
            if self.handle_timeouts {
                for patch in self.buffer.extract_patches(entry, &computation.version) {
                    output.timeouts.push((patch, now));
                }
            }
            self.buffer.release(entry);
        }
    }

    /// Collects the applicable Take and Ignore edges reachable from `origin` through Proceed
    /// closures, evaluating every condition along the way.
    fn decision_graph(&self, origin: StateId, value: &V) -> Result<Decisions, ConditionError> {
        let mut decisions = Decisions {
            edges: Vec::new(),
            takes: 0,
            ignores: 0,
        };
        let mut visited = SmallBitVec::from_elem(self.states.len(), false);
        let mut pending = vec![origin];
        while let Some(id) = pending.pop() {
            if visited[id.0] {
                continue;
            }
            visited.set(id.0, true);
            for transition in &self.states[id.0].transitions {
                if !transition.condition.evaluate(value)? {
                    continue;
                }
                match transition.action {
                    EdgeAction::Proceed => pending.push(transition.target),
                    EdgeAction::Take => {
                        decisions.takes += 1;
                        decisions.edges.push(EdgeDecision {
                            action: EdgeAction::Take,
                            source: id,
                            target: transition.target,
                            reaches_final: self.final_after_proceed(transition.target, value)?,
                        });
                    }
                    EdgeAction::Ignore => {
                        decisions.ignores += 1;
                        decisions.edges.push(EdgeDecision {
                            action: EdgeAction::Ignore,
                            source: id,
                            target: transition.target,
                            reaches_final: false,
                        });
                    }
                }
            }
        }
        Ok(decisions)
    }

    /// Returns whether a branch landing on `from` could already reach a final state through
    /// Proceed edges alone.  Such a take completes a match immediately, because a later event
    /// may never come to trigger the exit.
    fn final_after_proceed(&self, from: StateId, value: &V) -> Result<bool, ConditionError> {
        let mut visited = SmallBitVec::from_elem(self.states.len(), false);
        let mut pending = Vec::new();
        for transition in &self.states[from.0].transitions {
            if transition.action == EdgeAction::Proceed && transition.condition.evaluate(value)? {
                pending.push(transition.target);
            }
        }
        while let Some(id) = pending.pop() {
            if visited[id.0] {
                continue;
            }
            visited.set(id.0, true);
            if self.kind(id) == StateKind::Final {
                return Ok(true);
            }
            for transition in &self.states[id.0].transitions {
                if transition.action == EdgeAction::Proceed
                    && transition.condition.evaluate(value)?
                {
                    pending.push(transition.target);
                }
            }
        }
        Ok(false)
    }

    /// Applies one branch's decisions: every applicable edge spawns a successor, versions are
    /// spread so that sibling lineages stay distinguishable, and the consumed branch releases its
    /// buffer anchor.  The start branch is special twice over: it never follows Ignore edges
    /// (persisting already covers them), and it re-arms itself with a bumped version afterwards.
    fn apply(
        &mut self,
        computation: Computation,
        decisions: Decisions,
        wrapper: &EventWrapper<V>,
        arrival: u64,
        output: &mut Output<V>,
    ) {
        let is_start = self.kind(computation.state) == StateKind::Start;
        let take_siblings = decisions.takes.saturating_sub(1);
        let mut takes_to_visit = take_siblings;
        let mut ignores_to_visit = decisions.ignores;

        for edge in &decisions.edges {
            match edge.action {
                EdgeAction::Ignore => {
                    if is_start {
                        continue;
                    }
                    let version = if self.same_stage(edge.target, computation.state) {
                        let bump = self_bump(decisions.ignores, decisions.takes);
                        computation.version.increase(bump)
                    } else {
                        // An ignore discovered through a Proceed edge: the branch moves to a
                        // later stage's state while skipping this event.
                        let version = computation
                            .version
                            .increase((take_siblings + ignores_to_visit) as u32)
                            .add_stage();
                        ignores_to_visit -= 1;
                        version
                    };
                    if let Some(entry) = computation.previous {
                        self.buffer.retain(entry);
                    }
                    let seq = self.next_seq();
                    self.push_branch(
                        Computation {
                            state: edge.target,
                            previous: computation.previous,
                            version,
                            start_timestamp: computation.start_timestamp,
                            seq,
                        },
                        output,
                    );
                }
                EdgeAction::Take => {
                    let current_version = computation.version.increase(takes_to_visit as u32);
                    takes_to_visit = takes_to_visit.saturating_sub(1);
                    let next_version = current_version.add_stage();
                    let stage = self.states[edge.source.0].name.clone();
                    let entry = self.buffer.put(
                        stage,
                        wrapper.clone(),
                        arrival,
                        computation.previous,
                        current_version,
                    );
                    self.buffer.retain(entry);
                    let start_timestamp =
                        Some(computation.start_timestamp.unwrap_or(wrapper.timestamp));
                    let seq = self.next_seq();
                    self.push_branch(
                        Computation {
                            state: edge.target,
                            previous: Some(entry),
                            version: next_version.clone(),
                            start_timestamp,
                            seq,
                        },
                        output,
                    );
                    if edge.reaches_final {
                        for patch in self.buffer.extract_patches(entry, &next_version) {
                            output.matches.push(patch);
                        }
                    }
                }
                EdgeAction::Proceed => {
                    panic!("proceed edges are resolved while building the decision graph")
                }
            }
        }

        if is_start {
            let bump = self_bump(decisions.ignores, decisions.takes);
            self.arm_start(computation.version.increase(bump));
        } else if let Some(entry) = computation.previous {
            self.buffer.release(entry);
        }
    }

    /// Routes a freshly created branch: final states emit their matches at once, stop states kill
    /// the branch, everything else stays live.
    fn push_branch(&mut self, computation: Computation, output: &mut Output<V>) {
        match self.kind(computation.state) {
            StateKind::Stop => {
                if let Some(entry) = computation.previous {
                    self.buffer.release(entry);
                }
            }
            StateKind::Final => {
                if let Some(entry) = computation.previous {
                    for patch in self.buffer.extract_patches(entry, &computation.version) {
                        output.matches.push(patch);
                    }
                    self.buffer.release(entry);
                }
            }
            StateKind::Start | StateKind::Normal => self.computations.push(computation),
        }
    }
}

/// How far the last digit moves when a branch stays on its own stage: one slot past every
/// sibling branch that left this junction.
fn self_bump(ignores: usize, takes: usize) -> u32 {
    if ignores == 0 && takes == 0 {
        0
    } else {
        (ignores + takes.max(1)) as u32
    }
}

#[cfg(test)]
mod scenario_tests {
    use crate::compiler::compile;
    use crate::pattern::begin;
    use crate::test_support::has_name;
    use crate::test_support::match_of;
    use crate::test_support::named;
    use crate::test_support::run;
    use crate::test_support::TestEvent;

    use super::*;

    fn sorted<T: Ord>(mut items: Vec<T>) -> Vec<T> {
        items.sort();
        items
    }

    /// Two condition-free stages with skip-till-next continuity match every adjacent pair.
    #[test]
    fn skip_till_next_matches_adjacent_pairs() {
        let pattern = begin("s").followed_by("e");
        let mut nfa = compile(&pattern, false).expect("compiles");
        let events: Vec<(TestEvent, Timestamp)> = ["a", "b", "c", "d", "e"]
            .iter()
            .enumerate()
            .map(|(idx, name)| (named(*name, idx as u32 + 1), idx as Timestamp + 1))
            .collect();
        let (matches, timeouts) = run(&mut nfa, &events);
        assert!(timeouts.is_empty());
        let expected = (0..4)
            .map(|idx| {
                match_of(&[
                    ("s", &[events[idx].0.clone()]),
                    ("e", &[events[idx + 1].0.clone()]),
                ])
            })
            .collect::<Vec<_>>();
        assert_eq!(matches, expected);
    }

    /// Skip-till-any continuity matches every ordered pair, not just adjacent ones.
    #[test]
    fn skip_till_any_matches_all_ordered_pairs() {
        let pattern = begin("s").followed_by_any("e");
        let mut nfa = compile(&pattern, false).expect("compiles");
        let events: Vec<(TestEvent, Timestamp)> = ["a", "b", "c", "d", "e"]
            .iter()
            .enumerate()
            .map(|(idx, name)| (named(*name, idx as u32 + 1), idx as Timestamp + 1))
            .collect();
        let (matches, timeouts) = run(&mut nfa, &events);
        assert!(timeouts.is_empty());
        let mut expected = Vec::new();
        for first in 0..events.len() {
            for second in first + 1..events.len() {
                expected.push(match_of(&[
                    ("s", &[events[first].0.clone()]),
                    ("e", &[events[second].0.clone()]),
                ]));
            }
        }
        assert_eq!(sorted(matches), sorted(expected));
    }

    /// With strict continuity, an intervening event kills the branch.
    #[test]
    fn strict_continuity_rejects_intervening_events() {
        let pattern = begin("m")
            .filter(has_name("a"))
            .next("e")
            .filter(has_name("b"));
        let mut nfa = compile(&pattern, false).expect("compiles");
        let events = vec![
            (named("a", 1), 3),
            (named("c", 2), 4),
            (named("b", 3), 5),
        ];
        let (matches, timeouts) = run(&mut nfa, &events);
        assert!(matches.is_empty());
        assert!(timeouts.is_empty());
        // The dead branch released its buffer entries too.
        assert!(nfa.is_empty());
    }

    /// The window test: one match fits inside the window; both start events eventually expire,
    /// each reported at its two furthest partial prefixes.
    #[test]
    fn window_expires_partial_matches_into_timeouts() {
        let pattern = begin("start")
            .filter(has_name("start"))
            .followed_by_any("middle")
            .filter(has_name("middle"))
            .followed_by_any("end")
            .filter(has_name("end"))
            .within(10);
        let mut nfa = compile(&pattern, true).expect("compiles");
        let start1 = named("start", 1);
        let start2 = named("start", 2);
        let middle = named("middle", 3);
        let end1 = named("end", 5);
        let events = vec![
            (start1.clone(), 1),
            (start2.clone(), 2),
            (middle.clone(), 3),
            (named("foobar", 4), 4),
            (end1.clone(), 11),
            (named("end", 6), 13),
        ];
        let (matches, timeouts) = run(&mut nfa, &events);
        assert_eq!(
            matches,
            vec![match_of(&[
                ("start", &[start2.clone()]),
                ("middle", &[middle.clone()]),
                ("end", &[end1]),
            ])]
        );
        let expected = vec![
            (match_of(&[("start", &[start1.clone()])]), 11),
            (
                match_of(&[("start", &[start1]), ("middle", &[middle.clone()])]),
                11,
            ),
            (match_of(&[("start", &[start2.clone()])]), 13),
            (match_of(&[("start", &[start2]), ("middle", &[middle])]), 13),
        ];
        assert_eq!(sorted(timeouts), sorted(expected));
        // Nothing but the start branch survives the window.
        let tick = nfa.process(None, 30).expect("tick cannot fail");
        assert!(tick.is_empty());
        assert!(nfa.is_empty());
    }

    /// With skip-till-next junctions a take consumes its branch, so only the furthest partial
    /// match is left to expire.
    #[test]
    fn window_with_skip_till_next_expires_only_consumed_branches() {
        let pattern = begin("start")
            .filter(has_name("start"))
            .followed_by("middle")
            .filter(has_name("middle"))
            .followed_by("end")
            .filter(has_name("end"))
            .within(10);
        let mut nfa = compile(&pattern, true).expect("compiles");
        let start1 = named("start", 1);
        let start2 = named("start", 2);
        let middle = named("middle", 3);
        let end1 = named("end", 5);
        let events = vec![
            (start1.clone(), 1),
            (start2.clone(), 2),
            (middle.clone(), 3),
            (named("foobar", 4), 4),
            (end1.clone(), 11),
            (named("end", 6), 13),
        ];
        let (matches, timeouts) = run(&mut nfa, &events);
        assert_eq!(
            matches,
            vec![match_of(&[
                ("start", &[start2]),
                ("middle", &[middle.clone()]),
                ("end", &[end1]),
            ])]
        );
        assert_eq!(
            timeouts,
            vec![(
                match_of(&[("start", &[start1]), ("middle", &[middle])]),
                11
            )]
        );
    }

    /// One-or-more with combinations: every non-empty ordered subset of the repeated events.
    #[test]
    fn one_or_more_with_combinations_matches_every_subset() {
        let pattern = begin("s")
            .filter(has_name("c"))
            .followed_by_any("m")
            .filter(has_name("a"))
            .one_or_more()
            .allow_combinations()
            .followed_by("e")
            .filter(has_name("b"));
        let mut nfa = compile(&pattern, false).expect("compiles");
        let c = named("c", 1);
        let a1 = named("a", 2);
        let a2 = named("a", 3);
        let a3 = named("a", 4);
        let b = named("b", 5);
        let events = vec![
            (c.clone(), 1),
            (a1.clone(), 3),
            (a2.clone(), 4),
            (a3.clone(), 5),
            (b.clone(), 6),
        ];
        let (matches, timeouts) = run(&mut nfa, &events);
        assert!(timeouts.is_empty());
        let subsets: Vec<Vec<TestEvent>> = vec![
            vec![a1.clone()],
            vec![a2.clone()],
            vec![a3.clone()],
            vec![a1.clone(), a2.clone()],
            vec![a1.clone(), a3.clone()],
            vec![a2.clone(), a3.clone()],
            vec![a1.clone(), a2.clone(), a3.clone()],
        ];
        let expected = subsets
            .into_iter()
            .map(|subset| match_of(&[("s", &[c.clone()]), ("m", &subset[..]), ("e", &[b.clone()])]))
            .collect::<Vec<_>>();
        assert_eq!(sorted(matches), sorted(expected));
    }

    /// Zero-or-more at the head of the chain: contiguous runs of the repeated stage, plus the
    /// match that skips it entirely.
    #[test]
    fn zero_or_more_at_start_can_be_skipped() {
        let pattern = begin("m")
            .filter(has_name("a"))
            .one_or_more()
            .optional()
            .followed_by("e")
            .filter(has_name("b"));
        let mut nfa = compile(&pattern, false).expect("compiles");
        let a1 = named("a", 1);
        let a2 = named("a", 2);
        let a3 = named("a", 3);
        let b = named("b", 4);
        let events = vec![
            (a1.clone(), 3),
            (a2.clone(), 4),
            (a3.clone(), 5),
            (b.clone(), 6),
        ];
        let (matches, timeouts) = run(&mut nfa, &events);
        assert!(timeouts.is_empty());
        let runs: Vec<Vec<TestEvent>> = vec![
            vec![a1.clone()],
            vec![a1.clone(), a2.clone()],
            vec![a1.clone(), a2.clone(), a3.clone()],
            vec![a2.clone()],
            vec![a2.clone(), a3.clone()],
            vec![a3.clone()],
        ];
        let mut expected = runs
            .into_iter()
            .map(|run| match_of(&[("m", &run[..]), ("e", &[b.clone()])]))
            .collect::<Vec<_>>();
        expected.push(match_of(&[("e", &[b])]));
        assert_eq!(sorted(matches), sorted(expected));
    }

    /// An exact-repetition stage takes its count and no more.
    #[test]
    fn times_takes_exactly_its_count() {
        let pattern = begin("m")
            .filter(has_name("a"))
            .times(2)
            .followed_by("e")
            .filter(has_name("b"));
        let mut nfa = compile(&pattern, false).expect("compiles");
        let a1 = named("a", 1);
        let a2 = named("a", 2);
        let b = named("b", 3);
        let events = vec![(a1.clone(), 1), (a2.clone(), 2), (b.clone(), 3)];
        let (matches, timeouts) = run(&mut nfa, &events);
        assert!(timeouts.is_empty());
        assert_eq!(
            matches,
            vec![match_of(&[("m", &[a1, a2]), ("e", &[b])])]
        );
    }

    /// An optional middle stage can be skipped outright.
    #[test]
    fn optional_middle_stage_can_be_skipped() {
        let pattern = begin("a")
            .filter(has_name("a"))
            .followed_by("b")
            .filter(has_name("b"))
            .optional()
            .followed_by("c")
            .filter(has_name("c"));
        let mut nfa = compile(&pattern, false).expect("compiles");
        let first = named("a", 1);
        let last = named("c", 2);
        let events = vec![(first.clone(), 1), (last.clone(), 2)];
        let (matches, timeouts) = run(&mut nfa, &events);
        assert!(timeouts.is_empty());
        assert_eq!(
            matches,
            vec![match_of(&[("a", &[first]), ("c", &[last])])]
        );
    }

    /// A consecutive loop dies at the first gap; events after the gap cannot rejoin it.
    #[test]
    fn consecutive_loops_require_contiguous_repeats() {
        let pattern = begin("s")
            .filter(has_name("c"))
            .followed_by("m")
            .filter(has_name("a"))
            .one_or_more()
            .consecutive()
            .followed_by("e")
            .filter(has_name("b"));
        let mut nfa = compile(&pattern, false).expect("compiles");
        let c = named("c", 1);
        let a1 = named("a", 2);
        let a2 = named("a", 4);
        let b = named("b", 5);
        let events = vec![
            (c.clone(), 1),
            (a1.clone(), 2),
            (named("x", 3), 3),
            (a2, 4),
            (b.clone(), 5),
        ];
        let (matches, timeouts) = run(&mut nfa, &events);
        assert!(timeouts.is_empty());
        // Only the run broken off before the gap survives; nothing restarts at the second `a`,
        // because skip-till-next already committed the branch to the first one.
        assert_eq!(
            matches,
            vec![match_of(&[("s", &[c]), ("m", &[a1]), ("e", &[b])])]
        );
    }

    /// An exact-repetition group with combinations picks every ordered pair.
    #[test]
    fn times_with_combinations_matches_every_pair() {
        let pattern = begin("m")
            .filter(has_name("a"))
            .times(2)
            .allow_combinations()
            .followed_by("e")
            .filter(has_name("b"));
        let mut nfa = compile(&pattern, false).expect("compiles");
        let a1 = named("a", 1);
        let a2 = named("a", 2);
        let a3 = named("a", 3);
        let b = named("b", 4);
        let events = vec![
            (a1.clone(), 1),
            (a2.clone(), 2),
            (a3.clone(), 3),
            (b.clone(), 4),
        ];
        let (matches, timeouts) = run(&mut nfa, &events);
        assert!(timeouts.is_empty());
        let pairs: Vec<Vec<TestEvent>> = vec![
            vec![a1.clone(), a2.clone()],
            vec![a1.clone(), a3.clone()],
            vec![a2.clone(), a3.clone()],
        ];
        let expected = pairs
            .into_iter()
            .map(|pair| match_of(&[("m", &pair[..]), ("e", &[b.clone()])]))
            .collect::<Vec<_>>();
        assert_eq!(sorted(matches), sorted(expected));
    }

    /// Subtype filters narrow stages to one flavor of the event type.
    #[test]
    fn subtype_filters_narrow_stages() {
        use crate::test_support::as_named;
        use crate::test_support::as_stream;
        use crate::test_support::StreamEvent;

        let pattern = begin("big")
            .filter_subtype(as_stream, |event: &StreamEvent| event.id > 2)
            .followed_by("tag")
            .subtype(as_named);
        let mut nfa = compile(&pattern, false).expect("compiles");
        let small = TestEvent::from(StreamEvent { id: 1 });
        let big = TestEvent::from(StreamEvent { id: 5 });
        let tag = named("x", 7);
        let events = vec![(small, 1), (big.clone(), 2), (tag.clone(), 3)];
        let (matches, timeouts) = run(&mut nfa, &events);
        assert!(timeouts.is_empty());
        assert_eq!(
            matches,
            vec![match_of(&[("big", &[big]), ("tag", &[tag])])]
        );
    }

    /// A prune tick expires overdue branches without consuming an event.
    #[test]
    fn prune_ticks_report_expired_partials() {
        let pattern = begin("s")
            .filter(has_name("s"))
            .followed_by("e")
            .filter(has_name("e"))
            .within(5);
        let mut nfa = compile(&pattern, true).expect("compiles");
        let start = named("s", 1);
        nfa.process(Some(start.clone()), 1).expect("start");
        assert!(!nfa.is_empty());

        let early = nfa.process(None, 3).expect("tick");
        assert!(early.is_empty());
        assert!(!nfa.is_empty());

        let overdue = nfa.process(None, 6).expect("tick");
        assert_eq!(overdue.matches, vec![]);
        assert_eq!(overdue.timeouts, vec![(match_of(&[("s", &[start])]), 6)]);
        assert!(nfa.is_empty());
    }

    /// A chain ending in a quantified stage completes a match at every take, because the exit
    /// may never be triggered by a later event.
    #[test]
    fn trailing_one_or_more_emits_at_every_take() {
        let pattern = begin("s")
            .filter(has_name("c"))
            .followed_by("m")
            .filter(has_name("a"))
            .one_or_more();
        let mut nfa = compile(&pattern, false).expect("compiles");
        let c = named("c", 1);
        let a1 = named("a", 2);
        let a2 = named("a", 3);
        let events = vec![(c.clone(), 1), (a1.clone(), 2), (a2.clone(), 3)];
        let (matches, timeouts) = run(&mut nfa, &events);
        assert!(timeouts.is_empty());
        assert_eq!(
            matches,
            vec![
                match_of(&[("s", &[c.clone()]), ("m", &[a1.clone()])]),
                match_of(&[("s", &[c]), ("m", &[a1, a2])]),
            ]
        );
    }
}
