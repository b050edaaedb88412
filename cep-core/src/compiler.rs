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

//! Translates a pattern chain into the automaton the runtime interprets.
//!
//! Compilation is a right-to-left fold: the final state is created first, and each stage is
//! turned into a small block of states whose exit edges point at the block compiled just before
//! it.  A stage's own condition guards the Take edges leaving its states, so an event taken
//! there is recorded under that stage's name.

use std::rc::Rc;

use smallvec::SmallVec;
use tracing::debug;

use crate::condition::Condition;
use crate::condition::NotCondition;
use crate::condition::TrueCondition;
use crate::error::PatternError;
use crate::nfa::EdgeAction;
use crate::nfa::Nfa;
use crate::nfa::NfaState;
use crate::nfa::StateId;
use crate::nfa::StateKind;
use crate::nfa::Transition;
use crate::pattern::Continuity;
use crate::pattern::Pattern;
use crate::pattern::Quantifier;
use crate::pattern::Stage;

/// The synthetic name of the accepting state.
pub(crate) const FINAL_STAGE: &str = "$final";
/// The synthetic name of the state that kills a branch.
pub(crate) const STOP_STAGE: &str = "$stop";

/// Compiles `pattern` into a runnable automaton.  With `handle_timeouts`, windowed branches that
/// expire are reported as timeout matches instead of vanishing silently.
pub fn compile<V: 'static>(pattern: &Pattern<V>, handle_timeouts: bool) -> Result<Nfa<V>, PatternError> {
    pattern.validate()?;
    let mut builder = Builder {
        states: Vec::new(),
        stop: None,
    };
    let mut sink = builder.state(Rc::from(FINAL_STAGE), StateKind::Final);
    for (idx, stage) in pattern.stages().iter().enumerate().rev() {
        sink = builder.stage_block(stage, sink, idx == 0);
    }
    // Within a state, branching materializes Proceed alternatives first, then the Take, then the
    // Ignores; keep the transitions in that order.
    for state in &mut builder.states {
        state.transitions.sort_by_key(|transition| match transition.action {
            EdgeAction::Proceed => 0,
            EdgeAction::Take => 1,
            EdgeAction::Ignore => 2,
        });
    }
    debug!(states = builder.states.len(), "compiled pattern");
    Ok(Nfa::new(
        builder.states,
        sink,
        pattern.window(),
        handle_timeouts,
    ))
}

struct Builder<V> {
    states: Vec<NfaState<V>>,
    stop: Option<StateId>,
}

fn always<V>() -> Rc<dyn Condition<V>> {
    Rc::new(TrueCondition)
}

impl<V: 'static> Builder<V> {
    fn state(&mut self, name: Rc<str>, kind: StateKind) -> StateId {
        self.states.push(NfaState {
            name,
            kind,
            transitions: SmallVec::new(),
        });
        StateId(self.states.len() - 1)
    }

    fn stop_state(&mut self) -> StateId {
        match self.stop {
            Some(id) => id,
            None => {
                let id = self.state(Rc::from(STOP_STAGE), StateKind::Stop);
                self.stop = Some(id);
                id
            }
        }
    }

    fn edge(
        &mut self,
        from: StateId,
        action: EdgeAction,
        target: StateId,
        condition: Rc<dyn Condition<V>>,
    ) {
        self.states[from.0].transitions.push(Transition {
            action,
            target,
            condition,
        });
    }

    /// Builds the states for one stage and returns the block's entry.  The head stage's entry
    /// becomes the start state.
    fn stage_block(&mut self, stage: &Stage<V>, sink: StateId, head: bool) -> StateId {
        let kind = if head {
            StateKind::Start
        } else {
            StateKind::Normal
        };
        let condition = stage.condition.clone().unwrap_or_else(always);
        match stage.quantifier {
            Quantifier::Single => {
                let entry = self.state(stage.name.clone(), kind);
                self.edge(entry, EdgeAction::Take, sink, condition.clone());
                if stage.optional {
                    self.edge(entry, EdgeAction::Proceed, sink, always());
                }
                self.junction_edges(entry, stage.continuity, &condition, head);
                entry
            }
            Quantifier::Times(count) => {
                // Unroll the repetitions back to front; the repeats after the first follow the
                // group's inner continuity.
                let mut next = sink;
                for _ in 1..count {
                    let copy = self.state(stage.name.clone(), StateKind::Normal);
                    self.edge(copy, EdgeAction::Take, next, condition.clone());
                    if let Some(guard) = self.repeat_guard(stage.inner, &condition) {
                        self.edge(copy, EdgeAction::Ignore, copy, guard);
                    }
                    next = copy;
                }
                let entry = self.state(stage.name.clone(), kind);
                self.edge(entry, EdgeAction::Take, next, condition.clone());
                if stage.optional {
                    self.edge(entry, EdgeAction::Proceed, sink, always());
                }
                self.junction_edges(entry, stage.continuity, &condition, head);
                entry
            }
            Quantifier::OneOrMore => {
                // Edge shape for a one-or-more stage with sink F:
                //
                //             TAKE(c)          PROCEED
                //    entry ────────────▶ loop ─────────▶ F
                //                        │  ▲ ⟲ TAKE(c)
                //               IGNORE(g)│  │TAKE(c)
                //                        ▼  │
                //                        shadow ⟲ IGNORE(g)
                //
                // The shadow state is what a looping branch ignores into.  It has no Proceed
                // exit: a branch that skipped an event must take another one before it may leave
                // the loop, otherwise the same branch would exit twice and duplicate its match.
                let looping = self.state(stage.name.clone(), StateKind::Normal);
                self.edge(looping, EdgeAction::Proceed, sink, always());
                self.edge(looping, EdgeAction::Take, looping, condition.clone());
                if let Some(guard) = self.repeat_guard(stage.inner, &condition) {
                    let shadow = self.state(stage.name.clone(), StateKind::Normal);
                    self.edge(shadow, EdgeAction::Take, looping, condition.clone());
                    self.edge(shadow, EdgeAction::Ignore, shadow, guard.clone());
                    self.edge(looping, EdgeAction::Ignore, shadow, guard);
                }
                let entry = self.state(stage.name.clone(), kind);
                self.edge(entry, EdgeAction::Take, looping, condition.clone());
                if stage.optional {
                    self.edge(entry, EdgeAction::Proceed, sink, always());
                }
                self.junction_edges(entry, stage.continuity, &condition, head);
                entry
            }
        }
    }

    /// The guard on the ignore edges inside a quantified group, per the group's inner continuity.
    /// Strict groups cannot ignore at all.
    fn repeat_guard(
        &self,
        inner: Continuity,
        condition: &Rc<dyn Condition<V>>,
    ) -> Option<Rc<dyn Condition<V>>> {
        match inner {
            Continuity::Strict => None,
            Continuity::SkipTillNext => Some(Rc::new(NotCondition::new(condition.clone()))),
            Continuity::SkipTillAny => Some(always()),
        }
    }

    /// The extra edges a stage's entry carries for the junction just before it.  The head stage
    /// has no junction: the persistent start branch already covers skipping.
    fn junction_edges(
        &mut self,
        entry: StateId,
        continuity: Continuity,
        condition: &Rc<dyn Condition<V>>,
        head: bool,
    ) {
        if head {
            return;
        }
        match continuity {
            Continuity::Strict => {
                // A strict junction turns any non-matching event into a dead branch.
                let stop = self.stop_state();
                let guard = Rc::new(NotCondition::new(condition.clone()));
                self.edge(entry, EdgeAction::Ignore, stop, guard);
            }
            Continuity::SkipTillNext => {
                let guard = Rc::new(NotCondition::new(condition.clone()));
                self.edge(entry, EdgeAction::Ignore, entry, guard);
            }
            Continuity::SkipTillAny => {
                self.edge(entry, EdgeAction::Ignore, entry, always());
            }
        }
    }
}
