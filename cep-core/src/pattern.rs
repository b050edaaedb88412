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

//! Defines patterns: chains of named stages with conditions, continuity and quantifier
//! modifiers, assembled with a fluent builder starting from [`begin`].
//!
//! ```
//! use cep_core::begin;
//!
//! let pattern = begin("first")
//!     .filter(|value: &u32| *value > 10)
//!     .followed_by("rest")
//!     .one_or_more()
//!     .within(100);
//! # let _ = pattern;
//! ```
//!
//! [`begin`]: fn.begin.html

use std::collections::HashSet;
use std::rc::Rc;

use crate::condition::AndCondition;
use crate::condition::Condition;
use crate::condition::SubtypeCondition;
use crate::error::PatternError;
use crate::event::Timestamp;

/// How events arriving between one stage and the next are treated.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Continuity {
    /// The very next event must match, or the branch dies.
    Strict,
    /// Non-matching events are skipped; the first matching event is taken.
    SkipTillNext,
    /// Any event may be skipped, matching ones included; every opportunity to take becomes its
    /// own branch.
    SkipTillAny,
}

/// How often a single stage repeats.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Quantifier {
    Single,
    Times(u32),
    OneOrMore,
}

/// One named position in a pattern chain.
pub struct Stage<V> {
    pub(crate) name: Rc<str>,
    pub(crate) condition: Option<Rc<dyn Condition<V>>>,
    pub(crate) continuity: Continuity,
    pub(crate) quantifier: Quantifier,
    pub(crate) optional: bool,
    pub(crate) inner: Continuity,
}

impl<V> Stage<V> {
    fn new(name: &str, continuity: Continuity) -> Stage<V> {
        Stage {
            name: Rc::from(name),
            condition: None,
            continuity,
            quantifier: Quantifier::Single,
            optional: false,
            inner: Continuity::SkipTillNext,
        }
    }
}

impl<V> Clone for Stage<V> {
    fn clone(&self) -> Stage<V> {
        Stage {
            name: self.name.clone(),
            condition: self.condition.clone(),
            continuity: self.continuity,
            quantifier: self.quantifier,
            optional: self.optional,
            inner: self.inner,
        }
    }
}

/// A chain of stages, optionally bounded by a time window.  Construct one with [`begin`] and the
/// builder methods; compile it with [`compile`].
///
/// [`begin`]: fn.begin.html
/// [`compile`]: ../compiler/fn.compile.html
pub struct Pattern<V> {
    stages: Vec<Stage<V>>,
    window: Option<Timestamp>,
}

impl<V> Clone for Pattern<V> {
    fn clone(&self) -> Pattern<V> {
        Pattern {
            stages: self.stages.clone(),
            window: self.window,
        }
    }
}

/// Opens a new pattern chain with its first stage.  Nothing can precede this stage.
pub fn begin<V>(name: &str) -> Pattern<V> {
    Pattern {
        stages: vec![Stage::new(name, Continuity::Strict)],
        window: None,
    }
}

impl<V: 'static> Pattern<V> {
    fn current(&mut self) -> &mut Stage<V> {
        self.stages.last_mut().expect("a pattern always has a stage")
    }

    /// ANDs a predicate onto the current stage.  Several filters on one stage must all accept an
    /// event for the stage to take it.
    pub fn filter(mut self, condition: impl Condition<V> + 'static) -> Pattern<V> {
        let stage = self.current();
        stage.condition = Some(match stage.condition.take() {
            Some(existing) => Rc::new(AndCondition::new(existing, Rc::new(condition))),
            None => Rc::new(condition),
        });
        self
    }

    /// ANDs a projection filter onto the current stage: only events that `project` can narrow
    /// are taken.
    pub fn subtype<S>(self, project: fn(&V) -> Option<&S>) -> Pattern<V>
    where
        V: 'static,
        S: 'static,
    {
        self.filter(crate::condition::subtype(project))
    }

    /// ANDs a narrowed predicate onto the current stage: the event must project through
    /// `project`, and the projected value must satisfy `inner`.
    pub fn filter_subtype<S, F>(self, project: fn(&V) -> Option<&S>, inner: F) -> Pattern<V>
    where
        V: 'static,
        S: 'static,
        F: Fn(&S) -> bool + 'static,
    {
        let condition: SubtypeCondition<V, S, F> = crate::condition::filter_subtype(project, inner);
        self.filter(condition)
    }

    /// Opens a new stage with strict continuity: its event must immediately follow the previous
    /// stage's.
    pub fn next(self, name: &str) -> Pattern<V> {
        self.stage(name, Continuity::Strict)
    }

    /// Opens a new stage with skip-till-next continuity: non-matching events in between are
    /// skipped, and the first matching event is taken.
    pub fn followed_by(self, name: &str) -> Pattern<V> {
        self.stage(name, Continuity::SkipTillNext)
    }

    /// Opens a new stage with skip-till-any continuity: every matching event in between becomes
    /// its own branch.
    pub fn followed_by_any(self, name: &str) -> Pattern<V> {
        self.stage(name, Continuity::SkipTillAny)
    }

    fn stage(mut self, name: &str, continuity: Continuity) -> Pattern<V> {
        self.stages.push(Stage::new(name, continuity));
        self
    }

    /// Makes the current stage optional: the chain may skip it entirely.  Combined with
    /// [`one_or_more`] this yields zero-or-more.
    ///
    /// [`one_or_more`]: #method.one_or_more
    pub fn optional(mut self) -> Pattern<V> {
        self.current().optional = true;
        self
    }

    /// Requires the current stage to match exactly `count` times.
    pub fn times(mut self, count: u32) -> Pattern<V> {
        self.current().quantifier = Quantifier::Times(count);
        self
    }

    /// Lets the current stage match one or more times.
    pub fn one_or_more(mut self) -> Pattern<V> {
        self.current().quantifier = Quantifier::OneOrMore;
        self
    }

    /// Requires the repetitions of a quantified stage to be contiguous.
    pub fn consecutive(mut self) -> Pattern<V> {
        self.current().inner = Continuity::Strict;
        self
    }

    /// Lets the repetitions of a quantified stage skip matching events, producing every
    /// combination of them.
    pub fn allow_combinations(mut self) -> Pattern<V> {
        self.current().inner = Continuity::SkipTillAny;
        self
    }

    /// Bounds the whole chain: a match's last event must arrive strictly less than `duration`
    /// after its first.
    pub fn within(mut self, duration: Timestamp) -> Pattern<V> {
        self.window = Some(duration);
        self
    }

    pub(crate) fn stages(&self) -> &[Stage<V>] {
        &self.stages
    }

    pub(crate) fn window(&self) -> Option<Timestamp> {
        self.window
    }

    pub(crate) fn validate(&self) -> Result<(), PatternError> {
        if self.stages.is_empty() {
            return Err(PatternError::EmptyPattern);
        }
        let mut names = HashSet::new();
        for stage in &self.stages {
            if stage.name.is_empty() {
                return Err(PatternError::EmptyStageName);
            }
            if !names.insert(stage.name.clone()) {
                return Err(PatternError::DuplicateStageName(stage.name.to_string()));
            }
            if stage.quantifier == Quantifier::Times(0) {
                return Err(PatternError::ZeroTimes);
            }
        }
        match self.window {
            Some(window) if window <= 0 => Err(PatternError::NonPositiveWindow(window)),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod pattern_tests {
    use super::*;

    use crate::test_support::TestEvent;

    #[test]
    fn builder_records_stages_in_order() {
        let pattern: Pattern<TestEvent> = begin("a").followed_by("b").next("c").within(10);
        let names = pattern
            .stages()
            .iter()
            .map(|stage| stage.name.to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(pattern.stages()[1].continuity, Continuity::SkipTillNext);
        assert_eq!(pattern.stages()[2].continuity, Continuity::Strict);
        assert_eq!(pattern.window(), Some(10));
        assert_eq!(pattern.validate(), Ok(()));
    }

    #[test]
    fn modifiers_apply_to_the_current_stage() {
        let pattern: Pattern<TestEvent> = begin("a")
            .followed_by_any("b")
            .one_or_more()
            .allow_combinations()
            .followed_by("c")
            .optional();
        assert_eq!(pattern.stages()[1].quantifier, Quantifier::OneOrMore);
        assert_eq!(pattern.stages()[1].inner, Continuity::SkipTillAny);
        assert!(!pattern.stages()[1].optional);
        assert!(pattern.stages()[2].optional);
    }

    #[test]
    fn rejects_duplicate_stage_names() {
        let pattern: Pattern<TestEvent> = begin("a").followed_by("a");
        assert_eq!(
            pattern.validate(),
            Err(PatternError::DuplicateStageName("a".to_string()))
        );
    }

    #[test]
    fn rejects_zero_times() {
        let pattern: Pattern<TestEvent> = begin("a").times(0);
        assert_eq!(pattern.validate(), Err(PatternError::ZeroTimes));
    }

    #[test]
    fn rejects_non_positive_windows() {
        let pattern: Pattern<TestEvent> = begin("a").within(0);
        assert_eq!(pattern.validate(), Err(PatternError::NonPositiveWindow(0)));
    }

    #[test]
    fn rejects_empty_stage_names() {
        let pattern: Pattern<TestEvent> = begin("");
        assert_eq!(pattern.validate(), Err(PatternError::EmptyStageName));
    }
}
