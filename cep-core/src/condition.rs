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

//! Defines the predicate vocabulary used to guard pattern stages.
//!
//! Conditions are opaque user values: the engine only ever calls [`evaluate`], and never inspects
//! or reorders them.  The easiest way to write one is a closure (any `Fn(&V) -> bool` is a
//! condition), but there are also combinators for conjunction, negation, fallible predicates, and
//! the projection-based filter that plays the role of a subtype check.
//!
//! [`evaluate`]: trait.Condition.html#tymethod.evaluate

use std::rc::Rc;

use crate::error::ConditionError;

/// A pure predicate over an event value.
///
/// Conditions must be pure: the engine may evaluate a condition against the same event more than
/// once (several branches can probe the same edge), and in no promised order.
pub trait Condition<V> {
    /// Returns whether this condition accepts `value`.  A condition that cannot decide, say
    /// because a lookup it depends on failed, reports a [`ConditionError`], which rejects the
    /// current event entirely.
    ///
    /// [`ConditionError`]: ../error/struct.ConditionError.html
    fn evaluate(&self, value: &V) -> Result<bool, ConditionError>;
}

impl<V, F> Condition<V> for F
where
    F: Fn(&V) -> bool,
{
    fn evaluate(&self, value: &V) -> Result<bool, ConditionError> {
        Ok(self(value))
    }
}

/// The condition that accepts every event.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct TrueCondition;

impl<V> Condition<V> for TrueCondition {
    fn evaluate(&self, _value: &V) -> Result<bool, ConditionError> {
        Ok(true)
    }
}

/// The negation of another condition.  The compiler uses this to guard the ignore edges of
/// skip-till-next stages: such a stage may only skip events its own condition would reject.
pub struct NotCondition<V>(Rc<dyn Condition<V>>);

impl<V> NotCondition<V> {
    pub fn new(inner: Rc<dyn Condition<V>>) -> NotCondition<V> {
        NotCondition(inner)
    }
}

impl<V> Condition<V> for NotCondition<V> {
    fn evaluate(&self, value: &V) -> Result<bool, ConditionError> {
        Ok(!self.0.evaluate(value)?)
    }
}

/// The conjunction of two conditions.  Evaluation short-circuits: if the left side rejects the
/// event, the right side is never consulted.
pub struct AndCondition<V> {
    left: Rc<dyn Condition<V>>,
    right: Rc<dyn Condition<V>>,
}

impl<V> AndCondition<V> {
    pub fn new(left: Rc<dyn Condition<V>>, right: Rc<dyn Condition<V>>) -> AndCondition<V> {
        AndCondition { left, right }
    }
}

impl<V> Condition<V> for AndCondition<V> {
    fn evaluate(&self, value: &V) -> Result<bool, ConditionError> {
        Ok(self.left.evaluate(value)? && self.right.evaluate(value)?)
    }
}

/// Wraps a fallible predicate.  Use [`try_filter`] to construct one.
///
/// [`try_filter`]: fn.try_filter.html
pub struct TryFilter<F>(F);

/// Constructs a condition from a predicate that can fail.  Plain closures implement
/// [`Condition`] directly; this adapter is for predicates that need to report
/// [`ConditionError`]s of their own.
///
/// [`Condition`]: trait.Condition.html
/// [`ConditionError`]: ../error/struct.ConditionError.html
pub fn try_filter<F>(predicate: F) -> TryFilter<F> {
    TryFilter(predicate)
}

impl<V, F> Condition<V> for TryFilter<F>
where
    F: Fn(&V) -> Result<bool, ConditionError>,
{
    fn evaluate(&self, value: &V) -> Result<bool, ConditionError> {
        (self.0)(value)
    }
}

/// A condition that accepts an event when a projection of it exists, and an inner predicate
/// accepts the projected value.  This is the Rust rendition of a subtype filter: for an event
/// enum, the projection picks out one variant's payload.
pub struct SubtypeCondition<V, S, F> {
    project: fn(&V) -> Option<&S>,
    inner: F,
}

/// Constructs a condition that accepts exactly the events `project` knows how to narrow.
pub fn subtype<V, S>(project: fn(&V) -> Option<&S>) -> SubtypeCondition<V, S, fn(&S) -> bool> {
    fn accept_any<S>(_value: &S) -> bool {
        true
    }
    SubtypeCondition {
        project,
        inner: accept_any,
    }
}

/// Constructs a condition that narrows the event with `project` and then applies `inner` to the
/// narrowed value.  Events the projection rejects are rejected outright.
pub fn filter_subtype<V, S, F>(project: fn(&V) -> Option<&S>, inner: F) -> SubtypeCondition<V, S, F>
where
    F: Fn(&S) -> bool,
{
    SubtypeCondition { project, inner }
}

impl<V, S, F> Condition<V> for SubtypeCondition<V, S, F>
where
    F: Fn(&S) -> bool,
{
    fn evaluate(&self, value: &V) -> Result<bool, ConditionError> {
        Ok(match (self.project)(value) {
            Some(narrowed) => (self.inner)(narrowed),
            None => false,
        })
    }
}
