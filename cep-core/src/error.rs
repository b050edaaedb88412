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

//! Defines the errors surfaced by the pattern compiler and the automaton runtime.
//!
//! These cover the ways that _callers_ can go wrong: handing us a nonsensical pattern, a
//! predicate that fails, or events that travel backwards in time.  Violations of the engine's own
//! internal invariants (buffer consistency, version monotonicity) are bugs, not errors, and are
//! asserted fatally instead.

use thiserror::Error;

/// A failure signalled by a user-supplied condition while it evaluated an event.
///
/// Conditions are opaque to the engine, so all we can carry is the message the condition chose to
/// report.  The event that provoked the failure is rejected wholesale; see
/// [`MatchError::Condition`].
///
/// [`MatchError::Condition`]: enum.MatchError.html#variant.Condition
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("condition failed: {0}")]
pub struct ConditionError(pub String);

impl ConditionError {
    pub fn new(message: impl Into<String>) -> ConditionError {
        ConditionError(message.into())
    }
}

/// A pattern that cannot be compiled into an automaton.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum PatternError {
    #[error("a pattern must contain at least one stage")]
    EmptyPattern,

    #[error("stage names must not be empty")]
    EmptyStageName,

    #[error("duplicate stage name {0:?}")]
    DuplicateStageName(String),

    #[error("a times quantifier must repeat at least once")]
    ZeroTimes,

    #[error("window duration must be positive, got {0}")]
    NonPositiveWindow(i64),
}

/// A failure while processing one event.
///
/// Whichever variant occurs, the offending event leaves no trace: the runtime either rejects it
/// before touching any state, or evaluates every condition up front so that nothing has been
/// written by the time a condition can fail.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum MatchError {
    #[error(transparent)]
    Condition(#[from] ConditionError),

    #[error("event at {timestamp} arrived after an event at {last}")]
    TimeRegression { timestamp: i64, last: i64 },

    #[error("live match branches ({count}) would exceed the configured limit ({limit})")]
    BranchOverflow { count: usize, limit: usize },
}
