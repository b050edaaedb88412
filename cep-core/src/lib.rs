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

mod buffer;
mod compiler;
mod condition;
mod dewey;
mod error;
mod event;
mod nfa;
mod pattern;

pub use buffer::EntryId;
pub use buffer::PatternMatch;
pub use buffer::SharedBuffer;
pub use compiler::compile;
pub use condition::filter_subtype;
pub use condition::subtype;
pub use condition::try_filter;
pub use condition::AndCondition;
pub use condition::Condition;
pub use condition::NotCondition;
pub use condition::SubtypeCondition;
pub use condition::TrueCondition;
pub use condition::TryFilter;
pub use dewey::DeweyNumber;
pub use error::ConditionError;
pub use error::MatchError;
pub use error::PatternError;
pub use event::EventWrapper;
pub use event::Timestamp;
pub use nfa::EdgeAction;
pub use nfa::Nfa;
pub use nfa::Output;
pub use nfa::StateId;
pub use nfa::StateKind;
pub use pattern::begin;
pub use pattern::Continuity;
pub use pattern::Pattern;
pub use pattern::Quantifier;

#[cfg(test)]
mod test_support;
