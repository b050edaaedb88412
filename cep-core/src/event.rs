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

//! Defines the timestamped wrapper that carries event values through the engine.

use std::fmt::Debug;
use std::fmt::Display;

/// Logical time.  The engine requires timestamps to be non-decreasing across events, but they
/// don't have to be unique; two events can share a timestamp.
pub type Timestamp = i64;

/// An event value paired with the logical time at which it was observed.
///
/// The engine is generic over the event value type `V`, and never looks inside a value itself;
/// stage conditions do that.  All it needs from `V` is the ability to clone values into the match
/// buffer and compare them in test assertions.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct EventWrapper<V> {
    pub value: V,
    pub timestamp: Timestamp,
}

impl<V> EventWrapper<V> {
    pub fn new(value: V, timestamp: Timestamp) -> EventWrapper<V> {
        EventWrapper { value, timestamp }
    }
}

impl<V: Display> Display for EventWrapper<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}@{}", self.value, self.timestamp)
    }
}

impl<V: Debug> Debug for EventWrapper<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}@{}", self.value, self.timestamp)
    }
}
