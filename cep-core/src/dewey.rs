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

//! Defines the hierarchical version numbers that label branch lineages.
//!
//! Every live match branch carries a version like `1.0.2`.  Taking an event descends a level
//! ([`add_stage`]); siblings created at the same junction are told apart by bumping the last
//! digit ([`increase`]).  A flat counter would not work here: sibling branches share buffer
//! predecessors, and extraction must be able to select exactly the edges that belong to the
//! lineage which reached the final state.
//!
//! [`add_stage`]: struct.DeweyNumber.html#method.add_stage
//! [`increase`]: struct.DeweyNumber.html#method.increase

use std::fmt::Debug;
use std::fmt::Display;

use itertools::Itertools;
use smallvec::smallvec;
use smallvec::SmallVec;

/// A hierarchical version number: a non-empty list of digits, ordered root-first.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct DeweyNumber(SmallVec<[u32; 4]>);

impl DeweyNumber {
    pub fn new(start: u32) -> DeweyNumber {
        DeweyNumber(smallvec![start])
    }

    /// Returns the sibling version `by` positions over from this one.
    pub fn increase(&self, by: u32) -> DeweyNumber {
        let mut digits = self.0.clone();
        let last = digits.len() - 1;
        digits[last] += by;
        DeweyNumber(digits)
    }

    /// Returns the version one level deeper: the first descendant of this lineage.
    pub fn add_stage(&self) -> DeweyNumber {
        let mut digits = self.0.clone();
        digits.push(0);
        DeweyNumber(digits)
    }

    /// Returns whether this version lies on the lineage identified by `other`.
    ///
    /// That is the case when `other` is a strict prefix of this version (we descended from it),
    /// or when both have the same length, agree everywhere but the last digit, and our last digit
    /// is at least theirs (we are a later sibling at the same level).
    pub fn is_compatible_with(&self, other: &DeweyNumber) -> bool {
        if self.0.len() > other.0.len() {
            self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
        } else if self.0.len() == other.0.len() {
            let last = self.0.len() - 1;
            self.0[..last] == other.0[..last] && self.0[last] >= other.0[last]
        } else {
            false
        }
    }
}

impl Display for DeweyNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0.iter().join("."))
    }
}

impl Debug for DeweyNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        (self as &dyn Display).fmt(f)
    }
}
