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

use std::fmt::Debug;
use std::fmt::Display;

use auto_enums::enum_derive;
use auto_from::From;
use proptest::arbitrary::any;
use proptest::arbitrary::Arbitrary;
use proptest::strategy::BoxedStrategy;
use proptest::strategy::Strategy;

use crate::buffer::PatternMatch;
use crate::event::Timestamp;
use crate::nfa::Nfa;
use crate::nfa::Output;

/// An event with a name and an identifier.  Scenario tests match on the name and tell events
/// apart by the id.
#[derive(Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NamedEvent {
    pub name: &'static str,
    pub id: u32,
}

impl Display for NamedEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

impl Debug for NamedEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        (self as &dyn Display).fmt(f)
    }
}

/// An anonymous stream event, known only by its arrival id.  Property tests generate these in
/// bulk and let stage conditions discriminate on the id.
#[derive(Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct StreamEvent {
    pub id: u32,
}

impl Display for StreamEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "#{}", self.id)
    }
}

impl Debug for StreamEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        (self as &dyn Display).fmt(f)
    }
}

/// The event type the test suites run on.
#[enum_derive(Debug, Display)]
#[derive(Clone, Eq, From, Hash, Ord, PartialEq, PartialOrd)]
pub enum TestEvent {
    Named(NamedEvent),
    Stream(StreamEvent),
}

impl Arbitrary for TestEvent {
    type Parameters = ();
    type Strategy = BoxedStrategy<TestEvent>;

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        // A small id space makes collisions (and therefore interesting branch sharing) likely.
        any::<u32>()
            .prop_map(|id| TestEvent::from(StreamEvent { id: id % 8 }))
            .boxed()
    }
}

/// Constructs a named test event.
pub fn named(name: &'static str, id: u32) -> TestEvent {
    TestEvent::from(NamedEvent { name, id })
}

/// A condition accepting exactly the events called `name`.
pub fn has_name(name: &'static str) -> impl Fn(&TestEvent) -> bool + Clone {
    move |event: &TestEvent| match event {
        TestEvent::Named(event) => event.name == name,
        TestEvent::Stream(_) => false,
    }
}

/// Projects out the anonymous flavor of a test event.
pub fn as_stream(event: &TestEvent) -> Option<&StreamEvent> {
    match event {
        TestEvent::Stream(event) => Some(event),
        TestEvent::Named(_) => None,
    }
}

/// Projects out the named flavor of a test event.
pub fn as_named(event: &TestEvent) -> Option<&NamedEvent> {
    match event {
        TestEvent::Named(event) => Some(event),
        TestEvent::Stream(_) => None,
    }
}

/// Feeds a timestamped event sequence through `nfa`, collecting every match and timeout.
pub fn run(
    nfa: &mut Nfa<TestEvent>,
    events: &[(TestEvent, Timestamp)],
) -> (
    Vec<PatternMatch<TestEvent>>,
    Vec<(PatternMatch<TestEvent>, Timestamp)>,
) {
    let mut matches = Vec::new();
    let mut timeouts = Vec::new();
    for (event, timestamp) in events {
        let Output {
            matches: mut step_matches,
            timeouts: mut step_timeouts,
        } = nfa
            .process(Some(event.clone()), *timestamp)
            .expect("processing cannot fail in this test");
        matches.append(&mut step_matches);
        timeouts.append(&mut step_timeouts);
    }
    (matches, timeouts)
}

/// Builds the expected match map for a list of stages and their taken events.
pub fn match_of(stages: &[(&str, &[TestEvent])]) -> PatternMatch<TestEvent> {
    stages
        .iter()
        .map(|(name, events)| (name.to_string(), events.to_vec()))
        .collect()
}

#[test]
fn can_display_events() {
    assert_eq!(named("start", 1).to_string(), "start#1");
    assert_eq!(TestEvent::from(StreamEvent { id: 10 }).to_string(), "#10");
}
