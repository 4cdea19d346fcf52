//! Process models: subjects, their states, and the transitions between them
//!
//! A model is assembled with [`ProcessModelBuilder`] and turned into an
//! immutable [`ProcessModel`] by [`ProcessModelBuilder::build`], which checks
//! the whole graph at once. Every problem found is reported; nothing about a
//! rejected model is kept.
//!
//! Each subject owns its own states. State ids are unique within a subject,
//! so two subjects may both have a state called `Submitted`.

use crate::{
    AttributeDefinition, AttributeSchemaEngine, ModelError, ModelResult, ModelViolation,
    SchemaPolicy, SchemaTree,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

// ── Identifiers ──────────────────────────────────────────────────────

/// Unique identifier for a registered process model
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessModelId(pub String);

impl ProcessModelId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl std::fmt::Display for ProcessModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a subject (role) within a model
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectId(pub String);

impl SubjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for SubjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a state within its subject
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateId(pub String);

impl StateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for StateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registry key: models are addressed by name and version
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelKey {
    pub name: String,
    pub version: u32,
}

impl ModelKey {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

impl std::fmt::Display for ModelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@v{}", self.name, self.version)
    }
}

// ── Kinds ────────────────────────────────────────────────────────────

/// What happens while a subject sits in a state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StateKind {
    /// Work to be done; produces a task
    Function,
    /// Hand a message to another subject; leaving emits the message
    Send,
    /// Wait for a message from another subject; leaving consumes it
    Receive,
    /// Terminal
    End,
}

impl StateKind {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End)
    }

    /// Transitions out of SEND and RECEIVE states carry a message event
    pub fn is_message(&self) -> bool {
        matches!(self, Self::Send | Self::Receive)
    }
}

impl std::fmt::Display for StateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Function => "FUNCTION",
            Self::Send => "SEND",
            Self::Receive => "RECEIVE",
            Self::End => "END",
        };
        f.write_str(name)
    }
}

/// Who acts for a subject
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubjectKind {
    /// Tasks are fetched and completed by people
    Human,
    /// Tasks are resolved by a registered execution provider
    Automated {
        provider: String,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        parameters: HashMap<String, String>,
    },
}

// ── Builder inputs ───────────────────────────────────────────────────

/// A subject as declared in a model definition
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubjectDefinition {
    pub id: SubjectId,
    pub name: String,
    pub kind: SubjectKind,
    pub start: Option<StateId>,
}

impl SubjectDefinition {
    pub fn human(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id: SubjectId(id),
            kind: SubjectKind::Human,
            start: None,
        }
    }

    pub fn automated(id: impl Into<String>, provider: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id: SubjectId(id),
            kind: SubjectKind::Automated {
                provider: provider.into(),
                parameters: HashMap::new(),
            },
            start: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn start(mut self, state: impl Into<String>) -> Self {
        self.start = Some(StateId::new(state));
        self
    }

    /// Add a provider parameter; ignored for human subjects
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let SubjectKind::Automated { parameters, .. } = &mut self.kind {
            parameters.insert(key.into(), value.into());
        }
        self
    }
}

/// A state as declared in a model definition
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateDefinition {
    pub id: StateId,
    pub name: String,
    pub kind: StateKind,
}

impl StateDefinition {
    pub fn new(id: impl Into<String>, kind: StateKind) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id: StateId(id),
            kind,
        }
    }

    pub fn function(id: impl Into<String>) -> Self {
        Self::new(id, StateKind::Function)
    }

    pub fn send(id: impl Into<String>) -> Self {
        Self::new(id, StateKind::Send)
    }

    pub fn receive(id: impl Into<String>) -> Self {
        Self::new(id, StateKind::Receive)
    }

    pub fn end(id: impl Into<String>) -> Self {
        Self::new(id, StateKind::End)
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// A directed edge between two states of the same subject
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub source: StateId,
    pub target: StateId,
    /// Guard/event name; required when the source is a SEND or RECEIVE state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
}

impl Transition {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: StateId::new(source),
            target: StateId::new(target),
            event: None,
            label: String::new(),
        }
    }

    /// Set the event name
    pub fn on(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

// ── Builder ──────────────────────────────────────────────────────────

/// Collects a model definition; [`build`](Self::build) validates it
#[derive(Clone, Debug, Default)]
pub struct ProcessModelBuilder {
    name: String,
    version: u32,
    description: String,
    subjects: Vec<SubjectDefinition>,
    states: Vec<(SubjectId, StateDefinition)>,
    transitions: Vec<(SubjectId, Transition)>,
    attributes: Vec<AttributeDefinition>,
}

impl ProcessModelBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: 1,
            ..Default::default()
        }
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn subject(mut self, subject: SubjectDefinition) -> Self {
        self.subjects.push(subject);
        self
    }

    pub fn state(mut self, subject: impl Into<String>, state: StateDefinition) -> Self {
        self.states.push((SubjectId::new(subject), state));
        self
    }

    pub fn transition(mut self, subject: impl Into<String>, transition: Transition) -> Self {
        self.transitions.push((SubjectId::new(subject), transition));
        self
    }

    pub fn attribute(mut self, attribute: AttributeDefinition) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn key(&self) -> ModelKey {
        ModelKey::new(self.name.clone(), self.version)
    }

    /// Validate the whole graph and produce an immutable model.
    ///
    /// All violations are collected; any violation rejects the model.
    pub fn build(self, policy: &SchemaPolicy) -> ModelResult<ProcessModel> {
        let mut violations = Vec::new();

        if self.name.trim().is_empty() {
            violations.push(ModelViolation::EmptyName);
        }
        if self.subjects.is_empty() {
            violations.push(ModelViolation::NoSubjects);
        }

        let mut subject_ids = HashSet::new();
        for subject in &self.subjects {
            if !subject_ids.insert(subject.id.clone()) {
                violations.push(ModelViolation::DuplicateSubject(subject.id.clone()));
            }
            if let SubjectKind::Automated { provider, .. } = &subject.kind {
                if provider.trim().is_empty() {
                    violations.push(ModelViolation::MissingProvider(subject.id.clone()));
                }
            }
        }

        // States grouped per subject, declaration order kept
        let mut states: HashMap<SubjectId, Vec<State>> = HashMap::new();
        for (subject, def) in &self.states {
            if !subject_ids.contains(subject) {
                violations.push(ModelViolation::UnknownSubject(subject.clone()));
                continue;
            }
            let owned = states.entry(subject.clone()).or_default();
            if owned.iter().any(|s| s.id == def.id) {
                violations.push(ModelViolation::DuplicateState {
                    subject: subject.clone(),
                    state: def.id.clone(),
                });
                continue;
            }
            owned.push(State {
                id: def.id.clone(),
                name: def.name.clone(),
                kind: def.kind,
                transitions: Vec::new(),
            });
        }

        for (subject, transition) in &self.transitions {
            let Some(owned) = states.get_mut(subject) else {
                if !subject_ids.contains(subject) {
                    violations.push(ModelViolation::UnknownSubject(subject.clone()));
                } else {
                    violations.push(ModelViolation::UnknownState {
                        subject: subject.clone(),
                        state: transition.source.clone(),
                    });
                }
                continue;
            };

            let mut endpoints_ok = true;
            for endpoint in [&transition.source, &transition.target] {
                if !owned.iter().any(|s| &s.id == endpoint) {
                    violations.push(ModelViolation::UnknownState {
                        subject: subject.clone(),
                        state: endpoint.clone(),
                    });
                    endpoints_ok = false;
                }
            }
            if !endpoints_ok {
                continue;
            }

            let Some(source) = owned.iter_mut().find(|s| s.id == transition.source) else {
                continue;
            };
            if source.transitions.iter().any(|t| {
                t.target == transition.target && t.event == transition.event
            }) {
                violations.push(ModelViolation::DuplicateTransition {
                    subject: subject.clone(),
                    from: transition.source.clone(),
                    to: transition.target.clone(),
                });
                continue;
            }
            if source.kind.is_message() && transition.event.is_none() {
                violations.push(ModelViolation::MissingEvent {
                    subject: subject.clone(),
                    from: transition.source.clone(),
                    to: transition.target.clone(),
                });
            }
            source.transitions.push(transition.clone());
        }

        let mut subjects = Vec::with_capacity(self.subjects.len());
        let mut seen = HashSet::new();
        for def in &self.subjects {
            if !seen.insert(def.id.clone()) {
                continue;
            }
            let owned = states.remove(&def.id).unwrap_or_default();

            for state in &owned {
                match (state.kind.is_terminal(), state.transitions.is_empty()) {
                    (true, false) => violations.push(ModelViolation::EndHasTransitions {
                        subject: def.id.clone(),
                        state: state.id.clone(),
                    }),
                    (false, true) => violations.push(ModelViolation::DeadEnd {
                        subject: def.id.clone(),
                        state: state.id.clone(),
                    }),
                    _ => {}
                }
            }

            let start = match &def.start {
                None => {
                    violations.push(ModelViolation::NoStartState(def.id.clone()));
                    None
                }
                Some(start) if !owned.iter().any(|s| &s.id == start) => {
                    violations.push(ModelViolation::UnknownState {
                        subject: def.id.clone(),
                        state: start.clone(),
                    });
                    None
                }
                Some(start) => Some(start.clone()),
            };

            if let Some(start) = &start {
                let reachable = reachable_from(&owned, start);
                for state in &owned {
                    if !reachable.contains(&state.id) {
                        violations.push(ModelViolation::Unreachable {
                            subject: def.id.clone(),
                            state: state.id.clone(),
                        });
                    }
                }
            }

            subjects.push(Subject {
                id: def.id.clone(),
                name: def.name.clone(),
                kind: def.kind.clone(),
                start: start.unwrap_or_else(|| StateId::new("")),
                states: owned,
            });
        }

        violations.extend(unpaired_receives(&subjects));

        let schema = match AttributeSchemaEngine::new(policy.clone()).build(&self.attributes) {
            Ok(schema) => Some(schema),
            Err(e) => {
                violations.push(e.into());
                None
            }
        };

        if !violations.is_empty() {
            return Err(ModelError::Invalid {
                model: self.name,
                violations,
            });
        }

        Ok(ProcessModel {
            id: ProcessModelId::generate(),
            name: self.name,
            version: self.version,
            description: self.description,
            subjects,
            schema: schema.unwrap_or_default(),
            created_at: Utc::now(),
        })
    }
}

/// Depth-first walk over a subject's transitions
fn reachable_from(states: &[State], start: &StateId) -> HashSet<StateId> {
    let mut visited = HashSet::new();
    let mut stack = vec![start.clone()];

    while let Some(current) = stack.pop() {
        if visited.insert(current.clone()) {
            if let Some(state) = states.iter().find(|s| s.id == current) {
                for t in &state.transitions {
                    if !visited.contains(&t.target) {
                        stack.push(t.target.clone());
                    }
                }
            }
        }
    }

    visited
}

/// Every event consumed by a RECEIVE transition must be emitted by a SEND
/// transition of some other subject.
fn unpaired_receives(subjects: &[Subject]) -> Vec<ModelViolation> {
    let mut senders: HashMap<&str, HashSet<&SubjectId>> = HashMap::new();
    for subject in subjects {
        for state in subject.states.iter().filter(|s| s.kind == StateKind::Send) {
            for event in state.transitions.iter().filter_map(|t| t.event.as_deref()) {
                senders.entry(event).or_default().insert(&subject.id);
            }
        }
    }

    let mut reported = HashSet::new();
    let mut violations = Vec::new();
    for subject in subjects {
        for state in subject.states.iter().filter(|s| s.kind == StateKind::Receive) {
            for event in state.transitions.iter().filter_map(|t| t.event.as_deref()) {
                let paired = senders
                    .get(event)
                    .is_some_and(|from| from.iter().any(|s| *s != &subject.id));
                if !paired && reported.insert((subject.id.clone(), event.to_string())) {
                    violations.push(ModelViolation::UnpairedReceive {
                        subject: subject.id.clone(),
                        event: event.to_string(),
                    });
                }
            }
        }
    }
    violations
}

// ── Validated model ──────────────────────────────────────────────────

/// A validated, immutable process model
#[derive(Clone, Debug, Serialize)]
pub struct ProcessModel {
    id: ProcessModelId,
    name: String,
    version: u32,
    description: String,
    subjects: Vec<Subject>,
    schema: SchemaTree,
    created_at: DateTime<Utc>,
}

impl ProcessModel {
    pub fn id(&self) -> &ProcessModelId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn key(&self) -> ModelKey {
        ModelKey::new(self.name.clone(), self.version)
    }

    pub fn subjects(&self) -> &[Subject] {
        &self.subjects
    }

    pub fn subject(&self, id: &SubjectId) -> Option<&Subject> {
        self.subjects.iter().find(|s| &s.id == id)
    }

    /// Look up a state of a subject
    pub fn state(&self, subject: &SubjectId, state: &StateId) -> Option<&State> {
        self.subject(subject).and_then(|s| s.state(state))
    }

    pub fn schema(&self) -> &SchemaTree {
        &self.schema
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Start state of every subject
    pub fn start_states(&self) -> BTreeMap<SubjectId, &State> {
        self.subjects
            .iter()
            .filter_map(|s| s.start_state().map(|st| (s.id.clone(), st)))
            .collect()
    }

    pub fn state_count(&self) -> usize {
        self.subjects.iter().map(|s| s.states.len()).sum()
    }

    pub fn transition_count(&self) -> usize {
        self.subjects
            .iter()
            .flat_map(|s| &s.states)
            .map(|st| st.transitions.len())
            .sum()
    }
}

/// A validated subject and the states it owns
#[derive(Clone, Debug, Serialize)]
pub struct Subject {
    id: SubjectId,
    name: String,
    kind: SubjectKind,
    start: StateId,
    states: Vec<State>,
}

impl Subject {
    pub fn id(&self) -> &SubjectId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &SubjectKind {
        &self.kind
    }

    pub fn is_automated(&self) -> bool {
        matches!(self.kind, SubjectKind::Automated { .. })
    }

    pub fn start(&self) -> &StateId {
        &self.start
    }

    pub fn start_state(&self) -> Option<&State> {
        self.state(&self.start)
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn state(&self, id: &StateId) -> Option<&State> {
        self.states.iter().find(|s| &s.id == id)
    }
}

/// A validated state with its outgoing transitions
#[derive(Clone, Debug, Serialize)]
pub struct State {
    id: StateId,
    name: String,
    kind: StateKind,
    transitions: Vec<Transition>,
}

impl State {
    pub fn id(&self) -> &StateId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> StateKind {
        self.kind
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// The transition to `target`, matching `event` when one is given.
    /// Declaration order breaks ties.
    pub fn find_transition(&self, target: &StateId, event: Option<&str>) -> Option<&Transition> {
        self.transitions.iter().find(|t| {
            &t.target == target && event.map_or(true, |e| t.event.as_deref() == Some(e))
        })
    }

    /// Events this state waits on, when it is a RECEIVE state
    pub fn receive_events(&self) -> impl Iterator<Item = &str> {
        self.transitions
            .iter()
            .filter(|_| self.kind == StateKind::Receive)
            .filter_map(|t| t.event.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AttributeDefinition, ScalarType, SchemaError};

    fn travel_request() -> ProcessModelBuilder {
        ProcessModelBuilder::new("TravelRequest")
            .subject(SubjectDefinition::human("applicant").start("Draft"))
            .state("applicant", StateDefinition::send("Draft"))
            .state("applicant", StateDefinition::end("Submitted"))
            .transition("applicant", Transition::new("Draft", "Submitted").on("submitted"))
            .subject(SubjectDefinition::human("approver").start("Submitted"))
            .state("approver", StateDefinition::receive("Submitted"))
            .state("approver", StateDefinition::end("Approved"))
            .state("approver", StateDefinition::end("Rejected"))
            .transition("approver", Transition::new("Submitted", "Approved").on("submitted"))
            .transition("approver", Transition::new("Submitted", "Rejected").on("submitted"))
    }

    fn violations(builder: ProcessModelBuilder) -> Vec<ModelViolation> {
        match builder.build(&SchemaPolicy::default()) {
            Err(ModelError::Invalid { violations, .. }) => violations,
            other => panic!("expected invalid model, got {:?}", other.map(|m| m.key())),
        }
    }

    #[test]
    fn test_build_valid_model() {
        let model = travel_request().build(&SchemaPolicy::default()).unwrap();
        assert_eq!(model.name(), "TravelRequest");
        assert_eq!(model.version(), 1);
        assert_eq!(model.subjects().len(), 2);
        assert_eq!(model.state_count(), 5);
        assert_eq!(model.transition_count(), 3);

        let approver = model.subject(&SubjectId::new("approver")).unwrap();
        assert_eq!(approver.start(), &StateId::new("Submitted"));
        assert_eq!(
            model
                .state(&SubjectId::new("applicant"), &StateId::new("Submitted"))
                .unwrap()
                .kind(),
            StateKind::End
        );
    }

    #[test]
    fn test_dead_end_rejected() {
        let builder = ProcessModelBuilder::new("Broken")
            .subject(SubjectDefinition::human("clerk").start("Intake"))
            .state("clerk", StateDefinition::function("Intake"))
            .state("clerk", StateDefinition::function("Review"))
            .transition("clerk", Transition::new("Intake", "Review"));

        let found = violations(builder);
        assert!(found.contains(&ModelViolation::DeadEnd {
            subject: SubjectId::new("clerk"),
            state: StateId::new("Review"),
        }));
    }

    #[test]
    fn test_all_violations_reported() {
        let builder = ProcessModelBuilder::new("")
            .subject(SubjectDefinition::human("clerk"))
            .state("clerk", StateDefinition::function("Intake"))
            .state("clerk", StateDefinition::end("Done"))
            .transition("clerk", Transition::new("Intake", "Nowhere"))
            .transition("ghost", Transition::new("A", "B"));

        let found = violations(builder);
        assert!(found.contains(&ModelViolation::EmptyName));
        assert!(found.contains(&ModelViolation::NoStartState(SubjectId::new("clerk"))));
        assert!(found.contains(&ModelViolation::UnknownState {
            subject: SubjectId::new("clerk"),
            state: StateId::new("Nowhere"),
        }));
        assert!(found.contains(&ModelViolation::UnknownSubject(SubjectId::new("ghost"))));
        assert!(found.len() >= 4);
    }

    #[test]
    fn test_unreachable_state_rejected() {
        let builder = ProcessModelBuilder::new("Island")
            .subject(SubjectDefinition::human("clerk").start("Intake"))
            .state("clerk", StateDefinition::function("Intake"))
            .state("clerk", StateDefinition::end("Done"))
            .state("clerk", StateDefinition::end("Island"))
            .transition("clerk", Transition::new("Intake", "Done"));

        let found = violations(builder);
        assert_eq!(
            found,
            vec![ModelViolation::Unreachable {
                subject: SubjectId::new("clerk"),
                state: StateId::new("Island"),
            }]
        );
    }

    #[test]
    fn test_cross_subject_transition_rejected() {
        let builder = travel_request().transition(
            "applicant",
            Transition::new("Draft", "Approved").on("submitted"),
        );
        let found = violations(builder);
        assert!(found.contains(&ModelViolation::UnknownState {
            subject: SubjectId::new("applicant"),
            state: StateId::new("Approved"),
        }));
    }

    #[test]
    fn test_end_state_with_transitions_rejected() {
        let builder = ProcessModelBuilder::new("Loop")
            .subject(SubjectDefinition::human("clerk").start("Intake"))
            .state("clerk", StateDefinition::function("Intake"))
            .state("clerk", StateDefinition::end("Done"))
            .transition("clerk", Transition::new("Intake", "Done"))
            .transition("clerk", Transition::new("Done", "Intake"));

        let found = violations(builder);
        assert!(found.contains(&ModelViolation::EndHasTransitions {
            subject: SubjectId::new("clerk"),
            state: StateId::new("Done"),
        }));
    }

    #[test]
    fn test_message_transitions_need_events() {
        let builder = ProcessModelBuilder::new("Silent")
            .subject(SubjectDefinition::human("a").start("Say"))
            .state("a", StateDefinition::send("Say"))
            .state("a", StateDefinition::end("Done"))
            .transition("a", Transition::new("Say", "Done"));

        let found = violations(builder);
        assert_eq!(
            found,
            vec![ModelViolation::MissingEvent {
                subject: SubjectId::new("a"),
                from: StateId::new("Say"),
                to: StateId::new("Done"),
            }]
        );
    }

    #[test]
    fn test_unpaired_receive_rejected() {
        let builder = ProcessModelBuilder::new("Lonely")
            .subject(SubjectDefinition::human("b").start("Wait"))
            .state("b", StateDefinition::receive("Wait"))
            .state("b", StateDefinition::end("Done"))
            .transition("b", Transition::new("Wait", "Done").on("ready"));

        let found = violations(builder);
        assert_eq!(
            found,
            vec![ModelViolation::UnpairedReceive {
                subject: SubjectId::new("b"),
                event: "ready".into(),
            }]
        );
    }

    #[test]
    fn test_schema_errors_reject_model() {
        let builder = travel_request()
            .attribute(AttributeDefinition::reference("trip", "missing"))
            .attribute(AttributeDefinition::simple("cost", ScalarType::Number));

        let found = violations(builder);
        assert_eq!(
            found,
            vec![ModelViolation::Schema(SchemaError::UnresolvedReference {
                attribute: crate::AttributeId::new("trip"),
                target: crate::AttributeId::new("missing"),
            })]
        );
    }

    #[test]
    fn test_automated_subject_needs_provider() {
        let builder = ProcessModelBuilder::new("Bot")
            .subject(SubjectDefinition::automated("bot", " ").start("Run"))
            .state("bot", StateDefinition::function("Run"))
            .state("bot", StateDefinition::end("Done"))
            .transition("bot", Transition::new("Run", "Done"));

        let found = violations(builder);
        assert_eq!(found, vec![ModelViolation::MissingProvider(SubjectId::new("bot"))]);
    }

    #[test]
    fn test_find_transition_by_event() {
        let model = ProcessModelBuilder::new("Choice")
            .subject(SubjectDefinition::human("a").start("Pick"))
            .state("a", StateDefinition::function("Pick"))
            .state("a", StateDefinition::end("Done"))
            .transition("a", Transition::new("Pick", "Done").on("fast"))
            .transition("a", Transition::new("Pick", "Done").on("slow"))
            .build(&SchemaPolicy::default())
            .unwrap();

        let pick = model
            .state(&SubjectId::new("a"), &StateId::new("Pick"))
            .unwrap();
        let done = StateId::new("Done");
        assert_eq!(
            pick.find_transition(&done, Some("slow")).unwrap().event.as_deref(),
            Some("slow")
        );
        assert_eq!(
            pick.find_transition(&done, None).unwrap().event.as_deref(),
            Some("fast")
        );
        assert!(pick.find_transition(&done, Some("other")).is_none());
    }

    #[test]
    fn test_model_key_display() {
        let key = ModelKey::new("TravelRequest", 3);
        assert_eq!(key.to_string(), "TravelRequest@v3");
    }
}
