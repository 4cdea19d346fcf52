//! Shared models for the integration tests

#![allow(dead_code)]

use process_engine::{EngineConfig, ProcessOrchestrator};
use process_types::*;
use std::collections::BTreeMap;

/// applicant: Draft (SEND) -> Submitted (END) on "submitted"
/// approver: Submitted (RECEIVE) -> Approved | Rejected (END) on "submitted"
pub fn travel_request() -> ProcessModelBuilder {
    ProcessModelBuilder::new("TravelRequest")
        .description("Business trip approval")
        .subject(SubjectDefinition::human("applicant").start("Draft"))
        .subject(SubjectDefinition::human("approver").start("Submitted"))
        .state("applicant", StateDefinition::send("Draft"))
        .state("applicant", StateDefinition::end("Submitted"))
        .state("approver", StateDefinition::receive("Submitted"))
        .state("approver", StateDefinition::end("Approved"))
        .state("approver", StateDefinition::end("Rejected"))
        .transition(
            "applicant",
            Transition::new("Draft", "Submitted").on("submitted"),
        )
        .transition(
            "approver",
            Transition::new("Submitted", "Approved").on("submitted"),
        )
        .transition(
            "approver",
            Transition::new("Submitted", "Rejected").on("submitted"),
        )
        .attribute(AttributeDefinition::simple("destination", ScalarType::Text).required())
        .attribute(AttributeDefinition::simple("budget", ScalarType::Number))
}

/// clerk: Enter -> Check -> Filed, with a required amount
pub fn expense() -> ProcessModelBuilder {
    ProcessModelBuilder::new("Expense")
        .subject(SubjectDefinition::human("clerk").start("Enter"))
        .state("clerk", StateDefinition::function("Enter"))
        .state("clerk", StateDefinition::function("Check"))
        .state("clerk", StateDefinition::end("Filed"))
        .transition("clerk", Transition::new("Enter", "Check"))
        .transition("clerk", Transition::new("Check", "Filed"))
        .attribute(AttributeDefinition::simple("amount", ScalarType::Number).required())
}

/// An automated screener that hands over to a human reviewer
pub fn screening(provider: &str) -> ProcessModelBuilder {
    ProcessModelBuilder::new("Screening")
        .subject(SubjectDefinition::automated("scanner", provider).start("Scan"))
        .subject(SubjectDefinition::human("reviewer").start("Inbox"))
        .state("scanner", StateDefinition::send("Scan"))
        .state("scanner", StateDefinition::end("Scanned"))
        .state("reviewer", StateDefinition::receive("Inbox"))
        .state("reviewer", StateDefinition::end("Reviewed"))
        .transition("scanner", Transition::new("Scan", "Scanned").on("scanned"))
        .transition("reviewer", Transition::new("Inbox", "Reviewed").on("scanned"))
}

pub fn orchestrator_with(models: Vec<ProcessModelBuilder>) -> ProcessOrchestrator {
    let orchestrator = ProcessOrchestrator::new(EngineConfig::default());
    for model in models {
        orchestrator.register_model(model).unwrap();
    }
    orchestrator
}

pub fn trip_to(destination: &str) -> BTreeMap<AttributeId, AttributeValue> {
    BTreeMap::from([(
        AttributeId::new("destination"),
        AttributeValue::text(destination),
    )])
}

pub fn subject(id: &str) -> SubjectId {
    SubjectId::new(id)
}

pub fn actor(id: &str) -> ActorId {
    ActorId::new(id)
}
