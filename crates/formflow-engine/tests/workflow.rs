use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use chrono::{TimeZone, Utc};
use serde_json::{Value, json};

use formflow_engine::{
    ActionStatus, DeliveryError, InMemoryStore, NotificationSink, RecordingSink, ResponseStatus,
    ResponseStore, ReviewDecision, ReviewError, SubmissionPipeline, WorkflowEngine, apply_review,
};
use formflow_spec::{
    ActionKind, FieldType, Form, FormStatus, FormVersion, MappingSource, Mode, Question, Section,
    Workflow, WorkflowAction,
};

fn question(name: &str, kind: FieldType, required: bool) -> Question {
    Question {
        name: name.into(),
        title: name.into(),
        description: None,
        kind,
        required,
        required_if: None,
        visible_if: None,
        constraint: None,
        choices: vec![],
        meta_data: None,
    }
}

fn form(id: &str, questions: Vec<Question>) -> Form {
    Form {
        id: id.into(),
        title: id.into(),
        description: None,
        status: FormStatus::Published,
        deleted: false,
        versions: vec![FormVersion {
            tag: "v1".into(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            published_at: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            sections: vec![Section {
                name: "ticket".into(),
                title: "Ticket".into(),
                description: None,
                visible_if: None,
                repeat: None,
                questions,
                sections: vec![],
            }],
            rules: vec![],
        }],
    }
}

fn create_sub_form_action(mapping: Vec<(&str, MappingSource)>) -> WorkflowAction {
    WorkflowAction {
        kind: ActionKind::CreateSubForm,
        target_form_id: Some("followup".into()),
        data_mapping: mapping
            .into_iter()
            .map(|(target, source)| (target.to_string(), source))
            .collect::<BTreeMap<_, _>>(),
        assign_to_user_field: None,
        message_template: None,
    }
}

fn escalation_workflow() -> Workflow {
    Workflow {
        id: "escalate-high".into(),
        trigger_form_id: "incident".into(),
        trigger_condition: Some("response['priority'] == 'High'".into()),
        active: true,
        actions: vec![create_sub_form_action(vec![(
            "detail",
            MappingSource::Path {
                path: "response.description".into(),
            },
        )])],
    }
}

fn setup(workflow: Workflow) -> (Arc<InMemoryStore>, Arc<RecordingSink>, Arc<WorkflowEngine>) {
    let store = Arc::new(InMemoryStore::new());
    store.insert_form(form(
        "incident",
        vec![
            question("priority", FieldType::Text, true),
            question("description", FieldType::Text, true),
        ],
    ));
    store.insert_form(form("followup", vec![question("detail", FieldType::Text, false)]));
    store.insert_workflow(workflow);

    let sink = Arc::new(RecordingSink::new());
    let engine = Arc::new(WorkflowEngine::new(
        store.clone(),
        store.clone(),
        store.clone(),
        sink.clone(),
    ));
    (store, sink, engine)
}

fn submit_high_priority(store: &Arc<InMemoryStore>, engine: &Arc<WorkflowEngine>) -> String {
    let pipeline =
        SubmissionPipeline::new(store.clone(), store.clone()).with_workflows(engine.clone());
    pipeline
        .submit(
            "incident",
            &json!({"ticket": {"priority": "High", "description": "fire"}}),
            Mode::Final,
            json!(null),
        )
        .unwrap()
        .id
}

#[test]
fn matching_trigger_creates_exactly_one_mapped_sub_form() {
    let (store, _sink, engine) = setup(escalation_workflow());
    submit_high_priority(&store, &engine);

    let created = store.responses_for("followup");
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].status, ResponseStatus::Pending);
    assert_eq!(created[0].version_tag, "v1");
    assert_eq!(created[0].data["detail"], json!("fire"));
}

#[test]
fn non_matching_trigger_executes_nothing() {
    let (store, _sink, engine) = setup(escalation_workflow());
    let pipeline =
        SubmissionPipeline::new(store.clone(), store.clone()).with_workflows(engine.clone());
    pipeline
        .submit(
            "incident",
            &json!({"ticket": {"priority": "Low", "description": "drip"}}),
            Mode::Final,
            json!(null),
        )
        .unwrap();

    assert!(store.responses_for("followup").is_empty());
}

#[test]
fn concurrent_retries_create_exactly_one_sub_form() {
    let (store, _sink, engine) = setup(escalation_workflow());
    // Submit without the engine wired, then redeliver concurrently.
    let pipeline = SubmissionPipeline::new(store.clone(), store.clone());
    let response = pipeline
        .submit(
            "incident",
            &json!({"ticket": {"priority": "High", "description": "fire"}}),
            Mode::Final,
            json!(null),
        )
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            let response_id = response.id.clone();
            thread::spawn(move || engine.evaluate_workflows(&response_id).unwrap())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.responses_for("followup").len(), 1);
}

#[test]
fn assign_to_user_field_sets_the_assignee() {
    let workflow = Workflow {
        id: "assign".into(),
        trigger_form_id: "incident".into(),
        trigger_condition: None,
        active: true,
        actions: vec![{
            let mut action = create_sub_form_action(vec![
                (
                    "detail",
                    MappingSource::Path {
                        path: "response.description".into(),
                    },
                ),
                ("owner", MappingSource::Literal(json!("oncall@example.com"))),
            ]);
            action.assign_to_user_field = Some("owner".into());
            action
        }],
    };
    let (store, _sink, engine) = setup(workflow);
    submit_high_priority(&store, &engine);

    let created = store.responses_for("followup");
    assert_eq!(created[0].assignee.as_deref(), Some("oncall@example.com"));
}

#[test]
fn notify_action_renders_template_and_emits() {
    let workflow = Workflow {
        id: "page-oncall".into(),
        trigger_form_id: "incident".into(),
        trigger_condition: Some("response['priority'] == 'High'".into()),
        active: true,
        actions: vec![WorkflowAction {
            kind: ActionKind::Notify,
            target_form_id: None,
            data_mapping: BTreeMap::new(),
            assign_to_user_field: None,
            message_template: Some("{{response.priority}} priority: {{response.description}}".into()),
        }],
    };
    let (store, sink, engine) = setup(workflow);
    let response_id = submit_high_priority(&store, &engine);

    let sent = sink.sent();
    assert_eq!(sent.len(), 1);
    let (kind, payload) = &sent[0];
    assert_eq!(kind, "notify");
    assert_eq!(payload["response_id"], json!(response_id));
    assert_eq!(payload["message"], json!("High priority: fire"));
}

/// Sink that always fails, standing in for an unreachable collaborator.
struct FailingSink;

impl NotificationSink for FailingSink {
    fn deliver(&self, _kind: &str, _payload: &Value) -> Result<(), DeliveryError> {
        Err(DeliveryError("gateway unreachable".into()))
    }
}

#[test]
fn one_failing_action_never_blocks_later_actions_or_workflows() {
    let store = Arc::new(InMemoryStore::new());
    store.insert_form(form(
        "incident",
        vec![
            question("priority", FieldType::Text, true),
            question("description", FieldType::Text, true),
        ],
    ));
    store.insert_form(form("followup", vec![question("detail", FieldType::Text, false)]));

    // First workflow: a notify that will fail, then a create that must
    // still run. Second workflow must also still run.
    store.insert_workflow(Workflow {
        id: "notify-then-create".into(),
        trigger_form_id: "incident".into(),
        trigger_condition: None,
        active: true,
        actions: vec![
            WorkflowAction {
                kind: ActionKind::Notify,
                target_form_id: None,
                data_mapping: BTreeMap::new(),
                assign_to_user_field: None,
                message_template: None,
            },
            create_sub_form_action(vec![("detail", MappingSource::Literal(json!("first")))]),
        ],
    });
    store.insert_workflow(Workflow {
        id: "second".into(),
        trigger_form_id: "incident".into(),
        trigger_condition: None,
        active: true,
        actions: vec![create_sub_form_action(vec![(
            "detail",
            MappingSource::Literal(json!("second")),
        )])],
    });

    let engine = Arc::new(WorkflowEngine::new(
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(FailingSink),
    ));
    let pipeline =
        SubmissionPipeline::new(store.clone(), store.clone()).with_workflows(engine.clone());
    let response = pipeline
        .submit(
            "incident",
            &json!({"ticket": {"priority": "High", "description": "fire"}}),
            Mode::Final,
            json!(null),
        )
        .unwrap();

    // The failing action is reported, isolated, and retryable; the
    // submission itself was never at risk.
    let results = engine.evaluate_workflows(&response.id).unwrap();
    assert_eq!(results.len(), 2);
    let first = &results[0];
    assert_eq!(first.actions[0].status, ActionStatus::Failed);
    // Already executed during the pipeline hand-off, so the redelivery
    // skips the create instead of duplicating it.
    assert_eq!(first.actions[1].status, ActionStatus::Skipped);
    assert_eq!(results[1].actions[0].status, ActionStatus::Skipped);

    assert_eq!(store.responses_for("followup").len(), 2);
}

#[test]
fn draft_responses_never_reach_workflows() {
    let (store, _sink, engine) = setup(escalation_workflow());
    let pipeline =
        SubmissionPipeline::new(store.clone(), store.clone()).with_workflows(engine.clone());
    pipeline
        .submit(
            "incident",
            &json!({"ticket": {"priority": "High", "description": "fire"}}),
            Mode::Draft,
            json!(null),
        )
        .unwrap();

    assert!(store.responses_for("followup").is_empty());
}

#[test]
fn review_transitions_require_comments_and_append_history() {
    let (store, _sink, engine) = setup(escalation_workflow());
    submit_high_priority(&store, &engine);
    let created = store.responses_for("followup");
    let sub_id = created[0].id.clone();

    // No comment, no transition.
    let err = apply_review(store.as_ref(), &sub_id, ReviewDecision::Approve, "  ").unwrap_err();
    assert!(matches!(err, ReviewError::EmptyComment));

    let rejected =
        apply_review(store.as_ref(), &sub_id, ReviewDecision::Reject, "incomplete").unwrap();
    assert_eq!(rejected.status, ResponseStatus::Rejected);

    // A rejected response cannot be approved directly; reopen first.
    let err =
        apply_review(store.as_ref(), &sub_id, ReviewDecision::Approve, "looks fine").unwrap_err();
    assert!(matches!(err, ReviewError::InvalidTransition { .. }));

    let reopened =
        apply_review(store.as_ref(), &sub_id, ReviewDecision::Reopen, "second look").unwrap();
    assert_eq!(reopened.status, ResponseStatus::Pending);

    let approved =
        apply_review(store.as_ref(), &sub_id, ReviewDecision::Approve, "verified").unwrap();
    assert_eq!(approved.status, ResponseStatus::Approved);

    let history = store.history(&sub_id).unwrap();
    let comments: Vec<_> = history.iter().filter_map(|entry| entry.comment.clone()).collect();
    assert!(comments.contains(&"incomplete".to_string()));
    assert!(comments.contains(&"second look".to_string()));
    assert!(comments.contains(&"verified".to_string()));
}
