//! Rule loading and evaluation against real snapshots.

use chrono::Utc;
use serde_json::json;

use keel::project::{self, ProjectCustomData, ProjectState};
use keel::rules::{loader, Action, Condition, FileCooldowns, Operator, Rule, RuleEngine, RuleSource};
use keel::Error;

use super::fixtures::{inline, TestProject, RANKED_RULES};

fn goal_development(selected: &[&str]) -> ProjectState {
    let schema = project::schema();
    let mut state = ProjectState::new(&schema, "Acme", ProjectCustomData::default()).unwrap();
    state.advance_phase(&schema, true).unwrap();
    state.custom_data.goals.selected = selected.iter().map(|s| s.to_string()).collect();
    state
}

#[test]
fn test_higher_priority_first() {
    let engine = RuleEngine::new(loader::load(&inline("ranked", RANKED_RULES), "project").unwrap()).unwrap();
    let out = engine.evaluate(&goal_development(&[]), 5).unwrap();
    let ids: Vec<_> = out.iter().map(|s| s.rule_id.as_str()).collect();
    assert_eq!(ids, vec!["rank.high", "rank.low"]);
}

#[test]
fn test_equal_priority_order_is_stable() {
    let rules: Vec<Rule> = ["delta", "alpha", "charlie", "bravo"]
        .iter()
        .map(|id| Rule::new(id, id, 50, Condition::phase("goal-development"), Action::message(id)).with_cooldown_secs(0))
        .collect();
    let state = goal_development(&[]);

    let mut runs = Vec::new();
    for _ in 0..10 {
        let engine = RuleEngine::new(rules.clone()).unwrap();
        let out = engine.evaluate(&state, 10).unwrap();
        runs.push(out.into_iter().map(|s| s.rule_id).collect::<Vec<_>>());
    }
    assert!(runs.iter().all(|r| r == &runs[0]));
    assert_eq!(runs[0], vec!["alpha", "bravo", "charlie", "delta"]);
}

#[test]
fn test_selected_length_operator() {
    let three = goal_development(&["a", "b", "c"]).to_value().unwrap();
    let gt = |n: i64| Condition::field("goals.selected.length", Operator::GreaterThan, json!(n));
    assert!(gt(2).evaluate(&three));
    assert!(!gt(3).evaluate(&three));
}

#[test]
fn test_missing_field_keeps_literal_placeholder() {
    let rule = Rule::new(
        "review",
        "Review current goal",
        10,
        Condition::phase("goal-development"),
        Action::ToolCall {
            tool: "review_goal".into(),
            params: json!({ "title": "{{goals.current.title}}", "project": "{{name}}" }),
        },
    );
    let engine = RuleEngine::new(vec![rule]).unwrap();
    let out = engine.evaluate(&goal_development(&[]), 5).unwrap();

    assert_eq!(out.len(), 1);
    match &out[0].action {
        Action::ToolCall { params, .. } => {
            assert_eq!(params["title"], json!("{{goals.current.title}}"));
            assert_eq!(params["project"], json!("Acme"));
        }
        other => panic!("unexpected action {:?}", other),
    }
    assert_eq!(out[0].unresolved, vec!["goals.current.title".to_string()]);
}

#[test]
fn test_builtin_project_rules() {
    let engine = RuleEngine::new(loader::load(&loader::builtin_sources(), "project").unwrap()).unwrap();
    let out = engine.evaluate(&goal_development(&["a", "b", "c"]), 5).unwrap();
    let ids: Vec<_> = out.iter().map(|s| s.rule_id.as_str()).collect();
    assert_eq!(ids, vec!["project.too-many-goals", "project.start-execution"]);
    assert_eq!(
        out[0].action,
        Action::message("3 goals are selected for Acme. Consider narrowing the focus before committing to all of them.")
    );
}

#[test]
fn test_load_time_path_validation() {
    let typo = r#"[{ "id": "typo", "name": "Typo", "priority": 1,
        "condition": { "type": "field", "path": "goal.selected.length", "operator": "greaterThan", "value": 0 },
        "action": { "type": "message", "text": "hi" } }]"#;
    let engine = RuleEngine::new(loader::load(&inline("typo", typo), "project").unwrap()).unwrap();
    let probe = ProjectState::new(&project::schema(), "probe", ProjectCustomData::default())
        .unwrap()
        .to_value()
        .unwrap();
    assert!(matches!(
        engine.validate_paths(&probe),
        Err(Error::InvalidTemplatePath { ref path, .. }) if path == "goal.selected.length"
    ));
}

#[test]
fn test_duplicate_ids_across_sources_rejected() {
    let sources = vec![
        RuleSource::inline("first", RANKED_RULES),
        RuleSource::inline("second", RANKED_RULES),
    ];
    assert!(matches!(loader::load(&sources, "project"), Err(Error::DuplicateRule(_))));
}

#[test]
fn test_file_cooldowns_survive_engine_rebuild() {
    let project = TestProject::new();
    let state_dir = project.path.join(".workflow");
    let rule = || {
        Rule::new("nudge", "Nudge", 10, Condition::phase("goal-development"), Action::message("go"))
            .with_cooldown_secs(600)
    };
    let state = goal_development(&[]).to_value().unwrap();
    let now = Utc::now();

    let engine = RuleEngine::new(vec![rule()])
        .unwrap()
        .with_cooldowns(Box::new(FileCooldowns::in_state_dir(&state_dir)));
    assert_eq!(engine.evaluate_at(&state, 5, now).unwrap().len(), 1);

    let rebuilt = RuleEngine::new(vec![rule()])
        .unwrap()
        .with_cooldowns(Box::new(FileCooldowns::in_state_dir(&state_dir)));
    assert!(rebuilt.evaluate_at(&state, 5, now).unwrap().is_empty());
}

#[test]
fn test_instance_suggest_reflects_disk() {
    let project = TestProject::new();
    project.initialize("Acme");
    let instance = project.instance();
    instance
        .update(|mut s| {
            s.advance_phase(&project::schema(), true)?;
            Ok(s)
        })
        .unwrap();

    let before = instance.suggest(None).unwrap();
    assert_eq!(before[0].rule_id, "project.brainstorm-goals");

    project.add_potential_goal("search");
    let after = instance.suggest(None).unwrap();
    assert_eq!(after[0].rule_id, "project.select-goals");
    match &after[0].action {
        Action::ToolCall { params, .. } => assert_eq!(params["candidates"], json!(["search"])),
        other => panic!("unexpected action {:?}", other),
    }
}
