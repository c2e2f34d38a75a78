#[cfg(test)]
mod tests {
    use aioos_core::{AioosError, Event, EventBus};
    use aioos_governance::{EscalationLevel, License, PermissionLevel};
    use aioos_registry::{Agent, AgentStatus, NewAgent, RegistryStore, TaskStatus};
    use aioos_runtime::*;
    use std::sync::Arc;

    fn store() -> Arc<RegistryStore> {
        Arc::new(RegistryStore::open_in_memory().unwrap())
    }

    fn agent(store: &RegistryStore, level: PermissionLevel, prohibited: &[&str]) -> Agent {
        let mut license = License::basic(level);
        license.prohibited_actions = prohibited.iter().map(|s| s.to_string()).collect();
        store
            .agents
            .create(NewAgent {
                owner_id: "alice".into(),
                name: "Scout".into(),
                license: Some(license),
                expires_at: None,
            })
            .unwrap()
    }

    // ── Authorization ──────────────────────────────────────────

    mod gate {
        use super::*;
        use std::time::Duration;

        #[test]
        fn test_low_risk_task_is_authorized() {
            let store = store();
            let agent = agent(&store, PermissionLevel::Autonomous, &[]);
            let gate = ExecutionGate::new(store.clone());

            let decision = gate
                .authorize(agent.id, "alice", "Send an email to the team", false)
                .unwrap();
            let GateDecision::Authorized { task_id, assessment } = decision else {
                panic!("expected authorization, got {decision:?}");
            };
            assert_eq!(assessment.escalation_level, EscalationLevel::AiHandles);

            let task = store.tasks.get(task_id).unwrap().unwrap();
            assert_eq!(task.status, TaskStatus::Running);
            assert_eq!(task.description, "Send an email to the team");

            let latest = &store.audit.query(Some(agent.id), 1).unwrap()[0];
            assert_eq!(latest.action, "task_started");
            assert_eq!(
                latest.details.as_deref(),
                Some("Task: Send an email to the team")
            );
        }

        #[test]
        fn test_review_needs_confirmation() {
            let store = store();
            let agent = agent(&store, PermissionLevel::ExecuteWithHuman, &[]);
            let gate = ExecutionGate::new(store.clone());
            let task = "Transfer $5000 to account ending in 4521";

            let first = gate.authorize(agent.id, "alice", task, false).unwrap();
            assert!(matches!(first, GateDecision::NeedsConfirmation(_)));
            assert!(store.tasks.for_agent(agent.id).unwrap().is_empty());
            assert_eq!(
                store.audit.count_action(Some(agent.id), "task_escalated").unwrap(),
                1
            );

            let second = gate.authorize(agent.id, "alice", task, true).unwrap();
            assert!(second.is_authorized());
            assert_eq!(
                second.assessment().unwrap().escalation_level,
                EscalationLevel::HumanReview
            );
            assert_eq!(store.tasks.for_agent(agent.id).unwrap().len(), 1);
        }

        #[test]
        fn test_high_risk_is_blocked_even_when_confirmed() {
            let store = store();
            let agent = agent(&store, PermissionLevel::Autonomous, &[]);
            let gate = ExecutionGate::new(store.clone());

            let decision = gate
                .authorize(
                    agent.id,
                    "alice",
                    "Wire $2500 from the bank account for the contract with private data",
                    true,
                )
                .unwrap();
            let GateDecision::Blocked(assessment) = decision else {
                panic!("expected block, got {decision:?}");
            };
            assert_eq!(assessment.overall_score, 7.5);
            assert!(store.tasks.for_agent(agent.id).unwrap().is_empty());
            assert_eq!(
                store.audit.count_action(Some(agent.id), "task_blocked").unwrap(),
                1
            );
        }

        #[test]
        fn test_advisory_only_is_blocked() {
            let store = store();
            let agent = agent(&store, PermissionLevel::AdvisoryOnly, &[]);
            let gate = ExecutionGate::new(store);
            let decision = gate.authorize(agent.id, "alice", "Say hello", true).unwrap();
            assert!(matches!(decision, GateDecision::Blocked(_)));
        }

        #[test]
        fn test_prohibited_action_is_blocked() {
            let store = store();
            let agent = agent(&store, PermissionLevel::Autonomous, &["sign_contract"]);
            let gate = ExecutionGate::new(store.clone());

            let decision = gate
                .authorize(agent.id, "alice", "Please sign here", true)
                .unwrap();
            let GateDecision::Blocked(assessment) = decision else {
                panic!("expected block, got {decision:?}");
            };
            assert!(assessment.is_prohibited());
            let latest = &store.audit.query(Some(agent.id), 1).unwrap()[0];
            assert!(
                latest
                    .details
                    .as_deref()
                    .unwrap()
                    .starts_with("Prohibited actions detected: sign_contract")
            );
        }

        #[test]
        fn test_input_errors() {
            let store = store();
            let agent = agent(&store, PermissionLevel::Autonomous, &[]);
            let gate = ExecutionGate::new(store);

            let err = gate.authorize(agent.id, "alice", "   ", false).unwrap_err();
            assert!(err.is_validation());

            let err = gate
                .authorize(uuid::Uuid::new_v4(), "alice", "Say hello", false)
                .unwrap_err();
            assert!(matches!(err, AioosError::AgentNotFound(_)));

            let err = gate
                .authorize(agent.id, "mallory", "Say hello", false)
                .unwrap_err();
            assert!(matches!(err, AioosError::Forbidden(_)));
        }

        #[test]
        fn test_revoked_agent_is_rejected() {
            let store = store();
            let agent = agent(&store, PermissionLevel::Autonomous, &[]);
            let gate = ExecutionGate::new(store.clone());
            store.agents.revoke(agent.id, "alice").unwrap();

            let decision = gate.authorize(agent.id, "alice", "Say hello", false).unwrap();
            assert_eq!(decision, GateDecision::Inactive(AgentStatus::Revoked));
            assert!(decision.assessment().is_none());
            assert_eq!(
                store.audit.count_action(Some(agent.id), "task_rejected").unwrap(),
                1
            );
        }

        #[test]
        fn test_unswept_expired_agent_is_rejected() {
            let store = store();
            let now = chrono::Utc::now();
            let agent = store
                .agents
                .create(NewAgent {
                    owner_id: "alice".into(),
                    name: "Scout".into(),
                    license: Some(License::basic(PermissionLevel::Autonomous)),
                    expires_at: Some(now + chrono::Duration::hours(1)),
                })
                .unwrap();
            let gate = ExecutionGate::new(store.clone());

            let later = now + chrono::Duration::hours(2);
            let decision = gate
                .authorize_at(agent.id, "alice", "Say hello", false, later)
                .unwrap();
            assert_eq!(decision, GateDecision::Inactive(AgentStatus::Expired));
            assert_eq!(
                store.audit.count_action(Some(agent.id), "task_rejected").unwrap(),
                1
            );
            let latest = &store.audit.query(Some(agent.id), 1).unwrap()[0];
            assert_eq!(latest.details.as_deref(), Some("Agent is expired"));
            assert!(store.tasks.for_agent(agent.id).unwrap().is_empty());
            assert_eq!(
                store.agents.stored_status(agent.id).unwrap(),
                Some(AgentStatus::Active)
            );
        }

        #[test]
        fn test_preview_is_truncated() {
            let store = store();
            let agent = agent(&store, PermissionLevel::Autonomous, &[]);
            let gate = ExecutionGate::new(store.clone()).with_preview_chars(10);

            gate.authorize(agent.id, "alice", "Send an email to the team", false)
                .unwrap();
            let latest = &store.audit.query(Some(agent.id), 1).unwrap()[0];
            assert_eq!(latest.details.as_deref(), Some("Task: Send an em"));
        }

        #[test]
        fn test_ensure_active_after_revoke() {
            let store = store();
            let agent = agent(&store, PermissionLevel::Autonomous, &[]);
            let gate = ExecutionGate::new(store.clone());

            assert!(gate.ensure_active(agent.id).is_ok());
            store.agents.revoke(agent.id, "alice").unwrap();
            let err = gate.ensure_active(agent.id).unwrap_err();
            assert!(matches!(err, AioosError::AgentRevoked(id) if id == agent.id));
            assert!(err.to_string().starts_with("AGENT_REVOKED"));
        }

        #[test]
        fn test_complete_updates_reputation() {
            let store = store();
            let agent = agent(&store, PermissionLevel::Autonomous, &[]);
            let gate = ExecutionGate::new(store.clone());
            let task_id = match gate.authorize(agent.id, "alice", "Say hello", false).unwrap() {
                GateDecision::Authorized { task_id, .. } => task_id,
                other => panic!("expected authorization, got {other:?}"),
            };

            let record = gate
                .complete(task_id, "alice", "said hello", Duration::from_secs(2))
                .unwrap();
            assert_eq!(record.status, TaskStatus::Completed);
            assert_eq!(record.result.as_deref(), Some("said hello"));
            assert!(record.completed_at.is_some());

            let reloaded = store.agents.get(agent.id, chrono::Utc::now()).unwrap().unwrap();
            assert_eq!(reloaded.reputation.tasks_completed, 1);
            assert_eq!(reloaded.reputation.trust_score, 76);
            assert_eq!(
                store.audit.count_action(Some(agent.id), "task_completed").unwrap(),
                1
            );

            let err = gate
                .complete(task_id, "alice", "again", Duration::from_secs(1))
                .unwrap_err();
            assert!(err.is_validation());
        }

        #[test]
        fn test_fail_and_abort() {
            let store = store();
            let agent = agent(&store, PermissionLevel::Autonomous, &[]);
            let gate = ExecutionGate::new(store.clone());
            let start = |gate: &ExecutionGate| match gate
                .authorize(agent.id, "alice", "Say hello", false)
                .unwrap()
            {
                GateDecision::Authorized { task_id, .. } => task_id,
                other => panic!("expected authorization, got {other:?}"),
            };

            let failed = start(&gate);
            let record = gate
                .fail(
                    failed,
                    "alice",
                    &AioosError::Validation("bad step".into()),
                    Duration::from_secs(1),
                )
                .unwrap();
            assert_eq!(record.status, TaskStatus::Failed);
            let rep = store
                .agents
                .get(agent.id, chrono::Utc::now())
                .unwrap()
                .unwrap()
                .reputation;
            assert_eq!(rep.success_rate, 0.0);
            assert_eq!(rep.trust_score, 26);

            let aborted = start(&gate);
            let record = gate
                .fail(
                    aborted,
                    "alice",
                    &AioosError::AgentRevoked(agent.id),
                    Duration::from_secs(1),
                )
                .unwrap();
            assert_eq!(record.status, TaskStatus::Aborted);
            let after = store
                .agents
                .get(agent.id, chrono::Utc::now())
                .unwrap()
                .unwrap()
                .reputation;
            assert_eq!(after, rep);
            assert_eq!(
                store.audit.count_action(Some(agent.id), "task_aborted").unwrap(),
                1
            );
            assert_eq!(
                store.audit.count_action(Some(agent.id), "task_failed").unwrap(),
                1
            );
        }

        fn refuse_audit(store: &RegistryStore, action: &str) {
            store
                .handle()
                .lock()
                .execute_batch(&format!(
                    "CREATE TRIGGER refuse_{action} BEFORE INSERT ON audit_logs
                     WHEN NEW.action = '{action}'
                     BEGIN SELECT RAISE(ABORT, 'audit unavailable'); END;"
                ))
                .unwrap();
        }

        fn allow_audit(store: &RegistryStore, action: &str) {
            store
                .handle()
                .lock()
                .execute_batch(&format!("DROP TRIGGER refuse_{action};"))
                .unwrap();
        }

        #[test]
        fn test_failed_start_audit_leaves_no_task() {
            let store = store();
            let agent = agent(&store, PermissionLevel::Autonomous, &[]);
            let gate = ExecutionGate::new(store.clone());
            refuse_audit(&store, "task_started");

            let err = gate
                .authorize(agent.id, "alice", "Say hello", false)
                .unwrap_err();
            assert!(matches!(err, AioosError::Storage(_)));
            assert!(store.tasks.for_agent(agent.id).unwrap().is_empty());
        }

        #[test]
        fn test_failed_completion_audit_rolls_back() {
            let store = store();
            let agent = agent(&store, PermissionLevel::Autonomous, &[]);
            let gate = ExecutionGate::new(store.clone());
            let GateDecision::Authorized { task_id, .. } =
                gate.authorize(agent.id, "alice", "Say hello", false).unwrap()
            else {
                panic!("expected authorization");
            };
            refuse_audit(&store, "task_completed");

            let err = gate
                .complete(task_id, "alice", "said hello", Duration::from_secs(2))
                .unwrap_err();
            assert!(matches!(err, AioosError::Storage(_)));
            let task = store.tasks.get(task_id).unwrap().unwrap();
            assert_eq!(task.status, TaskStatus::Running);
            assert!(task.completed_at.is_none());
            let rep = store
                .agents
                .get(agent.id, chrono::Utc::now())
                .unwrap()
                .unwrap()
                .reputation;
            assert_eq!(rep.tasks_completed, 0);

            allow_audit(&store, "task_completed");
            let record = gate
                .complete(task_id, "alice", "said hello", Duration::from_secs(2))
                .unwrap();
            assert_eq!(record.status, TaskStatus::Completed);
            assert_eq!(
                store.audit.count_action(Some(agent.id), "task_completed").unwrap(),
                1
            );
        }

        #[test]
        fn test_finish_counts_reputation_once() {
            let store = store();
            let agent = agent(&store, PermissionLevel::Autonomous, &[]);
            let gate = Arc::new(ExecutionGate::new(store.clone()));
            let GateDecision::Authorized { task_id, .. } =
                gate.authorize(agent.id, "alice", "Say hello", false).unwrap()
            else {
                panic!("expected authorization");
            };

            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let gate = Arc::clone(&gate);
                    std::thread::spawn(move || {
                        gate.complete(task_id, "alice", "done", Duration::from_secs(1))
                            .is_ok()
                    })
                })
                .collect();
            let succeeded = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|ok| *ok)
                .count();
            assert_eq!(succeeded, 1);

            let rep = store
                .agents
                .get(agent.id, chrono::Utc::now())
                .unwrap()
                .unwrap()
                .reputation;
            assert_eq!(rep.tasks_completed, 1);
            assert_eq!(
                store.audit.count_action(Some(agent.id), "task_completed").unwrap(),
                1
            );
        }

        #[test]
        fn test_steps_and_delegation_are_recorded() {
            let store = store();
            let agent = agent(&store, PermissionLevel::Autonomous, &[]);
            let gate = ExecutionGate::new(store.clone());
            let GateDecision::Authorized { task_id, .. } =
                gate.authorize(agent.id, "alice", "Say hello", false).unwrap()
            else {
                panic!("expected authorization");
            };

            let steps = vec![aioos_registry::TaskStep::new(1, "Greet", TaskStatus::Running)];
            let record = gate.record_steps(task_id, steps).unwrap();
            assert_eq!(record.steps.len(), 1);
            assert_eq!(record.status, TaskStatus::Running);

            gate.record_delegation_check(agent.id, "alice", "verified").unwrap();
            let latest = &store.audit.query(Some(agent.id), 1).unwrap()[0];
            assert_eq!(latest.action, "delegation_verified");
            assert_eq!(latest.details.as_deref(), Some("Status: verified"));
        }

        #[test]
        fn test_events_published() {
            let store = store();
            let agent = agent(&store, PermissionLevel::ExecuteWithHuman, &[]);
            let bus = EventBus::new(16);
            let mut rx = bus.subscribe();
            let gate = ExecutionGate::new(store).with_events(bus);

            gate.authorize(agent.id, "alice", "Transfer $5000 to account ending in 4521", false)
                .unwrap();
            match rx.try_recv().unwrap() {
                Event::TaskEscalated {
                    agent_id,
                    escalation_level,
                    ..
                } => {
                    assert_eq!(agent_id, agent.id);
                    assert_eq!(escalation_level, "human_review");
                }
                other => panic!("unexpected event {other:?}"),
            }

            gate.authorize(agent.id, "alice", "Say hello", false).unwrap();
            assert!(matches!(
                rx.try_recv().unwrap(),
                Event::TaskAuthorized { agent_id, .. } if agent_id == agent.id
            ));
        }
    }

    // ── Expiry sweeper ─────────────────────────────────────────

    mod sweeper {
        use super::*;
        use chrono::{Duration as ChronoDuration, Utc};
        use std::time::Duration;
        use tokio_util::sync::CancellationToken;

        /// An agent created an hour ago that expired half an hour ago.
        fn expired_agent(store: &RegistryStore) -> Agent {
            let created = Utc::now() - ChronoDuration::hours(1);
            store
                .agents
                .create_at(
                    NewAgent {
                        owner_id: "alice".into(),
                        name: "Temp".into(),
                        license: None,
                        expires_at: Some(created + ChronoDuration::minutes(30)),
                    },
                    created,
                )
                .unwrap()
        }

        #[tokio::test]
        async fn test_sweep_once_publishes_events() {
            let store = store();
            let agent = expired_agent(&store);
            let bus = EventBus::new(16);
            let mut rx = bus.subscribe();
            let sweeper = ExpirySweeper::new(store.clone(), bus, Duration::from_secs(60));

            let expired = sweeper.sweep_once(Utc::now()).unwrap();
            assert_eq!(expired, vec![agent.id]);
            assert!(matches!(
                rx.recv().await.unwrap(),
                Event::AgentExpired { agent_id, .. } if agent_id == agent.id
            ));
            assert!(matches!(
                rx.recv().await.unwrap(),
                Event::SweepCompleted { expired: 1, .. }
            ));
            assert_eq!(
                store.agents.stored_status(agent.id).unwrap(),
                Some(AgentStatus::Expired)
            );
        }

        #[tokio::test]
        async fn test_run_until_cancelled() {
            let store = store();
            let agent = expired_agent(&store);
            let bus = EventBus::new(64);
            let mut rx = bus.subscribe();
            let cancel = CancellationToken::new();
            let handle = ExpirySweeper::new(store.clone(), bus, Duration::from_millis(10))
                .spawn(cancel.clone());

            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert!(matches!(event, Event::AgentExpired { agent_id, .. } if agent_id == agent.id));

            cancel.cancel();
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(store.audit.count_action(Some(agent.id), "agent_expired").unwrap(), 1);
        }

        #[test]
        fn test_interval_from_config() {
            let config = aioos_config::SweepConfig {
                enabled: true,
                interval_secs: 30,
            };
            let sweeper = ExpirySweeper::from_config(store(), EventBus::default(), &config);
            assert_eq!(sweeper.interval(), Duration::from_secs(30));
        }
    }
}
