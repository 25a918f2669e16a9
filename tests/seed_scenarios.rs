//! The seven seed scenarios from the spec's concrete end-to-end scenario
//! list: each exercises one cross-cutting behavior (unbuffered/buffered
//! channel ordering, selector-on-closed-channel, stack traces, future
//! chaining, replay nondeterminism, binary checksum bookkeeping) against
//! the real `wf-runtime`/`wf-engine` types rather than mocks.

use std::cell::RefCell;
use std::rc::Rc;

use wf_core::payload::Payload;
use wf_core::wire::{Command, HistoryEvent, TaskOutcome, WorkflowTask};
use wf_engine::{ExecutorConfig, NondeterminismPolicy, WorkflowExecutor, WorkflowFn};
use wf_runtime::Dispatcher;

fn log_handle() -> Rc<RefCell<Vec<String>>> {
    Rc::new(RefCell::new(Vec::new()))
}

#[test]
fn s1_unbuffered_channel_single_send() {
    let mut dispatcher = Dispatcher::new();
    let log = log_handle();
    let ch = dispatcher.create_channel::<String>("ch", None);

    {
        let log = log.clone();
        let ch = ch.clone();
        dispatcher.spawn("root", move |scope| {
            let log = log.clone();
            async move {
                log.borrow_mut().push("root-before-put".to_string());
                let child_log = log.clone();
                let child_ch = ch.clone();
                scope.spawn("child", move |child_scope| {
                    let log = child_log.clone();
                    let ch = child_ch.clone();
                    async move {
                        log.borrow_mut().push("child-start".to_string());
                        let (value, _more) = ch.receive(&child_scope).await.unwrap();
                        log.borrow_mut().push(format!("child-end-{}", value.unwrap()));
                    }
                });
                ch.send(&scope, "value1".to_string()).await.unwrap();
                log.borrow_mut().push("root-after-put".to_string());
            }
        });
    }

    dispatcher.execute_until_all_blocked().unwrap();
    assert!(dispatcher.is_done());
    assert_eq!(*log.borrow(), vec!["root-before-put", "child-start", "child-end-value1", "root-after-put"]);
}

#[test]
fn s2_buffered_channel_one_early_send() {
    let mut dispatcher = Dispatcher::new();
    let log = log_handle();
    let ch = dispatcher.create_channel::<String>("ch", Some(1));

    {
        let log = log.clone();
        let ch = ch.clone();
        dispatcher.spawn("root", move |scope| {
            let log = log.clone();
            async move {
                log.borrow_mut().push("root-before-put".to_string());
                let child_log = log.clone();
                let child_ch = ch.clone();
                scope.spawn("child", move |child_scope| {
                    let log = child_log.clone();
                    let ch = child_ch.clone();
                    async move {
                        log.borrow_mut().push("child-start".to_string());
                        let (v1, _) = ch.receive(&child_scope).await.unwrap();
                        log.borrow_mut().push(format!("child-end-{}", v1.unwrap()));
                        let (v2, _) = ch.receive(&child_scope).await.unwrap();
                        log.borrow_mut().push(format!("child-end-{}", v2.unwrap()));
                    }
                });
                let (accepted, _) = ch.send_async("value1".to_string()).unwrap();
                assert!(accepted);
                log.borrow_mut().push("root-after-put1".to_string());
                ch.send(&scope, "value2".to_string()).await.unwrap();
                log.borrow_mut().push("root-after-put2".to_string());
            }
        });
    }

    dispatcher.execute_until_all_blocked().unwrap();
    assert!(dispatcher.is_done());
    assert_eq!(
        *log.borrow(),
        vec!["root-before-put", "root-after-put1", "child-start", "child-end-value1", "child-end-value2", "root-after-put2"]
    );
}

#[test]
fn s3_select_on_closed_channel() {
    let mut dispatcher = Dispatcher::new();
    let ch = dispatcher.create_channel::<i32>("ch", Some(1));
    let (accepted, _) = ch.send_async(5).unwrap();
    assert!(accepted);
    ch.close().unwrap();

    let results: Rc<RefCell<Vec<Option<i32>>>> = Rc::new(RefCell::new(Vec::new()));
    {
        let ch = ch.clone();
        let results = results.clone();
        dispatcher.spawn("root", move |scope| async move {
            for _ in 0..4 {
                let r = scope.selector().add_receive(&ch, |v| v).await.unwrap();
                results.borrow_mut().push(r);
            }
        });
    }

    dispatcher.execute_until_all_blocked().unwrap();
    assert!(dispatcher.is_done());
    assert_eq!(*results.borrow(), vec![Some(5), None, None, None]);
}

#[test]
fn s4_stack_trace_lists_every_blocked_coroutine() {
    let mut dispatcher = Dispatcher::new();
    let ch = dispatcher.create_channel::<()>("forever_blocked", None);

    dispatcher.spawn("root", {
        let ch = ch.clone();
        move |scope| async move {
            ch.receive(&scope).await.unwrap();
        }
    });
    for i in 0..10 {
        let ch = ch.clone();
        dispatcher.spawn(format!("child{i}"), move |scope| async move {
            ch.receive(&scope).await.unwrap();
        });
    }

    dispatcher.execute_until_all_blocked().unwrap();
    assert!(!dispatcher.is_done());

    let trace = dispatcher.stack_trace();
    assert_eq!(trace.len(), 11);
    assert!(trace.iter().any(|line| line == "root: blocked on forever_blocked.Receive"));
    for i in 0..10 {
        assert!(trace.iter().any(|line| *line == format!("child{i}: blocked on forever_blocked.Receive")));
    }
}

#[test]
fn s5_future_chain_forwards_error() {
    let mut dispatcher = Dispatcher::new();
    let outcome: Rc<RefCell<Option<Result<(), String>>>> = Rc::new(RefCell::new(None));
    let read: Rc<RefCell<Option<String>>> = Rc::new(RefCell::new(None));

    {
        let outcome = outcome.clone();
        let read = read.clone();
        dispatcher.spawn("root", move |scope| async move {
            let (f1, s1) = scope.future::<String>();
            let (cf1, cs1) = scope.future::<String>();
            s1.chain(&cf1).unwrap();
            cs1.set(Some("ignored".to_string()), Some("e1".to_string())).unwrap();

            let out = Rc::new(RefCell::new(None));
            let result = f1.get(&scope, Some(out.clone())).await;
            *read.borrow_mut() = out.borrow_mut().take();
            *outcome.borrow_mut() = Some(result.map(|_| ()));
        });
    }

    dispatcher.execute_until_all_blocked().unwrap();
    assert!(dispatcher.is_done());
    assert_eq!(outcome.borrow().clone(), Some(Err("e1".to_string())));
    assert!(read.borrow().is_none());
}

fn greeter_workflow() -> WorkflowFn {
    Rc::new(|scope, _input| {
        Box::pin(async move {
            let activity = wf_engine::schedule_activity(&scope, "Greeter_Activity", vec![]);
            // The activity never actually resolves in this scenario (history
            // diverges before any completion event) — this blocks forever,
            // which is fine: the executor errors out while replaying the
            // mismatched ActivityTaskScheduled event, long before the
            // dispatcher would need this coroutine to make further progress.
            let _ = activity.get(&scope, None).await;
            Ok(Payload::from_bytes(vec![]))
        })
    })
}

fn mismatched_activity_history() -> Vec<HistoryEvent> {
    vec![
        HistoryEvent::WorkflowExecutionStarted { event_id: 100, workflow_type: "Greeter".to_string(), input: vec![] },
        HistoryEvent::WorkflowTaskScheduled { event_id: 101 },
        HistoryEvent::WorkflowTaskStarted { event_id: 102 },
        HistoryEvent::ActivityTaskScheduled { event_id: 103, scheduled_event_id: 1, activity_type: "some-other-activity".to_string(), input: vec![] },
    ]
}

fn task_with(history: Vec<HistoryEvent>) -> WorkflowTask {
    WorkflowTask {
        workflow_type: "Greeter".to_string(),
        workflow_id: "wf-1".to_string(),
        run_id: "run-1".to_string(),
        previous_started_event_id: None,
        started_event_id: history.last().map(|e| e.event_id()).unwrap_or(0),
        history,
        next_page: None,
        query: None,
        queries: vec![],
    }
}

#[test]
fn s6_activity_type_mismatch_blocks_workflow_by_default() {
    let mut executor = WorkflowExecutor::new(ExecutorConfig::default());
    executor.register_workflow("Greeter", greeter_workflow());

    let outcome = executor.execute_task(task_with(mismatched_activity_history()));
    match outcome {
        TaskOutcome::Failed { message, .. } => assert!(message.contains("nondeterministic"), "message was: {message}"),
        TaskOutcome::Completed { .. } => panic!("expected a failed task outcome under BlockWorkflow"),
    }
}

#[test]
fn s6_activity_type_mismatch_fails_workflow_under_fail_workflow_policy() {
    let config = ExecutorConfig { nondeterminism_policy: NondeterminismPolicy::FailWorkflow, ..ExecutorConfig::default() };
    let mut executor = WorkflowExecutor::new(config);
    executor.register_workflow("Greeter", greeter_workflow());

    let outcome = executor.execute_task(task_with(mismatched_activity_history()));
    match outcome {
        TaskOutcome::Completed { commands, .. } => {
            assert_eq!(commands.len(), 1);
            match &commands[0] {
                Command::FailWorkflowExecution { message, failure_type } => {
                    assert!(message.contains("FailWorkflow"), "message was: {message}");
                    assert_eq!(failure_type, "nondeterministic");
                }
                other => panic!("expected FailWorkflowExecution, got {other:?}"),
            }
        }
        TaskOutcome::Failed { message, .. } => panic!("expected a completed task outcome under FailWorkflow, got failure: {message}"),
    }
}

fn version_tracking_workflow() -> WorkflowFn {
    Rc::new(|scope, input| {
        Box::pin(async move {
            let current = String::from_utf8(input[0].as_bytes().to_vec()).unwrap_or_default();
            let mut checksums = wf_engine::seen_binary_checksums(&scope);
            checksums.push(current);
            let encoded = serde_json::to_vec(&checksums).unwrap_or_default();
            Ok(Payload::from_bytes(encoded))
        })
    })
}

#[test]
fn s7_binary_checksum_collection() {
    let mut executor = WorkflowExecutor::new(ExecutorConfig::default());
    executor.register_workflow("VersionTracker", version_tracking_workflow());

    let history = vec![
        HistoryEvent::WorkflowExecutionStarted {
            event_id: 1,
            workflow_type: "VersionTracker".to_string(),
            input: vec![Payload::from_bytes(b"current".to_vec())],
        },
        HistoryEvent::WorkflowTaskScheduled { event_id: 2 },
        HistoryEvent::WorkflowTaskStarted { event_id: 3 },
        HistoryEvent::WorkflowTaskCompleted { event_id: 4, binary_checksum: Some("chck1".to_string()) },
        HistoryEvent::WorkflowTaskScheduled { event_id: 5 },
        HistoryEvent::WorkflowTaskStarted { event_id: 6 },
        HistoryEvent::WorkflowTaskCompleted { event_id: 7, binary_checksum: Some("chck2".to_string()) },
        HistoryEvent::WorkflowTaskScheduled { event_id: 8 },
        HistoryEvent::WorkflowTaskStarted { event_id: 9 },
    ];

    let outcome = executor.execute_task(task_with(history));
    match outcome {
        TaskOutcome::Completed { commands, .. } => {
            let Command::CompleteWorkflowExecution { result } = &commands[0] else {
                panic!("expected CompleteWorkflowExecution, got {:?}", commands[0]);
            };
            let checksums: Vec<String> = serde_json::from_slice(result.as_bytes()).unwrap();
            assert_eq!(checksums, vec!["chck1".to_string(), "chck2".to_string(), "current".to_string()]);
        }
        TaskOutcome::Failed { message, .. } => panic!("workflow task failed: {message}"),
    }
}
