//! 答题 agent 的端到端流程测试（虚拟时钟，无浏览器）

use std::sync::Arc;
use std::time::Duration;

use quiz_autopilot::infrastructure::{ConfigStore, ManualClock, MemoryStore};
use quiz_autopilot::models::message::{ControlCommand, Message};
use quiz_autopilot::models::page_event::{NodeSummary, PageEvent};
use quiz_autopilot::models::session::keys;
use quiz_autopilot::models::snapshot::{DomSnapshot, ElementInfo};
use quiz_autopilot::services::notify_client::NotifyKind;
use quiz_autopilot::services::reporting_client::{MajorityAnswer, SessionCredentials};
use quiz_autopilot::services::{ElementLocator, LocatorProfile, UrlPattern};
use quiz_autopilot::workflow::answer_dispatcher::pick_letter;
use quiz_autopilot::workflow::{
    Agent, AgentSettings, ContextInfo, Effect, Input, Router, RouterOutput, Timer,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;

const POLL: &str = "https://student.iclicker.com/#/class/abc/poll";
const OVERVIEW: &str = "https://student.iclicker.com/#/course/abc/overview";

struct Harness {
    agent: Agent,
    clock: ManualClock,
}

impl Harness {
    fn new(store: Arc<MemoryStore>) -> Self {
        Self::with_settings(store, AgentSettings::default(), 1)
    }

    fn with_settings(store: Arc<MemoryStore>, settings: AgentSettings, seed: u64) -> Self {
        let clock = ManualClock::new();
        let agent = Agent::new(
            settings,
            store,
            Arc::new(clock.clone()),
            StdRng::seed_from_u64(seed),
        );
        Self { agent, clock }
    }

    fn start(&mut self, dom: &DomSnapshot) -> Vec<Effect> {
        self.agent.handle(
            Input::Message(Message::Control {
                command: ControlCommand::Start,
            }),
            dom,
        )
    }

    fn advance(&mut self, ms: u64, dom: &DomSnapshot) -> Vec<Effect> {
        self.clock.advance(Duration::from_millis(ms));
        self.agent.fire_due(dom)
    }

    /// 一次与题目无关的子树变更
    fn mutate(&mut self, dom: &DomSnapshot) -> Vec<Effect> {
        let node = NodeSummary {
            node_ref: 99,
            tag: "span".into(),
            ..Default::default()
        };
        self.agent
            .handle(Input::Mutations(vec![PageEvent::node_added(node, 0)]), dom)
    }

    /// 题目容器出现（重新渲染时编号不同）
    fn container_added(&mut self, node_ref: u64, dom: &DomSnapshot) -> Vec<Effect> {
        let node = NodeSummary {
            node_ref,
            tag: "div".into(),
            classes: vec!["question-type-container".into()],
            ..Default::default()
        };
        self.agent
            .handle(Input::Mutations(vec![PageEvent::node_added(node, 0)]), dom)
    }

    fn reply(&mut self, response: &str, dom: &DomSnapshot) -> Vec<Effect> {
        self.agent.handle(
            Input::Message(Message::ProcessAiResponse {
                response: response.into(),
            }),
            dom,
        )
    }
}

fn question_dom(letters: &[char]) -> DomSnapshot {
    let mut dom = DomSnapshot::at(POLL);
    dom.question_text = "Which planet is largest?".into();
    for (i, letter) in letters.iter().enumerate() {
        dom = dom.with_element(
            ElementInfo::new(i as u64 + 1)
                .with_id(format!("multiple-choice-{}", letter))
                .with_class("btn")
                .inside("btn-container")
                .with_pressed(false),
        );
    }
    dom
}

fn numeric_dom() -> DomSnapshot {
    let mut dom = DomSnapshot::at(POLL);
    dom.type_banner = "Numeric".into();
    dom.question_body = "A ball falls for 2 s. How far does it fall (m)?".into();
    dom.numeric_input = Some(20);
    dom.submit_button = Some(ElementInfo::new(30).with_id("submit"));
    dom
}

fn clicks(effects: &[Effect]) -> Vec<u64> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::Click(r) => Some(*r),
            _ => None,
        })
        .collect()
}

fn ai_requests(effects: &[Effect]) -> usize {
    effects
        .iter()
        .filter(|e| matches!(e, Effect::Send(Message::SendQuestionToAi { .. })))
        .count()
}

fn ai_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.set(keys::USE_AI, json!(true)).unwrap();
    store
}

#[test]
fn identical_fingerprints_dispatch_once() {
    let mut h = Harness::new(Arc::new(MemoryStore::new()));
    let dom = question_dom(&['a', 'b', 'c', 'd']);
    let mut effects = h.start(&dom);
    assert!(effects.contains(&Effect::AttachObserver));

    for _ in 0..20 {
        effects.extend(h.mutate(&dom));
    }
    effects.extend(h.advance(2500, &dom));
    for _ in 0..20 {
        effects.extend(h.mutate(&dom));
    }
    effects.extend(h.advance(5000, &dom));
    assert_eq!(clicks(&effects), vec![1]);

    // 我们的点击让 A 变为按下状态：这是作答反馈，不是新题目
    let mut answered = dom.clone();
    answered.elements[0].pressed = Some("true".into());
    let mut later = h.mutate(&answered);
    later.extend(h.advance(60_000, &answered));
    assert!(clicks(&later).is_empty());
}

#[test]
fn each_distinct_question_is_dispatched_once() {
    let mut h = Harness::new(Arc::new(MemoryStore::new()));
    let dom = question_dom(&['a', 'b', 'c', 'd']);
    let mut effects = h.start(&dom);
    effects.extend(h.advance(2500, &dom));
    effects.extend(h.advance(5000, &dom));

    // 选项消失后下一题出现
    effects.extend(h.mutate(&DomSnapshot::at(POLL)));
    let next = question_dom(&['a', 'b', 'c']);
    effects.extend(h.mutate(&next));
    effects.extend(h.mutate(&next));
    effects.extend(h.advance(2500, &next));
    effects.extend(h.advance(5000, &next));
    assert_eq!(clicks(&effects), vec![1, 1]);
}

#[test]
fn ai_letter_reply_selects_third_option() {
    let mut h = Harness::new(ai_store());
    let dom = question_dom(&['a', 'b', 'c', 'd', 'e']);
    h.start(&dom);
    let effects = h.advance(2500, &dom);
    assert_eq!(ai_requests(&effects), 1);
    assert!(h.agent.ai_in_flight());

    let effects = h.reply(r#"{"answer":"C"}"#, &dom);
    assert_eq!(clicks(&effects), vec![3]);
    assert!(!h.agent.ai_in_flight());
}

#[test]
fn malformed_reply_selects_default_letter() {
    let settings = AgentSettings {
        default_letter: 'B',
        ..AgentSettings::default()
    };
    let mut h = Harness::with_settings(ai_store(), settings, 1);
    let dom = question_dom(&['a', 'b', 'c', 'd', 'e']);
    h.start(&dom);
    h.advance(2500, &dom);
    assert!(clicks(&h.reply("I am not sure, sorry", &dom)).is_empty());
    assert_eq!(clicks(&h.advance(5000, &dom)), vec![2]);
}

#[test]
fn malformed_reply_selects_random_letter_when_enabled() {
    let store = ai_store();
    store.set(keys::RANDOM, json!(true)).unwrap();
    let mut h = Harness::with_settings(store, AgentSettings::default(), 9);
    let dom = question_dom(&['a', 'b', 'c', 'd', 'e']);
    h.start(&dom);
    h.advance(2500, &dom);
    h.reply("???", &dom);

    let mut rng = StdRng::seed_from_u64(9);
    let expected = pick_letter(true, &mut rng, 5, 'A');
    let expected_ref = (expected as u8 - b'A') as u64 + 1;
    assert_eq!(clicks(&h.advance(5000, &dom)), vec![expected_ref]);
}

#[test]
fn missing_destination_falls_back_within_one_cycle() {
    let store = ai_store();
    let consumers = vec![UrlPattern::new("https://student.iclicker.com/*").unwrap()];
    let mut router = Router::new(store.clone(), consumers).unwrap();
    let open = vec![ContextInfo::new("quiz", POLL)];

    let mut h = Harness::new(store);
    let dom = question_dom(&['a', 'b', 'c', 'd']);
    h.start(&dom);
    let request = h
        .advance(2500, &dom)
        .into_iter()
        .find_map(|e| match e {
            Effect::Send(message) => Some(message),
            _ => None,
        })
        .expect("question sent to router");

    let outputs = router.route("quiz", request, &open);
    let [RouterOutput::Deliver { to, message }] = outputs.as_slice() else {
        panic!("expected a single fallback, got {:?}", outputs);
    };
    assert_eq!(to, "quiz");
    assert!(matches!(message, Message::AiFallback { .. }));

    h.agent.handle(Input::Message(message.clone()), &dom);
    assert!(!h.agent.ai_in_flight());
    assert_eq!(clicks(&h.advance(5000, &dom)), vec![1]);
}

#[test]
fn numeric_question_without_ai_is_skipped() {
    let mut h = Harness::new(Arc::new(MemoryStore::new()));
    let dom = numeric_dom();
    let mut effects = h.start(&dom);
    effects.extend(h.advance(2500, &dom));
    effects.extend(h.mutate(&dom));
    effects.extend(h.advance(120_000, &dom));
    assert!(!effects
        .iter()
        .any(|e| matches!(e, Effect::FillNumeric { .. } | Effect::Click(_))));
    assert_eq!(ai_requests(&effects), 0);
}

#[test]
fn numeric_ai_answer_is_filled_then_submitted() {
    let mut h = Harness::new(ai_store());
    let dom = numeric_dom();
    h.start(&dom);
    assert_eq!(ai_requests(&h.advance(2500, &dom)), 1);

    let effects = h.reply(r#"{"answer":"19.6"}"#, &dom);
    assert_eq!(
        effects,
        vec![Effect::FillNumeric {
            element: 20,
            value: "19.6".into()
        }]
    );
    assert_eq!(clicks(&h.advance(400, &dom)), vec![30]);
}

#[test]
fn second_question_waits_for_outstanding_ai_request() {
    let mut h = Harness::new(ai_store());
    let first = question_dom(&['a', 'b', 'c', 'd']);
    h.start(&first);
    let mut effects = h.advance(2500, &first);

    let second = question_dom(&['a', 'b', 'c', 'd', 'e']);
    effects.extend(h.mutate(&second));
    effects.extend(h.advance(2500, &second));
    assert_eq!(ai_requests(&effects), 1);

    // 第一题的回复已过期：丢弃后第二题重新进入分发
    let stale = h.reply(r#"{"answer":"A"}"#, &second);
    assert!(clicks(&stale).is_empty());
    assert_eq!(ai_requests(&h.advance(2500, &second)), 1);
}

#[test]
fn ai_timeout_falls_back_to_direct_selection() {
    let mut h = Harness::new(ai_store());
    let dom = question_dom(&['a', 'b', 'c', 'd']);
    h.start(&dom);
    h.advance(2500, &dom);
    assert!(h.advance(74_000, &dom).is_empty());
    h.advance(1000, &dom);
    assert!(!h.agent.ai_in_flight());
    assert_eq!(clicks(&h.advance(5000, &dom)), vec![1]);
}

#[test]
fn kill_switch_stops_everything() {
    let mut h = Harness::new(Arc::new(MemoryStore::new()));
    let dom = question_dom(&['a', 'b', 'c', 'd']);
    h.start(&dom);
    h.agent.kill();
    assert!(h.agent.is_killed());
    assert!(!h.agent.observer_active());
    assert!(h.advance(60_000, &dom).is_empty());
    assert!(h.mutate(&dom).is_empty());
    assert!(h.reply(r#"{"answer":"B"}"#, &dom).is_empty());
}

#[test]
fn class_end_notifies_reloads_and_clears_status() {
    let store = Arc::new(MemoryStore::new());
    store.set(keys::NOTIFY, json!(true)).unwrap();
    store.set(keys::EMAIL, json!("me@school.edu")).unwrap();
    let mut h = Harness::new(store.clone());
    h.start(&question_dom(&['a', 'b']));
    assert_eq!(store.get(keys::STATUS), Some(json!("started")));

    let overview = DomSnapshot::at(OVERVIEW);
    let node = NodeSummary {
        node_ref: 7,
        tag: "div".into(),
        ..Default::default()
    };
    let effects = h.agent.handle(
        Input::Mutations(vec![PageEvent::attribute_changed(node, "aria-hidden", 0)]),
        &overview,
    );
    assert!(effects.contains(&Effect::DisconnectObserver));
    assert!(effects.contains(&Effect::Notify {
        kind: NotifyKind::ClassEnd,
        email: "me@school.edu".into(),
        img: None,
        then_reload: true,
    }));
    assert!(!h.agent.observer_active());
    assert_eq!(store.get(keys::STATUS), None);
}

#[test]
fn start_on_overview_joins_when_auto_join_is_on() {
    let store = Arc::new(MemoryStore::new());
    store.set(keys::AUTO_JOIN, json!(true)).unwrap();
    let mut h = Harness::new(store);
    let mut overview = DomSnapshot::at(OVERVIEW);
    overview.join_card_expanded = true;
    overview.join_button = Some(ElementInfo::new(40).with_text("Join"));
    let effects = h.start(&overview);
    assert_eq!(clicks(&effects), vec![40]);
    assert!(effects.contains(&Effect::CaptureSession));
}

#[test]
fn locator_prefers_ids_then_classes_then_structure() {
    let locator = ElementLocator::new(&LocatorProfile::default());

    let by_class = DomSnapshot::at(POLL)
        .with_element(ElementInfo::new(1).with_class("btn").inside("btn-container"))
        .with_element(ElementInfo::new(2).with_class("btn").inside("btn-container"))
        .with_element(ElementInfo::new(3).inside("answer-controls-container"))
        .with_element(ElementInfo::new(4).inside("answer-controls-container"));
    let refs: Vec<u64> = locator
        .locate(&by_class)
        .unwrap()
        .iter()
        .map(|e| e.element_ref)
        .collect();
    assert_eq!(refs, vec![1, 2]);

    let structural = DomSnapshot::at(POLL)
        .with_element(ElementInfo::new(3).inside("answer-controls-container"))
        .with_element(ElementInfo::new(4).inside("answer-controls-container"))
        .with_element(ElementInfo::new(5).inside("answer-controls-container").disabled());
    let refs: Vec<u64> = locator
        .locate(&structural)
        .unwrap()
        .iter()
        .map(|e| e.element_ref)
        .collect();
    assert_eq!(refs, vec![3, 4]);

    assert!(locator.locate(&DomSnapshot::at(POLL)).is_err());
}

#[test]
fn vanished_options_release_the_lock_for_the_next_appearance() {
    let mut h = Harness::new(Arc::new(MemoryStore::new()));
    let dom = question_dom(&['a', 'b', 'c', 'd']);
    h.start(&dom);

    // 作答前选项消失：重新确认失败，解锁
    let empty = DomSnapshot::at(POLL);
    let mut effects = h.mutate(&empty);
    effects.extend(h.advance(2500, &empty));
    assert!(clicks(&effects).is_empty());
    assert!(!h.agent.is_locked());

    // 同一组选项重新出现按新题目处理
    let mut effects = h.mutate(&dom);
    assert!(h.agent.is_locked());
    effects.extend(h.advance(2500, &dom));
    effects.extend(h.advance(5000, &dom));
    assert_eq!(clicks(&effects), vec![1]);
}

#[test]
fn url_change_abandons_question_and_reattaches_observer() {
    let mut h = Harness::new(Arc::new(MemoryStore::new()));
    let dom = question_dom(&['a', 'b', 'c', 'd']);
    h.agent.handle(Input::Boot, &dom);
    h.start(&dom);
    assert!(h.agent.is_pending(Timer::AnswerDelay));

    let mut moved = question_dom(&['a', 'b', 'c', 'd']);
    moved.url = "https://student.iclicker.com/#/class/xyz/poll".into();
    moved.root_token = Some(2);
    let effects = h.advance(500, &moved);
    assert!(effects.contains(&Effect::CaptureSession));
    assert!(effects.ends_with(&[Effect::DisconnectObserver, Effect::AttachObserver]));
    assert!(!h.agent.is_pending(Timer::AnswerDelay));
    assert!(!h.agent.is_locked());

    let mut effects = h.mutate(&moved);
    effects.extend(h.advance(2500, &moved));
    effects.extend(h.advance(5000, &moved));
    assert_eq!(clicks(&effects), vec![1]);
}

#[test]
fn page_becoming_visible_resumes_running_observer() {
    let store = Arc::new(MemoryStore::new());
    store.set(keys::STATUS, json!("started")).unwrap();
    let settings = AgentSettings {
        boot_resume: Duration::from_secs(5),
        ..AgentSettings::default()
    };
    let mut h = Harness::with_settings(store, settings, 1);

    let mut hidden = question_dom(&['a', 'b']);
    hidden.visible = false;
    h.agent.handle(Input::Boot, &hidden);
    assert!(h.advance(0, &hidden).is_empty());
    assert!(!h.agent.observer_active());

    let effects = h.advance(500, &question_dom(&['a', 'b']));
    assert!(effects.contains(&Effect::AttachObserver));
    assert!(h.agent.observer_active());

    // 启动恢复计时到期时观察器已在运行，不重复挂载
    let later = h.advance(4500, &question_dom(&['a', 'b']));
    assert!(!later.contains(&Effect::AttachObserver));
}

#[test]
fn boot_resumes_when_previously_started() {
    let store = Arc::new(MemoryStore::new());
    store.set(keys::STATUS, json!("started")).unwrap();
    let mut h = Harness::new(store);
    let dom = question_dom(&['a', 'b']);
    let effects = h.agent.handle(Input::Boot, &dom);
    assert!(!effects.contains(&Effect::AttachObserver));
    assert!(h.agent.is_pending(Timer::BootResume));

    let effects = h.advance(500, &dom);
    assert!(effects.contains(&Effect::AttachObserver));
    assert!(h.agent.observer_active());
}

#[test]
fn boot_stays_idle_when_previously_stopped() {
    let mut h = Harness::new(Arc::new(MemoryStore::new()));
    let dom = question_dom(&['a', 'b']);
    h.agent.handle(Input::Boot, &dom);
    assert!(!h.agent.is_pending(Timer::BootResume));
    assert!(!h.advance(5000, &dom).contains(&Effect::AttachObserver));
    assert!(!h.agent.observer_active());
}

#[test]
fn majority_answer_is_followed_and_reclicked_on_change() {
    let settings = AgentSettings {
        follow_majority: true,
        ..AgentSettings::default()
    };
    let mut h = Harness::with_settings(Arc::new(MemoryStore::new()), settings, 1);
    let dom = question_dom(&['a', 'b', 'c', 'd']);
    h.start(&dom);

    let creds = SessionCredentials::new("tok", "course");
    let effects = h.agent.handle(Input::SessionCaptured(creds.clone()), &dom);
    assert_eq!(effects, vec![Effect::ResolveActivity(creds.clone())]);
    h.agent
        .handle(Input::ActivityResolved(Some("act".into())), &dom);

    assert!(clicks(&h.advance(2500, &dom)).is_empty());
    let effects = h.advance(5000, &dom);
    assert_eq!(
        effects,
        vec![Effect::FetchMajority {
            creds,
            activity_id: "act".into()
        }]
    );

    let report = |letter| Input::MajorityReport(Some(MajorityAnswer::Letter(letter)));
    assert_eq!(clicks(&h.agent.handle(report('C'), &dom)), vec![3]);
    assert!(clicks(&h.agent.handle(report('C'), &dom)).is_empty());
    assert!(h.agent.handle(Input::MajorityReport(None), &dom).is_empty());
    assert_eq!(clicks(&h.agent.handle(report('B'), &dom)), vec![2]);
}

#[test]
fn majority_without_activity_clicks_default_option() {
    let settings = AgentSettings {
        follow_majority: true,
        ..AgentSettings::default()
    };
    let mut h = Harness::with_settings(Arc::new(MemoryStore::new()), settings, 1);
    let dom = question_dom(&['a', 'b', 'c', 'd']);
    h.start(&dom);
    assert_eq!(clicks(&h.advance(2500, &dom)), vec![1]);
}

#[test]
fn numeric_reply_that_is_not_a_number_is_not_filled() {
    let mut h = Harness::new(ai_store());
    let dom = numeric_dom();
    h.start(&dom);
    assert_eq!(ai_requests(&h.advance(2500, &dom)), 1);

    let mut effects = h.reply(r#"{"answer":"A"}"#, &dom);
    effects.extend(h.advance(400, &dom));
    effects.extend(h.advance(120_000, &dom));
    assert!(!effects
        .iter()
        .any(|e| matches!(e, Effect::FillNumeric { .. } | Effect::Click(_))));
    assert!(!h.agent.ai_in_flight());
}

#[test]
fn rerendered_question_container_notifies_once() {
    let store = Arc::new(MemoryStore::new());
    store.set(keys::NOTIFY, json!(true)).unwrap();
    store.set(keys::EMAIL, json!("me@school.edu")).unwrap();
    let mut h = Harness::new(store);
    let dom = question_dom(&['a', 'b', 'c', 'd']);
    h.start(&dom);

    let mut effects = Vec::new();
    for node_ref in [50, 51] {
        effects.extend(h.container_added(node_ref, &dom));
        effects.extend(h.advance(3000, &dom));
    }
    let notices = effects
        .iter()
        .filter(|e| {
            matches!(
                e,
                Effect::Notify {
                    kind: NotifyKind::Question,
                    ..
                }
            )
        })
        .count();
    assert_eq!(notices, 1);
}
