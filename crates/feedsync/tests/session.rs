use std::sync::Once;
use std::time::{Duration, Instant};

use enostr::ewebsock::WsEvent;
use enostr::{
    ClientMessage, Filter, NormRelayUrl, Note, NoteId, Pubkey, RelayMessage, RelayStatus,
    RelayTransport, KIND_CONTACTS, KIND_METADATA, KIND_RELAY_LIST, KIND_TEXT_NOTE,
};
use feedsync::{Error, LiveState, LoadOutcome, NoteVerifier, Session, SyncConfig, TimelineKind};
use hashbrown::HashSet;
use pretty_assertions::assert_eq;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Records everything the session puts on the wire
#[derive(Default)]
struct MockTransport {
    sent: Vec<(NormRelayUrl, ClientMessage)>,
    ensured: Vec<NormRelayUrl>,
    released: Vec<NormRelayUrl>,
    unreachable: HashSet<NormRelayUrl>,
    /// relays whose sends fail
    failing: HashSet<NormRelayUrl>,
}

impl MockTransport {
    /// (sub id, first filter) of every REQ sent to `relay`, oldest first
    fn reqs(&self, relay: &NormRelayUrl) -> Vec<(String, Filter)> {
        self.sent
            .iter()
            .filter(|(r, _)| r == relay)
            .filter_map(|(_, msg)| match msg {
                ClientMessage::Req { sub_id, filters } => {
                    Some((sub_id.clone(), filters.first().cloned().unwrap_or_default()))
                }
                _ => None,
            })
            .collect()
    }

    fn find_req(&self, relay: &NormRelayUrl, pred: impl Fn(&Filter) -> bool) -> String {
        self.reqs(relay)
            .into_iter()
            .find(|(_, f)| pred(f))
            .map(|(sub, _)| sub)
            .expect("matching REQ")
    }

    fn closed(&self, relay: &NormRelayUrl, sub: &str) -> bool {
        self.sent.iter().any(|(r, msg)| {
            r == relay && matches!(msg, ClientMessage::Close { sub_id } if sub_id == sub)
        })
    }

    fn published(&self, relay: &NormRelayUrl, id: &NoteId) -> bool {
        self.sent.iter().any(|(r, msg)| {
            r == relay && matches!(msg, ClientMessage::Event(note) if note.id == *id)
        })
    }
}

impl RelayTransport for MockTransport {
    fn ensure_relay(&mut self, relay: &NormRelayUrl) -> enostr::Result<()> {
        if self.unreachable.contains(relay) {
            return Err(enostr::Error::UnknownRelay(relay.to_string()));
        }
        self.ensured.push(relay.clone());
        Ok(())
    }

    fn send(&mut self, relay: &NormRelayUrl, msg: &ClientMessage) -> enostr::Result<()> {
        if self.failing.contains(relay) {
            return Err(enostr::Error::UnknownRelay(relay.to_string()));
        }
        self.sent.push((relay.clone(), msg.clone()));
        Ok(())
    }

    fn release_relay(&mut self, relay: &NormRelayUrl) {
        self.released.push(relay.clone());
    }
}

/// Test notes carry no real signatures. Everything passes except the ids
/// listed here.
#[derive(Default)]
struct TestVerifier {
    rejected: HashSet<NoteId>,
}

impl NoteVerifier for TestVerifier {
    fn verify(&self, note: &Note) -> bool {
        !self.rejected.contains(&note.id)
    }
}

const A: &str = "wss://a.example";
const B: &str = "wss://b.example";
const C: &str = "wss://c.example";

fn url(s: &str) -> NormRelayUrl {
    NormRelayUrl::new(s).expect("relay url")
}

fn pubkey(n: u8) -> Pubkey {
    Pubkey::new([n; 32])
}

struct TestNote(Note);

impl TestNote {
    fn new(id: u8, created_at: u64) -> Self {
        TestNote(Note {
            id: NoteId::new([id; 32]),
            pubkey: pubkey(0xee),
            created_at,
            kind: KIND_TEXT_NOTE,
            tags: vec![],
            content: String::new(),
            sig: "00".repeat(64),
        })
    }

    fn kind(mut self, kind: u32) -> Self {
        self.0.kind = kind;
        self
    }

    fn author(mut self, pk: Pubkey) -> Self {
        self.0.pubkey = pk;
        self
    }

    fn content(mut self, content: &str) -> Self {
        self.0.content = content.to_owned();
        self
    }

    fn tag(mut self, tag: &[&str]) -> Self {
        self.0.tags.push(tag.iter().map(|s| s.to_string()).collect());
        self
    }

    fn build(self) -> Note {
        self.0
    }
}

fn contacts(id: u8, created_at: u64, owner: Pubkey, follows: &[Pubkey]) -> Note {
    let mut n = TestNote::new(id, created_at).kind(KIND_CONTACTS).author(owner);
    for pk in follows {
        n = n.tag(&["p", &pk.hex()]);
    }
    n.build()
}

fn quiet_config(relays: &[&str]) -> SyncConfig {
    SyncConfig::default()
        .relays(relays.iter().copied())
        .fetch_profiles(false)
        .fetch_reactions(false)
}

type TestSession = Session<MockTransport, TestVerifier>;

fn session(config: SyncConfig, kind: TimelineKind) -> TestSession {
    rejecting_session(config, kind, &[])
}

fn rejecting_session(config: SyncConfig, kind: TimelineKind, rejected: &[u8]) -> TestSession {
    init_tracing();
    let verifier = TestVerifier {
        rejected: rejected.iter().map(|&id| NoteId::new([id; 32])).collect(),
    };
    let mut s = Session::with_verifier(config, kind, MockTransport::default(), verifier);
    s.start();
    s
}

fn text_notes() -> TimelineKind {
    TimelineKind::Custom(Filter::new().kinds([KIND_TEXT_NOTE]))
}

fn live_sub(s: &TestSession, relay: &NormRelayUrl) -> String {
    s.endpoint(relay)
        .and_then(|e| e.live_sub())
        .map(|id| id.to_string())
        .expect("live subscription")
}

fn event(s: &mut TestSession, relay: &NormRelayUrl, sub: &str, note: Note) {
    s.process_message(relay, RelayMessage::event(sub, note));
}

fn eose(s: &mut TestSession, relay: &NormRelayUrl, sub: &str) {
    s.process_message(relay, RelayMessage::eose(sub));
}

#[test]
fn three_relays_merge_into_one_timeline() {
    let mut s = session(quiet_config(&[A, B, C]), text_notes());
    s.enter_live_zone();

    let feeds = [(A, [1u8, 2, 3]), (B, [2, 3, 4]), (C, [3, 4, 5])];
    for (relay, ids) in feeds {
        let relay = url(relay);
        let sub = live_sub(&s, &relay);
        for id in ids {
            let note = TestNote::new(id, 100 + id as u64).build();
            let json = format!(
                r#"["EVENT","{sub}",{}]"#,
                note.json().expect("note json")
            );
            s.process_json(&relay, &json);
        }
    }

    let store = s.store();
    assert_eq!(store.len(), 5);
    let times: Vec<u64> = store.iter().map(|r| r.note.created_at).collect();
    assert_eq!(times, vec![105, 104, 103, 102, 101]);

    let shared = store.get(&NoteId::new([3; 32])).expect("note 3");
    assert_eq!(shared.relays.len(), 3);
    assert!(store.iter().all(|r| r.realtime && r.transition));
}

#[tokio::test]
async fn concurrent_loads_share_one_query() {
    let a = url(A);
    let mut s = session(quiet_config(&[A]), text_notes());

    let first = s.load_old(&a, None);
    let second = s.load_old(&a, None);

    let reqs = s.transport().reqs(&a);
    assert_eq!(reqs.len(), 1);
    let (sub, filter) = reqs[0].clone();
    assert_eq!(filter, Filter::new().kinds([KIND_TEXT_NOTE]).limit(8));

    event(&mut s, &a, &sub, TestNote::new(1, 50).build());
    event(&mut s, &a, &sub, TestNote::new(2, 40).build());
    eose(&mut s, &a, &sub);

    let expected = LoadOutcome {
        success: true,
        received: 2,
    };
    assert_eq!(first.await.expect("resolved"), Ok(expected));
    assert_eq!(second.await.expect("resolved"), Ok(expected));
    assert!(s.transport().closed(&a, &sub));
    assert!(!s.endpoint(&a).expect("endpoint").is_loading_old());
}

#[tokio::test]
async fn load_before_cursor_takes_newest_of_the_older_window() {
    let a = url(A);
    let mut s = session(quiet_config(&[A]), text_notes());

    let rx = s.load_old(&a, Some(100));

    let gap = s.transport().find_req(&a, |f| f.limit.is_none());
    let step = s.transport().find_req(&a, |f| f.limit.is_some());
    let (_, step_filter) = s
        .transport()
        .reqs(&a)
        .into_iter()
        .find(|(sub, _)| *sub == step)
        .expect("step");
    assert_eq!(
        (step_filter.since, step_filter.until, step_filter.limit),
        (Some(50), Some(99), Some(9))
    );

    eose(&mut s, &a, &gap);
    for i in 1..=9u8 {
        event(&mut s, &a, &step, TestNote::new(i, 90 + i as u64).build());
    }
    eose(&mut s, &a, &step);

    assert_eq!(
        rx.await.expect("resolved"),
        Ok(LoadOutcome {
            success: true,
            received: 8
        })
    );
    assert_eq!(s.store().len(), 8);
    assert_eq!(s.store().oldest_for(&a), Some(92));
}

#[test]
fn eviction_keeps_relays_between_watermarks() {
    let a = url(A);
    let mut s = session(quiet_config(&[A]), text_notes());
    s.enter_live_zone();
    let sub = live_sub(&s, &a);

    for i in 1..=15u8 {
        event(&mut s, &a, &sub, TestNote::new(i, i as u64).build());
    }

    s.request_more();
    assert_eq!(s.store().len(), 10);
    assert_eq!(s.store().oldest_for(&a), Some(6));
    assert_eq!(s.transport().reqs(&a).len(), 1, "only the live REQ");

    // 6, 7 and 8 are below the viewport now
    s.set_viewport_floor(Some(9));
    s.transport()
        .find_req(&a, |f| f.since == Some(6) && f.until == Some(6) && f.limit.is_none());
    assert!(s.endpoint(&a).expect("endpoint").is_loading_old());

    let sent = s.transport().reqs(&a).len();
    s.request_more();
    assert_eq!(s.transport().reqs(&a).len(), sent, "load already in flight");
}

#[test]
fn home_timeline_waits_for_the_contact_list() {
    let a = url(A);
    let owner = pubkey(1);
    let mut s = session(quiet_config(&[A]), TimelineKind::Home(owner));

    let identity = s
        .transport()
        .find_req(&a, |f| f.kinds == Some(vec![KIND_CONTACTS, KIND_RELAY_LIST]));

    s.enter_live_zone();
    let _rx = s.load_old(&a, None);
    assert_eq!(s.transport().reqs(&a).len(), 1);
    assert_eq!(
        s.endpoint(&a).expect("endpoint").live,
        LiveState::AwaitingBase
    );

    event(
        &mut s,
        &a,
        &identity,
        contacts(9, 10, owner, &[pubkey(2), pubkey(3)]),
    );

    let authors = Some(vec![pubkey(2).hex(), pubkey(3).hex()]);
    assert_eq!(
        s.base().get_filter().map(|f| f.authors.clone()),
        Some(authors.clone())
    );
    assert!(s.endpoint(&a).expect("endpoint").is_live());

    let live = live_sub(&s, &a);
    let (_, live_filter) = s
        .transport()
        .reqs(&a)
        .into_iter()
        .find(|(sub, _)| *sub == live)
        .expect("live REQ");
    assert_eq!(live_filter.limit, Some(11));
    assert_eq!(live_filter.authors, authors);

    s.transport()
        .find_req(&a, |f| f.limit == Some(8) && f.authors == authors);
    s.transport()
        .find_req(&a, |f| f.kinds == Some(vec![KIND_METADATA, KIND_RELAY_LIST]));
}

#[tokio::test]
async fn disconnect_fails_the_load_and_reopen_resubscribes() {
    let a = url(A);
    let mut s = session(quiet_config(&[A]), text_notes());
    s.enter_live_zone();
    let live = live_sub(&s, &a);

    let rx = s.load_old(&a, None);
    s.process_pool_event(&a, &WsEvent::Closed);

    assert_eq!(
        rx.await.expect("resolved"),
        Err(Error::Disconnected(a.to_string()))
    );
    assert_eq!(
        s.endpoint(&a).expect("endpoint").status,
        RelayStatus::Disconnected
    );

    s.process_pool_event(&a, &WsEvent::Opened);
    let live_reqs = s
        .transport()
        .reqs(&a)
        .into_iter()
        .filter(|(sub, _)| *sub == live)
        .count();
    assert_eq!(live_reqs, 2);
}

#[test]
fn queued_profile_queries_merge_under_the_cap() {
    let a = url(A);
    let config = quiet_config(&[A])
        .max_concurrent_queries(2)
        .fetch_profiles(true);
    let mut s = session(config, text_notes());
    s.enter_live_zone();
    let live = live_sub(&s, &a);

    for i in 0..7u8 {
        let note = TestNote::new(i + 1, 100 - i as u64)
            .author(pubkey(10 + i))
            .build();
        event(&mut s, &a, &live, note);
    }

    let profile_reqs = |s: &TestSession| -> Vec<(String, Filter)> {
        s.transport()
            .reqs(&a)
            .into_iter()
            .filter(|(_, f)| f.kinds == Some(vec![KIND_METADATA]))
            .collect()
    };
    assert_eq!(profile_reqs(&s).len(), 2);

    let (first, _) = profile_reqs(&s)[0].clone();
    eose(&mut s, &a, &first);

    let reqs = profile_reqs(&s);
    assert_eq!(reqs.len(), 3);
    let (merged, filter) = reqs[2].clone();
    let expected: Vec<String> = (12..17u8).map(|n| pubkey(n).hex()).collect();
    assert_eq!(filter.authors, Some(expected));

    let profile = TestNote::new(0x40, 5)
        .kind(KIND_METADATA)
        .author(pubkey(14))
        .content(r#"{"name":"fourteen"}"#)
        .build();
    event(&mut s, &a, &merged, profile);
    assert_eq!(
        s.profile(&pubkey(14)).map(|p| p.name.as_str()),
        Some("fourteen")
    );
}

#[test]
fn newest_replaceable_wins_and_is_republished() {
    let (a, b) = (url(A), url(B));
    let owner = pubkey(1);
    let mut s = session(quiet_config(&[A, B]), TimelineKind::Home(owner));

    let is_identity = |f: &Filter| f.kinds == Some(vec![KIND_CONTACTS, KIND_RELAY_LIST]);
    let sub_a = s.transport().find_req(&a, is_identity);
    let sub_b = s.transport().find_req(&b, is_identity);

    let v1 = contacts(0xa1, 10, owner, &[pubkey(2)]);
    let v2 = contacts(0xa2, 20, owner, &[pubkey(3)]);

    event(&mut s, &a, &sub_a, v1.clone());
    event(&mut s, &b, &sub_b, v2.clone());

    assert!(s.transport().published(&a, &v2.id));
    assert_eq!(
        s.base().get_filter().and_then(|f| f.authors.clone()),
        Some(vec![pubkey(3).hex()])
    );

    // b serves the stale copy too
    event(&mut s, &b, &sub_b, v1);
    assert!(s.transport().published(&b, &v2.id));
    assert_eq!(s.resolver().current_id(&owner, KIND_CONTACTS), Some(v2.id));

    let v3 = TestNote::new(0xa3, 30)
        .kind(KIND_CONTACTS)
        .author(owner)
        .tag(&["p", &pubkey(4).hex()])
        .tag(&["-"])
        .build();
    event(&mut s, &a, &sub_a, v3.clone());
    assert_eq!(s.resolver().current_id(&owner, KIND_CONTACTS), Some(v3.id));
    assert!(!s.transport().published(&b, &v3.id));
}

#[test]
fn discovered_relays_are_probed_one_at_a_time() {
    let a = url(A);
    let (x, y) = (url("wss://x.example"), url("wss://y.example"));
    let owner = pubkey(1);
    let config = quiet_config(&[A])
        .fetch_profiles(true)
        .probe_timeout(Duration::from_secs(10));
    let mut s = session(config, TimelineKind::Home(owner));

    let identity = s
        .transport()
        .find_req(&a, |f| f.kinds == Some(vec![KIND_CONTACTS, KIND_RELAY_LIST]));
    event(
        &mut s,
        &a,
        &identity,
        contacts(9, 10, owner, &[pubkey(2), pubkey(3)]),
    );

    let meta = s
        .transport()
        .find_req(&a, |f| f.kinds == Some(vec![KIND_METADATA, KIND_RELAY_LIST]));
    let list = |id: u8, pk: Pubkey, relay: &str| {
        TestNote::new(id, 10)
            .kind(KIND_RELAY_LIST)
            .author(pk)
            .tag(&["r", relay])
            .build()
    };
    event(&mut s, &a, &meta, list(0x20, pubkey(2), "wss://x.example/"));
    event(&mut s, &a, &meta, list(0x30, pubkey(3), "wss://y.example"));
    let two = TestNote::new(0x21, 10)
        .kind(KIND_METADATA)
        .author(pubkey(2))
        .content(r#"{"display_name":"two"}"#)
        .build();
    event(&mut s, &a, &meta, two);
    eose(&mut s, &a, &meta);

    assert_eq!(s.profile(&pubkey(2)).map(|p| p.name.as_str()), Some("two"));

    let probe_x = s
        .transport()
        .find_req(&x, |f| f.kinds == Some(vec![KIND_RELAY_LIST]) && f.limit == Some(1));
    assert!(s.transport().ensured.contains(&x));
    assert!(s.transport().reqs(&y).is_empty(), "one probe at a time");

    eose(&mut s, &x, &probe_x);
    assert!(s.transport().closed(&x, &probe_x));
    assert!(s.relays().any(|r| *r == x));
    assert_eq!(
        s.endpoint(&x).expect("adopted").status,
        RelayStatus::Connected
    );

    let probe_y = s
        .transport()
        .find_req(&y, |f| f.kinds == Some(vec![KIND_RELAY_LIST]));
    s.tick(Instant::now() + Duration::from_secs(11));

    assert!(s.transport().closed(&y, &probe_y));
    assert!(s.discovery().has_failed(&y));
    assert!(s.transport().released.contains(&y));
    assert!(!s.relays().any(|r| *r == y));
    assert!(s.discovery().probe().is_none());
}

#[tokio::test]
async fn close_cancels_everything() {
    let a = url(A);
    let mut s = session(quiet_config(&[A]), text_notes());
    s.enter_live_zone();
    let live = live_sub(&s, &a);

    let rx = s.load_old(&a, None);
    let (load_sub, _) = s.transport().reqs(&a)[1].clone();

    s.close();

    assert_eq!(rx.await.expect("resolved"), Err(Error::Cancelled));
    assert!(s.transport().closed(&a, &live));
    assert!(s.transport().closed(&a, &load_sub));
    assert!(s.transport().released.contains(&a));

    let late = s.load_old(&a, None);
    assert_eq!(late.await.expect("resolved"), Err(Error::Cancelled));
}

#[test]
fn unreachable_configured_relay_is_skipped() {
    init_tracing();
    let mut transport = MockTransport::default();
    transport.unreachable.insert(url(B));

    let mut s = Session::with_verifier(
        quiet_config(&[A, B]),
        text_notes(),
        transport,
        TestVerifier::default(),
    );
    s.start();

    let relays: Vec<NormRelayUrl> = s.relays().cloned().collect();
    assert_eq!(relays, vec![url(A)]);
}

#[test]
fn reactions_are_tallied_once_per_reaction() {
    let a = url(A);
    let config = quiet_config(&[A]).fetch_reactions(true);
    let mut s = session(config, text_notes());
    s.enter_live_zone();
    let live = live_sub(&s, &a);

    let target = TestNote::new(1, 100).build();
    event(&mut s, &a, &live, target.clone());

    let target_hex = target.id.hex();
    let sub = s.transport().find_req(&a, |f| {
        f.kinds == Some(vec![enostr::KIND_REACTION])
            && f.tags.get("#e") == Some(&vec![target_hex.clone()])
    });

    let reaction = |id: u8, content: &str| {
        TestNote::new(id, 101)
            .kind(enostr::KIND_REACTION)
            .content(content)
            .tag(&["e", &target_hex])
            .build()
    };
    event(&mut s, &a, &sub, reaction(2, "+"));
    event(&mut s, &a, &sub, reaction(2, "+"));
    event(&mut s, &a, &sub, reaction(3, "🔥"));
    eose(&mut s, &a, &sub);

    let tally = s.reactions(&target.id).expect("tally");
    assert_eq!(tally.total(), 2);
    assert_eq!(tally.count("+"), 1);
    assert_eq!(tally.count("🔥"), 1);
}

#[test]
fn trimmed_notes_drop_their_reactions() {
    let a = url(A);
    let config = quiet_config(&[A]).fetch_reactions(true);
    let mut s = session(config, text_notes());
    s.enter_live_zone();
    let live = live_sub(&s, &a);

    for i in 1..=15u8 {
        event(&mut s, &a, &live, TestNote::new(i, i as u64).build());
    }
    let oldest = NoteId::new([1; 32]);
    assert!(s.reactions(&oldest).is_some());

    s.request_more();
    assert_eq!(s.store().len(), 10);
    for i in 1..=5u8 {
        assert!(s.reactions(&NoteId::new([i; 32])).is_none(), "note {i}");
    }
    assert!(s.reactions(&NoteId::new([6; 32])).is_some());

    // a reaction arriving after the trim doesn't bring the tally back
    let oldest_hex = oldest.hex();
    let sub = s.transport().find_req(&a, |f| {
        f.kinds == Some(vec![enostr::KIND_REACTION])
            && f.tags
                .get("#e")
                .is_some_and(|ids| ids.contains(&oldest_hex))
    });
    let late = TestNote::new(0x70, 20)
        .kind(enostr::KIND_REACTION)
        .content("+")
        .tag(&["e", &oldest_hex])
        .build();
    event(&mut s, &a, &sub, late);
    assert!(s.reactions(&oldest).is_none());
}

#[tokio::test]
async fn relay_closed_fails_the_load() {
    let a = url(A);
    let mut s = session(quiet_config(&[A]), text_notes());

    let rx = s.load_old(&a, None);
    let (sub, _) = s.transport().reqs(&a)[0].clone();
    s.process_message(&a, RelayMessage::closed(&sub, "rate-limited: slow down"));

    assert_eq!(
        rx.await.expect("resolved"),
        Err(Error::relay_closed(&a, "rate-limited: slow down"))
    );
    assert!(!s.endpoint(&a).expect("endpoint").is_loading_old());

    // the slot is free again
    let _rx = s.load_old(&a, None);
    assert_eq!(s.transport().reqs(&a).len(), 2);
}

#[tokio::test]
async fn failed_send_fails_the_load() {
    let a = url(A);
    let mut s = session(quiet_config(&[A]), text_notes());
    s.transport_mut().failing.insert(a.clone());

    let rx = s.load_old(&a, None);
    assert_eq!(
        rx.await.expect("resolved"),
        Err(Error::transport(
            &a,
            enostr::Error::UnknownRelay(a.to_string())
        ))
    );
    assert!(!s.endpoint(&a).expect("endpoint").is_loading_old());

    s.transport_mut().failing.clear();
    let _rx = s.load_old(&a, None);
    assert_eq!(s.transport().reqs(&a).len(), 1);
}

#[tokio::test]
async fn notes_failing_verification_are_dropped() {
    let a = url(A);
    let mut s = rejecting_session(quiet_config(&[A]), text_notes(), &[5, 0x50, 0x60]);
    s.enter_live_zone();
    let live = live_sub(&s, &a);

    event(&mut s, &a, &live, TestNote::new(0x60, 200).build());
    assert!(s.store().is_empty());

    let rx = s.load_old(&a, Some(100));
    let gap = s.transport().find_req(&a, |f| f.until == Some(100));
    let step = s.transport().find_req(&a, |f| f.limit == Some(9));

    event(&mut s, &a, &gap, TestNote::new(0x50, 100).build());
    eose(&mut s, &a, &gap);
    for i in 1..=9u8 {
        event(&mut s, &a, &step, TestNote::new(i, 90 + i as u64).build());
    }
    eose(&mut s, &a, &step);

    assert_eq!(
        rx.await.expect("resolved"),
        Ok(LoadOutcome {
            success: true,
            received: 8
        })
    );
    assert_eq!(s.store().len(), 8);
    assert_eq!(s.store().oldest_for(&a), Some(91));
    for id in [5u8, 0x50, 0x60] {
        assert!(s.store().get(&NoteId::new([id; 32])).is_none());
    }
}

#[test]
fn forged_contact_list_is_ignored() {
    let a = url(A);
    let owner = pubkey(1);
    let mut s = rejecting_session(quiet_config(&[A]), TimelineKind::Home(owner), &[0xf0]);

    let identity = s
        .transport()
        .find_req(&a, |f| f.kinds == Some(vec![KIND_CONTACTS, KIND_RELAY_LIST]));

    event(&mut s, &a, &identity, contacts(0xf0, 50, owner, &[pubkey(9)]));
    assert!(!s.base().is_ready());
    assert_eq!(s.resolver().current_id(&owner, KIND_CONTACTS), None);

    let real = contacts(0xf1, 10, owner, &[pubkey(2)]);
    event(&mut s, &a, &identity, real.clone());
    assert_eq!(s.resolver().current_id(&owner, KIND_CONTACTS), Some(real.id));
    assert_eq!(
        s.base().get_filter().and_then(|f| f.authors.clone()),
        Some(vec![pubkey(2).hex()])
    );
}

#[test]
fn live_subscription_closed_by_relay_comes_back_on_reopen() {
    let a = url(A);
    let mut s = session(quiet_config(&[A]), text_notes());
    s.enter_live_zone();
    let first = live_sub(&s, &a);

    s.process_message(&a, RelayMessage::closed(&first, "error: too many subscriptions"));
    let ep = s.endpoint(&a).expect("endpoint");
    assert_eq!(ep.live, LiveState::ClosedByRelay);
    assert!(!ep.is_live());

    s.process_pool_event(&a, &WsEvent::Opened);
    let second = live_sub(&s, &a);
    assert_ne!(first, second);
    s.transport()
        .find_req(&a, |f| f.limit == Some(11) && f.kinds == Some(vec![KIND_TEXT_NOTE]));
}
