use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveTime;
use serde_json::json;
use tokio::sync::mpsc;

use hubchat::clock::FixedClock;
use hubchat::transport::PresenceState;
use hubchat::{ChatSession, Hydration, MemoryTransport, Message, SessionOptions, TransportEvent};

const C1: &str = "client1-channel";
const C2: &str = "client2-channel";

async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

struct Harness {
    session: ChatSession,
    transport: Arc<MemoryTransport>,
    /// Feeds events as if they came from other participants.
    peers: mpsc::UnboundedSender<TransportEvent>,
}

impl Harness {
    /// Admin session on two channels over a loopback that echoes our own
    /// publications back, like a real broker.
    fn admin() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(MemoryTransport::with_echo(tx.clone()));
        let clock = Arc::new(FixedClock::new(NaiveTime::from_hms_opt(9, 0, 0).unwrap()));
        let options = SessionOptions::new("admin", [C1, C2]).clock(clock);
        let session = ChatSession::new(options, transport.clone(), rx).unwrap();
        Self {
            session,
            transport,
            peers: tx,
        }
    }

    async fn started() -> Self {
        let mut harness = Self::admin();
        harness.session.start().await.unwrap();
        harness.drain().await;
        harness
    }

    async fn drain(&mut self) {
        settle().await;
        self.session.pump();
    }

    fn peer_message(&self, channel: &str, text: &str, sender: &str) {
        self.peers
            .send(TransportEvent::message(
                channel,
                json!({ "text": text, "timestamp": "09:00", "sender": sender }),
            ))
            .unwrap();
    }

    fn peer_typing(&self, channel: &str, sender: &str, is_typing: bool) {
        self.peers
            .send(TransportEvent::presence(
                channel,
                json!({ "isTyping": is_typing, "sender": sender }),
            ))
            .unwrap();
    }

    fn assert_active_has_no_unread(&self) {
        assert_eq!(self.session.unread_count(self.session.active_channel()), 0);
    }
}

#[tokio::test]
async fn start_subscribes_and_hydrates_active_channel() {
    let mut h = Harness::admin();
    h.transport
        .seed_history(C1, [Message::new("earlier", "08:55", "client1")]);

    h.session.start().await.unwrap();
    assert_eq!(h.session.hydration(C1), Hydration::Fetching);
    h.drain().await;

    assert_eq!(h.transport.subscribed(), vec![C1, C2]);
    assert_eq!(h.transport.history_requests(), vec![C1]);
    assert_eq!(h.session.hydration(C1), Hydration::Hydrated);
    assert_eq!(h.session.hydration(C2), Hydration::Unhydrated);
    assert_eq!(h.session.message_count(C1), 1);
    h.assert_active_has_no_unread();
}

#[tokio::test]
async fn live_copy_of_history_message_is_not_duplicated() {
    let mut h = Harness::admin();
    h.transport
        .seed_history(C1, [Message::new("hi", "09:00", "client1")]);
    h.session.start().await.unwrap();
    h.drain().await;

    h.peer_message(C1, "hi", "client1");
    h.drain().await;

    assert_eq!(h.session.message_count(C1), 1);
}

#[tokio::test]
async fn unread_accumulates_off_screen_and_clears_on_selection() {
    let mut h = Harness::started().await;

    h.peer_message(C2, "ping", "client2");
    h.peer_message(C2, "ping again", "client2");
    h.drain().await;
    assert_eq!(h.session.unread_count(C2), 2);
    assert_eq!(h.session.total_unread(), 2);
    h.assert_active_has_no_unread();

    h.session.select_channel(C2).unwrap();
    assert_eq!(h.session.unread_count(C2), 0);
    h.assert_active_has_no_unread();

    h.drain().await;
    h.peer_message(C2, "you there?", "client2");
    h.drain().await;
    assert_eq!(h.session.unread_count(C2), 0);
    assert_eq!(h.session.message_count(C2), 3);
}

#[tokio::test]
async fn duplicate_live_message_does_not_count_as_unread() {
    let mut h = Harness::started().await;

    h.peer_message(C2, "ping", "client2");
    h.peer_message(C2, "ping", "client2");
    h.drain().await;

    assert_eq!(h.session.message_count(C2), 1);
    assert_eq!(h.session.unread_count(C2), 1);
}

#[tokio::test(start_paused = true)]
async fn typing_stop_cancels_pending_expiry() {
    let mut h = Harness::started().await;

    h.peer_typing(C2, "client2", true);
    h.drain().await;
    assert!(h.session.is_typing(C2));
    assert_eq!(h.session.typist(C2), Some("client2"));

    tokio::time::advance(Duration::from_millis(1000)).await;
    h.peer_typing(C2, "client2", false);
    h.drain().await;
    assert!(!h.session.is_typing(C2));

    // A start after the stop must not be cut short by the first timer.
    h.peer_typing(C2, "client2", true);
    h.drain().await;
    tokio::time::advance(Duration::from_millis(2500)).await;
    h.drain().await;
    assert!(h.session.is_typing(C2));
}

#[tokio::test(start_paused = true)]
async fn typing_indicator_expires_after_timeout() {
    let mut h = Harness::started().await;

    h.peer_typing(C1, "client1", true);
    h.drain().await;

    tokio::time::advance(Duration::from_millis(2950)).await;
    h.drain().await;
    assert!(h.session.is_typing(C1));

    tokio::time::advance(Duration::from_millis(100)).await;
    h.drain().await;
    assert!(!h.session.is_typing(C1));
}

#[tokio::test(start_paused = true)]
async fn repeated_typing_signal_extends_indicator() {
    let mut h = Harness::started().await;

    h.peer_typing(C1, "client1", true);
    h.drain().await;
    tokio::time::advance(Duration::from_millis(2000)).await;
    h.peer_typing(C1, "client1", true);
    h.drain().await;

    tokio::time::advance(Duration::from_millis(2000)).await;
    h.drain().await;
    assert!(h.session.is_typing(C1));

    tokio::time::advance(Duration::from_millis(1100)).await;
    h.drain().await;
    assert!(!h.session.is_typing(C1));
}

#[tokio::test]
async fn whitespace_only_send_publishes_nothing() {
    let mut h = Harness::started().await;

    assert!(!h.session.send_message("  ").unwrap());
    h.drain().await;

    assert_eq!(h.session.message_count(C1), 0);
    assert!(h.transport.published().is_empty());
}

#[tokio::test]
async fn own_message_echo_is_absorbed() {
    let mut h = Harness::started().await;

    h.session.send_message("hello client1").unwrap();
    h.drain().await;

    assert_eq!(h.transport.published().len(), 1);
    assert_eq!(h.session.message_count(C1), 1);
    h.assert_active_has_no_unread();

    // Same for a send to a channel we are not looking at.
    h.session.send_message_to(C2, "hello client2").unwrap();
    h.drain().await;
    assert_eq!(h.session.message_count(C2), 1);
    assert_eq!(h.session.unread_count(C2), 0);
}

#[tokio::test]
async fn own_presence_echo_never_shows_as_typing() {
    let mut h = Harness::started().await;

    h.session.set_local_typing("hel");
    assert!(h.session.is_local_typing());
    h.drain().await;

    assert_eq!(
        h.transport.presence_updates(),
        vec![(C1.to_string(), PresenceState::typing("admin", true))]
    );
    assert!(!h.session.is_typing(C1));
}

#[tokio::test]
async fn sending_withdraws_local_typing() {
    let mut h = Harness::started().await;

    h.session.set_local_typing("hel");
    h.session.set_local_typing("hello");
    h.session.send_message("hello").unwrap();
    h.drain().await;

    assert!(!h.session.is_local_typing());
    let states: Vec<bool> = h
        .transport
        .presence_updates()
        .into_iter()
        .map(|(_, state)| state.is_typing)
        .collect();
    assert_eq!(states, vec![true, false]);
}

#[tokio::test(start_paused = true)]
async fn idle_input_withdraws_local_typing() {
    let mut h = Harness::started().await;

    h.session.set_local_typing("draft");
    h.drain().await;
    tokio::time::advance(Duration::from_millis(3100)).await;
    h.drain().await;
    assert!(!h.session.is_local_typing());

    // The withdrawal goes out on its own task.
    settle().await;
    assert_eq!(
        h.transport.presence_updates().last(),
        Some(&(C1.to_string(), PresenceState::typing("admin", false)))
    );
}

#[tokio::test]
async fn history_ingest_is_idempotent_across_reselection() {
    let mut h = Harness::admin();
    h.transport.seed_history(
        C2,
        [
            Message::new("one", "08:00", "client2"),
            Message::new("two", "08:01", "client2"),
        ],
    );
    h.session.start().await.unwrap();

    h.session.select_channel(C2).unwrap();
    h.drain().await;
    h.session.select_channel(C1).unwrap();
    h.session.select_channel(C2).unwrap();
    h.drain().await;

    assert_eq!(h.session.message_count(C2), 2);
    let texts: Vec<&str> = h.session.messages(C2, None).map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["one", "two"]);
}

#[tokio::test]
async fn late_history_for_inactive_channel_merges_without_unread() {
    let mut h = Harness::started().await;
    h.transport
        .seed_history(C2, [Message::new("old news", "08:00", "client2")]);

    h.session.select_channel(C2).unwrap();
    h.session.select_channel(C1).unwrap();
    h.drain().await;

    assert_eq!(h.session.active_channel(), C1);
    assert_eq!(h.session.message_count(C2), 1);
    assert_eq!(h.session.unread_count(C2), 0);
    assert_eq!(h.session.hydration(C2), Hydration::Hydrated);
}

#[tokio::test]
async fn history_skips_malformed_entries() {
    let mut h = Harness::admin();
    h.transport.seed_raw_history(C1, json!({ "text": "no sender" }));
    h.transport
        .seed_history(C1, [Message::new("fine", "08:00", "client1")]);

    h.session.start().await.unwrap();
    h.drain().await;

    assert_eq!(h.session.message_count(C1), 1);
    assert_eq!(h.session.hydration(C1), Hydration::Hydrated);
}

#[tokio::test]
async fn filter_matches_case_insensitively() {
    let mut h = Harness::started().await;
    h.peer_message(C1, "Deploy finished", "client1");
    h.peer_message(C1, "lunch?", "client1");
    h.drain().await;

    let hits: Vec<&str> = h
        .session
        .messages(C1, Some("DEPLOY"))
        .map(|m| m.text.as_str())
        .collect();
    assert_eq!(hits, vec!["Deploy finished"]);
    assert_eq!(h.session.messages(C1, Some("")).count(), 2);

    // The filter is matched as given, spaces included.
    let spaced: Vec<&str> = h.session.messages(C1, Some(" ")).map(|m| m.text.as_str()).collect();
    assert_eq!(spaced, vec!["Deploy finished"]);
    assert_eq!(h.session.messages(C1, Some(" lunch")).count(), 0);
}

#[tokio::test]
async fn observable_changes_bump_revision() {
    let mut h = Harness::started().await;
    let mut changes = h.session.subscribe_changes();
    changes.borrow_and_update();

    h.peer_message(C2, "ping", "client2");
    h.drain().await;
    assert!(changes.has_changed().unwrap());
    changes.borrow_and_update();

    // A duplicate changes nothing.
    h.peer_message(C2, "ping", "client2");
    h.drain().await;
    assert!(!changes.has_changed().unwrap());
}

#[tokio::test]
async fn shutdown_unsubscribes_and_withdraws_typing() {
    let mut h = Harness::started().await;
    h.session.set_local_typing("bye");
    h.drain().await;

    h.session.shutdown().await;

    assert!(h.transport.subscribed().is_empty());
    assert_eq!(
        h.transport.presence_updates().last(),
        Some(&(C1.to_string(), PresenceState::typing("admin", false)))
    );
}

#[tokio::test(start_paused = true)]
async fn typing_expires_without_pumping() {
    let mut h = Harness::started().await;
    h.peer_typing(C1, "client1", true);
    h.drain().await;
    assert!(h.session.is_typing(C1));

    let mut changes = h.session.subscribe_changes();
    changes.borrow_and_update();

    tokio::time::advance(Duration::from_millis(3000)).await;
    settle().await;

    assert!(!h.session.is_typing(C1));
    assert_eq!(h.session.typist(C1), None);
    assert!(changes.has_changed().unwrap());
}

#[tokio::test(start_paused = true)]
async fn left_channel_absorbs_late_history_and_stays_quiet() {
    let mut h = Harness::started().await;
    h.transport
        .seed_history(C2, [Message::new("old news", "08:00", "client2")]);
    h.peer_typing(C2, "client2", true);
    h.drain().await;
    let shown_before = h.session.messages(C1, None).count();

    h.session.select_channel(C2).unwrap();
    h.peer_message(C2, "too late", "client2");
    h.session.leave(C2).unwrap();
    assert_eq!(h.session.active_channel(), C1);
    assert!(!h.session.is_typing(C2));
    h.drain().await;

    // The in-flight fetch lands in the kept log; the live message does not.
    assert_eq!(h.session.message_count(C2), 1);
    assert_eq!(h.session.hydration(C2), Hydration::Unhydrated);
    assert_eq!(h.session.active_channel(), C1);
    assert_eq!(h.session.messages(C1, None).count(), shown_before);
    assert_eq!(h.session.total_unread(), 0);

    h.peer_typing(C2, "client2", true);
    h.drain().await;
    tokio::time::advance(Duration::from_millis(3100)).await;
    h.drain().await;
    assert!(!h.session.is_typing(C2));
    assert_eq!(h.session.typist(C2), None);
}

#[tokio::test]
async fn leaving_drops_unread_from_total() {
    let mut h = Harness::started().await;
    h.peer_message(C2, "ping", "client2");
    h.drain().await;
    assert_eq!(h.session.total_unread(), 1);

    h.session.leave(C2).unwrap();
    assert_eq!(h.session.unread_count(C2), 0);
    assert_eq!(h.session.total_unread(), 0);
}

#[tokio::test(start_paused = true)]
async fn local_typing_transitions_bump_revision() {
    let mut h = Harness::started().await;
    let mut changes = h.session.subscribe_changes();
    changes.borrow_and_update();

    h.session.set_local_typing("h");
    assert!(changes.has_changed().unwrap());
    changes.borrow_and_update();

    // Still typing; nothing observable changed.
    h.session.set_local_typing("he");
    assert!(!changes.has_changed().unwrap());

    tokio::time::advance(Duration::from_millis(3100)).await;
    h.drain().await;
    assert!(!h.session.is_local_typing());
    assert!(changes.has_changed().unwrap());
}

#[tokio::test]
async fn sent_text_is_published_as_typed() {
    let mut h = Harness::started().await;

    h.session.send_message("  indented\n").unwrap();
    h.drain().await;

    assert_eq!(
        h.transport.published(),
        vec![(C1.to_string(), Message::new("  indented\n", "09:00", "admin"))]
    );
    assert_eq!(h.session.message_count(C1), 1);
}
