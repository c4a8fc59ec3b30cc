mod common;

use std::sync::atomic::Ordering;

use common::*;
use plaza_sync::{MutationError, OpenOutcome, PageOutcome, PageSkip};
use plaza_types::{Chatroom, ChatroomId, ListFilter, MessageId, PushEvent, Topic, UserId};

async fn with_rooms(rooms: Vec<Chatroom>) -> Harness {
    let h = Harness::new();
    h.messages.pages.lock().insert((ListFilter::All, 1), page(rooms, 1, 1));
    h.engine.conversations.attach(&h.engine.bus);
    assert!(h.engine.conversations.load_chatrooms().await.is_loaded());
    h
}

fn sent(id: u64, chatroom: u64, sender: UserId, minute: u32) -> PushEvent {
    PushEvent::MessageSent { message: message(id, chatroom, sender, minute) }
}

fn user_topic() -> Topic {
    Topic::user_chatrooms(ME)
}

fn unread(h: &Harness, id: u64) -> u32 {
    h.engine.conversations.chatroom(ChatroomId(id)).unwrap().unread_count
}

fn order(h: &Harness) -> Vec<u64> {
    h.engine.conversations.chatrooms().iter().map(|c| c.id.0).collect()
}

#[tokio::test]
async fn incoming_message_bumps_only_closed_rooms() {
    let h = with_rooms(vec![chatroom(1, 2, 0, 1), chatroom(2, 3, 0, 2)]).await;
    h.engine.conversations.open(ChatroomId(1)).await;

    h.engine.bus.deliver(&user_topic(), &sent(10, 1, PEER, 20));
    h.engine.bus.deliver(&user_topic(), &sent(11, 2, UserId(3), 21));

    assert_eq!(unread(&h, 1), 0);
    assert_eq!(unread(&h, 2), 1);
    assert_eq!(h.engine.conversations.unread_total(), 1);

    // Messages shown in the open room count as read.
    let open = h.engine.conversations.open_conversation().unwrap();
    assert_eq!(open.messages[0].id, MessageId(10));
    assert!(open.messages[0].read);
}

#[tokio::test]
async fn own_and_repeated_messages_do_not_bump() {
    let h = with_rooms(vec![chatroom(1, 2, 0, 1)]).await;

    h.engine.bus.deliver(&user_topic(), &sent(10, 1, ME, 20));
    assert_eq!(unread(&h, 1), 0);

    let event = sent(11, 1, PEER, 21);
    h.engine.bus.deliver(&user_topic(), &event);
    h.engine.bus.deliver(&user_topic(), &event);
    assert_eq!(unread(&h, 1), 1);
}

#[tokio::test]
async fn transcript_is_fetched_before_mark_read() {
    let h = with_rooms(vec![chatroom(1, 2, 3, 1)]).await;
    h.messages.transcripts.lock().insert(ChatroomId(1), vec![message(5, 1, PEER, 1)]);

    assert_eq!(h.engine.conversations.open(ChatroomId(1)).await, OpenOutcome::Opened);

    let calls = h.messages.calls();
    let fetch = calls.iter().position(|c| c == "fetch_transcript 1").unwrap();
    let mark = calls.iter().position(|c| c == "mark_read 1").unwrap();
    assert!(fetch < mark);
    assert_eq!(unread(&h, 1), 0);
}

#[tokio::test]
async fn failed_transcript_never_marks_read() {
    let mut h = with_rooms(vec![chatroom(1, 2, 3, 1)]).await;
    h.messages.fail_transcript.store(true, Ordering::SeqCst);

    assert_eq!(h.engine.conversations.open(ChatroomId(1)).await, OpenOutcome::FetchFailed);

    assert_eq!(h.messages.count("mark_read"), 0);
    assert_eq!(unread(&h, 1), 3);
    assert!(h.engine.conversations.open_conversation().is_none());
    assert!(!h.transport.is_joined(&Topic::chatroom(ChatroomId(1))));
    assert_eq!(h.drain_notices()[0].message, "Chatroom unavailable.");
}

#[tokio::test]
async fn failed_mark_read_keeps_unread() {
    let h = with_rooms(vec![chatroom(1, 2, 3, 1)]).await;
    h.messages.fail_mark_read.store(true, Ordering::SeqCst);

    assert_eq!(h.engine.conversations.open(ChatroomId(1)).await, OpenOutcome::MarkReadFailed);
    assert_eq!(unread(&h, 1), 3);
    assert!(h.engine.conversations.open_conversation().unwrap().loaded);
}

#[tokio::test]
async fn chatroom_topic_is_joined_only_while_open() {
    let h = with_rooms(vec![chatroom(1, 2, 0, 1), chatroom(2, 3, 0, 2)]).await;
    let room_one = Topic::chatroom(ChatroomId(1));
    let room_two = Topic::chatroom(ChatroomId(2));

    h.engine.conversations.open(ChatroomId(1)).await;
    assert!(h.transport.is_joined(&room_one));

    h.engine.conversations.open(ChatroomId(2)).await;
    assert!(!h.transport.is_joined(&room_one));
    assert!(h.transport.is_joined(&room_two));

    h.engine.conversations.close();
    assert!(!h.transport.is_joined(&room_two));
    assert!(h.transport.is_joined(&user_topic()));
}

#[tokio::test]
async fn same_message_on_both_topics_is_shown_once() {
    let h = with_rooms(vec![chatroom(1, 2, 0, 1)]).await;
    h.engine.conversations.open(ChatroomId(1)).await;

    let event = sent(10, 1, PEER, 20);
    h.engine.bus.deliver(&user_topic(), &event);
    h.engine.bus.deliver(&Topic::chatroom(ChatroomId(1)), &event);

    assert_eq!(h.engine.conversations.open_conversation().unwrap().messages.len(), 1);
}

#[tokio::test]
async fn read_receipt_flips_messages_of_the_receiver() {
    let h = with_rooms(vec![chatroom(1, 2, 0, 1)]).await;
    h.messages
        .transcripts
        .lock()
        .insert(ChatroomId(1), vec![message(6, 1, ME, 2), message(5, 1, PEER, 1)]);
    h.engine.conversations.open(ChatroomId(1)).await;

    let receipt = PushEvent::MessageRead {
        chatroom_id: Some(ChatroomId(1)),
        sender_id: Some(PEER),
        receiver_id: ME,
    };
    h.engine.bus.deliver(&Topic::chatroom(ChatroomId(1)), &receipt);

    let open = h.engine.conversations.open_conversation().unwrap();
    let mine = open.messages.iter().find(|m| m.id == MessageId(6)).unwrap();
    let theirs = open.messages.iter().find(|m| m.id == MessageId(5)).unwrap();
    assert!(mine.read);
    assert!(!theirs.read);
}

#[tokio::test]
async fn list_stays_sorted_by_activity_with_stable_ties() {
    let h = with_rooms(vec![chatroom(1, 2, 0, 5), chatroom(2, 3, 0, 5), chatroom(3, 4, 0, 9)]).await;
    assert_eq!(order(&h), vec![3, 1, 2]);

    h.engine.bus.deliver(&user_topic(), &sent(20, 2, UserId(3), 10));
    assert_eq!(order(&h), vec![2, 3, 1]);

    // Room 1 ties with room 3; room 3 was ahead and stays ahead.
    h.engine.bus.deliver(&user_topic(), &sent(21, 1, PEER, 9));
    assert_eq!(order(&h), vec![2, 3, 1]);
}

#[tokio::test]
async fn messages_for_unknown_rooms_are_ignored() {
    let h = with_rooms(vec![chatroom(1, 2, 0, 1)]).await;
    h.engine.bus.deliver(&user_topic(), &sent(10, 77, PEER, 20));
    assert_eq!(order(&h), vec![1]);
    assert_eq!(h.engine.conversations.unread_total(), 0);
}

#[tokio::test]
async fn created_chatrooms_are_inserted_once() {
    let h = with_rooms(vec![chatroom(1, 2, 0, 1)]).await;
    let event = PushEvent::ChatroomCreated { chatroom: chatroom(4, 5, 0, 30) };
    h.engine.bus.deliver(&user_topic(), &event);
    h.engine.bus.deliver(&user_topic(), &event);
    assert_eq!(order(&h), vec![4, 1]);
}

#[tokio::test]
async fn send_shows_pending_then_confirmed_message() {
    let h = with_rooms(vec![chatroom(1, 2, 0, 1)]).await;
    h.engine.conversations.open(ChatroomId(1)).await;
    h.messages.send_gate.close();

    let conversations = h.engine.conversations.clone();
    let sending = tokio::spawn(async move { conversations.send("  hi there ").await });
    until(|| h.messages.send_gate.waiting() == 1).await;

    let open = h.engine.conversations.open_conversation().unwrap();
    assert!(open.messages[0].is_pending());
    assert_eq!(open.messages[0].body, "hi there");
    assert!(matches!(h.engine.conversations.send("again").await, Err(MutationError::Busy)));

    h.messages.send_gate.release();
    let confirmed = sending.await.unwrap().unwrap();

    let open = h.engine.conversations.open_conversation().unwrap();
    assert_eq!(open.messages.len(), 1);
    assert_eq!(open.messages[0].id, confirmed.id);
    assert!(!open.messages[0].is_pending());
    let room = h.engine.conversations.chatroom(ChatroomId(1)).unwrap();
    assert_eq!(room.latest_message.unwrap().id, confirmed.id);
}

#[tokio::test]
async fn push_echo_before_send_reply_is_not_duplicated() {
    let h = with_rooms(vec![chatroom(1, 2, 0, 1)]).await;
    h.engine.conversations.open(ChatroomId(1)).await;
    h.messages.send_gate.close();

    let conversations = h.engine.conversations.clone();
    let sending = tokio::spawn(async move { conversations.send("hi").await });
    until(|| h.messages.send_gate.waiting() == 1).await;

    // The mock assigns id 900 to the first sent message.
    h.engine.bus.deliver(&Topic::chatroom(ChatroomId(1)), &sent(900, 1, ME, 30));
    h.messages.send_gate.release();
    sending.await.unwrap().unwrap();

    let open = h.engine.conversations.open_conversation().unwrap();
    assert_eq!(open.messages.len(), 1);
    assert_eq!(open.messages[0].id, MessageId(900));
}

#[tokio::test]
async fn failed_send_removes_pending_message() {
    let mut h = with_rooms(vec![chatroom(1, 2, 0, 1)]).await;
    h.engine.conversations.open(ChatroomId(1)).await;
    h.messages.fail_send.store(true, Ordering::SeqCst);

    assert!(h.engine.conversations.send("hi").await.is_err());
    assert!(h.engine.conversations.open_conversation().unwrap().messages.is_empty());
    assert!(!h.engine.conversations.is_sending());
    assert!(h.drain_notices().iter().any(|n| n.message == "Message not sent."));
}

#[tokio::test]
async fn blank_or_roomless_sends_are_refused() {
    let h = with_rooms(vec![chatroom(1, 2, 0, 1)]).await;
    assert!(matches!(h.engine.conversations.send("hi").await, Err(MutationError::Missing)));
    h.engine.conversations.open(ChatroomId(1)).await;
    assert!(matches!(h.engine.conversations.send("  ").await, Err(MutationError::Invalid(_))));
    assert_eq!(h.messages.count("send_message"), 0);
}

#[tokio::test]
async fn creating_a_chatroom_opens_it() {
    let mut h = with_rooms(vec![chatroom(1, 2, 0, 1)]).await;
    *h.messages.created.lock() = Some(chatroom(8, 5, 0, 40));

    let created = h.engine.conversations.create_chatroom(UserId(5)).await.unwrap();

    assert_eq!(created.id, ChatroomId(8));
    assert_eq!(order(&h), vec![8, 1]);
    let open = h.engine.conversations.open_conversation().unwrap();
    assert_eq!(open.chatroom_id, ChatroomId(8));
    assert!(open.messages.is_empty());
    assert!(h.transport.is_joined(&Topic::chatroom(ChatroomId(8))));
    assert_eq!(h.drain_notices()[0].message, "Chat started with Peer Tester.");
}

#[tokio::test]
async fn unread_filter_refetches_and_is_idempotent() {
    let h = with_rooms(vec![chatroom(1, 2, 0, 1), chatroom(2, 3, 2, 2)]).await;
    h.messages
        .pages
        .lock()
        .insert((ListFilter::Unread, 1), page(vec![chatroom(2, 3, 2, 2)], 1, 1));

    assert!(h.engine.conversations.set_filter(ListFilter::Unread).await.is_loaded());
    assert_eq!(
        h.engine.conversations.set_filter(ListFilter::Unread).await,
        PageOutcome::Skipped(PageSkip::Unchanged)
    );
    assert_eq!(h.messages.count("fetch_chatrooms unread 1"), 1);

    let visible: Vec<u64> = h.engine.conversations.visible_chatrooms().iter().map(|c| c.id.0).collect();
    assert_eq!(visible, vec![2]);
}

#[tokio::test]
async fn unread_badge_follows_events() {
    let h = with_rooms(vec![chatroom(1, 2, 1, 1)]).await;
    let mut badge = h.engine.conversations.watch_unread();
    assert_eq!(*badge.borrow_and_update(), 1);

    h.engine.bus.deliver(&user_topic(), &sent(10, 1, PEER, 20));
    assert!(badge.has_changed().unwrap());
    assert_eq!(*badge.borrow_and_update(), 2);
}

#[tokio::test]
async fn send_reaches_open_room_after_it_leaves_the_list() {
    let h = with_rooms(vec![chatroom(1, 2, 1, 1)]).await;
    let pages = &h.messages.pages;
    pages.lock().insert((ListFilter::Unread, 1), page(vec![chatroom(1, 2, 1, 1)], 1, 1));
    assert!(h.engine.conversations.set_filter(ListFilter::Unread).await.is_loaded());
    h.engine.conversations.open(ChatroomId(1)).await;

    // Opening read the room, so the unread list no longer carries it.
    pages.lock().insert((ListFilter::Unread, 1), page(Vec::new(), 1, 1));
    assert!(h.engine.conversations.reload().await.is_loaded());
    assert!(h.engine.conversations.chatroom(ChatroomId(1)).is_none());
    assert!(h.engine.conversations.open_conversation().is_some());

    let message = h.engine.conversations.send("still here").await.unwrap();
    assert_eq!(message.chatroom_id, ChatroomId(1));
    assert_eq!(message.receiver_id, PEER);
}

#[tokio::test]
async fn undated_created_chatroom_goes_to_the_head() {
    let h = with_rooms(vec![chatroom(1, 2, 0, 1), chatroom(2, 3, 0, 2)]).await;
    let mut fresh = chatroom(9, 4, 0, 0);
    fresh.updated_at = None;

    h.engine.bus.deliver(&user_topic(), &PushEvent::ChatroomCreated { chatroom: fresh });

    assert_eq!(order(&h), vec![9, 2, 1]);
}

#[tokio::test]
async fn undated_chatroom_from_create_goes_to_the_head() {
    let h = with_rooms(vec![chatroom(1, 2, 0, 1), chatroom(2, 3, 0, 2)]).await;
    let mut fresh = chatroom(8, 5, 0, 0);
    fresh.updated_at = None;
    *h.messages.created.lock() = Some(fresh);

    h.engine.conversations.create_chatroom(UserId(5)).await.unwrap();

    assert_eq!(order(&h), vec![8, 2, 1]);
}

#[tokio::test]
async fn undated_message_still_moves_its_room_up() {
    let h = with_rooms(vec![chatroom(1, 2, 0, 1), chatroom(2, 3, 0, 2)]).await;
    let mut undated = message(10, 1, PEER, 0);
    undated.created_at = None;

    h.engine.bus.deliver(&user_topic(), &PushEvent::MessageSent { message: undated });

    assert_eq!(order(&h), vec![1, 2]);
    assert_eq!(unread(&h, 1), 1);
}
