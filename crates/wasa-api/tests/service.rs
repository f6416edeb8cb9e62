use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;

use wasa_api::{ApiError, ConversationService};
use wasa_db::Database;
use wasa_db::models::UserRow;
use wasa_gateway::{Broadcaster, ConnectionHandle, ConnectionRegistry, Outbound};
use wasa_types::api::SendMessageRequest;
use wasa_types::models::{ConversationKind, MessageStatus};

fn service() -> ConversationService {
    let db = Arc::new(Database::open_in_memory().unwrap());
    ConversationService::new(db, Broadcaster::new(ConnectionRegistry::new()))
}

async fn user(service: &ConversationService, name: &str) -> UserRow {
    service.login(name).await.unwrap().0
}

/// Register an in-process connection for `user` and hand back its queue.
async fn connect(service: &ConversationService, user: &UserRow) -> UnboundedReceiver<Outbound> {
    let (handle, rx) = ConnectionHandle::new();
    service.registry().register(&user.id, handle).await;
    rx
}

async fn next_event(rx: &mut UnboundedReceiver<Outbound>) -> Value {
    let outbound = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for a push")
        .expect("connection queue closed");
    match outbound {
        Outbound::Frame(frame) => serde_json::from_str(&frame).unwrap(),
        Outbound::Close => panic!("connection was closed"),
    }
}

/// Collect `n` events. Events of one action may arrive in any order, so the
/// result is sorted by type.
async fn events(rx: &mut UnboundedReceiver<Outbound>, n: usize) -> Vec<Value> {
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(next_event(rx).await);
    }
    out.sort_by(|a, b| a["type"].as_str().cmp(&b["type"].as_str()));
    out
}

async fn assert_quiet(rx: &mut UnboundedReceiver<Outbound>) {
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err(), "unexpected push");
}

fn text(body: &str) -> SendMessageRequest {
    SendMessageRequest {
        content_type: "text".into(),
        text: Some(body.into()),
        ..Default::default()
    }
}

#[tokio::test]
async fn direct_message_walks_sent_received_read() {
    let service = service();
    let alice = user(&service, "alice").await;
    let bob = user(&service, "bob").await;
    let mut alice_rx = connect(&service, &alice).await;
    let mut bob_rx = connect(&service, &bob).await;

    let (conv, created) = service.start_direct(&alice, &bob.id).await.unwrap();
    assert!(created);
    assert_eq!(conv.title, "bob");
    let pushed = next_event(&mut bob_rx).await;
    assert_eq!(pushed["type"], "new_conversation");
    assert_eq!(pushed["payload"]["title"], "alice");
    assert_eq!(next_event(&mut alice_rx).await["type"], "new_conversation");

    let sent = service.send_message(&alice, &conv.id, text("hi bob")).await.unwrap();
    assert!(sent.created);
    assert_eq!(sent.message.status, MessageStatus::Sent);

    let pushed = events(&mut bob_rx, 2).await;
    assert_eq!(pushed[0]["type"], "conversation_updated");
    assert_eq!(pushed[0]["payload"]["lastMessageSnippet"], "hi bob");
    assert_eq!(pushed[1]["type"], "new_message");
    assert_eq!(pushed[1]["payload"]["id"], sent.message.id.as_str());
    // The sender's own sessions hear about it too
    assert_eq!(events(&mut alice_rx, 2).await.len(), 2);

    // Fetching the list delivers
    let list = service.list_conversations(&bob).await.unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].title, "alice");
    let view = service.open_conversation(&alice, &conv.id).await.unwrap();
    assert_eq!(view.messages[0].status, MessageStatus::Received);
    assert_quiet(&mut bob_rx).await;

    // Opening reads
    let view = service.open_conversation(&bob, &conv.id).await.unwrap();
    assert_eq!(view.messages.len(), 1);
    let read = next_event(&mut alice_rx).await;
    assert_eq!(read["type"], "messages_read");
    assert_eq!(read["payload"]["readByUserId"], bob.id.as_str());
    assert_eq!(read["payload"]["fullyReadMessageIds"][0], sent.message.id.as_str());

    let view = service.open_conversation(&alice, &conv.id).await.unwrap();
    assert_eq!(view.messages[0].status, MessageStatus::Read);
}

#[tokio::test]
async fn starting_the_same_direct_conversation_twice_returns_it() {
    let service = service();
    let alice = user(&service, "alice").await;
    let bob = user(&service, "bob").await;

    let (first, created) = service.start_direct(&alice, &bob.id).await.unwrap();
    assert!(created);
    let (second, created) = service.start_direct(&bob, &alice.id).await.unwrap();
    assert!(!created);
    assert_eq!(first.id, second.id);
}

#[tokio::test]
async fn message_yourself_stays_sent() {
    let service = service();
    let alice = user(&service, "alice").await;

    let (conv, _) = service.start_direct(&alice, &alice.id).await.unwrap();
    assert_eq!(conv.title, "Message Yourself");
    assert_eq!(conv.participants.len(), 1);

    service.send_message(&alice, &conv.id, text("note to self")).await.unwrap();
    service.list_conversations(&alice).await.unwrap();
    let view = service.open_conversation(&alice, &conv.id).await.unwrap();
    assert_eq!(view.messages[0].status, MessageStatus::Sent);
}

#[tokio::test]
async fn retry_with_client_message_id_is_not_duplicated() {
    let service = service();
    let alice = user(&service, "alice").await;
    let bob = user(&service, "bob").await;
    let mut bob_rx = connect(&service, &bob).await;
    let (conv, _) = service.start_direct(&alice, &bob.id).await.unwrap();
    next_event(&mut bob_rx).await;

    let mut req = text("once");
    req.client_message_id = Some("c-1".into());
    let first = service.send_message(&alice, &conv.id, req).await.unwrap();
    assert!(first.created);
    events(&mut bob_rx, 2).await;

    let mut req = text("once");
    req.client_message_id = Some("c-1".into());
    let retry = service.send_message(&alice, &conv.id, req).await.unwrap();
    assert!(!retry.created);
    assert_eq!(retry.message.id, first.message.id);
    assert_quiet(&mut bob_rx).await;

    let view = service.open_conversation(&bob, &conv.id).await.unwrap();
    assert_eq!(view.messages.len(), 1);
}

#[tokio::test]
async fn group_message_is_read_only_once_everyone_opened_it() {
    let service = service();
    let alice = user(&service, "alice").await;
    let bob = user(&service, "bob").await;
    let carol = user(&service, "carol").await;
    let mut alice_rx = connect(&service, &alice).await;
    let mut bob_rx = connect(&service, &bob).await;

    let group = service
        .create_group(&alice, "climbing", vec![bob.id.clone(), carol.id.clone()])
        .await
        .unwrap();
    assert_eq!(group.members.len(), 3);
    let pushed = next_event(&mut bob_rx).await;
    assert_eq!(pushed["type"], "new_conversation");
    assert_eq!(pushed["payload"]["type"], "group");
    assert_eq!(pushed["payload"]["title"], "climbing");
    next_event(&mut alice_rx).await;

    let sent = service.send_message(&alice, &group.id, text("saturday?")).await.unwrap();
    events(&mut alice_rx, 2).await;

    service.open_conversation(&bob, &group.id).await.unwrap();
    let read = next_event(&mut alice_rx).await;
    assert_eq!(read["type"], "messages_read");
    assert_eq!(read["payload"]["fullyReadMessageIds"], Value::Array(vec![]));

    let view = service.open_conversation(&alice, &group.id).await.unwrap();
    assert_eq!(view.kind, ConversationKind::Group);
    assert_eq!(view.messages[0].status, MessageStatus::Received);

    service.open_conversation(&carol, &group.id).await.unwrap();
    let read = next_event(&mut alice_rx).await;
    assert_eq!(read["payload"]["fullyReadMessageIds"][0], sent.message.id.as_str());

    let view = service.open_conversation(&alice, &group.id).await.unwrap();
    assert_eq!(view.messages[0].status, MessageStatus::Read);
}

#[tokio::test]
async fn offline_and_dead_recipients_do_not_fail_the_send() {
    let service = service();
    let alice = user(&service, "alice").await;
    let bob = user(&service, "bob").await;
    let carol = user(&service, "carol").await;
    let mut alice_rx = connect(&service, &alice).await;
    let group = service
        .create_group(&alice, "trip", vec![bob.id.clone(), carol.id.clone()])
        .await
        .unwrap();
    next_event(&mut alice_rx).await;

    // bob's connection dies without unregistering; carol is offline
    let (handle, dead_rx) = ConnectionHandle::new();
    service.registry().register(&bob.id, handle).await;
    drop(dead_rx);

    service.send_message(&alice, &group.id, text("anyone?")).await.unwrap();
    assert_eq!(events(&mut alice_rx, 2).await.len(), 2);

    for _ in 0..50 {
        if !service.registry().is_registered(&bob.id).await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!service.registry().is_registered(&bob.id).await);
    assert!(service.registry().is_registered(&alice.id).await);
}

#[tokio::test]
async fn outsiders_cannot_see_or_post() {
    let service = service();
    let alice = user(&service, "alice").await;
    let bob = user(&service, "bob").await;
    let eve = user(&service, "eve").await;
    let (conv, _) = service.start_direct(&alice, &bob.id).await.unwrap();

    let err = service.open_conversation(&eve, &conv.id).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
    let err = service.send_message(&eve, &conv.id, text("hi")).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn reply_must_target_the_same_conversation() {
    let service = service();
    let alice = user(&service, "alice").await;
    let bob = user(&service, "bob").await;
    let carol = user(&service, "carol").await;
    let (with_bob, _) = service.start_direct(&alice, &bob.id).await.unwrap();
    let (with_carol, _) = service.start_direct(&alice, &carol.id).await.unwrap();

    let elsewhere = service.send_message(&alice, &with_carol.id, text("hey carol")).await.unwrap();

    let mut req = text("re");
    req.reply_to_message_id = Some(elsewhere.message.id.clone());
    let err = service.send_message(&alice, &with_bob.id, req).await.unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    let original = service.send_message(&alice, &with_bob.id, text("hey bob")).await.unwrap();
    let mut req = text("re");
    req.reply_to_message_id = Some(original.message.id.clone());
    let reply = service.send_message(&bob, &with_bob.id, req).await.unwrap();
    assert_eq!(reply.message.replied_to_message_id.as_deref(), Some(original.message.id.as_str()));
}

#[tokio::test]
async fn only_the_sender_deletes() {
    let service = service();
    let alice = user(&service, "alice").await;
    let bob = user(&service, "bob").await;
    let mut bob_rx = connect(&service, &bob).await;
    let (conv, _) = service.start_direct(&alice, &bob.id).await.unwrap();
    let sent = service.send_message(&alice, &conv.id, text("oops")).await.unwrap();
    events(&mut bob_rx, 3).await;

    let err = service.delete_message(&bob, &conv.id, &sent.message.id).await.unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    service.delete_message(&alice, &conv.id, &sent.message.id).await.unwrap();
    let pushed = next_event(&mut bob_rx).await;
    assert_eq!(pushed["type"], "message_deleted");
    assert_eq!(pushed["payload"]["messageId"], sent.message.id.as_str());

    let view = service.open_conversation(&bob, &conv.id).await.unwrap();
    assert!(view.messages.is_empty());
}

#[tokio::test]
async fn reacting_again_replaces_the_reaction() {
    let service = service();
    let alice = user(&service, "alice").await;
    let bob = user(&service, "bob").await;
    let mut alice_rx = connect(&service, &alice).await;
    let (conv, _) = service.start_direct(&alice, &bob.id).await.unwrap();
    let sent = service.send_message(&alice, &conv.id, text("guess what")).await.unwrap();
    events(&mut alice_rx, 3).await;

    let first = service.react(&bob, &conv.id, &sent.message.id, "👍").await.unwrap();
    assert_eq!(next_event(&mut alice_rx).await["type"], "reaction_added");

    let second = service.react(&bob, &conv.id, &sent.message.id, "❤️").await.unwrap();
    let pushed = events(&mut alice_rx, 2).await;
    assert_eq!(pushed[0]["type"], "reaction_added");
    assert_eq!(pushed[1]["type"], "reaction_removed");
    assert_eq!(pushed[1]["payload"]["reactionId"], first.id.as_str());

    let view = service.open_conversation(&alice, &conv.id).await.unwrap();
    let reactions = &view.messages[0].reactions;
    assert_eq!(reactions.len(), 1);
    assert_eq!(reactions[0].emoji, "❤️");

    let err = service
        .unreact(&alice, &conv.id, &sent.message.id, &second.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));
    service.unreact(&bob, &conv.id, &sent.message.id, &second.id).await.unwrap();
}

#[tokio::test]
async fn forwarded_copy_starts_fresh() {
    let service = service();
    let alice = user(&service, "alice").await;
    let bob = user(&service, "bob").await;
    let carol = user(&service, "carol").await;
    let (with_bob, _) = service.start_direct(&alice, &bob.id).await.unwrap();
    let (with_carol, _) = service.start_direct(&alice, &carol.id).await.unwrap();

    let original = service.send_message(&bob, &with_bob.id, text("pass it on")).await.unwrap();
    service.open_conversation(&alice, &with_bob.id).await.unwrap();

    let copy = service
        .forward_message(&alice, &with_bob.id, &original.message.id, &with_carol.id)
        .await
        .unwrap();
    assert!(copy.is_forwarded);
    assert_eq!(copy.conversation_id, with_carol.id);
    assert_eq!(copy.text.as_deref(), Some("pass it on"));
    assert_eq!(copy.status, MessageStatus::Sent);
    assert_eq!(copy.sender.id, alice.id);
}

#[tokio::test]
async fn rename_conflicts_and_notifies_contacts() {
    let service = service();
    let alice = user(&service, "alice").await;
    let bob = user(&service, "bob").await;
    let mut bob_rx = connect(&service, &bob).await;
    service.start_direct(&alice, &bob.id).await.unwrap();
    next_event(&mut bob_rx).await;

    let err = service.set_username(&alice, "bob").await.unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));

    let renamed = service.set_username(&alice, "alicia").await.unwrap();
    assert_eq!(renamed.name, "alicia");
    let pushed = next_event(&mut bob_rx).await;
    assert_eq!(pushed["type"], "profile_updated");
    assert_eq!(pushed["payload"]["name"], "alicia");

    let (again, created) = service.login("alicia").await.unwrap();
    assert!(!created);
    assert_eq!(again.id, alice.id);
}

#[tokio::test]
async fn added_member_gets_the_group_and_others_get_an_update() {
    let service = service();
    let alice = user(&service, "alice").await;
    let bob = user(&service, "bob").await;
    let carol = user(&service, "carol").await;
    let mut bob_rx = connect(&service, &bob).await;
    let mut carol_rx = connect(&service, &carol).await;
    let group = service.create_group(&alice, "band", vec![bob.id.clone()]).await.unwrap();
    next_event(&mut bob_rx).await;

    let updated = service.add_member(&alice, &group.id, &carol.id).await.unwrap();
    assert_eq!(updated.members.len(), 3);
    let pushed = events(&mut carol_rx, 2).await;
    assert_eq!(pushed[0]["type"], "group_updated");
    assert_eq!(pushed[1]["type"], "new_conversation");
    assert_eq!(pushed[1]["payload"]["title"], "band");
    let pushed = next_event(&mut bob_rx).await;
    assert_eq!(pushed["type"], "group_updated");
    assert_eq!(pushed["payload"]["groupId"], group.id.as_str());

    service.leave_group(&bob, &group.id).await.unwrap();
    let err = service.get_group(&bob, &group.id).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn late_joiner_catching_up_does_not_repeat_fully_read_ids() {
    let service = service();
    let alice = user(&service, "alice").await;
    let bob = user(&service, "bob").await;
    let carol = user(&service, "carol").await;
    let mut alice_rx = connect(&service, &alice).await;
    let group = service.create_group(&alice, "pair", vec![bob.id.clone()]).await.unwrap();
    next_event(&mut alice_rx).await;

    let sent = service.send_message(&alice, &group.id, text("first")).await.unwrap();
    events(&mut alice_rx, 2).await;
    service.open_conversation(&bob, &group.id).await.unwrap();
    let read = next_event(&mut alice_rx).await;
    assert_eq!(read["payload"]["fullyReadMessageIds"][0], sent.message.id.as_str());

    service.add_member(&alice, &group.id, &carol.id).await.unwrap();
    assert_eq!(next_event(&mut alice_rx).await["type"], "group_updated");

    service.open_conversation(&carol, &group.id).await.unwrap();
    let read = next_event(&mut alice_rx).await;
    assert_eq!(read["type"], "messages_read");
    assert_eq!(read["payload"]["readByUserId"], carol.id.as_str());
    assert_eq!(read["payload"]["fullyReadMessageIds"], Value::Array(vec![]));
}

#[tokio::test]
async fn group_rename_and_photo_reach_members() {
    let service = service();
    let alice = user(&service, "alice").await;
    let bob = user(&service, "bob").await;
    let mut bob_rx = connect(&service, &bob).await;
    let group = service.create_group(&alice, "band", vec![bob.id.clone()]).await.unwrap();
    next_event(&mut bob_rx).await;

    service.rename_group(&alice, &group.id, "the band").await.unwrap();
    let pushed = next_event(&mut bob_rx).await;
    assert_eq!(pushed["type"], "group_updated");
    assert_eq!(pushed["payload"]["groupId"], group.id.as_str());
    assert_eq!(pushed["payload"]["name"], "the band");

    let updated = service
        .set_group_photo(&alice, &group.id, "/uploads/cover.png")
        .await
        .unwrap();
    assert_eq!(updated.photo_url.as_deref(), Some("/uploads/cover.png"));
    let pushed = next_event(&mut bob_rx).await;
    assert_eq!(pushed["type"], "group_updated");
    assert_eq!(pushed["payload"]["name"], "the band");
    assert_eq!(pushed["payload"]["photoUrl"], "/uploads/cover.png");
}

#[tokio::test]
async fn profile_photo_change_reaches_contacts() {
    let service = service();
    let alice = user(&service, "alice").await;
    let bob = user(&service, "bob").await;
    let mut bob_rx = connect(&service, &bob).await;
    service.start_direct(&alice, &bob.id).await.unwrap();
    next_event(&mut bob_rx).await;

    let updated = service.set_photo(&alice, "/uploads/me.jpg").await.unwrap();
    assert_eq!(updated.photo_url.as_deref(), Some("/uploads/me.jpg"));
    let pushed = next_event(&mut bob_rx).await;
    assert_eq!(pushed["type"], "profile_updated");
    assert_eq!(pushed["payload"]["userId"], alice.id.as_str());
    assert_eq!(pushed["payload"]["photoUrl"], "/uploads/me.jpg");
    assert!(pushed["payload"].get("name").is_none());
}
