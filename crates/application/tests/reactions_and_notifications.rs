//! 点赞与通知去重集成测试

mod support;

use application::{NotificationEffect, ToggleReactionRequest};
use domain::{ConnectionId, DomainError, NotificationKind, RealtimeEvent, SubjectRef, User};
use support::Harness;
use tokio::sync::mpsc;

fn like(subject: SubjectRef, user: &User) -> ToggleReactionRequest {
    ToggleReactionRequest {
        subject,
        user_id: user.id,
    }
}

#[tokio::test]
async fn toggle_twice_restores_state() {
    let h = Harness::new();
    let author = h.user("Alice").await;
    let fan = h.user("Bob").await;
    let discussion = h.discussion(&author, "Trails").await;
    let subject = SubjectRef::discussion(discussion.id);

    let before = h.reactions.state(subject, Some(fan.id)).await.unwrap();
    let on = h.reactions.toggle(like(subject, &fan)).await.unwrap();
    assert!(on.reacted);
    assert_eq!(on.count, before.count + 1);

    let off = h.reactions.toggle(like(subject, &fan)).await.unwrap();
    assert!(!off.reacted);
    assert_eq!(off.notification, NotificationEffect::NotRequested);

    let after = h.reactions.state(subject, Some(fan.id)).await.unwrap();
    assert_eq!(after, before);
}

#[tokio::test]
async fn discussion_like_scenario_keeps_single_notification() {
    let h = Harness::new();
    let u1 = h.user("Alice").await;
    let u2 = h.user("Bob").await;
    let u3 = h.user("Carol").await;
    let d1 = h.discussion(&u1, "Bikes").await;
    let subject = SubjectRef::discussion(d1.id);

    let first = h.reactions.toggle(like(subject, &u2)).await.unwrap();
    let NotificationEffect::Created(notification) = first.notification else {
        panic!("expected a notification, got {:?}", first.notification);
    };
    assert_eq!(notification.recipient_id, u1.id);
    assert_eq!(notification.kind, NotificationKind::DiscussionLike);
    assert_eq!(notification.link, d1.id.to_string());
    assert_eq!(notification.content, "Bob liked your discussion \"Bikes\"");
    assert!(!notification.read);

    let second = h.reactions.toggle(like(subject, &u3)).await.unwrap();
    assert_eq!(second.count, 2);
    assert_eq!(second.notification, NotificationEffect::DuplicateSuppressed);
    assert_eq!(h.store.notifications_for(u1.id).await.len(), 1);

    let unliked = h.reactions.toggle(like(subject, &u2)).await.unwrap();
    assert!(!unliked.reacted);
    assert_eq!(unliked.count, 1);

    let remaining = h.notifications.list(u1.id).await.unwrap();
    assert_eq!(remaining, vec![notification]);
}

#[tokio::test]
async fn reply_like_deduplicates_per_reply() {
    let h = Harness::new();
    let author = h.user("Alice").await;
    let x = h.user("Bob").await;
    let z = h.user("Carol").await;
    let discussion = h.discussion(&author, "Bikes").await;
    let first_reply = h.reply(&discussion, &author, "I ride daily").await;
    let second_reply = h.reply(&discussion, &author, "Weekends too").await;

    let outcome = h
        .reactions
        .toggle(like(SubjectRef::reply(first_reply.id), &x))
        .await
        .unwrap();
    assert!(matches!(outcome.notification, NotificationEffect::Created(_)));

    let outcome = h
        .reactions
        .toggle(like(SubjectRef::reply(first_reply.id), &z))
        .await
        .unwrap();
    assert_eq!(outcome.count, 2);
    assert_eq!(outcome.notification, NotificationEffect::DuplicateSuppressed);

    // 另一条回复的点赞有独立的去重键
    let outcome = h
        .reactions
        .toggle(like(SubjectRef::reply(second_reply.id), &x))
        .await
        .unwrap();
    assert!(matches!(outcome.notification, NotificationEffect::Created(_)));

    let notifications = h.store.notifications_for(author.id).await;
    assert_eq!(notifications.len(), 2);
    assert!(notifications.iter().all(|n| n.kind == NotificationKind::ReplyLike));
    assert!(notifications.iter().all(|n| n.title == "Your reply was liked"));
}

#[tokio::test]
async fn reading_a_notification_reopens_the_slot() {
    let h = Harness::new();
    let author = h.user("Alice").await;
    let x = h.user("Bob").await;
    let z = h.user("Carol").await;
    let discussion = h.discussion(&author, "Bikes").await;
    let subject = SubjectRef::discussion(discussion.id);

    let outcome = h.reactions.toggle(like(subject, &x)).await.unwrap();
    let NotificationEffect::Created(first) = outcome.notification else {
        panic!("expected a notification");
    };
    h.notifications.mark_read(first.id, author.id).await.unwrap();
    assert_eq!(h.notifications.unread_count(author.id).await.unwrap(), 0);

    let outcome = h.reactions.toggle(like(subject, &z)).await.unwrap();
    assert!(matches!(outcome.notification, NotificationEffect::Created(_)));

    let listed = h.notifications.list(author.id).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(!listed[0].read);
    assert!(listed[1].read);
}

#[tokio::test]
async fn dismissed_notification_no_longer_blocks() {
    let h = Harness::new();
    let author = h.user("Alice").await;
    let x = h.user("Bob").await;
    let z = h.user("Carol").await;
    let discussion = h.discussion(&author, "Bikes").await;
    let subject = SubjectRef::discussion(discussion.id);

    let outcome = h.reactions.toggle(like(subject, &x)).await.unwrap();
    let NotificationEffect::Created(first) = outcome.notification else {
        panic!("expected a notification");
    };
    let dismissed = h.notifications.dismiss(first.id, author.id).await.unwrap();
    assert!(dismissed.dismissed);

    let outcome = h.reactions.toggle(like(subject, &z)).await.unwrap();
    assert!(matches!(outcome.notification, NotificationEffect::Created(_)));
}

#[tokio::test]
async fn liking_your_own_discussion_is_silent() {
    let h = Harness::new();
    let author = h.user("Alice").await;
    let discussion = h.discussion(&author, "Bikes").await;

    let outcome = h
        .reactions
        .toggle(like(SubjectRef::discussion(discussion.id), &author))
        .await
        .unwrap();
    assert!(outcome.reacted);
    assert_eq!(outcome.count, 1);
    assert_eq!(outcome.notification, NotificationEffect::NotRequested);
    assert!(h.store.notifications_for(author.id).await.is_empty());
}

#[tokio::test]
async fn unknown_subject_is_rejected() {
    let h = Harness::new();
    let fan = h.user("Bob").await;

    let err = h
        .reactions
        .toggle(like(SubjectRef::discussion(domain::DiscussionId::generate()), &fan))
        .await
        .unwrap_err();
    assert_eq!(err.domain_kind(), Some(&DomainError::SubjectNotFound));
}

#[tokio::test]
async fn online_author_receives_notification_event() {
    let h = Harness::new();
    let author = h.user("Alice").await;
    let fan = h.user("Bob").await;
    let discussion = h.discussion(&author, "Bikes").await;

    let (tx, mut rx) = mpsc::channel(8);
    h.registry.join(ConnectionId::generate(), author.id, tx).unwrap();

    h.reactions
        .toggle(like(SubjectRef::discussion(discussion.id), &fan))
        .await
        .unwrap();

    match rx.recv().await.unwrap() {
        RealtimeEvent::NotificationNew { notification } => {
            assert_eq!(notification.title, "Your discussion was liked");
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn mark_all_read_clears_unread_count() {
    let h = Harness::new();
    let author = h.user("Alice").await;
    let fan = h.user("Bob").await;
    let first = h.discussion(&author, "One").await;
    let second = h.discussion(&author, "Two").await;

    h.reactions.toggle(like(SubjectRef::discussion(first.id), &fan)).await.unwrap();
    h.reactions.toggle(like(SubjectRef::discussion(second.id), &fan)).await.unwrap();
    assert_eq!(h.notifications.unread_count(author.id).await.unwrap(), 2);

    assert_eq!(h.notifications.mark_all_read(author.id).await.unwrap(), 2);
    assert_eq!(h.notifications.unread_count(author.id).await.unwrap(), 0);
}
