mod common;

use common::{TestWorld, registration};
use reciprocity::vector::{cosine_similarity, magnitude};
use reciprocity::{
    FeedbackSubmission, FeedbackTarget, MatchEngine, MatchQuery, MatchType, Sentiment,
    SentimentGrade, Snapshot, UserId, VectorKind,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn vector(world: &TestWorld, user: &UserId, kind: VectorKind) -> Vec<f32> {
    world
        .engine
        .vectors()
        .get(user, kind)
        .unwrap()
        .expect("vector present")
        .values
}

#[tokio::test]
async fn positive_feedback_moves_requirements_toward_subject() {
    let world = TestWorld::new();
    world
        .engine
        .register(registration("alice", "a rust mentor for systems work", "pitch coaching"))
        .unwrap();
    world
        .engine
        .register(registration("bob", "seed funding", "angel investment in climate"))
        .unwrap();
    world.engine.run_batch(&CancellationToken::new()).await.unwrap();

    let (alice, bob) = (UserId::from("alice"), UserId::from("bob"));
    let before = vector(&world, &alice, VectorKind::Requirements);
    let target = vector(&world, &bob, VectorKind::Offerings);

    let record = world
        .engine
        .apply_feedback(&alice, &bob, Sentiment::Positive, None)
        .unwrap();
    assert!(record.adjusted.contains(&VectorKind::Requirements));

    let after = vector(&world, &alice, VectorKind::Requirements);
    assert!(cosine_similarity(&after, &target) > cosine_similarity(&before, &target));
    assert!((magnitude(&after) - magnitude(&before)).abs() < 1e-5);
}

#[tokio::test]
async fn negative_text_moves_away() {
    let world = TestWorld::new();
    world.register_many("u", 2);
    world.engine.run_batch(&CancellationToken::new()).await.unwrap();
    let (me, them) = (UserId::from("u0"), UserId::from("u1"));

    let before = vector(&world, &me, VectorKind::Offerings);
    let target = vector(&world, &them, VectorKind::Requirements);
    let record = world
        .engine
        .submit_feedback(&FeedbackSubmission {
            user_id: me.clone(),
            subject_id: them,
            target: FeedbackTarget::Chat,
            text: "honestly not great, a waste of time".into(),
        })
        .unwrap();
    assert_eq!(record.sentiment, Sentiment::Negative);
    assert!(record.step < 0.0);

    let after = vector(&world, &me, VectorKind::Offerings);
    assert!(cosine_similarity(&after, &target) < cosine_similarity(&before, &target));
}

#[tokio::test]
async fn feedback_is_recorded_while_vectors_are_unreachable() {
    let world = TestWorld::new();
    world.register_many("u", 2);
    world.engine.run_batch(&CancellationToken::new()).await.unwrap();
    let (me, them) = (UserId::from("u0"), UserId::from("u1"));

    world.vectors.set_offline(true);
    let record = world
        .engine
        .submit_feedback(&FeedbackSubmission {
            user_id: me.clone(),
            subject_id: them.clone(),
            target: FeedbackTarget::Match,
            text: "great match, very helpful".into(),
        })
        .unwrap();
    assert_eq!(record.sentiment, Sentiment::Positive);
    assert!(record.adjusted.is_empty());
    assert_eq!(world.engine.feedback_history(&me), vec![record]);

    // Learning resumes once the store is back
    world.vectors.set_offline(false);
    let record = world
        .engine
        .apply_feedback(&me, &them, Sentiment::Positive, None)
        .unwrap();
    assert!(!record.adjusted.is_empty());
    assert_eq!(world.engine.feedback_history(&me).len(), 2);
}

#[test]
fn feedback_history_keeps_the_latest_entries() {
    let world = TestWorld::with_settings(|settings| settings.feedback.history_limit = 3);
    let (alice, bob) = (UserId::from("alice"), UserId::from("bob"));
    for _ in 0..5 {
        world
            .engine
            .apply_feedback(&alice, &bob, SentimentGrade::Neutral, None)
            .unwrap();
    }
    let history = world.engine.feedback_history(&alice);
    assert_eq!(history.len(), 3);
    assert!(history.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    assert_eq!(world.engine.adjustment_stats(&alice).neutral, 3);
}

#[tokio::test]
async fn snapshot_restores_the_whole_engine() {
    let world = TestWorld::new();
    world.register_many("u", 4);
    world.engine.run_batch(&CancellationToken::new()).await.unwrap();
    world
        .engine
        .apply_feedback(
            &UserId::from("u0"),
            &UserId::from("u1"),
            Sentiment::Positive,
            None,
        )
        .unwrap();
    world.engine.save_state().unwrap();

    let snapshot = Snapshot::load(&world.settings.state_path).unwrap().unwrap();
    assert_eq!(snapshot.accounts.len(), 4);
    assert_eq!(snapshot.matches.len(), 4 * 3 * 2);
    assert_eq!(snapshot.notified.len(), 6);
    assert_eq!(snapshot.feedback.len(), 1);

    let restored = MatchEngine::builder(world.settings.clone())
        .notification_sink(Arc::new(world.sink.clone()))
        .snapshot(Some(snapshot))
        .build()
        .unwrap();
    let query = MatchQuery::new(UserId::from("u2"), MatchType::OfferingsToRequirements);
    assert_eq!(
        restored.matches(&query).unwrap(),
        world.engine.matches(&query).unwrap()
    );
    assert_eq!(restored.feedback_history(&UserId::from("u0")).len(), 1);
    assert!(restored.accounts().dirty_users().unwrap().is_empty());

    // Already announced pairs stay announced after a restart
    restored
        .register(registration("u3", "legal help", "pitch coaching"))
        .unwrap();
    let report = restored.run_batch(&CancellationToken::new()).await.unwrap();
    assert!(report.announced.is_empty());
}

#[test]
fn open_without_a_snapshot_starts_empty() {
    let world = TestWorld::new();
    assert!(!world.settings.state_path.exists());
    let engine = MatchEngine::open(world.settings.clone()).unwrap();
    assert_eq!(engine.health().unwrap().users, 0);
}
