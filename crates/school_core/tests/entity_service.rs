mod common;

use common::{course_with_graph, in_memory_scope, Course, Lesson, LessonNote};
use school_core::{
    predicate, EntityService, JsonMapper, MapError, Repository, RequestScope, RuleRegistry,
    ServiceError, SqliteRepository,
};
use std::sync::Arc;

fn lesson_candidate(id: i64, topic: &str) -> Lesson {
    let mut lesson = Lesson::on(topic);
    lesson.record.id = id;
    lesson
}

#[tokio::test]
async fn insert_returns_the_reloaded_row() {
    let scope = in_memory_scope();
    let service = EntityService::<Course>::new(scope, &RuleRegistry::new());

    let saved = service
        .insert(&course_with_graph("Rust", "RS"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(saved.record.id, 1);
    assert_eq!(saved.record.created_by.as_deref(), Some("tester"));
    assert!(saved.record.concurrency_token.is_some());
    assert_eq!(saved.lessons.len(), 2);
    assert_eq!(saved.lessons[0].notes.len(), 1);
    assert!(saved.syllabus.is_some());
}

#[tokio::test]
async fn insert_rolled_back_by_a_conflict_assigns_no_identity() {
    let scope = in_memory_scope();
    let service = EntityService::<Course>::new(Arc::clone(&scope), &RuleRegistry::new());
    let saved = service
        .insert(&Course::titled("Rust", "RS"))
        .await
        .unwrap()
        .unwrap();
    let repo = SqliteRepository::<Course>::new(Arc::clone(&scope));
    let mut stale = repo.get_one(saved.record.id).await.unwrap();
    service
        .update(saved.record.id, &Course::titled("Rust 2024", "RS"))
        .await
        .unwrap()
        .unwrap();

    stale.title = "Rust 2021".to_string();
    repo.update(saved.record.id, stale).await.unwrap();
    let candidate = Course::titled("SQL", "SQL");
    assert!(service.insert(&candidate).await.unwrap().is_none());

    assert!(candidate.record.is_new());
    assert_eq!(service.get().await.unwrap().len(), 1);
    let next = service
        .insert(&candidate)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(next.title, "SQL");
    assert_ne!(next.record.id, saved.record.id);
}

#[tokio::test]
async fn mapping_never_takes_identity_or_audit_from_the_candidate() {
    let service = EntityService::<Course>::new(in_memory_scope(), &RuleRegistry::new());
    let original = service
        .insert(&Course::titled("Rust", "RS"))
        .await
        .unwrap()
        .unwrap();

    let mut candidate = Course::titled("Rust 2024", "RS-24");
    candidate.record.id = 99;
    candidate.record.created_by = Some("mallory".to_string());
    candidate.record.is_deleted = true;
    let updated = service
        .update(original.record.id, &candidate)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated.record.id, original.record.id);
    assert_eq!(updated.title, "Rust 2024");
    assert_eq!(updated.code.as_deref(), Some("RS-24"));
    assert_eq!(updated.record.created_by.as_deref(), Some("tester"));
    assert!(!updated.record.is_deleted);
    assert_ne!(
        updated.record.concurrency_token,
        original.record.concurrency_token
    );
}

#[tokio::test]
async fn ignored_fields_keep_their_persisted_value() {
    let session = common::in_memory_session();
    let scope = Arc::new(RequestScope::new(
        session,
        "tester",
        Arc::new(JsonMapper::new().ignore("code")),
    ));
    let service = EntityService::<Course>::new(scope, &RuleRegistry::new());
    let original = service
        .insert(&Course::titled("Rust", "RS"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(original.code, None);

    let updated = service
        .update(original.record.id, &Course::titled("Rust 2024", "RS-24"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.title, "Rust 2024");
    assert_eq!(updated.code, None);
}

#[tokio::test]
async fn declared_children_are_reconciled_by_identity() {
    let scope = in_memory_scope();
    let service = EntityService::<Course>::new(Arc::clone(&scope), &RuleRegistry::new())
        .with_children(&["lessons"])
        .unwrap();
    let saved = service
        .insert(&course_with_graph("Rust", "RS"))
        .await
        .unwrap()
        .unwrap();
    let intro_id = saved.lessons[0].record.id;
    let ownership_id = saved.lessons[1].record.id;

    let candidate = Course {
        lessons: vec![lesson_candidate(intro_id, "intro (revised)"), Lesson::on("traits")],
        ..Course::titled("Rust", "RS")
    };
    let updated = service
        .update(saved.record.id, &candidate)
        .await
        .unwrap()
        .unwrap();

    let topics: Vec<(i64, &str)> = updated
        .lessons
        .iter()
        .map(|lesson| (lesson.record.id, lesson.topic.as_str()))
        .collect();
    assert_eq!(topics.len(), 2);
    assert_eq!(topics[0], (intro_id, "intro (revised)"));
    assert_eq!(topics[1].1, "traits");
    assert!(topics[1].0 != intro_id && topics[1].0 != ownership_id);
    assert_eq!(updated.lessons[0].notes.len(), 1);

    let lessons = SqliteRepository::<Lesson>::new(scope);
    let removed = lessons
        .get_including_deleted(&[predicate(move |lesson: &Lesson| {
            lesson.record.id == ownership_id
        })])
        .await
        .unwrap();
    assert_eq!(removed.len(), 1);
    assert!(removed[0].record.is_deleted);
}

#[tokio::test]
async fn removed_children_take_their_owned_rows_with_them() {
    let scope = in_memory_scope();
    let service = EntityService::<Course>::new(Arc::clone(&scope), &RuleRegistry::new())
        .with_children(&["lessons"])
        .unwrap();
    let saved = service
        .insert(&course_with_graph("Rust", "RS"))
        .await
        .unwrap()
        .unwrap();
    let ownership_id = saved.lessons[1].record.id;

    let candidate = Course {
        lessons: vec![lesson_candidate(ownership_id, "ownership")],
        ..Course::titled("Rust", "RS")
    };
    let updated = service
        .update(saved.record.id, &candidate)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.lessons.len(), 1);

    let notes = SqliteRepository::<LessonNote>::new(scope);
    assert!(notes.get().await.unwrap().is_empty());
    assert_eq!(notes.get_including_deleted(&[]).await.unwrap().len(), 1);
}

#[tokio::test]
async fn undeclared_children_are_left_alone() {
    let service = EntityService::<Course>::new(in_memory_scope(), &RuleRegistry::new());
    let saved = service
        .insert(&course_with_graph("Rust", "RS"))
        .await
        .unwrap()
        .unwrap();

    let updated = service
        .update(saved.record.id, &Course::titled("Rust 2024", "RS"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated.title, "Rust 2024");
    assert_eq!(updated.lessons.len(), 2);
}

#[test]
fn only_to_many_relationships_can_be_declared_as_children() {
    for name in ["syllabus", "teachers"] {
        let result = EntityService::<Course>::new(in_memory_scope(), &RuleRegistry::new())
            .with_children(&[name]);
        match result {
            Err(ServiceError::Mapping(MapError::UnknownChildCollection { kind, name: found })) => {
                assert_eq!(kind, "course");
                assert_eq!(found, name);
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("`{name}` was accepted as a child collection"),
        }
    }
}

#[tokio::test]
async fn delete_soft_deletes_and_reports_missing_rows() {
    let service = EntityService::<Course>::new(in_memory_scope(), &RuleRegistry::new());
    let saved = service
        .insert(&Course::titled("Rust", "RS"))
        .await
        .unwrap()
        .unwrap();

    assert!(service.delete(saved.record.id).await.unwrap());
    assert!(service.get().await.unwrap().is_empty());
    assert!(matches!(
        service.delete(saved.record.id).await,
        Err(ServiceError::NotFound { kind: "course", .. })
    ));
    assert!(matches!(
        service
            .get_one_where(&[predicate(|course: &Course| course.title == "Rust")])
            .await,
        Err(ServiceError::NoMatch { kind: "course" })
    ));
}
