mod common;

use common::{course_with_graph, in_memory_session, scope_for, Course, Lesson, LessonNote, Syllabus};
use school_core::{Repository, SqliteRepository};

#[tokio::test]
async fn deleting_a_course_cascades_through_owned_rows() {
    let session = in_memory_session();
    let courses = SqliteRepository::<Course>::new(scope_for(&session, "alice"));
    let mut course = course_with_graph("Rust", "RS");
    courses.insert(&mut course).await.unwrap();
    let course_id = courses.commit().await.unwrap().unwrap().inserted[0];

    let registrar = scope_for(&session, "registrar");
    let courses = SqliteRepository::<Course>::new(registrar.clone());
    assert!(courses.delete(course_id).await.unwrap());
    assert!(courses.save_changes().await.unwrap());

    let lessons = SqliteRepository::<Lesson>::new(registrar.clone());
    let notes = SqliteRepository::<LessonNote>::new(registrar.clone());
    let syllabi = SqliteRepository::<Syllabus>::new(registrar);

    assert!(lessons.get().await.unwrap().is_empty());
    assert!(notes.get().await.unwrap().is_empty());
    assert!(syllabi.get().await.unwrap().is_empty());

    let tombstones = lessons.get_including_deleted(&[]).await.unwrap();
    assert_eq!(tombstones.len(), 2);
    assert!(tombstones.iter().all(|lesson| lesson.record.is_deleted));
    assert!(tombstones
        .iter()
        .all(|lesson| lesson.record.edited_by.as_deref() == Some("registrar")));

    let note_tombstones = notes.get_including_deleted(&[]).await.unwrap();
    assert_eq!(note_tombstones.len(), 1);
    assert!(note_tombstones[0].record.is_deleted);
    assert_eq!(
        note_tombstones[0].record.created_by.as_deref(),
        Some("alice")
    );
}

#[tokio::test]
async fn deleting_a_lesson_never_deletes_its_course() {
    let scope = scope_for(&in_memory_session(), "alice");
    let courses = SqliteRepository::<Course>::new(scope.clone());
    let mut course = course_with_graph("Rust", "RS");
    courses.insert(&mut course).await.unwrap();
    let course_id = courses.commit().await.unwrap().unwrap().inserted[0];

    let lessons = SqliteRepository::<Lesson>::new(scope.clone());
    let intro = lessons.get_one(1).await.unwrap();
    assert!(intro.course.is_some());
    assert!(lessons.delete(intro.record.id).await.unwrap());
    assert!(lessons.save_changes().await.unwrap());

    let stored = courses.get_one(course_id).await.unwrap();
    assert!(!stored.record.is_deleted);
    assert_eq!(stored.lessons.len(), 1);
    assert_eq!(stored.lessons[0].topic, "ownership");
    assert!(stored.syllabus.is_some());

    let notes = SqliteRepository::<LessonNote>::new(scope);
    assert!(notes.get().await.unwrap().is_empty());
}

#[tokio::test]
async fn deleted_owned_rows_are_not_loaded_into_the_graph() {
    let scope = scope_for(&in_memory_session(), "alice");
    let courses = SqliteRepository::<Course>::new(scope.clone());
    let mut course = course_with_graph("Rust", "RS");
    courses.insert(&mut course).await.unwrap();
    let course_id = courses.commit().await.unwrap().unwrap().inserted[0];

    let syllabi = SqliteRepository::<Syllabus>::new(scope);
    syllabi.delete(1).await.unwrap();
    syllabi.save_changes().await.unwrap();

    let stored = courses.get_one(course_id).await.unwrap();
    assert!(stored.syllabus.is_none());
    assert_eq!(stored.lessons.len(), 2);
}
