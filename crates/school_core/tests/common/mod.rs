#![allow(dead_code)]

use once_cell::sync::Lazy;
use school_core::{
    open_db_in_memory, Entity, JsonMapper, KeyGeneration, Record, Relation, RequestScope,
    Session, StaticEntity,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Teacher {
    #[serde(flatten)]
    pub record: Record<i32>,
    pub name: String,
}

impl Teacher {
    pub fn new(id: i32, name: &str) -> Self {
        Self {
            record: Record::with_id(id),
            name: name.to_string(),
        }
    }
}

impl Entity for Teacher {
    type Key = i32;
    const KIND: &'static str = "teacher";
    const KEY_GENERATION: KeyGeneration = KeyGeneration::Caller;

    fn record(&self) -> &Record<i32> {
        &self.record
    }

    fn record_mut(&mut self) -> &mut Record<i32> {
        &mut self.record
    }
}

impl StaticEntity for Teacher {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Course {
    #[serde(flatten)]
    pub record: Record<i64>,
    pub title: String,
    pub code: Option<String>,
    pub teacher_id: Option<i32>,
    pub archived: bool,
    #[serde(skip)]
    pub lessons: Vec<Lesson>,
    #[serde(skip)]
    pub syllabus: Option<Syllabus>,
}

impl Course {
    pub fn titled(title: &str, code: &str) -> Self {
        Self {
            title: title.to_string(),
            code: Some(code.to_string()),
            ..Self::default()
        }
    }
}

static COURSE_RELATIONS: Lazy<Vec<Relation<Course>>> = Lazy::new(|| {
    vec![
        Relation::<Course>::many::<Lesson>(
            "lessons",
            "course_id",
            |course| &course.lessons,
            |course| &mut course.lessons,
            |lesson, id| lesson.course_id = id,
        ),
        Relation::<Course>::one::<Syllabus>(
            "syllabus",
            "course_id",
            |course| &mut course.syllabus,
            |syllabus, id| syllabus.course_id = id,
        ),
    ]
});

impl Entity for Course {
    type Key = i64;
    const KIND: &'static str = "course";

    fn record(&self) -> &Record<i64> {
        &self.record
    }

    fn record_mut(&mut self) -> &mut Record<i64> {
        &mut self.record
    }

    fn relations() -> &'static [Relation<Self>] {
        COURSE_RELATIONS.as_slice()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Lesson {
    #[serde(flatten)]
    pub record: Record<i64>,
    pub course_id: i64,
    pub topic: String,
    #[serde(skip)]
    pub course: Option<Course>,
    #[serde(skip)]
    pub notes: Vec<LessonNote>,
}

impl Lesson {
    pub fn on(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            ..Self::default()
        }
    }
}

static LESSON_RELATIONS: Lazy<Vec<Relation<Lesson>>> = Lazy::new(|| {
    vec![
        Relation::<Lesson>::reference::<Course>(
            "course",
            |lesson| Some(lesson.course_id),
            |lesson| &mut lesson.course,
        ),
        Relation::<Lesson>::many::<LessonNote>(
            "notes",
            "lesson_id",
            |lesson| &lesson.notes,
            |lesson| &mut lesson.notes,
            |note, id| note.lesson_id = id,
        ),
    ]
});

impl Entity for Lesson {
    type Key = i64;
    const KIND: &'static str = "lesson";

    fn record(&self) -> &Record<i64> {
        &self.record
    }

    fn record_mut(&mut self) -> &mut Record<i64> {
        &mut self.record
    }

    fn relations() -> &'static [Relation<Self>] {
        LESSON_RELATIONS.as_slice()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LessonNote {
    #[serde(flatten)]
    pub record: Record<Uuid>,
    pub lesson_id: i64,
    pub text: String,
}

impl LessonNote {
    pub fn saying(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Self::default()
        }
    }
}

impl Entity for LessonNote {
    type Key = Uuid;
    const KIND: &'static str = "lesson_note";

    fn record(&self) -> &Record<Uuid> {
        &self.record
    }

    fn record_mut(&mut self) -> &mut Record<Uuid> {
        &mut self.record
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Syllabus {
    #[serde(flatten)]
    pub record: Record<i64>,
    pub course_id: i64,
    pub outline: String,
}

impl Entity for Syllabus {
    type Key = i64;
    const KIND: &'static str = "syllabus";

    fn record(&self) -> &Record<i64> {
        &self.record
    }

    fn record_mut(&mut self) -> &mut Record<i64> {
        &mut self.record
    }
}

pub fn in_memory_session() -> Arc<Session> {
    Arc::new(Session::try_new(open_db_in_memory().unwrap()).unwrap())
}

pub fn scope_for(session: &Arc<Session>, user_id: &str) -> Arc<RequestScope> {
    Arc::new(RequestScope::new(
        Arc::clone(session),
        user_id,
        Arc::new(JsonMapper::new()),
    ))
}

pub fn in_memory_scope() -> Arc<RequestScope> {
    scope_for(&in_memory_session(), "tester")
}

/// Course with two lessons (the first carrying one note) and a syllabus.
pub fn course_with_graph(title: &str, code: &str) -> Course {
    let mut first = Lesson::on("intro");
    first.notes.push(LessonNote::saying("bring a laptop"));
    Course {
        lessons: vec![first, Lesson::on("ownership")],
        syllabus: Some(Syllabus {
            outline: "weeks 1-4".to_string(),
            ..Syllabus::default()
        }),
        ..Course::titled(title, code)
    }
}
