use crate::model::{ClassInfo, Student, Task, TaskReply, ALL_CLASSES};
use std::collections::HashSet;

/// Which tasks count as assigned to a student.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskScope<'a> {
    /// Global tasks plus the student's class tasks.
    ClassOnly,
    /// As `ClassOnly`, but a graded global task only reaches students of that
    /// grade. `None` means the student's grade is unknown.
    Graded(Option<&'a str>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskCompletion<'a> {
    pub assigned: Vec<&'a Task>,
    pub completed: usize,
}

impl TaskCompletion<'_> {
    pub fn total(&self) -> usize {
        self.assigned.len()
    }

    pub fn progress_percent(&self) -> u32 {
        super::round_percent(self.completed as f64, self.total() as f64)
    }
}

pub fn is_assigned(task: &Task, student: &Student, scope: TaskScope<'_>) -> bool {
    if task.class_id == student.class_id {
        return true;
    }
    if !task.is_global() {
        return false;
    }
    match scope {
        TaskScope::ClassOnly => true,
        TaskScope::Graded(student_grade) => match task.grade.as_deref() {
            None | Some("") | Some(ALL_CLASSES) => true,
            Some(g) => student_grade == Some(g),
        },
    }
}

/// Assigned tasks for `student` and how many of them have at least one reply.
pub fn resolve_completion<'a>(
    tasks: &'a [Task],
    replies: &[TaskReply],
    student: &Student,
    scope: TaskScope<'_>,
) -> TaskCompletion<'a> {
    let replied: HashSet<&str> = replies
        .iter()
        .filter(|r| r.student_id == student.id)
        .map(|r| r.task_id.as_str())
        .collect();

    let assigned: Vec<&Task> = tasks
        .iter()
        .filter(|t| is_assigned(t, student, scope))
        .collect();
    let completed = assigned
        .iter()
        .filter(|t| replied.contains(t.id.as_str()))
        .count();

    TaskCompletion {
        assigned,
        completed,
    }
}

/// Grade number of a class: first digit run in `level` ("Grade 5"), else in
/// the class name ("5A").
pub fn class_grade(class: &ClassInfo) -> Option<String> {
    class
        .level
        .as_deref()
        .and_then(first_digit_run)
        .or_else(|| first_digit_run(&class.class_name))
}

fn first_digit_run(s: &str) -> Option<String> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let digits: String = s[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    Some(digits)
}
